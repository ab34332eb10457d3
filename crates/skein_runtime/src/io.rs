//! Graph document load and save
//!
//! Loading resolves every node's definition through the registry, populates
//! literal inputs via each value type's `deserialize`, then re-establishes
//! links with full integrity and compatibility checks. Saving is the
//! structural inverse: literals via `serialize`, link-driven inputs omitted,
//! nothing resolved ever written. Output ordering is deterministic so saved
//! documents diff cleanly.

use std::collections::BTreeMap;

use skein_types::{
    CustomEventDoc, Graph, GraphDocument, GraphError, LinkDoc, NodeDoc, VariableDoc,
};

use crate::registry::Registry;

// ─────────────────────────────────────────────────────────────────────────────
// Load
// ─────────────────────────────────────────────────────────────────────────────

/// Build a live graph from a document against a registry
pub fn read_graph_from_document(
    doc: &GraphDocument,
    registry: &Registry,
) -> Result<Graph, GraphError> {
    let mut graph = Graph::new(&doc.name);

    for node_doc in &doc.nodes {
        let mut node = registry.instantiate(
            &node_doc.type_name,
            Some(node_doc.id.clone()),
            node_doc.configuration.clone(),
            node_doc.position,
        )?;

        for (socket_name, literal) in &node_doc.inputs {
            let socket =
                node.input(socket_name)
                    .ok_or_else(|| GraphError::SocketNotFound {
                        node_id: node_doc.id.clone(),
                        socket: socket_name.clone(),
                        direction: "input",
                    })?;
            let value_type = registry
                .value_type(&socket.value_type)
                .ok_or_else(|| GraphError::UnknownValueType(socket.value_type.clone()))?;
            let value =
                value_type
                    .deserialize(literal)
                    .map_err(|source| GraphError::InvalidValue {
                        context: format!("{}.{}", node_doc.id, socket_name),
                        source,
                    })?;
            if let Some(socket) = node.input_mut(socket_name) {
                socket.value = value;
            }
        }

        graph.insert_node(node)?;
    }

    // Document order is link creation order; connect() preserves it per
    // source socket.
    for link in &doc.links {
        graph.connect(
            &link.from_node,
            &link.from_socket,
            &link.to_node,
            &link.to_socket,
            registry.conversions(),
        )?;
    }

    for var in &doc.variables {
        let value_type = registry
            .value_type(&var.value_type)
            .ok_or_else(|| GraphError::UnknownValueType(var.value_type.clone()))?;
        let value = value_type
            .deserialize(&var.value)
            .map_err(|source| GraphError::InvalidValue {
                context: format!("variable {}", var.name),
                source,
            })?;
        graph.declare_variable(&var.name, &var.value_type, value);
    }

    for event in &doc.custom_events {
        graph.declare_custom_event(&event.name, event.parameters.clone())?;
    }

    tracing::debug!(
        graph = %graph.name,
        nodes = graph.node_count(),
        links = graph.link_count(),
        "graph loaded from document"
    );
    Ok(graph)
}

// ─────────────────────────────────────────────────────────────────────────────
// Save
// ─────────────────────────────────────────────────────────────────────────────

/// Serialize a live graph into a document against a registry
pub fn write_graph_to_document(
    graph: &Graph,
    registry: &Registry,
) -> Result<GraphDocument, GraphError> {
    let mut doc = GraphDocument::new(&graph.name);

    let mut node_ids: Vec<_> = graph.node_ids().map(str::to_string).collect();
    node_ids.sort();

    for id in &node_ids {
        let node = graph
            .node(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.clone()))?;

        let mut inputs = BTreeMap::new();
        for socket in &node.inputs {
            if socket.is_flow() || graph.incoming_link(&node.id, &socket.name).is_some() {
                continue;
            }
            let value_type = registry
                .value_type(&socket.value_type)
                .ok_or_else(|| GraphError::UnknownValueType(socket.value_type.clone()))?;
            inputs.insert(socket.name.clone(), value_type.serialize(&socket.value));
        }

        doc.nodes.push(NodeDoc {
            id: node.id.clone(),
            type_name: node.type_name.clone(),
            position: node.position,
            configuration: node.configuration.clone(),
            inputs,
        });

        for socket in &node.outputs {
            for link in &socket.links {
                doc.links.push(LinkDoc {
                    from_node: node.id.clone(),
                    from_socket: socket.name.clone(),
                    to_node: link.node_id.clone(),
                    to_socket: link.socket.clone(),
                });
            }
        }
    }

    let mut variables: Vec<(String, skein_types::Variable)> = {
        let vars = graph.variables();
        let vars = vars.read();
        vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    };
    variables.sort_by(|a, b| a.0.cmp(&b.0));
    for (name, var) in variables {
        let value_type = registry
            .value_type(&var.value_type)
            .ok_or_else(|| GraphError::UnknownValueType(var.value_type.clone()))?;
        doc.variables.push(VariableDoc {
            name,
            value_type: var.value_type.clone(),
            value: value_type.serialize(&var.value),
        });
    }

    let mut events: Vec<_> = graph.custom_events().cloned().collect();
    events.sort_by(|a, b| a.name.cmp(&b.name));
    for event in events {
        doc.custom_events.push(CustomEventDoc {
            name: event.name,
            parameters: event.parameters,
        });
    }

    Ok(doc)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
