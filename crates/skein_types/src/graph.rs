//! Graph container
//!
//! A graph owns its nodes in an id-keyed arena, plus graph-scoped variables
//! and custom-event declarations. It is the unit of serialization, loading,
//! and execution. Every mutation operation validates before it touches
//! state, so a rejected operation leaves the graph unmodified.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::node::Node;
use crate::socket::Link;
use crate::value::Value;
use crate::value_type::ConversionTable;

// ─────────────────────────────────────────────────────────────────────────────
// Variables
// ─────────────────────────────────────────────────────────────────────────────

/// A graph-scoped typed variable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    /// Value type name
    pub value_type: String,
    /// Current value
    pub value: Value,
}

/// Shared handle to the graph's variable store
///
/// Variables are reachable from node behaviors and, for hosts that marshal
/// async completions from worker threads, potentially read concurrently;
/// the lock keeps that safe without serializing normal engine execution.
pub type SharedVariables = Arc<RwLock<HashMap<String, Variable>>>;

// ─────────────────────────────────────────────────────────────────────────────
// Custom Events
// ─────────────────────────────────────────────────────────────────────────────

/// One typed parameter of a custom event payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventParam {
    /// Parameter name
    pub name: String,
    /// Value type name
    pub value_type: String,
}

/// A named entry point triggerable from outside the graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomEventSpec {
    /// Event name, unique within the graph
    pub name: String,
    /// Payload shape
    #[serde(default)]
    pub parameters: Vec<EventParam>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph
// ─────────────────────────────────────────────────────────────────────────────

/// Container of node instances, variables, and custom-event declarations
#[derive(Debug)]
pub struct Graph {
    /// Graph name
    pub name: String,
    nodes: HashMap<String, Node>,
    variables: SharedVariables,
    custom_events: HashMap<String, CustomEventSpec>,
}

/// Generate a fresh unique node id
pub fn fresh_node_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl Graph {
    /// Create an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            variables: Arc::new(RwLock::new(HashMap::new())),
            custom_events: HashMap::new(),
        }
    }

    // ── Nodes ────────────────────────────────────────────────────────────────

    /// Add a node instance. Fails if the id is already taken.
    pub fn insert_node(&mut self, node: Node) -> Result<(), GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNodeId(node.id.clone()));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Remove a node and scrub every link referencing it, in both directions
    pub fn remove_node(&mut self, id: &str) -> Result<Node, GraphError> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::NodeNotFound(id.to_string()))?;

        // Links the node owned as a source vanish with it; links from other
        // nodes targeting it must be scrubbed here.
        for other in self.nodes.values_mut() {
            for socket in other.outputs.iter_mut() {
                socket.remove_links_to_node(id);
            }
        }
        Ok(node)
    }

    /// Get a node by id
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a mutable node by id
    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Iterate over all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Iterate over all node ids
    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // ── Links ────────────────────────────────────────────────────────────────

    /// Connect an output socket to an input socket
    ///
    /// Fails if either socket is missing or the types are incompatible under
    /// the conversion table. If the target input already has an incoming
    /// link, the old link is replaced (removed from its former source) —
    /// this is the documented re-connect policy.
    pub fn connect(
        &mut self,
        source_id: &str,
        source_socket: &str,
        target_id: &str,
        target_socket: &str,
        conversions: &ConversionTable,
    ) -> Result<(), GraphError> {
        // Validate everything before mutating anything.
        let source_type = {
            let source = self
                .nodes
                .get(source_id)
                .ok_or_else(|| GraphError::NodeNotFound(source_id.to_string()))?;
            source
                .output(source_socket)
                .ok_or_else(|| GraphError::SocketNotFound {
                    node_id: source_id.to_string(),
                    socket: source_socket.to_string(),
                    direction: "output",
                })?
                .value_type
                .clone()
        };
        let target_type = {
            let target = self
                .nodes
                .get(target_id)
                .ok_or_else(|| GraphError::NodeNotFound(target_id.to_string()))?;
            target
                .input(target_socket)
                .ok_or_else(|| GraphError::SocketNotFound {
                    node_id: target_id.to_string(),
                    socket: target_socket.to_string(),
                    direction: "input",
                })?
                .value_type
                .clone()
        };

        if !conversions.compatible(&source_type, &target_type) {
            let flow_mismatch = (source_type == crate::FLOW_TYPE) != (target_type == crate::FLOW_TYPE);
            return Err(if flow_mismatch {
                GraphError::FlowDataMismatch
            } else {
                GraphError::IncompatibleTypes {
                    source_type,
                    target_type,
                }
            });
        }

        // Replace policy: drop any existing link into the target input.
        self.disconnect_input(target_id, target_socket);

        if let Some(socket) = self
            .nodes
            .get_mut(source_id)
            .and_then(|n| n.output_mut(source_socket))
        {
            socket.push_link(Link::new(target_id, target_socket));
        }
        Ok(())
    }

    /// Remove the incoming link of an input socket, if any
    pub fn disconnect_input(&mut self, target_id: &str, target_socket: &str) {
        for node in self.nodes.values_mut() {
            for socket in node.outputs.iter_mut() {
                socket.remove_link_to(target_id, target_socket);
            }
        }
    }

    /// Find the source of the link driving an input socket, as
    /// `(source node id, source socket name)`
    pub fn incoming_link(&self, target_id: &str, target_socket: &str) -> Option<(&str, &str)> {
        for node in self.nodes.values() {
            for socket in node.outputs.iter() {
                if socket
                    .links
                    .iter()
                    .any(|l| l.node_id == target_id && l.socket == target_socket)
                {
                    return Some((node.id.as_str(), socket.name.as_str()));
                }
            }
        }
        None
    }

    /// Total number of links in the graph
    pub fn link_count(&self) -> usize {
        self.nodes
            .values()
            .flat_map(|n| n.outputs.iter())
            .map(|s| s.links.len())
            .sum()
    }

    // ── Variables ────────────────────────────────────────────────────────────

    /// Declare a variable with its type and initial value
    pub fn declare_variable(
        &mut self,
        name: impl Into<String>,
        value_type: impl Into<String>,
        value: Value,
    ) {
        self.variables.write().insert(
            name.into(),
            Variable {
                value_type: value_type.into(),
                value,
            },
        );
    }

    /// Set a declared variable's value
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), GraphError> {
        let mut vars = self.variables.write();
        let var = vars
            .get_mut(name)
            .ok_or_else(|| GraphError::VariableNotFound(name.to_string()))?;
        var.value = value;
        Ok(())
    }

    /// Read a variable's current value
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).map(|v| v.value.clone())
    }

    /// Shared handle to the variable store
    pub fn variables(&self) -> SharedVariables {
        Arc::clone(&self.variables)
    }

    // ── Custom Events ────────────────────────────────────────────────────────

    /// Declare a named triggerable entry point
    pub fn declare_custom_event(
        &mut self,
        name: impl Into<String>,
        parameters: Vec<EventParam>,
    ) -> Result<(), GraphError> {
        let name = name.into();
        if self.custom_events.contains_key(&name) {
            return Err(GraphError::DuplicateCustomEvent(name));
        }
        self.custom_events.insert(
            name.clone(),
            CustomEventSpec { name, parameters },
        );
        Ok(())
    }

    /// Get a custom event declaration
    pub fn custom_event(&self, name: &str) -> Option<&CustomEventSpec> {
        self.custom_events.get(name)
    }

    /// Iterate over custom event declarations
    pub fn custom_events(&self) -> impl Iterator<Item = &CustomEventSpec> {
        self.custom_events.values()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
