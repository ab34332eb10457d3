//! Graph document round-trip coverage
//!
//! Saving then loading a graph must reproduce the node set, link set, and
//! variable values, socket by socket, under each value type's equality.

use std::io::Write;
use std::sync::Arc;

use skein_runtime::profiles::CoreProfile;
use skein_runtime::{create_registry, read_graph_from_document, write_graph_to_document, Registry};
use skein_types::{Graph, GraphDocument};

fn core_registry() -> Arc<Registry> {
    Arc::new(create_registry(&[&CoreProfile]).expect("core profile must validate"))
}

fn thermostat_doc() -> GraphDocument {
    serde_json::from_value(serde_json::json!({
        "name": "thermostat",
        "nodes": [
            {"id": "start", "type": "event/Start", "position": {"x": 0.0, "y": 0.0}},
            {"id": "get_setpoint", "type": "variable/Get/float",
             "configuration": {"variable": "setpoint"}},
            {"id": "too_cold", "type": "math/Greater",
             "inputs": {"b": 19.0}},
            {"id": "branch", "type": "flow/Branch", "position": {"x": 120.0, "y": 40.0}},
            {"id": "report", "type": "debug/Log", "inputs": {"message": "heating on"}},
            {"id": "idle", "type": "debug/Log", "inputs": {"message": "idle"}}
        ],
        "links": [
            {"from_node": "start", "from_socket": "started",
             "to_node": "branch", "to_socket": "exec"},
            {"from_node": "get_setpoint", "from_socket": "value",
             "to_node": "too_cold", "to_socket": "a"},
            {"from_node": "too_cold", "from_socket": "result",
             "to_node": "branch", "to_socket": "condition"},
            {"from_node": "branch", "from_socket": "true",
             "to_node": "report", "to_socket": "exec"},
            {"from_node": "branch", "from_socket": "false",
             "to_node": "idle", "to_socket": "exec"}
        ],
        "variables": [
            {"name": "setpoint", "value_type": "float", "value": 21.5}
        ],
        "custom_events": [
            {"name": "override", "parameters": [
                {"name": "target", "value_type": "float"}
            ]}
        ]
    }))
    .unwrap()
}

fn assert_graphs_equal(a: &Graph, b: &Graph, registry: &Registry) {
    assert_eq!(a.name, b.name);
    assert_eq!(a.node_count(), b.node_count());
    assert_eq!(a.link_count(), b.link_count());

    for node_a in a.nodes() {
        let node_b = b.node(&node_a.id).expect("node missing after round-trip");
        assert_eq!(node_a.type_name, node_b.type_name);
        assert_eq!(node_a.kind, node_b.kind);
        assert_eq!(node_a.position, node_b.position);
        assert_eq!(node_a.configuration, node_b.configuration);

        for socket_a in &node_a.inputs {
            let socket_b = node_b
                .input(&socket_a.name)
                .expect("input socket missing after round-trip");
            assert_eq!(socket_a.value_type, socket_b.value_type);
            if socket_a.is_data() {
                let ty = registry.value_type(&socket_a.value_type).unwrap();
                assert!(
                    ty.equals(&socket_a.value, &socket_b.value),
                    "socket {}.{} differs after round-trip",
                    node_a.id,
                    socket_a.name
                );
            }
        }
        for socket_a in &node_a.outputs {
            let socket_b = node_b.output(&socket_a.name).unwrap();
            assert_eq!(socket_a.links, socket_b.links);
        }

        // Incoming links agree too.
        for socket_a in &node_a.inputs {
            assert_eq!(
                a.incoming_link(&node_a.id, &socket_a.name),
                b.incoming_link(&node_a.id, &socket_a.name)
            );
        }
    }
}

#[test]
fn graph_survives_save_load_cycle() {
    let registry = core_registry();
    let graph = read_graph_from_document(&thermostat_doc(), &registry).unwrap();

    let saved = write_graph_to_document(&graph, &registry).unwrap();
    let reloaded = read_graph_from_document(&saved, &registry).unwrap();

    assert_graphs_equal(&graph, &reloaded, &registry);
    assert_eq!(reloaded.variable("setpoint").unwrap().as_f64(), Some(21.5));
    assert_eq!(
        reloaded.custom_event("override").unwrap().parameters[0].name,
        "target"
    );
}

#[test]
fn saved_document_is_stable() {
    // Saving twice yields identical JSON; ordering is deterministic.
    let registry = core_registry();
    let graph = read_graph_from_document(&thermostat_doc(), &registry).unwrap();

    let first = serde_json::to_string(&write_graph_to_document(&graph, &registry).unwrap()).unwrap();
    let second =
        serde_json::to_string(&write_graph_to_document(&graph, &registry).unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn round_trip_through_disk() {
    let registry = core_registry();
    let graph = read_graph_from_document(&thermostat_doc(), &registry).unwrap();
    let saved = write_graph_to_document(&graph, &registry).unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string_pretty(&saved).unwrap().as_bytes())
        .unwrap();

    let text = std::fs::read_to_string(file.path()).unwrap();
    let doc: GraphDocument = serde_json::from_str(&text).unwrap();
    let reloaded = read_graph_from_document(&doc, &registry).unwrap();

    assert_graphs_equal(&graph, &reloaded, &registry);
}

#[test]
fn linked_inputs_store_no_literal() {
    let registry = core_registry();
    let graph = read_graph_from_document(&thermostat_doc(), &registry).unwrap();
    let saved = write_graph_to_document(&graph, &registry).unwrap();

    // branch.condition is link-driven: no literal in the document.
    let branch = saved.node("branch").unwrap();
    assert!(!branch.inputs.contains_key("condition"));
    // too_cold.b is a literal: present.
    let too_cold = saved.node("too_cold").unwrap();
    assert_eq!(too_cold.inputs.get("b").unwrap(), &serde_json::json!(19.0));
}

#[test]
fn type_gate_holds_across_load() {
    let registry = core_registry();

    // string output into float input: not in the conversion table.
    let doc: GraphDocument = serde_json::from_value(serde_json::json!({
        "name": "bad-wire",
        "nodes": [
            {"id": "concat", "type": "string/Concat"},
            {"id": "add", "type": "math/Add"}
        ],
        "links": [
            {"from_node": "concat", "from_socket": "result",
             "to_node": "add", "to_socket": "a"}
        ]
    }))
    .unwrap();

    let err = read_graph_from_document(&doc, &registry).unwrap_err();
    assert!(matches!(
        err,
        skein_types::GraphError::IncompatibleTypes { .. }
    ));
}

#[test]
fn conversion_links_load_and_convert() {
    let registry = core_registry();

    // float output into string input goes through the registered conversion.
    let doc: GraphDocument = serde_json::from_value(serde_json::json!({
        "name": "converted",
        "nodes": [
            {"id": "start", "type": "event/Start"},
            {"id": "sum", "type": "math/Add", "inputs": {"a": 2.0, "b": 0.5}},
            {"id": "log", "type": "debug/Log"}
        ],
        "links": [
            {"from_node": "start", "from_socket": "started",
             "to_node": "log", "to_socket": "exec"},
            {"from_node": "sum", "from_socket": "result",
             "to_node": "log", "to_socket": "message"}
        ]
    }))
    .unwrap();

    let graph = read_graph_from_document(&doc, &registry).unwrap();
    assert_eq!(graph.incoming_link("log", "message"), Some(("sum", "result")));
}
