//! Engine execution semantics
//!
//! Covers fiber ordering, function re-evaluation, async suspension under a
//! simulated clock, fault isolation, custom events, and disposal.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use skein_runtime::profiles::{CoreProfile, LogSink, LOG_SINK};
use skein_runtime::{
    create_registry, read_graph_from_document, require_value_type, Engine, FlowTransition,
    NodeError, Profile, Registry,
};
use skein_types::{Graph, GraphDocument, NodeKind, NodeSpec, SocketSpec, Value};

// ─────────────────────────────────────────────────────────────────────────────
// Test profile
// ─────────────────────────────────────────────────────────────────────────────

/// Adds a node that always fails, for fault isolation coverage
struct TestProfile;

impl Profile for TestProfile {
    fn name(&self) -> &str {
        "test"
    }

    fn install(&self, registry: &mut Registry) -> Result<(), skein_runtime::DefinitionError> {
        require_value_type(registry, "test", "string")?;
        registry.register_flow_fn(
            NodeSpec::new("test/Explode", "Test", "Explode", NodeKind::Flow)
                .with_sockets(vec![SocketSpec::flow_in(), SocketSpec::flow_out("next")]),
            |_, _| -> Result<FlowTransition, NodeError> {
                Err(NodeError::failed("exploded on purpose"))
            },
        )
    }
}

fn registry_with_sink() -> (Arc<Registry>, Arc<LogSink>) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("skein_runtime=debug")
        .with_test_writer()
        .try_init();
    let mut registry = create_registry(&[&CoreProfile, &TestProfile]).unwrap();
    let sink = Arc::new(LogSink::new());
    registry.insert_dependency(LOG_SINK, Arc::clone(&sink));
    (Arc::new(registry), sink)
}

fn load(json: serde_json::Value, registry: &Registry) -> Graph {
    let doc: GraphDocument = serde_json::from_value(json).unwrap();
    read_graph_from_document(&doc, registry).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Fiber ordering
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn fan_out_spawns_fibers_in_link_creation_order() {
    let (registry, sink) = registry_with_sink();
    let graph = load(
        serde_json::json!({
            "name": "fan-out",
            "nodes": [
                {"id": "start", "type": "event/Start"},
                {"id": "seq", "type": "flow/Sequence"},
                {"id": "l1", "type": "debug/Log", "inputs": {"message": "L1"}},
                {"id": "l2", "type": "debug/Log", "inputs": {"message": "L2"}},
                {"id": "l3", "type": "debug/Log", "inputs": {"message": "L3"}}
            ],
            "links": [
                {"from_node": "start", "from_socket": "started",
                 "to_node": "seq", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "l1", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "l2", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "l3", "to_socket": "exec"}
            ]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);
    assert_eq!(sink.lines(), vec!["L1", "L2", "L3"]);
}

#[tokio::test]
async fn fibers_run_to_completion_before_later_fibers_start() {
    let (registry, sink) = registry_with_sink();
    let graph = load(
        serde_json::json!({
            "name": "fifo",
            "nodes": [
                {"id": "start", "type": "event/Start"},
                {"id": "seq", "type": "flow/Sequence"},
                {"id": "a1", "type": "debug/Log", "inputs": {"message": "a1"}},
                {"id": "a2", "type": "debug/Log", "inputs": {"message": "a2"}},
                {"id": "b", "type": "debug/Log", "inputs": {"message": "b"}}
            ],
            "links": [
                {"from_node": "start", "from_socket": "started",
                 "to_node": "seq", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "a1", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "b", "to_socket": "exec"},
                {"from_node": "a1", "from_socket": "next",
                 "to_node": "a2", "to_socket": "exec"}
            ]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);
    // The first fiber finishes its whole path before the second starts.
    assert_eq!(sink.lines(), vec!["a1", "a2", "b"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Function re-evaluation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn functions_recompute_on_every_pull() {
    let (registry, sink) = registry_with_sink();
    // Two log nodes both pull the same math/Add output (via the registered
    // float -> string conversion).
    let graph = load(
        serde_json::json!({
            "name": "purity",
            "nodes": [
                {"id": "start", "type": "event/Start"},
                {"id": "seq", "type": "flow/Sequence"},
                {"id": "sum", "type": "math/Add", "inputs": {"a": 2.0, "b": 3.0}},
                {"id": "log1", "type": "debug/Log"},
                {"id": "log2", "type": "debug/Log"}
            ],
            "links": [
                {"from_node": "start", "from_socket": "started",
                 "to_node": "seq", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "log1", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "log2", "to_socket": "exec"},
                {"from_node": "sum", "from_socket": "result",
                 "to_node": "log1", "to_socket": "message"},
                {"from_node": "sum", "from_socket": "result",
                 "to_node": "log2", "to_socket": "message"}
            ]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);
    assert_eq!(sink.lines(), vec!["5", "5"]);

    // An upstream literal edit is visible on the next pull: no stale cache.
    engine
        .graph_mut()
        .node_mut("sum")
        .unwrap()
        .input_mut("a")
        .unwrap()
        .value = Value::Float(4.0);
    engine.commit_to_new_fiber("start", "started", None);
    engine.execute_all_sync(100);
    assert_eq!(sink.lines(), vec!["5", "5", "7", "7"]);
}

#[tokio::test]
async fn function_chains_resolve_depth_first() {
    let (registry, sink) = registry_with_sink();
    // (1 + 2) * 3 wired as Add -> Multiply -> Log
    let graph = load(
        serde_json::json!({
            "name": "chain",
            "nodes": [
                {"id": "start", "type": "event/Start"},
                {"id": "add", "type": "math/Add", "inputs": {"a": 1.0, "b": 2.0}},
                {"id": "mul", "type": "math/Multiply", "inputs": {"b": 3.0}},
                {"id": "log", "type": "debug/Log"}
            ],
            "links": [
                {"from_node": "start", "from_socket": "started",
                 "to_node": "log", "to_socket": "exec"},
                {"from_node": "add", "from_socket": "result",
                 "to_node": "mul", "to_socket": "a"},
                {"from_node": "mul", "from_socket": "result",
                 "to_node": "log", "to_socket": "message"}
            ]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);
    assert_eq!(sink.lines(), vec!["9"]);
}

#[tokio::test]
async fn cyclic_function_wiring_faults_instead_of_overflowing() {
    let (registry, _sink) = registry_with_sink();
    let doc: GraphDocument = serde_json::from_value(serde_json::json!({
        "name": "cycle",
        "nodes": [
            {"id": "start", "type": "event/Start"},
            {"id": "a", "type": "math/Add"},
            {"id": "b", "type": "math/Add"},
            {"id": "log", "type": "debug/Log"}
        ],
        "links": [
            {"from_node": "start", "from_socket": "started",
             "to_node": "log", "to_socket": "exec"},
            {"from_node": "a", "from_socket": "result", "to_node": "b", "to_socket": "a"},
            {"from_node": "b", "from_socket": "result", "to_node": "a", "to_socket": "a"},
            {"from_node": "b", "from_socket": "result",
             "to_node": "log", "to_socket": "message"}
        ]
    }))
    .unwrap();

    let graph = read_graph_from_document(&doc, &registry).unwrap();
    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);

    assert_eq!(engine.faults().len(), 1);
    assert!(engine.faults()[0].to_string().contains("depth limit"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Variables
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn variable_nodes_read_and_write_graph_state() {
    let (registry, sink) = registry_with_sink();
    let graph = load(
        serde_json::json!({
            "name": "counter",
            "nodes": [
                {"id": "start", "type": "event/Start"},
                {"id": "set", "type": "variable/Set/integer",
                 "configuration": {"variable": "counter"},
                 "inputs": {"value": 5}},
                {"id": "get", "type": "variable/Get/integer",
                 "configuration": {"variable": "counter"}},
                {"id": "log", "type": "debug/Log"}
            ],
            "links": [
                {"from_node": "start", "from_socket": "started",
                 "to_node": "set", "to_socket": "exec"},
                {"from_node": "set", "from_socket": "next",
                 "to_node": "log", "to_socket": "exec"},
                {"from_node": "get", "from_socket": "value",
                 "to_node": "log", "to_socket": "message"}
            ],
            "variables": [
                {"name": "counter", "value_type": "integer", "value": 0}
            ]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);

    assert_eq!(sink.lines(), vec!["5"]);
    assert_eq!(engine.graph().variable("counter").unwrap().as_i64(), Some(5));
}

// ─────────────────────────────────────────────────────────────────────────────
// Async suspension
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn async_delay_suspends_without_blocking_other_paths() {
    let (registry, sink) = registry_with_sink();
    let graph = load(
        serde_json::json!({
            "name": "delayed",
            "nodes": [
                {"id": "start", "type": "event/Start"},
                {"id": "seq", "type": "flow/Sequence"},
                {"id": "log_a", "type": "debug/Log", "inputs": {"message": "A"}},
                {"id": "wait", "type": "time/Delay", "inputs": {"seconds": 0.01}},
                {"id": "log_b", "type": "debug/Log", "inputs": {"message": "B"}},
                {"id": "log_c", "type": "debug/Log", "inputs": {"message": "C"}}
            ],
            "links": [
                {"from_node": "start", "from_socket": "started",
                 "to_node": "seq", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "log_a", "to_socket": "exec"},
                {"from_node": "seq", "from_socket": "then",
                 "to_node": "log_c", "to_socket": "exec"},
                {"from_node": "log_a", "from_socket": "next",
                 "to_node": "wait", "to_socket": "exec"},
                {"from_node": "wait", "from_socket": "completed",
                 "to_node": "log_b", "to_socket": "exec"}
            ]
        }),
        &registry,
    );

    let started = tokio::time::Instant::now();
    let mut engine = Engine::new(graph, registry);

    // "A" prints immediately and the sibling path ("C") is not blocked by
    // the pending delay.
    engine.execute_all_sync(100);
    assert_eq!(sink.lines(), vec!["A", "C"]);
    assert_eq!(engine.pending_async_count(), 1);

    // Driving to quiescence delivers "B" only after the simulated delay.
    engine.execute_all(100).await;
    assert_eq!(sink.lines(), vec!["A", "C", "B"]);
    assert_eq!(engine.pending_async_count(), 0);
    assert!(started.elapsed() >= Duration::from_millis(10));
}

// ─────────────────────────────────────────────────────────────────────────────
// Fault isolation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn a_failing_node_only_aborts_its_own_fiber() {
    let (registry, sink) = registry_with_sink();
    let graph = load(
        serde_json::json!({
            "name": "isolation",
            "nodes": [
                {"id": "start1", "type": "event/Start"},
                {"id": "start2", "type": "event/Start"},
                {"id": "boom", "type": "test/Explode"},
                {"id": "after_boom", "type": "debug/Log", "inputs": {"message": "unreachable"}},
                {"id": "ok", "type": "debug/Log", "inputs": {"message": "ok"}}
            ],
            "links": [
                {"from_node": "start1", "from_socket": "started",
                 "to_node": "boom", "to_socket": "exec"},
                {"from_node": "boom", "from_socket": "next",
                 "to_node": "after_boom", "to_socket": "exec"},
                {"from_node": "start2", "from_socket": "started",
                 "to_node": "ok", "to_socket": "exec"}
            ]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);

    // The healthy fiber completed and its output is observable.
    assert!(sink.lines().contains(&"ok".to_string()));
    // The failing fiber never continued past the fault.
    assert!(!sink.lines().contains(&"unreachable".to_string()));

    let faults = engine.take_faults();
    assert_eq!(faults.len(), 1);
    assert_eq!(faults[0].node_id, "boom");
    assert!(faults[0].to_string().contains("exploded on purpose"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Custom events
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn custom_events_start_their_subscribers() {
    let (registry, sink) = registry_with_sink();
    let graph = load(
        serde_json::json!({
            "name": "doors",
            "nodes": [
                {"id": "on_open", "type": "event/Custom",
                 "configuration": {"event": "door_opened"}},
                {"id": "log", "type": "debug/Log", "inputs": {"message": "opened"}}
            ],
            "links": [
                {"from_node": "on_open", "from_socket": "triggered",
                 "to_node": "log", "to_socket": "exec"}
            ],
            "custom_events": [
                {"name": "door_opened", "parameters": []}
            ]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);
    assert!(sink.lines().is_empty());

    engine.trigger_custom_event("door_opened", HashMap::new());
    engine.execute_all_sync(100);
    assert_eq!(sink.lines(), vec!["opened"]);

    // Unknown events are a quiet no-op.
    engine.trigger_custom_event("window_opened", HashMap::new());
    engine.execute_all_sync(100);
    assert_eq!(sink.lines(), vec!["opened"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Disposal
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn disposal_abandons_pending_async_operations() {
    let (registry, sink) = registry_with_sink();
    let graph = load(
        serde_json::json!({
            "name": "abandoned",
            "nodes": [
                {"id": "start", "type": "event/Start"},
                {"id": "wait", "type": "time/Delay", "inputs": {"seconds": 0.01}},
                {"id": "late", "type": "debug/Log", "inputs": {"message": "too late"}}
            ],
            "links": [
                {"from_node": "start", "from_socket": "started",
                 "to_node": "wait", "to_socket": "exec"},
                {"from_node": "wait", "from_socket": "completed",
                 "to_node": "late", "to_socket": "exec"}
            ]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.execute_all_sync(100);
    assert_eq!(engine.pending_async_count(), 1);

    engine.dispose();
    assert_eq!(engine.pending_async_count(), 0);

    // Let the spawned delay fire; its completion must be inert now.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(engine.execute_all_sync(100), 0);
    assert!(sink.lines().is_empty());
    assert!(engine.faults().is_empty());
}

#[tokio::test]
async fn disposed_engine_ignores_triggers() {
    let (registry, sink) = registry_with_sink();
    let graph = load(
        serde_json::json!({
            "name": "inert",
            "nodes": [
                {"id": "on_ping", "type": "event/Custom",
                 "configuration": {"event": "ping"}},
                {"id": "log", "type": "debug/Log", "inputs": {"message": "pong"}}
            ],
            "links": [
                {"from_node": "on_ping", "from_socket": "triggered",
                 "to_node": "log", "to_socket": "exec"}
            ],
            "custom_events": [{"name": "ping", "parameters": []}]
        }),
        &registry,
    );

    let mut engine = Engine::new(graph, registry);
    engine.dispose();
    engine.trigger_custom_event("ping", HashMap::new());
    assert_eq!(engine.execute_all_sync(100), 0);
    assert!(sink.lines().is_empty());
}
