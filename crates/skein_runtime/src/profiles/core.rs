//! Core profile
//!
//! Registers the base value types (flow, boolean, integer, float, string),
//! the standard conversion table, and the generic node catalogue: lifecycle
//! and custom events, flow control, debug logging, variable access, basic
//! math and logic, string concatenation, and a time delay.

use std::time::Duration;

use parking_lot::Mutex;

use skein_types::{NodeKind, NodeSpec, SocketSpec, Value, ValueError, ValueType};

use crate::behavior::FlowTransition;
use crate::error::{DefinitionError, NodeError};
use crate::profile::Profile;
use crate::registry::Registry;

/// Dependency name under which a [`LogSink`] is looked up by `debug/Log`
pub const LOG_SINK: &str = "log_sink";

/// Collector for `debug/Log` output, injectable as a registry dependency
///
/// Without one registered, log nodes still emit through `tracing`.
#[derive(Default)]
pub struct LogSink {
    lines: Mutex<Vec<String>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line
    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    /// Snapshot of everything logged so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Profile
// ─────────────────────────────────────────────────────────────────────────────

/// The core profile
pub struct CoreProfile;

impl Profile for CoreProfile {
    fn name(&self) -> &str {
        "core"
    }

    fn install(&self, registry: &mut Registry) -> Result<(), DefinitionError> {
        register_value_types(registry)?;
        register_conversions(registry);
        register_event_nodes(registry)?;
        register_flow_nodes(registry)?;
        register_variable_nodes(registry)?;
        register_function_nodes(registry)?;
        register_async_nodes(registry)?;

        tracing::info!(node_types = registry.len(), "core profile installed");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value Types
// ─────────────────────────────────────────────────────────────────────────────

fn register_value_types(registry: &mut Registry) -> Result<(), DefinitionError> {
    // Flow sockets carry no data; the entry exists so the name resolves.
    registry.register_value_type(
        ValueType::builder(skein_types::FLOW_TYPE)
            .create(|| Value::Null)
            .serialize(|_| serde_json::Value::Null)
            .deserialize(|_| Ok(Value::Null))
            .equals(|_, _| true)
            .build(),
    )?;

    registry.register_value_type(
        ValueType::builder("boolean")
            .create(|| Value::Bool(false))
            .deserialize(|json| {
                json.as_bool()
                    .map(Value::Bool)
                    .ok_or_else(|| deserialize_error("boolean", json))
            })
            .build(),
    )?;

    registry.register_value_type(
        ValueType::builder("integer")
            .create(|| Value::Int(0))
            .deserialize(|json| {
                json.as_i64()
                    .map(Value::Int)
                    .ok_or_else(|| deserialize_error("integer", json))
            })
            .lerp(|a, b, t| {
                let a = a.as_i64().unwrap_or(0);
                let b = b.as_i64().unwrap_or(0);
                Value::Int(a + ((b - a) as f64 * t).round() as i64)
            })
            .build(),
    )?;

    registry.register_value_type(
        ValueType::builder("float")
            .create(|| Value::Float(0.0))
            .deserialize(|json| {
                json.as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| deserialize_error("float", json))
            })
            .equals(|a, b| a.as_f64() == b.as_f64())
            .lerp(|a, b, t| {
                let a = a.as_f64().unwrap_or(0.0);
                let b = b.as_f64().unwrap_or(0.0);
                Value::Float(a + (b - a) * t)
            })
            .build(),
    )?;

    registry.register_value_type(
        ValueType::builder("string")
            .create(|| Value::String(String::new()))
            .deserialize(|json| {
                json.as_str()
                    .map(Value::from)
                    .ok_or_else(|| deserialize_error("string", json))
            })
            .build(),
    )?;

    Ok(())
}

fn deserialize_error(type_name: &str, json: &serde_json::Value) -> ValueError {
    ValueError::Deserialize {
        type_name: type_name.to_string(),
        json: json.to_string(),
    }
}

fn register_conversions(registry: &mut Registry) {
    let conversions = registry.conversions_mut();
    conversions.register("integer", "float", |v| {
        Value::Float(v.as_i64().unwrap_or(0) as f64)
    });
    conversions.register("integer", "string", |v| {
        Value::String(v.as_i64().unwrap_or(0).to_string())
    });
    conversions.register("float", "string", |v| {
        Value::String(v.as_f64().unwrap_or(0.0).to_string())
    });
    conversions.register("boolean", "string", |v| {
        Value::String(v.as_bool().unwrap_or(false).to_string())
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Nodes
// ─────────────────────────────────────────────────────────────────────────────

fn register_event_nodes(registry: &mut Registry) -> Result<(), DefinitionError> {
    // Fires once when the engine starts running.
    registry.register_event_fn(
        NodeSpec::new("event/Start", "Events", "On Start", NodeKind::Event)
            .with_sockets(vec![SocketSpec::flow_out("started")])
            .with_description("Fires once when the engine starts"),
        |ctx| {
            ctx.fire("started");
            Ok(())
        },
    )?;

    // Fires whenever the named graph-level custom event is triggered.
    registry.register_event_fn(
        NodeSpec::new("event/Custom", "Events", "On Custom Event", NodeKind::Event)
            .with_sockets(vec![SocketSpec::flow_out("triggered")])
            .with_config("event", serde_json::json!(""))
            .with_description("Fires when the named custom event is triggered"),
        |ctx| {
            let event = ctx
                .config_str("event")
                .map(str::to_string)
                .filter(|e| !e.is_empty())
                .ok_or_else(|| NodeError::failed("event/Custom requires an event name"))?;
            ctx.subscribe_custom_event(&event, "triggered");
            Ok(())
        },
    )?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Flow Nodes
// ─────────────────────────────────────────────────────────────────────────────

fn register_flow_nodes(registry: &mut Registry) -> Result<(), DefinitionError> {
    registry.register_flow_fn(
        NodeSpec::new("flow/Branch", "Flow Control", "Branch", NodeKind::Flow)
            .with_sockets(vec![
                SocketSpec::flow_in(),
                SocketSpec::data_in_with_default("condition", "boolean", serde_json::json!(false)),
                SocketSpec::flow_out("true"),
                SocketSpec::flow_out("false"),
            ])
            .with_description("Route flow by a boolean condition"),
        |ctx, _| {
            Ok(if ctx.input_bool("condition").unwrap_or(false) {
                FlowTransition::to("true")
            } else {
                FlowTransition::to("false")
            })
        },
    )?;

    // Fan-out from "then" runs one fiber per outgoing link, in link
    // creation order.
    registry.register_flow_fn(
        NodeSpec::new("flow/Sequence", "Flow Control", "Sequence", NodeKind::Flow)
            .with_sockets(vec![SocketSpec::flow_in(), SocketSpec::flow_out("then")])
            .with_description("Run each connected path in order"),
        |_, _| Ok(FlowTransition::to("then")),
    )?;

    registry.register_flow_fn(
        NodeSpec::new("debug/Log", "Debug", "Log", NodeKind::Flow)
            .with_sockets(vec![
                SocketSpec::flow_in(),
                SocketSpec::data_in_with_default("message", "string", serde_json::json!("")),
                SocketSpec::flow_out("next"),
            ])
            .with_description("Write a message to the log"),
        |ctx, _| {
            let message = ctx.input_str("message").unwrap_or_default().to_string();
            tracing::info!(target: "skein::script", node_id = ctx.node_id(), "{message}");
            if let Some(sink) = ctx.dependency::<LogSink>(LOG_SINK) {
                sink.push(message);
            }
            Ok(FlowTransition::to("next"))
        },
    )?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Variable Nodes
// ─────────────────────────────────────────────────────────────────────────────

/// Base data types variable accessors are stamped out for
const VARIABLE_TYPES: [&str; 4] = ["boolean", "integer", "float", "string"];

fn register_variable_nodes(registry: &mut Registry) -> Result<(), DefinitionError> {
    for ty in VARIABLE_TYPES {
        registry.register_function_fn(
            NodeSpec::new(
                &format!("variable/Get/{ty}"),
                "Variables",
                &format!("Get {ty} Variable"),
                NodeKind::Function,
            )
            .with_sockets(vec![SocketSpec::data_out("value", ty)])
            .with_config("variable", serde_json::json!("")),
            |ctx| {
                let name = ctx
                    .config_str("variable")
                    .map(str::to_string)
                    .ok_or_else(|| NodeError::failed("variable/Get requires a variable name"))?;
                let value = ctx
                    .variable(&name)
                    .ok_or_else(|| NodeError::failed(format!("unknown variable: {name}")))?;
                ctx.set_output("value", value);
                Ok(())
            },
        )?;

        registry.register_flow_fn(
            NodeSpec::new(
                &format!("variable/Set/{ty}"),
                "Variables",
                &format!("Set {ty} Variable"),
                NodeKind::Flow,
            )
            .with_sockets(vec![
                SocketSpec::flow_in(),
                SocketSpec::data_in("value", ty),
                SocketSpec::flow_out("next"),
            ])
            .with_config("variable", serde_json::json!("")),
            |ctx, _| {
                let name = ctx
                    .config_str("variable")
                    .map(str::to_string)
                    .ok_or_else(|| NodeError::failed("variable/Set requires a variable name"))?;
                let value = ctx.input("value").cloned().unwrap_or_default();
                ctx.set_variable(&name, value)?;
                Ok(FlowTransition::to("next"))
            },
        )?;
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Function Nodes
// ─────────────────────────────────────────────────────────────────────────────

fn register_function_nodes(registry: &mut Registry) -> Result<(), DefinitionError> {
    let binary_float: [(&str, &str, fn(f64, f64) -> f64); 4] = [
        ("math/Add", "Add", |a, b| a + b),
        ("math/Subtract", "Subtract", |a, b| a - b),
        ("math/Multiply", "Multiply", |a, b| a * b),
        // Guarded below; division by zero yields zero rather than a fault.
        ("math/Divide", "Divide", |a, b| if b != 0.0 { a / b } else { 0.0 }),
    ];
    for (type_name, label, op) in binary_float {
        registry.register_function_fn(
            NodeSpec::new(type_name, "Math", label, NodeKind::Function).with_sockets(vec![
                SocketSpec::data_in("a", "float"),
                SocketSpec::data_in("b", "float"),
                SocketSpec::data_out("result", "float"),
            ]),
            move |ctx| {
                let a = ctx.input_f64("a").unwrap_or(0.0);
                let b = ctx.input_f64("b").unwrap_or(0.0);
                ctx.set_output("result", op(a, b));
                Ok(())
            },
        )?;
    }

    let comparisons: [(&str, &str, fn(f64, f64) -> bool); 2] = [
        ("math/Equal", "Equal", |a, b| a == b),
        ("math/Greater", "Greater", |a, b| a > b),
    ];
    for (type_name, label, op) in comparisons {
        registry.register_function_fn(
            NodeSpec::new(type_name, "Math", label, NodeKind::Function).with_sockets(vec![
                SocketSpec::data_in("a", "float"),
                SocketSpec::data_in("b", "float"),
                SocketSpec::data_out("result", "boolean"),
            ]),
            move |ctx| {
                let a = ctx.input_f64("a").unwrap_or(0.0);
                let b = ctx.input_f64("b").unwrap_or(0.0);
                ctx.set_output("result", op(a, b));
                Ok(())
            },
        )?;
    }

    registry.register_function_fn(
        NodeSpec::new("logic/And", "Logic", "And", NodeKind::Function).with_sockets(vec![
            SocketSpec::data_in("a", "boolean"),
            SocketSpec::data_in("b", "boolean"),
            SocketSpec::data_out("result", "boolean"),
        ]),
        |ctx| {
            let a = ctx.input_bool("a").unwrap_or(false);
            let b = ctx.input_bool("b").unwrap_or(false);
            ctx.set_output("result", a && b);
            Ok(())
        },
    )?;

    registry.register_function_fn(
        NodeSpec::new("logic/Not", "Logic", "Not", NodeKind::Function).with_sockets(vec![
            SocketSpec::data_in("value", "boolean"),
            SocketSpec::data_out("result", "boolean"),
        ]),
        |ctx| {
            let value = ctx.input_bool("value").unwrap_or(false);
            ctx.set_output("result", !value);
            Ok(())
        },
    )?;

    registry.register_function_fn(
        NodeSpec::new("string/Concat", "String", "Concat", NodeKind::Function).with_sockets(vec![
            SocketSpec::data_in("a", "string"),
            SocketSpec::data_in("b", "string"),
            SocketSpec::data_out("result", "string"),
        ]),
        |ctx| {
            let mut result = ctx.input_str("a").unwrap_or_default().to_string();
            result.push_str(ctx.input_str("b").unwrap_or_default());
            ctx.set_output("result", result);
            Ok(())
        },
    )?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Async Nodes
// ─────────────────────────────────────────────────────────────────────────────

fn register_async_nodes(registry: &mut Registry) -> Result<(), DefinitionError> {
    registry.register_async_fn(
        NodeSpec::new("time/Delay", "Time", "Delay", NodeKind::Async)
            .with_sockets(vec![
                SocketSpec::flow_in(),
                SocketSpec::data_in_with_default("seconds", "float", serde_json::json!(1.0)),
                SocketSpec::flow_out("completed"),
            ])
            .with_description("Continue after a delay without blocking other paths"),
        |ctx| async move {
            let seconds = ctx.input_f64("seconds").unwrap_or(0.0).max(0.0);
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
            Ok("completed".to_string())
        },
    )?;

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::create_registry;

    fn core_registry() -> Registry {
        create_registry(&[&CoreProfile]).expect("core profile must validate")
    }

    #[test]
    fn test_core_profile_validates() {
        let registry = core_registry();
        assert!(registry.contains("event/Start"));
        assert!(registry.contains("flow/Branch"));
        assert!(registry.contains("time/Delay"));
        assert!(registry.has_value_type("float"));
        assert!(registry.categories().contains(&"Math".to_string()));
    }

    #[test]
    fn test_value_round_trips() {
        let registry = core_registry();

        let cases: Vec<(&str, Vec<Value>)> = vec![
            ("boolean", vec![Value::Bool(false), Value::Bool(true)]),
            (
                "integer",
                vec![
                    Value::Int(0),
                    Value::Int(-1),
                    Value::Int(i64::MAX),
                    Value::Int(i64::MIN),
                ],
            ),
            (
                "float",
                vec![
                    Value::Float(0.0),
                    Value::Float(-2.5),
                    Value::Float(1.0e300),
                    Value::Float(f64::MIN_POSITIVE),
                ],
            ),
            (
                "string",
                vec![Value::from(""), Value::from("hello"), Value::from("söckét")],
            ),
        ];

        for (type_name, values) in cases {
            let ty = registry.value_type(type_name).unwrap();
            // Default round-trips too.
            let default = ty.create();
            let json = ty.serialize(&default);
            assert!(ty.equals(&default, &ty.deserialize(&json).unwrap()));

            for v in values {
                let json = ty.serialize(&v);
                let back = ty.deserialize(&json).unwrap();
                assert!(
                    ty.equals(&v, &back),
                    "{type_name} value {v:?} did not round-trip"
                );
            }
        }
    }

    #[test]
    fn test_clone_value_independent() {
        let registry = core_registry();
        let ty = registry.value_type("string").unwrap();

        let source = Value::from("original");
        let mut cloned = ty.clone_value(&source);
        if let Value::String(s) = &mut cloned {
            s.push_str("-mutated");
        }
        assert_eq!(source.as_str(), Some("original"));
    }

    #[test]
    fn test_standard_conversions() {
        let registry = core_registry();
        let table = registry.conversions();

        assert!(table.compatible("integer", "float"));
        assert!(table.compatible("integer", "string"));
        assert!(table.compatible("float", "string"));
        assert!(table.compatible("boolean", "string"));
        // Directional, no chaining, no inventions.
        assert!(!table.compatible("float", "integer"));
        assert!(!table.compatible("string", "integer"));
        assert!(!table.compatible("string", "boolean"));

        let converted = table
            .convert("integer", "float", &Value::Int(3))
            .unwrap();
        assert_eq!(converted.as_f64(), Some(3.0));
    }

    #[test]
    fn test_integer_lerp_rounds() {
        let registry = core_registry();
        let ty = registry.value_type("integer").unwrap();
        let mid = ty.lerp(&Value::Int(0), &Value::Int(10), 0.45);
        assert_eq!(mid.as_i64(), Some(5)); // 4.5 rounds up
    }

    #[test]
    fn test_deserialize_rejects_wrong_shape() {
        let registry = core_registry();
        let ty = registry.value_type("integer").unwrap();
        assert!(ty.deserialize(&serde_json::json!("nope")).is_err());
    }
}
