//! Node definitions and instances
//!
//! A [`NodeSpec`] is the immutable template for a node type: sockets,
//! configuration schema, category, and the behavior kind. A [`Node`] is a
//! live instance bound to a graph, carrying concrete sockets built from the
//! template.

use serde::{Deserialize, Serialize};

use crate::socket::{Socket, SocketDirection};
use crate::value_type::FLOW_TYPE;

// ─────────────────────────────────────────────────────────────────────────────
// Node Kind
// ─────────────────────────────────────────────────────────────────────────────

/// The four behavior shapes a node can take
///
/// Closed on purpose: execution dispatches on this discriminant, and the
/// registry validation pass enforces the socket shape each kind requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Begins execution paths; no flow inputs, at least one flow output
    Event,
    /// Receives flow, performs an effect, selects the next branch
    Flow,
    /// Pure data transform, pulled on demand; no flow sockets
    Function,
    /// Starts a deferred operation; continuation arrives on a new fiber
    Async,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeKind::Event => write!(f, "event"),
            NodeKind::Flow => write!(f, "flow"),
            NodeKind::Function => write!(f, "function"),
            NodeKind::Async => write!(f, "async"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Socket Specs
// ─────────────────────────────────────────────────────────────────────────────

/// Template for one socket on a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketSpec {
    /// Socket name (used in links)
    pub name: String,
    /// Socket direction
    pub direction: SocketDirection,
    /// Value type name
    #[serde(rename = "type")]
    pub value_type: String,
    /// Default literal for input sockets, in serialized form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Optional display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Optional enumerated allowed values, in serialized form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_choices: Option<Vec<serde_json::Value>>,
}

impl SocketSpec {
    /// Flow input socket named "exec"
    pub fn flow_in() -> Self {
        Self::new("exec", SocketDirection::Input, FLOW_TYPE)
    }

    /// Flow output socket with a custom name
    pub fn flow_out(name: &str) -> Self {
        Self::new(name, SocketDirection::Output, FLOW_TYPE)
    }

    /// Data input socket
    pub fn data_in(name: &str, value_type: &str) -> Self {
        Self::new(name, SocketDirection::Input, value_type)
    }

    /// Data input socket with a default literal
    pub fn data_in_with_default(name: &str, value_type: &str, default: serde_json::Value) -> Self {
        let mut spec = Self::new(name, SocketDirection::Input, value_type);
        spec.default = Some(default);
        spec
    }

    /// Data output socket
    pub fn data_out(name: &str, value_type: &str) -> Self {
        Self::new(name, SocketDirection::Output, value_type)
    }

    fn new(name: &str, direction: SocketDirection, value_type: &str) -> Self {
        Self {
            name: name.to_string(),
            direction,
            value_type: value_type.to_string(),
            default: None,
            label: None,
            value_choices: None,
        }
    }

    /// Add a display label
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    /// Restrict the socket to enumerated values
    pub fn with_choices(mut self, choices: Vec<serde_json::Value>) -> Self {
        self.value_choices = Some(choices);
        self
    }

    /// Whether this spec describes a flow socket
    pub fn is_flow(&self) -> bool {
        self.value_type == FLOW_TYPE
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node Spec
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable template describing a node type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Globally unique type name (e.g. "flow/Branch")
    pub type_name: String,
    /// Category for palette grouping (e.g. "Flow Control", "Math")
    pub category: String,
    /// Human-readable display name
    pub label: String,
    /// Behavior kind
    pub kind: NodeKind,
    /// Socket templates
    pub sockets: Vec<SocketSpec>,
    /// Static per-instance configuration schema: key → default JSON value
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub configuration: serde_json::Map<String, serde_json::Value>,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl NodeSpec {
    /// Create a spec with no sockets or configuration
    pub fn new(type_name: &str, category: &str, label: &str, kind: NodeKind) -> Self {
        Self {
            type_name: type_name.to_string(),
            category: category.to_string(),
            label: label.to_string(),
            kind,
            sockets: Vec::new(),
            configuration: serde_json::Map::new(),
            description: None,
        }
    }

    /// Append socket templates
    pub fn with_sockets(mut self, sockets: Vec<SocketSpec>) -> Self {
        self.sockets = sockets;
        self
    }

    /// Add a configuration key with its default
    pub fn with_config(mut self, key: &str, default: serde_json::Value) -> Self {
        self.configuration.insert(key.to_string(), default);
        self
    }

    /// Add a description
    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    /// All input socket specs
    pub fn inputs(&self) -> impl Iterator<Item = &SocketSpec> {
        self.sockets
            .iter()
            .filter(|s| s.direction == SocketDirection::Input)
    }

    /// All output socket specs
    pub fn outputs(&self) -> impl Iterator<Item = &SocketSpec> {
        self.sockets
            .iter()
            .filter(|s| s.direction == SocketDirection::Output)
    }

    /// Flow input socket specs
    pub fn flow_inputs(&self) -> impl Iterator<Item = &SocketSpec> {
        self.inputs().filter(|s| s.is_flow())
    }

    /// Flow output socket specs
    pub fn flow_outputs(&self) -> impl Iterator<Item = &SocketSpec> {
        self.outputs().filter(|s| s.is_flow())
    }

    /// Data input socket specs
    pub fn data_inputs(&self) -> impl Iterator<Item = &SocketSpec> {
        self.inputs().filter(|s| !s.is_flow())
    }

    /// Data output socket specs
    pub fn data_outputs(&self) -> impl Iterator<Item = &SocketSpec> {
        self.outputs().filter(|s| !s.is_flow())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node Instance
// ─────────────────────────────────────────────────────────────────────────────

/// Position in the visual editor
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// A live node bound to a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance id within the graph
    pub id: String,
    /// Node type (references a registered [`NodeSpec`])
    #[serde(rename = "type")]
    pub type_name: String,
    /// Behavior kind, copied from the spec at instantiation
    pub kind: NodeKind,
    /// Concrete input sockets
    pub inputs: Vec<Socket>,
    /// Concrete output sockets
    pub outputs: Vec<Socket>,
    /// Concrete configuration values
    #[serde(default)]
    pub configuration: serde_json::Map<String, serde_json::Value>,
    /// Position in the visual editor
    #[serde(default)]
    pub position: Position,
}

impl Node {
    /// Get an input socket by name
    pub fn input(&self, name: &str) -> Option<&Socket> {
        self.inputs.iter().find(|s| s.name == name)
    }

    /// Get a mutable input socket by name
    pub fn input_mut(&mut self, name: &str) -> Option<&mut Socket> {
        self.inputs.iter_mut().find(|s| s.name == name)
    }

    /// Get an output socket by name
    pub fn output(&self, name: &str) -> Option<&Socket> {
        self.outputs.iter().find(|s| s.name == name)
    }

    /// Get a mutable output socket by name
    pub fn output_mut(&mut self, name: &str) -> Option<&mut Socket> {
        self.outputs.iter_mut().find(|s| s.name == name)
    }

    /// Get a configuration value
    pub fn config(&self, key: &str) -> Option<&serde_json::Value> {
        self.configuration.get(key)
    }

    /// Get a configuration value as a string
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(|v| v.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn branch_spec() -> NodeSpec {
        NodeSpec::new("flow/Branch", "Flow Control", "Branch", NodeKind::Flow)
            .with_sockets(vec![
                SocketSpec::flow_in(),
                SocketSpec::data_in_with_default("condition", "boolean", serde_json::json!(false)),
                SocketSpec::flow_out("true"),
                SocketSpec::flow_out("false"),
            ])
            .with_description("Route flow by a boolean condition")
    }

    #[test]
    fn test_socket_spec_queries() {
        let spec = branch_spec();
        assert_eq!(spec.flow_inputs().count(), 1);
        assert_eq!(spec.flow_outputs().count(), 2);
        assert_eq!(spec.data_inputs().count(), 1);
        assert_eq!(spec.data_outputs().count(), 0);
    }

    #[test]
    fn test_spec_serde_roundtrip() {
        let spec = branch_spec();
        let json = serde_json::to_string(&spec).unwrap();
        let back: NodeSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.type_name, "flow/Branch");
        assert_eq!(back.kind, NodeKind::Flow);
        assert_eq!(back.sockets.len(), 4);
    }

    #[test]
    fn test_node_socket_lookup() {
        let node = Node {
            id: "n1".to_string(),
            type_name: "flow/Branch".to_string(),
            kind: NodeKind::Flow,
            inputs: vec![Socket::new("condition", "boolean", Value::Bool(true))],
            outputs: vec![Socket::new("true", FLOW_TYPE, Value::Null)],
            configuration: serde_json::Map::new(),
            position: Position::default(),
        };

        assert!(node.input("condition").is_some());
        assert!(node.input("missing").is_none());
        assert!(node.output("true").is_some());
    }
}
