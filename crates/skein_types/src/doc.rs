//! Serialized graph documents
//!
//! The persisted, JSON-compatible form of a graph. Literal input values are
//! stored per socket; an input driven by a link stores no value at all.
//! Loading and saving against a registry live in the runtime crate — these
//! structs are the pure document shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::EventParam;
use crate::node::Position;

// ─────────────────────────────────────────────────────────────────────────────
// Document Nodes & Links
// ─────────────────────────────────────────────────────────────────────────────

/// One node in a graph document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDoc {
    /// Node instance id
    pub id: String,
    /// Node type name (resolved against the registry on load)
    #[serde(rename = "type")]
    pub type_name: String,
    /// Editor position
    #[serde(default)]
    pub position: Position,
    /// Configuration values
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub configuration: serde_json::Map<String, serde_json::Value>,
    /// Literal input values by socket name; a socket absent here is either
    /// link-driven or left at its spec default
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, serde_json::Value>,
}

/// One link in a graph document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkDoc {
    /// Source node id
    pub from_node: String,
    /// Source output socket name
    pub from_socket: String,
    /// Target node id
    pub to_node: String,
    /// Target input socket name
    pub to_socket: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Document Variables & Events
// ─────────────────────────────────────────────────────────────────────────────

/// One graph variable in a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDoc {
    /// Variable name
    pub name: String,
    /// Value type name
    pub value_type: String,
    /// Serialized current value
    pub value: serde_json::Value,
}

/// One custom event declaration in a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomEventDoc {
    /// Event name
    pub name: String,
    /// Payload parameters
    #[serde(default)]
    pub parameters: Vec<EventParam>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph Document
// ─────────────────────────────────────────────────────────────────────────────

/// Complete serialized graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Graph name
    pub name: String,
    /// Nodes
    #[serde(default)]
    pub nodes: Vec<NodeDoc>,
    /// Links, in creation order per source socket
    #[serde(default)]
    pub links: Vec<LinkDoc>,
    /// Variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableDoc>,
    /// Custom event declarations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub custom_events: Vec<CustomEventDoc>,
}

impl GraphDocument {
    /// Create an empty document
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            links: Vec::new(),
            variables: Vec::new(),
            custom_events: Vec::new(),
        }
    }

    /// Get a node entry by id
    pub fn node(&self, id: &str) -> Option<&NodeDoc> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
