//! Sockets and links
//!
//! A socket is a named, typed slot on a node. Input sockets hold a literal
//! value until a link drives them; output sockets own the links fanning out
//! of them. Links address their target by `(node id, socket name)` — the
//! graph's id-keyed arena resolves them during execution, and nothing
//! resolved is ever serialized.

use serde::{Deserialize, Serialize};

use crate::value::Value;
use crate::value_type::FLOW_TYPE;

// ─────────────────────────────────────────────────────────────────────────────
// Link
// ─────────────────────────────────────────────────────────────────────────────

/// Directed edge from an output socket to a named input socket on a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Target node id
    pub node_id: String,
    /// Target input socket name
    pub socket: String,
}

impl Link {
    /// Create a link targeting `socket` on `node_id`
    pub fn new(node_id: impl Into<String>, socket: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            socket: socket.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Socket
// ─────────────────────────────────────────────────────────────────────────────

/// Direction of a socket on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketDirection {
    Input,
    Output,
}

/// A concrete, named, typed slot on a node instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Socket {
    /// Socket name, unique within the node's input or output set
    pub name: String,
    /// Value type name; must resolve in the active registry
    pub value_type: String,
    /// Current literal value (meaningless for flow sockets)
    pub value: Value,
    /// Optional display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Optional enumerated allowed values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_choices: Option<Vec<Value>>,
    /// Outgoing links, in creation order. Only populated on output sockets;
    /// an input socket's incoming link lives on its source output socket.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<Link>,
}

impl Socket {
    /// Create a socket with an initial literal value
    pub fn new(
        name: impl Into<String>,
        value_type: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            value,
            label: None,
            value_choices: None,
            links: Vec::new(),
        }
    }

    /// Whether this socket carries execution control rather than data
    pub fn is_flow(&self) -> bool {
        self.value_type == FLOW_TYPE
    }

    /// Whether this socket carries data
    pub fn is_data(&self) -> bool {
        !self.is_flow()
    }

    /// Append an outgoing link, preserving creation order
    pub fn push_link(&mut self, link: Link) {
        self.links.push(link);
    }

    /// Remove every outgoing link targeting the given node
    pub fn remove_links_to_node(&mut self, node_id: &str) {
        self.links.retain(|l| l.node_id != node_id);
    }

    /// Remove the outgoing link targeting the given socket, if present
    pub fn remove_link_to(&mut self, node_id: &str, socket: &str) {
        self.links
            .retain(|l| !(l.node_id == node_id && l.socket == socket));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
