//! Structural errors for the graph data model

// ─────────────────────────────────────────────────────────────────────────────
// Value Error
// ─────────────────────────────────────────────────────────────────────────────

/// Error converting a [`crate::Value`] to or from a concrete shape
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValueError {
    #[error("Expected {expected}, got {actual}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Cannot deserialize {type_name} from {json}")]
    Deserialize { type_name: String, json: String },
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph Error
// ─────────────────────────────────────────────────────────────────────────────

/// Integrity errors raised by graph mutation and document loading
///
/// These are rejected synchronously at the API boundary; the graph is left
/// unmodified when any of them is returned.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Unknown value type: {0}")]
    UnknownValueType(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    #[error("Node {node_id} has no {direction} socket named {socket}")]
    SocketNotFound {
        node_id: String,
        socket: String,
        direction: &'static str,
    },

    #[error("Cannot connect {source_type} to {target_type}: no conversion registered")]
    IncompatibleTypes {
        source_type: String,
        target_type: String,
    },

    #[error("Cannot connect a flow socket to a data socket")]
    FlowDataMismatch,

    #[error("Variable not found: {0}")]
    VariableNotFound(String),

    #[error("Custom event already declared: {0}")]
    DuplicateCustomEvent(String),

    #[error("Invalid value for {context}: {source}")]
    InvalidValue {
        context: String,
        source: ValueError,
    },
}
