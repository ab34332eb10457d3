//! Runtime error taxonomy
//!
//! Definition errors are fatal and collected at registry-build time; node
//! errors abort the owning fiber only and are surfaced to the host as
//! faults.

use skein_types::NodeKind;

// ─────────────────────────────────────────────────────────────────────────────
// Definition Errors
// ─────────────────────────────────────────────────────────────────────────────

/// A malformed node definition, value type, or profile
///
/// Raised while assembling a registry. Validation reports every instance as
/// a list so all problems surface together; any one of them aborts startup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DefinitionError {
    #[error("Duplicate node type name: {0}")]
    DuplicateTypeName(String),

    #[error("Duplicate value type name: {0}")]
    DuplicateValueType(String),

    #[error("Node type {type_name} declares kind {spec_kind} but its behavior is {behavior_kind}")]
    KindMismatch {
        type_name: String,
        spec_kind: NodeKind,
        behavior_kind: NodeKind,
    },

    #[error("Node type {type_name}: socket {socket} uses unregistered value type {value_type}")]
    UnknownSocketValueType {
        type_name: String,
        socket: String,
        value_type: String,
    },

    #[error("Node type {type_name} is malformed: {reason}")]
    MalformedSpec { type_name: String, reason: String },

    #[error("Conversion {src} -> {target} references unregistered value type {missing}")]
    MalformedConversion {
        src: String,
        target: String,
        missing: String,
    },

    #[error("Profile {profile} requires value type {type_name}, which is not registered")]
    MissingDependency {
        profile: String,
        type_name: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Node Errors
// ─────────────────────────────────────────────────────────────────────────────

/// A failure inside a node behavior or while dispatching to one
///
/// These abort the owning fiber; sibling fibers are unaffected.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeError {
    #[error("{0}")]
    Failed(String),

    #[error("No behavior registered for node type: {0}")]
    UnregisteredType(String),

    #[error("Node kind {0} cannot receive flow")]
    NotFlowTarget(NodeKind),

    #[error("Data resolution exceeded depth limit at node {0}")]
    ResolveDepthExceeded(String),
}

impl NodeError {
    /// Shorthand for a general behavior failure
    pub fn failed(message: impl Into<String>) -> Self {
        NodeError::Failed(message.into())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node Faults
// ─────────────────────────────────────────────────────────────────────────────

/// A recorded runtime failure, attributed to the offending node
///
/// The engine keeps faults for the host to inspect; one fault never halts
/// unrelated execution paths.
#[derive(Debug, Clone)]
pub struct NodeFault {
    /// Id of the node whose behavior failed
    pub node_id: String,
    /// What went wrong
    pub error: NodeError,
}

impl std::fmt::Display for NodeFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {}: {}", self.node_id, self.error)
    }
}
