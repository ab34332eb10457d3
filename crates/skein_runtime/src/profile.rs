//! Profiles and registry assembly
//!
//! A profile installs a self-consistent bundle of value types and node
//! definitions into a registry. [`create_registry`] folds an ordered list of
//! profiles starting from an empty registry, then validates the result as a
//! whole. Validation problems are collected into a list so every issue
//! surfaces in one pass rather than one startup failure at a time.

use skein_types::NodeKind;

use crate::error::DefinitionError;
use crate::registry::Registry;

// ─────────────────────────────────────────────────────────────────────────────
// Profile
// ─────────────────────────────────────────────────────────────────────────────

/// A composable bundle of value types and node definitions
pub trait Profile: Send + Sync {
    /// Profile name, used in dependency diagnostics
    fn name(&self) -> &str;

    /// Install this profile's registrations into the registry
    ///
    /// Implementations should call [`require_value_type`] up front for every
    /// foreign value type they build on, so a mis-ordered profile list fails
    /// with a descriptive error instead of a confusing downstream one.
    fn install(&self, registry: &mut Registry) -> Result<(), DefinitionError>;
}

/// Closure-backed profile
pub struct FnProfile<F>
where
    F: Fn(&mut Registry) -> Result<(), DefinitionError> + Send + Sync,
{
    name: String,
    install: F,
}

impl<F> FnProfile<F>
where
    F: Fn(&mut Registry) -> Result<(), DefinitionError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, install: F) -> Self {
        Self {
            name: name.into(),
            install,
        }
    }
}

impl<F> Profile for FnProfile<F>
where
    F: Fn(&mut Registry) -> Result<(), DefinitionError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn install(&self, registry: &mut Registry) -> Result<(), DefinitionError> {
        (self.install)(registry)
    }
}

/// Assert that a value type another profile should have registered exists
pub fn require_value_type(
    registry: &Registry,
    profile: &str,
    type_name: &str,
) -> Result<(), DefinitionError> {
    if registry.has_value_type(type_name) {
        Ok(())
    } else {
        Err(DefinitionError::MissingDependency {
            profile: profile.to_string(),
            type_name: type_name.to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assembly
// ─────────────────────────────────────────────────────────────────────────────

/// Fold profiles into a registry, then validate it
///
/// Installation is ordered; a profile that fails to install contributes its
/// error and the fold continues with the remaining profiles so the caller
/// sees every problem at once. Any error at all means no registry.
pub fn create_registry(profiles: &[&dyn Profile]) -> Result<Registry, Vec<DefinitionError>> {
    let mut registry = Registry::new();
    let mut errors = Vec::new();

    for profile in profiles {
        if let Err(e) = profile.install(&mut registry) {
            tracing::error!(profile = profile.name(), error = %e, "profile failed to install");
            errors.push(e);
        }
    }

    errors.extend(validate(&registry));

    if errors.is_empty() {
        tracing::info!(
            node_types = registry.len(),
            value_types = registry.value_type_names().count(),
            "registry assembled"
        );
        Ok(registry)
    } else {
        Err(errors)
    }
}

/// Whole-registry validation pass
///
/// Checks every socket's value type resolves, conversion entries name
/// registered types, and each definition has the socket shape its kind
/// requires. Duplicate type names are caught earlier, at registration.
pub fn validate(registry: &Registry) -> Vec<DefinitionError> {
    let mut errors = Vec::new();

    for spec in registry.specs() {
        for socket in &spec.sockets {
            if socket.value_type != skein_types::FLOW_TYPE
                && !registry.has_value_type(&socket.value_type)
            {
                errors.push(DefinitionError::UnknownSocketValueType {
                    type_name: spec.type_name.clone(),
                    socket: socket.name.clone(),
                    value_type: socket.value_type.clone(),
                });
            }
        }

        let flow_inputs = spec.flow_inputs().count();
        let flow_outputs = spec.flow_outputs().count();
        let shape_problem = match spec.kind {
            NodeKind::Event => {
                if flow_inputs > 0 {
                    Some("an event node cannot have a flow input")
                } else if flow_outputs == 0 {
                    Some("an event node needs at least one flow output")
                } else {
                    None
                }
            }
            NodeKind::Flow => {
                if flow_inputs == 0 {
                    Some("a flow node needs at least one flow input")
                } else {
                    None
                }
            }
            NodeKind::Function => {
                if flow_inputs > 0 || flow_outputs > 0 {
                    Some("a function node cannot have flow sockets")
                } else {
                    None
                }
            }
            NodeKind::Async => {
                if flow_inputs != 1 {
                    Some("an async node needs exactly one flow input")
                } else if flow_outputs == 0 {
                    Some("an async node needs at least one flow output")
                } else {
                    None
                }
            }
        };
        if let Some(reason) = shape_problem {
            errors.push(DefinitionError::MalformedSpec {
                type_name: spec.type_name.clone(),
                reason: reason.to_string(),
            });
        }
    }

    for (source, target) in registry.conversions().pairs() {
        for name in [source, target] {
            if !registry.has_value_type(name) {
                errors.push(DefinitionError::MalformedConversion {
                    src: source.to_string(),
                    target: target.to_string(),
                    missing: name.to_string(),
                });
            }
        }
    }

    errors
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
