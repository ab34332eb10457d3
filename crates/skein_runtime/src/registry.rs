//! Node and value-type registry
//!
//! The registry is the assembled catalogue a session runs against: value
//! types, node definitions paired with their behaviors, the data conversion
//! table, and the host dependencies node behaviors may call out to. It is
//! built once by folding profiles (see [`crate::profile`]) and is read-only
//! during graph execution.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use skein_types::{
    ConversionTable, GraphError, Node, NodeSpec, Position, Socket, Value, ValueType, FLOW_TYPE,
};

use crate::behavior::{
    AsyncRunContext, EventInitContext, FlowTransition, FnAsyncBehavior, FnEventBehavior,
    FnFlowBehavior, FnFunctionBehavior, NodeBehavior, NodeContext,
};
use crate::error::{DefinitionError, NodeError};

// ─────────────────────────────────────────────────────────────────────────────
// Dependencies
// ─────────────────────────────────────────────────────────────────────────────

/// Named, typed host services injected into node behaviors
///
/// This is the sole extension point through which behaviors reach external
/// state; the core never hard-codes a concrete domain service.
#[derive(Default, Clone)]
pub struct Dependencies {
    entries: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Dependencies {
    /// Insert a dependency under a name
    pub fn insert<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.entries.insert(name.into(), value);
    }

    /// Look up a dependency, downcast to its concrete type
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .get(name)
            .and_then(|entry| Arc::clone(entry).downcast::<T>().ok())
    }

    /// Whether a dependency is registered under the name
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

/// Entry pairing a node definition with its behavior
struct NodeEntry {
    spec: NodeSpec,
    behavior: NodeBehavior,
}

/// Catalogue of value types and node definitions for one session
pub struct Registry {
    values: HashMap<String, Arc<ValueType>>,
    nodes: HashMap<String, NodeEntry>,
    conversions: ConversionTable,
    dependencies: Dependencies,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
            nodes: HashMap::new(),
            conversions: ConversionTable::new(),
            dependencies: Dependencies::default(),
        }
    }

    // ── Value types ──────────────────────────────────────────────────────────

    /// Register a value type. Fails on a duplicate name.
    pub fn register_value_type(&mut self, value_type: ValueType) -> Result<(), DefinitionError> {
        let name = value_type.name().to_string();
        if self.values.contains_key(&name) {
            return Err(DefinitionError::DuplicateValueType(name));
        }
        self.values.insert(name, Arc::new(value_type));
        Ok(())
    }

    /// Look up a value type by name
    pub fn value_type(&self, name: &str) -> Option<&Arc<ValueType>> {
        self.values.get(name)
    }

    /// Whether a value type is registered
    pub fn has_value_type(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate over registered value type names
    pub fn value_type_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|s| s.as_str())
    }

    // ── Node definitions ─────────────────────────────────────────────────────

    /// Register a node definition with its behavior
    ///
    /// Fails on a duplicate type name or when the behavior shape does not
    /// match the definition's declared kind.
    pub fn register(&mut self, spec: NodeSpec, behavior: NodeBehavior) -> Result<(), DefinitionError> {
        if self.nodes.contains_key(&spec.type_name) {
            return Err(DefinitionError::DuplicateTypeName(spec.type_name.clone()));
        }
        if spec.kind != behavior.kind() {
            return Err(DefinitionError::KindMismatch {
                type_name: spec.type_name.clone(),
                spec_kind: spec.kind,
                behavior_kind: behavior.kind(),
            });
        }
        self.nodes
            .insert(spec.type_name.clone(), NodeEntry { spec, behavior });
        Ok(())
    }

    /// Register an event node from an init closure
    pub fn register_event_fn<F>(&mut self, spec: NodeSpec, init: F) -> Result<(), DefinitionError>
    where
        F: Fn(&mut EventInitContext) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        self.register(spec, NodeBehavior::Event(Arc::new(FnEventBehavior::new(init))))
    }

    /// Register a flow node from a closure
    pub fn register_flow_fn<F>(&mut self, spec: NodeSpec, func: F) -> Result<(), DefinitionError>
    where
        F: Fn(&mut NodeContext, &str) -> Result<FlowTransition, NodeError> + Send + Sync + 'static,
    {
        self.register(spec, NodeBehavior::Flow(Arc::new(FnFlowBehavior::new(func))))
    }

    /// Register a function node from a closure
    pub fn register_function_fn<F>(&mut self, spec: NodeSpec, func: F) -> Result<(), DefinitionError>
    where
        F: Fn(&mut NodeContext) -> Result<(), NodeError> + Send + Sync + 'static,
    {
        self.register(
            spec,
            NodeBehavior::Function(Arc::new(FnFunctionBehavior::new(func))),
        )
    }

    /// Register an async node from a future-returning closure
    pub fn register_async_fn<F, Fut>(&mut self, spec: NodeSpec, func: F) -> Result<(), DefinitionError>
    where
        F: Fn(AsyncRunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, NodeError>> + Send + 'static,
    {
        self.register(spec, NodeBehavior::Async(Arc::new(FnAsyncBehavior::new(func))))
    }

    /// Get a node definition by type name
    pub fn spec(&self, type_name: &str) -> Option<&NodeSpec> {
        self.nodes.get(type_name).map(|e| &e.spec)
    }

    /// Get a node behavior by type name
    pub fn behavior(&self, type_name: &str) -> Option<NodeBehavior> {
        self.nodes.get(type_name).map(|e| e.behavior.clone())
    }

    /// Iterate over all node definitions
    pub fn specs(&self) -> impl Iterator<Item = &NodeSpec> {
        self.nodes.values().map(|e| &e.spec)
    }

    /// All categories, sorted and deduplicated, for palette grouping
    pub fn categories(&self) -> Vec<String> {
        let mut cats: Vec<_> = self
            .nodes
            .values()
            .map(|e| e.spec.category.clone())
            .collect();
        cats.sort();
        cats.dedup();
        cats
    }

    /// Node definitions in a category
    pub fn specs_in_category(&self, category: &str) -> Vec<&NodeSpec> {
        self.nodes
            .values()
            .filter(|e| e.spec.category == category)
            .map(|e| &e.spec)
            .collect()
    }

    /// Whether a node type is registered
    pub fn contains(&self, type_name: &str) -> bool {
        self.nodes.contains_key(type_name)
    }

    /// Number of registered node types
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node types are registered
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // ── Conversions ──────────────────────────────────────────────────────────

    /// The data conversion table
    pub fn conversions(&self) -> &ConversionTable {
        &self.conversions
    }

    /// Mutable access for profiles registering conversions
    pub fn conversions_mut(&mut self) -> &mut ConversionTable {
        &mut self.conversions
    }

    // ── Dependencies ─────────────────────────────────────────────────────────

    /// Inject a host dependency node behaviors can look up by name
    pub fn insert_dependency<T: Any + Send + Sync>(
        &mut self,
        name: impl Into<String>,
        value: Arc<T>,
    ) {
        self.dependencies.insert(name, value);
    }

    /// Look up a host dependency
    pub fn dependency<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.dependencies.get::<T>(name)
    }

    pub(crate) fn dependencies(&self) -> Dependencies {
        self.dependencies.clone()
    }

    // ── Instantiation ────────────────────────────────────────────────────────

    /// Build a node instance from a registered definition
    ///
    /// Sockets are populated from the definition: spec defaults are
    /// deserialized through the socket's value type, sockets without a
    /// default get the type's default-constructed value. Configuration
    /// starts from the definition's defaults with `configuration` overrides
    /// applied on top. A `None` id gets a fresh unique one.
    pub fn instantiate(
        &self,
        type_name: &str,
        id: Option<String>,
        configuration: serde_json::Map<String, serde_json::Value>,
        position: Position,
    ) -> Result<Node, GraphError> {
        let spec = self
            .spec(type_name)
            .ok_or_else(|| GraphError::UnknownNodeType(type_name.to_string()))?;

        let mut config = spec.configuration.clone();
        for (key, value) in configuration {
            config.insert(key, value);
        }

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for socket_spec in &spec.sockets {
            let value = self.initial_socket_value(type_name, socket_spec)?;
            let mut socket = Socket::new(&socket_spec.name, &socket_spec.value_type, value);
            socket.label = socket_spec.label.clone();
            if let Some(choices) = &socket_spec.value_choices {
                let value_type = self.socket_value_type(type_name, &socket_spec.value_type)?;
                let mut deserialized = Vec::with_capacity(choices.len());
                for choice in choices {
                    deserialized.push(self.deserialize_literal(&value_type, choice, type_name)?);
                }
                socket.value_choices = Some(deserialized);
            }
            match socket_spec.direction {
                skein_types::SocketDirection::Input => inputs.push(socket),
                skein_types::SocketDirection::Output => outputs.push(socket),
            }
        }

        Ok(Node {
            id: id.unwrap_or_else(skein_types::fresh_node_id),
            type_name: spec.type_name.clone(),
            kind: spec.kind,
            inputs,
            outputs,
            configuration: config,
            position,
        })
    }

    fn initial_socket_value(
        &self,
        type_name: &str,
        socket_spec: &skein_types::SocketSpec,
    ) -> Result<Value, GraphError> {
        if socket_spec.value_type == FLOW_TYPE {
            return Ok(Value::Null);
        }
        let value_type = self.socket_value_type(type_name, &socket_spec.value_type)?;
        match &socket_spec.default {
            Some(json) => self.deserialize_literal(&value_type, json, type_name),
            None => Ok(value_type.create()),
        }
    }

    fn socket_value_type(
        &self,
        type_name: &str,
        value_type_name: &str,
    ) -> Result<Arc<ValueType>, GraphError> {
        self.value_type(value_type_name).cloned().ok_or_else(|| {
            tracing::error!(
                node_type = type_name,
                value_type = value_type_name,
                "socket references unregistered value type"
            );
            GraphError::UnknownValueType(value_type_name.to_string())
        })
    }

    fn deserialize_literal(
        &self,
        value_type: &ValueType,
        json: &serde_json::Value,
        context: &str,
    ) -> Result<Value, GraphError> {
        value_type
            .deserialize(json)
            .map_err(|source| GraphError::InvalidValue {
                context: context.to_string(),
                source,
            })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
