//! Node behaviors and the contexts they execute against
//!
//! A behavior is the runtime half of a node definition. The four kinds form
//! a closed union dispatched on [`NodeKind`]; each kind has its own trait
//! with a contract matching its role in execution. Closure adapters let
//! simple nodes register without a named type.
//!
//! Behaviors never see the graph. The engine resolves data inputs into a
//! context, the behavior computes and writes outputs into the context, and
//! the engine copies them back. Branch selection is the return value of a
//! flow behavior, so a behavior cannot forget to decide where flow goes.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use skein_types::{NodeKind, SharedVariables, Value};

use crate::error::NodeError;
use crate::handle::{EngineMailbox, EventTrigger};
use crate::registry::Dependencies;

// ─────────────────────────────────────────────────────────────────────────────
// Flow Transition
// ─────────────────────────────────────────────────────────────────────────────

/// Where a flow behavior sends execution next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowTransition {
    /// Continue along the links of the named output flow socket
    Continue(String),
    /// End this execution path
    End,
}

impl FlowTransition {
    /// Continue from the given output socket
    pub fn to(socket: &str) -> Self {
        FlowTransition::Continue(socket.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context passed to flow and function behaviors
///
/// Inputs arrive fully resolved; outputs written here are copied back onto
/// the node's output sockets after the behavior returns.
pub struct NodeContext {
    node_id: String,
    config: serde_json::Map<String, serde_json::Value>,
    inputs: HashMap<String, Value>,
    outputs: HashMap<String, Value>,
    variables: SharedVariables,
    dependencies: Dependencies,
}

impl NodeContext {
    pub(crate) fn new(
        node_id: String,
        config: serde_json::Map<String, serde_json::Value>,
        inputs: HashMap<String, Value>,
        variables: SharedVariables,
        dependencies: Dependencies,
    ) -> Self {
        Self {
            node_id,
            config,
            inputs,
            outputs: HashMap::new(),
            variables,
            dependencies,
        }
    }

    /// Id of the executing node
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get a resolved input value by socket name
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// Get input as f64
    pub fn input_f64(&self, name: &str) -> Option<f64> {
        self.inputs.get(name).and_then(|v| v.as_f64())
    }

    /// Get input as i64
    pub fn input_i64(&self, name: &str) -> Option<i64> {
        self.inputs.get(name).and_then(|v| v.as_i64())
    }

    /// Get input as bool
    pub fn input_bool(&self, name: &str) -> Option<bool> {
        self.inputs.get(name).and_then(|v| v.as_bool())
    }

    /// Get input as string
    pub fn input_str(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).and_then(|v| v.as_str())
    }

    /// Write an output value by socket name
    pub fn set_output(&mut self, name: &str, value: impl Into<Value>) {
        self.outputs.insert(name.to_string(), value.into());
    }

    /// Get a configuration value
    pub fn config(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }

    /// Get config as string
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Get config as f64
    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(|v| v.as_f64())
    }

    /// Get config as bool
    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(|v| v.as_bool())
    }

    /// Read a graph variable
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).map(|v| v.value.clone())
    }

    /// Write a declared graph variable. Fails if the variable was never
    /// declared; behaviors do not mint new variables.
    pub fn set_variable(&mut self, name: &str, value: Value) -> Result<(), NodeError> {
        let mut vars = self.variables.write();
        match vars.get_mut(name) {
            Some(var) => {
                var.value = value;
                Ok(())
            }
            None => Err(NodeError::failed(format!("unknown variable: {name}"))),
        }
    }

    /// Look up a typed host dependency by name
    pub fn dependency<T: std::any::Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.dependencies.get::<T>(name)
    }

    pub(crate) fn into_outputs(self) -> HashMap<String, Value> {
        self.outputs
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Init Context
// ─────────────────────────────────────────────────────────────────────────────

/// Context passed to an event behavior's `init`, once per engine lifetime
///
/// The behavior wires its trigger source here: fire an output immediately,
/// subscribe to a named custom event, or hand a clonable [`EventTrigger`]
/// to an external source.
pub struct EventInitContext {
    node_id: String,
    config: serde_json::Map<String, serde_json::Value>,
    mailbox: EngineMailbox,
    custom_subscriptions: Vec<(String, String)>,
}

impl EventInitContext {
    pub(crate) fn new(
        node_id: String,
        config: serde_json::Map<String, serde_json::Value>,
        mailbox: EngineMailbox,
    ) -> Self {
        Self {
            node_id,
            config,
            mailbox,
            custom_subscriptions: Vec::new(),
        }
    }

    /// Id of the event node being initialized
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get a configuration value
    pub fn config(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }

    /// Get config as string
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(|v| v.as_str())
    }

    /// Request an execution path from the named output socket as soon as the
    /// engine runs
    pub fn fire(&self, output_socket: &str) {
        self.mailbox.post(crate::handle::EngineMessage::Trigger {
            node_id: self.node_id.clone(),
            socket: output_socket.to_string(),
        });
    }

    /// Start fibers from the named output socket whenever the graph-level
    /// custom event `event` is triggered
    pub fn subscribe_custom_event(&mut self, event: &str, output_socket: &str) {
        self.custom_subscriptions
            .push((event.to_string(), output_socket.to_string()));
    }

    /// Obtain a clonable trigger handle for an external source. The handle
    /// goes inert when the engine is disposed.
    pub fn external_trigger(&self, output_socket: &str) -> EventTrigger {
        EventTrigger::new(
            self.mailbox.clone(),
            self.node_id.clone(),
            output_socket.to_string(),
        )
    }

    pub(crate) fn take_custom_subscriptions(self) -> Vec<(String, String)> {
        self.custom_subscriptions
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Async Run Context
// ─────────────────────────────────────────────────────────────────────────────

/// Owned context for an async behavior's deferred operation
///
/// Fully owned so the engine can move it into a spawned task; the behavior
/// resolves with the output flow socket to continue from.
pub struct AsyncRunContext {
    node_id: String,
    config: serde_json::Map<String, serde_json::Value>,
    inputs: HashMap<String, Value>,
    variables: SharedVariables,
    dependencies: Dependencies,
}

impl AsyncRunContext {
    pub(crate) fn new(
        node_id: String,
        config: serde_json::Map<String, serde_json::Value>,
        inputs: HashMap<String, Value>,
        variables: SharedVariables,
        dependencies: Dependencies,
    ) -> Self {
        Self {
            node_id,
            config,
            inputs,
            variables,
            dependencies,
        }
    }

    /// Id of the async node
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Get a resolved input value by socket name
    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }

    /// Get input as f64
    pub fn input_f64(&self, name: &str) -> Option<f64> {
        self.inputs.get(name).and_then(|v| v.as_f64())
    }

    /// Get input as string
    pub fn input_str(&self, name: &str) -> Option<&str> {
        self.inputs.get(name).and_then(|v| v.as_str())
    }

    /// Get a configuration value
    pub fn config(&self, key: &str) -> Option<&serde_json::Value> {
        self.config.get(key)
    }

    /// Read a graph variable
    pub fn variable(&self, name: &str) -> Option<Value> {
        self.variables.read().get(name).map(|v| v.value.clone())
    }

    /// Look up a typed host dependency by name
    pub fn dependency<T: std::any::Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.dependencies.get::<T>(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Behavior Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Behavior of an event node: begins execution paths, never receives one
pub trait EventBehavior: Send + Sync {
    /// Called once per engine lifetime to attach the trigger source
    fn init(&self, ctx: &mut EventInitContext) -> Result<(), NodeError>;

    /// Called at engine disposal to detach external subscriptions
    fn dispose(&self) {}
}

/// Behavior of a flow node: reads inputs, performs its effect, selects the
/// next branch via the returned [`FlowTransition`]
pub trait FlowBehavior: Send + Sync {
    fn triggered(
        &self,
        ctx: &mut NodeContext,
        input_socket: &str,
    ) -> Result<FlowTransition, NodeError>;
}

/// Behavior of a function node: pure data transform, pulled on demand
///
/// Re-evaluated on every pull; implementations must not cache across calls.
pub trait FunctionBehavior: Send + Sync {
    fn exec(&self, ctx: &mut NodeContext) -> Result<(), NodeError>;
}

/// Behavior of an async node: a deferred operation the engine spawns
///
/// The engine registers the operation, ends the triggering fiber, and runs
/// this future on its task pool; the resolved socket name picks where a new
/// fiber continues. The future must complete exactly once (guaranteed by
/// being a future) and must not touch graph state directly.
#[async_trait]
pub trait AsyncBehavior: Send + Sync {
    async fn run(&self, ctx: AsyncRunContext) -> Result<String, NodeError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Behavior Union
// ─────────────────────────────────────────────────────────────────────────────

/// Closed union over the four behavior shapes
#[derive(Clone)]
pub enum NodeBehavior {
    Event(Arc<dyn EventBehavior>),
    Flow(Arc<dyn FlowBehavior>),
    Function(Arc<dyn FunctionBehavior>),
    Async(Arc<dyn AsyncBehavior>),
}

impl NodeBehavior {
    /// The node kind this behavior implements
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeBehavior::Event(_) => NodeKind::Event,
            NodeBehavior::Flow(_) => NodeKind::Flow,
            NodeBehavior::Function(_) => NodeKind::Function,
            NodeBehavior::Async(_) => NodeKind::Async,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Closure Adapters
// ─────────────────────────────────────────────────────────────────────────────

/// Closure-backed event behavior
pub struct FnEventBehavior<F>
where
    F: Fn(&mut EventInitContext) -> Result<(), NodeError> + Send + Sync,
{
    init: F,
}

impl<F> FnEventBehavior<F>
where
    F: Fn(&mut EventInitContext) -> Result<(), NodeError> + Send + Sync,
{
    pub fn new(init: F) -> Self {
        Self { init }
    }
}

impl<F> EventBehavior for FnEventBehavior<F>
where
    F: Fn(&mut EventInitContext) -> Result<(), NodeError> + Send + Sync,
{
    fn init(&self, ctx: &mut EventInitContext) -> Result<(), NodeError> {
        (self.init)(ctx)
    }
}

/// Closure-backed flow behavior
pub struct FnFlowBehavior<F>
where
    F: Fn(&mut NodeContext, &str) -> Result<FlowTransition, NodeError> + Send + Sync,
{
    func: F,
}

impl<F> FnFlowBehavior<F>
where
    F: Fn(&mut NodeContext, &str) -> Result<FlowTransition, NodeError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> FlowBehavior for FnFlowBehavior<F>
where
    F: Fn(&mut NodeContext, &str) -> Result<FlowTransition, NodeError> + Send + Sync,
{
    fn triggered(
        &self,
        ctx: &mut NodeContext,
        input_socket: &str,
    ) -> Result<FlowTransition, NodeError> {
        (self.func)(ctx, input_socket)
    }
}

/// Closure-backed function behavior
pub struct FnFunctionBehavior<F>
where
    F: Fn(&mut NodeContext) -> Result<(), NodeError> + Send + Sync,
{
    func: F,
}

impl<F> FnFunctionBehavior<F>
where
    F: Fn(&mut NodeContext) -> Result<(), NodeError> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> FunctionBehavior for FnFunctionBehavior<F>
where
    F: Fn(&mut NodeContext) -> Result<(), NodeError> + Send + Sync,
{
    fn exec(&self, ctx: &mut NodeContext) -> Result<(), NodeError> {
        (self.func)(ctx)
    }
}

/// Closure-backed async behavior
pub struct FnAsyncBehavior<F, Fut>
where
    F: Fn(AsyncRunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, NodeError>> + Send + 'static,
{
    func: F,
    _future: std::marker::PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnAsyncBehavior<F, Fut>
where
    F: Fn(AsyncRunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, NodeError>> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _future: std::marker::PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> AsyncBehavior for FnAsyncBehavior<F, Fut>
where
    F: Fn(AsyncRunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<String, NodeError>> + Send + 'static,
{
    async fn run(&self, ctx: AsyncRunContext) -> Result<String, NodeError> {
        (self.func)(ctx).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
