//! Execution engine
//!
//! The engine owns a graph and interprets it: it discovers event nodes at
//! construction and initializes them, keeps a FIFO queue of live fibers,
//! and marshals external triggers and async completions through a mailbox
//! so all graph and fiber mutation happens on the engine's thread.
//!
//! One step resolves the target node's data inputs depth-first — function
//! nodes are fully re-evaluated on every pull, never cached across steps —
//! then dispatches on the node's kind. A flow behavior's returned transition
//! either advances the fiber or ends it; an async behavior is spawned onto
//! the task pool and the fiber ends, with the continuation arriving later
//! as a fresh fiber. A failing behavior aborts only its own fiber; the
//! fault is recorded for the host.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use skein_types::{Graph, Link, NodeKind, Value};

use crate::behavior::{AsyncRunContext, EventInitContext, FlowTransition, NodeBehavior, NodeContext};
use crate::error::{NodeError, NodeFault};
use crate::fiber::{Fiber, FiberCompletion};
use crate::handle::{AsyncCompletion, EngineMailbox, EngineMessage};
use crate::registry::Registry;

/// Depth bound on recursive data resolution; exceeding it means a cyclic
/// function wiring and aborts the fiber instead of overflowing the stack.
const MAX_RESOLVE_DEPTH: usize = 64;

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Interpreter for one graph
pub struct Engine {
    graph: Graph,
    registry: Arc<Registry>,
    fibers: VecDeque<Fiber>,
    rx: mpsc::UnboundedReceiver<EngineMessage>,
    mailbox: EngineMailbox,
    /// Outstanding async registrations: op id → node id
    pending_async: Arc<DashMap<u64, String>>,
    /// Custom event name → (event node id, output socket)
    custom_event_routes: HashMap<String, Vec<(String, String)>>,
    faults: Vec<NodeFault>,
    next_fiber_id: u64,
    next_op_id: u64,
    disposed: bool,
}

impl Engine {
    /// Construct an engine over a graph and initialize its event nodes
    ///
    /// Every event node's `init` runs exactly once here. Init failures and
    /// unregistered node types are recorded as faults, not panics, so one
    /// bad event node cannot prevent the rest of the graph from running.
    pub fn new(graph: Graph, registry: Arc<Registry>) -> Self {
        let (mailbox, rx) = EngineMailbox::channel();
        let mut engine = Self {
            graph,
            registry,
            fibers: VecDeque::new(),
            rx,
            mailbox,
            pending_async: Arc::new(DashMap::new()),
            custom_event_routes: HashMap::new(),
            faults: Vec::new(),
            next_fiber_id: 0,
            next_op_id: 0,
            disposed: false,
        };
        engine.init_event_nodes();
        engine
    }

    fn init_event_nodes(&mut self) {
        let event_nodes: Vec<(String, String, serde_json::Map<String, serde_json::Value>)> = self
            .graph
            .nodes()
            .filter(|n| n.kind == NodeKind::Event)
            .map(|n| (n.id.clone(), n.type_name.clone(), n.configuration.clone()))
            .collect();

        for (node_id, type_name, config) in event_nodes {
            let behavior = match self.registry.behavior(&type_name) {
                Some(NodeBehavior::Event(b)) => b,
                Some(_) | None => {
                    self.record_fault(&node_id, NodeError::UnregisteredType(type_name));
                    continue;
                }
            };

            let mut ctx = EventInitContext::new(node_id.clone(), config, self.mailbox.clone());
            if let Err(e) = behavior.init(&mut ctx) {
                self.record_fault(&node_id, e);
                continue;
            }
            for (event, socket) in ctx.take_custom_subscriptions() {
                self.custom_event_routes
                    .entry(event)
                    .or_default()
                    .push((node_id.clone(), socket));
            }
        }
    }

    // ── Host entry points ────────────────────────────────────────────────────

    /// Start execution paths from a node's output flow socket
    ///
    /// One fiber is created per outgoing link, in link creation order;
    /// `on_complete` fires when the first of them finishes its path (or
    /// immediately when the socket has no links). Returns the number of
    /// fibers spawned.
    pub fn commit_to_new_fiber(
        &mut self,
        node_id: &str,
        output_socket: &str,
        on_complete: Option<FiberCompletion>,
    ) -> usize {
        if self.disposed {
            return 0;
        }
        let links: Vec<Link> = self
            .graph
            .node(node_id)
            .and_then(|n| n.output(output_socket))
            .map(|s| s.links.clone())
            .unwrap_or_default();

        if links.is_empty() {
            if let Some(cb) = on_complete {
                cb();
            }
            return 0;
        }

        let count = links.len();
        let mut on_complete = on_complete;
        for link in links {
            let fiber = Fiber::new(self.next_fiber_id, link, on_complete.take());
            tracing::debug!(fiber = fiber.id(), node = node_id, socket = output_socket, "fiber spawned");
            self.next_fiber_id += 1;
            self.fibers.push_back(fiber);
        }
        count
    }

    /// Trigger a graph-level custom event, delivering a payload to the
    /// subscribed event nodes' data output sockets
    pub fn trigger_custom_event(&mut self, name: &str, payload: HashMap<String, Value>) {
        if self.disposed {
            return;
        }
        let routes = self
            .custom_event_routes
            .get(name)
            .cloned()
            .unwrap_or_default();
        if routes.is_empty() {
            tracing::debug!(event = name, "custom event has no subscribers");
            return;
        }
        for (node_id, socket) in routes {
            if let Some(node) = self.graph.node_mut(&node_id) {
                for (key, value) in &payload {
                    if let Some(out) = node.output_mut(key) {
                        out.value = value.clone();
                    }
                }
            }
            self.commit_to_new_fiber(&node_id, &socket, None);
        }
    }

    /// Drain ready work without awaiting: marshaled messages already in the
    /// mailbox, then the fiber queue, strictly FIFO. Each fiber runs to
    /// completion or suspension before a later-queued fiber starts. Returns
    /// the number of steps executed.
    pub fn execute_all_sync(&mut self, max_steps: u64) -> u64 {
        let mut steps = 0;
        loop {
            if self.disposed || steps >= max_steps {
                break;
            }
            self.pump_messages();
            let Some(mut fiber) = self.fibers.pop_front() else {
                // A message may have arrived while the queue looked empty.
                self.pump_messages();
                if self.fibers.is_empty() {
                    break;
                }
                continue;
            };
            while !fiber.is_complete() && steps < max_steps {
                self.execute_fiber_step(&mut fiber);
                steps += 1;
            }
            if !fiber.is_complete() {
                // Step budget exhausted mid-path; resume here next call.
                self.fibers.push_front(fiber);
                break;
            }
            if let Some(cb) = fiber.on_complete.take() {
                cb();
            }
        }
        steps
    }

    /// Drive the graph to quiescence, awaiting pending async completions
    /// without busy-waiting. Returns when no fibers remain and no async
    /// operations are outstanding, or when the step budget is exhausted.
    pub async fn execute_all(&mut self, max_steps: u64) -> u64 {
        let mut steps = self.execute_all_sync(max_steps);
        while !self.disposed
            && steps < max_steps
            && self.fibers.is_empty()
            && !self.pending_async.is_empty()
        {
            match self.rx.recv().await {
                Some(msg) => {
                    self.handle_message(msg);
                    steps += self.execute_all_sync(max_steps - steps);
                }
                None => break,
            }
        }
        steps
    }

    /// Dispose the engine: event nodes are detached, outstanding async
    /// operations abandoned (never force-completed), and every handle the
    /// engine ever issued goes inert.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.mailbox.dispose();

        let event_nodes: Vec<String> = self
            .graph
            .nodes()
            .filter(|n| n.kind == NodeKind::Event)
            .map(|n| n.type_name.clone())
            .collect();
        for type_name in event_nodes {
            if let Some(NodeBehavior::Event(b)) = self.registry.behavior(&type_name) {
                b.dispose();
            }
        }

        self.pending_async.clear();
        self.fibers.clear();
        while self.rx.try_recv().is_ok() {}
        tracing::debug!(graph = %self.graph.name, "engine disposed");
    }

    // ── Introspection ────────────────────────────────────────────────────────

    /// The graph being executed
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Mutable access for host-side edits between runs
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// Faults recorded so far
    pub fn faults(&self) -> &[NodeFault] {
        &self.faults
    }

    /// Drain recorded faults
    pub fn take_faults(&mut self) -> Vec<NodeFault> {
        std::mem::take(&mut self.faults)
    }

    /// Number of queued fibers
    pub fn fiber_count(&self) -> usize {
        self.fibers.len()
    }

    /// Number of outstanding async operations
    pub fn pending_async_count(&self) -> usize {
        self.pending_async.len()
    }

    /// Whether the engine has been disposed
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ── Message handling ─────────────────────────────────────────────────────

    fn pump_messages(&mut self) {
        while let Ok(msg) = self.rx.try_recv() {
            if self.disposed {
                break;
            }
            self.handle_message(msg);
        }
    }

    fn handle_message(&mut self, msg: EngineMessage) {
        match msg {
            EngineMessage::Trigger { node_id, socket } => {
                tracing::debug!(node = %node_id, socket = %socket, "event trigger");
                self.commit_to_new_fiber(&node_id, &socket, None);
            }
            EngineMessage::AsyncDone {
                op_id,
                node_id,
                socket,
            } => {
                if self.pending_async.remove(&op_id).is_some() {
                    tracing::debug!(node = %node_id, socket = %socket, "async operation completed");
                    self.commit_to_new_fiber(&node_id, &socket, None);
                }
            }
            EngineMessage::AsyncFault {
                op_id,
                node_id,
                error,
            } => {
                self.pending_async.remove(&op_id);
                self.record_fault(&node_id, error);
            }
        }
    }

    // ── Stepping ─────────────────────────────────────────────────────────────

    fn execute_fiber_step(&mut self, fiber: &mut Fiber) {
        let Some(link) = fiber.next.take() else {
            return;
        };
        fiber.steps += 1;

        if let Err(e) = self.dispatch(fiber, &link.node_id, &link.socket) {
            self.record_fault(&link.node_id, e);
            fiber.next = None;
        }
    }

    fn dispatch(
        &mut self,
        fiber: &mut Fiber,
        node_id: &str,
        input_socket: &str,
    ) -> Result<(), NodeError> {
        let (kind, type_name, config) = {
            let node = self
                .graph
                .node(node_id)
                .ok_or_else(|| NodeError::failed(format!("link target missing: {node_id}")))?;
            (node.kind, node.type_name.clone(), node.configuration.clone())
        };
        tracing::debug!(fiber = fiber.id(), node = node_id, node_type = %type_name, "step");

        match kind {
            NodeKind::Flow => {
                let inputs = self.resolve_node_inputs(node_id, 0)?;
                let behavior = match self.registry.behavior(&type_name) {
                    Some(NodeBehavior::Flow(b)) => b,
                    Some(_) => {
                        return Err(NodeError::failed(format!(
                            "behavior registered for {type_name} is not a flow behavior"
                        )))
                    }
                    None => return Err(NodeError::UnregisteredType(type_name)),
                };
                let mut ctx = NodeContext::new(
                    node_id.to_string(),
                    config,
                    inputs,
                    self.graph.variables(),
                    self.registry.dependencies(),
                );
                let transition = behavior.triggered(&mut ctx, input_socket)?;
                let outputs = ctx.into_outputs();
                self.write_outputs(node_id, outputs);

                match transition {
                    FlowTransition::Continue(socket) => self.commit_fiber(fiber, node_id, &socket),
                    FlowTransition::End => Ok(()),
                }
            }
            NodeKind::Async => {
                let inputs = self.resolve_node_inputs(node_id, 0)?;
                let behavior = match self.registry.behavior(&type_name) {
                    Some(NodeBehavior::Async(b)) => b,
                    Some(_) => {
                        return Err(NodeError::failed(format!(
                            "behavior registered for {type_name} is not an async behavior"
                        )))
                    }
                    None => return Err(NodeError::UnregisteredType(type_name)),
                };

                let op_id = self.next_op_id;
                self.next_op_id += 1;
                self.pending_async.insert(op_id, node_id.to_string());

                let completion =
                    AsyncCompletion::new(self.mailbox.clone(), op_id, node_id.to_string());
                let ctx = AsyncRunContext::new(
                    node_id.to_string(),
                    config,
                    inputs,
                    self.graph.variables(),
                    self.registry.dependencies(),
                );
                tokio::spawn(async move {
                    match behavior.run(ctx).await {
                        Ok(socket) => completion.finish(&socket),
                        Err(e) => completion.fault(e),
                    }
                });
                // The current fiber ends here; the continuation arrives as a
                // new fiber when the completion is marshaled back.
                Ok(())
            }
            NodeKind::Event | NodeKind::Function => Err(NodeError::NotFlowTarget(kind)),
        }
    }

    /// Advance the fiber along the chosen output socket. The fiber itself
    /// follows the first link; additional links spawn fresh fibers in
    /// creation order.
    fn commit_fiber(
        &mut self,
        fiber: &mut Fiber,
        node_id: &str,
        output_socket: &str,
    ) -> Result<(), NodeError> {
        let links: Vec<Link> = {
            let node = self
                .graph
                .node(node_id)
                .ok_or_else(|| NodeError::failed(format!("node vanished mid-step: {node_id}")))?;
            node.output(output_socket)
                .ok_or_else(|| {
                    NodeError::failed(format!(
                        "{node_id} has no output flow socket named {output_socket}"
                    ))
                })?
                .links
                .clone()
        };

        let mut links = links.into_iter();
        fiber.next = links.next();
        for link in links {
            let extra = Fiber::new(self.next_fiber_id, link, None);
            self.next_fiber_id += 1;
            self.fibers.push_back(extra);
        }
        Ok(())
    }

    // ── Data resolution ──────────────────────────────────────────────────────

    /// Resolve every data input of a node, depth-first
    ///
    /// Linked inputs pull their source; a function source is re-executed on
    /// every pull (no caching across steps or within one). Registered
    /// conversions apply across typed links. An unresolvable input falls
    /// back to the type's default-constructed value with a diagnostic —
    /// recoverable by design, the script continues.
    fn resolve_node_inputs(
        &mut self,
        node_id: &str,
        depth: usize,
    ) -> Result<HashMap<String, Value>, NodeError> {
        if depth > MAX_RESOLVE_DEPTH {
            return Err(NodeError::ResolveDepthExceeded(node_id.to_string()));
        }

        let sockets: Vec<(String, String)> = {
            let node = self
                .graph
                .node(node_id)
                .ok_or_else(|| NodeError::failed(format!("node not found: {node_id}")))?;
            node.inputs
                .iter()
                .filter(|s| s.is_data())
                .map(|s| (s.name.clone(), s.value_type.clone()))
                .collect()
        };

        let mut inputs = HashMap::new();
        for (socket_name, target_type) in sockets {
            let incoming = self
                .graph
                .incoming_link(node_id, &socket_name)
                .map(|(n, s)| (n.to_string(), s.to_string()));

            let value = match incoming {
                Some((src_id, src_socket)) => {
                    let raw = self.resolve_output(&src_id, &src_socket, depth)?;
                    let src_type = self
                        .graph
                        .node(&src_id)
                        .and_then(|n| n.output(&src_socket))
                        .map(|s| s.value_type.clone());
                    let converted = src_type.and_then(|st| {
                        self.registry.conversions().convert(&st, &target_type, &raw)
                    });
                    match converted {
                        Some(v) => v,
                        None => {
                            tracing::warn!(
                                node = node_id,
                                socket = %socket_name,
                                "input has no resolvable source value; using type default"
                            );
                            self.default_value(&target_type)
                        }
                    }
                }
                None => {
                    let literal = self
                        .graph
                        .node(node_id)
                        .and_then(|n| n.input(&socket_name))
                        .map(|s| s.value.clone())
                        .unwrap_or_default();
                    match self.registry.value_type(&target_type) {
                        Some(vt) => vt.clone_value(&literal),
                        None => literal,
                    }
                }
            };

            // Copy the resolved value onto the socket so the live graph
            // reflects the last resolution.
            if let Some(socket) = self
                .graph
                .node_mut(node_id)
                .and_then(|n| n.input_mut(&socket_name))
            {
                socket.value = value.clone();
            }
            inputs.insert(socket_name, value);
        }
        Ok(inputs)
    }

    /// Produce the current value of an output socket, executing the owning
    /// node first when it is a function node
    fn resolve_output(
        &mut self,
        src_id: &str,
        src_socket: &str,
        depth: usize,
    ) -> Result<Value, NodeError> {
        let (kind, type_name, config) = {
            let node = self
                .graph
                .node(src_id)
                .ok_or_else(|| NodeError::failed(format!("link source missing: {src_id}")))?;
            (node.kind, node.type_name.clone(), node.configuration.clone())
        };

        if kind != NodeKind::Function {
            // Flow/async/event outputs hold whatever the node last wrote.
            return Ok(self
                .graph
                .node(src_id)
                .and_then(|n| n.output(src_socket))
                .map(|s| s.value.clone())
                .unwrap_or_default());
        }

        let inputs = self.resolve_node_inputs(src_id, depth + 1)?;
        let behavior = match self.registry.behavior(&type_name) {
            Some(NodeBehavior::Function(b)) => b,
            Some(_) => {
                return Err(NodeError::failed(format!(
                    "behavior registered for {type_name} is not a function behavior"
                )))
            }
            None => return Err(NodeError::UnregisteredType(type_name)),
        };

        let mut ctx = NodeContext::new(
            src_id.to_string(),
            config,
            inputs,
            self.graph.variables(),
            self.registry.dependencies(),
        );
        behavior
            .exec(&mut ctx)
            .map_err(|e| NodeError::failed(format!("function node {src_id} failed: {e}")))?;

        let outputs = ctx.into_outputs();
        let result = outputs.get(src_socket).cloned();
        self.write_outputs(src_id, outputs);

        match result {
            Some(v) => Ok(v),
            None => {
                tracing::warn!(
                    node = src_id,
                    socket = src_socket,
                    "function wrote no value for pulled output; using socket value"
                );
                Ok(self
                    .graph
                    .node(src_id)
                    .and_then(|n| n.output(src_socket))
                    .map(|s| s.value.clone())
                    .unwrap_or_default())
            }
        }
    }

    fn write_outputs(&mut self, node_id: &str, outputs: HashMap<String, Value>) {
        if let Some(node) = self.graph.node_mut(node_id) {
            for (name, value) in outputs {
                match node.output_mut(&name) {
                    Some(socket) => socket.value = value,
                    None => tracing::warn!(
                        node = node_id,
                        socket = %name,
                        "behavior wrote to a socket its definition does not declare"
                    ),
                }
            }
        }
    }

    fn default_value(&self, type_name: &str) -> Value {
        match self.registry.value_type(type_name) {
            Some(vt) => vt.create(),
            None => Value::Null,
        }
    }

    fn record_fault(&mut self, node_id: &str, error: NodeError) {
        tracing::error!(node = node_id, error = %error, "node fault; aborting its fiber");
        self.faults.push(NodeFault {
            node_id: node_id.to_string(),
            error,
        });
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
