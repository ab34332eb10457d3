//! Engine mailbox and the handles issued to trigger sources
//!
//! External event sources and async operations never touch graph or fiber
//! state directly. They post messages into the engine's mailbox; the engine
//! drains it on its own thread. Every handle carries the engine's disposed
//! flag, so anything fired after disposal is an intentional no-op.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// A request marshaled onto the engine thread
#[derive(Debug)]
pub(crate) enum EngineMessage {
    /// An event source fired: start fibers at this node's output socket
    Trigger { node_id: String, socket: String },
    /// An async operation finished: continue at this node's output socket
    AsyncDone {
        op_id: u64,
        node_id: String,
        socket: String,
    },
    /// An async operation failed; record the fault, no continuation
    AsyncFault {
        op_id: u64,
        node_id: String,
        error: crate::error::NodeError,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Mailbox
// ─────────────────────────────────────────────────────────────────────────────

/// Shared sender half of the engine's message channel
#[derive(Clone)]
pub(crate) struct EngineMailbox {
    tx: mpsc::UnboundedSender<EngineMessage>,
    disposed: Arc<AtomicBool>,
}

impl EngineMailbox {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<EngineMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                disposed: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    /// Post a message unless the engine has been disposed
    pub(crate) fn post(&self, msg: EngineMessage) {
        if self.disposed.load(Ordering::Acquire) {
            tracing::debug!("dropping message for disposed engine");
            return;
        }
        // A closed channel only happens alongside disposal; dropping is the
        // documented behavior either way.
        let _ = self.tx.send(msg);
    }

    /// Mark the engine disposed; all handles go inert
    pub(crate) fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event Trigger
// ─────────────────────────────────────────────────────────────────────────────

/// Clonable handle an event node hands to its external trigger source
///
/// Firing enqueues a fiber start at the event node's output flow socket.
/// Inert after engine disposal.
#[derive(Clone)]
pub struct EventTrigger {
    mailbox: EngineMailbox,
    node_id: String,
    socket: String,
}

impl EventTrigger {
    pub(crate) fn new(mailbox: EngineMailbox, node_id: String, socket: String) -> Self {
        Self {
            mailbox,
            node_id,
            socket,
        }
    }

    /// Request a new execution path from the owning event node
    pub fn fire(&self) {
        self.mailbox.post(EngineMessage::Trigger {
            node_id: self.node_id.clone(),
            socket: self.socket.clone(),
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Async Completion
// ─────────────────────────────────────────────────────────────────────────────

/// Single-shot completion handle for an async node operation
///
/// Consuming `finish` makes "invoke the completion exactly once" a property
/// of the type rather than a convention. The continuation runs on a fresh
/// fiber started by the engine, never on the fiber that reached the node.
pub(crate) struct AsyncCompletion {
    mailbox: EngineMailbox,
    op_id: u64,
    node_id: String,
}

impl AsyncCompletion {
    pub(crate) fn new(mailbox: EngineMailbox, op_id: u64, node_id: String) -> Self {
        Self {
            mailbox,
            op_id,
            node_id,
        }
    }

    /// Id of the async node that started the operation
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Report completion, continuing flow at the named output socket
    pub fn finish(self, output_socket: &str) {
        self.mailbox.post(EngineMessage::AsyncDone {
            op_id: self.op_id,
            node_id: self.node_id,
            socket: output_socket.to_string(),
        });
    }

    /// Report failure; the fault is recorded and no continuation starts
    pub fn fault(self, error: crate::error::NodeError) {
        self.mailbox.post(EngineMessage::AsyncFault {
            op_id: self.op_id,
            node_id: self.node_id,
            error,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_posts_message() {
        let (mailbox, mut rx) = EngineMailbox::channel();
        let trigger = EventTrigger::new(mailbox, "n1".to_string(), "started".to_string());
        trigger.fire();

        match rx.try_recv().unwrap() {
            EngineMessage::Trigger { node_id, socket } => {
                assert_eq!(node_id, "n1");
                assert_eq!(socket, "started");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_disposed_mailbox_drops_messages() {
        let (mailbox, mut rx) = EngineMailbox::channel();
        let trigger = EventTrigger::new(mailbox.clone(), "n1".to_string(), "started".to_string());

        mailbox.dispose();
        trigger.fire();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_completion_is_single_shot() {
        let (mailbox, mut rx) = EngineMailbox::channel();
        let completion = AsyncCompletion::new(mailbox, 7, "delay".to_string());
        completion.finish("completed");
        // `completion` is consumed; a second finish does not compile.

        match rx.try_recv().unwrap() {
            EngineMessage::AsyncDone { op_id, node_id, socket } => {
                assert_eq!(op_id, 7);
                assert_eq!(node_id, "delay");
                assert_eq!(socket, "completed");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
