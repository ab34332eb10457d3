//! Execution fibers
//!
//! A fiber is one sequential execution path through flow links. Its whole
//! state is the next link to traverse; the engine steps it until the path
//! ends or suspends into an async operation. Distinct fibers may interleave
//! at the engine's discretion, but a single fiber never interleaves with
//! itself.

use skein_types::Link;

/// Callback invoked when a fiber's path completes
pub type FiberCompletion = Box<dyn FnOnce() + Send>;

/// One sequential execution path, owned by the engine
pub struct Fiber {
    id: u64,
    pub(crate) next: Option<Link>,
    pub(crate) steps: u64,
    pub(crate) on_complete: Option<FiberCompletion>,
}

impl Fiber {
    pub(crate) fn new(id: u64, next: Link, on_complete: Option<FiberCompletion>) -> Self {
        Self {
            id,
            next: Some(next),
            steps: 0,
            on_complete,
        }
    }

    /// Engine-assigned fiber id, for diagnostics
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Steps executed so far on this fiber
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// A fiber with nothing left to traverse is complete
    pub fn is_complete(&self) -> bool {
        self.next.is_none()
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("id", &self.id)
            .field("next", &self.next)
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fiber_starts_populated() {
        let fiber = Fiber::new(1, Link::new("n1", "exec"), None);
        assert!(!fiber.is_complete());
        assert_eq!(fiber.steps(), 0);
    }

    #[test]
    fn test_fiber_completes_when_next_cleared() {
        let mut fiber = Fiber::new(1, Link::new("n1", "exec"), None);
        fiber.next = None;
        assert!(fiber.is_complete());
    }
}
