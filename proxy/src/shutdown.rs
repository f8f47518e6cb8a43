use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide drain flag.
///
/// Set once when drain begins and never cleared for the remaining lifetime
/// of the process. The dispatcher consults it before any per-request work;
/// listener teardown is handled separately after the grace period.
#[derive(Clone, Debug, Default)]
pub struct ShutdownGate(Arc<AtomicBool>);

impl ShutdownGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shut_down(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_is_monotonic() {
        let gate = ShutdownGate::new();
        assert!(!gate.is_shutting_down());

        gate.shut_down();
        assert!(gate.is_shutting_down());

        // further calls are no-ops
        gate.shut_down();
        assert!(gate.is_shutting_down());
    }

    #[test]
    fn clones_share_the_flag() {
        let gate = ShutdownGate::new();
        let observer = gate.clone();
        gate.shut_down();
        assert!(observer.is_shutting_down());
    }
}
