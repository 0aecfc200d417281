//! Ordered record of acquired resources.
//!
//! A [ResourceLedger] stores one release action per successful acquisition.
//! [ResourceLedger::unwind_all] runs them in strict reverse (LIFO) order, so a
//! bind that failed half-way and a normal remove take the exact same path.
//!
//! Guarantees:
//! - Every release action runs at most once.
//! - A failing release action is logged and skipped; the unwind always continues.
//! - After [ResourceLedger::unwind_all] the ledger is drained and must not be reused.
use alloc::{boxed::Box, vec::Vec};
use core::fmt::Debug;
use log::{debug, warn};

/// Outcome of a single release action. The error is a short description used for logging.
pub type ReleaseResult = Result<(), &'static str>;

struct ReleaseAction {
    label: &'static str,
    action: Box<dyn FnOnce() -> ReleaseResult + Send>,
}

/// LIFO stack of release actions owned by exactly one binding attempt.
pub struct ResourceLedger {
    actions: Vec<ReleaseAction>,
    drained: bool,
}

impl ResourceLedger {
    pub const fn new() -> ResourceLedger {
        ResourceLedger {
            actions: Vec::new(),
            drained: false,
        }
    }

    /// Record the capability to undo one acquisition.
    ///
    /// `label` names the resource in log output. Pushing onto a drained ledger is a
    /// lifecycle bug; the action is run immediately so the resource does not leak.
    pub fn push(&mut self, label: &'static str, action: impl FnOnce() -> ReleaseResult + Send + 'static) {
        if self.drained {
            warn!("Resource '{}' recorded on a drained ledger; releasing it now.", label);
            Self::run(label, Box::new(action));
            return;
        }
        self.actions.push(ReleaseAction {
            label,
            action: Box::new(action),
        });
    }

    /// Run every recorded release action in reverse acquisition order, then seal the ledger.
    ///
    /// Return the number of actions executed (failed ones included).
    pub fn unwind_all(&mut self) -> usize {
        let mut count = 0;
        while let Some(entry) = self.actions.pop() {
            Self::run(entry.label, entry.action);
            count += 1;
        }
        self.drained = true;
        count
    }

    fn run(label: &'static str, action: Box<dyn FnOnce() -> ReleaseResult + Send>) {
        match action() {
            Ok(()) => debug!("\tReleased '{}'.", label),
            Err(err) => warn!("Error releasing '{}': {}; skipped.", label, err),
        }
    }

    /// Number of release actions still pending.
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether [ResourceLedger::unwind_all] has already run.
    pub fn is_drained(&self) -> bool {
        self.drained
    }

    /// Labels of pending actions in acquisition order.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.actions.iter().map(|x| x.label)
    }
}

impl Default for ResourceLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceLedger {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            warn!(
                "Ledger dropped with {} live resource(s); unwinding.",
                self.actions.len()
            );
            self.unwind_all();
        }
    }
}

impl Debug for ResourceLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceLedger")
            .field("pending", &self.labels().collect::<Vec<_>>())
            .field("drained", &self.drained)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<usize>>>, impl Fn(usize) -> Box<dyn FnOnce() -> ReleaseResult + Send>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let cloned = log.clone();
        let make = move |n: usize| -> Box<dyn FnOnce() -> ReleaseResult + Send> {
            let log = cloned.clone();
            Box::new(move || {
                log.lock().unwrap().push(n);
                Ok(())
            })
        };
        (log, make)
    }

    #[test]
    fn unwinds_in_reverse_order() {
        let (log, make) = recorder();
        let mut ledger = ResourceLedger::new();
        for n in 0..4 {
            ledger.push("step", make(n));
        }
        assert_eq!(ledger.len(), 4);
        assert_eq!(ledger.unwind_all(), 4);
        assert_eq!(*log.lock().unwrap(), vec![3, 2, 1, 0]);
        assert!(ledger.is_empty());
        assert!(ledger.is_drained());
    }

    #[test]
    fn failing_action_does_not_abort_unwind() {
        let (log, make) = recorder();
        let mut ledger = ResourceLedger::new();
        ledger.push("first", make(0));
        ledger.push("broken", || Err("still busy"));
        ledger.push("third", make(2));
        assert_eq!(ledger.unwind_all(), 3);
        assert_eq!(*log.lock().unwrap(), vec![2, 0]);
    }

    #[test]
    fn second_unwind_runs_nothing() {
        let (log, make) = recorder();
        let mut ledger = ResourceLedger::new();
        ledger.push("only", make(7));
        assert_eq!(ledger.unwind_all(), 1);
        assert_eq!(ledger.unwind_all(), 0);
        assert_eq!(*log.lock().unwrap(), vec![7]);
    }

    #[test]
    fn push_after_drain_releases_immediately() {
        let (log, make) = recorder();
        let mut ledger = ResourceLedger::new();
        ledger.unwind_all();
        ledger.push("late", make(1));
        assert!(ledger.is_empty());
        assert_eq!(*log.lock().unwrap(), vec![1]);
    }

    #[test]
    fn drop_unwinds_pending_actions() {
        let (log, make) = recorder();
        {
            let mut ledger = ResourceLedger::new();
            ledger.push("a", make(0));
            ledger.push("b", make(1));
        }
        assert_eq!(*log.lock().unwrap(), vec![1, 0]);
    }

    #[test]
    fn labels_follow_acquisition_order() {
        let mut ledger = ResourceLedger::new();
        ledger.push("region", || Ok(()));
        ledger.push("class", || Ok(()));
        assert_eq!(ledger.labels().collect::<Vec<_>>(), vec!["region", "class"]);
        ledger.unwind_all();
    }
}
