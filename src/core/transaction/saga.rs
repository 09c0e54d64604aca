//! SAGA compensation ledger
//!
//! Each transaction owns an ordered list of steps; a step pairs a
//! human-readable operation name with a closure performing the inverse
//! action. On rollback (or a failed commit) the closures run in reverse
//! registration order. Compensation is best-effort: a failing step is
//! logged and the walk continues. Closures own everything they capture and
//! must tolerate partial prior state ("remove if present").

use crate::core::common::PolystoreError;
use log::{debug, error, info, warn};
use std::fmt;
use std::time::Instant;

/// The inverse action of one step.
pub type CompensatingAction = Box<dyn FnOnce() -> Result<(), PolystoreError> + Send>;

/// One recorded step.
pub struct SagaStep {
    name: String,
    compensate: Option<CompensatingAction>,
    compensated: bool,
    registered_at: Instant,
}

impl SagaStep {
    /// The operation name given at registration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this step's inverse action has run.
    #[must_use]
    pub fn is_compensated(&self) -> bool {
        self.compensated
    }
}

/// An ordered ledger of compensating actions.
///
/// Dropping a non-empty ledger that was neither cleared nor compensated
/// triggers compensation as a safety net.
#[derive(Default)]
pub struct Saga {
    steps: Vec<SagaStep>,
    compensated: bool,
}

impl Saga {
    /// An empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step with its compensating action.
    pub fn add_step<F>(&mut self, name: impl Into<String>, compensate: F)
    where
        F: FnOnce() -> Result<(), PolystoreError> + Send + 'static,
    {
        let name = name.into();
        debug!("SAGA: added step '{}' (total steps: {})", name, self.steps.len() + 1);
        self.steps.push(SagaStep {
            name,
            compensate: Some(Box::new(compensate)),
            compensated: false,
            registered_at: Instant::now(),
        });
    }

    /// Execute all uncompensated steps in reverse registration order.
    /// Idempotent: a second call is a no-op. Step failures are logged and do
    /// not stop the walk.
    pub fn compensate(&mut self) {
        if self.compensated {
            warn!("SAGA: already compensated, skipping");
            return;
        }
        info!("SAGA: compensating {} steps in reverse order", self.steps.len());

        for step in self.steps.iter_mut().rev() {
            if step.compensated {
                debug!("SAGA: step '{}' already compensated, skipping", step.name);
                continue;
            }
            debug!("SAGA: compensating step '{}'", step.name);
            if let Some(action) = step.compensate.take() {
                if let Err(e) = action() {
                    error!("SAGA: compensation failed for '{}': {e}", step.name);
                    // Continue with the remaining steps.
                }
            }
            step.compensated = true;
        }

        self.compensated = true;
        info!(
            "SAGA: compensation complete ({}/{} steps)",
            self.compensated_count(),
            self.steps.len()
        );
    }

    /// Discard all steps without running them (after a successful commit).
    pub fn clear(&mut self) {
        debug!("SAGA: clearing {} steps", self.steps.len());
        self.steps.clear();
        self.compensated = false;
    }

    /// Number of recorded steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Number of steps whose inverse action has run.
    #[must_use]
    pub fn compensated_count(&self) -> usize {
        self.steps.iter().filter(|s| s.compensated).count()
    }

    /// True once `compensate` ran and every step is marked compensated.
    #[must_use]
    pub fn is_fully_compensated(&self) -> bool {
        self.compensated && self.compensated_count() == self.steps.len()
    }

    /// Step names with their compensation status, in registration order.
    #[must_use]
    pub fn step_history(&self) -> Vec<String> {
        self.steps
            .iter()
            .map(|s| {
                let status = if s.compensated { "[COMPENSATED]" } else { "[ACTIVE]" };
                format!("{status} {}", s.name)
            })
            .collect()
    }

    /// Milliseconds since the first step was registered; 0 for an empty
    /// ledger.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        self.steps
            .first()
            .map_or(0, |s| s.registered_at.elapsed().as_millis() as u64)
    }
}

impl fmt::Debug for Saga {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Saga")
            .field("steps", &self.step_history())
            .field("compensated", &self.compensated)
            .finish()
    }
}

impl Drop for Saga {
    fn drop(&mut self) {
        if !self.compensated && !self.steps.is_empty() {
            warn!(
                "SAGA dropped without compensation - auto-compensating {} steps",
                self.steps.len()
            );
            self.compensate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_compensation_runs_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut saga = Saga::new();
        for i in 0..3 {
            let order = Arc::clone(&order);
            saga.add_step(format!("step{i}"), move || {
                order.lock().unwrap().push(i);
                Ok(())
            });
        }

        saga.compensate();
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
        assert!(saga.is_fully_compensated());
    }

    #[test]
    fn test_compensate_is_idempotent() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut saga = Saga::new();
        let counter = Arc::clone(&runs);
        saga.add_step("once", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        saga.compensate();
        saga.compensate();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_step_does_not_stop_the_walk() {
        let ran = Arc::new(AtomicUsize::new(0));
        let mut saga = Saga::new();

        let counter = Arc::clone(&ran);
        saga.add_step("first", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        saga.add_step("failing", || {
            Err(PolystoreError::Storage("synthetic failure".to_string()))
        });

        saga.compensate();
        // "failing" runs first (reverse order) and fails; "first" still runs.
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(saga.compensated_count(), 2);
        assert!(saga.is_fully_compensated());
    }

    #[test]
    fn test_clear_discards_without_running() {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut saga = Saga::new();
        let counter = Arc::clone(&runs);
        saga.add_step("discarded", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        saga.clear();
        assert_eq!(saga.step_count(), 0);
        drop(saga);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_drop_safety_net() {
        let runs = Arc::new(AtomicUsize::new(0));
        {
            let mut saga = Saga::new();
            let counter = Arc::clone(&runs);
            saga.add_step("pending", move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            // Neither cleared nor compensated.
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_step_history() {
        let mut saga = Saga::new();
        saga.add_step("put:users:alice", || Ok(()));
        assert_eq!(saga.step_history(), vec!["[ACTIVE] put:users:alice"]);

        saga.compensate();
        assert_eq!(saga.step_history(), vec!["[COMPENSATED] put:users:alice"]);
    }

    #[test]
    fn test_empty_saga() {
        let mut saga = Saga::new();
        assert_eq!(saga.step_count(), 0);
        assert_eq!(saga.duration_ms(), 0);
        saga.compensate();
        assert!(saga.is_fully_compensated());
    }
}
