//! Composition operations.
//!
//! One [`CompositionOperation`] frames a single top-level activation: it
//! queues the work that must not run inline (deferred initialization and
//! post-composition notifications) and tracks the sharing lock the
//! operation has entered. The operation releases that lock when it is
//! dropped, never earlier, so everything the pass does happens under one
//! consistent view of the sharing scope.

use std::fmt;
use std::mem;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::activation::{ActivationContext, CompositeActivator, Instance, SharingLock};
use crate::error::{CompositionError, Result};

/// Deferred work scheduled by activators.
pub type Action = Box<dyn FnOnce(&mut CompositionOperation) -> Result<()> + Send>;

/// Tracks the deferred work and sharing state of one activation pass.
pub struct CompositionOperation {
    non_prerequisite_actions: Vec<Action>,
    post_composition_actions: Vec<Action>,
    sharing_lock: Option<Arc<SharingLock>>,
}

impl CompositionOperation {
    pub(crate) fn new() -> Self {
        Self {
            non_prerequisite_actions: Vec::new(),
            post_composition_actions: Vec::new(),
            sharing_lock: None,
        }
    }

    /// Runs `activator` to completion inside a fresh operation: invokes
    /// it, then drains the deferred queues. The sharing lock entered by
    /// the pass (if any) is released when the operation is dropped, on
    /// success and failure alike.
    pub fn run(context: &ActivationContext, activator: &CompositeActivator) -> Result<Instance> {
        debug!("starting composition operation");
        let mut operation = Self::new();
        let instance = activator(context, &mut operation)?;
        operation.complete()?;
        debug!("composition operation complete");
        Ok(instance)
    }

    /// Schedules `action` to run after the inline activation finishes.
    ///
    /// Actions run in enqueue order. An action may schedule further
    /// actions; they are picked up before post-composition work starts.
    pub fn add_non_prerequisite_action(&mut self, action: Action) {
        trace!("deferred action scheduled");
        self.non_prerequisite_actions.push(action);
    }

    /// Schedules `action` to run once, after every deferred action has
    /// completed.
    pub fn add_post_composition_action(&mut self, action: Action) {
        trace!("post-composition action scheduled");
        self.post_composition_actions.push(action);
    }

    /// Enters the sharing scope guarded by `lock`.
    ///
    /// Idempotent for the lock already held. Entering a second, distinct
    /// lock is a protocol violation and fails without blocking.
    pub fn enter_sharing_lock(&mut self, lock: &Arc<SharingLock>) -> Result<()> {
        match &self.sharing_lock {
            None => {
                lock.acquire();
                trace!("sharing lock entered");
                self.sharing_lock = Some(Arc::clone(lock));
                Ok(())
            }
            Some(held) if Arc::ptr_eq(held, lock) => Ok(()),
            Some(_) => Err(CompositionError::SharingLockConflict),
        }
    }

    /// Drains the deferred queues: non-prerequisite actions in batches
    /// until no more are scheduled, then post-composition actions once in
    /// enqueue order.
    fn complete(&mut self) -> Result<()> {
        while !self.non_prerequisite_actions.is_empty() {
            let batch = mem::take(&mut self.non_prerequisite_actions);
            trace!(actions = batch.len(), "running deferred actions");
            for action in batch {
                action(self)?;
            }
        }

        let notifications = mem::take(&mut self.post_composition_actions);
        if !notifications.is_empty() {
            trace!(
                actions = notifications.len(),
                "running post-composition actions"
            );
        }
        for action in notifications {
            action(self)?;
        }

        Ok(())
    }
}

impl Drop for CompositionOperation {
    fn drop(&mut self) {
        if let Some(lock) = self.sharing_lock.take() {
            // Held since enter_sharing_lock; released exactly once here.
            unsafe { lock.release() };
        }
    }
}

impl fmt::Debug for CompositionOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionOperation")
            .field("non_prerequisite_actions", &self.non_prerequisite_actions.len())
            .field("post_composition_actions", &self.post_composition_actions.len())
            .field("holds_sharing_lock", &self.sharing_lock.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording_activator(
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> CompositeActivator {
        let log = Arc::clone(log);
        Arc::new(move |_context, operation| {
            let log = Arc::clone(&log);
            log.lock().push("inline");

            let deferred_log = Arc::clone(&log);
            operation.add_non_prerequisite_action(Box::new(move |operation| {
                deferred_log.lock().push("deferred-1");
                let nested_log = Arc::clone(&deferred_log);
                operation.add_non_prerequisite_action(Box::new(move |_| {
                    nested_log.lock().push("deferred-nested");
                    Ok(())
                }));
                Ok(())
            }));

            let deferred_log = Arc::clone(&log);
            operation.add_non_prerequisite_action(Box::new(move |_| {
                deferred_log.lock().push("deferred-2");
                Ok(())
            }));

            let post_log = Arc::clone(&log);
            operation.add_post_composition_action(Box::new(move |_| {
                post_log.lock().push("post");
                Ok(())
            }));

            Ok(Arc::new(()) as Instance)
        })
    }

    #[test]
    fn deferred_actions_run_in_order_and_reentrantly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let context = ActivationContext::new();
        CompositionOperation::run(&context, &recording_activator(&log)).unwrap();
        assert_eq!(
            *log.lock(),
            vec!["inline", "deferred-1", "deferred-2", "deferred-nested", "post"]
        );
    }

    #[test]
    fn post_actions_see_work_scheduled_by_deferred_actions() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let activator: CompositeActivator = {
            let log = Arc::clone(&log);
            Arc::new(move |_context, operation| {
                let post_log = Arc::clone(&log);
                operation.add_post_composition_action(Box::new(move |_| {
                    post_log.lock().push("post");
                    Ok(())
                }));
                let deferred_log = Arc::clone(&log);
                operation.add_non_prerequisite_action(Box::new(move |_| {
                    deferred_log.lock().push("deferred");
                    Ok(())
                }));
                Ok(Arc::new(()) as Instance)
            })
        };
        CompositionOperation::run(&ActivationContext::new(), &activator).unwrap();
        // Post actions always run after all deferred work, regardless of
        // enqueue order.
        assert_eq!(*log.lock(), vec!["deferred", "post"]);
    }

    #[test]
    fn sharing_lock_is_reentrant_for_the_same_scope() {
        let lock = Arc::new(SharingLock::new());
        let activator: CompositeActivator = {
            let lock = Arc::clone(&lock);
            Arc::new(move |_context, operation| {
                operation.enter_sharing_lock(&lock)?;
                operation.enter_sharing_lock(&lock)?;
                Ok(Arc::new(()) as Instance)
            })
        };
        CompositionOperation::run(&ActivationContext::new(), &activator).unwrap();
        assert!(!lock.is_held());
    }

    #[test]
    fn entering_a_second_lock_fails() {
        let first = Arc::new(SharingLock::new());
        let second = Arc::new(SharingLock::new());
        let activator: CompositeActivator = {
            let first = Arc::clone(&first);
            let second = Arc::clone(&second);
            Arc::new(move |_context, operation| {
                operation.enter_sharing_lock(&first)?;
                operation.enter_sharing_lock(&second)?;
                Ok(Arc::new(()) as Instance)
            })
        };
        let err = CompositionOperation::run(&ActivationContext::new(), &activator).unwrap_err();
        assert!(matches!(err, CompositionError::SharingLockConflict));
        // The lock that was entered is still released on failure.
        assert!(!first.is_held());
        assert!(!second.is_held());
    }

    #[test]
    fn lock_released_when_an_activator_fails() {
        let lock = Arc::new(SharingLock::new());
        let activator: CompositeActivator = {
            let lock = Arc::clone(&lock);
            Arc::new(move |_context, operation| {
                operation.enter_sharing_lock(&lock)?;
                Err(CompositionError::UpdateMisuse("boom".to_string()))
            })
        };
        CompositionOperation::run(&ActivationContext::new(), &activator).unwrap_err();
        assert!(!lock.is_held());
    }

    #[test]
    fn sequential_operations_reacquire_the_lock() {
        let lock = Arc::new(SharingLock::new());
        let activator: CompositeActivator = {
            let lock = Arc::clone(&lock);
            Arc::new(move |_context, operation| {
                operation.enter_sharing_lock(&lock)?;
                Ok(Arc::new(()) as Instance)
            })
        };
        let context = ActivationContext::new();
        CompositionOperation::run(&context, &activator).unwrap();
        CompositionOperation::run(&context, &activator).unwrap();
        assert!(!lock.is_held());
    }
}
