//! Activation primitives.
//!
//! An activator is a closure that produces one instance of a part within a
//! running [`CompositionOperation`]. Activators compose: the activator
//! bound for a part typically invokes the activators of its prerequisite
//! dependencies inline and schedules the rest as deferred actions.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RawMutex;
use parking_lot::lock_api::RawMutex as RawMutexApi;

use crate::error::Result;
use crate::operation::CompositionOperation;

/// A type-erased part instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Produces an instance within an operation.
///
/// Cloning is cheap; the same activator may be invoked from many call
/// sites and must be idempotent for shared parts (usually by consulting a
/// memoized slot guarded by a sharing lock).
pub type CompositeActivator =
    Arc<dyn Fn(&ActivationContext, &mut CompositionOperation) -> Result<Instance> + Send + Sync>;

/// Serializes the activation of shared parts within one sharing scope.
///
/// The lock is acquired the first time an operation enters the scope and
/// is released only when the operation is disposed, so a whole composition
/// pass observes the scope's shared state consistently.
pub struct SharingLock {
    raw: RawMutex,
}

impl SharingLock {
    pub fn new() -> Self {
        Self { raw: RawMutex::INIT }
    }

    /// Blocks until the lock is held.
    pub(crate) fn acquire(&self) {
        self.raw.lock();
    }

    /// Releases the lock.
    ///
    /// # Safety
    /// The caller must currently hold the lock via [`acquire`]. The engine
    /// upholds this through [`CompositionOperation`], which releases on
    /// drop exactly the lock it entered.
    ///
    /// [`acquire`]: SharingLock::acquire
    pub(crate) unsafe fn release(&self) {
        unsafe { self.raw.unlock() }
    }

    /// Whether some operation currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.raw.is_locked()
    }
}

impl Default for SharingLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SharingLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharingLock")
            .field("held", &self.is_held())
            .finish()
    }
}

/// Ambient state threaded through every activator invocation.
///
/// Cheap to clone; deferred actions capture a clone so they can re-invoke
/// activators after the originating call frame is gone.
#[derive(Clone, Debug)]
pub struct ActivationContext {
    sharing_lock: Arc<SharingLock>,
}

impl ActivationContext {
    /// Creates a context with a fresh sharing scope.
    pub fn new() -> Self {
        Self::with_sharing_lock(Arc::new(SharingLock::new()))
    }

    /// Creates a context over an existing sharing scope.
    pub fn with_sharing_lock(sharing_lock: Arc<SharingLock>) -> Self {
        Self { sharing_lock }
    }

    /// The sharing scope this context activates under.
    pub fn sharing_lock(&self) -> &Arc<SharingLock> {
        &self.sharing_lock
    }
}

impl Default for ActivationContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lock_is_not_held() {
        let lock = SharingLock::new();
        assert!(!lock.is_held());
        lock.acquire();
        assert!(lock.is_held());
        unsafe { lock.release() };
        assert!(!lock.is_held());
    }

    #[test]
    fn cloned_context_shares_the_lock() {
        let context = ActivationContext::new();
        let clone = context.clone();
        assert!(Arc::ptr_eq(context.sharing_lock(), clone.sharing_lock()));
    }

    #[test]
    fn distinct_contexts_have_distinct_scopes() {
        let a = ActivationContext::new();
        let b = ActivationContext::new();
        assert!(!Arc::ptr_eq(a.sharing_lock(), b.sharing_lock()));
    }
}
