//! Export descriptor promises.
//!
//! A promise is the unit a provider hands to the resolution pass: it
//! knows its contract, the part that declared it, whether the part is
//! shared, and two deferred computations. The first resolves the part's
//! dependency edges; the second completes the promise into an
//! [`ExportDescriptor`] once those edges have been verified. Both run at
//! most once; their results are memoized on the promise.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::trace;

use crate::contract::Contract;
use crate::dependency::Dependency;
use crate::descriptor::{ExportDescriptor, RealizedSlot};
use crate::error::{CompositionError, Result};
use crate::provider::DependencyAccessor;

/// Resolves the dependency edges of a part. Runs at most once.
pub type DependenciesFn =
    Box<dyn FnOnce(&mut dyn DependencyAccessor) -> Result<Vec<Dependency>> + Send>;

/// Completes a promise into a descriptor given its verified dependencies.
/// Runs at most once.
pub type BuildFn = Box<dyn FnOnce(&[Dependency]) -> Result<ExportDescriptor> + Send>;

/// A deferred export descriptor, memoized after first completion.
///
/// Promise identity is pointer identity: the resolution pass compares
/// promises by `Arc` address, so a provider that answers the same
/// contract twice within one pass must return the same `Arc`s (the pass
/// guarantees this by querying each provider once per contract).
pub struct ExportDescriptorPromise {
    contract: Contract,
    origin: String,
    is_shared: bool,
    dependencies_fn: Mutex<Option<DependenciesFn>>,
    dependencies: OnceCell<Vec<Dependency>>,
    build_fn: Mutex<Option<BuildFn>>,
    realized: Arc<RealizedSlot>,
    building: AtomicBool,
}

impl ExportDescriptorPromise {
    /// Creates a promise for `contract` declared by the part `origin`.
    pub fn new(
        contract: Contract,
        origin: impl Into<String>,
        is_shared: bool,
        dependencies_fn: DependenciesFn,
        build_fn: BuildFn,
    ) -> Arc<Self> {
        Arc::new(Self {
            contract,
            origin: origin.into(),
            is_shared,
            dependencies_fn: Mutex::new(Some(dependencies_fn)),
            dependencies: OnceCell::new(),
            build_fn: Mutex::new(Some(build_fn)),
            realized: Arc::new(RealizedSlot::new()),
            building: AtomicBool::new(false),
        })
    }

    /// Wraps an already-completed descriptor, as used when a resolution
    /// pass consumes entries of a previous snapshot. The promise has no
    /// dependencies left to verify and is treated as shared.
    pub fn pre_resolved(
        contract: Contract,
        origin: impl Into<String>,
        descriptor: ExportDescriptor,
    ) -> Arc<Self> {
        Arc::new(Self {
            contract,
            origin: origin.into(),
            is_shared: true,
            dependencies_fn: Mutex::new(None),
            dependencies: OnceCell::with_value(Vec::new()),
            build_fn: Mutex::new(None),
            realized: Arc::new(RealizedSlot::with(descriptor)),
            building: AtomicBool::new(false),
        })
    }

    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// The name of the part that declared this export, for messages.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether the part participates in instance sharing. Shared parts
    /// are what make deferred dependency cycles breakable.
    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    /// Resolves and memoizes the dependency edges of this promise.
    ///
    /// Re-entering while the initial resolution is still running is a
    /// protocol violation and fails; the resolution pass never does this
    /// because edges to an in-flight promise short-circuit on the
    /// traversal stack instead.
    pub fn dependencies(
        &self,
        accessor: &mut dyn DependencyAccessor,
    ) -> Result<Vec<Dependency>> {
        if let Some(dependencies) = self.dependencies.get() {
            return Ok(dependencies.clone());
        }

        let resolve = self.dependencies_fn.lock().take().ok_or_else(|| {
            CompositionError::UpdateMisuse(format!(
                "the dependencies of part '{}' were requested while still being resolved",
                self.origin
            ))
        })?;

        let dependencies = resolve(accessor)?;
        trace!(
            part = %self.origin,
            count = dependencies.len(),
            "dependencies resolved"
        );
        Ok(self.dependencies.get_or_init(|| dependencies).clone())
    }

    /// Completes this promise into a descriptor, memoizing the result.
    ///
    /// If completion is already running further up the call stack (the
    /// dependency graph loops back to this part), a cycle-breaking
    /// stand-in is returned instead; it starts working as soon as the
    /// in-flight completion finishes.
    pub fn descriptor(&self) -> Result<ExportDescriptor> {
        if let Some(descriptor) = self.realized.get() {
            return Ok(descriptor);
        }

        if self.building.load(Ordering::Acquire) {
            trace!(part = %self.origin, "completion in flight; handing out a stand-in");
            return Ok(ExportDescriptor::cycle_breaking(
                self.contract.clone(),
                Arc::clone(&self.realized),
            ));
        }

        let build = self.build_fn.lock().take().ok_or_else(|| {
            CompositionError::UpdateMisuse(format!(
                "the export descriptor of part '{}' was requested twice concurrently",
                self.origin
            ))
        })?;

        let dependencies = self.dependencies.get().ok_or_else(|| {
            CompositionError::UpdateMisuse(format!(
                "the export descriptor of part '{}' was requested before its dependencies \
                 were resolved",
                self.origin
            ))
        })?;

        self.building.store(true, Ordering::Release);
        let completed = build(dependencies);
        self.building.store(false, Ordering::Release);

        let descriptor = completed?;
        self.realized.set(descriptor.clone());
        Ok(descriptor)
    }
}

impl fmt::Debug for ExportDescriptorPromise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDescriptorPromise")
            .field("contract", &self.contract)
            .field("origin", &self.origin)
            .field("is_shared", &self.is_shared)
            .field("completed", &self.realized)
            .finish()
    }
}
