//! The export descriptor registry.
//!
//! The registry is the concurrent front door of the engine: it caches
//! resolved descriptors per contract in a copy-on-write snapshot and runs
//! a [`ExportDescriptorRegistryUpdate`] on a miss. Readers never block on
//! writers; they clone the current snapshot handle and look their
//! contract up in an immutable map. Updates are serialized by a dedicated
//! lock and republish the snapshot with the pass's results folded in,
//! misses included, so each contract triggers at most one pass.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::contract::Contract;
use crate::dependency::DependencyChain;
use crate::descriptor::ExportDescriptor;
use crate::error::{
    CompositionError, MissingExportError, OversuppliedExportError, Result,
};
use crate::provider::ExportDescriptorProvider;
use crate::update::ExportDescriptorRegistryUpdate;

type Snapshot = Arc<HashMap<Contract, Vec<ExportDescriptor>>>;

/// Memoizing, thread-safe cache of resolved export descriptors.
pub struct ExportDescriptorRegistry {
    providers: Vec<Arc<dyn ExportDescriptorProvider>>,
    snapshot: RwLock<Snapshot>,
    update_lock: Mutex<()>,
}

impl ExportDescriptorRegistry {
    pub fn new(providers: Vec<Arc<dyn ExportDescriptorProvider>>) -> Self {
        Self {
            providers,
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            update_lock: Mutex::new(()),
        }
    }

    /// Returns the single descriptor for `contract`, or `None` when the
    /// contract has no exports. Fails when several exports compete.
    pub fn try_get_single_for_export(
        &self,
        contract: &Contract,
    ) -> Result<Option<ExportDescriptor>> {
        let snapshot = Arc::clone(&self.snapshot.read());
        if let Some(descriptors) = snapshot.get(contract) {
            return Self::single(contract, descriptors);
        }

        let _update_guard = self.update_lock.lock();

        // Double-checked: another thread may have resolved this contract
        // while we waited for the update lock.
        let snapshot = Arc::clone(&self.snapshot.read());
        if let Some(descriptors) = snapshot.get(contract) {
            return Self::single(contract, descriptors);
        }

        debug!(contract = %contract, "contract not cached, starting a resolution pass");
        let mut update = ExportDescriptorRegistryUpdate::new(&snapshot, &self.providers);
        let resolved = update.execute(contract)?;

        let mut next: HashMap<Contract, Vec<ExportDescriptor>> = (*snapshot).clone();
        next.extend(resolved);
        let next = Arc::new(next);
        trace!(contracts = next.len(), "publishing registry snapshot");
        *self.snapshot.write() = Arc::clone(&next);

        match next.get(contract) {
            Some(descriptors) => Self::single(contract, descriptors),
            None => Ok(None),
        }
    }

    /// Returns the single descriptor for `contract`, failing when it is
    /// absent.
    pub fn get_single_for_export(&self, contract: &Contract) -> Result<ExportDescriptor> {
        self.try_get_single_for_export(contract)?.ok_or_else(|| {
            CompositionError::MissingExport(MissingExportError {
                contract: contract.clone(),
                chain: DependencyChain::default(),
            })
        })
    }

    fn single(
        contract: &Contract,
        descriptors: &[ExportDescriptor],
    ) -> Result<Option<ExportDescriptor>> {
        match descriptors {
            [] => Ok(None),
            [single] => Ok(Some(single.clone())),
            _ => Err(CompositionError::OversuppliedExport(OversuppliedExportError {
                contract: contract.clone(),
                origins: Vec::new(),
                chain: DependencyChain::default(),
            })),
        }
    }
}

impl fmt::Debug for ExportDescriptorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportDescriptorRegistry")
            .field("providers", &self.providers.len())
            .field("cached_contracts", &self.snapshot.read().len())
            .finish()
    }
}

/// Convenient glob import for consumers of the engine.
pub mod prelude {
    pub use super::ExportDescriptorRegistry;
    pub use crate::activation::{ActivationContext, CompositeActivator, Instance, SharingLock};
    pub use crate::contract::Contract;
    pub use crate::dependency::{Dependency, DependencyKind};
    pub use crate::descriptor::{ExportDescriptor, ExportMetadata};
    pub use crate::error::{CompositionError, Result};
    pub use crate::operation::CompositionOperation;
    pub use crate::promise::ExportDescriptorPromise;
    pub use crate::provider::{DependencyAccessor, ExportDescriptorProvider};
}
