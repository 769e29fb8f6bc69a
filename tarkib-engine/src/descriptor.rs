//! Export descriptors.
//!
//! A completed promise yields an [`ExportDescriptor`]: the activator that
//! constructs instances plus the export's metadata. Descriptors come in
//! two forms. A direct descriptor carries its activator outright. A
//! cycle-breaking descriptor stands in for a part that is still being
//! completed further up the call stack; it forwards to the real descriptor
//! once that one lands in the shared slot.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::activation::{ActivationContext, CompositeActivator};
use crate::contract::Contract;
use crate::error::{CompositionError, PrematureActivationError, Result};
use crate::operation::CompositionOperation;

/// Arbitrary typed metadata attached to an export.
pub type ExportMetadata = HashMap<String, Arc<dyn Any + Send + Sync>>;

/// The product of a completed (or in-flight) promise.
#[derive(Clone)]
pub struct ExportDescriptor {
    inner: DescriptorInner,
}

#[derive(Clone)]
enum DescriptorInner {
    Direct {
        activator: CompositeActivator,
        metadata: Arc<ExportMetadata>,
    },
    CycleBreaking {
        contract: Contract,
        realized: Arc<RealizedSlot>,
    },
}

impl ExportDescriptor {
    /// Creates a descriptor from an activator and its metadata.
    pub fn direct(activator: CompositeActivator, metadata: ExportMetadata) -> Self {
        Self {
            inner: DescriptorInner::Direct {
                activator,
                metadata: Arc::new(metadata),
            },
        }
    }

    /// Creates a stand-in descriptor that forwards to `realized` once the
    /// real descriptor has been stored there.
    pub(crate) fn cycle_breaking(contract: Contract, realized: Arc<RealizedSlot>) -> Self {
        Self {
            inner: DescriptorInner::CycleBreaking { contract, realized },
        }
    }

    /// Returns the activator for this export.
    ///
    /// For a cycle-breaking descriptor the returned activator defers the
    /// slot lookup to invocation time; invoking it before the real
    /// descriptor is completed fails with
    /// [`CompositionError::PrematureActivation`].
    pub fn activator(&self) -> CompositeActivator {
        match &self.inner {
            DescriptorInner::Direct { activator, .. } => Arc::clone(activator),
            DescriptorInner::CycleBreaking { contract, realized } => {
                let contract = contract.clone();
                let realized = Arc::clone(realized);
                Arc::new(
                    move |context: &ActivationContext, operation: &mut CompositionOperation| {
                        match realized.get() {
                            Some(descriptor) => (descriptor.activator())(context, operation),
                            None => Err(CompositionError::PrematureActivation(
                                PrematureActivationError {
                                    contract: contract.clone(),
                                },
                            )),
                        }
                    },
                )
            }
        }
    }

    /// Returns the metadata of this export.
    ///
    /// Fails for a cycle-breaking descriptor whose real counterpart has
    /// not been completed yet.
    pub fn metadata(&self) -> Result<Arc<ExportMetadata>> {
        match &self.inner {
            DescriptorInner::Direct { metadata, .. } => Ok(Arc::clone(metadata)),
            DescriptorInner::CycleBreaking { contract, realized } => match realized.get() {
                Some(descriptor) => descriptor.metadata(),
                None => Err(CompositionError::PrematureActivation(
                    PrematureActivationError {
                        contract: contract.clone(),
                    },
                )),
            },
        }
    }

    /// A descriptor with no metadata whose activator yields a unit
    /// instance. Handy as a placeholder in tests.
    #[cfg(test)]
    pub(crate) fn noop() -> Self {
        use crate::activation::Instance;
        Self::direct(
            Arc::new(|_, _| Ok(Arc::new(()) as Instance)),
            ExportMetadata::new(),
        )
    }
}

impl fmt::Debug for ExportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            DescriptorInner::Direct { metadata, .. } => f
                .debug_struct("ExportDescriptor")
                .field("metadata_keys", &metadata.len())
                .finish_non_exhaustive(),
            DescriptorInner::CycleBreaking { contract, realized } => f
                .debug_struct("ExportDescriptor::CycleBreaking")
                .field("contract", contract)
                .field("completed", &realized.get().is_some())
                .finish(),
        }
    }
}

/// Write-once slot that a promise fills with its real descriptor.
///
/// Shared between the promise and any cycle-breaking descriptors it hands
/// out while completion is in flight.
pub(crate) struct RealizedSlot {
    cell: OnceCell<ExportDescriptor>,
}

impl RealizedSlot {
    pub(crate) fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub(crate) fn with(descriptor: ExportDescriptor) -> Self {
        Self {
            cell: OnceCell::with_value(descriptor),
        }
    }

    pub(crate) fn get(&self) -> Option<ExportDescriptor> {
        self.cell.get().cloned()
    }

    /// Stores the completed descriptor. A second store is ignored; the
    /// first completion wins.
    pub(crate) fn set(&self, descriptor: ExportDescriptor) {
        let _ = self.cell.set(descriptor);
    }
}

impl fmt::Debug for RealizedSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealizedSlot")
            .field("completed", &self.cell.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::Instance;
    use crate::operation::CompositionOperation;

    struct Widget;

    #[test]
    fn direct_descriptor_activates() {
        let descriptor = ExportDescriptor::direct(
            Arc::new(|_, _| Ok(Arc::new(42u32) as Instance)),
            ExportMetadata::new(),
        );
        let context = ActivationContext::new();
        let mut operation = CompositionOperation::new();
        let instance = (descriptor.activator())(&context, &mut operation).unwrap();
        assert_eq!(*instance.downcast_ref::<u32>().unwrap(), 42);
    }

    #[test]
    fn direct_descriptor_exposes_metadata() {
        let mut metadata = ExportMetadata::new();
        metadata.insert("priority".to_string(), Arc::new(7i32));
        let descriptor =
            ExportDescriptor::direct(Arc::new(|_, _| Ok(Arc::new(()) as Instance)), metadata);
        let metadata = descriptor.metadata().unwrap();
        let priority = metadata.get("priority").unwrap();
        assert_eq!(*priority.downcast_ref::<i32>().unwrap(), 7);
    }

    #[test]
    fn premature_activation_is_rejected() {
        let slot = Arc::new(RealizedSlot::new());
        let stand_in = ExportDescriptor::cycle_breaking(Contract::of::<Widget>(), slot);

        let context = ActivationContext::new();
        let mut operation = CompositionOperation::new();
        let err = (stand_in.activator())(&context, &mut operation).unwrap_err();
        assert!(matches!(err, CompositionError::PrematureActivation(_)));
        assert!(stand_in.metadata().is_err());
    }

    #[test]
    fn stand_in_forwards_after_completion() {
        let slot = Arc::new(RealizedSlot::new());
        let stand_in = ExportDescriptor::cycle_breaking(Contract::of::<Widget>(), Arc::clone(&slot));

        // The stand-in's activator may be captured before completion and
        // still work once the real descriptor lands.
        let activator = stand_in.activator();
        slot.set(ExportDescriptor::direct(
            Arc::new(|_, _| Ok(Arc::new("real") as Instance)),
            ExportMetadata::new(),
        ));

        let context = ActivationContext::new();
        let mut operation = CompositionOperation::new();
        let instance = activator(&context, &mut operation).unwrap();
        assert_eq!(*instance.downcast_ref::<&str>().unwrap(), "real");
        assert!(stand_in.metadata().is_ok());
    }
}
