//! Tarkib: a composition (dependency injection) framework.
//!
//! Tarkib wires applications together from *parts*. Each part exports a
//! capability under a [`Contract`] and imports the contracts it needs;
//! providers describe the available parts as promises, the engine
//! verifies the resulting dependency graph up front (missing exports,
//! ambiguous exports and unbreakable cycles are rejected with a full
//! "required by" chain), and activators construct the instances on
//! demand.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tarkib::prelude::*;
//!
//! struct GreeterProvider;
//!
//! impl ExportDescriptorProvider for GreeterProvider {
//!     fn get_export_descriptors(
//!         &self,
//!         contract: &Contract,
//!         _accessor: &mut dyn DependencyAccessor,
//!     ) -> Vec<Arc<ExportDescriptorPromise>> {
//!         if *contract != Contract::of::<String>() {
//!             return Vec::new();
//!         }
//!         vec![ExportDescriptorPromise::new(
//!             contract.clone(),
//!             "Greeter",
//!             false,
//!             Box::new(|_| Ok(Vec::new())),
//!             Box::new(|_| {
//!                 Ok(ExportDescriptor::direct(
//!                     Arc::new(|_, _| Ok(Arc::new("hello".to_string()) as Instance)),
//!                     ExportMetadata::new(),
//!                 ))
//!             }),
//!         )]
//!     }
//! }
//!
//! let registry = ExportDescriptorRegistry::new(vec![Arc::new(GreeterProvider)]);
//! let descriptor = registry.get_single_for_export(&Contract::of::<String>())?;
//! let instance =
//!     CompositionOperation::run(&ActivationContext::new(), &descriptor.activator())?;
//! assert_eq!(instance.downcast_ref::<String>().unwrap(), "hello");
//! # Ok::<(), CompositionError>(())
//! ```

pub use tarkib_engine::{
    ActivationContext, CompositeActivator, CompositionError, CompositionOperation, Contract,
    Dependency, DependencyAccessor, DependencyKind, ExportDescriptor, ExportDescriptorPromise,
    ExportDescriptorProvider, ExportDescriptorRegistry, ExportDescriptorRegistryUpdate,
    ExportMetadata, Instance, Result, SharingLock, prelude,
};

pub use tarkib_support as support;
