//! Core engine of the Tarkib composition framework.
//!
//! The engine resolves contracts to export descriptors in three layers:
//!
//! * providers contribute [`promise`]s for contracts on demand;
//! * a resolution pass ([`update`]) verifies the dependency graph behind
//!   a request and completes the promises it gathered;
//! * the [`registry`] memoizes the pass results in a copy-on-write
//!   snapshot shared by all readers.
//!
//! Instances are produced later, by running a completed descriptor's
//! activator inside a [`operation::CompositionOperation`].

pub mod activation;
pub mod contract;
pub mod dependency;
pub mod descriptor;
pub mod error;
pub mod operation;
pub mod promise;
pub mod provider;
pub mod registry;
pub mod update;

pub use activation::{ActivationContext, CompositeActivator, Instance, SharingLock};
pub use contract::Contract;
pub use dependency::{Dependency, DependencyKind};
pub use descriptor::{ExportDescriptor, ExportMetadata};
pub use error::{CompositionError, Result};
pub use operation::CompositionOperation;
pub use promise::ExportDescriptorPromise;
pub use provider::{DependencyAccessor, ExportDescriptorProvider};
pub use registry::{ExportDescriptorRegistry, prelude};
pub use update::ExportDescriptorRegistryUpdate;
