//! Composition error taxonomy.
//!
//! Fatal resolution failures carry the contract they concern and the
//! "required by" chain captured at the point of failure, so the rendered
//! message walks from the direct cause back to the initial request.

use std::fmt;

use thiserror::Error;

use tarkib_support::rendering::render_origin_list;

use crate::contract::Contract;
use crate::dependency::DependencyChain;

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, CompositionError>;

/// Errors surfaced by composition, resolution and activation.
#[derive(Debug, Error)]
pub enum CompositionError {
    /// A required contract had no candidate exports.
    #[error("{0}")]
    MissingExport(MissingExportError),

    /// A contract required to be single had several candidate exports.
    #[error("{0}")]
    OversuppliedExport(OversuppliedExportError),

    /// The dependency graph contains a cycle that deferred initialization
    /// cannot break.
    #[error("{0}")]
    IllegalCycle(IllegalCycleError),

    /// An activator tried to hold two distinct sharing locks at once.
    #[error("the operation already holds a different sharing lock")]
    SharingLockConflict,

    /// A cycle-breaking descriptor was activated before the real
    /// descriptor behind it was completed.
    #[error("{0}")]
    PrematureActivation(PrematureActivationError),

    /// An activator failed while constructing an instance.
    #[error("Failed to activate an export for the contract '{contract}': {source}")]
    ActivationFailed {
        contract: Contract,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The promise or update protocol was driven out of order.
    #[error("{0}")]
    UpdateMisuse(String),
}

/// Payload of [`CompositionError::MissingExport`].
#[derive(Debug)]
pub struct MissingExportError {
    pub contract: Contract,
    pub chain: DependencyChain,
}

impl fmt::Display for MissingExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "No export was found for the contract '{}'{}.",
            self.contract,
            self.chain.suffix()
        )
    }
}

/// Payload of [`CompositionError::OversuppliedExport`].
///
/// `origins` names the competing parts when they are known; lookups that
/// fail against an already-resolved cache entry leave it empty.
#[derive(Debug)]
pub struct OversuppliedExportError {
    pub contract: Contract,
    pub origins: Vec<String>,
    pub chain: DependencyChain,
}

impl fmt::Display for OversuppliedExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Multiple implementations of the contract '{}' were found",
            self.contract
        )?;
        if !self.origins.is_empty() {
            write!(f, ": {}", render_origin_list(&self.origins))?;
        }
        write!(f, "{}.", self.chain.suffix())
    }
}

/// Payload of [`CompositionError::IllegalCycle`].
#[derive(Debug)]
pub struct IllegalCycleError {
    pub contract: Contract,
    pub chain: DependencyChain,
}

impl fmt::Display for IllegalCycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "An unbreakable dependency cycle was detected involving the contract '{}'{}.",
            self.contract,
            self.chain.suffix()
        )
    }
}

/// Payload of [`CompositionError::PrematureActivation`].
#[derive(Debug)]
pub struct PrematureActivationError {
    pub contract: Contract,
}

impl fmt::Display for PrematureActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "An export for the contract '{}' was activated before its descriptor was completed.",
            self.contract
        )
    }
}
