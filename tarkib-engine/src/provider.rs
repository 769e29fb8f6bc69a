//! Provider and accessor seams.
//!
//! Providers are the pluggable sources of promises; the accessor is the
//! engine-side callback a provider (or a promise's dependency resolver)
//! uses to look up further contracts within the same resolution pass.

use std::any::type_name;
use std::sync::Arc;

use crate::contract::Contract;
use crate::dependency::Dependency;
use crate::error::Result;
use crate::promise::ExportDescriptorPromise;

/// A source of export descriptor promises.
///
/// Implementations are queried once per contract per resolution pass and
/// may themselves resolve dependencies through the accessor while
/// answering; re-entrant queries for the contract currently being
/// assembled observe the promises gathered so far.
pub trait ExportDescriptorProvider: Send + Sync {
    /// Returns every promise this provider contributes for `contract`.
    fn get_export_descriptors(
        &self,
        contract: &Contract,
        accessor: &mut dyn DependencyAccessor,
    ) -> Vec<Arc<ExportDescriptorPromise>>;

    /// Provider name for diagnostics.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// Resolution callback handed to providers and dependency resolvers.
///
/// `site` tags each lookup with the importing location so failures can
/// report where a contract was demanded.
pub trait DependencyAccessor {
    /// Resolves every candidate for `contract`, one satisfied edge per
    /// candidate promise.
    fn resolve_dependencies(
        &mut self,
        site: &str,
        contract: &Contract,
        is_prerequisite: bool,
    ) -> Result<Vec<Dependency>>;

    /// Resolves a contract that must have exactly one candidate.
    ///
    /// Cardinality violations are not reported here; they come back as
    /// `Missing`/`Oversupplied` edges so the resolution pass can attach
    /// the full dependency chain when it rejects them.
    fn resolve_required_dependency(
        &mut self,
        site: &str,
        contract: &Contract,
        is_prerequisite: bool,
    ) -> Result<Dependency> {
        let mut all = self.resolve_dependencies(site, contract, is_prerequisite)?;
        Ok(match all.len() {
            0 => Dependency::missing(contract.clone(), site),
            1 => all.remove(0),
            _ => oversupplied(contract, site, all),
        })
    }

    /// Resolves a contract that may be absent. `None` when no candidate
    /// exists; an `Oversupplied` edge when several do.
    fn try_resolve_optional_dependency(
        &mut self,
        site: &str,
        contract: &Contract,
        is_prerequisite: bool,
    ) -> Result<Option<Dependency>> {
        let mut all = self.resolve_dependencies(site, contract, is_prerequisite)?;
        Ok(match all.len() {
            0 => None,
            1 => Some(all.remove(0)),
            _ => Some(oversupplied(contract, site, all)),
        })
    }
}

fn oversupplied(contract: &Contract, site: &str, all: Vec<Dependency>) -> Dependency {
    let candidates = all
        .into_iter()
        .filter_map(|dep| dep.target().cloned())
        .collect();
    Dependency::oversupplied(contract.clone(), site, candidates)
}
