//! The resolution pass.
//!
//! An [`ExportDescriptorRegistryUpdate`] computes the descriptors for one
//! requested contract on top of an existing snapshot. It gathers promises
//! from the providers (each queried once per contract), verifies the
//! dependency graph reachable from the request with a depth-first walk
//! that rejects missing, ambiguous and unbreakable-cyclic edges, and then
//! completes every gathered promise into its descriptor. The update is
//! single-use: after [`execute`] returns, its accessor refuses further
//! lookups.
//!
//! [`execute`]: ExportDescriptorRegistryUpdate::execute

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::Arc;

use tracing::{debug, instrument, trace, warn};

use crate::contract::Contract;
use crate::dependency::{Dependency, DependencyChain, DependencyKind};
use crate::descriptor::ExportDescriptor;
use crate::error::{
    CompositionError, IllegalCycleError, MissingExportError, OversuppliedExportError, Result,
};
use crate::promise::ExportDescriptorPromise;
use crate::provider::{DependencyAccessor, ExportDescriptorProvider};

/// Site label attached to the top-level request itself.
const INITIAL_REQUEST_SITE: &str = "initial request";

/// Origin label for promises wrapping entries of the existing snapshot.
const PRE_RESOLVED_ORIGIN: &str = "previously resolved part";

/// A single resolution pass over the providers and an existing snapshot.
pub struct ExportDescriptorRegistryUpdate<'a> {
    existing: &'a HashMap<Contract, Vec<ExportDescriptor>>,
    providers: &'a [Arc<dyn ExportDescriptorProvider>],
    results: HashMap<Contract, UpdateResult>,
    initial_contract: Option<Contract>,
    finalized: bool,
}

/// Per-contract provider-query state.
///
/// The tagged cursor is what makes re-entrant queries safe: a provider
/// that looks the contract it is currently answering back up simply sees
/// the promises gathered so far instead of being queried again.
enum UpdateResult {
    InProgress {
        next_provider: usize,
        promises: Vec<Arc<ExportDescriptorPromise>>,
    },
    Finalized {
        promises: Vec<Arc<ExportDescriptorPromise>>,
    },
}

/// Promises verified by the current pass, compared by `Arc` address.
#[derive(Default)]
struct VerifiedSet(HashSet<usize>);

impl VerifiedSet {
    fn contains(&self, promise: &Arc<ExportDescriptorPromise>) -> bool {
        self.0.contains(&identity(promise))
    }

    fn insert(&mut self, promise: &Arc<ExportDescriptorPromise>) {
        self.0.insert(identity(promise));
    }
}

fn identity(promise: &Arc<ExportDescriptorPromise>) -> usize {
    Arc::as_ptr(promise) as usize
}

impl<'a> ExportDescriptorRegistryUpdate<'a> {
    pub fn new(
        existing: &'a HashMap<Contract, Vec<ExportDescriptor>>,
        providers: &'a [Arc<dyn ExportDescriptorProvider>],
    ) -> Self {
        Self {
            existing,
            providers,
            results: HashMap::new(),
            initial_contract: None,
            finalized: false,
        }
    }

    /// Runs the pass for `contract` and returns the resolved descriptors
    /// for every contract the pass touched, including an empty entry for
    /// the request itself when nothing exports it.
    #[instrument(name = "registry_update", skip(self), fields(contract = %contract))]
    pub fn execute(
        &mut self,
        contract: &Contract,
    ) -> Result<HashMap<Contract, Vec<ExportDescriptor>>> {
        self.initial_contract = Some(contract.clone());

        let root =
            self.try_resolve_optional_dependency(INITIAL_REQUEST_SITE, contract, true)?;
        match root {
            Some(root) => {
                let mut verified = VerifiedSet::default();
                let mut checking = Vec::new();
                self.check_target(root, &mut verified, &mut checking)?;
            }
            None => debug!("no exports found for the requested contract"),
        }

        self.finalized = true;

        let results = mem::take(&mut self.results);
        let mut resolved = HashMap::new();
        for (result_contract, result) in results {
            // Snapshot entries were only consulted; they are already
            // published and must not be re-resolved.
            if self.existing.contains_key(&result_contract) {
                continue;
            }
            let promises = match result {
                UpdateResult::InProgress {
                    next_provider,
                    promises,
                } => {
                    debug_assert_eq!(next_provider, self.providers.len());
                    promises
                }
                UpdateResult::Finalized { promises } => promises,
            };
            let descriptors = promises
                .iter()
                .map(|promise| promise.descriptor())
                .collect::<Result<Vec<_>>>()?;
            trace!(
                contract = %result_contract,
                exports = descriptors.len(),
                "contract resolved"
            );
            resolved.insert(result_contract, descriptors);
        }

        // Memoize the miss as well, so the next lookup of an unexported
        // contract does not trigger another pass.
        resolved.entry(contract.clone()).or_default();

        debug!(contracts = resolved.len(), "resolution pass complete");
        Ok(resolved)
    }

    /// Queries the providers for `contract`, memoizing per contract so
    /// each provider is consulted at most once per pass.
    fn promises_for(&mut self, contract: &Contract) -> Result<Vec<Arc<ExportDescriptorPromise>>> {
        if self.finalized {
            return Err(CompositionError::UpdateMisuse(
                "dependency resolution is not available once the pass has completed".to_string(),
            ));
        }

        if !self.results.contains_key(contract) {
            if let Some(descriptors) = self.existing.get(contract) {
                trace!(contract = %contract, "contract found in the existing snapshot");
                let promises = descriptors
                    .iter()
                    .map(|descriptor| {
                        ExportDescriptorPromise::pre_resolved(
                            contract.clone(),
                            PRE_RESOLVED_ORIGIN,
                            descriptor.clone(),
                        )
                    })
                    .collect();
                self.results
                    .insert(contract.clone(), UpdateResult::Finalized { promises });
            } else {
                debug!(
                    contract = %contract,
                    providers = self.providers.len(),
                    "querying providers"
                );
                self.results.insert(
                    contract.clone(),
                    UpdateResult::InProgress {
                        next_provider: 0,
                        promises: Vec::new(),
                    },
                );
            }
        }

        loop {
            let provider = match self.results.get_mut(contract) {
                Some(UpdateResult::Finalized { promises }) => return Ok(promises.clone()),
                Some(UpdateResult::InProgress { next_provider, .. }) => {
                    if *next_provider >= self.providers.len() {
                        break;
                    }
                    let provider = Arc::clone(&self.providers[*next_provider]);
                    *next_provider += 1;
                    provider
                }
                None => break,
            };

            // The cursor is advanced before the provider runs, so a
            // re-entrant lookup of the same contract skips this provider
            // and observes the promises gathered so far.
            let found = provider.get_export_descriptors(contract, self);
            trace!(
                contract = %contract,
                provider = provider.name(),
                found = found.len(),
                "provider consulted"
            );
            if let Some(UpdateResult::InProgress { promises, .. }) = self.results.get_mut(contract)
            {
                promises.extend(found);
            }
        }

        match self.results.get(contract) {
            Some(
                UpdateResult::InProgress { promises, .. } | UpdateResult::Finalized { promises },
            ) => Ok(promises.clone()),
            None => Ok(Vec::new()),
        }
    }

    /// Verifies the subgraph behind one edge: the edge must be satisfied
    /// and every dependency of its target must verify in turn.
    fn check_target(
        &mut self,
        dependency: Dependency,
        verified: &mut VerifiedSet,
        checking: &mut Vec<Dependency>,
    ) -> Result<()> {
        let target = match dependency.kind() {
            DependencyKind::Satisfied { target, .. } => Arc::clone(target),
            DependencyKind::Missing => {
                return Err(self.missing_failure(&dependency, checking));
            }
            DependencyKind::Oversupplied { .. } => {
                return Err(self.oversupply_failure(&dependency, checking));
            }
        };

        if verified.contains(&target) {
            return Ok(());
        }

        checking.push(dependency);
        let dependencies = target.dependencies(self)?;
        for edge in dependencies {
            self.check_dependency(edge, verified, checking)?;
        }
        checking.pop();
        verified.insert(&target);
        Ok(())
    }

    /// Verifies one edge, short-circuiting back-edges into the traversal
    /// stack.
    ///
    /// A back-edge closes a cycle. The cycle is breakable, and therefore
    /// legal, when two things hold along the loop: at least one part in
    /// it is shared (so every traversal of the loop lands on the same
    /// instance), and no edge of the loop is a prerequisite (so the loop
    /// can be closed by deferred initialization after the instances
    /// exist). The closing edge's own prerequisite flag counts; the
    /// flag of the stack edge that first reached the looped-back part
    /// lies outside the loop and does not.
    fn check_dependency(
        &mut self,
        dependency: Dependency,
        verified: &mut VerifiedSet,
        checking: &mut Vec<Dependency>,
    ) -> Result<()> {
        let target = match dependency.kind() {
            DependencyKind::Satisfied { target, .. } => Arc::clone(target),
            DependencyKind::Missing => {
                return Err(self.missing_failure(&dependency, checking));
            }
            DependencyKind::Oversupplied { .. } => {
                return Err(self.oversupply_failure(&dependency, checking));
            }
        };

        let mut shared_seen = false;
        let mut only_deferred_edges = !dependency.is_prerequisite();
        for step in checking.iter().rev() {
            let Some(step_target) = step.target() else {
                continue;
            };
            if step_target.is_shared() {
                shared_seen = true;
            }
            if Arc::ptr_eq(step_target, &target) {
                if shared_seen && only_deferred_edges {
                    trace!(
                        contract = %dependency.contract(),
                        "breakable cycle; deferring to shared instance"
                    );
                    return Ok(());
                }
                warn!(
                    contract = %dependency.contract(),
                    "unbreakable dependency cycle"
                );
                return Err(self.cycle_failure(&dependency, checking));
            }
            if step.is_prerequisite() {
                only_deferred_edges = false;
            }
        }

        self.check_target(dependency, verified, checking)
    }

    fn chain(&self, dependency: &Dependency, checking: &[Dependency]) -> DependencyChain {
        DependencyChain::from_traversal(
            dependency.site(),
            checking,
            self.initial_contract.clone(),
        )
    }

    fn missing_failure(
        &self,
        dependency: &Dependency,
        checking: &[Dependency],
    ) -> CompositionError {
        CompositionError::MissingExport(MissingExportError {
            contract: dependency.contract().clone(),
            chain: self.chain(dependency, checking),
        })
    }

    fn oversupply_failure(
        &self,
        dependency: &Dependency,
        checking: &[Dependency],
    ) -> CompositionError {
        let mut origins: Vec<String> = match dependency.kind() {
            DependencyKind::Oversupplied { candidates } => candidates
                .iter()
                .map(|promise| promise.origin().to_string())
                .collect(),
            _ => Vec::new(),
        };
        origins.sort();
        CompositionError::OversuppliedExport(OversuppliedExportError {
            contract: dependency.contract().clone(),
            origins,
            chain: self.chain(dependency, checking),
        })
    }

    fn cycle_failure(
        &self,
        dependency: &Dependency,
        checking: &[Dependency],
    ) -> CompositionError {
        CompositionError::IllegalCycle(IllegalCycleError {
            contract: dependency.contract().clone(),
            chain: self.chain(dependency, checking),
        })
    }
}

impl DependencyAccessor for ExportDescriptorRegistryUpdate<'_> {
    fn resolve_dependencies(
        &mut self,
        site: &str,
        contract: &Contract,
        is_prerequisite: bool,
    ) -> Result<Vec<Dependency>> {
        let promises = self.promises_for(contract)?;
        Ok(promises
            .into_iter()
            .map(|promise| {
                Dependency::satisfied(contract.clone(), site, promise, is_prerequisite)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Widget;

    fn leaf_promise(contract: &Contract, origin: &str) -> Arc<ExportDescriptorPromise> {
        let origin = origin.to_string();
        ExportDescriptorPromise::new(
            contract.clone(),
            origin,
            false,
            Box::new(|_| Ok(Vec::new())),
            Box::new(|_| Ok(ExportDescriptor::noop())),
        )
    }

    /// Provider that looks its own contract back up while answering and
    /// records how many promises the re-entrant query observed.
    struct ReentrantProvider {
        observed: AtomicUsize,
    }

    impl ExportDescriptorProvider for ReentrantProvider {
        fn get_export_descriptors(
            &self,
            contract: &Contract,
            accessor: &mut dyn DependencyAccessor,
        ) -> Vec<Arc<ExportDescriptorPromise>> {
            let partial = accessor
                .resolve_dependencies("peek", contract, false)
                .unwrap_or_default();
            self.observed.store(partial.len(), Ordering::SeqCst);
            vec![leaf_promise(contract, "ReentrantPart")]
        }
    }

    #[test]
    fn pass_memoizes_a_miss() {
        let existing = HashMap::new();
        let providers: Vec<Arc<dyn ExportDescriptorProvider>> = Vec::new();
        let mut update = ExportDescriptorRegistryUpdate::new(&existing, &providers);
        let contract = Contract::of::<Widget>();
        let resolved = update.execute(&contract).unwrap();
        assert_eq!(resolved.get(&contract).map(Vec::len), Some(0));
    }

    #[test]
    fn accessor_is_closed_after_the_pass() {
        let existing = HashMap::new();
        let providers: Vec<Arc<dyn ExportDescriptorProvider>> = Vec::new();
        let mut update = ExportDescriptorRegistryUpdate::new(&existing, &providers);
        let contract = Contract::of::<Widget>();
        update.execute(&contract).unwrap();

        let err = update
            .resolve_dependencies("late", &contract, true)
            .unwrap_err();
        assert!(matches!(err, CompositionError::UpdateMisuse(_)));
    }

    #[test]
    fn reentrant_provider_query_observes_partial_state() {
        let provider = Arc::new(ReentrantProvider {
            observed: AtomicUsize::new(usize::MAX),
        });
        let existing = HashMap::new();
        let providers: Vec<Arc<dyn ExportDescriptorProvider>> = vec![Arc::clone(&provider) as _];
        let mut update = ExportDescriptorRegistryUpdate::new(&existing, &providers);

        let contract = Contract::of::<Widget>();
        let resolved = update.execute(&contract).unwrap();

        // The provider saw no promises for the contract it was in the
        // middle of answering, and did not recurse into itself.
        assert_eq!(provider.observed.load(Ordering::SeqCst), 0);
        assert_eq!(resolved.get(&contract).map(Vec::len), Some(1));
    }

    #[test]
    fn snapshot_entries_are_consulted_but_not_republished() {
        struct Consumer;

        let widget = Contract::of::<Widget>();
        let consumer = Contract::of::<Consumer>();

        let mut existing = HashMap::new();
        existing.insert(widget.clone(), vec![ExportDescriptor::noop()]);

        struct ConsumerProvider {
            consumer: Contract,
            widget: Contract,
        }

        impl ExportDescriptorProvider for ConsumerProvider {
            fn get_export_descriptors(
                &self,
                contract: &Contract,
                _accessor: &mut dyn DependencyAccessor,
            ) -> Vec<Arc<ExportDescriptorPromise>> {
                if contract != &self.consumer {
                    return Vec::new();
                }
                let widget = self.widget.clone();
                vec![ExportDescriptorPromise::new(
                    contract.clone(),
                    "ConsumerPart",
                    false,
                    Box::new(move |accessor| {
                        Ok(vec![accessor.resolve_required_dependency(
                            "widget", &widget, true,
                        )?])
                    }),
                    Box::new(|_| Ok(ExportDescriptor::noop())),
                )]
            }
        }

        let providers: Vec<Arc<dyn ExportDescriptorProvider>> = vec![Arc::new(ConsumerProvider {
            consumer: consumer.clone(),
            widget: widget.clone(),
        })];
        let mut update = ExportDescriptorRegistryUpdate::new(&existing, &providers);
        let resolved = update.execute(&consumer).unwrap();

        assert_eq!(resolved.get(&consumer).map(Vec::len), Some(1));
        // The widget came from the snapshot; the pass must not emit a
        // fresh entry for it.
        assert!(!resolved.contains_key(&widget));
    }
}
