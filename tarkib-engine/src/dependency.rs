//! Dependency edges of the composition graph.
//!
//! A [`Dependency`] is a directed edge from a consuming part to one target
//! promise. Absence ("missing") and ambiguity ("oversupplied") are encoded
//! as edge variants rather than errors, so the resolution pass can decide
//! whether they are fatal for the request at hand.

use std::fmt;
use std::sync::Arc;

use tarkib_support::rendering::render_required_by_chain;

use crate::contract::Contract;
use crate::promise::ExportDescriptorPromise;

/// One edge of the dependency graph, tagged with the import site that
/// produced it for error reporting.
#[derive(Clone)]
pub struct Dependency {
    contract: Contract,
    site: String,
    kind: DependencyKind,
}

/// The resolution outcome behind a [`Dependency`].
#[derive(Clone, Debug)]
pub enum DependencyKind {
    /// Exactly one candidate promise satisfies the edge.
    Satisfied {
        target: Arc<ExportDescriptorPromise>,
        /// Prerequisite edges must be fully constructed before the
        /// consumer's construction proceeds; non-prerequisite edges may be
        /// filled in afterwards.
        is_prerequisite: bool,
    },
    /// No candidate promise exists for the contract.
    Missing,
    /// More than one candidate promise exists where one was required.
    Oversupplied {
        candidates: Vec<Arc<ExportDescriptorPromise>>,
    },
}

impl Dependency {
    /// Creates a satisfied edge pointing at `target`.
    pub fn satisfied(
        contract: Contract,
        site: impl Into<String>,
        target: Arc<ExportDescriptorPromise>,
        is_prerequisite: bool,
    ) -> Self {
        debug_assert_eq!(target.contract(), &contract);
        Self {
            contract,
            site: site.into(),
            kind: DependencyKind::Satisfied {
                target,
                is_prerequisite,
            },
        }
    }

    /// Creates a placeholder edge for a contract with no candidates.
    pub fn missing(contract: Contract, site: impl Into<String>) -> Self {
        Self {
            contract,
            site: site.into(),
            kind: DependencyKind::Missing,
        }
    }

    /// Creates a placeholder edge for a contract with too many candidates.
    pub fn oversupplied(
        contract: Contract,
        site: impl Into<String>,
        candidates: Vec<Arc<ExportDescriptorPromise>>,
    ) -> Self {
        Self {
            contract,
            site: site.into(),
            kind: DependencyKind::Oversupplied { candidates },
        }
    }

    /// The contract this edge asks for.
    pub fn contract(&self) -> &Contract {
        &self.contract
    }

    /// The import site that produced this edge, used in error messages.
    pub fn site(&self) -> &str {
        &self.site
    }

    /// The resolution outcome.
    pub fn kind(&self) -> &DependencyKind {
        &self.kind
    }

    /// `true` for the `Missing` and `Oversupplied` variants.
    pub fn is_error(&self) -> bool {
        !matches!(self.kind, DependencyKind::Satisfied { .. })
    }

    /// Whether the consumer requires the target before its own
    /// construction can proceed. Error variants report `true`; they never
    /// participate in traversal, only in failure reporting.
    pub fn is_prerequisite(&self) -> bool {
        match &self.kind {
            DependencyKind::Satisfied {
                is_prerequisite, ..
            } => *is_prerequisite,
            _ => true,
        }
    }

    /// The target promise of a satisfied edge.
    pub fn target(&self) -> Option<&Arc<ExportDescriptorPromise>> {
        match &self.kind {
            DependencyKind::Satisfied { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            DependencyKind::Satisfied {
                target,
                is_prerequisite,
            } => format!(
                "Satisfied(part={}, prerequisite={is_prerequisite})",
                target.origin()
            ),
            DependencyKind::Missing => "Missing".to_string(),
            DependencyKind::Oversupplied { candidates } => {
                format!("Oversupplied({} candidates)", candidates.len())
            }
        };
        write!(
            f,
            "Dependency({} at '{}', {kind})",
            self.contract, self.site
        )
    }
}

/// One frame of a failure chain: the import site that demanded a contract
/// and the part that declared the import.
#[derive(Debug, Clone)]
pub struct ChainFrame {
    pub site: String,
    pub origin: String,
}

/// The "required by" chain captured when a resolution pass fails.
///
/// An empty chain with no initial request renders nothing; this is the
/// shape used when a required lookup fails directly at the registry
/// surface.
#[derive(Debug, Clone, Default)]
pub struct DependencyChain {
    pub frames: Vec<ChainFrame>,
    pub initial_request: Option<Contract>,
}

impl DependencyChain {
    /// Captures the chain for a failure at `failing_site`, given the stack
    /// of edges currently being verified (outermost first).
    ///
    /// Each stack edge contributes one frame: the part it targets owns the
    /// import that failed one level deeper, so sites cascade downwards
    /// while origins come from the edge targets.
    pub(crate) fn from_traversal(
        failing_site: &str,
        checking: &[Dependency],
        initial_request: Option<Contract>,
    ) -> Self {
        let mut frames = Vec::with_capacity(checking.len());
        let mut site = failing_site.to_string();

        for edge in checking.iter().rev() {
            if let Some(target) = edge.target() {
                frames.push(ChainFrame {
                    site: std::mem::replace(&mut site, edge.site().to_string()),
                    origin: target.origin().to_string(),
                });
            }
        }

        Self {
            frames,
            initial_request,
        }
    }

    /// Renders the chain suffix appended after a primary cause. Empty for
    /// a default chain.
    pub(crate) fn suffix(&self) -> String {
        let frames: Vec<(String, String)> = self
            .frames
            .iter()
            .map(|f| (f.site.clone(), f.origin.clone()))
            .collect();
        let initial = self.initial_request.as_ref().map(ToString::to_string);
        render_required_by_chain(&frames, initial.as_deref())
    }
}
