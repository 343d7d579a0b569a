//! Resolution strategies.
//!
//! A [`ResolveStrategy`] computes one resolution round over a read-only
//! [`Snapshot`]; the registry commits what the round produces. Strategies
//! are chosen when the registry is built.

mod fixpoint;

pub use fixpoint::FixpointStrategy;

use crate::matcher::{self, Candidate};
use crate::model::{ModuleId, Namespace, Requirement, Wiring};
use crate::registry::Snapshot;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Failure codes carried by [`ResolveFailure`].
pub mod codes {
    pub const UNSATISFIED_REQUIREMENT: &str = "UNSATISFIED_REQUIREMENT";
    pub const SINGLETON_CONFLICT: &str = "SINGLETON_CONFLICT";
    pub const FRAGMENT_HOST_MISSING: &str = "FRAGMENT_HOST_MISSING";
    pub const ROUND_LIMIT: &str = "ROUND_LIMIT";
}

/// Why a module was left unresolved. Not an error: always retryable once
/// the blocking condition changes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolveFailure {
    /// No capability satisfies this mandatory requirement.
    UnsatisfiedRequirement { requirement: Arc<Requirement> },
    /// Another singleton module with the same symbolic name won.
    SingletonConflict { incumbent: ModuleId },
    /// No attachable host matches the fragment's host requirement.
    FragmentHostMissing { requirement: Arc<Requirement> },
    /// Resolution stopped at the configured round limit.
    RoundLimit,
}

impl ResolveFailure {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsatisfiedRequirement { .. } => codes::UNSATISFIED_REQUIREMENT,
            Self::SingletonConflict { .. } => codes::SINGLETON_CONFLICT,
            Self::FragmentHostMissing { .. } => codes::FRAGMENT_HOST_MISSING,
            Self::RoundLimit => codes::ROUND_LIMIT,
        }
    }

    /// The blocking requirement, when there is one.
    #[must_use]
    pub fn requirement(&self) -> Option<&Arc<Requirement>> {
        match self {
            Self::UnsatisfiedRequirement { requirement }
            | Self::FragmentHostMissing { requirement } => Some(requirement),
            Self::SingletonConflict { .. } | Self::RoundLimit => None,
        }
    }

    #[must_use]
    pub fn is_singleton_conflict(&self) -> bool {
        matches!(self, Self::SingletonConflict { .. })
    }
}

impl fmt::Display for ResolveFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsatisfiedRequirement { requirement } => write!(
                f,
                "{}: nothing provides {} {} {}",
                self.code(),
                requirement.namespace(),
                requirement.name(),
                requirement.range()
            ),
            Self::SingletonConflict { incumbent } => write!(
                f,
                "{}: singleton already taken by module {incumbent}",
                self.code()
            ),
            Self::FragmentHostMissing { requirement } => write!(
                f,
                "{}: no attachable host {} {}",
                self.code(),
                requirement.name(),
                requirement.range()
            ),
            Self::RoundLimit => write!(f, "{}: round limit reached", self.code()),
        }
    }
}

/// What one round produced: wirings to commit and per-module failures.
#[derive(Debug, Default)]
pub struct RoundOutcome {
    pub wirings: Vec<Wiring>,
    pub failures: BTreeMap<ModuleId, ResolveFailure>,
}

/// A resolution algorithm.
pub trait ResolveStrategy: Send + Sync {
    /// Strategy name, for logs.
    fn name(&self) -> &'static str;

    /// Compute one round for the unresolved modules of `snapshot`.
    ///
    /// `requested` are the modules the caller asked for; other unresolved
    /// modules are only resolved when a requested module needs them.
    fn resolve_round(&self, snapshot: &Snapshot, requested: &BTreeSet<ModuleId>) -> RoundOutcome;

    /// The best resolved provider for a single requirement, skipping
    /// `exclude`.
    fn find_provider(
        &self,
        snapshot: &Snapshot,
        requirement: &Requirement,
        exclude: Option<ModuleId>,
    ) -> Option<Candidate> {
        let candidates: Vec<Candidate> = snapshot
            .resolved()
            .filter(|(id, _, _)| Some(*id) != exclude)
            .flat_map(|(id, module, wiring)| {
                let caps = match requirement.namespace() {
                    Namespace::Package => wiring.exports().to_vec(),
                    namespace => module.capabilities_in(namespace).cloned().collect(),
                };
                caps.into_iter().map(move |c| Candidate::new(c, id, true))
            })
            .collect();
        matcher::best(requirement, &candidates)
    }
}
