//! Lazy wiring of dynamic package requirements.
//!
//! A dynamic lookup happens at load time, often while the caller is itself
//! in the middle of loading something. Lookups therefore run against the
//! published snapshot and only take the resolution lock opportunistically.

use crate::matcher::{self, compare_candidates, Candidate};
use crate::model::{ModuleId, Namespace, Requirement, Wire};
use crate::registry::ModuleRegistry;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Per-caller state for dynamic lookups.
///
/// Tracks how deeply lookups of each package are nested so a lookup that
/// re-enters itself gives up instead of recursing. One context per logical
/// caller (thread, task, or loader chain).
#[derive(Debug, Default)]
pub struct DynamicContext {
    depths: Mutex<HashMap<String, usize>>,
}

impl DynamicContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a lookup of `package` as in progress until the guard drops.
    #[must_use]
    pub fn enter(&self, package: &str) -> DepthGuard<'_> {
        let mut depths = self.depths.lock();
        let depth = depths.entry(package.to_string()).or_insert(0);
        *depth += 1;
        DepthGuard {
            context: self,
            package: package.to_string(),
            depth: *depth,
        }
    }

    /// Current nesting depth for `package`.
    #[must_use]
    pub fn depth(&self, package: &str) -> usize {
        self.depths.lock().get(package).copied().unwrap_or(0)
    }
}

/// Decrements the package depth on drop.
#[derive(Debug)]
pub struct DepthGuard<'a> {
    context: &'a DynamicContext,
    package: String,
    depth: usize,
}

impl DepthGuard<'_> {
    /// Depth including this lookup.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        let mut depths = self.context.depths.lock();
        if let Some(depth) = depths.get_mut(&self.package) {
            *depth -= 1;
            if *depth == 0 {
                depths.remove(&self.package);
            }
        }
    }
}

impl ModuleRegistry {
    /// Find (or create) the wire serving `package` for `module`.
    ///
    /// Returns an existing static or dynamic wire when there is one.
    /// Otherwise the first dynamic requirement covering `package` is matched
    /// against resolved exports, then, if enabled, against unresolved
    /// modules resolved on demand. `None` means no provider; nothing is
    /// recorded and a later call may succeed.
    pub fn resolve_dynamic(
        &self,
        context: &DynamicContext,
        module: ModuleId,
        package: &str,
    ) -> Option<Wire> {
        let guard = context.enter(package);
        if guard.depth() > self.config().dynamic_depth_limit {
            trace!(%module, package, depth = guard.depth(), "dynamic lookup re-entered");
            return None;
        }

        let snapshot = self.snapshot();
        let mut owner = module;
        let mut wiring = snapshot.wiring(owner)?;
        if let Some(host) = wiring.host() {
            owner = host;
            wiring = snapshot.wiring(owner)?;
        }
        if let Some(existing) = wiring.package_wire(package) {
            return Some(existing);
        }

        let declared = snapshot.module(owner)?;
        let pattern = declared
            .dynamic_requirements()
            .iter()
            .chain(
                wiring
                    .fragments()
                    .iter()
                    .filter_map(|f| snapshot.module(*f))
                    .flat_map(|f| f.dynamic_requirements()),
            )
            .find(|r| r.namespace() == Namespace::Package && r.covers_package(package))?;
        let requirement = Arc::new(pattern.for_package(package));

        let found = self
            .strategy()
            .find_provider(&snapshot, &requirement, Some(owner))
            .or_else(|| self.resolve_on_demand(owner, &requirement));

        let Some(candidate) = found else {
            debug!(module = %owner, package, "no dynamic provider");
            return None;
        };

        let wire = Wire::new(requirement, candidate.capability, owner, candidate.provider);
        let kept = wiring.add_dynamic(wire);
        debug!(module = %owner, package, provider = %kept.provider(), "dynamic wire");
        Some(kept)
    }

    /// Resolve unresolved modules offering `requirement`, best first, until
    /// one becomes a provider. Stops if the resolution lock is busy.
    fn resolve_on_demand(
        &self,
        owner: ModuleId,
        requirement: &Requirement,
    ) -> Option<Candidate> {
        if !self.config().on_demand_dynamic {
            return None;
        }

        let snapshot = self.snapshot();
        let mut candidates: Vec<Candidate> = snapshot
            .unresolved()
            .filter(|m| m.id() != owner)
            .flat_map(|m| {
                m.exports()
                    .filter(|c| matcher::matches(requirement, c))
                    .map(|c| Candidate::new(c.clone(), m.id(), false))
                    .collect::<Vec<_>>()
            })
            .collect();
        candidates.sort_by(compare_candidates);

        let mut tried = Vec::new();
        for candidate in candidates {
            if tried.contains(&candidate.provider) {
                continue;
            }
            tried.push(candidate.provider);

            let Some(report) = self.try_resolve(&[candidate.provider]) else {
                trace!(provider = %candidate.provider, "resolution lock busy");
                break;
            };
            if report.is_resolved(candidate.provider) {
                return self
                    .strategy()
                    .find_provider(&self.snapshot(), requirement, Some(owner));
            }
        }
        None
    }
}
