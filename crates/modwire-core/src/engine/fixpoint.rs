//! Fixpoint resolution.
//!
//! Each round starts from every unresolved module, optimistically assumes
//! all of them can resolve, and prunes modules with an unsatisfiable
//! mandatory requirement until nothing changes. Survivors that a requested
//! module (transitively) needs are wired and handed back for commit. Cycles
//! resolve together because survivors may satisfy each other.

use super::{ResolveFailure, ResolveStrategy, RoundOutcome};
use crate::matcher::{self, compare_candidates, Candidate};
use crate::model::{
    Capability, Export, Module, ModuleId, Namespace, Requirement, Visibility, Wire, Wiring,
};
use crate::registry::Snapshot;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// The default strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixpointStrategy;

impl ResolveStrategy for FixpointStrategy {
    fn name(&self) -> &'static str {
        "fixpoint"
    }

    fn resolve_round(&self, snapshot: &Snapshot, requested: &BTreeSet<ModuleId>) -> RoundOutcome {
        let mut round = Round::new(snapshot, requested);
        round.admit();
        round.prune();
        round.finish()
    }
}

/// Matchable capabilities for one pruning pass, with candidates sorted so
/// the first match is the preferred one.
struct Table {
    packages: HashMap<String, Vec<Candidate>>,
    identities: HashMap<String, Vec<Candidate>>,
    exports: HashMap<ModuleId, Vec<Arc<Capability>>>,
}

impl Table {
    fn best(&self, req: &Requirement, allow: impl Fn(ModuleId) -> bool) -> Option<Candidate> {
        let pool = match req.namespace() {
            Namespace::Package => self.packages.get(req.name()),
            Namespace::Module => self.identities.get(req.name()),
            Namespace::Host => None,
        }?;
        pool.iter()
            .find(|c| allow(c.provider) && matcher::matches(req, &c.capability))
            .cloned()
    }
}

fn sort_pools(pools: &mut HashMap<String, Vec<Candidate>>) {
    for pool in pools.values_mut() {
        pool.sort_by(compare_candidates);
    }
}

/// No dependency on an unfinished re-export expansion.
const COMPLETE: usize = usize::MAX;

struct Round<'a> {
    snapshot: &'a Snapshot,
    requested: &'a BTreeSet<ModuleId>,
    /// Unresolved non-fragment modules still able to resolve.
    alive: BTreeSet<ModuleId>,
    /// Unresolved fragments waiting for a host.
    pending_fragments: Vec<ModuleId>,
    /// Host -> attached fragments, in registration order.
    attached: BTreeMap<ModuleId, Vec<ModuleId>>,
    /// Singleton losers in this batch -> the module they lost to.
    conflicts: BTreeMap<ModuleId, ModuleId>,
    /// Losers already given a second chance after their incumbent died.
    revived: HashSet<ModuleId>,
    failures: BTreeMap<ModuleId, ResolveFailure>,
}

impl<'a> Round<'a> {
    fn new(snapshot: &'a Snapshot, requested: &'a BTreeSet<ModuleId>) -> Self {
        Self {
            snapshot,
            requested,
            alive: BTreeSet::new(),
            pending_fragments: Vec::new(),
            attached: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            revived: HashSet::new(),
            failures: BTreeMap::new(),
        }
    }

    fn module(&self, id: ModuleId) -> &'a Arc<Module> {
        self.snapshot
            .module(id)
            .unwrap_or_else(|| unreachable!("round only visits registered modules"))
    }

    /// Collect unresolved modules, excluding singletons whose name already
    /// has a resolved singleton.
    fn admit(&mut self) {
        for module in self.snapshot.unresolved() {
            let id = module.id();
            if module.is_fragment() {
                self.pending_fragments.push(id);
                continue;
            }
            if module.is_singleton() {
                if let Some(incumbent) = self.snapshot.resolved_singleton(module.symbolic_name()) {
                    debug!(module = %module, %incumbent, "singleton already resolved");
                    self.failures
                        .insert(id, ResolveFailure::SingletonConflict { incumbent });
                    continue;
                }
            }
            self.alive.insert(id);
        }
    }

    /// Attach each waiting fragment to the best host still alive. Fragments
    /// whose host was pruned come back here and try the next one.
    fn attach_fragments(&mut self) {
        for fragment in std::mem::take(&mut self.pending_fragments) {
            let module = self.module(fragment);
            let Some(host_req) = module.host_requirement() else {
                continue;
            };

            let hosts: Vec<Candidate> = self
                .alive
                .iter()
                .filter_map(|&h| {
                    self.module(h)
                        .host_capability()
                        .map(|cap| Candidate::new(cap.clone(), h, false))
                })
                .collect();

            match matcher::best(host_req, &hosts) {
                Some(host) => {
                    trace!(fragment = %module, host = %host.provider, "fragment attached");
                    let list = self.attached.entry(host.provider).or_default();
                    list.push(fragment);
                    list.sort();
                }
                None => {
                    debug!(fragment = %module, "no host to attach to");
                    self.failures.insert(
                        fragment,
                        ResolveFailure::FragmentHostMissing {
                            requirement: host_req.clone(),
                        },
                    );
                }
            }
        }
    }

    /// Static requirements of a host together with those of its attached
    /// fragments, host requirements excluded.
    fn requirements_of(&self, id: ModuleId) -> Vec<Arc<Requirement>> {
        let mut reqs: Vec<Arc<Requirement>> =
            self.module(id).wirable_requirements().cloned().collect();
        for &fragment in self.attached.get(&id).into_iter().flatten() {
            reqs.extend(self.module(fragment).wirable_requirements().cloned());
        }
        reqs
    }

    fn table(&self) -> Table {
        let mut identities: HashMap<String, Vec<Candidate>> = HashMap::new();
        for (id, module, _) in self.snapshot.resolved() {
            if let Some(cap) = module.identity() {
                identities
                    .entry(cap.name().to_string())
                    .or_default()
                    .push(Candidate::new(cap.clone(), id, true));
            }
        }
        for &id in &self.alive {
            if let Some(cap) = self.module(id).identity() {
                identities
                    .entry(cap.name().to_string())
                    .or_default()
                    .push(Candidate::new(cap.clone(), id, false));
            }
        }
        sort_pools(&mut identities);

        let mut table = Table {
            packages: HashMap::new(),
            identities,
            exports: HashMap::new(),
        };

        for &id in &self.alive {
            self.collect_exports(id, &mut table, &mut Vec::new());
        }

        for (id, _, wiring) in self.snapshot.resolved() {
            for cap in wiring.exports() {
                table
                    .packages
                    .entry(cap.name().to_string())
                    .or_default()
                    .push(Candidate::new(cap.clone(), id, true));
            }
        }
        for (&id, caps) in &table.exports {
            for cap in caps {
                table
                    .packages
                    .entry(cap.name().to_string())
                    .or_default()
                    .push(Candidate::new(cap.clone(), id, false));
            }
        }
        sort_pools(&mut table.packages);
        table
    }

    /// Effective exports of an unresolved module: its own packages, its
    /// fragments' packages, and packages re-exported through mandatory
    /// `visibility:=reexport` module requirements.
    ///
    /// `stack` holds the modules being expanded. The second value is the
    /// lowest stack depth the result leans on, or [`COMPLETE`]. Only
    /// complete results are memoized, so every member of a re-export cycle
    /// ends up with the whole cycle's packages.
    fn collect_exports(
        &self,
        id: ModuleId,
        table: &mut Table,
        stack: &mut Vec<ModuleId>,
    ) -> (Vec<Arc<Capability>>, usize) {
        if let Some(done) = table.exports.get(&id) {
            return (done.clone(), COMPLETE);
        }
        if let Some(depth) = stack.iter().position(|&m| m == id) {
            // Re-export cycle; the expansion at `depth` folds these in.
            return (Vec::new(), depth);
        }

        let depth = stack.len();
        stack.push(id);
        let mut low = COMPLETE;

        let mut out: Vec<Arc<Capability>> = self.module(id).exports().cloned().collect();
        for &fragment in self.attached.get(&id).into_iter().flatten() {
            out.extend(self.module(fragment).exports().cloned());
        }

        for req in self.requirements_of(id) {
            if req.namespace() != Namespace::Module
                || !req.is_mandatory()
                || req.visibility() != Visibility::Reexport
            {
                continue;
            }
            let Some(target) = table.best(&req, |_| true) else {
                continue;
            };
            let theirs = match self.snapshot.wiring(target.provider) {
                Some(wiring) => wiring.exports().to_vec(),
                None => {
                    let (caps, their_low) = self.collect_exports(target.provider, table, stack);
                    low = low.min(their_low);
                    caps
                }
            };
            for cap in theirs {
                let origin = cap.origin();
                if !out
                    .iter()
                    .any(|c| c.origin().module == origin.module && c.origin().index == origin.index)
                {
                    out.push(cap);
                }
            }
        }

        stack.pop();
        if low < depth {
            (out, low)
        } else {
            table.exports.insert(id, out.clone());
            (out, COMPLETE)
        }
    }

    fn fragment_host_requirement(&self, fragment: ModuleId) -> Option<Arc<Requirement>> {
        self.module(fragment).host_requirement().cloned()
    }

    /// Drop a module. Its fragments go back to waiting for another host.
    fn drop_module(&mut self, id: ModuleId, failure: ResolveFailure) {
        trace!(module = %self.module(id), reason = %failure, "pruned");
        self.alive.remove(&id);
        self.failures.insert(id, failure);
        if let Some(fragments) = self.attached.remove(&id) {
            self.pending_fragments.extend(fragments);
        }
    }

    fn detach(&mut self, host: ModuleId, fragment: ModuleId, failure: ResolveFailure) {
        trace!(fragment = %self.module(fragment), reason = %failure, "fragment detached");
        if let Some(list) = self.attached.get_mut(&host) {
            list.retain(|&f| f != fragment);
        }
        self.failures.insert(fragment, failure);
    }

    /// Remove modules until every survivor's mandatory requirements are met
    /// by survivors or resolved modules and the modules the batch needs hold
    /// at most one singleton per name.
    fn prune(&mut self) {
        loop {
            self.attach_fragments();
            let table = self.table();
            let mut changed = false;

            for id in self.alive.clone() {
                let blocked = self
                    .module(id)
                    .wirable_requirements()
                    .find(|r| r.is_mandatory() && table.best(r, |_| true).is_none())
                    .cloned();
                if let Some(requirement) = blocked {
                    self.drop_module(id, ResolveFailure::UnsatisfiedRequirement { requirement });
                    changed = true;
                    continue;
                }

                let fragments = self.attached.get(&id).cloned().unwrap_or_default();
                for fragment in fragments {
                    let blocked = self
                        .module(fragment)
                        .wirable_requirements()
                        .find(|r| r.is_mandatory() && table.best(r, |_| true).is_none())
                        .cloned();
                    if let Some(requirement) = blocked {
                        self.detach(
                            id,
                            fragment,
                            ResolveFailure::UnsatisfiedRequirement { requirement },
                        );
                        changed = true;
                    }
                }
            }

            if changed || self.select_singletons(&table) || self.revive_losers() {
                continue;
            }
            break;
        }
    }

    /// Survivors the requested modules transitively need. A requested
    /// fragment stands for its host.
    fn closure(&self, table: &Table) -> BTreeSet<ModuleId> {
        let host_of: HashMap<ModuleId, ModuleId> = self
            .attached
            .iter()
            .flat_map(|(&host, fragments)| fragments.iter().map(move |&f| (f, host)))
            .collect();

        let mut queue: VecDeque<ModuleId> = self
            .requested
            .iter()
            .filter_map(|id| {
                if self.alive.contains(id) {
                    Some(*id)
                } else {
                    host_of.get(id).copied()
                }
            })
            .collect();

        let mut needed = BTreeSet::new();
        while let Some(id) = queue.pop_front() {
            if !needed.insert(id) {
                continue;
            }
            for req in self.requirements_of(id) {
                if !req.is_mandatory() {
                    continue;
                }
                if let Some(c) = table.best(&req, |_| true) {
                    if self.alive.contains(&c.provider) && !needed.contains(&c.provider) {
                        queue.push_back(c.provider);
                    }
                }
            }
        }
        needed
    }

    /// Among singletons sharing a name that the batch needs, keep one: a
    /// requested module before an unrequested one, then the earliest
    /// registered. Singletons the batch does not need are left alone.
    /// Returns whether anything was removed.
    fn select_singletons(&mut self, table: &Table) -> bool {
        let mut groups: BTreeMap<&'a str, Vec<ModuleId>> = BTreeMap::new();
        for id in self.closure(table) {
            let module = self.module(id);
            if module.is_singleton() {
                groups.entry(module.symbolic_name()).or_default().push(id);
            }
        }

        let mut losers = Vec::new();
        for ids in groups.into_values() {
            if ids.len() < 2 {
                continue;
            }
            let winner = ids
                .iter()
                .copied()
                .find(|id| self.requested.contains(id))
                .unwrap_or(ids[0]);
            losers.extend(ids.into_iter().filter(|&id| id != winner).map(|id| (id, winner)));
        }

        let changed = !losers.is_empty();
        for (id, incumbent) in losers {
            debug!(module = %self.module(id), %incumbent, "singleton conflict in batch");
            self.conflicts.insert(id, incumbent);
            self.drop_module(id, ResolveFailure::SingletonConflict { incumbent });
        }
        changed
    }

    /// Bring back singleton losers whose incumbent was pruned afterwards,
    /// once each. Returns whether any came back.
    fn revive_losers(&mut self) -> bool {
        let orphaned: Vec<ModuleId> = self
            .conflicts
            .iter()
            .filter(|&(loser, incumbent)| {
                !self.alive.contains(incumbent) && !self.revived.contains(loser)
            })
            .map(|(&loser, _)| loser)
            .collect();

        for &loser in &orphaned {
            trace!(module = %self.module(loser), "singleton incumbent pruned, retrying");
            self.conflicts.remove(&loser);
            self.failures.remove(&loser);
            self.revived.insert(loser);
            self.alive.insert(loser);
        }
        !orphaned.is_empty()
    }

    /// Wire the survivors needed by the requested modules.
    fn finish(self) -> RoundOutcome {
        let table = self.table();
        let commit = self.closure(&table);

        let snapshot = self.snapshot;
        let allowed = |p: ModuleId| snapshot.is_resolved(p) || commit.contains(&p);
        let mut wirings = Vec::new();

        for &id in &commit {
            let mut wires = Vec::new();
            let mut required = Vec::new();
            for req in self.requirements_of(id) {
                let Some(c) = table.best(&req, allowed) else {
                    continue;
                };
                if req.namespace() == Namespace::Module {
                    let theirs = match snapshot.wiring(c.provider) {
                        Some(w) => w.exports().to_vec(),
                        None => table.exports.get(&c.provider).cloned().unwrap_or_default(),
                    };
                    required.extend(theirs.into_iter().map(|capability| Export {
                        capability,
                        provider: c.provider,
                    }));
                }
                wires.push(Wire::new(req, c.capability, id, c.provider));
            }

            let fragments = self.attached.get(&id).cloned().unwrap_or_default();
            let exports = table.exports.get(&id).cloned().unwrap_or_default();
            debug!(
                module = %self.module(id),
                wires = wires.len(),
                fragments = fragments.len(),
                "module wired"
            );

            if let Some(host_cap) = self.module(id).host_capability() {
                for &fragment in &fragments {
                    if let Some(host_req) = self.fragment_host_requirement(fragment) {
                        let wire = Wire::new(host_req, host_cap.clone(), fragment, id);
                        wirings.push(Wiring::fragment(fragment, wire));
                    }
                }
            }
            wirings.push(Wiring::new(id, wires, exports, required, fragments));
        }

        RoundOutcome {
            wirings,
            failures: self.failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CapabilityDecl, ModuleDecl, RequirementDecl};
    use crate::version::Version;

    fn declare(snapshot: &mut Snapshot, decl: ModuleDecl) -> ModuleId {
        let id = snapshot.allocate_id();
        snapshot.insert(Module::from_decl(id, decl).unwrap());
        id
    }

    fn exporter(name: &str, package: &str) -> ModuleDecl {
        ModuleDecl::new(name, Version::new(1, 0, 0)).provides(CapabilityDecl::package(package))
    }

    #[test]
    fn test_round_only_wires_what_is_requested() {
        let mut snapshot = Snapshot::default();
        let core = declare(&mut snapshot, exporter("core", "util"));
        let app = declare(
            &mut snapshot,
            ModuleDecl::new("app", Version::ZERO).requires(RequirementDecl::package("util")),
        );
        declare(&mut snapshot, exporter("idle", "idle"));

        let outcome = FixpointStrategy.resolve_round(&snapshot, &BTreeSet::from([app]));
        let wired: Vec<ModuleId> = outcome.wirings.iter().map(Wiring::module).collect();
        assert_eq!(wired, vec![core, app]);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_prune_propagates_through_chain() {
        let mut snapshot = Snapshot::default();
        let a = declare(
            &mut snapshot,
            exporter("a", "pa").requires(RequirementDecl::package("missing")),
        );
        let b = declare(
            &mut snapshot,
            exporter("b", "pb").requires(RequirementDecl::package("pa")),
        );
        let c = declare(
            &mut snapshot,
            ModuleDecl::new("c", Version::ZERO).requires(RequirementDecl::package("pb")),
        );

        let outcome = FixpointStrategy.resolve_round(&snapshot, &BTreeSet::from([c]));
        assert!(outcome.wirings.is_empty());
        for (id, name) in [(a, "missing"), (b, "pa"), (c, "pb")] {
            let failure = &outcome.failures[&id];
            assert_eq!(failure.requirement().unwrap().name(), name);
        }
    }

    #[test]
    fn test_reexport_cycle_terminates() {
        let mut snapshot = Snapshot::default();
        let a = declare(
            &mut snapshot,
            exporter("a", "pa").requires(RequirementDecl::module("b").reexport()),
        );
        let b = declare(
            &mut snapshot,
            exporter("b", "pb").requires(RequirementDecl::module("a").reexport()),
        );

        let outcome = FixpointStrategy.resolve_round(&snapshot, &BTreeSet::from([a, b]));
        assert_eq!(outcome.wirings.len(), 2);
        let exports = |id: ModuleId| -> Vec<String> {
            let wiring = outcome.wirings.iter().find(|w| w.module() == id).unwrap();
            wiring.exports().iter().map(|c| c.name().to_string()).collect()
        };
        assert_eq!(exports(a), vec!["pa", "pb"]);
        assert_eq!(exports(b), vec!["pb", "pa"]);
    }

    #[test]
    fn test_reexport_chain_into_cycle_sees_every_member() {
        let mut snapshot = Snapshot::default();
        let a = declare(
            &mut snapshot,
            exporter("a", "pa").requires(RequirementDecl::module("b").reexport()),
        );
        let b = declare(
            &mut snapshot,
            exporter("b", "pb").requires(RequirementDecl::module("c").reexport()),
        );
        let c = declare(
            &mut snapshot,
            exporter("c", "pc").requires(RequirementDecl::module("b").reexport()),
        );

        let outcome = FixpointStrategy.resolve_round(&snapshot, &BTreeSet::from([a, b, c]));
        for id in [a, b, c] {
            let wiring = outcome.wirings.iter().find(|w| w.module() == id).unwrap();
            let mut names: Vec<&str> = wiring.exports().iter().map(|c| c.name()).collect();
            names.sort_unstable();
            if id == a {
                assert_eq!(names, vec!["pa", "pb", "pc"]);
            } else {
                assert_eq!(names, vec!["pb", "pc"]);
            }
        }
    }

    #[test]
    fn test_pruned_only_host_leaves_fragment_hostless() {
        let mut snapshot = Snapshot::default();
        declare(
            &mut snapshot,
            ModuleDecl::new("H", Version::ZERO).requires(RequirementDecl::package("missing")),
        );
        let frag = declare(
            &mut snapshot,
            ModuleDecl::new("frag", Version::ZERO).requires(RequirementDecl::host("H")),
        );

        let outcome = FixpointStrategy.resolve_round(&snapshot, &BTreeSet::from([frag]));
        let failure = &outcome.failures[&frag];
        assert_eq!(failure.code(), "FRAGMENT_HOST_MISSING");
        assert_eq!(failure.requirement().unwrap().namespace(), Namespace::Host);
    }

    #[test]
    fn test_fragment_falls_back_when_best_host_is_pruned() {
        let mut snapshot = Snapshot::default();
        let h1 = declare(&mut snapshot, ModuleDecl::new("H", Version::new(1, 0, 0)));
        let h2 = declare(
            &mut snapshot,
            ModuleDecl::new("H", Version::new(2, 0, 0))
                .requires(RequirementDecl::package("missing")),
        );
        let frag = declare(
            &mut snapshot,
            ModuleDecl::new("frag", Version::ZERO).requires(RequirementDecl::host("H")),
        );

        let outcome = FixpointStrategy.resolve_round(&snapshot, &BTreeSet::from([h1, frag]));
        assert!(!outcome.failures.contains_key(&frag));
        assert_eq!(outcome.failures[&h2].code(), "UNSATISFIED_REQUIREMENT");

        let host = outcome.wirings.iter().find(|w| w.module() == h1).unwrap();
        assert_eq!(host.fragments(), &[frag]);
        let attached = outcome.wirings.iter().find(|w| w.module() == frag).unwrap();
        assert_eq!(attached.host(), Some(h1));
    }

    #[test]
    fn test_idle_singleton_does_not_block_requested_one() {
        let mut snapshot = Snapshot::default();
        let idle = declare(&mut snapshot, ModuleDecl::new("X", Version::new(1, 0, 0)).singleton());
        let wanted = declare(&mut snapshot, ModuleDecl::new("X", Version::new(2, 0, 0)).singleton());

        let outcome = FixpointStrategy.resolve_round(&snapshot, &BTreeSet::from([wanted]));
        let wired: Vec<ModuleId> = outcome.wirings.iter().map(Wiring::module).collect();
        assert_eq!(wired, vec![wanted]);
        assert!(outcome.failures.is_empty());
        assert!(!outcome.failures.contains_key(&idle));
    }

    #[test]
    fn test_singleton_loser_retried_when_winner_is_pruned() {
        let mut snapshot = Snapshot::default();
        let first = declare(
            &mut snapshot,
            ModuleDecl::new("X", Version::new(1, 0, 0))
                .singleton()
                .requires(RequirementDecl::package("only.second")),
        );
        let second = declare(
            &mut snapshot,
            ModuleDecl::new("X", Version::new(2, 0, 0))
                .singleton()
                .provides(CapabilityDecl::package("only.second")),
        );

        let outcome = FixpointStrategy.resolve_round(&snapshot, &BTreeSet::from([first, second]));
        let wired: Vec<ModuleId> = outcome.wirings.iter().map(Wiring::module).collect();
        assert_eq!(wired, vec![second]);
        assert_eq!(outcome.failures[&first].code(), "UNSATISFIED_REQUIREMENT");
        assert!(!outcome.failures.contains_key(&second));
    }
}
