//! The module registry.
//!
//! Authoritative state sits behind one non-reentrant resolution lock that
//! serializes declaration, removal and resolution. After every change an
//! immutable [`Snapshot`] is published for lock-free readers.

mod report;
mod snapshot;

pub use report::{
    RemovalReport, ResolveEvent, ResolveListener, ResolveReport, WireSummary, WiringSummary,
    RESOLVE_REPORT_SCHEMA_VERSION,
};
pub use snapshot::{ModuleRecord, Snapshot};

use crate::config::ResolverConfig;
use crate::engine::{FixpointStrategy, ResolveFailure, ResolveStrategy};
use crate::error::DeclareError;
use crate::model::{Module, ModuleDecl, ModuleId, Wiring};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry of declared modules and their wirings.
pub struct ModuleRegistry {
    state: Mutex<Snapshot>,
    committed: RwLock<Arc<Snapshot>>,
    strategy: Box<dyn ResolveStrategy>,
    listeners: RwLock<Vec<Arc<dyn ResolveListener>>>,
    config: ResolverConfig,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.snapshot().len())
            .field("strategy", &self.strategy.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// Registry with the default strategy and config.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ResolverConfig) -> Self {
        Self::with_strategy(config, Box::new(FixpointStrategy))
    }

    #[must_use]
    pub fn with_strategy(config: ResolverConfig, strategy: Box<dyn ResolveStrategy>) -> Self {
        Self {
            state: Mutex::new(Snapshot::default()),
            committed: RwLock::new(Arc::new(Snapshot::default())),
            strategy,
            listeners: RwLock::new(Vec::new()),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[must_use]
    pub fn strategy(&self) -> &dyn ResolveStrategy {
        self.strategy.as_ref()
    }

    pub fn add_listener(&self, listener: Arc<dyn ResolveListener>) {
        self.listeners.write().push(listener);
    }

    /// The last published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.committed.read().clone()
    }

    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<Arc<Module>> {
        self.snapshot().module(id).cloned()
    }

    #[must_use]
    pub fn get_wiring(&self, id: ModuleId) -> Option<Arc<Wiring>> {
        self.snapshot().wiring(id).cloned()
    }

    #[must_use]
    pub fn is_resolved(&self, id: ModuleId) -> bool {
        self.snapshot().is_resolved(id)
    }

    /// Ids of modules with `symbolic_name`, in registration order.
    #[must_use]
    pub fn find_by_name(&self, symbolic_name: &str) -> Vec<ModuleId> {
        self.snapshot()
            .find(symbolic_name)
            .map(|m| m.id())
            .collect()
    }

    /// Register a module. It starts unresolved.
    pub fn declare_module(&self, decl: ModuleDecl) -> Result<ModuleId, DeclareError> {
        let mut state = self.state.lock();
        let id = declare(&mut state, decl)?;
        self.publish(&state);
        Ok(id)
    }

    /// Register several modules under one lock and publish once. Each
    /// declaration succeeds or fails on its own.
    pub fn declare_modules(
        &self,
        decls: impl IntoIterator<Item = ModuleDecl>,
    ) -> Vec<Result<ModuleId, DeclareError>> {
        let mut state = self.state.lock();
        let results: Vec<_> = decls
            .into_iter()
            .map(|decl| declare(&mut state, decl))
            .collect();
        self.publish(&state);
        results
    }

    /// Remove a module, unresolving everything that depended on it.
    ///
    /// Returns `None` if the id is unknown.
    pub fn remove_module(&self, id: ModuleId) -> Option<RemovalReport> {
        let mut state = self.state.lock();
        let record = state.remove(id)?;
        debug!(module = %record.module, "module removed");

        let mut invalid = BTreeSet::from([id]);
        let mut unresolved = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(gone) = queue.pop_front() {
            let cascade: Vec<ModuleId> = state.dependents(gone).collect();
            for m in cascade {
                if invalid.insert(m) {
                    state.unresolve(m);
                    unresolved.push(m);
                    queue.push_back(m);
                }
            }
        }
        unresolved.sort();

        let dynamic_wires_dropped: usize = state
            .resolved()
            .map(|(_, _, w)| w.drop_dynamic_where(|p| invalid.contains(&p)))
            .sum();

        self.publish(&state);
        drop(state);

        for &m in &unresolved {
            debug!(module = %m, removed = %id, "module unresolved");
        }
        let events: Vec<ResolveEvent> =
            unresolved.iter().map(|&m| ResolveEvent::Unresolved(m)).collect();
        self.notify(&events);

        Some(RemovalReport {
            removed: id,
            unresolved,
            dynamic_wires_dropped,
        })
    }

    /// Resolve the given modules and whatever they need.
    ///
    /// Unknown ids are skipped. Never fails: modules that cannot resolve are
    /// listed in the report with the reason and can be retried later.
    pub fn resolve(&self, ids: &[ModuleId]) -> ResolveReport {
        let (report, events) = {
            let mut state = self.state.lock();
            self.run_rounds(&mut state, ids)
        };
        self.notify(&events);
        report
    }

    /// Resolve every unresolved module.
    pub fn resolve_all(&self) -> ResolveReport {
        let (report, events) = {
            let mut state = self.state.lock();
            let ids: Vec<ModuleId> = state.unresolved().map(|m| m.id()).collect();
            self.run_rounds(&mut state, &ids)
        };
        self.notify(&events);
        report
    }

    /// Like [`resolve`](Self::resolve), but gives up instead of waiting when
    /// the resolution lock is held.
    pub(crate) fn try_resolve(&self, ids: &[ModuleId]) -> Option<ResolveReport> {
        let (report, events) = {
            let mut state = self.state.try_lock()?;
            self.run_rounds(&mut state, ids)
        };
        self.notify(&events);
        Some(report)
    }

    fn run_rounds(
        &self,
        state: &mut Snapshot,
        ids: &[ModuleId],
    ) -> (ResolveReport, Vec<ResolveEvent>) {
        let mut report = ResolveReport::default();
        let mut requested = BTreeSet::new();
        for &id in ids {
            if !state.contains(id) {
                warn!(module = %id, "resolve called with unknown module");
            } else if state.is_resolved(id) {
                if !report.resolved.contains(&id) {
                    report.resolved.push(id);
                }
            } else {
                requested.insert(id);
            }
        }

        let mut events = Vec::new();
        let mut failures: BTreeMap<ModuleId, ResolveFailure> = BTreeMap::new();
        let mut pending = requested;

        while !pending.is_empty() {
            if report.rounds == self.config.max_rounds {
                warn!(rounds = report.rounds, "round limit reached");
                for &id in &pending {
                    failures.entry(id).or_insert(ResolveFailure::RoundLimit);
                }
                break;
            }
            report.rounds += 1;

            let outcome = self.strategy.resolve_round(state, &pending);
            failures = outcome.failures;
            let mut committed = 0usize;
            for wiring in outcome.wirings {
                let id = wiring.module();
                if state.commit(wiring) {
                    committed += 1;
                    report.committed.push(id);
                    events.push(ResolveEvent::Resolved(id));
                }
            }
            debug!(
                strategy = self.strategy.name(),
                round = report.rounds,
                committed,
                "round finished"
            );
            self.publish(state);

            pending.retain(|&id| !state.is_resolved(id));
            if committed == 0 {
                break;
            }
        }

        for id in &report.committed {
            if !report.resolved.contains(id) && ids.contains(id) {
                report.resolved.push(*id);
            }
        }
        report.resolved.sort();
        report.committed.sort();

        for id in pending {
            let failure = failures.remove(&id).unwrap_or(ResolveFailure::RoundLimit);
            if let ResolveFailure::SingletonConflict { incumbent } = failure {
                warn!(module = %id, %incumbent, "singleton conflict");
                events.push(ResolveEvent::SingletonConflict {
                    module: id,
                    incumbent,
                });
            } else {
                debug!(module = %id, reason = %failure, "module left unresolved");
            }
            report.failed.insert(id, failure);
        }

        (report, events)
    }

    fn publish(&self, state: &Snapshot) {
        *self.committed.write() = Arc::new(state.clone());
    }

    fn notify(&self, events: &[ResolveEvent]) {
        if events.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        for event in events {
            for listener in &listeners {
                listener.on_event(event);
            }
        }
    }
}

fn declare(state: &mut Snapshot, decl: ModuleDecl) -> Result<ModuleId, DeclareError> {
    let id = state.allocate_id();
    let module = Module::from_decl(id, decl)?;
    debug!(module = %module, %id, "module declared");
    state.insert(module);
    Ok(id)
}
