use crate::model::{Module, ModuleId, Namespace, Wiring};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One registered module and its wiring, if resolved.
#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub module: Arc<Module>,
    pub wiring: Option<Arc<Wiring>>,
}

/// Immutable view of the registry at one point in time.
///
/// Strategies compute rounds against a snapshot; readers get the last
/// published one without touching the resolution lock. Wirings are shared
/// between snapshots, so dynamic wires recorded through any snapshot are
/// visible through all of them.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    modules: BTreeMap<ModuleId, ModuleRecord>,
    /// Provider -> resolved modules whose static wires, host or fragments
    /// reach it.
    dependents: BTreeMap<ModuleId, BTreeSet<ModuleId>>,
    next_id: u64,
}

impl Snapshot {
    #[must_use]
    pub fn module(&self, id: ModuleId) -> Option<&Arc<Module>> {
        self.modules.get(&id).map(|r| &r.module)
    }

    #[must_use]
    pub fn wiring(&self, id: ModuleId) -> Option<&Arc<Wiring>> {
        self.modules.get(&id).and_then(|r| r.wiring.as_ref())
    }

    #[must_use]
    pub fn is_resolved(&self, id: ModuleId) -> bool {
        self.wiring(id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: ModuleId) -> bool {
        self.modules.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// All records in registration order.
    pub fn records(&self) -> impl Iterator<Item = (ModuleId, &ModuleRecord)> {
        self.modules.iter().map(|(&id, r)| (id, r))
    }

    /// Resolved modules with their wirings, in registration order.
    pub fn resolved(&self) -> impl Iterator<Item = (ModuleId, &Arc<Module>, &Arc<Wiring>)> {
        self.modules
            .iter()
            .filter_map(|(&id, r)| r.wiring.as_ref().map(|w| (id, &r.module, w)))
    }

    /// Unresolved modules in registration order.
    pub fn unresolved(&self) -> impl Iterator<Item = &Arc<Module>> {
        self.modules
            .values()
            .filter(|r| r.wiring.is_none())
            .map(|r| &r.module)
    }

    /// Modules with the given symbolic name, in registration order.
    pub fn find<'a>(&'a self, symbolic_name: &'a str) -> impl Iterator<Item = &'a Arc<Module>> {
        self.modules
            .values()
            .map(|r| &r.module)
            .filter(move |m| m.symbolic_name() == symbolic_name)
    }

    /// The resolved singleton holding `symbolic_name`, if any.
    #[must_use]
    pub fn resolved_singleton(&self, symbolic_name: &str) -> Option<ModuleId> {
        self.resolved()
            .find(|(_, m, _)| m.is_singleton() && m.symbolic_name() == symbolic_name)
            .map(|(id, _, _)| id)
    }

    /// Resolved modules wired to `id` through a static wire, as its
    /// fragment, or as its host.
    pub fn dependents(&self, id: ModuleId) -> impl Iterator<Item = ModuleId> + '_ {
        self.dependents.get(&id).into_iter().flatten().copied()
    }

    /// Resolved modules whose static import of `package` is served by
    /// `provider`, in registration order.
    #[must_use]
    pub fn importers_of(&self, provider: ModuleId, package: &str) -> Vec<ModuleId> {
        self.dependents(provider)
            .filter(|&m| {
                self.wiring(m).is_some_and(|w| {
                    w.wires().iter().any(|wire| {
                        wire.provider() == provider
                            && wire.capability().namespace() == Namespace::Package
                            && wire.capability().name() == package
                    })
                })
            })
            .collect()
    }

    pub(crate) fn allocate_id(&mut self) -> ModuleId {
        self.next_id += 1;
        ModuleId(self.next_id)
    }

    pub(crate) fn insert(&mut self, module: Module) {
        self.modules.insert(
            module.id(),
            ModuleRecord {
                module: Arc::new(module),
                wiring: None,
            },
        );
    }

    /// Drop a record. Modules that depend on it stay indexed under `id`
    /// until they are unresolved.
    pub(crate) fn remove(&mut self, id: ModuleId) -> Option<ModuleRecord> {
        let record = self.modules.remove(&id)?;
        if let Some(wiring) = &record.wiring {
            self.unlink(wiring);
        }
        Some(record)
    }

    /// Store a wiring. Returns false if the module is gone or already wired.
    pub(crate) fn commit(&mut self, wiring: Wiring) -> bool {
        match self.modules.get_mut(&wiring.module()) {
            Some(record) if record.wiring.is_none() => {
                let wiring = Arc::new(wiring);
                record.wiring = Some(wiring.clone());
                self.link(&wiring);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn unresolve(&mut self, id: ModuleId) -> Option<Arc<Wiring>> {
        let wiring = self.modules.get_mut(&id).and_then(|r| r.wiring.take())?;
        self.unlink(&wiring);
        Some(wiring)
    }

    fn link(&mut self, wiring: &Wiring) {
        for provider in related(wiring) {
            self.dependents
                .entry(provider)
                .or_default()
                .insert(wiring.module());
        }
    }

    fn unlink(&mut self, wiring: &Wiring) {
        for provider in related(wiring) {
            if let Some(set) = self.dependents.get_mut(&provider) {
                set.remove(&wiring.module());
                if set.is_empty() {
                    self.dependents.remove(&provider);
                }
            }
        }
    }
}

/// Modules a wiring leans on.
fn related(wiring: &Wiring) -> Vec<ModuleId> {
    wiring
        .providers()
        .chain(wiring.host())
        .chain(wiring.fragments().iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModuleDecl;
    use crate::version::Version;

    fn declare(snapshot: &mut Snapshot, name: &str, singleton: bool) -> ModuleId {
        let id = snapshot.allocate_id();
        let mut decl = ModuleDecl::new(name, Version::new(1, 0, 0));
        decl.singleton = singleton;
        snapshot.insert(Module::from_decl(id, decl).unwrap());
        id
    }

    #[test]
    fn test_ids_follow_registration_order() {
        let mut snapshot = Snapshot::default();
        let a = declare(&mut snapshot, "a", false);
        let b = declare(&mut snapshot, "b", false);
        assert!(a < b);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.unresolved().count(), 2);
    }

    #[test]
    fn test_commit_once() {
        let mut snapshot = Snapshot::default();
        let a = declare(&mut snapshot, "a", false);
        let wiring = || Wiring::new(a, Vec::new(), Vec::new(), Vec::new(), Vec::new());
        assert!(snapshot.commit(wiring()));
        assert!(!snapshot.commit(wiring()));
        assert!(snapshot.is_resolved(a));
        assert!(snapshot.unresolve(a).is_some());
        assert!(!snapshot.is_resolved(a));
    }

    #[test]
    fn test_resolved_singleton_by_name() {
        let mut snapshot = Snapshot::default();
        let a = declare(&mut snapshot, "svc", true);
        declare(&mut snapshot, "svc", true);
        assert_eq!(snapshot.resolved_singleton("svc"), None);
        snapshot.commit(Wiring::new(a, Vec::new(), Vec::new(), Vec::new(), Vec::new()));
        assert_eq!(snapshot.resolved_singleton("svc"), Some(a));
        assert_eq!(snapshot.find("svc").count(), 2);
    }

    #[test]
    fn test_reverse_index_follows_commits() {
        use crate::model::{CapabilityDecl, RequirementDecl, Wire};

        let mut snapshot = Snapshot::default();
        let core = snapshot.allocate_id();
        let decl = ModuleDecl::new("core", Version::ZERO).provides(CapabilityDecl::package("util"));
        snapshot.insert(Module::from_decl(core, decl).unwrap());
        let app = snapshot.allocate_id();
        let decl = ModuleDecl::new("app", Version::ZERO).requires(RequirementDecl::package("util"));
        snapshot.insert(Module::from_decl(app, decl).unwrap());

        let cap = snapshot.module(core).unwrap().exports().next().unwrap().clone();
        let req = snapshot.module(app).unwrap().wirable_requirements().next().unwrap().clone();
        snapshot.commit(Wiring::new(core, Vec::new(), vec![cap.clone()], Vec::new(), Vec::new()));
        snapshot.commit(Wiring::new(
            app,
            vec![Wire::new(req, cap, app, core)],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        ));

        assert_eq!(snapshot.dependents(core).collect::<Vec<_>>(), vec![app]);
        assert_eq!(snapshot.importers_of(core, "util"), vec![app]);
        assert!(snapshot.importers_of(core, "other").is_empty());

        snapshot.unresolve(app);
        assert_eq!(snapshot.dependents(core).count(), 0);
        assert!(snapshot.importers_of(core, "util").is_empty());
    }
}
