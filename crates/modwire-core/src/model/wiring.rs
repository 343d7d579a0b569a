use super::{Capability, ModuleId, Namespace, Requirement, RequirementRef};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// A committed pairing of one requirement with the capability satisfying it.
#[derive(Debug, Clone)]
pub struct Wire {
    requirement: Arc<Requirement>,
    capability: Arc<Capability>,
    requirer: ModuleId,
    provider: ModuleId,
}

impl Wire {
    #[must_use]
    pub fn new(
        requirement: Arc<Requirement>,
        capability: Arc<Capability>,
        requirer: ModuleId,
        provider: ModuleId,
    ) -> Self {
        Self {
            requirement,
            capability,
            requirer,
            provider,
        }
    }

    #[must_use]
    pub fn requirement(&self) -> &Arc<Requirement> {
        &self.requirement
    }

    #[must_use]
    pub fn capability(&self) -> &Arc<Capability> {
        &self.capability
    }

    /// The module whose wiring holds this wire. For requirements a fragment
    /// contributed, this is the host.
    #[must_use]
    pub fn requirer(&self) -> ModuleId {
        self.requirer
    }

    /// The module whose exports made the capability visible. Differs from
    /// the capability's origin for re-exported and fragment capabilities.
    #[must_use]
    pub fn provider(&self) -> ModuleId {
        self.provider
    }
}

/// A capability visible through some provider module.
#[derive(Debug, Clone)]
pub struct Export {
    pub capability: Arc<Capability>,
    pub provider: ModuleId,
}

/// All wires of one resolved module.
///
/// The static part never changes after commit. Dynamic wires are appended
/// under a lock; the first wire recorded for a package wins.
#[derive(Debug)]
pub struct Wiring {
    module: ModuleId,
    wires: Vec<Wire>,
    by_requirement: HashMap<RequirementRef, usize>,
    by_package: HashMap<String, usize>,
    exports: Vec<Arc<Capability>>,
    required: Vec<Export>,
    fragments: Vec<ModuleId>,
    host: Option<ModuleId>,
    dynamic: RwLock<Vec<Wire>>,
}

impl Wiring {
    /// Build the wiring of a host or standalone module.
    ///
    /// `exports` is the full export list other modules may match against,
    /// including capabilities contributed by fragments and re-exports.
    /// `required` lists the packages visible through required modules.
    #[must_use]
    pub fn new(
        module: ModuleId,
        wires: Vec<Wire>,
        exports: Vec<Arc<Capability>>,
        required: Vec<Export>,
        fragments: Vec<ModuleId>,
    ) -> Self {
        let mut by_requirement = HashMap::with_capacity(wires.len());
        let mut by_package = HashMap::new();
        for (i, wire) in wires.iter().enumerate() {
            by_requirement.insert(wire.requirement.key(), i);
            if wire.requirement.namespace() == Namespace::Package {
                by_package
                    .entry(wire.requirement.name().to_string())
                    .or_insert(i);
            }
        }

        Self {
            module,
            wires,
            by_requirement,
            by_package,
            exports,
            required,
            fragments,
            host: None,
            dynamic: RwLock::new(Vec::new()),
        }
    }

    /// Build the wiring of a fragment: a single wire to its host.
    #[must_use]
    pub fn fragment(module: ModuleId, host_wire: Wire) -> Self {
        let host = host_wire.provider();
        let mut wiring = Self::new(module, vec![host_wire], Vec::new(), Vec::new(), Vec::new());
        wiring.host = Some(host);
        wiring
    }

    #[must_use]
    pub fn module(&self) -> ModuleId {
        self.module
    }

    /// Static wires in requirement order.
    #[must_use]
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub fn wires_in(&self, namespace: Namespace) -> impl Iterator<Item = &Wire> {
        self.wires
            .iter()
            .filter(move |w| w.requirement.namespace() == namespace)
    }

    /// The wire satisfying a declared static requirement.
    #[must_use]
    pub fn wire_for(&self, key: RequirementRef) -> Option<&Wire> {
        self.by_requirement.get(&key).map(|&i| &self.wires[i])
    }

    /// The static or dynamic package wire for `package`, if any.
    #[must_use]
    pub fn package_wire(&self, package: &str) -> Option<Wire> {
        if let Some(&i) = self.by_package.get(package) {
            return Some(self.wires[i].clone());
        }
        self.dynamic
            .read()
            .iter()
            .find(|w| w.requirement.name() == package)
            .cloned()
    }

    /// Capabilities other modules may wire to.
    #[must_use]
    pub fn exports(&self) -> &[Arc<Capability>] {
        &self.exports
    }

    /// Packages made visible by required modules.
    #[must_use]
    pub fn required(&self) -> &[Export] {
        &self.required
    }

    /// Fragments attached to this host.
    #[must_use]
    pub fn fragments(&self) -> &[ModuleId] {
        &self.fragments
    }

    /// The host this fragment is attached to.
    #[must_use]
    pub fn host(&self) -> Option<ModuleId> {
        self.host
    }

    /// Dynamic wires recorded so far.
    #[must_use]
    pub fn dynamic_wires(&self) -> Vec<Wire> {
        self.dynamic.read().clone()
    }

    /// Record a dynamic wire. If another thread already wired the same
    /// package, that wire is kept and returned instead.
    pub fn add_dynamic(&self, wire: Wire) -> Wire {
        let mut dynamic = self.dynamic.write();
        if let Some(existing) = dynamic
            .iter()
            .find(|w| w.requirement.name() == wire.requirement.name())
        {
            return existing.clone();
        }
        dynamic.push(wire.clone());
        wire
    }

    /// Drop dynamic wires whose provider matches `gone`.
    pub(crate) fn drop_dynamic_where(&self, gone: impl Fn(ModuleId) -> bool) -> usize {
        let mut dynamic = self.dynamic.write();
        let before = dynamic.len();
        dynamic.retain(|w| !gone(w.provider));
        before - dynamic.len()
    }

    /// Which module services `package` for this module: an import wire
    /// first, then a required module, then the module's own exports.
    #[must_use]
    pub fn provider_for(&self, package: &str) -> Option<ModuleId> {
        if let Some(wire) = self.package_wire(package) {
            return Some(wire.provider);
        }
        if let Some(export) = self
            .required
            .iter()
            .find(|e| e.capability.name() == package)
        {
            return Some(export.provider);
        }
        self.exports
            .iter()
            .any(|c| c.name() == package)
            .then_some(self.module)
    }

    /// Modules this wiring depends on through static wires.
    pub fn providers(&self) -> impl Iterator<Item = ModuleId> + '_ {
        self.wires.iter().map(|w| w.provider)
    }
}
