use crate::engine::ResolveFailure;
use crate::model::{Module, ModuleId, Namespace, Resolution, Wire, Wiring};
use serde::Serialize;
use std::collections::BTreeMap;

/// Schema version for serialized resolve reports.
pub const RESOLVE_REPORT_SCHEMA_VERSION: u32 = 1;

/// Outcome of one `resolve` call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolveReport {
    /// Requested modules that are resolved after the call, including those
    /// that already were.
    pub resolved: Vec<ModuleId>,
    /// Requested modules left unresolved, with the reason.
    pub failed: BTreeMap<ModuleId, ResolveFailure>,
    /// Every module this call committed, requested or pulled in.
    pub committed: Vec<ModuleId>,
    /// Rounds run.
    pub rounds: usize,
}

impl ResolveReport {
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    #[must_use]
    pub fn is_resolved(&self, id: ModuleId) -> bool {
        self.resolved.contains(&id)
    }

    #[must_use]
    pub fn failure(&self, id: ModuleId) -> Option<&ResolveFailure> {
        self.failed.get(&id)
    }
}

/// Outcome of `remove_module`.
#[derive(Debug, Clone, Serialize)]
pub struct RemovalReport {
    pub removed: ModuleId,
    /// Modules that lost their wiring because they (transitively) depended
    /// on the removed module.
    pub unresolved: Vec<ModuleId>,
    /// Dynamic wires dropped from modules that stayed resolved.
    pub dynamic_wires_dropped: usize,
}

/// Resolution state change, delivered after the resolution lock is released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveEvent {
    Resolved(ModuleId),
    SingletonConflict {
        module: ModuleId,
        incumbent: ModuleId,
    },
    Unresolved(ModuleId),
}

impl ResolveEvent {
    #[must_use]
    pub fn module(&self) -> ModuleId {
        match self {
            Self::Resolved(id) | Self::Unresolved(id) => *id,
            Self::SingletonConflict { module, .. } => *module,
        }
    }
}

/// Receives [`ResolveEvent`]s.
///
/// Listeners may call back into the registry, including `resolve` and
/// `resolve_dynamic`.
pub trait ResolveListener: Send + Sync {
    fn on_event(&self, event: &ResolveEvent);
}

/// One wire, flattened for output.
#[derive(Debug, Clone, Serialize)]
pub struct WireSummary {
    pub namespace: Namespace,
    pub name: String,
    pub provider: ModuleId,
    pub version: String,
    pub optional: bool,
}

impl From<&Wire> for WireSummary {
    fn from(wire: &Wire) -> Self {
        Self {
            namespace: wire.requirement().namespace(),
            name: wire.capability().name().to_string(),
            provider: wire.provider(),
            version: wire.capability().version().to_string(),
            optional: wire.requirement().resolution() == Resolution::Optional,
        }
    }
}

/// A module's wiring, flattened for output.
#[derive(Debug, Clone, Serialize)]
pub struct WiringSummary {
    pub module: ModuleId,
    pub symbolic_name: String,
    pub version: String,
    pub wires: Vec<WireSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dynamic: Vec<WireSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fragments: Vec<ModuleId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<ModuleId>,
}

impl WiringSummary {
    #[must_use]
    pub fn new(module: &Module, wiring: &Wiring) -> Self {
        Self {
            module: module.id(),
            symbolic_name: module.symbolic_name().to_string(),
            version: module.version().to_string(),
            wires: wiring.wires().iter().map(WireSummary::from).collect(),
            dynamic: wiring.dynamic_wires().iter().map(WireSummary::from).collect(),
            fragments: wiring.fragments().to_vec(),
            host: wiring.host(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_serializes_failures_by_code() {
        let mut report = ResolveReport::default();
        report.resolved.push(ModuleId(1));
        report.failed.insert(
            ModuleId(2),
            ResolveFailure::SingletonConflict {
                incumbent: ModuleId(1),
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["resolved"][0], 1);
        assert_eq!(json["failed"]["2"]["code"], "SINGLETON_CONFLICT");
        assert_eq!(json["failed"]["2"]["incumbent"], 1);
        assert!(!report.is_success());
    }

    #[test]
    fn test_event_module() {
        let event = ResolveEvent::SingletonConflict {
            module: ModuleId(3),
            incumbent: ModuleId(1),
        };
        assert_eq!(event.module(), ModuleId(3));
        assert_eq!(ResolveEvent::Resolved(ModuleId(4)).module(), ModuleId(4));
    }
}
