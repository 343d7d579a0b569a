//! Capability/requirement matching and candidate ordering.
//!
//! Rules, in the order [`check`] applies them:
//! 1. namespaces are equal
//! 2. names are equal (patterns never match here)
//! 3. the capability version lies in the requirement range, and the
//!    capability's declaring module satisfies any owning-module constraint
//! 4. every mandatory attribute of the capability is echoed by the
//!    requirement with an equal value
//! 5. every non-reserved requirement attribute exists on the capability with
//!    an equal value

use crate::model::{attributes, Capability, ModuleId, Requirement};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Why a capability does not satisfy a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Mismatch {
    Namespace,
    Name,
    Version,
    ModuleVersion,
    ModuleName,
    MandatoryAttribute { key: String },
    Attribute { key: String },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Namespace => f.write_str("namespace differs"),
            Self::Name => f.write_str("name differs"),
            Self::Version => f.write_str("version outside range"),
            Self::ModuleVersion => f.write_str("exporting module version outside range"),
            Self::ModuleName => f.write_str("exporting module name differs"),
            Self::MandatoryAttribute { key } => {
                write!(f, "mandatory attribute '{key}' not matched")
            }
            Self::Attribute { key } => write!(f, "attribute '{key}' not matched"),
        }
    }
}

/// Does `capability` satisfy `requirement`?
#[must_use]
pub fn matches(requirement: &Requirement, capability: &Capability) -> bool {
    check(requirement, capability).is_ok()
}

/// Like [`matches`], reporting the first rule that fails.
pub fn check(requirement: &Requirement, capability: &Capability) -> Result<(), Mismatch> {
    if requirement.namespace() != capability.namespace() {
        return Err(Mismatch::Namespace);
    }
    if requirement.name() != capability.name() {
        return Err(Mismatch::Name);
    }
    if !requirement.range().contains(capability.version()) {
        return Err(Mismatch::Version);
    }

    let origin = capability.origin();
    if let Some(range) = requirement.module_range() {
        if !range.contains(&origin.version) {
            return Err(Mismatch::ModuleVersion);
        }
    }
    if let Some(name) = requirement.module_name() {
        if name != origin.symbolic_name {
            return Err(Mismatch::ModuleName);
        }
    }

    for key in capability.mandatory() {
        if requirement.attributes().get(key) != capability.attributes().get(key) {
            return Err(Mismatch::MandatoryAttribute { key: key.clone() });
        }
    }

    for (key, wanted) in requirement.attributes() {
        if attributes::is_reserved(key) {
            continue;
        }
        if capability.attribute(key) != Some(wanted.as_str()) {
            return Err(Mismatch::Attribute { key: key.clone() });
        }
    }

    Ok(())
}

/// A capability offered by some provider module.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub capability: Arc<Capability>,
    pub provider: ModuleId,
    pub resolved: bool,
}

impl Candidate {
    #[must_use]
    pub fn new(capability: Arc<Capability>, provider: ModuleId, resolved: bool) -> Self {
        Self {
            capability,
            provider,
            resolved,
        }
    }
}

/// Tie-break between two matching candidates; `Less` means `a` is preferred.
///
/// Resolved providers first, then the higher capability version, then the
/// earlier-registered provider, then declaration order.
#[must_use]
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.resolved
        .cmp(&a.resolved)
        .then_with(|| b.capability.version().cmp(a.capability.version()))
        .then_with(|| a.provider.cmp(&b.provider))
        .then_with(|| a.capability.origin().index.cmp(&b.capability.origin().index))
}

/// The preferred candidate among those matching `requirement`.
pub fn best<'a, I>(requirement: &Requirement, candidates: I) -> Option<Candidate>
where
    I: IntoIterator<Item = &'a Candidate>,
{
    candidates
        .into_iter()
        .filter(|c| matches(requirement, &c.capability))
        .min_by(|a, b| compare_candidates(a, b))
        .cloned()
}
