//! Declarations and resolution results.
//!
//! Modules declare [`Capability`]s and [`Requirement`]s; once resolved, a
//! module owns a [`Wiring`] made of [`Wire`]s pairing each requirement with
//! the capability that satisfies it.

mod capability;
mod module;
mod requirement;
mod wiring;

pub use capability::{Capability, CapabilityDecl, CapabilityOrigin};
pub use module::{Module, ModuleDecl, ModuleId};
pub use requirement::{RequirementRef, Requirement, RequirementDecl, Resolution, Visibility};
pub use wiring::{Export, Wire, Wiring};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Directive keys understood by the resolver.
pub mod directives {
    pub const RESOLUTION: &str = "resolution";
    pub const VISIBILITY: &str = "visibility";
    pub const MANDATORY: &str = "mandatory";
    pub const USES: &str = "uses";
    pub const SINGLETON: &str = "singleton";
    pub const INCLUDE: &str = "include";
    pub const EXCLUDE: &str = "exclude";
}

/// Attribute keys with reserved meaning; never compared as plain attributes.
pub mod attributes {
    pub const VERSION: &str = "version";
    pub const MODULE_VERSION: &str = "module-version";
    pub const MODULE_NAME: &str = "module-name";

    /// Whether `key` is reserved.
    #[must_use]
    pub fn is_reserved(key: &str) -> bool {
        matches!(key, VERSION | MODULE_VERSION | MODULE_NAME)
    }
}

/// What a capability or requirement talks about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    /// An exported or imported package.
    Package,
    /// A whole module, by symbolic name.
    Module,
    /// A fragment attachment point.
    Host,
}

impl Namespace {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::Module => "module",
            Self::Host => "host",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a comma-separated directive value into trimmed, non-empty items.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}
