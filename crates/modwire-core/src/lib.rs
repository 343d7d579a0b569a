#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]

//! Dynamic module dependency resolution.
//!
//! Modules declare versioned capabilities and requirements; the
//! [`ModuleRegistry`] wires every mandatory requirement of a resolved module
//! to a matching capability, and wires dynamic package imports lazily.

pub mod config;
pub mod dynamic;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod matcher;
pub mod model;
pub mod registry;
pub mod version;

pub use config::{Config, ResolverConfig};
pub use dynamic::{DepthGuard, DynamicContext};
pub use engine::{FixpointStrategy, ResolveFailure, ResolveStrategy, RoundOutcome};
pub use error::{DeclareError, Error};
pub use manifest::Manifest;
pub use matcher::{Candidate, Mismatch};
pub use model::{
    Capability, CapabilityDecl, Module, ModuleDecl, ModuleId, Namespace, Requirement,
    RequirementDecl, Wire, Wiring,
};
pub use registry::{
    ModuleRegistry, RemovalReport, ResolveEvent, ResolveListener, ResolveReport, Snapshot,
    WiringSummary, RESOLVE_REPORT_SCHEMA_VERSION,
};
pub use version::{Version, VersionError, VersionRange};

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns a formatted version string.
#[must_use]
pub fn version_string() -> String {
    format!("modwire {VERSION}")
}
