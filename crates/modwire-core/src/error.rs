use crate::version::VersionError;
use std::path::PathBuf;
use thiserror::Error;

/// Stable error codes.
pub mod codes {
    pub const DECLARE_NAME_EMPTY: &str = "DECLARE_NAME_EMPTY";
    pub const DECLARE_MANDATORY_ATTRIBUTE_MISSING: &str = "DECLARE_MANDATORY_ATTRIBUTE_MISSING";
    pub const DECLARE_DIRECTIVE_INVALID: &str = "DECLARE_DIRECTIVE_INVALID";
    pub const DECLARE_PATTERN_NOT_ALLOWED: &str = "DECLARE_PATTERN_NOT_ALLOWED";
    pub const DECLARE_MULTIPLE_HOSTS: &str = "DECLARE_MULTIPLE_HOSTS";
    pub const DECLARE_HOST_REQUIREMENT_INVALID: &str = "DECLARE_HOST_REQUIREMENT_INVALID";
    pub const DECLARE_VERSION_INVALID: &str = "DECLARE_VERSION_INVALID";

    pub const MANIFEST_READ_FAILED: &str = "MANIFEST_READ_FAILED";
    pub const MANIFEST_INVALID: &str = "MANIFEST_INVALID";
    pub const MANIFEST_UNKNOWN_MODULE: &str = "MANIFEST_UNKNOWN_MODULE";
}

/// A module declaration was rejected.
///
/// Raised synchronously by `declare_module`; the module is never
/// partially registered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclareError {
    #[error("{what} name must not be empty")]
    EmptyName { what: &'static str },

    #[error("capability '{capability}' lists mandatory attribute '{attribute}' it does not declare")]
    MandatoryAttributeMissing { capability: String, attribute: String },

    #[error("'{name}' has invalid {directive} directive value '{value}'")]
    InvalidDirective {
        name: String,
        directive: &'static str,
        value: String,
    },

    #[error("requirement '{requirement}' uses a pattern but is not dynamic")]
    PatternNotAllowed { requirement: String },

    #[error("fragment '{module}' declares more than one host requirement")]
    MultipleHosts { module: String },

    #[error("host requirement of '{module}' must be static and mandatory")]
    InvalidHostRequirement { module: String },

    #[error("'{name}' has an invalid version: {source}")]
    Version {
        name: String,
        #[source]
        source: VersionError,
    },
}

impl DeclareError {
    /// Stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyName { .. } => codes::DECLARE_NAME_EMPTY,
            Self::MandatoryAttributeMissing { .. } => codes::DECLARE_MANDATORY_ATTRIBUTE_MISSING,
            Self::InvalidDirective { .. } => codes::DECLARE_DIRECTIVE_INVALID,
            Self::PatternNotAllowed { .. } => codes::DECLARE_PATTERN_NOT_ALLOWED,
            Self::MultipleHosts { .. } => codes::DECLARE_MULTIPLE_HOSTS,
            Self::InvalidHostRequirement { .. } => codes::DECLARE_HOST_REQUIREMENT_INVALID,
            Self::Version { .. } => codes::DECLARE_VERSION_INVALID,
        }
    }
}

/// Error type for loading module manifests.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read manifest at {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {source}")]
    ManifestParse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Module '{module}' rejected: {source}")]
    Declare {
        module: String,
        #[source]
        source: DeclareError,
    },

    #[error("Unknown module '{name}'")]
    UnknownModule { name: String },
}

impl Error {
    /// Stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ManifestRead { .. } => codes::MANIFEST_READ_FAILED,
            Self::ManifestParse { .. } => codes::MANIFEST_INVALID,
            Self::Declare { source, .. } => source.code(),
            Self::UnknownModule { .. } => codes::MANIFEST_UNKNOWN_MODULE,
        }
    }
}
