use super::{attributes, directives, ModuleId, Namespace};
use crate::error::DeclareError;
use crate::version::VersionRange;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Whether an unsatisfied requirement blocks its module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Mandatory,
    Optional,
}

/// Whether a required module's packages are passed on to dependents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Reexport,
}

/// A requirement as declared by a collaborator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementDecl {
    pub namespace: Namespace,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<VersionRange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub directives: BTreeMap<String, String>,
    #[serde(default)]
    pub dynamic: bool,
}

impl RequirementDecl {
    #[must_use]
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
            range: None,
            attributes: BTreeMap::new(),
            directives: BTreeMap::new(),
            dynamic: false,
        }
    }

    /// Import a package.
    #[must_use]
    pub fn package(name: impl Into<String>) -> Self {
        Self::new(Namespace::Package, name)
    }

    /// Require a whole module by symbolic name.
    #[must_use]
    pub fn module(name: impl Into<String>) -> Self {
        Self::new(Namespace::Module, name)
    }

    /// Attach to a host module (makes the declaring module a fragment).
    #[must_use]
    pub fn host(name: impl Into<String>) -> Self {
        Self::new(Namespace::Host, name)
    }

    /// Dynamically import packages matching `pattern`.
    #[must_use]
    pub fn dynamic(pattern: impl Into<String>) -> Self {
        let mut decl = Self::package(pattern);
        decl.dynamic = true;
        decl
    }

    #[must_use]
    pub fn with_range(mut self, range: VersionRange) -> Self {
        self.range = Some(range);
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_directive(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.directives.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn optional(self) -> Self {
        self.with_directive(directives::RESOLUTION, "optional")
    }

    #[must_use]
    pub fn reexport(self) -> Self {
        self.with_directive(directives::VISIBILITY, "reexport")
    }

    pub(crate) fn build(self, key: RequirementRef) -> Result<Requirement, DeclareError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DeclareError::EmptyName {
                what: self.namespace.as_str(),
            });
        }

        if !self.dynamic && is_pattern(&name) {
            return Err(DeclareError::PatternNotAllowed { requirement: name });
        }

        let resolution = match self.directives.get(directives::RESOLUTION).map(String::as_str) {
            None | Some("mandatory") => Resolution::Mandatory,
            Some("optional") => Resolution::Optional,
            Some(other) => {
                return Err(DeclareError::InvalidDirective {
                    name,
                    directive: directives::RESOLUTION,
                    value: other.to_string(),
                })
            }
        };

        let visibility = match self.directives.get(directives::VISIBILITY).map(String::as_str) {
            None | Some("private") => Visibility::Private,
            Some("reexport") => Visibility::Reexport,
            Some(other) => {
                return Err(DeclareError::InvalidDirective {
                    name,
                    directive: directives::VISIBILITY,
                    value: other.to_string(),
                })
            }
        };

        let module_range = match self.attributes.get(attributes::MODULE_VERSION) {
            Some(text) => Some(VersionRange::parse(text).map_err(|source| {
                DeclareError::Version {
                    name: name.clone(),
                    source,
                }
            })?),
            None => None,
        };
        let module_name = self.attributes.get(attributes::MODULE_NAME).cloned();

        Ok(Requirement {
            namespace: self.namespace,
            name,
            range: self.range.unwrap_or_default(),
            attributes: self.attributes,
            directives: self.directives,
            resolution,
            visibility,
            dynamic: self.dynamic,
            module_range,
            module_name,
            key,
        })
    }
}

fn is_pattern(name: &str) -> bool {
    name == "*" || name.ends_with(".*")
}

/// Identifies a declared requirement: the declaring module plus its
/// position in the module's static or dynamic list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct RequirementRef {
    pub module: ModuleId,
    pub index: usize,
    pub dynamic: bool,
}

/// A validated, immutable requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Requirement {
    namespace: Namespace,
    name: String,
    range: VersionRange,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    directives: BTreeMap<String, String>,
    resolution: Resolution,
    visibility: Visibility,
    dynamic: bool,
    #[serde(skip)]
    module_range: Option<VersionRange>,
    #[serde(skip)]
    module_name: Option<String>,
    key: RequirementRef,
}

impl Requirement {
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Exact name, or a pattern for dynamic requirements.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn range(&self) -> &VersionRange {
        &self.range
    }

    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    #[must_use]
    pub fn directives(&self) -> &BTreeMap<String, String> {
        &self.directives
    }

    #[must_use]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    #[must_use]
    pub fn is_mandatory(&self) -> bool {
        self.resolution == Resolution::Mandatory
    }

    #[must_use]
    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Version range the exporting module itself must satisfy.
    #[must_use]
    pub fn module_range(&self) -> Option<&VersionRange> {
        self.module_range.as_ref()
    }

    /// Symbolic name the exporting module must have.
    #[must_use]
    pub fn module_name(&self) -> Option<&str> {
        self.module_name.as_deref()
    }

    #[must_use]
    pub fn key(&self) -> RequirementRef {
        self.key
    }

    /// Whether this requirement's name (or pattern) covers `package`.
    ///
    /// `*` covers everything and `a.b.*` covers every sub-package of `a.b`.
    /// Non-dynamic requirements only match their exact name.
    #[must_use]
    pub fn covers_package(&self, package: &str) -> bool {
        if !self.dynamic {
            return self.name == package;
        }
        if self.name == "*" {
            return true;
        }
        match self.name.strip_suffix(".*") {
            Some(prefix) => package
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1),
            None => self.name == package,
        }
    }

    /// A transient optional requirement for one concrete package, carrying
    /// this dynamic requirement's range, attributes and key.
    #[must_use]
    pub fn for_package(&self, package: &str) -> Self {
        let mut req = self.clone();
        req.name = package.to_string();
        req.resolution = Resolution::Optional;
        req
    }
}
