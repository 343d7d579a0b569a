use super::{directives, split_list, ModuleId, Namespace};
use crate::error::DeclareError;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A capability as declared by a collaborator, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDecl {
    pub namespace: Namespace,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub directives: BTreeMap<String, String>,
}

impl CapabilityDecl {
    #[must_use]
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
            version: None,
            attributes: BTreeMap::new(),
            directives: BTreeMap::new(),
        }
    }

    /// An exported package.
    #[must_use]
    pub fn package(name: impl Into<String>) -> Self {
        Self::new(Namespace::Package, name)
    }

    #[must_use]
    pub fn with_version(mut self, version: Version) -> Self {
        self.version = Some(version);
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

    /// Validate and attach the capability to its declaring module.
    pub(crate) fn build(self, origin: CapabilityOrigin) -> Result<Capability, DeclareError> {
        if self.name.trim().is_empty() {
            return Err(DeclareError::EmptyName {
                what: self.namespace.as_str(),
            });
        }

        let mut mandatory = BTreeSet::new();
        if let Some(list) = self.directives.get(directives::MANDATORY) {
            for key in split_list(list) {
                if !self.attributes.contains_key(key) {
                    return Err(DeclareError::MandatoryAttributeMissing {
                        capability: self.name,
                        attribute: key.to_string(),
                    });
                }
                mandatory.insert(key.to_string());
            }
        }

        Ok(Capability {
            namespace: self.namespace,
            name: self.name,
            version: self.version.unwrap_or_default(),
            attributes: self.attributes,
            directives: self.directives,
            mandatory,
            origin,
        })
    }
}

/// Where a capability was declared.
///
/// Re-exported and fragment-contributed capabilities keep the origin of
/// their declaring module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CapabilityOrigin {
    pub module: ModuleId,
    pub symbolic_name: String,
    pub version: Version,
    /// Position in the declaring module's capability list.
    pub index: usize,
}

/// A validated, immutable capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    namespace: Namespace,
    name: String,
    version: Version,
    attributes: BTreeMap<String, String>,
    directives: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    mandatory: BTreeSet<String>,
    origin: CapabilityOrigin,
}

impl Capability {
    #[must_use]
    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    #[must_use]
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn directives(&self) -> &BTreeMap<String, String> {
        &self.directives
    }

    #[must_use]
    pub fn directive(&self, key: &str) -> Option<&str> {
        self.directives.get(key).map(String::as_str)
    }

    /// Attribute keys a requirement must echo to match.
    #[must_use]
    pub fn mandatory(&self) -> &BTreeSet<String> {
        &self.mandatory
    }

    /// Package names this export's implementation uses. Informational only.
    pub fn uses(&self) -> impl Iterator<Item = &str> {
        self.directive(directives::USES)
            .into_iter()
            .flat_map(split_list)
    }

    #[must_use]
    pub fn origin(&self) -> &CapabilityOrigin {
        &self.origin
    }

    /// Whether this identity capability marks its module a singleton.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.directive(directives::SINGLETON) == Some("true")
    }
}
