use super::{
    directives, Capability, CapabilityDecl, CapabilityOrigin, Namespace, Requirement,
    RequirementDecl, RequirementRef,
};
use crate::error::DeclareError;
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Registry-assigned module identifier. Ids grow in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A module as declared by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub symbolic_name: String,
    #[serde(default)]
    pub version: Version,
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub capabilities: Vec<CapabilityDecl>,
    #[serde(default)]
    pub requirements: Vec<RequirementDecl>,
}

impl ModuleDecl {
    #[must_use]
    pub fn new(symbolic_name: impl Into<String>, version: Version) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            version,
            singleton: false,
            capabilities: Vec::new(),
            requirements: Vec::new(),
        }
    }

    #[must_use]
    pub fn singleton(mut self) -> Self {
        self.singleton = true;
        self
    }

    #[must_use]
    pub fn provides(mut self, capability: CapabilityDecl) -> Self {
        self.capabilities.push(capability);
        self
    }

    #[must_use]
    pub fn requires(mut self, requirement: RequirementDecl) -> Self {
        self.requirements.push(requirement);
        self
    }
}

/// The unit of resolution. Immutable once declared.
#[derive(Debug, Clone)]
pub struct Module {
    id: ModuleId,
    symbolic_name: String,
    version: Version,
    singleton: bool,
    capabilities: Vec<Arc<Capability>>,
    requirements: Vec<Arc<Requirement>>,
    dynamic_requirements: Vec<Arc<Requirement>>,
}

impl Module {
    /// Validate a declaration.
    ///
    /// Non-fragment modules receive a module-identity and a host capability
    /// named after themselves unless they declare their own.
    pub fn from_decl(id: ModuleId, decl: ModuleDecl) -> Result<Self, DeclareError> {
        let symbolic_name = decl.symbolic_name.trim().to_string();
        if symbolic_name.is_empty() {
            return Err(DeclareError::EmptyName { what: "module" });
        }

        let mut requirements = Vec::new();
        let mut dynamic_requirements = Vec::new();
        let mut hosts = 0usize;
        for req in decl.requirements {
            let dynamic = req.dynamic;
            let list = if dynamic {
                &mut dynamic_requirements
            } else {
                &mut requirements
            };
            let key = RequirementRef {
                module: id,
                index: list.len(),
                dynamic,
            };
            let built = req.build(key)?;
            if built.namespace() == Namespace::Host {
                hosts += 1;
                if built.is_dynamic() || !built.is_mandatory() {
                    return Err(DeclareError::InvalidHostRequirement {
                        module: symbolic_name,
                    });
                }
            }
            list.push(Arc::new(built));
        }
        if hosts > 1 {
            return Err(DeclareError::MultipleHosts {
                module: symbolic_name,
            });
        }
        let fragment = hosts == 1;

        let mut decls = decl.capabilities;
        if !fragment {
            for namespace in [Namespace::Module, Namespace::Host] {
                if !decls.iter().any(|c| c.namespace == namespace) {
                    decls.push(
                        CapabilityDecl::new(namespace, symbolic_name.clone())
                            .with_version(decl.version.clone()),
                    );
                }
            }
        }

        let mut capabilities = Vec::with_capacity(decls.len());
        for (index, mut cap) in decls.into_iter().enumerate() {
            if cap.namespace == Namespace::Module && decl.singleton {
                cap.directives
                    .insert(directives::SINGLETON.to_string(), "true".to_string());
            }
            let origin = CapabilityOrigin {
                module: id,
                symbolic_name: symbolic_name.clone(),
                version: decl.version.clone(),
                index,
            };
            capabilities.push(Arc::new(cap.build(origin)?));
        }

        Ok(Self {
            id,
            symbolic_name,
            version: decl.version,
            singleton: decl.singleton,
            capabilities,
            requirements,
            dynamic_requirements,
        })
    }

    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.id
    }

    #[must_use]
    pub fn symbolic_name(&self) -> &str {
        &self.symbolic_name
    }

    #[must_use]
    pub fn version(&self) -> &Version {
        &self.version
    }

    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }

    /// All capabilities in declaration order.
    #[must_use]
    pub fn capabilities(&self) -> &[Arc<Capability>] {
        &self.capabilities
    }

    /// Static requirements in declaration order, including a host requirement.
    #[must_use]
    pub fn requirements(&self) -> &[Arc<Requirement>] {
        &self.requirements
    }

    /// Dynamic requirements in declaration order.
    #[must_use]
    pub fn dynamic_requirements(&self) -> &[Arc<Requirement>] {
        &self.dynamic_requirements
    }

    /// Package capabilities in declaration order.
    pub fn exports(&self) -> impl Iterator<Item = &Arc<Capability>> {
        self.capabilities_in(Namespace::Package)
    }

    pub fn capabilities_in(&self, namespace: Namespace) -> impl Iterator<Item = &Arc<Capability>> {
        self.capabilities
            .iter()
            .filter(move |c| c.namespace() == namespace)
    }

    /// The module-identity capability, absent for fragments.
    #[must_use]
    pub fn identity(&self) -> Option<&Arc<Capability>> {
        self.capabilities_in(Namespace::Module).next()
    }

    /// The fragment-attachment capability, absent for fragments.
    #[must_use]
    pub fn host_capability(&self) -> Option<&Arc<Capability>> {
        self.capabilities_in(Namespace::Host).next()
    }

    /// The host requirement, present iff this module is a fragment.
    #[must_use]
    pub fn host_requirement(&self) -> Option<&Arc<Requirement>> {
        self.requirements
            .iter()
            .find(|r| r.namespace() == Namespace::Host)
    }

    #[must_use]
    pub fn is_fragment(&self) -> bool {
        self.host_requirement().is_some()
    }

    /// Static requirements other than the host requirement.
    pub fn wirable_requirements(&self) -> impl Iterator<Item = &Arc<Requirement>> {
        self.requirements
            .iter()
            .filter(|r| r.namespace() != Namespace::Host)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.symbolic_name, self.version)
    }
}
