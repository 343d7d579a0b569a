//! JSON manifests describing a set of modules to declare and resolve.
//!
//! ```json
//! {
//!   "config": { "max_rounds": 16 },
//!   "modules": [
//!     {
//!       "symbolic_name": "app",
//!       "version": "1.0",
//!       "requirements": [{ "namespace": "package", "name": "util", "range": "[1.0,2.0)" }]
//!     }
//!   ],
//!   "resolve": ["app"]
//! }
//! ```

use crate::config::ResolverConfig;
use crate::error::Error;
use crate::model::{ModuleDecl, ModuleId};
use crate::registry::ModuleRegistry;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A parsed manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub config: ResolverConfig,

    pub modules: Vec<ModuleDecl>,

    /// Symbolic names to resolve. Every declared module when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve: Option<Vec<String>>,
}

impl Manifest {
    /// Read and parse a manifest file.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|source| Error::ManifestParse { source })
    }

    /// Declare every module into a fresh registry.
    ///
    /// Returns the registry and the ids to resolve, in declaration order.
    pub fn into_registry(self) -> Result<(ModuleRegistry, Vec<ModuleId>), Error> {
        let registry = ModuleRegistry::with_config(self.config);

        let names: Vec<String> = self.modules.iter().map(|d| d.symbolic_name.clone()).collect();
        let results = registry.declare_modules(self.modules);

        let mut declared = Vec::with_capacity(names.len());
        for (name, result) in names.into_iter().zip(results) {
            let id = result.map_err(|source| Error::Declare {
                module: name.clone(),
                source,
            })?;
            declared.push((name, id));
        }

        let batch = match self.resolve {
            None => declared.iter().map(|(_, id)| *id).collect(),
            Some(names) => {
                let mut batch = Vec::new();
                for name in names {
                    let before = batch.len();
                    batch.extend(declared.iter().filter(|(n, _)| *n == name).map(|(_, id)| *id));
                    if batch.len() == before {
                        return Err(Error::UnknownModule { name });
                    }
                }
                batch
            }
        };

        Ok((registry, batch))
    }
}
