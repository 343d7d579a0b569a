use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Runtime configuration for the modwire CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    /// Resolve `path` against the working directory.
    #[must_use]
    pub fn path(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

/// Resolver tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound on rounds per `resolve` call.
    pub max_rounds: usize,

    /// How deep dynamic lookups of the same package may nest on one context.
    pub dynamic_depth_limit: usize,

    /// Resolve unresolved providers on demand during dynamic lookups.
    pub on_demand_dynamic: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_rounds: 64,
            dynamic_depth_limit: 1,
            on_demand_dynamic: true,
        }
    }
}

impl ResolverConfig {
    #[must_use]
    pub fn with_max_rounds(mut self, rounds: usize) -> Self {
        self.max_rounds = rounds.max(1);
        self
    }

    #[must_use]
    pub fn with_dynamic_depth_limit(mut self, limit: usize) -> Self {
        self.dynamic_depth_limit = limit;
        self
    }

    #[must_use]
    pub fn with_on_demand_dynamic(mut self, enabled: bool) -> Self {
        self.on_demand_dynamic = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = Config::new(PathBuf::from("/work"))
            .with_verbosity(2)
            .with_json_logs(true);
        assert_eq!(config.verbosity, 2);
        assert!(config.json_logs);
        assert_eq!(
            config.path(std::path::Path::new("m.json")),
            PathBuf::from("/work/m.json")
        );
    }

    #[test]
    fn test_resolver_config_partial_json() {
        let config: ResolverConfig = serde_json::from_str(r#"{"max_rounds": 3}"#).unwrap();
        assert_eq!(config.max_rounds, 3);
        assert_eq!(config.dynamic_depth_limit, 1);
        assert!(config.on_demand_dynamic);
    }

    #[test]
    fn test_max_rounds_at_least_one() {
        assert_eq!(ResolverConfig::default().with_max_rounds(0).max_rounds, 1);
    }
}
