//! Configuration for the resource resolution core.

use crate::error::MapError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration as TOML.
pub const DEFAULT_CONFIG: &str = r#"# Resource resolver configuration

[core]
# Paths for which externally observed repository changes are honored by
# the alias/vanity-path index update path. Empty means "observe everything".
observation_paths = []

[map]
# Root of the administrator-maintained resolve-map configuration tree.
map_root = "/etc/map"
# Rewrite ':' to '_' in path segments on outbound mapping.
mangle_namespace_prefixes = false

[alias]
# Build and consult the in-memory alias index instead of reading aliases
# from each resource on every mapping call.
optimize_alias_resolution = true
# If non-empty, the alias scan is restricted to these subtrees.
allowed_alias_locations = []

[vanity]
vanity_path_enabled = true
vanity_path_cache_init_in_background = false
# -1 means unlimited.
vanity_path_max_entries = -1
vanity_path_max_entries_on_startup = false
vanity_bloom_filter_max_bytes = 1024000
# false = longer-pattern-wins between vanity and global resolve entries.
vanity_path_precedence = false
default_vanity_path_redirect_status = 302
vanity_path_allow_list = []
vanity_path_deny_list = []
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub alias: AliasConfig,
    #[serde(default)]
    pub vanity: VanityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_observation_paths")]
    pub observation_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_map_root")]
    pub map_root: String,
    #[serde(default)]
    pub mangle_namespace_prefixes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AliasConfig {
    #[serde(default = "default_true")]
    pub optimize_alias_resolution: bool,
    #[serde(default)]
    pub allowed_alias_locations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VanityConfig {
    #[serde(default = "default_true")]
    pub vanity_path_enabled: bool,
    #[serde(default)]
    pub vanity_path_cache_init_in_background: bool,
    #[serde(default = "default_max_entries")]
    pub vanity_path_max_entries: i64,
    #[serde(default)]
    pub vanity_path_max_entries_on_startup: bool,
    #[serde(default = "default_bloom_bytes")]
    pub vanity_bloom_filter_max_bytes: usize,
    #[serde(default)]
    pub vanity_path_precedence: bool,
    #[serde(default = "default_redirect_status")]
    pub default_vanity_path_redirect_status: u16,
    #[serde(default)]
    pub vanity_path_allow_list: Vec<String>,
    #[serde(default)]
    pub vanity_path_deny_list: Vec<String>,
}

fn default_true() -> bool {
    true
}
fn default_observation_paths() -> Vec<String> {
    Vec::new()
}
fn default_map_root() -> String {
    "/etc/map".to_string()
}
fn default_max_entries() -> i64 {
    -1
}
fn default_bloom_bytes() -> usize {
    1_024_000
}
fn default_redirect_status() -> u16 {
    302
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            observation_paths: default_observation_paths(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            map_root: default_map_root(),
            mangle_namespace_prefixes: false,
        }
    }
}

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            optimize_alias_resolution: true,
            allowed_alias_locations: Vec::new(),
        }
    }
}

impl Default for VanityConfig {
    fn default() -> Self {
        Self {
            vanity_path_enabled: true,
            vanity_path_cache_init_in_background: false,
            vanity_path_max_entries: default_max_entries(),
            vanity_path_max_entries_on_startup: false,
            vanity_bloom_filter_max_bytes: default_bloom_bytes(),
            vanity_path_precedence: false,
            default_vanity_path_redirect_status: default_redirect_status(),
            vanity_path_allow_list: Vec::new(),
            vanity_path_deny_list: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| MapError::IllegalArgument(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| MapError::IllegalArgument(e.to_string()))
    }

    /// True if `path` is allowed by the vanity path allow/deny prefix lists.
    pub fn is_valid_vanity_path(&self, path: &str) -> bool {
        let deny = &self.vanity.vanity_path_deny_list;
        if deny.iter().any(|p| path.starts_with(p.as_str())) {
            return false;
        }
        let allow = &self.vanity.vanity_path_allow_list;
        allow.is_empty() || allow.iter().any(|p| path.starts_with(p.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_parses() {
        let config = Config::from_toml(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.map.map_root, "/etc/map");
        assert_eq!(config.vanity.vanity_path_max_entries, -1);
        assert!(config.alias.optimize_alias_resolution);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert!(config.vanity.vanity_path_enabled);
        assert_eq!(config.vanity.default_vanity_path_redirect_status, 302);
    }

    #[test]
    fn vanity_allow_deny_lists() {
        let mut config = Config::default();
        config.vanity.vanity_path_allow_list = vec!["/content/".to_string()];
        config.vanity.vanity_path_deny_list = vec!["/content/secret".to_string()];
        assert!(config.is_valid_vanity_path("/content/public/page"));
        assert!(!config.is_valid_vanity_path("/content/secret/page"));
        assert!(!config.is_valid_vanity_path("/other/page"));
    }
}
