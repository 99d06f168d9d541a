use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// One entry in the tracked-site table: identifier, display name and the
/// URL substrings that map to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSite {
    pub key: String,
    pub name: String,
    pub patterns: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

const fn default_enabled() -> bool {
    true
}

/// The tracked-site registry. Static configuration: read once at startup
/// from `sites.toml`, or the compiled-in defaults when no file exists.
/// Table order is significant -- the matcher takes the first site that
/// matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteRegistry {
    #[serde(rename = "site")]
    pub sites: Vec<TrackedSite>,
}

impl SiteRegistry {
    /// The built-in distraction sites.
    #[must_use]
    pub fn defaults() -> Self {
        let site = |key: &str, name: &str, patterns: &[&str]| TrackedSite {
            key: key.to_string(),
            name: name.to_string(),
            patterns: patterns.iter().map(ToString::to_string).collect(),
            enabled: true,
        };
        Self {
            sites: vec![
                site("xbox", "Xbox Cloud Gaming", &["xbox.com"]),
                site("netflix", "Netflix", &["netflix.com"]),
                site("prime", "Prime Video", &["primevideo.com", "amazon.com/gp/video"]),
                site("hotstar", "Disney+ Hotstar", &["hotstar.com"]),
            ],
        }
    }

    /// Load the registry from a TOML file, falling back to the defaults
    /// when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No site registry at {}, using defaults", path.display());
            return Ok(Self::defaults());
        }
        let contents = std::fs::read_to_string(path)?;
        let registry: Self = toml::from_str(&contents)?;
        log::info!(
            "Loaded {} tracked sites from {}",
            registry.sites.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Serialize the registry to TOML, for writing the initial config file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Look up a site by key.
    #[must_use]
    pub fn site(&self, key: &str) -> Option<&TrackedSite> {
        self.sites.iter().find(|s| s.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_contain_four_sites_in_order() {
        let registry = SiteRegistry::defaults();
        let keys: Vec<&str> = registry.sites.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["xbox", "netflix", "prime", "hotstar"]);
        assert!(registry.sites.iter().all(|s| s.enabled));
    }

    #[test]
    fn prime_carries_both_patterns() {
        let registry = SiteRegistry::defaults();
        let prime = registry.site("prime").unwrap();
        assert_eq!(prime.patterns, ["primevideo.com", "amazon.com/gp/video"]);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SiteRegistry::load(&dir.path().join("sites.toml")).unwrap();
        assert_eq!(registry, SiteRegistry::defaults());
    }

    #[test]
    fn load_parses_custom_registry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.toml");
        std::fs::write(
            &path,
            r#"
[[site]]
key = "yt"
name = "YouTube"
patterns = ["youtube.com", "youtu.be"]

[[site]]
key = "twitch"
name = "Twitch"
patterns = ["twitch.tv"]
enabled = false
"#,
        )
        .unwrap();

        let registry = SiteRegistry::load(&path).unwrap();
        assert_eq!(registry.sites.len(), 2);
        assert_eq!(registry.sites[0].key, "yt");
        assert!(registry.sites[0].enabled, "enabled defaults to true");
        assert!(!registry.sites[1].enabled);
    }

    #[test]
    fn toml_round_trip_preserves_order() {
        let registry = SiteRegistry::defaults();
        let text = registry.to_toml().unwrap();
        let parsed: SiteRegistry = toml::from_str(&text).unwrap();
        assert_eq!(parsed, registry);
    }
}
