//! Persistent CLI profile configuration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use binome_core::config::{
    ENV_DISTRIBUTIONS_TABLE, ENV_SESSION_TTL_SECS, ENV_SYNC_DEBOUNCE_MS, ENV_TABLE_API_TOKEN,
    ENV_TABLE_API_URL, ENV_TABLE_PROXIED, ENV_ZONES_TABLE,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "cli-config.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfilesConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub active_profile: Option<String>,
    #[serde(default)]
    pub profiles: BTreeMap<String, CliProfile>,
}

/// Remote sync settings stored for one profile. Environment variables of
/// the same meaning take precedence.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliProfile {
    #[serde(default)]
    pub table_api_url: Option<String>,
    #[serde(default)]
    pub table_api_token: Option<String>,
    #[serde(default)]
    pub table_proxied: Option<bool>,
    #[serde(default)]
    pub distributions_table: Option<String>,
    #[serde(default)]
    pub zones_table: Option<String>,
    #[serde(default)]
    pub sync_debounce_ms: Option<u64>,
    #[serde(default)]
    pub session_ttl_secs: Option<u64>,
}

impl fmt::Debug for CliProfile {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("CliProfile")
            .field("table_api_url", &self.table_api_url)
            .field(
                "table_api_token",
                &self.table_api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("table_proxied", &self.table_proxied)
            .field("distributions_table", &self.distributions_table)
            .field("zones_table", &self.zones_table)
            .field("sync_debounce_ms", &self.sync_debounce_ms)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .finish()
    }
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("binome")
        .join(CONFIG_FILE_NAME)
}

pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    binome_core::util::normalize_text_option(value)
}

pub fn normalize_profile_name(value: Option<&str>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl CliProfilesConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path();
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    pub fn resolve_profile_name(&self, explicit: Option<&str>) -> String {
        if let Some(profile) = normalize_profile_name(explicit) {
            return profile;
        }
        if let Some(profile) =
            normalize_profile_name(std::env::var("BINOME_PROFILE").ok().as_deref())
        {
            return profile;
        }
        if let Some(profile) = normalize_profile_name(self.active_profile.as_deref()) {
            return profile;
        }
        "default".to_string()
    }

    pub fn profile(&self, name: &str) -> Option<&CliProfile> {
        self.profiles.get(name)
    }

    pub fn profile_mut_or_default(&mut self, name: &str) -> &mut CliProfile {
        self.profiles.entry(name.to_string()).or_default()
    }

    fn normalize(&mut self) {
        self.active_profile = normalize_profile_name(self.active_profile.as_deref());
        for profile in self.profiles.values_mut() {
            profile.normalize();
        }
    }
}

impl CliProfile {
    /// Stored value for a settings variable, rendered as the environment
    /// would provide it.
    pub fn lookup(&self, key: &str) -> Option<String> {
        match key {
            ENV_TABLE_API_URL => self.table_api_url.clone(),
            ENV_TABLE_API_TOKEN => self.table_api_token.clone(),
            ENV_TABLE_PROXIED => self.table_proxied.map(|proxied| proxied.to_string()),
            ENV_DISTRIBUTIONS_TABLE => self.distributions_table.clone(),
            ENV_ZONES_TABLE => self.zones_table.clone(),
            ENV_SYNC_DEBOUNCE_MS => self.sync_debounce_ms.map(|value| value.to_string()),
            ENV_SESSION_TTL_SECS => self.session_ttl_secs.map(|value| value.to_string()),
            _ => None,
        }
    }

    fn normalize(&mut self) {
        self.table_api_url = normalize_text_option(self.table_api_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.table_api_token = normalize_text_option(self.table_api_token.take());
        self.distributions_table = normalize_text_option(self.distributions_table.take());
        self.zones_table = normalize_text_option(self.zones_table.take());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_profile_name_rejects_empty() {
        assert_eq!(normalize_profile_name(None), None);
        assert_eq!(normalize_profile_name(Some(" ")), None);
    }

    #[test]
    fn config_roundtrip_preserves_profiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        let mut config = CliProfilesConfig {
            version: 1,
            active_profile: Some(" field ".to_string()),
            profiles: BTreeMap::new(),
        };
        config.profiles.insert(
            "field".to_string(),
            CliProfile {
                table_api_url: Some(" https://tables.example.com/v0/base/ ".to_string()),
                table_api_token: Some(" token ".to_string()),
                zones_table: Some("   ".to_string()),
                sync_debounce_ms: Some(500),
                ..CliProfile::default()
            },
        );

        config.save_to_path(&path).unwrap();
        let loaded = CliProfilesConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.active_profile.as_deref(), Some("field"));
        let profile = loaded.profile("field").unwrap();
        assert_eq!(
            profile.table_api_url.as_deref(),
            Some("https://tables.example.com/v0/base")
        );
        assert_eq!(profile.table_api_token.as_deref(), Some("token"));
        assert_eq!(profile.zones_table, None);
        assert_eq!(profile.sync_debounce_ms, Some(500));
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = CliProfilesConfig::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, CliProfilesConfig::default());
    }

    #[test]
    fn resolve_profile_name_prefers_explicit_then_active() {
        let config = CliProfilesConfig {
            version: 1,
            active_profile: Some("work".to_string()),
            profiles: BTreeMap::new(),
        };
        assert_eq!(config.resolve_profile_name(Some("mobile")), "mobile");
        assert_eq!(config.resolve_profile_name(None), "work");
    }

    #[test]
    fn lookup_maps_settings_variables() {
        let profile = CliProfile {
            table_api_url: Some("https://tables.example.com".to_string()),
            table_proxied: Some(true),
            session_ttl_secs: Some(600),
            ..CliProfile::default()
        };
        assert_eq!(
            profile.lookup(ENV_TABLE_API_URL).as_deref(),
            Some("https://tables.example.com")
        );
        assert_eq!(profile.lookup(ENV_TABLE_PROXIED).as_deref(), Some("true"));
        assert_eq!(profile.lookup(ENV_SESSION_TTL_SECS).as_deref(), Some("600"));
        assert_eq!(profile.lookup(ENV_TABLE_API_TOKEN), None);
        assert_eq!(profile.lookup("UNRELATED"), None);
    }

    #[test]
    fn debug_output_redacts_token() {
        let profile = CliProfile {
            table_api_token: Some("sensitive-token".to_string()),
            ..CliProfile::default()
        };
        let debug_output = format!("{profile:?}");
        assert!(!debug_output.contains("sensitive-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
