//! Remote sync and session settings.
//!
//! Values come from a lookup closure so callers can layer sources (process
//! environment, `.env`, profile files) before parsing.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::gateway::{GatewayAuth, HttpTableGateway};
use crate::sync::{TableNames, UpdatePolicy, DEFAULT_DEBOUNCE};
use crate::util::{is_http_url, normalize_text_option};

pub const ENV_TABLE_API_URL: &str = "BINOME_TABLE_API_URL";
pub const ENV_TABLE_API_TOKEN: &str = "BINOME_TABLE_API_TOKEN";
pub const ENV_TABLE_PROXIED: &str = "BINOME_TABLE_PROXIED";
pub const ENV_DISTRIBUTIONS_TABLE: &str = "BINOME_DISTRIBUTIONS_TABLE";
pub const ENV_ZONES_TABLE: &str = "BINOME_ZONES_TABLE";
pub const ENV_SYNC_DEBOUNCE_MS: &str = "BINOME_SYNC_DEBOUNCE_MS";
pub const ENV_SESSION_TTL_SECS: &str = "BINOME_SESSION_TTL_SECS";

/// Every variable [`SyncSettings::from_lookup`] reads.
pub const ENV_KEYS: [&str; 7] = [
    ENV_TABLE_API_URL,
    ENV_TABLE_API_TOKEN,
    ENV_TABLE_PROXIED,
    ENV_DISTRIBUTIONS_TABLE,
    ENV_ZONES_TABLE,
    ENV_SYNC_DEBOUNCE_MS,
    ENV_SESSION_TTL_SECS,
];

/// Sliding session lifetime when none is configured.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(8 * 60 * 60);

const MAX_DEBOUNCE_MS: u64 = 600_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Base URL of the remote table API; `None` keeps the device offline
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    /// Requests go through a trusted proxy that injects the credential
    pub proxied: bool,
    pub tables: TableNames,
    pub debounce: Duration,
    pub session_ttl: Duration,
    pub update_policy: UpdatePolicy,
}

impl fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("api_url", &self.api_url)
            .field(
                "api_token",
                &self.api_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("proxied", &self.proxied)
            .field("tables", &self.tables)
            .field("debounce", &self.debounce)
            .field("session_ttl", &self.session_ttl)
            .field("update_policy", &self.update_policy)
            .finish()
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            proxied: false,
            tables: TableNames::default(),
            debounce: DEFAULT_DEBOUNCE,
            session_ttl: DEFAULT_SESSION_TTL,
            update_policy: UpdatePolicy::default(),
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = optional_trimmed(&lookup, ENV_TABLE_API_URL)
            .map(|value| value.trim_end_matches('/').to_string());
        if let Some(url) = api_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(format!(
                    "{ENV_TABLE_API_URL} must start with http:// or https://"
                )));
            }
        }

        let api_token = optional_trimmed(&lookup, ENV_TABLE_API_TOKEN);
        let proxied = match optional_trimmed(&lookup, ENV_TABLE_PROXIED) {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("{ENV_TABLE_PROXIED} must be true or false"))
            })?,
            None => false,
        };
        if api_url.is_some() && !proxied && api_token.is_none() {
            return Err(ConfigError::MissingVar(ENV_TABLE_API_TOKEN));
        }

        let defaults = TableNames::default();
        let tables = TableNames {
            distributions: value_or_default(
                &lookup,
                ENV_DISTRIBUTIONS_TABLE,
                &defaults.distributions,
            ),
            zones: value_or_default(&lookup, ENV_ZONES_TABLE, &defaults.zones),
        };

        let debounce_ms = value_or_default(
            &lookup,
            ENV_SYNC_DEBOUNCE_MS,
            &DEFAULT_DEBOUNCE.as_millis().to_string(),
        )
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "{ENV_SYNC_DEBOUNCE_MS} must be an integer in [0, {MAX_DEBOUNCE_MS}]"
            ))
        })?;
        if debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Invalid(format!(
                "{ENV_SYNC_DEBOUNCE_MS} must be in [0, {MAX_DEBOUNCE_MS}]"
            )));
        }

        let ttl_secs = value_or_default(
            &lookup,
            ENV_SESSION_TTL_SECS,
            &DEFAULT_SESSION_TTL.as_secs().to_string(),
        )
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "{ENV_SESSION_TTL_SECS} must be an integer in [60, 604800]"
            ))
        })?;
        if !(60..=604_800).contains(&ttl_secs) {
            return Err(ConfigError::Invalid(format!(
                "{ENV_SESSION_TTL_SECS} must be in [60, 604800]"
            )));
        }

        Ok(Self {
            api_url,
            api_token,
            proxied,
            tables,
            debounce: Duration::from_millis(debounce_ms),
            session_ttl: Duration::from_secs(ttl_secs),
            update_policy: UpdatePolicy::default(),
        })
    }

    /// Whether a remote table API is configured.
    pub const fn is_remote_configured(&self) -> bool {
        self.api_url.is_some()
    }

    /// Credential mode for the configured remote, if any.
    pub fn gateway_auth(&self) -> Option<GatewayAuth> {
        self.api_url.as_ref()?;
        if self.proxied {
            return Some(GatewayAuth::Proxied);
        }
        self.api_token.clone().map(GatewayAuth::Bearer)
    }

    /// HTTP gateway for the configured remote, `Ok(None)` when offline.
    pub fn build_gateway(&self) -> crate::Result<Option<HttpTableGateway>> {
        let (Some(url), Some(auth)) = (self.api_url.as_deref(), self.gateway_auth()) else {
            return Ok(None);
        };
        Ok(Some(HttpTableGateway::new(url, auth)?))
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(pairs: &[(&str, &str)]) -> Result<SyncSettings, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        SyncSettings::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn empty_environment_gives_offline_defaults() {
        let settings = settings(&[]).unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert!(!settings.is_remote_configured());
        assert_eq!(settings.gateway_auth(), None);
        assert!(settings.build_gateway().unwrap().is_none());
        assert_eq!(settings.debounce, Duration::from_secs(2));
        assert_eq!(settings.session_ttl, Duration::from_secs(8 * 3600));
    }

    #[test]
    fn remote_url_requires_token_unless_proxied() {
        let err = settings(&[(ENV_TABLE_API_URL, "https://tables.example.com/v0/app")])
            .unwrap_err();
        assert!(err.to_string().contains(ENV_TABLE_API_TOKEN));

        let proxied = settings(&[
            (ENV_TABLE_API_URL, "https://proxy.example.com/"),
            (ENV_TABLE_PROXIED, "yes"),
        ])
        .unwrap();
        assert_eq!(proxied.api_url.as_deref(), Some("https://proxy.example.com"));
        assert_eq!(proxied.gateway_auth(), Some(GatewayAuth::Proxied));
        assert!(proxied.build_gateway().unwrap().is_some());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(settings(&[(ENV_TABLE_API_URL, "ftp://tables")]).is_err());
        assert!(settings(&[(ENV_TABLE_PROXIED, "maybe")]).is_err());
        assert!(settings(&[(ENV_SYNC_DEBOUNCE_MS, "soon")]).is_err());
        assert!(settings(&[(ENV_SYNC_DEBOUNCE_MS, "600001")]).is_err());
        assert!(settings(&[(ENV_SESSION_TTL_SECS, "5")]).is_err());
    }

    #[test]
    fn overrides_are_applied() {
        let settings = settings(&[
            (ENV_DISTRIBUTIONS_TABLE, " Visits "),
            (ENV_ZONES_TABLE, "Areas"),
            (ENV_SYNC_DEBOUNCE_MS, "250"),
            (ENV_SESSION_TTL_SECS, "3600"),
        ])
        .unwrap();
        assert_eq!(settings.tables.distributions, "Visits");
        assert_eq!(settings.tables.zones, "Areas");
        assert_eq!(settings.debounce, Duration::from_millis(250));
        assert_eq!(settings.session_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn debug_output_redacts_token() {
        let settings = settings(&[
            (ENV_TABLE_API_URL, "https://tables.example.com"),
            (ENV_TABLE_API_TOKEN, "sensitive-table-token"),
        ])
        .unwrap();
        let debug_output = format!("{settings:?}");
        assert!(!debug_output.contains("sensitive-table-token"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(matches!(
            settings.gateway_auth(),
            Some(GatewayAuth::Bearer(token)) if token == "sensitive-table-token"
        ));
    }
}
