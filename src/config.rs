//! ESI subsystem configuration.
//!
//! Deserializes from the host's settings tree:
//!
//! ```toml
//! [esi]
//! enabled = true
//! secret = "…"            # site-wide signing secret, required when enabled
//! base_path = "/"
//! wrapper_prefix = "tessera"
//! nonce_ttl_secs = 43200
//! nonce_actions = ["comment_*", "subscribe_nonce private"]
//! remote_nonce_url = "https://example.org/esi-nonce.txt"
//! ```

use serde::Deserialize;
use thiserror::Error;

use crate::encode::FragmentEncoder;
use crate::nonce::NonceActionList;
use crate::tag::IntegritySigner;

const DEFAULT_BASE_PATH: &str = "/";
const DEFAULT_WRAPPER_PREFIX: &str = "tessera";
const DEFAULT_NONCE_TTL_SECS: u64 = 43_200;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Without a secret every marker would be forgeable.
    #[error("esi is enabled but no signing secret is configured")]
    MissingSecret,
}

/// Configuration for the fragment subsystem.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EsiConfig {
    /// Master switch; a disabled subsystem encodes nothing.
    pub enabled: bool,
    /// Site-wide signing secret for marker integrity tags.
    pub secret: String,
    /// Path the fragment endpoint is mounted at; marker URLs point here.
    pub base_path: String,
    /// Prefix for the debug wrapping comments around markers.
    pub wrapper_prefix: String,
    /// TTL for nonce fragments, in seconds.
    pub nonce_ttl_secs: u64,
    /// Seed nonce action patterns, `"<pattern>[ <control>]"` per entry.
    pub nonce_actions: Vec<String>,
    /// Optional URL of a published nonce action list to merge at startup.
    pub remote_nonce_url: Option<String>,
}

impl Default for EsiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret: String::new(),
            base_path: DEFAULT_BASE_PATH.to_string(),
            wrapper_prefix: DEFAULT_WRAPPER_PREFIX.to_string(),
            nonce_ttl_secs: DEFAULT_NONCE_TTL_SECS,
            nonce_actions: Vec::new(),
            remote_nonce_url: None,
        }
    }
}

impl EsiConfig {
    /// Reject configurations that cannot be used safely.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled && self.secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        Ok(())
    }

    /// Build the marker signer from the configured secret.
    pub fn signer(&self) -> IntegritySigner {
        IntegritySigner::new(self.secret.clone())
    }

    /// Build the fragment encoder for this configuration.
    pub fn encoder(&self) -> FragmentEncoder {
        FragmentEncoder::new(
            self.signer(),
            self.base_path.clone(),
            self.wrapper_prefix.clone(),
        )
    }

    /// Build the nonce action list from the configured seed patterns.
    pub fn nonce_list(&self) -> NonceActionList {
        let mut list = NonceActionList::new();
        for line in &self.nonce_actions {
            list.register_line(line);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = EsiConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.base_path, "/");
        assert_eq!(config.wrapper_prefix, "tessera");
        assert_eq!(config.nonce_ttl_secs, 43_200);
        assert!(config.nonce_actions.is_empty());
        assert!(config.remote_nonce_url.is_none());
    }

    #[test]
    fn validate_requires_a_secret_only_when_enabled() {
        let disabled = EsiConfig::default();
        assert!(disabled.validate().is_ok());

        let enabled = EsiConfig {
            enabled: true,
            ..EsiConfig::default()
        };
        assert!(matches!(
            enabled.validate(),
            Err(ConfigError::MissingSecret)
        ));

        let ready = EsiConfig {
            enabled: true,
            secret: "s".into(),
            ..EsiConfig::default()
        };
        assert!(ready.validate().is_ok());
    }

    #[test]
    fn nonce_list_registers_seed_patterns() {
        let config = EsiConfig {
            nonce_actions: vec!["comment_*".into(), "subscribe_nonce private".into()],
            ..EsiConfig::default()
        };
        let list = config.nonce_list();
        assert_eq!(list.len(), 2);
        assert!(list.lookup("comment_form_nonce").is_some());
        assert!(list.lookup("subscribe_nonce").unwrap().has_private());
    }

    #[test]
    fn deserializes_with_partial_keys() {
        let config: EsiConfig =
            serde_json::from_str(r#"{ "enabled": true, "secret": "s" }"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.secret, "s");
        assert_eq!(config.base_path, "/");
    }
}
