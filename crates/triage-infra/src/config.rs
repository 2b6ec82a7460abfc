//! Global configuration loader.
//!
//! Reads `triage.toml` and deserializes it into [`GlobalConfig`]. Falls back
//! to defaults when the file is missing or malformed.

use std::path::Path;

use secrecy::SecretString;

use triage_types::config::{GlobalConfig, ProviderConfig};

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "triage.toml";

/// Load global configuration from `path`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - Otherwise returns the parsed config.
pub async fn load_global_config(path: &Path) -> GlobalConfig {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config found at {}, using defaults", path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", path.display());
            GlobalConfig::default()
        }
    }
}

/// Read the provider API key from the environment variable named in config.
///
/// Empty values count as missing.
pub fn resolve_api_key(provider: &ProviderConfig) -> Option<SecretString> {
    std::env::var(&provider.api_key_env)
        .ok()
        .filter(|key| !key.trim().is_empty())
        .map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(&tmp.path().join(DEFAULT_CONFIG_FILE)).await;
        assert_eq!(config, GlobalConfig::default());
        assert_eq!(config.cascade.max_retries, 1);
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        tokio::fs::write(
            &path,
            r#"
[cascade]
router_model = "gpt-5-nano"
router_confidence_threshold = 0.9
vector_store_ids = ["vs_123"]

[validator]
support_domain = "support.acme.io"
sitemap_url = "https://support.acme.io/sitemap.xml"

[server]
port = 8080
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(&path).await;
        assert_eq!(config.cascade.router_model, "gpt-5-nano");
        assert_eq!(config.cascade.router_confidence_threshold, 0.9);
        assert_eq!(config.cascade.vector_store_ids, vec!["vs_123"]);
        // Untouched fields keep their defaults.
        assert_eq!(config.cascade.heavy_model, "gpt-5");
        assert_eq!(config.validator.support_domain, "support.acme.io");
        assert!(config.validator.help_center_base_url.is_none());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(DEFAULT_CONFIG_FILE);
        tokio::fs::write(&path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(&path).await;
        assert_eq!(config, GlobalConfig::default());
    }

    #[test]
    fn resolve_api_key_reads_named_variable() {
        let provider = ProviderConfig {
            api_key_env: "TRIAGE_TEST_KEY_PRESENT".to_string(),
            ..Default::default()
        };
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("TRIAGE_TEST_KEY_PRESENT", "sk-test") };
        let key = resolve_api_key(&provider).unwrap();
        assert_eq!(key.expose_secret(), "sk-test");
    }

    #[test]
    fn resolve_api_key_missing_or_blank() {
        let provider = ProviderConfig {
            api_key_env: "TRIAGE_TEST_KEY_BLANK".to_string(),
            ..Default::default()
        };
        assert!(resolve_api_key(&provider).is_none());
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("TRIAGE_TEST_KEY_BLANK", "  ") };
        assert!(resolve_api_key(&provider).is_none());
    }
}
