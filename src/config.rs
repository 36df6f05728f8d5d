//! Host configuration
//!
//! A single TOML file, optional in every part; absent file means defaults.
//! The generation API key never lives in the file, only the name of the
//! environment variable holding it.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtelierConfig {
    /// Window session settings
    pub session: SessionConfig,
    /// Generation client settings
    pub generation: GenerationConfig,
}

/// Window session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Broadcast domain the windows join
    pub domain: String,
    /// Windows opened by `run` when the flag is absent
    pub windows: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            domain: "atelier".to_string(),
            windows: 2,
        }
    }
}

/// Generation client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Completion endpoint base URL
    pub base_url: String,
    /// Default model
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Force the offline template provider
    pub offline: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "ATELIER_API_KEY".to_string(),
            timeout_secs: 60,
            offline: false,
        }
    }
}

impl AtelierConfig {
    /// Load from `path`, or from the platform config dir, or defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) if p.exists() => p,
                _ => return Ok(Self::default()),
            },
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Platform default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("atelier").join("config.toml"))
    }

    /// API key from the configured environment variable, if set.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.generation.api_key_env)
            .ok()
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_no_file() {
        let config = AtelierConfig::load(None).unwrap_or_default();
        assert_eq!(config.session.domain, "atelier");
        assert!(config.session.windows >= 1);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AtelierConfig = toml::from_str(
            r#"
            [session]
            windows = 4

            [generation]
            offline = true
            "#,
        )
        .unwrap();
        assert_eq!(config.session.windows, 4);
        assert_eq!(config.session.domain, "atelier");
        assert!(config.generation.offline);
        assert_eq!(config.generation.timeout_secs, 60);
    }
}
