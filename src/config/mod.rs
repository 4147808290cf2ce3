use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

use crate::cache::DEFAULT_TTL_SECONDS;

/// Environment variable consulted when no API key is configured
pub const API_KEY_ENV: &str = "TRANSCRIPT_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Cache settings
    pub cache: CacheConfig,

    /// Extraction source settings
    pub sources: SourcesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds
    pub ttl_seconds: u64,

    /// Cache file location (platform cache directory if unset)
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    pub remote_proxy: RemoteProxyConfig,
    pub cloud_api: CloudApiConfig,
    pub local_process: LocalProcessConfig,
}

/// Knobs shared by every source; one instance per source, read-only after
/// construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Lower priority is tried first
    pub priority: u32,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,

    /// Retry attempts per resolution (>= 1)
    pub retry_attempts: u32,

    /// Base delay for exponential backoff in milliseconds
    pub backoff_base_ms: u64,

    /// Disabled sources are skipped without counting as failures
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteProxyConfig {
    /// Base URL of the remote extraction proxy
    pub base_url: String,

    /// Optional egress proxy for a distinct network identity
    pub proxy_url: Option<String>,

    #[serde(flatten)]
    pub settings: SourceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudApiConfig {
    /// Base URL of the hosted extraction API
    pub base_url: String,

    /// API credential; falls back to TRANSCRIPT_API_KEY in the environment
    pub api_key: Option<String>,

    #[serde(flatten)]
    pub settings: SourceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProcessConfig {
    /// Python interpreter used to run the extraction helper script
    pub python_cmd: String,

    #[serde(flatten)]
    pub settings: SourceSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CacheConfig {
                ttl_seconds: DEFAULT_TTL_SECONDS,
                path: None,
            },
            sources: SourcesConfig {
                remote_proxy: RemoteProxyConfig {
                    base_url: "http://localhost:8080".to_string(),
                    proxy_url: None,
                    settings: SourceSettings {
                        priority: 1,
                        timeout_ms: 15_000,
                        retry_attempts: 3,
                        backoff_base_ms: 500,
                        enabled: true,
                    },
                },
                cloud_api: CloudApiConfig {
                    base_url: "https://transcripts.example.com".to_string(),
                    api_key: None,
                    settings: SourceSettings {
                        priority: 2,
                        timeout_ms: 15_000,
                        retry_attempts: 2,
                        backoff_base_ms: 1_000,
                        enabled: true,
                    },
                },
                local_process: LocalProcessConfig {
                    python_cmd: "python3".to_string(),
                    settings: SourceSettings {
                        priority: 3,
                        timeout_ms: 30_000,
                        retry_attempts: 2,
                        backoff_base_ms: 500,
                        enabled: true,
                    },
                },
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content =
                fs_err::read_to_string(&config_path).context("Failed to read config file")?;

            let config: Config =
                serde_yaml::from_str(&content).context("Failed to parse config file")?;

            config.validate()?;
            config
        } else {
            let config = Self::default();
            config.save().await?;
            config
        };

        // The credential may live in the environment rather than on disk
        if config.sources.cloud_api.api_key.is_none() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                if !key.trim().is_empty() {
                    config.sources.cloud_api.api_key = Some(key);
                }
            }
        }

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("transcript-resolver").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        Self::validate_base_url("remote_proxy.base_url", &self.sources.remote_proxy.base_url)?;
        Self::validate_base_url("cloud_api.base_url", &self.sources.cloud_api.base_url)?;

        if let Some(proxy) = &self.sources.remote_proxy.proxy_url {
            Url::parse(proxy)
                .map_err(|_| anyhow::anyhow!("Invalid remote_proxy.proxy_url: {}", proxy))?;
        }

        if self.cache.ttl_seconds == 0 {
            anyhow::bail!("cache.ttl_seconds must be greater than zero");
        }

        if self.sources.local_process.python_cmd.trim().is_empty() {
            anyhow::bail!("local_process.python_cmd must not be empty");
        }

        Ok(())
    }

    fn validate_base_url(field: &str, value: &str) -> Result<()> {
        let parsed =
            Url::parse(value).map_err(|_| anyhow::anyhow!("Invalid {}: {}", field, value))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("{} must use HTTP or HTTPS protocol", field);
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Cache TTL: {}s", self.cache.ttl_seconds);
        println!("  Remote Proxy: {}", self.sources.remote_proxy.base_url);
        println!(
            "    priority={} enabled={}",
            self.sources.remote_proxy.settings.priority,
            self.sources.remote_proxy.settings.enabled
        );
        println!("  Cloud API: {}", self.sources.cloud_api.base_url);
        println!(
            "    priority={} enabled={} credential={}",
            self.sources.cloud_api.settings.priority,
            self.sources.cloud_api.settings.enabled,
            if self.sources.cloud_api.api_key.is_some() {
                "configured"
            } else {
                "absent"
            }
        );
        println!(
            "  Local Process: {}",
            self.sources.local_process.python_cmd
        );
        println!(
            "    priority={} enabled={}",
            self.sources.local_process.settings.priority,
            self.sources.local_process.settings.enabled
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let mut config = Config::default();
        config.sources.remote_proxy.base_url = "ftp://proxy".to_string();
        assert!(config.validate().is_err());

        config.sources.remote_proxy.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_ttl() {
        let mut config = Config::default();
        config.cache.ttl_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            parsed.sources.remote_proxy.settings.priority,
            config.sources.remote_proxy.settings.priority
        );
        assert_eq!(parsed.cache.ttl_seconds, config.cache.ttl_seconds);
    }
}
