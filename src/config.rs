//! Configuration management for the inference gateway

use crate::artifacts::ArtifactSpec;
use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Environment variable that overrides the configuration file location
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

pub const DEFAULT_CLASSIFIER_PATH: &str = "models/model_clas.onnx";
pub const DEFAULT_REGRESSOR_PATH: &str = "models/model_reg.onnx";

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub artifacts: ArtifactsConfig,
    pub models: ModelsConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Number of actix worker threads
    pub workers: usize,
    /// Largest request body accepted by the prediction endpoints
    pub max_payload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            workers: 4,
            max_payload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Remote artifact configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Download endpoint of the file host
    pub base_url: String,
    /// Cookie name prefix carrying the confirmation token for large files
    pub confirm_cookie_prefix: String,
    /// Write buffer size used while streaming an artifact to disk
    pub chunk_size: usize,
    pub classifier: ArtifactSpec,
    pub regressor: ArtifactSpec,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://drive.google.com/uc".to_string(),
            confirm_cookie_prefix: "download_warning".to_string(),
            chunk_size: 32 * 1024,
            classifier: ArtifactSpec::new("", DEFAULT_CLASSIFIER_PATH),
            regressor: ArtifactSpec::new("", DEFAULT_REGRESSOR_PATH),
        }
    }
}

/// ONNX Runtime configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Number of intra-op threads per model session
    pub onnx_threads: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self { onnx_threads: 1 }
    }
}

/// Metrics reporting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between logged summaries (0 disables the reporter)
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error), RUST_LOG takes precedence
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load configuration from `GATEWAY_CONFIG` or the default path, with
    /// `GATEWAY__SECTION__KEY` environment overrides. A missing file is not
    /// an error.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let config = builder()?
            .add_source(File::from(path.as_path()).required(false))
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .with_context(|| format!("Failed to deserialize configuration from {}", path.display()))
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = builder()?
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Reject settings the gateway cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            bail!("server.port must be non-zero");
        }
        if self.server.workers == 0 {
            bail!("server.workers must be at least 1");
        }
        if self.artifacts.chunk_size == 0 {
            bail!("artifacts.chunk_size must be non-zero");
        }
        for (name, spec) in [
            ("classifier", &self.artifacts.classifier),
            ("regressor", &self.artifacts.regressor),
        ] {
            if spec.remote_id.trim().is_empty() {
                bail!("artifacts.{name}.remote_id is not set");
            }
            if spec.local_path.as_os_str().is_empty() {
                bail!("artifacts.{name}.local_path is not set");
            }
        }
        Ok(())
    }
}

/// Builder seeded with the artifact destinations, so a table or env
/// override that only names `remote_id` still gets a `local_path`.
fn builder() -> Result<ConfigBuilder<DefaultState>> {
    Config::builder()
        .set_default("artifacts.classifier.local_path", DEFAULT_CLASSIFIER_PATH)
        .and_then(|b| b.set_default("artifacts.regressor.local_path", DEFAULT_REGRESSOR_PATH))
        .context("Failed to seed configuration defaults")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:5000");
        assert_eq!(config.artifacts.confirm_cookie_prefix, "download_warning");
        assert_eq!(config.artifacts.chunk_size, 32768);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert_eq!(
            config.artifacts.classifier.local_path,
            PathBuf::from("models/model_clas.onnx")
        );
    }

    #[test]
    fn test_default_config_needs_remote_ids() {
        let err = AppConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("artifacts.classifier.remote_id"));
    }

    #[test]
    fn test_load_from_path_fills_missing_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 8080

[artifacts.classifier]
remote_id = "clas-id"
local_path = "/tmp/clas.onnx"

[artifacts.regressor]
remote_id = "reg-id"
local_path = "/tmp/reg.onnx"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.artifacts.classifier.remote_id, "clas-id");
        assert_eq!(config.artifacts.base_url, "https://drive.google.com/uc");
        assert_eq!(config.models.onnx_threads, 1);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.artifacts.classifier.remote_id = "a".into();
        config.artifacts.regressor.remote_id = "b".into();
        config.server.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_artifact_tables_with_only_remote_ids() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[artifacts.classifier]
remote_id = "clas-id"

[artifacts.regressor]
remote_id = "reg-id"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.artifacts.classifier.remote_id, "clas-id");
        assert_eq!(
            config.artifacts.classifier.local_path,
            PathBuf::from(DEFAULT_CLASSIFIER_PATH)
        );
        assert_eq!(
            config.artifacts.regressor.local_path,
            PathBuf::from(DEFAULT_REGRESSOR_PATH)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remote_ids_from_environment_only() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(CONFIG_PATH_ENV, dir.path().join("absent.toml"));
        std::env::set_var("GATEWAY__ARTIFACTS__CLASSIFIER__REMOTE_ID", "env-clas");
        std::env::set_var("GATEWAY__ARTIFACTS__REGRESSOR__REMOTE_ID", "env-reg");

        let loaded = AppConfig::load();

        std::env::remove_var(CONFIG_PATH_ENV);
        std::env::remove_var("GATEWAY__ARTIFACTS__CLASSIFIER__REMOTE_ID");
        std::env::remove_var("GATEWAY__ARTIFACTS__REGRESSOR__REMOTE_ID");

        let config = loaded.unwrap();
        assert_eq!(config.artifacts.classifier.remote_id, "env-clas");
        assert_eq!(config.artifacts.regressor.remote_id, "env-reg");
        assert_eq!(
            config.artifacts.regressor.local_path,
            PathBuf::from(DEFAULT_REGRESSOR_PATH)
        );
        assert_eq!(config.server.port, 5000);
    }
}
