//! Configuration management for the topic schema registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schemas.toml)
//! - Environment variables (TOPIC_SCHEMAS__*)
//!
//! ## Example config file (schemas.toml):
//! ```toml
//! [registry]
//! data_dir = "./schema-registry"
//! durable = true
//!
//! [compatibility]
//! default_strategy = "FULL"
//! idempotency = "short_circuit"
//!
//! [compatibility.namespaces]
//! "public/schema-testing" = "BACKWARD"
//!
//! [logging]
//! filter = "info,topic_schemas=debug"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::compatibility::CompatibilityStrategy;
use crate::error::Result;
use crate::registry::{IdempotencyPolicy, RegistryOptions};
use crate::topic::parse_namespace;

/// Main configuration for the schema registry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Registry storage settings
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Compatibility policy settings
    #[serde(default)]
    pub compatibility: CompatibilityConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Registry storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Directory holding the per-topic schema logs
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Persist accepted versions (false keeps everything in memory)
    #[serde(default = "default_true")]
    pub durable: bool,
}

/// Compatibility configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompatibilityConfig {
    /// Strategy for topics without override or namespace policy
    #[serde(default)]
    pub default_strategy: CompatibilityStrategy,

    /// Treatment of resends identical to the latest version
    #[serde(default)]
    pub idempotency: IdempotencyPolicy,

    /// Namespace policies keyed by `tenant/namespace`
    #[serde(default)]
    pub namespaces: HashMap<String, CompatibilityStrategy>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when RUST_LOG is unset
    #[serde(default = "default_filter")]
    pub filter: String,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from("./schema-registry")
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            durable: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl SchemaConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["schemas.toml", ".schemas.toml", "config/schemas.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        let project_dirs = directories::ProjectDirs::from("dev", "familiar", "topic-schemas");
        if let Some(config_dir) = project_dirs {
            let xdg_config = config_dir.config_dir().join("schemas.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (TOPIC_SCHEMAS__*)
        builder = builder.add_source(
            Environment::with_prefix("TOPIC_SCHEMAS")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the data directory (resolves relative paths)
    pub fn data_dir(&self) -> PathBuf {
        if self.registry.data_dir.is_absolute() {
            self.registry.data_dir.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.registry.data_dir)
        }
    }

    /// Registry options derived from the compatibility section
    pub fn registry_options(&self) -> Result<RegistryOptions> {
        let namespace_strategies = self
            .compatibility
            .namespaces
            .iter()
            .map(|(ns, strategy)| Ok((parse_namespace(ns)?, *strategy)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(RegistryOptions {
            default_strategy: self.compatibility.default_strategy,
            idempotency: self.compatibility.idempotency,
            namespace_strategies,
        })
    }
}
