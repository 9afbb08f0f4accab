//! TOML configuration for the whole bootstrap.
//!
//! Every section and field is optional; anything left out takes its default.
//!
//! ```toml
//! [instance]
//! application_name = "samp-app"
//! api_version = "1.3"
//! enable_validation = true
//!
//! [debug_messenger]
//! max_log_level = "warning"
//!
//! [selection]
//! discrete_bonus = 1000
//! required_extensions = ["VK_KHR_swapchain"]
//! ```

use std::{fs, path::Path, path::PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::debug::DebugMessengerConfig;
use crate::device::LogicalDeviceConfig;
use crate::instance::InstanceConfig;
use crate::select::SelectionCriteria;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub instance: InstanceConfig,
    /// Messenger settings, used when validation is enabled.
    pub debug_messenger: Option<DebugMessengerConfig>,
    pub selection: SelectionCriteria,
    pub device: LogicalDeviceConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            instance: InstanceConfig::default(),
            debug_messenger: Some(DebugMessengerConfig::default()),
            selection: SelectionCriteria::default(),
            device: LogicalDeviceConfig::default(),
        }
    }
}

impl BootstrapConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        tracing::debug!("Loaded bootstrap config from {}", path.display());
        Self::from_toml_str(&source)
    }
}
