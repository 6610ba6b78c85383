//! Configuration for the Contour traffic router
//!
//! Uses HCL (HashiCorp Configuration Language) as the configuration format.
//! Every field has a default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::error::{Result, RouterError};
use crate::model::rollout::DEFAULT_PLUGIN_KEY;

/// Accepted `log_level` values
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level router configuration
///
/// # HCL Example
///
/// ```hcl
/// listen          = "127.0.0.1:3030"
/// log_level       = "debug"
/// plugin_key      = "argoproj-labs/contour"
/// capture_updates = false
///
/// kubernetes {
///   kubeconfig = "/etc/rollouts/kubeconfig"
///   context    = "prod"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginConfig {
    /// Address the HTTP adapter listens on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Key under `trafficRouting.plugins` holding the HTTPProxy reference
    #[serde(default = "default_plugin_key")]
    pub plugin_key: String,

    /// Keep the last persisted HTTPProxy for inspection
    #[serde(default)]
    pub capture_updates: bool,

    /// Kubernetes client settings (default: infer from environment)
    #[serde(default)]
    pub kubernetes: Option<KubernetesConfig>,
}

fn default_listen() -> String {
    "127.0.0.1:3030".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_plugin_key() -> String {
    DEFAULT_PLUGIN_KEY.to_string()
}

/// Kubernetes client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KubernetesConfig {
    /// Path to a kubeconfig file (default: `KUBECONFIG` / `~/.kube/config` / in-cluster)
    #[serde(default)]
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use (default: current context)
    #[serde(default)]
    pub context: Option<String>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_level: default_log_level(),
            plugin_key: default_plugin_key(),
            capture_updates: false,
            kubernetes: None,
        }
    }
}

impl PluginConfig {
    /// Load configuration from an HCL file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            RouterError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_hcl(&content)
    }

    /// Parse configuration from an HCL string
    pub fn from_hcl(content: &str) -> Result<Self> {
        hcl::from_str(content)
            .map_err(|e| RouterError::Config(format!("Failed to parse HCL config: {}", e)))
    }

    /// Listen address as a socket address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|e| {
            RouterError::Config(format!("Invalid listen address '{}': {}", self.listen, e))
        })
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(RouterError::Config(format!(
                "Unknown log level '{}' (expected one of: {})",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        if self.plugin_key.trim().is_empty() {
            return Err(RouterError::Config("plugin_key must not be empty".to_string()));
        }

        if let Some(k8s) = &self.kubernetes {
            if matches!(k8s.kubeconfig.as_deref(), Some("")) {
                return Err(RouterError::Config(
                    "kubernetes.kubeconfig must not be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}
