//! Read-only view of an Argo Rollout and the request payloads that travel with it

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Key under `trafficRouting.plugins` holding this router's configuration
pub const DEFAULT_PLUGIN_KEY: &str = "argoproj-labs/contour";

/// Rollout resource subset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rollout {
    #[serde(default)]
    pub metadata: RolloutMeta,
    #[serde(default)]
    pub spec: RolloutSpec,
}

impl Rollout {
    /// Rollout with a canary strategy pointing at `http_proxy` under `plugin_key`
    pub fn canary(
        namespace: &str,
        name: &str,
        canary_service: &str,
        stable_service: &str,
        plugin_key: &str,
        http_proxy: &str,
    ) -> Self {
        let mut plugins = HashMap::new();
        plugins.insert(
            plugin_key.to_string(),
            serde_json::json!({ "httpProxy": http_proxy }),
        );

        Self {
            metadata: RolloutMeta {
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            spec: RolloutSpec {
                strategy: RolloutStrategy {
                    canary: Some(CanaryStrategy {
                        canary_service: canary_service.to_string(),
                        stable_service: stable_service.to_string(),
                        traffic_routing: Some(TrafficRouting { plugins }),
                    }),
                },
            },
        }
    }
}

/// Rollout metadata subset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutSpec {
    #[serde(default)]
    pub strategy: RolloutStrategy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RolloutStrategy {
    /// Absent for blue-green rollouts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary: Option<CanaryStrategy>,
}

/// Canary strategy subset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanaryStrategy {
    #[serde(default)]
    pub canary_service: String,
    #[serde(default)]
    pub stable_service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_routing: Option<TrafficRouting>,
}

/// Traffic routing block; only plugin configuration is consumed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrafficRouting {
    #[serde(default)]
    pub plugins: HashMap<String, Value>,
}

/// Configuration stored under the router's plugin key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContourTrafficRouting {
    /// Name of the HTTPProxy that routes traffic to the rollout's services
    #[serde(default)]
    pub http_proxy: String,
}

/// Extra weighted destination (experiments). Accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightDestination {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub pod_template_hash: String,
    #[serde(default)]
    pub weight: i32,
}

/// Header-based route request. Accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetHeaderRoute {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "match")]
    pub matches: Vec<Value>,
}

/// Mirror route request. Accepted and ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetMirrorRoute {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "match")]
    pub matches: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<i32>,
}
