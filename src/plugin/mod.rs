//! Traffic router plugin interface
//!
//! The rollout controller drives traffic shifting through a fixed set of
//! operations. [`TrafficRouterPlugin`] names them; transports such as
//! [`crate::server`] adapt them to a wire protocol. Results never carry a Rust
//! error across this boundary: failures are flattened into [`RpcError`].

mod contour;

pub use contour::{ContourPlugin, TrafficTarget, PLUGIN_TYPE};

use crate::error::RouterError;
use crate::model::{Rollout, SetHeaderRoute, SetMirrorRoute, WeightDestination};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error result returned to the host. An empty message means success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcError {
    #[serde(default)]
    pub error_string: String,
}

impl RpcError {
    /// Successful result
    pub fn ok() -> Self {
        Self::default()
    }

    /// Failed result with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_string: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error_string.is_empty()
    }
}

impl From<RouterError> for RpcError {
    fn from(err: RouterError) -> Self {
        Self::new(err.to_string())
    }
}

impl From<crate::error::Result<()>> for RpcError {
    fn from(result: crate::error::Result<()>) -> Self {
        match result {
            Ok(()) => Self::ok(),
            Err(e) => e.into(),
        }
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_ok() {
            write!(f, "ok")
        } else {
            write!(f, "{}", self.error_string)
        }
    }
}

/// Outcome of a weight verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum RpcVerified {
    /// The plugin cannot verify weights
    #[default]
    NotImplemented,
    /// The store reflects the desired weight
    Verified,
    /// The store does not (yet) reflect the desired weight
    NotVerified,
}

impl std::fmt::Display for RpcVerified {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotImplemented => write!(f, "not_implemented"),
            Self::Verified => write!(f, "verified"),
            Self::NotVerified => write!(f, "not_verified"),
        }
    }
}

/// Operations a traffic router exposes to the rollout controller.
///
/// `rollout` is optional on every call because the host may omit it; an
/// implementation decides which operations need it.
#[async_trait]
pub trait TrafficRouterPlugin: Send + Sync {
    /// Prepare the plugin (connect to the store, ...)
    async fn init(&self) -> RpcError;

    /// Inform the router of new canary/stable pod template hashes
    async fn update_hash(
        &self,
        rollout: Option<&Rollout>,
        canary_hash: &str,
        stable_hash: &str,
        additional_destinations: &[WeightDestination],
    ) -> RpcError;

    /// Route `desired_weight` percent of traffic to the canary
    async fn set_weight(
        &self,
        rollout: Option<&Rollout>,
        desired_weight: i32,
        additional_destinations: &[WeightDestination],
    ) -> RpcError;

    /// Add a header-based route to the canary
    async fn set_header_route(
        &self,
        rollout: Option<&Rollout>,
        header_routing: Option<&SetHeaderRoute>,
    ) -> RpcError;

    /// Add a mirror route to the canary
    async fn set_mirror_route(
        &self,
        rollout: Option<&Rollout>,
        mirror_route: Option<&SetMirrorRoute>,
    ) -> RpcError;

    /// Check whether the store reflects `desired_weight`
    async fn verify_weight(
        &self,
        rollout: Option<&Rollout>,
        desired_weight: i32,
        additional_destinations: &[WeightDestination],
    ) -> (RpcVerified, RpcError);

    /// Remove any routes the plugin added (header/mirror)
    async fn remove_managed_routes(&self, rollout: Option<&Rollout>) -> RpcError;

    /// Name of the traffic router implementation
    fn type_name(&self) -> &'static str;
}
