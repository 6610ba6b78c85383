//! # Contour Traffic Router
//!
//! Canary traffic shifting for [Contour](https://projectcontour.io) `HTTPProxy`
//! resources, driven by a rollout controller.
//!
//! ## Architecture
//!
//! ```text
//! Transport (server) → TrafficRouterPlugin → ContourPlugin
//!                                               │
//!                      RouteStore::get ◀────────┤
//!                      codec::decode            │
//!                      routing::resolve_backend_list
//!                      routing::rebalance       │
//!                      codec::encode            │
//!                      RouteStore::replace ◀────┘
//! ```
//!
//! Given a desired canary weight `w`, the first route in the HTTPProxy that
//! declares a service list gets `canary = w` and `stable = 100 - w`. All other
//! services and fields are left as they were.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use contour_traffic_router::plugin::{ContourPlugin, TrafficRouterPlugin};
//! use contour_traffic_router::store::MemoryRouteStore;
//!
//! #[tokio::main]
//! async fn main() {
//!     let plugin = ContourPlugin::new(MemoryRouteStore::new());
//!     let result = plugin.set_weight(Some(&rollout), 25, &[]).await;
//!     assert!(result.is_ok(), "{}", result);
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod plugin;
pub mod routing;
pub mod server;
pub mod store;

// Re-export main types
pub use error::{Result, RouterError};
pub use plugin::{ContourPlugin, RpcError, RpcVerified, TrafficRouterPlugin};
pub use store::{MemoryRouteStore, RouteStore};
