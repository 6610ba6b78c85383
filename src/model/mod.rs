//! Typed models for the resources the router reads and writes
//!
//! `http_proxy` mirrors Contour's `projectcontour.io/v1` HTTPProxy closely
//! enough to rewrite service weights; every field the model does not name is
//! carried through verbatim so a full-replace update never loses data.
//! `rollout` holds the read-only slice of an Argo Rollout the router consumes.

mod http_proxy;
pub mod rollout;

pub use http_proxy::{
    HttpProxy, HttpProxySpec, MatchCondition, ObjectMeta, Route, Service, HTTP_PROXY_API_VERSION,
    HTTP_PROXY_KIND,
};
pub use rollout::{
    CanaryStrategy, ContourTrafficRouting, Rollout, RolloutMeta, RolloutSpec, RolloutStrategy,
    SetHeaderRoute, SetMirrorRoute, TrafficRouting, WeightDestination,
};
