//! Weight rewriting over an in-memory HTTPProxy
//!
//! ```text
//! routes ──resolve_backend_list──▶ services ──rebalance──▶ canary = w, stable = 100 - w
//! ```
//!
//! Neither step knows where the document came from or where it goes next.

mod rebalancer;
mod resolver;

pub use rebalancer::{find_service, rebalance, WeightChange};
pub use resolver::{resolve_backend_list, resolve_backend_list_ref};

/// Total weight shared between the canary and stable services
pub const TOTAL_WEIGHT: i64 = 100;
