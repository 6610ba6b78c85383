//! Canary/stable weight rebalancing

use super::TOTAL_WEIGHT;
use crate::error::{Result, RouterError};
use crate::model::Service;

/// Weights of the canary/stable pair before and after a rebalance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightChange {
    pub canary_before: i64,
    pub stable_before: i64,
    pub canary_after: i64,
    pub stable_after: i64,
}

impl WeightChange {
    /// Whether the rebalance left both weights as they were
    pub fn is_noop(&self) -> bool {
        self.canary_before == self.canary_after && self.stable_before == self.stable_after
    }
}

/// Find a service by exact, case-sensitive name. First match wins.
pub fn find_service<'a>(name: &str, services: &'a [Service]) -> Result<&'a Service> {
    services
        .iter()
        .find(|svc| svc.name == name)
        .ok_or_else(|| RouterError::NotFound(name.to_string()))
}

fn position(name: &str, services: &[Service]) -> Result<usize> {
    services
        .iter()
        .position(|svc| svc.name == name)
        .ok_or_else(|| RouterError::NotFound(name.to_string()))
}

/// Give `canary` the desired weight and `stable` the complement.
///
/// A missing canary is reported before the stable lookup result is
/// considered. `desired_weight` is used as-is: values outside `0..=100` are
/// written unclamped and leave the stable service with
/// `100 - desired_weight`. Every other service keeps its weight.
pub fn rebalance(
    services: &mut [Service],
    canary: &str,
    stable: &str,
    desired_weight: i32,
) -> Result<WeightChange> {
    let canary_idx = position(canary, services)?;
    let stable_idx = position(stable, services)?;

    let canary_before = services[canary_idx].weight;
    let stable_before = services[stable_idx].weight;

    let canary_weight = i64::from(desired_weight);
    services[canary_idx].weight = canary_weight;
    // Same name for both sides: the stable assignment is the one that sticks
    services[stable_idx].weight = TOTAL_WEIGHT - canary_weight;

    Ok(WeightChange {
        canary_before,
        stable_before,
        canary_after: services[canary_idx].weight,
        stable_after: services[stable_idx].weight,
    })
}
