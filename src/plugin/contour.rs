//! Contour HTTPProxy traffic router
//!
//! Each weight change is one read-modify-write against the store:
//!
//! ```text
//! validate → get → decode → resolve → rebalance → encode → replace
//! ```
//!
//! Any failure stops the sequence before `replace`, so the store is never
//! written on an error path. Nothing is retried; the rollout controller calls
//! again on its next reconciliation.

use super::{RpcError, RpcVerified, TrafficRouterPlugin};
use crate::codec;
use crate::error::{Result, RouterError};
use crate::model::{
    ContourTrafficRouting, HttpProxy, Rollout, SetHeaderRoute, SetMirrorRoute, WeightDestination,
    rollout::DEFAULT_PLUGIN_KEY,
};
use crate::routing::{self, TOTAL_WEIGHT};
use crate::store::RouteStore;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Mutex;
use tracing::Instrument;

/// Traffic router type reported to the host
pub const PLUGIN_TYPE: &str = "Contour";

/// Everything needed to locate and rewrite one canary/stable pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficTarget {
    pub namespace: String,
    pub http_proxy: String,
    pub canary_service: String,
    pub stable_service: String,
}

/// Traffic router that rewrites service weights in a Contour HTTPProxy
pub struct ContourPlugin<S> {
    store: S,
    plugin_key: String,
    capture: bool,
    last_applied: Mutex<Option<HttpProxy>>,
}

impl<S: RouteStore> ContourPlugin<S> {
    /// Create a plugin over `store` using the default plugin key
    pub fn new(store: S) -> Self {
        Self {
            store,
            plugin_key: DEFAULT_PLUGIN_KEY.to_string(),
            capture: false,
            last_applied: Mutex::new(None),
        }
    }

    /// Read the HTTPProxy reference from a different `trafficRouting.plugins` key
    pub fn with_plugin_key(mut self, plugin_key: impl Into<String>) -> Self {
        self.plugin_key = plugin_key.into();
        self
    }

    /// Keep the last persisted HTTPProxy, see [`ContourPlugin::last_applied`]
    pub fn with_capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn plugin_key(&self) -> &str {
        &self.plugin_key
    }

    /// HTTPProxy as returned by the store after the last successful update.
    ///
    /// Only populated when capture is enabled. Never read back by the plugin.
    pub fn last_applied(&self) -> Option<HttpProxy> {
        self.last_applied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Extract the HTTPProxy and service names from a rollout
    pub fn traffic_target(&self, rollout: Option<&Rollout>) -> Result<TrafficTarget> {
        let rollout = rollout
            .ok_or_else(|| RouterError::InvalidArgument("rollout is absent".to_string()))?;
        let canary = rollout.spec.strategy.canary.as_ref().ok_or_else(|| {
            RouterError::InvalidArgument("rollout has no canary strategy".to_string())
        })?;

        require("stable service", &canary.stable_service)?;
        require("canary service", &canary.canary_service)?;

        let raw = canary
            .traffic_routing
            .as_ref()
            .and_then(|tr| tr.plugins.get(&self.plugin_key))
            .ok_or_else(|| {
                RouterError::InvalidArgument(format!(
                    "no traffic routing configuration under '{}'",
                    self.plugin_key
                ))
            })?;
        let routing = ContourTrafficRouting::deserialize(raw).map_err(|e| {
            RouterError::Decode(format!(
                "traffic routing configuration under '{}': {}",
                self.plugin_key, e
            ))
        })?;

        let namespace = if rollout.metadata.namespace.is_empty() {
            "default".to_string()
        } else {
            rollout.metadata.namespace.clone()
        };

        Ok(TrafficTarget {
            namespace,
            http_proxy: routing.http_proxy,
            canary_service: canary.canary_service.clone(),
            stable_service: canary.stable_service.clone(),
        })
    }

    /// Give the canary `desired_weight` and the stable service the complement
    /// in the HTTPProxy `http_proxy`, then persist it.
    pub async fn apply_weight(
        &self,
        namespace: &str,
        http_proxy: &str,
        canary: &str,
        stable: &str,
        desired_weight: i32,
    ) -> Result<()> {
        require("HTTPProxy name", http_proxy)?;
        require("canary service", canary)?;
        require("stable service", stable)?;

        tracing::debug!(namespace, http_proxy, canary, stable, "Applying canary weight");

        let object = self
            .store
            .get(namespace, http_proxy)
            .await
            .map_err(into_store_error)?;
        let mut proxy = codec::decode(&object)?;

        // Only the first route declaring services is rebalanced; later routes are left alone.
        let services = routing::resolve_backend_list(&mut proxy.spec.routes)?;
        let change = routing::rebalance(services, canary, stable, desired_weight)?;

        tracing::debug!(
            canary = change.canary_before,
            stable = change.stable_before,
            "old weight"
        );
        tracing::debug!(
            canary = change.canary_after,
            stable = change.stable_after,
            "new weight"
        );

        let encoded = codec::encode(&proxy)?;
        let updated = self
            .store
            .replace(namespace, http_proxy, encoded)
            .await
            .map_err(|e| {
                tracing::error!(name = http_proxy, error = %e, "update the HTTPProxy failed");
                into_store_error(e)
            })?;

        if self.capture {
            self.capture_applied(http_proxy, &updated);
        }

        tracing::info!(
            namespace,
            http_proxy,
            canary_weight = change.canary_after,
            stable_weight = change.stable_after,
            "HTTPProxy updated"
        );
        Ok(())
    }

    /// Record the object returned by the store. The write has already
    /// happened, so a store reply that does not decode is only logged.
    fn capture_applied(&self, http_proxy: &str, updated: &serde_json::Value) {
        match codec::decode(updated) {
            Ok(persisted) => {
                *self
                    .last_applied
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(persisted);
            }
            Err(e) => {
                tracing::warn!(
                    name = http_proxy,
                    error = %e,
                    "Could not capture updated HTTPProxy"
                );
            }
        }
    }

    /// Compare the stored weights with `desired_weight` without writing
    pub async fn check_weight(
        &self,
        target: &TrafficTarget,
        desired_weight: i32,
    ) -> Result<RpcVerified> {
        require("HTTPProxy name", &target.http_proxy)?;

        let object = self
            .store
            .get(&target.namespace, &target.http_proxy)
            .await
            .map_err(into_store_error)?;
        let proxy = codec::decode(&object)?;

        let services = routing::resolve_backend_list_ref(&proxy.spec.routes)?;
        let canary = routing::find_service(&target.canary_service, services)?;
        let stable = routing::find_service(&target.stable_service, services)?;

        let desired = i64::from(desired_weight);
        let verified = canary.weight == desired && stable.weight == TOTAL_WEIGHT - desired;

        tracing::debug!(
            canary = canary.weight,
            stable = stable.weight,
            desired,
            verified,
            "verify weight"
        );

        Ok(if verified {
            RpcVerified::Verified
        } else {
            RpcVerified::NotVerified
        })
    }
}

fn require(what: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(RouterError::InvalidArgument(format!("{} is empty", what)));
    }
    Ok(())
}

fn into_store_error(err: RouterError) -> RouterError {
    match err {
        RouterError::Store(_) => err,
        other => RouterError::Store(other.to_string()),
    }
}

fn rollout_name(rollout: Option<&Rollout>) -> &str {
    rollout.map(|r| r.metadata.name.as_str()).unwrap_or("")
}

#[async_trait]
impl<S: RouteStore> TrafficRouterPlugin for ContourPlugin<S> {
    async fn init(&self) -> RpcError {
        let result = self.store.ready().await;
        match &result {
            Ok(()) => tracing::info!(plugin_key = %self.plugin_key, "the plugin is running"),
            Err(e) => tracing::error!(error = %e, "plugin initialisation failed"),
        }
        result.into()
    }

    async fn update_hash(
        &self,
        _rollout: Option<&Rollout>,
        _canary_hash: &str,
        _stable_hash: &str,
        _additional_destinations: &[WeightDestination],
    ) -> RpcError {
        RpcError::ok()
    }

    async fn set_weight(
        &self,
        rollout: Option<&Rollout>,
        desired_weight: i32,
        additional_destinations: &[WeightDestination],
    ) -> RpcError {
        let span = tracing::info_span!(
            "set_weight",
            plugin = "trafficrouter",
            vendor = "contour",
            rollout = rollout_name(rollout),
            desired_weight
        );

        async {
            if !additional_destinations.is_empty() {
                tracing::debug!(
                    count = additional_destinations.len(),
                    "additional destinations are not supported, ignoring"
                );
            }

            let result = match self.traffic_target(rollout) {
                Ok(target) => {
                    self.apply_weight(
                        &target.namespace,
                        &target.http_proxy,
                        &target.canary_service,
                        &target.stable_service,
                        desired_weight,
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            if let Err(e) = &result {
                tracing::warn!(error = %e, "set weight failed");
            }
            RpcError::from(result)
        }
        .instrument(span)
        .await
    }

    async fn set_header_route(
        &self,
        _rollout: Option<&Rollout>,
        _header_routing: Option<&SetHeaderRoute>,
    ) -> RpcError {
        RpcError::ok()
    }

    async fn set_mirror_route(
        &self,
        _rollout: Option<&Rollout>,
        _mirror_route: Option<&SetMirrorRoute>,
    ) -> RpcError {
        RpcError::ok()
    }

    async fn verify_weight(
        &self,
        rollout: Option<&Rollout>,
        desired_weight: i32,
        _additional_destinations: &[WeightDestination],
    ) -> (RpcVerified, RpcError) {
        let span = tracing::info_span!(
            "verify_weight",
            plugin = "trafficrouter",
            vendor = "contour",
            rollout = rollout_name(rollout),
            desired_weight
        );

        async {
            let result = match self.traffic_target(rollout) {
                Ok(target) => self.check_weight(&target, desired_weight).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(verified) => (verified, RpcError::ok()),
                Err(e) => {
                    tracing::warn!(error = %e, "verify weight failed");
                    (RpcVerified::NotVerified, e.into())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn remove_managed_routes(&self, _rollout: Option<&Rollout>) -> RpcError {
        RpcError::ok()
    }

    fn type_name(&self) -> &'static str {
        PLUGIN_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Route, Service};
    use crate::store::MemoryRouteStore;
    use serde_json::json;
    use std::sync::Arc;

    const NS: &str = "default";
    const PROXY: &str = "rollouts-demo";

    async fn store_with(services: Vec<Service>) -> Arc<MemoryRouteStore> {
        let proxy = HttpProxy::new(NS, PROXY).with_route(Route::with_services("/", services));
        let store = Arc::new(MemoryRouteStore::new());
        store
            .insert(serde_json::to_value(&proxy).unwrap())
            .await
            .unwrap();
        store
    }

    fn rollout() -> Rollout {
        Rollout::canary(NS, "demo", "canary", "stable", DEFAULT_PLUGIN_KEY, PROXY)
    }

    async fn stored_services(store: &MemoryRouteStore) -> Vec<Service> {
        let object = store.snapshot(NS, PROXY).await.unwrap();
        let proxy = codec::decode(&object).unwrap();
        proxy.spec.routes[0].services.clone().unwrap()
    }

    #[test]
    fn test_traffic_target_from_rollout() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new());
        let target = plugin.traffic_target(Some(&rollout())).unwrap();
        assert_eq!(
            target,
            TrafficTarget {
                namespace: NS.to_string(),
                http_proxy: PROXY.to_string(),
                canary_service: "canary".to_string(),
                stable_service: "stable".to_string(),
            }
        );
    }

    #[test]
    fn test_traffic_target_absent_rollout() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new());
        let err = plugin.traffic_target(None).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument(_)));
    }

    #[test]
    fn test_traffic_target_without_canary_strategy() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new());
        let mut r = rollout();
        r.spec.strategy.canary = None;
        let err = plugin.traffic_target(Some(&r)).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument(ref m) if m.contains("canary strategy")));
    }

    #[test]
    fn test_traffic_target_empty_service_names() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new());

        let mut r = rollout();
        r.spec.strategy.canary.as_mut().unwrap().stable_service.clear();
        assert!(matches!(
            plugin.traffic_target(Some(&r)),
            Err(RouterError::InvalidArgument(_))
        ));

        let mut r = rollout();
        r.spec.strategy.canary.as_mut().unwrap().canary_service.clear();
        assert!(matches!(
            plugin.traffic_target(Some(&r)),
            Err(RouterError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_traffic_target_missing_plugin_config() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new()).with_plugin_key("other/key");
        let err = plugin.traffic_target(Some(&rollout())).unwrap_err();
        assert!(matches!(err, RouterError::InvalidArgument(ref m) if m.contains("other/key")));
    }

    #[test]
    fn test_traffic_target_malformed_plugin_config() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new());
        let mut r = rollout();
        r.spec
            .strategy
            .canary
            .as_mut()
            .unwrap()
            .traffic_routing
            .as_mut()
            .unwrap()
            .plugins
            .insert(DEFAULT_PLUGIN_KEY.to_string(), json!({ "httpProxy": 42 }));
        let err = plugin.traffic_target(Some(&r)).unwrap_err();
        assert!(matches!(err, RouterError::Decode(_)));
    }

    #[test]
    fn test_traffic_target_defaults_namespace() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new());
        let mut r = rollout();
        r.metadata.namespace.clear();
        assert_eq!(plugin.traffic_target(Some(&r)).unwrap().namespace, "default");
    }

    #[tokio::test]
    async fn test_apply_weight_quarter() {
        let store = store_with(vec![
            Service::new("stable", 80, 100),
            Service::new("canary", 80, 0),
        ])
        .await;
        let plugin = ContourPlugin::new(store.clone());

        plugin
            .apply_weight(NS, PROXY, "canary", "stable", 25)
            .await
            .unwrap();

        let services = stored_services(&store).await;
        assert_eq!(services[0].name, "stable");
        assert_eq!(services[0].weight, 75);
        assert_eq!(services[1].name, "canary");
        assert_eq!(services[1].weight, 25);
        assert_eq!(store.get_count(), 1);
        assert_eq!(store.replace_count(), 1);
    }

    #[tokio::test]
    async fn test_apply_weight_is_idempotent() {
        let store = store_with(vec![
            Service::new("stable", 100, 100),
            Service::new("canary", 80, 0),
        ])
        .await;
        let plugin = ContourPlugin::new(store.clone());

        plugin.apply_weight(NS, PROXY, "canary", "stable", 40).await.unwrap();
        let mut first = store.snapshot(NS, PROXY).await.unwrap();
        plugin.apply_weight(NS, PROXY, "canary", "stable", 40).await.unwrap();
        let mut second = store.snapshot(NS, PROXY).await.unwrap();

        // Only the store-managed version differs between the two writes
        first["metadata"]["resourceVersion"] = json!(null);
        second["metadata"]["resourceVersion"] = json!(null);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_apply_weight_missing_canary_never_writes() {
        let store = store_with(vec![
            Service::new("stable", 80, 100),
            Service::new("other", 80, 0),
        ])
        .await;
        let before = store.snapshot(NS, PROXY).await.unwrap();
        let plugin = ContourPlugin::new(store.clone());

        let err = plugin
            .apply_weight(NS, PROXY, "canary-x", "stable", 30)
            .await
            .unwrap_err();

        assert!(matches!(err, RouterError::NotFound(ref name) if name == "canary-x"));
        assert_eq!(store.get_count(), 1);
        assert_eq!(store.replace_count(), 0);
        assert_eq!(store.snapshot(NS, PROXY).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_apply_weight_empty_names_skip_store() {
        let store = Arc::new(MemoryRouteStore::new());
        let plugin = ContourPlugin::new(store.clone());

        for (proxy, canary, stable) in [("", "c", "s"), ("p", "", "s"), ("p", "c", "")] {
            let err = plugin
                .apply_weight(NS, proxy, canary, stable, 10)
                .await
                .unwrap_err();
            assert!(matches!(err, RouterError::InvalidArgument(_)));
        }
        assert_eq!(store.get_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_weight_missing_proxy_is_store_error() {
        let store = Arc::new(MemoryRouteStore::new());
        let plugin = ContourPlugin::new(store.clone());
        let err = plugin
            .apply_weight(NS, PROXY, "canary", "stable", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Store(_)));
        assert_eq!(store.replace_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_weight_undecodable_document() {
        let store = Arc::new(MemoryRouteStore::new());
        store
            .insert(json!({
                "metadata": { "name": PROXY, "namespace": NS },
                "spec": { "routes": "everything" }
            }))
            .await
            .unwrap();
        let plugin = ContourPlugin::new(store.clone());

        let err = plugin
            .apply_weight(NS, PROXY, "canary", "stable", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Decode(_)));
        assert_eq!(store.replace_count(), 0);
    }

    #[tokio::test]
    async fn test_apply_weight_without_service_list() {
        let store = Arc::new(MemoryRouteStore::new());
        store
            .insert(json!({
                "metadata": { "name": PROXY, "namespace": NS },
                "spec": { "routes": [{ "conditions": [{ "prefix": "/" }] }] }
            }))
            .await
            .unwrap();
        let plugin = ContourPlugin::new(store.clone());

        let err = plugin
            .apply_weight(NS, PROXY, "canary", "stable", 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::NotFound(_)));
        assert_eq!(store.replace_count(), 0);
    }

    #[tokio::test]
    async fn test_capture_records_persisted_document() {
        let store = store_with(vec![
            Service::new("stable", 80, 100),
            Service::new("canary", 80, 0),
        ])
        .await;
        let plugin = ContourPlugin::new(store.clone()).with_capture(true);
        assert!(plugin.last_applied().is_none());

        plugin.apply_weight(NS, PROXY, "canary", "stable", 10).await.unwrap();

        let captured = plugin.last_applied().unwrap();
        assert_eq!(captured.metadata.resource_version.as_deref(), Some("2"));
        let services = captured.spec.routes[0].services.as_ref().unwrap();
        assert_eq!(services[1].weight, 10);
    }

    /// Persists like the memory store but answers with a `Status` object
    struct StatusReplyStore(Arc<MemoryRouteStore>);

    #[async_trait::async_trait]
    impl RouteStore for StatusReplyStore {
        async fn get(&self, namespace: &str, name: &str) -> Result<serde_json::Value> {
            self.0.get(namespace, name).await
        }

        async fn replace(
            &self,
            namespace: &str,
            name: &str,
            object: serde_json::Value,
        ) -> Result<serde_json::Value> {
            self.0.replace(namespace, name, object).await?;
            Ok(json!({"kind": "Status"}))
        }
    }

    #[tokio::test]
    async fn test_capture_undecodable_reply_keeps_success() {
        let store = store_with(vec![
            Service::new("stable", 80, 100),
            Service::new("canary", 80, 0),
        ])
        .await;
        let plugin = ContourPlugin::new(StatusReplyStore(store.clone())).with_capture(true);

        plugin
            .apply_weight(NS, PROXY, "canary", "stable", 20)
            .await
            .unwrap();

        assert!(plugin.last_applied().is_none());
        let services = stored_services(&store).await;
        assert_eq!(services[1].weight, 20);
        assert_eq!(services[0].weight, 80);
    }

    #[tokio::test]
    async fn test_capture_disabled_by_default() {
        let store = store_with(vec![
            Service::new("stable", 80, 100),
            Service::new("canary", 80, 0),
        ])
        .await;
        let plugin = ContourPlugin::new(store);
        plugin.apply_weight(NS, PROXY, "canary", "stable", 10).await.unwrap();
        assert!(plugin.last_applied().is_none());
    }

    #[tokio::test]
    async fn test_set_weight_success() {
        let store = store_with(vec![
            Service::new("stable", 80, 100),
            Service::new("canary", 80, 0),
        ])
        .await;
        let plugin = ContourPlugin::new(store.clone());

        let result = plugin.set_weight(Some(&rollout()), 0, &[]).await;
        assert!(result.is_ok(), "{}", result);

        let services = stored_services(&store).await;
        assert_eq!(services[0].weight, 100);
        assert_eq!(services[1].weight, 0);
    }

    #[tokio::test]
    async fn test_set_weight_ignores_additional_destinations() {
        let store = store_with(vec![
            Service::new("stable", 80, 100),
            Service::new("canary", 80, 0),
            Service::new("experiment", 80, 0),
        ])
        .await;
        let plugin = ContourPlugin::new(store.clone());

        let extra = vec![WeightDestination {
            service_name: "experiment".to_string(),
            pod_template_hash: "abc123".to_string(),
            weight: 10,
        }];
        assert!(plugin.set_weight(Some(&rollout()), 20, &extra).await.is_ok());

        let services = stored_services(&store).await;
        assert_eq!(services[2].weight, 0);
    }

    #[tokio::test]
    async fn test_set_weight_flattens_errors() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new());
        let result = plugin.set_weight(None, 10, &[]).await;
        assert_eq!(result.error_string, "illegal parameter(s): rollout is absent");
    }

    #[tokio::test]
    async fn test_verify_weight() {
        let store = store_with(vec![
            Service::new("stable", 80, 100),
            Service::new("canary", 80, 0),
        ])
        .await;
        let plugin = ContourPlugin::new(store.clone());

        let (verified, err) = plugin.verify_weight(Some(&rollout()), 30, &[]).await;
        assert!(err.is_ok());
        assert_eq!(verified, RpcVerified::NotVerified);

        plugin.set_weight(Some(&rollout()), 30, &[]).await;

        let (verified, err) = plugin.verify_weight(Some(&rollout()), 30, &[]).await;
        assert!(err.is_ok());
        assert_eq!(verified, RpcVerified::Verified);
        assert_eq!(store.replace_count(), 1);
    }

    #[tokio::test]
    async fn test_verify_weight_missing_service() {
        let store = store_with(vec![Service::new("stable", 80, 100)]).await;
        let plugin = ContourPlugin::new(store);
        let (verified, err) = plugin.verify_weight(Some(&rollout()), 0, &[]).await;
        assert_eq!(verified, RpcVerified::NotVerified);
        assert_eq!(err.error_string, "canary is not found in HTTPProxy");
    }

    #[tokio::test]
    async fn test_noop_operations() {
        let plugin = ContourPlugin::new(MemoryRouteStore::new());
        let r = rollout();
        assert!(plugin.update_hash(Some(&r), "abc", "def", &[]).await.is_ok());
        assert!(plugin.set_header_route(Some(&r), None).await.is_ok());
        assert!(plugin.set_mirror_route(Some(&r), None).await.is_ok());
        assert!(plugin.remove_managed_routes(Some(&r)).await.is_ok());
        assert!(plugin.init().await.is_ok());
        assert_eq!(plugin.type_name(), "Contour");
    }
}
