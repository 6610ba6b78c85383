//! Contour HTTPProxy model
//!
//! Only the fields on the weight-rewrite path are typed. Everything else is
//! collected into `extra` maps via `#[serde(flatten)]`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// API version of the HTTPProxy custom resource
pub const HTTP_PROXY_API_VERSION: &str = "projectcontour.io/v1";

/// Kind of the HTTPProxy custom resource
pub const HTTP_PROXY_KIND: &str = "HTTPProxy";

/// HTTPProxy custom resource
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: projectcontour.io/v1
/// kind: HTTPProxy
/// metadata:
///   name: rollouts-demo
///   namespace: default
/// spec:
///   virtualhost:
///     fqdn: demo.example.com
///   routes:
///     - conditions:
///         - prefix: /
///       services:
///         - name: rollouts-demo-stable
///           port: 80
///           weight: 100
///         - name: rollouts-demo-canary
///           port: 80
///           weight: 0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpProxy {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: HttpProxySpec,
    /// Status written by Contour; never interpreted here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

fn default_api_version() -> String {
    HTTP_PROXY_API_VERSION.to_string()
}

fn default_kind() -> String {
    HTTP_PROXY_KIND.to_string()
}

impl HttpProxy {
    /// Create an empty HTTPProxy with the given identity
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: Some(namespace.into()),
                resource_version: None,
                extra: Map::new(),
            },
            spec: HttpProxySpec::default(),
            status: None,
        }
    }

    /// Append a route and return `self` for chaining
    pub fn with_route(mut self, route: Route) -> Self {
        self.spec.routes.push(route);
        self
    }
}

/// Object metadata subset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Opaque version used by the store for optimistic concurrency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// HTTPProxy spec
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpProxySpec {
    /// Ordered route list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub routes: Vec<Route>,
    /// virtualhost, includes, tcpproxy, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A single route in an HTTPProxy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<MatchCondition>,
    /// Weighted backends. `None` when the route declares no `services` key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Service>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Route {
    /// Route with a prefix condition and the given services
    pub fn with_services(prefix: &str, services: Vec<Service>) -> Self {
        Self {
            conditions: vec![MatchCondition::prefix(prefix)],
            services: Some(services),
            extra: Map::new(),
        }
    }
}

/// Route match condition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// header, queryParameter, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MatchCondition {
    pub fn prefix(prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            extra: Map::new(),
        }
    }
}

/// Backend service reference with its traffic weight
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    #[serde(default)]
    pub port: i32,
    /// Share of traffic. Contour omits a zero weight.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub weight: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_zero(weight: &i64) -> bool {
    *weight == 0
}

impl Service {
    pub fn new(name: impl Into<String>, port: i32, weight: i64) -> Self {
        Self {
            name: name.into(),
            port,
            weight,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_full_document() {
        let doc = json!({
            "apiVersion": "projectcontour.io/v1",
            "kind": "HTTPProxy",
            "metadata": { "name": "demo", "namespace": "prod", "resourceVersion": "7" },
            "spec": {
                "virtualhost": { "fqdn": "demo.example.com" },
                "routes": [
                    { "conditions": [{ "prefix": "/" }],
                      "services": [
                        { "name": "stable", "port": 80, "weight": 100 },
                        { "name": "canary", "port": 80 }
                      ] }
                ]
            }
        });

        let proxy: HttpProxy = serde_json::from_value(doc).unwrap();
        assert_eq!(proxy.metadata.name, "demo");
        assert_eq!(proxy.metadata.namespace.as_deref(), Some("prod"));
        assert_eq!(proxy.metadata.resource_version.as_deref(), Some("7"));
        assert!(proxy.spec.extra.contains_key("virtualhost"));

        let services = proxy.spec.routes[0].services.as_ref().unwrap();
        assert_eq!(services[0].weight, 100);
        assert_eq!(services[1].weight, 0);
    }

    #[test]
    fn test_route_without_services_key() {
        let route: Route = serde_json::from_value(json!({
            "conditions": [{ "prefix": "/health" }],
            "permitInsecure": true
        }))
        .unwrap();
        assert!(route.services.is_none());
        assert_eq!(route.conditions[0].prefix.as_deref(), Some("/health"));
        assert_eq!(route.extra["permitInsecure"], json!(true));
    }

    #[test]
    fn test_zero_weight_is_omitted() {
        let svc = Service::new("canary", 80, 0);
        let value = serde_json::to_value(&svc).unwrap();
        assert_eq!(value, json!({ "name": "canary", "port": 80 }));
    }

    #[test]
    fn test_unknown_service_fields_survive() {
        let svc: Service = serde_json::from_value(json!({
            "name": "stable",
            "port": 8080,
            "weight": 90,
            "mirror": false,
            "requestHeadersPolicy": { "set": [{ "name": "x-env", "value": "prod" }] }
        }))
        .unwrap();

        let value = serde_json::to_value(&svc).unwrap();
        assert_eq!(value["mirror"], json!(false));
        assert_eq!(value["requestHeadersPolicy"]["set"][0]["name"], "x-env");
    }

    #[test]
    fn test_new_uses_contour_type_meta() {
        let proxy = HttpProxy::new("default", "app")
            .with_route(Route::with_services("/", vec![Service::new("a", 80, 100)]));
        assert_eq!(proxy.api_version, HTTP_PROXY_API_VERSION);
        assert_eq!(proxy.kind, HTTP_PROXY_KIND);
        assert_eq!(proxy.spec.routes.len(), 1);
    }
}
