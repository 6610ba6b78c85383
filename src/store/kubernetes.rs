//! Kubernetes-backed HTTPProxy store
//!
//! Talks to the API server through a dynamic `Api<DynamicObject>` for
//! `projectcontour.io/v1/httpproxies`, so no Contour CRD crate is needed.
//! Feature-gated behind `kube`.

use super::RouteStore;
use crate::config::KubernetesConfig;
use crate::error::{Result, RouterError};
use crate::model::HTTP_PROXY_KIND;
use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use serde_json::Value;

const CONTOUR_GROUP: &str = "projectcontour.io";
const CONTOUR_VERSION: &str = "v1";
const HTTP_PROXY_PLURAL: &str = "httpproxies";

/// HTTPProxy store backed by a live cluster
#[derive(Clone)]
pub struct KubeRouteStore {
    client: kube::Client,
    resource: ApiResource,
}

impl KubeRouteStore {
    /// Build a client from the configured kubeconfig/context, falling back to
    /// in-cluster or default kubeconfig inference.
    pub async fn connect(config: &KubernetesConfig) -> Result<Self> {
        let client_config = if config.kubeconfig.is_some() || config.context.is_some() {
            let options = KubeConfigOptions {
                context: config.context.clone(),
                ..Default::default()
            };
            let loaded = match &config.kubeconfig {
                Some(path) => {
                    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                        RouterError::Config(format!("Failed to read kubeconfig {}: {}", path, e))
                    })?;
                    kube::Config::from_custom_kubeconfig(kubeconfig, &options).await
                }
                None => kube::Config::from_kubeconfig(&options).await,
            };
            loaded.map_err(|e| RouterError::Config(format!("Invalid kubeconfig: {}", e)))?
        } else {
            kube::Config::infer()
                .await
                .map_err(|e| RouterError::Config(format!("Failed to infer kube config: {}", e)))?
        };

        let client = kube::Client::try_from(client_config)
            .map_err(|e| RouterError::Store(format!("Failed to create K8s client: {}", e)))?;
        Ok(Self::from_client(client))
    }

    /// Wrap an existing client
    pub fn from_client(client: kube::Client) -> Self {
        let gvk = GroupVersionKind::gvk(CONTOUR_GROUP, CONTOUR_VERSION, HTTP_PROXY_KIND);
        Self {
            client,
            resource: ApiResource::from_gvk_with_plural(&gvk, HTTP_PROXY_PLURAL),
        }
    }

    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, &self.resource)
    }
}

fn to_dynamic(object: Value) -> Result<DynamicObject> {
    serde_json::from_value(object)
        .map_err(|e| RouterError::Decode(format!("HTTPProxy is not a valid object: {}", e)))
}

fn from_dynamic(object: &DynamicObject) -> Result<Value> {
    Ok(serde_json::to_value(object)?)
}

#[async_trait]
impl RouteStore for KubeRouteStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Value> {
        let object = self.api(namespace).get(name).await.map_err(|e| {
            RouterError::Store(format!(
                "Failed to get HTTPProxy {}/{}: {}",
                namespace, name, e
            ))
        })?;
        from_dynamic(&object)
    }

    async fn replace(&self, namespace: &str, name: &str, object: Value) -> Result<Value> {
        let object = to_dynamic(object)?;

        let updated = self
            .api(namespace)
            .replace(name, &PostParams::default(), &object)
            .await
            .map_err(|e| {
                RouterError::Store(format!(
                    "Failed to update HTTPProxy {}/{}: {}",
                    namespace, name, e
                ))
            })?;
        from_dynamic(&updated)
    }

    async fn ready(&self) -> Result<()> {
        let version = self
            .client
            .apiserver_version()
            .await
            .map_err(|e| RouterError::Store(format!("K8s API server unreachable: {}", e)))?;
        tracing::debug!(
            major = %version.major,
            minor = %version.minor,
            "Connected to K8s API server"
        );
        Ok(())
    }
}
