//! Declarative store for HTTPProxy objects
//!
//! The store hands out and accepts generic JSON objects; decoding into the
//! typed model happens in [`crate::codec`]. Updates are full replacements and
//! rely on the store's own `metadata.resourceVersion` check to reject writes
//! based on a stale read.

#[cfg(feature = "kube")]
mod kubernetes;
mod memory;

#[cfg(feature = "kube")]
pub use kubernetes::KubeRouteStore;
pub use memory::MemoryRouteStore;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Read-by-name and replace-by-name access to HTTPProxy objects
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Fetch the object `name` in `namespace`
    async fn get(&self, namespace: &str, name: &str) -> Result<Value>;

    /// Replace the object `name` in `namespace`, returning the stored result
    async fn replace(&self, namespace: &str, name: &str, object: Value) -> Result<Value>;

    /// Check that the store is reachable
    async fn ready(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<S: RouteStore + ?Sized> RouteStore for Arc<S> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Value> {
        (**self).get(namespace, name).await
    }

    async fn replace(&self, namespace: &str, name: &str, object: Value) -> Result<Value> {
        (**self).replace(namespace, name, object).await
    }

    async fn ready(&self) -> Result<()> {
        (**self).ready().await
    }
}
