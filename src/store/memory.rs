//! In-process HTTPProxy store with resourceVersion checks

use super::RouteStore;
use crate::error::{Result, RouterError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Thread-safe in-memory store keyed by (namespace, name).
///
/// Behaves like the API server for the calls the router makes: a replace
/// carrying a `metadata.resourceVersion` that differs from the stored one is
/// rejected as a conflict, and every accepted write bumps the version.
/// Call counters let tests assert whether a write happened.
#[derive(Default)]
pub struct MemoryRouteStore {
    objects: RwLock<HashMap<(String, String), Value>>,
    gets: AtomicUsize,
    replaces: AtomicUsize,
}

impl MemoryRouteStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an object, keyed by its own metadata.
    ///
    /// Objects without a namespace land in `default`. A missing
    /// resourceVersion is initialised to `1`.
    pub async fn insert(&self, mut object: Value) -> Result<()> {
        let (namespace, name) = identity(&object)?;
        let meta = metadata_mut(&mut object)?;
        meta.entry("resourceVersion")
            .or_insert_with(|| Value::String("1".to_string()));
        self.objects
            .write()
            .await
            .insert((namespace, name), object);
        Ok(())
    }

    /// Current stored object, bypassing call counters
    pub async fn snapshot(&self, namespace: &str, name: &str) -> Option<Value> {
        self.objects
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Number of `get` calls served (successful or not)
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of `replace` calls received (successful or not)
    pub fn replace_count(&self) -> usize {
        self.replaces.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Value> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.snapshot(namespace, name).await.ok_or_else(|| {
            RouterError::Store(format!(
                "httpproxies \"{}\" not found in namespace \"{}\"",
                name, namespace
            ))
        })
    }

    async fn replace(&self, namespace: &str, name: &str, mut object: Value) -> Result<Value> {
        self.replaces.fetch_add(1, Ordering::SeqCst);

        let key = (namespace.to_string(), name.to_string());
        let mut objects = self.objects.write().await;
        let current = objects.get(&key).ok_or_else(|| {
            RouterError::Store(format!(
                "httpproxies \"{}\" not found in namespace \"{}\"",
                name, namespace
            ))
        })?;

        let current_version = resource_version(current);
        if let Some(submitted) = resource_version(&object) {
            if Some(submitted) != current_version {
                return Err(RouterError::Store(format!(
                    "conflict: httpproxies \"{}\" has been modified (submitted resourceVersion {}, current {})",
                    name,
                    submitted,
                    current_version.unwrap_or(0)
                )));
            }
        }

        let next = current_version.unwrap_or(0) + 1;
        let meta = metadata_mut(&mut object)?;
        meta.insert("resourceVersion".to_string(), Value::String(next.to_string()));
        meta.insert("name".to_string(), Value::String(name.to_string()));
        meta.insert(
            "namespace".to_string(),
            Value::String(namespace.to_string()),
        );

        objects.insert(key, object.clone());
        Ok(object)
    }
}

fn identity(object: &Value) -> Result<(String, String)> {
    let name = object
        .pointer("/metadata/name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RouterError::Store("object has no metadata.name".to_string()))?;
    let namespace = object
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or("default");
    Ok((namespace.to_string(), name.to_string()))
}

fn metadata_mut(object: &mut Value) -> Result<&mut serde_json::Map<String, Value>> {
    object
        .get_mut("metadata")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| RouterError::Store("object has no metadata".to_string()))
}

fn resource_version(object: &Value) -> Option<u64> {
    object
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .and_then(|v| v.parse().ok())
}
