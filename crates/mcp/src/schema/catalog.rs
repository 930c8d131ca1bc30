//! Per-provider cache of discovered operation schemas.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use relay_types::{OperationSchema, ProviderDescriptor};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::client::ProviderHandle;

use super::SchemaError;

struct CacheEntry {
    /// Connection generation the operations were discovered on.
    generation: u64,
    operations: Arc<Vec<OperationSchema>>,
}

/// Shared cache of operation schemas keyed by provider.
///
/// Entries are tied to the connection generation they were discovered on, so a reconnect
/// invalidates them implicitly. Discovery for one provider is single-flight.
#[derive(Default)]
pub struct SchemaCatalog {
    entries: RwLock<HashMap<String, CacheEntry>>,
    discovery_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    discoveries: AtomicUsize,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations for the provider behind `handle`.
    ///
    /// Pre-declared operations on the descriptor are returned without contacting the provider.
    pub async fn discover(&self, descriptor: &ProviderDescriptor, handle: &ProviderHandle) -> Result<Arc<Vec<OperationSchema>>, SchemaError> {
        let provider = descriptor.name.as_str();
        if let Some(cached) = self.cached(provider, handle.generation()).await {
            return Ok(cached);
        }

        if !descriptor.static_operations.is_empty() {
            let operations = Arc::new(descriptor.static_operations.clone());
            self.store(provider, handle.generation(), Arc::clone(&operations)).await;
            return Ok(operations);
        }

        let lock = {
            let mut locks = self.discovery_locks.lock().await;
            Arc::clone(locks.entry(provider.to_string()).or_default())
        };
        let _guard = lock.lock().await;
        if let Some(cached) = self.cached(provider, handle.generation()).await {
            return Ok(cached);
        }

        self.discoveries.fetch_add(1, Ordering::Relaxed);
        let remote = handle
            .session()
            .list_operations()
            .await
            .map_err(|source| SchemaError::Discovery {
                provider: provider.to_string(),
                source,
            })?;
        let operations: Vec<OperationSchema> = remote
            .into_iter()
            .map(|operation| OperationSchema::from_input_schema(provider, operation.name, operation.description, &operation.input_schema))
            .collect();
        info!(provider = %provider, count = operations.len(), generation = handle.generation(), "discovered operations");

        let operations = Arc::new(operations);
        self.store(provider, handle.generation(), Arc::clone(&operations)).await;
        Ok(operations)
    }

    async fn cached(&self, provider: &str, generation: u64) -> Option<Arc<Vec<OperationSchema>>> {
        let entries = self.entries.read().await;
        entries
            .get(provider)
            .filter(|entry| entry.generation == generation)
            .map(|entry| Arc::clone(&entry.operations))
    }

    async fn store(&self, provider: &str, generation: u64, operations: Arc<Vec<OperationSchema>>) {
        let mut entries = self.entries.write().await;
        entries.insert(provider.to_string(), CacheEntry { generation, operations });
    }

    /// Drop the cached operations of one provider.
    pub async fn invalidate(&self, provider: &str) {
        if self.entries.write().await.remove(provider).is_some() {
            debug!(provider = %provider, "operation cache invalidated");
        }
    }

    /// Drop every cached entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of discovery round-trips issued so far.
    pub fn discovery_count(&self) -> usize {
        self.discoveries.load(Ordering::Relaxed)
    }
}
