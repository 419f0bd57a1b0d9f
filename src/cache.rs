//! Client-side query cache
//!
//! Entries are keyed by endpoint, query parameters and, for vessel-scoped
//! data, the vessel id.
//! Each key owns a cell that is filled at most once; concurrent readers of
//! the same key wait on the same fetch. Invalidation detaches the cell from
//! the map, so a response that lands afterwards is written into the detached
//! cell and never shows up under the live key.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::{errors::FleetError, models::VesselId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    /// Bare path, without query string
    pub endpoint: String,
    /// Extra query parameters besides the vessel id
    pub params: Vec<(String, String)>,
    pub vessel_id: Option<VesselId>,
}

impl QueryKey {
    /// Key for data that does not depend on the selected vessel
    pub fn global(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
            vessel_id: None,
        }
    }

    pub fn vessel(endpoint: impl Into<String>, vessel_id: VesselId) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
            vessel_id: Some(vessel_id),
        }
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }
}

/// Result of [`QueryCache::fetch_tracked`]
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub value: Value,
    /// False if the key was invalidated while the fetch was in flight
    pub live: bool,
}

#[derive(Default)]
pub struct QueryCache {
    entries: Mutex<HashMap<QueryKey, Arc<OnceCell<Value>>>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, running `fetch` if there is none.
    ///
    /// A failed fetch leaves the key empty.
    pub async fn get_or_fetch<F, Fut>(&self, key: QueryKey, fetch: F) -> Result<Value, FleetError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FleetError>>,
    {
        self.fetch_tracked(key, fetch).await.map(|f| f.value)
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), also reporting whether the
    /// value still belongs to the live entry for `key`
    pub async fn fetch_tracked<F, Fut>(
        &self,
        key: QueryKey,
        fetch: F,
    ) -> Result<Fetched, FleetError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FleetError>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(key.clone()).or_default().clone()
        };

        match cell.get_or_try_init(fetch).await {
            Ok(value) => {
                let value = value.clone();
                let entries = self.entries.lock().await;
                let live = entries
                    .get(&key)
                    .is_some_and(|current| Arc::ptr_eq(current, &cell));
                Ok(Fetched { value, live })
            }
            Err(e) => {
                let mut entries = self.entries.lock().await;
                // Map plus this handle: nobody else is waiting on the cell
                let unused = entries.get(&key).is_some_and(|current| {
                    Arc::ptr_eq(current, &cell)
                        && !current.initialized()
                        && Arc::strong_count(&cell) == 2
                });
                if unused {
                    entries.remove(&key);
                }
                Err(e)
            }
        }
    }

    /// Cached value, if the key has been fetched
    pub async fn get(&self, key: &QueryKey) -> Option<Value> {
        let entries = self.entries.lock().await;
        entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// Replace the value stored under `key`
    pub async fn set(&self, key: QueryKey, value: Value) {
        let cell = OnceCell::new_with(Some(value));
        self.entries.lock().await.insert(key, Arc::new(cell));
    }

    pub async fn contains(&self, key: &QueryKey) -> bool {
        self.get(key).await.is_some()
    }

    /// Drop every entry parameterised by `vessel_id`
    pub async fn invalidate_vessel(&self, vessel_id: VesselId) -> usize {
        self.invalidate_where(|key| key.vessel_id == Some(vessel_id))
            .await
    }

    /// Drop every entry for `endpoint`, whatever the vessel or parameters
    pub async fn invalidate_endpoint(&self, endpoint: &str) -> usize {
        self.invalidate_where(|key| key.endpoint == endpoint).await
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn invalidate_where(&self, predicate: impl Fn(&QueryKey) -> bool) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        let removed = before - entries.len();
        debug!(removed, "Invalidated cache entries");
        removed
    }
}
