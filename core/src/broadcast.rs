//! Broadcast variables implementation
//!
//! A broadcast variable keeps one read-only copy of a value on each machine
//! instead of shipping it with every task. For the columnar path the value is
//! a [`BroadcastBuffer`]: one serialized batch group per block, shared by
//! every partition reading from it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use datafusion::arrow::record_batch::RecordBatch;
use moka::future::Cache;
use nativesql_common::config::NativeSqlConfig;
use nativesql_common::error::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::BatchCodec;
use crate::traits::Data;

/// Unique identifier for a broadcast variable
#[derive(Debug, Clone, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastId(pub String);

impl BroadcastId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for BroadcastId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BroadcastId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "broadcast_{}", self.0)
    }
}

/// Broadcast variable that holds a read-only value
#[derive(Debug, Clone)]
pub struct BroadcastVariable<T: Data> {
    /// Unique identifier for this broadcast variable
    pub id: BroadcastId,
    /// The broadcast value
    value: Arc<T>,
}

/// Serialized batch groups, one per block.
pub type BroadcastBuffer = BroadcastVariable<Vec<Vec<u8>>>;

impl<T: Data> BroadcastVariable<T> {
    /// Create a new broadcast variable with the given value
    pub fn new(value: T) -> Self {
        Self {
            id: BroadcastId::new(),
            value: Arc::new(value),
        }
    }

    /// Get the value of this broadcast variable
    pub fn value(&self) -> &T {
        &self.value
    }

    /// A new reference on the shared value. The value lives until the last
    /// reference is dropped.
    pub fn shared(&self) -> Arc<T> {
        Arc::clone(&self.value)
    }

    /// Get the ID of this broadcast variable
    pub fn id(&self) -> &BroadcastId {
        &self.id
    }

    /// Number of live references on the value, this handle included.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.value)
    }
}

impl BroadcastBuffer {
    /// Serialize each group of batches into one block.
    pub fn from_batches(codec: &dyn BatchCodec, groups: &[Vec<RecordBatch>]) -> Result<Self> {
        let blocks = groups
            .iter()
            .map(|group| codec.serialize(group))
            .collect::<Result<Vec<_>>>()?;
        let buffer = Self::new(blocks);
        debug!(
            "Built {} with {} blocks ({} bytes)",
            buffer.id,
            buffer.num_blocks(),
            buffer.size_bytes()
        );
        Ok(buffer)
    }

    pub fn num_blocks(&self) -> usize {
        self.value.len()
    }

    /// Total serialized size across all blocks.
    pub fn size_bytes(&self) -> usize {
        self.value.iter().map(Vec::len).sum()
    }
}

/// Manager for broadcast buffers on the coordinator
#[derive(Debug, Default)]
pub struct BroadcastManager {
    broadcasts: Arc<RwLock<HashMap<BroadcastId, BroadcastBuffer>>>,
}

impl BroadcastManager {
    pub fn new() -> Self {
        Self {
            broadcasts: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a broadcast buffer, returning its id
    pub async fn register(&self, buffer: BroadcastBuffer) -> BroadcastId {
        let id = buffer.id.clone();
        info!(
            "Registered {} ({} blocks, {} bytes)",
            id,
            buffer.num_blocks(),
            buffer.size_bytes()
        );
        let mut broadcasts = self.broadcasts.write().await;
        broadcasts.insert(id.clone(), buffer);
        id
    }

    /// Get a broadcast buffer by id. The returned handle shares the value.
    pub async fn get(&self, id: &BroadcastId) -> Option<BroadcastBuffer> {
        let broadcasts = self.broadcasts.read().await;
        broadcasts.get(id).cloned()
    }

    /// Drop the registry's reference on a buffer
    pub async fn remove(&self, id: &BroadcastId) -> bool {
        let mut broadcasts = self.broadcasts.write().await;
        let removed = broadcasts.remove(id).is_some();
        if removed {
            info!("Removed {}", id);
        }
        removed
    }

    /// Get all registered ids
    pub async fn list(&self) -> Vec<BroadcastId> {
        let broadcasts = self.broadcasts.read().await;
        broadcasts.keys().cloned().collect()
    }

    pub async fn clear(&self) {
        let mut broadcasts = self.broadcasts.write().await;
        broadcasts.clear();
    }
}

/// Worker-side cache of broadcast buffers fetched from the coordinator
#[derive(Debug, Clone)]
pub struct BroadcastCache {
    cache: Cache<BroadcastId, BroadcastBuffer>,
}

impl BroadcastCache {
    pub fn new(max_capacity: u64, time_to_idle: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_idle(time_to_idle)
            .build();
        Self { cache }
    }

    pub fn from_config(config: &NativeSqlConfig) -> Self {
        Self::new(
            config.broadcast_cache_capacity,
            config.broadcast_cache_idle_timeout(),
        )
    }

    pub async fn insert(&self, buffer: BroadcastBuffer) {
        self.cache.insert(buffer.id.clone(), buffer).await;
        self.cache.run_pending_tasks().await;
    }

    pub async fn get(&self, id: &BroadcastId) -> Option<BroadcastBuffer> {
        self.cache.get(id).await
    }

    pub fn contains(&self, id: &BroadcastId) -> bool {
        self.cache.contains_key(id)
    }

    pub async fn invalidate(&self, id: &BroadcastId) {
        self.cache.invalidate(id).await;
    }

    /// Number of cached buffers after pending evictions are applied
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for BroadcastCache {
    fn default() -> Self {
        Self::from_config(&NativeSqlConfig::default())
    }
}
