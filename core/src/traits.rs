//! Core traits for partitioned columnar operators
//!
//! An operator exposes a fixed list of partitions and computes each one into
//! a single-pass iterator of Arrow batches.

use std::fmt::Debug;
use std::sync::Arc;

use nativesql_common::error::Result;
use serde::{Deserialize, Serialize};

use crate::rdd::ColumnarBatchIterator;

/// Partition represents a logical partition of an operator's output
pub trait Partition: Send + Sync + Debug {
    /// Get the partition index
    fn index(&self) -> usize;

    /// Get a unique identifier for this partition
    fn id(&self) -> String {
        format!("partition_{}", self.index())
    }
}

/// Partition of an operator that replays a broadcast buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BroadcastPartition {
    index: usize,
}

impl BroadcastPartition {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

impl Partition for BroadcastPartition {
    fn index(&self) -> usize {
        self.index
    }
}

/// Operators producing columnar batches partition by partition.
pub trait ColumnarRdd: Send + Sync + Debug {
    /// Get the number of partitions
    fn num_partitions(&self) -> usize;

    /// Get the list of partitions, indices ascending
    fn partitions(&self) -> Vec<Arc<dyn Partition>> {
        (0..self.num_partitions())
            .map(|i| Arc::new(BroadcastPartition::new(i)) as Arc<dyn Partition>)
            .collect()
    }

    /// Compute the batches of the given partition
    fn compute(&self, partition: &dyn Partition) -> Result<ColumnarBatchIterator>;
}

/// A value that can be shared through a broadcast variable.
pub trait Data:
    Send + Sync + Clone + Debug + Serialize + for<'de> Deserialize<'de> + 'static
{
}
impl<T> Data for T where
    T: Send + Sync + Clone + Debug + Serialize + for<'de> Deserialize<'de> + 'static
{
}
