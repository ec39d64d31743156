//! RDD that replays a broadcast buffer of serialized batches on every partition

use std::iter::FusedIterator;
use std::sync::Arc;

use datafusion::arrow::record_batch::RecordBatch;
use datafusion::physical_plan::metrics::ExecutionPlanMetricsSet;
use nativesql_common::error::{CommonError, Result};
use rayon::prelude::*;
use tracing::debug;

use crate::broadcast::BroadcastBuffer;
use crate::codec::{BatchCodec, BatchReader};
use crate::metrics::BroadcastMetrics;
use crate::traits::{BroadcastPartition, ColumnarRdd, Partition};
use crate::types::Field;

/// Every partition yields the full content of the broadcast buffer.
///
/// Partitions share one immutable buffer, so `compute` may run on any number
/// of threads at once without coordination.
#[derive(Debug, Clone)]
pub struct BroadcastColumnarRdd {
    num_partitions: usize,
    metrics: ExecutionPlanMetricsSet,
    broadcast: BroadcastBuffer,
    codec: Arc<dyn BatchCodec>,
    schema: Vec<Field>,
}

impl BroadcastColumnarRdd {
    pub fn new(
        num_partitions: usize,
        metrics: ExecutionPlanMetricsSet,
        broadcast: BroadcastBuffer,
        codec: Arc<dyn BatchCodec>,
    ) -> Self {
        Self {
            num_partitions,
            metrics,
            broadcast,
            codec,
            schema: Vec::new(),
        }
    }

    /// Enforce `schema` on every decoded batch instead of trusting the schema
    /// embedded in each block.
    pub fn with_schema(mut self, schema: Vec<Field>) -> Self {
        self.schema = schema;
        self
    }

    pub fn metrics(&self) -> &ExecutionPlanMetricsSet {
        &self.metrics
    }

    pub fn broadcast(&self) -> &BroadcastBuffer {
        &self.broadcast
    }

    /// Compute every partition on the rayon pool and gather the batches,
    /// one entry per partition.
    pub fn collect(&self) -> Result<Vec<Vec<RecordBatch>>> {
        (0..self.num_partitions)
            .into_par_iter()
            .map(|index| {
                self.compute(&BroadcastPartition::new(index))?
                    .collect::<Result<Vec<_>>>()
            })
            .collect()
    }
}

impl ColumnarRdd for BroadcastColumnarRdd {
    fn num_partitions(&self) -> usize {
        self.num_partitions
    }

    fn compute(&self, partition: &dyn Partition) -> Result<ColumnarBatchIterator> {
        let index = partition.index();
        if index >= self.num_partitions {
            return Err(CommonError::invalid_partition_error(format!(
                "{} is out of range for {} partitions",
                partition.id(),
                self.num_partitions
            )));
        }

        let reader = self
            .codec
            .deserialize(&self.schema, self.broadcast.shared())
            .map_err(|e| e.with_context_prefix(format!("partition {}", index)))?;
        debug!(
            "Computing {} from {} ({} blocks)",
            partition.id(),
            self.broadcast.id(),
            self.broadcast.num_blocks()
        );
        Ok(ColumnarBatchIterator::new(
            index,
            reader,
            BroadcastMetrics::new(&self.metrics, index),
        ))
    }
}

/// Batches of one partition.
///
/// The underlying reader is closed as soon as the iterator is exhausted, hits
/// an error, is closed explicitly, or is dropped, whichever happens first.
pub struct ColumnarBatchIterator {
    partition: usize,
    reader: Option<Box<dyn BatchReader>>,
    metrics: BroadcastMetrics,
}

impl ColumnarBatchIterator {
    pub fn new(partition: usize, reader: Box<dyn BatchReader>, metrics: BroadcastMetrics) -> Self {
        Self {
            partition,
            reader: Some(reader),
            metrics,
        }
    }

    pub fn partition(&self) -> usize {
        self.partition
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Release the reader and everything it holds. Idempotent.
    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
            debug!("Closed batch iterator of partition {}", self.partition);
        }
    }
}

impl Iterator for ColumnarBatchIterator {
    type Item = Result<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let timer = self.metrics.deserialize_time.timer();
        let next = reader.next();
        timer.done();

        match next {
            Some(Ok(batch)) => {
                self.metrics.record_batch(batch.num_rows());
                Some(Ok(batch))
            }
            Some(Err(e)) => {
                self.close();
                Some(Err(e.with_context_prefix(format!("partition {}", self.partition))))
            }
            None => {
                self.close();
                None
            }
        }
    }
}

impl FusedIterator for ColumnarBatchIterator {}

impl Drop for ColumnarBatchIterator {
    fn drop(&mut self) {
        self.close();
    }
}
