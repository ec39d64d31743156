//! Per-partition metrics of the broadcast batch reader.

use datafusion::physical_plan::metrics::{Count, ExecutionPlanMetricsSet, MetricBuilder, Time};

pub const OUTPUT_BATCHES: &str = "output_batches";
pub const DESERIALIZE_TIME: &str = "deserialize_time";

/// Handles registered in an [`ExecutionPlanMetricsSet`] for one partition.
#[derive(Debug, Clone)]
pub struct BroadcastMetrics {
    /// Rows handed to the consumer
    pub output_rows: Count,
    /// Batches handed to the consumer
    pub output_batches: Count,
    /// Time spent decoding blocks
    pub deserialize_time: Time,
}

impl BroadcastMetrics {
    pub fn new(metrics: &ExecutionPlanMetricsSet, partition: usize) -> Self {
        Self {
            output_rows: MetricBuilder::new(metrics).output_rows(partition),
            output_batches: MetricBuilder::new(metrics).counter(OUTPUT_BATCHES, partition),
            deserialize_time: MetricBuilder::new(metrics).subset_time(DESERIALIZE_TIME, partition),
        }
    }

    pub fn record_batch(&self, num_rows: usize) {
        self.output_rows.add(num_rows);
        self.output_batches.add(1);
    }
}
