//! Broadcast Filter Example
//!
//! Builds a broadcast buffer from a few Arrow batches, compiles a predicate
//! into a native tree and filters every partition of the broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use datafusion::arrow::array::{ArrayRef, Float64Array, Int64Array};
use datafusion::arrow::datatypes::{DataType as ArrowDataType, Field as ArrowField, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::physical_plan::metrics::ExecutionPlanMetricsSet;
use nativesql_common::config::{self, NativeSqlConfig};
use nativesql_core::broadcast::{BroadcastBuffer, BroadcastManager};
use nativesql_core::codec::ArrowIpcCodec;
use nativesql_core::compiler::ExpressionCompiler;
use nativesql_core::expression::{and, col, gt_eq, is_not_null, lit};
use nativesql_core::native::{NativeFilter, TreeNodeBuilder};
use nativesql_core::rdd::BroadcastColumnarRdd;
use nativesql_core::traits::ColumnarRdd;
use nativesql_core::types::{DataType, Field};
use tracing::info;

fn price_batch(
    ids: Vec<i64>,
    prices: Vec<Option<f64>>,
) -> Result<RecordBatch, Box<dyn std::error::Error>> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("id", ArrowDataType::Int64, false),
        ArrowField::new("price", ArrowDataType::Float64, true),
    ]));
    let ids: ArrayRef = Arc::new(Int64Array::from(ids));
    let prices: ArrayRef = Arc::new(Float64Array::from(prices));
    Ok(RecordBatch::try_new(schema, vec![ids, prices])?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("=== NativeSQL Broadcast Filter Example ===");

    let settings = HashMap::from([
        (config::COMPRESSION_CODEC.to_string(), "zstd".to_string()),
        (config::ZSTD_LEVEL.to_string(), "3".to_string()),
    ]);
    let config = NativeSqlConfig::from_map(&settings)?;
    let codec = Arc::new(ArrowIpcCodec::from_config(&config)?);

    let groups = vec![
        vec![price_batch(vec![1, 2, 3], vec![Some(9.5), None, Some(20.0)])?],
        vec![price_batch(vec![4, 5], vec![Some(10.0), Some(3.25)])?],
    ];
    let manager = BroadcastManager::new();
    let id = manager
        .register(BroadcastBuffer::from_batches(codec.as_ref(), &groups)?)
        .await;

    let fields = vec![
        Field::new("id", DataType::Int64, false),
        Field::new("price", DataType::Float64, true),
    ];
    let condition = and(is_not_null(col("price")), gt_eq(col("price"), lit(10.0)));

    let tree = ExpressionCompiler::new(TreeNodeBuilder::new()).compile_tree(
        &condition,
        &fields,
        "keep",
    )?;
    info!("Native tree for {}:\n{}", condition, tree.to_json()?);

    let Some(buffer) = manager.get(&id).await else {
        return Err(format!("{} was not registered", id).into());
    };
    let rdd = BroadcastColumnarRdd::new(3, ExecutionPlanMetricsSet::new(), buffer, codec)
        .with_schema(fields.clone());
    let filter = NativeFilter::try_new(&condition, fields)?;

    for partition in rdd.partitions() {
        let mut kept = 0;
        for batch in rdd.compute(partition.as_ref())? {
            kept += filter.filter(&batch?)?.num_rows();
        }
        info!("{}: {} rows kept", partition.id(), kept);
    }

    info!(
        "Output rows across partitions: {:?}",
        rdd.metrics().clone_inner().output_rows()
    );
    manager.remove(&id).await;

    Ok(())
}
