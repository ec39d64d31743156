//! End-to-end tests: compile predicates and run them over broadcast partitions

mod common;

use std::sync::Arc;

use common::{create_test_fields, create_test_groups};
use datafusion::arrow::array::Int32Array;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::physical_plan::metrics::ExecutionPlanMetricsSet;
use nativesql_common::error::{CommonError, Result};
use nativesql_core::broadcast::BroadcastBuffer;
use nativesql_core::codec::ArrowIpcCodec;
use nativesql_core::compiler::ExpressionCompiler;
use nativesql_core::expression::{
    BinaryOperator, Expr, Literal, and, col, eq_null_safe, gt_eq, is_not_null, lit, lt, or,
};
use nativesql_core::native::{ExpressionTree, NativeFilter, TreeNode, TreeNodeBuilder};
use nativesql_core::rdd::BroadcastColumnarRdd;
use nativesql_core::traits::ColumnarRdd;
use nativesql_core::types::{DataType, Field};

fn create_rdd(num_partitions: usize) -> BroadcastColumnarRdd {
    let codec = Arc::new(ArrowIpcCodec::new());
    let buffer = BroadcastBuffer::from_batches(codec.as_ref(), &create_test_groups()).unwrap();
    BroadcastColumnarRdd::new(num_partitions, ExecutionPlanMetricsSet::new(), buffer, codec)
}

fn filtered_x(rdd: &BroadcastColumnarRdd, filter: &NativeFilter) -> Vec<Vec<i32>> {
    rdd.partitions()
        .iter()
        .map(|partition| {
            let batches = rdd
                .compute(partition.as_ref())
                .unwrap()
                .map(|batch| filter.filter(&batch?))
                .collect::<Result<Vec<RecordBatch>>>()
                .unwrap();
            batches
                .iter()
                .flat_map(|batch| {
                    let x = batch
                        .column(0)
                        .as_any()
                        .downcast_ref::<Int32Array>()
                        .unwrap();
                    x.iter().flatten().collect::<Vec<_>>()
                })
                .collect()
        })
        .collect()
}

#[test]
fn test_compiled_tree_for_greater_than_or_equal() {
    let compiler = ExpressionCompiler::new(TreeNodeBuilder::new());
    let fields = vec![Field::new("col_x", DataType::Int32, true)];
    let tree = compiler
        .compile_tree(&gt_eq(col("col_x"), lit(5)), &fields, "keep")
        .unwrap();

    match &tree.root {
        TreeNode::Function {
            name,
            children,
            return_type,
        } => {
            assert_eq!(name, "greater_than_or_equal_to");
            assert_eq!(children.len(), 2);
            assert_eq!(*return_type, DataType::Boolean);
            assert!(matches!(children[0], TreeNode::Field { index: 0, .. }));
            assert_eq!(
                children[1],
                TreeNode::Literal {
                    value: Literal::Int32(5)
                }
            );
        }
        other => panic!("unexpected root: {other:?}"),
    }

    let decoded = ExpressionTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();
    assert_eq!(decoded, tree);
    assert!(tree.to_json().unwrap().contains("\"col_x\""));
}

#[test]
fn test_filter_every_broadcast_partition() {
    let rdd = create_rdd(3);
    let filter = NativeFilter::try_new(&gt_eq(col("x"), lit(5)), create_test_fields()).unwrap();
    let kept = filtered_x(&rdd, &filter);
    assert_eq!(kept.len(), 3);
    for partition in kept {
        assert_eq!(partition, vec![5, 9, 7, 6, 5]);
    }
}

#[test]
fn test_compound_predicate_over_broadcast() {
    let rdd = create_rdd(1);
    let condition = or(
        lt(col("x"), lit(2)),
        and(is_not_null(col("name")), gt_eq(col("x"), lit(7))),
    );
    let filter = NativeFilter::try_new(&condition, create_test_fields()).unwrap();
    assert_eq!(filtered_x(&rdd, &filter), vec![vec![1, 9, 7]]);
}

#[test]
fn test_null_safe_equality_matches_no_null_rows() {
    // Lowered to plain equality, so NULL <=> NULL is not true.
    let rdd = create_rdd(1);
    let condition = eq_null_safe(col("x"), lit(Literal::Null(DataType::Int32)));
    let filter = NativeFilter::try_new(&condition, create_test_fields()).unwrap();
    assert_eq!(filtered_x(&rdd, &filter), vec![Vec::<i32>::new()]);
}

#[test]
fn test_unsupported_predicate_is_rejected_before_execution() {
    let condition = gt_eq(
        Expr::binary(BinaryOperator::BitwiseOr, col("x"), lit(1)),
        lit(5),
    );
    assert!(matches!(
        NativeFilter::try_new(&condition, create_test_fields()),
        Err(CommonError::UnsupportedOperatorError { .. })
    ));
}
