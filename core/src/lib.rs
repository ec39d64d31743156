//! NativeSQL Core - columnar expression compilation and broadcast batch
//! distribution for a native SQL engine
//!
//! Two pieces make up the core: the expression compiler, which lowers
//! analysed predicate trees into native function trees through a pluggable
//! [`native::TreeBuilder`], and the broadcast columnar RDD, which turns one
//! shared buffer of serialized Arrow batches into independently consumable
//! partitions.

pub mod broadcast;
pub mod codec;
pub mod compiler;
pub mod expression;
pub mod metrics;
pub mod native;
pub mod rdd;
pub mod traits;
pub mod types;

pub use broadcast::{
    BroadcastBuffer, BroadcastCache, BroadcastId, BroadcastManager, BroadcastVariable,
};
pub use codec::{ArrowIpcCodec, BatchCodec, BatchReader};
pub use compiler::{ColumnarExpression, ExpressionCompiler};
pub use expression::{BinaryOperator, Expr, Literal, UnaryOperator};
pub use metrics::BroadcastMetrics;
pub use native::{
    ExpressionTree, NativeFilter, PhysicalExprBuilder, TreeBuilder, TreeNode, TreeNodeBuilder,
};
pub use rdd::{BroadcastColumnarRdd, ColumnarBatchIterator};
pub use traits::{BroadcastPartition, ColumnarRdd, Partition};
pub use types::{DataType, Field};
