//! Native function-tree construction.
//!
//! The compiler talks to a native engine only through [`TreeBuilder`]. Two
//! builders ship with the crate: [`TreeNodeBuilder`] produces a serialisable
//! tree for hand-off to an external engine, and [`PhysicalExprBuilder`]
//! produces DataFusion physical expressions that evaluate in-process.

pub mod filter;
pub mod functions;
pub mod physical;
pub mod tree;

use nativesql_common::error::Result;

use crate::expression::Literal;
use crate::types::{DataType, Field};

pub use filter::NativeFilter;
pub use physical::PhysicalExprBuilder;
pub use tree::{ExpressionTree, TreeNode, TreeNodeBuilder};

/// Builder API of a native computation-tree engine.
///
/// Nodes are opaque to the compiler; a parent node is only ever built from
/// children this builder returned earlier.
pub trait TreeBuilder {
    type Node;

    /// A reference to input column `index`.
    fn make_field(&self, index: usize, field: &Field) -> Result<Self::Node>;

    /// A constant.
    fn make_literal(&self, literal: &Literal) -> Result<Self::Node>;

    /// Logical conjunction over any number of boolean operands.
    fn make_and(&self, children: Vec<Self::Node>) -> Result<Self::Node>;

    /// Logical disjunction over any number of boolean operands.
    fn make_or(&self, children: Vec<Self::Node>) -> Result<Self::Node>;

    /// Application of the named native function.
    fn make_function(
        &self,
        name: &str,
        children: Vec<Self::Node>,
        return_type: &DataType,
    ) -> Result<Self::Node>;
}
