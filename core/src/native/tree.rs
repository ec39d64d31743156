//! Serialisable native function trees.

use nativesql_common::error::{CommonError, Result};
use serde::{Deserialize, Serialize};

use super::TreeBuilder;
use super::functions;
use crate::expression::Literal;
use crate::types::{DataType, Field};

/// One node of a native function tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TreeNode {
    Field {
        index: usize,
        field: Field,
    },
    Literal {
        value: Literal,
    },
    Function {
        name: String,
        children: Vec<TreeNode>,
        return_type: DataType,
    },
    And {
        children: Vec<TreeNode>,
    },
    Or {
        children: Vec<TreeNode>,
    },
}

impl TreeNode {
    /// Type of the value slot this node produces.
    pub fn return_type(&self) -> DataType {
        match self {
            TreeNode::Field { field, .. } => field.data_type,
            TreeNode::Literal { value } => value.data_type(),
            TreeNode::Function { return_type, .. } => *return_type,
            TreeNode::And { .. } | TreeNode::Or { .. } => DataType::Boolean,
        }
    }

    pub fn children(&self) -> &[TreeNode] {
        match self {
            TreeNode::Field { .. } | TreeNode::Literal { .. } => &[],
            TreeNode::Function { children, .. }
            | TreeNode::And { children }
            | TreeNode::Or { children } => children,
        }
    }

    /// Function name for function nodes, `None` otherwise.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            TreeNode::Function { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(TreeNode::node_count)
            .sum::<usize>()
    }
}

/// Builds [`TreeNode`] values, checking function names and arity against the
/// native function registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeNodeBuilder;

impl TreeNodeBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl TreeBuilder for TreeNodeBuilder {
    type Node = TreeNode;

    fn make_field(&self, index: usize, field: &Field) -> Result<TreeNode> {
        Ok(TreeNode::Field {
            index,
            field: field.clone(),
        })
    }

    fn make_literal(&self, literal: &Literal) -> Result<TreeNode> {
        Ok(TreeNode::Literal {
            value: literal.clone(),
        })
    }

    fn make_and(&self, children: Vec<TreeNode>) -> Result<TreeNode> {
        if children.is_empty() {
            return Err(CommonError::native_error("and() needs at least one operand"));
        }
        Ok(TreeNode::And { children })
    }

    fn make_or(&self, children: Vec<TreeNode>) -> Result<TreeNode> {
        if children.is_empty() {
            return Err(CommonError::native_error("or() needs at least one operand"));
        }
        Ok(TreeNode::Or { children })
    }

    fn make_function(
        &self,
        name: &str,
        children: Vec<TreeNode>,
        return_type: &DataType,
    ) -> Result<TreeNode> {
        let signature = functions::lookup(name).ok_or_else(|| {
            CommonError::native_error(format!("Unknown native function '{}'", name))
        })?;
        if signature.arity != children.len() {
            return Err(CommonError::native_error(format!(
                "Native function '{}' takes {} operands, got {}",
                name,
                signature.arity,
                children.len()
            )));
        }
        if signature.returns_boolean && *return_type != DataType::Boolean {
            return Err(CommonError::native_error(format!(
                "Native function '{}' returns boolean, not {}",
                name, return_type
            )));
        }
        Ok(TreeNode::Function {
            name: name.to_string(),
            children,
            return_type: *return_type,
        })
    }
}

/// A compiled root plus the field describing its output, the unit a native
/// engine instantiates a projector or filter from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ExpressionTree {
    pub root: TreeNode,
    pub result: Field,
}

impl ExpressionTree {
    pub fn new(root: TreeNode, result_name: impl Into<String>) -> Self {
        let result = Field::new(result_name, root.return_type(), true);
        Self { root, result }
    }

    /// Encode for hand-off to the native engine.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, bincode::config::standard()).map_err(|e| {
            CommonError::serialization_error(format!("Failed to encode expression tree: {}", e))
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (tree, _): (Self, usize) =
            bincode::decode_from_slice(bytes, bincode::config::standard()).map_err(|e| {
                CommonError::deserialization_error(format!(
                    "Failed to decode expression tree: {}",
                    e
                ))
            })?;
        Ok(tree)
    }

    /// Pretty JSON rendering, used when explaining a plan.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            CommonError::serialization_error_with_source("Failed to render expression tree", e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_field(name: &str) -> Field {
        Field::new(name, DataType::Int32, true)
    }

    #[test]
    fn test_function_arity_and_names_are_checked() {
        let builder = TreeNodeBuilder::new();
        let a = builder.make_field(0, &int_field("a")).unwrap();
        let b = builder.make_field(1, &int_field("b")).unwrap();

        let node = builder
            .make_function(functions::EQUAL, vec![a.clone(), b.clone()], &DataType::Boolean)
            .unwrap();
        assert_eq!(node.function_name(), Some("equal"));
        assert_eq!(node.return_type(), DataType::Boolean);

        assert!(matches!(
            builder.make_function("equals", vec![a.clone(), b.clone()], &DataType::Boolean),
            Err(CommonError::NativeError { .. })
        ));
        assert!(matches!(
            builder.make_function(functions::EQUAL, vec![a.clone()], &DataType::Boolean),
            Err(CommonError::NativeError { .. })
        ));
        assert!(matches!(
            builder.make_function(functions::LESS_THAN, vec![a, b], &DataType::Int32),
            Err(CommonError::NativeError { .. })
        ));
    }

    #[test]
    fn test_empty_conjunction_is_rejected() {
        let builder = TreeNodeBuilder::new();
        assert!(builder.make_and(vec![]).is_err());
        assert!(builder.make_or(vec![]).is_err());
    }

    #[test]
    fn test_expression_tree_encoding() {
        let builder = TreeNodeBuilder::new();
        let root = builder
            .make_and(vec![
                builder
                    .make_function(
                        functions::GREATER_THAN,
                        vec![
                            builder.make_field(0, &int_field("x")).unwrap(),
                            builder.make_literal(&Literal::Int32(5)).unwrap(),
                        ],
                        &DataType::Boolean,
                    )
                    .unwrap(),
                builder.make_literal(&Literal::Boolean(true)).unwrap(),
            ])
            .unwrap();
        let tree = ExpressionTree::new(root, "keep");
        assert_eq!(tree.result.data_type, DataType::Boolean);
        assert_eq!(tree.root.node_count(), 5);

        let decoded = ExpressionTree::from_bytes(&tree.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, tree);

        let json = tree.to_json().unwrap();
        assert!(json.contains("\"kind\": \"function\""));
        assert!(json.contains("greater_than"));
    }

    #[test]
    fn test_truncated_bytes_fail_to_decode() {
        let tree = ExpressionTree::new(TreeNode::Literal { value: Literal::Int64(7) }, "c");
        let bytes = tree.to_bytes().unwrap();
        assert!(ExpressionTree::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
