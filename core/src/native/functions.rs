//! Names of the native functions emitted by the compiler.
//!
//! A native backend plugged in behind a tree builder must recognise exactly
//! these identifiers with the listed arity.

pub const EQUAL: &str = "equal";
pub const LESS_THAN: &str = "less_than";
pub const LESS_THAN_OR_EQUAL_TO: &str = "less_than_or_equal_to";
pub const GREATER_THAN: &str = "greater_than";
pub const GREATER_THAN_OR_EQUAL_TO: &str = "greater_than_or_equal_to";
pub const ADD: &str = "add";
pub const SUBTRACT: &str = "subtract";
pub const MULTIPLY: &str = "multiply";
pub const DIVIDE: &str = "divide";
pub const MOD: &str = "mod";
pub const NOT: &str = "not";
pub const IS_NULL: &str = "isnull";
pub const IS_NOT_NULL: &str = "isnotnull";

/// Shape of a registered native function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: &'static str,
    pub arity: usize,
    /// True when the function always returns a boolean.
    pub returns_boolean: bool,
}

const fn signature(name: &'static str, arity: usize, returns_boolean: bool) -> FunctionSignature {
    FunctionSignature {
        name,
        arity,
        returns_boolean,
    }
}

const REGISTRY: &[FunctionSignature] = &[
    signature(EQUAL, 2, true),
    signature(LESS_THAN, 2, true),
    signature(LESS_THAN_OR_EQUAL_TO, 2, true),
    signature(GREATER_THAN, 2, true),
    signature(GREATER_THAN_OR_EQUAL_TO, 2, true),
    signature(ADD, 2, false),
    signature(SUBTRACT, 2, false),
    signature(MULTIPLY, 2, false),
    signature(DIVIDE, 2, false),
    signature(MOD, 2, false),
    signature(NOT, 1, true),
    signature(IS_NULL, 1, true),
    signature(IS_NOT_NULL, 1, true),
];

/// Look up a native function by name.
pub fn lookup(name: &str) -> Option<&'static FunctionSignature> {
    REGISTRY.iter().find(|signature| signature.name == name)
}

/// All registered native functions.
pub fn registered() -> &'static [FunctionSignature] {
    REGISTRY
}
