//! Combinational expressions inside a module definition.

use crate::ids::{ChannelId, ExprId, TypeId};
use serde::{Deserialize, Serialize};

/// A combinational expression node. Operands refer to other nodes of the same
/// module definition.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Expr {
    /// A constant bit pattern.
    Const(u64),
    /// The module input port at this position.
    Port(u32),
    /// The payload of a channel in this module.
    ChannelData(ChannelId),
    /// The `valid` signal of a channel in this module.
    ChannelValid(ChannelId),
    /// The `ready` signal of a channel in this module.
    ChannelReady(ChannelId),
    /// A struct built from field values, in the struct type's field order.
    Struct(Vec<ExprId>),
    /// Field `index` of a struct value.
    Field {
        /// The struct-typed operand.
        base: ExprId,
        /// Position of the field in the struct type.
        index: u32,
    },
    /// Single-bit AND.
    And(ExprId, ExprId),
    /// Single-bit OR.
    Or(ExprId, ExprId),
    /// Single-bit NOT.
    Not(ExprId),
    /// Result `index` of the builtin instance at position `builtin`.
    BuiltinResult {
        /// Position in the module's builtin list.
        builtin: u32,
        /// Position in the builtin's result list.
        index: u32,
    },
}

/// A typed handle to an expression, as handed to construction functions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Value {
    /// The expression node.
    pub expr: ExprId,
    /// The interned type of the expression.
    pub ty: TypeId,
}

impl Value {
    /// Creates a value handle.
    pub fn new(expr: ExprId, ty: TypeId) -> Self {
        Self { expr, ty }
    }
}
