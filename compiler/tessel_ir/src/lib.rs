//! Tessel IR - Dataflow Tensor Intermediate Representation
//!
//! This crate contains the data model shared by every Tessel lowering pass:
//! - Element types, static types and symbolic shapes
//! - Value expressions, bindings, blocks, functions and modules
//! - The scalar shape functions produced by VM shape lowering
//! - An incremental builder, the only way to construct a [`Function`]
//! - Structural equality, post-order traversal and well-formedness checks
//!
//! # Design Philosophy
//!
//! - **Arenas per function**: variables and shape variables are `u32` indices
//!   into the owning function's arenas. A rewritten function inherits its
//!   source's arenas append-only, so identity survives a pass.
//! - **Immutable values**: passes never mutate their input; they build a new
//!   function through [`FunctionBuilder::rewrite`].
//! - **Closed node sets**: expressions, operators and attributes are enums
//!   dispatched by exhaustive `match`.
//!
//! Floats are stored as u64 bits so every node is `Eq + Hash`.

/// Compile-time assertion that a type has a specific size.
///
/// Used to prevent accidental size regressions in frequently-copied types.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

pub mod builder;
mod dtype;
mod error;
pub mod expr;
mod function;
pub mod infer;
mod module;
mod prim;
pub mod printer;
mod scalar;
pub mod structural_eq;
mod ty;
pub mod visitor;
pub mod well_formed;

#[cfg(test)]
mod test_helpers;

pub use builder::{DataflowScope, FunctionBuilder};
pub use dtype::DataType;
pub use error::{BuildError, WellFormedError};
pub use expr::{
    Call, CallAttrs, Callee, Constant, Device, DeviceKind, Expr, ExternFunc, GlobalVar, Op,
    ShapeSlot, VarId, VarInfo, VarKind,
};
pub use function::{Binding, Block, BlockKind, Function};
pub use module::{Module, ModuleItem};
pub use prim::{PrimBinOp, PrimExpr, ShapeExpr, SymVarId, SymVarInfo};
pub use scalar::{ScalarEvalError, ScalarExpr, ScalarFunction, ScalarStmt};
pub use structural_eq::{
    functions_structurally_equal, modules_structurally_equal, shapes_equal, structurally_equal,
};
pub use ty::Type;

static_assert_size!(VarId, 4);
static_assert_size!(SymVarId, 4);
