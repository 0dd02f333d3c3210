//! Shared test fixtures for the IR crate. Only compiled in test builds.

use crate::{
    Call, DataType, Expr, Function, FunctionBuilder, Op, PrimExpr, ShapeExpr, SymVarId, Type,
    VarId,
};

/// Shorthand for a `float32` tensor type of `rank`.
pub(crate) fn f32_tensor(rank: usize) -> Type {
    Type::tensor(rank, DataType::Float32)
}

/// A shape whose dimensions are exactly `syms`.
pub(crate) fn sym_shape(syms: &[SymVarId]) -> ShapeExpr {
    syms.iter().copied().map(PrimExpr::Var).collect()
}

/// Shorthand for an operator call.
pub(crate) fn op(op: Op, args: impl IntoIterator<Item = VarId>) -> Call {
    Call::op(op, args.into_iter().map(Expr::Var).collect())
}

/// `main(x, y: (m, n) float32) { dataflow { lv0 = x * y; gv0 = lv0 + y } return gv0 }`
///
/// Returns the function together with `[x, y, lv0, gv0]`.
#[expect(clippy::unwrap_used, reason = "fixture construction cannot fail")]
pub(crate) fn mul_add() -> (Function, [VarId; 4]) {
    let mut fb = FunctionBuilder::new("main");
    let m = fb.sym_var("m");
    let n = fb.sym_var("n");
    let x = fb.add_param("x", Some(sym_shape(&[m, n])), Some(f32_tensor(2)));
    let y = fb.add_param("y", Some(sym_shape(&[m, n])), Some(f32_tensor(2)));
    let mut df = fb.dataflow().unwrap();
    let lv0 = df.emit(op(Op::Multiply, [x, y])).unwrap();
    let gv0 = df.emit_output(op(Op::Add, [lv0, y])).unwrap();
    df.finish().unwrap();
    (fb.finish(gv0).unwrap(), [x, y, lv0, gv0])
}
