//! Shared test fixtures for the lowering passes. Only compiled in test builds.

use tessel_ir::{
    Binding, Call, DataType, Expr, ExternFunc, Function, FunctionBuilder, Module, Op, PrimExpr,
    ShapeExpr, SymVarId, Type, VarId,
};

pub(crate) fn tensor(rank: usize, dtype: DataType) -> Type {
    Type::tensor(rank, dtype)
}

/// A shape whose dimensions are exactly `syms`.
pub(crate) fn sym_shape(syms: &[SymVarId]) -> ShapeExpr {
    syms.iter().copied().map(PrimExpr::Var).collect()
}

/// Shorthand for an operator call over variables.
pub(crate) fn op(op: Op, args: impl IntoIterator<Item = VarId>) -> Call {
    Call::op(op, args.into_iter().map(Expr::Var).collect())
}

/// Single-function module.
pub(crate) fn module_of(func: Function) -> Module {
    std::iter::once(func).collect()
}

/// The `(var, call)` of a `var = call(...)` binding.
pub(crate) fn call_binding(binding: &Binding) -> (VarId, &Call) {
    match binding {
        Binding::Var {
            var,
            value: Expr::Call(call),
        } => (*var, call),
        other => panic!("expected a call binding, found {other:?}"),
    }
}

/// Variables as call arguments.
pub(crate) fn var_args(vars: &[VarId]) -> Vec<Expr> {
    vars.iter().copied().map(Expr::Var).collect()
}

/// `main(x, y: (m, n) dtype) { dataflow { lv0 = x * y; gv0 = lv0 + y } return gv0 }`
///
/// Returns the function together with `[x, y, lv0, gv0]`.
#[expect(clippy::unwrap_used, reason = "fixture construction cannot fail")]
pub(crate) fn mul_add(dtype: DataType) -> (Function, [VarId; 4]) {
    let mut fb = FunctionBuilder::new("main");
    let m = fb.sym_var("m");
    let n = fb.sym_var("n");
    let x = fb.add_param("x", Some(sym_shape(&[m, n])), Some(tensor(2, dtype)));
    let y = fb.add_param("y", Some(sym_shape(&[m, n])), Some(tensor(2, dtype)));
    let mut df = fb.dataflow().unwrap();
    let lv0 = df.emit(op(Op::Multiply, [x, y])).unwrap();
    let gv0 = df.emit_output(op(Op::Add, [lv0, y])).unwrap();
    df.finish().unwrap();
    (fb.finish(gv0).unwrap(), [x, y, lv0, gv0])
}

/// ```text
/// main(x: (m, n) float32) {
///   dataflow { gv0 = call_dps((m, n), extern(symbol), (x,)) }
///   return gv0
/// }
/// ```
///
/// Returns the function together with `[x, gv0]`.
#[expect(clippy::unwrap_used, reason = "fixture construction cannot fail")]
pub(crate) fn dps_identity(symbol: &str) -> (Function, [VarId; 2]) {
    let mut fb = FunctionBuilder::new("main");
    let m = fb.sym_var("m");
    let n = fb.sym_var("n");
    let x = fb.add_param(
        "x",
        Some(sym_shape(&[m, n])),
        Some(tensor(2, DataType::Float32)),
    );
    let mut df = fb.dataflow().unwrap();
    let gv0 = df
        .emit_output(Call::op(
            Op::CallDps,
            vec![
                sym_shape(&[m, n]).into(),
                Expr::ExternFunc(ExternFunc::new(symbol)),
                Expr::Tuple(vec![x.into()]),
            ],
        ))
        .unwrap();
    df.finish().unwrap();
    (fb.finish(gv0).unwrap(), [x, gv0])
}
