use pretty_assertions::assert_eq;
use tessel_ir::visitor::collect_vars;
use tessel_ir::{
    Binding, BlockKind, DataType, Expr, FunctionBuilder, Op, PrimExpr, VarInfo, VarKind,
};

use super::{demote_function, ToNonDataflow};
use crate::test_helpers::{call_binding, module_of, mul_add, op, sym_shape, tensor, var_args};
use crate::Pass;

#[test]
fn blocks_become_plain_with_fresh_vars() {
    let (func, [x, y, lv0, gv0]) = mul_add(DataType::Float32);
    let out = demote_function(&func).unwrap();

    assert_eq!(out.blocks().len(), 1);
    assert_eq!(out.blocks()[0].kind(), BlockKind::Plain);
    let bindings = out.blocks()[0].bindings();
    let (new_lv0, product) = call_binding(&bindings[0]);
    let (new_gv0, sum) = call_binding(&bindings[1]);
    assert_ne!(new_lv0, lv0);
    assert_ne!(new_gv0, gv0);
    assert_eq!(out.var(new_lv0).kind, VarKind::Plain);
    assert_eq!(out.var(new_gv0).kind, VarKind::Plain);
    assert_eq!(out.var(new_lv0).name, "lv0");
    assert_eq!(out.var(new_lv0).shape, func.var(lv0).shape);

    assert!(product.is_op(Op::Multiply));
    assert_eq!(product.args, var_args(&[x, y]));
    assert!(sum.is_op(Op::Add));
    assert_eq!(sum.args, var_args(&[new_lv0, y]));
    assert_eq!(out.body(), &Expr::Var(new_gv0));
    assert_eq!(out.params(), func.params());
}

#[test]
fn post_order_vars_are_reallocated() {
    let mut fb = FunctionBuilder::new("main");
    let x = fb.add_param("x", None, Some(tensor(1, DataType::Float32)));
    let mut df = fb.dataflow().unwrap();
    let lv0 = df.emit(Expr::Var(x)).unwrap();
    let gv0 = df.emit_output(Expr::Var(lv0)).unwrap();
    df.finish().unwrap();
    let func = fb.finish(gv0).unwrap();
    assert_eq!(collect_vars(&func), vec![x, x, lv0, lv0, gv0, gv0]);

    let out = demote_function(&func).unwrap();
    let vars = collect_vars(&out);
    assert_eq!(vars.len(), 6);
    assert_eq!(&vars[..2], &[x, x]);
    assert_eq!(vars[2], vars[3]);
    assert_eq!(vars[4], vars[5]);
    assert_ne!(vars[2], lv0);
    assert_ne!(vars[4], gv0);
    assert!(vars.iter().all(|v| out.var(*v).kind == VarKind::Plain));
}

#[test]
fn plain_bindings_keep_identity_and_order() {
    let mut fb = FunctionBuilder::new("main");
    let x = fb.add_param("x", None, Some(tensor(2, DataType::Float32)));
    let gv0 = fb.emit(op(Op::Multiply, [x, x])).unwrap();
    fb.seal_block();
    let mut df = fb.dataflow().unwrap();
    let lv0 = df.emit(op(Op::Add, [gv0, x])).unwrap();
    let gv1 = df.emit_output(op(Op::Add, [lv0, gv0])).unwrap();
    df.finish().unwrap();
    let gv2 = fb.emit(op(Op::Multiply, [gv1, gv0])).unwrap();
    let func = fb.finish(gv2).unwrap();

    let out = demote_function(&func).unwrap();
    assert_eq!(out.blocks().len(), 3);
    assert!(out.blocks().iter().all(|b| b.kind() == BlockKind::Plain));
    assert_eq!(out.blocks()[0], func.blocks()[0]);

    let new_gv1 = out.blocks()[1].bindings()[1].var().unwrap();
    assert_ne!(new_gv1, gv1);
    let (last, call) = call_binding(&out.blocks()[2].bindings()[0]);
    assert_eq!(last, gv2);
    assert_eq!(call.args, var_args(&[new_gv1, gv0]));
    assert_eq!(out.body(), &Expr::Var(gv2));
}

#[test]
fn match_shape_var_is_reallocated() {
    let mut fb = FunctionBuilder::new("main");
    let n = fb.sym_var("n");
    let x = fb.add_param("x", None, Some(tensor(1, DataType::Float32)));
    let matched = fb.fresh_var(VarInfo {
        name: "lv".to_owned(),
        kind: VarKind::Dataflow,
        shape: Some(sym_shape(&[n])),
        ty: Some(tensor(1, DataType::Float32)),
    });
    let mut df = fb.dataflow().unwrap();
    df.push_binding(Binding::MatchShape {
        var: Some(matched),
        value: x.into(),
        pattern: vec![PrimExpr::Var(n)],
    })
    .unwrap();
    let gv0 = df.emit_output(Expr::Var(matched)).unwrap();
    df.finish().unwrap();
    let func = fb.finish(gv0).unwrap();

    let out = demote_function(&func).unwrap();
    let bindings = out.blocks()[0].bindings();
    let Binding::MatchShape { var, pattern, .. } = &bindings[0] else {
        unreachable!("first binding is the match_shape");
    };
    let fresh = var.unwrap();
    assert_ne!(fresh, matched);
    assert_eq!(out.var(fresh).kind, VarKind::Plain);
    assert_eq!(pattern, &vec![PrimExpr::Var(n)]);
    assert_eq!(bindings[1].value(), &Expr::Var(fresh));
}

#[test]
fn demoted_var_count_matches() {
    let (func, _) = mul_add(DataType::Float16);
    let before = func.bindings().filter_map(|b| b.var()).count();
    let out = ToNonDataflow.run(&module_of(func)).unwrap();
    let out = out.function("main").unwrap();
    let after = out
        .bindings()
        .filter_map(|b| b.var())
        .filter(|v| out.var(*v).kind == VarKind::Plain)
        .count();
    assert_eq!(before, after);
}
