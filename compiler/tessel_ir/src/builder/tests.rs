use pretty_assertions::assert_eq;

use super::FunctionBuilder;
use crate::test_helpers::{f32_tensor, mul_add, op};
use crate::{
    Binding, BlockKind, BuildError, Call, CallAttrs, DataType, Expr, Op, PrimExpr, ShapeExpr,
    SymVarId, Type, VarInfo, VarKind,
};

// Emission

#[test]
fn emit_names_and_kinds_follow_scope() {
    let (func, [_, _, lv0, gv0]) = mul_add();
    assert_eq!(func.var(lv0).name, "lv0");
    assert_eq!(func.var(lv0).kind, VarKind::Dataflow);
    assert_eq!(func.var(gv0).name, "gv0");
    assert_eq!(func.var(gv0).kind, VarKind::Plain);
    assert_eq!(func.blocks().len(), 1);
    assert_eq!(func.blocks()[0].kind(), BlockKind::Dataflow);
}

#[test]
fn emitted_vars_carry_inferred_annotations() {
    let (func, [x, _, lv0, _]) = mul_add();
    assert_eq!(func.var(lv0).shape, func.var(x).shape);
    assert_eq!(func.var(lv0).ty, Some(f32_tensor(2)));
    let Binding::Var { value, .. } = &func.blocks()[0].bindings()[0] else {
        panic!("expected a var binding");
    };
    assert_eq!(value.as_call().unwrap().shape, func.var(x).shape);
}

#[test]
fn plain_emit_outside_dataflow_makes_plain_block() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", Some(ShapeExpr::from_ints([4])), Some(f32_tensor(1)));
    let gv = fb.emit(op(Op::Add, [x, x])).unwrap();
    let func = fb.finish(gv).unwrap();
    assert_eq!(func.var(gv).kind, VarKind::Plain);
    assert_eq!(func.blocks()[0].kind(), BlockKind::Plain);
}

#[test]
fn seal_block_splits_plain_blocks() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, Some(f32_tensor(1)));
    let a = fb.emit(op(Op::Add, [x, x])).unwrap();
    fb.seal_block();
    let b = fb.emit(op(Op::Add, [a, a])).unwrap();
    let func = fb.finish(b).unwrap();
    assert_eq!(func.blocks().len(), 2);
}

#[test]
fn emit_output_outside_dataflow_fails() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, None);
    assert_eq!(
        fb.emit_output(Expr::Var(x)),
        Err(BuildError::OutputOutsideDataflow)
    );
}

// Dataflow scopes

#[test]
fn nested_dataflow_fails() {
    let mut fb = FunctionBuilder::new("f");
    let mut df = fb.dataflow().unwrap();
    assert!(matches!(df.dataflow(), Err(BuildError::NestedDataflow)));
}

#[test]
fn dataflow_without_output_fails_on_finish() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, Some(f32_tensor(1)));
    let mut df = fb.dataflow().unwrap();
    df.emit(op(Op::Add, [x, x])).unwrap();
    assert_eq!(
        df.finish(),
        Err(BuildError::DataflowWithoutOutput { block: 0 })
    );
}

#[test]
fn dropped_scope_reports_error_from_finish() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, Some(f32_tensor(1)));
    {
        let mut df = fb.dataflow().unwrap();
        df.emit(op(Op::Add, [x, x])).unwrap();
    }
    assert!(!fb.is_in_dataflow());
    assert_eq!(
        fb.finish(x),
        Err(BuildError::DataflowWithoutOutput { block: 0 })
    );
}

#[test]
fn dropped_scope_with_output_closes_cleanly() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, Some(f32_tensor(1)));
    let gv = {
        let mut df = fb.dataflow().unwrap();
        df.emit_output(op(Op::Add, [x, x])).unwrap()
    };
    let func = fb.finish(gv).unwrap();
    assert!(func.blocks()[0].is_dataflow());
}

// Validation

#[test]
fn binding_with_mismatched_shape_fails() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", Some(ShapeExpr::from_ints([4])), Some(f32_tensor(1)));
    let v = fb.fresh_var(VarInfo {
        name: "v".to_owned(),
        kind: VarKind::Plain,
        shape: Some(ShapeExpr::from_ints([5])),
        ty: None,
    });
    assert_eq!(
        fb.emit_binding(v, op(Op::Add, [x, x])),
        Err(BuildError::ShapeMismatch {
            var: "v".to_owned(),
            expected: "(5,)".to_owned(),
            found: "(4,)".to_owned(),
        })
    );
}

#[test]
fn binding_with_mismatched_type_fails() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, Some(f32_tensor(1)));
    let v = fb.fresh_var(VarInfo {
        name: "v".to_owned(),
        kind: VarKind::Plain,
        shape: None,
        ty: Some(Type::tensor(1, DataType::Int32)),
    });
    assert!(matches!(
        fb.emit_binding(v, op(Op::Add, [x, x])),
        Err(BuildError::TypeMismatch { .. })
    ));
}

#[test]
fn unknown_rank_is_compatible() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, Some(f32_tensor(2)));
    let v = fb.fresh_var(VarInfo {
        name: "v".to_owned(),
        kind: VarKind::Plain,
        shape: None,
        ty: Some(Type::Tensor {
            rank: None,
            dtype: DataType::Float32,
        }),
    });
    fb.emit_binding(v, op(Op::Add, [x, x])).unwrap();
    fb.finish(v).unwrap();
}

#[test]
fn dataflow_var_outside_dataflow_fails() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, None);
    let v = fb.fresh_var(VarInfo {
        name: "lv".to_owned(),
        kind: VarKind::Dataflow,
        shape: None,
        ty: None,
    });
    assert_eq!(
        fb.emit_binding(v, Expr::Var(x)),
        Err(BuildError::DataflowVarOutsideDataflow {
            var: "lv".to_owned()
        })
    );
}

#[test]
fn finish_checks_well_formedness() {
    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, None);
    let dangling = fb.fresh_var(VarInfo {
        name: "d".to_owned(),
        kind: VarKind::Plain,
        shape: None,
        ty: None,
    });
    fb.emit(Call::op(Op::Add, vec![x.into(), dangling.into()]))
        .unwrap();
    assert!(matches!(fb.finish(x), Err(BuildError::IllFormed(_))));
}

// Match shape

#[test]
fn match_shape_binds_pattern() {
    let mut fb = FunctionBuilder::new("f");
    let n = fb.sym_var("n");
    let x = fb.add_param("x", None, Some(f32_tensor(2)));
    fb.emit_match_shape(Expr::Var(x), [PrimExpr::Var(n), PrimExpr::Int(3)])
        .unwrap();
    let func = fb.finish(x).unwrap();
    let Binding::MatchShape { var, pattern, .. } = &func.blocks()[0].bindings()[0] else {
        panic!("expected match_shape");
    };
    assert_eq!(*var, None);
    assert_eq!(pattern, &vec![PrimExpr::Var(n), PrimExpr::Int(3)]);
}

// Rewriting

#[test]
fn rewrite_inherits_arenas_and_params() {
    let (func, [x, y, lv0, gv0]) = mul_add();
    let mut fb = FunctionBuilder::rewrite(&func);
    assert_eq!(fb.name(), "main");
    assert_eq!(fb.var_info(lv0), func.var(lv0));
    for block in func.blocks() {
        fb.push_block(block.clone()).unwrap();
    }
    let out = fb.finish(gv0).unwrap();
    assert_eq!(out, func);
    assert_eq!(out.params(), &[x, y]);
}

#[test]
fn rewrite_reemits_with_same_identity() {
    let (func, [_, _, lv0, gv0]) = mul_add();
    let mut fb = FunctionBuilder::rewrite(&func);
    let mut df = fb.dataflow().unwrap();
    for binding in func.blocks()[0].bindings() {
        df.push_binding(binding.clone()).unwrap();
    }
    df.finish().unwrap();
    let out = fb.finish(gv0).unwrap();
    assert_eq!(out.vars().len(), func.vars().len());
    assert_eq!(out.blocks()[0].bindings()[0].var(), Some(lv0));
}

#[test]
fn push_empty_block_fails() {
    let (func, _) = mul_add();
    let mut fb = FunctionBuilder::rewrite(&func);
    let empty = crate::Block::new(BlockKind::Plain, Vec::new());
    assert_eq!(fb.push_block(empty), Err(BuildError::EmptyBlock));
}

#[test]
fn finish_with_ret_type_records_type() {
    let mut fb = FunctionBuilder::new("f");
    fb.add_param("x", None, Some(f32_tensor(1)));
    let alloc = Call::op(Op::AllocTensor, vec![ShapeExpr::from_ints([2]).into()]).with_attrs(
        CallAttrs::AllocTensor {
            dtype: DataType::Float32,
        },
    );
    let gv = fb.emit(alloc).unwrap();
    let func = fb.finish_with_ret_type(gv, f32_tensor(1)).unwrap();
    assert_eq!(func.ret_type(), Some(&f32_tensor(1)));
}

#[test]
fn binding_a_foreign_var_fails() {
    let mut other = FunctionBuilder::new("other");
    other.add_param("a", None, None);
    let foreign = other.add_param("b", None, None);

    let mut fb = FunctionBuilder::new("f");
    let x = fb.add_param("x", None, Some(f32_tensor(1)));
    let unknown = Err(BuildError::UnknownVar { raw: foreign.raw() });
    assert_eq!(fb.emit_binding(foreign, x), unknown);
    assert_eq!(
        fb.push_binding(Binding::MatchShape {
            var: Some(foreign),
            value: x.into(),
            pattern: Vec::new(),
        }),
        unknown
    );
    assert!(fb.finish(x).unwrap().blocks().is_empty());
}

#[test]
#[should_panic(expected = "out of bounds")]
fn sym_var_from_another_function_panics() {
    let (func, _) = mul_add();
    let past_end = u32::try_from(func.sym_vars().len()).unwrap();
    let _ = func.sym_var(SymVarId::new(past_end));
}
