//! End-to-end pipeline scenarios.

use pretty_assertions::assert_eq;
use rustc_hash::FxHashSet;
use tessel_ir::visitor::{post_order_visit, Node};
use tessel_ir::{
    Call, CallAttrs, Callee, DataType, Expr, ExternFunc, Function, FunctionBuilder, Module, Op,
    PrimExpr, ShapeExpr,
};

use crate::test_helpers::{call_binding, dps_identity, module_of, mul_add, op, sym_shape, tensor};
use crate::{
    init_tracing, CallDpsRewrite, FmaRewrite, PassError, Pipeline, PipelineConfig, ToNonDataflow,
};

/// ```text
/// main(x, y: (m, n) float32) {
///   dataflow {
///     lv0 = multiply(x, y)
///     lv1 = add(lv0, y)
///     gv0 = call_dps((m, n * 2), extern("test.op.concat"), (lv1, x))
///   }
///   return gv0
/// }
/// ```
fn concat_program() -> Module {
    let mut fb = FunctionBuilder::new("main");
    let m = fb.sym_var("m");
    let n = fb.sym_var("n");
    let x = fb.add_param("x", Some(sym_shape(&[m, n])), Some(tensor(2, DataType::Float32)));
    let y = fb.add_param("y", Some(sym_shape(&[m, n])), Some(tensor(2, DataType::Float32)));
    let mut df = fb.dataflow().unwrap();
    let lv0 = df.emit(op(Op::Multiply, [x, y])).unwrap();
    let lv1 = df.emit(op(Op::Add, [lv0, y])).unwrap();
    let out_shape = ShapeExpr::new([PrimExpr::Var(m), PrimExpr::mul(n.into(), PrimExpr::Int(2))]);
    let gv0 = df
        .emit_output(Call::op(
            Op::CallDps,
            vec![
                out_shape.into(),
                Expr::ExternFunc(ExternFunc::new("test.op.concat")),
                Expr::Tuple(vec![lv1.into(), x.into()]),
            ],
        ))
        .unwrap();
    df.finish().unwrap();
    module_of(fb.finish(gv0).unwrap())
}

fn run_standard(module: &Module) -> Module {
    init_tracing();
    Pipeline::standard(PipelineConfig::default().with_verify_each(true))
        .run(module)
        .unwrap()
}

/// Every call in `func`, in post-order.
fn calls(func: &Function) -> Vec<&Call> {
    let mut calls = Vec::new();
    post_order_visit(func, |node| {
        if let Node::Expr(Expr::Call(call)) = node {
            calls.push(call.as_ref());
        }
    });
    calls
}

#[test]
fn standard_pass_order() {
    let pipeline = Pipeline::standard(PipelineConfig::default());
    assert_eq!(
        pipeline.pass_names().collect::<Vec<_>>(),
        vec![
            "fma-rewrite",
            "to-non-dataflow",
            "call-dps-rewrite",
            "vm-memory-lower",
            "vm-shape-lower",
        ]
    );
}

#[test]
fn fma_scenario_float16() {
    let (func, [x, y, _, gv0]) = mul_add(DataType::Float16);
    let out = Pipeline::new(PipelineConfig::default())
        .add(FmaRewrite)
        .run(&module_of(func))
        .unwrap();
    let func = out.function("main").unwrap();

    let (var, fma) = call_binding(&func.blocks()[0].bindings()[1]);
    assert_eq!(var, gv0);
    assert!(fma.is_op(Op::EwiseFma));
    assert_eq!(fma.args, vec![Expr::Var(x), Expr::Var(y), Expr::Var(y)]);
    assert_eq!(func.var(gv0).shape, func.var(x).shape);
}

#[test]
fn dps_scenario() {
    let (func, [x, gv0]) = dps_identity("test.op.identity");
    let out = Pipeline::new(PipelineConfig::default())
        .add(CallDpsRewrite)
        .run(&module_of(func))
        .unwrap();
    let bindings = out.function("main").unwrap().blocks()[0].bindings();

    assert_eq!(bindings.len(), 2);
    let (alloc_var, alloc) = call_binding(&bindings[0]);
    assert!(alloc.is_op(Op::AllocTensor));
    assert_eq!(alloc_var, gv0);
    let (_, call) = call_binding(&bindings[1]);
    assert_eq!(call.extern_symbol(), Some("test.op.identity"));
    assert_eq!(call.args, vec![Expr::Var(x), Expr::Var(gv0)]);
}

#[test]
fn lowered_output_meets_vm_contract() {
    let out = run_standard(&concat_program());
    let func = out.function("main").unwrap();

    assert!(func.blocks().iter().all(|b| !b.is_dataflow()));
    assert!(func
        .bindings()
        .filter_map(|b| b.var())
        .all(|v| !func.var(v).is_dataflow()));

    let calls = calls(func);
    for abstract_op in [Op::CallDps, Op::AllocTensor, Op::CallPacked] {
        assert!(calls.iter().all(|c| !c.is_op(abstract_op)), "{abstract_op:?} left");
    }
    assert!(calls.iter().any(|c| c.is_op(Op::EwiseFma)));
    assert!(calls
        .iter()
        .any(|c| c.extern_symbol() == Some("test.op.concat")));

    let mut symbolic = 0;
    post_order_visit(func, |node| {
        if let Node::Expr(Expr::Shape(shape)) = node {
            symbolic += usize::from(shape.is_symbolic());
        }
    });
    assert_eq!(symbolic, 0);
}

#[test]
fn heap_is_allocated_first_and_loads_follow_stores() {
    let out = run_standard(&concat_program());
    let func = out.function("main").unwrap();

    let (heap, first) = call_binding(&func.blocks()[0].bindings()[0]);
    assert_eq!(
        first.extern_symbol(),
        Some(tessel_ir::expr::builtin::ALLOC_SHAPE_HEAP)
    );

    let shape_func = out.scalar_function("shape_func").unwrap();
    let computed: FxHashSet<usize> = shape_func.body.iter().map(|s| s.slot).collect();
    let mut ready: FxHashSet<usize> = FxHashSet::default();
    for binding in func.bindings() {
        let Some(call) = binding.value().as_call() else {
            continue;
        };
        match (&call.callee, &call.attrs) {
            (Callee::Op(Op::VmStoreShape), CallAttrs::StoreShape { entries }) => {
                assert_eq!(call.args[1], Expr::Var(heap));
                ready.extend(entries.iter().map(|e| e.slot));
            }
            (Callee::Global(g), _) if g.name == shape_func.name => {
                ready.extend(computed.iter().copied());
            }
            (Callee::Op(Op::VmLoadShape), CallAttrs::LoadShape { slots }) => {
                assert!(slots.iter().all(|s| ready.contains(s)), "load of {slots:?}");
            }
            _ => {}
        }
    }
}

#[test]
fn shape_function_evaluates_output_sizes() {
    let out = run_standard(&concat_program());
    let shape_func = out.scalar_function("shape_func").unwrap();
    assert_eq!(shape_func.heap_size, 4);

    // m = 3, n = 5
    let mut heap = vec![3, 5, 0, 0];
    shape_func.eval(&mut heap).unwrap();
    // Storage bytes m * n * 2 * 4, then the output's second dimension n * 2.
    assert_eq!(heap, vec![3, 5, 120, 10]);
}

#[test]
fn config_reaches_the_passes() {
    let config = PipelineConfig {
        storage_alignment: 128,
        shape_func_name: "dims".to_owned(),
        ..PipelineConfig::default()
    };
    let out = Pipeline::standard(config).run(&concat_program()).unwrap();

    assert!(out.scalar_function("dims").is_some());
    let func = out.function("main").unwrap();
    let storage = calls(func)
        .into_iter()
        .find(|c| c.is_op(Op::VmAllocStorage))
        .unwrap();
    assert!(matches!(
        storage.attrs,
        CallAttrs::AllocStorage { alignment: 128, .. }
    ));
}

#[test]
fn failing_pass_stops_the_pipeline() {
    let mut fb = FunctionBuilder::new("main");
    let gv = fb
        .emit(Call::op(Op::CallDps, vec![Expr::Tuple(Vec::new())]))
        .unwrap();
    let module = module_of(fb.finish(gv).unwrap());

    let err = Pipeline::standard(PipelineConfig::default())
        .run(&module)
        .unwrap_err();
    assert!(matches!(
        err,
        PassError::MalformedCall { ref function, binding: 0, .. } if function == "main"
    ));
}

#[test]
fn empty_pipeline_returns_input() {
    let module = concat_program();
    let out = Pipeline::new(PipelineConfig::default()).run(&module).unwrap();
    assert_eq!(out, module);
}

#[test]
fn demotion_then_fma_finds_nothing() {
    // Fusion only looks inside dataflow blocks.
    let (func, _) = mul_add(DataType::Float32);
    let module = module_of(func);
    let demoted = Pipeline::new(PipelineConfig::default())
        .add(ToNonDataflow)
        .run(&module)
        .unwrap();
    let fused = Pipeline::new(PipelineConfig::default())
        .add(FmaRewrite)
        .run(&demoted)
        .unwrap();
    assert_eq!(fused, demoted);
}

#[test]
fn printed_output_names_generated_code() {
    let out = run_standard(&concat_program());
    let text = out.to_string();
    assert!(text.contains("scalar fn shape_func(heap: int64[4])"));
    assert!(text.contains("tessel.vm.builtin.load_shape"));
}
