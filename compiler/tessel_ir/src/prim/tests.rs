use pretty_assertions::assert_eq;

use super::{PrimBinOp, PrimExpr, ShapeExpr, SymVarId};

fn var(n: u32) -> PrimExpr {
    PrimExpr::Var(SymVarId::new(n))
}

// Folding

#[test]
fn literal_operands_fold() {
    assert_eq!(PrimExpr::mul(3.into(), 4.into()), PrimExpr::Int(12));
    assert_eq!(PrimExpr::sub(3.into(), 4.into()), PrimExpr::Int(-1));
}

#[test]
fn identities_fold() {
    assert_eq!(PrimExpr::add(var(0), 0.into()), var(0));
    assert_eq!(PrimExpr::add(0.into(), var(0)), var(0));
    assert_eq!(PrimExpr::mul(1.into(), var(0)), var(0));
    assert_eq!(PrimExpr::mul(var(0), 0.into()), PrimExpr::Int(0));
    assert_eq!(PrimExpr::floor_div(var(0), 1.into()), var(0));
}

#[test]
fn symbolic_operands_stay_symbolic() {
    let e = PrimExpr::mul(var(0), 2.into());
    assert!(matches!(
        e,
        PrimExpr::Binary {
            op: PrimBinOp::Mul,
            ..
        }
    ));
}

#[test]
fn division_by_zero_is_not_folded() {
    let e = PrimExpr::floor_div(4.into(), 0.into());
    assert!(e.as_int().is_none());
}

// Floor semantics

#[test]
fn floor_div_rounds_toward_negative_infinity() {
    assert_eq!(PrimBinOp::FloorDiv.apply(7, 2), Some(3));
    assert_eq!(PrimBinOp::FloorDiv.apply(-7, 2), Some(-4));
    assert_eq!(PrimBinOp::FloorDiv.apply(7, -2), Some(-4));
    assert_eq!(PrimBinOp::FloorMod.apply(-7, 2), Some(1));
    assert_eq!(PrimBinOp::FloorMod.apply(7, -2), Some(-1));
    assert_eq!(PrimBinOp::FloorDiv.apply(1, 0), None);
}

#[test]
fn overflow_is_reported() {
    assert_eq!(PrimBinOp::Mul.apply(i64::MAX, 2), None);
    assert_eq!(PrimBinOp::FloorDiv.apply(i64::MIN, -1), None);
}

// Shapes

#[test]
fn num_elements_folds_literal_shapes() {
    assert_eq!(ShapeExpr::from_ints([2, 3, 4]).num_elements(), PrimExpr::Int(24));
    assert_eq!(ShapeExpr::default().num_elements(), PrimExpr::Int(1));
}

#[test]
fn num_elements_of_symbolic_shape() {
    let shape = ShapeExpr::new([var(0), 4.into()]);
    let n = shape.num_elements();
    assert_eq!(n.eval(&|_| Some(5)), Some(20));
    assert!(shape.is_symbolic());
    assert!(!ShapeExpr::from_ints([1, 2]).is_symbolic());
}

#[test]
fn sym_vars_are_reported_left_to_right() {
    let e = PrimExpr::add(PrimExpr::mul(var(1), var(0)), var(1));
    let mut seen = Vec::new();
    e.for_each_sym_var(&mut |v| seen.push(v.raw()));
    assert_eq!(seen, vec![1, 0, 1]);
}

#[test]
fn map_sym_vars_renames() {
    let e = PrimExpr::mul(var(0), 2.into());
    let renamed = e.map_sym_vars(&|v| SymVarId::new(v.raw() + 10));
    assert_eq!(renamed, PrimExpr::mul(var(10), 2.into()));
}

// === Property tests ===

mod proptest_fold {
    use proptest::prelude::*;

    use super::super::{PrimBinOp, PrimExpr, SymVarId};

    fn op() -> impl Strategy<Value = PrimBinOp> {
        prop_oneof![
            Just(PrimBinOp::Add),
            Just(PrimBinOp::Sub),
            Just(PrimBinOp::Mul),
            Just(PrimBinOp::FloorDiv),
            Just(PrimBinOp::FloorMod),
        ]
    }

    proptest! {
        #[test]
        fn folding_preserves_value(
            op in op(),
            a in -1000i64..1000,
            b in -1000i64..1000,
            x in -1000i64..1000,
            lhs_is_var in any::<bool>(),
        ) {
            let lhs = if lhs_is_var { PrimExpr::Var(SymVarId::new(0)) } else { PrimExpr::Int(a) };
            let folded = PrimExpr::binary(op, lhs.clone(), PrimExpr::Int(b));
            let lookup = |_: SymVarId| Some(x);
            let unfolded = op.apply(lhs.eval(&lookup).unwrap_or(a), b);
            if let Some(expected) = unfolded {
                prop_assert_eq!(folded.eval(&lookup), Some(expected));
            }
        }
    }
}
