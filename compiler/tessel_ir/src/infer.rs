//! Shape and type inference for value expressions.
//!
//! Inference is local: a variable's shape and type come from its arena
//! entry, a call's from its explicit annotation or, failing that, from the
//! operator's rule. `None` means "not statically known", never an error.

use crate::expr::builtin;
use crate::{CallAttrs, Callee, DataType, Expr, Op, PrimExpr, ShapeExpr, Type, VarInfo};

/// Infer the result shape of `expr`.
pub fn infer_shape(expr: &Expr, vars: &[VarInfo]) -> Option<ShapeExpr> {
    match expr {
        Expr::Var(v) => vars.get(v.index())?.shape.clone(),
        Expr::Constant(_) => Some(ShapeExpr::default()),
        Expr::Call(call) => {
            if call.shape.is_some() {
                return call.shape.clone();
            }
            match &call.callee {
                Callee::Op(Op::Add | Op::Multiply | Op::EwiseFma) => {
                    let mut shapes = call.args.iter().map(|a| infer_shape(a, vars));
                    let first = shapes.next()??;
                    shapes.try_fold(first, |acc, s| broadcast(&acc, &s?))
                }
                Callee::Op(Op::CallDps | Op::AllocTensor) => call.args.first()?.as_shape().cloned(),
                Callee::Op(Op::VmAllocTensor) => call.args.get(2)?.as_shape().cloned(),
                Callee::Extern(f) if f.global_symbol == builtin::ALLOC_SHAPE_HEAP => {
                    call.args.first()?.as_shape().cloned()
                }
                Callee::Op(
                    Op::CallPacked | Op::VmAllocStorage | Op::VmStoreShape | Op::VmLoadShape,
                )
                | Callee::Extern(_)
                | Callee::Global(_) => None,
            }
        }
        Expr::Shape(_)
        | Expr::Tuple(_)
        | Expr::TupleGetItem { .. }
        | Expr::ExternFunc(_)
        | Expr::GlobalVar(_) => None,
    }
}

/// Infer the static type of `expr`.
pub fn infer_type(expr: &Expr, vars: &[VarInfo]) -> Option<Type> {
    match expr {
        Expr::Var(v) => vars.get(v.index())?.ty.clone(),
        Expr::Shape(shape) => Some(Type::Shape {
            ndim: Some(shape.len()),
        }),
        Expr::Tuple(fields) => fields
            .iter()
            .map(|f| infer_type(f, vars))
            .collect::<Option<Vec<_>>>()
            .map(Type::Tuple),
        Expr::TupleGetItem { tuple, index } => match infer_type(tuple, vars)? {
            Type::Tuple(mut fields) if *index < fields.len() => Some(fields.swap_remove(*index)),
            _ => None,
        },
        Expr::Constant(c) => Some(Type::tensor(0, c.dtype())),
        Expr::ExternFunc(_) | Expr::GlobalVar(_) => None,
        Expr::Call(call) => {
            if call.ty.is_some() {
                return call.ty.clone();
            }
            match &call.callee {
                Callee::Op(Op::Add | Op::Multiply | Op::EwiseFma) => {
                    elementwise_type(&call.args, vars)
                }
                Callee::Op(Op::CallDps) => {
                    let rank = call.args.first()?.as_shape()?.len();
                    let dtype = match call.args.get(2) {
                        Some(Expr::Tuple(inputs)) => inputs
                            .iter()
                            .find_map(|i| infer_type(i, vars)?.tensor_dtype()),
                        _ => None,
                    };
                    Some(Type::tensor(rank, dtype.unwrap_or(DataType::Float32)))
                }
                Callee::Op(Op::AllocTensor) => {
                    let rank = call.args.first()?.as_shape()?.len();
                    Some(Type::tensor(rank, attr_dtype(&call.attrs)?))
                }
                Callee::Op(Op::VmAllocTensor) => {
                    let rank = match call.args.get(2)? {
                        Expr::Shape(shape) => Some(shape.len()),
                        other => match infer_type(other, vars) {
                            Some(Type::Shape { ndim }) => ndim,
                            _ => None,
                        },
                    };
                    Some(Type::Tensor {
                        rank,
                        dtype: attr_dtype(&call.attrs)?,
                    })
                }
                Callee::Op(Op::VmAllocStorage) => Some(Type::Object),
                Callee::Op(Op::CallPacked | Op::VmStoreShape) => Some(Type::unit()),
                Callee::Op(Op::VmLoadShape) => match &call.attrs {
                    CallAttrs::LoadShape { slots } => Some(Type::Shape {
                        ndim: Some(slots.len()),
                    }),
                    _ => Some(Type::Shape { ndim: None }),
                },
                Callee::Extern(f) if f.global_symbol == builtin::SHAPE_OF => {
                    let ndim = match infer_type(call.args.first()?, vars) {
                        Some(Type::Tensor { rank, .. }) => rank,
                        _ => None,
                    };
                    Some(Type::Shape { ndim })
                }
                Callee::Extern(f) if f.global_symbol == builtin::ALLOC_SHAPE_HEAP => {
                    Some(Type::tensor(1, DataType::Int64))
                }
                Callee::Extern(_) | Callee::Global(_) => None,
            }
        }
    }
}

fn attr_dtype(attrs: &CallAttrs) -> Option<DataType> {
    match attrs {
        CallAttrs::AllocTensor { dtype } | CallAttrs::AllocStorage { dtype, .. } => Some(*dtype),
        CallAttrs::None | CallAttrs::StoreShape { .. } | CallAttrs::LoadShape { .. } => None,
    }
}

/// Result type of an elementwise operator: all tensor operands must agree on
/// dtype; the rank is the largest known operand rank.
fn elementwise_type(args: &[Expr], vars: &[VarInfo]) -> Option<Type> {
    let mut dtype = None;
    let mut rank = Some(0);
    for arg in args {
        let Type::Tensor { rank: r, dtype: d } = infer_type(arg, vars)? else {
            return None;
        };
        match dtype {
            None => dtype = Some(d),
            Some(prev) if prev != d => return None,
            Some(_) => {}
        }
        rank = match (rank, r) {
            (Some(a), Some(b)) => Some(a.max(b)),
            _ => None,
        };
    }
    Some(Type::Tensor {
        rank,
        dtype: dtype?,
    })
}

/// Numpy-style broadcast of two shapes, aligned from the trailing dimension.
///
/// Equal dimensions are kept and a literal `1` yields to the other side.
/// Two distinct non-unit dimensions cannot be reconciled statically, so the
/// result is unknown.
pub fn broadcast(a: &ShapeExpr, b: &ShapeExpr) -> Option<ShapeExpr> {
    let rank = a.len().max(b.len());
    let mut dims = Vec::with_capacity(rank);
    for i in 0..rank {
        let da = (i + a.len()).checked_sub(rank).map(|j| &a.dims()[j]);
        let db = (i + b.len()).checked_sub(rank).map(|j| &b.dims()[j]);
        let dim = match (da, db) {
            (Some(x), Some(y)) if x == y => x.clone(),
            (Some(x), Some(PrimExpr::Int(1))) | (Some(PrimExpr::Int(1)), Some(x)) => x.clone(),
            (Some(x), None) | (None, Some(x)) => x.clone(),
            _ => return None,
        };
        dims.push(dim);
    }
    Some(ShapeExpr::new(dims))
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
