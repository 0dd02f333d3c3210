//! Scalar shape-computation functions.
//!
//! VM shape lowering extracts all shape arithmetic of a tensor function into
//! a [`ScalarFunction`]: straight-line integer code that reads shape values
//! from heap slots and writes computed values back to other slots. The VM
//! compiles it as ordinary scalar code; [`ScalarFunction::eval`] is the
//! reference semantics.

use crate::PrimBinOp;

/// Integer expression over heap slots.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ScalarExpr {
    Int(i64),
    /// Read `heap[slot]`.
    Load(usize),
    Binary {
        op: PrimBinOp,
        lhs: Box<ScalarExpr>,
        rhs: Box<ScalarExpr>,
    },
}

/// `heap[slot] = value`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ScalarStmt {
    pub slot: usize,
    pub value: ScalarExpr,
}

/// Error evaluating a scalar function.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScalarEvalError {
    #[error("heap slot {slot} out of range (heap has {heap_size} slots)")]
    SlotOutOfRange { slot: usize, heap_size: usize },
    #[error("arithmetic overflow or division by zero computing slot {slot}")]
    Arithmetic { slot: usize },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ScalarFunction {
    pub name: String,
    /// Number of `int64` slots the heap argument must have.
    pub heap_size: usize,
    pub body: Vec<ScalarStmt>,
}

impl ScalarFunction {
    /// Run the function against `heap`, in statement order.
    pub fn eval(&self, heap: &mut [i64]) -> Result<(), ScalarEvalError> {
        for stmt in &self.body {
            let value = eval_expr(&stmt.value, heap, stmt.slot)?;
            let heap_size = heap.len();
            let dst = heap
                .get_mut(stmt.slot)
                .ok_or(ScalarEvalError::SlotOutOfRange {
                    slot: stmt.slot,
                    heap_size,
                })?;
            *dst = value;
        }
        Ok(())
    }
}

fn eval_expr(expr: &ScalarExpr, heap: &[i64], target: usize) -> Result<i64, ScalarEvalError> {
    match expr {
        ScalarExpr::Int(v) => Ok(*v),
        ScalarExpr::Load(slot) => heap
            .get(*slot)
            .copied()
            .ok_or(ScalarEvalError::SlotOutOfRange {
                slot: *slot,
                heap_size: heap.len(),
            }),
        ScalarExpr::Binary { op, lhs, rhs } => {
            let a = eval_expr(lhs, heap, target)?;
            let b = eval_expr(rhs, heap, target)?;
            op.apply(a, b)
                .ok_or(ScalarEvalError::Arithmetic { slot: target })
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
