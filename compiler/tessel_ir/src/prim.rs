//! Symbolic dimension expressions.
//!
//! A tensor's shape is a [`ShapeExpr`]: an ordered list of [`PrimExpr`]
//! dimensions, each an integer literal, a reference to a shape variable
//! scoped to the enclosing function, or integer arithmetic over those.
//!
//! Shape variables are identified by [`SymVarId`] into the owning function's
//! shape-variable arena, so two `PrimExpr`s mentioning the same variable
//! compare equal by plain `==`. Structural equality of shapes is therefore
//! derived equality.

use smallvec::SmallVec;

// ── Shape variable IDs ──────────────────────────────────────────────

/// Shape variable ID within a function.
///
/// Allocated once per function (by the builder) and reused by reference in
/// every shape annotation that mentions the variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct SymVarId(u32);

impl SymVarId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena entry for a shape variable. Shape variables are always `int64`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct SymVarInfo {
    pub name: String,
}

// ── Operators ───────────────────────────────────────────────────────

/// Integer operator over dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimBinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    FloorMod,
}

impl PrimBinOp {
    /// Evaluate on concrete operands.
    ///
    /// Returns `None` on overflow or division by zero. Division and modulo
    /// round toward negative infinity.
    pub fn apply(self, a: i64, b: i64) -> Option<i64> {
        match self {
            PrimBinOp::Add => a.checked_add(b),
            PrimBinOp::Sub => a.checked_sub(b),
            PrimBinOp::Mul => a.checked_mul(b),
            PrimBinOp::FloorDiv => floor_div(a, b),
            PrimBinOp::FloorMod => {
                let q = floor_div(a, b)?;
                a.checked_sub(q.checked_mul(b)?)
            }
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            PrimBinOp::Add => "+",
            PrimBinOp::Sub => "-",
            PrimBinOp::Mul => "*",
            PrimBinOp::FloorDiv => "//",
            PrimBinOp::FloorMod => "%",
        }
    }

    /// Binding strength for printing.
    pub fn precedence(self) -> u8 {
        match self {
            PrimBinOp::Add | PrimBinOp::Sub => 1,
            PrimBinOp::Mul | PrimBinOp::FloorDiv | PrimBinOp::FloorMod => 2,
        }
    }
}

fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q.checked_sub(1)
    } else {
        Some(q)
    }
}

// ── Expressions ─────────────────────────────────────────────────────

/// A single dimension expression.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimExpr {
    Int(i64),
    Var(SymVarId),
    Binary {
        op: PrimBinOp,
        lhs: Box<PrimExpr>,
        rhs: Box<PrimExpr>,
    },
}

impl PrimExpr {
    /// Build `lhs op rhs`, folding literal operands and arithmetic identities
    /// (`x + 0`, `x * 1`, `x * 0`).
    pub fn binary(op: PrimBinOp, lhs: PrimExpr, rhs: PrimExpr) -> PrimExpr {
        if let (PrimExpr::Int(a), PrimExpr::Int(b)) = (&lhs, &rhs) {
            if let Some(v) = op.apply(*a, *b) {
                return PrimExpr::Int(v);
            }
        }
        match (op, lhs.as_int(), rhs.as_int()) {
            (PrimBinOp::Add, Some(0), _) | (PrimBinOp::Mul, Some(1), _) => rhs,
            (PrimBinOp::Add | PrimBinOp::Sub, _, Some(0))
            | (PrimBinOp::Mul | PrimBinOp::FloorDiv, _, Some(1)) => lhs,
            (PrimBinOp::Mul, Some(0), _) | (PrimBinOp::Mul, _, Some(0)) => PrimExpr::Int(0),
            _ => PrimExpr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
        }
    }

    pub fn add(lhs: PrimExpr, rhs: PrimExpr) -> PrimExpr {
        Self::binary(PrimBinOp::Add, lhs, rhs)
    }

    pub fn sub(lhs: PrimExpr, rhs: PrimExpr) -> PrimExpr {
        Self::binary(PrimBinOp::Sub, lhs, rhs)
    }

    pub fn mul(lhs: PrimExpr, rhs: PrimExpr) -> PrimExpr {
        Self::binary(PrimBinOp::Mul, lhs, rhs)
    }

    pub fn floor_div(lhs: PrimExpr, rhs: PrimExpr) -> PrimExpr {
        Self::binary(PrimBinOp::FloorDiv, lhs, rhs)
    }

    pub fn floor_mod(lhs: PrimExpr, rhs: PrimExpr) -> PrimExpr {
        Self::binary(PrimBinOp::FloorMod, lhs, rhs)
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PrimExpr::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_var(&self) -> Option<SymVarId> {
        match self {
            PrimExpr::Var(v) => Some(*v),
            _ => None,
        }
    }

    /// Call `f` on every shape variable mentioned, left to right.
    pub fn for_each_sym_var(&self, f: &mut impl FnMut(SymVarId)) {
        match self {
            PrimExpr::Int(_) => {}
            PrimExpr::Var(v) => f(*v),
            PrimExpr::Binary { lhs, rhs, .. } => {
                lhs.for_each_sym_var(f);
                rhs.for_each_sym_var(f);
            }
        }
    }

    /// Evaluate given concrete values for shape variables.
    pub fn eval(&self, lookup: &impl Fn(SymVarId) -> Option<i64>) -> Option<i64> {
        match self {
            PrimExpr::Int(v) => Some(*v),
            PrimExpr::Var(v) => lookup(*v),
            PrimExpr::Binary { op, lhs, rhs } => op.apply(lhs.eval(lookup)?, rhs.eval(lookup)?),
        }
    }

    /// Rewrite shape variables through `map`, leaving unmapped ones alone.
    pub fn map_sym_vars(&self, map: &impl Fn(SymVarId) -> SymVarId) -> PrimExpr {
        match self {
            PrimExpr::Int(v) => PrimExpr::Int(*v),
            PrimExpr::Var(v) => PrimExpr::Var(map(*v)),
            PrimExpr::Binary { op, lhs, rhs } => PrimExpr::Binary {
                op: *op,
                lhs: Box::new(lhs.map_sym_vars(map)),
                rhs: Box::new(rhs.map_sym_vars(map)),
            },
        }
    }
}

impl From<i64> for PrimExpr {
    fn from(v: i64) -> Self {
        PrimExpr::Int(v)
    }
}

impl From<SymVarId> for PrimExpr {
    fn from(v: SymVarId) -> Self {
        PrimExpr::Var(v)
    }
}

// ── Shapes ──────────────────────────────────────────────────────────

/// An ordered sequence of dimension expressions.
///
/// Most tensors in practice have rank ≤ 4, so dimensions are stored inline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ShapeExpr(SmallVec<[PrimExpr; 4]>);

impl ShapeExpr {
    pub fn new(dims: impl IntoIterator<Item = PrimExpr>) -> Self {
        Self(dims.into_iter().collect())
    }

    pub fn from_ints(dims: impl IntoIterator<Item = i64>) -> Self {
        Self(dims.into_iter().map(PrimExpr::Int).collect())
    }

    #[inline]
    pub fn dims(&self) -> &[PrimExpr] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PrimExpr> {
        self.0.iter()
    }

    /// True if any dimension is not a literal, i.e. the shape can only be
    /// known at run time.
    pub fn is_symbolic(&self) -> bool {
        self.0.iter().any(|d| d.as_int().is_none())
    }

    /// Product of all dimensions (folded where possible).
    pub fn num_elements(&self) -> PrimExpr {
        self.0
            .iter()
            .cloned()
            .fold(PrimExpr::Int(1), PrimExpr::mul)
    }
}

impl<'a> IntoIterator for &'a ShapeExpr {
    type Item = &'a PrimExpr;
    type IntoIter = std::slice::Iter<'a, PrimExpr>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<PrimExpr> for ShapeExpr {
    fn from_iter<I: IntoIterator<Item = PrimExpr>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests;
