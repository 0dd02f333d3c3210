//! Structural equality.
//!
//! Expressions compare by deep, order-sensitive equality with free variables
//! compared by identity. Functions compare up to renaming: parameters and
//! binding variables are definition sites, so two functions that differ only
//! in which arena slots (or name hints) their variables use are equal.
//! Shape variables are matched bijectively on first encounter.

use rustc_hash::FxHashMap;

use crate::{
    Binding, Block, Call, Expr, Function, Module, ModuleItem, PrimExpr, ShapeExpr, SymVarId,
    VarId, VarInfo,
};

/// Deep equality of two expressions. Variables compare by identity.
pub fn structurally_equal(a: &Expr, b: &Expr) -> bool {
    Matcher::default().expr(a, b)
}

/// Pairwise equality of two shapes.
pub fn shapes_equal(a: &ShapeExpr, b: &ShapeExpr) -> bool {
    a == b
}

/// Alpha-equivalence of two functions.
///
/// Compares parameters, block kinds, binding order, values, annotations and
/// the body. Function names and variable name hints are not compared.
pub fn functions_structurally_equal(a: &Function, b: &Function) -> bool {
    FunctionMatcher {
        lhs: a,
        rhs: b,
        m: Matcher::default(),
    }
    .run()
}

/// Same item names in the same order, with pairwise equal items.
pub fn modules_structurally_equal(a: &Module, b: &Module) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|((na, ia), (nb, ib))| {
            na == nb
                && match (ia, ib) {
                    (ModuleItem::Function(fa), ModuleItem::Function(fb)) => {
                        functions_structurally_equal(fa, fb)
                    }
                    (ModuleItem::Scalar(sa), ModuleItem::Scalar(sb)) => sa == sb,
                    _ => false,
                }
        })
}

/// Variable and shape-variable correspondences built up during a comparison.
#[derive(Default)]
struct Matcher {
    vars: FxHashMap<VarId, VarId>,
    vars_rev: FxHashMap<VarId, VarId>,
    syms: FxHashMap<SymVarId, SymVarId>,
    syms_rev: FxHashMap<SymVarId, SymVarId>,
}

impl Matcher {
    /// Record `a <-> b` as a definition pair. Fails if either side is
    /// already paired.
    fn define(&mut self, a: VarId, b: VarId) -> bool {
        if self.vars.contains_key(&a) || self.vars_rev.contains_key(&b) {
            return false;
        }
        self.vars.insert(a, b);
        self.vars_rev.insert(b, a);
        true
    }

    fn var(&self, a: VarId, b: VarId) -> bool {
        match (self.vars.get(&a), self.vars_rev.get(&b)) {
            (Some(&mb), Some(&ma)) => mb == b && ma == a,
            (None, None) => a == b,
            _ => false,
        }
    }

    fn sym(&mut self, a: SymVarId, b: SymVarId) -> bool {
        match (self.syms.get(&a), self.syms_rev.get(&b)) {
            (Some(&mb), Some(&ma)) => mb == b && ma == a,
            (None, None) => {
                self.syms.insert(a, b);
                self.syms_rev.insert(b, a);
                true
            }
            _ => false,
        }
    }

    fn dim(&mut self, a: &PrimExpr, b: &PrimExpr) -> bool {
        match (a, b) {
            (PrimExpr::Int(x), PrimExpr::Int(y)) => x == y,
            (PrimExpr::Var(x), PrimExpr::Var(y)) => self.sym(*x, *y),
            (
                PrimExpr::Binary {
                    op: oa,
                    lhs: la,
                    rhs: ra,
                },
                PrimExpr::Binary {
                    op: ob,
                    lhs: lb,
                    rhs: rb,
                },
            ) => oa == ob && self.dim(la, lb) && self.dim(ra, rb),
            _ => false,
        }
    }

    fn dims(&mut self, a: &[PrimExpr], b: &[PrimExpr]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.dim(x, y))
    }

    fn shape(&mut self, a: &ShapeExpr, b: &ShapeExpr) -> bool {
        self.dims(a.dims(), b.dims())
    }

    fn opt_shape(&mut self, a: Option<&ShapeExpr>, b: Option<&ShapeExpr>) -> bool {
        match (a, b) {
            (Some(x), Some(y)) => self.shape(x, y),
            (None, None) => true,
            _ => false,
        }
    }

    fn exprs(&mut self, a: &[Expr], b: &[Expr]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.expr(x, y))
    }

    fn expr(&mut self, a: &Expr, b: &Expr) -> bool {
        match (a, b) {
            (Expr::Var(x), Expr::Var(y)) => self.var(*x, *y),
            (Expr::Shape(x), Expr::Shape(y)) => self.shape(x, y),
            (Expr::Tuple(x), Expr::Tuple(y)) => self.exprs(x, y),
            (
                Expr::TupleGetItem {
                    tuple: ta,
                    index: ia,
                },
                Expr::TupleGetItem {
                    tuple: tb,
                    index: ib,
                },
            ) => ia == ib && self.expr(ta, tb),
            (Expr::Constant(x), Expr::Constant(y)) => x == y,
            (Expr::ExternFunc(x), Expr::ExternFunc(y)) => x == y,
            (Expr::GlobalVar(x), Expr::GlobalVar(y)) => x == y,
            (Expr::Call(x), Expr::Call(y)) => self.call(x, y),
            _ => false,
        }
    }

    fn call(&mut self, a: &Call, b: &Call) -> bool {
        a.callee == b.callee
            && a.attrs == b.attrs
            && a.ty == b.ty
            && self.exprs(&a.args, &b.args)
            && self.opt_shape(a.shape.as_ref(), b.shape.as_ref())
    }

    fn info(&mut self, a: &VarInfo, b: &VarInfo) -> bool {
        a.kind == b.kind && a.ty == b.ty && self.opt_shape(a.shape.as_ref(), b.shape.as_ref())
    }
}

struct FunctionMatcher<'a> {
    lhs: &'a Function,
    rhs: &'a Function,
    m: Matcher,
}

impl FunctionMatcher<'_> {
    fn run(mut self) -> bool {
        let (a, b) = (self.lhs, self.rhs);
        if a.params().len() != b.params().len()
            || a.blocks().len() != b.blocks().len()
            || a.ret_type() != b.ret_type()
        {
            return false;
        }
        for (&pa, &pb) in a.params().iter().zip(b.params()) {
            if !self.define(pa, pb) {
                return false;
            }
        }
        for (ba, bb) in a.blocks().iter().zip(b.blocks()) {
            if !self.block(ba, bb) {
                return false;
            }
        }
        self.m.expr(a.body(), b.body())
    }

    fn define(&mut self, a: VarId, b: VarId) -> bool {
        self.m.info(self.lhs.var(a), self.rhs.var(b)) && self.m.define(a, b)
    }

    fn block(&mut self, a: &Block, b: &Block) -> bool {
        a.kind() == b.kind()
            && a.bindings().len() == b.bindings().len()
            && a
                .bindings()
                .iter()
                .zip(b.bindings())
                .all(|(x, y)| self.binding(x, y))
    }

    fn binding(&mut self, a: &Binding, b: &Binding) -> bool {
        match (a, b) {
            (
                Binding::Var {
                    var: va,
                    value: xa,
                },
                Binding::Var {
                    var: vb,
                    value: xb,
                },
            ) => self.m.expr(xa, xb) && self.define(*va, *vb),
            (
                Binding::MatchShape {
                    var: va,
                    value: xa,
                    pattern: pa,
                },
                Binding::MatchShape {
                    var: vb,
                    value: xb,
                    pattern: pb,
                },
            ) => {
                self.m.expr(xa, xb)
                    && self.m.dims(pa, pb)
                    && match (va, vb) {
                        (Some(x), Some(y)) => self.define(*x, *y),
                        (None, None) => true,
                        _ => false,
                    }
            }
            _ => false,
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
