//! Well-formedness checking for functions.
//!
//! Every function leaving the builder is checked, and the pass pipeline can
//! re-check after each pass. The rules:
//!
//! - every block has at least one binding
//! - every variable and shape-variable id is allocated in the function
//! - every variable is bound at most once (params count as bindings)
//! - every use is preceded by a definition in scope
//! - dataflow vars are bound only in dataflow blocks and are not read after
//!   their block ends

use rustc_hash::FxHashSet;

use crate::{Binding, Expr, Function, PrimExpr, ShapeExpr, SymVarId, VarId, WellFormedError};

/// Check `func`, returning the first violation found.
pub fn check(func: &Function) -> Result<(), WellFormedError> {
    let mut checker = Checker::new(func);
    checker.run()
}

struct Checker<'f> {
    func: &'f Function,
    /// Plain vars visible from here on.
    visible: FxHashSet<VarId>,
    /// Dataflow vars of the block being checked.
    local: FxHashSet<VarId>,
    /// Dataflow vars of blocks already closed.
    expired: FxHashSet<VarId>,
}

impl<'f> Checker<'f> {
    fn new(func: &'f Function) -> Self {
        Self {
            func,
            visible: FxHashSet::default(),
            local: FxHashSet::default(),
            expired: FxHashSet::default(),
        }
    }

    fn run(&mut self) -> Result<(), WellFormedError> {
        for info in self.func.vars() {
            if let Some(shape) = &info.shape {
                self.check_shape(shape)?;
            }
        }

        for &param in self.func.params() {
            self.define(param, false)?;
        }

        for (index, block) in self.func.blocks().iter().enumerate() {
            if block.bindings().is_empty() {
                return Err(WellFormedError::EmptyBlock {
                    function: self.func.name().to_owned(),
                    block: index,
                });
            }
            for binding in block.bindings() {
                self.check_expr(binding.value())?;
                if let Binding::MatchShape { pattern, .. } = binding {
                    for dim in pattern {
                        self.check_dim(dim)?;
                    }
                }
                if let Some(var) = binding.var() {
                    self.define(var, block.is_dataflow())?;
                }
            }
            self.expired.extend(self.local.drain());
        }

        self.check_expr(self.func.body())
    }

    fn define(&mut self, var: VarId, in_dataflow: bool) -> Result<(), WellFormedError> {
        self.check_id(var)?;
        if self.visible.contains(&var) || self.local.contains(&var) || self.expired.contains(&var)
        {
            return Err(WellFormedError::Rebound {
                function: self.func.name().to_owned(),
                var: self.name(var),
            });
        }
        if self.func.var(var).is_dataflow() {
            if !in_dataflow {
                return Err(WellFormedError::DataflowVarInPlainBlock {
                    function: self.func.name().to_owned(),
                    var: self.name(var),
                });
            }
            self.local.insert(var);
        } else {
            self.visible.insert(var);
        }
        Ok(())
    }

    fn use_var(&self, var: VarId) -> Result<(), WellFormedError> {
        self.check_id(var)?;
        if self.visible.contains(&var) || self.local.contains(&var) {
            Ok(())
        } else if self.expired.contains(&var) {
            Err(WellFormedError::DataflowVarEscapes {
                function: self.func.name().to_owned(),
                var: self.name(var),
            })
        } else {
            Err(WellFormedError::UndefinedVar {
                function: self.func.name().to_owned(),
                var: self.name(var),
            })
        }
    }

    fn check_expr(&self, expr: &Expr) -> Result<(), WellFormedError> {
        match expr {
            Expr::Var(v) => self.use_var(*v),
            Expr::Shape(shape) => self.check_shape(shape),
            Expr::Tuple(fields) => fields.iter().try_for_each(|f| self.check_expr(f)),
            Expr::TupleGetItem { tuple, .. } => self.check_expr(tuple),
            Expr::Call(call) => {
                if let Some(shape) = &call.shape {
                    self.check_shape(shape)?;
                }
                call.args.iter().try_for_each(|a| self.check_expr(a))
            }
            Expr::Constant(_) | Expr::ExternFunc(_) | Expr::GlobalVar(_) => Ok(()),
        }
    }

    fn check_shape(&self, shape: &ShapeExpr) -> Result<(), WellFormedError> {
        shape.iter().try_for_each(|d| self.check_dim(d))
    }

    fn check_dim(&self, dim: &PrimExpr) -> Result<(), WellFormedError> {
        let mut bad: Option<SymVarId> = None;
        dim.for_each_sym_var(&mut |v| {
            if bad.is_none() && v.index() >= self.func.sym_vars().len() {
                bad = Some(v);
            }
        });
        match bad {
            Some(v) => Err(WellFormedError::UnknownShapeVar {
                function: self.func.name().to_owned(),
                raw: v.raw(),
            }),
            None => Ok(()),
        }
    }

    fn check_id(&self, var: VarId) -> Result<(), WellFormedError> {
        if var.index() < self.func.vars().len() {
            Ok(())
        } else {
            Err(WellFormedError::UnknownVar {
                function: self.func.name().to_owned(),
                raw: var.raw(),
            })
        }
    }

    fn name(&self, var: VarId) -> String {
        self.func.var(var).name.clone()
    }
}
