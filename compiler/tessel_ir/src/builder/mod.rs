//! Incremental function builder.
//!
//! Program authors and passes construct functions by emitting bindings one
//! at a time. The builder owns the variable arenas while the function is in
//! progress and is consumed by [`finish`](FunctionBuilder::finish) to
//! produce the immutable [`Function`].
//!
//! # Dataflow regions
//!
//! [`dataflow`](FunctionBuilder::dataflow) opens a dataflow block and returns
//! a [`DataflowScope`] guard that dereferences to the builder. Inside the
//! region `emit` binds dataflow vars and `emit_output` binds the block's
//! outputs. The block is closed when the guard is finished or dropped, on
//! every exit path; validation errors from a dropped guard are reported by
//! the function-level `finish`.
//!
//! # Rewriting
//!
//! [`FunctionBuilder::rewrite`] starts from an existing function's name,
//! parameters and arenas with no blocks. Passes re-emit the blocks they keep
//! and emit new ones for what they change. Because the arenas are inherited,
//! re-binding an existing [`VarId`] keeps that variable's identity.

mod scope;

use std::mem;

use crate::function::FunctionParts;
use crate::infer::{infer_shape, infer_type};
use crate::printer::shape_to_string;
use crate::well_formed;
use crate::{
    Binding, Block, BlockKind, BuildError, Expr, Function, PrimExpr, ShapeExpr, SymVarId,
    SymVarInfo, Type, VarId, VarInfo, VarKind,
};

pub use self::scope::DataflowScope;

/// Builder for an in-progress function.
pub struct FunctionBuilder {
    name: String,
    params: Vec<VarId>,
    vars: Vec<VarInfo>,
    sym_vars: Vec<SymVarInfo>,
    ret_type: Option<Type>,
    blocks: Vec<Block>,
    /// Bindings of the block currently being built.
    pending: Vec<Binding>,
    in_dataflow: bool,
    /// First error recorded by a dropped [`DataflowScope`].
    deferred: Option<BuildError>,
    next_lv: u32,
    next_gv: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            vars: Vec::new(),
            sym_vars: Vec::new(),
            ret_type: None,
            blocks: Vec::new(),
            pending: Vec::new(),
            in_dataflow: false,
            deferred: None,
            next_lv: 0,
            next_gv: 0,
        }
    }

    /// Start rewriting `func`: same name, parameters, return type and
    /// arenas, no blocks.
    pub fn rewrite(func: &Function) -> Self {
        Self {
            params: func.params().to_vec(),
            vars: func.vars().to_vec(),
            sym_vars: func.sym_vars().to_vec(),
            ret_type: func.ret_type().cloned(),
            ..Self::new(func.name())
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn is_in_dataflow(&self) -> bool {
        self.in_dataflow
    }

    // Arenas

    /// Declare a parameter.
    pub fn add_param(
        &mut self,
        name: impl Into<String>,
        shape: Option<ShapeExpr>,
        ty: Option<Type>,
    ) -> VarId {
        let var = self.fresh_var(VarInfo {
            name: name.into(),
            kind: VarKind::Plain,
            shape,
            ty,
        });
        self.params.push(var);
        var
    }

    /// Allocate a shape variable scoped to this function.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "shape variable counts never exceed u32"
    )]
    pub fn sym_var(&mut self, name: impl Into<String>) -> SymVarId {
        let id = SymVarId::new(self.sym_vars.len() as u32);
        self.sym_vars.push(SymVarInfo { name: name.into() });
        id
    }

    /// Allocate a variable without binding it.
    ///
    /// Used by passes that decide between reusing an existing variable and
    /// minting a new one before emitting the binding.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "variable counts never exceed u32"
    )]
    pub fn fresh_var(&mut self, info: VarInfo) -> VarId {
        let id = VarId::new(self.vars.len() as u32);
        self.vars.push(info);
        id
    }

    /// Look up a variable.
    ///
    /// # Panics
    ///
    /// Panics if `var` was not allocated by this builder or the function it
    /// rewrites.
    #[inline]
    pub fn var_info(&self, var: VarId) -> &VarInfo {
        &self.vars[var.index()]
    }

    pub fn set_ret_type(&mut self, ty: Type) {
        self.ret_type = Some(ty);
    }

    pub fn infer_shape(&self, expr: &Expr) -> Option<ShapeExpr> {
        infer_shape(expr, &self.vars)
    }

    pub fn infer_type(&self, expr: &Expr) -> Option<Type> {
        infer_type(expr, &self.vars)
    }

    // Scopes

    /// Open a dataflow block.
    pub fn dataflow(&mut self) -> Result<DataflowScope<'_>, BuildError> {
        if self.in_dataflow {
            return Err(BuildError::NestedDataflow);
        }
        self.flush();
        self.in_dataflow = true;
        Ok(DataflowScope::new(self))
    }

    /// Close the open dataflow block, validating that it has outputs.
    fn close_dataflow(&mut self) -> Result<(), BuildError> {
        self.in_dataflow = false;
        let bindings = mem::take(&mut self.pending);
        if bindings.is_empty() {
            return Ok(());
        }
        let has_output = bindings.iter().any(|b| match b {
            Binding::Var { var, .. } => self
                .vars
                .get(var.index())
                .is_some_and(|info| !info.is_dataflow()),
            Binding::MatchShape { .. } => true,
        });
        let block = self.blocks.len();
        self.blocks.push(Block::new(BlockKind::Dataflow, bindings));
        if has_output {
            Ok(())
        } else {
            Err(BuildError::DataflowWithoutOutput { block })
        }
    }

    fn defer(&mut self, err: BuildError) {
        if self.deferred.is_none() {
            self.deferred = Some(err);
        }
    }

    /// End the current plain block so that later bindings start a new one.
    ///
    /// Has no effect inside a dataflow region.
    pub fn seal_block(&mut self) {
        if !self.in_dataflow {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if !self.pending.is_empty() {
            let bindings = mem::take(&mut self.pending);
            self.blocks.push(Block::new(BlockKind::Plain, bindings));
        }
    }

    // Emission

    /// Bind `value` to a fresh variable.
    ///
    /// Inside a dataflow region the variable is a dataflow var (`lvN`),
    /// outside it is a plain var (`gvN`).
    pub fn emit(&mut self, value: impl Into<Expr>) -> Result<VarId, BuildError> {
        let (name, kind) = if self.in_dataflow {
            self.next_lv += 1;
            (format!("lv{}", self.next_lv - 1), VarKind::Dataflow)
        } else {
            self.next_gv += 1;
            (format!("gv{}", self.next_gv - 1), VarKind::Plain)
        };
        Ok(self.bind_fresh(name, kind, value.into()))
    }

    /// Bind `value` to a fresh variable named `name`.
    pub fn emit_named(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Expr>,
    ) -> Result<VarId, BuildError> {
        let kind = if self.in_dataflow {
            VarKind::Dataflow
        } else {
            VarKind::Plain
        };
        Ok(self.bind_fresh(name.into(), kind, value.into()))
    }

    /// Bind `value` to a fresh plain variable that stays visible after the
    /// dataflow block closes.
    pub fn emit_output(&mut self, value: impl Into<Expr>) -> Result<VarId, BuildError> {
        if !self.in_dataflow {
            return Err(BuildError::OutputOutsideDataflow);
        }
        self.next_gv += 1;
        let name = format!("gv{}", self.next_gv - 1);
        Ok(self.bind_fresh(name, VarKind::Plain, value.into()))
    }

    /// Bind `value` to an already-allocated variable.
    ///
    /// The variable's shape annotation must be structurally equal to the
    /// value's inferred shape, and its type compatible with the value's
    /// inferred type, whenever both are known.
    pub fn emit_binding(&mut self, var: VarId, value: impl Into<Expr>) -> Result<(), BuildError> {
        let value = self.normalize(value.into());
        let info = self.lookup(var)?;
        if info.is_dataflow() && !self.in_dataflow {
            return Err(BuildError::DataflowVarOutsideDataflow {
                var: info.name.clone(),
            });
        }
        if let (Some(expected), Some(found)) = (&info.shape, self.infer_shape(&value)) {
            if *expected != found {
                return Err(BuildError::ShapeMismatch {
                    var: info.name.clone(),
                    expected: shape_to_string(expected, &self.sym_vars),
                    found: shape_to_string(&found, &self.sym_vars),
                });
            }
        }
        if let (Some(expected), Some(found)) = (&info.ty, self.infer_type(&value)) {
            if !expected.is_compatible(&found) {
                return Err(BuildError::TypeMismatch {
                    var: info.name.clone(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        self.pending.push(Binding::Var { var, value });
        Ok(())
    }

    /// Bind the shape variables in `pattern` to the runtime shape of `value`.
    pub fn emit_match_shape(
        &mut self,
        value: impl Into<Expr>,
        pattern: impl IntoIterator<Item = PrimExpr>,
    ) -> Result<(), BuildError> {
        self.push_binding(Binding::MatchShape {
            var: None,
            value: value.into(),
            pattern: pattern.into_iter().collect(),
        })
    }

    /// Re-emit an existing binding.
    pub fn push_binding(&mut self, binding: Binding) -> Result<(), BuildError> {
        match binding {
            Binding::Var { var, value } => self.emit_binding(var, value),
            Binding::MatchShape {
                var,
                value,
                pattern,
            } => {
                if let Some(v) = var {
                    let info = self.lookup(v)?;
                    if info.is_dataflow() && !self.in_dataflow {
                        return Err(BuildError::DataflowVarOutsideDataflow {
                            var: info.name.clone(),
                        });
                    }
                }
                let value = self.normalize(value);
                self.pending.push(Binding::MatchShape {
                    var,
                    value,
                    pattern,
                });
                Ok(())
            }
        }
    }

    /// Append a whole block unchanged.
    pub fn push_block(&mut self, block: Block) -> Result<(), BuildError> {
        if self.in_dataflow {
            return Err(BuildError::NestedDataflow);
        }
        if block.bindings().is_empty() {
            return Err(BuildError::EmptyBlock);
        }
        self.flush();
        self.blocks.push(block);
        Ok(())
    }

    /// Finish the function with `body` as its return value.
    ///
    /// Closes any open block, reports errors deferred by dropped dataflow
    /// scopes, and checks the result for well-formedness.
    pub fn finish(mut self, body: impl Into<Expr>) -> Result<Function, BuildError> {
        if self.in_dataflow {
            self.close_dataflow()?;
        }
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        self.flush();
        let func = Function::from_parts(FunctionParts {
            name: self.name,
            params: self.params,
            blocks: self.blocks,
            body: body.into(),
            ret_type: self.ret_type,
            vars: self.vars,
            sym_vars: self.sym_vars,
        });
        well_formed::check(&func)?;
        Ok(func)
    }

    /// [`finish`](Self::finish) with an explicit return type.
    pub fn finish_with_ret_type(
        mut self,
        body: impl Into<Expr>,
        ty: Type,
    ) -> Result<Function, BuildError> {
        self.ret_type = Some(ty);
        self.finish(body)
    }

    // Helpers

    fn lookup(&self, var: VarId) -> Result<&VarInfo, BuildError> {
        self.vars
            .get(var.index())
            .ok_or(BuildError::UnknownVar { raw: var.raw() })
    }

    fn bind_fresh(&mut self, name: String, kind: VarKind, value: Expr) -> VarId {
        let value = self.normalize(value);
        let shape = self.infer_shape(&value);
        let ty = self.infer_type(&value);
        let var = self.fresh_var(VarInfo {
            name,
            kind,
            shape,
            ty,
        });
        self.pending.push(Binding::Var { var, value });
        var
    }

    /// Fill in a call's result shape and type annotations when inferable.
    fn normalize(&self, value: Expr) -> Expr {
        match value {
            Expr::Call(mut call) if call.shape.is_none() || call.ty.is_none() => {
                let expr = Expr::Call(call.clone());
                if call.shape.is_none() {
                    call.shape = infer_shape(&expr, &self.vars);
                }
                if call.ty.is_none() {
                    call.ty = infer_type(&expr, &self.vars);
                }
                Expr::Call(call)
            }
            other => other,
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
