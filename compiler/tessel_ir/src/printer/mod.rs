//! Textual form of functions, scalar functions and modules.
//!
//! The output is script-like and meant for humans: tracing output, test
//! failure messages and debugging. It is not parsed back.
//!
//! ```text
//! fn foo(x: Tensor[ndim=2, float32] (m, n)) {
//!   dataflow {
//!     lv0: Tensor[ndim=2, float32] (m, n) = tessel.multiply(x, x)
//!     gv0: Tensor[ndim=2, float32] (m, n) = tessel.add(lv0, x)
//!   }
//!   return gv0
//! }
//! ```

use std::fmt::{self, Write as _};

use crate::{
    Binding, Call, CallAttrs, Callee, Constant, DeviceKind, Expr, Function, Module, ModuleItem,
    PrimExpr, ScalarExpr, ScalarFunction, ShapeExpr, SymVarInfo, VarId,
};

/// Render `shape` using the shape-variable names in `sym_vars`.
pub fn shape_to_string(shape: &ShapeExpr, sym_vars: &[SymVarInfo]) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail.
    let _ = write_shape(&mut out, shape, sym_vars);
    out
}

fn write_shape(out: &mut impl fmt::Write, shape: &ShapeExpr, syms: &[SymVarInfo]) -> fmt::Result {
    out.write_char('(')?;
    for (i, dim) in shape.iter().enumerate() {
        if i > 0 {
            out.write_str(", ")?;
        }
        write_dim(out, dim, syms, 0)?;
    }
    if shape.len() == 1 {
        out.write_char(',')?;
    }
    out.write_char(')')
}

fn write_dim(
    out: &mut impl fmt::Write,
    dim: &PrimExpr,
    syms: &[SymVarInfo],
    parent_prec: u8,
) -> fmt::Result {
    match dim {
        PrimExpr::Int(v) => write!(out, "{v}"),
        PrimExpr::Var(v) => match syms.get(v.index()) {
            Some(info) => out.write_str(&info.name),
            None => write!(out, "?{}", v.raw()),
        },
        PrimExpr::Binary { op, lhs, rhs } => {
            let prec = op.precedence();
            let parens = prec < parent_prec;
            if parens {
                out.write_char('(')?;
            }
            write_dim(out, lhs, syms, prec)?;
            write!(out, " {} ", op.symbol())?;
            // Operators are left-associative.
            write_dim(out, rhs, syms, prec + 1)?;
            if parens {
                out.write_char(')')?;
            }
            Ok(())
        }
    }
}

// ── Functions ───────────────────────────────────────────────────────

struct FunctionPrinter<'a, 'f> {
    func: &'a Function,
    out: &'a mut fmt::Formatter<'f>,
}

impl FunctionPrinter<'_, '_> {
    fn var(&mut self, var: VarId) -> fmt::Result {
        match self.func.vars().get(var.index()) {
            Some(info) => self.out.write_str(&info.name),
            None => write!(self.out, "%{}", var.raw()),
        }
    }

    fn shape(&mut self, shape: &ShapeExpr) -> fmt::Result {
        write_shape(&mut *self.out, shape, self.func.sym_vars())
    }

    fn exprs(&mut self, exprs: &[Expr]) -> fmt::Result {
        for (i, e) in exprs.iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            self.expr(e)?;
        }
        Ok(())
    }

    fn expr(&mut self, expr: &Expr) -> fmt::Result {
        match expr {
            Expr::Var(v) => self.var(*v),
            Expr::Shape(shape) => self.shape(shape),
            Expr::Tuple(fields) => {
                self.out.write_char('(')?;
                self.exprs(fields)?;
                if fields.len() == 1 {
                    self.out.write_char(',')?;
                }
                self.out.write_char(')')
            }
            Expr::TupleGetItem { tuple, index } => {
                self.expr(tuple)?;
                write!(self.out, "[{index}]")
            }
            Expr::Constant(Constant::Int(v)) => write!(self.out, "{v}"),
            Expr::Constant(Constant::Float(bits)) => {
                write!(self.out, "{:?}", f64::from_bits(*bits))
            }
            Expr::Constant(Constant::Bool(v)) => write!(self.out, "{v}"),
            Expr::ExternFunc(f) => write!(self.out, "extern({:?})", f.global_symbol),
            Expr::GlobalVar(g) => write!(self.out, "@{}", g.name),
            Expr::Call(call) => self.call(call),
        }
    }

    fn call(&mut self, call: &Call) -> fmt::Result {
        match &call.callee {
            Callee::Op(op) => self.out.write_str(op.name())?,
            Callee::Extern(f) => write!(self.out, "extern({:?})", f.global_symbol)?,
            Callee::Global(g) => write!(self.out, "@{}", g.name)?,
        }
        self.out.write_char('(')?;
        self.exprs(&call.args)?;
        self.out.write_char(')')?;
        self.attrs(&call.attrs)
    }

    fn attrs(&mut self, attrs: &CallAttrs) -> fmt::Result {
        match attrs {
            CallAttrs::None => Ok(()),
            CallAttrs::AllocTensor { dtype } => write!(self.out, " {{dtype={dtype}}}"),
            CallAttrs::AllocStorage {
                alignment,
                device,
                dtype,
            } => {
                let kind = match device.kind {
                    DeviceKind::Cpu => "cpu",
                    DeviceKind::Gpu => "gpu",
                };
                write!(
                    self.out,
                    " {{alignment={alignment}, device={kind}:{}, dtype={dtype}}}",
                    device.id
                )
            }
            CallAttrs::StoreShape { entries } => {
                self.out.write_str(" {")?;
                for (i, e) in entries.iter().enumerate() {
                    if i > 0 {
                        self.out.write_str(", ")?;
                    }
                    write!(self.out, "{}->{}", e.dim, e.slot)?;
                }
                self.out.write_char('}')
            }
            CallAttrs::LoadShape { slots } => write!(self.out, " {{slots={slots:?}}}"),
        }
    }

    fn var_decl(&mut self, var: VarId) -> fmt::Result {
        self.var(var)?;
        let func = self.func;
        let info = func.var(var);
        if let Some(ty) = &info.ty {
            write!(self.out, ": {ty}")?;
        }
        if let Some(shape) = &info.shape {
            self.out.write_char(' ')?;
            self.shape(shape)?;
        }
        Ok(())
    }

    fn binding(&mut self, binding: &Binding, indent: &str) -> fmt::Result {
        self.out.write_str(indent)?;
        match binding {
            Binding::Var { var, value } => {
                self.var_decl(*var)?;
                self.out.write_str(" = ")?;
                self.expr(value)?;
            }
            Binding::MatchShape {
                var,
                value,
                pattern,
            } => {
                if let Some(var) = var {
                    self.var_decl(*var)?;
                    self.out.write_str(" = ")?;
                }
                self.out.write_str("match_shape(")?;
                self.expr(value)?;
                self.out.write_str(", ")?;
                let pattern: ShapeExpr = pattern.iter().cloned().collect();
                self.shape(&pattern)?;
                self.out.write_char(')')?;
            }
        }
        self.out.write_char('\n')
    }

    fn function(&mut self) -> fmt::Result {
        let func = self.func;
        write!(self.out, "fn {}(", func.name())?;
        for (i, &param) in func.params().iter().enumerate() {
            if i > 0 {
                self.out.write_str(", ")?;
            }
            self.var_decl(param)?;
        }
        self.out.write_char(')')?;
        if let Some(ty) = func.ret_type() {
            write!(self.out, " -> {ty}")?;
        }
        self.out.write_str(" {\n")?;
        for block in func.blocks() {
            let header = if block.is_dataflow() { "dataflow" } else { "block" };
            writeln!(self.out, "  {header} {{")?;
            for binding in block.bindings() {
                self.binding(binding, "    ")?;
            }
            self.out.write_str("  }\n")?;
        }
        self.out.write_str("  return ")?;
        self.expr(func.body())?;
        self.out.write_str("\n}")
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        FunctionPrinter { func: self, out: f }.function()
    }
}

// ── Scalar functions ────────────────────────────────────────────────

fn write_scalar(out: &mut impl fmt::Write, expr: &ScalarExpr, parent_prec: u8) -> fmt::Result {
    match expr {
        ScalarExpr::Int(v) => write!(out, "{v}"),
        ScalarExpr::Load(slot) => write!(out, "heap[{slot}]"),
        ScalarExpr::Binary { op, lhs, rhs } => {
            let prec = op.precedence();
            let parens = prec < parent_prec;
            if parens {
                out.write_char('(')?;
            }
            write_scalar(out, lhs, prec)?;
            write!(out, " {} ", op.symbol())?;
            write_scalar(out, rhs, prec + 1)?;
            if parens {
                out.write_char(')')?;
            }
            Ok(())
        }
    }
}

impl fmt::Display for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "scalar fn {}(heap: int64[{}]) {{", self.name, self.heap_size)?;
        for stmt in &self.body {
            write!(f, "  heap[{}] = ", stmt.slot)?;
            write_scalar(f, &stmt.value, 0)?;
            f.write_char('\n')?;
        }
        f.write_char('}')
    }
}

// ── Modules ─────────────────────────────────────────────────────────

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (_, item)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("\n\n")?;
            }
            match item {
                ModuleItem::Function(func) => write!(f, "{func}")?,
                ModuleItem::Scalar(func) => write!(f, "{func}")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
