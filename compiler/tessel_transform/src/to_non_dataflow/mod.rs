//! Dataflow demotion.
//!
//! Turns every dataflow block into a plain block. Each variable bound inside
//! a dataflow block, internal or output, is reallocated as a fresh plain
//! variable and every read of it is redirected. Params and variables bound
//! in plain blocks keep their identity.
//!
//! This pass must convert everything: a dataflow variable that survives it
//! is an error, not a pass-through.

use rustc_hash::FxHashMap;
use tessel_ir::{Binding, Expr, Function, FunctionBuilder, Module, VarId, VarInfo, VarKind};

use crate::rewrite::{map_functions, substitute_binding};
use crate::{Pass, PassError};

/// Demotes dataflow blocks to plain blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct ToNonDataflow;

impl Pass for ToNonDataflow {
    fn name(&self) -> &'static str {
        "to-non-dataflow"
    }

    fn run(&self, module: &Module) -> Result<Module, PassError> {
        map_functions(module, demote_function)
    }
}

pub(crate) fn demote_function(func: &Function) -> Result<Function, PassError> {
    let mut fb = FunctionBuilder::rewrite(func);
    let mut subst: FxHashMap<VarId, VarId> = FxHashMap::default();
    let mut demoted = 0usize;

    for block in func.blocks() {
        for binding in block.bindings() {
            let binding = substitute_binding(binding, &subst);
            ensure_plain_reads(&fb, func.name(), binding.value())?;

            let binding = match binding.var() {
                Some(var) if block.is_dataflow() => {
                    let info = VarInfo {
                        kind: VarKind::Plain,
                        ..fb.var_info(var).clone()
                    };
                    let fresh = fb.fresh_var(info);
                    subst.insert(var, fresh);
                    demoted += 1;
                    rebind(binding, fresh)
                }
                Some(var) if fb.var_info(var).is_dataflow() => {
                    return Err(unconverted(&fb, func.name(), var));
                }
                _ => binding,
            };
            fb.push_binding(binding)
                .map_err(PassError::build(func.name()))?;
        }
        fb.seal_block();
    }

    let body = func.body().substitute(&subst);
    ensure_plain_reads(&fb, func.name(), &body)?;
    let out = fb.finish(body).map_err(PassError::build(func.name()))?;
    tracing::debug!(function = func.name(), demoted, "demoted dataflow blocks");
    Ok(out)
}

/// `binding` with its defined variable replaced by `var`.
fn rebind(binding: Binding, var: VarId) -> Binding {
    match binding {
        Binding::Var { value, .. } => Binding::Var { var, value },
        Binding::MatchShape { value, pattern, .. } => Binding::MatchShape {
            var: Some(var),
            value,
            pattern,
        },
    }
}

/// Fail on the first dataflow variable `expr` still reads.
fn ensure_plain_reads(fb: &FunctionBuilder, function: &str, expr: &Expr) -> Result<(), PassError> {
    let mut stale = None;
    expr.for_each_var(&mut |v| {
        if stale.is_none() && fb.var_info(v).is_dataflow() {
            stale = Some(v);
        }
    });
    match stale {
        Some(var) => Err(unconverted(fb, function, var)),
        None => Ok(()),
    }
}

fn unconverted(fb: &FunctionBuilder, function: &str, var: VarId) -> PassError {
    PassError::UnconvertedDataflowVar {
        function: function.to_owned(),
        var: fb.var_info(var).name.clone(),
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;
