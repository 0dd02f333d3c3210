//! Fused multiply-add rewriting.
//!
//! Inside dataflow blocks, an addition whose first operand is the result of
//! a multiplication bound earlier in the same block is fused:
//!
//! ```text
//! t = multiply(a, b)
//! s = add(t, c)        =>    s = ewise_fma(a, b, c)
//! ```
//!
//! The multiplication must have no other reader anywhere in the function,
//! including the return value. Its binding is left in place; it is dead
//! after the rewrite and general dead-code elimination is out of scope.
//!
//! `s` keeps its identity when the fused call's inferred shape and type are
//! equal to `s`'s annotations. Otherwise a fresh variable of the same kind
//! is bound and later reads of `s` are redirected to it.
//!
//! Plain blocks are copied unchanged apart from that redirection.

use rustc_hash::FxHashMap;
use tessel_ir::visitor::count_var_uses;
use tessel_ir::{Binding, Call, Expr, Function, FunctionBuilder, Module, Op, VarId, VarInfo};

use crate::rewrite::{map_functions, rewrite_blocks, substitute_binding};
use crate::{Pass, PassError};

/// Fuses `add(multiply(a, b), c)` into `ewise_fma(a, b, c)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FmaRewrite;

impl Pass for FmaRewrite {
    fn name(&self) -> &'static str {
        "fma-rewrite"
    }

    fn run(&self, module: &Module) -> Result<Module, PassError> {
        map_functions(module, rewrite_function)
    }
}

/// Fuse multiply-add pairs in one function.
pub(crate) fn rewrite_function(func: &Function) -> Result<Function, PassError> {
    let uses = count_var_uses(func);
    let mut fb = FunctionBuilder::rewrite(func);
    let mut subst: FxHashMap<VarId, VarId> = FxHashMap::default();
    // Operands of multiplications bound in the current dataflow block.
    let mut products: FxHashMap<VarId, (Expr, Expr)> = FxHashMap::default();
    let mut current_block = usize::MAX;
    let mut fused = 0usize;

    rewrite_blocks(func, &mut fb, |fb, site, binding| {
        if site.block != current_block {
            products.clear();
            current_block = site.block;
        }
        let binding = substitute_binding(binding, &subst);
        let dataflow = fb.is_in_dataflow();

        let Binding::Var { var, value } = &binding else {
            return fb.push_binding(binding).map_err(PassError::build(func.name()));
        };
        let Some(call) = value.as_call().filter(|_| dataflow) else {
            return fb.push_binding(binding).map_err(PassError::build(func.name()));
        };

        if call.is_op(Op::Multiply) && call.args.len() == 2 {
            products.insert(*var, (call.args[0].clone(), call.args[1].clone()));
        } else if let Some((a, b, c)) = fusable(call, &products, &uses) {
            let fma: Expr = Call::op(Op::EwiseFma, vec![a, b, c]).into();
            let shape = fb.infer_shape(&fma);
            let ty = fb.infer_type(&fma);
            let info = fb.var_info(*var);
            let target = if info.shape == shape && info.ty == ty {
                *var
            } else {
                let fresh = fb.fresh_var(VarInfo {
                    name: info.name.clone(),
                    kind: info.kind,
                    shape,
                    ty,
                });
                subst.insert(*var, fresh);
                fresh
            };
            tracing::trace!(
                function = func.name(),
                var = %fb.var_info(target).name,
                reused = target == *var,
                "fused multiply-add"
            );
            fused += 1;
            return fb
                .emit_binding(target, fma)
                .map_err(PassError::build(func.name()));
        }
        fb.push_binding(binding)
            .map_err(PassError::build(func.name()))
    })?;

    let body = func.body().substitute(&subst);
    let out = fb.finish(body).map_err(PassError::build(func.name()))?;
    tracing::debug!(function = func.name(), fused, "fma rewrite");
    Ok(out)
}

/// Operands `(a, b, c)` if `call` is `add(t, c)` with `t` a single-use
/// product from the current block.
fn fusable(
    call: &Call,
    products: &FxHashMap<VarId, (Expr, Expr)>,
    uses: &FxHashMap<VarId, usize>,
) -> Option<(Expr, Expr, Expr)> {
    if !call.is_op(Op::Add) || call.args.len() != 2 {
        return None;
    }
    let t = call.args[0].as_var()?;
    if uses.get(&t).copied() != Some(1) {
        return None;
    }
    let (a, b) = products.get(&t)?;
    Some((a.clone(), b.clone(), call.args[1].clone()))
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
