//! Destination-passing rewrite of `call_dps`.
//!
//! ```text
//! v = call_dps(shape, extern("f"), (a, b))
//! ```
//!
//! becomes an explicit output allocation followed by a call that writes into
//! it, with the destination as the trailing argument:
//!
//! ```text
//! v = builtin.alloc_tensor(shape) {dtype}
//! _ = extern("f")(a, b, v)
//! ```
//!
//! `v` keeps its identity and now names the allocated tensor. The element
//! type comes from `v`'s tensor type, else the first tensor input, else
//! `float32`.

use tessel_ir::{
    Binding, Call, CallAttrs, DataType, Expr, Function, FunctionBuilder, Module, Op, ShapeExpr,
    Type, VarId,
};

use crate::rewrite::{map_functions, rewrite_blocks};
use crate::{Pass, PassError};

/// Splits `call_dps` into allocation plus extern call.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallDpsRewrite;

impl Pass for CallDpsRewrite {
    fn name(&self) -> &'static str {
        "call-dps-rewrite"
    }

    fn run(&self, module: &Module) -> Result<Module, PassError> {
        map_functions(module, rewrite_function)
    }
}

/// Operands of a well-formed `call_dps`.
struct DpsCall<'a> {
    shape: &'a ShapeExpr,
    symbol: &'a str,
    inputs: &'a [Expr],
}

impl<'a> DpsCall<'a> {
    fn parse(call: &'a Call) -> Result<Self, String> {
        let [shape, callee, inputs] = call.args.as_slice() else {
            return Err(format!(
                "call_dps expects 3 arguments, found {}",
                call.args.len()
            ));
        };
        let Expr::Shape(shape) = shape else {
            return Err("call_dps output shape is not a shape expression".to_owned());
        };
        let Expr::ExternFunc(callee) = callee else {
            return Err("call_dps callee is not an extern function".to_owned());
        };
        let Expr::Tuple(inputs) = inputs else {
            return Err("call_dps inputs are not a tuple".to_owned());
        };
        Ok(Self {
            shape,
            symbol: &callee.global_symbol,
            inputs,
        })
    }
}

pub(crate) fn rewrite_function(func: &Function) -> Result<Function, PassError> {
    let mut fb = FunctionBuilder::rewrite(func);
    let mut rewritten = 0usize;

    rewrite_blocks(func, &mut fb, |fb, site, binding| {
        let Binding::Var {
            var,
            value: Expr::Call(call),
        } = binding
        else {
            return fb
                .push_binding(binding.clone())
                .map_err(PassError::build(func.name()));
        };
        if !call.is_op(Op::CallDps) {
            return fb
                .push_binding(binding.clone())
                .map_err(PassError::build(func.name()));
        }

        let dps = DpsCall::parse(call)
            .map_err(|reason| PassError::malformed(func.name(), site.index, reason))?;
        let dtype = output_dtype(fb, *var, dps.inputs);
        let alloc = Call::op(Op::AllocTensor, vec![Expr::Shape(dps.shape.clone())])
            .with_attrs(CallAttrs::AllocTensor { dtype });
        fb.emit_binding(*var, alloc)
            .map_err(PassError::build(func.name()))?;

        let mut args = dps.inputs.to_vec();
        args.push(Expr::Var(*var));
        fb.emit_named("_", Call::extern_func(dps.symbol, args))
            .map_err(PassError::build(func.name()))?;

        tracing::trace!(
            function = func.name(),
            symbol = dps.symbol,
            binding = site.index,
            "rewrote call_dps"
        );
        rewritten += 1;
        Ok(())
    })?;

    let out = fb
        .finish(func.body().clone())
        .map_err(PassError::build(func.name()))?;
    tracing::debug!(function = func.name(), rewritten, "call_dps rewrite");
    Ok(out)
}

fn output_dtype(fb: &FunctionBuilder, var: VarId, inputs: &[Expr]) -> DataType {
    fb.var_info(var)
        .ty
        .as_ref()
        .and_then(Type::tensor_dtype)
        .or_else(|| {
            inputs
                .iter()
                .find_map(|input| fb.infer_type(input)?.tensor_dtype())
        })
        .unwrap_or(DataType::Float32)
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
