//! VM memory lowering.
//!
//! Abstract tensor allocations become a raw storage block plus a typed view
//! over it:
//!
//! ```text
//! v = builtin.alloc_tensor(shape) {dtype}
//! ```
//!
//! becomes
//!
//! ```text
//! storage = vm.builtin.alloc_storage((size_bytes,)) {alignment, device, dtype}
//! v = vm.builtin.alloc_tensor(storage, (0,), shape) {dtype}
//! ```
//!
//! where `size_bytes` is the product of `shape`'s dimensions times the
//! element width, folded where the dimensions are literals.
//!
//! `call_packed(extern("f"), (inputs...), out)` becomes the direct call
//! `extern("f")(inputs..., out)`. Extern symbols are copied verbatim.

use tessel_ir::{
    Binding, Call, CallAttrs, DataType, Device, Expr, Function, FunctionBuilder, Module, Op,
    PrimExpr, ShapeExpr, VarId,
};

use crate::rewrite::{map_functions, rewrite_blocks, Site};
use crate::{Pass, PassError};

/// Lowers allocations to storage plus view and `call_packed` to extern calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VmMemoryLower {
    alignment: u64,
    device: Device,
}

impl VmMemoryLower {
    pub fn new(alignment: u64, device: Device) -> Self {
        Self { alignment, device }
    }

    #[inline]
    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    #[inline]
    pub fn device(&self) -> Device {
        self.device
    }

    fn lower_function(&self, func: &Function) -> Result<Function, PassError> {
        let mut fb = FunctionBuilder::rewrite(func);
        let mut allocations = 0usize;
        let mut packed = 0usize;

        rewrite_blocks(func, &mut fb, |fb, site, binding| {
            if let Binding::Var {
                var,
                value: Expr::Call(call),
            } = binding
            {
                if call.is_op(Op::AllocTensor) {
                    allocations += 1;
                    return self.lower_alloc(fb, func, site, *var, call);
                }
                if call.is_op(Op::CallPacked) {
                    packed += 1;
                    return lower_packed(fb, func, site, *var, call);
                }
            }
            fb.push_binding(binding.clone())
                .map_err(PassError::build(func.name()))
        })?;

        let out = fb
            .finish(func.body().clone())
            .map_err(PassError::build(func.name()))?;
        tracing::debug!(
            function = func.name(),
            allocations,
            packed,
            "vm memory lowering"
        );
        Ok(out)
    }

    fn lower_alloc(
        &self,
        fb: &mut FunctionBuilder,
        func: &Function,
        site: Site,
        var: VarId,
        call: &Call,
    ) -> Result<(), PassError> {
        let malformed = |reason: &str| PassError::malformed(func.name(), site.index, reason);
        let [Expr::Shape(shape)] = call.args.as_slice() else {
            return Err(malformed("alloc_tensor expects a single shape argument"));
        };
        let &CallAttrs::AllocTensor { dtype } = &call.attrs else {
            return Err(malformed("alloc_tensor is missing its dtype attribute"));
        };

        let size = storage_bytes(shape, dtype);
        tracing::trace!(
            function = func.name(),
            var = %fb.var_info(var).name,
            size = ?size,
            "lowered alloc_tensor"
        );
        let storage = Call::op(Op::VmAllocStorage, vec![ShapeExpr::new([size]).into()]).with_attrs(
            CallAttrs::AllocStorage {
                alignment: self.alignment,
                device: self.device,
                dtype,
            },
        );
        let storage = fb
            .emit_named("storage", storage)
            .map_err(PassError::build(func.name()))?;

        let view = Call::op(
            Op::VmAllocTensor,
            vec![
                storage.into(),
                ShapeExpr::from_ints([0]).into(),
                shape.clone().into(),
            ],
        )
        .with_attrs(CallAttrs::AllocTensor { dtype });
        fb.emit_binding(var, view)
            .map_err(PassError::build(func.name()))
    }
}

impl Default for VmMemoryLower {
    fn default() -> Self {
        Self::new(64, Device::CPU)
    }
}

impl Pass for VmMemoryLower {
    fn name(&self) -> &'static str {
        "vm-memory-lower"
    }

    fn run(&self, module: &Module) -> Result<Module, PassError> {
        map_functions(module, |func| self.lower_function(func))
    }
}

/// `num_elements(shape) * dtype.bytes()`, folded.
fn storage_bytes(shape: &ShapeExpr, dtype: DataType) -> PrimExpr {
    PrimExpr::mul(shape.num_elements(), PrimExpr::Int(dtype.bytes()))
}

fn lower_packed(
    fb: &mut FunctionBuilder,
    func: &Function,
    site: Site,
    var: VarId,
    call: &Call,
) -> Result<(), PassError> {
    let malformed = |reason: String| PassError::malformed(func.name(), site.index, reason);
    let [callee, inputs, out] = call.args.as_slice() else {
        return Err(malformed(format!(
            "call_packed expects 3 arguments, found {}",
            call.args.len()
        )));
    };
    let Expr::ExternFunc(callee) = callee else {
        return Err(malformed(
            "call_packed callee is not an extern function".to_owned(),
        ));
    };
    let Expr::Tuple(inputs) = inputs else {
        return Err(malformed("call_packed inputs are not a tuple".to_owned()));
    };

    let mut args = inputs.clone();
    args.push(out.clone());
    tracing::trace!(
        function = func.name(),
        symbol = %callee.global_symbol,
        "lowered call_packed"
    );
    fb.emit_binding(var, Call::extern_func(callee.global_symbol.clone(), args))
        .map_err(PassError::build(func.name()))
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
