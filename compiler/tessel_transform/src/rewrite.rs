//! Helpers shared by passes that rewrite bindings one at a time.

use rustc_hash::FxHashMap;
use tessel_ir::{Binding, Function, FunctionBuilder, Module, ModuleItem, VarId};

use crate::PassError;

/// Apply `lower` to every tensor function of `module`, keeping item order.
/// Scalar functions are copied unchanged.
pub(crate) fn map_functions(
    module: &Module,
    mut lower: impl FnMut(&Function) -> Result<Function, PassError>,
) -> Result<Module, PassError> {
    let mut out = Module::new();
    for (name, item) in module.iter() {
        let item = match item {
            ModuleItem::Function(func) => ModuleItem::Function(lower(func)?),
            ModuleItem::Scalar(func) => ModuleItem::Scalar(func.clone()),
        };
        out.insert(name, item);
    }
    Ok(out)
}

/// Position of a binding in its function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Site {
    /// Program-order index across all blocks.
    pub index: usize,
    pub block: usize,
}

/// Re-emit every block of `func` through `fb`, preserving block kinds and
/// boundaries.
///
/// `emit` is called once per binding and is responsible for emitting the
/// binding's replacement. Dataflow blocks are emitted inside a dataflow
/// scope, so `fb.is_in_dataflow()` tells the callback which kind it is in.
pub(crate) fn rewrite_blocks(
    func: &Function,
    fb: &mut FunctionBuilder,
    mut emit: impl FnMut(&mut FunctionBuilder, Site, &Binding) -> Result<(), PassError>,
) -> Result<(), PassError> {
    let mut index = 0;
    for (block_index, block) in func.blocks().iter().enumerate() {
        if block.is_dataflow() {
            let mut scope = fb.dataflow().map_err(PassError::build(func.name()))?;
            let df: &mut FunctionBuilder = &mut scope;
            for binding in block.bindings() {
                let site = Site {
                    index,
                    block: block_index,
                };
                emit(df, site, binding)?;
                index += 1;
            }
            scope.finish().map_err(PassError::build(func.name()))?;
        } else {
            for binding in block.bindings() {
                let site = Site {
                    index,
                    block: block_index,
                };
                emit(fb, site, binding)?;
                index += 1;
            }
            fb.seal_block();
        }
    }
    Ok(())
}

/// Copy of `binding` with variable reads replaced through `map`. The bound
/// variable itself is not renamed.
pub(crate) fn substitute_binding(binding: &Binding, map: &FxHashMap<VarId, VarId>) -> Binding {
    match binding {
        Binding::Var { var, value } => Binding::Var {
            var: *var,
            value: value.substitute(map),
        },
        Binding::MatchShape {
            var,
            value,
            pattern,
        } => Binding::MatchShape {
            var: *var,
            value: value.substitute(map),
            pattern: pattern.clone(),
        },
    }
}
