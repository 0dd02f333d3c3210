//! VM shape lowering.
//!
//! The VM has no symbolic integers. Every function whose values mention a
//! symbolic shape is rewritten to pass shape values through a runtime
//! *shape heap*: a flat `int64` tensor with one slot per shape variable and
//! one per distinct computed dimension.
//!
//! # Stages
//!
//! 1. **Allocate.** The first block allocates the heap:
//!    `shape_heap = extern("vm.builtin.alloc_shape_heap")((slots,))`.
//! 2. **Store.** For each parameter whose annotation introduces shape
//!    variables, `sh = extern("vm.builtin.shape_of")(param)` followed by
//!    `store_shape(sh, shape_heap) {dim->slot, ...}`. Then the original
//!    bindings in order: `match_shape` stores its first-occurrence variables
//!    (querying `shape_of` when the value is a tensor) and aliases its
//!    variable if it binds one; symbolic shapes inside other values become
//!    `load_shape(shape_heap) {slots}`.
//! 3. **Compute.** Right before a load that reads a computed slot which is
//!    not current, a new block starts with `_ = @shape_func(shape_heap)`.
//!    The generated [`ScalarFunction`] recomputes every computed slot from
//!    the variable slots. A computed slot becomes current at the first call
//!    made after all of its variables are stored, so a function whose shape
//!    values depend on variables bound at different points calls it once per
//!    such point. Slots whose variables are still unset hold unspecified
//!    values until a later call refreshes them; they are never loaded before
//!    that.
//! 4. **Return.** Shapes in the return value are loaded in a final block.
//!
//! Functions without symbolic shape values are returned unchanged. The
//! scalar function is only generated, and only invoked, when the function
//! has computed slots. Generated scalar functions are appended to the module
//! after the existing items, with `_1`, `_2`, ... suffixes added to the base
//! name until it is unique.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tessel_ir::expr::builtin;
use tessel_ir::{
    Binding, Call, CallAttrs, Expr, Function, FunctionBuilder, Module, ModuleItem, Op, PrimExpr,
    ScalarExpr, ScalarFunction, ScalarStmt, ShapeExpr, ShapeSlot, SymVarId, Type, VarId,
};

use crate::{Pass, PassError};

/// Moves symbolic shapes into a runtime heap and extracts shape arithmetic
/// into generated scalar functions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VmShapeLower {
    shape_func_name: String,
}

impl VmShapeLower {
    /// Lowering that names its scalar functions after `shape_func_name`.
    pub fn new(shape_func_name: impl Into<String>) -> Self {
        Self {
            shape_func_name: shape_func_name.into(),
        }
    }

    #[inline]
    pub fn shape_func_name(&self) -> &str {
        &self.shape_func_name
    }

    /// The base name, suffixed until it is not in `taken`. The result is
    /// added to `taken`.
    fn claim_name(&self, taken: &mut FxHashSet<String>) -> String {
        let base = &self.shape_func_name;
        let mut name = base.clone();
        let mut suffix = 0usize;
        while taken.contains(&name) {
            suffix += 1;
            name = format!("{base}_{suffix}");
        }
        taken.insert(name.clone());
        name
    }
}

impl Default for VmShapeLower {
    fn default() -> Self {
        Self::new("shape_func")
    }
}

impl Pass for VmShapeLower {
    fn name(&self) -> &'static str {
        "vm-shape-lower"
    }

    fn run(&self, module: &Module) -> Result<Module, PassError> {
        let mut taken: FxHashSet<String> =
            module.iter().map(|(name, _)| name.to_owned()).collect();
        let mut generated = Vec::new();
        let mut out = Module::new();

        for (name, item) in module.iter() {
            let item = match item {
                ModuleItem::Function(func) => {
                    let Some(plan) = SlotPlan::build(func)? else {
                        out.insert(name, item.clone());
                        continue;
                    };
                    let shape_func = plan.has_computed().then(|| self.claim_name(&mut taken));
                    let (lowered, scalar) = Lowering::new(func, plan, shape_func)?.run()?;
                    generated.extend(scalar);
                    ModuleItem::Function(lowered)
                }
                ModuleItem::Scalar(scalar) => ModuleItem::Scalar(scalar.clone()),
            };
            out.insert(name, item);
        }

        for scalar in generated {
            out.insert(scalar.name.clone(), ModuleItem::Scalar(scalar));
        }
        Ok(out)
    }
}

// ── Slot planning ───────────────────────────────────────────────────

/// Heap layout for one function.
///
/// Shape variables take the first slots, in binding order. Computed
/// dimensions follow in the order they are first encountered.
#[derive(Debug, Default)]
struct SlotPlan {
    slots: FxHashMap<PrimExpr, usize>,
    /// Shape variable stored in each variable slot.
    sym_slots: Vec<SymVarId>,
    /// `(slot, dimension)` for every computed slot, in slot order.
    computed: Vec<(usize, PrimExpr)>,
}

impl SlotPlan {
    /// `None` when `func` has no symbolic shape values.
    fn build(func: &Function) -> Result<Option<Self>, PassError> {
        let mut shapes = Vec::new();
        for binding in func.bindings() {
            collect_symbolic_shapes(binding.value(), &mut shapes);
        }
        collect_symbolic_shapes(func.body(), &mut shapes);
        if shapes.is_empty() {
            return Ok(None);
        }

        let mut plan = SlotPlan::default();
        for &param in func.params() {
            if let Some(shape) = &func.var(param).shape {
                plan.assign_vars(shape.dims());
            }
        }
        for binding in func.bindings() {
            if let Binding::MatchShape { pattern, .. } = binding {
                plan.assign_vars(pattern);
            }
        }

        for shape in shapes {
            for dim in shape {
                if plan.slots.contains_key(dim) {
                    continue;
                }
                let mut unbound = None;
                dim.for_each_sym_var(&mut |s| {
                    if unbound.is_none() && !plan.slots.contains_key(&PrimExpr::Var(s)) {
                        unbound = Some(s);
                    }
                });
                if let Some(s) = unbound {
                    return Err(PassError::UnboundShapeVar {
                        function: func.name().to_owned(),
                        var: func.sym_var(s).name.clone(),
                    });
                }
                let slot = plan.slots.len();
                plan.slots.insert(dim.clone(), slot);
                plan.computed.push((slot, dim.clone()));
            }
        }
        Ok(Some(plan))
    }

    fn assign_vars(&mut self, dims: &[PrimExpr]) {
        for dim in dims {
            if let PrimExpr::Var(s) = dim {
                if !self.slots.contains_key(dim) {
                    self.slots.insert(dim.clone(), self.slots.len());
                    self.sym_slots.push(*s);
                }
            }
        }
    }

    #[inline]
    fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn has_computed(&self) -> bool {
        !self.computed.is_empty()
    }

    #[inline]
    fn slot(&self, dim: &PrimExpr) -> Option<usize> {
        self.slots.get(dim).copied()
    }

    /// The shape variable stored in `slot`, if it is a variable slot.
    #[inline]
    fn sym_of(&self, slot: usize) -> Option<SymVarId> {
        self.sym_slots.get(slot).copied()
    }

    /// Translate a dimension to heap arithmetic.
    fn to_scalar(&self, dim: &PrimExpr) -> Option<ScalarExpr> {
        Some(match dim {
            PrimExpr::Int(v) => ScalarExpr::Int(*v),
            PrimExpr::Var(_) => ScalarExpr::Load(self.slot(dim)?),
            PrimExpr::Binary { op, lhs, rhs } => ScalarExpr::Binary {
                op: *op,
                lhs: Box::new(self.to_scalar(lhs)?),
                rhs: Box::new(self.to_scalar(rhs)?),
            },
        })
    }
}

/// Push every symbolic shape value reachable from `expr`, left to right.
/// Call annotations are not values and are skipped.
fn collect_symbolic_shapes<'e>(expr: &'e Expr, out: &mut Vec<&'e ShapeExpr>) {
    match expr {
        Expr::Shape(shape) => {
            if shape.is_symbolic() {
                out.push(shape);
            }
        }
        Expr::Tuple(fields) => {
            for field in fields {
                collect_symbolic_shapes(field, out);
            }
        }
        Expr::TupleGetItem { tuple, .. } => collect_symbolic_shapes(tuple, out),
        Expr::Call(call) => {
            for arg in &call.args {
                collect_symbolic_shapes(arg, out);
            }
        }
        Expr::Var(_) | Expr::Constant(_) | Expr::ExternFunc(_) | Expr::GlobalVar(_) => {}
    }
}

// ── Lowering ────────────────────────────────────────────────────────

/// Rewriting state for one function.
struct Lowering<'f> {
    func: &'f Function,
    fb: FunctionBuilder,
    plan: SlotPlan,
    /// Name of the scalar function, when the plan has computed slots.
    shape_func: Option<String>,
    heap: VarId,
    /// Variable slots written so far.
    stored: Vec<bool>,
    /// Computed slots holding their final value.
    current: Vec<bool>,
    invocations: usize,
    stores: usize,
    loads: usize,
}

impl<'f> Lowering<'f> {
    /// Start the rewrite with the heap allocation block.
    fn new(
        func: &'f Function,
        plan: SlotPlan,
        shape_func: Option<String>,
    ) -> Result<Self, PassError> {
        let mut fb = FunctionBuilder::rewrite(func);
        let heap_size = i64::try_from(plan.len()).unwrap_or(i64::MAX);
        let heap = fb
            .emit_named(
                "shape_heap",
                Call::extern_func(
                    builtin::ALLOC_SHAPE_HEAP,
                    vec![ShapeExpr::from_ints([heap_size]).into()],
                ),
            )
            .map_err(PassError::build(func.name()))?;
        fb.seal_block();

        let stored = vec![false; plan.len()];
        let current = vec![false; plan.len()];
        Ok(Self {
            func,
            fb,
            plan,
            shape_func,
            heap,
            stored,
            current,
            invocations: 0,
            stores: 0,
            loads: 0,
        })
    }

    fn run(mut self) -> Result<(Function, Option<ScalarFunction>), PassError> {
        let func = self.func;

        for &param in func.params() {
            let Some(shape) = &func.var(param).shape else {
                continue;
            };
            let entries = self.new_entries(shape.dims());
            if !entries.is_empty() {
                let sh = self.emit(
                    "sh",
                    Call::extern_func(builtin::SHAPE_OF, vec![param.into()]),
                )?;
                self.store(sh.into(), entries)?;
            }
        }

        for (index, binding) in func.bindings().enumerate() {
            self.lower_binding(index, binding)?;
        }

        self.fb.seal_block();
        let body = self.lower_value(func.body())?;

        let scalar = match self.shape_func.take() {
            Some(name) => Some(self.scalar_function(name)?),
            None => None,
        };
        tracing::debug!(
            function = func.name(),
            slots = self.plan.len(),
            computed = self.plan.computed.len(),
            invocations = self.invocations,
            stores = self.stores,
            loads = self.loads,
            "vm shape lowering"
        );
        let out = self.fb.finish(body).map_err(PassError::build(func.name()))?;
        Ok((out, scalar))
    }

    fn lower_binding(&mut self, index: usize, binding: &Binding) -> Result<(), PassError> {
        if let Some(var) = binding.var() {
            if self.fb.var_info(var).is_dataflow() {
                return Err(PassError::UnconvertedDataflowVar {
                    function: self.func.name().to_owned(),
                    var: self.fb.var_info(var).name.clone(),
                });
            }
        }

        match binding {
            Binding::Var { var, value } => {
                let value = self.lower_value(value)?;
                self.fb
                    .emit_binding(*var, value)
                    .map_err(PassError::build(self.func.name()))
            }
            Binding::MatchShape {
                var,
                value,
                pattern,
            } => {
                let value = self.lower_value(value)?;
                let entries = self.new_entries(pattern);
                if !entries.is_empty() {
                    let shape = match self.fb.infer_type(&value) {
                        Some(Type::Shape { .. }) => value.clone(),
                        _ => self
                            .emit(
                                "sh",
                                Call::extern_func(builtin::SHAPE_OF, vec![value.clone()]),
                            )?
                            .into(),
                    };
                    self.store(shape, entries)?;
                }
                tracing::trace!(
                    function = self.func.name(),
                    binding = index,
                    "lowered match_shape"
                );
                match var {
                    Some(var) => self
                        .fb
                        .emit_binding(*var, value)
                        .map_err(PassError::build(self.func.name())),
                    None => Ok(()),
                }
            }
        }
    }

    /// Copy of `expr` with every symbolic shape replaced by a heap load.
    fn lower_value(&mut self, expr: &Expr) -> Result<Expr, PassError> {
        Ok(match expr {
            Expr::Shape(shape) if shape.is_symbolic() => Expr::Var(self.load(shape)?),
            Expr::Tuple(fields) => Expr::Tuple(
                fields
                    .iter()
                    .map(|f| self.lower_value(f))
                    .collect::<Result<_, _>>()?,
            ),
            Expr::TupleGetItem { tuple, index } => Expr::TupleGetItem {
                tuple: Box::new(self.lower_value(tuple)?),
                index: *index,
            },
            Expr::Call(call) => {
                let mut call = call.as_ref().clone();
                call.args = call
                    .args
                    .iter()
                    .map(|a| self.lower_value(a))
                    .collect::<Result<_, _>>()?;
                Expr::Call(Box::new(call))
            }
            Expr::Var(_)
            | Expr::Shape(_)
            | Expr::Constant(_)
            | Expr::ExternFunc(_)
            | Expr::GlobalVar(_) => expr.clone(),
        })
    }

    /// `(dim, slot)` for every variable in `dims` that has not been stored.
    fn new_entries(&self, dims: &[PrimExpr]) -> Vec<ShapeSlot> {
        let mut entries: Vec<ShapeSlot> = Vec::new();
        for (dim, expr) in dims.iter().enumerate() {
            let Some(slot) = expr.as_var().and(self.plan.slot(expr)) else {
                continue;
            };
            if !self.stored[slot] && entries.iter().all(|e| e.slot != slot) {
                entries.push(ShapeSlot { dim, slot });
            }
        }
        entries
    }

    fn store(&mut self, shape: Expr, entries: Vec<ShapeSlot>) -> Result<(), PassError> {
        for entry in &entries {
            self.stored[entry.slot] = true;
        }
        self.emit(
            "_",
            Call::op(Op::VmStoreShape, vec![shape, self.heap.into()])
                .with_attrs(CallAttrs::StoreShape { entries }),
        )?;
        self.stores += 1;
        Ok(())
    }

    fn load(&mut self, shape: &ShapeExpr) -> Result<VarId, PassError> {
        let mut slots: SmallVec<[usize; 4]> = SmallVec::new();
        let mut stale = false;
        for dim in shape {
            let slot = self.plan.slot(dim).ok_or_else(|| self.unbound(dim))?;
            match self.plan.sym_of(slot) {
                Some(s) if !self.stored[slot] => return Err(self.not_ready(s)),
                Some(_) => {}
                None => {
                    if let Some(s) = self.first_unstored(dim) {
                        return Err(self.not_ready(s));
                    }
                    stale |= !self.current[slot];
                }
            }
            slots.push(slot);
        }
        if stale {
            self.invoke_shape_func()?;
        }

        let shape_value = self.emit(
            "shape",
            Call::op(Op::VmLoadShape, vec![self.heap.into()]).with_attrs(CallAttrs::LoadShape {
                slots: slots.to_vec(),
            }),
        )?;
        self.loads += 1;
        Ok(shape_value)
    }

    /// Start a new block with a shape function call. Every computed slot
    /// whose variables are stored by now is current afterwards.
    fn invoke_shape_func(&mut self) -> Result<(), PassError> {
        let Some(name) = self.shape_func.clone() else {
            return Ok(());
        };
        self.fb.seal_block();
        self.emit("_", Call::global(name, vec![self.heap.into()]))?;
        for (slot, dim) in &self.plan.computed {
            if self.first_unstored(dim).is_none() {
                self.current[*slot] = true;
            }
        }
        self.invocations += 1;
        Ok(())
    }

    /// First shape variable read by `dim` whose slot is not stored yet.
    fn first_unstored(&self, dim: &PrimExpr) -> Option<SymVarId> {
        let mut missing = None;
        dim.for_each_sym_var(&mut |s| {
            let stored = self
                .plan
                .slot(&PrimExpr::Var(s))
                .is_some_and(|slot| self.stored[slot]);
            if missing.is_none() && !stored {
                missing = Some(s);
            }
        });
        missing
    }

    fn scalar_function(&self, name: String) -> Result<ScalarFunction, PassError> {
        let body = self
            .plan
            .computed
            .iter()
            .map(|(slot, dim)| {
                let value = self.plan.to_scalar(dim).ok_or_else(|| self.unbound(dim))?;
                Ok(ScalarStmt { slot: *slot, value })
            })
            .collect::<Result<Vec<_>, PassError>>()?;
        Ok(ScalarFunction {
            name,
            heap_size: self.plan.len(),
            body,
        })
    }

    fn emit(&mut self, name: &str, call: Call) -> Result<VarId, PassError> {
        self.fb
            .emit_named(name, call)
            .map_err(PassError::build(self.func.name()))
    }

    fn unbound(&self, dim: &PrimExpr) -> PassError {
        let mut name = None;
        dim.for_each_sym_var(&mut |s| {
            if name.is_none() && self.plan.slot(&PrimExpr::Var(s)).is_none() {
                name = Some(self.func.sym_var(s).name.clone());
            }
        });
        PassError::UnboundShapeVar {
            function: self.func.name().to_owned(),
            var: name.unwrap_or_else(|| format!("{dim:?}")),
        }
    }

    fn not_ready(&self, var: SymVarId) -> PassError {
        PassError::ShapeVarNotReady {
            function: self.func.name().to_owned(),
            var: self.func.sym_var(var).name.clone(),
        }
    }
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
