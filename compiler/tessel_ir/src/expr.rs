//! Value expressions, variables, and calls.
//!
//! Every node kind is a closed enum: passes dispatch by exhaustive `match`,
//! so adding a node kind forces every pass to be revisited.
//!
//! Variables are [`VarId`] indices into the owning function's variable
//! arena. Identity is index equality: a pass that keeps a variable returns
//! the same index, a pass that reallocates mints a new one.

use rustc_hash::FxHashMap;

use crate::{DataType, ShapeExpr, Type};

/// Extern symbols the VM runtime provides under fixed names.
pub mod builtin {
    /// Query a tensor's runtime shape.
    pub const SHAPE_OF: &str = "vm.builtin.shape_of";
    /// Allocate the scratch heap that carries shape values.
    pub const ALLOC_SHAPE_HEAP: &str = "vm.builtin.alloc_shape_heap";
}

// ── Variable IDs ────────────────────────────────────────────────────

/// Variable ID within a function.
///
/// IDs are allocated sequentially from 0 and never reused within a
/// function's arena, including across rewrites of that function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct VarId(u32);

impl VarId {
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Visibility class of a variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum VarKind {
    /// Visible in the enclosing scope and every later block.
    Plain,
    /// Visible only inside the dataflow block that binds it.
    Dataflow,
}

/// Arena entry for a variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct VarInfo {
    /// Name hint for printing. Not unique.
    pub name: String,
    pub kind: VarKind,
    pub shape: Option<ShapeExpr>,
    pub ty: Option<Type>,
}

impl VarInfo {
    #[inline]
    pub fn is_dataflow(&self) -> bool {
        self.kind == VarKind::Dataflow
    }
}

// ── Leaves ──────────────────────────────────────────────────────────

/// Scalar literal. Floats are stored as bits so the node stays `Eq + Hash`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Constant {
    Int(i64),
    Float(u64),
    Bool(bool),
}

impl Constant {
    pub fn float(v: f64) -> Self {
        Constant::Float(v.to_bits())
    }

    pub fn dtype(self) -> DataType {
        match self {
            Constant::Int(_) => DataType::Int64,
            Constant::Float(_) => DataType::Float32,
            Constant::Bool(_) => DataType::Bool,
        }
    }
}

/// A function resolved by the host runtime by symbol name at load time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ExternFunc {
    pub global_symbol: String,
}

impl ExternFunc {
    pub fn new(global_symbol: impl Into<String>) -> Self {
        Self {
            global_symbol: global_symbol.into(),
        }
    }
}

/// Reference to a function that lives in the same module.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalVar {
    pub name: String,
}

impl GlobalVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ── Operators ───────────────────────────────────────────────────────

/// Registered operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Op {
    /// Elementwise `a + b`.
    Add,
    /// Elementwise `a * b`.
    Multiply,
    /// Fused `a * b + c`.
    EwiseFma,
    /// `call_dps(shape, extern_fn, (inputs...))`: compute into a fresh
    /// output of `shape`.
    CallDps,
    /// `call_packed(extern_fn, (inputs...), out)`: call by name, writing into
    /// the existing tensor `out`.
    CallPacked,
    /// `alloc_tensor(shape)`: abstract tensor allocation.
    AllocTensor,
    /// `alloc_storage([size_bytes])`: raw untyped storage block.
    VmAllocStorage,
    /// `alloc_tensor(storage, [offset], shape)`: typed view over storage.
    VmAllocTensor,
    /// `store_shape(shape_value, heap)`: write dimensions into heap slots.
    VmStoreShape,
    /// `load_shape(heap)`: read heap slots back as a shape value.
    VmLoadShape,
}

impl Op {
    /// Canonical registered name.
    pub fn name(self) -> &'static str {
        match self {
            Op::Add => "tessel.add",
            Op::Multiply => "tessel.multiply",
            Op::EwiseFma => "tessel.ewise_fma",
            Op::CallDps => "tessel.call_dps",
            Op::CallPacked => "tessel.call_packed",
            Op::AllocTensor => "tessel.builtin.alloc_tensor",
            Op::VmAllocStorage => "tessel.vm.builtin.alloc_storage",
            Op::VmAllocTensor => "tessel.vm.builtin.alloc_tensor",
            Op::VmStoreShape => "tessel.vm.builtin.store_shape",
            Op::VmLoadShape => "tessel.vm.builtin.load_shape",
        }
    }
}

/// What a call invokes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Callee {
    Op(Op),
    Extern(ExternFunc),
    Global(GlobalVar),
}

// ── Attributes ──────────────────────────────────────────────────────

/// Kind of device a storage block lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Device {
    pub kind: DeviceKind,
    pub id: u32,
}

impl Device {
    pub const CPU: Device = Device {
        kind: DeviceKind::Cpu,
        id: 0,
    };
}

/// One dimension of a stored shape and the heap slot it lands in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct ShapeSlot {
    pub dim: usize,
    pub slot: usize,
}

/// Typed call attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum CallAttrs {
    #[default]
    None,
    AllocTensor {
        dtype: DataType,
    },
    AllocStorage {
        alignment: u64,
        device: Device,
        dtype: DataType,
    },
    StoreShape {
        entries: Vec<ShapeSlot>,
    },
    LoadShape {
        slots: Vec<usize>,
    },
}

// ── Calls ───────────────────────────────────────────────────────────

/// An invocation. The only node kind that may have runtime effects.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Call {
    pub callee: Callee,
    pub args: Vec<Expr>,
    pub attrs: CallAttrs,
    /// Result shape annotation. Filled by the builder when inferable.
    pub shape: Option<ShapeExpr>,
    /// Result type annotation. Filled by the builder when inferable.
    pub ty: Option<Type>,
}

impl Call {
    pub fn new(callee: Callee, args: Vec<Expr>) -> Self {
        Self {
            callee,
            args,
            attrs: CallAttrs::None,
            shape: None,
            ty: None,
        }
    }

    pub fn op(op: Op, args: Vec<Expr>) -> Self {
        Self::new(Callee::Op(op), args)
    }

    pub fn extern_func(symbol: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(Callee::Extern(ExternFunc::new(symbol)), args)
    }

    pub fn global(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Self::new(Callee::Global(GlobalVar::new(name)), args)
    }

    #[must_use]
    pub fn with_attrs(mut self, attrs: CallAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    #[must_use]
    pub fn with_shape(mut self, shape: ShapeExpr) -> Self {
        self.shape = Some(shape);
        self
    }

    #[must_use]
    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    #[inline]
    pub fn is_op(&self, op: Op) -> bool {
        self.callee == Callee::Op(op)
    }

    /// Symbol of an extern callee.
    pub fn extern_symbol(&self) -> Option<&str> {
        match &self.callee {
            Callee::Extern(f) => Some(&f.global_symbol),
            Callee::Op(_) | Callee::Global(_) => None,
        }
    }
}

impl From<Call> for Expr {
    fn from(call: Call) -> Self {
        Expr::Call(Box::new(call))
    }
}

// ── Expressions ─────────────────────────────────────────────────────

/// A value expression: the right-hand side of a binding, a call argument,
/// or a function's return value.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    Var(VarId),
    Shape(ShapeExpr),
    Tuple(Vec<Expr>),
    TupleGetItem { tuple: Box<Expr>, index: usize },
    Constant(Constant),
    ExternFunc(ExternFunc),
    GlobalVar(GlobalVar),
    Call(Box<Call>),
}

impl Expr {
    #[inline]
    pub fn as_var(&self) -> Option<VarId> {
        match self {
            Expr::Var(v) => Some(*v),
            _ => None,
        }
    }

    #[inline]
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Expr::Call(call) => Some(call),
            _ => None,
        }
    }

    #[inline]
    pub fn as_shape(&self) -> Option<&ShapeExpr> {
        match self {
            Expr::Shape(shape) => Some(shape),
            _ => None,
        }
    }

    /// Call `f` on every variable read by this expression, left to right.
    pub fn for_each_var(&self, f: &mut impl FnMut(VarId)) {
        match self {
            Expr::Var(v) => f(*v),
            Expr::Tuple(fields) => {
                for field in fields {
                    field.for_each_var(f);
                }
            }
            Expr::TupleGetItem { tuple, .. } => tuple.for_each_var(f),
            Expr::Call(call) => {
                for arg in &call.args {
                    arg.for_each_var(f);
                }
            }
            Expr::Shape(_) | Expr::Constant(_) | Expr::ExternFunc(_) | Expr::GlobalVar(_) => {}
        }
    }

    /// Copy of this expression with variable reads replaced through `map`.
    ///
    /// Unmapped variables are kept. Only read positions are rewritten; an
    /// expression never defines variables.
    #[must_use]
    pub fn substitute(&self, map: &FxHashMap<VarId, VarId>) -> Expr {
        if map.is_empty() {
            return self.clone();
        }
        match self {
            Expr::Var(v) => Expr::Var(map.get(v).copied().unwrap_or(*v)),
            Expr::Tuple(fields) => Expr::Tuple(fields.iter().map(|e| e.substitute(map)).collect()),
            Expr::TupleGetItem { tuple, index } => Expr::TupleGetItem {
                tuple: Box::new(tuple.substitute(map)),
                index: *index,
            },
            Expr::Call(call) => {
                let mut call = call.as_ref().clone();
                call.args = call.args.iter().map(|a| a.substitute(map)).collect();
                Expr::Call(Box::new(call))
            }
            Expr::Shape(_) | Expr::Constant(_) | Expr::ExternFunc(_) | Expr::GlobalVar(_) => {
                self.clone()
            }
        }
    }
}

impl From<VarId> for Expr {
    fn from(v: VarId) -> Self {
        Expr::Var(v)
    }
}

impl From<ShapeExpr> for Expr {
    fn from(shape: ShapeExpr) -> Self {
        Expr::Shape(shape)
    }
}
