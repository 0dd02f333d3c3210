//! Bindings, blocks, and functions.
//!
//! A [`Function`] owns two arenas: its variables ([`VarInfo`] indexed by
//! [`VarId`]) and its shape variables ([`SymVarInfo`] indexed by
//! [`SymVarId`]). A rewritten function inherits its source's arenas and only
//! appends to them, so a pass can keep a variable by returning its index or
//! reallocate it by minting a new one, and callers can compare the two.
//!
//! Functions are immutable. They are created only by
//! [`FunctionBuilder::finish`](crate::FunctionBuilder::finish).

use crate::{Expr, PrimExpr, SymVarId, SymVarInfo, Type, VarId, VarInfo};

// ── Bindings ────────────────────────────────────────────────────────

/// A single binding in a block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum Binding {
    /// `var = value`.
    Var { var: VarId, value: Expr },

    /// `[var =] match_shape(value, pattern)`.
    ///
    /// Binds every shape variable in `pattern` that is not yet bound to the
    /// corresponding runtime dimension of `value` (a shape or a tensor).
    /// If `var` is present it is bound to `value` as well.
    MatchShape {
        var: Option<VarId>,
        value: Expr,
        pattern: Vec<PrimExpr>,
    },
}

impl Binding {
    /// The variable this binding defines, if any.
    pub fn var(&self) -> Option<VarId> {
        match self {
            Binding::Var { var, .. } => Some(*var),
            Binding::MatchShape { var, .. } => *var,
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            Binding::Var { value, .. } | Binding::MatchShape { value, .. } => value,
        }
    }
}

// ── Blocks ──────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockKind {
    Plain,
    /// Pure region. Bindings to dataflow vars are invisible after the block;
    /// bindings to plain vars are the block's outputs.
    Dataflow,
}

/// A non-empty, ordered sequence of bindings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    kind: BlockKind,
    bindings: Vec<Binding>,
}

impl Block {
    pub(crate) fn new(kind: BlockKind, bindings: Vec<Binding>) -> Self {
        Self { kind, bindings }
    }

    #[inline]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[inline]
    pub fn is_dataflow(&self) -> bool {
        self.kind == BlockKind::Dataflow
    }

    #[inline]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }
}

// ── Functions ───────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    name: String,
    params: Vec<VarId>,
    blocks: Vec<Block>,
    body: Expr,
    ret_type: Option<Type>,
    vars: Vec<VarInfo>,
    sym_vars: Vec<SymVarInfo>,
}

/// Everything [`Function`] is made of, handed over by the builder.
pub(crate) struct FunctionParts {
    pub name: String,
    pub params: Vec<VarId>,
    pub blocks: Vec<Block>,
    pub body: Expr,
    pub ret_type: Option<Type>,
    pub vars: Vec<VarInfo>,
    pub sym_vars: Vec<SymVarInfo>,
}

impl Function {
    pub(crate) fn from_parts(parts: FunctionParts) -> Self {
        Self {
            name: parts.name,
            params: parts.params,
            blocks: parts.blocks,
            body: parts.body,
            ret_type: parts.ret_type,
            vars: parts.vars,
            sym_vars: parts.sym_vars,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn params(&self) -> &[VarId] {
        &self.params
    }

    #[inline]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The return expression.
    #[inline]
    pub fn body(&self) -> &Expr {
        &self.body
    }

    #[inline]
    pub fn ret_type(&self) -> Option<&Type> {
        self.ret_type.as_ref()
    }

    /// Look up a variable.
    ///
    /// # Panics
    ///
    /// Panics if `var` does not belong to this function's arena.
    #[inline]
    pub fn var(&self, var: VarId) -> &VarInfo {
        debug_assert!(
            var.index() < self.vars.len(),
            "VarId {} out of bounds (have {} vars)",
            var.raw(),
            self.vars.len(),
        );
        &self.vars[var.index()]
    }

    /// The whole variable arena, indexed by [`VarId::index`].
    #[inline]
    pub fn vars(&self) -> &[VarInfo] {
        &self.vars
    }

    /// Look up a shape variable.
    ///
    /// # Panics
    ///
    /// Panics if `var` does not belong to this function's arena.
    #[inline]
    pub fn sym_var(&self, var: SymVarId) -> &SymVarInfo {
        debug_assert!(
            var.index() < self.sym_vars.len(),
            "SymVarId {} out of bounds (have {} shape vars)",
            var.raw(),
            self.sym_vars.len()
        );
        &self.sym_vars[var.index()]
    }

    #[inline]
    pub fn sym_vars(&self) -> &[SymVarInfo] {
        &self.sym_vars
    }

    /// Iterate all bindings in program order.
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.blocks.iter().flat_map(|b| b.bindings.iter())
    }
}
