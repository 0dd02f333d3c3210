//! Function traversal.
//!
//! A [`Visitor`] walks a function's params, blocks, bindings and
//! expressions. Default implementations call the `walk_*` functions, which
//! traverse children; override `visit_*` methods to add behavior at specific
//! nodes and call the matching `walk_*` to keep descending.
//!
//! [`post_order_visit`] is the closure-based entry point used by passes and
//! tests. Its order is fixed:
//!
//! 1. each parameter, in declaration order
//! 2. for each block, for each binding: the value's sub-expressions in
//!    post-order, the value itself, then the bound variable's definition
//!    and the binding; after its last binding, the block
//! 3. the body expression, in post-order
//!
//! Every occurrence is reported, so a variable read twice appears twice.

use rustc_hash::FxHashMap;

use crate::{Binding, Block, Expr, Function, VarId};

/// Traversal hooks.
pub trait Visitor<'f> {
    fn visit_function(&mut self, func: &'f Function) {
        walk_function(self, func);
    }

    fn visit_param(&mut self, var: VarId) {
        let _ = var;
    }

    fn visit_block(&mut self, block: &'f Block) {
        walk_block(self, block);
    }

    fn visit_binding(&mut self, binding: &'f Binding) {
        walk_binding(self, binding);
    }

    /// The variable a binding defines.
    fn visit_var_def(&mut self, var: VarId) {
        let _ = var;
    }

    fn visit_expr(&mut self, expr: &'f Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_function<'f, V: Visitor<'f> + ?Sized>(visitor: &mut V, func: &'f Function) {
    for &param in func.params() {
        visitor.visit_param(param);
    }
    for block in func.blocks() {
        visitor.visit_block(block);
    }
    visitor.visit_expr(func.body());
}

pub fn walk_block<'f, V: Visitor<'f> + ?Sized>(visitor: &mut V, block: &'f Block) {
    for binding in block.bindings() {
        visitor.visit_binding(binding);
    }
}

pub fn walk_binding<'f, V: Visitor<'f> + ?Sized>(visitor: &mut V, binding: &'f Binding) {
    visitor.visit_expr(binding.value());
    if let Some(var) = binding.var() {
        visitor.visit_var_def(var);
    }
}

pub fn walk_expr<'f, V: Visitor<'f> + ?Sized>(visitor: &mut V, expr: &'f Expr) {
    match expr {
        Expr::Tuple(fields) => {
            for field in fields {
                visitor.visit_expr(field);
            }
        }
        Expr::TupleGetItem { tuple, .. } => visitor.visit_expr(tuple),
        Expr::Call(call) => {
            for arg in &call.args {
                visitor.visit_expr(arg);
            }
        }
        Expr::Var(_)
        | Expr::Shape(_)
        | Expr::Constant(_)
        | Expr::ExternFunc(_)
        | Expr::GlobalVar(_) => {}
    }
}

// ── Post-order ──────────────────────────────────────────────────────

/// A node reported by [`post_order_visit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Node<'f> {
    Param(VarId),
    /// Definition site of a binding's variable.
    VarDef(VarId),
    /// An expression. `Expr::Var` nodes are variable uses.
    Expr(&'f Expr),
    Binding(&'f Binding),
    Block(&'f Block),
}

impl Node<'_> {
    /// The variable at this node, for params, definitions and uses.
    pub fn var(&self) -> Option<VarId> {
        match self {
            Node::Param(v) | Node::VarDef(v) => Some(*v),
            Node::Expr(expr) => expr.as_var(),
            Node::Binding(_) | Node::Block(_) => None,
        }
    }
}

struct PostOrder<F> {
    f: F,
}

impl<'f, F: FnMut(Node<'f>)> Visitor<'f> for PostOrder<F> {
    fn visit_param(&mut self, var: VarId) {
        (self.f)(Node::Param(var));
    }

    fn visit_block(&mut self, block: &'f Block) {
        walk_block(self, block);
        (self.f)(Node::Block(block));
    }

    fn visit_binding(&mut self, binding: &'f Binding) {
        walk_binding(self, binding);
        (self.f)(Node::Binding(binding));
    }

    fn visit_var_def(&mut self, var: VarId) {
        (self.f)(Node::VarDef(var));
    }

    fn visit_expr(&mut self, expr: &'f Expr) {
        walk_expr(self, expr);
        (self.f)(Node::Expr(expr));
    }
}

/// Visit every node of `func` in post-order, calling `f` on each.
pub fn post_order_visit<'f>(func: &'f Function, f: impl FnMut(Node<'f>)) {
    PostOrder { f }.visit_function(func);
}

/// Every variable occurrence (params, definitions, uses) in post-order.
pub fn collect_vars(func: &Function) -> Vec<VarId> {
    let mut vars = Vec::new();
    post_order_visit(func, |node| vars.extend(node.var()));
    vars
}

/// Number of reads of each variable, including reads by the body.
///
/// Variables that are never read are absent from the map.
pub fn count_var_uses(func: &Function) -> FxHashMap<VarId, usize> {
    let mut counts = FxHashMap::default();
    post_order_visit(func, |node| {
        if let Node::Expr(Expr::Var(v)) = node {
            *counts.entry(*v).or_insert(0) += 1;
        }
    });
    counts
}

#[cfg(test)]
#[expect(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
