//! Modules: named collections of functions.

use rustc_hash::FxHashMap;

use crate::{Function, ScalarFunction};

/// A module-level definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum ModuleItem {
    Function(Function),
    /// Auxiliary scalar code generated by shape lowering.
    Scalar(ScalarFunction),
}

/// Mapping from global names to definitions.
///
/// Insertion order carries no meaning but is preserved so printed and
/// lowered output is reproducible. Replacing an existing name keeps its
/// position.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Module {
    items: Vec<(String, ModuleItem)>,
    index: FxHashMap<String, usize>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `name`. Returns the previous item, if any.
    pub fn insert(&mut self, name: impl Into<String>, item: ModuleItem) -> Option<ModuleItem> {
        let name = name.into();
        if let Some(&pos) = self.index.get(&name) {
            return Some(std::mem::replace(&mut self.items[pos].1, item));
        }
        self.index.insert(name.clone(), self.items.len());
        self.items.push((name, item));
        None
    }

    /// Insert a function under its own name.
    pub fn add_function(&mut self, func: Function) -> Option<ModuleItem> {
        let name = func.name().to_owned();
        self.insert(name, ModuleItem::Function(func))
    }

    pub fn get(&self, name: &str) -> Option<&ModuleItem> {
        self.index.get(name).map(|&pos| &self.items[pos].1)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        match self.get(name)? {
            ModuleItem::Function(f) => Some(f),
            ModuleItem::Scalar(_) => None,
        }
    }

    pub fn scalar_function(&self, name: &str) -> Option<&ScalarFunction> {
        match self.get(name)? {
            ModuleItem::Scalar(f) => Some(f),
            ModuleItem::Function(_) => None,
        }
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModuleItem)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    /// Iterate tensor functions only.
    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.items.iter().filter_map(|(_, item)| match item {
            ModuleItem::Function(f) => Some(f),
            ModuleItem::Scalar(_) => None,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Function> for Module {
    fn from_iter<I: IntoIterator<Item = Function>>(iter: I) -> Self {
        let mut module = Module::new();
        for func in iter {
            module.add_function(func);
        }
        module
    }
}
