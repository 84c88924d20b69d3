//! Symbols and lexical scopes.
//!
//! A `Vec`-backed stack of scope frames with parent links, `FxHashMap`
//! symbol tables keyed by name.

use crate::types::{FunctionType, Type};
use rustc_hash::FxHashMap;

#[derive(Clone, Debug)]
pub struct VariableSymbol {
    pub ty: Type,
    pub is_mutable: bool,
    pub is_const: bool,
    pub is_moved: bool,
}

#[derive(Clone, Debug)]
pub struct FunctionOverload {
    pub signature: FunctionType,
    /// The mangled C-level name this overload lowers to.
    pub mangled_name: String,
}

#[derive(Clone, Debug, Default)]
pub struct FunctionSymbol {
    pub overloads: Vec<FunctionOverload>,
}

impl FunctionSymbol {
    /// Refuses a colliding overload: a new overload is refused if it
    /// collides on parameter-type tuple with an existing one.
    pub fn try_add(&mut self, signature: FunctionType, mangled_name: String) -> bool {
        let param_types: Vec<&Type> = signature.params.iter().map(|p| &p.ty).collect();
        for existing in &self.overloads {
            let existing_types: Vec<&Type> = existing.signature.params.iter().map(|p| &p.ty).collect();
            if existing_types == param_types {
                return false;
            }
        }
        self.overloads.push(FunctionOverload {
            signature,
            mangled_name,
        });
        true
    }
}

#[derive(Clone, Debug)]
pub enum Symbol {
    Variable(VariableSymbol),
    Function(FunctionSymbol),
    Type(Type),
    Module(FxHashMap<String, Symbol>),
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ScopeFlags {
    pub is_unsafe: bool,
    pub is_loop: bool,
}

pub struct Scope {
    parent: Option<usize>,
    symbols: FxHashMap<String, Symbol>,
    pub flags: ScopeFlags,
    pub function_context: Option<FunctionType>,
}

/// A stack of scope frames; `define` only ever checks the innermost frame
/// for a collision (fails if a same-scope symbol of the same name exists),
/// `lookup` walks parents outward.
pub struct ScopeStack {
    frames: Vec<Scope>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            frames: vec![Scope {
                parent: None,
                symbols: FxHashMap::default(),
                flags: ScopeFlags::default(),
                function_context: None,
            }],
        }
    }

    pub fn push(&mut self, flags: ScopeFlags, function_context: Option<FunctionType>) {
        let parent = self.frames.len() - 1;
        let function_context = function_context.or_else(|| self.frames[parent].function_context.clone());
        let flags = ScopeFlags {
            is_unsafe: flags.is_unsafe || self.frames[parent].flags.is_unsafe,
            is_loop: flags.is_loop,
        };
        self.frames.push(Scope {
            parent: Some(parent),
            symbols: FxHashMap::default(),
            flags,
            function_context,
        });
    }

    pub fn pop(&mut self) {
        debug_assert!(self.frames.len() > 1, "cannot pop the root scope");
        self.frames.pop();
    }

    fn current(&self) -> usize {
        self.frames.len() - 1
    }

    /// Defines a symbol in the innermost scope. Returns `false` on a
    /// same-scope name collision, except when merging function overloads
    /// (handled by the caller via `lookup_function_mut`).
    pub fn define(&mut self, name: &str, symbol: Symbol) -> bool {
        let idx = self.current();
        if self.frames[idx].symbols.contains_key(name) {
            return false;
        }
        self.frames[idx].symbols.insert(name.to_string(), symbol);
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        let mut idx = Some(self.current());
        while let Some(i) = idx {
            if let Some(sym) = self.frames[i].symbols.get(name) {
                return Some(sym);
            }
            idx = self.frames[i].parent;
        }
        None
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let mut idx = Some(self.current());
        while let Some(i) = idx {
            if self.frames[i].symbols.contains_key(name) {
                return self.frames[i].symbols.get_mut(name);
            }
            idx = self.frames[i].parent;
        }
        None
    }

    /// True if `name` exists in the *innermost* frame only — used for
    /// overload merging, where a repeated top-level `fn foo` should extend
    /// the existing `FunctionSymbol` rather than collide.
    pub fn defined_in_current_scope(&self, name: &str) -> bool {
        self.frames[self.current()].symbols.contains_key(name)
    }

    pub fn in_unsafe(&self) -> bool {
        self.frames[self.current()].flags.is_unsafe
    }

    pub fn in_loop(&self) -> bool {
        let mut idx = Some(self.current());
        while let Some(i) = idx {
            if self.frames[i].flags.is_loop {
                return true;
            }
            idx = self.frames[i].parent;
        }
        false
    }

    pub fn function_context(&self) -> Option<&FunctionType> {
        self.frames[self.current()].function_context.as_ref()
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_fails_on_same_scope_collision() {
        let mut scopes = ScopeStack::new();
        assert!(scopes.define(
            "x",
            Symbol::Variable(VariableSymbol {
                ty: Type::I32,
                is_mutable: false,
                is_const: false,
                is_moved: false,
            })
        ));
        assert!(!scopes.define(
            "x",
            Symbol::Variable(VariableSymbol {
                ty: Type::I32,
                is_mutable: false,
                is_const: false,
                is_moved: false,
            })
        ));
    }

    #[test]
    fn nested_scope_shadows_without_colliding() {
        let mut scopes = ScopeStack::new();
        scopes.define(
            "x",
            Symbol::Variable(VariableSymbol {
                ty: Type::I32,
                is_mutable: false,
                is_const: false,
                is_moved: false,
            }),
        );
        scopes.push(ScopeFlags::default(), None);
        assert!(scopes.define(
            "x",
            Symbol::Variable(VariableSymbol {
                ty: Type::Bool,
                is_mutable: false,
                is_const: false,
                is_moved: false,
            })
        ));
        assert!(matches!(
            scopes.lookup("x"),
            Some(Symbol::Variable(VariableSymbol { ty: Type::Bool, .. }))
        ));
        scopes.pop();
        assert!(matches!(
            scopes.lookup("x"),
            Some(Symbol::Variable(VariableSymbol { ty: Type::I32, .. }))
        ));
    }

    #[test]
    fn unsafe_flag_inherits_into_nested_scopes() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeFlags { is_unsafe: true, is_loop: false }, None);
        assert!(scopes.in_unsafe());
        scopes.push(ScopeFlags::default(), None);
        assert!(scopes.in_unsafe());
    }
}
