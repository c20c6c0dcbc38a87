//! Compile-time symbol table.
//!
//! Four resolvable scopes: Global (program level), Local (function frame),
//! Builtin (the fixed registry), Free (captured from an enclosing function).
//! A fifth, Function, marks a named function literal's self-reference and
//! compiles to `CurrentClosure`. Nested tables form a chain; resolving an
//! enclosing function's local records it as a free symbol of the inner
//! table, which is what drives `Closure` capture emission.

use ahash::AHashMap;

use crate::modules::Namespace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// Self-reference to the function currently being compiled.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: AHashMap<String, Symbol>,
    pub num_definitions: usize,
    /// Symbols this table captured from enclosing scopes, in capture order.
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    /// Program-level table with the builtin namespaces pre-defined as the
    /// first global slots (the VM seeds the matching globals).
    #[must_use]
    pub fn new_global() -> Self {
        let mut table = Self::default();
        for ns in Namespace::ALL {
            table.define(&ns.to_string());
        }
        table
    }

    /// Pushes a nested (function) table over `outer`.
    #[must_use]
    pub fn enclosed(outer: Box<Self>) -> Self {
        Self {
            outer: Some(outer),
            store: AHashMap::new(),
            num_definitions: 0,
            free_symbols: vec![],
        }
    }

    /// Pops back to the enclosing table, returning it together with this
    /// table's capture list and local count.
    pub fn into_parts(self) -> (Option<Box<Self>>, Vec<Symbol>, usize) {
        (self.outer, self.free_symbols, self.num_definitions)
    }

    #[must_use]
    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Defines `name` in this table, reusing the slot if the name is
    /// already bound here.
    pub fn define(&mut self, name: &str) -> Symbol {
        if let Some(existing) = self.store.get(name) {
            if matches!(existing.scope, SymbolScope::Global | SymbolScope::Local) {
                return existing.clone();
            }
        }
        let scope = if self.is_global() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };
        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Registers a builtin function at its fixed registry id.
    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Marks `name` as the self-reference of the function being compiled.
    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Resolves `name`, walking outward. An enclosing function's local (or
    /// free) symbol is converted into a free symbol of this table.
    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        let outer_symbol = self.outer.as_mut()?.resolve(name)?;
        match outer_symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(outer_symbol),
            _ => Some(self.define_free(outer_symbol)),
        }
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        self.free_symbols.push(original.clone());
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len() - 1,
        };
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_namespaces_take_first_global_slots() {
        let mut table = SymbolTable::new_global();
        let json = table.resolve("JSON").unwrap();
        assert_eq!(json.scope, SymbolScope::Global);
        assert_eq!(json.index, 0);
        let first_user = table.define("x");
        assert_eq!(first_user.index, Namespace::ALL.len());
    }

    #[test]
    fn define_reuses_slot_for_same_name() {
        let mut table = SymbolTable::new_global();
        let a = table.define("x");
        let b = table.define("x");
        assert_eq!(a.index, b.index);
    }

    #[test]
    fn nested_locals_become_free() {
        let mut global = SymbolTable::new_global();
        global.define("g");
        let mut outer_fn = SymbolTable::enclosed(Box::new(global));
        outer_fn.define("a");
        let mut inner_fn = SymbolTable::enclosed(Box::new(outer_fn));
        inner_fn.define("b");

        assert_eq!(inner_fn.resolve("g").unwrap().scope, SymbolScope::Global);
        assert_eq!(inner_fn.resolve("b").unwrap().scope, SymbolScope::Local);
        let a = inner_fn.resolve("a").unwrap();
        assert_eq!(a.scope, SymbolScope::Free);
        assert_eq!(a.index, 0);
        assert_eq!(inner_fn.free_symbols.len(), 1);
    }

    #[test]
    fn function_self_reference() {
        let global = SymbolTable::new_global();
        let mut inner = SymbolTable::enclosed(Box::new(global));
        inner.define_function_name("fact");
        assert_eq!(inner.resolve("fact").unwrap().scope, SymbolScope::Function);
    }
}
