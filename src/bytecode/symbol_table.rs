//! Compile-time name resolution.
//!
//! Each function body gets its own table enclosed by the table of the code
//! around it. Names found in an enclosing function's locals are re-registered
//! as free symbols in every table between the use and the definition, which
//! is what tells the compiler what a closure has to capture.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolScope {
    Global,
    Local,
    Builtin,
    Free,
    /// The function currently being compiled, bound to its own `let` name.
    Function,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

impl Symbol {
    pub fn new(name: impl Into<String>, scope: SymbolScope, index: usize) -> Self {
        Self {
            name: name.into(),
            scope,
            index,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Table of the enclosing function, or `None` for the global table.
    pub outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    /// The outer symbols captured by this scope, in capture order.
    pub free_symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            ..Self::default()
        }
    }

    /// Detach and return the enclosing table.
    pub fn take_outer(&mut self) -> Option<SymbolTable> {
        self.outer.take().map(|outer| *outer)
    }

    pub fn is_global(&self) -> bool {
        self.outer.is_none()
    }

    /// Number of global or local slots handed out by this table.
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Bind `name` in this scope.
    ///
    /// Redefining a name already bound in the same scope reuses its slot.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.is_global() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };

        if let Some(existing) = self.store.get(name) {
            if existing.scope == scope {
                return existing.clone();
            }
        }

        let symbol = Symbol::new(name, scope, self.num_definitions);
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Bind a function parameter. Each parameter gets its own slot, matching
    /// the argument position; a repeated name resolves to the last one.
    pub fn define_parameter(&mut self, name: &str) -> Symbol {
        let symbol = Symbol::new(name, SymbolScope::Local, self.num_definitions);
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol::new(name, SymbolScope::Builtin, index);
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol::new(name, SymbolScope::Function, 0);
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol::new(
            original.name.clone(),
            SymbolScope::Free,
            self.free_symbols.len(),
        );
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }

        let symbol = self.outer.as_mut()?.resolve(name)?;
        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.define_free(symbol)),
        }
    }

    /// Global bindings ordered by slot.
    pub fn globals(&self) -> Vec<Symbol> {
        let mut globals: Vec<Symbol> = self
            .store
            .values()
            .filter(|symbol| symbol.scope == SymbolScope::Global)
            .cloned()
            .collect();
        globals.sort_by_key(|symbol| symbol.index);
        globals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn global(name: &str, index: usize) -> Symbol {
        Symbol::new(name, SymbolScope::Global, index)
    }

    fn local(name: &str, index: usize) -> Symbol {
        Symbol::new(name, SymbolScope::Local, index)
    }

    fn free(name: &str, index: usize) -> Symbol {
        Symbol::new(name, SymbolScope::Free, index)
    }

    #[test]
    fn test_define() {
        let mut global_table = SymbolTable::new();
        assert_eq!(global_table.define("a"), global("a", 0));
        assert_eq!(global_table.define("b"), global("b", 1));

        let mut first_local = SymbolTable::new_enclosed(global_table);
        assert_eq!(first_local.define("c"), local("c", 0));
        assert_eq!(first_local.define("d"), local("d", 1));

        let mut second_local = SymbolTable::new_enclosed(first_local);
        assert_eq!(second_local.define("e"), local("e", 0));
        assert_eq!(second_local.define("f"), local("f", 1));
    }

    #[test]
    fn test_redefinition_reuses_slot() {
        let mut table = SymbolTable::new();
        table.define("x");
        table.define("y");
        assert_eq!(table.define("x"), global("x", 0));
        assert_eq!(table.num_definitions(), 2);
    }

    #[test]
    fn test_parameters_get_distinct_slots() {
        let mut table = SymbolTable::new_enclosed(SymbolTable::new());
        assert_eq!(table.define_parameter("a"), local("a", 0));
        assert_eq!(table.define_parameter("a"), local("a", 1));
        assert_eq!(table.resolve("a"), Some(local("a", 1)));
        assert_eq!(table.num_definitions(), 2);
        // A later `let` of the same name reuses the last parameter's slot.
        assert_eq!(table.define("a"), local("a", 1));
    }

    #[test]
    fn test_resolve_nested_locals() {
        let mut global_table = SymbolTable::new();
        global_table.define("a");
        global_table.define("b");

        let mut first_local = SymbolTable::new_enclosed(global_table);
        first_local.define("c");
        first_local.define("d");

        let mut second_local = SymbolTable::new_enclosed(first_local);
        second_local.define("e");
        second_local.define("f");

        assert_eq!(second_local.resolve("a"), Some(global("a", 0)));
        assert_eq!(second_local.resolve("c"), Some(free("c", 0)));
        assert_eq!(second_local.resolve("d"), Some(free("d", 1)));
        assert_eq!(second_local.resolve("e"), Some(local("e", 0)));
        assert_eq!(
            second_local.free_symbols,
            vec![local("c", 0), local("d", 1)]
        );
    }

    #[test]
    fn test_free_symbols_propagate_through_intermediate_scopes() {
        let mut global_table = SymbolTable::new();
        global_table.define("a");

        let mut first_local = SymbolTable::new_enclosed(global_table);
        first_local.define("b");

        let middle = SymbolTable::new_enclosed(first_local);
        let mut inner = SymbolTable::new_enclosed(middle);

        assert_eq!(inner.resolve("b"), Some(free("b", 0)));
        // Resolving again must not capture twice.
        assert_eq!(inner.resolve("b"), Some(free("b", 0)));
        assert_eq!(inner.free_symbols, vec![free("b", 0)]);

        let middle = inner.take_outer().unwrap();
        assert_eq!(middle.free_symbols, vec![local("b", 0)]);
    }

    #[test]
    fn test_unresolvable() {
        let mut global_table = SymbolTable::new();
        global_table.define("a");
        let mut inner = SymbolTable::new_enclosed(global_table);
        assert_eq!(inner.resolve("a"), Some(global("a", 0)));
        assert_eq!(inner.resolve("missing"), None);
        assert!(inner.free_symbols.is_empty());
    }

    #[test]
    fn test_builtins_resolve_from_any_depth() {
        let mut global_table = SymbolTable::new();
        global_table.define_builtin(0, "len");
        global_table.define_builtin(5, "push");

        let first = SymbolTable::new_enclosed(global_table);
        let mut second = SymbolTable::new_enclosed(first);

        let expected = Symbol::new("push", SymbolScope::Builtin, 5);
        assert_eq!(second.resolve("push"), Some(expected));
        assert!(second.free_symbols.is_empty());
    }

    #[test]
    fn test_function_name_is_shadowable() {
        let mut table = SymbolTable::new_enclosed(SymbolTable::new());
        table.define_function_name("a");
        assert_eq!(
            table.resolve("a"),
            Some(Symbol::new("a", SymbolScope::Function, 0))
        );
        table.define("a");
        assert_eq!(table.resolve("a"), Some(local("a", 0)));
    }

    #[test]
    fn test_globals_listing() {
        let mut table = SymbolTable::new();
        table.define_builtin(0, "len");
        table.define("b");
        table.define("a");
        let names: Vec<_> = table.globals().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }
}
