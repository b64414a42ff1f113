use std::collections::HashMap;

use crate::spirv::Id;

pub mod meta;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Symbol {
    Function { id: Id },
    /// Overload set. The last member wins when used as an entry point.
    FunctionGroup { members: Vec<Id> },
    Variable { id: Id },
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}
impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, symbol: Symbol) {
        self.symbols.insert(name.into(), symbol);
    }

    /// Registers a function, turning an existing function symbol of the same name into a group.
    pub fn declare_function(&mut self, name: impl Into<String>, id: Id) {
        let name = name.into();
        let symbol = match self.symbols.remove(&name) {
            Some(Symbol::Function { id: prev }) => Symbol::FunctionGroup {
                members: vec![prev, id],
            },
            Some(Symbol::FunctionGroup { mut members }) => {
                members.push(id);
                Symbol::FunctionGroup { members }
            }
            Some(Symbol::Variable { .. }) | None => Symbol::Function { id },
        };
        self.symbols.insert(name, symbol);
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn resolve_function(&self, name: &str) -> Option<Id> {
        match self.symbols.get(name)? {
            &Symbol::Function { id } => Some(id),
            Symbol::FunctionGroup { members } => members.last().copied(),
            Symbol::Variable { .. } => None,
        }
    }

    /// Drops function symbols whose id no longer exists.
    pub fn retain_functions(&mut self, mut alive: impl FnMut(Id) -> bool) {
        self.symbols.retain(|_, s| match s {
            Symbol::Function { id } => alive(*id),
            Symbol::FunctionGroup { members } => {
                members.retain(|&m| alive(m));
                !members.is_empty()
            }
            Symbol::Variable { .. } => true,
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.symbols.iter().map(|(k, v)| (k.as_str(), v))
    }
}
