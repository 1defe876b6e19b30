//! Scoped symbol and tag tables.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::types::Type;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Linkage {
  /// Automatic storage; initializers may run arbitrary code.
  None,
  /// Static storage, file-local.
  Internal,
  /// Static storage, visible across translation units.
  External,
}

pub enum SymbolKind {
  Definition,
  /// A string literal, stored with its terminating nul.
  Literal(Vec<u8>),
  Temporary,
}

pub struct Symbol {
  pub name: String,
  pub ty: Type,
  pub linkage: Linkage,
  pub kind: SymbolKind,
}

impl Symbol {
  pub fn is_literal(&self) -> bool {
    matches!(self.kind, SymbolKind::Literal(_))
  }
}

impl fmt::Display for Symbol {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.name)
  }
}

struct Scope {
  symbols: IndexMap<String, Rc<Symbol>>,
  tags: IndexMap<String, Type>,
}

impl Scope {
  fn new() -> Scope {
    Scope {
      symbols: IndexMap::new(),
      tags: IndexMap::new(),
    }
  }
}

/// Name resolution for ordinary identifiers and struct/union tags.
///
/// The outermost scope is file scope; one scope is pushed per function body
/// and never nested further in this subset.
pub struct SymbolTable {
  scopes: Vec<Scope>,
  literals: usize,
}

impl SymbolTable {
  pub fn new() -> SymbolTable {
    SymbolTable {
      scopes: vec![Scope::new()],
      literals: 0,
    }
  }

  pub fn enter_scope(&mut self) {
    self.scopes.push(Scope::new());
  }

  pub fn leave_scope(&mut self) {
    debug_assert!(self.scopes.len() > 1);
    self.scopes.pop();
  }

  pub fn insert(&mut self, symbol: Symbol) -> Rc<Symbol> {
    let symbol = Rc::new(symbol);
    self
      .scopes
      .last_mut()
      .unwrap()
      .symbols
      .insert(symbol.name.clone(), symbol.clone());
    symbol
  }

  pub fn lookup(&self, name: &str) -> Option<Rc<Symbol>> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.symbols.get(name).cloned())
  }

  /// Lookup restricted to the innermost scope, for redefinition checks.
  pub fn lookup_current(&self, name: &str) -> Option<Rc<Symbol>> {
    self.scopes.last().unwrap().symbols.get(name).cloned()
  }

  pub fn insert_tag(&mut self, name: &str, ty: Type) {
    self
      .scopes
      .last_mut()
      .unwrap()
      .tags
      .insert(name.to_string(), ty);
  }

  pub fn lookup_tag(&self, name: &str) -> Option<Type> {
    self
      .scopes
      .iter()
      .rev()
      .find_map(|scope| scope.tags.get(name).cloned())
  }

  /// Materialize a string literal as an internal char-array symbol holding
  /// its bytes, nul included.
  pub fn string_literal(&mut self, bytes: Vec<u8>) -> Rc<Symbol> {
    let name = format!(".L{}", self.literals);
    self.literals += 1;
    let ty = Type::array(Type::signed(1), Some(bytes.len()));
    // literals live at file scope regardless of where they appear
    let symbol = Rc::new(Symbol {
      name,
      ty,
      linkage: Linkage::Internal,
      kind: SymbolKind::Literal(bytes),
    });
    self.scopes[0]
      .symbols
      .insert(symbol.name.clone(), symbol.clone());
    symbol
  }
}

impl Default for SymbolTable {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scoped_lookup() {
    let mut table = SymbolTable::new();
    table.insert(Symbol {
      name: "x".into(),
      ty: Type::signed(4),
      linkage: Linkage::External,
      kind: SymbolKind::Definition,
    });
    table.enter_scope();
    assert!(table.lookup("x").is_some());
    assert!(table.lookup_current("x").is_none());
    table.insert(Symbol {
      name: "x".into(),
      ty: Type::signed(1),
      linkage: Linkage::None,
      kind: SymbolKind::Definition,
    });
    assert!(table.lookup("x").unwrap().ty.is_char());
    table.leave_scope();
    assert!(table.lookup("x").unwrap().ty.is_integer());
    assert!(!table.lookup("x").unwrap().ty.is_char());
  }

  #[test]
  fn string_literals_are_nul_sized() {
    let mut table = SymbolTable::new();
    let s = table.string_literal(b"Hi\0".to_vec());
    assert!(s.is_literal());
    assert_eq!(s.ty.len(), Some(3));
    assert_eq!(s.linkage, Linkage::Internal);
  }
}
