//! The symbol table: insertion-ordered for the report and for stable
//! relocation numbers, with a by-name map for lookup.

use std::collections::HashMap;
use super::{Scope, Symbol};

#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
  symbols: Vec<Symbol>,
  by_label: HashMap<String, usize>,
}

impl SymbolTable {
  pub fn new() -> Self {
    SymbolTable::default()
  }

  /// Insert a new symbol, assigning it the next index. Returns `None` if the
  /// label is already taken; symbols are never redefined or deleted.
  pub fn insert(&mut self, label: &str, section: &str, offset: i64, scope: Scope) -> Option<u32> {
    if self.by_label.contains_key(label) {
      return None;
    }

    let index = self.symbols.len() as u32;
    self.by_label.insert(label.to_string(), self.symbols.len());
    self.symbols.push(Symbol {
      label: label.to_string(),
      section: section.to_string(),
      offset,
      scope,
      index,
    });
    Some(index)
  }

  pub fn get(&self, label: &str) -> Option<&Symbol> {
    self.by_label.get(label).map(|&i| &self.symbols[i])
  }

  /// Promote a symbol to global scope (`.global` in the second pass).
  /// Returns false if no such symbol exists.
  pub fn promote_to_global(&mut self, label: &str) -> bool {
    match self.by_label.get(label) {
      Some(&i) => {
        self.symbols[i].scope = Scope::Global;
        true
      }
      None => false,
    }
  }

  pub fn symbols(&self) -> &[Symbol] {
    &self.symbols
  }

  pub fn into_vec(self) -> Vec<Symbol> {
    self.symbols
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn indices_follow_insertion_order() {
    let mut table = SymbolTable::new();
    assert_eq!(table.insert("text", "text", 0, Scope::Local), Some(0));
    assert_eq!(table.insert("a", "text", 2, Scope::Local), Some(1));
    assert_eq!(table.insert("b", "text", 4, Scope::Global), Some(2));

    for (position, symbol) in table.symbols().iter().enumerate() {
      assert_eq!(symbol.index as usize, position);
    }
  }

  #[test]
  fn duplicate_labels_are_rejected() {
    let mut table = SymbolTable::new();
    assert_eq!(table.insert("main", "text", 0, Scope::Local), Some(0));
    assert_eq!(table.insert("main", "data", 8, Scope::Local), None);
    assert_eq!(table.symbols().len(), 1);
    assert_eq!(table.get("main").unwrap().section, "text");
  }

  #[test]
  fn promotion_flips_scope_in_place() {
    let mut table = SymbolTable::new();
    table.insert("main", "text", 0, Scope::Local);

    assert!(table.promote_to_global("main"));
    assert_eq!(table.get("main").unwrap().scope, Scope::Global);
    assert!(!table.promote_to_global("missing"));
  }
}
