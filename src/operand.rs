//! Addressing-mode recognition.
//!
//! Operands are matched against a closed, ordered set of shapes, one compiled
//! regex per shape. Both passes classify through this module, so the size the
//! first pass accounts for is always the size the second pass emits.

use once_cell::sync::Lazy;
use regex::Regex;

const LITERAL: &str = "(?:[0-9]+|0[xX][0-9A-Fa-f]+)";
const IDENT: &str = r"[A-Za-z]\w*";

static LITERAL_TOKEN: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!("^{LITERAL}$")).unwrap());
static IDENT_TOKEN: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!("^{IDENT}$")).unwrap());
static PCREL_SYMBOL: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!("^%({IDENT})$")).unwrap());
static BRANCH_MEMLITERAL: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!(r"^\*({LITERAL})$")).unwrap());
static BRANCH_MEMSYMBOL: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!(r"^\*({IDENT})$")).unwrap());
static BRANCH_REGDIR: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\*r([0-7])$").unwrap());
static BRANCH_REGIND: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\*\[r([0-7])\]$").unwrap());
static BRANCH_LITERALREGIND: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!(r"^\*\[r([0-7])\+({LITERAL})\]$")).unwrap());
static BRANCH_SYMBOLREGIND: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!(r"^\*\[r([0-7])\+({IDENT})\]$")).unwrap());

static LS_LITERAL: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!(r"^\$({LITERAL})$")).unwrap());
static LS_SYMBOL: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!(r"^\$({IDENT})$")).unwrap());
static LS_REGDIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^r([0-7])$").unwrap());
static LS_REGIND: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^\[r([0-7])\]$").unwrap());
static LS_LITERALREGIND: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!(r"^\[r([0-7])\+({LITERAL})\]$")).unwrap());
static LS_SYMBOLREGIND: Lazy<Regex> =
  Lazy::new(|| Regex::new(&format!(r"^\[r([0-7])\+({IDENT})\]$")).unwrap());

/// One classified operand. The variants carry the register field and the
/// 16-bit payload each addressing mode needs at encoding time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
  ImmLit(i64),
  ImmSym(String),
  PcRelSym(String),
  MemLit(i64),
  MemSym(String),
  RegDir(u8),
  RegInd(u8),
  RegIndLit(u8, i64),
  RegIndSym(u8, String),
}

impl Operand {
  /// Encoded size in bytes; the first pass sizes with this, the second pass
  /// advances the location counter by the same amount.
  pub fn encoded_size(&self) -> u32 {
    match self {
      Operand::RegDir(_) | Operand::RegInd(_) => 3,
      _ => 5,
    }
  }
}

/// Classify a branch/call operand (`jmp jeq jne jgt call`).
///
/// `*rN` is register-direct; the memory-symbol shape is only consulted when
/// register-direct does not match, so `*r9` reads as a reference to the
/// symbol `r9`.
pub fn classify_branch(token: &str) -> Option<Operand> {
  if LITERAL_TOKEN.is_match(token) {
    return Some(Operand::ImmLit(parse_literal(token)?));
  }
  if IDENT_TOKEN.is_match(token) {
    return Some(Operand::ImmSym(token.to_string()));
  }
  if let Some(caps) = PCREL_SYMBOL.captures(token) {
    return Some(Operand::PcRelSym(caps[1].to_string()));
  }
  if let Some(caps) = BRANCH_MEMLITERAL.captures(token) {
    return Some(Operand::MemLit(parse_literal(&caps[1])?));
  }
  if let Some(caps) = BRANCH_REGDIR.captures(token) {
    return Some(Operand::RegDir(register_digit(&caps[1])?));
  }
  if let Some(caps) = BRANCH_MEMSYMBOL.captures(token) {
    return Some(Operand::MemSym(caps[1].to_string()));
  }
  if let Some(caps) = BRANCH_REGIND.captures(token) {
    return Some(Operand::RegInd(register_digit(&caps[1])?));
  }
  if let Some(caps) = BRANCH_LITERALREGIND.captures(token) {
    return Some(Operand::RegIndLit(
      register_digit(&caps[1])?,
      parse_literal(&caps[2])?,
    ));
  }
  if let Some(caps) = BRANCH_SYMBOLREGIND.captures(token) {
    return Some(Operand::RegIndSym(
      register_digit(&caps[1])?,
      caps[2].to_string(),
    ));
  }
  None
}

/// Classify a load/store operand (`ldr str`). Same tie-break as branches:
/// `rN` is register-direct, never a memory-symbol.
pub fn classify_load_store(token: &str) -> Option<Operand> {
  if let Some(caps) = LS_LITERAL.captures(token) {
    return Some(Operand::ImmLit(parse_literal(&caps[1])?));
  }
  if let Some(caps) = LS_SYMBOL.captures(token) {
    return Some(Operand::ImmSym(caps[1].to_string()));
  }
  if let Some(caps) = PCREL_SYMBOL.captures(token) {
    return Some(Operand::PcRelSym(caps[1].to_string()));
  }
  if LITERAL_TOKEN.is_match(token) {
    return Some(Operand::MemLit(parse_literal(token)?));
  }
  if let Some(caps) = LS_REGDIR.captures(token) {
    return Some(Operand::RegDir(register_digit(&caps[1])?));
  }
  if IDENT_TOKEN.is_match(token) {
    return Some(Operand::MemSym(token.to_string()));
  }
  if let Some(caps) = LS_REGIND.captures(token) {
    return Some(Operand::RegInd(register_digit(&caps[1])?));
  }
  if let Some(caps) = LS_LITERALREGIND.captures(token) {
    return Some(Operand::RegIndLit(
      register_digit(&caps[1])?,
      parse_literal(&caps[2])?,
    ));
  }
  if let Some(caps) = LS_SYMBOLREGIND.captures(token) {
    return Some(Operand::RegIndSym(
      register_digit(&caps[1])?,
      caps[2].to_string(),
    ));
  }
  None
}

/// `.word` first-operand test: decimal or `0x`/`0X` hex.
pub fn is_literal(token: &str) -> bool {
  LITERAL_TOKEN.is_match(token)
}

/// Identifier test used by `.word`, `.global`, `.extern`, `.equ` and labels.
pub fn is_ident(token: &str) -> bool {
  IDENT_TOKEN.is_match(token)
}

/// Convert a literal token to its value. Hex needs the `0x`/`0X` prefix;
/// a signed decimal is tolerated because `.equ` stores a signed offset.
pub fn parse_literal(token: &str) -> Option<i64> {
  if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
    i64::from_str_radix(hex, 16).ok()
  } else {
    token.parse::<i64>().ok()
  }
}

fn register_digit(capture: &str) -> Option<u8> {
  capture.parse::<u8>().ok()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn branch_immediate_shapes() {
    assert_eq!(classify_branch("0x12"), Some(Operand::ImmLit(0x12)));
    assert_eq!(classify_branch("42"), Some(Operand::ImmLit(42)));
    assert_eq!(
      classify_branch("foo"),
      Some(Operand::ImmSym("foo".to_string()))
    );
    assert_eq!(
      classify_branch("%foo"),
      Some(Operand::PcRelSym("foo".to_string()))
    );
  }

  #[test]
  fn branch_memory_shapes() {
    assert_eq!(classify_branch("*0x12"), Some(Operand::MemLit(0x12)));
    assert_eq!(
      classify_branch("*foo"),
      Some(Operand::MemSym("foo".to_string()))
    );
    assert_eq!(classify_branch("*r3"), Some(Operand::RegDir(3)));
    assert_eq!(classify_branch("*[r3]"), Some(Operand::RegInd(3)));
    assert_eq!(
      classify_branch("*[r3+0x12]"),
      Some(Operand::RegIndLit(3, 0x12))
    );
    assert_eq!(
      classify_branch("*[r3+foo]"),
      Some(Operand::RegIndSym(3, "foo".to_string()))
    );
  }

  #[test]
  fn star_r9_is_a_symbol_reference_not_a_register() {
    assert_eq!(
      classify_branch("*r9"),
      Some(Operand::MemSym("r9".to_string()))
    );
  }

  #[test]
  fn load_store_shapes() {
    assert_eq!(classify_load_store("$0x12"), Some(Operand::ImmLit(0x12)));
    assert_eq!(
      classify_load_store("$foo"),
      Some(Operand::ImmSym("foo".to_string()))
    );
    assert_eq!(classify_load_store("0x12"), Some(Operand::MemLit(0x12)));
    assert_eq!(
      classify_load_store("foo"),
      Some(Operand::MemSym("foo".to_string()))
    );
    assert_eq!(
      classify_load_store("%foo"),
      Some(Operand::PcRelSym("foo".to_string()))
    );
    assert_eq!(classify_load_store("[r3]"), Some(Operand::RegInd(3)));
    assert_eq!(
      classify_load_store("[r3+0x12]"),
      Some(Operand::RegIndLit(3, 0x12))
    );
    assert_eq!(
      classify_load_store("[r3+foo]"),
      Some(Operand::RegIndSym(3, "foo".to_string()))
    );
  }

  #[test]
  fn bare_register_is_register_direct_not_a_symbol() {
    assert_eq!(classify_load_store("r3"), Some(Operand::RegDir(3)));
    assert_eq!(
      classify_load_store("r9"),
      Some(Operand::MemSym("r9".to_string()))
    );
  }

  #[test]
  fn register_modes_are_three_bytes_everything_else_five() {
    assert_eq!(Operand::RegDir(3).encoded_size(), 3);
    assert_eq!(Operand::RegInd(3).encoded_size(), 3);
    assert_eq!(Operand::ImmLit(1).encoded_size(), 5);
    assert_eq!(Operand::PcRelSym("x".to_string()).encoded_size(), 5);
    assert_eq!(Operand::RegIndLit(3, 1).encoded_size(), 5);
    assert_eq!(Operand::RegIndSym(3, "x".to_string()).encoded_size(), 5);
  }

  #[test]
  fn malformed_operands_do_not_classify() {
    assert_eq!(classify_branch("[r3]"), None);
    assert_eq!(classify_branch("*[r8]"), None);
    assert_eq!(classify_branch("$5"), None);
    assert_eq!(classify_load_store("*foo"), None);
    assert_eq!(classify_load_store("[r3+]"), None);
    assert_eq!(classify_load_store("1foo"), None);
  }

  #[test]
  fn literal_and_ident_tests() {
    assert!(is_literal("42"));
    assert!(is_literal("0xFF"));
    assert!(!is_literal("-1"));
    assert!(!is_literal("foo"));
    assert!(is_ident("foo_1"));
    assert!(!is_ident("1foo"));
  }

  #[test]
  fn literal_parsing() {
    assert_eq!(parse_literal("42"), Some(42));
    assert_eq!(parse_literal("0x10"), Some(16));
    assert_eq!(parse_literal("0X10"), Some(16));
    assert_eq!(parse_literal("-3"), Some(-3));
    assert_eq!(parse_literal("0x"), None);
    assert_eq!(parse_literal("zz"), None);
  }
}
