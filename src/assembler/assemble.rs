//! The two passes. The first pass walks every line to place symbols and
//! measure sizes; the second pass re-walks them to emit hex and record
//! relocations. Both classify operands through `crate::operand`, which keeps
//! the location counters in lockstep.

use std::collections::HashSet;

use log::debug;

use super::symtab::SymbolTable;
use super::{
  ABSOLUTE_SECTION, BLANK_SECTION, HypoObject, RelRecord, RelocationType, Scope,
  UNDEFINED_SECTION,
};
use crate::error::AsmError;
use crate::isa::{self, ADDR_REG_MAX, ARITH_REG_MAX, InstrKind};
use crate::operand::{self, Operand};
use crate::parser;

/// Assemble a complete source file into an object.
pub fn assemble(source: &str) -> Result<HypoObject, AsmError> {
  let mut assembler = Assembler::new(parser::tokenize_source(source));
  assembler.first_pass()?;
  debug!("first pass placed {} symbols", assembler.symbols.symbols().len());
  assembler.second_pass()?;
  Ok(assembler.into_object())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
  First,
  Second,
}

pub struct Assembler {
  lines: Vec<Vec<String>>,
  symbols: SymbolTable,
  relocations: Vec<RelRecord>,
  output: Vec<String>,
  current_section: String,
  /// Sections already opened by `.section`; only the first open creates the
  /// section's own descriptor symbol.
  opened_sections: HashSet<String>,
  location_counter: u32,
  line_counter: u32,
  end_reached: bool,
}

impl Assembler {
  pub fn new(lines: Vec<Vec<String>>) -> Self {
    Assembler {
      lines,
      symbols: SymbolTable::new(),
      relocations: Vec::new(),
      output: Vec::new(),
      current_section: BLANK_SECTION.to_string(),
      opened_sections: HashSet::new(),
      location_counter: 0,
      line_counter: 1,
      end_reached: false,
    }
  }

  pub fn first_pass(&mut self) -> Result<(), AsmError> {
    self.run_pass(Pass::First)
  }

  pub fn second_pass(&mut self) -> Result<(), AsmError> {
    self.run_pass(Pass::Second)
  }

  pub fn into_object(self) -> HypoObject {
    HypoObject {
      symbols: self.symbols.into_vec(),
      relocations: self.relocations,
      output: self.output,
    }
  }

  fn run_pass(&mut self, pass: Pass) -> Result<(), AsmError> {
    self.location_counter = 0;
    self.line_counter = 1;
    self.end_reached = false;
    self.current_section = BLANK_SECTION.to_string();
    self.opened_sections.clear();

    let lines = std::mem::take(&mut self.lines);
    let result = self.walk_lines(&lines, pass);
    self.lines = lines;
    result
  }

  fn walk_lines(&mut self, lines: &[Vec<String>], pass: Pass) -> Result<(), AsmError> {
    for tokens in lines {
      if self.end_reached {
        break;
      }
      if tokens.is_empty() {
        self.line_counter += 1;
        continue;
      }

      debug!("{:?} pass, line {}: {:?}", pass, self.line_counter, tokens);

      let mut rest: &[String] = tokens;
      if rest[0].ends_with(':') {
        // The label was placed in the first pass; the second just steps over it.
        if pass == Pass::First {
          self.define_label(&rest[0])?;
        }
        rest = &rest[1..];
      }

      if let Some(first) = rest.first() {
        match (pass, first.starts_with('.')) {
          (Pass::First, true) => self.directive_fp(rest)?,
          (Pass::First, false) => self.instruction_fp(rest)?,
          (Pass::Second, true) => self.directive_sp(rest)?,
          (Pass::Second, false) => self.instruction_sp(rest)?,
        }
      }

      self.line_counter += 1;
    }
    Ok(())
  }

  fn define_label(&mut self, token: &str) -> Result<(), AsmError> {
    let label = token.trim_end_matches(':');
    if !operand::is_ident(label) {
      return Err(AsmError::InvalidIdentifier {
        line: self.line_counter,
        name: label.to_string(),
      });
    }
    let section = self.current_section.clone();
    self.define_symbol(label, &section, self.location_counter as i64, Scope::Local)
  }

  fn define_symbol(
    &mut self,
    label: &str,
    section: &str,
    offset: i64,
    scope: Scope,
  ) -> Result<(), AsmError> {
    if self.symbols.insert(label, section, offset, scope).is_none() {
      return Err(AsmError::DuplicateSymbol {
        line: self.line_counter,
        name: label.to_string(),
      });
    }
    Ok(())
  }

  // ---- first pass -------------------------------------------------------

  fn directive_fp(&mut self, tokens: &[String]) -> Result<(), AsmError> {
    let line = self.line_counter;
    let directive = tokens[0].as_str();
    let operands = &tokens[1..];

    match directive {
      ".global" => {
        for op in operands {
          if !operand::is_ident(op) {
            return Err(AsmError::InvalidIdentifier {
              line,
              name: op.clone(),
            });
          }
        }
        Ok(())
      }
      ".extern" => {
        if operands.is_empty() {
          return Err(AsmError::MissingOperand {
            line,
            context: ".extern".to_string(),
          });
        }
        for op in operands {
          if !operand::is_ident(op) {
            return Err(AsmError::InvalidIdentifier {
              line,
              name: op.clone(),
            });
          }
          self.define_symbol(op, UNDEFINED_SECTION, 0, Scope::Global)?;
        }
        Ok(())
      }
      ".section" => {
        if operands.len() != 1 {
          return Err(AsmError::TrailingJunk {
            line,
            context: "section name".to_string(),
          });
        }
        let name = operands[0].trim_start_matches('.').to_string();
        self.location_counter = 0;
        // The first open creates the section's own descriptor symbol; a
        // same-named label from elsewhere is a fatal duplicate.
        if self.opened_sections.insert(name.clone()) {
          self.define_symbol(&name, &name, 0, Scope::Local)?;
        }
        self.current_section = name;
        Ok(())
      }
      ".word" => self.word_fp(operands),
      ".skip" => {
        let count = self.skip_count(operands)?;
        self.location_counter += count;
        Ok(())
      }
      ".equ" => {
        if operands.len() != 2 {
          return Err(AsmError::EquSyntax { line });
        }
        if !operand::is_ident(&operands[0]) {
          return Err(AsmError::InvalidIdentifier {
            line,
            name: operands[0].clone(),
          });
        }
        let value = operand::parse_literal(&operands[1]).ok_or_else(|| {
          AsmError::InvalidLiteral {
            line,
            token: operands[1].clone(),
          }
        })?;
        let name = operands[0].clone();
        self.define_symbol(&name, ABSOLUTE_SECTION, value, Scope::Local)
      }
      ".end" => {
        self.end_reached = true;
        Ok(())
      }
      _ => Err(AsmError::UnknownDirective {
        line,
        name: directive.to_string(),
      }),
    }
  }

  fn word_fp(&mut self, operands: &[String]) -> Result<(), AsmError> {
    let line = self.line_counter;
    let Some(first) = operands.first() else {
      return Err(AsmError::MissingOperand {
        line,
        context: ".word".to_string(),
      });
    };

    if operand::is_literal(first) {
      // A literal word must be alone on the line.
      if operands.len() != 1 {
        return Err(AsmError::TrailingJunk {
          line,
          context: "literal".to_string(),
        });
      }
      self.location_counter += 2;
    } else {
      for op in operands {
        if !operand::is_ident(op) {
          return Err(AsmError::InvalidIdentifier {
            line,
            name: op.clone(),
          });
        }
        self.location_counter += 2;
      }
    }
    Ok(())
  }

  fn instruction_fp(&mut self, tokens: &[String]) -> Result<(), AsmError> {
    let line = self.line_counter;
    let mnemonic = tokens[0].as_str();
    let operands = &tokens[1..];

    let kind = isa::lookup(mnemonic).ok_or_else(|| AsmError::UnknownInstruction {
      line,
      name: mnemonic.to_string(),
    })?;

    match kind {
      InstrKind::NoOperand { .. } => {
        if !operands.is_empty() {
          return Err(AsmError::TrailingJunk {
            line,
            context: mnemonic.to_string(),
          });
        }
        self.location_counter += 1;
      }
      InstrKind::TwoReg { .. } => {
        self.expect_operand_count(operands, 2, mnemonic)?;
        self.expect_register(&operands[0], ARITH_REG_MAX)?;
        self.expect_register(&operands[1], ARITH_REG_MAX)?;
        self.location_counter += 2;
      }
      InstrKind::OneReg { .. } => {
        self.expect_operand_count(operands, 1, mnemonic)?;
        self.expect_register(&operands[0], ARITH_REG_MAX)?;
        self.location_counter += 2;
      }
      InstrKind::Branch { .. } => {
        let expression = self.form_operand(operands, mnemonic)?;
        let op = self.classify_branch(&expression)?;
        self.location_counter += op.encoded_size();
      }
      InstrKind::LoadStore { .. } => {
        let (_, op) = self.load_store_operands(operands, mnemonic)?;
        self.location_counter += op.encoded_size();
      }
      InstrKind::Stack { .. } => {
        self.expect_operand_count(operands, 1, mnemonic)?;
        self.expect_register(&operands[0], ARITH_REG_MAX)?;
        self.location_counter += 3;
      }
    }
    Ok(())
  }

  // ---- second pass ------------------------------------------------------

  fn directive_sp(&mut self, tokens: &[String]) -> Result<(), AsmError> {
    let line = self.line_counter;
    let directive = tokens[0].as_str();
    let operands = &tokens[1..];

    match directive {
      ".global" => {
        for op in operands {
          if !self.symbols.promote_to_global(op) {
            return Err(AsmError::UndefinedSymbol {
              line,
              name: op.clone(),
            });
          }
        }
        Ok(())
      }
      ".section" => {
        let Some(name) = operands.first() else {
          return Err(AsmError::MissingOperand {
            line,
            context: ".section".to_string(),
          });
        };
        self.current_section = name.trim_start_matches('.').to_string();
        self.location_counter = 0;
        Ok(())
      }
      ".word" => self.word_sp(operands),
      ".skip" => {
        let count = self.skip_count(operands)?;
        self.output.push(write_hex(0, (2 * count) as usize));
        self.location_counter += count;
        Ok(())
      }
      ".extern" | ".equ" => Ok(()),
      ".end" => {
        self.end_reached = true;
        Ok(())
      }
      _ => Err(AsmError::UnknownDirective {
        line,
        name: directive.to_string(),
      }),
    }
  }

  fn word_sp(&mut self, operands: &[String]) -> Result<(), AsmError> {
    let line = self.line_counter;
    let Some(first) = operands.first() else {
      return Err(AsmError::MissingOperand {
        line,
        context: ".word".to_string(),
      });
    };

    if operand::is_literal(first) {
      let value = operand::parse_literal(first).ok_or_else(|| AsmError::InvalidLiteral {
        line,
        token: first.clone(),
      })?;
      self.output.push(write_hex(value, 4));
      self.location_counter += 2;
    } else {
      for op in operands {
        let site = self.location_counter;
        let offset = self.resolve_symbol(op, RelocationType::Absolute, site)?;
        self.output.push(write_hex(offset, 4));
        self.location_counter += 2;
      }
    }
    Ok(())
  }

  fn instruction_sp(&mut self, tokens: &[String]) -> Result<(), AsmError> {
    let line = self.line_counter;
    let mnemonic = tokens[0].as_str();
    let operands = &tokens[1..];

    let kind = isa::lookup(mnemonic).ok_or_else(|| AsmError::UnknownInstruction {
      line,
      name: mnemonic.to_string(),
    })?;

    match kind {
      InstrKind::NoOperand { code } => {
        self.output.push(format!("{code:02X}"));
        self.location_counter += 1;
      }
      InstrKind::TwoReg { opcode } => {
        self.expect_operand_count(operands, 2, mnemonic)?;
        let dst = self.expect_register(&operands[0], ARITH_REG_MAX)?;
        let src = self.expect_register(&operands[1], ARITH_REG_MAX)?;
        self.output.push(format!("{opcode:02X} {dst:X}{src:X}"));
        self.location_counter += 2;
      }
      InstrKind::OneReg { opcode, fixed } => {
        self.expect_operand_count(operands, 1, mnemonic)?;
        let reg = self.expect_register(&operands[0], ARITH_REG_MAX)?;
        self.output.push(format!("{opcode:02X} {reg:X}{fixed:X}"));
        self.location_counter += 2;
      }
      InstrKind::Branch { opcode } => {
        let expression = self.form_operand(operands, mnemonic)?;
        let op = self.classify_branch(&expression)?;
        self.emit_branch(opcode, op)?;
      }
      InstrKind::LoadStore { opcode, store } => {
        let (dst, op) = self.load_store_operands(operands, mnemonic)?;
        self.emit_load_store(opcode, store, dst, op)?;
      }
      InstrKind::Stack { push } => {
        self.expect_operand_count(operands, 1, mnemonic)?;
        let reg = self.expect_register(&operands[0], ARITH_REG_MAX)?;
        let out = if push {
          format!("B0 6{reg:X} 22")
        } else {
          format!("A0 {reg:X}6 32")
        };
        self.output.push(out);
        self.location_counter += 3;
      }
    }
    Ok(())
  }

  fn emit_branch(&mut self, opcode: u8, op: Operand) -> Result<(), AsmError> {
    let site = self.location_counter;
    let size = op.encoded_size();

    let body = match op {
      Operand::ImmLit(value) => format!("F0 00 {}", write_hex(value, 4)),
      Operand::ImmSym(name) => {
        let offset = self.resolve_symbol(&name, RelocationType::Absolute, site)?;
        format!("F0 00 {}", write_hex(offset, 4))
      }
      Operand::PcRelSym(name) => {
        let offset = self.resolve_symbol(&name, RelocationType::PcRelative, site)?;
        format!("F7 05 {}", write_hex(offset, 4))
      }
      Operand::MemLit(value) => format!("F0 04 {}", write_hex(value, 4)),
      Operand::MemSym(name) => {
        let offset = self.resolve_symbol(&name, RelocationType::Absolute, site)?;
        format!("F0 04 {}", write_hex(offset, 4))
      }
      Operand::RegDir(reg) => format!("F{reg:X} 01"),
      Operand::RegInd(reg) => format!("F{reg:X} 02"),
      Operand::RegIndLit(reg, value) => format!("F{reg:X} 03 {}", write_hex(value, 4)),
      Operand::RegIndSym(reg, name) => {
        let offset = self.resolve_symbol(&name, RelocationType::Absolute, site)?;
        format!("F{reg:X} 03 {}", write_hex(offset, 4))
      }
    };

    self.output.push(format!("{opcode:02X} {body}"));
    self.location_counter += size;
    Ok(())
  }

  fn emit_load_store(
    &mut self,
    opcode: u8,
    store: bool,
    dst: u8,
    op: Operand,
  ) -> Result<(), AsmError> {
    let site = self.location_counter;
    let size = op.encoded_size();

    if store && matches!(op, Operand::ImmLit(_) | Operand::ImmSym(_)) {
      return Err(AsmError::StoreToImmediate {
        line: self.line_counter,
      });
    }

    let body = match op {
      Operand::ImmLit(value) => format!("0 00 {}", write_hex(value, 4)),
      Operand::ImmSym(name) => {
        let offset = self.resolve_symbol(&name, RelocationType::Absolute, site)?;
        format!("0 00 {}", write_hex(offset, 4))
      }
      Operand::MemLit(value) => format!("0 04 {}", write_hex(value, 4)),
      Operand::MemSym(name) => {
        let offset = self.resolve_symbol(&name, RelocationType::Absolute, site)?;
        format!("0 04 {}", write_hex(offset, 4))
      }
      Operand::PcRelSym(name) => {
        let offset = self.resolve_symbol(&name, RelocationType::PcRelative, site)?;
        format!("7 03 {}", write_hex(offset, 4))
      }
      Operand::RegDir(reg) => format!("{reg:X} 01"),
      Operand::RegInd(reg) => format!("{reg:X} 02"),
      Operand::RegIndLit(reg, value) => format!("{reg:X} 03 {}", write_hex(value, 4)),
      Operand::RegIndSym(reg, name) => {
        let offset = self.resolve_symbol(&name, RelocationType::Absolute, site)?;
        format!("{reg:X} 03 {}", write_hex(offset, 4))
      }
    };

    self.output.push(format!("{opcode:02X} {dst:X}{body}"));
    self.location_counter += size;
    Ok(())
  }

  /// Look a referenced symbol up and append a relocation at `site` unless the
  /// symbol is absolute. Returns the offset used as the initial payload.
  fn resolve_symbol(
    &mut self,
    name: &str,
    reloc_type: RelocationType,
    site: u32,
  ) -> Result<i64, AsmError> {
    let symbol = self.symbols.get(name).ok_or_else(|| AsmError::UndefinedSymbol {
      line: self.line_counter,
      name: name.to_string(),
    })?;

    let offset = symbol.offset;
    let symbol_number = symbol.index;
    let absolute = symbol.section == ABSOLUTE_SECTION;

    if !absolute {
      self.relocations.push(RelRecord {
        offset: site,
        reloc_type,
        symbol_number,
        section: self.current_section.clone(),
      });
    }
    Ok(offset)
  }

  // ---- shared helpers ---------------------------------------------------

  fn skip_count(&self, operands: &[String]) -> Result<u32, AsmError> {
    let line = self.line_counter;
    let Some(first) = operands.first() else {
      return Err(AsmError::MissingOperand {
        line,
        context: ".skip".to_string(),
      });
    };
    if operands.len() != 1 {
      return Err(AsmError::TrailingJunk {
        line,
        context: ".skip".to_string(),
      });
    }
    operand::parse_literal(first)
      .and_then(|value| u32::try_from(value).ok())
      .ok_or_else(|| AsmError::InvalidLiteral {
        line,
        token: first.clone(),
      })
  }

  fn load_store_operands(
    &self,
    operands: &[String],
    mnemonic: &str,
  ) -> Result<(u8, Operand), AsmError> {
    let Some(first) = operands.first() else {
      return Err(AsmError::MissingOperand {
        line: self.line_counter,
        context: mnemonic.to_string(),
      });
    };
    let dst = self.expect_register(first, ADDR_REG_MAX)?;
    let expression = self.form_operand(&operands[1..], mnemonic)?;
    let op = self.classify_load_store(&expression)?;
    Ok((dst, op))
  }

  /// Re-join a bracketed addressing expression that the tokenizer split
  /// apart (`*[r3 + 0x12]`) into one whitespace-free operand, then require
  /// end of line.
  fn form_operand(&self, operands: &[String], mnemonic: &str) -> Result<String, AsmError> {
    let line = self.line_counter;
    let Some(first) = operands.first() else {
      return Err(AsmError::MissingOperand {
        line,
        context: mnemonic.to_string(),
      });
    };

    let split_bracket =
      (first.starts_with("*[") || first.starts_with('[')) && !first.ends_with(']');
    if !split_bracket {
      if operands.len() != 1 {
        return Err(AsmError::TrailingJunk {
          line,
          context: mnemonic.to_string(),
        });
      }
      return Ok(first.clone());
    }

    let mut expression = first.clone();
    let mut used = 1;
    while !expression.ends_with(']') {
      if used == operands.len() {
        return Err(AsmError::UnclosedBracket { line });
      }
      expression.push_str(&operands[used]);
      used += 1;
    }
    if used != operands.len() {
      return Err(AsmError::TrailingJunk {
        line,
        context: mnemonic.to_string(),
      });
    }
    Ok(expression)
  }

  fn expect_operand_count(
    &self,
    operands: &[String],
    want: usize,
    mnemonic: &str,
  ) -> Result<(), AsmError> {
    if operands.len() < want {
      Err(AsmError::MissingOperand {
        line: self.line_counter,
        context: mnemonic.to_string(),
      })
    } else if operands.len() > want {
      Err(AsmError::TrailingJunk {
        line: self.line_counter,
        context: mnemonic.to_string(),
      })
    } else {
      Ok(())
    }
  }

  fn expect_register(&self, token: &str, max: u8) -> Result<u8, AsmError> {
    isa::register_number(token, max).ok_or_else(|| AsmError::InvalidRegister {
      line: self.line_counter,
      token: token.to_string(),
    })
  }

  fn classify_branch(&self, expression: &str) -> Result<Operand, AsmError> {
    operand::classify_branch(expression).ok_or_else(|| AsmError::UnknownAddressingMode {
      line: self.line_counter,
      operand: expression.to_string(),
    })
  }

  fn classify_load_store(&self, expression: &str) -> Result<Operand, AsmError> {
    operand::classify_load_store(expression).ok_or_else(|| AsmError::UnknownAddressingMode {
      line: self.line_counter,
      operand: expression.to_string(),
    })
  }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Render `val` as `nibbles` big-endian hex digits, uppercase, with a space
/// between bytes: `write_hex(16, 4)` is `"00 10"`.
fn write_hex(val: i64, nibbles: usize) -> String {
  let bits = val as u64;
  let mut out = String::new();
  for i in (0..nibbles).rev() {
    let nibble = if i * 4 < 64 { (bits >> (i * 4)) & 0xF } else { 0 };
    out.push(HEX_DIGITS[nibble as usize] as char);
    if i % 2 == 0 && i != 0 {
      out.push(' ');
    }
  }
  out
}
