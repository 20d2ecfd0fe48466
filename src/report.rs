//! Serializes an assembled object into the text report: symbol table,
//! per-section relocation tables, then the emitted byte stream.

use std::io::Write;
use std::path::Path;

use crate::assembler::{HypoObject, RelRecord};

/// The human-readable object report for one assembled source file.
pub struct TextReport<'a>(pub &'a HypoObject);

impl TextReport<'_> {
  pub fn write_to(&self, writer: &mut dyn Write) -> std::io::Result<()> {
    write_symtab(self.0, writer)?;
    write_reloc(self.0, writer)?;
    write_object_file(self.0, writer)
  }

  pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    self.write_to(&mut file)
  }
}

fn write_symtab(object: &HypoObject, out: &mut dyn Write) -> std::io::Result<()> {
  writeln!(out, "# ------------------ SYMBOL TABLE ------------------")?;
  writeln!(
    out,
    "{:>15}{:>15}{:>15}{:>15}{:>15}",
    "LABEL", "SECTION", "OFFSET", "SCOPE", "NUMBER"
  )?;
  for symbol in &object.symbols {
    writeln!(
      out,
      "{:>15}{:>15}{:>15}{:>15}{:>15}",
      symbol.label,
      symbol.section,
      symbol.offset,
      // Scope's Display ignores the width spec, so pad the rendered string.
      symbol.scope.to_string(),
      symbol.index
    )?;
  }
  Ok(())
}

fn write_reloc(object: &HypoObject, out: &mut dyn Write) -> std::io::Result<()> {
  // Group by section, keeping first-appearance order.
  let mut names: Vec<&str> = Vec::new();
  let mut groups: Vec<Vec<&RelRecord>> = Vec::new();
  for rel in &object.relocations {
    match names.iter().position(|&name| name == rel.section) {
      Some(i) => groups[i].push(rel),
      None => {
        names.push(&rel.section);
        groups.push(vec![rel]);
      }
    }
  }

  for (name, group) in names.iter().zip(&groups) {
    writeln!(out)?;
    writeln!(out)?;
    writeln!(out, "# ------------------ REL.{} ------------------", name)?;
    for rel in group {
      writeln!(out, "{} {} {}", rel.offset, rel.reloc_type, rel.symbol_number)?;
    }
  }
  Ok(())
}

fn write_object_file(object: &HypoObject, out: &mut dyn Write) -> std::io::Result<()> {
  writeln!(out)?;
  writeln!(out)?;
  writeln!(out, "# ------------------ OBJECT FILE ------------------")?;
  for entry in &object.output {
    writeln!(out, "{}", entry)?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assembler::assemble;

  fn render(object: &HypoObject) -> String {
    let mut buffer = Vec::new();
    TextReport(object).write_to(&mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
  }

  #[test]
  fn report_has_the_three_sections_in_order() {
    let object = assemble(".extern x\n.section .text\n.word x\nhalt\n").unwrap();
    let report = render(&object);

    let expected = "\
# ------------------ SYMBOL TABLE ------------------
          LABEL        SECTION         OFFSET          SCOPE         NUMBER
              x            UND              0              g              0
           text           text              0              l              1


# ------------------ REL.text ------------------
0 R_HYPO_16 0


# ------------------ OBJECT FILE ------------------
00 00
00
";
    assert_eq!(report, expected);
  }

  #[test]
  fn relocations_group_by_section_in_first_appearance_order() {
    let object = assemble(
      ".extern x\n\
       .section .text\n\
       call x\n\
       .section .data\n\
       .word x\n\
       .section .more\n\
       .word x\n\
       .section .text2\n\
       jmp x\n",
    )
    .unwrap();
    let report = render(&object);

    let text_pos = report.find("REL.text ").unwrap();
    let data_pos = report.find("REL.data ").unwrap();
    let more_pos = report.find("REL.more ").unwrap();
    let text2_pos = report.find("REL.text2 ").unwrap();
    assert!(text_pos < data_pos && data_pos < more_pos && more_pos < text2_pos);
  }

  #[test]
  fn empty_relocation_table_prints_no_groups() {
    let object = assemble(".section .text\nhalt\n").unwrap();
    let report = render(&object);

    assert!(!report.contains("REL."));
    assert!(report.contains("# ------------------ OBJECT FILE ------------------"));
  }

  #[test]
  fn object_file_section_lists_entries_in_emission_order() {
    let object = assemble(".section .text\npush r3\nhalt\n").unwrap();
    let report = render(&object);

    let expected_tail = "# ------------------ OBJECT FILE ------------------\nB0 63 22\n00\n";
    assert!(report.ends_with(expected_tail));
  }
}
