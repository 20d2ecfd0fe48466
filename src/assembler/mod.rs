use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use bincode::{Decode, Encode};
use log::debug;

pub mod assemble;
pub mod symtab;

pub use assemble::assemble;

/// Section assigned to `.extern` symbols.
pub const UNDEFINED_SECTION: &str = "UND";
/// Section assigned to `.equ` constants; references to it never relocate.
pub const ABSOLUTE_SECTION: &str = "ABS";
/// Section of labels defined before any `.section` directive.
pub const BLANK_SECTION: &str = "BLANK";

#[derive(Debug, Eq, PartialEq, Clone, Copy, Encode, Decode)]
pub enum Scope {
  Local,
  Global,
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Scope::Local => write!(f, "l"),
      Scope::Global => write!(f, "g"),
    }
  }
}

#[derive(Debug, Eq, PartialEq, Clone, Encode, Decode)]
pub struct Symbol {
  /// The symbol's name, unique across the table.
  pub label: String,
  /// Defining section, or `UND`/`ABS` for externs and constants.
  pub section: String,
  /// Within-section byte offset, or the absolute value for `ABS` symbols.
  pub offset: i64,
  pub scope: Scope,
  /// Insertion ordinal; relocations reference symbols by this number.
  pub index: u32,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Encode, Decode)]
pub enum RelocationType {
  Absolute,
  PcRelative,
}

impl fmt::Display for RelocationType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RelocationType::Absolute => write!(f, "R_HYPO_16"),
      RelocationType::PcRelative => write!(f, "R_HYPO_PC16"),
    }
  }
}

#[derive(Debug, Eq, PartialEq, Clone, Encode, Decode)]
pub struct RelRecord {
  /// Location counter at the start of the construct being patched.
  pub offset: u32,
  pub reloc_type: RelocationType,
  /// `index` of the referenced symbol.
  pub symbol_number: u32,
  /// Section containing the patch site.
  pub section: String,
}

/// Everything a single assembly run produces, in emission order.
#[derive(Debug, Eq, PartialEq, Clone, Encode, Decode)]
pub struct HypoObject {
  pub symbols: Vec<Symbol>,
  pub relocations: Vec<RelRecord>,
  /// Hex-digit strings, one per emitting source construct.
  pub output: Vec<String>,
}

pub const OBJECT_MAGIC: [u8; 4] = *b"HYP\0";
pub const OBJECT_VERSION: u16 = 1;

#[derive(Debug, Eq, PartialEq, Clone, Encode, Decode)]
pub struct HypoObjectHeader {
  pub magic: [u8; 4],
  pub version: u16,
  pub reserved: u16,
  pub checksum: u32,
}

/// Binary object container written next to the text report on request.
#[derive(Debug, Eq, PartialEq, Clone, Encode, Decode)]
pub struct HypoObjectFile {
  pub header: HypoObjectHeader,
  pub object: HypoObject,
}

impl HypoObjectFile {
  pub fn new(object: HypoObject) -> Self {
    HypoObjectFile {
      header: HypoObjectHeader {
        magic: OBJECT_MAGIC,
        version: OBJECT_VERSION,
        reserved: 0,
        checksum: 0,
      },
      object,
    }
  }

  pub fn write_to(&self, writer: &mut dyn Write) -> std::io::Result<()> {
    let config = bincode::config::standard();

    // The checksum covers the file with its own checksum field zeroed.
    let mut file_with_zero_checksum = self.clone();
    file_with_zero_checksum.header.checksum = 0;

    let encoded_without_checksum = bincode::encode_to_vec(&file_with_zero_checksum, config)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    let checksum = crc32fast::hash(&encoded_without_checksum);
    debug!("Object checksum: {}", checksum);

    let mut final_file = self.clone();
    final_file.header.checksum = checksum;

    let final_encoded = bincode::encode_to_vec(&final_file, config)
      .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    writer.write_all(&final_encoded)?;
    Ok(())
  }

  pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    self.write_to(&mut file)
  }

  pub fn read_from(reader: &mut dyn Read) -> std::io::Result<Self> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;

    let config = bincode::config::standard();
    match bincode::decode_from_slice(&buffer, config) {
      Ok((file, _)) => Ok(file),
      Err(e) => Err(std::io::Error::new(std::io::ErrorKind::Other, e)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_object() -> HypoObject {
    HypoObject {
      symbols: vec![
        Symbol {
          label: "text".to_string(),
          section: "text".to_string(),
          offset: 0,
          scope: Scope::Local,
          index: 0,
        },
        Symbol {
          label: "main".to_string(),
          section: "text".to_string(),
          offset: 0,
          scope: Scope::Global,
          index: 1,
        },
      ],
      relocations: vec![RelRecord {
        offset: 1,
        reloc_type: RelocationType::Absolute,
        symbol_number: 1,
        section: "text".to_string(),
      }],
      output: vec!["00".to_string(), "50 F0 00 00 00".to_string()],
    }
  }

  #[test]
  fn test_serialization_round_trip() {
    let object = sample_object();
    let file = HypoObjectFile::new(object.clone());

    let mut buffer = Vec::new();
    file.write_to(&mut buffer).unwrap();

    let decoded = HypoObjectFile::read_from(&mut buffer.as_slice()).unwrap();

    assert_eq!(decoded.object, object);
    assert_eq!(decoded.header.magic, OBJECT_MAGIC);
    assert_eq!(decoded.header.version, OBJECT_VERSION);
    assert_eq!(decoded.header.reserved, 0);
  }

  #[test]
  fn checksum_covers_the_zeroed_file() {
    let file = HypoObjectFile::new(sample_object());

    let mut buffer = Vec::new();
    file.write_to(&mut buffer).unwrap();
    let decoded = HypoObjectFile::read_from(&mut buffer.as_slice()).unwrap();

    let mut zeroed = decoded.clone();
    zeroed.header.checksum = 0;
    let config = bincode::config::standard();
    let expected = crc32fast::hash(&bincode::encode_to_vec(&zeroed, config).unwrap());

    assert_ne!(decoded.header.checksum, 0);
    assert_eq!(decoded.header.checksum, expected);
  }

  #[test]
  fn relocation_types_print_their_link_names() {
    assert_eq!(RelocationType::Absolute.to_string(), "R_HYPO_16");
    assert_eq!(RelocationType::PcRelative.to_string(), "R_HYPO_PC16");
  }

  #[test]
  fn scopes_print_single_letters() {
    assert_eq!(Scope::Local.to_string(), "l");
    assert_eq!(Scope::Global.to_string(), "g");
  }
}
