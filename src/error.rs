use thiserror::Error;

/// Fatal assembly diagnostics. The first one raised aborts the run; every
/// variant produced while walking the source carries the 1-based line counter.
#[derive(Debug, Error)]
pub enum AsmError {
  #[error("ERROR opening input file: {path}: {source}")]
  Input {
    path: String,
    source: std::io::Error,
  },

  #[error("ERROR in line {line}, unknown directive: {name}")]
  UnknownDirective { line: u32, name: String },

  #[error("ERROR in line {line}, unknown instruction: {name}")]
  UnknownInstruction { line: u32, name: String },

  #[error("ERROR in line {line}, missing operand after {context}")]
  MissingOperand { line: u32, context: String },

  #[error("ERROR in line {line}, junk after {context}")]
  TrailingJunk { line: u32, context: String },

  #[error("ERROR in line {line}, no closing bracket in operand")]
  UnclosedBracket { line: u32 },

  #[error("ERROR in line {line}, {name} is not a valid symbol")]
  InvalidIdentifier { line: u32, name: String },

  #[error("ERROR in line {line}, {token} is not a valid literal")]
  InvalidLiteral { line: u32, token: String },

  #[error("ERROR in line {line}, {token} is not a valid register")]
  InvalidRegister { line: u32, token: String },

  #[error("ERROR in line {line}, unknown addressing mode: {operand}")]
  UnknownAddressingMode { line: u32, operand: String },

  #[error("ERROR in line {line}, symbol {name} undefined")]
  UndefinedSymbol { line: u32, name: String },

  #[error("ERROR in line {line}, symbol {name} already defined")]
  DuplicateSymbol { line: u32, name: String },

  #[error("ERROR in line {line}, .equ directive syntax error")]
  EquSyntax { line: u32 },

  #[error("ERROR in line {line}, cannot store to immediate value")]
  StoreToImmediate { line: u32 },

  #[error("ERROR writing output file: {0}")]
  Output(#[from] std::io::Error),
}
