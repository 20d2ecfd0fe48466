use std::fs;
use std::process::ExitCode;
use clap::{Parser as ClapParser};
use log::info;

mod assembler;
mod error;
mod isa;
mod operand;
mod parser;
mod report;

use crate::assembler::HypoObjectFile;
use crate::error::AsmError;
use crate::report::TextReport;

#[derive(ClapParser)]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Input assembly file
  input: String,

  /// Output object report file
  output: String,

  /// Also write a binary object file to this path
  #[arg(short, long)]
  binary: Option<String>,

  /// Increase logging verbosity (-v, -vv, etc.)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn main() -> ExitCode {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(e) => {
      let _ = e.print();
      return ExitCode::from(1);
    }
  };

  let log_level = match cli.verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };

  unsafe {
    std::env::set_var("RUST_LOG", log_level);
  }

  env_logger::init();

  match run(&cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      println!("{e}");
      ExitCode::from(1)
    }
  }
}

fn run(cli: &Cli) -> Result<(), AsmError> {
  info!("Assembling {} into {}", cli.input, cli.output);

  let source = fs::read_to_string(&cli.input).map_err(|e| AsmError::Input {
    path: cli.input.clone(),
    source: e,
  })?;

  let object = assembler::assemble(&source)?;

  info!(
    "Assembled {} symbols, {} relocations, {} output records",
    object.symbols.len(),
    object.relocations.len(),
    object.output.len()
  );

  TextReport(&object).write_to_path(&cli.output)?;

  if let Some(path) = &cli.binary {
    info!("Writing binary object file to {}", path);
    HypoObjectFile::new(object).write_to_path(path)?;
  }

  Ok(())
}
