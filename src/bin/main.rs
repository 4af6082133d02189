use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use gbc::verify::{self, analyze_stack, disassemble, disassemble_with_depths, ClassReader, MethodEntry};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "gbc")]
#[command(about = "Inspect and check class files produced by the gbc generator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print an instruction listing of a class file
    Disasm {
        /// Input .class file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Only list methods with this name
        #[arg(short, long, value_name = "NAME")]
        method: Option<String>,

        /// Show the operand stack depth before each instruction
        #[arg(short, long)]
        depth: bool,
    },

    /// Run the stack-depth verification over class files
    Check {
        /// Input .class files
        #[arg(value_name = "FILE", required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let outcome = match &cli.command {
        Commands::Disasm { input, method, depth } => disasm_file(input, method.as_deref(), *depth),
        Commands::Check { inputs } => check_files(inputs),
    };
    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn read_class(input: &PathBuf) -> Result<ClassReader> {
    let bytes = fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    ClassReader::parse(&bytes).with_context(|| format!("parsing {}", input.display()))
}

fn list_method(class: &ClassReader, method: &MethodEntry, depth: bool) -> Result<String> {
    let listing = if depth {
        let analysis = analyze_stack(class, method)?;
        disassemble_with_depths(class, method, &analysis)?
    } else {
        disassemble(class, method)?
    };
    Ok(listing)
}

fn disasm_file(input: &PathBuf, method: Option<&str>, depth: bool) -> Result<()> {
    let class = read_class(input)?;
    let mut printed = 0;
    for entry in &class.methods {
        if method.is_some_and(|name| name != entry.name) {
            continue;
        }
        printed += 1;
        match &entry.code {
            Some(code) => {
                println!(
                    "{}{} (max_stack={}, max_locals={})",
                    entry.name, entry.descriptor, code.max_stack, code.max_locals
                );
                print!("{}", list_method(&class, entry, depth)?);
            }
            None => println!("{}{} (no code)", entry.name, entry.descriptor),
        }
        println!();
    }
    if let (Some(name), 0) = (method, printed) {
        bail!("no method named {} in {}", name, class.name);
    }
    Ok(())
}

fn check_files(inputs: &[PathBuf]) -> Result<()> {
    let mut failed = 0;
    for input in inputs {
        let checked = fs::read(input)
            .with_context(|| format!("reading {}", input.display()))
            .and_then(|bytes| verify::verify_class(&bytes).map_err(anyhow::Error::from));
        match checked {
            Ok(class) => println!("{}: ok ({} methods)", input.display(), class.methods.len()),
            Err(e) => {
                failed += 1;
                println!("{}: {e:#}", input.display());
            }
        }
    }
    if failed > 0 {
        bail!("{failed} of {} class files failed verification", inputs.len());
    }
    Ok(())
}
