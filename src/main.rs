use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Report, Result};

use lcsim::{image, AsmOptions, Assembler, Assembly, Machine, Memory, Phase};

/// lcsim assembles LC3 source into a memory image and walks it through the instruction cycle.
#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` file into a binary memory image
    Assemble {
        /// `.asm` file to assemble
        name: PathBuf,
        /// Destination of the image, defaults to the source with a `.bin` extension
        dest: Option<PathBuf>,
        /// Address used until the first ORG directive
        #[arg(long, value_parser = parse_address, default_value = "0x3000")]
        origin: u16,
    },
    /// Check a `.asm` file without writing an image
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Run a `.asm` file or a binary image until HALT
    Run {
        /// `.asm` source or `.bin` image
        name: PathBuf,
        /// Load address of a binary image, or the default origin of a source file
        #[arg(long, value_parser = parse_address, default_value = "0x3000")]
        origin: u16,
        /// Give up after this many instruction cycles
        #[arg(long, default_value_t = 100_000)]
        max_cycles: usize,
        /// Print every nonzero memory cell after the run
        #[arg(long)]
        dump: bool,
    },
    /// Advance a program one cycle phase at a time, printing the registers after each
    Step {
        /// `.asm` source or `.bin` image
        name: PathBuf,
        /// Number of phases to run
        #[arg(short, long, default_value_t = 6)]
        phases: usize,
        /// Load address of a binary image, or the default origin of a source file
        #[arg(long, value_parser = parse_address, default_value = "0x3000")]
        origin: u16,
    },
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    lcsim::env::init().into_diagnostic()?;

    match args.command {
        Command::Assemble { name, dest, origin } => {
            file_message(Green, "Assembling", &name);
            let assembly = assemble(&name, origin)?;

            let dest = dest.unwrap_or_else(|| name.with_extension("bin"));
            let words = assembly.save(&dest)?;
            message(Green, "Finished", format!("emit binary, {words} words"));
            file_message(Green, "Saved", &dest);
            Ok(())
        }
        Command::Check { name } => {
            file_message(Green, "Checking", &name);
            let assembly = assemble(&name, lcsim::DEFAULT_ORIGIN)?;
            if !assembly.is_clean() {
                bail!("{} line(s) could not be assembled", assembly.diagnostics.len());
            }
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Command::Run {
            name,
            origin,
            max_cycles,
            dump,
        } => {
            let mut machine = load(&name, origin)?;
            message(Green, "Running", format!("from x{:04X}", machine.registers.pc));
            let cycles = machine.run(max_cycles);
            if machine.is_halted() {
                message(Cyan, "Halted", format!("after {cycles} cycles"));
            } else {
                message(Red, "Stopped", format!("cycle limit of {max_cycles} reached"));
            }
            println!("{}", machine.registers);
            if dump {
                dump_memory(&machine.memory);
            }
            Ok(())
        }
        Command::Step {
            name,
            phases,
            origin,
        } => {
            let mut machine = load(&name, origin)?;
            for _ in 0..phases {
                let phase = machine.step();
                message(Cyan, "Phase", phase.to_string());
                println!("{}", machine.registers);
                if phase == Phase::Halted {
                    break;
                }
            }
            Ok(())
        }
    }
}

enum MsgColor {
    Green,
    Cyan,
    Yellow,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    message(color, left, format!("target {}", right.display()));
}

fn message(color: MsgColor, left: &str, right: impl Display) {
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Yellow => left.yellow(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn parse_address(text: &str) -> std::result::Result<u16, String> {
    lcsim::parse_hex(text).map_err(|err| err.to_string())
}

/// Assemble a source file, reporting every skipped line.
fn assemble(name: &Path, origin: u16) -> Result<Assembly> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    let assembly = Assembler::new(AsmOptions { origin }).assemble(&src)?;
    for diag in &assembly.diagnostics {
        message(
            MsgColor::Yellow,
            "Skipped",
            format!("line {}: `{}`", diag.line, diag.source),
        );
        eprintln!("{:?}", Report::new(diag.error.clone()));
    }
    if !assembly.is_clean() {
        let skipped = assembly.diagnostics.len();
        message(MsgColor::Yellow, "Warning", format!("{skipped} line(s) skipped"));
    }
    Ok(assembly)
}

/// Build a machine from source or from a binary image.
fn load(name: &Path, origin: u16) -> Result<Machine> {
    let Some(ext) = name.extension().and_then(|ext| ext.to_str()) else {
        bail!("File has no extension. Exiting...");
    };
    match ext {
        "asm" => {
            file_message(MsgColor::Green, "Assembling", name);
            Ok(Machine::from_assembly(assemble(name, origin)?))
        }
        "bin" | "obj" | "lc3" => {
            file_message(MsgColor::Green, "Loading", name);
            let mut memory = Memory::new();
            let words = image::load(name, &mut memory, origin)?;
            message(MsgColor::Green, "Loaded", format!("{words} words at x{origin:04X}"));
            Ok(Machine::new(memory, origin))
        }
        _ => bail!("File has unknown extension. Exiting..."),
    }
}

fn dump_memory(memory: &Memory) {
    for (addr, word) in memory.as_slice().iter().enumerate() {
        if *word != 0 {
            println!("x{addr:04X}: x{word:04X}");
        }
    }
}
