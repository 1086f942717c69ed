use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stack_machine::Processor;
use stack_machine::assembler::assemble;
use stack_machine::bytecode::Bytecode;
use stack_machine::console::StreamConsole;
use stack_machine::instruction::disassemble;
use stack_machine::memory::{Memory, MemoryConfig};
use tracing::{Level, error, info, warn};

mod files;

#[derive(Parser)]
#[command(version, about, long_about = None, arg_required_else_help(true))]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Diagnostics at or above this level go to stderr
    #[arg(short, long, global = true, default_value_t = Level::WARN)]
    log_level: Level,

    #[command(flatten)]
    machine: MachineArgs,
}

#[derive(clap::Args)]
struct MachineArgs {
    /// Number of memory cells
    #[arg(long, global = true, default_value_t = MemoryConfig::default().capacity)]
    memory_cells: usize,

    /// Framebuffer height in pixels
    #[arg(long, global = true, default_value_t = MemoryConfig::default().rows)]
    screen_rows: usize,

    /// Framebuffer width in pixels
    #[arg(long, global = true, default_value_t = MemoryConfig::default().columns)]
    screen_columns: usize,

    /// Draw without ANSI colors
    #[arg(long, global = true)]
    no_color: bool,
}

impl MachineArgs {
    fn config(&self) -> MemoryConfig {
        MemoryConfig {
            capacity: self.memory_cells,
            rows: self.screen_rows,
            columns: self.screen_columns,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a source file into a bytecode image
    Assemble {
        /// Source file (.asm)
        file: PathBuf,

        /// Image to write, defaults to the source path with .vm
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Execute a bytecode image
    Run {
        /// Image file (.vm)
        file: PathBuf,
    },
    /// Assemble a source file and execute the resulting image
    Exec {
        /// Source file (.asm)
        file: PathBuf,
    },
    /// Print the instructions of a bytecode image
    Disasm {
        /// Image file (.vm)
        file: PathBuf,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = main_real(args) {
        error!("{e:#}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn main_real(args: Args) -> anyhow::Result<()> {
    match args.command {
        Command::Assemble { file, output } => {
            assemble_file(&file, output)?;
        }
        Command::Run { file } => {
            execute(files::read_image(&file)?, &args.machine)?;
        }
        Command::Exec { file } => {
            let image = assemble_file(&file, None)?;
            execute(files::read_image(&image)?, &args.machine)?;
        }
        Command::Disasm { file } => {
            let mut code = files::read_image(&file)?;
            let mut out = io::stdout().lock();
            for (at, instruction) in disassemble(&mut code)? {
                writeln!(out, "{at:>5}  {instruction}")?;
            }
        }
    }
    Ok(())
}

/// Assembles `source` into its image file and returns the image path.
/// On failure the image file is overwritten with the corrupt marker.
fn assemble_file(source: &Path, output: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let image = match output {
        Some(path) => {
            files::require_extension(source, files::SOURCE_EXTENSION)?;
            path
        }
        None => files::image_path(source)?,
    };
    let text = files::read_source(source)?;

    match assemble(&text) {
        Ok(code) => {
            files::write_image(&image, &code)?;
            info!(
                source = %source.display(),
                image = %image.display(),
                words = code.len(),
                "assembled"
            );
            Ok(image)
        }
        Err(err) => {
            if let Err(mark) = files::mark_corrupt(&image) {
                warn!(image = %image.display(), %mark, "could not mark image as corrupt");
            }
            Err(anyhow::Error::new(err).context(format!("cannot assemble {}", source.display())))
        }
    }
}

fn execute(code: Bytecode, machine: &MachineArgs) -> anyhow::Result<()> {
    execute_on(code, machine, io::stdin().lock(), io::stdout().lock())
}

fn execute_on<R: BufRead, W: Write>(
    code: Bytecode,
    machine: &MachineArgs,
    input: R,
    output: W,
) -> anyhow::Result<()> {
    let memory = Memory::new(machine.config())?;
    let console = StreamConsole::new(input, output).with_color(!machine.no_color);
    let mut processor = Processor::new(code, memory, console);
    processor
        .run()
        .with_context(|| format!("execution stopped at word {}", processor.position()))
}
