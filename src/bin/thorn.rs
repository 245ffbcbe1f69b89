extern crate thorn;

use anyhow::Context;
use clap::Parser as CParser;
use clap::ValueEnum;
use thorn::optimizer::OptimizationLevel;
use thorn::Thorn;

#[derive(CParser, Debug)]
#[command(author, version, about = "Lexer, parser, optimizer, and interpreter for Thorn scripts")]
struct Cli {
    /// Path to the .thorn source file to run.
    file: std::path::PathBuf,

    /// Optimization level applied before interpretation.
    #[arg(short = 'O', long = "opt-level", value_enum, default_value_t = OptLevel::O1)]
    opt_level: OptLevel,

    /// Print the notes each optimization pass leaves behind.
    #[arg(long)]
    debug_optimizer: bool,

    /// Log level of the runtime itself, not the Thorn program being run.
    #[arg(short, long, default_value_t = log::Level::Warn)]
    verbosity: log::Level,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OptLevel {
    O0,
    O1,
    O2,
    O3,
}

impl From<OptLevel> for OptimizationLevel {
    fn from(value: OptLevel) -> Self {
        match value {
            OptLevel::O0 => OptimizationLevel::O0,
            OptLevel::O1 => OptimizationLevel::O1,
            OptLevel::O2 => OptimizationLevel::O2,
            OptLevel::O3 => OptimizationLevel::O3,
        }
    }
}

fn main() {
    let args = Cli::parse();
    if let Err(err) = install_logger(args.verbosity) {
        eprintln!("{err:?}");
        std::process::exit(1);
    }

    let mut thorn = Thorn::new()
        .with_optimization_level(args.opt_level.into())
        .with_optimizer_debug(args.debug_optimizer);

    // `ThornError::Throw` carries a `Value`, which holds `Rc`s and so isn't
    // `Send + Sync` — it can't flow through `anyhow::Error`, unlike the setup
    // errors above, so it's handled directly instead of with `?`.
    match thorn.run_file_with_notes(&args.file) {
        Ok((_, notes)) => {
            for note in notes {
                log::debug!("{note}");
            }
        }
        Err(err) => {
            log::error!("running '{}': {err}", args.file.display());
            std::process::exit(1);
        }
    }
}

/// The one truly fallible piece of process setup outside the Thorn program
/// itself, so it goes through the same `anyhow` glue the rest of this
/// crate's lineage uses for ad hoc CLI errors.
fn install_logger(level: log::Level) -> anyhow::Result<()> {
    simple_logger::init_with_level(level).context("installing logger")
}
