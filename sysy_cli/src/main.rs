//! `sysyc` — the SysY MIR optimizer and RISC-V backend driver (§6):
//!
//! ```text
//! sysyc [--opt-level {o0,o1}] [--emit {mir,asm}] [-v|-q] <input.mir> [-o <output>]
//! ```

use clap::Parser;
use std::path::PathBuf;
use sysy_cli::{EmitKind, Invocation};
use sysy_pass::OptLevel;

#[derive(Parser)]
#[command(name = "sysyc")]
#[command(about = "SysY MIR optimizer and RISC-V backend")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// MIR text file to compile.
    input: PathBuf,

    /// Output path; stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Optimization pipeline to run.
    #[arg(long, default_value = "o1")]
    opt_level: OptLevel,

    /// What to produce: the optimized MIR text, or RISC-V assembly.
    #[arg(long, default_value = "asm")]
    emit: EmitKind,

    /// Enable debug logging (per-pass entry/exit/mutation).
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all logging but errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        log::LevelFilter::Debug
    } else if cli.quiet {
        log::LevelFilter::Error
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let invocation = Invocation {
        input: cli.input,
        output: cli.output,
        opt_level: cli.opt_level,
        emit: cli.emit,
    };

    if let Err(err) = sysy_cli::run(&invocation) {
        sysy_common::abort_on_error(&err);
    }
}
