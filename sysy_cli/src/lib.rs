//! Driver library for the SysY MIR optimizer and RISC-V backend (§6): reads
//! MIR text, runs the selected optimization pipeline, and either re-prints
//! the optimized MIR or lowers it to RV64GC assembly. `main.rs` is a thin
//! `clap` wrapper over [`run`]; the logic lives here so it can be
//! exercised directly by tests without spawning a process.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use sysy_common::{CoreError, CoreResult};
use sysy_pass::OptLevel;

/// What `sysyc` should produce: the optimized MIR text itself, or assembly
/// lowered through `sysy_backend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum EmitKind {
    #[value(name = "mir")]
    Mir,
    #[value(name = "asm")]
    Asm,
}

impl fmt::Display for EmitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitKind::Mir => write!(f, "mir"),
            EmitKind::Asm => write!(f, "asm"),
        }
    }
}

/// The resolved invocation, independent of how it was parsed (`clap` in
/// `main.rs`, or constructed directly by a test).
pub struct Invocation {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub opt_level: OptLevel,
    pub emit: EmitKind,
}

/// Reads `invocation.input`, runs the selected pipeline, and returns the
/// resulting text (MIR or assembly) without touching the filesystem for
/// output — `main.rs` decides where that text goes.
pub fn compile_text(source: &str, invocation: &Invocation) -> CoreResult<String> {
    let mut module = sysy_mir::parse_module(source)?;
    sysy_mir::verify_module(&module)?;

    sysy_pass::pipeline::run(&mut module, invocation.opt_level)?;
    sysy_mir::verify_module(&module)?;

    match invocation.emit {
        EmitKind::Mir => Ok(sysy_mir::print_module(&module)),
        EmitKind::Asm => {
            let functions: Vec<_> = module
                .functions
                .iter()
                .copied()
                .filter(|&f| module.value(f).kind.as_function().expect("not a function").is_defined())
                .collect();
            sysy_backend::compile(&mut module, &functions)
        }
    }
}

/// Runs a full invocation end to end: reads `invocation.input` from disk,
/// compiles it, and writes the result either to `invocation.output` or
/// stdout. The only fallible filesystem operations in the whole crate live
/// here, so callers (`main.rs`) have one place to route through
/// `sysy_common::abort_on_error`.
pub fn run(invocation: &Invocation) -> CoreResult<()> {
    let source = read_input(&invocation.input)?;
    let output_text = compile_text(&source, invocation)?;
    write_output(invocation.output.as_deref(), &output_text)
}

fn read_input(path: &Path) -> CoreResult<String> {
    fs::read_to_string(path).map_err(|e| CoreError::parse(format!("reading {}: {e}", path.display())))
}

fn write_output(path: Option<&Path>, text: &str) -> CoreResult<()> {
    match path {
        Some(path) => fs::write(path, text).map_err(|e| CoreError::backend(format!("writing {}: {e}", path.display()))),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDENTITY_MIR: &str = "\
define i32 @main() {
entry:
  ret i32 0
}
";

    #[test]
    fn o0_round_trips_mir_to_mir() {
        let invocation = Invocation {
            input: PathBuf::from("in.mir"),
            output: None,
            opt_level: OptLevel::O0,
            emit: EmitKind::Mir,
        };
        let text = compile_text(IDENTITY_MIR, &invocation).expect("compiles");
        assert!(text.contains("define i32 @main()"));
        assert!(text.contains("ret i32 0"));
    }

    #[test]
    fn o1_emit_asm_produces_a_globl_directive() {
        let invocation = Invocation {
            input: PathBuf::from("in.mir"),
            output: None,
            opt_level: OptLevel::O1,
            emit: EmitKind::Asm,
        };
        let text = compile_text(IDENTITY_MIR, &invocation).expect("compiles");
        assert!(text.contains(".globl main"));
    }

    #[test]
    fn malformed_mir_is_a_parse_error_not_a_panic() {
        let invocation = Invocation {
            input: PathBuf::from("in.mir"),
            output: None,
            opt_level: OptLevel::O0,
            emit: EmitKind::Mir,
        };
        let err = compile_text("not valid mir at all {{{", &invocation).unwrap_err();
        assert!(matches!(err, CoreError::ParseError(_)));
    }
}
