//! Error types for the SysY compiler core.

use thiserror::Error;

/// Errors produced by the MIR graph, the pass framework, and the backend.
///
/// Per the error-handling design: invariant violations are programmer
/// errors, not recoverable conditions. They are threaded through as
/// `Result` so every layer can add context with `?`, but the only sane
/// response at the top (the pass manager driver, the CLI) is to log the
/// diagnostic and abort the process.
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("invariant violated in {context}: {detail}")]
    InvariantViolation { context: String, detail: String },

    #[error("malformed MIR text input: {0}")]
    ParseError(String),

    #[error("backend lowering error: {0}")]
    BackendError(String),

    #[error("pass '{pass}' failed: {detail}")]
    PassFailed { pass: String, detail: String },
}

impl CoreError {
    pub fn invariant(context: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            context: context.into(),
            detail: detail.into(),
        }
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self::ParseError(detail.into())
    }

    pub fn backend(detail: impl Into<String>) -> Self {
        Self::BackendError(detail.into())
    }

    pub fn pass(pass: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PassFailed {
            pass: pass.into(),
            detail: detail.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Log a `CoreError` at `error` level and abort the process.
///
/// This is the one place the "fail fatally" half of the error-handling
/// design actually terminates the program; everywhere else the error
/// travels as a plain `Result`.
pub fn abort_on_error(err: &CoreError) -> ! {
    log::error!("{err}");
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant_message_names_context_and_detail() {
        let err = CoreError::invariant("Block::terminator", "missing terminator in %entry");
        assert_eq!(
            err.to_string(),
            "invariant violated in Block::terminator: missing terminator in %entry"
        );
    }
}
