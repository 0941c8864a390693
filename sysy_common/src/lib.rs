//! Shared error types for the SysY compiler core.
//!
//! The frontend (lexer/parser/AST lowering) and its source-level diagnostics
//! live outside this core; what remains here is the fatal-error model used by
//! the MIR graph, the pass framework, and the backend: broken invariants are
//! programmer errors and must be reported with enough context to find the
//! offending instruction, then abort.

pub mod error;

pub use error::{CoreError, CoreResult};
