//! Typed SSA middle intermediate representation for the SysY compiler core.
//!
//! This crate owns the MIR graph and its invariants: interned types and
//! constants ([`types`]), the arena of values every instruction/block/
//! function lives in ([`value`], [`instruction`], [`function`]), the
//! mutating graph operations that keep the bidirectional use-def relation
//! consistent ([`module`]), a construction API for passes and the frontend
//! lowering boundary to build against ([`builder`]), a text format for
//! round-tripping fixtures ([`printer`], [`parser`]), an invariant checker
//! ([`verify`]), and the source language's runtime library signatures
//! ([`runtime`]).
//!
//! The lexer, parser, and AST-to-MIR lowering are external collaborators:
//! this crate only specifies (and consumes) the MIR text format they
//! produce.

pub mod builder;
pub mod function;
pub mod instruction;
pub mod module;
pub mod parser;
pub mod printer;
pub mod runtime;
pub mod types;
pub mod value;
pub mod verify;

pub use builder::Builder;
pub use function::{FunctionBody, FunctionData, RuntimeFn};
pub use instruction::{BlockData, CmpOp, FloatBinOp, FloatTernOp, Instr, IntBinOp, Operator};
pub use module::Module;
pub use parser::parse_module;
pub use printer::print_module;
pub use types::{safe_cal, Const, Eval, EvalOp, Type, TypeContext, TypeKind};
pub use value::{ArgumentData, GlobalData, Initializer, ValueData, ValueId, ValueKind};
pub use verify::{verify_module, verify_no_scalar_allocas};
