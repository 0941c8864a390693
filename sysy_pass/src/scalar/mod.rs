//! Scalar simplification passes (§4.7): constant folding, algebraic
//! identities, binary standardization, value numbering (local and global),
//! reassociation/tree-height-balancing, and dead-instruction elimination.
//! These alternate with one another in the O1 pipeline (`pipeline.rs`)
//! since each can expose opportunities for the others.

pub mod aggressive_dce;
pub mod algebraic_simplify;
pub mod const_fold;
pub mod constexpr_func_eval;
pub mod dce;
pub mod dead_function;
pub mod gvn;
pub mod local_value_numbering;
pub mod reassociation;
pub mod standardize_binary;
pub mod tree_height_balance;

pub use aggressive_dce::AggressiveDce;
pub use algebraic_simplify::AlgebraicSimplify;
pub use const_fold::ConstantFolding;
pub use constexpr_func_eval::ConstexprFuncEval;
pub use dce::DeadInstEliminate;
pub use dead_function::{DeadFuncArgEliminate, DeadFuncEliminate, DeadReturnEliminate};
pub use gvn::GlobalValueNumbering;
pub use local_value_numbering::LocalValueNumbering;
pub use reassociation::Reassociation;
pub use standardize_binary::StandardizeBinary;
pub use tree_height_balance::TreeHeightBalance;
