//! Control-flow passes (§4.9): CFG-shape simplification, block layout,
//! branch-probability analysis, tail-recursion-to-loop, branch merging,
//! if-chain-to-switch, tail-call marking, inlining, and the single-return
//! transform that the interval analysis depends on.

pub mod block_positioning;
pub mod branch_merging;
pub mod branch_probability;
pub mod if_chain_to_switch;
pub mod inlining;
pub mod simplify_control_flow;
pub mod single_return;
pub mod tail_call;
pub mod tail_recursion_to_loop;

pub use block_positioning::BlockPositioning;
pub use branch_merging::BranchMerging;
pub use branch_probability::{BranchProbabilities, BranchProbabilityAnalysis};
pub use if_chain_to_switch::IfChainToSwitch;
pub use inlining::Inlining;
pub use simplify_control_flow::SimplifyControlFlow;
pub use single_return::SingleReturn;
pub use tail_call::tail_calls;
pub use tail_recursion_to_loop::TailRecursionToLoop;
