//! Analysis/transform pass framework and the optimization passes that sit
//! on top of it (§4): CFG/dominance/loop analyses, function summaries,
//! `mem2reg`, and the scalar, array/memory, and control-flow pass
//! families. `pipeline.rs` sequences them into the O0/O1 levels described
//! in §4.6; `interval.rs` is the abstract-interpretation pass the
//! control-flow family's `SingleReturn` transform prepares the CFG for.

pub mod array;
pub mod cfg;
pub mod control_flow;
pub mod dominance;
pub mod function_analysis;
pub mod interval;
pub mod loops;
pub mod mem2reg;
pub mod pass;
pub mod pipeline;
pub mod scalar;

pub use cfg::Cfg;
pub use dominance::DomTree;
pub use function_analysis::{FunctionSummary, ModuleSummaries};
pub use interval::{Interval, IntervalAnalysis};
pub use loops::{Loop, LoopForest};
pub use mem2reg::Mem2Reg;
pub use pass::{Analysis, CfgAnalysis, DominanceAnalysis, FunctionSummaryAnalysis, LoopAnalysis, PassManager, Transform};
pub use pipeline::OptLevel;
