//! The pass framework: `Analysis`/`Transform` traits, a memoizing registry
//! (`PassManager`), and per-function dirtying with the fixed dependency
//! chain `CFG ⇒ Dominance ⇒ Loops` (and the separate, whole-module
//! `FunctionSummaries` analysis, invalidated independently since any
//! transform that changes a function's signature or call set can affect
//! it).
//!
//! A pass that detects a broken invariant fails fatally
//! (`sysy_common::CoreError::pass`) rather than attempting recovery — this
//! is a programming-error channel, not a recoverable one (§7).

use crate::cfg::{self, Cfg};
use crate::dominance::{self, DomTree};
use crate::function_analysis::{self, ModuleSummaries};
use crate::loops::{self, LoopForest};
use std::any::{Any, TypeId};
use sysy_common::CoreResult;
use sysy_mir::{Module, ValueId};

/// A read-only, per-function analysis whose result is memoized by the
/// `PassManager` until the owning function is marked dirty.
pub trait Analysis: 'static {
    type Result: Clone + 'static;
    fn run(m: &Module, function: ValueId, pm: &mut PassManager) -> Self::Result;
}

/// A module-mutating pass. Returns whether it changed anything, which the
/// pipeline uses both for logging and for the idempotence property (§8.9):
/// running a `Transform` twice in a row must leave the second run reporting
/// no change for the transforms expected to be idempotent.
pub trait Transform: 'static {
    fn name(&self) -> &'static str;
    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool>;
}

type AnyCache = hashbrown::HashMap<ValueId, Box<dyn Any>>;

/// Owns every cached analysis result for the module currently being
/// compiled. One `PassManager` is constructed per compilation and threaded
/// through the whole pipeline; it holds no state beyond these caches.
#[derive(Default)]
pub struct PassManager {
    per_function: hashbrown::HashMap<TypeId, AnyCache>,
    module_wide: hashbrown::HashMap<TypeId, Box<dyn Any>>,
}

impl PassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized result of analysis `A` for `function`, running
    /// it if absent or previously dirtied.
    pub fn analysis<A: Analysis>(&mut self, m: &Module, function: ValueId) -> A::Result {
        let ty = TypeId::of::<A>();
        if let Some(cached) = self
            .per_function
            .get(&ty)
            .and_then(|c| c.get(&function))
            .and_then(|b| b.downcast_ref::<A::Result>())
        {
            return cached.clone();
        }
        let result = A::run(m, function, self);
        self.per_function
            .entry(ty)
            .or_default()
            .insert(function, Box::new(result.clone()));
        result
    }

    /// Drops every cached CFG/Dominance/Loop result for `function` — the
    /// fixed dependency chain `spec.md` §4.3 names. A transform that
    /// mutates `function`'s CFG calls this once after mutating.
    pub fn mark_dirty(&mut self, function: ValueId) {
        for ty in [TypeId::of::<CfgAnalysis>(), TypeId::of::<DominanceAnalysis>(), TypeId::of::<LoopAnalysis>()] {
            if let Some(cache) = self.per_function.get_mut(&ty) {
                cache.remove(&function);
            }
        }
    }

    /// Drops the whole-module function-summary cache. Called after any
    /// transform that adds/removes functions, calls, or changes a
    /// function's side-effect profile (inlining, dead-function
    /// elimination, argument/return pruning).
    pub fn invalidate_summaries(&mut self) {
        self.module_wide.remove(&TypeId::of::<FunctionSummaryAnalysis>());
    }

    pub fn summaries(&mut self, m: &Module) -> ModuleSummaries {
        let ty = TypeId::of::<FunctionSummaryAnalysis>();
        if let Some(r) = self.module_wide.get(&ty).and_then(|b| b.downcast_ref::<ModuleSummaries>()) {
            return r.clone();
        }
        let summaries = function_analysis::build(m);
        self.module_wide.insert(ty, Box::new(summaries.clone()));
        summaries
    }
}

/// Marker trait for analyses computed once over the whole module rather
/// than per function (currently only function summaries).
pub trait ModuleAnalysis: Analysis {}

pub struct CfgAnalysis;
impl Analysis for CfgAnalysis {
    type Result = Cfg;
    fn run(m: &Module, function: ValueId, _pm: &mut PassManager) -> Cfg {
        cfg::build(m, function)
    }
}

pub struct DominanceAnalysis;
impl Analysis for DominanceAnalysis {
    type Result = DomTree;
    fn run(m: &Module, function: ValueId, pm: &mut PassManager) -> DomTree {
        let cfg = pm.analysis::<CfgAnalysis>(m, function);
        dominance::build(m, function, &cfg)
    }
}

pub struct LoopAnalysis;
impl Analysis for LoopAnalysis {
    type Result = LoopForest;
    fn run(m: &Module, function: ValueId, pm: &mut PassManager) -> LoopForest {
        let cfg = pm.analysis::<CfgAnalysis>(m, function);
        let dom = pm.analysis::<DominanceAnalysis>(m, function);
        let blocks = m.function_blocks(function).to_vec();
        loops::build(&cfg, &dom, &blocks)
    }
}

pub struct FunctionSummaryAnalysis;
impl Analysis for FunctionSummaryAnalysis {
    type Result = ModuleSummaries;
    fn run(m: &Module, _function: ValueId, _pm: &mut PassManager) -> ModuleSummaries {
        function_analysis::build(m)
    }
}
impl ModuleAnalysis for FunctionSummaryAnalysis {}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, Const, Module};

    #[test]
    fn memoizes_until_dirtied() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c = b.module.make_const(Const::Int(1));
        b.ret(Some(c));

        let mut pm = PassManager::new();
        let cfg1 = pm.analysis::<CfgAnalysis>(&m, f);
        let cfg2 = pm.analysis::<CfgAnalysis>(&m, f);
        assert_eq!(cfg1.successors(entry), cfg2.successors(entry));

        pm.mark_dirty(f);
        let _ = pm.analysis::<DominanceAnalysis>(&m, f);
        let _ = pm.analysis::<LoopAnalysis>(&m, f);
        pm.mark_dirty(f);
        // Dirtying must have dropped dominance/loop caches too, not just CFG;
        // re-requesting should not panic and should recompute cleanly.
        let _ = pm.analysis::<LoopAnalysis>(&m, f);
    }
}
