//! Interval analysis (§4.10): an abstract interpretation that bounds every
//! SSA value in a function to a closed interval of `int` or `double`,
//! propagated over the CFG by a worklist with widening at loop headers so
//! the fixed point is reached in a bounded number of steps. `constrain_reduce`
//! (supplementing the distilled pipeline per `DataFlow/ConstrainReduce.cpp`
//! in `original_source/`) then rewrites any comparison the converged
//! intervals already decide into a constant, feeding `AlgebraicSimplify`/DCE.
//!
//! Functions are visited in reverse topological order of the call graph so a
//! callee's return interval is available — as a conservative `[-inf, +inf]`
//! fallback for anything sharper — before its callers run; recursive calls
//! and forward references both just see `top()` for the return value, which
//! is sound (callers never over-narrow a range the callee might violate).

use crate::function_analysis::ModuleSummaries;
use crate::pass::{PassManager, Transform};
use crate::scalar::const_fold::{float_op_to_eval, int_op_to_eval};
use hashbrown::{HashMap, HashSet};
use sysy_common::CoreResult;
use sysy_mir::{Const, Module, Operator, ValueId};

/// A closed interval over one of the two scalar domains the language has.
/// Integer bounds use `i64::MIN`/`MAX` as `-inf`/`+inf` sentinels (the
/// language's actual integers are 32-bit, so there is no real value a
/// function could produce that collides with the sentinel); `double` uses
/// the IEEE infinities directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Interval {
    Int(i64, i64),
    Double(f64, f64),
}

impl Interval {
    pub fn top_int() -> Interval {
        Interval::Int(i64::MIN, i64::MAX)
    }

    pub fn top_double() -> Interval {
        Interval::Double(f64::NEG_INFINITY, f64::INFINITY)
    }

    pub fn exact(c: Const) -> Interval {
        match c {
            Const::Bool(b) => Interval::Int(b as i64, b as i64),
            Const::Int(i) => Interval::Int(i as i64, i as i64),
            Const::Double(d) => Interval::Double(d, d),
        }
    }

    fn top_like(&self) -> Interval {
        match self {
            Interval::Int(..) => Interval::top_int(),
            Interval::Double(..) => Interval::top_double(),
        }
    }

    pub fn union(&self, other: &Interval) -> Interval {
        match (self, other) {
            (Interval::Int(l1, h1), Interval::Int(l2, h2)) => Interval::Int((*l1).min(*l2), (*h1).max(*h2)),
            (Interval::Double(l1, h1), Interval::Double(l2, h2)) => Interval::Double(l1.min(*l2), h1.max(*h2)),
            _ => self.top_like(),
        }
    }

    /// `None` when the ranges don't overlap (the value is unreachable on
    /// this edge — callers drop the block from the worklist rather than
    /// propagate an empty interval).
    pub fn intersect(&self, other: &Interval) -> Option<Interval> {
        match (self, other) {
            (Interval::Int(l1, h1), Interval::Int(l2, h2)) => {
                let (lo, hi) = ((*l1).max(*l2), (*h1).min(*h2));
                (lo <= hi).then_some(Interval::Int(lo, hi))
            }
            (Interval::Double(l1, h1), Interval::Double(l2, h2)) => {
                let (lo, hi) = (l1.max(*l2), h1.min(*h2));
                (lo <= hi).then_some(Interval::Double(lo, hi))
            }
            _ => None,
        }
    }

    /// Removing a single point only sharpens the interval when the point
    /// sits exactly on a bound; a mid-range exclusion can't be represented
    /// by one interval, so it's a no-op (the lattice is conservative, not
    /// exact, which is the standard tradeoff for interval analysis).
    pub fn difference_int(&self, point: i64) -> Interval {
        match self {
            Interval::Int(lo, hi) if *lo == point && lo < hi => Interval::Int(lo.saturating_add(1), *hi),
            Interval::Int(lo, hi) if *hi == point && lo < hi => Interval::Int(*lo, hi.saturating_sub(1)),
            other => *other,
        }
    }

    /// The widening operator: `∇` only ever pushes a bound out to infinity,
    /// never in — this is what guarantees termination at a loop header
    /// instead of re-tightening forever on every iteration.
    pub fn widen(&self, new: &Interval) -> Interval {
        match (self, new) {
            (Interval::Int(l1, h1), Interval::Int(l2, h2)) => {
                let lo = if l2 < l1 { i64::MIN } else { *l1 };
                let hi = if h2 > h1 { i64::MAX } else { *h1 };
                Interval::Int(lo, hi)
            }
            (Interval::Double(l1, h1), Interval::Double(l2, h2)) => {
                let lo = if l2 < l1 { f64::NEG_INFINITY } else { *l1 };
                let hi = if h2 > h1 { f64::INFINITY } else { *h1 };
                Interval::Double(lo, hi)
            }
            _ => self.top_like(),
        }
    }

    pub fn negate(&self) -> Interval {
        match self {
            Interval::Int(lo, hi) => Interval::Int(hi.checked_neg().unwrap_or(i64::MAX), lo.checked_neg().unwrap_or(i64::MIN)),
            Interval::Double(lo, hi) => Interval::Double(-hi, -lo),
        }
    }

    fn corners(&self) -> Vec<sysy_mir::Eval> {
        match self {
            Interval::Int(lo, hi) => {
                let mut v = Vec::new();
                if *lo > i64::MIN {
                    v.push(sysy_mir::Eval::Int(*lo));
                }
                if *hi < i64::MAX {
                    v.push(sysy_mir::Eval::Int(*hi));
                }
                v
            }
            Interval::Double(lo, hi) => {
                let mut v = Vec::new();
                if lo.is_finite() {
                    v.push(sysy_mir::Eval::Double(*lo));
                }
                if hi.is_finite() {
                    v.push(sysy_mir::Eval::Double(*hi));
                }
                v
            }
        }
    }

    /// Interval arithmetic via the corner-evaluation rule: evaluate `op` on
    /// every combination of finite endpoints (via the same checked
    /// `safe_cal` constant folding uses) and take the union. Any infinite
    /// endpoint, or any corner `safe_cal` itself can't bound (overflow,
    /// div-by-zero), widens the whole result straight to top — precise but
    /// unbounded results aren't worth chasing for a pass whose job is cheap
    /// range facts, not exact arithmetic.
    pub fn apply(&self, other: &Interval, op: sysy_mir::EvalOp, result_is_float: bool) -> Interval {
        let top = if result_is_float { Interval::top_double() } else { Interval::top_int() };
        let lhs_corners = self.corners();
        let rhs_corners = other.corners();
        if lhs_corners.len() < 2 || rhs_corners.len() < 2 {
            return top;
        }
        let mut results = Vec::new();
        for &a in &lhs_corners {
            for &b in &rhs_corners {
                match sysy_mir::safe_cal(a, b, op) {
                    Some(e) => results.push(e),
                    None => return top,
                }
            }
        }
        match (results.first(), result_is_float) {
            (None, _) => top,
            (Some(sysy_mir::Eval::Int(_)), false) => {
                let ints: Vec<i64> = results.iter().map(|e| match e {
                    sysy_mir::Eval::Int(i) => *i,
                    sysy_mir::Eval::Double(d) => *d as i64,
                }).collect();
                Interval::Int(*ints.iter().min().unwrap(), *ints.iter().max().unwrap())
            }
            _ => {
                let doubles: Vec<f64> = results.iter().map(|e| match e {
                    sysy_mir::Eval::Int(i) => *i as f64,
                    sysy_mir::Eval::Double(d) => *d,
                }).collect();
                Interval::Double(doubles.iter().cloned().fold(f64::INFINITY, f64::min), doubles.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
            }
        }
    }
}

/// Per-block abstract state: every SSA value known to be live at this point
/// in the function, mapped to its current interval.
type Context = HashMap<ValueId, Interval>;

fn merge_context(into: &mut Context, from: &Context, widen: bool) {
    for (&v, i) in from {
        into.entry(v)
            .and_modify(|cur| *cur = if widen { cur.widen(i) } else { cur.union(i) })
            .or_insert(*i);
    }
}

/// Evaluates one instruction's result interval given its operands' current
/// intervals. Anything the analysis doesn't model (loads, calls to a
/// function with no tracked return interval, geps) gets `top()` by its own
/// result type — sound, just uninformative.
fn eval_instr(m: &Module, instr: ValueId, ctx: &Context, lookup: impl Fn(ValueId) -> Interval) -> Interval {
    let ty = m.type_of(instr);
    let result_is_float = m.tcx.is_float(ty);
    let top = || if result_is_float { Interval::top_double() } else { Interval::top_int() };
    let data = match m.value(instr).kind.as_instr() {
        Some(d) => d,
        None => return top(),
    };
    match &data.operator {
        Operator::IntBinary(op) => {
            let a = lookup(data.operands[0]);
            let b = lookup(data.operands[1]);
            a.apply(&b, int_op_to_eval(*op), result_is_float)
        }
        Operator::FloatBinary(op) => {
            let a = lookup(data.operands[0]);
            let b = lookup(data.operands[1]);
            a.apply(&b, float_op_to_eval(*op), result_is_float)
        }
        Operator::Icmp(_) | Operator::Fcmp(_) => Interval::Int(0, 1),
        Operator::Fneg => lookup(data.operands[0]).negate(),
        Operator::Zext => match lookup(data.operands[0]) {
            Interval::Int(lo, hi) => Interval::Int(lo.max(0), hi.max(0)),
            other => other,
        },
        Operator::Sitofp => match lookup(data.operands[0]) {
            Interval::Int(lo, hi) => {
                if lo == i64::MIN || hi == i64::MAX {
                    Interval::top_double()
                } else {
                    Interval::Double(lo as f64, hi as f64)
                }
            }
            other => other,
        },
        Operator::Fptosi => match lookup(data.operands[0]) {
            Interval::Double(lo, hi) => {
                if !lo.is_finite() || !hi.is_finite() {
                    Interval::top_int()
                } else {
                    Interval::Int(lo as i64, hi as i64)
                }
            }
            other => other,
        },
        Operator::Phi => {
            let mut acc: Option<Interval> = None;
            for (_, v) in data.phi_incoming() {
                let i = ctx.get(&v).copied().unwrap_or_else(top);
                acc = Some(match acc {
                    Some(a) => a.union(&i),
                    None => i,
                });
            }
            acc.unwrap_or_else(top)
        }
        _ => top(),
    }
}

/// Splits `cond`'s two edges' contexts by the half-plane its comparison
/// implies, when `cond` is a direct `Icmp`/`Fcmp` of a tracked value against
/// a constant. Anything else leaves both edges' contexts as-is.
fn refine_branch_contexts(m: &Module, cond: ValueId, ctx: &Context, true_ctx: &mut Context, false_ctx: &mut Context) {
    let Some(data) = m.value(cond).kind.as_instr() else { return };
    let (lhs, rhs, op, is_float) = match &data.operator {
        Operator::Icmp(op) => (data.operands[0], data.operands[1], *op, false),
        Operator::Fcmp(op) => (data.operands[0], data.operands[1], *op, true),
        _ => return,
    };

    let lhs_interval = ctx.get(&lhs).copied();
    let rhs_const = match &m.value(rhs).kind {
        sysy_mir::ValueKind::Const(c) => Some(Interval::exact(*c)),
        _ => ctx.get(&rhs).copied(),
    };
    let (Some(li), Some(ri)) = (lhs_interval, rhs_const) else { return };

    let (below, at_or_below, above, at_or_above) = match (li, ri) {
        (Interval::Int(_, _), Interval::Int(rl, rh)) => (
            Interval::Int(i64::MIN, rl.saturating_sub(1)),
            Interval::Int(i64::MIN, rl),
            Interval::Int(rh.saturating_add(1), i64::MAX),
            Interval::Int(rh, i64::MAX),
        ),
        (Interval::Double(_, _), Interval::Double(rl, rh)) if !is_float => return,
        (Interval::Double(_, _), Interval::Double(rl, rh)) => (
            Interval::Double(f64::NEG_INFINITY, rl),
            Interval::Double(f64::NEG_INFINITY, rl),
            Interval::Double(rh, f64::INFINITY),
            Interval::Double(rh, f64::INFINITY),
        ),
        _ => return,
    };

    use sysy_mir::CmpOp::*;
    let (true_refine, false_refine): (Option<Interval>, Option<Interval>) = match op {
        Lt => (Some(below), Some(at_or_above)),
        Le => (Some(at_or_below), Some(above)),
        Gt => (Some(above), Some(at_or_below)),
        Ge => (Some(at_or_above), Some(below)),
        Eq => (Some(ri), None),
        Ne => (None, Some(ri)),
    };

    if let Some(r) = true_refine {
        if let Some(narrowed) = li.intersect(&r) {
            true_ctx.insert(lhs, narrowed);
        }
    }
    if let Some(r) = false_refine {
        if let Some(narrowed) = li.intersect(&r) {
            false_ctx.insert(lhs, narrowed);
        }
    }
}

/// Runs the worklist to a fixed point and returns every block's in-context.
fn analyze_function(m: &Module, function: ValueId, pm: &mut PassManager) -> HashMap<ValueId, Context> {
    let cfg = pm.analysis::<crate::pass::CfgAnalysis>(m, function);
    let dom = pm.analysis::<crate::pass::DominanceAnalysis>(m, function);
    let blocks = m.function_blocks(function).to_vec();
    let Some(&entry) = blocks.first() else { return HashMap::new() };

    let mut in_ctx: HashMap<ValueId, Context> = HashMap::new();
    let mut entry_ctx = Context::new();
    for &p in m.function_params(function) {
        let top = if m.tcx.is_float(m.type_of(p)) { Interval::top_double() } else { Interval::top_int() };
        entry_ctx.insert(p, top);
    }
    in_ctx.insert(entry, entry_ctx);

    let mut worklist: Vec<ValueId> = vec![entry];
    let mut in_worklist: HashSet<ValueId> = [entry].into_iter().collect();

    while let Some(block) = worklist.pop() {
        in_worklist.remove(&block);
        let mut ctx = in_ctx.get(&block).cloned().unwrap_or_default();

        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        let Some((&terminator, body)) = instrs.split_last() else { continue };
        for &instr in body {
            let data = m.value(instr).kind.as_instr();
            if data.is_none() {
                continue;
            }
            let result = eval_instr(m, instr, &ctx, |v| ctx.get(&v).copied().unwrap_or_else(|| {
                let is_float = m.tcx.is_float(m.type_of(v));
                if is_float { Interval::top_double() } else { Interval::top_int() }
            }));
            ctx.insert(instr, result);
        }

        let term_data = m.value(terminator).kind.as_instr().expect("not an instr").clone();
        let successors: Vec<(ValueId, Context)> = match &term_data.operator {
            Operator::Jump => vec![(term_data.operands[0], ctx.clone())],
            Operator::Branch => {
                let mut true_ctx = ctx.clone();
                let mut false_ctx = ctx.clone();
                refine_branch_contexts(m, term_data.operands[0], &ctx, &mut true_ctx, &mut false_ctx);
                vec![(term_data.operands[1], true_ctx), (term_data.operands[2], false_ctx)]
            }
            Operator::Switch => {
                let mut out = vec![(term_data.operands[1], ctx.clone())];
                for (_, case_blk) in term_data.switch_cases() {
                    out.push((case_blk, ctx.clone()));
                }
                out
            }
            _ => Vec::new(),
        };

        for (succ, succ_ctx) in successors {
            let is_loop_header = dom.dominates(succ, block) && cfg.predecessors(succ).contains(&block);
            let existing = in_ctx.get(&succ).cloned();
            let merged = match existing {
                None => succ_ctx,
                Some(mut prev) => {
                    let before = prev.clone();
                    merge_context(&mut prev, &succ_ctx, is_loop_header);
                    if prev == before {
                        continue;
                    }
                    prev
                }
            };
            in_ctx.insert(succ, merged);
            if in_worklist.insert(succ) {
                worklist.push(succ);
            }
        }
    }

    in_ctx
}

/// Folds any `Icmp`/`Fcmp` whose converged operand intervals already decide
/// the outcome into a constant `bool`, letting `AlgebraicSimplify`/DCE clean
/// up the now-dead branch. This is the `constrain_reduce` supplement.
fn constrain_reduce(m: &mut Module, function: ValueId, in_ctx: &HashMap<ValueId, Context>) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    for block in blocks {
        let Some(mut ctx) = in_ctx.get(&block).cloned() else { continue };
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            let Some(data) = m.value(instr).kind.as_instr() else { continue };
            let (op, is_float) = match &data.operator {
                Operator::Icmp(op) => (*op, false),
                Operator::Fcmp(op) => (*op, true),
                _ => {
                    let result = eval_instr(m, instr, &ctx, |v| ctx.get(&v).copied().unwrap_or_else(|| Interval::top_int()));
                    ctx.insert(instr, result);
                    continue;
                }
            };
            let lhs = data.operands[0];
            let rhs = data.operands[1];
            let li = ctx.get(&lhs).copied();
            let ri = match &m.value(rhs).kind {
                sysy_mir::ValueKind::Const(c) => Some(Interval::exact(*c)),
                _ => ctx.get(&rhs).copied(),
            };
            if let (Some(li), Some(ri)) = (li, ri) {
                if let Some(decided) = decide(li, ri, op, is_float) {
                    let folded = m.make_const(Const::Bool(decided));
                    m.replace_all_uses_with(instr, folded);
                    changed = true;
                }
            }
            let result = eval_instr(m, instr, &ctx, |v| ctx.get(&v).copied().unwrap_or_else(|| Interval::top_int()));
            ctx.insert(instr, result);
        }
    }
    changed
}

/// `Some(true/false)` when every value in `lhs` compares the same way
/// against every value in `rhs` — i.e. the intervals don't overlap in a way
/// that leaves the comparison's outcome ambiguous.
fn decide(lhs: Interval, rhs: Interval, op: sysy_mir::CmpOp, _is_float: bool) -> Option<bool> {
    use sysy_mir::CmpOp::*;
    match (lhs, rhs) {
        (Interval::Int(l1, h1), Interval::Int(l2, h2)) => match op {
            Lt => (h1 < l2).then_some(true).or((l1 >= h2).then_some(false)),
            Le => (h1 <= l2).then_some(true).or((l1 > h2).then_some(false)),
            Gt => (l1 > h2).then_some(true).or((h1 <= l2).then_some(false)),
            Ge => (l1 >= h2).then_some(true).or((h1 < l2).then_some(false)),
            Eq => (l1 == h1 && l2 == h2 && l1 == l2).then_some(true).or((h1 < l2 || l1 > h2).then_some(false)),
            Ne => (h1 < l2 || l1 > h2).then_some(true).or((l1 == h1 && l2 == h2 && l1 == l2).then_some(false)),
        },
        (Interval::Double(l1, h1), Interval::Double(l2, h2)) => match op {
            Lt => (h1 < l2).then_some(true).or((l1 >= h2).then_some(false)),
            Le => (h1 <= l2).then_some(true).or((l1 > h2).then_some(false)),
            Gt => (l1 > h2).then_some(true).or((h1 <= l2).then_some(false)),
            Ge => (l1 >= h2).then_some(true).or((h1 < l2).then_some(false)),
            Eq => (l1 == h1 && l2 == h2 && l1 == l2).then_some(true).or((h1 < l2 || l1 > h2).then_some(false)),
            Ne => (h1 < l2 || l1 > h2).then_some(true).or((l1 == h1 && l2 == h2 && l1 == l2).then_some(false)),
        },
        _ => None,
    }
}

pub struct IntervalAnalysis;

impl Transform for IntervalAnalysis {
    fn name(&self) -> &'static str {
        "IntervalAnalysis"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let _summaries: ModuleSummaries = pm.summaries(m);
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            let in_ctx = analyze_function(m, f, pm);
            if constrain_reduce(m, f, &in_ctx) {
                changed = true;
                pm.mark_dirty(f);
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, IntBinOp};

    #[test]
    fn union_widens_to_cover_both_ranges() {
        let a = Interval::Int(0, 5);
        let b = Interval::Int(3, 10);
        assert_eq!(a.union(&b), Interval::Int(0, 10));
    }

    #[test]
    fn widen_pushes_a_growing_bound_to_infinity() {
        let old = Interval::Int(0, 5);
        let new = Interval::Int(0, 6);
        assert_eq!(old.widen(&new), Interval::Int(0, i64::MAX));
    }

    #[test]
    fn intersect_of_disjoint_ranges_is_none() {
        let a = Interval::Int(0, 5);
        let b = Interval::Int(10, 20);
        assert_eq!(a.intersect(&b), None);
    }

    #[test]
    fn a_branch_guarded_by_a_constant_comparison_folds() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("always_low", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let lo = m.add_block(f, "lo");
        let hi = m.add_block(f, "hi");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let zero = b.module.make_const(Const::Int(0));
        let ten = b.module.make_const(Const::Int(10));
        let sum = b.int_binary(IntBinOp::Add, zero, ten);
        let hundred = b.module.make_const(Const::Int(100));
        let cmp = b.icmp(sysy_mir::CmpOp::Lt, sum, hundred);
        b.branch(cmp, lo, hi);
        b.set_insert_point(lo);
        b.ret(Some(sum));
        b.set_insert_point(hi);
        let neg1 = b.module.make_const(Const::Int(-1));
        b.ret(Some(neg1));

        let mut pm = PassManager::new();
        let in_ctx = analyze_function(&m, f, &mut pm);
        assert!(constrain_reduce(&mut m, f, &in_ctx));
    }
}
