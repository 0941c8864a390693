//! Branch-probability analysis (§4.9): assigns edge weights using a fixed
//! set of heuristics, normalizes them per source block, then iterates
//! reverse post-order to a converged per-block frequency estimate. Feeds
//! `block_positioning` and the interval analysis's widening decisions.

use crate::cfg::Cfg;
use crate::loops::LoopForest;
use crate::pass::{Analysis, CfgAnalysis, LoopAnalysis, PassManager};
use hashbrown::HashMap;
use sysy_mir::{CmpOp, Const, Module, Operator, ValueId};

const BACK_EDGE_TAKEN: f64 = 124.0;
const BACK_EDGE_NOT_TAKEN: f64 = 4.0;
const CMP_ZERO_BIAS_TAKEN: f64 = 20.0;
const CMP_ZERO_BIAS_NOT_TAKEN: f64 = 12.0;
const FCMP_EQ_NE_TAKEN: f64 = 12.0;
const FCMP_EQ_NE_NOT_TAKEN: f64 = 20.0;
const DEFAULT_WEIGHT: f64 = 16.0;

#[derive(Clone, Debug, Default)]
pub struct BranchProbabilities {
    /// Raw (pre-normalization) weight of the edge `(from, to)`.
    pub edge_weight: HashMap<(ValueId, ValueId), f64>,
    /// Converged relative execution frequency of each block (entry = 1.0).
    pub block_frequency: HashMap<ValueId, f64>,
}

impl BranchProbabilities {
    pub fn probability(&self, from: ValueId, to: ValueId) -> f64 {
        let total: f64 = self
            .edge_weight
            .keys()
            .filter(|&&(f, _)| f == from)
            .map(|k| self.edge_weight[k])
            .sum();
        if total == 0.0 {
            return 0.0;
        }
        self.edge_weight.get(&(from, to)).copied().unwrap_or(0.0) / total
    }
}

fn is_zero_or_minus_one(m: &Module, v: ValueId) -> Option<bool> {
    match m.value(v).kind {
        sysy_mir::ValueKind::Const(Const::Int(0)) => Some(true),
        sysy_mir::ValueKind::Const(Const::Int(-1)) => Some(true),
        _ => None,
    }
}

fn is_back_edge(loops: &LoopForest, from: ValueId, to: ValueId) -> bool {
    loops
        .innermost(from)
        .map(|l| l.header == to && l.latches.contains(&from))
        .unwrap_or(false)
}

fn edge_weights_for(m: &Module, loops: &LoopForest, block: ValueId, term: ValueId) -> Vec<(ValueId, f64)> {
    let data = m.value(term).kind.as_instr().expect("terminator");
    match &data.operator {
        Operator::Jump => vec![(data.operands[0], DEFAULT_WEIGHT)],
        Operator::Branch => {
            let (cond, t, f) = (data.operands[0], data.operands[1], data.operands[2]);
            if is_back_edge(loops, block, t) {
                return vec![(t, BACK_EDGE_TAKEN), (f, BACK_EDGE_NOT_TAKEN)];
            }
            if is_back_edge(loops, block, f) {
                return vec![(t, BACK_EDGE_NOT_TAKEN), (f, BACK_EDGE_TAKEN)];
            }
            if let Some(cmp) = m.value(cond).kind.as_instr() {
                match &cmp.operator {
                    Operator::Icmp(op) => {
                        let rhs_special = is_zero_or_minus_one(m, cmp.operands[1]).is_some();
                        if rhs_special && matches!(op, CmpOp::Ne) {
                            return vec![(t, CMP_ZERO_BIAS_TAKEN), (f, CMP_ZERO_BIAS_NOT_TAKEN)];
                        }
                        if rhs_special && matches!(op, CmpOp::Eq) {
                            return vec![(t, CMP_ZERO_BIAS_NOT_TAKEN), (f, CMP_ZERO_BIAS_TAKEN)];
                        }
                    }
                    Operator::Fcmp(op) if matches!(op, CmpOp::Eq) => {
                        return vec![(t, FCMP_EQ_NE_NOT_TAKEN), (f, FCMP_EQ_NE_TAKEN)];
                    }
                    Operator::Fcmp(op) if matches!(op, CmpOp::Ne) => {
                        return vec![(t, FCMP_EQ_NE_TAKEN), (f, FCMP_EQ_NE_NOT_TAKEN)];
                    }
                    _ => {}
                }
            }
            vec![(t, DEFAULT_WEIGHT), (f, DEFAULT_WEIGHT)]
        }
        Operator::Switch => {
            let mut out = vec![(data.operands[1], DEFAULT_WEIGHT)];
            for (_, blk) in data.switch_cases() {
                out.push((blk, DEFAULT_WEIGHT));
            }
            out
        }
        Operator::Ret => Vec::new(),
        _ => Vec::new(),
    }
}

fn reverse_post_order(cfg: &Cfg, entry: ValueId, blocks: &[ValueId]) -> Vec<ValueId> {
    let mut order = Vec::new();
    let mut visited = hashbrown::HashSet::new();
    fn visit(cfg: &Cfg, b: ValueId, visited: &mut hashbrown::HashSet<ValueId>, order: &mut Vec<ValueId>) {
        if !visited.insert(b) {
            return;
        }
        for &s in cfg.successors(b) {
            visit(cfg, s, visited, order);
        }
        order.push(b);
    }
    visit(cfg, entry, &mut visited, &mut order);
    for &b in blocks {
        visit(cfg, b, &mut visited, &mut order);
    }
    order.reverse();
    order
}

pub fn build(m: &Module, function: ValueId, pm: &mut PassManager) -> BranchProbabilities {
    let cfg = pm.analysis::<CfgAnalysis>(m, function);
    let loops = pm.analysis::<LoopAnalysis>(m, function);
    let blocks = m.function_blocks(function).to_vec();
    let entry = blocks[0];

    let mut edge_weight = HashMap::new();
    for &b in &blocks {
        let blk = m.value(b).kind.as_block().expect("not a block");
        let Some(term) = blk.terminator() else { continue };
        for (to, w) in edge_weights_for(m, &loops, b, term) {
            edge_weight.insert((b, to), w);
        }
    }

    let probs_for = |from: ValueId, to: ValueId| -> f64 {
        let total: f64 = edge_weight.keys().filter(|&&(f, _)| f == from).map(|k| edge_weight[k]).sum();
        if total == 0.0 {
            return 0.0;
        }
        edge_weight.get(&(from, to)).copied().unwrap_or(0.0) / total
    };

    let rpo = reverse_post_order(&cfg, entry, &blocks);
    let mut freq: HashMap<ValueId, f64> = blocks.iter().map(|&b| (b, 0.0)).collect();
    freq.insert(entry, 1.0);
    for _ in 0..64 {
        let mut next = freq.clone();
        let mut max_delta = 0.0f64;
        for &b in &rpo {
            if b == entry {
                continue;
            }
            let sum: f64 = cfg.predecessors(b).iter().map(|&p| freq[&p] * probs_for(p, b)).sum();
            max_delta = max_delta.max((sum - next[&b]).abs());
            next.insert(b, sum);
        }
        freq = next;
        if max_delta < 1e-6 {
            break;
        }
    }

    BranchProbabilities { edge_weight, block_frequency: freq }
}

pub struct BranchProbabilityAnalysis;
impl Analysis for BranchProbabilityAnalysis {
    type Result = BranchProbabilities;
    fn run(m: &Module, function: ValueId, pm: &mut PassManager) -> BranchProbabilities {
        build(m, function, pm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, Const, Module};

    #[test]
    fn back_edge_gets_the_high_weight() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let header = m.add_block(f, "header");
        let body = m.add_block(f, "body");
        let exit = m.add_block(f, "exit");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        b.jump(header);
        b.set_insert_point(header);
        let zero = b.module.make_const(Const::Int(0));
        let cond = b.icmp(sysy_mir::CmpOp::Gt, n, zero);
        b.branch(cond, body, exit);
        b.set_insert_point(body);
        b.jump(header);
        b.set_insert_point(exit);
        b.ret(Some(n));

        let mut pm = PassManager::new();
        let probs = pm.analysis::<BranchProbabilityAnalysis>(&m, f);
        assert!(probs.probability(header, body) > probs.probability(header, exit));
    }
}
