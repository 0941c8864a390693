//! Natural-loop detection from back edges, and the loop forest they form.

use crate::cfg::Cfg;
use crate::dominance::DomTree;
use hashbrown::{HashMap, HashSet};
use sysy_mir::ValueId;

#[derive(Debug, Clone)]
pub struct Loop {
    pub header: ValueId,
    pub latches: Vec<ValueId>,
    pub body: HashSet<ValueId>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl Loop {
    pub fn contains(&self, b: ValueId) -> bool {
        self.body.contains(&b)
    }

    /// Blocks inside the loop with a successor outside it.
    pub fn exiting_blocks(&self, cfg: &Cfg) -> Vec<ValueId> {
        self.body
            .iter()
            .copied()
            .filter(|&b| cfg.successors(b).iter().any(|s| !self.body.contains(s)))
            .collect()
    }

    /// Successor blocks outside the loop reached from an exiting block.
    pub fn exit_blocks(&self, cfg: &Cfg) -> Vec<ValueId> {
        let mut out: Vec<ValueId> = self
            .body
            .iter()
            .flat_map(|&b| cfg.successors(b).iter().copied())
            .filter(|s| !self.body.contains(s))
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopForest {
    pub loops: Vec<Loop>,
    /// innermost loop containing each block, if any.
    block_loop: HashMap<ValueId, usize>,
}

impl LoopForest {
    pub fn innermost(&self, b: ValueId) -> Option<&Loop> {
        self.block_loop.get(&b).map(|&i| &self.loops[i])
    }

    pub fn depth(&self, b: ValueId) -> usize {
        let mut depth = 0;
        let mut cur = self.block_loop.get(&b).copied();
        while let Some(i) = cur {
            depth += 1;
            cur = self.loops[i].parent;
        }
        depth
    }

    pub fn top_level(&self) -> impl Iterator<Item = &Loop> {
        self.loops.iter().filter(|l| l.parent.is_none())
    }
}

/// Finds all back edges `p -> h` where `h` dominates `p`, builds each
/// header's loop body by walking backwards from every back-edge tail
/// without crossing the header, and nests loops by header containment.
pub fn build(cfg: &Cfg, dom: &DomTree, blocks: &[ValueId]) -> LoopForest {
    let mut headers: Vec<ValueId> = Vec::new();
    let mut back_edges: HashMap<ValueId, Vec<ValueId>> = HashMap::new();
    for &b in blocks {
        for &s in cfg.successors(b) {
            if dom.dominates(s, b) {
                if !headers.contains(&s) {
                    headers.push(s);
                }
                back_edges.entry(s).or_default().push(b);
            }
        }
    }
    // Process headers in dominator-tree preorder so nesting comes out
    // parent-before-child.
    headers.sort_by_key(|h| dom.preorder_number(*h).unwrap_or(usize::MAX));

    let mut forest = LoopForest::default();
    for header in headers {
        let latches = back_edges.remove(&header).unwrap_or_default();
        let mut body: HashSet<ValueId> = HashSet::new();
        body.insert(header);
        let mut stack: Vec<ValueId> = latches.clone();
        while let Some(b) = stack.pop() {
            if body.insert(b) {
                for &p in cfg.predecessors(b) {
                    if !body.contains(&p) {
                        stack.push(p);
                    }
                }
            }
        }
        let idx = forest.loops.len();
        forest.loops.push(Loop {
            header,
            latches,
            body: body.clone(),
            parent: None,
            children: Vec::new(),
        });

        // Nest under the innermost existing loop that strictly contains
        // this one's header (excluding itself).
        let mut parent_idx = None;
        for (i, other) in forest.loops.iter().enumerate() {
            if i == idx {
                continue;
            }
            if other.contains(header) && other.body.len() > body.len() {
                parent_idx = Some(match parent_idx {
                    Some(p) if forest.loops[p].body.len() <= other.body.len() => p,
                    _ => i,
                });
            }
        }
        forest.loops[idx].parent = parent_idx;
        if let Some(p) = parent_idx {
            forest.loops[p].children.push(idx);
        }
    }

    // Assign each block its innermost (smallest-body) containing loop.
    for (i, l) in forest.loops.iter().enumerate() {
        for &b in &l.body {
            match forest.block_loop.get(&b) {
                Some(&cur) if forest.loops[cur].body.len() <= l.body.len() => {}
                _ => {
                    forest.block_loop.insert(b, i);
                }
            }
        }
    }

    forest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cfg, dominance};
    use sysy_mir::{Builder, CmpOp, Const, Module};

    #[test]
    fn detects_simple_loop() {
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
        let phi = b.phi(i32_ty);
        let cond = b.icmp(CmpOp::Gt, phi, zero);
        b.branch(cond, body, exit);
        b.set_insert_point(body);
        let one = b.module.make_const(Const::Int(1));
        let dec = b.int_binary(sysy_mir::IntBinOp::Sub, phi, one);
        b.jump(header);
        b.add_incoming(phi, entry, n);
        b.add_incoming(phi, body, dec);
        b.set_insert_point(exit);
        b.ret(Some(phi));

        let cfg = cfg::build(&m, f);
        let dom = dominance::build(&m, f, &cfg);
        let blocks = m.function_blocks(f).to_vec();
        let forest = loops_build_helper(&cfg, &dom, &blocks);

        assert_eq!(forest.loops.len(), 1);
        let l = &forest.loops[0];
        assert_eq!(l.header, header);
        assert_eq!(l.latches, vec![body]);
        assert!(l.contains(header) && l.contains(body) && !l.contains(entry) && !l.contains(exit));
        assert_eq!(forest.depth(body), 1);
        assert_eq!(forest.depth(entry), 0);
    }

    fn loops_build_helper(cfg: &Cfg, dom: &DomTree, blocks: &[ValueId]) -> LoopForest {
        build(cfg, dom, blocks)
    }
}
