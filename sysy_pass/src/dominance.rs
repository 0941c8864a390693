//! Dominator tree (Lengauer–Tarjan, with path compression) and dominance
//! frontier (Cytron–Ferrante) for one function.

use crate::cfg::Cfg;
use hashbrown::HashMap;
use sysy_mir::{Module, ValueId};

/// Per-function dominance results: immediate dominators, the dominator
/// tree's children map, and dominance frontiers, plus the DFS numbering
/// used to answer `dominates` queries in O(1).
#[derive(Debug, Clone, Default)]
pub struct DomTree {
    /// DFS preorder number assigned during construction; unreachable blocks
    /// are absent.
    dfnum: HashMap<ValueId, usize>,
    vertex: Vec<ValueId>,
    idom: HashMap<ValueId, ValueId>,
    children: HashMap<ValueId, Vec<ValueId>>,
    frontier: HashMap<ValueId, Vec<ValueId>>,
    entry: Option<ValueId>,
}

impl DomTree {
    pub fn immediate_dominator(&self, b: ValueId) -> Option<ValueId> {
        self.idom.get(&b).copied()
    }

    pub fn children(&self, b: ValueId) -> &[ValueId] {
        self.children.get(&b).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn frontier(&self, b: ValueId) -> &[ValueId] {
        self.frontier.get(&b).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn preorder_number(&self, b: ValueId) -> Option<usize> {
        self.dfnum.get(&b).copied()
    }

    /// `a` dominates `b` iff `a` is `b` or `a` is an ancestor of `b` in the
    /// dominator tree. Unreachable blocks dominate nothing and are
    /// dominated by nothing.
    pub fn dominates(&self, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return self.dfnum.contains_key(&a);
        }
        let mut cur = b;
        while let Some(&idom) = self.idom.get(&cur) {
            if idom == a {
                return true;
            }
            cur = idom;
        }
        false
    }

    pub fn strictly_dominates(&self, a: ValueId, b: ValueId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Preorder walk of the dominator tree starting at the entry block.
    pub fn preorder(&self) -> Vec<ValueId> {
        let mut out = Vec::new();
        if let Some(entry) = self.entry {
            let mut stack = vec![entry];
            while let Some(b) = stack.pop() {
                out.push(b);
                let mut kids = self.children(b).to_vec();
                kids.reverse();
                stack.extend(kids);
            }
        }
        out
    }
}

struct Builder<'a> {
    cfg: &'a Cfg,
    dfnum: HashMap<ValueId, usize>,
    vertex: Vec<ValueId>,
    parent: HashMap<ValueId, ValueId>,
    semi: Vec<usize>,
    ancestor: Vec<Option<usize>>,
    label: Vec<usize>,
    bucket: Vec<Vec<usize>>,
    idom_idx: Vec<Option<usize>>,
}

impl<'a> Builder<'a> {
    fn dfs(&mut self, m: &Module, v: ValueId) {
        if self.dfnum.contains_key(&v) {
            return;
        }
        let n = self.vertex.len();
        self.dfnum.insert(v, n);
        self.vertex.push(v);
        self.semi.push(n);
        self.ancestor.push(None);
        self.label.push(n);
        self.bucket.push(Vec::new());
        self.idom_idx.push(None);
        let _ = m;
        for &w in self.cfg.successors(v) {
            if !self.dfnum.contains_key(&w) {
                self.parent.insert(w, v);
                self.dfs(m, w);
            }
        }
    }

    fn compress(&mut self, v: usize) {
        let a = match self.ancestor[v] {
            Some(a) => a,
            None => return,
        };
        if self.ancestor[a].is_some() {
            self.compress(a);
            if self.semi[self.label[a]] < self.semi[self.label[v]] {
                self.label[v] = self.label[a];
            }
            self.ancestor[v] = self.ancestor[a];
        }
    }

    fn eval(&mut self, v: usize) -> usize {
        if self.ancestor[v].is_none() {
            v
        } else {
            self.compress(v);
            self.label[v]
        }
    }

    fn link(&mut self, v: usize, w: usize) {
        self.ancestor[w] = Some(v);
    }
}

fn predecessors_by_index(cfg: &Cfg, dfnum: &HashMap<ValueId, usize>, vertex: &[ValueId], idx: usize) -> Vec<usize> {
    cfg.predecessors(vertex[idx])
        .iter()
        .filter_map(|p| dfnum.get(p).copied())
        .collect()
}

/// Runs Lengauer–Tarjan over `function`'s CFG and derives the dominator
/// tree and dominance frontiers from the resulting immediate-dominator map.
pub fn build(m: &Module, function: ValueId, cfg: &Cfg) -> DomTree {
    let mut tree = DomTree::default();
    let blocks = m.function_blocks(function);
    let Some(&entry) = blocks.first() else {
        return tree;
    };
    tree.entry = Some(entry);

    let mut b = Builder {
        cfg,
        dfnum: HashMap::new(),
        vertex: Vec::new(),
        parent: HashMap::new(),
        semi: Vec::new(),
        ancestor: Vec::new(),
        label: Vec::new(),
        bucket: Vec::new(),
        idom_idx: Vec::new(),
    };
    b.dfs(m, entry);
    let n = b.vertex.len();

    for i in (1..n).rev() {
        let w = i;
        for v in predecessors_by_index(cfg, &b.dfnum, &b.vertex, w) {
            let u = b.eval(v);
            if b.semi[u] < b.semi[w] {
                b.semi[w] = b.semi[u];
            }
        }
        let semi_w = b.semi[w];
        b.bucket[semi_w].push(w);
        let p = *b.dfnum.get(&b.parent[&b.vertex[w]]).expect("parent is visited");
        b.link(p, w);
        let bucket_p = std::mem::take(&mut b.bucket[p]);
        for v in bucket_p {
            let u = b.eval(v);
            b.idom_idx[v] = Some(if b.semi[u] < b.semi[v] { u } else { p });
        }
    }

    for i in 1..n {
        if let Some(id) = b.idom_idx[i] {
            if id != b.semi[i] {
                b.idom_idx[i] = b.idom_idx[id];
            }
        }
    }

    tree.dfnum = b.dfnum.clone();
    tree.vertex = b.vertex.clone();
    for i in 1..n {
        if let Some(id) = b.idom_idx[i] {
            tree.idom.insert(b.vertex[i], b.vertex[id]);
            tree.children.entry(b.vertex[id]).or_default().push(b.vertex[i]);
        }
    }

    // Cytron–Ferrante dominance frontier: for each block x with ≥2 preds,
    // for each predecessor p, walk up the idom chain from p until (and not
    // including) idom(x), adding x to every visited block's frontier.
    for &x in &tree.vertex {
        let preds = cfg.predecessors(x);
        if preds.len() < 2 {
            continue;
        }
        let idom_x = tree.idom.get(&x).copied();
        for &p in preds {
            if !b.dfnum.contains_key(&p) {
                continue;
            }
            let mut runner = p;
            while Some(runner) != idom_x {
                tree.frontier.entry(runner).or_default().push(x);
                match tree.idom.get(&runner) {
                    Some(&next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }
    for v in tree.frontier.values_mut() {
        v.sort_by_key(|b| tree.dfnum[b]);
        v.dedup();
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg;
    use sysy_mir::{Builder as MirBuilder, CmpOp, Const, Module};

    fn diamond() -> (Module, ValueId, Vec<ValueId>) {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let then_blk = m.add_block(f, "then");
        let else_blk = m.add_block(f, "else");
        let join = m.add_block(f, "join");

        let mut b = MirBuilder::new(&mut m);
        b.set_insert_point(entry);
        let zero = b.module.make_const(Const::Int(0));
        let cond = b.icmp(CmpOp::Gt, n, zero);
        b.branch(cond, then_blk, else_blk);
        b.set_insert_point(then_blk);
        b.jump(join);
        b.set_insert_point(else_blk);
        b.jump(join);
        b.set_insert_point(join);
        let phi = b.phi(i32_ty);
        b.ret(Some(phi));
        b.add_incoming(phi, then_blk, n);
        b.add_incoming(phi, else_blk, n);
        (m, f, vec![entry, then_blk, else_blk, join])
    }

    #[test]
    fn diamond_dominance() {
        let (m, f, blocks) = diamond();
        let (entry, then_blk, else_blk, join) = (blocks[0], blocks[1], blocks[2], blocks[3]);
        let cfg = cfg::build(&m, f);
        let dom = build(&m, f, &cfg);

        assert_eq!(dom.immediate_dominator(then_blk), Some(entry));
        assert_eq!(dom.immediate_dominator(else_blk), Some(entry));
        assert_eq!(dom.immediate_dominator(join), Some(entry));
        assert!(dom.dominates(entry, join));
        assert!(!dom.dominates(then_blk, join));
        assert!(!dom.dominates(else_blk, join));

        let mut frontier_entry = dom.frontier(entry).to_vec();
        frontier_entry.sort();
        assert!(frontier_entry.is_empty());
        assert_eq!(dom.frontier(then_blk), &[join]);
        assert_eq!(dom.frontier(else_blk), &[join]);
    }

    #[test]
    fn linear_chain_has_no_frontier() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], i32_ty);
        let a = m.add_block(f, "a");
        let c = m.add_block(f, "c");
        let mut b = MirBuilder::new(&mut m);
        b.set_insert_point(a);
        b.jump(c);
        b.set_insert_point(c);
        let zero = b.module.make_const(Const::Int(0));
        b.ret(Some(zero));

        let cfg = cfg::build(&m, f);
        let dom = build(&m, f, &cfg);
        assert_eq!(dom.immediate_dominator(c), Some(a));
        assert!(dom.frontier(a).is_empty());
        assert!(dom.frontier(c).is_empty());
    }
}
