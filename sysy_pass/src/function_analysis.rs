//! Call graph and per-function summaries (§4.5): `is_recursive`, `is_leaf`,
//! memory/IO effects, `has_side_effect`, `no_state`, and the transitive
//! closure of globals a function touches. Propagated in reverse
//! topological order of the call graph so callers inherit callee effects.

use hashbrown::{HashMap, HashSet};
use sysy_mir::{FunctionBody, Module, Operator, RuntimeFn, ValueId};

#[derive(Debug, Clone, Default)]
pub struct FunctionSummary {
    pub is_recursive: bool,
    pub is_leaf: bool,
    pub memory_read: bool,
    pub memory_write: bool,
    pub memory_alloc: bool,
    pub io_read: bool,
    pub io_write: bool,
    pub has_return: bool,
    pub has_side_effect: bool,
    pub no_state: bool,
    pub used_globals: HashSet<ValueId>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleSummaries {
    pub call_graph: HashMap<ValueId, Vec<ValueId>>,
    pub reverse_call_graph: HashMap<ValueId, Vec<ValueId>>,
    pub summaries: HashMap<ValueId, FunctionSummary>,
}

impl ModuleSummaries {
    pub fn of(&self, f: ValueId) -> &FunctionSummary {
        self.summaries.get(&f).expect("function has a summary")
    }

    pub fn callees(&self, f: ValueId) -> &[ValueId] {
        self.call_graph.get(&f).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn callers(&self, f: ValueId) -> &[ValueId] {
        self.reverse_call_graph.get(&f).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

fn direct_callees(m: &Module, f: ValueId) -> Vec<ValueId> {
    let mut callees = Vec::new();
    for &block in m.function_blocks(f) {
        let blk = m.value(block).kind.as_block().expect("not a block");
        for &instr in &blk.instrs {
            let data = m.value(instr);
            if let Some(i) = data.kind.as_instr() {
                if i.operator == Operator::Call {
                    callees.push(i.operands[0]);
                }
            }
        }
    }
    callees
}

/// A function is on a cycle in the call graph (including a direct
/// self-call) iff it can reach itself via `callees`.
fn computes_recursive(start: ValueId, call_graph: &HashMap<ValueId, Vec<ValueId>>) -> bool {
    let mut seen = HashSet::new();
    let mut stack = call_graph.get(&start).cloned().unwrap_or_default();
    while let Some(f) = stack.pop() {
        if f == start {
            return true;
        }
        if seen.insert(f) {
            if let Some(next) = call_graph.get(&f) {
                stack.extend(next.iter().copied());
            }
        }
    }
    false
}

/// Reverse topological order of the call graph (callees before callers),
/// falling back to declaration order within a cycle (SCCs are walked as a
/// unit and do not block the rest of the order).
fn reverse_topo_order(functions: &[ValueId], call_graph: &HashMap<ValueId, Vec<ValueId>>) -> Vec<ValueId> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut on_stack = HashSet::new();

    fn visit(
        f: ValueId,
        call_graph: &HashMap<ValueId, Vec<ValueId>>,
        visited: &mut HashSet<ValueId>,
        on_stack: &mut HashSet<ValueId>,
        order: &mut Vec<ValueId>,
    ) {
        if visited.contains(&f) || on_stack.contains(&f) {
            return;
        }
        on_stack.insert(f);
        for &callee in call_graph.get(&f).map(|v| v.as_slice()).unwrap_or(&[]) {
            visit(callee, call_graph, visited, on_stack, order);
        }
        on_stack.remove(&f);
        visited.insert(f);
        order.push(f);
    }

    for &f in functions {
        visit(f, call_graph, &mut visited, &mut on_stack, &mut order);
    }
    order
}

fn io_runtime_kind(m: &Module, f: ValueId) -> Option<RuntimeFn> {
    match &m.value(f).kind.as_function()?.body {
        FunctionBody::Runtime(r) => Some(*r),
        FunctionBody::Defined { .. } => None,
    }
}

fn is_read_runtime(r: RuntimeFn) -> bool {
    matches!(
        r,
        RuntimeFn::GetInt | RuntimeFn::GetCh | RuntimeFn::GetFloat | RuntimeFn::GetArray | RuntimeFn::GetFArray
            | RuntimeFn::StartTime | RuntimeFn::StopTime
    )
}

fn is_write_runtime(r: RuntimeFn) -> bool {
    matches!(
        r,
        RuntimeFn::PutInt | RuntimeFn::PutCh | RuntimeFn::PutFloat | RuntimeFn::PutArray | RuntimeFn::PutFArray
            | RuntimeFn::PutF
    )
}

/// Builds the call graph and every function's summary, propagating callee
/// effects to callers in reverse topological order.
pub fn build(m: &Module) -> ModuleSummaries {
    let mut call_graph = HashMap::new();
    let mut reverse_call_graph: HashMap<ValueId, Vec<ValueId>> = HashMap::new();
    for &f in &m.functions {
        let callees = direct_callees(m, f);
        for &callee in &callees {
            reverse_call_graph.entry(callee).or_default().push(f);
        }
        call_graph.insert(f, callees);
    }

    let mut summaries: HashMap<ValueId, FunctionSummary> = HashMap::new();
    for &f in &m.functions {
        let fdata = m.value(f).kind.as_function().expect("not a function");
        let mut s = FunctionSummary {
            is_recursive: computes_recursive(f, &call_graph),
            is_leaf: call_graph.get(&f).map(|c| c.is_empty()).unwrap_or(true),
            has_return: !m.tcx.is_void(fdata.ret_ty),
            ..Default::default()
        };
        if let Some(which) = io_runtime_kind(m, f) {
            s.io_read = is_read_runtime(which);
            s.io_write = is_write_runtime(which);
            s.has_side_effect = s.io_write || matches!(which, RuntimeFn::MemSet);
            s.memory_write = matches!(which, RuntimeFn::GetArray | RuntimeFn::GetFArray | RuntimeFn::MemSet);
        } else {
            for &block in m.function_blocks(f) {
                let blk = m.value(block).kind.as_block().expect("not a block");
                for &instr in &blk.instrs {
                    let data = m.value(instr);
                    let Some(i) = data.kind.as_instr() else { continue };
                    match &i.operator {
                        Operator::Load => s.memory_read = true,
                        Operator::Store => {
                            s.memory_write = true;
                            // Writing through an argument (rather than a
                            // local alloca) is the side-effect §4.5 names.
                            let addr = i.operands[0];
                            if matches!(m.value(addr).kind, sysy_mir::ValueKind::Argument(_)) {
                                s.has_side_effect = true;
                            }
                        }
                        Operator::Alloc => s.memory_alloc = true,
                        _ => {}
                    }
                    for &op in &i.operands {
                        if matches!(m.value(op).kind, sysy_mir::ValueKind::Global(_)) {
                            s.used_globals.insert(op);
                        }
                    }
                }
            }
        }
        summaries.insert(f, s);
    }

    // Propagate in reverse topological order: callees settle before the
    // callers that inherit their effects.
    for &f in &reverse_topo_order(&m.functions, &call_graph) {
        let callees = call_graph.get(&f).cloned().unwrap_or_default();
        let mut agg = summaries.get(&f).cloned().unwrap_or_default();
        for callee in callees {
            if callee == f {
                continue;
            }
            if let Some(callee_summary) = summaries.get(&callee).cloned() {
                agg.memory_read |= callee_summary.memory_read;
                agg.memory_write |= callee_summary.memory_write;
                agg.memory_alloc |= callee_summary.memory_alloc;
                agg.io_read |= callee_summary.io_read;
                agg.io_write |= callee_summary.io_write;
                agg.has_side_effect |= callee_summary.has_side_effect;
                agg.used_globals.extend(callee_summary.used_globals.iter().copied());
            }
        }
        summaries.insert(f, agg);
    }

    for s in summaries.values_mut() {
        s.no_state = !s.memory_read && !s.memory_write && !s.has_side_effect && !s.io_read && !s.io_write;
    }

    ModuleSummaries { call_graph, reverse_call_graph, summaries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, Const, Module};

    #[test]
    fn direct_recursion_is_detected() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("fact", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let call = b.call(f, &[n]);
        b.ret(Some(call));

        let summaries = build(&m);
        assert!(summaries.of(f).is_recursive);
        assert!(!summaries.of(f).is_leaf);
    }

    #[test]
    fn leaf_with_no_effects_is_no_state() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("add1", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let one = b.module.make_const(Const::Int(1));
        let r = b.int_binary(sysy_mir::IntBinOp::Add, n, one);
        b.ret(Some(r));

        let summaries = build(&m);
        let s = summaries.of(f);
        assert!(s.is_leaf);
        assert!(!s.is_recursive);
        assert!(s.no_state);
    }

    #[test]
    fn calling_putint_marks_io_write_transitively() {
        let mut m = Module::new("m");
        sysy_mir::runtime::declare_all(&mut m);
        let putint = m.functions.iter().copied().find(|&f| m.name_of(f) == "putint").unwrap();
        let i32_ty = m.tcx.i32;
        let wrapper = m.add_function("wrapper", &[i32_ty], m.tcx.void);
        let arg = m.function_params(wrapper)[0];
        let entry = m.add_block(wrapper, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        b.call(putint, &[arg]);
        b.ret(None);

        let summaries = build(&m);
        assert!(summaries.of(wrapper).io_write);
        assert!(!summaries.of(wrapper).no_state);
    }
}
