//! MIR to Backend MIR (LIR) lowering (§4.11): a near one-to-one rewrite of
//! each defined function's instructions into `LInstr`s over virtual
//! registers. Runs after `phi_removal::insert_phi_moves`, so every PHI's
//! result already has an `Operator::Move` writing it on every incoming
//! edge; this pass gives the PHI a register in the pre-pass below and
//! otherwise skips over the instruction itself.
//!
//! Constants and globals are not given a persistent `VReg` here: they are
//! rematerialized (`li`/`la`) at each point of use instead, the same
//! tradeoff the teacher's `simple_codegen.rs` makes for its register
//! mapping — re-deriving a small immediate or an address is cheaper than
//! keeping it alive across a register allocator's whole live range.
//!
//! `GEP`'s index list lowers to a chain of `AddrOf` steps, one per index,
//! each scaled by the byte size of the array dimension that index selects
//! (`gep_folding.rs`'s own address-arithmetic convention: a linear byte
//! offset of `Σ idx_i * element_size_of_dim_i`).

use crate::lir::{Cond, LBlock, LFunction, LGlobal, LGlobalInit, LInstr, LOperand, LProgram, VReg};
use hashbrown::HashMap;
use sysy_mir::{Const, FunctionBody, Initializer, Module, Operator, Type, TypeKind, ValueId, ValueKind};

pub fn lower_program(m: &Module) -> LProgram {
    let functions = m
        .functions
        .iter()
        .filter(|&&f| m.value(f).kind.as_function().map(|fd| fd.is_defined()).unwrap_or(false))
        .map(|&f| lower_function(m, f))
        .collect();
    let globals = m.globals.iter().map(|&g| lower_global(m, g)).collect();
    let runtime_decls = m.used_runtime_fns().map(|r| r.name().to_string()).collect();
    LProgram { functions, globals, float_pool: Vec::new(), runtime_decls }
}

fn lower_global(m: &Module, g: ValueId) -> LGlobal {
    let symbol = m.name_of(g).to_string();
    let pointee = m.tcx.pointee(m.type_of(g)).expect("global is a pointer");
    let bytes = m.tcx.size_bytes(pointee);
    let initializer = match &m.value(g).kind {
        ValueKind::Global(data) => &data.initializer,
        _ => panic!("not a global"),
    };
    let words = flatten_initializer(initializer);
    let init = if words.iter().all(|&w| w == 0) { LGlobalInit::Zero(bytes) } else { LGlobalInit::Words(words) };
    LGlobal { symbol, bytes, init }
}

fn flatten_initializer(init: &Initializer) -> Vec<i64> {
    match init {
        Initializer::Zero => vec![0],
        Initializer::Const(c) => vec![const_as_word(c)],
        Initializer::Array(items) => items.iter().flat_map(flatten_initializer).collect(),
    }
}

fn const_as_word(c: &Const) -> i64 {
    match c {
        Const::Bool(b) => *b as i64,
        Const::Int(i) => *i as i64,
        Const::Double(d) => (*d as f32).to_bits() as i64,
    }
}

/// Lowers one defined function's body. Panics if `function` has no blocks
/// (a runtime declaration); callers filter those out first.
pub fn lower_function(m: &Module, function: ValueId) -> LFunction {
    let name = m.name_of(function).to_string();
    let mut lf = LFunction::new(name.clone());
    let mut value_map: HashMap<ValueId, VReg> = HashMap::new();

    for &p in m.function_params(function) {
        let v = lf.fresh_vreg();
        value_map.insert(p, v);
        lf.params.push(v);
        if m.tcx.is_float(m.type_of(p)) {
            lf.float_vregs.insert(v);
        }
    }

    let blocks = m.function_blocks(function).to_vec();

    // Reserve a register for every result-producing instruction up front:
    // a `Move` written in a later-in-program-order predecessor (a loop
    // latch) can target a PHI whose own block appears earlier.
    for &block in &blocks {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            let data = m.value(instr).kind.as_instr().expect("not an instr");
            if matches!(data.operator, Operator::Move) {
                continue;
            }
            let ty = m.type_of(instr);
            if !m.tcx.is_void(ty) {
                let v = lf.fresh_vreg();
                value_map.insert(instr, v);
                if m.tcx.is_float(ty) {
                    lf.float_vregs.insert(v);
                }
            }
        }
    }

    let mut labels: HashMap<ValueId, String> = HashMap::new();
    for (i, &block) in blocks.iter().enumerate() {
        labels.insert(block, format!(".L{name}_{i}_{}", m.name_of(block)));
    }

    for &block in &blocks {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        let mut out = Vec::new();
        for instr in instrs {
            lower_instr(m, instr, block, &mut value_map, &labels, &mut lf, &mut out);
        }
        lf.blocks.push(LBlock { label: labels[&block].clone(), instrs: out });
    }

    lf.is_leaf = !lf.blocks.iter().any(|b| b.instrs.iter().any(|i| matches!(i, LInstr::Call { .. })));
    lf
}

/// Resolves `id` to a register, materializing a constant or a global's
/// address inline and lazily reserving one for any value the result-pass
/// above didn't already cover (the scratch slot a cycle-breaking move in
/// `phi_removal` introduces, which is never attached to a block).
fn resolve(m: &Module, id: ValueId, value_map: &mut HashMap<ValueId, VReg>, lf: &mut LFunction, out: &mut Vec<LInstr>) -> VReg {
    if let Some(&v) = value_map.get(&id) {
        return v;
    }
    match &m.value(id).kind {
        ValueKind::Const(Const::Double(d)) => {
            let dst = lf.fresh_vreg();
            out.push(LInstr::LoadFImm { dst, bits: (*d as f32).to_bits() });
            value_map.insert(id, dst);
            lf.float_vregs.insert(dst);
            dst
        }
        ValueKind::Const(c) => {
            let dst = lf.fresh_vreg();
            out.push(LInstr::LoadImm { dst, value: const_as_word(c) });
            value_map.insert(id, dst);
            dst
        }
        ValueKind::Global(_) => {
            let dst = lf.fresh_vreg();
            out.push(LInstr::LoadAddr { dst, symbol: m.name_of(id).to_string() });
            value_map.insert(id, dst);
            dst
        }
        _ => {
            let v = lf.fresh_vreg();
            value_map.insert(id, v);
            if m.tcx.is_float(m.type_of(id)) {
                lf.float_vregs.insert(v);
            }
            v
        }
    }
}

/// Like [`resolve`], but keeps a small integer constant as an `Imm`
/// operand instead of forcing a `li` into a register, matching RISC-V's
/// I-type immediate range.
fn resolve_operand(m: &Module, id: ValueId, value_map: &mut HashMap<ValueId, VReg>, lf: &mut LFunction, out: &mut Vec<LInstr>) -> LOperand {
    if let ValueKind::Const(Const::Int(i)) = &m.value(id).kind {
        let v = *i as i64;
        if (-2048..=2047).contains(&v) {
            return LOperand::Imm(v);
        }
    }
    LOperand::Reg(resolve(m, id, value_map, lf, out))
}

/// Byte stride for each index position in one `gep`'s index list: the
/// size of the array dimension that index selects, walking one level of
/// nesting per index (`gep_folding.rs`'s own convention).
fn gep_element_sizes(m: &Module, base_ptr_ty: Type, n: usize) -> Vec<i64> {
    let mut ty = m.tcx.pointee(base_ptr_ty).expect("gep base must be a pointer");
    let mut sizes = Vec::with_capacity(n);
    for _ in 0..n {
        let elem_ty = match m.tcx.kind(ty) {
            TypeKind::Array { element, .. } => *element,
            _ => ty,
        };
        sizes.push(m.tcx.size_bytes(elem_ty) as i64);
        ty = elem_ty;
    }
    sizes
}

fn callee_symbol(m: &Module, callee: ValueId) -> String {
    match &m.value(callee).kind {
        ValueKind::Function(f) => match &f.body {
            FunctionBody::Runtime(r) => r.name().to_string(),
            FunctionBody::Defined { .. } => m.name_of(callee).to_string(),
        },
        _ => panic!("call target is not a function"),
    }
}

fn lower_instr(
    m: &Module,
    instr: ValueId,
    block: ValueId,
    value_map: &mut HashMap<ValueId, VReg>,
    labels: &HashMap<ValueId, String>,
    lf: &mut LFunction,
    out: &mut Vec<LInstr>,
) {
    let data = m.value(instr).kind.as_instr().expect("not an instr");
    let operator = data.operator.clone();
    let operands = data.operands.clone();

    match operator {
        Operator::Alloc => {
            let pointee = m.tcx.pointee(m.type_of(instr)).expect("alloc result is a pointer");
            let slot = lf.frame_slots.len() as u32;
            lf.frame_slots.push(m.tcx.size_bytes(pointee));
            let dst = *value_map.get(&instr).expect("alloc result reserved in pre-pass");
            out.push(LInstr::FrameAddr { dst, slot });
        }
        Operator::Load => {
            let addr = resolve(m, operands[0], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            let size = m.tcx.size_bytes(m.type_of(instr)) as u8;
            out.push(LInstr::Load { dst, addr, offset: 0, size });
        }
        Operator::Store => {
            let addr = resolve(m, operands[0], value_map, lf, out);
            let src = resolve(m, operands[1], value_map, lf, out);
            let size = m.tcx.size_bytes(m.type_of(operands[1])) as u8;
            out.push(LInstr::Store { addr, offset: 0, src, size });
        }
        Operator::Gep => {
            let base = resolve(m, operands[0], value_map, lf, out);
            let sizes = gep_element_sizes(m, m.type_of(operands[0]), operands.len() - 1);
            let dst_final = *value_map.get(&instr).unwrap();
            let mut cur = base;
            let n = sizes.len();
            for (i, (&idx_id, &scale)) in operands[1..].iter().zip(sizes.iter()).enumerate() {
                let index = resolve_operand(m, idx_id, value_map, lf, out);
                let dst = if i + 1 == n { dst_final } else { lf.fresh_vreg() };
                out.push(LInstr::AddrOf { dst, base: cur, index, scale });
                cur = dst;
            }
        }
        Operator::Bitcast => {
            let src = resolve(m, operands[0], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::Move { dst, src });
        }
        Operator::IntBinary(op) => {
            let lhs = resolve_operand(m, operands[0], value_map, lf, out);
            let rhs = resolve_operand(m, operands[1], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::IntBinary { op, dst, lhs, rhs });
        }
        Operator::FloatBinary(op) => {
            let lhs = resolve(m, operands[0], value_map, lf, out);
            let rhs = resolve(m, operands[1], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::FloatBinary { op, dst, lhs, rhs });
        }
        Operator::FloatTernary(op) => {
            let a = resolve(m, operands[0], value_map, lf, out);
            let b = resolve(m, operands[1], value_map, lf, out);
            let c = resolve(m, operands[2], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::FloatTernary { op, dst, a, b, c });
        }
        Operator::Fneg => {
            let src = resolve(m, operands[0], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::Fneg { dst, src });
        }
        Operator::Icmp(op) => {
            let lhs = resolve(m, operands[0], value_map, lf, out);
            let rhs = resolve(m, operands[1], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::Cmp { cond: op.into(), dst, lhs, rhs });
        }
        Operator::Fcmp(op) => {
            let lhs = resolve(m, operands[0], value_map, lf, out);
            let rhs = resolve(m, operands[1], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::FCmp { cond: op.into(), dst, lhs, rhs });
        }
        Operator::Zext => {
            let src = resolve(m, operands[0], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::Zext { dst, src });
        }
        Operator::Fptosi => {
            let src = resolve(m, operands[0], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::Fptosi { dst, src });
        }
        Operator::Sitofp => {
            let src = resolve(m, operands[0], value_map, lf, out);
            let dst = *value_map.get(&instr).unwrap();
            out.push(LInstr::Sitofp { dst, src });
        }
        // Storage was reserved in the pre-pass; every predecessor writes it
        // through a `Move` `phi_removal` already inserted. Nothing to emit.
        Operator::Phi => {}
        Operator::Move => {
            let dest = resolve(m, operands[0], value_map, lf, out);
            let src = resolve(m, operands[1], value_map, lf, out);
            out.push(LInstr::Move { dst: dest, src });
        }
        Operator::Branch => {
            let cond = resolve(m, operands[0], value_map, lf, out);
            out.push(LInstr::Branch {
                cond,
                then_label: labels[&operands[1]].clone(),
                else_label: labels[&operands[2]].clone(),
            });
        }
        Operator::Jump => {
            out.push(LInstr::Jump { target: labels[&operands[0]].clone() });
        }
        Operator::Switch => {
            lower_switch(m, instr, &operands, block, value_map, labels, lf, out);
        }
        Operator::Ret => {
            let value = operands.first().map(|&v| resolve(m, v, value_map, lf, out));
            out.push(LInstr::Ret { value });
        }
        Operator::Call => {
            let callee = callee_symbol(m, operands[0]);
            let args: Vec<VReg> = operands[1..].iter().map(|&a| resolve(m, a, value_map, lf, out)).collect();
            let ret = if m.tcx.is_void(m.type_of(instr)) { None } else { Some(*value_map.get(&instr).unwrap()) };
            out.push(LInstr::Call { callee, args, ret });
        }
    }
}

/// Expands a `SWITCH` into a chain of `Cmp`+`Branch` pairs, one per case:
/// the current block carries the first comparison, each subsequent case
/// gets its own synthetic block threaded through `else_label`, and the
/// last case's `else_label` is the switch's own default block.
fn lower_switch(
    m: &Module,
    instr: ValueId,
    operands: &[ValueId],
    block: ValueId,
    value_map: &mut HashMap<ValueId, VReg>,
    labels: &HashMap<ValueId, String>,
    lf: &mut LFunction,
    out: &mut Vec<LInstr>,
) {
    let cases: Vec<(ValueId, ValueId)> = m.value(instr).kind.as_instr().expect("not an instr").switch_cases().collect();
    let default_label = labels[&operands[1]].clone();
    if cases.is_empty() {
        out.push(LInstr::Jump { target: default_label });
        return;
    }

    let scrutinee = resolve(m, operands[0], value_map, lf, out);
    let own_label = labels[&block].clone();
    let mut chain: Vec<(String, Vec<LInstr>)> = Vec::with_capacity(cases.len());
    for (i, &(case_const, case_blk)) in cases.iter().enumerate() {
        let is_last = i + 1 == cases.len();
        let mut body = Vec::new();
        let cv = resolve(m, case_const, value_map, lf, &mut body);
        let cmp_dst = lf.fresh_vreg();
        body.push(LInstr::Cmp { cond: Cond::Eq, dst: cmp_dst, lhs: scrutinee, rhs: cv });
        let next_label = if is_last { default_label.clone() } else { format!("{own_label}$case{}", i + 1) };
        body.push(LInstr::Branch { cond: cmp_dst, then_label: labels[&case_blk].clone(), else_label: next_label });
        let label = if i == 0 { own_label.clone() } else { format!("{own_label}$case{i}") };
        chain.push((label, body));
    }

    let (_, first_body) = chain.remove(0);
    out.extend(first_body);
    for (label, instrs) in chain {
        lf.blocks.push(LBlock { label, instrs });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, CmpOp, Const, IntBinOp, Module};

    #[test]
    fn straight_line_function_lowers_one_block_per_mir_block() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("add_one", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let one = b.module.make_const(Const::Int(1));
        let sum = b.int_binary(IntBinOp::Add, n, one);
        b.ret(Some(sum));

        let lf = lower_function(&m, f);
        assert_eq!(lf.blocks.len(), 1);
        assert_eq!(lf.params.len(), 1);
        assert!(lf.is_leaf);
        assert!(matches!(lf.blocks[0].instrs.last(), Some(LInstr::Ret { value: Some(_) })));
    }

    #[test]
    fn gep_over_a_2d_array_scales_each_index_by_its_row_size() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let row_ty = m.tcx.array(4, i32_ty);
        let arr_ty = m.tcx.array(3, row_ty);
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let base = b.alloc(arr_ty);
        let i1 = b.module.make_const(Const::Int(1));
        let i2 = b.module.make_const(Const::Int(2));
        let elem_ptr_ty = b.module.tcx.pointer(i32_ty);
        let gep = b.gep(base, &[i1, i2], elem_ptr_ty);
        let v = b.load(gep);
        b.ret(Some(v));

        let lf = lower_function(&m, f);
        let addr_ofs: Vec<&LInstr> = lf.blocks[0].instrs.iter().filter(|i| matches!(i, LInstr::AddrOf { .. })).collect();
        assert_eq!(addr_ofs.len(), 2);
        // Row stride is 4 i32s = 16 bytes, inner index is one i32 = 4 bytes.
        match addr_ofs[0] {
            LInstr::AddrOf { scale, .. } => assert_eq!(*scale, 16),
            _ => unreachable!(),
        }
        match addr_ofs[1] {
            LInstr::AddrOf { scale, .. } => assert_eq!(*scale, 4),
            _ => unreachable!(),
        }
    }

    #[test]
    fn switch_with_two_cases_lowers_to_a_cmp_branch_chain() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty], i32_ty);
        let n = m.function_params(f)[0];
        let entry = m.add_block(f, "entry");
        let case0 = m.add_block(f, "case0");
        let case1 = m.add_block(f, "case1");
        let default = m.add_block(f, "default");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        b.switch(n, default, &[(Const::Int(0), case0), (Const::Int(1), case1)]);
        b.set_insert_point(case0);
        let z = b.module.make_const(Const::Int(10));
        b.ret(Some(z));
        b.set_insert_point(case1);
        let o = b.module.make_const(Const::Int(11));
        b.ret(Some(o));
        b.set_insert_point(default);
        let zero = b.module.make_const(Const::Int(0));
        b.ret(Some(zero));

        let lf = lower_function(&m, f);
        // entry + case0 + case1 + default + one synthetic chained block.
        assert_eq!(lf.blocks.len(), 5);
        let cmp_count: usize = lf.blocks.iter().flat_map(|blk| &blk.instrs).filter(|i| matches!(i, LInstr::Cmp { .. })).count();
        assert_eq!(cmp_count, 2);
    }

    #[test]
    fn icmp_lowers_to_a_cond_cmp() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[i32_ty, i32_ty], i32_ty);
        let a = m.function_params(f)[0];
        let bparam = m.function_params(f)[1];
        let entry = m.add_block(f, "entry");
        let t = m.add_block(f, "t");
        let e = m.add_block(f, "e");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let cond = b.icmp(CmpOp::Lt, a, bparam);
        b.branch(cond, t, e);
        b.set_insert_point(t);
        b.ret(Some(a));
        b.set_insert_point(e);
        b.ret(Some(bparam));

        let lf = lower_function(&m, f);
        let has_cmp = lf.blocks[0].instrs.iter().any(|i| matches!(i, LInstr::Cmp { cond: Cond::Lt, .. }));
        assert!(has_cmp);
    }
}
