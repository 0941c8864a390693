//! Linear-scan register allocation (§4.11), Poletto & Sarkar style: sort
//! live intervals by start, expire dead ones out of the active set as we
//! go, and either hand out a free physical register or spill — the
//! current interval if it outlives everything already active, otherwise
//! the active interval with the furthest-away end (freeing its register
//! for the current one). Integer and float-valued registers are allocated
//! from separate pools and separate RISC-V register files.

use crate::lir::{LFunction, LGlobal, LProgram, Storage, VReg};
use crate::liveness::{self, Interval};
use hashbrown::HashMap;

const INT_REGS: &[&str] =
    &["t0", "t1", "t2", "t3", "t4", "t5", "t6", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9", "s10", "s11"];
const FLOAT_REGS: &[&str] = &[
    "ft0", "ft1", "ft2", "ft3", "ft4", "ft5", "ft6", "ft7", "fs0", "fs1", "fs2", "fs3", "fs4", "fs5", "fs6", "fs7",
    "fs8", "fs9", "fs10", "fs11", "ft8", "ft9", "ft10", "ft11",
];
pub const INT_ARG_REGS: &[&str] = &["a0", "a1", "a2", "a3", "a4", "a5", "a6", "a7"];
pub const FLOAT_ARG_REGS: &[&str] = &["fa0", "fa1", "fa2", "fa3", "fa4", "fa5", "fa6", "fa7"];
const WORD: i64 = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Assignment {
    pub reg: Option<&'static str>,
    pub spill_offset: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct AllocatedFunction {
    pub lf: LFunction,
    pub assignment: HashMap<VReg, Assignment>,
    pub frame_bytes: i64,
    /// Byte offset of each surviving `ALLOC`'s slot from `fp`, parallel to
    /// `lf.frame_slots` (negative: below `fp`, in the callee's own frame).
    pub frame_slot_offsets: Vec<i64>,
    /// Parameters passed beyond the 8 argument registers of their class:
    /// `VReg` to the byte offset (above `fp`) the caller left it at.
    pub incoming_stack_params: HashMap<VReg, i64>,
}

#[derive(Debug, Clone)]
pub struct AllocatedProgram {
    pub functions: Vec<AllocatedFunction>,
    pub globals: Vec<LGlobal>,
    pub float_pool: Vec<(String, u32)>,
    pub runtime_decls: Vec<String>,
}

struct Active {
    vreg: VReg,
    end: usize,
    reg: &'static str,
}

/// Assigns `intervals` to physical registers from `pool`, spilling to make
/// room when the pool is exhausted. Returns the assigned registers and
/// the (possibly empty) set of registers that had to spill to a stack
/// slot instead.
fn linear_scan(mut intervals: Vec<(VReg, Interval)>, pool: &'static [&'static str]) -> (HashMap<VReg, &'static str>, Vec<VReg>) {
    intervals.sort_by_key(|&(_, iv)| iv.start);
    let mut free: Vec<&'static str> = pool.iter().rev().copied().collect();
    let mut active: Vec<Active> = Vec::new();
    let mut assigned: HashMap<VReg, &'static str> = HashMap::new();
    let mut spilled: Vec<VReg> = Vec::new();

    for (v, iv) in intervals {
        active.retain(|a| {
            if a.end < iv.start {
                free.push(a.reg);
                false
            } else {
                true
            }
        });
        if let Some(reg) = free.pop() {
            assigned.insert(v, reg);
            active.push(Active { vreg: v, end: iv.end, reg });
        } else {
            let worst_idx = active.iter().enumerate().max_by_key(|(_, a)| a.end).map(|(i, _)| i).expect("register pool is non-empty");
            if active[worst_idx].end > iv.end {
                let worst = active.remove(worst_idx);
                assigned.remove(&worst.vreg);
                spilled.push(worst.vreg);
                assigned.insert(v, worst.reg);
                active.push(Active { vreg: v, end: iv.end, reg: worst.reg });
            } else {
                spilled.push(v);
            }
        }
    }
    (assigned, spilled)
}

fn round_up_16(n: i64) -> i64 {
    (n + 15) & !15
}

fn spill(v: VReg, cursor: &mut i64, assignment: &mut HashMap<VReg, Assignment>) {
    *cursor += WORD;
    assignment.insert(v, Assignment { reg: None, spill_offset: Some(-*cursor) });
}

/// Runs liveness, storage classification, and linear-scan allocation for
/// one function. `Storage::Function` registers always get a dedicated
/// stack slot rather than competing for a physical register, per
/// `lir::Storage`'s own contract; only `Storage::Local` registers — which
/// by construction never cross a block boundary — go through linear scan,
/// and only spill if too many of them are live at once within one block.
///
/// Frame layout follows the standard `fp`-relative convention: incoming
/// stack parameters live above `fp` (`fp+0`, `fp+8`, ...), the two fixed
/// doublewords for the saved return address and caller's `fp` sit just
/// below it, and every `ALLOC` slot and spill slot is carved out further
/// down from there (`fp-16`, `fp-24`, ...). `emit.rs` turns this into the
/// actual `addi sp, sp, -frame_bytes` / saves / restores.
pub fn allocate_function(lf: LFunction) -> AllocatedFunction {
    let mut lf = lf;
    let liveness = liveness::analyze(&lf);
    liveness::classify_storage(&mut lf, &liveness);
    let intervals = liveness::compute_intervals(&lf);

    let mut cursor: i64 = 2 * WORD;
    let mut frame_slot_offsets = Vec::with_capacity(lf.frame_slots.len());
    for &size in &lf.frame_slots {
        cursor += size as i64;
        frame_slot_offsets.push(-cursor);
    }

    let mut assignment: HashMap<VReg, Assignment> = HashMap::new();
    let mut local_int = Vec::new();
    let mut local_float = Vec::new();
    for (v, iv) in intervals {
        let storage = lf.vreg_storage.get(&v).copied().unwrap_or(Storage::Local);
        if storage == Storage::Function {
            spill(v, &mut cursor, &mut assignment);
        } else if lf.float_vregs.contains(&v) {
            local_float.push((v, iv));
        } else {
            local_int.push((v, iv));
        }
    }
    let (int_assigned, int_spilled) = linear_scan(local_int, INT_REGS);
    let (float_assigned, float_spilled) = linear_scan(local_float, FLOAT_REGS);
    for &v in int_spilled.iter().chain(float_spilled.iter()) {
        spill(v, &mut cursor, &mut assignment);
    }
    for (v, reg) in int_assigned.into_iter().chain(float_assigned) {
        assignment.insert(v, Assignment { reg: Some(reg), spill_offset: None });
    }

    let mut incoming_stack_params = HashMap::new();
    for (i, &p) in lf.params.iter().enumerate() {
        let class_len = if lf.float_vregs.contains(&p) { FLOAT_ARG_REGS.len() } else { INT_ARG_REGS.len() };
        if i >= class_len {
            incoming_stack_params.insert(p, (i - class_len) as i64 * WORD);
        }
    }

    let frame_bytes = round_up_16(cursor);
    AllocatedFunction { lf, assignment, frame_bytes, frame_slot_offsets, incoming_stack_params }
}

pub fn allocate_program(program: LProgram) -> AllocatedProgram {
    let functions = program.functions.into_iter().map(allocate_function).collect();
    AllocatedProgram { functions, globals: program.globals, float_pool: program.float_pool, runtime_decls: program.runtime_decls }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::{Cond, LBlock, LInstr};

    #[test]
    fn short_lived_registers_all_fit_in_the_pool() {
        let mut lf = LFunction::new("f");
        let a = lf.fresh_vreg();
        let b = lf.fresh_vreg();
        lf.blocks.push(LBlock {
            label: "entry".into(),
            instrs: vec![
                LInstr::LoadImm { dst: a, value: 1 },
                LInstr::LoadImm { dst: b, value: 2 },
                LInstr::Cmp { cond: Cond::Eq, dst: a, lhs: a, rhs: b },
                LInstr::Ret { value: Some(a) },
            ],
        });
        let allocated = allocate_function(lf);
        assert!(allocated.assignment[&a].reg.is_some());
        assert!(allocated.assignment[&b].reg.is_some());
    }

    #[test]
    fn exhausting_the_pool_spills_the_longest_remaining_interval() {
        let mut lf = LFunction::new("f");
        let mut regs = Vec::new();
        lf.blocks.push(LBlock { label: "entry".into(), instrs: Vec::new() });
        for i in 0..(INT_REGS.len() + 2) {
            let v = lf.fresh_vreg();
            lf.blocks[0].instrs.push(LInstr::LoadImm { dst: v, value: i as i64 });
            regs.push(v);
        }
        // Keep every one of them alive until the very end.
        lf.blocks[0].instrs.push(LInstr::Ret { value: Some(regs[0]) });
        for &v in &regs[1..] {
            lf.blocks[0].instrs.insert(lf.blocks[0].instrs.len() - 1, LInstr::Move { dst: v, src: v });
        }
        let allocated = allocate_function(lf);
        let spilled = regs.iter().filter(|v| allocated.assignment[v].spill_offset.is_some()).count();
        assert!(spilled >= 2);
    }

    #[test]
    fn eighth_float_parameter_and_beyond_arrives_on_the_stack() {
        let mut lf = LFunction::new("f");
        for _ in 0..9 {
            let v = lf.fresh_vreg();
            lf.params.push(v);
            lf.float_vregs.insert(v);
        }
        lf.blocks.push(LBlock { label: "entry".into(), instrs: vec![LInstr::Ret { value: None }] });
        let allocated = allocate_function(lf);
        assert!(!allocated.incoming_stack_params.contains_key(&lf.params[7]));
        assert!(allocated.incoming_stack_params.contains_key(&lf.params[8]));
    }
}
