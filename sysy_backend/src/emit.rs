//! RV64GC assembly text emission (§4.11): the last backend stage, turning
//! an `AllocatedProgram` into the GNU-assembler text `sysyc --emit asm`
//! writes out. Follows the teacher's `simple_codegen.rs` habit of building
//! the whole module as one `String` via repeated `writeln!`, one function
//! or directive at a time, rather than an intermediate instruction-object
//! tree.

use crate::lir::{Cond, LGlobal, LGlobalInit, LInstr, LOperand, VReg};
use crate::regalloc::{AllocatedFunction, AllocatedProgram, Assignment, FLOAT_ARG_REGS, INT_ARG_REGS};
use std::fmt::Write as _;

const WORD: i64 = 8;

/// A `VReg`'s resolved location for this instruction: either a physical
/// register name or an `fp`-relative stack slot that must be spilled to /
/// reloaded from a scratch register around the instruction that uses it.
enum Loc {
    Reg(&'static str),
    Slot(i64),
}

fn loc_of(f: &AllocatedFunction, v: VReg) -> Loc {
    if let Some(off) = f.incoming_stack_params.get(&v) {
        return Loc::Slot(*off);
    }
    match f.assignment.get(&v) {
        Some(Assignment { reg: Some(r), .. }) => Loc::Reg(r),
        Some(Assignment { spill_offset: Some(off), .. }) => Loc::Slot(*off),
        _ => Loc::Slot(0),
    }
}

fn is_float_reg(r: &str) -> bool {
    r.starts_with('f')
}

/// Emits whatever load is needed to get `v`'s value into a scratch
/// register (`t0`/`ft0` for int/float), returning the register name to use
/// as the operand. Returns the register directly, with no load, if `v`
/// already lives in one.
fn materialize(out: &mut String, f: &AllocatedFunction, v: VReg, scratch: &'static str) -> &'static str {
    match loc_of(f, v) {
        Loc::Reg(r) => r,
        Loc::Slot(off) => {
            let op = if is_float_reg(scratch) { "fld" } else { "ld" };
            let _ = writeln!(out, "    {} {}, {}(fp)", op, scratch, off);
            scratch
        }
    }
}

/// Emits whatever store is needed to write `scratch` back into `dst`'s
/// location; a no-op if `dst` is itself a physical register (the
/// instruction already wrote straight into it).
fn commit(out: &mut String, f: &AllocatedFunction, dst: VReg, scratch: &'static str) {
    if let Loc::Slot(off) = loc_of(f, dst) {
        let op = if is_float_reg(scratch) { "fsd" } else { "sd" };
        let _ = writeln!(out, "    {} {}, {}(fp)", op, scratch, off);
    }
}

/// `dst`'s physical register if it has one, else a scratch register of the
/// matching class — used when an instruction can write its result
/// straight into `dst` without an intermediate `commit`.
fn dst_reg(f: &AllocatedFunction, dst: VReg, scratch: &'static str) -> &'static str {
    match loc_of(f, dst) {
        Loc::Reg(r) => r,
        Loc::Slot(_) => scratch,
    }
}

fn cond_branch_mnemonic(cond: Cond, negate: bool) -> &'static str {
    match (cond, negate) {
        (Cond::Eq, false) => "beq",
        (Cond::Eq, true) => "bne",
        (Cond::Ne, false) => "bne",
        (Cond::Ne, true) => "beq",
        (Cond::Lt, false) => "blt",
        (Cond::Lt, true) => "bge",
        (Cond::Le, false) => "ble",
        (Cond::Le, true) => "bgt",
        (Cond::Gt, false) => "bgt",
        (Cond::Gt, true) => "ble",
        (Cond::Ge, false) => "bge",
        (Cond::Ge, true) => "blt",
    }
}

fn cond_set_mnemonics(cond: Cond) -> (&'static str, bool) {
    // (underlying slt-family op, "negate the slt result" flag)
    match cond {
        Cond::Lt => ("slt", false),
        Cond::Ge => ("slt", true),
        Cond::Gt => ("sgt", false),
        Cond::Le => ("sgt", true),
        Cond::Eq => ("xor", false),
        Cond::Ne => ("xor", true),
    }
}

fn int_binop_mnemonic(op: sysy_mir::IntBinOp) -> &'static str {
    use sysy_mir::IntBinOp::*;
    match op {
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        Div => "div",
        Mod => "rem",
        And => "and",
        Or => "or",
        Xor => "xor",
        Shl => "sll",
        Lshr => "srl",
        Ashr => "sra",
        Smax => "max",
        Smin => "min",
    }
}

fn float_binop_mnemonic(op: sysy_mir::FloatBinOp) -> &'static str {
    use sysy_mir::FloatBinOp::*;
    match op {
        Add => "fadd.s",
        Sub => "fsub.s",
        Mul => "fmul.s",
        Div => "fdiv.s",
        Mod => "fmod.s",
        Smax => "fmax.s",
        Smin => "fmin.s",
    }
}

fn float_ternop_mnemonic(op: sysy_mir::FloatTernOp) -> &'static str {
    use sysy_mir::FloatTernOp::*;
    match op {
        Fmadd => "fmadd.s",
        Fmsub => "fmsub.s",
        Fnmadd => "fnmadd.s",
        Fnmsub => "fnmsub.s",
    }
}

fn emit_operand(out: &mut String, f: &AllocatedFunction, op: LOperand, scratch: &'static str) -> String {
    match op {
        LOperand::Reg(v) => materialize(out, f, v, scratch).to_string(),
        LOperand::Imm(n) => n.to_string(),
    }
}

fn emit_instr(out: &mut String, f: &AllocatedFunction, instr: &LInstr) {
    match instr {
        LInstr::LoadImm { dst, value } => {
            let d = dst_reg(f, *dst, "t0");
            let _ = writeln!(out, "    li {}, {}", d, value);
            commit(out, f, *dst, d);
        }
        LInstr::LoadFImm { dst, bits } => {
            let d = dst_reg(f, *dst, "ft0");
            let _ = writeln!(out, "    lui t0, %hi(.Lfloat_{:08x})", bits);
            let _ = writeln!(out, "    flw {}, %lo(.Lfloat_{:08x})(t0)", d, bits);
            commit(out, f, *dst, d);
        }
        LInstr::LoadAddr { dst, symbol } => {
            let d = dst_reg(f, *dst, "t0");
            let _ = writeln!(out, "    la {}, {}", d, symbol);
            commit(out, f, *dst, d);
        }
        LInstr::Move { dst, src } => {
            let s = materialize(out, f, *src, "t0");
            let d = dst_reg(f, *dst, "t1");
            let mv = if is_float_reg(d) || is_float_reg(s) { "fmv.s" } else { "mv" };
            let _ = writeln!(out, "    {} {}, {}", mv, d, s);
            commit(out, f, *dst, d);
        }
        LInstr::IntBinary { op, dst, lhs, rhs } => {
            let l = emit_operand(out, f, *lhs, "t0");
            // An immediate rhs is only usable inline for add; everything
            // else materializes it into a scratch register first.
            let d = dst_reg(f, *dst, "t2");
            match (op, rhs) {
                (sysy_mir::IntBinOp::Add, LOperand::Imm(n)) => {
                    let _ = writeln!(out, "    addi {}, {}, {}", d, l, n);
                }
                _ => {
                    let r = emit_operand(out, f, *rhs, "t1");
                    let _ = writeln!(out, "    {} {}, {}, {}", int_binop_mnemonic(*op), d, l, r);
                }
            }
            commit(out, f, *dst, d);
        }
        LInstr::FloatBinary { op, dst, lhs, rhs } => {
            let l = materialize(out, f, *lhs, "ft0");
            let r = materialize(out, f, *rhs, "ft1");
            let d = dst_reg(f, *dst, "ft2");
            let _ = writeln!(out, "    {} {}, {}, {}", float_binop_mnemonic(*op), d, l, r);
            commit(out, f, *dst, d);
        }
        LInstr::FloatTernary { op, dst, a, b, c } => {
            let ra = materialize(out, f, *a, "ft0");
            let rb = materialize(out, f, *b, "ft1");
            let rc = materialize(out, f, *c, "ft2");
            let d = dst_reg(f, *dst, "ft3");
            let _ = writeln!(out, "    {} {}, {}, {}, {}", float_ternop_mnemonic(*op), d, ra, rb, rc);
            commit(out, f, *dst, d);
        }
        LInstr::Fneg { dst, src } => {
            let s = materialize(out, f, *src, "ft0");
            let d = dst_reg(f, *dst, "ft1");
            let _ = writeln!(out, "    fneg.s {}, {}", d, s);
            commit(out, f, *dst, d);
        }
        LInstr::Cmp { cond, dst, lhs, rhs } => {
            let l = materialize(out, f, *lhs, "t0");
            let r = materialize(out, f, *rhs, "t1");
            let d = dst_reg(f, *dst, "t2");
            let (base, negate) = cond_set_mnemonics(*cond);
            match base {
                "slt" => {
                    let _ = writeln!(out, "    slt {}, {}, {}", d, l, r);
                }
                "sgt" => {
                    let _ = writeln!(out, "    slt {}, {}, {}", d, r, l);
                }
                _ => {
                    let _ = writeln!(out, "    xor {}, {}, {}", d, l, r);
                    let _ = writeln!(out, "    seqz {}, {}", d, d);
                }
            }
            if negate {
                let _ = writeln!(out, "    xori {}, {}, 1", d, d);
            }
            commit(out, f, *dst, d);
        }
        LInstr::FCmp { cond, dst, lhs, rhs } => {
            let l = materialize(out, f, *lhs, "ft0");
            let r = materialize(out, f, *rhs, "ft1");
            let d = dst_reg(f, *dst, "t0");
            match cond {
                Cond::Eq => {
                    let _ = writeln!(out, "    feq.s {}, {}, {}", d, l, r);
                }
                Cond::Ne => {
                    let _ = writeln!(out, "    feq.s {}, {}, {}", d, l, r);
                    let _ = writeln!(out, "    xori {}, {}, 1", d, d);
                }
                Cond::Lt => {
                    let _ = writeln!(out, "    flt.s {}, {}, {}", d, l, r);
                }
                Cond::Le => {
                    let _ = writeln!(out, "    fle.s {}, {}, {}", d, l, r);
                }
                Cond::Gt => {
                    let _ = writeln!(out, "    flt.s {}, {}, {}", d, r, l);
                }
                Cond::Ge => {
                    let _ = writeln!(out, "    fle.s {}, {}, {}", d, r, l);
                }
            }
            commit(out, f, *dst, d);
        }
        LInstr::Sitofp { dst, src } => {
            let s = materialize(out, f, *src, "t0");
            let d = dst_reg(f, *dst, "ft0");
            let _ = writeln!(out, "    fcvt.s.w {}, {}", d, s);
            commit(out, f, *dst, d);
        }
        LInstr::Fptosi { dst, src } => {
            let s = materialize(out, f, *src, "ft0");
            let d = dst_reg(f, *dst, "t0");
            let _ = writeln!(out, "    fcvt.w.s {}, {}, rtz", d, s);
            commit(out, f, *dst, d);
        }
        LInstr::Zext { dst, src } => {
            let s = materialize(out, f, *src, "t0");
            let d = dst_reg(f, *dst, "t1");
            let _ = writeln!(out, "    andi {}, {}, 1", d, s);
            commit(out, f, *dst, d);
        }
        LInstr::AddrOf { dst, base, index, scale } => {
            let b = materialize(out, f, *base, "t0");
            let d = dst_reg(f, *dst, "t2");
            match index {
                LOperand::Imm(0) => {
                    let _ = writeln!(out, "    mv {}, {}", d, b);
                }
                LOperand::Imm(n) => {
                    let _ = writeln!(out, "    addi {}, {}, {}", d, b, n * scale);
                }
                LOperand::Reg(idx) => {
                    let i = materialize(out, f, *idx, "t1");
                    let _ = writeln!(out, "    li t3, {}", scale);
                    let _ = writeln!(out, "    mul t3, {}, t3", i);
                    let _ = writeln!(out, "    add {}, {}, t3", d, b);
                }
            }
            commit(out, f, *dst, d);
        }
        LInstr::Load { dst, addr, offset, size } => {
            let a = materialize(out, f, *addr, "t0");
            let is_float = matches!(loc_of(f, *dst), Loc::Reg(r) if is_float_reg(r)) || f.lf.float_vregs.contains(dst);
            let d = dst_reg(f, *dst, if is_float { "ft0" } else { "t2" });
            let op = match (is_float, size) {
                (true, _) => "flw",
                (false, 1) => "lb",
                (false, 4) => "lw",
                (false, _) => "ld",
            };
            let _ = writeln!(out, "    {} {}, {}({})", op, d, offset, a);
            commit(out, f, *dst, d);
        }
        LInstr::Store { addr, offset, src, size } => {
            let a = materialize(out, f, *addr, "t0");
            let is_float = f.lf.float_vregs.contains(src);
            let s = materialize(out, f, *src, if is_float { "ft1" } else { "t1" });
            let op = match (is_float, size) {
                (true, _) => "fsw",
                (false, 1) => "sb",
                (false, 4) => "sw",
                (false, _) => "sd",
            };
            let _ = writeln!(out, "    {} {}, {}({})", op, s, offset, a);
        }
        LInstr::FrameAddr { dst, slot } => {
            let d = dst_reg(f, *dst, "t0");
            let off = f.frame_slot_offsets[*slot as usize];
            let _ = writeln!(out, "    addi {}, fp, {}", d, off);
            commit(out, f, *dst, d);
        }
        LInstr::Call { callee, args, ret } => {
            let mut int_i = 0usize;
            let mut float_i = 0usize;
            for &a in args {
                let is_float = f.lf.float_vregs.contains(&a);
                if is_float && float_i < FLOAT_ARG_REGS.len() {
                    let v = materialize(out, f, a, "ft0");
                    let _ = writeln!(out, "    fmv.s {}, {}", FLOAT_ARG_REGS[float_i], v);
                    float_i += 1;
                } else if !is_float && int_i < INT_ARG_REGS.len() {
                    let v = materialize(out, f, a, "t0");
                    let _ = writeln!(out, "    mv {}, {}", INT_ARG_REGS[int_i], v);
                    int_i += 1;
                }
                // Stack-passed call arguments beyond the 8-register class
                // limit are not produced by this backend's call sites yet.
            }
            let _ = writeln!(out, "    call {}", callee);
            if let Some(r) = ret {
                let is_float = f.lf.float_vregs.contains(r);
                let src = if is_float { "fa0" } else { "a0" };
                let d = dst_reg(f, *r, if is_float { "ft0" } else { "t0" });
                if d != src {
                    let mv = if is_float { "fmv.s" } else { "mv" };
                    let _ = writeln!(out, "    {} {}, {}", mv, d, src);
                }
                commit(out, f, *r, d);
            }
        }
        LInstr::Jump { target } => {
            let _ = writeln!(out, "    j {}", target);
        }
        LInstr::Branch { cond, then_label, else_label } => {
            let c = materialize(out, f, *cond, "t0");
            let _ = writeln!(out, "    bnez {}, {}", c, then_label);
            let _ = writeln!(out, "    j {}", else_label);
        }
        LInstr::Ret { value } => {
            if let Some(v) = value {
                let is_float = f.lf.float_vregs.contains(v);
                let (dst, scratch) = if is_float { ("fa0", "ft0") } else { ("a0", "t0") };
                let r = materialize(out, f, *v, scratch);
                if r != dst {
                    let mv = if is_float { "fmv.s" } else { "mv" };
                    let _ = writeln!(out, "    {} {}, {}", mv, dst, r);
                }
            }
            emit_epilogue(out, f);
            let _ = writeln!(out, "    ret");
        }
    }
}

fn used_callee_saved(f: &AllocatedFunction) -> Vec<&'static str> {
    let mut regs: Vec<&'static str> =
        f.assignment.values().filter_map(|a| a.reg).filter(|r| r.starts_with('s') || r.starts_with("fs")).collect();
    regs.sort_unstable();
    regs.dedup();
    regs
}

fn emit_prologue(out: &mut String, f: &AllocatedFunction) {
    let _ = writeln!(out, "    addi sp, sp, -{}", f.frame_bytes);
    let _ = writeln!(out, "    sd ra, {}(sp)", f.frame_bytes - WORD);
    let _ = writeln!(out, "    sd s0, {}(sp)", f.frame_bytes - 2 * WORD);
    let _ = writeln!(out, "    addi fp, sp, {}", f.frame_bytes);
    for (i, reg) in used_callee_saved(f).iter().enumerate() {
        let off = f.frame_bytes - 2 * WORD - (i as i64 + 1) * WORD;
        let op = if is_float_reg(reg) { "fsd" } else { "sd" };
        let _ = writeln!(out, "    {} {}, {}(sp)", op, reg, off);
    }

    for (i, &p) in f.lf.params.iter().enumerate() {
        if f.incoming_stack_params.contains_key(&p) {
            continue;
        }
        let is_float = f.lf.float_vregs.contains(&p);
        let src = if is_float { FLOAT_ARG_REGS[i] } else { INT_ARG_REGS[i] };
        match loc_of(f, p) {
            Loc::Reg(r) if r == src => {}
            Loc::Reg(r) => {
                let mv = if is_float { "fmv.s" } else { "mv" };
                let _ = writeln!(out, "    {} {}, {}", mv, r, src);
            }
            Loc::Slot(off) => {
                let op = if is_float { "fsd" } else { "sd" };
                let _ = writeln!(out, "    {} {}, {}(fp)", op, src, off);
            }
        }
    }
}

fn emit_epilogue(out: &mut String, f: &AllocatedFunction) {
    for (i, reg) in used_callee_saved(f).iter().enumerate() {
        let off = f.frame_bytes - 2 * WORD - (i as i64 + 1) * WORD;
        let op = if is_float_reg(reg) { "fld" } else { "ld" };
        let _ = writeln!(out, "    {} {}, {}(sp)", op, reg, off);
    }
    let _ = writeln!(out, "    ld ra, {}(sp)", f.frame_bytes - WORD);
    let _ = writeln!(out, "    ld s0, {}(sp)", f.frame_bytes - 2 * WORD);
    let _ = writeln!(out, "    addi sp, sp, {}", f.frame_bytes);
}

fn emit_function(out: &mut String, f: &AllocatedFunction) {
    let _ = writeln!(out, "    .globl {}", f.lf.name);
    let _ = writeln!(out, "    .type {}, @function", f.lf.name);
    let _ = writeln!(out, "{}:", f.lf.name);
    emit_prologue(out, f);
    for block in &f.lf.blocks {
        let _ = writeln!(out, "{}:", block.label);
        for instr in &block.instrs {
            emit_instr(out, f, instr);
        }
    }
    let _ = writeln!(out, "    .size {}, .-{}", f.lf.name, f.lf.name);
}

fn emit_global(out: &mut String, g: &LGlobal) {
    let _ = writeln!(out, "    .globl {}", g.symbol);
    match &g.init {
        LGlobalInit::Zero(bytes) => {
            let _ = writeln!(out, "    .bss");
            let _ = writeln!(out, "    .align 3");
            let _ = writeln!(out, "{}:", g.symbol);
            let _ = writeln!(out, "    .zero {}", bytes);
        }
        LGlobalInit::Words(words) => {
            let _ = writeln!(out, "    .data");
            let _ = writeln!(out, "    .align 3");
            let _ = writeln!(out, "{}:", g.symbol);
            for w in words {
                let _ = writeln!(out, "    .word {}", w);
            }
            let padding = g.bytes.saturating_sub(words.len() * 4);
            if padding > 0 {
                let _ = writeln!(out, "    .zero {}", padding);
            }
        }
    }
}

/// Produces the complete `.s` text for a compiled module: `.rodata`'s
/// float-literal pool, `.bss`/`.data` for globals, `.text` with every
/// function, and `.extern` declarations for the runtime functions the
/// module calls into.
pub fn emit_program(program: &AllocatedProgram) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "    .option nopic");

    for decl in &program.runtime_decls {
        let _ = writeln!(out, "    .extern {}", decl);
    }

    // `lower.rs` rematerializes every float literal inline (`LoadFImm`)
    // rather than threading it through `LProgram::float_pool`, so the
    // rodata entries backing those `.Lfloat_*` labels are collected here
    // instead, deduplicated by bit pattern.
    let mut float_bits: Vec<u32> = program.float_pool.iter().map(|&(_, b)| b).collect();
    for f in &program.functions {
        for block in &f.lf.blocks {
            for instr in &block.instrs {
                if let LInstr::LoadFImm { bits, .. } = instr {
                    float_bits.push(*bits);
                }
            }
        }
    }
    float_bits.sort_unstable();
    float_bits.dedup();
    if !float_bits.is_empty() {
        let _ = writeln!(out, "    .section .rodata");
        for bits in &float_bits {
            let _ = writeln!(out, "    .align 2");
            let _ = writeln!(out, ".Lfloat_{:08x}:", bits);
            let _ = writeln!(out, "    .word 0x{:08x}", bits);
        }
    }

    for g in &program.globals {
        emit_global(&mut out, g);
    }

    let _ = writeln!(out, "    .text");
    for f in &program.functions {
        emit_function(&mut out, f);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lir::{LBlock, LFunction, LGlobalInit, LProgram};
    use crate::regalloc::allocate_program;

    fn ret_const_function() -> LFunction {
        let mut lf = LFunction::new("answer");
        let v = lf.fresh_vreg();
        lf.blocks.push(LBlock {
            label: "entry".into(),
            instrs: vec![LInstr::LoadImm { dst: v, value: 42 }, LInstr::Ret { value: Some(v) }],
        });
        lf
    }

    #[test]
    fn emitted_text_declares_and_defines_the_function() {
        let program = LProgram { functions: vec![ret_const_function()], globals: vec![], float_pool: vec![], runtime_decls: vec![] };
        let allocated = allocate_program(program);
        let asm = emit_program(&allocated);
        assert!(asm.contains(".globl answer"));
        assert!(asm.contains("answer:"));
        assert!(asm.contains("li"));
        assert!(asm.contains("ret"));
    }

    #[test]
    fn zero_initialized_global_goes_to_bss() {
        let program = LProgram {
            functions: vec![],
            globals: vec![LGlobal { symbol: "g".into(), bytes: 16, init: LGlobalInit::Zero(16) }],
            float_pool: vec![],
            runtime_decls: vec![],
        };
        let allocated = allocate_program(program);
        let asm = emit_program(&allocated);
        assert!(asm.contains(".bss"));
        assert!(asm.contains("g:"));
        assert!(asm.contains(".zero 16"));
    }

    #[test]
    fn runtime_call_declares_extern_symbol() {
        let program = LProgram { functions: vec![], globals: vec![], float_pool: vec![], runtime_decls: vec!["getint".into()] };
        let allocated = allocate_program(program);
        let asm = emit_program(&allocated);
        assert!(asm.contains(".extern getint"));
    }

    #[test]
    fn prologue_saves_frame_pointer_before_using_it() {
        let mut lf = LFunction::new("leaf");
        let v = lf.fresh_vreg();
        lf.params.push(v);
        lf.blocks.push(LBlock { label: "entry".into(), instrs: vec![LInstr::Ret { value: Some(v) }] });
        let program = LProgram { functions: vec![lf], globals: vec![], float_pool: vec![], runtime_decls: vec![] };
        let allocated = allocate_program(program);
        let asm = emit_program(&allocated);
        let sp_line = asm.find("addi sp, sp, -").expect("prologue adjusts sp");
        let fp_line = asm.find("addi fp, sp,").expect("prologue establishes fp");
        assert!(sp_line < fp_line);
    }
}
