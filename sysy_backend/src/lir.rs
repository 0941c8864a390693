//! Backend MIR ("LIR"): the near-one-to-one rewrite of a function's MIR
//! named after §4.11. Operand *positions* are distinguished up front
//! (global, parameter, function-scoped, local, element-pointer, compare)
//! so register allocation and instruction selection never have to ask the
//! source MIR what a value was again.
//!
//! Values here are virtual registers (`VReg`), not SSA values: PHI removal
//! has already happened by the time a function reaches this shape (see
//! `phi_removal.rs`), so a `VReg` can be written more than once.

use std::fmt;

/// A virtual register, numbered densely per function. `VReg(0)` has no
/// special meaning; physical assignment happens in `regalloc.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Where a `VReg` was classified as living, per §4.11's operand-position
/// distinction. `FunctionSummaries` already tells us which globals a
/// function touches; this is the per-value version used for stack layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    /// Lives for the whole function: spans a call or a block boundary, so
    /// it gets a fixed stack slot rather than a register assignment that
    /// register pressure could otherwise reuse.
    Function,
    /// Dies within a single block; linear scan may keep it in a register
    /// its entire lifetime.
    Local,
}

/// RISC-V integer condition codes the comparison-lowering pattern produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl From<sysy_mir::CmpOp> for Cond {
    fn from(c: sysy_mir::CmpOp) -> Self {
        match c {
            sysy_mir::CmpOp::Eq => Cond::Eq,
            sysy_mir::CmpOp::Ne => Cond::Ne,
            sysy_mir::CmpOp::Lt => Cond::Lt,
            sysy_mir::CmpOp::Le => Cond::Le,
            sysy_mir::CmpOp::Gt => Cond::Gt,
            sysy_mir::CmpOp::Ge => Cond::Ge,
        }
    }
}

/// An operand to an `LInstr`: either a virtual register or an immediate
/// materialized inline where the RISC-V I-type encoding allows it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LOperand {
    Reg(VReg),
    Imm(i64),
}

/// One instruction of the lowered function. Each maps to one or a short,
/// fixed burst of RISC-V RV64GC instructions in `emit.rs`; arithmetic and
/// memory ops are kept close to the MIR operators they came from so
/// instruction selection stays a straightforward per-opcode expansion
/// rather than a pattern-matching DAG cover.
#[derive(Debug, Clone)]
pub enum LInstr {
    /// Materializes a constant integer (`li`/`lui`+`addi` as needed).
    LoadImm { dst: VReg, value: i64 },
    /// Materializes a constant float into an `f`-register via the rodata pool.
    LoadFImm { dst: VReg, bits: u32 },
    /// Loads the address of a global or a rodata/stack-adjacent label.
    LoadAddr { dst: VReg, symbol: String },
    Move { dst: VReg, src: VReg },
    IntBinary { op: sysy_mir::IntBinOp, dst: VReg, lhs: LOperand, rhs: LOperand },
    FloatBinary { op: sysy_mir::FloatBinOp, dst: VReg, lhs: VReg, rhs: VReg },
    FloatTernary { op: sysy_mir::FloatTernOp, dst: VReg, a: VReg, b: VReg, c: VReg },
    Fneg { dst: VReg, src: VReg },
    /// Integer comparison producing a 0/1 result in `dst`.
    Cmp { cond: Cond, dst: VReg, lhs: VReg, rhs: VReg },
    FCmp { cond: Cond, dst: VReg, lhs: VReg, rhs: VReg },
    Sitofp { dst: VReg, src: VReg },
    Fptosi { dst: VReg, src: VReg },
    Zext { dst: VReg, src: VReg },
    /// Address computation (from `GEP`): `dst = base + index * scale`.
    AddrOf { dst: VReg, base: VReg, index: LOperand, scale: i64 },
    Load { dst: VReg, addr: VReg, offset: i64, size: u8 },
    Store { addr: VReg, offset: i64, src: VReg, size: u8 },
    /// Address of a function-local stack slot (one per surviving `ALLOC`).
    FrameAddr { dst: VReg, slot: u32 },
    Call { callee: String, args: Vec<VReg>, ret: Option<VReg> },
    Jump { target: String },
    Branch { cond: VReg, then_label: String, else_label: String },
    Ret { value: Option<VReg> },
}

impl LInstr {
    /// Registers this instruction reads (excludes `dst`).
    pub fn uses(&self) -> Vec<VReg> {
        match self {
            LInstr::LoadImm { .. } | LInstr::LoadFImm { .. } | LInstr::LoadAddr { .. } | LInstr::Jump { .. } => Vec::new(),
            LInstr::Move { src, .. } => vec![*src],
            LInstr::IntBinary { lhs, rhs, .. } => {
                let mut v = Vec::new();
                if let LOperand::Reg(r) = lhs {
                    v.push(*r);
                }
                if let LOperand::Reg(r) = rhs {
                    v.push(*r);
                }
                v
            }
            LInstr::FloatBinary { lhs, rhs, .. } => vec![*lhs, *rhs],
            LInstr::FloatTernary { a, b, c, .. } => vec![*a, *b, *c],
            LInstr::Fneg { src, .. } => vec![*src],
            LInstr::Cmp { lhs, rhs, .. } | LInstr::FCmp { lhs, rhs, .. } => vec![*lhs, *rhs],
            LInstr::Sitofp { src, .. } | LInstr::Fptosi { src, .. } | LInstr::Zext { src, .. } => vec![*src],
            LInstr::AddrOf { base, index, .. } => {
                let mut v = vec![*base];
                if let LOperand::Reg(r) = index {
                    v.push(*r);
                }
                v
            }
            LInstr::Load { addr, .. } => vec![*addr],
            LInstr::Store { addr, src, .. } => vec![*addr, *src],
            LInstr::Call { args, .. } => args.clone(),
            LInstr::Branch { cond, .. } => vec![*cond],
            LInstr::Ret { value } => value.iter().copied().collect(),
        }
    }

    /// The register this instruction defines, if any.
    pub fn def(&self) -> Option<VReg> {
        match self {
            LInstr::LoadImm { dst, .. }
            | LInstr::LoadFImm { dst, .. }
            | LInstr::LoadAddr { dst, .. }
            | LInstr::Move { dst, .. }
            | LInstr::IntBinary { dst, .. }
            | LInstr::FloatBinary { dst, .. }
            | LInstr::FloatTernary { dst, .. }
            | LInstr::Fneg { dst, .. }
            | LInstr::Cmp { dst, .. }
            | LInstr::FCmp { dst, .. }
            | LInstr::Sitofp { dst, .. }
            | LInstr::Fptosi { dst, .. }
            | LInstr::Zext { dst, .. }
            | LInstr::AddrOf { dst, .. }
            | LInstr::Load { dst, .. } => Some(*dst),
            LInstr::Call { ret, .. } => *ret,
            LInstr::Store { .. } | LInstr::Jump { .. } | LInstr::Branch { .. } | LInstr::Ret { .. } => None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, LInstr::Jump { .. } | LInstr::Branch { .. } | LInstr::Ret { .. })
    }
}

#[derive(Debug, Clone)]
pub struct LBlock {
    pub label: String,
    pub instrs: Vec<LInstr>,
}

#[derive(Debug, Clone)]
pub struct LFunction {
    pub name: String,
    pub params: Vec<VReg>,
    pub param_storage: Vec<Storage>,
    pub blocks: Vec<LBlock>,
    pub vreg_count: u32,
    pub vreg_storage: hashbrown::HashMap<VReg, Storage>,
    pub is_leaf: bool,
    /// Byte size of each surviving `ALLOC`'s dedicated stack slot, indexed
    /// by the slot number `lower.rs` hands out (`FrameAddr::slot`).
    pub frame_slots: Vec<usize>,
    /// Registers that hold an `f32` value, recorded by `lower.rs` from the
    /// MIR type of the value each was allocated for (`LInstr` itself
    /// carries no type, so this is the only place that knows).
    pub float_vregs: hashbrown::HashSet<VReg>,
}

impl LFunction {
    pub fn new(name: impl Into<String>) -> Self {
        LFunction {
            name: name.into(),
            params: Vec::new(),
            param_storage: Vec::new(),
            blocks: Vec::new(),
            vreg_count: 0,
            vreg_storage: hashbrown::HashMap::new(),
            is_leaf: true,
            frame_slots: Vec::new(),
            float_vregs: hashbrown::HashSet::new(),
        }
    }

    pub fn fresh_vreg(&mut self) -> VReg {
        let v = VReg(self.vreg_count);
        self.vreg_count += 1;
        v
    }
}

#[derive(Debug, Clone)]
pub enum LGlobalInit {
    Zero(usize),
    Words(Vec<i64>),
}

#[derive(Debug, Clone)]
pub struct LGlobal {
    pub symbol: String,
    pub bytes: usize,
    pub init: LGlobalInit,
}

#[derive(Debug, Clone)]
pub struct LProgram {
    pub functions: Vec<LFunction>,
    pub globals: Vec<LGlobal>,
    /// `(label, f32 bit pattern)` pool for float literals that need a
    /// memory-resident constant (`flw` cannot take an immediate).
    pub float_pool: Vec<(String, u32)>,
    pub runtime_decls: Vec<String>,
}
