//! Operators and the instruction/block payloads that use them.
//!
//! Every operator in the canonical set takes its `Value`/`Block`/`Function`
//! operands positionally through [`Instr::operands`] — blocks, functions and
//! constants are themselves entries in the value arena, so `PHI`'s
//! `(block, value)` pairs and `SWITCH`'s `(const, block)` cases are just more
//! `ValueId`s at known positions instead of a separate side-table. This keeps
//! every operator a flat `(tag, operand list)` pair, matched on rather than
//! dispatched through a vtable.

use crate::value::ValueId;
use smallvec::SmallVec;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Lshr,
    Ashr,
    Smax,
    Smin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatBinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Smax,
    Smin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatTernOp {
    Fmadd,
    Fmsub,
    Fnmadd,
    Fnmsub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for IntBinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IntBinOp::Add => "add",
            IntBinOp::Sub => "sub",
            IntBinOp::Mul => "mul",
            IntBinOp::Div => "sdiv",
            IntBinOp::Mod => "srem",
            IntBinOp::And => "and",
            IntBinOp::Or => "or",
            IntBinOp::Xor => "xor",
            IntBinOp::Shl => "shl",
            IntBinOp::Lshr => "lshr",
            IntBinOp::Ashr => "ashr",
            IntBinOp::Smax => "smax",
            IntBinOp::Smin => "smin",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for FloatBinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FloatBinOp::Add => "fadd",
            FloatBinOp::Sub => "fsub",
            FloatBinOp::Mul => "fmul",
            FloatBinOp::Div => "fdiv",
            FloatBinOp::Mod => "frem",
            FloatBinOp::Smax => "fmax",
            FloatBinOp::Smin => "fmin",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for FloatTernOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FloatTernOp::Fmadd => "fmadd",
            FloatTernOp::Fmsub => "fmsub",
            FloatTernOp::Fnmadd => "fnmadd",
            FloatTernOp::Fnmsub => "fnmsub",
        };
        write!(f, "{s}")
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        };
        write!(f, "{s}")
    }
}

/// The canonical operator set. Operand positions are fixed per variant and
/// documented on each; see the module's layout comment for the block/const
/// encoding used by `PHI` and `SWITCH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    /// operands: `[]`. Pointee type is `tcx.pointee(result_ty)`.
    Alloc,
    /// operands: `[addr]`.
    Load,
    /// operands: `[addr, value]`.
    Store,
    /// operands: `[base, idx0, idx1, ...]`.
    Gep,
    /// operands: `[value]`. Target type is the instruction's own type.
    Bitcast,
    IntBinary(IntBinOp),
    FloatBinary(FloatBinOp),
    FloatTernary(FloatTernOp),
    /// operands: `[value]`.
    Fneg,
    Icmp(CmpOp),
    Fcmp(CmpOp),
    /// operands: `[value]`.
    Zext,
    /// operands: `[value]`.
    Fptosi,
    /// operands: `[value]`.
    Sitofp,
    /// operands: `[block_0, value_0, block_1, value_1, ...]`, one pair per
    /// predecessor, in the same order as the parent block's predecessor set.
    Phi,
    /// operands: `[cond, true_blk, false_blk]`.
    Branch,
    /// operands: `[target_blk]`.
    Jump,
    /// operands: `[scrutinee, default_blk, const_0, case_blk_0, ...]`.
    Switch,
    /// operands: `[]` or `[value]`.
    Ret,
    /// operands: `[callee_fn, arg_0, arg_1, ...]`.
    Call,
    /// operands: `[dest, src]`. Backend-only; introduced by PHI removal.
    Move,
}

impl Operator {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Operator::Branch | Operator::Jump | Operator::Switch | Operator::Ret
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Operator::Phi)
    }

    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            Operator::Store | Operator::Call | Operator::Branch | Operator::Jump
                | Operator::Switch | Operator::Ret
        )
    }

    pub fn mnemonic(&self) -> String {
        match self {
            Operator::Alloc => "alloc".to_string(),
            Operator::Load => "load".to_string(),
            Operator::Store => "store".to_string(),
            Operator::Gep => "gep".to_string(),
            Operator::Bitcast => "bitcast".to_string(),
            Operator::IntBinary(op) => op.to_string(),
            Operator::FloatBinary(op) => op.to_string(),
            Operator::FloatTernary(op) => op.to_string(),
            Operator::Fneg => "fneg".to_string(),
            Operator::Icmp(op) => format!("icmp.{op}"),
            Operator::Fcmp(op) => format!("fcmp.{op}"),
            Operator::Zext => "zext".to_string(),
            Operator::Fptosi => "fptosi".to_string(),
            Operator::Sitofp => "sitofp".to_string(),
            Operator::Phi => "phi".to_string(),
            Operator::Branch => "br".to_string(),
            Operator::Jump => "jmp".to_string(),
            Operator::Switch => "switch".to_string(),
            Operator::Ret => "ret".to_string(),
            Operator::Call => "call".to_string(),
            Operator::Move => "move".to_string(),
        }
    }
}

/// An instruction: an [`Operator`] tag plus its ordered operand list. The
/// result's name and type live one level up, on the owning [`crate::value::ValueData`].
#[derive(Debug, Clone)]
pub struct Instr {
    pub operator: Operator,
    pub operands: SmallVec<[ValueId; 4]>,
    pub parent: Option<ValueId>,
}

impl Instr {
    pub fn new(operator: Operator, operands: SmallVec<[ValueId; 4]>) -> Self {
        Instr {
            operator,
            operands,
            parent: None,
        }
    }

    /// `PHI`'s `(block, value)` pairs, read off the interleaved operand list.
    pub fn phi_incoming(&self) -> impl Iterator<Item = (ValueId, ValueId)> + '_ {
        assert!(self.operator.is_phi());
        self.operands.chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }

    /// `SWITCH`'s `(const, block)` cases, read off the operand list
    /// (positions 2.. after `scrutinee, default_blk`).
    pub fn switch_cases(&self) -> impl Iterator<Item = (ValueId, ValueId)> + '_ {
        assert!(matches!(self.operator, Operator::Switch));
        self.operands[2..].chunks_exact(2).map(|pair| (pair[0], pair[1]))
    }
}

/// A block's payload: its ordered instruction list (by `ValueId`, terminator
/// last) and the function that owns it. Predecessor/successor sets are
/// never stored here; they are derived by CFG analysis from terminators and
/// phi incoming-edges.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub instrs: Vec<ValueId>,
    pub parent: Option<ValueId>,
    /// Soft tombstone set by a transform pass; a follow-up sweep drops the
    /// block from its function's block list and compacts references.
    pub deleted: bool,
}

impl BlockData {
    pub fn new() -> Self {
        BlockData {
            instrs: Vec::new(),
            parent: None,
            deleted: false,
        }
    }

    pub fn terminator(&self) -> Option<ValueId> {
        self.instrs.last().copied()
    }
}
