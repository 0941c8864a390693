//! The MIR's core graph: [`ValueId`], the arena handle shared by every kind
//! of value, and [`ValueData`]/[`ValueKind`], the closed sum type a `match`
//! dispatches on instead of virtual dispatch.
//!
//! Constants, global variables, arguments, instructions, blocks, and even
//! functions are all `Value`s per the data model: everything that can be an
//! operand or have users lives in one arena ([`crate::module::Module::values`])
//! addressed by `ValueId`, so replace-all-uses-with and the rest of the
//! use-def machinery in `module.rs` work uniformly over all six kinds.

use crate::function::FunctionData;
use crate::instruction::{BlockData, Instr};
use crate::types::{Const, Type};
use std::fmt;

/// Index into a [`crate::module::Module`]'s value arena. Doubles as the
/// handle for blocks and functions, since both are `Value`s too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// How a global variable's storage is initialized.
#[derive(Debug, Clone, PartialEq)]
pub enum Initializer {
    Zero,
    Const(Const),
    Array(Vec<Initializer>),
}

#[derive(Debug, Clone)]
pub struct GlobalData {
    pub is_mutable: bool,
    pub initializer: Initializer,
}

#[derive(Debug, Clone, Copy)]
pub struct ArgumentData {
    pub index: usize,
    pub owner: Option<ValueId>,
}

/// The sum type every `ValueId` resolves to. Matches the data model's six
/// value variants one to one.
pub enum ValueKind {
    Const(Const),
    Global(GlobalData),
    Argument(ArgumentData),
    Instr(Instr),
    Block(BlockData),
    Function(FunctionData),
}

impl ValueKind {
    pub fn operands(&self) -> &[ValueId] {
        match self {
            ValueKind::Instr(i) => &i.operands,
            _ => &[],
        }
    }

    pub fn operands_mut(&mut self) -> &mut [ValueId] {
        match self {
            ValueKind::Instr(i) => &mut i.operands,
            _ => &mut [],
        }
    }

    pub fn is_instr(&self) -> bool {
        matches!(self, ValueKind::Instr(_))
    }

    pub fn is_block(&self) -> bool {
        matches!(self, ValueKind::Block(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self, ValueKind::Function(_))
    }

    pub fn as_instr(&self) -> Option<&Instr> {
        match self {
            ValueKind::Instr(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_instr_mut(&mut self) -> Option<&mut Instr> {
        match self {
            ValueKind::Instr(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&BlockData> {
        match self {
            ValueKind::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BlockData> {
        match self {
            ValueKind::Block(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionData> {
        match self {
            ValueKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_function_mut(&mut self) -> Option<&mut FunctionData> {
        match self {
            ValueKind::Function(f) => Some(f),
            _ => None,
        }
    }
}

/// One slot of the value arena: a name (empty for void-typed results), a
/// type, the value's kind-specific payload, and its user list.
pub struct ValueData {
    pub name: String,
    pub ty: Type,
    pub kind: ValueKind,
    users: Vec<ValueId>,
}

impl ValueData {
    pub fn new(name: impl Into<String>, ty: Type, kind: ValueKind) -> Self {
        ValueData {
            name: name.into(),
            ty,
            kind,
            users: Vec::new(),
        }
    }

    pub fn users(&self) -> &[ValueId] {
        &self.users
    }

    /// Register `user` as referencing this value. Idempotent per distinct
    /// operand slot is the caller's responsibility: each call appends one
    /// entry, matching one operand-slot registration.
    pub(crate) fn add_user(&mut self, user: ValueId) {
        self.users.push(user);
    }

    /// Remove one registration of `user` (not all of them: a user may
    /// reference this value from more than one operand slot).
    pub(crate) fn remove_user_once(&mut self, user: ValueId) {
        if let Some(pos) = self.users.iter().position(|&u| u == user) {
            self.users.remove(pos);
        }
    }
}
