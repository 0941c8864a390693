//! Function payload: argument list, block list, and the defined-vs-runtime
//! distinction.
//!
//! A `Function` is itself a `Value` (its users are the `CALL` instructions
//! that reference it), so `FunctionData` is just another [`crate::value::ValueKind`]
//! payload rather than a separate top-level entity; `Module` still keeps a
//! flat list of function `ValueId`s for iteration order and call-graph
//! construction.

use crate::types::Type;
use crate::value::ValueId;

/// The fixed set of external runtime entry points a SysY program may call.
/// Declared with a known signature; never given a block list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    GetInt,
    PutInt,
    GetCh,
    PutCh,
    GetFloat,
    PutFloat,
    GetArray,
    PutArray,
    GetFArray,
    PutFArray,
    PutF,
    StartTime,
    StopTime,
    MemSet,
}

impl RuntimeFn {
    pub fn name(self) -> &'static str {
        match self {
            RuntimeFn::GetInt => "getint",
            RuntimeFn::PutInt => "putint",
            RuntimeFn::GetCh => "getch",
            RuntimeFn::PutCh => "putch",
            RuntimeFn::GetFloat => "getfloat",
            RuntimeFn::PutFloat => "putfloat",
            RuntimeFn::GetArray => "getarray",
            RuntimeFn::PutArray => "putarray",
            RuntimeFn::GetFArray => "getfarray",
            RuntimeFn::PutFArray => "putfarray",
            RuntimeFn::PutF => "putf",
            RuntimeFn::StartTime => "_sysy_starttime",
            RuntimeFn::StopTime => "_sysy_stoptime",
            RuntimeFn::MemSet => "memset",
        }
    }

    pub const ALL: [RuntimeFn; 14] = [
        RuntimeFn::GetInt,
        RuntimeFn::PutInt,
        RuntimeFn::GetCh,
        RuntimeFn::PutCh,
        RuntimeFn::GetFloat,
        RuntimeFn::PutFloat,
        RuntimeFn::GetArray,
        RuntimeFn::PutArray,
        RuntimeFn::GetFArray,
        RuntimeFn::PutFArray,
        RuntimeFn::PutF,
        RuntimeFn::StartTime,
        RuntimeFn::StopTime,
        RuntimeFn::MemSet,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Whether a function owns blocks or is a declared external.
#[derive(Debug, Clone)]
pub enum FunctionBody {
    Defined { blocks: Vec<ValueId> },
    Runtime(RuntimeFn),
}

#[derive(Debug, Clone)]
pub struct FunctionData {
    pub params: Vec<ValueId>,
    pub ret_ty: Type,
    pub body: FunctionBody,
}

impl FunctionData {
    pub fn defined(params: Vec<ValueId>, ret_ty: Type) -> Self {
        FunctionData {
            params,
            ret_ty,
            body: FunctionBody::Defined { blocks: Vec::new() },
        }
    }

    pub fn runtime(params: Vec<ValueId>, ret_ty: Type, which: RuntimeFn) -> Self {
        FunctionData {
            params,
            ret_ty,
            body: FunctionBody::Runtime(which),
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self.body, FunctionBody::Defined { .. })
    }

    pub fn blocks(&self) -> &[ValueId] {
        match &self.body {
            FunctionBody::Defined { blocks } => blocks,
            FunctionBody::Runtime(_) => &[],
        }
    }

    pub fn blocks_mut(&mut self) -> Option<&mut Vec<ValueId>> {
        match &mut self.body {
            FunctionBody::Defined { blocks } => Some(blocks),
            FunctionBody::Runtime(_) => None,
        }
    }

    pub fn entry_block(&self) -> Option<ValueId> {
        self.blocks().first().copied()
    }
}
