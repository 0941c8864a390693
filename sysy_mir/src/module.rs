//! The `Module`: owns the value arena and every graph-mutating operation
//! that keeps the bidirectional use-def relation consistent.
//!
//! At most one `Module` is ever live for a compilation (per the data model),
//! so it is also where types are interned (`tcx`) and where constants are
//! deduplicated by value. Every other part of the crate — the builder, the
//! passes, the backend lowering — goes through the handful of methods here
//! rather than touching `ValueData`/`Instr` fields directly, so the
//! use-list invariant in §3 only has one place it can be broken.

use crate::function::{FunctionBody, FunctionData, RuntimeFn};
use crate::instruction::{BlockData, Instr, Operator};
use crate::types::{Const, Type, TypeContext};
use crate::value::{ArgumentData, GlobalData, Initializer, ValueData, ValueId, ValueKind};
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstKey {
    Bool(bool),
    Int(i32),
    Double(u64),
}

impl From<Const> for ConstKey {
    fn from(c: Const) -> Self {
        match c {
            Const::Bool(b) => ConstKey::Bool(b),
            Const::Int(i) => ConstKey::Int(i),
            Const::Double(d) => ConstKey::Double(d.to_bits()),
        }
    }
}

pub struct Module {
    pub name: String,
    pub tcx: TypeContext,
    values: Vec<ValueData>,
    const_cache: HashMap<ConstKey, ValueId>,
    pub globals: Vec<ValueId>,
    pub functions: Vec<ValueId>,
    pub const_strings: Vec<String>,
    pub main_fn: Option<ValueId>,
    used_runtime_fns: BTreeSet<RuntimeFn>,
    anon_counter: u32,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            tcx: TypeContext::new(),
            values: Vec::new(),
            const_cache: HashMap::new(),
            globals: Vec::new(),
            functions: Vec::new(),
            const_strings: Vec::new(),
            main_fn: None,
            used_runtime_fns: BTreeSet::new(),
            anon_counter: 0,
        }
    }

    fn alloc(&mut self, name: impl Into<String>, ty: Type, kind: ValueKind) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ValueData::new(name, ty, kind));
        id
    }

    pub fn fresh_name(&mut self) -> String {
        let n = self.anon_counter;
        self.anon_counter += 1;
        format!("t{n}")
    }

    pub fn value(&self, id: ValueId) -> &ValueData {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut ValueData {
        &mut self.values[id.index()]
    }

    pub fn users(&self, id: ValueId) -> &[ValueId] {
        self.value(id).users()
    }

    pub fn get_operands(&self, id: ValueId) -> &[ValueId] {
        self.value(id).kind.operands()
    }

    // ---- constants --------------------------------------------------

    /// Constants are globally interned on value: two requests for the same
    /// `Const` return the same `ValueId`.
    pub fn make_const(&mut self, c: Const) -> ValueId {
        let key = ConstKey::from(c);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let ty = c.type_of(&self.tcx);
        let id = self.alloc("", ty, ValueKind::Const(c));
        self.const_cache.insert(key, id);
        id
    }

    // ---- globals ------------------------------------------------------

    pub fn add_global(
        &mut self,
        name: impl Into<String>,
        pointee: Type,
        is_mutable: bool,
        initializer: Initializer,
    ) -> ValueId {
        let ptr_ty = self.tcx.pointer(pointee);
        let id = self.alloc(name, ptr_ty, ValueKind::Global(GlobalData { is_mutable, initializer }));
        self.globals.push(id);
        id
    }

    // ---- functions ------------------------------------------------------

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        param_types: &[Type],
        ret_ty: Type,
    ) -> ValueId {
        // Reserve the function's own slot first so arguments can record it
        // as `owner` immediately; the params list is patched in afterward.
        let id = self.alloc(name, ret_ty, ValueKind::Function(FunctionData::defined(Vec::new(), ret_ty)));
        let params: Vec<ValueId> = param_types
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                self.alloc(
                    format!("arg{i}"),
                    t,
                    ValueKind::Argument(ArgumentData { index: i, owner: Some(id) }),
                )
            })
            .collect();
        self.value_mut(id).kind.as_function_mut().expect("not a function").params = params;
        self.functions.push(id);
        id
    }

    pub fn add_runtime_function(&mut self, which: RuntimeFn, param_types: &[Type], ret_ty: Type) -> ValueId {
        let id = self.alloc(
            which.name(),
            ret_ty,
            ValueKind::Function(FunctionData::runtime(Vec::new(), ret_ty, which)),
        );
        let params: Vec<ValueId> = param_types
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                self.alloc(
                    format!("arg{i}"),
                    t,
                    ValueKind::Argument(ArgumentData { index: i, owner: Some(id) }),
                )
            })
            .collect();
        self.value_mut(id).kind.as_function_mut().expect("not a function").params = params;
        self.functions.push(id);
        id
    }

    pub fn mark_runtime_used(&mut self, which: RuntimeFn) {
        self.used_runtime_fns.insert(which);
    }

    pub fn used_runtime_fns(&self) -> impl Iterator<Item = RuntimeFn> + '_ {
        self.used_runtime_fns.iter().copied()
    }

    pub fn function_params(&self, f: ValueId) -> &[ValueId] {
        &self.value(f).kind.as_function().expect("not a function").params
    }

    pub fn function_blocks(&self, f: ValueId) -> &[ValueId] {
        self.value(f).kind.as_function().expect("not a function").blocks()
    }

    /// Replaces `f`'s block order wholesale. Used by block-positioning to
    /// reorder the layout without touching any block's contents.
    pub fn set_function_blocks(&mut self, f: ValueId, blocks: Vec<ValueId>) {
        let func = self.value_mut(f).kind.as_function_mut().expect("not a function");
        *func.blocks_mut().expect("cannot reorder a runtime function's blocks") = blocks;
    }

    /// Drops the parameters at `positions` from `f`'s signature. Callers
    /// must already have removed the matching argument at every call site.
    pub fn remove_params(&mut self, f: ValueId, positions: &[usize]) {
        let func = self.value_mut(f).kind.as_function_mut().expect("not a function");
        let mut kept = Vec::with_capacity(func.params.len());
        for (i, &p) in func.params.iter().enumerate() {
            if !positions.contains(&i) {
                kept.push(p);
            }
        }
        func.params = kept;
    }

    /// Rewrites `f`'s return type to `void`. Callers must have already
    /// rewritten every `ret` in the body to return nothing.
    pub fn set_function_ret_void(&mut self, f: ValueId) {
        let void = self.tcx.void;
        let func = self.value_mut(f).kind.as_function_mut().expect("not a function");
        func.ret_ty = void;
    }

    // ---- blocks ---------------------------------------------------------

    /// Creates a new block and appends it to `function`'s block list.
    pub fn add_block(&mut self, function: ValueId, name: impl Into<String>) -> ValueId {
        let label_ty = self.tcx.label;
        let mut data = BlockData::new();
        data.parent = Some(function);
        let id = self.alloc(name, label_ty, ValueKind::Block(data));
        let func = self
            .value_mut(function)
            .kind
            .as_function_mut()
            .expect("not a function");
        func.blocks_mut()
            .expect("cannot add a block to a runtime function")
            .push(id);
        id
    }

    /// `PHI` instructions, if any, read off the contiguous prefix of `block`.
    pub fn get_phis(&self, block: ValueId) -> Vec<ValueId> {
        let blk = self.value(block).kind.as_block().expect("not a block");
        blk.instrs
            .iter()
            .copied()
            .take_while(|&i| self.is_phi(i))
            .collect()
    }

    fn is_phi(&self, id: ValueId) -> bool {
        self.value(id)
            .kind
            .as_instr()
            .map(|i| i.operator.is_phi())
            .unwrap_or(false)
    }

    // ---- instruction construction ----------------------------------------

    /// Allocates an instruction `Value`, registers it as a user of every
    /// operand, and leaves it unattached to any block (the caller appends
    /// via [`Module::set_block`], or constructs through `builder.rs`).
    pub fn create_instr(
        &mut self,
        name: impl Into<String>,
        ty: Type,
        operator: Operator,
        operands: SmallVec<[ValueId; 4]>,
    ) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        for &operand in &operands {
            self.value_mut(operand).add_user(id);
        }
        self.values
            .push(ValueData::new(name, ty, ValueKind::Instr(Instr::new(operator, operands))));
        id
    }

    /// Sets an instruction's parent block; when `append` is true also pushes
    /// it onto the block's instruction list (used by passes relocating
    /// instructions rather than constructing them fresh).
    pub fn set_block(&mut self, instr: ValueId, block: Option<ValueId>, append: bool) {
        {
            let data = self.value_mut(instr).kind.as_instr_mut().expect("not an instruction");
            data.parent = block;
        }
        if append {
            if let Some(b) = block {
                let blk = self.value_mut(b).kind.as_block_mut().expect("not a block");
                blk.instrs.push(instr);
            }
        }
    }

    /// Replaces a placeholder instruction's operator/type/operands in place,
    /// unhooking it from its old operands (if any) and registering it as a
    /// user of the new ones. Used by the text parser to resolve forward
    /// references: every instruction name is registered up front as an
    /// operand-less placeholder, then filled in once every name in the
    /// function is known.
    pub fn redefine_instr(&mut self, id: ValueId, ty: Type, operator: Operator, operands: SmallVec<[ValueId; 4]>) {
        self.clear_operands(id);
        for &operand in &operands {
            self.value_mut(operand).add_user(id);
        }
        let data = self.value_mut(id);
        data.ty = ty;
        let instr = data.kind.as_instr_mut().expect("not an instruction");
        instr.operator = operator;
        instr.operands = operands;
    }

    // ---- use-def rewrites -------------------------------------------------

    /// Replaces every use of `old` with `new` (replace-all-uses-with): walks
    /// a locked snapshot of `old`'s user list, rewrites each user's operand
    /// slots, and transfers the registration to `new`.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let users: Vec<ValueId> = self.value(old).users().to_vec();
        for user in users {
            let mut replaced = 0usize;
            {
                let data = self.value_mut(user);
                for slot in data.kind.operands_mut() {
                    if *slot == old {
                        *slot = new;
                        replaced += 1;
                    }
                }
            }
            for _ in 0..replaced {
                self.value_mut(old).remove_user_once(user);
                self.value_mut(new).add_user(user);
            }
        }
    }

    /// Rewrites a single operand slot on `user` from `old` to `new`, without
    /// touching `old`'s other users.
    pub fn modify_operand(&mut self, user: ValueId, old: ValueId, new: ValueId) {
        let mut replaced = 0usize;
        {
            let data = self.value_mut(user);
            for slot in data.kind.operands_mut() {
                if *slot == old {
                    *slot = new;
                    replaced += 1;
                }
            }
        }
        for _ in 0..replaced {
            self.value_mut(old).remove_user_once(user);
            self.value_mut(new).add_user(user);
        }
    }

    /// Rewrites a terminator's destination block.
    pub fn modify_successor(&mut self, block: ValueId, old_succ: ValueId, new_succ: ValueId) {
        let blk = self.value(block).kind.as_block().expect("not a block");
        if let Some(term) = blk.terminator() {
            self.modify_operand(term, old_succ, new_succ);
        }
    }

    /// Unhooks `this` from the graph: for every operand, removes `this` from
    /// that operand's user list, then empties `this`'s own operand list.
    pub fn clear_operands(&mut self, this: ValueId) {
        let operands: Vec<ValueId> = self.value(this).kind.operands().to_vec();
        for operand in operands {
            self.value_mut(operand).remove_user_once(this);
        }
        if let Some(instr) = self.value_mut(this).kind.as_instr_mut() {
            instr.operands.clear();
        }
    }

    /// Re-generates the `%n` names of a function's unnamed instructions in
    /// block order, after a pass has deleted instructions and left gaps.
    pub fn update_id(&mut self, function: ValueId) {
        let blocks = self.function_blocks(function).to_vec();
        let mut counter = 0u32;
        for block in blocks {
            let blk_instrs = self.value(block).kind.as_block().expect("not a block").instrs.clone();
            for instr in blk_instrs {
                let ty_is_void = self.tcx.is_void(self.value(instr).ty);
                let data = self.value_mut(instr);
                if !ty_is_void {
                    data.name = format!("{counter}");
                    counter += 1;
                }
            }
        }
    }

    /// Physically drops tombstoned blocks from `function`'s block list.
    pub fn sweep_deleted_blocks(&mut self, function: ValueId) {
        let keep: Vec<ValueId> = self
            .function_blocks(function)
            .iter()
            .copied()
            .filter(|&b| !self.value(b).kind.as_block().expect("not a block").deleted)
            .collect();
        let func = self.value_mut(function).kind.as_function_mut().expect("not a function");
        if let Some(blocks) = func.blocks_mut() {
            *blocks = keep;
        }
    }

    pub fn type_of(&self, id: ValueId) -> Type {
        self.value(id).ty
    }

    pub fn name_of(&self, id: ValueId) -> &str {
        &self.value(id).name
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("name", &self.name)
            .field("functions", &self.functions.len())
            .field("globals", &self.globals.len())
            .field("values", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::IntBinOp;

    fn sample_binary(module: &mut Module) -> (ValueId, ValueId, ValueId) {
        let i32_ty = module.tcx.i32;
        let a = module.make_const(Const::Int(1));
        let b = module.make_const(Const::Int(2));
        let add = module.create_instr("sum", i32_ty, Operator::IntBinary(IntBinOp::Add), SmallVec::from_slice(&[a, b]));
        (a, b, add)
    }

    #[test]
    fn constants_are_interned() {
        let mut m = Module::new("m");
        let a = m.make_const(Const::Int(7));
        let b = m.make_const(Const::Int(7));
        assert_eq!(a, b);
    }

    #[test]
    fn create_instr_registers_users() {
        let mut m = Module::new("m");
        let (a, b, add) = sample_binary(&mut m);
        assert_eq!(m.users(a), &[add]);
        assert_eq!(m.users(b), &[add]);
        assert_eq!(m.get_operands(add), &[a, b]);
    }

    #[test]
    fn replace_all_uses_with_rewrites_every_slot_and_updates_user_lists() {
        let mut m = Module::new("m");
        let (a, _b, add) = sample_binary(&mut m);
        let replacement = m.make_const(Const::Int(99));
        m.replace_all_uses_with(a, replacement);
        assert!(m.users(a).is_empty());
        assert_eq!(m.users(replacement), &[add]);
        assert_eq!(m.get_operands(add)[0], replacement);
    }

    #[test]
    fn clear_operands_unhooks_from_graph() {
        let mut m = Module::new("m");
        let (a, b, add) = sample_binary(&mut m);
        m.clear_operands(add);
        assert!(m.get_operands(add).is_empty());
        assert!(m.users(a).is_empty());
        assert!(m.users(b).is_empty());
    }

    #[test]
    fn block_phi_prefix_is_detected() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("f", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let phi = m.create_instr("p", i32_ty, Operator::Phi, SmallVec::new());
        m.set_block(phi, Some(entry), true);
        let ret_val = m.make_const(Const::Int(0));
        let void = m.tcx.void;
        let ret = m.create_instr("", void, Operator::Ret, SmallVec::from_slice(&[ret_val]));
        m.set_block(ret, Some(entry), true);
        assert_eq!(m.get_phis(entry), vec![phi]);
    }
}
