//! Construction API for the MIR: one factory method per operator, each of
//! which allocates the instruction, registers operand uses, and appends it
//! at the builder's current insertion point.
//!
//! This is the seam the (external) AST-to-MIR lowering builds against, and
//! the API passes use when they need to synthesize new instructions rather
//! than just rewrite existing ones. It never bypasses `Module`'s use-def
//! bookkeeping: every method below is a thin wrapper over
//! [`Module::create_instr`] plus [`Module::set_block`].

use crate::instruction::{CmpOp, FloatBinOp, FloatTernOp, IntBinOp, Operator};
use crate::module::Module;
use crate::types::{Const, Type};
use crate::value::ValueId;
use smallvec::{smallvec, SmallVec};

pub struct Builder<'m> {
    pub module: &'m mut Module,
    insert_block: Option<ValueId>,
}

impl<'m> Builder<'m> {
    pub fn new(module: &'m mut Module) -> Self {
        Builder {
            module,
            insert_block: None,
        }
    }

    pub fn set_insert_point(&mut self, block: ValueId) {
        self.insert_block = Some(block);
    }

    pub fn insert_point(&self) -> Option<ValueId> {
        self.insert_block
    }

    fn emit(&mut self, name: impl Into<String>, ty: Type, operator: Operator, operands: SmallVec<[ValueId; 4]>) -> ValueId {
        let id = self.module.create_instr(name, ty, operator, operands);
        self.module.set_block(id, self.insert_block, true);
        id
    }

    fn fresh(&mut self) -> String {
        self.module.fresh_name()
    }

    pub fn alloc(&mut self, pointee: Type) -> ValueId {
        let ty = self.module.tcx.pointer(pointee);
        let name = self.fresh();
        self.emit(name, ty, Operator::Alloc, SmallVec::new())
    }

    pub fn load(&mut self, addr: ValueId) -> ValueId {
        let pointee = self
            .module
            .tcx
            .pointee(self.module.type_of(addr))
            .expect("load address must be a pointer");
        let name = self.fresh();
        self.emit(name, pointee, Operator::Load, smallvec![addr])
    }

    pub fn store(&mut self, addr: ValueId, value: ValueId) -> ValueId {
        let void = self.module.tcx.void;
        self.emit("", void, Operator::Store, smallvec![addr, value])
    }

    /// `base` indexed by `indices` (i32-typed). Result type is a pointer to
    /// whatever the index chain resolves to.
    pub fn gep(&mut self, base: ValueId, indices: &[ValueId], result_ty: Type) -> ValueId {
        let mut operands: SmallVec<[ValueId; 4]> = smallvec![base];
        operands.extend(indices.iter().copied());
        let name = self.fresh();
        self.emit(name, result_ty, Operator::Gep, operands)
    }

    pub fn bitcast(&mut self, value: ValueId, to_type: Type) -> ValueId {
        let name = self.fresh();
        self.emit(name, to_type, Operator::Bitcast, smallvec![value])
    }

    pub fn int_binary(&mut self, op: IntBinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.module.type_of(lhs);
        let name = self.fresh();
        self.emit(name, ty, Operator::IntBinary(op), smallvec![lhs, rhs])
    }

    pub fn float_binary(&mut self, op: FloatBinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let ty = self.module.type_of(lhs);
        let name = self.fresh();
        self.emit(name, ty, Operator::FloatBinary(op), smallvec![lhs, rhs])
    }

    pub fn float_ternary(&mut self, op: FloatTernOp, x: ValueId, y: ValueId, z: ValueId) -> ValueId {
        let ty = self.module.type_of(x);
        let name = self.fresh();
        self.emit(name, ty, Operator::FloatTernary(op), smallvec![x, y, z])
    }

    pub fn fneg(&mut self, value: ValueId) -> ValueId {
        let ty = self.module.type_of(value);
        let name = self.fresh();
        self.emit(name, ty, Operator::Fneg, smallvec![value])
    }

    pub fn icmp(&mut self, op: CmpOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let i1 = self.module.tcx.i1;
        let name = self.fresh();
        self.emit(name, i1, Operator::Icmp(op), smallvec![lhs, rhs])
    }

    pub fn fcmp(&mut self, op: CmpOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        let i1 = self.module.tcx.i1;
        let name = self.fresh();
        self.emit(name, i1, Operator::Fcmp(op), smallvec![lhs, rhs])
    }

    pub fn zext(&mut self, value: ValueId, to_type: Type) -> ValueId {
        let name = self.fresh();
        self.emit(name, to_type, Operator::Zext, smallvec![value])
    }

    pub fn fptosi(&mut self, value: ValueId, to_type: Type) -> ValueId {
        let name = self.fresh();
        self.emit(name, to_type, Operator::Fptosi, smallvec![value])
    }

    pub fn sitofp(&mut self, value: ValueId, to_type: Type) -> ValueId {
        let name = self.fresh();
        self.emit(name, to_type, Operator::Sitofp, smallvec![value])
    }

    /// Creates an empty `PHI` with no incoming edges yet; callers append
    /// `(block, value)` pairs with [`Builder::add_incoming`] once every
    /// predecessor's value is known.
    pub fn phi(&mut self, ty: Type) -> ValueId {
        let name = self.fresh();
        self.emit(name, ty, Operator::Phi, SmallVec::new())
    }

    pub fn add_incoming(&mut self, phi: ValueId, block: ValueId, value: ValueId) {
        let id = phi;
        for &operand in &[block, value] {
            self.module.value_mut(operand).add_user(id);
        }
        let data = self.module.value_mut(id).kind.as_instr_mut().expect("not a phi");
        data.operands.push(block);
        data.operands.push(value);
    }

    pub fn branch(&mut self, cond: ValueId, true_blk: ValueId, false_blk: ValueId) -> ValueId {
        let void = self.module.tcx.void;
        self.emit("", void, Operator::Branch, smallvec![cond, true_blk, false_blk])
    }

    pub fn jump(&mut self, target: ValueId) -> ValueId {
        let void = self.module.tcx.void;
        self.emit("", void, Operator::Jump, smallvec![target])
    }

    pub fn switch(&mut self, scrutinee: ValueId, default_blk: ValueId, cases: &[(Const, ValueId)]) -> ValueId {
        let void = self.module.tcx.void;
        let mut operands: SmallVec<[ValueId; 4]> = smallvec![scrutinee, default_blk];
        for &(c, blk) in cases {
            let cv = self.module.make_const(c);
            operands.push(cv);
            operands.push(blk);
        }
        self.emit("", void, Operator::Switch, operands)
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> ValueId {
        let void = self.module.tcx.void;
        let operands: SmallVec<[ValueId; 4]> = value.into_iter().collect();
        self.emit("", void, Operator::Ret, operands)
    }

    pub fn call(&mut self, callee: ValueId, args: &[ValueId]) -> ValueId {
        let ret_ty = self
            .module
            .value(callee)
            .kind
            .as_function()
            .expect("call target must be a function")
            .ret_ty;
        let mut operands: SmallVec<[ValueId; 4]> = smallvec![callee];
        operands.extend(args.iter().copied());
        let name = self.fresh();
        if let Some(which) = self
            .module
            .value(callee)
            .kind
            .as_function()
            .and_then(|f| match &f.body {
                crate::function::FunctionBody::Runtime(r) => Some(*r),
                _ => None,
            })
        {
            self.module.mark_runtime_used(which);
        }
        self.emit(name, ret_ty, Operator::Call, operands)
    }

    pub fn move_(&mut self, dest: ValueId, src: ValueId) -> ValueId {
        let void = self.module.tcx.void;
        self.emit("", void, Operator::Move, smallvec![dest, src])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Module;

    #[test]
    fn builder_emits_into_insertion_point() {
        let mut module = Module::new("m");
        let i32_ty = module.tcx.i32;
        let f = module.add_function("f", &[], i32_ty);
        let entry = module.add_block(f, "entry");
        let mut b = Builder::new(&mut module);
        b.set_insert_point(entry);
        let c1 = b.module.make_const(Const::Int(1));
        let c2 = b.module.make_const(Const::Int(2));
        let sum = b.int_binary(IntBinOp::Add, c1, c2);
        b.ret(Some(sum));
        let blk_instrs = module.value(entry).kind.as_block().unwrap().instrs.clone();
        assert_eq!(blk_instrs.len(), 2);
        assert!(module.value(*blk_instrs.last().unwrap()).kind.as_instr().unwrap().operator.is_terminator());
    }
}
