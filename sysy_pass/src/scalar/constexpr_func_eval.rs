//! ConstexprFuncEval (§6 O1 pipeline; supplementing the distilled spec's
//! pipeline per `DataFlow/ConstexprFuncEval.cpp` in `original_source/`):
//! when a `Call`'s callee has no side effects (`FunctionSummary::no_state`)
//! and every argument is already a constant, interpret the callee's body
//! directly and replace the call with the resulting constant.
//!
//! The interpreter only trusts itself on a function with no `Alloc` — by
//! the time this pass runs (after `Mem2Reg` and the array passes in the
//! O1 order) a side-effect-free function operating purely on scalars has
//! already had every local promoted to an SSA value, so this covers the
//! common case (small recursive arithmetic helpers) without having to
//! model stack memory. Anything else — an unresolved operand, a runtime
//! call, a step budget exceeded — aborts the attempt and leaves the call
//! in place.

use crate::function_analysis::ModuleSummaries;
use crate::pass::{PassManager, Transform};
use crate::scalar::const_fold::{cmp_op_to_eval, float_op_to_eval, int_op_to_eval, safe_cal_wrap};
use hashbrown::HashMap;
use sysy_common::CoreResult;
use sysy_mir::{Const, Module, Operator, ValueId};

const STEP_BUDGET: usize = 10_000;

enum Outcome {
    Returned(Option<Const>),
    Bail,
}

struct Interp<'a> {
    m: &'a Module,
    summaries: &'a ModuleSummaries,
    steps: usize,
}

impl<'a> Interp<'a> {
    fn resolve(&self, v: ValueId, env: &HashMap<ValueId, Const>) -> Option<Const> {
        if let Some(&c) = env.get(&v) {
            return Some(c);
        }
        match &self.m.value(v).kind {
            sysy_mir::ValueKind::Const(c) => Some(*c),
            _ => None,
        }
    }

    /// Evaluates one non-branching instruction's result, or `None` if the
    /// interpreter doesn't model it (memory ops) or an operand never
    /// resolved to a constant.
    fn eval_value_instr(&mut self, instr: ValueId, env: &HashMap<ValueId, Const>) -> Option<Const> {
        let data = self.m.value(instr).kind.as_instr()?.clone();
        let ops = data.operands;
        let result_is_float = self.m.tcx.is_float(self.m.type_of(instr));
        match &data.operator {
            Operator::IntBinary(op) => {
                let a = self.resolve(ops[0], env)?;
                let b = self.resolve(ops[1], env)?;
                safe_cal_wrap(a.as_eval(), b.as_eval(), int_op_to_eval(*op), result_is_float)
            }
            Operator::FloatBinary(op) => {
                let a = self.resolve(ops[0], env)?;
                let b = self.resolve(ops[1], env)?;
                safe_cal_wrap(a.as_eval(), b.as_eval(), float_op_to_eval(*op), result_is_float)
            }
            Operator::Icmp(op) | Operator::Fcmp(op) => {
                let a = self.resolve(ops[0], env)?;
                let b = self.resolve(ops[1], env)?;
                sysy_mir::safe_cal(a.as_eval(), b.as_eval(), cmp_op_to_eval(*op)).and_then(|e| e.to_const_int())
            }
            Operator::Fneg => match self.resolve(ops[0], env)? {
                Const::Double(d) => Some(Const::Double(-d)),
                _ => None,
            },
            Operator::Zext => match self.resolve(ops[0], env)? {
                Const::Bool(b) => Some(Const::Int(b as i32)),
                other => Some(other),
            },
            Operator::Fptosi => match self.resolve(ops[0], env)? {
                Const::Double(d) => Some(Const::Int(d as i32)),
                _ => None,
            },
            Operator::Sitofp => match self.resolve(ops[0], env)? {
                Const::Int(i) => Some(Const::Double(i as f64)),
                _ => None,
            },
            Operator::Bitcast => self.resolve(ops[0], env),
            Operator::Call => {
                let callee = ops[0];
                if !matches!(&self.m.value(callee).kind, sysy_mir::ValueKind::Function(f) if f.is_defined()) {
                    return None;
                }
                let summary = self.summaries.summaries.get(&callee)?;
                if !summary.no_state {
                    return None;
                }
                let args: Vec<Const> = ops[1..].iter().map(|&a| self.resolve(a, env)).collect::<Option<_>>()?;
                match self.eval_function(callee, &args) {
                    Outcome::Returned(Some(c)) => Some(c),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Interprets `f`'s body with `args` bound to its parameters. `Bail`
    /// covers everything the interpreter refuses to model: `Alloc`-backed
    /// memory, an unresolved operand, or the step budget running out.
    fn eval_function(&mut self, f: ValueId, args: &[Const]) -> Outcome {
        let params = self.m.function_params(f).to_vec();
        if params.len() != args.len() {
            return Outcome::Bail;
        }
        let mut env: HashMap<ValueId, Const> = params.into_iter().zip(args.iter().copied()).collect();
        let blocks = self.m.function_blocks(f).to_vec();
        let Some(&first) = blocks.first() else { return Outcome::Bail };

        let mut block = first;
        let mut prev_block = first;
        loop {
            let instrs = self.m.value(block).kind.as_block().expect("not a block").instrs.clone();
            let Some((&terminator, body)) = instrs.split_last() else { return Outcome::Bail };

            for &instr in body {
                self.steps += 1;
                if self.steps > STEP_BUDGET {
                    return Outcome::Bail;
                }
                let data = self.m.value(instr).kind.as_instr().expect("not an instr");
                if data.operator == Operator::Phi {
                    let incoming = data.phi_incoming().find(|&(pred, _)| pred == prev_block);
                    match incoming.and_then(|(_, v)| self.resolve(v, &env)) {
                        Some(c) => {
                            env.insert(instr, c);
                        }
                        None => return Outcome::Bail,
                    }
                    continue;
                }
                match self.eval_value_instr(instr, &env) {
                    Some(c) => {
                        env.insert(instr, c);
                    }
                    None => return Outcome::Bail,
                }
            }

            self.steps += 1;
            if self.steps > STEP_BUDGET {
                return Outcome::Bail;
            }
            let data = self.m.value(terminator).kind.as_instr().expect("not an instr").clone();
            match &data.operator {
                Operator::Ret => {
                    return match data.operands.first() {
                        Some(&v) => match self.resolve(v, &env) {
                            Some(c) => Outcome::Returned(Some(c)),
                            None => Outcome::Bail,
                        },
                        None => Outcome::Returned(None),
                    };
                }
                Operator::Jump => {
                    prev_block = block;
                    block = data.operands[0];
                }
                Operator::Branch => {
                    let Some(cond) = self.resolve(data.operands[0], &env) else { return Outcome::Bail };
                    let taken = matches!(cond, Const::Bool(true) | Const::Int(_)) && cond.as_eval() != sysy_mir::Eval::Int(0);
                    prev_block = block;
                    block = if taken { data.operands[1] } else { data.operands[2] };
                }
                Operator::Switch => {
                    let Some(scrutinee) = self.resolve(data.operands[0], &env) else { return Outcome::Bail };
                    let default = data.operands[1];
                    let mut next = default;
                    for (case_const, case_blk) in data.switch_cases() {
                        if let Some(c) = self.resolve(case_const, &env) {
                            if c == scrutinee {
                                next = case_blk;
                                break;
                            }
                        }
                    }
                    prev_block = block;
                    block = next;
                }
                _ => return Outcome::Bail,
            }
        }
    }
}

/// Folds every `Call` in `function` whose callee is side-effect-free and
/// whose arguments are all constants. Returns whether anything changed.
pub fn run_on_function(m: &mut Module, function: ValueId, summaries: &ModuleSummaries) -> bool {
    let mut changed = false;
    let blocks = m.function_blocks(function).to_vec();
    for block in blocks {
        let instrs = m.value(block).kind.as_block().expect("not a block").instrs.clone();
        for instr in instrs {
            let Some(data) = m.value(instr).kind.as_instr() else { continue };
            if data.operator != Operator::Call {
                continue;
            }
            let ops = data.operands.clone();
            let callee = ops[0];
            let is_defined = matches!(&m.value(callee).kind, sysy_mir::ValueKind::Function(f) if f.is_defined());
            if !is_defined {
                continue;
            }
            let Some(summary) = summaries.summaries.get(&callee) else { continue };
            if !summary.no_state {
                continue;
            }
            let Some(args) = ops[1..].iter().map(|&a| match &m.value(a).kind {
                sysy_mir::ValueKind::Const(c) => Some(*c),
                _ => None,
            }).collect::<Option<Vec<Const>>>() else { continue };

            let mut interp = Interp { m, summaries, steps: 0 };
            if let Outcome::Returned(Some(result)) = interp.eval_function(callee, &args) {
                let folded = m.make_const(result);
                m.replace_all_uses_with(instr, folded);
                m.clear_operands(instr);
                let blk = m.value_mut(block).kind.as_block_mut().expect("not a block");
                blk.instrs.retain(|&i| i != instr);
                changed = true;
            }
        }
    }
    changed
}

pub struct ConstexprFuncEval;

impl Transform for ConstexprFuncEval {
    fn name(&self) -> &'static str {
        "ConstexprFuncEval"
    }

    fn run(&mut self, m: &mut Module, pm: &mut PassManager) -> CoreResult<bool> {
        let summaries = pm.summaries(m);
        let mut changed = false;
        let functions = m.functions.clone();
        for f in functions {
            if !m.value(f).kind.as_function().expect("not a function").is_defined() {
                continue;
            }
            if run_on_function(m, f, &summaries) {
                changed = true;
                pm.mark_dirty(f);
                pm.invalidate_summaries();
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysy_mir::{Builder, IntBinOp};

    #[test]
    fn folds_a_call_to_a_pure_function_with_constant_args() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let add_one = m.add_function("add_one", &[i32_ty], i32_ty);
        let n = m.function_params(add_one)[0];
        let entry = m.add_block(add_one, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let one = b.module.make_const(Const::Int(1));
        let sum = b.int_binary(IntBinOp::Add, n, one);
        b.ret(Some(sum));

        let main = m.add_function("main", &[], i32_ty);
        let main_entry = m.add_block(main, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(main_entry);
        let arg = b.module.make_const(Const::Int(41));
        let call = b.call(add_one, &[arg]);
        b.ret(Some(call));

        let summaries = crate::function_analysis::build(&m);
        assert!(run_on_function(&mut m, main, &summaries));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("ret i32 42"));
    }

    #[test]
    fn recursive_factorial_of_a_small_constant_folds() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let fact = m.add_function("fact", &[i32_ty], i32_ty);
        let n = m.function_params(fact)[0];
        let entry = m.add_block(fact, "entry");
        let base = m.add_block(fact, "base");
        let rec = m.add_block(fact, "rec");

        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let zero = b.module.make_const(Const::Int(0));
        let is_zero = b.icmp(sysy_mir::CmpOp::Le, n, zero);
        b.branch(is_zero, base, rec);

        b.set_insert_point(base);
        let one = b.module.make_const(Const::Int(1));
        b.ret(Some(one));

        b.set_insert_point(rec);
        let one2 = b.module.make_const(Const::Int(1));
        let n_minus_1 = b.int_binary(IntBinOp::Sub, n, one2);
        let sub_call = b.call(fact, &[n_minus_1]);
        let result = b.int_binary(IntBinOp::Mul, n, sub_call);
        b.ret(Some(result));

        let main = m.add_function("main", &[], i32_ty);
        let main_entry = m.add_block(main, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(main_entry);
        let five = b.module.make_const(Const::Int(5));
        let call = b.call(fact, &[five]);
        b.ret(Some(call));

        let summaries = crate::function_analysis::build(&m);
        assert!(run_on_function(&mut m, main, &summaries));
        let text = sysy_mir::print_module(&m);
        assert!(text.contains("ret i32 120"));
    }

    #[test]
    fn leaves_calls_with_non_constant_arguments_alone() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let add_one = m.add_function("add_one", &[i32_ty], i32_ty);
        let n = m.function_params(add_one)[0];
        let entry = m.add_block(add_one, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let one = b.module.make_const(Const::Int(1));
        let sum = b.int_binary(IntBinOp::Add, n, one);
        b.ret(Some(sum));

        let main = m.add_function("main", &[i32_ty], i32_ty);
        let arg = m.function_params(main)[0];
        let main_entry = m.add_block(main, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(main_entry);
        let call = b.call(add_one, &[arg]);
        b.ret(Some(call));

        let summaries = crate::function_analysis::build(&m);
        assert!(!run_on_function(&mut m, main, &summaries));
    }
}
