//! Deterministic text emission for a [`Module`].
//!
//! The grammar is the one `parser.rs` reads back; `emit(parse(emit(m))) ==
//! emit(m)` is one of the testable properties this pair exists to satisfy.
//! Operand references are printed by kind: constants as literals, globals
//! and functions as `@name`, blocks as `^name`, everything else (arguments,
//! instruction results) as `%name`.

use crate::function::FunctionBody;
use crate::instruction::Operator;
use crate::module::Module;
use crate::types::{Const, Type, TypeKind};
use crate::value::{Initializer, ValueId, ValueKind};
use std::fmt::Write;

pub fn print_type(tcx: &crate::types::TypeContext, ty: Type) -> String {
    tcx.display(ty)
}

fn print_operand(m: &Module, id: ValueId) -> String {
    let data = m.value(id);
    match &data.kind {
        ValueKind::Const(c) => print_const(c),
        ValueKind::Global(_) => format!("@{}", data.name),
        ValueKind::Function(_) => format!("@{}", data.name),
        ValueKind::Block(_) => format!("^{}", data.name),
        ValueKind::Argument(_) | ValueKind::Instr(_) => format!("%{}", data.name),
    }
}

fn print_const(c: &Const) -> String {
    match c {
        Const::Bool(b) => b.to_string(),
        Const::Int(i) => i.to_string(),
        Const::Double(d) => format!("{d:?}"),
    }
}

fn print_initializer(init: &Initializer) -> String {
    match init {
        Initializer::Zero => "zeroinit".to_string(),
        Initializer::Const(c) => print_const(c),
        Initializer::Array(items) => {
            let inner: Vec<String> = items.iter().map(print_initializer).collect();
            format!("[{}]", inner.join(", "))
        }
    }
}

fn print_operands(m: &Module, ids: &[ValueId]) -> String {
    ids.iter().map(|&id| print_operand(m, id)).collect::<Vec<_>>().join(", ")
}

fn print_instr(m: &Module, id: ValueId, out: &mut String) {
    let data = m.value(id);
    let instr = data.kind.as_instr().expect("not an instruction");
    let ty = print_type(&m.tcx, data.ty);
    let dest = if m.tcx.is_void(data.ty) {
        String::new()
    } else {
        format!("%{} = ", data.name)
    };
    let ops = &instr.operands;
    let line = match &instr.operator {
        Operator::Alloc => {
            let pointee = m.tcx.pointee(data.ty).expect("alloc result must be a pointer");
            format!("{dest}alloca {}", print_type(&m.tcx, pointee))
        }
        Operator::Load => format!("{dest}load {ty}, {}", print_operand(m, ops[0])),
        Operator::Store => format!(
            "store {}, {}",
            print_operand(m, ops[1]),
            print_operand(m, ops[0])
        ),
        Operator::Gep => format!("{dest}gep {ty} {}", print_operands(m, ops)),
        Operator::Bitcast => format!("{dest}bitcast {} to {ty}", print_operand(m, ops[0])),
        Operator::IntBinary(op) => format!(
            "{dest}{op} {ty} {}, {}",
            print_operand(m, ops[0]),
            print_operand(m, ops[1])
        ),
        Operator::FloatBinary(op) => format!(
            "{dest}{op} {ty} {}, {}",
            print_operand(m, ops[0]),
            print_operand(m, ops[1])
        ),
        Operator::FloatTernary(op) => format!(
            "{dest}{op} {ty} {}, {}, {}",
            print_operand(m, ops[0]),
            print_operand(m, ops[1]),
            print_operand(m, ops[2])
        ),
        Operator::Fneg => format!("{dest}fneg {ty} {}", print_operand(m, ops[0])),
        Operator::Icmp(op) => format!(
            "{dest}icmp.{op} {ty} {}, {}",
            print_operand(m, ops[0]),
            print_operand(m, ops[1])
        ),
        Operator::Fcmp(op) => format!(
            "{dest}fcmp.{op} {ty} {}, {}",
            print_operand(m, ops[0]),
            print_operand(m, ops[1])
        ),
        Operator::Zext => format!("{dest}zext {} to {ty}", print_operand(m, ops[0])),
        Operator::Fptosi => format!("{dest}fptosi {} to {ty}", print_operand(m, ops[0])),
        Operator::Sitofp => format!("{dest}sitofp {} to {ty}", print_operand(m, ops[0])),
        Operator::Phi => {
            let pairs: Vec<String> = instr
                .phi_incoming()
                .map(|(b, v)| format!("[{}, {}]", print_operand(m, b), print_operand(m, v)))
                .collect();
            format!("{dest}phi {ty} {}", pairs.join(", "))
        }
        Operator::Branch => format!(
            "br {}, {}, {}",
            print_operand(m, ops[0]),
            print_operand(m, ops[1]),
            print_operand(m, ops[2])
        ),
        Operator::Jump => format!("jmp {}", print_operand(m, ops[0])),
        Operator::Switch => {
            let cases: String = instr
                .switch_cases()
                .map(|(c, b)| format!(", [{}, {}]", print_operand(m, c), print_operand(m, b)))
                .collect();
            format!(
                "switch {}, {}{}",
                print_operand(m, ops[0]),
                print_operand(m, ops[1]),
                cases
            )
        }
        Operator::Ret => {
            if ops.is_empty() {
                "ret void".to_string()
            } else {
                let val_ty = print_type(&m.tcx, m.type_of(ops[0]));
                format!("ret {val_ty} {}", print_operand(m, ops[0]))
            }
        }
        Operator::Call => {
            let callee = print_operand(m, ops[0]);
            let args = print_operands(m, &ops[1..]);
            format!("{dest}call {ty} {callee}({args})")
        }
        Operator::Move => format!("move {}, {}", print_operand(m, ops[0]), print_operand(m, ops[1])),
    };
    out.push_str("    ");
    out.push_str(&line);
    out.push('\n');
}

fn print_function(m: &Module, f: ValueId, out: &mut String) {
    let data = m.value(f);
    let fdata = data.kind.as_function().expect("not a function");
    let params: Vec<String> = fdata
        .params
        .iter()
        .map(|&p| format!("%{}: {}", m.name_of(p), print_type(&m.tcx, m.type_of(p))))
        .collect();
    let ret_ty = print_type(&m.tcx, fdata.ret_ty);

    match &fdata.body {
        FunctionBody::Runtime(_) => {
            let _ = writeln!(out, "extern fn @{}({}) -> {}", data.name, params.join(", "), ret_ty);
        }
        FunctionBody::Defined { blocks } => {
            let _ = writeln!(out, "fn @{}({}) -> {} {{", data.name, params.join(", "), ret_ty);
            for &block in blocks {
                let blk = m.value(block);
                let _ = writeln!(out, "  ^{}:", blk.name);
                let instrs = blk.kind.as_block().expect("not a block").instrs.clone();
                for instr in instrs {
                    print_instr(m, instr, out);
                }
            }
            out.push_str("}\n");
        }
    }
}

/// Emits `m` as the crate's MIR text format.
pub fn print_module(m: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; module {}", m.name);

    for &g in &m.globals {
        let data = m.value(g);
        let pointee = m.tcx.pointee(data.ty).expect("global must be a pointer");
        if let ValueKind::Global(g) = &data.kind {
            let _ = writeln!(
                out,
                "global @{} : {} = {}{}",
                data.name,
                print_type(&m.tcx, pointee),
                print_initializer(&g.initializer),
                if g.is_mutable { "" } else { ", const" }
            );
        }
    }
    if !m.globals.is_empty() {
        out.push('\n');
    }

    for (i, &f) in m.functions.iter().enumerate() {
        print_function(m, f, &mut out);
        if i + 1 < m.functions.len() {
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::Builder;
    use crate::instruction::IntBinOp;
    use crate::types::Const;

    #[test]
    fn prints_constant_fold_candidate() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = Builder::new(&mut m);
        b.set_insert_point(entry);
        let c3 = b.module.make_const(Const::Int(3));
        let c4 = b.module.make_const(Const::Int(4));
        let sum = b.int_binary(IntBinOp::Add, c3, c4);
        b.ret(Some(sum));
        let text = print_module(&m);
        assert!(text.contains("add i32 3, 4"));
        assert!(text.contains("ret i32"));
    }
}
