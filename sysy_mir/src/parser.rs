//! Reads the text format [`crate::printer`] emits back into a [`Module`].
//!
//! The grammar is line-oriented: one global, one function header, one block
//! label, or one instruction per source line, so each line is tokenized
//! independently. Values are resolved in two passes per function: the first
//! walks every block and registers a placeholder instruction for each named
//! result (so every `%name` used anywhere in the function is known), and
//! the second fills in each placeholder's real operator and operands. This
//! lets a `PHI` or a branch reference a block or value that is only defined
//! later in textual order, which back-edges in loops require.

use crate::instruction::{CmpOp, FloatBinOp, FloatTernOp, IntBinOp, Operator};
use crate::module::Module;
use crate::types::{Const, Type};
use crate::value::{Initializer, ValueId};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::iter::Peekable;
use std::str::Chars;
use sysy_common::{CoreError, CoreResult};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    At(String),
    Percent(String),
    Caret(String),
    Ident(String),
    Sym(char),
    Arrow,
    Eof,
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

fn tokenize_line(line: &str) -> Vec<Tok> {
    let mut chars: Peekable<Chars> = line.chars().peekable();
    let mut toks = Vec::new();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == ';' {
            break;
        }
        if c == '@' || c == '%' || c == '^' {
            chars.next();
            let word = read_word(&mut chars);
            toks.push(match c {
                '@' => Tok::At(word),
                '%' => Tok::Percent(word),
                _ => Tok::Caret(word),
            });
            continue;
        }
        if c == '-' {
            chars.next();
            if chars.peek() == Some(&'>') {
                chars.next();
                toks.push(Tok::Arrow);
            } else {
                let mut word = String::from("-");
                word.push_str(&read_word(&mut chars));
                toks.push(Tok::Ident(word));
            }
            continue;
        }
        if is_word(c) {
            toks.push(Tok::Ident(read_word(&mut chars)));
            continue;
        }
        chars.next();
        toks.push(Tok::Sym(c));
    }
    toks.push(Tok::Eof);
    toks
}

fn read_word(chars: &mut Peekable<Chars>) -> String {
    let mut s = String::new();
    while let Some(&c) = chars.peek() {
        if is_word(c) {
            s.push(c);
            chars.next();
        } else {
            break;
        }
    }
    s
}

struct TokenStream {
    toks: Vec<Tok>,
    pos: usize,
}

impl TokenStream {
    fn new(toks: Vec<Tok>) -> Self {
        TokenStream { toks, pos: 0 }
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos]
    }

    fn next(&mut self) -> Tok {
        let t = self.toks[self.pos].clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect_sym(&mut self, c: char) -> CoreResult<()> {
        match self.next() {
            Tok::Sym(s) if s == c => Ok(()),
            other => Err(CoreError::parse(format!("expected '{c}', found {other:?}"))),
        }
    }

    fn expect_ident(&mut self, word: &str) -> CoreResult<()> {
        match self.next() {
            Tok::Ident(s) if s == word => Ok(()),
            other => Err(CoreError::parse(format!("expected '{word}', found {other:?}"))),
        }
    }

    fn expect_at(&mut self) -> CoreResult<String> {
        match self.next() {
            Tok::At(s) => Ok(s),
            other => Err(CoreError::parse(format!("expected @name, found {other:?}"))),
        }
    }

    fn expect_percent(&mut self) -> CoreResult<String> {
        match self.next() {
            Tok::Percent(s) => Ok(s),
            other => Err(CoreError::parse(format!("expected %name, found {other:?}"))),
        }
    }
}

struct GlobalScope {
    values: HashMap<String, ValueId>,
}

struct FnScope {
    values: HashMap<String, ValueId>,
    blocks: HashMap<String, ValueId>,
}

fn parse_type(ts: &mut TokenStream, m: &mut Module) -> CoreResult<Type> {
    let mut ty = match ts.next() {
        Tok::Ident(s) => match s.as_str() {
            "void" => m.tcx.void,
            "label" => m.tcx.label,
            "i1" => m.tcx.i1,
            "i8" => m.tcx.i8,
            "i32" => m.tcx.i32,
            "i64" => m.tcx.i64,
            "f32" => m.tcx.f32,
            other => return Err(CoreError::parse(format!("unknown type '{other}'"))),
        },
        Tok::Sym('[') => {
            let size = match ts.next() {
                Tok::Ident(n) => n.parse::<usize>().map_err(|e| CoreError::parse(e.to_string()))?,
                other => return Err(CoreError::parse(format!("expected array size, found {other:?}"))),
            };
            ts.expect_ident("x")?;
            let elem = parse_type(ts, m)?;
            ts.expect_sym(']')?;
            m.tcx.array(size, elem)
        }
        other => return Err(CoreError::parse(format!("expected type, found {other:?}"))),
    };
    while *ts.peek() == Tok::Sym('*') {
        ts.next();
        ty = m.tcx.pointer(ty);
    }
    Ok(ty)
}

fn parse_literal(word: &str, m: &mut Module) -> CoreResult<ValueId> {
    let c = if word == "true" {
        Const::Bool(true)
    } else if word == "false" {
        Const::Bool(false)
    } else if word.contains('.') || word.contains('e') || word.contains('E') {
        let d: f64 = word
            .parse()
            .map_err(|_| CoreError::parse(format!("bad float literal '{word}'")))?;
        Const::Double(d)
    } else {
        let i: i32 = word
            .parse()
            .map_err(|_| CoreError::parse(format!("bad int literal '{word}'")))?;
        Const::Int(i)
    };
    Ok(m.make_const(c))
}

fn resolve_operand(
    ts: &mut TokenStream,
    m: &mut Module,
    globals: &GlobalScope,
    scope: &FnScope,
) -> CoreResult<ValueId> {
    match ts.next() {
        Tok::At(name) => globals
            .values
            .get(&name)
            .copied()
            .ok_or_else(|| CoreError::parse(format!("undefined global/function @{name}"))),
        Tok::Percent(name) => scope
            .values
            .get(&name)
            .copied()
            .ok_or_else(|| CoreError::parse(format!("undefined value %{name}"))),
        Tok::Caret(name) => scope
            .blocks
            .get(&name)
            .copied()
            .ok_or_else(|| CoreError::parse(format!("undefined block ^{name}"))),
        Tok::Ident(word) => parse_literal(&word, m),
        other => Err(CoreError::parse(format!("expected operand, found {other:?}"))),
    }
}

fn int_bin_op(s: &str) -> Option<IntBinOp> {
    use IntBinOp::*;
    Some(match s {
        "add" => Add,
        "sub" => Sub,
        "mul" => Mul,
        "sdiv" => Div,
        "srem" => Mod,
        "and" => And,
        "or" => Or,
        "xor" => Xor,
        "shl" => Shl,
        "lshr" => Lshr,
        "ashr" => Ashr,
        "smax" => Smax,
        "smin" => Smin,
        _ => return None,
    })
}

fn float_bin_op(s: &str) -> Option<FloatBinOp> {
    use FloatBinOp::*;
    Some(match s {
        "fadd" => Add,
        "fsub" => Sub,
        "fmul" => Mul,
        "fdiv" => Div,
        "frem" => Mod,
        "fmax" => Smax,
        "fmin" => Smin,
        _ => return None,
    })
}

fn float_tern_op(s: &str) -> Option<FloatTernOp> {
    use FloatTernOp::*;
    Some(match s {
        "fmadd" => Fmadd,
        "fmsub" => Fmsub,
        "fnmadd" => Fnmadd,
        "fnmsub" => Fnmsub,
        _ => return None,
    })
}

fn cmp_op(s: &str) -> Option<CmpOp> {
    use CmpOp::*;
    Some(match s {
        "eq" => Eq,
        "ne" => Ne,
        "lt" => Lt,
        "le" => Le,
        "gt" => Gt,
        "ge" => Ge,
        _ => return None,
    })
}

/// Parses one instruction's operator and operands from a line's remaining
/// tokens (after any `%name =` prefix has already been consumed).
fn parse_operator(
    ts: &mut TokenStream,
    m: &mut Module,
    globals: &GlobalScope,
    scope: &FnScope,
) -> CoreResult<(Type, Operator, SmallVec<[ValueId; 4]>)> {
    let op_word = match ts.next() {
        Tok::Ident(s) => s,
        other => return Err(CoreError::parse(format!("expected opcode, found {other:?}"))),
    };

    if op_word == "alloca" {
        let pointee = parse_type(ts, m)?;
        let ty = m.tcx.pointer(pointee);
        return Ok((ty, Operator::Alloc, SmallVec::new()));
    }
    if op_word == "load" {
        let ty = parse_type(ts, m)?;
        ts.expect_sym(',')?;
        let addr = resolve_operand(ts, m, globals, scope)?;
        return Ok((ty, Operator::Load, SmallVec::from_slice(&[addr])));
    }
    if op_word == "store" {
        let value = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let addr = resolve_operand(ts, m, globals, scope)?;
        return Ok((m.tcx.void, Operator::Store, SmallVec::from_slice(&[addr, value])));
    }
    if op_word == "gep" {
        let ty = parse_type(ts, m)?;
        let mut operands = SmallVec::new();
        operands.push(resolve_operand(ts, m, globals, scope)?);
        while *ts.peek() == Tok::Sym(',') {
            ts.next();
            operands.push(resolve_operand(ts, m, globals, scope)?);
        }
        return Ok((ty, Operator::Gep, operands));
    }
    if op_word == "bitcast" {
        let value = resolve_operand(ts, m, globals, scope)?;
        ts.expect_ident("to")?;
        let ty = parse_type(ts, m)?;
        return Ok((ty, Operator::Bitcast, SmallVec::from_slice(&[value])));
    }
    if let Some(op) = int_bin_op(&op_word) {
        let ty = parse_type(ts, m)?;
        let lhs = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let rhs = resolve_operand(ts, m, globals, scope)?;
        return Ok((ty, Operator::IntBinary(op), SmallVec::from_slice(&[lhs, rhs])));
    }
    if let Some(op) = float_bin_op(&op_word) {
        let ty = parse_type(ts, m)?;
        let lhs = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let rhs = resolve_operand(ts, m, globals, scope)?;
        return Ok((ty, Operator::FloatBinary(op), SmallVec::from_slice(&[lhs, rhs])));
    }
    if let Some(op) = float_tern_op(&op_word) {
        let ty = parse_type(ts, m)?;
        let x = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let y = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let z = resolve_operand(ts, m, globals, scope)?;
        return Ok((ty, Operator::FloatTernary(op), SmallVec::from_slice(&[x, y, z])));
    }
    if op_word == "fneg" {
        let ty = parse_type(ts, m)?;
        let value = resolve_operand(ts, m, globals, scope)?;
        return Ok((ty, Operator::Fneg, SmallVec::from_slice(&[value])));
    }
    if let Some(rest) = op_word.strip_prefix("icmp.") {
        let op = cmp_op(rest).ok_or_else(|| CoreError::parse(format!("unknown icmp op '{rest}'")))?;
        let _ty = parse_type(ts, m)?;
        let lhs = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let rhs = resolve_operand(ts, m, globals, scope)?;
        return Ok((m.tcx.i1, Operator::Icmp(op), SmallVec::from_slice(&[lhs, rhs])));
    }
    if let Some(rest) = op_word.strip_prefix("fcmp.") {
        let op = cmp_op(rest).ok_or_else(|| CoreError::parse(format!("unknown fcmp op '{rest}'")))?;
        let _ty = parse_type(ts, m)?;
        let lhs = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let rhs = resolve_operand(ts, m, globals, scope)?;
        return Ok((m.tcx.i1, Operator::Fcmp(op), SmallVec::from_slice(&[lhs, rhs])));
    }
    if op_word == "zext" || op_word == "fptosi" || op_word == "sitofp" {
        let value = resolve_operand(ts, m, globals, scope)?;
        ts.expect_ident("to")?;
        let ty = parse_type(ts, m)?;
        let op = match op_word.as_str() {
            "zext" => Operator::Zext,
            "fptosi" => Operator::Fptosi,
            _ => Operator::Sitofp,
        };
        return Ok((ty, op, SmallVec::from_slice(&[value])));
    }
    if op_word == "phi" {
        let ty = parse_type(ts, m)?;
        let mut operands = SmallVec::new();
        loop {
            ts.expect_sym('[')?;
            let blk = resolve_operand(ts, m, globals, scope)?;
            ts.expect_sym(',')?;
            let val = resolve_operand(ts, m, globals, scope)?;
            ts.expect_sym(']')?;
            operands.push(blk);
            operands.push(val);
            if *ts.peek() == Tok::Sym(',') {
                ts.next();
            } else {
                break;
            }
        }
        return Ok((ty, Operator::Phi, operands));
    }
    if op_word == "br" {
        let cond = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let t = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let f = resolve_operand(ts, m, globals, scope)?;
        return Ok((m.tcx.void, Operator::Branch, SmallVec::from_slice(&[cond, t, f])));
    }
    if op_word == "jmp" {
        let target = resolve_operand(ts, m, globals, scope)?;
        return Ok((m.tcx.void, Operator::Jump, SmallVec::from_slice(&[target])));
    }
    if op_word == "switch" {
        let scrutinee = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let default = resolve_operand(ts, m, globals, scope)?;
        let mut operands: SmallVec<[ValueId; 4]> = SmallVec::from_slice(&[scrutinee, default]);
        while *ts.peek() == Tok::Sym(',') {
            ts.next();
            ts.expect_sym('[')?;
            let c = resolve_operand(ts, m, globals, scope)?;
            ts.expect_sym(',')?;
            let blk = resolve_operand(ts, m, globals, scope)?;
            ts.expect_sym(']')?;
            operands.push(c);
            operands.push(blk);
        }
        return Ok((m.tcx.void, Operator::Switch, operands));
    }
    if op_word == "ret" {
        if let Tok::Ident(w) = ts.peek() {
            if w == "void" {
                ts.next();
                return Ok((m.tcx.void, Operator::Ret, SmallVec::new()));
            }
        }
        let _ty = parse_type(ts, m)?;
        let value = resolve_operand(ts, m, globals, scope)?;
        return Ok((m.tcx.void, Operator::Ret, SmallVec::from_slice(&[value])));
    }
    if op_word == "call" {
        let ty = parse_type(ts, m)?;
        let callee = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym('(')?;
        let mut operands: SmallVec<[ValueId; 4]> = SmallVec::from_slice(&[callee]);
        if *ts.peek() != Tok::Sym(')') {
            loop {
                operands.push(resolve_operand(ts, m, globals, scope)?);
                if *ts.peek() == Tok::Sym(',') {
                    ts.next();
                } else {
                    break;
                }
            }
        }
        ts.expect_sym(')')?;
        return Ok((ty, Operator::Call, operands));
    }
    if op_word == "move" {
        let dest = resolve_operand(ts, m, globals, scope)?;
        ts.expect_sym(',')?;
        let src = resolve_operand(ts, m, globals, scope)?;
        return Ok((m.tcx.void, Operator::Move, SmallVec::from_slice(&[dest, src])));
    }

    Err(CoreError::parse(format!("unknown opcode '{op_word}'")))
}

fn parse_initializer(ts: &mut TokenStream, m: &mut Module) -> CoreResult<Initializer> {
    match ts.peek().clone() {
        Tok::Ident(w) if w == "zeroinit" => {
            ts.next();
            Ok(Initializer::Zero)
        }
        Tok::Sym('[') => {
            ts.next();
            let mut items = Vec::new();
            if *ts.peek() != Tok::Sym(']') {
                loop {
                    items.push(parse_initializer(ts, m)?);
                    if *ts.peek() == Tok::Sym(',') {
                        ts.next();
                    } else {
                        break;
                    }
                }
            }
            ts.expect_sym(']')?;
            Ok(Initializer::Array(items))
        }
        Tok::Ident(w) => {
            ts.next();
            let id = parse_literal(&w, m)?;
            let c = match &m.value(id).kind {
                crate::value::ValueKind::Const(c) => *c,
                _ => unreachable!("parse_literal always makes a constant"),
            };
            Ok(Initializer::Const(c))
        }
        other => Err(CoreError::parse(format!("expected initializer, found {other:?}"))),
    }
}

fn parse_global_line(ts: &mut TokenStream, m: &mut Module, globals: &mut GlobalScope) -> CoreResult<()> {
    let name = ts.expect_at()?;
    ts.expect_sym(':')?;
    let pointee = parse_type(ts, m)?;
    ts.expect_sym('=')?;
    let initializer = parse_initializer(ts, m)?;
    let mut is_mutable = true;
    if *ts.peek() == Tok::Sym(',') {
        ts.next();
        ts.expect_ident("const")?;
        is_mutable = false;
    }
    let id = m.add_global(name.clone(), pointee, is_mutable, initializer);
    globals.values.insert(name, id);
    Ok(())
}

struct ParamDecl {
    name: String,
    ty: Type,
}

fn parse_params(ts: &mut TokenStream, m: &mut Module) -> CoreResult<Vec<ParamDecl>> {
    ts.expect_sym('(')?;
    let mut params = Vec::new();
    if *ts.peek() != Tok::Sym(')') {
        loop {
            let name = ts.expect_percent()?;
            ts.expect_sym(':')?;
            let ty = parse_type(ts, m)?;
            params.push(ParamDecl { name, ty });
            if *ts.peek() == Tok::Sym(',') {
                ts.next();
            } else {
                break;
            }
        }
    }
    ts.expect_sym(')')?;
    Ok(params)
}

fn parse_extern_fn_line(ts: &mut TokenStream, m: &mut Module, globals: &mut GlobalScope) -> CoreResult<()> {
    let name = ts.expect_at()?;
    let params = parse_params(ts, m)?;
    match ts.next() {
        Tok::Arrow => {}
        other => return Err(CoreError::parse(format!("expected '->', found {other:?}"))),
    }
    let ret_ty = parse_type(ts, m)?;
    let which = crate::function::RuntimeFn::from_name(&name)
        .ok_or_else(|| CoreError::parse(format!("unknown runtime function '{name}'")))?;
    let param_types: Vec<Type> = params.iter().map(|p| p.ty).collect();
    let id = m.add_runtime_function(which, &param_types, ret_ty);
    globals.values.insert(name, id);
    Ok(())
}

struct PendingInstr {
    id: ValueId,
    toks: Vec<Tok>,
}

/// Parses a function starting at `lines[start]` (the `fn @name(...) -> ty {`
/// header line, with `fn` already consumed from `header_ts`). Returns the
/// index of the first line after the function's closing `}`.
fn parse_fn_block(
    lines: &[&str],
    start: usize,
    header_ts: &mut TokenStream,
    m: &mut Module,
    globals: &mut GlobalScope,
) -> CoreResult<usize> {
    let name = header_ts.expect_at()?;
    let params = parse_params(header_ts, m)?;
    match header_ts.next() {
        Tok::Arrow => {}
        other => return Err(CoreError::parse(format!("expected '->', found {other:?}"))),
    }
    let ret_ty = parse_type(header_ts, m)?;
    header_ts.expect_sym('{')?;

    let param_types: Vec<Type> = params.iter().map(|p| p.ty).collect();
    let f = m.add_function(name.clone(), &param_types, ret_ty);
    globals.values.insert(name, f);

    let mut scope = FnScope { values: HashMap::new(), blocks: HashMap::new() };
    let arg_ids = m.function_params(f).to_vec();
    for (decl, arg_id) in params.iter().zip(arg_ids.iter()) {
        scope.values.insert(decl.name.clone(), *arg_id);
    }

    let mut pending: Vec<PendingInstr> = Vec::new();
    let mut current_block: Option<ValueId> = None;
    let mut i = start + 1;
    loop {
        if i >= lines.len() {
            return Err(CoreError::parse(format!("unterminated function body for '{name}'")));
        }
        let line = lines[i].trim();
        if line.is_empty() {
            i += 1;
            continue;
        }
        if line == "}" {
            i += 1;
            break;
        }
        if let Some(label) = line.strip_prefix('^') {
            let label = label.trim_end_matches(':').to_string();
            let block = m.add_block(f, label.clone());
            scope.blocks.insert(label, block);
            current_block = Some(block);
            i += 1;
            continue;
        }

        let block = current_block
            .ok_or_else(|| CoreError::parse("instruction outside of any block".to_string()))?;
        let toks = tokenize_line(line);
        let mut line_ts = TokenStream::new(toks);
        let dest = if let Tok::Percent(n) = line_ts.peek().clone() {
            let save = line_ts.pos;
            line_ts.next();
            if *line_ts.peek() == Tok::Sym('=') {
                line_ts.next();
                Some(n)
            } else {
                line_ts.pos = save;
                None
            }
        } else {
            None
        };
        let void = m.tcx.void;
        let placeholder = m.create_instr(dest.clone().unwrap_or_default(), void, Operator::Ret, SmallVec::new());
        m.set_block(placeholder, Some(block), true);
        if let Some(d) = dest {
            scope.values.insert(d, placeholder);
        }
        pending.push(PendingInstr { id: placeholder, toks: line_ts.toks[line_ts.pos..].to_vec() });
        i += 1;
    }

    for p in pending {
        let mut ts = TokenStream::new(p.toks);
        let (ty, operator, operands) = parse_operator(&mut ts, m, globals, &scope)?;
        m.redefine_instr(p.id, ty, operator, operands);
    }

    Ok(i)
}

/// Parses the crate's MIR text format (as emitted by [`crate::printer::print_module`])
/// into a fresh [`Module`].
pub fn parse_module(text: &str) -> CoreResult<Module> {
    let mut m = Module::new("parsed");
    let mut globals = GlobalScope { values: HashMap::new() };
    let lines: Vec<&str> = text.lines().collect();

    let mut i = 0;
    while i < lines.len() {
        let raw = lines[i];
        let line = raw.trim();
        if line.is_empty() || line.starts_with(';') {
            i += 1;
            continue;
        }
        let toks = tokenize_line(line);
        let mut ts = TokenStream::new(toks);
        match ts.next() {
            Tok::Ident(w) if w == "global" => {
                parse_global_line(&mut ts, &mut m, &mut globals)?;
                i += 1;
            }
            Tok::Ident(w) if w == "extern" => {
                ts.expect_ident("fn")?;
                parse_extern_fn_line(&mut ts, &mut m, &mut globals)?;
                i += 1;
            }
            Tok::Ident(w) if w == "fn" => {
                i = parse_fn_block(&lines, i, &mut ts, &mut m, &mut globals)?;
            }
            other => return Err(CoreError::parse(format!("unexpected top-level token {other:?}"))),
        }
    }

    if let Some(&main) = m.functions.iter().find(|&&f| m.name_of(f) == "main") {
        m.main_fn = Some(main);
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::printer::print_module;

    #[test]
    fn round_trips_constant_fold_candidate() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let mut b = crate::builder::Builder::new(&mut m);
        b.set_insert_point(entry);
        let c3 = b.module.make_const(Const::Int(3));
        let c4 = b.module.make_const(Const::Int(4));
        let sum = b.int_binary(IntBinOp::Add, c3, c4);
        b.ret(Some(sum));

        let text = print_module(&m);
        let parsed = parse_module(&text).expect("parses the printer's own output");
        let text2 = print_module(&parsed);
        assert_eq!(text, text2);
    }

    #[test]
    fn round_trips_switch_with_cases() {
        let mut m = Module::new("m");
        let i32_ty = m.tcx.i32;
        let f = m.add_function("main", &[], i32_ty);
        let entry = m.add_block(f, "entry");
        let default_blk = m.add_block(f, "default");
        let case0 = m.add_block(f, "case0");
        let mut b = crate::builder::Builder::new(&mut m);
        b.set_insert_point(entry);
        let scrutinee = b.module.make_const(Const::Int(1));
        b.switch(scrutinee, default_blk, &[(Const::Int(0), case0)]);
        b.set_insert_point(default_blk);
        b.ret(None);
        b.set_insert_point(case0);
        b.ret(None);

        let text = print_module(&m);
        let parsed = parse_module(&text).expect("parses a switch with cases");
        let text2 = print_module(&parsed);
        assert_eq!(text, text2);
        assert!(text.contains("[0, ^case0]"));
    }

    #[test]
    fn parses_phi_with_forward_block_reference() {
        let src = "\
fn @f(%n: i32) -> i32 {
  ^entry:
    br %n, ^a, ^b
  ^a:
    jmp ^b
  ^b:
    %r = phi i32 [^entry, %n], [^a, %n]
    ret i32 %r
}
";
        let m = parse_module(src).expect("parses forward phi reference");
        assert_eq!(m.functions.len(), 1);
    }
}
