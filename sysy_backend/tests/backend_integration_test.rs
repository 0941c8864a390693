//! End-to-end backend tests: parse MIR text, run it through
//! `sysy_backend::compile`, and check the shape of the emitted RV64GC
//! assembly rather than pass-level internals (those are covered by each
//! module's own `#[cfg(test)]` block).

use sysy_mir::parse_module;

fn defined_functions(m: &sysy_mir::Module) -> Vec<sysy_mir::ValueId> {
    m.functions
        .iter()
        .copied()
        .filter(|&f| m.value(f).kind.as_function().expect("not a function").is_defined())
        .collect()
}

#[test]
fn compiles_a_straight_line_function_to_a_globl_and_ret() {
    let text = "\
fn @main() -> i32 {
  ^entry:
    %1 = add i32 3, 4
    ret i32 %1
}
";
    let mut m = parse_module(text).expect("valid MIR");
    let functions = defined_functions(&m);
    let asm = sysy_backend::compile(&mut m, &functions).expect("compiles");

    assert!(asm.contains(".globl main"), "expected a global symbol for main:\n{asm}");
    assert!(asm.contains("main:"), "expected a label for main:\n{asm}");
    assert!(asm.contains("ret"), "expected a ret instruction:\n{asm}");
}

#[test]
fn compiles_a_function_with_a_branch_and_both_arms_reachable() {
    let text = "\
fn @max(%a: i32, %b: i32) -> i32 {
  ^entry:
    %cond = icmp.gt i32 %a, %b
    br %cond, ^then, ^else
  ^then:
    ret i32 %a
  ^else:
    ret i32 %b
}
";
    let mut m = parse_module(text).expect("valid MIR");
    let functions = defined_functions(&m);
    let asm = sysy_backend::compile(&mut m, &functions).expect("compiles");

    assert!(asm.contains(".globl max"));
    let ret_count = asm.matches("ret").count();
    assert_eq!(ret_count, 2, "both arms of max should reach their own epilogue/ret:\n{asm}");
}

#[test]
fn compiles_a_function_with_a_loop_phi_after_phi_removal() {
    let text = "\
fn @sum_to_n(%n: i32) -> i32 {
  ^entry:
    %zero = add i32 0, 0
    jmp ^header
  ^header:
    %sum = phi i32 [^entry, %zero], [^body, %next_sum]
    %i = phi i32 [^entry, %zero], [^body, %next_i]
    %cont = icmp.le i32 %i, %n
    br %cont, ^body, ^exit
  ^body:
    %next_sum = add i32 %sum, %i
    %next_i = add i32 %i, 1
    jmp ^header
  ^exit:
    ret i32 %sum
}
";
    let mut m = parse_module(text).expect("valid MIR");
    let functions = defined_functions(&m);
    let asm = sysy_backend::compile(&mut m, &functions).expect("compiles");

    assert!(asm.contains(".globl sum_to_n"));
    assert!(asm.contains("sum_to_n:"));
}

#[test]
fn compiling_with_a_restricted_phi_removal_set_still_emits_every_defined_function() {
    let text = "\
fn @helper(%x: i32) -> i32 {
  ^entry:
    ret i32 %x
}

fn @main() -> i32 {
  ^entry:
    %r = call i32 @helper(5)
    ret i32 %r
}
";
    let mut m = parse_module(text).expect("valid MIR");
    let helper = m.functions.iter().copied().find(|&f| m.name_of(f) == "helper").expect("helper exists");
    let asm = sysy_backend::compile(&mut m, &[helper]).expect("compiles with a restricted function set");
    assert!(asm.contains(".globl helper"));
    assert!(asm.contains(".globl main"), "lowering covers every defined function regardless of the phi-removal set:\n{asm}");
}
