//! The source language's runtime library: fixed external signatures a
//! `Module` declares once and a pass (or the backend) references by
//! [`RuntimeFn`](crate::function::RuntimeFn) rather than by name lookup.

use crate::function::RuntimeFn;
use crate::module::Module;
use crate::types::Type;

/// Declares every runtime function on `module`. Call once, right after
/// creating a fresh `Module`, so later `call` sites can resolve them as
/// ordinary `Function` values; `Module::mark_runtime_used` (invoked by
/// [`crate::builder::Builder::call`]) tracks which ones actually need a
/// declaration emitted alongside the generated assembly.
pub fn declare_all(module: &mut Module) {
    let i32_ty = module.tcx.i32;
    let f32_ty = module.tcx.f32;
    let void = module.tcx.void;
    let int_arr = module.tcx.pointer(i32_ty);
    let float_arr = module.tcx.pointer(f32_ty);

    use RuntimeFn::*;
    let sigs: [(RuntimeFn, &[Type], Type); 14] = [
        (GetInt, &[], i32_ty),
        (PutInt, &[i32_ty], void),
        (GetCh, &[], i32_ty),
        (PutCh, &[i32_ty], void),
        (GetFloat, &[], f32_ty),
        (PutFloat, &[f32_ty], void),
        (GetArray, &[int_arr], i32_ty),
        (PutArray, &[i32_ty, int_arr], void),
        (GetFArray, &[float_arr], i32_ty),
        (PutFArray, &[i32_ty, float_arr], void),
        (PutF, &[], void),
        (StartTime, &[], void),
        (StopTime, &[], void),
        (MemSet, &[], void),
    ];
    for (which, params, ret) in sigs {
        module.add_runtime_function(which, params, ret);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_all_fourteen_runtime_functions() {
        let mut module = Module::new("m");
        declare_all(&mut module);
        assert_eq!(module.functions.len(), RuntimeFn::ALL.len());
        for which in RuntimeFn::ALL {
            assert!(module
                .functions
                .iter()
                .any(|&f| module.name_of(f) == which.name()));
        }
    }
}
