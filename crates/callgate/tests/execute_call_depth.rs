mod common;

use std::cell::Cell;
use std::rc::Rc;

use callgate::{
    CALL_STACK_LIMIT, ExecutionResult, ExternalFunction, FuncIdx, Imports, Instance, ValType, Value, execute,
    find_exported_function,
};
use common::{func_type, instantiate_wat, instantiate_wat_with, run_with_deep_stack};
use proptest::prelude::*;

const LIMIT: u32 = CALL_STACK_LIMIT;

fn one() -> ExecutionResult {
    ExecutionResult::Success(vec![Value::I32(1)])
}

/// A host function returning 1 that records the depth it was called at.
fn recording_host(recorded: &Rc<Cell<Option<u32>>>) -> ExternalFunction {
    let recorded = Rc::clone(recorded);
    ExternalFunction::host(func_type(&[], &[ValType::I32]), move |_, _, depth| {
        recorded.set(Some(depth));
        Value::I32(1).into()
    })
}

fn exporter() -> Result<Rc<Instance>, anyhow::Error> {
    instantiate_wat(r#"(module (func (export "f") (result i32) i32.const 1))"#)
}

/// Instance whose function 1 performs exactly one call, to function 0.
fn one_call_deep(callee: Option<ExternalFunction>) -> Result<Rc<Instance>, anyhow::Error> {
    match callee {
        None => instantiate_wat(
            r#"
            (module
                (func $f (result i32) i32.const 1)
                (func (result i32) call $f)
            )
        "#,
        ),
        Some(callee) => instantiate_wat_with(
            r#"
            (module
                (import "m" "f" (func $f (result i32)))
                (func (result i32) call $f)
            )
        "#,
            Imports { functions: vec![callee], ..Default::default() },
        ),
    }
}

#[test]
fn execute_internal_function() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(r#"(module (func (result i32) i32.const 1))"#)?;

    assert_eq!(execute(&instance, FuncIdx(0), &[], 0), one());
    assert_eq!(execute(&instance, FuncIdx(0), &[], LIMIT - 1), one());
    assert!(execute(&instance, FuncIdx(0), &[], LIMIT).trapped());
    assert!(execute(&instance, FuncIdx(0), &[], LIMIT + 1).trapped());
    assert!(execute(&instance, FuncIdx(0), &[], u32::MAX).trapped());
    Ok(())
}

#[test]
fn execute_imported_wasm_function() -> Result<(), anyhow::Error> {
    let exporter = exporter()?;
    let f = find_exported_function(&exporter, "f").expect("f is exported");
    let executor = instantiate_wat_with(
        r#"(module (import "m" "f" (func (result i32))))"#,
        Imports { functions: vec![f], ..Default::default() },
    )?;

    assert_eq!(execute(&executor, FuncIdx(0), &[], LIMIT - 1), one());
    assert!(execute(&executor, FuncIdx(0), &[], LIMIT).trapped());
    Ok(())
}

#[test]
fn execute_host_function() -> Result<(), anyhow::Error> {
    let recorded = Rc::new(Cell::new(None));
    let instance = instantiate_wat_with(
        r#"(module (import "m" "f" (func (result i32))))"#,
        Imports { functions: vec![recording_host(&recorded)], ..Default::default() },
    )?;

    assert_eq!(execute(&instance, FuncIdx(0), &[], 0), one());
    assert_eq!(recorded.get(), Some(0));

    assert_eq!(execute(&instance, FuncIdx(0), &[], LIMIT - 1), one());
    assert_eq!(recorded.get(), Some(LIMIT - 1));

    recorded.set(None);
    assert!(execute(&instance, FuncIdx(0), &[], LIMIT).trapped());
    assert_eq!(recorded.get(), None, "host must not run past the limit");
    Ok(())
}

#[test]
fn call_internal_function() -> Result<(), anyhow::Error> {
    let instance = one_call_deep(None)?;

    assert_eq!(execute(&instance, FuncIdx(1), &[], LIMIT - 2), one());
    assert!(execute(&instance, FuncIdx(1), &[], LIMIT - 1).trapped());
    assert!(execute(&instance, FuncIdx(1), &[], LIMIT).trapped());
    Ok(())
}

#[test]
fn call_imported_wasm_function() -> Result<(), anyhow::Error> {
    let exporter = exporter()?;
    let instance = one_call_deep(find_exported_function(&exporter, "f"))?;

    assert_eq!(execute(&instance, FuncIdx(1), &[], LIMIT - 2), one());
    assert!(execute(&instance, FuncIdx(1), &[], LIMIT - 1).trapped());
    assert!(execute(&instance, FuncIdx(1), &[], LIMIT).trapped());
    Ok(())
}

#[test]
fn call_host_function() -> Result<(), anyhow::Error> {
    let recorded = Rc::new(Cell::new(None));
    let instance = one_call_deep(Some(recording_host(&recorded)))?;

    assert_eq!(execute(&instance, FuncIdx(1), &[], 0), one());
    assert_eq!(recorded.get(), Some(1));

    assert_eq!(execute(&instance, FuncIdx(1), &[], LIMIT - 2), one());
    assert_eq!(recorded.get(), Some(LIMIT - 1));

    recorded.set(None);
    assert!(execute(&instance, FuncIdx(1), &[], LIMIT - 1).trapped());
    assert_eq!(recorded.get(), None);
    assert!(execute(&instance, FuncIdx(1), &[], LIMIT).trapped());
    assert_eq!(recorded.get(), None);
    Ok(())
}

#[test]
fn infinite_recursion_traps_from_any_depth() -> Result<(), anyhow::Error> {
    run_with_deep_stack(|| {
        let instance = instantiate_wat(r#"(module (func (result i32) call 0))"#)?;
        for depth in [0, 1, LIMIT / 2, LIMIT - 1, LIMIT] {
            assert!(execute(&instance, FuncIdx(0), &[], depth).trapped(), "depth {depth}");
        }
        Ok(())
    })
}

#[test]
fn infinite_recursion_through_table_traps() -> Result<(), anyhow::Error> {
    run_with_deep_stack(|| {
        let instance = instantiate_wat(
            r#"
            (module
                (type $t (func (result i32)))
                (table funcref (elem $f))
                (func $f (result i32) (call_indirect (type $t) (i32.const 0)))
            )
        "#,
        )?;
        assert!(execute(&instance, FuncIdx(0), &[], 0).trapped());
        Ok(())
    })
}

#[test]
fn recursion_counts_every_permitted_depth() -> Result<(), anyhow::Error> {
    run_with_deep_stack(|| {
        let instance = instantiate_wat(
            r#"
            (module
                (global $counter (mut i64) (i64.const 0))
                (func $infinite (export "infinite")
                    (global.set $counter (i64.add (global.get $counter) (i64.const 1)))
                    call $infinite
                )
                (func (export "counter") (result i64) global.get $counter)
            )
        "#,
        )?;
        assert!(execute(&instance, FuncIdx(0), &[], 0).trapped());
        assert_eq!(instance.global(0), Some(Value::I64(LIMIT as i64)));
        Ok(())
    })
}

#[test]
fn count_calls_to_imported_function() -> Result<(), anyhow::Error> {
    run_with_deep_stack(|| {
        let counter = callgate::ExternalGlobal::new(Value::I64(0), true);
        let exporter = instantiate_wat_with(
            r#"
            (module
                (global $counter (import "m" "counter") (mut i64))
                (func $infinite (export "infinite")
                    (global.set $counter (i64.add (global.get $counter) (i64.const 1)))
                    call $infinite
                )
            )
        "#,
            Imports { globals: vec![counter.clone()], ..Default::default() },
        )?;
        assert!(execute(&exporter, FuncIdx(0), &[], 0).trapped());
        assert_eq!(counter.value.get(), Value::I64(LIMIT as i64));

        let infinite = find_exported_function(&exporter, "infinite").expect("infinite is exported");
        let importer = instantiate_wat_with(
            r#"(module (import "m" "infinite" (func)))"#,
            Imports { functions: vec![infinite], ..Default::default() },
        )?;
        counter.value.set(Value::I64(0));
        assert!(execute(&importer, FuncIdx(0), &[], 0).trapped());
        assert_eq!(counter.value.get(), Value::I64(LIMIT as i64));
        Ok(())
    })
}

/// Host function 0 re-enters function `target` of its caller at `depth + 1`,
/// counting its invocations.
fn reentering_instance(target: u32, counter: &Rc<Cell<u32>>) -> Result<Rc<Instance>, anyhow::Error> {
    let counter = Rc::clone(counter);
    let host = ExternalFunction::host(func_type(&[], &[ValType::I32]), move |instance, _, depth| {
        assert!(depth < LIMIT);
        counter.set(counter.get() + 1);
        execute(instance, FuncIdx(target), &[], depth + 1)
    });
    instantiate_wat_with(
        r#"
        (module
            (import "mod" "foo" (func $foo (result i32)))
            (func (result i32) call $foo)
        )
    "#,
        Imports { functions: vec![host], ..Default::default() },
    )
}

#[test]
fn call_imported_infinite_recursion() -> Result<(), anyhow::Error> {
    run_with_deep_stack(|| {
        let counter = Rc::new(Cell::new(0));
        let instance = reentering_instance(0, &counter)?;

        assert!(execute(&instance, FuncIdx(0), &[], 0).trapped());
        assert_eq!(counter.get(), LIMIT);

        counter.set(0);
        assert!(execute(&instance, FuncIdx(1), &[], 0).trapped());
        assert_eq!(counter.get(), LIMIT - 1);
        Ok(())
    })
}

#[test]
fn call_imported_interleaved_infinite_recursion() -> Result<(), anyhow::Error> {
    run_with_deep_stack(|| {
        let counter = Rc::new(Cell::new(0));
        let instance = reentering_instance(1, &counter)?;

        // Starting with the host function: it runs at even depths.
        assert!(execute(&instance, FuncIdx(0), &[], 0).trapped());
        assert_eq!(counter.get(), LIMIT / 2);

        // Starting with the wasm function: the host runs at odd depths.
        counter.set(0);
        assert!(execute(&instance, FuncIdx(1), &[], 0).trapped());
        assert_eq!(counter.get(), LIMIT / 2);
        Ok(())
    })
}

/// Host function 0 re-enters function `target` until it reaches the deepest
/// permitted depth, where it returns 1.
fn bottoming_out_instance(target: u32) -> Result<Rc<Instance>, anyhow::Error> {
    let host = ExternalFunction::host(func_type(&[], &[ValType::I32]), move |instance, _, depth| {
        if depth == LIMIT - 1 {
            return Value::I32(1).into();
        }
        execute(instance, FuncIdx(target), &[], depth + 1)
    });
    instantiate_wat_with(
        r#"
        (module
            (import "mod" "foo" (func $foo (result i32)))
            (func (result i32) call $foo)
        )
    "#,
        Imports { functions: vec![host], ..Default::default() },
    )
}

#[test]
fn call_imported_max_depth_recursion() -> Result<(), anyhow::Error> {
    run_with_deep_stack(|| {
        let instance = bottoming_out_instance(0)?;
        assert_eq!(execute(&instance, FuncIdx(0), &[], 0), one());
        Ok(())
    })
}

#[test]
fn call_via_imported_max_depth_recursion() -> Result<(), anyhow::Error> {
    run_with_deep_stack(|| {
        let instance = bottoming_out_instance(1)?;
        assert_eq!(execute(&instance, FuncIdx(1), &[], 0), one());
        Ok(())
    })
}

#[test]
fn host_wrapper_reentering_another_instance_sees_limit() -> Result<(), anyhow::Error> {
    let instance1 = instantiate_wat(
        r#"
        (module
            (func (export "sub") (param i32 i32) (result i32)
                (i32.sub (local.get 0) (local.get 1))
            )
        )
    "#,
    )?;
    let sub_idx = instance1.module().find_exported_function("sub").expect("sub is exported");
    let target = Rc::clone(&instance1);
    let sub = ExternalFunction::host(
        func_type(&[ValType::I32, ValType::I32], &[ValType::I32]),
        move |_, args, depth| execute(&target, sub_idx, args, depth + 1),
    );
    let instance2 = instantiate_wat_with(
        r#"
        (module
            (import "m1" "sub" (func $sub (param i32 i32) (result i32)))
            (func $nop)
            (func (param i32 i32) (result i32)
                (call $sub (local.get 0) (local.get 1))
            )
            (func (param i32 i32) (result i32)
                call $nop
                (i32.sub (local.get 0) (local.get 1))
            )
        )
    "#,
        Imports { functions: vec![sub], ..Default::default() },
    )?;
    let args = [Value::I32(44), Value::I32(2)];
    let forty_two = ExecutionResult::Success(vec![Value::I32(42)]);

    assert_eq!(execute(&instance2, FuncIdx(2), &args, 0), forty_two);
    assert!(execute(&instance2, FuncIdx(2), &args, LIMIT - 2).trapped());
    assert_eq!(execute(&instance2, FuncIdx(3), &args, LIMIT - 2), forty_two);
    assert_eq!(execute(&instance2, FuncIdx(2), &args, LIMIT - 3), forty_two);
    Ok(())
}

fn trivial_instance() -> Rc<Instance> {
    instantiate_wat(r#"(module (func (result i32) i32.const 1))"#).unwrap()
}

proptest! {
    #[test]
    fn direct_call_succeeds_below_limit(depth in 0..LIMIT) {
        let instance = trivial_instance();
        prop_assert_eq!(execute(&instance, FuncIdx(0), &[], depth), one());
    }

    #[test]
    fn direct_call_traps_from_limit(depth in LIMIT..=u32::MAX) {
        let instance = trivial_instance();
        prop_assert!(execute(&instance, FuncIdx(0), &[], depth).trapped());
    }

    #[test]
    fn callee_kind_does_not_change_outcome(depth in (LIMIT - 4)..=(LIMIT + 1)) {
        let exporter = exporter().unwrap();
        let recorded = Rc::new(Cell::new(None));
        let instances = [
            one_call_deep(None).unwrap(),
            one_call_deep(find_exported_function(&exporter, "f")).unwrap(),
            one_call_deep(Some(recording_host(&recorded))).unwrap(),
        ];
        for instance in &instances {
            let result = execute(instance, FuncIdx(1), &[], depth);
            prop_assert_eq!(result.trapped(), depth > LIMIT - 2);
        }
    }
}
