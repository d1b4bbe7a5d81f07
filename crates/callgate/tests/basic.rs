mod common;

use callgate::{ExecutionResult, Value};
use common::instantiate_wat;

fn ok(values: impl IntoIterator<Item = Value>) -> ExecutionResult {
    ExecutionResult::Success(values.into_iter().collect())
}

#[test]
fn arithmetic() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(
        r#"
        (module
            (func (export "add") (param i32 i32) (result i32)
                (i32.add (local.get 0) (local.get 1))
            )
            (func (export "mul64") (param i64 i64) (result i64)
                (i64.mul (local.get 0) (local.get 1))
            )
            (func (export "fdiv") (param f64 f64) (result f64)
                (f64.div (local.get 0) (local.get 1))
            )
            (func (export "wrap") (param i64) (result i32)
                (i32.wrap_i64 (local.get 0))
            )
            (func (export "sat") (param f32) (result i32)
                (i32.trunc_sat_f32_s (local.get 0))
            )
            (func (export "ext8") (param i32) (result i32)
                (i32.extend8_s (local.get 0))
            )
        )
    "#,
    )?;
    assert_eq!(instance.invoke("add", &[Value::I32(i32::MAX), Value::I32(1)])?, ok([Value::I32(i32::MIN)]));
    assert_eq!(instance.invoke("mul64", &[Value::I64(6), Value::I64(7)])?, ok([Value::I64(42)]));
    assert_eq!(instance.invoke("fdiv", &[Value::F64(1.0), Value::F64(4.0)])?, ok([Value::F64(0.25)]));
    assert_eq!(instance.invoke("wrap", &[Value::I64(0x1_0000_002a)])?, ok([Value::I32(42)]));
    assert_eq!(instance.invoke("sat", &[Value::F32(f32::INFINITY)])?, ok([Value::I32(i32::MAX)]));
    assert_eq!(instance.invoke("sat", &[Value::F32(f32::NAN)])?, ok([Value::I32(0)]));
    assert_eq!(instance.invoke("ext8", &[Value::I32(0xff)])?, ok([Value::I32(-1)]));
    Ok(())
}

#[test]
fn numeric_traps() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(
        r#"
        (module
            (func (export "div_s") (param i32 i32) (result i32)
                (i32.div_s (local.get 0) (local.get 1))
            )
            (func (export "rem_s") (param i32 i32) (result i32)
                (i32.rem_s (local.get 0) (local.get 1))
            )
            (func (export "trunc") (param f64) (result i32)
                (i32.trunc_f64_u (local.get 0))
            )
        )
    "#,
    )?;
    assert!(instance.invoke("div_s", &[Value::I32(1), Value::I32(0)])?.trapped());
    assert!(instance.invoke("div_s", &[Value::I32(i32::MIN), Value::I32(-1)])?.trapped());
    // rem_s of MIN by -1 is defined as 0.
    assert_eq!(instance.invoke("rem_s", &[Value::I32(i32::MIN), Value::I32(-1)])?, ok([Value::I32(0)]));
    assert!(instance.invoke("trunc", &[Value::F64(-1.0)])?.trapped());
    assert!(instance.invoke("trunc", &[Value::F64(f64::NAN)])?.trapped());
    assert_eq!(instance.invoke("trunc", &[Value::F64(-0.5)])?, ok([Value::I32(0)]));
    Ok(())
}

#[test]
fn blocks_and_branches() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(
        r#"
        (module
            (func (export "classify") (param i32) (result i32)
                (block $c (result i32)
                    (block $b
                        (block $a
                            (br_table $a $b (local.get 0))
                        )
                        (br $c (i32.const 10))
                    )
                    (i32.const 20)
                )
            )
            (func (export "sum_to") (param $n i32) (result i32)
                (local $acc i32)
                (block $done
                    (loop $next
                        (br_if $done (i32.eqz (local.get $n)))
                        (local.set $acc (i32.add (local.get $acc) (local.get $n)))
                        (local.set $n (i32.sub (local.get $n) (i32.const 1)))
                        (br $next)
                    )
                )
                (local.get $acc)
            )
            (func (export "sign") (param i32) (result i32)
                (if (result i32) (i32.lt_s (local.get 0) (i32.const 0))
                    (then (i32.const -1))
                    (else
                        (if (result i32) (local.get 0)
                            (then (i32.const 1))
                            (else (i32.const 0))
                        )
                    )
                )
            )
            (func (export "early") (param i32) (result i32)
                (if (local.get 0) (then (return (i32.const 7))))
                (i32.const 8)
            )
        )
    "#,
    )?;
    assert_eq!(instance.invoke("classify", &[Value::I32(0)])?, ok([Value::I32(10)]));
    assert_eq!(instance.invoke("classify", &[Value::I32(1)])?, ok([Value::I32(20)]));
    assert_eq!(instance.invoke("classify", &[Value::I32(99)])?, ok([Value::I32(20)]));
    assert_eq!(instance.invoke("sum_to", &[Value::I32(100)])?, ok([Value::I32(5050)]));
    assert_eq!(instance.invoke("sign", &[Value::I32(-5)])?, ok([Value::I32(-1)]));
    assert_eq!(instance.invoke("sign", &[Value::I32(0)])?, ok([Value::I32(0)]));
    assert_eq!(instance.invoke("sign", &[Value::I32(3)])?, ok([Value::I32(1)]));
    assert_eq!(instance.invoke("early", &[Value::I32(1)])?, ok([Value::I32(7)]));
    assert_eq!(instance.invoke("early", &[Value::I32(0)])?, ok([Value::I32(8)]));
    Ok(())
}

#[test]
fn branch_discards_extra_operands() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(
        r#"
        (module
            (func (export "f") (result i32)
                (block (result i32)
                    i32.const 1
                    i32.const 2
                    i32.const 3
                    br 0
                )
            )
        )
    "#,
    )?;
    assert_eq!(instance.invoke("f", &[])?, ok([Value::I32(3)]));
    Ok(())
}

#[test]
fn multi_value() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(
        r#"
        (module
            (func $swap (param i32 i64) (result i64 i32)
                local.get 1
                local.get 0
            )
            (func (export "swap") (param i32 i64) (result i64 i32)
                (call $swap (local.get 0) (local.get 1))
            )
            (func (export "block_params") (result i32)
                i32.const 40
                i32.const 2
                (block (param i32 i32) (result i32)
                    i32.add
                )
            )
        )
    "#,
    )?;
    assert_eq!(
        instance.invoke("swap", &[Value::I32(1), Value::I64(2)])?,
        ok([Value::I64(2), Value::I32(1)])
    );
    assert_eq!(instance.invoke("block_params", &[])?, ok([Value::I32(42)]));
    Ok(())
}

#[test]
fn select_and_locals() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(
        r#"
        (module
            (func (export "max") (param i64 i64) (result i64)
                (select (local.get 0) (local.get 1) (i64.gt_s (local.get 0) (local.get 1)))
            )
            (func (export "zeroed") (result f32)
                (local f32)
                local.get 0
            )
            (func (export "tee") (param i32) (result i32)
                (local i32)
                (i32.add (local.tee 1 (local.get 0)) (local.get 1))
            )
        )
    "#,
    )?;
    assert_eq!(instance.invoke("max", &[Value::I64(-3), Value::I64(9)])?, ok([Value::I64(9)]));
    assert_eq!(instance.invoke("zeroed", &[])?, ok([Value::F32(0.0)]));
    assert_eq!(instance.invoke("tee", &[Value::I32(21)])?, ok([Value::I32(42)]));
    Ok(())
}

#[test]
fn memory_access() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(
        r#"
        (module
            (memory 1 2)
            (func (export "store_load") (param i32 i64) (result i64)
                (i64.store offset=4 (local.get 0) (local.get 1))
                (i64.load offset=4 (local.get 0))
            )
            (func (export "load8_s") (param i32) (result i32)
                (i32.store8 (local.get 0) (i32.const 0x80))
                (i32.load8_s (local.get 0))
            )
            (func (export "load") (param i32) (result i32)
                (i32.load (local.get 0))
            )
            (func (export "size") (result i32) memory.size)
            (func (export "grow") (param i32) (result i32) (memory.grow (local.get 0)))
        )
    "#,
    )?;
    assert_eq!(
        instance.invoke("store_load", &[Value::I32(16), Value::I64(-2)])?,
        ok([Value::I64(-2)])
    );
    assert_eq!(instance.invoke("load8_s", &[Value::I32(100)])?, ok([Value::I32(-128)]));
    assert!(instance.invoke("load", &[Value::I32(65533)])?.trapped());
    assert!(instance.invoke("load", &[Value::I32(-1)])?.trapped());

    assert_eq!(instance.invoke("size", &[])?, ok([Value::I32(1)]));
    assert_eq!(instance.invoke("grow", &[Value::I32(1)])?, ok([Value::I32(1)]));
    assert_eq!(instance.invoke("size", &[])?, ok([Value::I32(2)]));
    // Above the declared maximum.
    assert_eq!(instance.invoke("grow", &[Value::I32(1)])?, ok([Value::I32(-1)]));
    assert_eq!(instance.invoke("load", &[Value::I32(65533)])?, ok([Value::I32(0)]));
    Ok(())
}

#[test]
fn globals() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(
        r#"
        (module
            (global $f (mut f64) (f64.const 1.5))
            (func (export "double")
                (global.set $f (f64.mul (global.get $f) (f64.const 2)))
            )
        )
    "#,
    )?;
    instance.invoke("double", &[])?;
    assert_eq!(instance.global(0), Some(Value::F64(3.0)));
    Ok(())
}

#[test]
fn unreachable_traps() -> Result<(), anyhow::Error> {
    let instance = instantiate_wat(r#"(module (func (export "f") unreachable))"#)?;
    assert_eq!(instance.invoke("f", &[])?, ExecutionResult::Trapped);
    Ok(())
}
