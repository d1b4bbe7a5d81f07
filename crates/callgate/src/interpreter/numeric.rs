//! Numeric instructions operating purely on the operand stack.

use super::exec::{pop_f32, pop_f64, pop_i32, pop_i64};
use crate::module::instruction::NumericOp;
use crate::result::Trap;

macro_rules! push_i32 {
    ($stack:expr, $v:expr) => {
        $stack.push($v as u32 as u64)
    };
}
macro_rules! push_i64 {
    ($stack:expr, $v:expr) => {
        $stack.push($v as u64)
    };
}
macro_rules! push_f32 {
    ($stack:expr, $v:expr) => {
        $stack.push(($v).to_bits() as u64)
    };
}
macro_rules! push_f64 {
    ($stack:expr, $v:expr) => {
        $stack.push(($v).to_bits())
    };
}

macro_rules! binop {
    ($stack:expr, $pop:ident, $push:ident, $op:expr) => {{
        let b = $pop($stack);
        let a = $pop($stack);
        $push!($stack, $op(a, b));
    }};
}

macro_rules! unop {
    ($stack:expr, $pop:ident, $push:ident, $op:expr) => {{
        let a = $pop($stack);
        $push!($stack, $op(a));
    }};
}

macro_rules! cmpop {
    ($stack:expr, $pop:ident, $op:expr) => {{
        let b = $pop($stack);
        let a = $pop($stack);
        push_i32!($stack, if $op(a, b) { 1i32 } else { 0i32 });
    }};
}

macro_rules! trunc_op {
    ($stack:expr, $pop:ident, $push:ident, $int_ty:ty, $max_bound:expr, $min_bound:expr) => {{
        let a = $pop($stack);
        if a.is_nan() {
            return Err(Trap::InvalidConversion);
        }
        let t = a.trunc();
        if t >= $max_bound || t < $min_bound {
            return Err(Trap::IntegerOverflow);
        }
        $push!($stack, t as $int_ty);
    }};
}

macro_rules! trunc_op_u {
    ($stack:expr, $pop:ident, $push:ident, $uint_ty:ty, $max_bound:expr) => {{
        let a = $pop($stack);
        if a.is_nan() {
            return Err(Trap::InvalidConversion);
        }
        let t = a.trunc();
        // trunc(-0.5) is -0.0, which compares equal to 0.0.
        if t >= $max_bound || t < 0.0 {
            return Err(Trap::IntegerOverflow);
        }
        $push!($stack, t as $uint_ty);
    }};
}

pub(super) fn exec(stack: &mut Vec<u64>, op: NumericOp) -> Result<(), Trap> {
    use NumericOp::*;

    match op {
        I32Eqz => unop!(stack, pop_i32, push_i32, |a: i32| (a == 0) as i32),
        I32Eq => cmpop!(stack, pop_i32, |a: i32, b: i32| a == b),
        I32Ne => cmpop!(stack, pop_i32, |a: i32, b: i32| a != b),
        I32LtS => cmpop!(stack, pop_i32, |a: i32, b: i32| a < b),
        I32LtU => cmpop!(stack, pop_i32, |a: i32, b: i32| (a as u32) < (b as u32)),
        I32GtS => cmpop!(stack, pop_i32, |a: i32, b: i32| a > b),
        I32GtU => cmpop!(stack, pop_i32, |a: i32, b: i32| (a as u32) > (b as u32)),
        I32LeS => cmpop!(stack, pop_i32, |a: i32, b: i32| a <= b),
        I32LeU => cmpop!(stack, pop_i32, |a: i32, b: i32| (a as u32) <= (b as u32)),
        I32GeS => cmpop!(stack, pop_i32, |a: i32, b: i32| a >= b),
        I32GeU => cmpop!(stack, pop_i32, |a: i32, b: i32| (a as u32) >= (b as u32)),

        I64Eqz => {
            let a = pop_i64(stack);
            push_i32!(stack, (a == 0) as i32);
        }
        I64Eq => cmpop!(stack, pop_i64, |a: i64, b: i64| a == b),
        I64Ne => cmpop!(stack, pop_i64, |a: i64, b: i64| a != b),
        I64LtS => cmpop!(stack, pop_i64, |a: i64, b: i64| a < b),
        I64LtU => cmpop!(stack, pop_i64, |a: i64, b: i64| (a as u64) < (b as u64)),
        I64GtS => cmpop!(stack, pop_i64, |a: i64, b: i64| a > b),
        I64GtU => cmpop!(stack, pop_i64, |a: i64, b: i64| (a as u64) > (b as u64)),
        I64LeS => cmpop!(stack, pop_i64, |a: i64, b: i64| a <= b),
        I64LeU => cmpop!(stack, pop_i64, |a: i64, b: i64| (a as u64) <= (b as u64)),
        I64GeS => cmpop!(stack, pop_i64, |a: i64, b: i64| a >= b),
        I64GeU => cmpop!(stack, pop_i64, |a: i64, b: i64| (a as u64) >= (b as u64)),

        F32Eq => cmpop!(stack, pop_f32, |a: f32, b: f32| a == b),
        F32Ne => cmpop!(stack, pop_f32, |a: f32, b: f32| a != b),
        F32Lt => cmpop!(stack, pop_f32, |a: f32, b: f32| a < b),
        F32Gt => cmpop!(stack, pop_f32, |a: f32, b: f32| a > b),
        F32Le => cmpop!(stack, pop_f32, |a: f32, b: f32| a <= b),
        F32Ge => cmpop!(stack, pop_f32, |a: f32, b: f32| a >= b),
        F64Eq => cmpop!(stack, pop_f64, |a: f64, b: f64| a == b),
        F64Ne => cmpop!(stack, pop_f64, |a: f64, b: f64| a != b),
        F64Lt => cmpop!(stack, pop_f64, |a: f64, b: f64| a < b),
        F64Gt => cmpop!(stack, pop_f64, |a: f64, b: f64| a > b),
        F64Le => cmpop!(stack, pop_f64, |a: f64, b: f64| a <= b),
        F64Ge => cmpop!(stack, pop_f64, |a: f64, b: f64| a >= b),

        I32Clz => unop!(stack, pop_i32, push_i32, |a: i32| a.leading_zeros()),
        I32Ctz => unop!(stack, pop_i32, push_i32, |a: i32| a.trailing_zeros()),
        I32Popcnt => unop!(stack, pop_i32, push_i32, |a: i32| a.count_ones()),
        I32Add => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a.wrapping_add(b)),
        I32Sub => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a.wrapping_sub(b)),
        I32Mul => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a.wrapping_mul(b)),
        I32DivS => {
            let b = pop_i32(stack);
            let a = pop_i32(stack);
            if b == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i32!(stack, a.checked_div(b).ok_or(Trap::IntegerOverflow)?);
        }
        I32DivU => {
            let b = pop_i32(stack) as u32;
            let a = pop_i32(stack) as u32;
            push_i32!(stack, a.checked_div(b).ok_or(Trap::IntegerDivideByZero)?);
        }
        I32RemS => {
            let b = pop_i32(stack);
            let a = pop_i32(stack);
            if b == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i32!(stack, a.wrapping_rem(b));
        }
        I32RemU => {
            let b = pop_i32(stack) as u32;
            let a = pop_i32(stack) as u32;
            push_i32!(stack, a.checked_rem(b).ok_or(Trap::IntegerDivideByZero)?);
        }
        I32And => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a & b),
        I32Or => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a | b),
        I32Xor => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a ^ b),
        I32Shl => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a.wrapping_shl(b as u32)),
        I32ShrS => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a.wrapping_shr(b as u32)),
        I32ShrU => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| (a as u32).wrapping_shr(b as u32)),
        I32Rotl => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a.rotate_left(b as u32)),
        I32Rotr => binop!(stack, pop_i32, push_i32, |a: i32, b: i32| a.rotate_right(b as u32)),

        I64Clz => unop!(stack, pop_i64, push_i64, |a: i64| a.leading_zeros() as i64),
        I64Ctz => unop!(stack, pop_i64, push_i64, |a: i64| a.trailing_zeros() as i64),
        I64Popcnt => unop!(stack, pop_i64, push_i64, |a: i64| a.count_ones() as i64),
        I64Add => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a.wrapping_add(b)),
        I64Sub => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a.wrapping_sub(b)),
        I64Mul => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a.wrapping_mul(b)),
        I64DivS => {
            let b = pop_i64(stack);
            let a = pop_i64(stack);
            if b == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i64!(stack, a.checked_div(b).ok_or(Trap::IntegerOverflow)?);
        }
        I64DivU => {
            let b = pop_i64(stack) as u64;
            let a = pop_i64(stack) as u64;
            push_i64!(stack, a.checked_div(b).ok_or(Trap::IntegerDivideByZero)?);
        }
        I64RemS => {
            let b = pop_i64(stack);
            let a = pop_i64(stack);
            if b == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            push_i64!(stack, a.wrapping_rem(b));
        }
        I64RemU => {
            let b = pop_i64(stack) as u64;
            let a = pop_i64(stack) as u64;
            push_i64!(stack, a.checked_rem(b).ok_or(Trap::IntegerDivideByZero)?);
        }
        I64And => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a & b),
        I64Or => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a | b),
        I64Xor => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a ^ b),
        I64Shl => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a.wrapping_shl(b as u32)),
        I64ShrS => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a.wrapping_shr(b as u32)),
        I64ShrU => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| (a as u64).wrapping_shr(b as u32)),
        I64Rotl => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a.rotate_left(b as u32)),
        I64Rotr => binop!(stack, pop_i64, push_i64, |a: i64, b: i64| a.rotate_right(b as u32)),

        F32Abs => unop!(stack, pop_f32, push_f32, |a: f32| a.abs()),
        F32Neg => unop!(stack, pop_f32, push_f32, |a: f32| -a),
        F32Ceil => unop!(stack, pop_f32, push_f32, |a: f32| a.ceil()),
        F32Floor => unop!(stack, pop_f32, push_f32, |a: f32| a.floor()),
        F32Trunc => unop!(stack, pop_f32, push_f32, |a: f32| a.trunc()),
        F32Nearest => unop!(stack, pop_f32, push_f32, wasm_nearest::<f32>),
        F32Sqrt => unop!(stack, pop_f32, push_f32, |a: f32| a.sqrt()),
        F32Add => binop!(stack, pop_f32, push_f32, |a: f32, b: f32| a + b),
        F32Sub => binop!(stack, pop_f32, push_f32, |a: f32, b: f32| a - b),
        F32Mul => binop!(stack, pop_f32, push_f32, |a: f32, b: f32| a * b),
        F32Div => binop!(stack, pop_f32, push_f32, |a: f32, b: f32| a / b),
        F32Min => binop!(stack, pop_f32, push_f32, wasm_min::<f32>),
        F32Max => binop!(stack, pop_f32, push_f32, wasm_max::<f32>),
        F32Copysign => binop!(stack, pop_f32, push_f32, |a: f32, b: f32| a.copysign(b)),

        F64Abs => unop!(stack, pop_f64, push_f64, |a: f64| a.abs()),
        F64Neg => unop!(stack, pop_f64, push_f64, |a: f64| -a),
        F64Ceil => unop!(stack, pop_f64, push_f64, |a: f64| a.ceil()),
        F64Floor => unop!(stack, pop_f64, push_f64, |a: f64| a.floor()),
        F64Trunc => unop!(stack, pop_f64, push_f64, |a: f64| a.trunc()),
        F64Nearest => unop!(stack, pop_f64, push_f64, wasm_nearest::<f64>),
        F64Sqrt => unop!(stack, pop_f64, push_f64, |a: f64| a.sqrt()),
        F64Add => binop!(stack, pop_f64, push_f64, |a: f64, b: f64| a + b),
        F64Sub => binop!(stack, pop_f64, push_f64, |a: f64, b: f64| a - b),
        F64Mul => binop!(stack, pop_f64, push_f64, |a: f64, b: f64| a * b),
        F64Div => binop!(stack, pop_f64, push_f64, |a: f64, b: f64| a / b),
        F64Min => binop!(stack, pop_f64, push_f64, wasm_min::<f64>),
        F64Max => binop!(stack, pop_f64, push_f64, wasm_max::<f64>),
        F64Copysign => binop!(stack, pop_f64, push_f64, |a: f64, b: f64| a.copysign(b)),

        I32WrapI64 => unop!(stack, pop_i64, push_i32, |a: i64| a as i32),
        I32TruncF32S => trunc_op!(stack, pop_f32, push_i32, i32, 2147483648.0_f32, -2147483648.0_f32),
        I32TruncF32U => trunc_op_u!(stack, pop_f32, push_i32, u32, 4294967296.0_f32),
        I32TruncF64S => trunc_op!(stack, pop_f64, push_i32, i32, 2147483648.0_f64, -2147483648.0_f64),
        I32TruncF64U => trunc_op_u!(stack, pop_f64, push_i32, u32, 4294967296.0_f64),
        I64ExtendI32S => unop!(stack, pop_i32, push_i64, |a: i32| a as i64),
        I64ExtendI32U => unop!(stack, pop_i32, push_i64, |a: i32| a as u32 as i64),
        I64TruncF32S => trunc_op!(
            stack,
            pop_f32,
            push_i64,
            i64,
            9223372036854775808.0_f32,
            -9223372036854775808.0_f32
        ),
        I64TruncF32U => trunc_op_u!(stack, pop_f32, push_i64, u64, 18446744073709551616.0_f32),
        I64TruncF64S => trunc_op!(
            stack,
            pop_f64,
            push_i64,
            i64,
            9223372036854775808.0_f64,
            -9223372036854775808.0_f64
        ),
        I64TruncF64U => trunc_op_u!(stack, pop_f64, push_i64, u64, 18446744073709551616.0_f64),
        F32ConvertI32S => unop!(stack, pop_i32, push_f32, |a: i32| a as f32),
        F32ConvertI32U => unop!(stack, pop_i32, push_f32, |a: i32| a as u32 as f32),
        F32ConvertI64S => unop!(stack, pop_i64, push_f32, |a: i64| a as f32),
        F32ConvertI64U => unop!(stack, pop_i64, push_f32, |a: i64| a as u64 as f32),
        F32DemoteF64 => unop!(stack, pop_f64, push_f32, |a: f64| a as f32),
        F64ConvertI32S => unop!(stack, pop_i32, push_f64, |a: i32| a as f64),
        F64ConvertI32U => unop!(stack, pop_i32, push_f64, |a: i32| a as u32 as f64),
        F64ConvertI64S => unop!(stack, pop_i64, push_f64, |a: i64| a as f64),
        F64ConvertI64U => unop!(stack, pop_i64, push_f64, |a: i64| a as u64 as f64),
        F64PromoteF32 => unop!(stack, pop_f32, push_f64, |a: f32| a as f64),
        // Reinterpretations leave the raw bits untouched, apart from
        // normalizing 32-bit values to their zero-extended form.
        I32ReinterpretF32 | F32ReinterpretI32 => unop!(stack, pop_i32, push_i32, |a: i32| a),
        I64ReinterpretF64 | F64ReinterpretI64 => {}

        I32Extend8S => unop!(stack, pop_i32, push_i32, |a: i32| a as i8 as i32),
        I32Extend16S => unop!(stack, pop_i32, push_i32, |a: i32| a as i16 as i32),
        I64Extend8S => unop!(stack, pop_i64, push_i64, |a: i64| a as i8 as i64),
        I64Extend16S => unop!(stack, pop_i64, push_i64, |a: i64| a as i16 as i64),
        I64Extend32S => unop!(stack, pop_i64, push_i64, |a: i64| a as i32 as i64),

        // Rust's float-to-int `as` casts saturate and map NaN to zero.
        I32TruncSatF32S => unop!(stack, pop_f32, push_i32, |a: f32| a as i32),
        I32TruncSatF32U => unop!(stack, pop_f32, push_i32, |a: f32| a as u32),
        I32TruncSatF64S => unop!(stack, pop_f64, push_i32, |a: f64| a as i32),
        I32TruncSatF64U => unop!(stack, pop_f64, push_i32, |a: f64| a as u32),
        I64TruncSatF32S => unop!(stack, pop_f32, push_i64, |a: f32| a as i64),
        I64TruncSatF32U => unop!(stack, pop_f32, push_i64, |a: f32| a as u64),
        I64TruncSatF64S => unop!(stack, pop_f64, push_i64, |a: f64| a as i64),
        I64TruncSatF64U => unop!(stack, pop_f64, push_i64, |a: f64| a as u64),
    }
    Ok(())
}

/// WASM float min with NaN propagation and signed zero handling.
fn wasm_min<F: Float>(a: F, b: F) -> F {
    if a.is_nan() || b.is_nan() {
        F::NAN
    } else if a.is_zero() && b.is_zero() {
        if a.is_sign_negative() || b.is_sign_negative() { F::NEG_ZERO } else { F::ZERO }
    } else {
        a.float_min(b)
    }
}

/// WASM float max with NaN propagation and signed zero handling.
fn wasm_max<F: Float>(a: F, b: F) -> F {
    if a.is_nan() || b.is_nan() {
        F::NAN
    } else if a.is_zero() && b.is_zero() {
        if a.is_sign_positive() || b.is_sign_positive() { F::ZERO } else { F::NEG_ZERO }
    } else {
        a.float_max(b)
    }
}

/// Round to nearest, ties to even. Rounding keeps the sign of zero results.
fn wasm_nearest<F: Float>(a: F) -> F {
    a.round_ties_even()
}

trait Float: Copy {
    const NAN: Self;
    const ZERO: Self;
    const NEG_ZERO: Self;
    fn is_nan(self) -> bool;
    fn is_zero(self) -> bool;
    fn is_sign_negative(self) -> bool;
    fn is_sign_positive(self) -> bool;
    fn float_min(self, other: Self) -> Self;
    fn float_max(self, other: Self) -> Self;
    fn round_ties_even(self) -> Self;
}

macro_rules! impl_float {
    ($ty:ty) => {
        impl Float for $ty {
            const NAN: Self = <$ty>::NAN;
            const ZERO: Self = 0.0;
            const NEG_ZERO: Self = -0.0;
            fn is_nan(self) -> bool { <$ty>::is_nan(self) }
            fn is_zero(self) -> bool { self == 0.0 }
            fn is_sign_negative(self) -> bool { <$ty>::is_sign_negative(self) }
            fn is_sign_positive(self) -> bool { <$ty>::is_sign_positive(self) }
            fn float_min(self, other: Self) -> Self { self.min(other) }
            fn float_max(self, other: Self) -> Self { self.max(other) }
            fn round_ties_even(self) -> Self { <$ty>::round_ties_even(self) }
        }
    };
}

impl_float!(f32);
impl_float!(f64);
