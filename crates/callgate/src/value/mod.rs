use std::fmt;

use wasmparser::ValType;

/// A WebAssembly numeric value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
}

impl Value {
    /// The zero value of a numeric type.
    pub fn default_for(ty: ValType) -> Option<Self> {
        match ty {
            ValType::I32 => Some(Value::I32(0)),
            ValType::I64 => Some(Value::I64(0)),
            ValType::F32 => Some(Value::F32(0.0)),
            ValType::F64 => Some(Value::F64(0.0)),
            _ => None,
        }
    }

    pub fn ty(self) -> ValType {
        match self {
            Value::I32(_) => ValType::I32,
            Value::I64(_) => ValType::I64,
            Value::F32(_) => ValType::F32,
            Value::F64(_) => ValType::F64,
        }
    }

    pub fn as_i32(self) -> Option<i32> {
        match self {
            Value::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(self) -> Option<f32> {
        match self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Pack a Value into a raw u64 for the untyped operand stack.
    #[inline(always)]
    pub fn to_bits(self) -> u64 {
        match self {
            Value::I32(v) => v as u32 as u64,
            Value::I64(v) => v as u64,
            Value::F32(v) => v.to_bits() as u64,
            Value::F64(v) => v.to_bits(),
        }
    }

    /// Unpack raw stack bits as a value of type `ty`.
    ///
    /// Modules using non-numeric types in signatures, locals or globals are
    /// rejected at load time, so only the numeric arms are reachable.
    #[inline(always)]
    pub fn from_bits(bits: u64, ty: ValType) -> Self {
        match ty {
            ValType::I32 => Value::I32(bits as u32 as i32),
            ValType::F32 => Value::F32(f32::from_bits(bits as u32)),
            ValType::F64 => Value::F64(f64::from_bits(bits)),
            _ => Value::I64(bits as i64),
        }
    }

    /// Parse a textual argument as a value of type `ty`.
    pub fn parse(text: &str, ty: ValType) -> Result<Self, anyhow::Error> {
        let value = match ty {
            ValType::I32 => match text.parse::<i32>() {
                Ok(v) => Value::I32(v),
                Err(_) => Value::I32(text.parse::<u32>()? as i32),
            },
            ValType::I64 => match text.parse::<i64>() {
                Ok(v) => Value::I64(v),
                Err(_) => Value::I64(text.parse::<u64>()? as i64),
            },
            ValType::F32 => Value::F32(text.parse()?),
            ValType::F64 => Value::F64(text.parse()?),
            other => anyhow::bail!("unsupported value type: {other:?}"),
        };
        Ok(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::I32(v) => write!(f, "{v}:i32"),
            Value::I64(v) => write!(f, "{v}:i64"),
            Value::F32(v) => write!(f, "{v}:f32"),
            Value::F64(v) => write!(f, "{v}:f64"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::I32(v as i32)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::I64(v as i64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}
