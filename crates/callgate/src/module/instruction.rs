use anyhow::{Context, bail};
use wasmparser::{BlockType, FuncType, Operator};

/// A decoded instruction of a function body.
///
/// Block instructions carry the positions and arities the interpreter needs to
/// branch without rescanning the body; they are filled in by
/// [`resolve_block_targets`] once the whole body is decoded.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Instruction {
    Unreachable,
    Nop,
    Block { end_pc: usize, params: u32, results: u32 },
    Loop { params: u32 },
    If { else_pc: Option<usize>, end_pc: usize, params: u32, results: u32 },
    Else,
    End,
    Br(u32),
    BrIf(u32),
    BrTable { targets: Box<[u32]>, default: u32 },
    Return,
    Call(u32),
    CallIndirect { type_idx: u32, table_idx: u32 },
    Drop,
    Select,
    LocalGet(u32),
    LocalSet(u32),
    LocalTee(u32),
    GlobalGet(u32),
    GlobalSet(u32),
    Load { kind: LoadKind, offset: u64 },
    Store { kind: StoreKind, offset: u64 },
    MemorySize,
    MemoryGrow,
    I32Const(i32),
    I64Const(i64),
    F32Const(u32),
    F64Const(u64),
    Numeric(NumericOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoadKind {
    I32,
    I64,
    F32,
    F64,
    I32From8S,
    I32From8U,
    I32From16S,
    I32From16U,
    I64From8S,
    I64From8U,
    I64From16S,
    I64From16U,
    I64From32S,
    I64From32U,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StoreKind {
    I32,
    I64,
    F32,
    F64,
    I32To8,
    I32To16,
    I64To8,
    I64To16,
    I64To32,
}

macro_rules! numeric_ops {
    ($($name:ident)*) => {
        /// Stack-only numeric instructions, named as in the binary format.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub(crate) enum NumericOp {
            $($name,)*
        }

        fn decode_numeric(op: &Operator) -> Option<NumericOp> {
            match op {
                $(Operator::$name => Some(NumericOp::$name),)*
                _ => None,
            }
        }
    };
}

numeric_ops! {
    I32Eqz I32Eq I32Ne I32LtS I32LtU I32GtS I32GtU I32LeS I32LeU I32GeS I32GeU
    I64Eqz I64Eq I64Ne I64LtS I64LtU I64GtS I64GtU I64LeS I64LeU I64GeS I64GeU
    F32Eq F32Ne F32Lt F32Gt F32Le F32Ge
    F64Eq F64Ne F64Lt F64Gt F64Le F64Ge
    I32Clz I32Ctz I32Popcnt I32Add I32Sub I32Mul I32DivS I32DivU I32RemS I32RemU
    I32And I32Or I32Xor I32Shl I32ShrS I32ShrU I32Rotl I32Rotr
    I64Clz I64Ctz I64Popcnt I64Add I64Sub I64Mul I64DivS I64DivU I64RemS I64RemU
    I64And I64Or I64Xor I64Shl I64ShrS I64ShrU I64Rotl I64Rotr
    F32Abs F32Neg F32Ceil F32Floor F32Trunc F32Nearest F32Sqrt
    F32Add F32Sub F32Mul F32Div F32Min F32Max F32Copysign
    F64Abs F64Neg F64Ceil F64Floor F64Trunc F64Nearest F64Sqrt
    F64Add F64Sub F64Mul F64Div F64Min F64Max F64Copysign
    I32WrapI64 I32TruncF32S I32TruncF32U I32TruncF64S I32TruncF64U
    I64ExtendI32S I64ExtendI32U I64TruncF32S I64TruncF32U I64TruncF64S I64TruncF64U
    F32ConvertI32S F32ConvertI32U F32ConvertI64S F32ConvertI64U F32DemoteF64
    F64ConvertI32S F64ConvertI32U F64ConvertI64S F64ConvertI64U F64PromoteF32
    I32ReinterpretF32 I64ReinterpretF64 F32ReinterpretI32 F64ReinterpretI64
    I32Extend8S I32Extend16S I64Extend8S I64Extend16S I64Extend32S
    I32TruncSatF32S I32TruncSatF32U I32TruncSatF64S I32TruncSatF64U
    I64TruncSatF32S I64TruncSatF32U I64TruncSatF64S I64TruncSatF64U
}

/// Decode one operator. Operators outside the supported set are an error.
pub(crate) fn decode_op(op: &Operator, types: &[FuncType]) -> Result<Instruction, anyhow::Error> {
    if let Some(numeric) = decode_numeric(op) {
        return Ok(Instruction::Numeric(numeric));
    }
    let instr = match *op {
        Operator::Unreachable => Instruction::Unreachable,
        Operator::Nop => Instruction::Nop,
        Operator::Block { blockty } => {
            let (params, results) = block_arity(blockty, types)?;
            Instruction::Block { end_pc: 0, params, results }
        }
        Operator::Loop { blockty } => {
            let (params, _) = block_arity(blockty, types)?;
            Instruction::Loop { params }
        }
        Operator::If { blockty } => {
            let (params, results) = block_arity(blockty, types)?;
            Instruction::If { else_pc: None, end_pc: 0, params, results }
        }
        Operator::Else => Instruction::Else,
        Operator::End => Instruction::End,
        Operator::Br { relative_depth } => Instruction::Br(relative_depth),
        Operator::BrIf { relative_depth } => Instruction::BrIf(relative_depth),
        Operator::BrTable { ref targets } => {
            let labels = targets
                .targets()
                .collect::<Result<Vec<u32>, _>>()
                .context("br_table targets")?;
            Instruction::BrTable { targets: labels.into_boxed_slice(), default: targets.default() }
        }
        Operator::Return => Instruction::Return,
        Operator::Call { function_index } => Instruction::Call(function_index),
        Operator::CallIndirect { type_index, table_index, .. } => {
            Instruction::CallIndirect { type_idx: type_index, table_idx: table_index }
        }
        Operator::Drop => Instruction::Drop,
        Operator::Select | Operator::TypedSelect { .. } => Instruction::Select,
        Operator::LocalGet { local_index } => Instruction::LocalGet(local_index),
        Operator::LocalSet { local_index } => Instruction::LocalSet(local_index),
        Operator::LocalTee { local_index } => Instruction::LocalTee(local_index),
        Operator::GlobalGet { global_index } => Instruction::GlobalGet(global_index),
        Operator::GlobalSet { global_index } => Instruction::GlobalSet(global_index),
        Operator::I32Load { memarg } => load(LoadKind::I32, memarg.offset),
        Operator::I64Load { memarg } => load(LoadKind::I64, memarg.offset),
        Operator::F32Load { memarg } => load(LoadKind::F32, memarg.offset),
        Operator::F64Load { memarg } => load(LoadKind::F64, memarg.offset),
        Operator::I32Load8S { memarg } => load(LoadKind::I32From8S, memarg.offset),
        Operator::I32Load8U { memarg } => load(LoadKind::I32From8U, memarg.offset),
        Operator::I32Load16S { memarg } => load(LoadKind::I32From16S, memarg.offset),
        Operator::I32Load16U { memarg } => load(LoadKind::I32From16U, memarg.offset),
        Operator::I64Load8S { memarg } => load(LoadKind::I64From8S, memarg.offset),
        Operator::I64Load8U { memarg } => load(LoadKind::I64From8U, memarg.offset),
        Operator::I64Load16S { memarg } => load(LoadKind::I64From16S, memarg.offset),
        Operator::I64Load16U { memarg } => load(LoadKind::I64From16U, memarg.offset),
        Operator::I64Load32S { memarg } => load(LoadKind::I64From32S, memarg.offset),
        Operator::I64Load32U { memarg } => load(LoadKind::I64From32U, memarg.offset),
        Operator::I32Store { memarg } => store(StoreKind::I32, memarg.offset),
        Operator::I64Store { memarg } => store(StoreKind::I64, memarg.offset),
        Operator::F32Store { memarg } => store(StoreKind::F32, memarg.offset),
        Operator::F64Store { memarg } => store(StoreKind::F64, memarg.offset),
        Operator::I32Store8 { memarg } => store(StoreKind::I32To8, memarg.offset),
        Operator::I32Store16 { memarg } => store(StoreKind::I32To16, memarg.offset),
        Operator::I64Store8 { memarg } => store(StoreKind::I64To8, memarg.offset),
        Operator::I64Store16 { memarg } => store(StoreKind::I64To16, memarg.offset),
        Operator::I64Store32 { memarg } => store(StoreKind::I64To32, memarg.offset),
        Operator::MemorySize { .. } => Instruction::MemorySize,
        Operator::MemoryGrow { .. } => Instruction::MemoryGrow,
        Operator::I32Const { value } => Instruction::I32Const(value),
        Operator::I64Const { value } => Instruction::I64Const(value),
        Operator::F32Const { value } => Instruction::F32Const(value.bits()),
        Operator::F64Const { value } => Instruction::F64Const(value.bits()),
        ref other => bail!("unsupported instruction: {other:?}"),
    };
    Ok(instr)
}

fn load(kind: LoadKind, offset: u64) -> Instruction {
    Instruction::Load { kind, offset }
}

fn store(kind: StoreKind, offset: u64) -> Instruction {
    Instruction::Store { kind, offset }
}

/// Number of (params, results) of a block type.
fn block_arity(blockty: BlockType, types: &[FuncType]) -> Result<(u32, u32), anyhow::Error> {
    match blockty {
        BlockType::Empty => Ok((0, 0)),
        BlockType::Type(_) => Ok((0, 1)),
        BlockType::FuncType(idx) => {
            let ty = types
                .get(idx as usize)
                .with_context(|| format!("block type index {idx} out of range"))?;
            Ok((ty.params().len() as u32, ty.results().len() as u32))
        }
    }
}

/// Fill in `end_pc` and `else_pc` of every block-starting instruction.
pub(crate) fn resolve_block_targets(body: &mut [Instruction]) {
    // Open blocks as (start_pc, else_pc).
    let mut open: Vec<(usize, Option<usize>)> = Vec::new();

    for pc in 0..body.len() {
        match &body[pc] {
            Instruction::Block { .. } | Instruction::Loop { .. } | Instruction::If { .. } => {
                open.push((pc, None));
            }
            Instruction::Else => {
                if let Some(last) = open.last_mut() {
                    last.1 = Some(pc);
                }
            }
            Instruction::End => {
                // The final `end` of the body closes the function itself.
                let Some((start_pc, else_at)) = open.pop() else { continue };
                match &mut body[start_pc] {
                    Instruction::Block { end_pc, .. } => *end_pc = pc,
                    Instruction::If { end_pc, else_pc, .. } => {
                        *end_pc = pc;
                        *else_pc = else_at;
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }
}
