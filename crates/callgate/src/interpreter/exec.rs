use wasmparser::ValType;

use super::{Callee, dispatch, numeric};
use crate::limits::{MAX_MEMORY_PAGES_LIMIT, PAGE_SIZE};
use crate::module::Code;
use crate::module::instruction::{Instruction, LoadKind, StoreKind};
use crate::result::Trap;
use crate::{Callable, FuncIdx, Instance, Value};

#[derive(Debug, Clone, Copy)]
struct Label {
    /// Position of the block's `end`, or of the `loop` instruction itself.
    target: usize,
    stack_height: usize,
    arity: usize,
    is_loop: bool,
}

/// Run the body of a function defined by `instance`'s module.
///
/// Each invocation gets its own operand stack, locals and labels; nested wasm
/// calls recurse through [`dispatch`] on the native stack.
pub(super) fn run(instance: &Instance, code: &Code, args: &[Value], depth: u32) -> Result<Vec<Value>, Trap> {
    let module = &instance.module;
    let func_type = &module.types[code.type_idx as usize];
    let num_params = func_type.params().len();

    let mut locals: Vec<u64> = Vec::with_capacity(num_params + code.locals.len());
    locals.extend(args.iter().map(|arg| arg.to_bits()));
    locals.resize(num_params, 0);
    locals.resize(num_params + code.locals.len(), 0);

    let body = &code.body[..];
    let mut stack: Vec<u64> = Vec::new();
    // The function body is itself a block ending at its final `end`.
    let mut labels = vec![Label {
        target: body.len().saturating_sub(1),
        stack_height: 0,
        arity: func_type.results().len(),
        is_loop: false,
    }];
    let mut pc = 0;

    while pc < body.len() {
        let instr = &body[pc];
        pc += 1;
        match instr {
            Instruction::Unreachable => return Err(Trap::Unreachable),
            Instruction::Nop => {}
            Instruction::Block { end_pc, params, results } => labels.push(Label {
                target: *end_pc,
                stack_height: stack.len() - *params as usize,
                arity: *results as usize,
                is_loop: false,
            }),
            Instruction::Loop { params } => labels.push(Label {
                target: pc - 1,
                stack_height: stack.len() - *params as usize,
                arity: *params as usize,
                is_loop: true,
            }),
            Instruction::If { else_pc, end_pc, params, results } => {
                let cond = pop_i32(&mut stack);
                labels.push(Label {
                    target: *end_pc,
                    stack_height: stack.len() - *params as usize,
                    arity: *results as usize,
                    is_loop: false,
                });
                if cond == 0 {
                    match else_pc {
                        Some(else_pc) => pc = else_pc + 1,
                        None => {
                            labels.pop();
                            pc = end_pc + 1;
                        }
                    }
                }
            }
            Instruction::Else => {
                // Reached the end of a taken `then` arm.
                if let Some(label) = labels.pop() {
                    pc = label.target + 1;
                }
            }
            Instruction::End => {
                labels.pop();
            }
            Instruction::Br(relative_depth) => pc = branch(&mut stack, &mut labels, *relative_depth),
            Instruction::BrIf(relative_depth) => {
                if pop_i32(&mut stack) != 0 {
                    pc = branch(&mut stack, &mut labels, *relative_depth);
                }
            }
            Instruction::BrTable { targets, default } => {
                let index = pop_i32(&mut stack) as u32 as usize;
                let relative_depth = targets.get(index).copied().unwrap_or(*default);
                pc = branch(&mut stack, &mut labels, relative_depth);
            }
            Instruction::Return => break,
            Instruction::Call(func_idx) => {
                let func_idx = FuncIdx(*func_idx);
                let args = pop_args(&mut stack, module.callee_type(func_idx).params());
                let results = dispatch(instance, Callee::Index(func_idx), &args, depth + 1)?;
                push_results(&mut stack, &results);
            }
            Instruction::CallIndirect { type_idx, table_idx } => {
                let expected = &module.types[*type_idx as usize];
                let element = pop_i32(&mut stack) as u32;
                let callable = indirect_callee(instance, *table_idx, element, expected)?;
                let args = pop_args(&mut stack, expected.params());
                let results = dispatch(instance, Callee::Resolved(&callable), &args, depth + 1)?;
                push_results(&mut stack, &results);
            }
            Instruction::Drop => {
                stack.pop();
            }
            Instruction::Select => {
                let cond = pop_i32(&mut stack);
                let b = pop(&mut stack);
                let a = pop(&mut stack);
                stack.push(if cond != 0 { a } else { b });
            }
            Instruction::LocalGet(idx) => stack.push(locals[*idx as usize]),
            Instruction::LocalSet(idx) => locals[*idx as usize] = pop(&mut stack),
            Instruction::LocalTee(idx) => {
                if let Some(&top) = stack.last() {
                    locals[*idx as usize] = top;
                }
            }
            Instruction::GlobalGet(idx) => stack.push(instance.globals[*idx as usize].value.get().to_bits()),
            Instruction::GlobalSet(idx) => {
                let global = &instance.globals[*idx as usize];
                global.value.set(Value::from_bits(pop(&mut stack), global.ty.ty));
            }
            Instruction::Load { kind, offset } => {
                let address = pop_i32(&mut stack) as u32 as u64 + offset;
                stack.push(load(instance, address, *kind)?);
            }
            Instruction::Store { kind, offset } => {
                let value = pop(&mut stack);
                let address = pop_i32(&mut stack) as u32 as u64 + offset;
                store(instance, address, value, *kind)?;
            }
            Instruction::MemorySize => {
                let pages = instance.memory().map_or(0, |memory| memory.borrow().len() / PAGE_SIZE as usize);
                stack.push(pages as u64);
            }
            Instruction::MemoryGrow => {
                let delta = pop_i32(&mut stack) as u32;
                stack.push(memory_grow(instance, delta) as u32 as u64);
            }
            Instruction::I32Const(v) => stack.push(*v as u32 as u64),
            Instruction::I64Const(v) => stack.push(*v as u64),
            Instruction::F32Const(bits) => stack.push(*bits as u64),
            Instruction::F64Const(bits) => stack.push(*bits),
            Instruction::Numeric(op) => numeric::exec(&mut stack, *op)?,
        }
    }

    let result_types = func_type.results();
    let results_start = stack.len() - result_types.len();
    Ok(stack[results_start..]
        .iter()
        .zip(result_types)
        .map(|(bits, ty)| Value::from_bits(*bits, *ty))
        .collect())
}

/// Look up a table element for `call_indirect` and check its signature.
fn indirect_callee(
    instance: &Instance,
    table_idx: u32,
    element: u32,
    expected: &wasmparser::FuncType,
) -> Result<Callable, Trap> {
    let table = instance.tables[table_idx as usize].table.borrow();
    let entry = table.get(element as usize).ok_or(Trap::UndefinedElement { index: element })?;
    let function = entry.as_ref().ok_or(Trap::UninitializedElement { index: element })?;
    if function.ty != *expected {
        return Err(Trap::IndirectCallTypeMismatch);
    }
    Ok(function.callable.clone())
}

fn branch(stack: &mut Vec<u64>, labels: &mut Vec<Label>, relative_depth: u32) -> usize {
    let label_idx = labels.len() - 1 - relative_depth as usize;
    let label = labels[label_idx];

    stack_unwind(stack, label.stack_height, label.arity);
    if label.is_loop {
        labels.truncate(label_idx + 1);
    } else {
        labels.truncate(label_idx);
    }
    label.target + 1
}

fn stack_unwind(stack: &mut Vec<u64>, height: usize, arity: usize) {
    if arity == 0 {
        stack.truncate(height);
    } else if stack.len() - arity > height {
        let src = stack.len() - arity;
        stack.copy_within(src.., height);
        stack.truncate(height + arity);
    }
}

fn pop_args(stack: &mut Vec<u64>, params: &[ValType]) -> Vec<Value> {
    let start = stack.len() - params.len();
    let args = stack[start..]
        .iter()
        .zip(params)
        .map(|(bits, ty)| Value::from_bits(*bits, *ty))
        .collect();
    stack.truncate(start);
    args
}

fn push_results(stack: &mut Vec<u64>, results: &[Value]) {
    stack.extend(results.iter().map(|value| value.to_bits()));
}

fn memory_bytes<const N: usize>(memory: &[u8], address: u64) -> Result<[u8; N], Trap> {
    let start = usize::try_from(address).map_err(|_| Trap::OutOfBoundsMemoryAccess)?;
    let end = start.checked_add(N).ok_or(Trap::OutOfBoundsMemoryAccess)?;
    memory
        .get(start..end)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(Trap::OutOfBoundsMemoryAccess)
}

fn load(instance: &Instance, address: u64, kind: LoadKind) -> Result<u64, Trap> {
    let memory = instance.memory().ok_or(Trap::OutOfBoundsMemoryAccess)?.borrow();
    let bits = match kind {
        LoadKind::I32 | LoadKind::F32 => u32::from_le_bytes(memory_bytes(&memory, address)?) as u64,
        LoadKind::I64 | LoadKind::F64 => u64::from_le_bytes(memory_bytes(&memory, address)?),
        LoadKind::I32From8S => i8::from_le_bytes(memory_bytes(&memory, address)?) as i32 as u32 as u64,
        LoadKind::I32From8U => u8::from_le_bytes(memory_bytes(&memory, address)?) as u64,
        LoadKind::I32From16S => i16::from_le_bytes(memory_bytes(&memory, address)?) as i32 as u32 as u64,
        LoadKind::I32From16U => u16::from_le_bytes(memory_bytes(&memory, address)?) as u64,
        LoadKind::I64From8S => i8::from_le_bytes(memory_bytes(&memory, address)?) as i64 as u64,
        LoadKind::I64From8U => u8::from_le_bytes(memory_bytes(&memory, address)?) as u64,
        LoadKind::I64From16S => i16::from_le_bytes(memory_bytes(&memory, address)?) as i64 as u64,
        LoadKind::I64From16U => u16::from_le_bytes(memory_bytes(&memory, address)?) as u64,
        LoadKind::I64From32S => i32::from_le_bytes(memory_bytes(&memory, address)?) as i64 as u64,
        LoadKind::I64From32U => u32::from_le_bytes(memory_bytes(&memory, address)?) as u64,
    };
    Ok(bits)
}

fn store(instance: &Instance, address: u64, value: u64, kind: StoreKind) -> Result<(), Trap> {
    let mut memory = instance.memory().ok_or(Trap::OutOfBoundsMemoryAccess)?.borrow_mut();
    match kind {
        StoreKind::I32 | StoreKind::F32 | StoreKind::I64To32 => {
            write_bytes(&mut memory, address, &(value as u32).to_le_bytes())
        }
        StoreKind::I64 | StoreKind::F64 => write_bytes(&mut memory, address, &value.to_le_bytes()),
        StoreKind::I32To8 | StoreKind::I64To8 => write_bytes(&mut memory, address, &[value as u8]),
        StoreKind::I32To16 | StoreKind::I64To16 => {
            write_bytes(&mut memory, address, &(value as u16).to_le_bytes())
        }
    }
}

fn write_bytes(memory: &mut [u8], address: u64, bytes: &[u8]) -> Result<(), Trap> {
    let start = usize::try_from(address).map_err(|_| Trap::OutOfBoundsMemoryAccess)?;
    let end = start.checked_add(bytes.len()).ok_or(Trap::OutOfBoundsMemoryAccess)?;
    memory
        .get_mut(start..end)
        .ok_or(Trap::OutOfBoundsMemoryAccess)?
        .copy_from_slice(bytes);
    Ok(())
}

/// Grow memory by `delta` pages. Returns the previous size in pages, or -1.
fn memory_grow(instance: &Instance, delta: u32) -> i32 {
    let Some(memory) = &instance.memory else {
        return -1;
    };
    let mut bytes = memory.memory.borrow_mut();
    let current = (bytes.len() / PAGE_SIZE as usize) as u32;
    let max = memory
        .limits
        .max
        .unwrap_or(MAX_MEMORY_PAGES_LIMIT)
        .min(instance.memory_pages_limit);
    match current.checked_add(delta) {
        Some(new_pages) if new_pages <= max => {
            bytes.resize(new_pages as usize * PAGE_SIZE as usize, 0);
            current as i32
        }
        _ => -1,
    }
}

// Validation guarantees the operand stack holds a value at every pop site.
#[inline(always)]
pub(super) fn pop(stack: &mut Vec<u64>) -> u64 {
    stack.pop().unwrap_or_default()
}

#[inline(always)]
pub(super) fn pop_i32(stack: &mut Vec<u64>) -> i32 {
    pop(stack) as i32
}

#[inline(always)]
pub(super) fn pop_i64(stack: &mut Vec<u64>) -> i64 {
    pop(stack) as i64
}

#[inline(always)]
pub(super) fn pop_f32(stack: &mut Vec<u64>) -> f32 {
    f32::from_bits(pop(stack) as u32)
}

#[inline(always)]
pub(super) fn pop_f64(stack: &mut Vec<u64>) -> f64 {
    f64::from_bits(pop(stack))
}
