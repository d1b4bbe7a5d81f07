use anyhow::{Context, bail};
use wasmparser::{
    ConstExpr as WasmConstExpr, DataKind, ElementItems, ElementKind, ExternalKind, FuncType,
    FunctionBody, Operator, Parser, Payload, RefType, TableInit, TypeRef, ValType,
};

use super::instruction::{decode_op, resolve_block_targets};
use super::{
    Code, ConstExpr, DataSegment, ElemSegment, Export, ExportKind, FuncIdx, GlobalDef, GlobalType,
    Import, ImportKind, Limits, Module,
};
use crate::Value;

/// Parse an already validated binary module.
pub(super) fn parse(bytes: &[u8]) -> Result<Module, anyhow::Error> {
    let mut builder = ModuleBuilder::default();
    for payload in Parser::new(0).parse_all(bytes) {
        let payload = payload.context("parse error")?;
        dispatch_payload(&mut builder, payload)?;
    }
    Ok(builder.build())
}

#[derive(Default)]
struct ModuleBuilder {
    types: Vec<FuncType>,
    imports: Vec<Import>,
    func_types: Vec<u32>,
    num_imported_funcs: u32,
    codes: Vec<Code>,
    tables: Vec<Limits>,
    memory: Option<Limits>,
    num_imported_memories: u32,
    globals: Vec<GlobalDef>,
    exports: Vec<Export>,
    start: Option<FuncIdx>,
    elements: Vec<ElemSegment>,
    data: Vec<DataSegment>,
}

impl ModuleBuilder {
    fn build(self) -> Module {
        Module {
            types: self.types,
            imports: self.imports,
            func_types: self.func_types,
            num_imported_funcs: self.num_imported_funcs,
            codes: self.codes,
            tables: self.tables,
            memory: self.memory,
            globals: self.globals,
            exports: self.exports,
            start: self.start,
            elements: self.elements,
            data: self.data,
        }
    }

    fn parse_import(&mut self, module: &str, name: &str, ty: TypeRef) -> Result<(), anyhow::Error> {
        let kind = match ty {
            TypeRef::Func(type_idx) => {
                let func_ty = self
                    .types
                    .get(type_idx as usize)
                    .with_context(|| format!("import {module}.{name}: type {type_idx} out of range"))?;
                check_signature(func_ty)?;
                self.func_types.push(type_idx);
                self.num_imported_funcs += 1;
                ImportKind::Func(type_idx)
            }
            TypeRef::Table(table) => {
                check_funcref(table.element_type)?;
                ImportKind::Table(limits(table.initial, table.maximum)?)
            }
            TypeRef::Memory(memory) => {
                self.add_memory()?;
                self.num_imported_memories += 1;
                ImportKind::Memory(limits(memory.initial, memory.maximum)?)
            }
            TypeRef::Global(global) => {
                check_numeric(global.content_type)?;
                ImportKind::Global(GlobalType { ty: global.content_type, mutable: global.mutable })
            }
            other => bail!("unsupported import kind for {module}.{name}: {other:?}"),
        };
        self.imports.push(Import { module: module.to_string(), name: name.to_string(), kind });
        Ok(())
    }

    fn add_memory(&mut self) -> Result<(), anyhow::Error> {
        if self.memory.is_some() || self.num_imported_memories > 0 {
            bail!("multiple memories are not supported");
        }
        Ok(())
    }

    fn parse_element(&mut self, kind: ElementKind<'_>, items: ElementItems<'_>) -> Result<(), anyhow::Error> {
        // Passive and declared segments are only reachable through bulk table
        // instructions, which are rejected when decoding bodies.
        let ElementKind::Active { table_index, offset_expr } = kind else {
            return Ok(());
        };
        let offset = decode_const_expr(&offset_expr)?;
        let mut decoded = Vec::new();
        match items {
            ElementItems::Functions(reader) => {
                for idx in reader {
                    decoded.push(Some(FuncIdx(idx.context("element function index")?)));
                }
            }
            ElementItems::Expressions(_, reader) => {
                for expr in reader {
                    let expr = expr.context("element expression")?;
                    decoded.push(decode_elem_expr(&expr)?);
                }
            }
        }
        self.elements.push(ElemSegment {
            table_idx: table_index.unwrap_or(0),
            offset,
            items: decoded,
        });
        Ok(())
    }

    fn parse_code_entry(&mut self, body: FunctionBody<'_>) -> Result<(), anyhow::Error> {
        let defined = self.codes.len();
        let func_idx = self.num_imported_funcs as usize + defined;
        let type_idx = *self
            .func_types
            .get(func_idx)
            .with_context(|| format!("function {func_idx} has no declared type"))?;

        let mut locals = Vec::new();
        for entry in body.get_locals_reader()? {
            let (count, ty) = entry?;
            check_numeric(ty)?;
            locals.extend(std::iter::repeat_n(ty, count as usize));
        }

        let mut instructions = Vec::new();
        for op in body.get_operators_reader()? {
            let op = op?;
            let instr = decode_op(&op, &self.types).with_context(|| format!("function {func_idx}"))?;
            instructions.push(instr);
        }
        resolve_block_targets(&mut instructions);

        self.codes.push(Code { type_idx, locals, body: instructions });
        Ok(())
    }
}

/// Route a single parsed payload to the appropriate builder method.
fn dispatch_payload(builder: &mut ModuleBuilder, payload: Payload<'_>) -> Result<(), anyhow::Error> {
    match payload {
        Payload::TypeSection(reader) => {
            for ty in reader.into_iter_err_on_gc_types() {
                let ty = ty.context("type section")?;
                builder.types.push(ty);
            }
        }
        Payload::ImportSection(reader) => {
            for import in reader {
                let import = import.context("import section")?;
                builder.parse_import(import.module, import.name, import.ty)?;
            }
        }
        Payload::FunctionSection(reader) => {
            for type_idx in reader {
                let type_idx = type_idx.context("function section")?;
                let ty = builder
                    .types
                    .get(type_idx as usize)
                    .with_context(|| format!("type {type_idx} out of range"))?;
                check_signature(ty)?;
                builder.func_types.push(type_idx);
            }
        }
        Payload::TableSection(reader) => {
            for table in reader {
                let table = table.context("table section")?;
                check_funcref(table.ty.element_type)?;
                if !matches!(table.init, TableInit::RefNull) {
                    bail!("table initializer expressions are not supported");
                }
                builder.tables.push(limits(table.ty.initial, table.ty.maximum)?);
            }
        }
        Payload::MemorySection(reader) => {
            for memory in reader {
                let memory = memory.context("memory section")?;
                builder.add_memory()?;
                builder.memory = Some(limits(memory.initial, memory.maximum)?);
            }
        }
        Payload::GlobalSection(reader) => {
            for global in reader {
                let global = global.context("global section")?;
                check_numeric(global.ty.content_type)?;
                builder.globals.push(GlobalDef {
                    ty: GlobalType { ty: global.ty.content_type, mutable: global.ty.mutable },
                    init: decode_const_expr(&global.init_expr)?,
                });
            }
        }
        Payload::ExportSection(reader) => {
            for export in reader {
                let export = export.context("export section")?;
                let kind = match export.kind {
                    ExternalKind::Func => ExportKind::Func,
                    ExternalKind::Table => ExportKind::Table,
                    ExternalKind::Memory => ExportKind::Memory,
                    ExternalKind::Global => ExportKind::Global,
                    _ => continue,
                };
                builder.exports.push(Export { name: export.name.to_string(), kind, index: export.index });
            }
        }
        Payload::StartSection { func, .. } => {
            builder.start = Some(FuncIdx(func));
        }
        Payload::ElementSection(reader) => {
            for element in reader {
                let element = element.context("element section")?;
                builder.parse_element(element.kind, element.items)?;
            }
        }
        Payload::DataSection(reader) => {
            for data in reader {
                let data = data.context("data section")?;
                if let DataKind::Active { offset_expr, .. } = data.kind {
                    builder.data.push(DataSegment {
                        offset: decode_const_expr(&offset_expr)?,
                        bytes: data.data.to_vec(),
                    });
                }
            }
        }
        Payload::CodeSectionEntry(body) => builder.parse_code_entry(body)?,
        _ => {}
    }
    Ok(())
}

fn decode_const_expr(expr: &WasmConstExpr<'_>) -> Result<ConstExpr, anyhow::Error> {
    let mut reader = expr.get_operators_reader();
    let value = match reader.read()? {
        Operator::I32Const { value } => ConstExpr::Value(Value::I32(value)),
        Operator::I64Const { value } => ConstExpr::Value(Value::I64(value)),
        Operator::F32Const { value } => ConstExpr::Value(Value::F32(f32::from_bits(value.bits()))),
        Operator::F64Const { value } => ConstExpr::Value(Value::F64(f64::from_bits(value.bits()))),
        Operator::GlobalGet { global_index } => ConstExpr::GlobalGet(global_index),
        other => bail!("unsupported constant expression: {other:?}"),
    };
    match reader.read()? {
        Operator::End => Ok(value),
        other => bail!("unsupported constant expression: {other:?}"),
    }
}

fn decode_elem_expr(expr: &WasmConstExpr<'_>) -> Result<Option<FuncIdx>, anyhow::Error> {
    let mut reader = expr.get_operators_reader();
    match reader.read()? {
        Operator::RefFunc { function_index } => Ok(Some(FuncIdx(function_index))),
        Operator::RefNull { .. } => Ok(None),
        other => bail!("unsupported element expression: {other:?}"),
    }
}

fn limits(min: u64, max: Option<u64>) -> Result<Limits, anyhow::Error> {
    let min = u32::try_from(min).context("64-bit limits are not supported")?;
    let max = max.map(u32::try_from).transpose().context("64-bit limits are not supported")?;
    Ok(Limits { min, max })
}

fn check_numeric(ty: ValType) -> Result<(), anyhow::Error> {
    match ty {
        ValType::I32 | ValType::I64 | ValType::F32 | ValType::F64 => Ok(()),
        other => bail!("unsupported value type: {other:?}"),
    }
}

fn check_signature(ty: &FuncType) -> Result<(), anyhow::Error> {
    ty.params().iter().chain(ty.results()).try_for_each(|ty| check_numeric(*ty))
}

fn check_funcref(ty: RefType) -> Result<(), anyhow::Error> {
    if ty != RefType::FUNCREF {
        bail!("unsupported table element type: {ty:?}");
    }
    Ok(())
}
