//! Parsed and validated WebAssembly modules.

mod builder;
pub(crate) mod instruction;

use anyhow::Context;
use wasmparser::{FuncType, ValType};

use crate::{Engine, Value};
use instruction::Instruction;

/// Index into a module's function index space (imports first).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncIdx(pub u32);

impl From<u32> for FuncIdx {
    fn from(idx: u32) -> Self {
        FuncIdx(idx)
    }
}

/// Size limits of a table (in elements) or a memory (in pages).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub min: u32,
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalType {
    pub ty: ValType,
    pub mutable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportKind {
    /// Index into the module's type section.
    Func(u32),
    Table(Limits),
    Memory(Limits),
    Global(GlobalType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Func,
    Table,
    Memory,
    Global,
}

/// A constant expression as used by global initializers and segment offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ConstExpr {
    Value(Value),
    GlobalGet(u32),
}

#[derive(Debug, Clone)]
pub(crate) struct GlobalDef {
    pub(crate) ty: GlobalType,
    pub(crate) init: ConstExpr,
}

/// An active element segment. `None` items are null references.
#[derive(Debug, Clone)]
pub(crate) struct ElemSegment {
    pub(crate) table_idx: u32,
    pub(crate) offset: ConstExpr,
    pub(crate) items: Vec<Option<FuncIdx>>,
}

/// An active data segment.
#[derive(Debug, Clone)]
pub(crate) struct DataSegment {
    pub(crate) offset: ConstExpr,
    pub(crate) bytes: Vec<u8>,
}

/// Body of a function defined by the module.
#[derive(Debug)]
pub(crate) struct Code {
    pub(crate) type_idx: u32,
    /// Declared locals, excluding parameters.
    pub(crate) locals: Vec<ValType>,
    pub(crate) body: Vec<Instruction>,
}

/// A parsed and validated WebAssembly module.
///
/// This is the immutable code side; runtime state lives in an
/// [`Instance`](crate::Instance).
#[derive(Debug)]
pub struct Module {
    pub(crate) types: Vec<FuncType>,
    pub(crate) imports: Vec<Import>,
    /// Type index of every function, imported functions first.
    pub(crate) func_types: Vec<u32>,
    pub(crate) num_imported_funcs: u32,
    pub(crate) codes: Vec<Code>,
    /// Tables and memory defined by the module, not counting imports.
    pub(crate) tables: Vec<Limits>,
    pub(crate) memory: Option<Limits>,
    pub(crate) globals: Vec<GlobalDef>,
    pub(crate) exports: Vec<Export>,
    pub(crate) start: Option<FuncIdx>,
    pub(crate) elements: Vec<ElemSegment>,
    pub(crate) data: Vec<DataSegment>,
}

impl Module {
    /// Compile a module from WebAssembly text.
    pub fn new(engine: &Engine, wat: &str) -> Result<Self, anyhow::Error> {
        let bytes = wat::parse_str(wat)?;
        Self::from_bytes(engine, &bytes)
    }

    /// Compile a module from text or binary bytes.
    pub fn from_file_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, anyhow::Error> {
        let bytes = wat::parse_bytes(bytes)?;
        Self::from_bytes(engine, &bytes)
    }

    /// Validate and decode a binary module.
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, anyhow::Error> {
        engine
            .new_validator()
            .validate_all(bytes)
            .context("validation error")?;
        let module = builder::parse(bytes)?;
        tracing::debug!(
            functions = module.func_types.len(),
            imports = module.imports.len(),
            exports = module.exports.len(),
            "module loaded"
        );
        Ok(module)
    }

    pub fn types(&self) -> &[FuncType] {
        &self.types
    }

    pub fn imports(&self) -> &[Import] {
        &self.imports
    }

    pub fn exports(&self) -> &[Export] {
        &self.exports
    }

    /// Number of functions, including imported ones.
    pub fn func_count(&self) -> u32 {
        self.func_types.len() as u32
    }

    /// Signature of a function in the module's index space.
    pub fn func_type(&self, idx: FuncIdx) -> Option<&FuncType> {
        let type_idx = *self.func_types.get(idx.0 as usize)?;
        self.types.get(type_idx as usize)
    }

    /// Signature of the n-th imported function.
    pub fn imported_function_type(&self, n: usize) -> Option<&FuncType> {
        self.imported_function_types().nth(n)
    }

    pub fn find_exported_function(&self, name: &str) -> Option<FuncIdx> {
        self.find_export(name, ExportKind::Func).map(FuncIdx)
    }

    pub(crate) fn find_export(&self, name: &str, kind: ExportKind) -> Option<u32> {
        self.exports
            .iter()
            .find(|export| export.kind == kind && export.name == name)
            .map(|export| export.index)
    }

    /// Signature of a call target that validation has already checked.
    pub(crate) fn callee_type(&self, idx: FuncIdx) -> &FuncType {
        &self.types[self.func_types[idx.0 as usize] as usize]
    }

    /// Body of a function defined by this module; `None` for imports.
    pub(crate) fn code(&self, idx: FuncIdx) -> Option<&Code> {
        let defined = idx.0.checked_sub(self.num_imported_funcs)?;
        self.codes.get(defined as usize)
    }

    pub(crate) fn imported_function_types(&self) -> impl Iterator<Item = &FuncType> {
        self.imports.iter().filter_map(|import| match import.kind {
            ImportKind::Func(type_idx) => self.types.get(type_idx as usize),
            _ => None,
        })
    }

    pub(crate) fn imported_tables(&self) -> impl Iterator<Item = &Limits> {
        self.imports.iter().filter_map(|import| match &import.kind {
            ImportKind::Table(limits) => Some(limits),
            _ => None,
        })
    }

    pub(crate) fn imported_memories(&self) -> impl Iterator<Item = &Limits> {
        self.imports.iter().filter_map(|import| match &import.kind {
            ImportKind::Memory(limits) => Some(limits),
            _ => None,
        })
    }

    pub(crate) fn imported_globals(&self) -> impl Iterator<Item = &GlobalType> {
        self.imports.iter().filter_map(|import| match &import.kind {
            ImportKind::Global(ty) => Some(ty),
            _ => None,
        })
    }
}
