//! Instantiated modules and their runtime state.

mod instantiation;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

pub use instantiation::{Imports, InstantiateError, instantiate, instantiate_with_limit};

use crate::module::{ExportKind, GlobalType, Limits, Module};
use crate::{ExecutionResult, ExternalFunction, FuncIdx, Value, interpreter};

/// Function table storage, shared between an exporting and importing instance.
pub type SharedTable = Rc<RefCell<Vec<Option<ExternalFunction>>>>;
/// Linear memory storage.
pub type SharedMemory = Rc<RefCell<Vec<u8>>>;
pub type SharedGlobal = Rc<Cell<Value>>;

#[derive(Debug, Clone)]
pub struct ExternalTable {
    pub table: SharedTable,
    pub limits: Limits,
}

impl ExternalTable {
    /// A fresh table of `limits.min` uninitialized elements.
    pub fn new(limits: Limits) -> Self {
        Self { table: Rc::new(RefCell::new(vec![None; limits.min as usize])), limits }
    }
}

#[derive(Debug, Clone)]
pub struct ExternalMemory {
    pub memory: SharedMemory,
    /// Limits in pages.
    pub limits: Limits,
}

#[derive(Debug, Clone)]
pub struct ExternalGlobal {
    pub value: SharedGlobal,
    pub ty: GlobalType,
}

impl ExternalGlobal {
    pub fn new(value: Value, mutable: bool) -> Self {
        Self { value: Rc::new(Cell::new(value)), ty: GlobalType { ty: value.ty(), mutable } }
    }
}

/// An instantiated WebAssembly module.
///
/// Instances are created as `Rc<Instance>` by [`instantiate`]. Exported
/// functions refer back to the instance through a weak handle, so an instance
/// must be kept alive by its owner for as long as anything may call into it.
/// Functions it writes into an imported table are the exception and keep it
/// alive.
pub struct Instance {
    pub(crate) module: Rc<Module>,
    pub(crate) imported_functions: Vec<ExternalFunction>,
    /// Imported tables first, then tables defined by the module.
    pub(crate) tables: Vec<ExternalTable>,
    pub(crate) memory: Option<ExternalMemory>,
    pub(crate) memory_pages_limit: u32,
    /// Imported globals first, then globals defined by the module.
    pub(crate) globals: Vec<ExternalGlobal>,
}

impl Instance {
    pub fn module(&self) -> &Rc<Module> {
        &self.module
    }

    pub fn memory(&self) -> Option<&SharedMemory> {
        self.memory.as_ref().map(|memory| &memory.memory)
    }

    pub fn table(&self, idx: u32) -> Option<&SharedTable> {
        self.tables.get(idx as usize).map(|table| &table.table)
    }

    pub fn global(&self, idx: u32) -> Option<Value> {
        self.globals.get(idx as usize).map(|global| global.value.get())
    }

    /// Call an exported function by name, starting a fresh call chain.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<ExecutionResult, anyhow::Error> {
        let func_idx = self
            .module
            .find_exported_function(name)
            .ok_or_else(|| anyhow::anyhow!("export {name} not found"))?;
        Ok(interpreter::execute(self, func_idx, args, 0))
    }
}

pub fn find_exported_function(instance: &Rc<Instance>, name: &str) -> Option<ExternalFunction> {
    let idx = instance.module.find_export(name, ExportKind::Func)?;
    ExternalFunction::from_instance(instance, FuncIdx(idx))
}

pub fn find_exported_table(instance: &Instance, name: &str) -> Option<ExternalTable> {
    let idx = instance.module.find_export(name, ExportKind::Table)?;
    instance.tables.get(idx as usize).cloned()
}

pub fn find_exported_memory(instance: &Instance, name: &str) -> Option<ExternalMemory> {
    instance.module.find_export(name, ExportKind::Memory)?;
    instance.memory.clone()
}

pub fn find_exported_global(instance: &Instance, name: &str) -> Option<ExternalGlobal> {
    let idx = instance.module.find_export(name, ExportKind::Global)?;
    instance.globals.get(idx as usize).cloned()
}
