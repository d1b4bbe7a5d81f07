//! Named import registry for module instantiation.
//!
//! The [`Linker`] collects named externals (host functions, exports of other
//! instances) and resolves them against a module's declared imports.

use std::collections::HashMap;
use std::rc::Rc;

use crate::instance::{ExternalGlobal, ExternalMemory, ExternalTable, Imports, InstantiateError};
use crate::module::{ExportKind, ImportKind};
use crate::{Engine, ExecutionResult, ExternalFunction, FuncIdx, Instance, Module, Value};

/// A value that can satisfy an import.
#[derive(Debug, Clone)]
pub enum Extern {
    Func(ExternalFunction),
    Table(ExternalTable),
    Memory(ExternalMemory),
    Global(ExternalGlobal),
}

/// A named import registry that resolves module imports during
/// instantiation.
///
/// # Examples
///
/// ```ignore
/// let mut linker = Linker::new(&engine);
/// linker.func("env", "log", ty, |_, args, _| ExecutionResult::void());
/// linker.instance("m1", &instance1);
/// let instance = linker.instantiate(module)?;
/// ```
pub struct Linker {
    memory_pages_limit: u32,
    entries: HashMap<(String, String), Extern>,
}

impl Linker {
    pub fn new(engine: &Engine) -> Self {
        Linker {
            memory_pages_limit: engine.memory_pages_limit(),
            entries: HashMap::new(),
        }
    }

    /// Register an external under `module.name`, replacing any previous entry.
    pub fn define(&mut self, module: &str, name: &str, item: Extern) -> &mut Self {
        self.entries.insert((module.to_string(), name.to_string()), item);
        self
    }

    /// Register a host function under `module.name`.
    pub fn func<F>(&mut self, module: &str, name: &str, ty: wasmparser::FuncType, f: F) -> &mut Self
    where
        F: Fn(&Instance, &[Value], u32) -> ExecutionResult + 'static,
    {
        self.define(module, name, Extern::Func(ExternalFunction::host(ty, f)))
    }

    /// Register every export of `instance` under the module name `module`.
    pub fn instance(&mut self, module: &str, instance: &Rc<Instance>) -> &mut Self {
        for export in instance.module.exports() {
            let item = match export.kind {
                ExportKind::Func => ExternalFunction::from_instance(instance, FuncIdx(export.index)).map(Extern::Func),
                ExportKind::Table => instance.tables.get(export.index as usize).cloned().map(Extern::Table),
                ExportKind::Memory => instance.memory.clone().map(Extern::Memory),
                ExportKind::Global => instance.globals.get(export.index as usize).cloned().map(Extern::Global),
            };
            if let Some(item) = item {
                self.define(module, &export.name, item);
            }
        }
        self
    }

    pub fn get(&self, module: &str, name: &str) -> Option<&Extern> {
        self.entries.get(&(module.to_string(), name.to_string()))
    }

    /// Resolve `module`'s imports in declaration order.
    pub fn resolve(&self, module: &Module) -> Result<Imports, InstantiateError> {
        let mut imports = Imports::default();
        for import in module.imports() {
            let Some(item) = self.get(&import.module, &import.name) else {
                return Err(InstantiateError::MissingImport {
                    module: import.module.clone(),
                    name: import.name.clone(),
                });
            };
            match (&import.kind, item) {
                (ImportKind::Func(_), Extern::Func(f)) => imports.functions.push(f.clone()),
                (ImportKind::Table(_), Extern::Table(t)) => imports.tables.push(t.clone()),
                (ImportKind::Memory(_), Extern::Memory(m)) => imports.memories.push(m.clone()),
                (ImportKind::Global(_), Extern::Global(g)) => imports.globals.push(g.clone()),
                _ => {
                    return Err(InstantiateError::ImportKindMismatch {
                        module: import.module.clone(),
                        name: import.name.clone(),
                    });
                }
            }
        }
        Ok(imports)
    }

    /// Resolve `module`'s imports and instantiate it.
    pub fn instantiate(&self, module: impl Into<Rc<Module>>) -> Result<Rc<Instance>, InstantiateError> {
        let module = module.into();
        let imports = self.resolve(&module)?;
        crate::instantiate_with_limit(module, imports, self.memory_pages_limit)
    }
}
