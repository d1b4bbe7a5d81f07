use wasmparser::{Validator, WasmFeatures};

use crate::limits::{DEFAULT_MEMORY_PAGES_LIMIT, MAX_MEMORY_PAGES_LIMIT};

/// Shared compilation and instantiation configuration.
#[derive(Debug, Clone)]
pub struct Engine {
    features: WasmFeatures,
    memory_pages_limit: u32,
}

impl Engine {
    /// Create a new validator with the engine's features.
    pub fn new_validator(&self) -> Validator {
        Validator::new_with_features(self.features)
    }

    /// Limit the number of memory pages an instance may hold, capped at the
    /// 32-bit address space.
    pub fn with_memory_pages_limit(mut self, pages: u32) -> Self {
        self.memory_pages_limit = pages.min(MAX_MEMORY_PAGES_LIMIT);
        self
    }

    pub fn memory_pages_limit(&self) -> u32 {
        self.memory_pages_limit
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            features: WasmFeatures::default(),
            memory_pages_limit: DEFAULT_MEMORY_PAGES_LIMIT,
        }
    }
}
