//! Process-wide execution limits.

/// Size of a linear memory page in bytes.
pub const PAGE_SIZE: u32 = 65536;

/// The hard limit of memory pages, determined by the 32-bit address space.
pub const MAX_MEMORY_PAGES_LIMIT: u32 = (4 * 1024 * 1024 * 1024u64 / PAGE_SIZE as u64) as u32;

/// Memory page limit used when instantiating without an explicit limit (256 MiB).
pub const DEFAULT_MEMORY_PAGES_LIMIT: u32 = (256 * 1024 * 1024 / PAGE_SIZE as u64) as u32;

/// Maximum number of nested calls on one call chain.
///
/// Allowed depths are `0..CALL_STACK_LIMIT`. Every entry into the dispatcher
/// checks the depth it was given against this value before doing anything else.
pub const CALL_STACK_LIMIT: u32 = 2048;

/// Native stack size sufficient for a call chain of `CALL_STACK_LIMIT` frames,
/// including unoptimized builds.
pub const EXECUTION_STACK_SIZE: usize = 256 * 1024 * 1024;
