//! Index spaces of the generated module.
//!
//! Every index here is fixed; the section emitters in `compiler.rs` must emit
//! entries in exactly this order.

// ── Imported function indices ────────────────────────────────────────────────

/// `env.abort(code: i32, file: i32, line: i32, column: i32)`
pub const IMPORT_ABORT: u32 = 0;
/// `env.callback(value: i64) -> i64`
pub const IMPORT_CALLBACK: u32 = 1;

/// Number of imported functions (offset for locally-defined function indices).
pub const IMPORT_COUNT: u32 = 2;

// ── Local function indices (absolute) ────────────────────────────────────────

/// `update_memory()`
pub const FUNC_UPDATE_MEMORY: u32 = IMPORT_COUNT;
/// `invoke_callback()`
pub const FUNC_INVOKE_CALLBACK: u32 = IMPORT_COUNT + 1;
/// `fibonacci(n: i64) -> i64`
pub const FUNC_FIBONACCI: u32 = IMPORT_COUNT + 2;
/// `sieve(limit: i64) -> i32`
pub const FUNC_SIEVE: u32 = IMPORT_COUNT + 3;
/// `reserve(bytes: i64, site: i32)`, internal and not exported.
pub const FUNC_RESERVE: u32 = IMPORT_COUNT + 4;

/// Number of locally-defined functions.
pub const LOCAL_FUNC_COUNT: u32 = 5;

// ── Global indices ───────────────────────────────────────────────────────────

/// `global_const: f64` (immutable)
pub const GLOBAL_CONST: u32 = 0;
/// `from_callback: i64` (GlobalCounter)
pub const GLOBAL_FROM_CALLBACK: u32 = 1;
/// `memory_value: i64` (MemorySnapshot)
pub const GLOBAL_MEMORY_VALUE: u32 = 2;

// ── WASM type indices ────────────────────────────────────────────────────────

/// `(i32, i32, i32, i32) -> ()`
pub const TYPE_ABORT: u32 = 0;
/// `(i64) -> i64`
pub const TYPE_I64_I64: u32 = 1;
/// `() -> ()`
pub const TYPE_VOID_VOID: u32 = 2;
/// `(i64) -> i32`
pub const TYPE_I64_I32: u32 = 3;
/// `(i64, i32) -> ()`
pub const TYPE_I64_I32_VOID: u32 = 4;

/// Total number of fixed type signatures.
pub const TYPE_COUNT: u32 = 5;

// ── Custom section ───────────────────────────────────────────────────────────

/// Custom section holding the JSON [`crate::Manifest`].
pub const CUSTOM_SECTION_NAME: &str = "numkern";
/// Code generator version embedded in the manifest.
pub const CODEGEN_VERSION: &str = env!("CARGO_PKG_VERSION");
