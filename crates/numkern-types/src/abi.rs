//! The kernel module's host-integration contract.
//!
//! Both the reference registry and the generated WASM module honour this
//! layout.  The host relies on it to bind imports, locate exports and decode
//! abort diagnostics.
//!
//! ## Imports
//! - `env.abort(code, file, line, column)`: boundary trap reporter
//! - `env.callback(value: i64) -> i64`: the host's numeric callback
//!
//! ## Exports
//! - `global_const`, `from_callback`, `memory_value`: globals
//! - `update_memory()`, `invoke_callback()`, `fibonacci(n)`, `sieve(limit)`
//! - `memory`: linear memory
//!
//! ## Linear memory
//!
//! ```text
//! [0, HEAP_START)          host region; the module only ever reads bytes 0..8
//! [HEAP_START, ...)        call-scoped kernel tables, grown on demand
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// ── Import / export names ────────────────────────────────────────────────────

/// Module name for every import.
pub const IMPORT_MODULE: &str = "env";
pub const IMPORT_ABORT_NAME: &str = "abort";
pub const IMPORT_CALLBACK_NAME: &str = "callback";

pub const EXPORT_GLOBAL_CONST: &str = "global_const";
pub const EXPORT_FROM_CALLBACK: &str = "from_callback";
pub const EXPORT_MEMORY_VALUE: &str = "memory_value";
pub const EXPORT_UPDATE_MEMORY: &str = "update_memory";
pub const EXPORT_INVOKE_CALLBACK: &str = "invoke_callback";
pub const EXPORT_FIBONACCI: &str = "fibonacci";
pub const EXPORT_SIEVE: &str = "sieve";
pub const EXPORT_MEMORY: &str = "memory";

// ── Memory layout ────────────────────────────────────────────────────────────

/// WebAssembly page size in bytes.
pub const PAGE_SIZE: u64 = 65_536;
/// First byte of kernel scratch space.  Everything below belongs to the host.
pub const HEAP_START: u32 = 65_536;
/// Hard ceiling for 32-bit linear memory.
pub const MAX_WASM_PAGES: u64 = 65_536;
/// Bytes captured by `update_memory`.
pub const SNAPSHOT_BYTES: usize = 8;

// ── Domain limits ────────────────────────────────────────────────────────────

/// Largest `n` whose table of `n + 2` entries is addressable with a 32-bit index.
pub const FIBONACCI_MAX_N: i64 = i32::MAX as i64 - 2;
/// Largest `limit` whose table of `limit + 1` flags is addressable with a 32-bit index.
pub const SIEVE_MAX_LIMIT: i64 = i32::MAX as i64 - 1;

/// Default value of the build-time constant.
pub const DEFAULT_GLOBAL_CONST: f64 = 1.618_033_9;
/// Default ceiling for linear memory growth (128 MiB).
pub const DEFAULT_MAX_MEMORY_PAGES: u64 = 2048;

/// Pages needed to hold a kernel table of `table_bytes` above [`HEAP_START`].
pub fn pages_for_table(table_bytes: u64) -> u64 {
    (HEAP_START as u64 + table_bytes).div_ceil(PAGE_SIZE)
}

// ── Abort diagnostics ────────────────────────────────────────────────────────

/// Abort code: a kernel argument failed its range check.
pub const ABORT_INVALID_ARGUMENT: i32 = 1;
/// Abort code: a kernel table would not fit in linear memory.
pub const ABORT_OUT_OF_MEMORY: i32 = 2;
/// Abort code: a memory read fell outside the linear memory region.
pub const ABORT_OUT_OF_BOUNDS: i32 = 3;
/// Abort code: host code panicked while the kernel was running.
pub const ABORT_HOST_PANIC: i32 = 4;

/// Abort line: argument was negative.
pub const CHECK_NEGATIVE: i32 = 1;
/// Abort line: argument exceeded the 32-bit table index range.
pub const CHECK_INDEX_RANGE: i32 = 2;
/// Abort line: argument exceeded a host-configured cap (host side only).
pub const CHECK_HOST_LIMIT: i32 = 3;

/// The four diagnostic integers reported through `env.abort`.
///
/// `file` is the [`KernelId::site`] of the failing kernel, `line` the check
/// that failed and `column` the low 32 bits of the offending value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbortInfo {
    pub code: i32,
    pub file: i32,
    pub line: i32,
    pub column: i32,
}

impl AbortInfo {
    pub fn new(code: i32, file: i32, line: i32, column: i32) -> Self {
        Self {
            code,
            file,
            line,
            column,
        }
    }

    /// Kernel the abort was raised from, if `file` names a known site.
    pub fn kernel(&self) -> Option<KernelId> {
        KernelId::from_site(self.file)
    }
}

impl fmt::Display for AbortInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "abort(code={}, file={}, line={}, column={})",
            self.code, self.file, self.line, self.column
        )
    }
}

// ── Kernel identities ────────────────────────────────────────────────────────

/// The four callable entry points of the kernel module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KernelId {
    Fibonacci,
    Sieve,
    UpdateMemory,
    InvokeCallback,
}

impl KernelId {
    pub const ALL: [KernelId; 4] = [
        KernelId::Fibonacci,
        KernelId::Sieve,
        KernelId::UpdateMemory,
        KernelId::InvokeCallback,
    ];

    /// Export name of this entry point.
    pub fn name(self) -> &'static str {
        match self {
            Self::Fibonacci => EXPORT_FIBONACCI,
            Self::Sieve => EXPORT_SIEVE,
            Self::UpdateMemory => EXPORT_UPDATE_MEMORY,
            Self::InvokeCallback => EXPORT_INVOKE_CALLBACK,
        }
    }

    /// Site id used as the `file` field of [`AbortInfo`].
    pub fn site(self) -> i32 {
        match self {
            Self::Fibonacci => 1,
            Self::Sieve => 2,
            Self::UpdateMemory => 3,
            Self::InvokeCallback => 4,
        }
    }

    pub fn from_site(site: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.site() == site)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Parameter types, in order.
    pub fn params(self) -> &'static [ValueType] {
        match self {
            Self::Fibonacci | Self::Sieve => &[ValueType::I64],
            Self::UpdateMemory | Self::InvokeCallback => &[],
        }
    }

    /// Result type, if the entry point returns one.
    pub fn result(self) -> Option<ValueType> {
        match self {
            Self::Fibonacci => Some(ValueType::I64),
            Self::Sieve => Some(ValueType::I32),
            Self::UpdateMemory | Self::InvokeCallback => None,
        }
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Scalar values ────────────────────────────────────────────────────────────

/// Scalar value types crossing the module boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    I32,
    I64,
    F64,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F64 => "f64",
        })
    }
}

/// A scalar argument or result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    I32(i32),
    I64(i64),
    F64(f64),
}

impl Value {
    pub fn ty(&self) -> ValueType {
        match self {
            Self::I32(_) => ValueType::I32,
            Self::I64(_) => ValueType::I64,
            Self::F64(_) => ValueType::F64,
        }
    }

    /// Integer payload widened to `i64`; `None` for floats.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I32(v) => Some(v as i64),
            Self::I64(v) => Some(v),
            Self::F64(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F64(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}i32"),
            Self::I64(v) => write!(f, "{v}i64"),
            Self::F64(v) => write!(f, "{v}f64"),
        }
    }
}

// ── Export table ─────────────────────────────────────────────────────────────

/// Kind of an exported item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Func,
    Global,
    Memory,
}

/// One row of the module's export table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExportDecl {
    pub name: &'static str,
    pub kind: ExportKind,
    /// Index within the kind's index space.  Function indices count the two
    /// imports first.
    pub index: u32,
}

/// Every export the kernel module provides, in emission order.
pub const EXPORTS: &[ExportDecl] = &[
    ExportDecl {
        name: EXPORT_GLOBAL_CONST,
        kind: ExportKind::Global,
        index: 0,
    },
    ExportDecl {
        name: EXPORT_FROM_CALLBACK,
        kind: ExportKind::Global,
        index: 1,
    },
    ExportDecl {
        name: EXPORT_MEMORY_VALUE,
        kind: ExportKind::Global,
        index: 2,
    },
    ExportDecl {
        name: EXPORT_UPDATE_MEMORY,
        kind: ExportKind::Func,
        index: 2,
    },
    ExportDecl {
        name: EXPORT_INVOKE_CALLBACK,
        kind: ExportKind::Func,
        index: 3,
    },
    ExportDecl {
        name: EXPORT_FIBONACCI,
        kind: ExportKind::Func,
        index: 4,
    },
    ExportDecl {
        name: EXPORT_SIEVE,
        kind: ExportKind::Func,
        index: 5,
    },
    ExportDecl {
        name: EXPORT_MEMORY,
        kind: ExportKind::Memory,
        index: 0,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sites_round_trip() {
        for kernel in KernelId::ALL {
            assert_eq!(KernelId::from_site(kernel.site()), Some(kernel));
            assert_eq!(KernelId::from_name(kernel.name()), Some(kernel));
        }
        assert_eq!(KernelId::from_site(0), None);
        assert_eq!(KernelId::from_name("main"), None);
    }

    #[test]
    fn table_pages_include_host_region() {
        assert_eq!(pages_for_table(0), 1);
        assert_eq!(pages_for_table(1), 2);
        assert_eq!(pages_for_table(PAGE_SIZE), 2);
        assert_eq!(pages_for_table(PAGE_SIZE + 1), 3);
    }

    #[test]
    fn domain_limits_fit_i32_tables() {
        assert!(FIBONACCI_MAX_N + 2 <= i32::MAX as i64);
        assert!(SIEVE_MAX_LIMIT + 1 <= i32::MAX as i64);
    }

    #[test]
    fn value_serializes_tagged() {
        let json = serde_json::to_string(&Value::I64(55)).unwrap();
        assert_eq!(json, r#"{"type":"i64","value":55}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::I64(55));
    }

    #[test]
    fn every_kernel_is_exported_as_func() {
        for kernel in KernelId::ALL {
            assert!(EXPORTS
                .iter()
                .any(|e| e.name == kernel.name() && e.kind == ExportKind::Func));
        }
    }
}
