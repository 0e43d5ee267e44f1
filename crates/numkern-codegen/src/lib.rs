//! numkern WASM code generator: emits the numeric kernel module as `.wasm`.
//!
//! # Architecture
//!
//! The module has a fixed shape described in [`numkern_types::abi`].  A
//! [`numkern_types::KernelConfig`] supplies the build-time constant and the
//! memory limits; everything else is static.
//!
//! ## Imports
//! - `env.abort(code, file, line, column)`
//! - `env.callback(value: i64) -> i64`
//!
//! ## Exports
//! - `global_const: f64`, `from_callback: i64`, `memory_value: i64`
//! - `update_memory()`, `invoke_callback()`
//! - `fibonacci(n: i64) -> i64`, `sieve(limit: i64) -> i32`
//! - `memory`
//!
//! Argument checks live inside the module, so a module run by any host
//! rejects out-of-domain input the same way.  See [`guard`].

pub mod compiler;
pub mod error;
pub mod guard;
pub mod kernels;
pub mod manifest;
pub mod types;

pub use compiler::{compile, compile_with};
pub use error::{CodegenError, CodegenResult};
pub use manifest::{Manifest, ManifestExport};
