//! Shared types for numkern: the kernel module's ABI, scalar values,
//! boundary errors and configuration.

pub mod abi;
pub mod barrier;
pub mod config;
pub mod error;
pub mod kernel;

pub use abi::{AbortInfo, ExportDecl, ExportKind, KernelId, Value, ValueType, EXPORTS};
pub use config::{check_domain, ConfigError, KernelConfig};
pub use error::{ArgumentCheck, KernelError, KernelResult, TrapInfo};
pub use kernel::{HostCallback, Kernel};
