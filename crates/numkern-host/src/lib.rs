//! numkern embedding host: runs the kernel module on wasmi.
//!
//! [`WasmKernel`] compiles (or accepts) the module, binds `env.abort` and
//! `env.callback`, and exposes the entry points through the
//! [`numkern_types::Kernel`] trait.  Traps come back as
//! [`numkern_types::KernelError`]s; the abort diagnostics the module reported
//! before trapping are kept on the instance.
//!
//! Also provided: a cursor over linear memory ([`WasmMemory`]) and static
//! module inspection ([`inspect`]).

pub mod bridge;
pub mod error;
pub mod inspect;
pub mod instance;
pub mod memory;

pub use bridge::HostState;
pub use error::{HostError, HostResult};
pub use inspect::{inspect, ModuleInfo};
pub use instance::WasmKernel;
pub use memory::{MemoryInfo, MemoryLimits, WasmMemory};
