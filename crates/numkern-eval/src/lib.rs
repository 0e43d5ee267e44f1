//! numkern reference registry.
//!
//! Runs the kernel module's entry points directly in Rust, with no WASM
//! compilation.  Used as the golden reference for the generated module and
//! as an embeddable registry in its own right.

pub mod bridge;
pub mod instance;
pub mod kernels;
pub mod memory;

pub use bridge::HostBridge;
pub use instance::KernelInstance;
pub use kernels::TableBudget;
pub use memory::LinearMemory;
