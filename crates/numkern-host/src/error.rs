//! Host setup errors.
//!
//! Failures while building or instantiating a module.  Errors from running a
//! kernel are [`numkern_types::KernelError`]s.

use numkern_codegen::CodegenError;
use numkern_types::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// wasmi rejected the module or failed to link or start it.
    #[error("instantiation failed: {0}")]
    Instantiation(String),

    /// The module lacks an export the host needs, or has it with the wrong type.
    #[error("missing export `{0}`")]
    MissingExport(String),

    /// The module bytes could not be parsed for inspection.
    #[error("malformed module: {0}")]
    Malformed(String),
}

impl From<wasmi::Error> for HostError {
    fn from(e: wasmi::Error) -> Self {
        Self::Instantiation(e.to_string())
    }
}

pub type HostResult<T> = Result<T, HostError>;
