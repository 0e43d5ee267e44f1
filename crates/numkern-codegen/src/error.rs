//! Codegen error types.

use thiserror::Error;

/// Errors that can occur during WASM code generation.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The configuration cannot describe a valid module.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] numkern_types::ConfigError),

    /// The generated WASM module failed validation.
    #[error("WASM validation failed: {0}")]
    ValidationFailed(String),

    /// The `numkern` custom section is missing or malformed.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
