//! The `numkern` custom section.
//!
//! A JSON document describing how the module was built, so a host can check
//! compatibility without running it.

use numkern_types::abi::{ExportKind, EXPORTS, HEAP_START};
use numkern_types::KernelConfig;
use serde::{Deserialize, Serialize};
use wasmparser::{Parser, Payload};

use crate::error::{CodegenError, CodegenResult};
use crate::types::{CODEGEN_VERSION, CUSTOM_SECTION_NAME};

/// Build metadata embedded in every generated module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Code generator version.
    pub version: String,
    /// Value baked into the `global_const` global.
    pub global_const: f64,
    /// First byte of kernel scratch space.
    pub heap_start: u32,
    /// Declared memory maximum, in pages.
    pub max_memory_pages: u64,
    pub exports: Vec<ManifestExport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestExport {
    pub name: String,
    pub kind: ExportKind,
}

impl Manifest {
    pub fn for_config(config: &KernelConfig) -> Self {
        Self {
            version: CODEGEN_VERSION.to_string(),
            global_const: config.global_const,
            heap_start: HEAP_START,
            max_memory_pages: config.max_memory_pages,
            exports: EXPORTS
                .iter()
                .map(|e| ManifestExport {
                    name: e.name.to_string(),
                    kind: e.kind,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> CodegenResult<String> {
        serde_json::to_string(self).map_err(|e| CodegenError::InvalidManifest(e.to_string()))
    }

    pub fn from_json(json: &str) -> CodegenResult<Self> {
        serde_json::from_str(json).map_err(|e| CodegenError::InvalidManifest(e.to_string()))
    }

    /// Extract the manifest from a module binary.
    ///
    /// Returns `Ok(None)` when the module has no `numkern` section.
    pub fn from_wasm(wasm: &[u8]) -> CodegenResult<Option<Self>> {
        for payload in Parser::new(0).parse_all(wasm) {
            let payload = payload.map_err(|e| CodegenError::ValidationFailed(e.to_string()))?;
            if let Payload::CustomSection(reader) = payload {
                if reader.name() == CUSTOM_SECTION_NAME {
                    let json = std::str::from_utf8(reader.data())
                        .map_err(|e| CodegenError::InvalidManifest(e.to_string()))?;
                    return Self::from_json(json).map(Some);
                }
            }
        }
        Ok(None)
    }

    pub fn export(&self, name: &str) -> Option<&ManifestExport> {
        self.exports.iter().find(|e| e.name == name)
    }
}
