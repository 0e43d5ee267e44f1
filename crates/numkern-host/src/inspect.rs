//! Static module inspection.
//!
//! Reports a module's imports, exports, memory limits and embedded manifest
//! without instantiating it.

use numkern_codegen::Manifest;
use numkern_types::abi::PAGE_SIZE;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use wasmparser::{ExternalKind, FuncType, Parser, Payload, TypeRef, ValType};

use crate::error::{HostError, HostResult};
use crate::memory::MemoryLimits;

/// A function signature, with value types spelled as in the text format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub params: Vec<String>,
    pub results: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportInfo {
    pub module: String,
    pub name: String,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportFunctionInfo {
    pub name: String,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportGlobalInfo {
    pub name: String,
    pub ty: String,
    pub mutable: bool,
}

/// Memory limits in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBounds {
    pub min: u64,
    pub max: Option<u64>,
}

/// Everything [`inspect`] learns about a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Hex SHA-256 of the module bytes.
    pub sha256: String,
    pub size: usize,
    pub imports: Vec<ImportInfo>,
    pub functions: Vec<ExportFunctionInfo>,
    pub globals: Vec<ExportGlobalInfo>,
    pub memory: Option<MemoryBounds>,
    pub manifest: Option<Manifest>,
}

impl ModuleInfo {
    pub fn function(&self, name: &str) -> Option<&ExportFunctionInfo> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&ExportGlobalInfo> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub(crate) fn memory_limits(&self) -> Option<MemoryLimits> {
        self.memory.map(|m| MemoryLimits {
            min_pages: m.min / PAGE_SIZE,
            max_pages: m.max.map(|b| b / PAGE_SIZE),
        })
    }
}

/// Inspect a module binary.
pub fn inspect(wasm: &[u8]) -> HostResult<ModuleInfo> {
    let mut types: Vec<Signature> = Vec::new();
    // Type index of every function, imported ones first.
    let mut function_types: Vec<u32> = Vec::new();
    let mut global_types: Vec<(String, bool)> = Vec::new();
    let mut imports = Vec::new();
    let mut memory = None;
    let mut exports = Vec::new();

    for payload in Parser::new(0).parse_all(wasm) {
        match payload.map_err(malformed)? {
            Payload::TypeSection(reader) => {
                for ty in reader.into_iter_err_on_gc_types() {
                    types.push(signature(&ty.map_err(malformed)?));
                }
            }
            Payload::ImportSection(reader) => {
                for import in reader {
                    let import = import.map_err(malformed)?;
                    match import.ty {
                        TypeRef::Func(idx) => {
                            function_types.push(idx);
                            imports.push((import.module.to_string(), import.name.to_string(), idx));
                        }
                        TypeRef::Global(ty) => {
                            global_types.push((type_name(ty.content_type), ty.mutable));
                        }
                        TypeRef::Memory(ty) => {
                            memory = Some(bounds(ty.initial, ty.maximum)?);
                        }
                        _ => {}
                    }
                }
            }
            Payload::FunctionSection(reader) => {
                for idx in reader {
                    function_types.push(idx.map_err(malformed)?);
                }
            }
            Payload::MemorySection(reader) => {
                for ty in reader {
                    let ty = ty.map_err(malformed)?;
                    let declared = bounds(ty.initial, ty.maximum)?;
                    memory.get_or_insert(declared);
                }
            }
            Payload::GlobalSection(reader) => {
                for global in reader {
                    let ty = global.map_err(malformed)?.ty;
                    global_types.push((type_name(ty.content_type), ty.mutable));
                }
            }
            Payload::ExportSection(reader) => {
                for export in reader {
                    let export = export.map_err(malformed)?;
                    exports.push((export.name.to_string(), export.kind, export.index));
                }
            }
            _ => {}
        }
    }

    let signature_of = |type_idx: u32| -> HostResult<Signature> {
        types
            .get(type_idx as usize)
            .cloned()
            .ok_or_else(|| HostError::Malformed(format!("type index {type_idx} out of range")))
    };

    let imports = imports
        .into_iter()
        .map(|(module, name, idx)| {
            Ok(ImportInfo {
                module,
                name,
                signature: signature_of(idx)?,
            })
        })
        .collect::<HostResult<Vec<_>>>()?;

    let mut functions = Vec::new();
    let mut globals = Vec::new();
    for (name, kind, index) in exports {
        match kind {
            ExternalKind::Func => {
                let type_idx = *function_types.get(index as usize).ok_or_else(|| {
                    HostError::Malformed(format!("function index {index} out of range"))
                })?;
                functions.push(ExportFunctionInfo {
                    name,
                    signature: signature_of(type_idx)?,
                });
            }
            ExternalKind::Global => {
                let (ty, mutable) = global_types.get(index as usize).cloned().ok_or_else(|| {
                    HostError::Malformed(format!("global index {index} out of range"))
                })?;
                globals.push(ExportGlobalInfo { name, ty, mutable });
            }
            _ => {}
        }
    }

    Ok(ModuleInfo {
        sha256: format!("{:x}", Sha256::digest(wasm)),
        size: wasm.len(),
        imports,
        functions,
        globals,
        memory,
        manifest: Manifest::from_wasm(wasm)?,
    })
}

fn malformed(e: wasmparser::BinaryReaderError) -> HostError {
    HostError::Malformed(e.to_string())
}

/// Page limits in bytes.  A memory64 declaration can name more pages than a
/// `u64` byte count holds; that is reported as malformed.
fn bounds(initial: u64, maximum: Option<u64>) -> HostResult<MemoryBounds> {
    let bytes = |pages: u64| {
        pages.checked_mul(PAGE_SIZE).ok_or_else(|| {
            HostError::Malformed(format!("memory of {pages} pages overflows a byte count"))
        })
    };
    Ok(MemoryBounds {
        min: bytes(initial)?,
        max: maximum.map(bytes).transpose()?,
    })
}

fn signature(ty: &FuncType) -> Signature {
    Signature {
        params: ty.params().iter().copied().map(type_name).collect(),
        results: ty.results().iter().copied().map(type_name).collect(),
    }
}

fn type_name(ty: ValType) -> String {
    match ty {
        ValType::I32 => "i32".to_string(),
        ValType::I64 => "i64".to_string(),
        ValType::F32 => "f32".to_string(),
        ValType::F64 => "f64".to_string(),
        ValType::V128 => "v128".to_string(),
        ValType::Ref(_) => "ref".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(inspect(b"not wasm"), Err(HostError::Malformed(_))));
    }

    #[test]
    fn oversized_memory64_is_malformed() {
        // memory64 memory, no maximum, 2^50 initial pages
        let wasm = [
            0x00, 0x61, 0x73, 0x6d, 0x01, 0x00, 0x00, 0x00, // header
            0x05, 0x0a, 0x01, 0x04, // memory section, one entry, memory64 flag
            0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x02,
        ];
        match inspect(&wasm) {
            Err(HostError::Malformed(message)) => assert!(message.contains("overflows")),
            other => panic!("expected Malformed, got {other:?}"),
        }
        assert_eq!(bounds(1, Some(u64::MAX / PAGE_SIZE)).unwrap().min, PAGE_SIZE);
        assert!(bounds(1, Some(u64::MAX / PAGE_SIZE + 1)).is_err());
    }

    #[test]
    fn digest_is_hex_sha256() {
        let info = inspect(&numkern_codegen::compile().unwrap()).unwrap();
        assert_eq!(info.sha256.len(), 64);
        assert!(info.sha256.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
