//! Main WASM module assembler.
//!
//! The module shape is fixed; only the configuration varies:
//! 1. Validate the [`KernelConfig`]
//! 2. Emit type, import, function, memory, global and export sections
//! 3. Emit the kernel bodies
//! 4. Embed the [`Manifest`] as a custom section
//! 5. Validate with `wasmparser`

use numkern_types::abi::{
    ExportKind as AbiExportKind, EXPORTS, IMPORT_ABORT_NAME, IMPORT_CALLBACK_NAME, IMPORT_MODULE,
};
use numkern_types::KernelConfig;
use wasm_encoder::{
    CodeSection, ConstExpr, CustomSection, EntityType, ExportKind, ExportSection,
    FunctionSection, GlobalSection, GlobalType, ImportSection, MemorySection, MemoryType,
    Module, TypeSection, ValType,
};

use crate::error::{CodegenError, CodegenResult};
use crate::kernels;
use crate::manifest::Manifest;
use crate::types::*;

// ══════════════════════════════════════════════════════════════════════════════
// Public API
// ══════════════════════════════════════════════════════════════════════════════

/// Compile the kernel module with the default configuration.
pub fn compile() -> CodegenResult<Vec<u8>> {
    compile_with(&KernelConfig::default())
}

/// Compile the kernel module for `config`.
///
/// Returns the raw bytes of a valid WebAssembly module on success, or a
/// [`CodegenError`] describing what went wrong.
pub fn compile_with(config: &KernelConfig) -> CodegenResult<Vec<u8>> {
    config.validate()?;
    Compiler { config }.compile()
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiler
// ══════════════════════════════════════════════════════════════════════════════

struct Compiler<'a> {
    config: &'a KernelConfig,
}

impl Compiler<'_> {
    fn compile(&self) -> CodegenResult<Vec<u8>> {
        let mut module = Module::new();

        module.section(&self.emit_types());
        module.section(&self.emit_imports());
        module.section(&self.emit_functions());
        module.section(&self.emit_memory());
        module.section(&self.emit_globals());
        module.section(&self.emit_exports());
        module.section(&self.emit_code());

        let manifest = Manifest::for_config(self.config).to_json()?;
        module.section(&CustomSection {
            name: std::borrow::Cow::Borrowed(CUSTOM_SECTION_NAME),
            data: std::borrow::Cow::Borrowed(manifest.as_bytes()),
        });

        let wasm_bytes = module.finish();

        wasmparser::validate(&wasm_bytes)
            .map_err(|e| CodegenError::ValidationFailed(format!("{e}")))?;

        Ok(wasm_bytes)
    }

    // ── Type section ─────────────────────────────────────────────────────

    fn emit_types(&self) -> TypeSection {
        let mut types = TypeSection::new();

        // TYPE_ABORT: (i32, i32, i32, i32) -> ()
        types.ty().function(vec![ValType::I32; 4], vec![]);
        // TYPE_I64_I64: (i64) -> i64
        types.ty().function(vec![ValType::I64], vec![ValType::I64]);
        // TYPE_VOID_VOID: () -> ()
        types.ty().function(vec![], vec![]);
        // TYPE_I64_I32: (i64) -> i32
        types.ty().function(vec![ValType::I64], vec![ValType::I32]);
        // TYPE_I64_I32_VOID: (i64, i32) -> ()
        types.ty().function(vec![ValType::I64, ValType::I32], vec![]);

        types
    }

    // ── Import section ───────────────────────────────────────────────────

    fn emit_imports(&self) -> ImportSection {
        let mut imports = ImportSection::new();
        imports.import(
            IMPORT_MODULE,
            IMPORT_ABORT_NAME,
            EntityType::Function(TYPE_ABORT),
        );
        imports.import(
            IMPORT_MODULE,
            IMPORT_CALLBACK_NAME,
            EntityType::Function(TYPE_I64_I64),
        );
        imports
    }

    // ── Function and code sections ───────────────────────────────────────

    fn emit_functions(&self) -> FunctionSection {
        let mut functions = FunctionSection::new();
        functions.function(TYPE_VOID_VOID); // FUNC_UPDATE_MEMORY
        functions.function(TYPE_VOID_VOID); // FUNC_INVOKE_CALLBACK
        functions.function(TYPE_I64_I64); // FUNC_FIBONACCI
        functions.function(TYPE_I64_I32); // FUNC_SIEVE
        functions.function(TYPE_I64_I32_VOID); // FUNC_RESERVE
        functions
    }

    fn emit_code(&self) -> CodeSection {
        let mut code = CodeSection::new();
        code.function(&kernels::emit_update_memory());
        code.function(&kernels::emit_invoke_callback());
        code.function(&kernels::emit_fibonacci());
        code.function(&kernels::emit_sieve());
        code.function(&kernels::emit_reserve());
        code
    }

    // ── Memory section ───────────────────────────────────────────────────

    fn emit_memory(&self) -> MemorySection {
        let mut memory = MemorySection::new();
        memory.memory(MemoryType {
            minimum: self.config.initial_memory_pages,
            maximum: Some(self.config.max_memory_pages),
            memory64: false,
            shared: false,
            page_size_log2: None,
        });
        memory
    }

    // ── Global section ───────────────────────────────────────────────────

    fn emit_globals(&self) -> GlobalSection {
        let mut globals = GlobalSection::new();

        // GLOBAL_CONST
        globals.global(
            GlobalType {
                val_type: ValType::F64,
                mutable: false,
                shared: false,
            },
            &ConstExpr::f64_const(self.config.global_const),
        );

        // GLOBAL_FROM_CALLBACK, GLOBAL_MEMORY_VALUE
        for _ in 0..2 {
            globals.global(
                GlobalType {
                    val_type: ValType::I64,
                    mutable: true,
                    shared: false,
                },
                &ConstExpr::i64_const(0),
            );
        }

        globals
    }

    // ── Export section ───────────────────────────────────────────────────

    fn emit_exports(&self) -> ExportSection {
        let mut exports = ExportSection::new();
        for decl in EXPORTS {
            let kind = match decl.kind {
                AbiExportKind::Func => ExportKind::Func,
                AbiExportKind::Global => ExportKind::Global,
                AbiExportKind::Memory => ExportKind::Memory,
            };
            exports.export(decl.name, kind, decl.index);
        }
        exports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use numkern_types::abi::{
        EXPORT_FIBONACCI, EXPORT_FROM_CALLBACK, EXPORT_GLOBAL_CONST, EXPORT_INVOKE_CALLBACK,
        EXPORT_MEMORY, EXPORT_MEMORY_VALUE, EXPORT_SIEVE, EXPORT_UPDATE_MEMORY,
    };

    #[test]
    fn export_indices_match_index_spaces() {
        let expected = [
            (EXPORT_GLOBAL_CONST, GLOBAL_CONST),
            (EXPORT_FROM_CALLBACK, GLOBAL_FROM_CALLBACK),
            (EXPORT_MEMORY_VALUE, GLOBAL_MEMORY_VALUE),
            (EXPORT_UPDATE_MEMORY, FUNC_UPDATE_MEMORY),
            (EXPORT_INVOKE_CALLBACK, FUNC_INVOKE_CALLBACK),
            (EXPORT_FIBONACCI, FUNC_FIBONACCI),
            (EXPORT_SIEVE, FUNC_SIEVE),
            (EXPORT_MEMORY, 0),
        ];
        assert_eq!(EXPORTS.len(), expected.len());
        for (name, index) in expected {
            let decl = EXPORTS
                .iter()
                .find(|d| d.name == name)
                .unwrap_or_else(|| panic!("`{name}` is not exported"));
            assert_eq!(decl.index, index, "index of `{name}`");
        }
    }

    #[test]
    fn function_indices_are_contiguous() {
        assert_eq!(FUNC_RESERVE + 1, IMPORT_COUNT + LOCAL_FUNC_COUNT);
    }

    #[test]
    fn invalid_config_is_rejected_before_emission() {
        let config = KernelConfig {
            initial_memory_pages: 0,
            ..KernelConfig::default()
        };
        assert!(matches!(
            compile_with(&config),
            Err(CodegenError::InvalidConfig(_))
        ));
    }
}
