//! Boundary guards.
//!
//! Emits the checks that stop a kernel before it touches linear memory.  A
//! failed check reports its diagnostics through `env.abort` and then traps
//! with `unreachable`, so the host sees both the trap and the four integers.

use numkern_types::abi::{ABORT_INVALID_ARGUMENT, CHECK_INDEX_RANGE, CHECK_NEGATIVE};
use numkern_types::KernelId;
use wasm_encoder::{BlockType, Function, Instruction};

use crate::types::IMPORT_ABORT;

/// Emit a range check on the `i64` parameter `param`.
///
/// Equivalent pseudo-code:
/// ```text
/// if param < 0   { abort(INVALID_ARGUMENT, site, CHECK_NEGATIVE, param); unreachable }
/// if param > max { abort(INVALID_ARGUMENT, site, CHECK_INDEX_RANGE, param); unreachable }
/// ```
pub fn emit_argument_guard(f: &mut Function, param: u32, kernel: KernelId, max: i64) {
    f.instruction(&Instruction::LocalGet(param));
    f.instruction(&Instruction::I64Const(0));
    f.instruction(&Instruction::I64LtS);
    emit_abort_if(f, ABORT_INVALID_ARGUMENT, kernel.site(), CHECK_NEGATIVE, param);

    f.instruction(&Instruction::LocalGet(param));
    f.instruction(&Instruction::I64Const(max));
    f.instruction(&Instruction::I64GtS);
    emit_abort_if(f, ABORT_INVALID_ARGUMENT, kernel.site(), CHECK_INDEX_RANGE, param);
}

/// Consume the `i32` condition on the stack; abort when it is non-zero.
///
/// `column_local` is an `i64` local whose low 32 bits become the column.
pub fn emit_abort_if(f: &mut Function, code: i32, site: i32, line: i32, column_local: u32) {
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(code));
    f.instruction(&Instruction::I32Const(site));
    f.instruction(&Instruction::I32Const(line));
    f.instruction(&Instruction::LocalGet(column_local));
    f.instruction(&Instruction::I32WrapI64);
    f.instruction(&Instruction::Call(IMPORT_ABORT));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);
}
