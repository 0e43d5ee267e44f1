//! Function bodies of the kernel module.
//!
//! Kernel tables live in linear memory from `HEAP_START` upward.  Each kernel
//! calls `reserve` first, which grows memory to fit its table or aborts with
//! `ABORT_OUT_OF_MEMORY`.  Tables are scratch: nothing reads them after the
//! kernel returns.

use numkern_types::abi::{
    ABORT_OUT_OF_MEMORY, FIBONACCI_MAX_N, HEAP_START, PAGE_SIZE, SIEVE_MAX_LIMIT,
};
use numkern_types::KernelId;
use wasm_encoder::{BlockType, Function, Instruction, MemArg, ValType};

use crate::guard::emit_argument_guard;
use crate::types::*;

// ══════════════════════════════════════════════════════════════════════════════
// Globals and callback
// ══════════════════════════════════════════════════════════════════════════════

/// Emit `update_memory()`: `memory_value = i64.load(0)`.
pub fn emit_update_memory() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I64Load(memarg(0, 3)));
    f.instruction(&Instruction::GlobalSet(GLOBAL_MEMORY_VALUE));
    f.instruction(&Instruction::End);
    f
}

/// Emit `invoke_callback()`: `from_callback = callback(from_callback)`.
pub fn emit_invoke_callback() -> Function {
    let mut f = Function::new(vec![]);
    f.instruction(&Instruction::GlobalGet(GLOBAL_FROM_CALLBACK));
    f.instruction(&Instruction::Call(IMPORT_CALLBACK));
    f.instruction(&Instruction::GlobalSet(GLOBAL_FROM_CALLBACK));
    f.instruction(&Instruction::End);
    f
}

// ══════════════════════════════════════════════════════════════════════════════
// Table reservation
// ══════════════════════════════════════════════════════════════════════════════

/// Emit `reserve(bytes: i64, site: i32)`.
///
/// Grows memory so `[HEAP_START, HEAP_START + bytes)` is addressable.  When
/// `memory.grow` fails, reports `abort(OUT_OF_MEMORY, site, 0, bytes)` and
/// traps.
pub fn emit_reserve() -> Function {
    let mut f = Function::new(vec![(1, ValType::I64)]); // local 2: needed_pages

    // needed_pages = (HEAP_START + bytes + PAGE_SIZE - 1) >> 16
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64Const(HEAP_START as i64 + PAGE_SIZE as i64 - 1));
    f.instruction(&Instruction::I64Add);
    f.instruction(&Instruction::I64Const(PAGE_SIZE.trailing_zeros() as i64));
    f.instruction(&Instruction::I64ShrU);
    f.instruction(&Instruction::LocalSet(2));

    // if needed_pages > memory.size
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::MemorySize(0));
    f.instruction(&Instruction::I64ExtendI32U);
    f.instruction(&Instruction::I64GtU);
    f.instruction(&Instruction::If(BlockType::Empty));

    //   if memory.grow(needed_pages - memory.size) == -1 → abort
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::MemorySize(0));
    f.instruction(&Instruction::I64ExtendI32U);
    f.instruction(&Instruction::I64Sub);
    f.instruction(&Instruction::I32WrapI64);
    f.instruction(&Instruction::MemoryGrow(0));
    f.instruction(&Instruction::I32Const(-1));
    f.instruction(&Instruction::I32Eq);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::I32Const(ABORT_OUT_OF_MEMORY));
    f.instruction(&Instruction::LocalGet(1)); // site
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I32WrapI64);
    f.instruction(&Instruction::Call(IMPORT_ABORT));
    f.instruction(&Instruction::Unreachable);
    f.instruction(&Instruction::End);

    f.instruction(&Instruction::End); // end if
    f.instruction(&Instruction::End);
    f
}

// ══════════════════════════════════════════════════════════════════════════════
// fibonacci
// ══════════════════════════════════════════════════════════════════════════════

/// Emit `fibonacci(n: i64) -> i64`.
///
/// Table of `n + 2` i64 slots at `HEAP_START`, seeded `f[0] = 0`, `f[1] = 1`,
/// filled bottom-up with wrapping `i64.add`.
pub fn emit_fibonacci() -> Function {
    let mut f = Function::new(vec![
        (1, ValType::I64), // local 1: i
        (1, ValType::I32), // local 2: slot address
    ]);

    emit_argument_guard(&mut f, 0, KernelId::Fibonacci, FIBONACCI_MAX_N);

    // reserve((n + 2) * 8, SITE)
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64Const(2));
    f.instruction(&Instruction::I64Add);
    f.instruction(&Instruction::I64Const(8));
    f.instruction(&Instruction::I64Mul);
    f.instruction(&Instruction::I32Const(KernelId::Fibonacci.site()));
    f.instruction(&Instruction::Call(FUNC_RESERVE));

    // f[0] = 0; f[1] = 1
    f.instruction(&Instruction::I32Const(HEAP_START as i32));
    f.instruction(&Instruction::I64Const(0));
    f.instruction(&Instruction::I64Store(memarg(0, 3)));
    f.instruction(&Instruction::I32Const(HEAP_START as i32));
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::I64Store(memarg(8, 3)));

    // i = 2
    f.instruction(&Instruction::I64Const(2));
    f.instruction(&Instruction::LocalSet(1));

    f.instruction(&Instruction::Block(BlockType::Empty)); // break target
    f.instruction(&Instruction::Loop(BlockType::Empty));

    // if i > n → break
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64GtS);
    f.instruction(&Instruction::BrIf(1));

    // addr = &f[i]
    emit_slot_address(&mut f, 1, 8);
    f.instruction(&Instruction::LocalSet(2));

    // f[i] = f[i - 1] + f[i - 2]
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Const(8));
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::I64Load(memarg(0, 3)));
    f.instruction(&Instruction::LocalGet(2));
    f.instruction(&Instruction::I32Const(16));
    f.instruction(&Instruction::I32Sub);
    f.instruction(&Instruction::I64Load(memarg(0, 3)));
    f.instruction(&Instruction::I64Add);
    f.instruction(&Instruction::I64Store(memarg(0, 3)));

    // i += 1
    f.instruction(&Instruction::LocalGet(1));
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::I64Add);
    f.instruction(&Instruction::LocalSet(1));
    f.instruction(&Instruction::Br(0));

    f.instruction(&Instruction::End); // end loop
    f.instruction(&Instruction::End); // end block

    // return f[n]
    emit_slot_address(&mut f, 0, 8);
    f.instruction(&Instruction::I64Load(memarg(0, 3)));
    f.instruction(&Instruction::End);
    f
}

// ══════════════════════════════════════════════════════════════════════════════
// sieve
// ══════════════════════════════════════════════════════════════════════════════

// Locals of `sieve`, after the `limit` parameter (local 0).
const SIEVE_X: u32 = 1;
const SIEVE_Y: u32 = 2;
const SIEVE_N: u32 = 3;
const SIEVE_R: u32 = 4;
const SIEVE_STEP: u32 = 5;
const SIEVE_I: u32 = 6;
const SIEVE_REM: u32 = 7;

/// Emit `sieve(limit: i64) -> i32`.
///
/// Sentinels for `limit <= 4`, otherwise a byte-per-flag table at
/// `HEAP_START` run through the quadratic-form toggles, the square-multiple
/// elimination and a downward scan for the highest set flag.
pub fn emit_sieve() -> Function {
    let mut f = Function::new(vec![(7, ValType::I64)]); // locals 1..=7

    emit_argument_guard(&mut f, 0, KernelId::Sieve, SIEVE_MAX_LIMIT);

    // ── Sentinels ────────────────────────────────────────────────────────
    for (max, result) in [(0i64, 0i32), (1, 1), (2, 2), (4, 3)] {
        f.instruction(&Instruction::LocalGet(0));
        f.instruction(&Instruction::I64Const(max));
        f.instruction(&Instruction::I64LeS);
        f.instruction(&Instruction::If(BlockType::Empty));
        f.instruction(&Instruction::I32Const(result));
        f.instruction(&Instruction::Return);
        f.instruction(&Instruction::End);
    }

    // ── Table: limit + 1 zeroed flags ────────────────────────────────────
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::I64Add);
    f.instruction(&Instruction::I32Const(KernelId::Sieve.site()));
    f.instruction(&Instruction::Call(FUNC_RESERVE));

    f.instruction(&Instruction::I32Const(HEAP_START as i32));
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::I64Add);
    f.instruction(&Instruction::I32WrapI64);
    f.instruction(&Instruction::MemoryFill(0));

    // ── Quadratic-form toggles ───────────────────────────────────────────
    // x = 1
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::LocalSet(SIEVE_X));
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    // if x * x > limit → break
    emit_square_exceeds_limit(&mut f, SIEVE_X);
    f.instruction(&Instruction::BrIf(1));

    // y = 1
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::LocalSet(SIEVE_Y));
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    // if y * y > limit → break
    emit_square_exceeds_limit(&mut f, SIEVE_Y);
    f.instruction(&Instruction::BrIf(1));

    // n = 4x² + y²; toggle when n <= limit and n % 12 ∈ {1, 5}
    emit_quadratic_form(&mut f, 4, Instruction::I64Add);
    emit_n_within_limit(&mut f);
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(SIEVE_N));
    f.instruction(&Instruction::I64Const(12));
    f.instruction(&Instruction::I64RemU);
    f.instruction(&Instruction::LocalTee(SIEVE_REM));
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::I64Eq);
    f.instruction(&Instruction::LocalGet(SIEVE_REM));
    f.instruction(&Instruction::I64Const(5));
    f.instruction(&Instruction::I64Eq);
    f.instruction(&Instruction::I32Or);
    f.instruction(&Instruction::If(BlockType::Empty));
    emit_toggle(&mut f);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);

    // n = 3x² + y²; toggle when n <= limit and n % 12 == 7
    emit_quadratic_form(&mut f, 3, Instruction::I64Add);
    emit_n_within_limit(&mut f);
    f.instruction(&Instruction::If(BlockType::Empty));
    emit_n_mod_12_is(&mut f, 7);
    f.instruction(&Instruction::If(BlockType::Empty));
    emit_toggle(&mut f);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);

    // if x > y: n = 3x² - y²; toggle when n <= limit and n % 12 == 11
    f.instruction(&Instruction::LocalGet(SIEVE_X));
    f.instruction(&Instruction::LocalGet(SIEVE_Y));
    f.instruction(&Instruction::I64GtS);
    f.instruction(&Instruction::If(BlockType::Empty));
    emit_quadratic_form(&mut f, 3, Instruction::I64Sub);
    emit_n_within_limit(&mut f);
    f.instruction(&Instruction::If(BlockType::Empty));
    emit_n_mod_12_is(&mut f, 11);
    f.instruction(&Instruction::If(BlockType::Empty));
    emit_toggle(&mut f);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);
    f.instruction(&Instruction::End);

    // y += 1
    emit_increment(&mut f, SIEVE_Y);
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End); // end y loop
    f.instruction(&Instruction::End); // end y block

    // x += 1
    emit_increment(&mut f, SIEVE_X);
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End); // end x loop
    f.instruction(&Instruction::End); // end x block

    // ── Clear multiples of r² for surviving candidates r >= 5 ────────────
    f.instruction(&Instruction::I64Const(5));
    f.instruction(&Instruction::LocalSet(SIEVE_R));
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    // step = r * r; if step > limit → break
    f.instruction(&Instruction::LocalGet(SIEVE_R));
    f.instruction(&Instruction::LocalGet(SIEVE_R));
    f.instruction(&Instruction::I64Mul);
    f.instruction(&Instruction::LocalTee(SIEVE_STEP));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64GtS);
    f.instruction(&Instruction::BrIf(1));

    // if table[r]
    emit_slot_address(&mut f, SIEVE_R, 1);
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::If(BlockType::Empty));
    // i = step
    f.instruction(&Instruction::LocalGet(SIEVE_STEP));
    f.instruction(&Instruction::LocalSet(SIEVE_I));
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    // if i > limit → break
    f.instruction(&Instruction::LocalGet(SIEVE_I));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64GtS);
    f.instruction(&Instruction::BrIf(1));
    // table[i] = 0
    emit_slot_address(&mut f, SIEVE_I, 1);
    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::I32Store8(memarg(0, 0)));
    // i += step
    f.instruction(&Instruction::LocalGet(SIEVE_I));
    f.instruction(&Instruction::LocalGet(SIEVE_STEP));
    f.instruction(&Instruction::I64Add);
    f.instruction(&Instruction::LocalSet(SIEVE_I));
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End); // end i loop
    f.instruction(&Instruction::End); // end i block
    f.instruction(&Instruction::End); // end if table[r]

    // r += 1
    emit_increment(&mut f, SIEVE_R);
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End); // end r loop
    f.instruction(&Instruction::End); // end r block

    // ── Highest surviving flag ───────────────────────────────────────────
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::LocalSet(SIEVE_I));
    f.instruction(&Instruction::Block(BlockType::Empty));
    f.instruction(&Instruction::Loop(BlockType::Empty));
    // if i < 0 → break
    f.instruction(&Instruction::LocalGet(SIEVE_I));
    f.instruction(&Instruction::I64Const(0));
    f.instruction(&Instruction::I64LtS);
    f.instruction(&Instruction::BrIf(1));
    // if table[i] → return i
    emit_slot_address(&mut f, SIEVE_I, 1);
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::If(BlockType::Empty));
    f.instruction(&Instruction::LocalGet(SIEVE_I));
    f.instruction(&Instruction::I32WrapI64);
    f.instruction(&Instruction::Return);
    f.instruction(&Instruction::End);
    // i -= 1
    f.instruction(&Instruction::LocalGet(SIEVE_I));
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::I64Sub);
    f.instruction(&Instruction::LocalSet(SIEVE_I));
    f.instruction(&Instruction::Br(0));
    f.instruction(&Instruction::End); // end loop
    f.instruction(&Instruction::End); // end block

    f.instruction(&Instruction::I32Const(0));
    f.instruction(&Instruction::End);
    f
}

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

/// Push `HEAP_START + local * width` as an i32 address.
fn emit_slot_address(f: &mut Function, local: u32, width: i32) {
    f.instruction(&Instruction::LocalGet(local));
    f.instruction(&Instruction::I32WrapI64);
    if width != 1 {
        f.instruction(&Instruction::I32Const(width));
        f.instruction(&Instruction::I32Mul);
    }
    f.instruction(&Instruction::I32Const(HEAP_START as i32));
    f.instruction(&Instruction::I32Add);
}

/// Push `local * local > limit`.
fn emit_square_exceeds_limit(f: &mut Function, local: u32) {
    f.instruction(&Instruction::LocalGet(local));
    f.instruction(&Instruction::LocalGet(local));
    f.instruction(&Instruction::I64Mul);
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64GtS);
}

/// `n = coeff * x * x <op> y * y`
fn emit_quadratic_form(f: &mut Function, coeff: i64, op: Instruction<'static>) {
    f.instruction(&Instruction::I64Const(coeff));
    f.instruction(&Instruction::LocalGet(SIEVE_X));
    f.instruction(&Instruction::I64Mul);
    f.instruction(&Instruction::LocalGet(SIEVE_X));
    f.instruction(&Instruction::I64Mul);
    f.instruction(&Instruction::LocalGet(SIEVE_Y));
    f.instruction(&Instruction::LocalGet(SIEVE_Y));
    f.instruction(&Instruction::I64Mul);
    f.instruction(&op);
    f.instruction(&Instruction::LocalSet(SIEVE_N));
}

/// Push `n <= limit`.  The unsigned compare also rejects negative `n`.
fn emit_n_within_limit(f: &mut Function) {
    f.instruction(&Instruction::LocalGet(SIEVE_N));
    f.instruction(&Instruction::LocalGet(0));
    f.instruction(&Instruction::I64LeU);
}

/// Push `n % 12 == rem`.
fn emit_n_mod_12_is(f: &mut Function, rem: i64) {
    f.instruction(&Instruction::LocalGet(SIEVE_N));
    f.instruction(&Instruction::I64Const(12));
    f.instruction(&Instruction::I64RemU);
    f.instruction(&Instruction::I64Const(rem));
    f.instruction(&Instruction::I64Eq);
}

/// `table[n] = !table[n]`
fn emit_toggle(f: &mut Function) {
    emit_slot_address(f, SIEVE_N, 1);
    emit_slot_address(f, SIEVE_N, 1);
    f.instruction(&Instruction::I32Load8U(memarg(0, 0)));
    f.instruction(&Instruction::I32Eqz);
    f.instruction(&Instruction::I32Store8(memarg(0, 0)));
}

/// `local += 1` for an i64 local.
fn emit_increment(f: &mut Function, local: u32) {
    f.instruction(&Instruction::LocalGet(local));
    f.instruction(&Instruction::I64Const(1));
    f.instruction(&Instruction::I64Add);
    f.instruction(&Instruction::LocalSet(local));
}

/// Create a `MemArg` with the given offset and alignment power.
pub(crate) fn memarg(offset: u64, align: u32) -> MemArg {
    MemArg {
        offset,
        align,
        memory_index: 0,
    }
}
