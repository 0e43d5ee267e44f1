//! Reference registry vs. generated module.
//!
//! Every observable result, including errors and abort diagnostics, must be
//! identical between `numkern_eval::KernelInstance` and `WasmKernel` for the
//! same configuration.

use numkern_eval::KernelInstance;
use numkern_host::WasmKernel;
use numkern_types::abi::{FIBONACCI_MAX_N, SIEVE_MAX_LIMIT};
use numkern_types::{Kernel, KernelConfig, KernelError};
use proptest::prelude::*;

// ══════════════════════════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════════════════════════

fn pair(config: KernelConfig) -> (KernelInstance, WasmKernel) {
    let eval = KernelInstance::with_config(config.clone()).expect("valid config");
    let wasm = WasmKernel::new(config).expect("module instantiates");
    (eval, wasm)
}

fn default_pair() -> (KernelInstance, WasmKernel) {
    pair(KernelConfig::default())
}

/// Compare two errors on what the boundary promises: the variant, the
/// argument details and the abort diagnostics.  Trap messages differ.
fn assert_same_error(eval: &KernelError, wasm: &KernelError) {
    match (eval, wasm) {
        (KernelError::InternalTrap(a), KernelError::InternalTrap(b)) => {
            assert_eq!(a.abort, b.abort, "abort diagnostics differ");
        }
        _ => assert_eq!(eval, wasm),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Results
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn fibonacci_parity_including_wraparound() {
    let (mut eval, mut wasm) = default_pair();
    for n in 0..=120 {
        assert_eq!(eval.fibonacci(n), wasm.fibonacci(n), "fibonacci({n})");
    }
}

#[test]
fn sieve_parity() {
    let (mut eval, mut wasm) = default_pair();
    for limit in 0..=2_000 {
        assert_eq!(eval.sieve(limit), wasm.sieve(limit), "sieve({limit})");
    }
    for limit in [65_535, 65_536, 100_000] {
        assert_eq!(eval.sieve(limit), wasm.sieve(limit), "sieve({limit})");
    }
}

#[test]
fn global_const_parity() {
    let (eval, wasm) = pair(KernelConfig {
        global_const: -12.125,
        ..KernelConfig::default()
    });
    assert_eq!(eval.global_const(), wasm.global_const());
    assert_eq!(
        eval.global("global_const").unwrap(),
        wasm.global("global_const").unwrap()
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Errors
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn argument_error_parity() {
    let (mut eval, mut wasm) = default_pair();
    for n in [-1, -1_000, i64::MIN, FIBONACCI_MAX_N + 1, i64::MAX] {
        assert_same_error(&eval.fibonacci(n).unwrap_err(), &wasm.fibonacci(n).unwrap_err());
    }
    for limit in [-1, i64::MIN, SIEVE_MAX_LIMIT + 1, i64::MAX] {
        assert_same_error(&eval.sieve(limit).unwrap_err(), &wasm.sieve(limit).unwrap_err());
    }
}

#[test]
fn out_of_memory_parity() {
    let (mut eval, mut wasm) = pair(KernelConfig {
        max_memory_pages: 2,
        ..KernelConfig::default()
    });
    for n in [8_190, 8_191, 100_000] {
        match (eval.fibonacci(n), wasm.fibonacci(n)) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(a), Err(b)) => assert_same_error(&a, &b),
            (a, b) => panic!("fibonacci({n}) diverged: {a:?} vs {b:?}"),
        }
    }
    for limit in [65_535, 65_536, FIBONACCI_MAX_N] {
        match (eval.sieve(limit), wasm.sieve(limit)) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(a), Err(b)) => assert_same_error(&a, &b),
            (a, b) => panic!("sieve({limit}) diverged: {a:?} vs {b:?}"),
        }
    }
}

#[test]
fn host_cap_parity() {
    let config = KernelConfig {
        max_fibonacci_n: Some(40),
        max_sieve_limit: Some(400),
        ..KernelConfig::default()
    };
    let (mut eval, mut wasm) = pair(config);
    for n in [-1, 40, 41] {
        assert_eq!(eval.fibonacci(n), wasm.fibonacci(n), "fibonacci({n})");
    }
    for limit in [-1, 400, 401] {
        assert_eq!(eval.sieve(limit), wasm.sieve(limit), "sieve({limit})");
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// State
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn callback_parity() {
    let (mut eval, mut wasm) = default_pair();
    assert_eq!(eval.invoke_callback(), wasm.invoke_callback());
    eval.bind_callback(|x| x * 3 + 2);
    wasm.bind_callback(|x| x * 3 + 2);
    for _ in 0..6 {
        assert_eq!(eval.invoke_callback(), wasm.invoke_callback());
        assert_eq!(eval.from_callback(), wasm.from_callback());
    }
}

#[cfg(target_endian = "little")]
#[test]
fn snapshot_parity() {
    let (mut eval, mut wasm) = default_pair();
    assert_eq!(eval.memory_value(), wasm.memory_value());
    let bytes = [0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88];
    eval.memory_mut().write(0, &bytes).unwrap();
    wasm.memory().write(0, &bytes).unwrap();
    eval.update_memory().unwrap();
    wasm.update_memory().unwrap();
    assert_eq!(eval.memory_value(), wasm.memory_value());
    assert_eq!(
        eval.global("memory_value").unwrap(),
        wasm.global("memory_value").unwrap()
    );
}

// ══════════════════════════════════════════════════════════════════════════════
// Properties
// ══════════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sieve_agrees(limit in 0i64..20_000) {
        let (mut eval, mut wasm) = default_pair();
        prop_assert_eq!(eval.sieve(limit), wasm.sieve(limit));
    }

    #[test]
    fn fibonacci_agrees(n in -50i64..500) {
        let (mut eval, mut wasm) = default_pair();
        prop_assert_eq!(eval.fibonacci(n), wasm.fibonacci(n));
    }

    #[test]
    fn callback_agrees(a in -1_000i64..1_000, b in -1_000i64..1_000, rounds in 1usize..6) {
        let (mut eval, mut wasm) = default_pair();
        eval.bind_callback(move |x| x.wrapping_mul(a).wrapping_add(b));
        wasm.bind_callback(move |x| x.wrapping_mul(a).wrapping_add(b));
        for _ in 0..rounds {
            eval.invoke_callback().unwrap();
            wasm.invoke_callback().unwrap();
        }
        prop_assert_eq!(eval.from_callback(), wasm.from_callback());
    }
}
