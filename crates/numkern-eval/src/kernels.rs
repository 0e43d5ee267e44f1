//! The pure numeric kernels.
//!
//! Tables are sized exactly as the WASM module sizes them in linear memory,
//! so a table that would overflow the module's memory ceiling fails here the
//! same way: an out-of-memory `InternalTrap`.

use numkern_types::abi::{pages_for_table, ABORT_OUT_OF_MEMORY};
use numkern_types::{check_domain, AbortInfo, KernelError, KernelId, KernelResult, TrapInfo};

/// Memory ceiling applied to call-scoped tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableBudget {
    pub max_memory_pages: u64,
}

impl TableBudget {
    pub fn new(max_memory_pages: u64) -> Self {
        Self { max_memory_pages }
    }

    /// Allocate a zeroed table of `len` entries for `kernel`.
    pub fn table<T: Clone + Default>(&self, kernel: KernelId, len: usize) -> KernelResult<Vec<T>> {
        let bytes = (len as u64).saturating_mul(std::mem::size_of::<T>() as u64);
        let needed = pages_for_table(bytes);
        if needed > self.max_memory_pages {
            return Err(out_of_memory(
                kernel,
                bytes,
                format!(
                    "`{kernel}` table of {bytes} bytes needs {needed} pages, limit is {}",
                    self.max_memory_pages
                ),
            ));
        }
        let mut table = Vec::new();
        table.try_reserve_exact(len).map_err(|e| {
            out_of_memory(kernel, bytes, format!("`{kernel}` table allocation failed: {e}"))
        })?;
        table.resize(len, T::default());
        Ok(table)
    }
}

fn out_of_memory(kernel: KernelId, bytes: u64, message: String) -> KernelError {
    KernelError::InternalTrap(TrapInfo::new(
        Some(AbortInfo::new(ABORT_OUT_OF_MEMORY, kernel.site(), 0, bytes as i32)),
        message,
    ))
}

/// `F(n)` from a bottom-up table of `n + 2` entries seeded `0, 1`.
///
/// Addition wraps on overflow (`n > 92`), matching `i64.add`.
pub fn fibonacci(n: i64, budget: &TableBudget) -> KernelResult<i64> {
    check_domain(KernelId::Fibonacci, n)?;
    let n = n as usize;
    let mut f: Vec<i64> = budget.table(KernelId::Fibonacci, n + 2)?;
    f[1] = 1;
    for i in 2..=n {
        f[i] = f[i - 1].wrapping_add(f[i - 2]);
    }
    Ok(f[n])
}

/// Largest prime `<= limit` by the quadratic-form sieve.
///
/// Small limits return sentinels: `0 -> 0`, `1 -> 1`, `2 -> 2`, `3..=4 -> 3`.
/// `1` is not prime; the sentinel is kept as-is.
pub fn sieve(limit: i64, budget: &TableBudget) -> KernelResult<i32> {
    check_domain(KernelId::Sieve, limit)?;
    match limit {
        0 => return Ok(0),
        1 => return Ok(1),
        2 => return Ok(2),
        3 | 4 => return Ok(3),
        _ => {}
    }

    let mut table: Vec<bool> = budget.table(KernelId::Sieve, limit as usize + 1)?;

    let mut x: i64 = 1;
    while x * x <= limit {
        let mut y: i64 = 1;
        while y * y <= limit {
            let n = 4 * x * x + y * y;
            if n <= limit && matches!(n % 12, 1 | 5) {
                toggle(&mut table, n);
            }
            let n = 3 * x * x + y * y;
            if n <= limit && n % 12 == 7 {
                toggle(&mut table, n);
            }
            if x > y {
                let n = 3 * x * x - y * y;
                if n <= limit && n % 12 == 11 {
                    toggle(&mut table, n);
                }
            }
            y += 1;
        }
        x += 1;
    }

    // Clear multiples of squares of the remaining candidates.
    let mut r: usize = 5;
    while r * r < table.len() {
        if table[r] {
            let step = r * r;
            for i in (step..table.len()).step_by(step) {
                table[i] = false;
            }
        }
        r += 1;
    }

    Ok(table.iter().rposition(|&p| p).map_or(0, |i| i as i32))
}

/// Flip `table[n]`; negative or out-of-range `n` never indexes.
fn toggle(table: &mut [bool], n: i64) {
    if let Some(flag) = usize::try_from(n).ok().and_then(|i| table.get_mut(i)) {
        *flag = !*flag;
    }
}
