//! Panic barrier for kernel entry points.
//!
//! Host callbacks are arbitrary code.  A panic inside one must not unwind
//! through the host's call into the kernel, so every entry point runs inside
//! [`catch_trap`] and a panic comes back as [`KernelError::InternalTrap`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::abi::KernelId;
use crate::error::{KernelError, KernelResult, TrapInfo};

/// Run `f`, converting a panic into an `InternalTrap` attributed to `kernel`.
pub fn catch_trap<R>(kernel: KernelId, f: impl FnOnce() -> KernelResult<R>) -> KernelResult<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = format!("`{kernel}` panicked: {}", panic_message(&*payload));
            Err(KernelError::InternalTrap(TrapInfo::host_panic(kernel, message)))
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ABORT_HOST_PANIC;

    #[test]
    fn passes_results_through() {
        assert_eq!(catch_trap(KernelId::Sieve, || Ok(7)).unwrap(), 7);
        let err = catch_trap::<()>(KernelId::InvokeCallback, || Err(KernelError::UnboundCallback));
        assert_eq!(err, Err(KernelError::UnboundCallback));
    }

    #[test]
    fn converts_panics() {
        let err = catch_trap::<()>(KernelId::InvokeCallback, || panic!("callback exploded"))
            .unwrap_err();
        match err {
            KernelError::InternalTrap(trap) => {
                assert_eq!(trap.code(), Some(ABORT_HOST_PANIC));
                assert_eq!(trap.abort.unwrap().kernel(), Some(KernelId::InvokeCallback));
                assert!(trap.message.contains("callback exploded"), "{}", trap.message);
            }
            other => panic!("expected InternalTrap, got {other:?}"),
        }
    }
}
