//! Errors surfaced at the module boundary.

use crate::abi::{
    AbortInfo, KernelId, ValueType, ABORT_HOST_PANIC, CHECK_HOST_LIMIT, CHECK_INDEX_RANGE,
    CHECK_NEGATIVE,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which range check an argument failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentCheck {
    /// The value was below zero.
    Negative,
    /// The table for this value would not be addressable with a 32-bit index.
    ExceedsIndexRange,
    /// The value exceeded a cap from [`crate::KernelConfig`].
    ExceedsHostLimit,
}

impl ArgumentCheck {
    /// Abort `line` reported for this check.
    pub fn line(self) -> i32 {
        match self {
            Self::Negative => CHECK_NEGATIVE,
            Self::ExceedsIndexRange => CHECK_INDEX_RANGE,
            Self::ExceedsHostLimit => CHECK_HOST_LIMIT,
        }
    }

    pub fn from_line(line: i32) -> Option<Self> {
        match line {
            CHECK_NEGATIVE => Some(Self::Negative),
            CHECK_INDEX_RANGE => Some(Self::ExceedsIndexRange),
            CHECK_HOST_LIMIT => Some(Self::ExceedsHostLimit),
            _ => None,
        }
    }
}

impl fmt::Display for ArgumentCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Negative => "must not be negative",
            Self::ExceedsIndexRange => "exceeds the 32-bit table index range",
            Self::ExceedsHostLimit => "exceeds the configured host limit",
        })
    }
}

/// Details of a fault caught at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrapInfo {
    /// Diagnostics reported by the module, when the fault went through `abort`.
    pub abort: Option<AbortInfo>,
    /// Human-readable description.
    pub message: String,
}

impl TrapInfo {
    pub fn new(abort: Option<AbortInfo>, message: impl Into<String>) -> Self {
        Self {
            abort,
            message: message.into(),
        }
    }

    /// A trap raised by host code panicking inside `kernel`.
    pub fn host_panic(kernel: KernelId, message: impl Into<String>) -> Self {
        Self::new(
            Some(AbortInfo::new(ABORT_HOST_PANIC, kernel.site(), 0, 0)),
            message,
        )
    }

    /// Abort code, if any.
    pub fn code(&self) -> Option<i32> {
        self.abort.map(|a| a.code)
    }
}

impl fmt::Display for TrapInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.abort {
            Some(abort) => write!(f, "{} [{abort}]", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Errors returned by kernel entry points.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    /// Out-of-domain numeric input, rejected before any table is built.
    #[error("invalid argument to `{kernel}`: {value} {check}")]
    InvalidArgument {
        kernel: KernelId,
        value: i64,
        check: ArgumentCheck,
    },

    /// `invoke_callback` ran before a callback was bound.
    #[error("no callback bound; bind one before calling `invoke_callback`")]
    UnboundCallback,

    /// A lower-level fault neutralised at the module boundary.
    #[error("internal trap: {0}")]
    InternalTrap(TrapInfo),

    /// A host memory access fell outside linear memory.
    #[error("memory access out of bounds: offset {offset} + {len} bytes exceeds {size}")]
    MemoryOutOfBounds { offset: u64, len: u64, size: u64 },

    /// By-name dispatch named something the module does not export.
    #[error("unknown export: {0}")]
    UnknownExport(String),

    /// By-name dispatch passed the wrong number of arguments.
    #[error("`{name}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    /// By-name dispatch passed an argument of the wrong type.
    #[error("`{name}` expects {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        got: ValueType,
    },
}

impl KernelError {
    pub fn invalid_argument(kernel: KernelId, value: i64, check: ArgumentCheck) -> Self {
        Self::InvalidArgument {
            kernel,
            value,
            check,
        }
    }

    /// Abort diagnostics equivalent to this error, where the module has any.
    pub fn abort_info(&self) -> Option<AbortInfo> {
        match self {
            Self::InvalidArgument {
                kernel,
                value,
                check,
            } => Some(AbortInfo::new(
                crate::abi::ABORT_INVALID_ARGUMENT,
                kernel.site(),
                check.line(),
                *value as i32,
            )),
            Self::InternalTrap(trap) => trap.abort,
            _ => None,
        }
    }
}

/// Result alias for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ABORT_INVALID_ARGUMENT;

    #[test]
    fn checks_round_trip_through_abort_lines() {
        for check in [
            ArgumentCheck::Negative,
            ArgumentCheck::ExceedsIndexRange,
            ArgumentCheck::ExceedsHostLimit,
        ] {
            assert_eq!(ArgumentCheck::from_line(check.line()), Some(check));
        }
        assert_eq!(ArgumentCheck::from_line(0), None);
    }

    #[test]
    fn invalid_argument_message() {
        let err = KernelError::invalid_argument(KernelId::Fibonacci, -1, ArgumentCheck::Negative);
        assert_eq!(
            err.to_string(),
            "invalid argument to `fibonacci`: -1 must not be negative"
        );
    }

    #[test]
    fn invalid_argument_maps_to_abort_info() {
        let err = KernelError::invalid_argument(KernelId::Sieve, -7, ArgumentCheck::Negative);
        let abort = err.abort_info().unwrap();
        assert_eq!(abort.code, ABORT_INVALID_ARGUMENT);
        assert_eq!(abort.kernel(), Some(KernelId::Sieve));
        assert_eq!(abort.line, ArgumentCheck::Negative.line());
        assert_eq!(abort.column, -7);
    }

    #[test]
    fn trap_display_includes_diagnostics() {
        let trap = TrapInfo::host_panic(KernelId::InvokeCallback, "boom");
        let err = KernelError::InternalTrap(trap);
        assert_eq!(
            err.to_string(),
            "internal trap: boom [abort(code=4, file=4, line=0, column=0)]"
        );
    }
}
