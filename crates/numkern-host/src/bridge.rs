//! The host side of the boundary as seen by wasmi.
//!
//! [`HostState`] is the store data: the callback slot plus what the two
//! imports observed during the current call.  [`linker`] binds `env.abort`
//! and `env.callback` against it.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use numkern_types::abi::{
    AbortInfo, ABORT_HOST_PANIC, IMPORT_ABORT_NAME, IMPORT_CALLBACK_NAME, IMPORT_MODULE,
};
use numkern_types::barrier::panic_message;
use numkern_types::{HostCallback, KernelId};
use wasmi::{Caller, Engine, Linker};

use crate::error::{HostError, HostResult};

/// Store data for one kernel instance.
#[derive(Default)]
pub struct HostState {
    pub(crate) callback: Option<HostCallback>,
    /// Last diagnostics reported through `env.abort`.
    pub(crate) last_abort: Option<AbortInfo>,
    /// Set when the callback panicked during the current call.
    pub(crate) callback_panic: Option<String>,
    /// Cursor of the memory stream.
    pub(crate) memory_position: u64,
}

impl HostState {
    /// Clear per-call diagnostics before entering the module.
    pub(crate) fn begin_call(&mut self) {
        self.last_abort = None;
        self.callback_panic = None;
    }

    pub fn is_bound(&self) -> bool {
        self.callback.is_some()
    }

    pub fn last_abort(&self) -> Option<AbortInfo> {
        self.last_abort
    }
}

impl fmt::Debug for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostState")
            .field("callback_bound", &self.is_bound())
            .field("last_abort", &self.last_abort)
            .field("memory_position", &self.memory_position)
            .finish()
    }
}

/// Build a linker with both imports bound to [`HostState`].
pub fn linker(engine: &Engine) -> HostResult<Linker<HostState>> {
    let mut linker = Linker::<HostState>::new(engine);

    // env.abort(code, file, line, column): record, then the module traps.
    linker.func_wrap(
        IMPORT_MODULE,
        IMPORT_ABORT_NAME,
        |mut caller: Caller<'_, HostState>, code: i32, file: i32, line: i32, column: i32| {
            let abort = AbortInfo::new(code, file, line, column);
            log::debug!("module reported {abort}");
            caller.data_mut().last_abort = Some(abort);
        },
    )
    .map_err(link_error)?;

    // env.callback(value) -> value'
    //
    // A panicking callback must not unwind through the interpreter.  The
    // panic is recorded and the input returned unchanged, so the counter keeps
    // its value; the caller turns the record into an InternalTrap.
    linker.func_wrap(
        IMPORT_MODULE,
        IMPORT_CALLBACK_NAME,
        |mut caller: Caller<'_, HostState>, value: i64| -> i64 {
            let state = caller.data_mut();
            let Some(callback) = state.callback.as_mut() else {
                log::error!("`callback` import reached without a bound callback");
                return value;
            };
            match panic::catch_unwind(AssertUnwindSafe(|| callback(value))) {
                Ok(next) => next,
                Err(payload) => {
                    let message = format!(
                        "`{}` panicked: {}",
                        KernelId::InvokeCallback,
                        panic_message(&*payload)
                    );
                    state.last_abort = Some(AbortInfo::new(
                        ABORT_HOST_PANIC,
                        KernelId::InvokeCallback.site(),
                        0,
                        value as i32,
                    ));
                    state.callback_panic = Some(message);
                    value
                }
            }
        },
    )
    .map_err(link_error)?;

    Ok(linker)
}

fn link_error(e: impl fmt::Display) -> HostError {
    HostError::Instantiation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_call_clears_diagnostics_only() {
        let mut state = HostState {
            callback: Some(Box::new(|x| x)),
            last_abort: Some(AbortInfo::new(1, 1, 1, -1)),
            callback_panic: Some("boom".into()),
            memory_position: 12,
        };
        state.begin_call();
        assert_eq!(state.last_abort(), None);
        assert!(state.callback_panic.is_none());
        assert!(state.is_bound());
        assert_eq!(state.memory_position, 12);
    }

    #[test]
    fn linker_builds() {
        assert!(linker(&Engine::default()).is_ok());
    }
}
