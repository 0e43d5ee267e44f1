//! The host side of the boundary: one callback slot and the linear memory.

use std::fmt;

use numkern_types::{HostCallback, KernelError, KernelResult};

use crate::memory::LinearMemory;

/// Holds the host's injected callback and its linear memory.
///
/// The registry reaches the host only through [`HostBridge::call`].
#[derive(Default)]
pub struct HostBridge {
    callback: Option<HostCallback>,
    memory: LinearMemory,
}

impl HostBridge {
    pub fn new(memory: LinearMemory) -> Self {
        Self {
            callback: None,
            memory,
        }
    }

    /// Bind `callback`, replacing any earlier one.
    pub fn bind_callback(&mut self, callback: impl FnMut(i64) -> i64 + Send + 'static) {
        self.callback = Some(Box::new(callback));
        log::info!("host callback bound");
    }

    /// Remove the bound callback, returning it.
    pub fn unbind_callback(&mut self) -> Option<HostCallback> {
        self.callback.take()
    }

    pub fn is_bound(&self) -> bool {
        self.callback.is_some()
    }

    /// Invoke the bound callback.
    pub fn call(&mut self, value: i64) -> KernelResult<i64> {
        let callback = self.callback.as_mut().ok_or(KernelError::UnboundCallback)?;
        Ok(callback(value))
    }

    pub fn memory(&self) -> &LinearMemory {
        &self.memory
    }

    /// Host write access to the linear memory.
    pub fn memory_mut(&mut self) -> &mut LinearMemory {
        &mut self.memory
    }
}

impl fmt::Debug for HostBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostBridge")
            .field("callback_bound", &self.is_bound())
            .field("memory_len", &self.memory.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbound_call_fails() {
        let mut bridge = HostBridge::default();
        assert_eq!(bridge.call(1), Err(KernelError::UnboundCallback));
    }

    #[test]
    fn bound_call_and_rebind() {
        let mut bridge = HostBridge::default();
        bridge.bind_callback(|x| x + 1);
        assert_eq!(bridge.call(1), Ok(2));
        bridge.bind_callback(|x| x * 10);
        assert_eq!(bridge.call(2), Ok(20));
        assert!(bridge.unbind_callback().is_some());
        assert!(!bridge.is_bound());
    }
}
