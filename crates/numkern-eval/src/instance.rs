//! `KernelInstance`: the reference Kernel Registry.

use numkern_types::abi::{ABORT_OUT_OF_BOUNDS, SNAPSHOT_BYTES};
use numkern_types::barrier::catch_trap;
use numkern_types::{
    AbortInfo, ConfigError, Kernel, KernelConfig, KernelError, KernelId, KernelResult, TrapInfo,
};

use crate::bridge::HostBridge;
use crate::kernels::{self, TableBudget};
use crate::memory::LinearMemory;

/// One module instance: its globals plus the bridge to the host.
#[derive(Debug)]
pub struct KernelInstance {
    config: KernelConfig,
    bridge: HostBridge,
    /// GlobalCounter.
    counter: i64,
    /// MemorySnapshot.
    snapshot: Option<i64>,
}

impl KernelInstance {
    /// Instantiate with the default configuration.
    pub fn new() -> Self {
        let config = KernelConfig::default();
        let memory = LinearMemory::with_pages(config.initial_memory_pages);
        Self::from_parts(config, HostBridge::new(memory))
    }

    /// Instantiate with `config`, sizing linear memory from it.
    pub fn with_config(config: KernelConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let memory = LinearMemory::with_pages(config.initial_memory_pages);
        Ok(Self::from_parts(config, HostBridge::new(memory)))
    }

    /// Instantiate over an existing bridge.  The config is not re-validated.
    pub fn from_parts(config: KernelConfig, bridge: HostBridge) -> Self {
        log::info!(
            "kernel instance created ({} bytes of linear memory, callback bound: {})",
            bridge.memory().len(),
            bridge.is_bound()
        );
        Self {
            config,
            bridge,
            counter: 0,
            snapshot: None,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn bridge(&self) -> &HostBridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut HostBridge {
        &mut self.bridge
    }

    /// Shorthand for `bridge_mut().bind_callback(..)`.
    pub fn bind_callback(&mut self, callback: impl FnMut(i64) -> i64 + Send + 'static) {
        self.bridge.bind_callback(callback);
    }

    /// Shorthand for host write access to linear memory.
    pub fn memory_mut(&mut self) -> &mut LinearMemory {
        self.bridge.memory_mut()
    }

    fn budget(&self) -> TableBudget {
        TableBudget::new(self.config.max_memory_pages)
    }
}

impl Default for KernelInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel for KernelInstance {
    fn fibonacci(&mut self, n: i64) -> KernelResult<i64> {
        log::debug!("fibonacci({n})");
        let budget = self.budget();
        let config = &self.config;
        traced(
            KernelId::Fibonacci,
            catch_trap(KernelId::Fibonacci, || {
                config.check_argument(KernelId::Fibonacci, n)?;
                kernels::fibonacci(n, &budget)
            }),
        )
    }

    fn sieve(&mut self, limit: i64) -> KernelResult<i32> {
        log::debug!("sieve({limit})");
        let budget = self.budget();
        let config = &self.config;
        traced(
            KernelId::Sieve,
            catch_trap(KernelId::Sieve, || {
                config.check_argument(KernelId::Sieve, limit)?;
                kernels::sieve(limit, &budget)
            }),
        )
    }

    fn update_memory(&mut self) -> KernelResult<()> {
        log::debug!("update_memory()");
        let memory = self.bridge.memory();
        let mut word = [0u8; SNAPSHOT_BYTES];
        let read = memory.read(0, &mut word).map_err(|_| {
            KernelError::InternalTrap(TrapInfo::new(
                Some(AbortInfo::new(
                    ABORT_OUT_OF_BOUNDS,
                    KernelId::UpdateMemory.site(),
                    0,
                    memory.len() as i32,
                )),
                format!(
                    "linear memory holds {} bytes, snapshot needs {SNAPSHOT_BYTES}",
                    memory.len()
                ),
            ))
        });
        traced(KernelId::UpdateMemory, read)?;
        self.snapshot = Some(i64::from_ne_bytes(word));
        Ok(())
    }

    fn invoke_callback(&mut self) -> KernelResult<()> {
        log::debug!("invoke_callback() with counter {}", self.counter);
        let counter = self.counter;
        let bridge = &mut self.bridge;
        let next = traced(
            KernelId::InvokeCallback,
            catch_trap(KernelId::InvokeCallback, || bridge.call(counter)),
        )?;
        self.counter = next;
        Ok(())
    }

    fn global_const(&self) -> f64 {
        self.config.global_const
    }

    fn from_callback(&self) -> i64 {
        self.counter
    }

    fn memory_value(&self) -> Option<i64> {
        self.snapshot
    }
}

/// Log a failed entry point before handing the error back to the host.
fn traced<T>(kernel: KernelId, result: KernelResult<T>) -> KernelResult<T> {
    if let Err(err) = &result {
        log::warn!("`{kernel}` failed: {err}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use numkern_types::abi::DEFAULT_GLOBAL_CONST;

    #[test]
    fn fresh_instance_state() {
        let k = KernelInstance::new();
        assert_eq!(k.from_callback(), 0);
        assert_eq!(k.memory_value(), None);
        assert_eq!(k.global_const(), DEFAULT_GLOBAL_CONST);
        assert_eq!(k.bridge().memory().len(), 65_536);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = KernelConfig {
            initial_memory_pages: 0,
            ..KernelConfig::default()
        };
        assert!(KernelInstance::with_config(config).is_err());
    }

    #[test]
    fn short_memory_snapshot_is_an_internal_trap() {
        let bridge = HostBridge::new(LinearMemory::from_bytes(vec![1, 2, 3]));
        let mut k = KernelInstance::from_parts(KernelConfig::default(), bridge);
        match k.update_memory() {
            Err(KernelError::InternalTrap(trap)) => {
                assert_eq!(trap.code(), Some(ABORT_OUT_OF_BOUNDS));
                assert_eq!(trap.abort.unwrap().column, 3);
            }
            other => panic!("expected InternalTrap, got {other:?}"),
        }
        assert_eq!(k.memory_value(), None);
    }
}
