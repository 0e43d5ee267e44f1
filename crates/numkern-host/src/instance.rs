//! `WasmKernel`: the kernel module running on wasmi.

use numkern_types::abi::{
    ABORT_INVALID_ARGUMENT, EXPORT_FIBONACCI, EXPORT_FROM_CALLBACK, EXPORT_GLOBAL_CONST,
    EXPORT_INVOKE_CALLBACK, EXPORT_MEMORY, EXPORT_MEMORY_VALUE, EXPORT_SIEVE,
    EXPORT_UPDATE_MEMORY,
};
use numkern_types::barrier::catch_trap;
use numkern_types::{
    AbortInfo, ArgumentCheck, HostCallback, Kernel, KernelConfig, KernelError, KernelId,
    KernelResult, TrapInfo,
};
use wasmi::{Engine, Global, Instance, Memory, Module, Store, TypedFunc, WasmParams, WasmResults};

use crate::bridge::{self, HostState};
use crate::error::{HostError, HostResult};
use crate::inspect::{inspect, ModuleInfo};
use crate::memory::{MemoryLimits, WasmMemory};

/// One instantiated kernel module with its own store.
pub struct WasmKernel {
    config: KernelConfig,
    info: ModuleInfo,
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
    limits: MemoryLimits,
    fibonacci: TypedFunc<i64, i64>,
    sieve: TypedFunc<i64, i32>,
    update_memory: TypedFunc<(), ()>,
    invoke_callback: TypedFunc<(), ()>,
    global_const: Global,
    from_callback: Global,
    memory_value: Global,
    /// `memory_value` reads as unset until the first successful snapshot.
    snapshot_taken: bool,
}

impl WasmKernel {
    /// Compile the module for `config` and instantiate it.
    pub fn new(config: KernelConfig) -> HostResult<Self> {
        config.validate()?;
        let wasm = numkern_codegen::compile_with(&config)?;
        Self::from_module_bytes(&wasm, config)
    }

    /// Instantiate prebuilt module bytes.  `config` supplies the host caps;
    /// memory limits come from the module itself.
    pub fn from_module_bytes(wasm: &[u8], config: KernelConfig) -> HostResult<Self> {
        config.validate()?;
        let info = inspect(wasm)?;
        let limits = info
            .memory_limits()
            .ok_or_else(|| HostError::MissingExport(EXPORT_MEMORY.to_string()))?;

        let engine = Engine::default();
        let module = Module::new(&engine, wasm)?;
        let mut store = Store::new(&engine, HostState::default());
        let linker = bridge::linker(&engine)?;
        let instance = linker.instantiate(&mut store, &module)?.start(&mut store)?;

        let memory = instance
            .get_memory(&store, EXPORT_MEMORY)
            .ok_or_else(|| HostError::MissingExport(EXPORT_MEMORY.to_string()))?;
        let fibonacci = typed_func(&store, &instance, EXPORT_FIBONACCI)?;
        let sieve = typed_func(&store, &instance, EXPORT_SIEVE)?;
        let update_memory = typed_func(&store, &instance, EXPORT_UPDATE_MEMORY)?;
        let invoke_callback = typed_func(&store, &instance, EXPORT_INVOKE_CALLBACK)?;
        let global_const = global(&store, &instance, EXPORT_GLOBAL_CONST)?;
        let from_callback = global(&store, &instance, EXPORT_FROM_CALLBACK)?;
        let memory_value = global(&store, &instance, EXPORT_MEMORY_VALUE)?;

        log::info!(
            "kernel module instantiated ({} bytes, sha256 {}, memory {}..{:?} pages)",
            info.size,
            info.sha256,
            limits.min_pages,
            limits.max_pages
        );

        Ok(Self {
            config,
            info,
            store,
            instance,
            memory,
            limits,
            fibonacci,
            sieve,
            update_memory,
            invoke_callback,
            global_const,
            from_callback,
            memory_value,
            snapshot_taken: false,
        })
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Static description of the instantiated module.
    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Bind `callback`, replacing any earlier one.
    pub fn bind_callback(&mut self, callback: impl FnMut(i64) -> i64 + Send + 'static) {
        self.store.data_mut().callback = Some(Box::new(callback));
        log::info!("host callback bound");
    }

    /// Remove the bound callback, returning it.
    pub fn unbind_callback(&mut self) -> Option<HostCallback> {
        self.store.data_mut().callback.take()
    }

    pub fn is_bound(&self) -> bool {
        self.store.data().is_bound()
    }

    /// Diagnostics reported through `env.abort` by the most recent call.
    pub fn last_abort(&self) -> Option<AbortInfo> {
        self.store.data().last_abort()
    }

    /// Stream access to linear memory.
    pub fn memory(&mut self) -> WasmMemory<'_> {
        WasmMemory::new(&mut self.store, self.memory, self.limits)
    }

    fn read_i64(&self, global: Global) -> i64 {
        global.get(&self.store).i64().unwrap_or_default()
    }
}

impl Kernel for WasmKernel {
    fn fibonacci(&mut self, n: i64) -> KernelResult<i64> {
        log::debug!("fibonacci({n})");
        self.config.check_host_limit(KernelId::Fibonacci, n)?;
        guarded(&mut self.store, KernelId::Fibonacci, &self.fibonacci, n, n)
    }

    fn sieve(&mut self, limit: i64) -> KernelResult<i32> {
        log::debug!("sieve({limit})");
        self.config.check_host_limit(KernelId::Sieve, limit)?;
        guarded(&mut self.store, KernelId::Sieve, &self.sieve, limit, limit)
    }

    fn update_memory(&mut self) -> KernelResult<()> {
        log::debug!("update_memory()");
        guarded(&mut self.store, KernelId::UpdateMemory, &self.update_memory, (), 0)?;
        self.snapshot_taken = true;
        Ok(())
    }

    fn invoke_callback(&mut self) -> KernelResult<()> {
        let counter = self.from_callback();
        log::debug!("invoke_callback() with counter {counter}");
        if !self.is_bound() {
            log::warn!("`{}` failed: {}", KernelId::InvokeCallback, KernelError::UnboundCallback);
            return Err(KernelError::UnboundCallback);
        }
        guarded(
            &mut self.store,
            KernelId::InvokeCallback,
            &self.invoke_callback,
            (),
            counter,
        )?;
        // The import hands the counter back unchanged when the callback panics.
        if let Some(message) = self.store.data_mut().callback_panic.take() {
            let err = KernelError::InternalTrap(TrapInfo::new(self.last_abort(), message));
            log::warn!("`{}` failed: {err}", KernelId::InvokeCallback);
            return Err(err);
        }
        Ok(())
    }

    fn global_const(&self) -> f64 {
        match self.global_const.get(&self.store).f64() {
            Some(v) => f64::from_bits(v.to_bits()),
            None => f64::NAN,
        }
    }

    fn from_callback(&self) -> i64 {
        self.read_i64(self.from_callback)
    }

    fn memory_value(&self) -> Option<i64> {
        self.snapshot_taken.then(|| self.read_i64(self.memory_value))
    }
}

/// Call `func` under the panic barrier, mapping traps to [`KernelError`].
///
/// `argument` is the scalar argument, reported in `InvalidArgument`.
fn guarded<P, R>(
    store: &mut Store<HostState>,
    kernel: KernelId,
    func: &TypedFunc<P, R>,
    params: P,
    argument: i64,
) -> KernelResult<R>
where
    P: WasmParams,
    R: WasmResults,
{
    store.data_mut().begin_call();
    let result = catch_trap(kernel, || match func.call(&mut *store, params) {
        Ok(value) => Ok(value),
        Err(e) => Err(trap_error(kernel, argument, store.data().last_abort, e.to_string())),
    });
    if let Err(err) = &result {
        log::warn!("`{kernel}` failed: {err}");
    }
    result
}

/// Translate a wasmi trap into the boundary error.
fn trap_error(
    kernel: KernelId,
    argument: i64,
    abort: Option<AbortInfo>,
    message: String,
) -> KernelError {
    match abort {
        Some(abort) if abort.code == ABORT_INVALID_ARGUMENT => {
            match ArgumentCheck::from_line(abort.line) {
                Some(check) => KernelError::invalid_argument(kernel, argument, check),
                None => KernelError::InternalTrap(TrapInfo::new(Some(abort), message)),
            }
        }
        abort => KernelError::InternalTrap(TrapInfo::new(abort, message)),
    }
}

fn typed_func<P, R>(
    store: &Store<HostState>,
    instance: &Instance,
    name: &str,
) -> HostResult<TypedFunc<P, R>>
where
    P: WasmParams,
    R: WasmResults,
{
    instance
        .get_typed_func::<P, R>(store, name)
        .map_err(|_| HostError::MissingExport(name.to_string()))
}

fn global(store: &Store<HostState>, instance: &Instance, name: &str) -> HostResult<Global> {
    instance
        .get_global(store, name)
        .ok_or_else(|| HostError::MissingExport(name.to_string()))
}
