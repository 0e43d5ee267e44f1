//! The registry surface shared by every kernel implementation.

use crate::abi::{KernelId, Value, EXPORT_FROM_CALLBACK, EXPORT_GLOBAL_CONST, EXPORT_MEMORY_VALUE};
use crate::error::{KernelError, KernelResult};

/// A callback bound into the host bridge.
pub type HostCallback = Box<dyn FnMut(i64) -> i64 + Send>;

/// One instantiated kernel module.
///
/// Implementations own their module-global state; two instances never share
/// a counter or a snapshot.
pub trait Kernel {
    /// `F(n)`, 0-indexed.
    fn fibonacci(&mut self, n: i64) -> KernelResult<i64>;

    /// Largest prime `<= limit`, or the small-domain sentinel.
    fn sieve(&mut self, limit: i64) -> KernelResult<i32>;

    /// Snapshot the first 8 bytes of linear memory into `memory_value`.
    fn update_memory(&mut self) -> KernelResult<()>;

    /// `from_callback = callback(from_callback)`.
    fn invoke_callback(&mut self) -> KernelResult<()>;

    fn global_const(&self) -> f64;

    /// Current GlobalCounter.
    fn from_callback(&self) -> i64;

    /// Current MemorySnapshot; `None` until `update_memory` first succeeds.
    fn memory_value(&self) -> Option<i64>;

    /// Read an exported global by name.
    fn global(&self, name: &str) -> KernelResult<Option<Value>> {
        match name {
            EXPORT_GLOBAL_CONST => Ok(Some(Value::F64(self.global_const()))),
            EXPORT_FROM_CALLBACK => Ok(Some(Value::I64(self.from_callback()))),
            EXPORT_MEMORY_VALUE => Ok(self.memory_value().map(Value::I64)),
            _ => Err(KernelError::UnknownExport(name.to_string())),
        }
    }

    /// Invoke an entry point by export name.
    ///
    /// Integer arguments are widened to the parameter type; floats are
    /// rejected.  Returns the scalar result, or `None` for entry points
    /// without one.
    fn call(&mut self, name: &str, args: &[Value]) -> KernelResult<Option<Value>> {
        let kernel =
            KernelId::from_name(name).ok_or_else(|| KernelError::UnknownExport(name.to_string()))?;
        let params = kernel.params();
        if args.len() != params.len() {
            return Err(KernelError::ArityMismatch {
                name: name.to_string(),
                expected: params.len(),
                got: args.len(),
            });
        }
        let mut ints = Vec::with_capacity(args.len());
        for (arg, &expected) in args.iter().zip(params) {
            let value = arg.as_i64().ok_or(KernelError::TypeMismatch {
                name: name.to_string(),
                expected,
                got: arg.ty(),
            })?;
            ints.push(value);
        }

        match kernel {
            KernelId::Fibonacci => self.fibonacci(ints[0]).map(|v| Some(Value::I64(v))),
            KernelId::Sieve => self.sieve(ints[0]).map(|v| Some(Value::I32(v))),
            KernelId::UpdateMemory => self.update_memory().map(|()| None),
            KernelId::InvokeCallback => self.invoke_callback().map(|()| None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ValueType;

    /// Records which entry points ran; every kernel returns a fixed value.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<(KernelId, Option<i64>)>,
    }

    impl Kernel for Recorder {
        fn fibonacci(&mut self, n: i64) -> KernelResult<i64> {
            self.calls.push((KernelId::Fibonacci, Some(n)));
            Ok(55)
        }
        fn sieve(&mut self, limit: i64) -> KernelResult<i32> {
            self.calls.push((KernelId::Sieve, Some(limit)));
            Ok(7)
        }
        fn update_memory(&mut self) -> KernelResult<()> {
            self.calls.push((KernelId::UpdateMemory, None));
            Ok(())
        }
        fn invoke_callback(&mut self) -> KernelResult<()> {
            self.calls.push((KernelId::InvokeCallback, None));
            Ok(())
        }
        fn global_const(&self) -> f64 {
            1.5
        }
        fn from_callback(&self) -> i64 {
            3
        }
        fn memory_value(&self) -> Option<i64> {
            None
        }
    }

    #[test]
    fn call_dispatches_by_name() {
        let mut k = Recorder::default();
        assert_eq!(k.call("fibonacci", &[Value::I64(10)]).unwrap(), Some(Value::I64(55)));
        assert_eq!(k.call("sieve", &[Value::I32(10)]).unwrap(), Some(Value::I32(7)));
        assert_eq!(k.call("update_memory", &[]).unwrap(), None);
        assert_eq!(k.call("invoke_callback", &[]).unwrap(), None);
        assert_eq!(
            k.calls,
            vec![
                (KernelId::Fibonacci, Some(10)),
                (KernelId::Sieve, Some(10)),
                (KernelId::UpdateMemory, None),
                (KernelId::InvokeCallback, None),
            ]
        );
    }

    #[test]
    fn call_rejects_bad_shapes() {
        let mut k = Recorder::default();
        assert!(matches!(
            k.call("main", &[]),
            Err(KernelError::UnknownExport(name)) if name == "main"
        ));
        assert!(matches!(
            k.call("fibonacci", &[]),
            Err(KernelError::ArityMismatch { expected: 1, got: 0, .. })
        ));
        assert!(matches!(
            k.call("sieve", &[Value::F64(1.0)]),
            Err(KernelError::TypeMismatch { expected: ValueType::I64, got: ValueType::F64, .. })
        ));
        assert!(k.calls.is_empty());
    }

    #[test]
    fn globals_by_name() {
        let k = Recorder::default();
        assert_eq!(k.global("global_const").unwrap(), Some(Value::F64(1.5)));
        assert_eq!(k.global("from_callback").unwrap(), Some(Value::I64(3)));
        assert_eq!(k.global("memory_value").unwrap(), None);
        assert!(k.global("fibonacci").is_err());
    }
}
