//! Kernel configuration.
//!
//! Build-time fields (`global_const`, memory pages) are baked into the
//! generated module; the input caps are enforced by the host before a call
//! crosses the boundary.  The reference registry honours all of them so the
//! two implementations stay interchangeable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::abi::{
    pages_for_table, KernelId, DEFAULT_GLOBAL_CONST, DEFAULT_MAX_MEMORY_PAGES, FIBONACCI_MAX_N,
    HEAP_START, MAX_WASM_PAGES, PAGE_SIZE, SIEVE_MAX_LIMIT,
};
use crate::error::{ArgumentCheck, KernelError};

/// Errors produced while loading or validating a [`KernelConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Value of the exported `global_const`.
    pub global_const: f64,
    /// Linear memory pages at instantiation.
    pub initial_memory_pages: u64,
    /// Ceiling for linear memory growth.
    pub max_memory_pages: u64,
    /// Optional cap on `fibonacci` input, checked before the call.
    pub max_fibonacci_n: Option<i64>,
    /// Optional cap on `sieve` input, checked before the call.
    pub max_sieve_limit: Option<i64>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            global_const: DEFAULT_GLOBAL_CONST,
            initial_memory_pages: 1,
            max_memory_pages: DEFAULT_MAX_MEMORY_PAGES,
            max_fibonacci_n: None,
            max_sieve_limit: None,
        }
    }
}

impl KernelConfig {
    /// Parse and validate a JSON config.  Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.global_const.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "global_const must be finite, got {}",
                self.global_const
            )));
        }
        if self.initial_memory_pages == 0 {
            return Err(ConfigError::Invalid(
                "initial_memory_pages must be at least 1".into(),
            ));
        }
        if self.max_memory_pages > MAX_WASM_PAGES {
            return Err(ConfigError::Invalid(format!(
                "max_memory_pages {} exceeds the 32-bit ceiling of {MAX_WASM_PAGES}",
                self.max_memory_pages
            )));
        }
        if self.initial_memory_pages > self.max_memory_pages {
            return Err(ConfigError::Invalid(format!(
                "initial_memory_pages {} exceeds max_memory_pages {}",
                self.initial_memory_pages, self.max_memory_pages
            )));
        }
        for (name, cap) in [
            ("max_fibonacci_n", self.max_fibonacci_n),
            ("max_sieve_limit", self.max_sieve_limit),
        ] {
            if let Some(cap) = cap {
                if cap < 0 {
                    return Err(ConfigError::Invalid(format!(
                        "{name} must not be negative, got {cap}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Largest table, in bytes, the configured memory can hold.
    pub fn max_table_bytes(&self) -> u64 {
        (self.max_memory_pages * PAGE_SIZE).saturating_sub(HEAP_START as u64)
    }

    /// Whether a table of `table_bytes` fits under `max_memory_pages`.
    pub fn table_fits(&self, table_bytes: u64) -> bool {
        pages_for_table(table_bytes) <= self.max_memory_pages
    }

    /// Domain and host-cap checks for a kernel argument.
    ///
    /// Only `fibonacci` and `sieve` take arguments; other kernels always pass.
    pub fn check_argument(&self, kernel: KernelId, value: i64) -> Result<(), KernelError> {
        check_domain(kernel, value)?;
        self.check_host_limit(kernel, value)
    }

    /// The host-cap half of [`check_argument`](Self::check_argument).
    ///
    /// Values outside the kernel's domain pass here so that the domain check
    /// (inside the module, for the WASM host) reports them.
    pub fn check_host_limit(&self, kernel: KernelId, value: i64) -> Result<(), KernelError> {
        let cap = match kernel {
            KernelId::Fibonacci => self.max_fibonacci_n,
            KernelId::Sieve => self.max_sieve_limit,
            KernelId::UpdateMemory | KernelId::InvokeCallback => None,
        };
        match cap {
            Some(cap) if value > cap && check_domain(kernel, value).is_ok() => Err(
                KernelError::invalid_argument(kernel, value, ArgumentCheck::ExceedsHostLimit),
            ),
            _ => Ok(()),
        }
    }
}

/// Range check every implementation applies before building a table.
pub fn check_domain(kernel: KernelId, value: i64) -> Result<(), KernelError> {
    let domain_max = match kernel {
        KernelId::Fibonacci => FIBONACCI_MAX_N,
        KernelId::Sieve => SIEVE_MAX_LIMIT,
        KernelId::UpdateMemory | KernelId::InvokeCallback => return Ok(()),
    };
    if value < 0 {
        return Err(KernelError::invalid_argument(kernel, value, ArgumentCheck::Negative));
    }
    if value > domain_max {
        return Err(KernelError::invalid_argument(
            kernel,
            value,
            ArgumentCheck::ExceedsIndexRange,
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KernelConfig::default();
        config.validate().unwrap();
        assert_eq!(config.global_const, DEFAULT_GLOBAL_CONST);
        assert_eq!(config.initial_memory_pages, 1);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = KernelConfig::from_json(r#"{ "max_sieve_limit": 1000 }"#).unwrap();
        assert_eq!(config.max_sieve_limit, Some(1000));
        assert_eq!(config.max_memory_pages, DEFAULT_MAX_MEMORY_PAGES);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = KernelConfig::from_json(r#"{ "gas_limit": 5 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn inconsistent_pages_are_rejected() {
        let err = KernelConfig::from_json(
            r#"{ "initial_memory_pages": 4, "max_memory_pages": 2 }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("exceeds max_memory_pages"));

        let config = KernelConfig {
            initial_memory_pages: 0,
            ..KernelConfig::default()
        };
        assert!(config.validate().is_err());

        let config = KernelConfig {
            max_memory_pages: MAX_WASM_PAGES + 1,
            ..KernelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_finite_constant_is_rejected() {
        let config = KernelConfig {
            global_const: f64::NAN,
            ..KernelConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn argument_checks_in_order() {
        let config = KernelConfig {
            max_fibonacci_n: Some(40),
            ..KernelConfig::default()
        };
        config.check_argument(KernelId::Fibonacci, 40).unwrap();
        assert!(matches!(
            config.check_argument(KernelId::Fibonacci, -1),
            Err(KernelError::InvalidArgument { check: ArgumentCheck::Negative, .. })
        ));
        assert!(matches!(
            config.check_argument(KernelId::Fibonacci, 41),
            Err(KernelError::InvalidArgument { check: ArgumentCheck::ExceedsHostLimit, .. })
        ));
        assert!(matches!(
            config.check_argument(KernelId::Sieve, SIEVE_MAX_LIMIT + 1),
            Err(KernelError::InvalidArgument { check: ArgumentCheck::ExceedsIndexRange, .. })
        ));
        config.check_argument(KernelId::UpdateMemory, -5).unwrap();
    }

    #[test]
    fn host_limit_leaves_domain_errors_to_the_domain_check() {
        let config = KernelConfig {
            max_sieve_limit: Some(10),
            ..KernelConfig::default()
        };
        config.check_host_limit(KernelId::Sieve, -3).unwrap();
        config.check_host_limit(KernelId::Sieve, SIEVE_MAX_LIMIT + 1).unwrap();
        assert!(config.check_host_limit(KernelId::Sieve, 11).is_err());
    }

    #[test]
    fn table_budget_matches_page_math() {
        let config = KernelConfig {
            max_memory_pages: 2,
            ..KernelConfig::default()
        };
        assert_eq!(config.max_table_bytes(), 65_536);
        assert!(config.table_fits(65_536));
        assert!(!config.table_fits(65_537));
    }
}
