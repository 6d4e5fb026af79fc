//! Per-worker context configuration.
//!
//! [`ContextConfig`] controls the arena block size, an optional memory
//! budget and the initial tape capacity. Use [`ContextConfig::builder`] to
//! construct validated instances, or [`ContextConfig::from_env`] to read
//! the same settings from environment variables.

use crate::arena::{MemoryBudget, DEFAULT_BLOCK_BYTES};
use crate::error::ConfigError;

/// Smallest accepted arena block size in bytes.
pub const MIN_BLOCK_BYTES: usize = 1024;

/// Largest accepted arena block size in bytes.
pub const MAX_BLOCK_BYTES: usize = 1 << 30;

/// Default number of tape entries reserved up front.
pub const DEFAULT_TAPE_CAPACITY: usize = 4096;

/// Environment variable for [`ContextConfig::block_bytes`].
pub const ENV_BLOCK_BYTES: &str = "ADJOINT_BLOCK_BYTES";
/// Environment variable for [`ContextConfig::max_bytes`].
pub const ENV_MAX_BYTES: &str = "ADJOINT_MAX_BYTES";
/// Environment variable for [`ContextConfig::warning_threshold`].
pub const ENV_WARNING_THRESHOLD: &str = "ADJOINT_WARNING_THRESHOLD";
/// Environment variable for [`ContextConfig::initial_tape_capacity`].
pub const ENV_INITIAL_TAPE_CAPACITY: &str = "ADJOINT_INITIAL_TAPE_CAPACITY";

/// Configuration of one differentiation context.
///
/// # Examples
///
/// ```rust
/// use adjoint_core::ContextConfig;
///
/// let config = ContextConfig::builder()
///     .block_bytes(256 * 1024)
///     .max_bytes(64 * 1024 * 1024)
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(config.block_bytes(), 256 * 1024);
/// assert_eq!(config.max_bytes(), Some(64 * 1024 * 1024));
/// ```
///
/// Every way of obtaining a `ContextConfig` validates it, including
/// deserialisation with the `serde` feature.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "ContextConfigData"))]
pub struct ContextConfig {
    /// Bytes per regular arena block.
    block_bytes: usize,
    /// Cap on bytes reserved by each arena.
    max_bytes: Option<usize>,
    /// Fraction of `max_bytes` at which a warning is logged.
    warning_threshold: f64,
    /// Tape entries reserved when the context is created.
    initial_tape_capacity: usize,
}

impl ContextConfig {
    /// Creates a new configuration builder.
    #[inline]
    pub fn builder() -> ContextConfigBuilder {
        ContextConfigBuilder::default()
    }

    /// Reads configuration from `ADJOINT_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if a variable is set but does
    /// not parse, or any validation error of the resulting configuration.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from an arbitrary variable lookup.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut builder = Self::builder();
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_BLOCK_BYTES)? {
            builder = builder.block_bytes(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_MAX_BYTES)? {
            builder = builder.max_bytes(v);
        }
        if let Some(v) = parse_var::<f64, _>(&lookup, ENV_WARNING_THRESHOLD)? {
            builder = builder.warning_threshold(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, ENV_INITIAL_TAPE_CAPACITY)? {
            builder = builder.initial_tape_capacity(v);
        }
        builder.build()
    }

    /// Returns the arena block size in bytes.
    #[inline]
    pub fn block_bytes(&self) -> usize {
        self.block_bytes
    }

    /// Returns the per-arena reservation cap, if any.
    #[inline]
    pub fn max_bytes(&self) -> Option<usize> {
        self.max_bytes
    }

    /// Returns the budget warning threshold.
    #[inline]
    pub fn warning_threshold(&self) -> f64 {
        self.warning_threshold
    }

    /// Returns the initial tape capacity.
    #[inline]
    pub fn initial_tape_capacity(&self) -> usize {
        self.initial_tape_capacity
    }

    /// Memory budget derived from `max_bytes` and `warning_threshold`.
    pub fn budget(&self) -> Option<MemoryBudget> {
        self.max_bytes
            .map(|max| MemoryBudget::new(max).with_warning_threshold(self.warning_threshold))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `block_bytes` is outside [`MIN_BLOCK_BYTES`, `MAX_BLOCK_BYTES`]
    /// - `max_bytes` is smaller than `block_bytes`
    /// - `warning_threshold` is outside [0.0, 1.0]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BLOCK_BYTES..=MAX_BLOCK_BYTES).contains(&self.block_bytes) {
            return Err(ConfigError::InvalidBlockBytes(self.block_bytes));
        }
        if let Some(max_bytes) = self.max_bytes {
            if max_bytes < self.block_bytes {
                return Err(ConfigError::BudgetTooSmall {
                    max_bytes,
                    block_bytes: self.block_bytes,
                });
            }
        }
        if !(0.0..=1.0).contains(&self.warning_threshold) {
            return Err(ConfigError::InvalidWarningThreshold(self.warning_threshold));
        }
        Ok(())
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            block_bytes: DEFAULT_BLOCK_BYTES,
            max_bytes: None,
            warning_threshold: 0.8,
            initial_tape_capacity: DEFAULT_TAPE_CAPACITY,
        }
    }
}

/// Unvalidated wire form of [`ContextConfig`].
#[cfg(feature = "serde")]
#[derive(serde::Deserialize)]
struct ContextConfigData {
    block_bytes: usize,
    max_bytes: Option<usize>,
    warning_threshold: f64,
    initial_tape_capacity: usize,
}

#[cfg(feature = "serde")]
impl TryFrom<ContextConfigData> for ContextConfig {
    type Error = ConfigError;

    fn try_from(data: ContextConfigData) -> Result<Self, ConfigError> {
        let config = ContextConfig {
            block_bytes: data.block_bytes,
            max_bytes: data.max_bytes,
            warning_threshold: data.warning_threshold,
            initial_tape_capacity: data.initial_tape_capacity,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar { name, value: raw }),
    }
}

/// Builder for [`ContextConfig`].
///
/// Provides a fluent API with validation at build time.
#[derive(Clone, Debug, Default)]
pub struct ContextConfigBuilder {
    block_bytes: Option<usize>,
    max_bytes: Option<usize>,
    warning_threshold: Option<f64>,
    initial_tape_capacity: Option<usize>,
}

impl ContextConfigBuilder {
    /// Sets the arena block size in bytes.
    #[inline]
    pub fn block_bytes(mut self, block_bytes: usize) -> Self {
        self.block_bytes = Some(block_bytes);
        self
    }

    /// Sets the per-arena reservation cap in bytes.
    #[inline]
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Sets the warning threshold as a fraction of `max_bytes`.
    #[inline]
    pub fn warning_threshold(mut self, threshold: f64) -> Self {
        self.warning_threshold = Some(threshold);
        self
    }

    /// Sets the number of tape entries reserved up front.
    #[inline]
    pub fn initial_tape_capacity(mut self, capacity: usize) -> Self {
        self.initial_tape_capacity = Some(capacity);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// See [`ContextConfig::validate`].
    pub fn build(self) -> Result<ContextConfig, ConfigError> {
        let defaults = ContextConfig::default();
        let config = ContextConfig {
            block_bytes: self.block_bytes.unwrap_or(defaults.block_bytes),
            max_bytes: self.max_bytes,
            warning_threshold: self.warning_threshold.unwrap_or(defaults.warning_threshold),
            initial_tape_capacity: self
                .initial_tape_capacity
                .unwrap_or(defaults.initial_tape_capacity),
        };
        config.validate()?;
        Ok(config)
    }
}
