//! # Error Handling
//!
//! Error taxonomy for the sprite resampling engine, with classification traits
//! and rich context.
//!
//! ## Architecture
//!
//! The error system is built around several key components:
//!
//! - **Error Types**: one enum, [`ResampleError`], whose variants mirror the ways a
//!   resample can fail to produce a result
//! - **Error Traits**: classification and recovery traits used by the scheduler
//! - **Error Context**: timestamps, operation context and recovery suggestions
//!
//! ## Propagation
//!
//! Most variants never reach the caller of `fetch_or_create`:
//!
//! - `Ineligible`, `Blocked`, `StaleResult` are absorbed and surface as `None`
//!   or as a stale entry
//! - `ComputeFailure` is retried once after reclaiming memory (out-of-memory
//!   only), then the key is abandoned for its revision
//! - `CorruptCacheEntry` is a cache miss plus removal of the entry
//!
//! [`classify::is_silent`] tells which errors must not be logged above `debug`.
//!
//! ## Usage
//!
//! ```rust
//! use sprite_resampler::error::{ResampleError, Retryable};
//!
//! let error = ResampleError::blocked("source #3")
//!     .with_context("hashing sprite region");
//! assert!(error.is_retryable());
//! ```

use std::{error::Error as StdError, fmt, time::SystemTime};

use sprite_scale::ScaleError;

use crate::eligibility::IneligibleReason;

/// Severity levels for errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Debug-level errors that don't affect operation
    Debug,
    /// Informational errors
    Info,
    /// Warnings that may indicate potential issues
    Warning,
    /// Errors that affect operation but can be recovered from
    Error,
    /// Critical errors that require immediate attention
    Critical,
}

/// Core error context containing metadata about when and where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// When the error occurred
    pub timestamp: SystemTime,
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional context about the error
    pub context: Option<String>,
    /// Suggested recovery action
    pub recovery_suggestion: Option<String>,
    /// Error severity level
    pub severity: ErrorSeverity,
    /// Whether this error is retryable
    pub retryable: bool,
    /// Whether this error is recoverable
    pub recoverable: bool,
    /// Additional metadata as key-value pairs
    pub metadata: std::collections::HashMap<String, String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            retryable: false,
            recoverable: false,
            metadata: std::collections::HashMap::new(),
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }
}

/// Base error type for the resampling engine
#[derive(Debug)]
pub enum ResampleError {
    /// Permanent per-revision "don't resample" decision
    Ineligible {
        reason: IneligibleReason,
        context: ErrorContext,
    },
    /// Source data temporarily unreadable
    Blocked {
        resource: String,
        context: ErrorContext,
    },
    /// Resource exhaustion or algorithm failure during resample
    ComputeFailure {
        key: String,
        reason: String,
        out_of_memory: bool,
        context: ErrorContext,
    },
    /// Completion for a superseded source revision
    StaleResult {
        expected: u64,
        actual: u64,
        context: ErrorContext,
    },
    /// Suspended or on-disk entry failed validation
    CorruptCacheEntry {
        hash: u64,
        reason: String,
        context: ErrorContext,
    },
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Scaler rejected its input
    Scale {
        source: ScaleError,
        context: ErrorContext,
    },
    /// I/O errors
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// Render device refused to create or destroy a resource
    Render {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Invalid state transitions
    State {
        current_state: String,
        attempted_operation: String,
        context: ErrorContext,
    },
}

impl ResampleError {
    pub fn ineligible(reason: IneligibleReason) -> Self {
        Self::Ineligible {
            reason,
            context: ErrorContext::new().with_severity(ErrorSeverity::Debug),
        }
    }

    pub fn blocked(resource: impl Into<String>) -> Self {
        Self::Blocked {
            resource: resource.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Debug),
        }
    }

    pub fn compute_failure(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ComputeFailure {
            key: key.into(),
            reason: reason.into(),
            out_of_memory: false,
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    pub fn out_of_memory(key: impl Into<String>, bytes: usize) -> Self {
        Self::ComputeFailure {
            key: key.into(),
            reason: format!("failed to allocate {} bytes", bytes),
            out_of_memory: true,
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }

    pub fn stale(expected: u64, actual: u64) -> Self {
        Self::StaleResult {
            expected,
            actual,
            context: ErrorContext::new().with_severity(ErrorSeverity::Debug),
        }
    }

    pub fn corrupt(hash: u64, reason: impl Into<String>) -> Self {
        Self::CorruptCacheEntry {
            hash,
            reason: reason.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Info),
        }
    }

    pub fn config(field: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    pub fn io_at(operation: impl Into<String>, path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.as_ref().display().to_string()),
            source,
            context: ErrorContext::new(),
        }
    }

    pub fn render(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Render {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn state(current_state: impl Into<String>, attempted_operation: impl Into<String>) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            context: ErrorContext::new().with_severity(ErrorSeverity::Debug),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add recovery suggestion
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    /// Set severity
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context_mut().metadata.insert(key.into(), value.into());
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Ineligible { context, .. } => context,
            Self::Blocked { context, .. } => context,
            Self::ComputeFailure { context, .. } => context,
            Self::StaleResult { context, .. } => context,
            Self::CorruptCacheEntry { context, .. } => context,
            Self::Config { context, .. } => context,
            Self::Scale { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::Render { context, .. } => context,
            Self::State { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Ineligible { context, .. } => context,
            Self::Blocked { context, .. } => context,
            Self::ComputeFailure { context, .. } => context,
            Self::StaleResult { context, .. } => context,
            Self::CorruptCacheEntry { context, .. } => context,
            Self::Config { context, .. } => context,
            Self::Scale { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::Render { context, .. } => context,
            Self::State { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Ineligible { .. } => "ineligible",
            Self::Blocked { .. } => "blocked",
            Self::ComputeFailure { .. } => "compute_failure",
            Self::StaleResult { .. } => "stale_result",
            Self::CorruptCacheEntry { .. } => "corrupt_cache_entry",
            Self::Config { .. } => "config",
            Self::Scale { .. } => "scale",
            Self::Io { .. } => "io",
            Self::Render { .. } => "render",
            Self::State { .. } => "state",
        }
    }

    /// True for compute failures caused by allocation failure.
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            Self::ComputeFailure { out_of_memory, .. } => *out_of_memory,
            Self::Scale { source, .. } => source.is_out_of_memory(),
            _ => false,
        }
    }
}

impl fmt::Display for ResampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResampleError::Ineligible { reason, .. } => {
                write!(f, "Sprite is not eligible for resampling: {}", reason)
            }
            ResampleError::Blocked { resource, .. } => {
                write!(f, "Source data for {} is locked by a writer", resource)
            }
            ResampleError::ComputeFailure {
                key,
                reason,
                out_of_memory,
                ..
            } => {
                if *out_of_memory {
                    write!(f, "Out of memory while resampling {}: {}", key, reason)
                } else {
                    write!(f, "Resample of {} failed: {}", key, reason)
                }
            }
            ResampleError::StaleResult { expected, actual, .. } => {
                write!(
                    f,
                    "Discarded result for revision {} (source is at revision {})",
                    expected, actual
                )
            }
            ResampleError::CorruptCacheEntry { hash, reason, .. } => {
                write!(f, "Corrupt cache entry {:016x}: {}", hash, reason)
            }
            ResampleError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            ResampleError::Scale { source, .. } => write!(f, "Scaler error: {}", source),
            ResampleError::Io {
                operation,
                path,
                source,
                ..
            } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "I/O error during {} on '{}': {}",
                        operation, path, source
                    )
                } else {
                    write!(f, "I/O error during {}: {}", operation, source)
                }
            }
            ResampleError::Render {
                operation, reason, ..
            } => {
                write!(f, "Render device failed during {}: {}", operation, reason)
            }
            ResampleError::State {
                current_state,
                attempted_operation,
                ..
            } => {
                write!(
                    f,
                    "Invalid transition from '{}' when attempting '{}'",
                    current_state, attempted_operation
                )
            }
        }
    }
}

impl StdError for ResampleError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Scale { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type ResampleResult<T> = Result<T, ResampleError>;

/// Trait for errors that can be retried
pub trait Retryable {
    /// Check if this error can be retried
    fn is_retryable(&self) -> bool;

    /// Get the maximum number of retry attempts
    fn max_retries(&self) -> Option<usize> {
        None
    }
}

impl Retryable for ResampleError {
    fn is_retryable(&self) -> bool {
        self.context().retryable
            || matches!(self, Self::Blocked { .. })
            || self.is_out_of_memory()
    }

    fn max_retries(&self) -> Option<usize> {
        if self.is_out_of_memory() {
            Some(1)
        } else {
            None
        }
    }
}

/// Recovery strategies for handling errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStrategy {
    /// Retry on a later call
    RetryLater,
    /// Reclaim memory, then retry once
    ReclaimAndRetry,
    /// Serve the previous result while a fresher one is pending
    ServeStale,
    /// Let the host draw the unresampled original
    FallbackToOriginal,
    /// Drop the cache entry and treat it as a miss
    PurgeEntry,
}

/// Trait for errors that can be recovered from
pub trait Recoverable {
    /// Check if this error can be recovered from
    fn is_recoverable(&self) -> bool;

    /// Get recovery strategies for this error, in order
    fn recovery_strategies(&self) -> Vec<RecoveryStrategy>;
}

impl Recoverable for ResampleError {
    fn is_recoverable(&self) -> bool {
        self.context().recoverable || !matches!(self, Self::Config { .. } | Self::State { .. })
    }

    fn recovery_strategies(&self) -> Vec<RecoveryStrategy> {
        match self {
            Self::Ineligible { .. } => vec![RecoveryStrategy::FallbackToOriginal],
            Self::Blocked { .. } => vec![RecoveryStrategy::ServeStale, RecoveryStrategy::RetryLater],
            Self::StaleResult { .. } => vec![RecoveryStrategy::ServeStale],
            Self::CorruptCacheEntry { .. } => vec![RecoveryStrategy::PurgeEntry],
            Self::ComputeFailure { .. } | Self::Scale { .. } if self.is_out_of_memory() => vec![
                RecoveryStrategy::ReclaimAndRetry,
                RecoveryStrategy::FallbackToOriginal,
            ],
            Self::ComputeFailure { .. } | Self::Scale { .. } | Self::Render { .. } => {
                vec![RecoveryStrategy::FallbackToOriginal]
            }
            Self::Io { .. } => vec![RecoveryStrategy::PurgeEntry],
            _ => vec![],
        }
    }
}

/// Trait for errors with severity levels
pub trait HasSeverity {
    /// Get the severity level of this error
    fn severity(&self) -> ErrorSeverity;
}

impl HasSeverity for ResampleError {
    fn severity(&self) -> ErrorSeverity {
        self.context().severity
    }
}

/// Error classification utilities
pub mod classify {
    use super::*;

    /// Errors that are part of normal operation and never surface to the host
    pub fn is_silent(error: &ResampleError) -> bool {
        matches!(
            error,
            ResampleError::Ineligible { .. }
                | ResampleError::Blocked { .. }
                | ResampleError::StaleResult { .. }
        )
    }

    /// Level to log an error at. Silent errors never go above `debug`.
    pub fn log_level(error: &ResampleError) -> log::Level {
        if is_silent(error) {
            return log::Level::Debug;
        }
        match error.severity() {
            ErrorSeverity::Debug => log::Level::Debug,
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error | ErrorSeverity::Critical => log::Level::Error,
        }
    }

    /// Whether another attempt is allowed after `attempts` retries already made.
    pub fn may_retry(error: &ResampleError, attempts: usize) -> bool {
        error.is_retryable() && attempts < error.max_retries().unwrap_or(0)
    }
}

impl From<std::io::Error> for ResampleError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<ScaleError> for ResampleError {
    fn from(source: ScaleError) -> Self {
        Self::Scale {
            source,
            context: ErrorContext::new().with_severity(ErrorSeverity::Warning),
        }
    }
}

impl From<serde_json::Error> for ResampleError {
    fn from(error: serde_json::Error) -> Self {
        Self::config("<json>", error.to_string(), "failed to parse configuration")
    }
}
