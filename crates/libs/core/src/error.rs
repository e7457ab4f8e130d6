//! Error taxonomy shared by the registry (build-time) and scaler (sample-time)
//! boundaries, per the error handling design.

use thiserror::Error;

/// Errors raised while building a `Scaler` from a trigger specification.
///
/// All variants are terminal for that one build attempt only: the handler
/// records the error and continues with the policy's remaining triggers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// A required option was not present.
    #[error("trigger {trigger_index}: missing required option {field}")]
    ConfigError {
        /// Index of the trigger within the policy's trigger list.
        trigger_index: usize,
        /// Name of the missing field.
        field: String,
    },

    /// A referenced authentication parameter could not be resolved.
    #[error("trigger {trigger_index}: authentication parameter {param} unresolved")]
    AuthError {
        /// Index of the trigger within the policy's trigger list.
        trigger_index: usize,
        /// Name of the parameter that failed to resolve.
        param: String,
    },

    /// Two mutually exclusive options were both set.
    #[error("trigger {trigger_index}: options {a} and {b} are mutually exclusive")]
    ConflictError {
        /// Index of the trigger within the policy's trigger list.
        trigger_index: usize,
        /// First conflicting option name.
        a: String,
        /// Second conflicting option name.
        b: String,
    },

    /// An option was given a value outside its accepted enumeration.
    #[error("trigger {trigger_index}: option {field} has unsupported value {value}")]
    EnumError {
        /// Index of the trigger within the policy's trigger list.
        trigger_index: usize,
        /// Name of the offending field.
        field: String,
        /// The unsupported value that was supplied.
        value: String,
    },

    /// The trigger kind tag is not in the closed registry.
    #[error("trigger {trigger_index}: unknown trigger kind {kind}")]
    UnknownKind {
        /// Index of the trigger within the policy's trigger list.
        trigger_index: usize,
        /// The unrecognized kind tag.
        kind: String,
    },
}

impl TriggerError {
    /// The trigger index this error pertains to, for status-condition messages.
    #[must_use]
    pub const fn trigger_index(&self) -> usize {
        match self {
            Self::ConfigError { trigger_index, .. }
            | Self::AuthError { trigger_index, .. }
            | Self::ConflictError { trigger_index, .. }
            | Self::EnumError { trigger_index, .. }
            | Self::UnknownKind { trigger_index, .. } => *trigger_index,
        }
    }
}

/// Errors raised while sampling a live `Scaler`.
#[derive(Debug, Error, Clone)]
pub enum SampleError {
    /// A transient network or 5xx-class failure. Counts toward the fallback
    /// threshold; does not abort the reconcile.
    #[error("transient remote error: {0}")]
    Transient(String),

    /// A non-retryable 4xx-class failure (other than 429).
    #[error("permanent remote error: {0}")]
    Permanent(String),

    /// The response could not be parsed into the shape the adapter expects.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The sample was cancelled before the network call returned.
    #[error("sample cancelled")]
    Cancelled,
}

impl SampleError {
    /// Whether this error should count toward a trigger's consecutive-failure
    /// counter used for fallback detection. Cancellation never counts.
    #[must_use]
    pub const fn counts_toward_fallback(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Result type for registry build operations.
pub type BuildResult<T> = std::result::Result<T, TriggerError>;

/// Result type for scaler sample operations.
pub type SampleResult<T> = std::result::Result<T, SampleError>;
