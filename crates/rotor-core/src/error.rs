//! Error types for the rotation engine
//!
//! Every failure the engine can see falls into one of five kinds, and the
//! engine's retry/quarantine decisions are made by matching on the kind.

use thiserror::Error;

/// Result type alias for rotation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the rotation engine
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or invalid configuration document. Fatal at load.
    #[error("configuration error: {0}")]
    Config(String),

    /// State file unreadable or corrupt. Fatal (an absent file is not an
    /// error; it reads as empty state).
    #[error("state store error: {0}")]
    State(String),

    /// Provider token invalid or lacking a required permission.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// A specific record or zone cannot be read or updated (not found,
    /// payload rejected). Quarantines the job for the current tick.
    #[error("record error: {0}")]
    RecordScope(String),

    /// 5xx, timeout, connection reset. Retried on the next tick.
    #[error("transient provider error: {0}")]
    Transient(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a record-scope error
    pub fn record(msg: impl Into<String>) -> Self {
        Self::RecordScope(msg.into())
    }

    /// Create a transient provider error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// True for failures that leave job state untouched and are retried
    /// at the natural next-tick delay.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// True for failures that quarantine the job (or its whole account)
    /// for the remainder of the current tick.
    pub fn is_fatal_for_job(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::RecordScope(_))
    }

    /// Process exit code for failures that abort the daemon.
    ///
    /// 2 = config fault, 3 = state fault, 4 = invalid credentials.
    /// Other kinds never abort the process and map to 1 if they somehow
    /// surface at top level.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::State(_) => 3,
            Self::Auth(_) => 4,
            _ => 1,
        }
    }
}
