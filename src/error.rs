use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The step of a database call that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Opening the pool / first connection
    Open,
    /// Liveness check
    Ping,
    /// One-time setup statement run after open
    Pragma,
    Execute,
    Query,
    QueryRow,
    BeginTransaction,
    Prepare,
    Close,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open database",
            Self::Ping => "verify connection",
            Self::Pragma => "enable foreign keys",
            Self::Execute => "execute",
            Self::Query => "query",
            Self::QueryRow => "query row",
            Self::BeginTransaction => "begin transaction",
            Self::Prepare => "prepare statement",
            Self::Close => "close database",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database handle errors
#[derive(Debug, Error)]
pub enum DbError {
    /// Opening, probing or setting up the connection failed
    #[error("error {phase}: {source}")]
    Connection { phase: Phase, source: sqlx::Error },

    /// A statement failed after the handle was open
    #[error("error {phase}: {source}")]
    Execution { phase: Phase, source: sqlx::Error },

    /// The handle has been closed
    #[error("database not connected")]
    NotConnected,

    /// The caller's context was cancelled before the call completed
    #[error("{phase} cancelled")]
    Cancelled { phase: Phase },

    /// The caller's deadline passed before the call completed
    #[error("{phase} deadline exceeded")]
    DeadlineExceeded { phase: Phase },

    /// Configuration rejected before any connection attempt
    #[error("invalid database configuration: {0}")]
    InvalidConfig(String),
}

impl DbError {
    pub(crate) fn connection(phase: Phase, source: sqlx::Error) -> Self {
        Self::Connection { phase, source }
    }

    /// Wrap a driver error raised by an open handle.
    ///
    /// A closed pool surfaces as `NotConnected` so callers see one condition
    /// for "used after close" regardless of backend.
    pub(crate) fn execution(phase: Phase, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::PoolClosed => Self::NotConnected,
            source => Self::Execution { phase, source },
        }
    }

    /// The phase the error was raised in, if any
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Connection { phase, .. }
            | Self::Execution { phase, .. }
            | Self::Cancelled { phase }
            | Self::DeadlineExceeded { phase } => Some(*phase),
            Self::NotConnected | Self::InvalidConfig(_) => None,
        }
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected)
    }

    /// Short label used for metrics
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Execution { .. } => "execution",
            Self::NotConnected => "not_connected",
            Self::Cancelled { .. } => "cancelled",
            Self::DeadlineExceeded { .. } => "deadline_exceeded",
            Self::InvalidConfig(_) => "invalid_config",
        }
    }
}

/// Logger construction errors
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to open log file {path}: {source}")]
    OpenFile { path: PathBuf, source: io::Error },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = DbError::execution(Phase::Execute, sqlx::Error::RowNotFound);
        assert!(error.to_string().starts_with("error execute:"));

        let error = DbError::Cancelled { phase: Phase::Query };
        assert_eq!(error.to_string(), "query cancelled");

        assert_eq!(DbError::NotConnected.to_string(), "database not connected");
    }

    #[test]
    fn test_pool_closed_maps_to_not_connected() {
        let error = DbError::execution(Phase::Query, sqlx::Error::PoolClosed);
        assert!(error.is_not_connected());
        assert_eq!(error.phase(), None);
    }

    #[test]
    fn test_connection_error_keeps_phase() {
        let error = DbError::connection(Phase::Ping, sqlx::Error::PoolTimedOut);
        assert_eq!(error.phase(), Some(Phase::Ping));
        assert_eq!(error.kind(), "connection");
        assert!(error.to_string().starts_with("error verify connection:"));
    }
}
