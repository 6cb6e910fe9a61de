use std::fmt;
use std::str::FromStr;
use tracing::{Level, Metadata};

/// Target used for records logged through `panic`
pub const PANIC_TARGET: &str = "dbkit::panic";
/// Target used for records logged through `fatal`
pub const FATAL_TARGET: &str = "dbkit::fatal";

/// Facade severity, ordered from least to most severe
///
/// `tracing` stops at ERROR, so panic and fatal records are emitted at
/// ERROR on their own targets and told apart by [`Severity::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
    Panic,
    Fatal,
}

impl Severity {
    /// Parse a configured level, falling back to `Info` for anything unknown
    pub fn parse_or_info(level: &str) -> Self {
        level.parse().unwrap_or(Self::Info)
    }

    /// Severity of a `tracing` record
    pub fn of(metadata: &Metadata<'_>) -> Self {
        match metadata.target() {
            PANIC_TARGET => Self::Panic,
            FATAL_TARGET => Self::Fatal,
            _ => match *metadata.level() {
                Level::TRACE | Level::DEBUG => Self::Debug,
                Level::INFO => Self::Info,
                Level::WARN => Self::Warn,
                _ => Self::Error,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Panic => "panic",
            Self::Fatal => "fatal",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "panic" => Ok(Self::Panic),
            "fatal" => Ok(Self::Fatal),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_levels() {
        assert_eq!(Severity::parse_or_info("debug"), Severity::Debug);
        assert_eq!(Severity::parse_or_info("WARN"), Severity::Warn);
        assert_eq!(Severity::parse_or_info("panic"), Severity::Panic);
        assert_eq!(Severity::parse_or_info("fatal"), Severity::Fatal);
    }

    #[test]
    fn test_unknown_level_is_info() {
        assert_eq!(Severity::parse_or_info("verbose"), Severity::Info);
        assert_eq!(Severity::parse_or_info(""), Severity::Info);
    }

    #[test]
    fn test_ordering() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Error < Severity::Panic);
        assert!(Severity::Panic < Severity::Fatal);
    }
}
