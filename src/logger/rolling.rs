//! Size-based rotating log file
//!
//! Rotation itself is done by `file-rotate`: once the active file has grown
//! past `max_size_bytes`, the next record moves it aside as
//! `<name>.<YYYYmmddTHHMMSS>` (with `.1`, `.2`, ... appended when several
//! rotations land in the same second, and `.gz` when compression is on).
//! Only files whose suffix parses as such a timestamp count as backups, so
//! unrelated logs in the same directory are never touched.
//!
//! This module maps [`LogConfig`] onto that policy and reports a missing or
//! unwritable log directory up front, which `file-rotate` would otherwise
//! defer to the first write.

use crate::config::LogConfig;
use crate::error::LogError;
use file_rotate::compression::Compression;
use file_rotate::suffix::{AppendTimestamp, DateFrom, FileLimit};
use file_rotate::{ContentLimit, FileRotate};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const MEGABYTE: usize = 1024 * 1024;
const DEFAULT_MAX_SIZE_MB: usize = 100;
const BACKUP_SUFFIX_FORMAT: &str = "%Y%m%dT%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_size_bytes: usize,
    /// 0 keeps every backup
    pub max_backups: usize,
    /// 0 disables age-based removal
    pub max_age_days: u64,
    pub compress: bool,
}

impl RotationPolicy {
    pub fn from_config(cfg: &LogConfig) -> Self {
        let max_size_mb = match usize::try_from(cfg.max_size) {
            Ok(0) => DEFAULT_MAX_SIZE_MB,
            Ok(mb) => mb,
            Err(_) => usize::MAX / MEGABYTE,
        };

        Self {
            max_size_bytes: max_size_mb.saturating_mul(MEGABYTE),
            max_backups: cfg.max_backups,
            max_age_days: cfg.max_age,
            compress: cfg.compress,
        }
    }

    /// Which backups survive a rotation
    ///
    /// The rotator applies one limit; a backup count takes precedence over
    /// an age.
    fn file_limit(&self) -> FileLimit {
        if self.max_backups > 0 {
            FileLimit::MaxFiles(self.max_backups)
        } else if self.max_age_days > 0 {
            let days = i64::try_from(self.max_age_days).unwrap_or(i64::MAX).min(365_000);
            FileLimit::Age(chrono::Duration::days(days))
        } else {
            FileLimit::Unlimited
        }
    }

    fn compression(&self) -> Compression {
        if self.compress {
            Compression::OnRotate(0)
        } else {
            Compression::None
        }
    }
}

pub struct RollingFile {
    path: PathBuf,
    inner: FileRotate<AppendTimestamp>,
}

impl fmt::Debug for RollingFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingFile")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl RollingFile {
    /// Open (or create) the active log file, creating its directory first
    pub fn open(path: impl Into<PathBuf>, policy: RotationPolicy) -> Result<Self, LogError> {
        let path = path.into();

        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| LogError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::OpenFile {
                path: path.clone(),
                source,
            })?;

        let inner = FileRotate::new(
            &path,
            AppendTimestamp::with_format(BACKUP_SUFFIX_FORMAT, policy.file_limit(), DateFrom::Now),
            ContentLimit::BytesSurpassed(policy.max_size_bytes),
            policy.compression(),
            #[cfg(unix)]
            None,
        );

        Ok(Self { path, inner })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rotated files belonging to this log, oldest first
    pub fn backups(&mut self) -> Vec<PathBuf> {
        self.inner.log_paths()
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // One record per call; flushing keeps records on disk in order
        self.inner.write_all(buf)?;
        self.inner.flush()?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
