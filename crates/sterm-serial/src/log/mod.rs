//! Session log sink.
//!
//! Mirrors every byte received from the device into an append-only file.
//! There is no framing and no per-line timestamp: the file is a verbatim
//! copy of the inbound stream.

mod path;

pub use path::{
    auto_log_path, create_dir_tree, HomeSources, HOME_VAR, LOG_DIR_MODE, LOG_SUBDIR,
    SUDO_USER_VAR,
};

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use chrono::Local;
use sterm_core::{LogTarget, ResourceError, TeardownError};
use tracing::{debug, info};

use crate::device::close_fd;

/// An open log file plus the number of bytes accepted so far.
#[derive(Debug)]
pub struct LogSink {
    file: File,
    path: PathBuf,
    bytes_written: u64,
}

impl LogSink {
    /// Opens the sink for `target`, or returns `None` when no log is wanted.
    ///
    /// The auto target is resolved against [`HomeSources::from_env`] and the
    /// current local time.
    pub fn open(target: &LogTarget) -> Result<Option<Self>, ResourceError> {
        match target {
            LogTarget::None => Ok(None),
            LogTarget::Explicit(path) => Self::create(path).map(Some),
            LogTarget::Auto => {
                let home = HomeSources::from_env().resolve()?;
                Self::create(&auto_log_path(&home, &Local::now())).map(Some)
            }
        }
    }

    /// Creates missing parent directories, then opens `path` for appending.
    pub fn create(path: &Path) -> Result<Self, ResourceError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_tree(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ResourceError::CreateFile {
                path: path.to_path_buf(),
                source,
            })?;

        info!(path = %path.display(), "Log file opened");

        Ok(Self {
            file,
            path: path.to_path_buf(),
            bytes_written: 0,
        })
    }

    /// Appends `bytes` to the log.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flushes and closes the file, reporting either failure.
    pub fn close(mut self) -> Result<(), TeardownError> {
        let path = self.path;
        let flushed = self.file.flush();
        debug!(path = %path.display(), bytes = self.bytes_written, "Closing log file");

        let closed = close_fd(OwnedFd::from(self.file));
        flushed
            .and(closed)
            .map_err(|source| TeardownError::CloseLog { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_open_none_target() {
        assert!(LogSink::open(&LogTarget::None).unwrap().is_none());
    }

    #[test]
    fn test_explicit_target_creates_parents() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("captures").join("board.log");

        let sink = LogSink::open(&LogTarget::Explicit(path.clone()))
            .unwrap()
            .unwrap();
        assert_eq!(sink.path(), path);
        sink.close().unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_append_counts_and_preserves_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("raw.log");

        let mut sink = LogSink::create(&path).unwrap();
        sink.append(b"boot\r\n").unwrap();
        sink.append(&[0x00, 0xff, 0x1b]).unwrap();
        assert_eq!(sink.bytes_written(), 9);
        sink.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"boot\r\n\x00\xff\x1b");
    }

    #[test]
    fn test_existing_file_is_appended() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("raw.log");
        fs::write(&path, b"earlier\n").unwrap();

        let mut sink = LogSink::create(&path).unwrap();
        sink.append(b"later\n").unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"earlier\nlater\n");
    }

    #[test]
    fn test_auto_path_under_missing_base() {
        let temp = tempfile::tempdir().unwrap();
        let home = temp.path().join("missing").join("home");
        let path = auto_log_path(&home, &Local::now());

        let sink = LogSink::create(&path).unwrap();
        sink.close().unwrap();
        assert!(home.join(LOG_SUBDIR).is_dir());
        assert!(path.is_file());

        // Directories now exist; a second session must not fail.
        let again = LogSink::create(&path).unwrap();
        again.close().unwrap();
    }

    #[test]
    fn test_create_over_directory_fails() {
        let temp = tempfile::tempdir().unwrap();
        let err = LogSink::create(temp.path()).unwrap_err();
        assert!(matches!(err, ResourceError::CreateFile { .. }));
    }
}
