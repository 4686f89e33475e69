//! Log path resolution and directory creation.
//!
//! The auto target lives under the invoking user's home. When the terminal
//! runs under `sudo`, the home of the user who invoked sudo is preferred
//! over root's, so logs land where the operator expects them.

use std::env;
use std::ffi::{CStr, CString};
use std::fs::{self, DirBuilder};
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, TimeZone};
use sterm_core::ResourceError;
use tracing::debug;

/// Directory under the home directory holding auto logs.
pub const LOG_SUBDIR: &str = ".sterm/logs";

/// Mode for directories created on the way to a log file.
pub const LOG_DIR_MODE: u32 = 0o755;

/// Environment variable naming the user who invoked sudo.
pub const SUDO_USER_VAR: &str = "SUDO_USER";

/// Environment variable holding the current user's home.
pub const HOME_VAR: &str = "HOME";

/// Inputs consulted when resolving the base log directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HomeSources {
    /// Name of the user who invoked sudo, if any.
    pub sudo_user: Option<String>,
    /// The process's own home directory.
    pub home: Option<PathBuf>,
}

impl HomeSources {
    /// Reads `SUDO_USER` and `HOME`, falling back to the platform home
    /// lookup when `HOME` is unset.
    pub fn from_env() -> Self {
        let sudo_user = env::var(SUDO_USER_VAR).ok().filter(|user| !user.is_empty());
        let home = env::var_os(HOME_VAR)
            .filter(|home| !home.is_empty())
            .map(PathBuf::from)
            .or_else(dirs::home_dir);
        Self { sudo_user, home }
    }

    /// Resolves the home directory logs should live under.
    pub fn resolve(&self) -> Result<PathBuf, ResourceError> {
        if let Some(user) = &self.sudo_user {
            match home_for_user(user) {
                Some(home) => {
                    debug!(user = %user, home = %home.display(), "Using sudo user's home");
                    return Ok(home);
                }
                None => debug!(user = %user, "No passwd entry for sudo user"),
            }
        }
        self.home.clone().ok_or(ResourceError::NoHomeDirectory)
    }
}

/// Returns the auto log path for a session started at `started`.
pub fn auto_log_path<Tz>(home: &Path, started: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    home.join(LOG_SUBDIR)
        .join(format!("sterm-{}.log", started.format("%Y%m%d-%H%M%S")))
}

/// Creates `dir` and every missing ancestor, one level at a time.
///
/// Levels that already exist as directories are accepted; a level that
/// exists as anything else is a [`ResourceError::PathConflict`].
pub fn create_dir_tree(dir: &Path) -> Result<(), ResourceError> {
    let mut current = PathBuf::new();
    for component in dir.components() {
        current.push(component);
        if !matches!(component, Component::Normal(_)) {
            continue;
        }

        match fs::metadata(&current) {
            Ok(meta) if meta.is_dir() => continue,
            Ok(_) => return Err(ResourceError::PathConflict { path: current }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ResourceError::CreateDirectory {
                    path: current,
                    source,
                })
            }
        }

        match DirBuilder::new().mode(LOG_DIR_MODE).create(&current) {
            Ok(()) => debug!(dir = %current.display(), "Created log directory"),
            // Created concurrently.
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && current.is_dir() => {}
            Err(source) => {
                return Err(ResourceError::CreateDirectory {
                    path: current,
                    source,
                })
            }
        }
    }
    Ok(())
}

/// Looks up a user's home directory in the passwd database.
fn home_for_user(user: &str) -> Option<PathBuf> {
    let name = CString::new(user).ok()?;
    let mut buf = vec![0 as libc::c_char; 16 * 1024];
    // SAFETY: passwd is plain old data; getpwnam_r fills it on success.
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: all pointers are valid for the duration of the call and
    // `buf.len()` matches the buffer handed over.
    let rc = unsafe {
        libc::getpwnam_r(
            name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() || pwd.pw_dir.is_null() {
        return None;
    }

    // SAFETY: pw_dir points into `buf`, NUL-terminated by getpwnam_r.
    let dir = unsafe { CStr::from_ptr(pwd.pw_dir) };
    let dir = dir.to_str().ok()?;
    (!dir.is_empty()).then(|| PathBuf::from(dir))
}
