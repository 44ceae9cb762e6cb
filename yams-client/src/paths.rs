//! Daemon socket path resolution.
//!
//! In priority order:
//! 1. an explicit path from the client configuration
//! 2. `$YAMS_DAEMON_SOCKET`
//! 3. `$XDG_RUNTIME_DIR/yams-daemon.sock`
//! 4. `/tmp/yams-daemon-<uid>.sock`

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Environment variable holding a full socket path override.
pub const SOCKET_ENV: &str = "YAMS_DAEMON_SOCKET";

/// File name of the socket inside the runtime directory.
const SOCKET_FILE_NAME: &str = "yams-daemon.sock";

/// Resolves the daemon socket path from `explicit` and the process environment.
pub fn resolve_socket_path(explicit: Option<&Path>) -> PathBuf {
    resolve_socket_path_with(
        explicit,
        std::env::var_os(SOCKET_ENV),
        std::env::var_os("XDG_RUNTIME_DIR"),
        current_uid(),
    )
}

/// Resolution with every input supplied by the caller.
pub fn resolve_socket_path_with(
    explicit: Option<&Path>,
    env_override: Option<OsString>,
    runtime_dir: Option<OsString>,
    uid: u32,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }

    if let Some(path) = env_override.filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }

    if let Some(dir) = runtime_dir.filter(|d| !d.is_empty()) {
        return PathBuf::from(dir).join(SOCKET_FILE_NAME);
    }

    PathBuf::from(format!("/tmp/yams-daemon-{}.sock", uid))
}

#[cfg(unix)]
fn current_uid() -> u32 {
    // SAFETY: getuid has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

#[cfg(not(unix))]
fn current_uid() -> u32 {
    0
}
