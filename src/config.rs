//! Client configuration: names, paths, and timeouts.
//!
//! Everything the connection controller needs to know about its host
//! deployment is derived once, up front, and carried in an immutable
//! [`ClientConfig`]: where the trusted server executable must live, where
//! the per-user runtime directory is, and how long each bounded wait runs.
//!
//! The server executable is expected in the same directory as the client
//! executable. This supports side-by-side installs of different toolchain
//! versions: each client only ever talks to the server it shipped with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Basename of the compile server executable, expected next to the client.
#[cfg(windows)]
pub const SERVER_EXECUTABLE: &str = "kilnd.exe";
#[cfg(not(windows))]
pub const SERVER_EXECUTABLE: &str = "kilnd";

/// Base of the channel name; the server's pid is appended in decimal.
pub const CHANNEL_BASE_NAME: &str = "kilnd";

/// Environment variable overriding the kiln home directory (test isolation).
pub const KILN_HOME_ENV: &str = "KILN_HOME";

/// Time allowed to connect to a server that is already running. A healthy
/// server accepts quickly, so this is short.
pub const EXISTING_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Time allowed for a freshly spawned server to come up and accept.
pub const SPAWN_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Time to wait for the host-wide spawn lock before falling back.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(60);

/// Pause between the locked attempt and the unlocked fallback attempt.
pub const RETRY_SLEEP: Duration = Duration::from_millis(500);

/// Get the kiln home directory (`$KILN_HOME`, or `~/.kiln`).
pub fn kiln_home() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(KILN_HOME_ENV) {
        return Ok(PathBuf::from(home));
    }
    dirs::home_dir()
        .map(|home| home.join(".kiln"))
        .ok_or_else(|| {
            ClientError::ServerPathUnavailable("could not determine home directory".into())
        })
}

/// Get the per-user daemon runtime directory (`<kiln home>/daemon`), which
/// holds server sockets, spawn-lock files, and opt-in client logs.
pub fn daemon_dir() -> Result<PathBuf> {
    Ok(kiln_home()?.join("daemon"))
}

/// Immutable per-invocation configuration for the connection controller.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Absolute path of the only server executable this client trusts.
    pub server_path: PathBuf,
    /// Per-user runtime directory for sockets and lock files.
    pub daemon_dir: PathBuf,
    pub existing_connect_timeout: Duration,
    pub spawn_connect_timeout: Duration,
    pub lock_timeout: Duration,
    pub retry_sleep: Duration,
}

impl ClientConfig {
    /// Build a config with the standard timeouts.
    pub fn new(server_path: PathBuf, daemon_dir: PathBuf) -> Self {
        Self {
            server_path,
            daemon_dir,
            existing_connect_timeout: EXISTING_CONNECT_TIMEOUT,
            spawn_connect_timeout: SPAWN_CONNECT_TIMEOUT,
            lock_timeout: LOCK_TIMEOUT,
            retry_sleep: RETRY_SLEEP,
        }
    }

    /// Derive the config from the running executable's location and the
    /// user environment.
    ///
    /// # Errors
    ///
    /// Returns `ServerPathUnavailable` if the client's own image path (or
    /// its directory) cannot be determined; the client cannot safely trust
    /// any server without it.
    pub fn from_environment() -> Result<Self> {
        let current_exe = std::env::current_exe()
            .map_err(|e| ClientError::ServerPathUnavailable(e.to_string()))?;
        let exe_dir = current_exe.parent().ok_or_else(|| {
            ClientError::ServerPathUnavailable(format!(
                "client executable {} has no parent directory",
                current_exe.display()
            ))
        })?;
        Ok(Self::new(exe_dir.join(SERVER_EXECUTABLE), daemon_dir()?))
    }

    /// Channel address for the server with the given pid (Unix: socket path).
    #[cfg(unix)]
    pub fn socket_path(&self, pid: u32) -> PathBuf {
        self.daemon_dir
            .join(format!("{CHANNEL_BASE_NAME}-{pid}.sock"))
    }

    /// Channel address for the server with the given pid (Windows: pipe name).
    #[cfg(windows)]
    pub fn pipe_name(&self, pid: u32) -> String {
        format!(r"\\.\pipe\{CHANNEL_BASE_NAME}{pid}")
    }

    /// Host-wide name of the spawn lock, derived from the server path with
    /// path separators (and the drive colon) canonicalized so the result is
    /// legal both as a kernel object name and as a file name.
    pub fn lock_name(&self) -> String {
        canonical_lock_name(&self.server_path)
    }

    /// File backing the spawn lock (Unix).
    #[cfg(unix)]
    pub fn lock_path(&self) -> PathBuf {
        self.daemon_dir.join(format!("{}.lock", self.lock_name()))
    }
}

fn canonical_lock_name(path: &Path) -> String {
    let mut name = String::new();
    for ch in path.to_string_lossy().chars() {
        match ch {
            '/' | '\\' | ':' => {
                if !name.is_empty() && !name.ends_with('-') {
                    name.push('-');
                }
            }
            other => name.extend(other.to_lowercase()),
        }
    }
    name
}
