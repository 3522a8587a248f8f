//! Host-wide advisory lock serializing server spawns.
//!
//! At most one client per expected server path should move from "no server
//! answered" to "spawn one and wait for it" at a time; the rest either find
//! the freshly spawned server or time out and fall back. The lock is named
//! by canonicalizing the expected server path, so clients of different
//! side-by-side installs never contend.
//!
//! The lock is advisory only. A client that times out proceeds without it,
//! so holders must tolerate racing spawns regardless.
//!
//! On Windows this is a named mutex. On Unix it is a create-new lock file
//! in the daemon runtime directory, with stale-holder detection: a lock
//! file whose recorded pid is gone and whose age exceeds a small TTL is
//! broken and reclaimed.

use std::time::Duration;

use crate::config::ClientConfig;

#[cfg(unix)]
mod unix_impl {
    use super::*;
    use std::fs::{self, OpenOptions};
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::time::{Instant, SystemTime};
    use tokio::time::sleep;

    const POLL_INTERVAL: Duration = Duration::from_millis(25);
    const STALE_TTL: Duration = Duration::from_secs(10);

    /// A scoped claim on the spawn lock. Inspect [`SpawnLock::is_held`]:
    /// acquisition either returns holding the lock or returns without it,
    /// it never fails outright.
    pub struct SpawnLock {
        path: PathBuf,
        held: bool,
    }

    impl SpawnLock {
        /// Try to claim the lock, waiting up to `timeout`.
        pub async fn acquire(config: &ClientConfig, timeout: Duration) -> Self {
            let path = config.lock_path();
            if let Err(e) = fs::create_dir_all(&config.daemon_dir) {
                tracing::warn!(error = %e, "cannot create daemon runtime directory");
                return Self { path, held: false };
            }

            let start = Instant::now();
            loop {
                match OpenOptions::new().create_new(true).write(true).open(&path) {
                    Ok(mut file) => {
                        let _ = writeln!(file, "pid={}", std::process::id());
                        let _ = file.sync_all();
                        tracing::debug!(path = %path.display(), "spawn lock acquired");
                        return Self { path, held: true };
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                        if is_stale(&path) {
                            tracing::debug!(path = %path.display(), "breaking stale spawn lock");
                            let _ = fs::remove_file(&path);
                            continue;
                        }
                        if start.elapsed() >= timeout {
                            tracing::debug!("spawn lock wait timed out");
                            return Self { path, held: false };
                        }
                        sleep(POLL_INTERVAL).await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "spawn lock unavailable");
                        return Self { path, held: false };
                    }
                }
            }
        }

        pub fn is_held(&self) -> bool {
            self.held
        }

        /// Release the claim. Idempotent; releasing a lock that was never
        /// held is a no-op.
        pub fn release(&mut self) {
            if self.held {
                self.held = false;
                let _ = fs::remove_file(&self.path);
                tracing::debug!(path = %self.path.display(), "spawn lock released");
            }
        }
    }

    impl Drop for SpawnLock {
        fn drop(&mut self) {
            self.release();
        }
    }

    fn is_stale(path: &Path) -> bool {
        if let Some(pid) = read_holder_pid(path) {
            if pid_is_alive(pid) {
                return false;
            }
        }
        lock_age(path) > STALE_TTL
    }

    pub(super) fn read_holder_pid(path: &Path) -> Option<u32> {
        let content = fs::read_to_string(path).ok()?;
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("pid=") {
                if let Ok(pid) = rest.trim().parse::<u32>() {
                    return Some(pid);
                }
            }
        }
        None
    }

    pub(super) fn pid_is_alive(pid: u32) -> bool {
        let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
        rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    fn lock_age(path: &Path) -> Duration {
        match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(mtime) => SystemTime::now()
                .duration_since(mtime)
                .unwrap_or(Duration::MAX),
            Err(_) => Duration::MAX,
        }
    }
}

#[cfg(unix)]
pub use unix_impl::SpawnLock;

#[cfg(windows)]
mod windows_impl {
    use super::*;
    use std::ffi::c_void;

    use windows_sys::Win32::Foundation::{
        CloseHandle, ERROR_ALREADY_EXISTS, GetLastError, WAIT_ABANDONED, WAIT_OBJECT_0,
    };
    use windows_sys::Win32::System::Threading::{CreateMutexW, ReleaseMutex, WaitForSingleObject};

    /// A scoped claim on the named spawn mutex. Acquisition either returns
    /// holding the mutex or returns without it, it never fails outright.
    pub struct SpawnLock {
        handle: *mut c_void,
        held: bool,
    }

    impl SpawnLock {
        /// Try to claim the mutex, waiting up to `timeout`.
        pub async fn acquire(config: &ClientConfig, timeout: Duration) -> Self {
            let name: Vec<u16> = config
                .lock_name()
                .encode_utf16()
                .chain(std::iter::once(0))
                .collect();

            unsafe {
                let handle = CreateMutexW(std::ptr::null(), 1, name.as_ptr());
                if handle.is_null() {
                    tracing::warn!("could not create spawn mutex");
                    return Self {
                        handle: std::ptr::null_mut(),
                        held: false,
                    };
                }
                if GetLastError() != ERROR_ALREADY_EXISTS {
                    tracing::debug!("spawn mutex acquired");
                    return Self { handle, held: true };
                }

                // Someone else holds it; wait our turn.
                let wait = WaitForSingleObject(handle, timeout.as_millis() as u32);
                if wait == WAIT_OBJECT_0 || wait == WAIT_ABANDONED {
                    tracing::debug!("spawn mutex acquired after wait");
                    Self { handle, held: true }
                } else {
                    tracing::debug!("spawn mutex wait timed out");
                    CloseHandle(handle);
                    Self {
                        handle: std::ptr::null_mut(),
                        held: false,
                    }
                }
            }
        }

        pub fn is_held(&self) -> bool {
            self.held
        }

        /// Release the claim. Idempotent; releasing a mutex that was never
        /// held is a no-op.
        pub fn release(&mut self) {
            if self.held {
                self.held = false;
                unsafe {
                    ReleaseMutex(self.handle);
                }
                tracing::debug!("spawn mutex released");
            }
        }
    }

    impl Drop for SpawnLock {
        fn drop(&mut self) {
            self.release();
            if !self.handle.is_null() {
                unsafe {
                    CloseHandle(self.handle);
                }
                self.handle = std::ptr::null_mut();
            }
        }
    }
}

#[cfg(windows)]
pub use windows_impl::SpawnLock;
