//! The connection and lifecycle controller.
//!
//! One invocation walks this sequence:
//!
//! 1. read our own principal identity (fatal if unreadable)
//! 2. claim the host-wide spawn lock (bounded wait)
//! 3. under the lock, look for a compatible running server and connect to it
//! 4. otherwise spawn one and connect to that
//! 5. if the lock timed out or the locked attempt failed, spawn once more
//!    without the lock
//! 6. classify whatever went wrong into one fatal diagnostic
//!
//! The lock is released eagerly as soon as a channel is connected so other
//! clients can proceed in parallel, and released again on every exit path
//! by its drop guard. Per invocation there is at most one existing-server
//! attempt and at most two spawned-server attempts.

use tokio::time::sleep;

use crate::config::ClientConfig;
use crate::daemon::connect::{self, ChannelEndpoint};
use crate::daemon::lock::SpawnLock;
use crate::daemon::protocol::{CompletedResponse, Request, RequestLanguage};
use crate::daemon::spawn::spawn_server;
use crate::error::{ClientError, Result};
use crate::process::{PrincipalIdentity, ProcessSnapshot, identity, image_path};

/// Relay one compilation to a compile server, finding or spawning the
/// server as needed.
///
/// # Errors
///
/// Fatal only when no server could be reached at all, or a reached server
/// failed to complete the exchange; every intermediate failure (no
/// candidate, spawn failure, connect timeout) advances the sequence
/// instead of surfacing.
pub async fn run_compile(
    config: &ClientConfig,
    language: RequestLanguage,
    current_directory: &str,
    arguments: Vec<String>,
    lib_env: Option<String>,
    keep_alive: Option<String>,
) -> Result<CompletedResponse> {
    let identity = PrincipalIdentity::current()?;
    let request = Request {
        language,
        current_directory: current_directory.to_string(),
        arguments,
        lib_env,
        keep_alive,
    };

    let mut lock = SpawnLock::acquire(config, config.lock_timeout).await;
    let mut last_pid: Option<u32> = None;
    let mut had_channel = false;

    if lock.is_held() {
        // A server may have come up while we waited for the lock.
        if let Some(mut endpoint) = try_existing(config, &identity).await {
            had_channel = true;
            last_pid = Some(endpoint.peer_pid());
            lock.release();
            tracing::debug!(pid = endpoint.peer_pid(), "compiling on existing server");
            if let Some(response) = endpoint.exchange(&request).await {
                return Ok(response);
            }
            tracing::info!("existing server failed to complete the request, retrying with a new one");
        } else {
            tracing::debug!("no existing server answered, spawning one");
            if let Some(pid) = spawn_server(config) {
                last_pid = Some(pid);
                if let Some(mut endpoint) =
                    connect::connect(config, pid, config.spawn_connect_timeout).await
                {
                    had_channel = true;
                    lock.release();
                    tracing::debug!(pid, "compiling on spawned server");
                    if let Some(response) = endpoint.exchange(&request).await {
                        return Ok(response);
                    }
                    // A server we just spawned failed its very first
                    // request; another spawn would fare no better.
                    return Err(diagnose(had_channel, last_pid));
                }
            }
        }

        lock.release();
        // The failure may have been resource contention; give the host a
        // moment before the unlocked attempt.
        sleep(config.retry_sleep).await;
    }

    // The lock timed out or the locked attempt failed. One try without the
    // lock: progress beats strict exclusion when the holder has stalled.
    tracing::info!("spawning a server without the spawn lock");
    if let Some(pid) = spawn_server(config) {
        last_pid = Some(pid);
        if let Some(mut endpoint) = connect::connect(config, pid, config.spawn_connect_timeout).await
        {
            had_channel = true;
            tracing::debug!(pid, "compiling on fallback server");
            if let Some(response) = endpoint.exchange(&request).await {
                return Ok(response);
            }
        }
    }

    Err(diagnose(had_channel, last_pid))
}

/// Scan the process snapshot for the first server that passes both the
/// image-path check and the identity-and-elevation check AND accepts a
/// connection. Candidates are tried in enumeration order.
async fn try_existing(
    config: &ClientConfig,
    identity: &PrincipalIdentity,
) -> Option<ChannelEndpoint> {
    let snapshot = ProcessSnapshot::capture();
    let pids = snapshot.pids();
    tracing::debug!(count = pids.len(), "scanning for a compatible server");

    for pid in pids {
        if pid == 0 {
            continue;
        }
        let Some(path) = image_path::image_path_of(&snapshot, pid) else {
            continue;
        };
        if !image_path::paths_match(&path, &config.server_path) {
            continue;
        }
        let Some(owner) = identity::identity_of(&snapshot, pid) else {
            continue;
        };
        if !identity.matches(&owner) {
            tracing::debug!(pid, "candidate server runs as a different principal, skipping");
            continue;
        }
        tracing::debug!(pid, "found compatible server");
        if let Some(endpoint) =
            connect::connect(config, pid, config.existing_connect_timeout).await
        {
            return Some(endpoint);
        }
    }
    None
}

/// Turn a failed sequence into its most specific fatal diagnostic.
fn diagnose(had_channel: bool, last_pid: Option<u32>) -> ClientError {
    if !had_channel {
        return ClientError::PipeNeverConnected;
    }
    match last_pid {
        Some(pid) => classify_server_failure(pid),
        None => ClientError::Os(std::io::Error::last_os_error()),
    }
}

#[cfg(windows)]
fn classify_server_failure(pid: u32) -> ClientError {
    use windows_sys::Win32::System::Threading::{GetExitCodeProcess, PROCESS_QUERY_INFORMATION};

    let Some(process) = crate::process::handle::OwnedHandle::open(pid, PROCESS_QUERY_INFORMATION)
    else {
        return ClientError::ServerLost { pid };
    };
    let mut code = 0u32;
    if unsafe { GetExitCodeProcess(process.0, &mut code) } != 0 {
        ClientError::ServerCrashed { pid, code }
    } else {
        ClientError::Os(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn classify_server_failure(pid: u32) -> ClientError {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if rc != 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::ESRCH) {
        ClientError::ServerLost { pid }
    } else {
        // A non-child's exit code is not readable here; the process is
        // still present but never completed our exchange.
        ClientError::ServerUnresponsive { pid }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn never_connected_wins_over_known_pid() {
        let err = diagnose(false, Some(1));
        assert!(matches!(err, ClientError::PipeNeverConnected));
    }

    #[test]
    fn connected_but_no_pid_surfaces_an_os_error() {
        let err = diagnose(true, None);
        assert!(matches!(err, ClientError::Os(_)));
    }

    #[test]
    fn dead_server_is_reported_as_lost() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();
        assert!(matches!(
            classify_server_failure(pid),
            ClientError::ServerLost { .. }
        ));
    }

    #[test]
    fn live_server_without_a_response_is_unresponsive() {
        assert!(matches!(
            classify_server_failure(std::process::id()),
            ClientError::ServerUnresponsive { .. }
        ));
    }
}
