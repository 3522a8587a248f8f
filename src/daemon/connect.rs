//! Bounded-time connection to a compile server's byte channel.
//!
//! Channels are addressed by the server's pid: a named pipe
//! `\\.\pipe\kilnd{pid}` on Windows, a socket `kilnd-{pid}.sock` in the
//! daemon runtime directory on Unix. Connecting is never fatal; callers get
//! back `Some(endpoint)` only once the channel is actually connected.

use std::io;
use std::time::{Duration, Instant};

use tokio::time::sleep;

#[cfg(unix)]
use tokio::net::UnixStream;

#[cfg(windows)]
use tokio::net::windows::named_pipe::NamedPipeClient;

use crate::config::ClientConfig;
use crate::daemon::protocol::{self, CompletedResponse, Request};

/// Floor on connection attempts per logical connect. Under heavy load a
/// single attempt can burn the whole deadline before the server gets
/// scheduled, so the connector keeps trying past the deadline until it has
/// made at least this many attempts.
pub const MIN_CONNECT_ATTEMPTS: u32 = 3;

const ATTEMPT_PAUSE: Duration = Duration::from_millis(50);
const PAST_DEADLINE_WINDOW: Duration = Duration::from_millis(100);

/// An owned, connected duplex channel to one server process.
///
/// The endpoint exists only in the connected state; dropping it closes the
/// underlying handle on every exit path.
pub struct ChannelEndpoint {
    #[cfg(unix)]
    stream: UnixStream,
    #[cfg(windows)]
    pipe: NamedPipeClient,
    peer_pid: u32,
}

impl ChannelEndpoint {
    /// Pid of the server process on the other end.
    pub fn peer_pid(&self) -> u32 {
        self.peer_pid
    }

    /// Write one request frame and read one response frame back.
    ///
    /// Returns `None` on a write failure or a malformed/missing response;
    /// the payloads of a well-formed response are returned uninterpreted.
    pub async fn exchange(&mut self, request: &Request) -> Option<CompletedResponse> {
        #[cfg(unix)]
        let stream = &mut self.stream;
        #[cfg(windows)]
        let stream = &mut self.pipe;

        if let Err(e) = protocol::write_request(stream, request).await {
            tracing::warn!(pid = self.peer_pid, error = %e, "failed to write request");
            return None;
        }
        tracing::debug!(pid = self.peer_pid, "request written, awaiting response");

        match protocol::read_response(stream).await {
            Ok(response) => {
                tracing::debug!(pid = self.peer_pid, exit_code = response.exit_code, "response received");
                Some(response)
            }
            Err(e) => {
                tracing::warn!(pid = self.peer_pid, error = %e, "failed to read response");
                None
            }
        }
    }
}

/// Try to connect to the channel of the server with the given pid, waiting
/// up to `timeout` and always making at least [`MIN_CONNECT_ATTEMPTS`]
/// attempts.
pub async fn connect(config: &ClientConfig, pid: u32, timeout: Duration) -> Option<ChannelEndpoint> {
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let window = if remaining.is_zero() {
            PAST_DEADLINE_WINDOW
        } else {
            remaining
        };

        match open_channel(config, pid, window).await {
            Ok(endpoint) => {
                tracing::debug!(pid, attempts, "connected to server channel");
                return Some(endpoint);
            }
            Err(e) => {
                tracing::debug!(pid, attempts, error = %e, "channel connect attempt failed");
            }
        }

        if attempts >= MIN_CONNECT_ATTEMPTS && Instant::now() >= deadline {
            tracing::debug!(pid, attempts, "giving up on server channel");
            return None;
        }
        sleep(ATTEMPT_PAUSE).await;
    }
}

#[cfg(unix)]
async fn open_channel(
    config: &ClientConfig,
    pid: u32,
    window: Duration,
) -> io::Result<ChannelEndpoint> {
    let path = config.socket_path(pid);
    match tokio::time::timeout(window, UnixStream::connect(&path)).await {
        Ok(Ok(stream)) => Ok(ChannelEndpoint {
            stream,
            peer_pid: pid,
        }),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("timed out connecting to {}", path.display()),
        )),
    }
}

#[cfg(windows)]
async fn open_channel(
    config: &ClientConfig,
    pid: u32,
    window: Duration,
) -> io::Result<ChannelEndpoint> {
    use tokio::net::windows::named_pipe::ClientOptions;
    use windows_sys::Win32::Foundation::ERROR_PIPE_BUSY;

    // The open itself is immediate; a busy pipe (all instances in use) is
    // retried within this attempt's window, anything else bubbles to the
    // outer retry loop.
    let name = config.pipe_name(pid);
    let deadline = Instant::now() + window;
    loop {
        match ClientOptions::new().open(&name) {
            Ok(pipe) => {
                return Ok(ChannelEndpoint {
                    pipe,
                    peer_pid: pid,
                });
            }
            Err(e) if e.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {
                if Instant::now() >= deadline {
                    return Err(e);
                }
                sleep(ATTEMPT_PAUSE).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::net::UnixListener;

    fn test_config(daemon_dir: PathBuf) -> ClientConfig {
        ClientConfig::new(daemon_dir.join("kilnd"), daemon_dir)
    }

    #[tokio::test]
    async fn connects_to_a_listening_channel() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf());
        let _listener = UnixListener::bind(config.socket_path(77)).unwrap();

        let endpoint = connect(&config, 77, Duration::from_secs(2)).await;
        assert!(endpoint.is_some());
        assert_eq!(endpoint.unwrap().peer_pid(), 77);
    }

    #[tokio::test]
    async fn missing_channel_yields_none_after_minimum_attempts() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path().to_path_buf());

        let start = Instant::now();
        let endpoint = connect(&config, 78, Duration::ZERO).await;
        assert!(endpoint.is_none());
        // Three attempts with two pauses between them.
        assert!(start.elapsed() >= ATTEMPT_PAUSE * 2);
    }
}
