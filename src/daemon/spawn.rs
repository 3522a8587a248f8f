//! Detached launch of a new compile server process.
//!
//! The server is started with no inherited standard streams and its working
//! directory set to its own install directory, so it survives the client,
//! the client's console, and the client's cwd. Only the pid is retained;
//! the child handle is dropped immediately.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::ClientConfig;

/// Deployment root variable. When present, the runtime-installation
/// variables below are exported to the server before launch.
pub const TOOLS_ROOT_ENV: &str = "KILN_TOOLS_ROOT";

const RUNTIME_ROOT_ENV: &str = "KILN_RUNTIME_ROOT";
const RUNTIME_VERSION_ENV: &str = "KILN_RUNTIME_VERSION";
const RUNTIME_VERSION: &str = "v2";

/// Launch the server executable the config trusts. Returns the new pid, or
/// `None` if the spawn failed (never fatal; the controller decides what to
/// do next).
pub fn spawn_server(config: &ClientConfig) -> Option<u32> {
    let server_dir = config.server_path.parent()?;
    tracing::debug!(path = %config.server_path.display(), "spawning compile server");

    let mut command = Command::new(&config.server_path);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .current_dir(server_dir);
    apply_deployment_environment(&mut command);

    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        use windows_sys::Win32::System::Threading::{
            CREATE_NO_WINDOW, CREATE_UNICODE_ENVIRONMENT, NORMAL_PRIORITY_CLASS,
        };
        command.creation_flags(CREATE_NO_WINDOW | CREATE_UNICODE_ENVIRONMENT | NORMAL_PRIORITY_CLASS);
    }

    match command.spawn() {
        Ok(child) => {
            let pid = child.id();
            tracing::info!(pid, "compile server spawned");
            Some(pid)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to spawn compile server");
            None
        }
    }
}

/// Hosted deployments relocate the server's runtime; the root variable is
/// the only contract, the derived variables are set here so the server
/// inherits a complete runtime environment.
fn apply_deployment_environment(command: &mut Command) {
    if let Ok(root) = std::env::var(TOOLS_ROOT_ENV) {
        command.env(RUNTIME_ROOT_ENV, Path::new(&root).join("runtime"));
        command.env(RUNTIME_VERSION_ENV, RUNTIME_VERSION);
    }
}
