//! kilnc - the fast client half of the kiln compile-server pair.
//!
//! Each invocation relays exactly one compilation to a hot `kilnd` process,
//! spawning one if no compatible server is running, then mirrors the
//! server's output and exit code.

use kiln::catalog;
use kiln::config::ClientConfig;
use kiln::daemon::{RequestLanguage, run_compile};
use kiln::directives::{self, extract_directives};
use kiln::error::{ClientError, exit_codes};
use kiln::{logging, output};

/// Environment variable forwarded to the server when present.
const LIB_ENV: &str = "LIB";

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Select the diagnostic locale first so even argument errors are
    // reported in the requested language.
    if let Some(locale) = directives::scan_preferred_ui_language(&args) {
        catalog::set_preferred_language(&locale);
    }

    let code = run(args).await;
    std::process::exit(code);
}

async fn run(args: Vec<String>) -> i32 {
    let (residual, client_directives) = match extract_directives(&args) {
        Ok(parts) => parts,
        Err(e) => {
            output::emit_fatal(&e.to_string());
            return e.exit_code();
        }
    };

    let config = match ClientConfig::from_environment() {
        Ok(config) => config,
        Err(e) => {
            output::emit_fatal(&e.to_string());
            return e.exit_code();
        }
    };

    // Keep the guard alive for the whole invocation; dropping it flushes
    // the trace file.
    let _log_guard = logging::init(&config.daemon_dir);
    tracing::debug!(server = %config.server_path.display(), "kilnc starting");

    let current_directory = match std::env::current_dir() {
        Ok(dir) => dir.to_string_lossy().into_owned(),
        Err(e) => {
            let e = ClientError::Io(e);
            output::emit_fatal(&e.to_string());
            return e.exit_code();
        }
    };
    let lib_env = std::env::var(LIB_ENV).ok();

    match run_compile(
        &config,
        RequestLanguage::Kiln,
        &current_directory,
        residual,
        lib_env,
        client_directives.keep_alive,
    )
    .await
    {
        Ok(response) => {
            if let Err(e) = output::emit_response(&response) {
                output::emit_fatal(&ClientError::Io(e).to_string());
                return exit_codes::CLIENT_ERROR;
            }
            response.exit_code
        }
        Err(e) => {
            output::emit_fatal(&e.to_string());
            e.exit_code()
        }
    }
}
