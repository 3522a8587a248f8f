//! Diagnostic message catalog with locale selection.
//!
//! All user-facing client diagnostics are resolved through this module so a
//! `/preferreduilang:` directive can swap the message table before the first
//! diagnostic is ever produced. The active locale is a process-wide,
//! single-writer cell: it is set at most once, during startup, and read
//! everywhere else.
//!
//! Only the default (English) table ships today; an unknown locale falls
//! back to it rather than failing, and the directive is still forwarded to
//! the server so server-side diagnostics can honor it.

use std::sync::OnceLock;

/// One message table. Templates use `{pid}` / `{code}` / `{error}` markers.
struct Messages {
    missing_keep_alive: &'static str,
    keep_alive_is_not_an_integer: &'static str,
    keep_alive_is_too_small: &'static str,
    keep_alive_is_out_of_range: &'static str,
    connect_to_server_failed: &'static str,
    server_is_lost: &'static str,
    server_crashed: &'static str,
    server_unresponsive: &'static str,
    unknown_failure: &'static str,
}

static DEFAULT: Messages = Messages {
    missing_keep_alive: "missing argument for '/keepalive' option",
    keep_alive_is_not_an_integer: "argument to '/keepalive' option is not a valid integer",
    keep_alive_is_too_small: "argument to '/keepalive' option cannot be less than -1",
    keep_alive_is_out_of_range: "argument to '/keepalive' option is out of range",
    connect_to_server_failed: "could not connect to the compile server pipe",
    server_is_lost: "lost contact with the compile server process (pid {pid})",
    server_crashed: "the compile server process (pid {pid}) exited unexpectedly with code {code}",
    server_unresponsive: "the compile server process (pid {pid}) did not produce a response",
    unknown_failure: "the compile server request failed: {error}",
};

static LOCALES: &[(&str, &Messages)] = &[("en", &DEFAULT), ("en-us", &DEFAULT)];

static ACTIVE: OnceLock<&'static Messages> = OnceLock::new();

/// Select the message table for `locale`. Effective only on the first call;
/// later calls (and unknown locales) leave the active table unchanged.
pub fn set_preferred_language(locale: &str) {
    let lower = locale.to_ascii_lowercase();
    let table = LOCALES
        .iter()
        .find(|(name, _)| *name == lower || lower.starts_with(&format!("{name}-")))
        .map(|(_, table)| *table)
        .unwrap_or(&DEFAULT);
    let _ = ACTIVE.set(table);
}

fn active() -> &'static Messages {
    ACTIVE.get().copied().unwrap_or(&DEFAULT)
}

pub fn missing_keep_alive() -> &'static str {
    active().missing_keep_alive
}

pub fn keep_alive_is_not_an_integer() -> &'static str {
    active().keep_alive_is_not_an_integer
}

pub fn keep_alive_is_too_small() -> &'static str {
    active().keep_alive_is_too_small
}

pub fn keep_alive_is_out_of_range() -> &'static str {
    active().keep_alive_is_out_of_range
}

pub fn connect_to_server_failed() -> &'static str {
    active().connect_to_server_failed
}

pub fn server_is_lost(pid: &u32) -> String {
    active().server_is_lost.replace("{pid}", &pid.to_string())
}

pub fn server_crashed(pid: &u32, code: &u32) -> String {
    active()
        .server_crashed
        .replace("{pid}", &pid.to_string())
        .replace("{code}", &format!("0x{code:X}"))
}

pub fn server_unresponsive(pid: &u32) -> String {
    active()
        .server_unresponsive
        .replace("{pid}", &pid.to_string())
}

pub fn unknown_failure(error: &std::io::Error) -> String {
    active()
        .unknown_failure
        .replace("{error}", &error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_fill_their_markers() {
        let crashed = server_crashed(&99, &0xC0000005);
        assert!(crashed.contains("99"));
        assert!(crashed.contains("0xC0000005"));
        assert!(!crashed.contains("{pid}"));
        assert!(!crashed.contains("{code}"));

        let lost = server_is_lost(&7);
        assert!(lost.contains('7'));
        assert!(!lost.contains("{pid}"));
    }

    #[test]
    fn unknown_locale_falls_back_to_default() {
        // ACTIVE may already be set by another test; either way the resolved
        // table must be a real one and the static accessors must not panic.
        set_preferred_language("xx-YY");
        assert!(!missing_keep_alive().is_empty());
        assert!(!connect_to_server_failed().is_empty());
    }
}
