//! Client-only argument directives.
//!
//! The client forwards its argument vector to the compile server verbatim,
//! with one exception: a small set of directives are interpreted here before
//! anything is sent. Directives are recognized only in the raw argument
//! vector the client received, never inside `@file` response files (which
//! the client does not expand): the server must receive the exact command
//! line minus the client-only tokens, and stripping a directive out of a
//! response file would mean rewriting it.
//!
//! Recognized directives:
//! - `/keepalive:N` or `/keepalive=N` - how long the server should stay
//!   resident after this compilation (seconds; `-1` means forever). The
//!   token is validated, removed from the forwarded arguments, and sent as
//!   a request field instead.
//! - `/preferreduilang:LOCALE` or `-preferreduilang:LOCALE` - selects the
//!   client's diagnostic locale. The token stays in the forwarded arguments;
//!   the server applies it to its own diagnostics as well.

use std::num::IntErrorKind;

use crate::error::{ClientError, Result};

const KEEP_ALIVE_OPTION: &str = "/keepalive";
const PREFERRED_UI_LANG_OPTION: &str = "preferreduilang:";

/// Directives extracted from the raw argument vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientDirectives {
    /// Validated keep-alive value, kept as the original string form.
    pub keep_alive: Option<String>,
    /// Dequoted, non-empty locale identifier, if one was given.
    pub preferred_ui_language: Option<String>,
}

/// Scan `args` once, splitting it into the residual argument vector that is
/// forwarded to the server and the client directives.
///
/// The scan is a pure function of its input: running it again over its own
/// residual output yields the same residual and no keep-alive directive.
/// When the same directive appears more than once, the last occurrence wins.
///
/// # Errors
///
/// Any ill-formed `/keepalive` token is fatal: a missing separator or value
/// (`MissingKeepAlive`), a non-integer value (`KeepAliveNotAnInteger`), an
/// integer that overflows (`KeepAliveOutOfRange`), or a value below -1
/// (`KeepAliveTooSmall`). Nothing is forwarded in that case.
pub fn extract_directives(args: &[String]) -> Result<(Vec<String>, ClientDirectives)> {
    let mut residual = Vec::with_capacity(args.len());
    let mut directives = ClientDirectives::default();

    for arg in args {
        if let Some(rest) = arg.strip_prefix(KEEP_ALIVE_OPTION) {
            directives.keep_alive = Some(parse_keep_alive_value(rest)?);
            continue;
        }
        if let Some(raw) = preferred_ui_language_value(arg) {
            let value = remove_quotes(raw);
            if !value.is_empty() {
                directives.preferred_ui_language = Some(value);
            }
        }
        residual.push(arg.clone());
    }

    Ok((residual, directives))
}

/// Find the locale a `/preferreduilang:` token selects, without validating
/// anything else. Used before full extraction so the diagnostic locale is
/// already in effect when extraction itself fails.
pub fn scan_preferred_ui_language(args: &[String]) -> Option<String> {
    let mut found = None;
    for arg in args {
        if let Some(raw) = preferred_ui_language_value(arg) {
            let value = remove_quotes(raw);
            if !value.is_empty() {
                found = Some(value);
            }
        }
    }
    found
}

fn parse_keep_alive_value(rest: &str) -> Result<String> {
    let mut chars = rest.chars();
    let separator = chars.next();
    let value = chars.as_str();
    if !matches!(separator, Some(':' | '=')) || value.is_empty() {
        return Err(ClientError::MissingKeepAlive);
    }

    match value.parse::<i32>() {
        Ok(n) if n < -1 => Err(ClientError::KeepAliveTooSmall),
        Ok(_) => Ok(value.to_string()),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
                Err(ClientError::KeepAliveOutOfRange)
            }
            _ => Err(ClientError::KeepAliveNotAnInteger),
        },
    }
}

fn preferred_ui_language_value(arg: &str) -> Option<&str> {
    let rest = arg.strip_prefix(['-', '/'])?;
    let option = rest.get(..PREFERRED_UI_LANG_OPTION.len())?;
    if option.eq_ignore_ascii_case(PREFERRED_UI_LANG_OPTION) {
        Some(&rest[PREFERRED_UI_LANG_OPTION.len()..])
    } else {
        None
    }
}

/// Strip quote marks from a directive value, following the conventional
/// backslash escaping: a run of N backslashes before a quote yields N/2
/// literal backslashes; an odd run keeps the quote as a literal character;
/// an even run treats the quote as a (dropped) quoting toggle. Backslash
/// runs not followed by a quote pass through untouched.
pub fn remove_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let mut backslashes = 1usize;
                while chars.peek() == Some(&'\\') {
                    chars.next();
                    backslashes += 1;
                }
                if chars.peek() == Some(&'"') {
                    chars.next();
                    for _ in 0..backslashes / 2 {
                        out.push('\\');
                    }
                    if backslashes % 2 == 1 {
                        out.push('"');
                    }
                } else {
                    for _ in 0..backslashes {
                        out.push('\\');
                    }
                }
            }
            '"' => {}
            other => out.push(other),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn passes_ordinary_arguments_through_in_order() {
        let input = args(&["foo.kiln", "/out:foo.o", "-v"]);
        let (residual, directives) = extract_directives(&input).unwrap();
        assert_eq!(residual, input);
        assert_eq!(directives, ClientDirectives::default());
    }

    #[test]
    fn extracts_keep_alive_with_colon_and_equals() {
        for token in ["/keepalive:30", "/keepalive=30"] {
            let input = args(&["a.kiln", token, "b.kiln"]);
            let (residual, directives) = extract_directives(&input).unwrap();
            assert_eq!(residual, args(&["a.kiln", "b.kiln"]));
            assert_eq!(directives.keep_alive.as_deref(), Some("30"));
        }
    }

    #[test]
    fn keep_alive_accepts_minus_one() {
        let (_, directives) = extract_directives(&args(&["/keepalive:-1"])).unwrap();
        assert_eq!(directives.keep_alive.as_deref(), Some("-1"));
    }

    #[test]
    fn last_keep_alive_wins() {
        let (residual, directives) =
            extract_directives(&args(&["/keepalive:1", "/keepalive:2"])).unwrap();
        assert!(residual.is_empty());
        assert_eq!(directives.keep_alive.as_deref(), Some("2"));
    }

    #[test]
    fn keep_alive_without_separator_is_fatal() {
        for token in ["/keepalive", "/keepalive:", "/keepalive=", "/keepalive30"] {
            let err = extract_directives(&args(&[token])).unwrap_err();
            assert!(matches!(err, ClientError::MissingKeepAlive), "{token}");
        }
    }

    #[test]
    fn keep_alive_non_integer_is_fatal() {
        for token in ["/keepalive:abc", "/keepalive:1.5", "/keepalive:12abc"] {
            let err = extract_directives(&args(&[token])).unwrap_err();
            assert!(matches!(err, ClientError::KeepAliveNotAnInteger), "{token}");
        }
    }

    #[test]
    fn keep_alive_below_minus_one_is_fatal() {
        let err = extract_directives(&args(&["/keepalive:-2"])).unwrap_err();
        assert!(matches!(err, ClientError::KeepAliveTooSmall));
    }

    #[test]
    fn keep_alive_overflow_is_fatal() {
        let err = extract_directives(&args(&["/keepalive:99999999999"])).unwrap_err();
        assert!(matches!(err, ClientError::KeepAliveOutOfRange));
    }

    #[test]
    fn preferred_ui_language_is_recorded_but_still_forwarded() {
        for token in [
            "/preferreduilang:de-DE",
            "-preferreduilang:de-DE",
            "/PreferredUILang:de-DE",
        ] {
            let input = args(&["a.kiln", token]);
            let (residual, directives) = extract_directives(&input).unwrap();
            assert_eq!(residual, input, "{token}");
            assert_eq!(directives.preferred_ui_language.as_deref(), Some("de-DE"));
        }
    }

    #[test]
    fn quoted_preferred_ui_language_is_dequoted() {
        let (_, directives) =
            extract_directives(&args(&["/preferreduilang:\"fr-FR\""])).unwrap();
        assert_eq!(directives.preferred_ui_language.as_deref(), Some("fr-FR"));
    }

    #[test]
    fn empty_preferred_ui_language_is_ignored() {
        for token in ["/preferreduilang:", "/preferreduilang:\"\""] {
            let (_, directives) = extract_directives(&args(&[token])).unwrap();
            assert_eq!(directives.preferred_ui_language, None, "{token}");
        }
    }

    #[test]
    fn scan_finds_last_non_empty_locale() {
        let input = args(&["-preferreduilang:de-DE", "x", "/preferreduilang:ja-JP"]);
        assert_eq!(scan_preferred_ui_language(&input).as_deref(), Some("ja-JP"));
        assert_eq!(scan_preferred_ui_language(&args(&["foo.kiln"])), None);
    }

    #[test]
    fn extraction_is_idempotent_on_its_own_residual() {
        let input = args(&[
            "a.kiln",
            "/keepalive:10",
            "/preferreduilang:de-DE",
            "/out:a.o",
        ]);
        let (residual, _) = extract_directives(&input).unwrap();
        let (second_residual, second) = extract_directives(&residual).unwrap();
        assert_eq!(second_residual, residual);
        assert_eq!(second.keep_alive, None);
    }

    #[test]
    fn dequoting_follows_backslash_rules() {
        // Plain quotes are quoting toggles and disappear.
        assert_eq!(remove_quotes("\"en-US\""), "en-US");
        // An odd backslash run escapes the quote.
        assert_eq!(remove_quotes(r#"a\"b"#), r#"a"b"#);
        // Three backslashes: one literal backslash plus a literal quote.
        assert_eq!(remove_quotes(r#"a\\\"b"#), r#"a\"b"#);
        // An even run halves and the quote toggles (and is dropped).
        assert_eq!(remove_quotes(r#"a\\"b"#), r#"a\b"#);
        // Backslashes not before a quote are untouched.
        assert_eq!(remove_quotes(r"dir\sub\x"), r"dir\sub\x");
        assert_eq!(remove_quotes(r"trailing\\"), r"trailing\\");
    }

    #[test]
    fn non_ascii_arguments_survive_the_scan() {
        let input = args(&["héllo.kiln", "/preferreduilang:\"日本語\""]);
        let (residual, directives) = extract_directives(&input).unwrap();
        assert_eq!(residual, input);
        assert_eq!(directives.preferred_ui_language.as_deref(), Some("日本語"));
    }
}
