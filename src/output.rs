//! Emission of server payloads onto the client's standard streams.
//!
//! The server returns the compilation's stdout and stderr text already
//! carrying its own line endings, so payloads are written as raw bytes with
//! no newline translation. Encoding depends on where the stream goes:
//!
//! - console: plain text writes; the terminal layer handles encoding
//! - redirected stream, UTF-8 flag set: raw UTF-8 bytes
//! - redirected stream, flag clear: the active console output codepage on
//!   Windows, byte passthrough elsewhere

use std::io::{self, IsTerminal, Write};

use crate::daemon::protocol::CompletedResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadEncoding {
    Console,
    Utf8,
    ConsoleCodepage,
}

fn select_encoding(is_terminal: bool, utf8_output: bool) -> PayloadEncoding {
    if is_terminal {
        PayloadEncoding::Console
    } else if utf8_output {
        PayloadEncoding::Utf8
    } else {
        PayloadEncoding::ConsoleCodepage
    }
}

/// Write the response's stdout and stderr payloads to the client's streams.
pub fn emit_response(response: &CompletedResponse) -> io::Result<()> {
    let stdout = io::stdout();
    let is_terminal = stdout.is_terminal();
    let mut out = stdout.lock();
    write_payload(&mut out, is_terminal, &response.output, response.utf8_output)?;
    out.flush()?;

    let stderr = io::stderr();
    let is_terminal = stderr.is_terminal();
    let mut err = stderr.lock();
    write_payload(
        &mut err,
        is_terminal,
        &response.error_output,
        response.utf8_output,
    )?;
    err.flush()
}

/// Write a fatal client diagnostic to stderr, always as UTF-8.
pub fn emit_fatal(message: &str) {
    let mut stderr = io::stderr().lock();
    let _ = stderr.write_all(message.as_bytes());
    let _ = stderr.write_all(b"\n");
    let _ = stderr.flush();
}

fn write_payload<W: Write>(
    writer: &mut W,
    is_terminal: bool,
    text: &str,
    utf8_output: bool,
) -> io::Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    match select_encoding(is_terminal, utf8_output) {
        PayloadEncoding::Console => write!(writer, "{text}"),
        PayloadEncoding::Utf8 => writer.write_all(text.as_bytes()),
        PayloadEncoding::ConsoleCodepage => writer.write_all(&console_codepage_bytes(text)),
    }
}

#[cfg(not(windows))]
fn console_codepage_bytes(text: &str) -> Vec<u8> {
    text.as_bytes().to_vec()
}

#[cfg(windows)]
fn console_codepage_bytes(text: &str) -> Vec<u8> {
    use windows_sys::Win32::Globalization::WideCharToMultiByte;
    use windows_sys::Win32::System::Console::GetConsoleOutputCP;

    let wide: Vec<u16> = text.encode_utf16().collect();
    if wide.is_empty() {
        return Vec::new();
    }
    unsafe {
        let codepage = GetConsoleOutputCP();
        let needed = WideCharToMultiByte(
            codepage,
            0,
            wide.as_ptr(),
            wide.len() as i32,
            std::ptr::null_mut(),
            0,
            std::ptr::null(),
            std::ptr::null_mut(),
        );
        if needed <= 0 {
            return text.as_bytes().to_vec();
        }
        let mut buffer = vec![0u8; needed as usize];
        let written = WideCharToMultiByte(
            codepage,
            0,
            wide.as_ptr(),
            wide.len() as i32,
            buffer.as_mut_ptr(),
            needed,
            std::ptr::null(),
            std::ptr::null_mut(),
        );
        if written <= 0 {
            return text.as_bytes().to_vec();
        }
        buffer.truncate(written as usize);
        buffer
    }
}
