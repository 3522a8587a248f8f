//! Wire types and framing for the compile-server channel.
//!
//! A client invocation exchanges exactly one message pair with the server:
//! one request out, one response back. Messages are framed with a simple
//! length-delimited format:
//!
//! - 4 bytes: message length (big-endian u32)
//! - N bytes: JSON-encoded message
//!
//! The response payloads are opaque here: whatever stdout/stderr text the
//! server produced is carried verbatim and interpreted only at emission.

use serde::{Deserialize, Serialize};
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Maximum message size (16 MB) to bound a malformed peer's damage.
pub const MAX_MESSAGE_SIZE: u32 = 16 * 1024 * 1024;

/// Which compiler frontend the server should dispatch the request to.
///
/// Opaque to the connection controller; it is chosen by the client binary
/// and forwarded untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestLanguage {
    Kiln,
    KilnScript,
}

/// One compilation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Compiler frontend to dispatch to.
    pub language: RequestLanguage,
    /// Working directory the compilation should resolve paths against.
    pub current_directory: String,
    /// The residual argument vector, verbatim and in original order.
    pub arguments: Vec<String>,
    /// Value of the client's `LIB` environment variable, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lib_env: Option<String>,
    /// Keep-alive directive extracted from the client arguments, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<String>,
}

/// The server's answer to a completed compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedResponse {
    /// Exit code the client process should exit with.
    pub exit_code: i32,
    /// Compiler stdout text, emitted verbatim.
    pub output: String,
    /// Compiler stderr text, emitted verbatim.
    pub error_output: String,
    /// True if the payloads were produced under a UTF-8 codepage.
    pub utf8_output: bool,
}

/// Write a length-delimited frame to an async writer.
///
/// # Errors
///
/// Returns an error if the data exceeds `MAX_MESSAGE_SIZE` or writing fails.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    if data.len() > MAX_MESSAGE_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "message too large: {} bytes (max {})",
                data.len(),
                MAX_MESSAGE_SIZE
            ),
        ));
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-delimited frame from an async reader.
///
/// # Errors
///
/// Returns an error if the connection closes, the declared length exceeds
/// `MAX_MESSAGE_SIZE`, or reading fails.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;

    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {} bytes (max {})", len, MAX_MESSAGE_SIZE),
        ));
    }

    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Serialize and write a request frame.
pub async fn write_request<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    request: &Request,
) -> io::Result<()> {
    let json =
        serde_json::to_vec(request).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    write_frame(writer, &json).await
}

/// Read and deserialize a request frame (used by test harnesses standing in
/// for the server).
pub async fn read_request<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Request> {
    let data = read_frame(reader).await?;
    serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Serialize and write a response frame (test harness counterpart).
pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &CompletedResponse,
) -> io::Result<()> {
    let json =
        serde_json::to_vec(response).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    write_frame(writer, &json).await
}

/// Read and deserialize a response frame.
pub async fn read_response<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<CompletedResponse> {
    let data = read_frame(reader).await?;
    serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn request_serialization_roundtrip() {
        let request = Request {
            language: RequestLanguage::Kiln,
            current_directory: "/work".to_string(),
            arguments: vec!["main.kiln".to_string(), "/out:main.o".to_string()],
            lib_env: Some("/opt/kiln/lib".to_string()),
            keep_alive: Some("30".to_string()),
        };
        let json = serde_json::to_string(&request).unwrap();
        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.language, RequestLanguage::Kiln);
        assert_eq!(parsed.current_directory, "/work");
        assert_eq!(parsed.arguments, request.arguments);
        assert_eq!(parsed.lib_env.as_deref(), Some("/opt/kiln/lib"));
        assert_eq!(parsed.keep_alive.as_deref(), Some("30"));
    }

    #[test]
    fn absent_options_are_not_serialized() {
        let request = Request {
            language: RequestLanguage::KilnScript,
            current_directory: "/work".to_string(),
            arguments: vec![],
            lib_env: None,
            keep_alive: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("lib_env"));
        assert!(!json.contains("keep_alive"));
    }

    #[test]
    fn response_roundtrip_preserves_payloads_verbatim() {
        let response = CompletedResponse {
            exit_code: 3,
            output: "warn: shadowed\r\n".to_string(),
            error_output: "error KN0042: bad input\r\n".to_string(),
            utf8_output: true,
        };
        let json = serde_json::to_string(&response).unwrap();
        let parsed: CompletedResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.exit_code, 3);
        assert_eq!(parsed.output, "warn: shadowed\r\n");
        assert_eq!(parsed.error_output, "error KN0042: bad input\r\n");
        assert!(parsed.utf8_output);
    }

    #[tokio::test]
    async fn frame_roundtrip() {
        let data = b"hello, world!";

        let mut buf = Vec::new();
        write_frame(&mut buf, data).await.unwrap();

        assert_eq!(buf.len(), 4 + data.len());
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        assert_eq!(len as usize, data.len());

        let mut reader = Cursor::new(buf);
        let read_data = read_frame(&mut reader).await.unwrap();
        assert_eq!(read_data, data);
    }

    #[tokio::test]
    async fn request_response_frames_roundtrip() {
        let request = Request {
            language: RequestLanguage::Kiln,
            current_directory: "/src".to_string(),
            arguments: vec!["a.kiln".to_string()],
            lib_env: None,
            keep_alive: None,
        };
        let mut buf = Vec::new();
        write_request(&mut buf, &request).await.unwrap();
        let mut reader = Cursor::new(buf);
        let parsed = read_request(&mut reader).await.unwrap();
        assert_eq!(parsed.arguments, vec!["a.kiln"]);

        let response = CompletedResponse {
            exit_code: 0,
            output: "ok\n".to_string(),
            error_output: String::new(),
            utf8_output: true,
        };
        let mut buf = Vec::new();
        write_response(&mut buf, &response).await.unwrap();
        let mut reader = Cursor::new(buf);
        let parsed = read_response(&mut reader).await.unwrap();
        assert_eq!(parsed.exit_code, 0);
        assert_eq!(parsed.output, "ok\n");
    }

    #[tokio::test]
    async fn oversized_write_is_rejected() {
        let oversized = vec![0u8; (MAX_MESSAGE_SIZE + 1) as usize];
        let mut buf = Vec::new();
        let result = write_frame(&mut buf, &oversized).await;
        assert!(result.unwrap_err().to_string().contains("message too large"));
    }

    #[tokio::test]
    async fn oversized_declared_length_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_MESSAGE_SIZE + 1).to_be_bytes());
        buf.extend_from_slice(b"some data");

        let mut reader = Cursor::new(buf);
        let result = read_frame(&mut reader).await;
        assert!(result.unwrap_err().to_string().contains("message too large"));
    }

    #[tokio::test]
    async fn malformed_response_payload_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"{\"not\": \"a response\"}")
            .await
            .unwrap();
        let mut reader = Cursor::new(buf);
        assert!(read_response(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn truncated_frame_is_an_error() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"complete").await.unwrap();
        buf.truncate(buf.len() - 3);
        let mut reader = Cursor::new(buf);
        assert!(read_frame(&mut reader).await.is_err());
    }
}
