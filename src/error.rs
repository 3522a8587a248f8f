use thiserror::Error;

use crate::catalog;

/// Exit codes surfaced by the client binary.
///
/// A successful exchange exits with whatever code the server returned; every
/// client-initiated failure collapses to the single `CLIENT_ERROR` value so
/// build drivers can distinguish "the compiler rejected the input" from "the
/// client never reached a compiler".
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const CLIENT_ERROR: i32 = 1;
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{}", catalog::missing_keep_alive())]
    MissingKeepAlive,

    #[error("{}", catalog::keep_alive_is_not_an_integer())]
    KeepAliveNotAnInteger,

    #[error("{}", catalog::keep_alive_is_too_small())]
    KeepAliveTooSmall,

    #[error("{}", catalog::keep_alive_is_out_of_range())]
    KeepAliveOutOfRange,

    #[error("could not read the invoking user's identity: {0}")]
    IdentityUnavailable(String),

    #[error("could not derive the server executable path: {0}")]
    ServerPathUnavailable(String),

    #[error("{}", catalog::connect_to_server_failed())]
    PipeNeverConnected,

    #[error("{}", catalog::server_is_lost(.pid))]
    ServerLost { pid: u32 },

    #[error("{}", catalog::server_crashed(.pid, .code))]
    ServerCrashed { pid: u32, code: u32 },

    #[error("{}", catalog::server_unresponsive(.pid))]
    ServerUnresponsive { pid: u32 },

    #[error("{}", catalog::unknown_failure(.0))]
    Os(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Every fatal client condition maps to the one client-error exit code;
    /// server-reported codes never travel through this type.
    pub fn exit_code(&self) -> i32 {
        exit_codes::CLIENT_ERROR
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_errors_exit_with_client_error_code() {
        let errors = vec![
            ClientError::MissingKeepAlive,
            ClientError::KeepAliveNotAnInteger,
            ClientError::KeepAliveTooSmall,
            ClientError::KeepAliveOutOfRange,
            ClientError::IdentityUnavailable("denied".into()),
            ClientError::ServerPathUnavailable("no parent".into()),
            ClientError::PipeNeverConnected,
            ClientError::ServerLost { pid: 7 },
            ClientError::ServerCrashed {
                pid: 7,
                code: 0xC0000005,
            },
            ClientError::ServerUnresponsive { pid: 7 },
            ClientError::Os(std::io::Error::other("boom")),
        ];
        for err in errors {
            assert_eq!(err.exit_code(), exit_codes::CLIENT_ERROR);
        }
    }

    #[test]
    fn server_crashed_message_includes_hex_code() {
        let err = ClientError::ServerCrashed {
            pid: 42,
            code: 0xC0000005,
        };
        let text = err.to_string();
        assert!(text.contains("0xC0000005"), "got: {text}");
        assert!(text.contains("42"), "got: {text}");
    }

    #[test]
    fn lost_message_names_the_pid() {
        let text = ClientError::ServerLost { pid: 1234 }.to_string();
        assert!(text.contains("1234"), "got: {text}");
    }
}
