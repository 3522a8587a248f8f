//! Connection and lifecycle control for the compile server.
//!
//! This module owns everything between "the client has a validated argument
//! vector" and "the client has a completed response":
//!
//! - [`protocol`]: request/response types and length-delimited JSON framing
//! - [`connect`]: bounded-time connection to a server's byte channel
//! - [`spawn`]: detached launch of a new server process
//! - [`lock`]: the host-wide advisory lock serializing server spawns
//! - [`controller`]: the state machine sequencing all of the above

pub mod connect;
pub mod controller;
pub mod lock;
pub mod protocol;
pub mod spawn;

pub use connect::ChannelEndpoint;
pub use controller::run_compile;
pub use lock::SpawnLock;
pub use protocol::{CompletedResponse, Request, RequestLanguage};
