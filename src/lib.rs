//! Kiln client library - connects one compilation to a hot `kilnd` server.
//!
//! Starting the kiln compile server is expensive (it hosts a JIT-compiled
//! compilation pipeline), so a long-running `kilnd` process services many
//! consecutive compilations. This crate is the cheap half of that pair: a
//! client that starts fast, finds or spawns a trusted server on the same
//! host, relays one compilation request over a machine-local byte channel,
//! and reproduces the server's output and exit status on its own streams.

pub mod catalog;
pub mod config;
pub mod daemon;
pub mod directives;
pub mod error;
pub mod logging;
pub mod output;
pub mod process;

pub use error::{ClientError, Result};
