//! CLI for running and calling QUIC RPC nodes.
//!
//! Provides commands for:
//! - Serving a node with built-in `ping` and `echo` routes
//! - Making a single call and printing the response
//! - Generating a self-signed certificate pair

pub mod commands;
pub mod config;

pub use commands::{Command, CommandResult};
pub use config::{CliConfig, NodeSettings};
