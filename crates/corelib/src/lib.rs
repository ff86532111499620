//! Core library for the QUIC RPC node.
//!
//! This crate holds the transport-agnostic pieces:
//! - Request/response model
//! - Wire framing codec
//! - Transport error kinds and their classification
//! - Route table

pub mod classify;
pub mod codec;
pub mod error;
pub mod message;
pub mod router;

pub use classify::{classify_accept, classify_stream, AcceptOutcome, StreamOutcome};
pub use codec::FrameLimits;
pub use error::{Error, Result, TransportError};
pub use message::{Headers, Request, Response};
pub use router::Router;
