//! A small RPC node over QUIC.
//!
//! Every node listens and dials. A call opens one bidirectional stream on a
//! pooled connection, writes one framed request and reads one framed
//! response. Inbound requests are dispatched by route to async handlers,
//! which can reply back over the connection a request arrived on.
//!
//! ```no_run
//! use node::{default_transport, Identity, Node, NodeConfig, SecurityConfig};
//! use corelib::{Headers, Response};
//!
//! # async fn run() -> corelib::Result<()> {
//! let identity = Identity::self_signed(&["localhost"])?;
//! let security = SecurityConfig::shared(&identity, "localhost")?;
//! let node = Node::start(
//!     NodeConfig::new("127.0.0.1:4433")
//!         .with_security(security)
//!         .with_transport(default_transport()),
//! )?;
//! node.handle("ping", |_| async { Response::ok("pong") });
//!
//! let reply = node.call("127.0.0.1:4433", "ping", Headers::new(), "").await;
//! node.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod node;
pub mod pool;
mod session;
mod stream;
pub mod tls;
pub mod transport;

pub use config::{default_transport, Limits, NodeConfig};
pub use error::CallError;
pub use node::Node;
pub use pool::{call_on_connection, destination_key, ConnectionPool};
pub use tls::{Identity, SecurityConfig};
pub use transport::{Connection, Pending, QuicConnection, QuicTransport, Transport};
