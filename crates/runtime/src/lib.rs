//! dapmux runtime: transport, connection, and session listener
//!
//! This crate provides the low-level plumbing a debug session needs to talk
//! to its host:
//!
//! - **Transport**: `Content-Length` framed JSON over any async byte stream
//! - **Connection**: queued, bidirectional message channel owned by a session
//! - **Session transport**: single-use loopback listener feeding a connection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │    dapmux    │  Session, SessionManager
//! └──────┬───────┘
//!        │ owns
//! ┌──────▼───────┐
//! │dapmux-runtime│  This crate
//! │  ┌────────┐  │
//! │  │Listener│  │  Loopback accept, once
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Conn   │  │  Outbound queue, inbound channel
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  Content-Length framing
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod connection;
pub mod error;
pub mod session_transport;
pub mod transport;

pub use connection::Connection;
pub use error::{Error, Result};
pub use session_transport::SessionTransport;
pub use transport::{FramedTransport, MAX_FRAME_LEN, MAX_HEADER_LEN, TransportReceiver, TransportSender};
