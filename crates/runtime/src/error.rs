//! Error types for the dapmux runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the transport and connection layers.
#[derive(Debug, Error)]
pub enum Error {
	/// Framing violation on the wire (bad header, truncated body).
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// A frame announced more bytes than the transport accepts.
	#[error("Frame of {len} bytes exceeds the {max} byte limit")]
	FrameTooLarge { len: usize, max: usize },

	/// Transport-level failure while moving bytes.
	#[error("Transport error: {0}")]
	TransportError(String),

	/// The connection already has a stream wired to it.
	#[error("Connection {0} is already attached to a stream")]
	AlreadyAttached(u64),

	/// The inbound message receiver was already handed out.
	#[error("Inbound messages for connection {0} were already taken")]
	InboundTaken(u64),

	/// The connection has been closed.
	#[error("Connection closed")]
	ConnectionClosed,

	/// No tokio runtime is available to drive background tasks.
	#[error("No tokio runtime available: {0}")]
	NoRuntime(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	/// Returns true if the error means the connection can no longer be used.
	pub fn is_closed(&self) -> bool {
		matches!(self, Error::ConnectionClosed)
	}
}
