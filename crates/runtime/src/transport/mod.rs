//! Framed transport for debug-adapter traffic.
//!
//! Messages are framed with the debug-adapter base protocol header:
//!
//! ```text
//! Content-Length: <n>\r\n
//! \r\n
//! <n bytes of UTF-8 JSON>
//! ```
//!
//! Headers other than `Content-Length` are ignored. Message bodies are handed
//! to the caller as opaque [`serde_json::Value`]s.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Largest frame body accepted from a peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Longest header line accepted from a peer, terminator included.
pub const MAX_HEADER_LEN: usize = 8 * 1024;

const CONTENT_LENGTH: &str = "content-length";

/// Bidirectional framed transport over a reader/writer pair.
///
/// Split it with [`into_parts`](Self::into_parts) to run reading and writing
/// on separate tasks.
pub struct FramedTransport<W, R> {
	sender: TransportSender<W>,
	receiver: TransportReceiver<R>,
}

impl<W, R> FramedTransport<W, R>
where
	W: AsyncWrite + Unpin + Send,
	R: AsyncRead + Unpin + Send,
{
	/// Creates a transport and the channel its decoded messages arrive on.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		(Self::with_sink(writer, reader, message_tx), message_rx)
	}

	/// Creates a transport that forwards decoded messages into `sink`.
	pub fn with_sink(writer: W, reader: R, sink: mpsc::UnboundedSender<Value>) -> Self {
		Self {
			sender: TransportSender { writer },
			receiver: TransportReceiver {
				reader: BufReader::new(reader),
				message_tx: sink,
			},
		}
	}

	/// Splits the transport into its writing and reading halves.
	pub fn into_parts(self) -> (TransportSender<W>, TransportReceiver<R>) {
		(self.sender, self.receiver)
	}

	/// Writes one framed message.
	pub async fn send(&mut self, message: Value) -> Result<()> {
		self.sender.send(message).await
	}

	/// Reads frames until the peer closes the stream or the sink is dropped.
	pub async fn run(&mut self) -> Result<()> {
		self.receiver.read_loop().await
	}
}

/// Writing half of a [`FramedTransport`].
pub struct TransportSender<W> {
	writer: W,
}

impl<W> TransportSender<W>
where
	W: AsyncWrite + Unpin + Send,
{
	/// Serializes and writes one framed message.
	pub async fn send(&mut self, message: Value) -> Result<()> {
		let body = serde_json::to_vec(&message)?;
		let header = format!("Content-Length: {}\r\n\r\n", body.len());

		self.writer.write_all(header.as_bytes()).await?;
		self.writer.write_all(&body).await?;
		self.writer.flush().await?;

		trace!(target = "dapmux.transport", len = body.len(), "wrote frame");
		Ok(())
	}
}

/// Reading half of a [`FramedTransport`].
pub struct TransportReceiver<R> {
	reader: BufReader<R>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<R> TransportReceiver<R>
where
	R: AsyncRead + Unpin + Send,
{
	/// Reads frames until EOF on a frame boundary or the sink is dropped.
	///
	/// EOF in the middle of a frame is an error.
	pub async fn run(mut self) -> Result<()> {
		self.read_loop().await
	}

	async fn read_loop(&mut self) -> Result<()> {
		loop {
			let Some(body) = read_frame(&mut self.reader).await? else {
				debug!(target = "dapmux.transport", "peer closed stream");
				return Ok(());
			};

			let message: Value = serde_json::from_slice(&body)?;
			if self.message_tx.send(message).is_err() {
				debug!(target = "dapmux.transport", "message sink dropped; stopping reader");
				return Ok(());
			}
		}
	}
}

/// Reads one frame body. Returns `None` on EOF before any header byte.
async fn read_frame<R>(reader: &mut BufReader<R>) -> Result<Option<Vec<u8>>>
where
	R: AsyncRead + Unpin + Send,
{
	let mut content_length: Option<usize> = None;
	let mut saw_header = false;
	let mut line = String::new();

	loop {
		line.clear();
		let read = (&mut *reader).take(MAX_HEADER_LEN as u64 + 1).read_line(&mut line).await?;
		if read > MAX_HEADER_LEN {
			return Err(Error::ProtocolError(format!("Header line exceeds {MAX_HEADER_LEN} bytes")));
		}
		if read == 0 {
			if saw_header {
				return Err(Error::ProtocolError("Stream ended inside frame header".to_string()));
			}
			return Ok(None);
		}
		saw_header = true;

		let header = line.trim_end_matches(['\r', '\n']);
		if header.is_empty() {
			break;
		}

		let Some((name, value)) = header.split_once(':') else {
			return Err(Error::ProtocolError(format!("Malformed header line: {header:?}")));
		};
		if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
			let len = value
				.trim()
				.parse::<usize>()
				.map_err(|_| Error::ProtocolError(format!("Invalid Content-Length: {:?}", value.trim())))?;
			content_length = Some(len);
		}
	}

	let len = content_length.ok_or_else(|| Error::ProtocolError("Frame is missing Content-Length".to_string()))?;
	if len > MAX_FRAME_LEN {
		return Err(Error::FrameTooLarge { len, max: MAX_FRAME_LEN });
	}

	let mut body = vec![0u8; len];
	reader
		.read_exact(&mut body)
		.await
		.map_err(|e| Error::ProtocolError(format!("Failed to read frame body of {len} bytes: {e}")))?;
	Ok(Some(body))
}

#[cfg(test)]
mod tests;
