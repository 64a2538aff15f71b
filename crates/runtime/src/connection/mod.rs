//! Protocol connection owned by a debug session.
//!
//! A [`Connection`] exists before any peer is connected: messages sent early
//! are queued and flushed once a stream is wired in with
//! [`attach`](Connection::attach). Attaching spawns two tasks:
//!
//! 1. A reader task decoding frames into the inbound channel
//! 2. A writer task draining the outbound queue into the stream
//!
//! Closing (explicitly, or when the peer hangs up) stops both tasks and ends
//! the inbound channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::FramedTransport;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Bidirectional message channel between a session and its peer.
pub struct Connection {
	id: u64,
	outbound_tx: mpsc::UnboundedSender<Value>,
	/// Taken by `attach()` to start the writer task.
	outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	/// Taken by `attach()` and moved into the reader task.
	inbound_tx: Mutex<Option<mpsc::UnboundedSender<Value>>>,
	/// Taken once by the consumer of inbound messages.
	inbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	attached: AtomicBool,
	closed: Arc<watch::Sender<bool>>,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Connection {
	fn default() -> Self {
		Self::new()
	}
}

impl Connection {
	/// Creates an unattached connection.
	pub fn new() -> Self {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (closed, _) = watch::channel(false);

		Self {
			id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::SeqCst),
			outbound_tx,
			outbound_rx: Mutex::new(Some(outbound_rx)),
			inbound_tx: Mutex::new(Some(inbound_tx)),
			inbound_rx: Mutex::new(Some(inbound_rx)),
			attached: AtomicBool::new(false),
			closed: Arc::new(closed),
			tasks: Mutex::new(Vec::new()),
		}
	}

	/// Process-unique identifier, used in logs.
	pub fn id(&self) -> u64 {
		self.id
	}

	/// Returns true once a stream has been wired in.
	pub fn is_attached(&self) -> bool {
		self.attached.load(Ordering::SeqCst)
	}

	/// Returns true once the connection is closed.
	pub fn is_closed(&self) -> bool {
		*self.closed.borrow()
	}

	/// Queues a message for the peer.
	///
	/// Messages queued before [`attach`](Self::attach) are delivered once a
	/// stream is attached.
	pub fn send(&self, message: Value) -> Result<()> {
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}
		self.outbound_tx.send(message).map_err(|_| Error::ConnectionClosed)
	}

	/// Hands out the receiver of messages coming from the peer. Only once.
	pub fn take_inbound(&self) -> Result<mpsc::UnboundedReceiver<Value>> {
		self.inbound_rx.lock().take().ok_or(Error::InboundTaken(self.id))
	}

	/// Wires `stream` into this connection and starts the pump tasks.
	///
	/// Must be called from within a tokio runtime.
	pub fn attach<S>(&self, stream: S) -> Result<()>
	where
		S: AsyncRead + AsyncWrite + Send + 'static,
	{
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}
		let handle = tokio::runtime::Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;
		if self.attached.swap(true, Ordering::SeqCst) {
			return Err(Error::AlreadyAttached(self.id));
		}

		let outbound_rx = self.outbound_rx.lock().take();
		let inbound_tx = self.inbound_tx.lock().take();
		let (Some(mut outbound_rx), Some(inbound_tx)) = (outbound_rx, inbound_tx) else {
			return Err(Error::ConnectionClosed);
		};

		let (read_half, write_half) = tokio::io::split(stream);
		let transport = FramedTransport::with_sink(write_half, read_half, inbound_tx);
		let (mut sender, receiver) = transport.into_parts();

		let id = self.id;
		let closed = Arc::clone(&self.closed);
		let reader = handle.spawn(async move {
			match receiver.run().await {
				Ok(()) => debug!(target = "dapmux.transport", connection = id, "reader finished"),
				Err(e) => warn!(target = "dapmux.transport", connection = id, error = %e, "reader failed"),
			}
			closed.send_replace(true);
		});

		let closed = Arc::clone(&self.closed);
		let mut closed_rx = self.closed.subscribe();
		let writer = handle.spawn(async move {
			loop {
				tokio::select! {
					biased;
					_ = wait_closed(&mut closed_rx) => break,
					message = outbound_rx.recv() => {
						let Some(message) = message else { break };
						if let Err(e) = sender.send(message).await {
							warn!(target = "dapmux.transport", connection = id, error = %e, "writer failed");
							closed.send_replace(true);
							break;
						}
					}
				}
			}
		});

		self.tasks.lock().extend([reader, writer]);
		debug!(target = "dapmux.transport", connection = id, "stream attached");
		Ok(())
	}

	/// Closes the connection. Safe to call more than once.
	pub fn close(&self) {
		if self.closed.send_replace(true) {
			return;
		}
		for task in self.tasks.lock().drain(..) {
			task.abort();
		}
		self.outbound_rx.lock().take();
		self.inbound_tx.lock().take();
		debug!(target = "dapmux.transport", connection = self.id, "connection closed");
	}

	/// Resolves once the connection is closed, by either side.
	pub async fn closed(&self) {
		let mut rx = self.closed.subscribe();
		wait_closed(&mut rx).await;
	}
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
	let _ = rx.wait_for(|closed| *closed).await;
}

impl Drop for Connection {
	fn drop(&mut self) {
		for task in self.tasks.get_mut().drain(..) {
			task.abort();
		}
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.id)
			.field("attached", &self.is_attached())
			.field("closed", &self.is_closed())
			.finish()
	}
}
