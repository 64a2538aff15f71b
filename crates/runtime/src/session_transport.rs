//! Loopback listener that exposes a [`Connection`] to the host.
//!
//! The host learns the listener's address from the session descriptor and
//! connects exactly once. The first accepted stream is attached to the
//! connection; the listener is dropped right after, so later connection
//! attempts are refused.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dapmux_protocol::DescriptorAddress;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::{Error, Result};

/// Single-use loopback listener bound to one [`Connection`].
pub struct SessionTransport {
	local_addr: SocketAddr,
	connection: Arc<Connection>,
	accept_task: Mutex<Option<JoinHandle<()>>>,
	closed: AtomicBool,
}

impl SessionTransport {
	/// Binds an ephemeral loopback port and starts waiting for the host.
	///
	/// Does not block: binding is synchronous and the accept runs on a
	/// background task, which gives up after `accept_timeout`. Must be called
	/// from within a tokio runtime.
	pub fn bind(connection: Arc<Connection>, accept_timeout: Duration) -> Result<Self> {
		let handle = tokio::runtime::Handle::try_current().map_err(|e| Error::NoRuntime(e.to_string()))?;

		let std_listener = StdTcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
		std_listener.set_nonblocking(true)?;
		let local_addr = std_listener.local_addr()?;
		let listener = {
			let _guard = handle.enter();
			TcpListener::from_std(std_listener)?
		};

		let id = connection.id();
		let target = Arc::clone(&connection);
		let accept_task = handle.spawn(async move {
			match tokio::time::timeout(accept_timeout, listener.accept()).await {
				Ok(Ok((stream, peer))) => {
					debug!(target = "dapmux.transport", connection = id, %peer, "host connected");
					if let Err(e) = stream.set_nodelay(true) {
						debug!(target = "dapmux.transport", connection = id, error = %e, "failed to set TCP_NODELAY");
					}
					if let Err(e) = target.attach(stream) {
						warn!(target = "dapmux.transport", connection = id, error = %e, "failed to attach host stream");
					}
				}
				Ok(Err(e)) => {
					warn!(target = "dapmux.transport", connection = id, error = %e, "accept failed");
				}
				Err(_) => {
					warn!(
						target = "dapmux.transport",
						connection = id,
						timeout_ms = accept_timeout.as_millis() as u64,
						"host never connected"
					);
				}
			}
		});

		debug!(target = "dapmux.transport", connection = id, %local_addr, "session transport listening");
		Ok(Self {
			local_addr,
			connection,
			accept_task: Mutex::new(Some(accept_task)),
			closed: AtomicBool::new(false),
		})
	}

	/// Socket address the listener is bound to.
	pub fn local_addr(&self) -> SocketAddr {
		self.local_addr
	}

	/// Address handed to the host.
	pub fn descriptor(&self) -> DescriptorAddress {
		DescriptorAddress::from(self.local_addr)
	}

	/// Returns true once [`close`](Self::close) has run.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Stops listening and closes the connection. Safe to call more than once.
	pub fn close(&self) {
		if self.closed.swap(true, Ordering::SeqCst) {
			return;
		}
		if let Some(task) = self.accept_task.lock().take() {
			task.abort();
		}
		self.connection.close();
		debug!(target = "dapmux.transport", connection = self.connection.id(), "session transport closed");
	}
}

impl Drop for SessionTransport {
	fn drop(&mut self) {
		if let Some(task) = self.accept_task.get_mut().take() {
			task.abort();
		}
	}
}
