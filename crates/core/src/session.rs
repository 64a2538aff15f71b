//! One host debug session bound to one protocol connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dapmux_protocol::{DebugSessionId, DebugSessionRecord, DescriptorAddress};
use dapmux_runtime::{Connection, SessionTransport};
use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::binder::{Binder, BinderContext, BinderDelegate, BinderFactory};
use crate::capabilities::HostCapabilities;
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::host::DebugHost;
use crate::subscription::Subscription;
use crate::target::TargetRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionRole {
	Unbound,
	/// Owns a target subtree through a binder.
	Root,
	/// Attached to an already discovered target.
	Attached,
}

impl SessionRole {
	fn as_str(self) -> &'static str {
		match self {
			SessionRole::Unbound => "unbound",
			SessionRole::Root => "root",
			SessionRole::Attached => "attached",
		}
	}
}

/// Pairing of a host debug-session record with a live protocol connection.
///
/// The connection is usable from construction until [`dispose`](Self::dispose).
pub struct Session {
	record: DebugSessionRecord,
	connection: Arc<Connection>,
	transport: SessionTransport,
	role: Mutex<SessionRole>,
	binder: Mutex<Option<Box<dyn Binder>>>,
	name_subscription: Mutex<Option<Subscription>>,
	disposed: AtomicBool,
}

impl Session {
	/// Creates the connection and starts listening for the host.
	///
	/// Must run inside a tokio runtime; the accept itself happens in the
	/// background.
	pub fn new(record: DebugSessionRecord, config: &ManagerConfig) -> Result<Self> {
		let connection = Arc::new(Connection::new());
		let transport = SessionTransport::bind(Arc::clone(&connection), config.connect_timeout())?;
		info!(
			target = "dapmux.session",
			session = %record.id,
			name = %record.name,
			addr = %transport.local_addr(),
			"session created"
		);
		Ok(Self {
			record,
			connection,
			transport,
			role: Mutex::new(SessionRole::Unbound),
			binder: Mutex::new(None),
			name_subscription: Mutex::new(None),
			disposed: AtomicBool::new(false),
		})
	}

	/// Host identity of this session.
	pub fn id(&self) -> &DebugSessionId {
		&self.record.id
	}

	/// Host record this session was created for.
	pub fn record(&self) -> &DebugSessionRecord {
		&self.record
	}

	/// Protocol endpoint of this session.
	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	/// Address of the local transport the host connects to.
	pub fn descriptor(&self) -> DescriptorAddress {
		self.transport.descriptor()
	}

	/// Returns true if this session drives target discovery.
	pub fn is_root(&self) -> bool {
		*self.role.lock() == SessionRole::Root
	}

	/// Returns true if a binder is currently held.
	pub fn has_binder(&self) -> bool {
		self.binder.lock().is_some()
	}

	/// Returns true once [`dispose`](Self::dispose) has run.
	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	fn claim(&self, role: SessionRole) -> Result<()> {
		let mut current = self.role.lock();
		if *current != SessionRole::Unbound {
			return Err(Error::SessionAlreadyBound {
				session: self.record.id.clone(),
				role: current.as_str(),
			});
		}
		*current = role;
		Ok(())
	}

	/// Mirrors the target's display name onto the host session.
	///
	/// Does nothing beyond claiming the role when the host cannot rename
	/// sessions or the target's name is fixed.
	pub fn listen_to_target(&self, target: &TargetRef, host: &Arc<dyn DebugHost>, caps: HostCapabilities) -> Result<()> {
		self.claim(SessionRole::Attached)?;

		if !caps.session_rename {
			debug!(target = "dapmux.session", session = %self.record.id, "host cannot rename sessions");
			return Ok(());
		}
		let Some(mut names) = target.subscribe_name_changes() else {
			return Ok(());
		};

		let handle = tokio::runtime::Handle::try_current().map_err(|e| dapmux_runtime::Error::NoRuntime(e.to_string()))?;
		let host = Arc::clone(host);
		let session = self.record.id.clone();
		let target_id = target.id().clone();
		let task = handle.spawn(async move {
			loop {
				match names.recv().await {
					Ok(name) => {
						debug!(target = "dapmux.session", %session, target_id = %target_id, %name, "target renamed");
						host.rename_session(&session, &name);
					}
					Err(RecvError::Lagged(skipped)) => {
						warn!(target = "dapmux.session", %session, skipped, "missed target name changes");
					}
					Err(RecvError::Closed) => break,
				}
			}
		});
		*self.name_subscription.lock() = Some(Subscription::from_task(task));
		Ok(())
	}

	/// Builds the binder that discovers this session's target subtree.
	///
	/// The workspace root comes from the session's own folder when it is a
	/// local file URI, else from the host.
	pub fn create_binder(&self, host: &dyn DebugHost, factory: &dyn BinderFactory, delegate: Weak<dyn BinderDelegate>) -> Result<()> {
		self.claim(SessionRole::Root)?;

		let workspace_root = self
			.record
			.workspace_folder
			.as_ref()
			.and_then(|folder| folder.local_path())
			.or_else(|| host.workspace_root());

		let ctx = BinderContext {
			session: self.record.clone(),
			workspace_root,
			connection: Arc::clone(&self.connection),
		};
		let binder = factory.create_binder(ctx, delegate)?;
		debug!(target = "dapmux.session", session = %self.record.id, "binder created");
		*self.binder.lock() = Some(binder);
		Ok(())
	}

	/// Tears down the binder, the name subscription, then the transport.
	///
	/// Later calls are no-ops.
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		let binder = self.binder.lock().take();
		if let Some(binder) = binder {
			binder.dispose();
		}
		let subscription = self.name_subscription.lock().take();
		drop(subscription);
		self.transport.close();
		info!(target = "dapmux.session", session = %self.record.id, "session disposed");
	}
}

impl std::fmt::Debug for Session {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Session")
			.field("id", &self.record.id)
			.field("name", &self.record.name)
			.field("role", &*self.role.lock())
			.field("connection", &self.connection.id())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
