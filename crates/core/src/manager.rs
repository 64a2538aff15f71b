//! Registry that turns discovered targets into live sessions.
//!
//! # Protocol
//!
//! Creating a session for a target takes two phases that meet in a
//! correlation table:
//!
//! 1. [`SessionManager::acquire_dap`] registers the target as pending, stores
//!    a waiter keyed by target id, and asks the host to start an attach
//!    session whose configuration carries the target id as marker.
//! 2. The host calls back into the registered descriptor factory. The marker
//!    finds the pending target and the waiter is completed with the new
//!    [`Session`].
//!
//! Parents are resolved before children, so the host always sees a child
//! session nested under an existing parent. Every target has at most one
//! creation in flight; concurrent requests share it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dapmux_protocol::{DebugSessionId, DebugSessionRecord, DescriptorAddress, SessionConfiguration, TargetId, WorkspaceFolder};
use dapmux_runtime::Connection;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::binder::{BinderDelegate, BinderFactory, DebugAdapter};
use crate::capabilities::HostCapabilities;
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::host::{DebugHost, DescriptorFactory};
use crate::session::Session;
use crate::subscription::Subscription;
use crate::target::TargetRef;

type SessionFuture = Shared<BoxFuture<'static, Result<Arc<Session>>>>;

/// Single-flight cache entry.
struct InFlight {
	generation: u64,
	future: SessionFuture,
	/// Session the host materialized for this creation, once it has.
	resolved: Option<DebugSessionId>,
}

/// Waiter completed by the host's materialization callback.
struct PendingCallback {
	generation: u64,
	sender: oneshot::Sender<Result<Arc<Session>>>,
}

/// The four keyed stores behind the creation protocol.
///
/// `generation` tags tell a fresh creation apart from a released one for the
/// same target.
#[derive(Default)]
struct Registry {
	/// Host session id to session. Insert on materialization, remove on termination.
	sessions: HashMap<DebugSessionId, Arc<Session>>,
	/// Targets awaiting their host callback. Insert on request, remove on materialization.
	pending_target: HashMap<TargetId, TargetRef>,
	/// Single-flight cache. Insert on request, remove on release or failure.
	session_for_target: HashMap<TargetId, InFlight>,
	/// Waiters. Insert on request, remove on materialization, release or failure.
	session_for_target_callbacks: HashMap<TargetId, PendingCallback>,
}

/// Counts of registry entries, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
	pub sessions: usize,
	pub pending_targets: usize,
	pub in_flight: usize,
	pub callbacks: usize,
}

/// Registry and factory of [`Session`]s.
pub struct SessionManager {
	this: Weak<SessionManager>,
	host: Arc<dyn DebugHost>,
	binder_factory: Arc<dyn BinderFactory>,
	config: ManagerConfig,
	registry: Mutex<Registry>,
	generation: AtomicU64,
	subscriptions: Mutex<Vec<Subscription>>,
	disposed: AtomicBool,
}

/// Descriptor factory handed to the host. Weak, so the host registration does
/// not keep the manager alive.
struct ManagerFactory(Weak<SessionManager>);

impl DescriptorFactory for ManagerFactory {
	fn create_debug_adapter_descriptor(&self, record: &DebugSessionRecord) -> Result<DescriptorAddress> {
		match self.0.upgrade() {
			Some(manager) => manager.create_debug_adapter_descriptor(record),
			None => Err(Error::Disposed),
		}
	}
}

impl SessionManager {
	/// Creates the manager and registers it with `host`.
	///
	/// Registers the descriptor factory for `config.debug_type` and starts
	/// listening for session terminations. Must run inside a tokio runtime.
	pub fn new(host: Arc<dyn DebugHost>, binder_factory: Arc<dyn BinderFactory>, config: ManagerConfig) -> Result<Arc<Self>> {
		let handle = tokio::runtime::Handle::try_current().map_err(|e| dapmux_runtime::Error::NoRuntime(e.to_string()))?;

		let manager = Arc::new_cyclic(|this| Self {
			this: this.clone(),
			host,
			binder_factory,
			config,
			registry: Mutex::new(Registry::default()),
			generation: AtomicU64::new(0),
			subscriptions: Mutex::new(Vec::new()),
			disposed: AtomicBool::new(false),
		});

		let factory = manager
			.host
			.register_descriptor_factory(&manager.config.debug_type, Arc::new(ManagerFactory(Arc::downgrade(&manager))));

		let mut terminations = manager.host.subscribe_terminations();
		let weak = Arc::downgrade(&manager);
		let listener = handle.spawn(async move {
			loop {
				match terminations.recv().await {
					Ok(id) => {
						let Some(manager) = weak.upgrade() else { break };
						manager.handle_session_terminated(&id);
					}
					Err(RecvError::Lagged(skipped)) => {
						warn!(target = "dapmux.manager", skipped, "missed session terminations");
					}
					Err(RecvError::Closed) => break,
				}
			}
		});

		manager.subscriptions.lock().extend([factory, Subscription::from_task(listener)]);
		info!(target = "dapmux.manager", debug_type = %manager.config.debug_type, "session manager registered");
		Ok(manager)
	}

	/// Configuration the manager runs with.
	pub fn config(&self) -> &ManagerConfig {
		&self.config
	}

	/// Materializes a session for a session the host is starting.
	///
	/// Attach sessions carry a pending-target marker and complete the waiter
	/// for that target. Sessions without a marker are roots and get a binder.
	pub fn create_debug_adapter_descriptor(&self, record: &DebugSessionRecord) -> Result<DescriptorAddress> {
		if self.is_disposed() {
			return Err(Error::Disposed);
		}

		let session = Arc::new(Session::new(record.clone(), &self.config)?);

		let Some(marker) = record.pending_target() else {
			let delegate: Weak<dyn BinderDelegate> = self.this.clone();
			if let Err(err) = session.create_binder(self.host.as_ref(), self.binder_factory.as_ref(), delegate) {
				warn!(target = "dapmux.manager", session = %record.id, error = %err, "failed to create binder");
				session.dispose();
				return Err(err);
			}
			self.registry.lock().sessions.insert(record.id.clone(), Arc::clone(&session));
			info!(target = "dapmux.manager", session = %record.id, "root session registered");
			return Ok(session.descriptor());
		};

		let target = self.registry.lock().pending_target.remove(marker);
		let Some(target) = target else {
			error!(target = "dapmux.manager", session = %record.id, marker = %marker, "session started for unknown target");
			session.dispose();
			return Err(Error::UnknownPendingTarget(marker.clone()));
		};

		let caps = HostCapabilities::resolve(&self.host.version());
		if let Err(err) = session.listen_to_target(&target, &self.host, caps) {
			session.dispose();
			let callback = self.registry.lock().session_for_target_callbacks.remove(marker);
			if let Some(callback) = callback {
				let _ = callback.sender.send(Err(err.clone()));
			}
			return Err(err);
		}

		let callback = {
			let mut registry = self.registry.lock();
			registry.sessions.insert(record.id.clone(), Arc::clone(&session));
			let callback = registry.session_for_target_callbacks.remove(marker);
			if let Some(callback) = &callback {
				if let Some(in_flight) = registry
					.session_for_target
					.get_mut(marker)
					.filter(|in_flight| in_flight.generation == callback.generation)
				{
					in_flight.resolved = Some(record.id.clone());
				}
			}
			callback
		};
		match callback {
			Some(callback) => {
				debug!(target = "dapmux.manager", session = %record.id, target_id = %marker, "resolving target session");
				let _ = callback.sender.send(Ok(Arc::clone(&session)));
			}
			None => {
				debug!(target = "dapmux.manager", session = %record.id, target_id = %marker, "target released before its session arrived");
			}
		}
		Ok(session.descriptor())
	}

	/// Returns the shared creation future for `target`, starting it if needed.
	fn session_for_target(&self, target: TargetRef) -> SessionFuture {
		let mut registry = self.registry.lock();
		if let Some(in_flight) = registry.session_for_target.get(target.id()) {
			return in_flight.future.clone();
		}
		if self.is_disposed() {
			return futures::future::ready(Err(Error::Disposed)).boxed().shared();
		}

		let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
		let target_id = target.id().clone();
		let (sender, receiver) = oneshot::channel();
		let future = async move {
			match receiver.await {
				Ok(result) => result,
				Err(_) => Err(Error::Disposed),
			}
		}
		.boxed()
		.shared();

		registry.pending_target.insert(target_id.clone(), Arc::clone(&target));
		registry
			.session_for_target_callbacks
			.insert(target_id.clone(), PendingCallback { generation, sender });
		registry.session_for_target.insert(
			target_id.clone(),
			InFlight {
				generation,
				future: future.clone(),
				resolved: None,
			},
		);
		drop(registry);

		debug!(target = "dapmux.manager", target_id = %target_id, generation, "creating session for target");
		let this = self.this.clone();
		tokio::spawn(async move {
			if let Some(manager) = this.upgrade() {
				manager.materialize(target, generation).await;
			}
		});
		future
	}

	async fn materialize(&self, target: TargetRef, generation: u64) {
		if let Err(err) = self.request_session(&target, generation).await {
			self.fail_creation(target.id(), generation, err);
		}
	}

	/// Resolves the parent session, then asks the host for the attach session.
	async fn request_session(&self, target: &TargetRef, generation: u64) -> Result<()> {
		let target_id = target.id();
		let (parent_session, folder) = match target.parent() {
			Some(parent) => {
				let parent = self.session_for_target(parent).await?;
				(parent.id().clone(), parent.record().workspace_folder.clone())
			}
			None => self.origin_session(target)?,
		};

		if !self.is_current(target_id, generation) {
			return Err(Error::TargetGone { target: target_id.clone() });
		}

		let caps = HostCapabilities::resolve(&self.host.version());
		let configuration = SessionConfiguration::attach(&self.config.debug_type, target.name(), target_id.clone());
		debug!(
			target = "dapmux.manager",
			target_id = %target_id,
			parent = %parent_session,
			hierarchy = caps.session_hierarchy,
			"starting attach session"
		);
		if !self.host.start_debugging(folder, configuration, caps.nesting(parent_session)).await? {
			return Err(Error::StartRefused { target: target_id.clone() });
		}
		Ok(())
	}

	fn origin_session(&self, target: &TargetRef) -> Result<(DebugSessionId, Option<WorkspaceFolder>)> {
		let origin = target.target_origin();
		let registry = self.registry.lock();
		match registry.sessions.get(&origin) {
			Some(session) => Ok((origin, session.record().workspace_folder.clone())),
			None => {
				error!(target = "dapmux.manager", target_id = %target.id(), %origin, "origin session is not registered");
				Err(Error::MissingOriginSession {
					target: target.id().clone(),
					origin,
				})
			}
		}
	}

	fn is_current(&self, target_id: &TargetId, generation: u64) -> bool {
		matches!(
			self.registry.lock().session_for_target_callbacks.get(target_id),
			Some(callback) if callback.generation == generation
		)
	}

	/// Fails one creation and evicts its entries so a later request starts over.
	fn fail_creation(&self, target_id: &TargetId, generation: u64, err: Error) {
		let callback = {
			let mut registry = self.registry.lock();
			let owned = matches!(
				registry.session_for_target_callbacks.get(target_id),
				Some(callback) if callback.generation == generation
			);
			let callback = if owned {
				registry.session_for_target_callbacks.remove(target_id)
			} else {
				None
			};
			if !registry.session_for_target_callbacks.contains_key(target_id) {
				registry.pending_target.remove(target_id);
			}
			if matches!(registry.session_for_target.get(target_id), Some(in_flight) if in_flight.generation == generation) {
				registry.session_for_target.remove(target_id);
			}
			callback
		};

		if err.is_target_gone() {
			debug!(target = "dapmux.manager", target_id = %target_id, error = %err, "session creation abandoned");
		} else {
			warn!(target = "dapmux.manager", target_id = %target_id, error = %err, "session creation failed");
		}
		if let Some(callback) = callback {
			let _ = callback.sender.send(Err(err));
		}
	}

	/// Removes and disposes the session the host reports as terminated.
	///
	/// The target's cached creation is evicted too, so the next request starts
	/// a new session instead of handing out the closed connection.
	pub fn handle_session_terminated(&self, id: &DebugSessionId) {
		let session = {
			let mut registry = self.registry.lock();
			let session = registry.sessions.remove(id);
			if let Some(target_id) = session.as_ref().and_then(|session| session.record().pending_target()) {
				let owned = matches!(
					registry.session_for_target.get(target_id),
					Some(in_flight) if in_flight.resolved.as_ref() == Some(id)
				);
				if owned {
					registry.session_for_target.remove(target_id);
				}
			}
			session
		};
		if let Some(session) = session {
			info!(target = "dapmux.manager", session = %id, "session terminated");
			session.dispose();
		}
	}

	/// Registered session by host id.
	pub fn session(&self, id: &DebugSessionId) -> Option<Arc<Session>> {
		self.registry.lock().sessions.get(id).cloned()
	}

	/// All registered sessions.
	pub fn sessions(&self) -> Vec<Arc<Session>> {
		self.registry.lock().sessions.values().cloned().collect()
	}

	pub fn snapshot(&self) -> RegistrySnapshot {
		let registry = self.registry.lock();
		RegistrySnapshot {
			sessions: registry.sessions.len(),
			pending_targets: registry.pending_target.len(),
			in_flight: registry.session_for_target.len(),
			callbacks: registry.session_for_target_callbacks.len(),
		}
	}

	/// Returns true once [`dispose`](Self::dispose) has run.
	pub fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	/// Disposes every session, clears the registry and drops host
	/// registrations. Later calls are no-ops.
	///
	/// Callers still waiting on a session fail with [`Error::Disposed`].
	pub fn dispose(&self) {
		if self.disposed.swap(true, Ordering::SeqCst) {
			return;
		}
		let registry = std::mem::take(&mut *self.registry.lock());
		let subscriptions = std::mem::take(&mut *self.subscriptions.lock());
		drop(subscriptions);

		let count = registry.sessions.len();
		for session in registry.sessions.into_values() {
			session.dispose();
		}
		info!(target = "dapmux.manager", sessions = count, "session manager disposed");
	}
}

#[async_trait]
impl BinderDelegate for SessionManager {
	async fn acquire_dap(&self, target: TargetRef) -> Result<Arc<Connection>> {
		let session = self.session_for_target(target).await?;
		Ok(Arc::clone(session.connection()))
	}

	fn release_dap(&self, target: &TargetRef) {
		let callback = {
			let mut registry = self.registry.lock();
			registry.session_for_target.remove(target.id());
			registry.session_for_target_callbacks.remove(target.id())
		};
		if let Some(callback) = callback {
			debug!(target = "dapmux.manager", target_id = %target.id(), "target released while pending");
			let _ = callback.sender.send(Err(Error::TargetGone { target: target.id().clone() }));
		}
	}

	async fn init_adapter(&self, _adapter: &dyn DebugAdapter, _target: &TargetRef) -> Result<bool> {
		Ok(false)
	}
}

impl std::fmt::Debug for SessionManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionManager")
			.field("debug_type", &self.config.debug_type)
			.field("registry", &self.snapshot())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}
