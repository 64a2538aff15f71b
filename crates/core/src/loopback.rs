//! In-process debugging host.
//!
//! [`LoopbackHost`] implements [`DebugHost`] without an editor behind it. It
//! allocates session ids, calls the registered descriptor factory the way a
//! real host would, and records every interaction as a [`HostEvent`]. Starts
//! can be deferred and flushed later to exercise asynchronous hosts.

use std::collections::{HashMap, VecDeque};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dapmux_protocol::{
	DebugSessionId, DebugSessionRecord, DescriptorAddress, SessionConfiguration, SessionNesting, WorkspaceFolder,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::host::{DebugHost, DescriptorFactory};
use crate::subscription::Subscription;

const TERMINATION_CAPACITY: usize = 64;

/// One observed host interaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum HostEvent {
	/// A session start was requested. `nesting` is `None` for root launches.
	#[serde(rename_all = "camelCase")]
	StartDebugging {
		session: DebugSessionId,
		configuration: SessionConfiguration,
		nesting: Option<SessionNesting>,
	},
	/// The descriptor factory returned an address.
	#[serde(rename_all = "camelCase")]
	DescriptorCreated { session: DebugSessionId, address: DescriptorAddress },
	/// The descriptor factory failed or none was registered.
	#[serde(rename_all = "camelCase")]
	DescriptorFailed { session: DebugSessionId, error: String },
	/// A session was renamed.
	Renamed { session: DebugSessionId, name: String },
	/// A session was terminated.
	Terminated { session: DebugSessionId },
}

type FactorySlot = Arc<Mutex<Option<(String, Arc<dyn DescriptorFactory>)>>>;

/// Debugging host living in the same process.
pub struct LoopbackHost {
	version: RwLock<String>,
	factory: FactorySlot,
	terminations: broadcast::Sender<DebugSessionId>,
	events: Mutex<Vec<HostEvent>>,
	deferred: AtomicBool,
	queue: Mutex<VecDeque<DebugSessionRecord>>,
	refuse_starts: AtomicBool,
	connect_clients: AtomicBool,
	clients: Mutex<Vec<TcpStream>>,
	next_session: AtomicU64,
	workspace_root: Option<PathBuf>,
	names: Mutex<HashMap<DebugSessionId, String>>,
}

impl LoopbackHost {
	/// Creates a host reporting `version`.
	pub fn new(version: impl Into<String>) -> Self {
		Self {
			version: RwLock::new(version.into()),
			factory: Arc::new(Mutex::new(None)),
			terminations: broadcast::channel(TERMINATION_CAPACITY).0,
			events: Mutex::new(Vec::new()),
			deferred: AtomicBool::new(false),
			queue: Mutex::new(VecDeque::new()),
			refuse_starts: AtomicBool::new(false),
			connect_clients: AtomicBool::new(false),
			clients: Mutex::new(Vec::new()),
			next_session: AtomicU64::new(1),
			workspace_root: None,
			names: Mutex::new(HashMap::new()),
		}
	}

	/// Sets the ambient workspace root.
	pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
		self.workspace_root = Some(root.into());
		self
	}

	/// Changes the reported version, as a host upgrade would.
	pub fn set_version(&self, version: impl Into<String>) {
		*self.version.write() = version.into();
	}

	/// Queue starts until [`flush`](Self::flush) instead of materializing them
	/// inside `start_debugging`.
	pub fn set_deferred(&self, deferred: bool) {
		self.deferred.store(deferred, Ordering::SeqCst);
	}

	/// Make `start_debugging` decline every request.
	pub fn set_refuse_starts(&self, refuse: bool) {
		self.refuse_starts.store(refuse, Ordering::SeqCst);
	}

	/// Connect a TCP client to every descriptor, like a real host would.
	pub fn set_connect_clients(&self, connect: bool) {
		self.connect_clients.store(connect, Ordering::SeqCst);
	}

	/// Launches a root session, the way a user starting a launch configuration would.
	pub fn launch_root(&self, configuration: SessionConfiguration, folder: Option<WorkspaceFolder>) -> Result<DebugSessionId> {
		let record = DebugSessionRecord {
			id: self.allocate_id(),
			name: configuration.name.clone(),
			configuration,
			workspace_folder: folder,
			parent_session: None,
		};
		let id = record.id.clone();
		self.push(HostEvent::StartDebugging {
			session: id.clone(),
			configuration: record.configuration.clone(),
			nesting: None,
		});
		if self.materialize(record) {
			Ok(id)
		} else {
			Err(Error::Host(format!("root session {id} failed to start")))
		}
	}

	/// Materializes every deferred start. Returns how many were processed.
	pub fn flush(&self) -> usize {
		let mut processed = 0;
		loop {
			let next = self.queue.lock().pop_front();
			let Some(record) = next else { break };
			self.materialize(record);
			processed += 1;
		}
		processed
	}

	/// Number of deferred starts waiting for [`flush`](Self::flush).
	pub fn queued_starts(&self) -> usize {
		self.queue.lock().len()
	}

	/// Ends a session and notifies subscribers.
	pub fn terminate(&self, id: &DebugSessionId) {
		self.names.lock().remove(id);
		self.push(HostEvent::Terminated { session: id.clone() });
		if self.terminations.send(id.clone()).is_err() {
			debug!(target = "dapmux.host", session = %id, "no termination subscribers");
		}
	}

	/// Everything observed so far, in order.
	pub fn events(&self) -> Vec<HostEvent> {
		self.events.lock().clone()
	}

	/// Current display name of a live session.
	pub fn session_name(&self, id: &DebugSessionId) -> Option<String> {
		self.names.lock().get(id).cloned()
	}

	/// Number of host clients connected to session descriptors.
	pub fn connected_clients(&self) -> usize {
		self.clients.lock().len()
	}

	fn allocate_id(&self) -> DebugSessionId {
		DebugSessionId::new(format!("session-{}", self.next_session.fetch_add(1, Ordering::SeqCst)))
	}

	fn push(&self, event: HostEvent) {
		self.events.lock().push(event);
	}

	/// Calls the descriptor factory for `record`. Returns false on failure.
	fn materialize(&self, record: DebugSessionRecord) -> bool {
		let registered = self.factory.lock().clone();
		let factory = match registered {
			Some((debug_type, factory)) if debug_type == record.configuration.debug_type => factory,
			_ => {
				warn!(
					target = "dapmux.host",
					session = %record.id,
					debug_type = %record.configuration.debug_type,
					"no descriptor factory for debug type"
				);
				self.push(HostEvent::DescriptorFailed {
					session: record.id,
					error: "no descriptor factory registered".to_string(),
				});
				return false;
			}
		};

		match factory.create_debug_adapter_descriptor(&record) {
			Ok(address) => {
				debug!(target = "dapmux.host", session = %record.id, %address, "descriptor created");
				if self.connect_clients.load(Ordering::SeqCst) {
					match TcpStream::connect((address.host.as_str(), address.port)) {
						Ok(stream) => self.clients.lock().push(stream),
						Err(e) => warn!(target = "dapmux.host", session = %record.id, error = %e, "failed to connect to descriptor"),
					}
				}
				self.names.lock().insert(record.id.clone(), record.name.clone());
				self.push(HostEvent::DescriptorCreated {
					session: record.id,
					address,
				});
				true
			}
			Err(err) => {
				warn!(target = "dapmux.host", session = %record.id, error = %err, "descriptor factory failed");
				self.push(HostEvent::DescriptorFailed {
					session: record.id,
					error: err.to_string(),
				});
				false
			}
		}
	}
}

#[async_trait]
impl DebugHost for LoopbackHost {
	fn version(&self) -> String {
		self.version.read().clone()
	}

	fn register_descriptor_factory(&self, debug_type: &str, factory: Arc<dyn DescriptorFactory>) -> Subscription {
		info!(target = "dapmux.host", debug_type, "descriptor factory registered");
		*self.factory.lock() = Some((debug_type.to_string(), factory));
		Subscription::clearing(&self.factory)
	}

	fn subscribe_terminations(&self) -> broadcast::Receiver<DebugSessionId> {
		self.terminations.subscribe()
	}

	async fn start_debugging(
		&self,
		folder: Option<WorkspaceFolder>,
		configuration: SessionConfiguration,
		nesting: SessionNesting,
	) -> Result<bool> {
		if self.refuse_starts.load(Ordering::SeqCst) {
			debug!(target = "dapmux.host", name = %configuration.name, "start refused");
			return Ok(false);
		}

		let record = DebugSessionRecord {
			id: self.allocate_id(),
			name: configuration.name.clone(),
			configuration,
			workspace_folder: folder,
			parent_session: Some(nesting.parent().clone()),
		};
		self.push(HostEvent::StartDebugging {
			session: record.id.clone(),
			configuration: record.configuration.clone(),
			nesting: Some(nesting),
		});

		if self.deferred.load(Ordering::SeqCst) {
			debug!(target = "dapmux.host", session = %record.id, "start deferred");
			self.queue.lock().push_back(record);
			return Ok(true);
		}
		Ok(self.materialize(record))
	}

	fn rename_session(&self, id: &DebugSessionId, name: &str) {
		self.names.lock().insert(id.clone(), name.to_string());
		self.push(HostEvent::Renamed {
			session: id.clone(),
			name: name.to_string(),
		});
	}

	fn workspace_root(&self) -> Option<PathBuf> {
		self.workspace_root.clone()
	}
}

impl std::fmt::Debug for LoopbackHost {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LoopbackHost")
			.field("version", &*self.version.read())
			.field("events", &self.events.lock().len())
			.field("queued", &self.queue.lock().len())
			.finish()
	}
}
