// Shared fixtures for session manager integration tests.
//
// Fake targets with controllable parents and names, a binder factory that
// records what it was asked to build, and a manager wired to a loopback host.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dapmux::{
	Binder, BinderContext, BinderDelegate, BinderFactory, HostEvent, LoopbackHost, ManagerConfig, SessionManager, Target,
	TargetRef,
};
use dapmux_protocol::{DebugSessionId, SessionConfiguration, SessionNesting, TargetId};
use parking_lot::Mutex;
use tokio::sync::broadcast;

pub const MODERN_HOST: &str = "1.90.0";
pub const LEGACY_HOST: &str = "1.40.0";

pub struct FakeTarget {
	id: TargetId,
	name: Mutex<String>,
	parent: Option<TargetRef>,
	origin: DebugSessionId,
	names: broadcast::Sender<String>,
}

impl FakeTarget {
	pub fn root(id: &str, origin: &DebugSessionId) -> Arc<Self> {
		Self::build(id, None, origin.clone())
	}

	pub fn child(id: &str, parent: &Arc<FakeTarget>) -> Arc<Self> {
		let parent_ref: TargetRef = parent.clone();
		Self::build(id, Some(parent_ref), parent.origin.clone())
	}

	fn build(id: &str, parent: Option<TargetRef>, origin: DebugSessionId) -> Arc<Self> {
		Arc::new(Self {
			id: TargetId::new(id),
			name: Mutex::new(format!("Target {id}")),
			parent,
			origin,
			names: broadcast::channel(16).0,
		})
	}

	pub fn rename(&self, name: &str) {
		*self.name.lock() = name.to_string();
		let _ = self.names.send(name.to_string());
	}
}

impl Target for FakeTarget {
	fn id(&self) -> &TargetId {
		&self.id
	}

	fn name(&self) -> String {
		self.name.lock().clone()
	}

	fn parent(&self) -> Option<TargetRef> {
		self.parent.clone()
	}

	fn target_origin(&self) -> DebugSessionId {
		self.origin.clone()
	}

	fn subscribe_name_changes(&self) -> Option<broadcast::Receiver<String>> {
		Some(self.names.subscribe())
	}
}

pub fn target_ref(target: &Arc<FakeTarget>) -> TargetRef {
	target.clone()
}

struct RecordingBinder {
	disposed: Arc<AtomicUsize>,
}

impl Binder for RecordingBinder {
	fn dispose(&self) {
		self.disposed.fetch_add(1, Ordering::SeqCst);
	}
}

#[derive(Default)]
pub struct RecordingBinderFactory {
	pub contexts: Mutex<Vec<BinderContext>>,
	pub delegates: Mutex<Vec<Weak<dyn BinderDelegate>>>,
	pub disposed: Arc<AtomicUsize>,
}

impl RecordingBinderFactory {
	pub fn created(&self) -> usize {
		self.contexts.lock().len()
	}

	pub fn disposed(&self) -> usize {
		self.disposed.load(Ordering::SeqCst)
	}
}

impl BinderFactory for RecordingBinderFactory {
	fn create_binder(&self, ctx: BinderContext, delegate: Weak<dyn BinderDelegate>) -> dapmux::Result<Box<dyn Binder>> {
		self.contexts.lock().push(ctx);
		self.delegates.lock().push(delegate);
		Ok(Box::new(RecordingBinder {
			disposed: Arc::clone(&self.disposed),
		}))
	}
}

pub struct Harness {
	pub host: Arc<LoopbackHost>,
	pub binders: Arc<RecordingBinderFactory>,
	pub manager: Arc<SessionManager>,
	pub root: DebugSessionId,
}

impl Harness {
	pub fn new(version: &str) -> Self {
		Self::with_host(LoopbackHost::new(version))
	}

	pub fn with_host(host: LoopbackHost) -> Self {
		let host = Arc::new(host);
		let binders = Arc::new(RecordingBinderFactory::default());
		let manager = SessionManager::new(host.clone(), binders.clone(), ManagerConfig::default()).unwrap();
		let root = host
			.launch_root(SessionConfiguration::launch("pwa-node", "Launch Program"), None)
			.unwrap();
		Self {
			host,
			binders,
			manager,
			root,
		}
	}

	/// Start requests issued for `target`, in order.
	pub fn starts_for(&self, target: &TargetId) -> Vec<(DebugSessionId, Option<SessionNesting>)> {
		self.host
			.events()
			.into_iter()
			.filter_map(|event| match event {
				HostEvent::StartDebugging {
					session,
					configuration,
					nesting,
				} if configuration.pending_target_id.as_ref() == Some(target) => Some((session, nesting)),
				_ => None,
			})
			.collect()
	}

	pub fn renames(&self) -> Vec<(DebugSessionId, String)> {
		self.host
			.events()
			.into_iter()
			.filter_map(|event| match event {
				HostEvent::Renamed { session, name } => Some((session, name)),
				_ => None,
			})
			.collect()
	}

	/// Index of the first host event matching `pred`.
	pub fn position(&self, pred: impl Fn(&HostEvent) -> bool) -> Option<usize> {
		self.host.events().iter().position(pred)
	}
}

/// Polls `condition` until it holds, failing the test after a few seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
	tokio::time::timeout(Duration::from_secs(5), async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("condition never held");
}
