// Session Manager Integration Tests
//
// Drives the manager through a loopback host and checks the target to
// session protocol: single-flight creation, parent-before-child ordering,
// cancellation, termination and disposal.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use dapmux::{BinderDelegate, DebugAdapter, DebugHost, Error, HostEvent, LoopbackHost, RegistrySnapshot};
use dapmux_protocol::{ConsoleMode, DebugSessionId, SessionConfiguration, SessionNesting, StartOptions, TargetId, WorkspaceFolder};
use dapmux_runtime::Connection;
use fixtures::{FakeTarget, Harness, LEGACY_HOST, MODERN_HOST, eventually, target_ref};

#[tokio::test]
async fn test_root_session_gets_a_binder() {
	let h = Harness::new(MODERN_HOST);

	let root = h.manager.session(&h.root).expect("root session registered");
	assert!(root.is_root());
	assert!(root.has_binder());
	assert_eq!(h.binders.created(), 1);

	let ctx = &h.binders.contexts.lock()[0];
	assert_eq!(ctx.session.id, h.root);
	assert_eq!(ctx.connection.id(), root.connection().id());
}

#[tokio::test]
async fn test_concurrent_requests_share_one_creation() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);

	let (first, second) = tokio::join!(h.manager.acquire_dap(target_ref(&a)), h.manager.acquire_dap(target_ref(&a)));
	let first = first.unwrap();
	let second = second.unwrap();

	assert!(Arc::ptr_eq(&first, &second));
	assert_eq!(h.starts_for(&TargetId::new("A")).len(), 1);

	// Later requests hit the cache.
	let third = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	assert!(Arc::ptr_eq(&first, &third));
	assert_eq!(h.starts_for(&TargetId::new("A")).len(), 1);
}

#[tokio::test]
async fn test_single_flight_with_deferred_host() {
	let h = Harness::new(MODERN_HOST);
	h.host.set_deferred(true);
	let a = FakeTarget::root("A", &h.root);

	let waiters: Vec<_> = (0..3)
		.map(|_| {
			let manager = h.manager.clone();
			let target = target_ref(&a);
			tokio::spawn(async move { manager.acquire_dap(target).await })
		})
		.collect();

	eventually(|| h.host.queued_starts() == 1).await;
	tokio::time::sleep(Duration::from_millis(20)).await;
	assert_eq!(h.host.queued_starts(), 1);
	assert_eq!(h.manager.snapshot().in_flight, 1);

	assert_eq!(h.host.flush(), 1);

	let mut connections = Vec::new();
	for waiter in waiters {
		connections.push(waiter.await.unwrap().unwrap());
	}
	assert!(connections.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
	assert_eq!(h.starts_for(&TargetId::new("A")).len(), 1);
}

#[tokio::test]
async fn test_parent_session_exists_before_child_start() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);
	let b = FakeTarget::child("B", &a);
	let c = FakeTarget::child("C", &b);

	h.manager.acquire_dap(target_ref(&c)).await.unwrap();

	let start_a = h.starts_for(&TargetId::new("A"));
	let start_b = h.starts_for(&TargetId::new("B"));
	let start_c = h.starts_for(&TargetId::new("C"));
	assert_eq!((start_a.len(), start_b.len(), start_c.len()), (1, 1, 1));

	let (session_a, _) = &start_a[0];
	let (session_b, nesting_b) = &start_b[0];
	let (_, nesting_c) = &start_c[0];
	assert_eq!(nesting_b.as_ref().map(|n| n.parent()), Some(session_a));
	assert_eq!(nesting_c.as_ref().map(|n| n.parent()), Some(session_b));

	let created = |id: &DebugSessionId| {
		h.position(|event| matches!(event, HostEvent::DescriptorCreated { session, .. } if session == id))
			.unwrap()
	};
	let started = |target: &str| {
		h.position(|event| {
			matches!(event, HostEvent::StartDebugging { configuration, .. }
				if configuration.pending_target_id == Some(TargetId::new(target)))
		})
		.unwrap()
	};
	assert!(created(session_a) < started("B"));
	assert!(created(session_b) < started("C"));
}

#[tokio::test]
async fn test_root_then_child_scenario() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);

	let conn_a = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	let starts = h.starts_for(&TargetId::new("A"));
	assert_eq!(starts.len(), 1);
	let (session_a, nesting) = &starts[0];
	assert_eq!(
		nesting,
		&Some(SessionNesting::Hierarchy(StartOptions {
			parent_session: h.root.clone(),
			console_mode: ConsoleMode::MergeWithParent,
		}))
	);

	let s_a = h.manager.session(session_a).unwrap();
	assert!(!s_a.is_root());
	assert!(!s_a.has_binder());
	assert_eq!(s_a.connection().id(), conn_a.id());
	assert_eq!(s_a.record().configuration.pending_target_id, Some(TargetId::new("A")));

	let b = FakeTarget::child("B", &a);
	h.manager.acquire_dap(target_ref(&b)).await.unwrap();

	assert_eq!(h.starts_for(&TargetId::new("A")).len(), 1);
	let starts_b = h.starts_for(&TargetId::new("B"));
	assert_eq!(starts_b.len(), 1);
	assert_eq!(starts_b[0].1.as_ref().map(|n| n.parent().clone()), Some(session_a.clone()));

	// Only the user-started root owns a binder.
	assert_eq!(h.binders.created(), 1);
	assert_eq!(
		h.manager.snapshot(),
		RegistrySnapshot {
			sessions: 3,
			pending_targets: 0,
			in_flight: 2,
			callbacks: 0,
		}
	);
}

#[tokio::test]
async fn test_release_fails_waiters_and_allows_fresh_creation() {
	let h = Harness::new(MODERN_HOST);
	h.host.set_deferred(true);
	let a = FakeTarget::root("A", &h.root);

	let manager = h.manager.clone();
	let target = target_ref(&a);
	let waiter = tokio::spawn(async move { manager.acquire_dap(target).await });
	eventually(|| h.host.queued_starts() == 1).await;

	h.manager.release_dap(&target_ref(&a));
	let err = waiter.await.unwrap().unwrap_err();
	assert!(err.is_target_gone(), "unexpected error: {err}");

	let snapshot = h.manager.snapshot();
	assert_eq!((snapshot.in_flight, snapshot.callbacks), (0, 0));

	// The stale start still lands; nobody is waiting for it.
	h.host.flush();
	let stale = h.starts_for(&TargetId::new("A"))[0].0.clone();
	assert!(h.manager.session(&stale).is_some());

	h.host.set_deferred(false);
	let fresh = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	let starts = h.starts_for(&TargetId::new("A"));
	assert_eq!(starts.len(), 2);
	let fresh_session = h.manager.session(&starts[1].0).unwrap();
	assert_eq!(fresh_session.connection().id(), fresh.id());
	assert_ne!(stale, starts[1].0);
}

#[tokio::test]
async fn test_release_without_pending_is_noop() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);

	h.manager.release_dap(&target_ref(&a));
	assert_eq!(h.manager.snapshot().in_flight, 0);

	let first = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	h.manager.release_dap(&target_ref(&a));
	assert!(!first.is_closed());
	assert_eq!(h.manager.snapshot().callbacks, 0);
}

#[tokio::test]
async fn test_release_child_while_parent_pending() {
	let h = Harness::new(MODERN_HOST);
	h.host.set_deferred(true);
	let a = FakeTarget::root("A", &h.root);
	let b = FakeTarget::child("B", &a);

	let manager = h.manager.clone();
	let target = target_ref(&b);
	let waiter = tokio::spawn(async move { manager.acquire_dap(target).await });

	// Only the parent's start is queued; the child waits on it.
	eventually(|| h.host.queued_starts() == 1).await;
	assert_eq!(h.manager.snapshot().callbacks, 2);

	h.manager.release_dap(&target_ref(&b));
	let err = waiter.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::TargetGone { .. }), "unexpected error: {err}");

	// The parent still materializes; the released child never starts.
	assert_eq!(h.host.flush(), 1);
	eventually(|| h.manager.snapshot().pending_targets == 0).await;
	tokio::time::sleep(Duration::from_millis(20)).await;

	assert!(h.starts_for(&TargetId::new("B")).is_empty());
	assert_eq!(h.host.queued_starts(), 0);
	assert_eq!(
		h.manager.snapshot(),
		RegistrySnapshot {
			sessions: 2,
			pending_targets: 0,
			in_flight: 1,
			callbacks: 0,
		}
	);
}

#[tokio::test]
async fn test_missing_origin_is_invariant_violation() {
	let h = Harness::new(MODERN_HOST);
	let orphan = FakeTarget::root("orphan", &DebugSessionId::new("no-such-session"));
	let child = FakeTarget::child("orphan-child", &orphan);

	let err = h.manager.acquire_dap(target_ref(&child)).await.unwrap_err();
	assert!(err.is_invariant_violation(), "unexpected error: {err}");
	assert!(matches!(err, Error::MissingOriginSession { .. }));

	let snapshot = h.manager.snapshot();
	assert_eq!((snapshot.pending_targets, snapshot.in_flight, snapshot.callbacks), (0, 0, 0));
	assert!(h.starts_for(&TargetId::new("orphan")).is_empty());
}

#[tokio::test]
async fn test_unknown_marker_is_rejected() {
	let h = Harness::new(MODERN_HOST);
	let started = h
		.host
		.start_debugging(
			None,
			SessionConfiguration::attach("pwa-node", "Ghost", TargetId::new("ghost")),
			SessionNesting::Parent {
				parent_session: h.root.clone(),
			},
		)
		.await
		.unwrap();

	assert!(!started);
	let failure = h.host.events().into_iter().find_map(|event| match event {
		HostEvent::DescriptorFailed { error, .. } => Some(error),
		_ => None,
	});
	assert!(failure.unwrap().contains("Invariant violation"));
	assert_eq!(h.manager.snapshot().sessions, 1);
}

#[tokio::test]
async fn test_refused_start_is_evicted() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);

	h.host.set_refuse_starts(true);
	let err = h.manager.acquire_dap(target_ref(&a)).await.unwrap_err();
	assert!(matches!(err, Error::StartRefused { .. }));
	assert_eq!(h.manager.snapshot().in_flight, 0);

	h.host.set_refuse_starts(false);
	h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	assert_eq!(h.starts_for(&TargetId::new("A")).len(), 1);
}

#[tokio::test]
async fn test_legacy_host_uses_plain_nesting() {
	let h = Harness::new(LEGACY_HOST);
	let a = FakeTarget::root("A", &h.root);
	h.manager.acquire_dap(target_ref(&a)).await.unwrap();

	let starts = h.starts_for(&TargetId::new("A"));
	assert_eq!(
		starts[0].1,
		Some(SessionNesting::Parent {
			parent_session: h.root.clone()
		})
	);

	// An upgraded host is picked up on the next start.
	h.host.set_version(MODERN_HOST);
	let b = FakeTarget::root("B", &h.root);
	h.manager.acquire_dap(target_ref(&b)).await.unwrap();
	assert!(matches!(h.starts_for(&TargetId::new("B"))[0].1, Some(SessionNesting::Hierarchy(_))));
}

#[tokio::test]
async fn test_name_changes_propagate_once() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);
	h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	let session_a = h.starts_for(&TargetId::new("A"))[0].0.clone();

	a.rename("A (paused)");
	eventually(|| h.renames().len() == 1).await;
	tokio::time::sleep(Duration::from_millis(20)).await;

	assert_eq!(h.renames(), vec![(session_a.clone(), "A (paused)".to_string())]);
	assert_eq!(h.host.session_name(&session_a).as_deref(), Some("A (paused)"));
}

#[tokio::test]
async fn test_no_renames_on_legacy_host() {
	let h = Harness::new(LEGACY_HOST);
	let a = FakeTarget::root("A", &h.root);
	h.manager.acquire_dap(target_ref(&a)).await.unwrap();

	a.rename("A (paused)");
	tokio::time::sleep(Duration::from_millis(50)).await;
	assert!(h.renames().is_empty());
}

#[tokio::test]
async fn test_attach_sessions_inherit_workspace_folder() {
	let h = Harness::new(MODERN_HOST);
	let folder = WorkspaceFolder {
		uri: url::Url::parse("file:///work/app").unwrap(),
		name: "app".to_string(),
	};
	let root = h
		.host
		.launch_root(SessionConfiguration::launch("pwa-node", "App"), Some(folder.clone()))
		.unwrap();

	let a = FakeTarget::root("A", &root);
	let b = FakeTarget::child("B", &a);
	h.manager.acquire_dap(target_ref(&b)).await.unwrap();

	for target in ["A", "B"] {
		let id = h.starts_for(&TargetId::new(target))[0].0.clone();
		let session = h.manager.session(&id).unwrap();
		assert_eq!(session.record().workspace_folder.as_ref(), Some(&folder));
	}
	let ctx = h.binders.contexts.lock()[1].clone();
	assert_eq!(ctx.workspace_root, Some(std::path::PathBuf::from("/work/app")));
}

#[tokio::test]
async fn test_root_without_folder_uses_host_workspace_root() {
	let h = Harness::with_host(LoopbackHost::new(MODERN_HOST).with_workspace_root("/srv/app"));

	let ctx = h.binders.contexts.lock()[0].clone();
	assert_eq!(ctx.session.id, h.root);
	assert!(ctx.session.workspace_folder.is_none());
	assert_eq!(ctx.workspace_root, Some(std::path::PathBuf::from("/srv/app")));
}

#[tokio::test]
async fn test_binder_discovers_through_delegate() {
	let h = Harness::new(MODERN_HOST);
	let delegate = h.binders.delegates.lock()[0].upgrade().expect("manager alive");
	let a = FakeTarget::root("A", &h.root);

	let via_delegate = delegate.acquire_dap(target_ref(&a)).await.unwrap();
	let via_manager = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	assert!(Arc::ptr_eq(&via_delegate, &via_manager));
}

struct Adapter(Arc<Connection>);

impl DebugAdapter for Adapter {
	fn connection(&self) -> &Arc<Connection> {
		&self.0
	}
}

#[tokio::test]
async fn test_init_adapter_declines() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);
	let connection = h.manager.acquire_dap(target_ref(&a)).await.unwrap();

	let handled = h.manager.init_adapter(&Adapter(connection), &target_ref(&a)).await.unwrap();
	assert!(!handled);
}

#[tokio::test]
async fn test_host_connects_to_descriptor() {
	let host = LoopbackHost::new(MODERN_HOST);
	host.set_connect_clients(true);
	let h = Harness::with_host(host);
	let a = FakeTarget::root("A", &h.root);

	let connection = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	eventually(|| connection.is_attached()).await;
	assert_eq!(h.host.connected_clients(), 2);
}

#[tokio::test]
async fn test_termination_disposes_session() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);
	let first = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	let session_a = h.starts_for(&TargetId::new("A"))[0].0.clone();

	h.host.terminate(&session_a);
	eventually(|| h.manager.session(&session_a).is_none()).await;
	assert!(first.is_closed());

	// A target whose session ended gets a new one.
	let second = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	assert!(!Arc::ptr_eq(&first, &second));
	assert_eq!(h.starts_for(&TargetId::new("A")).len(), 2);

	// Terminating twice is harmless.
	h.host.terminate(&session_a);
	h.host.terminate(&h.root);
	eventually(|| h.binders.disposed() == 1).await;
}

#[tokio::test]
async fn test_termination_evicts_unawaited_creation() {
	let h = Harness::new(MODERN_HOST);
	h.host.set_deferred(true);
	let a = FakeTarget::root("A", &h.root);

	// The only waiter gives up before the host materializes the session.
	let manager = h.manager.clone();
	let target = target_ref(&a);
	let waiter = tokio::spawn(async move { manager.acquire_dap(target).await });
	eventually(|| h.host.queued_starts() == 1).await;
	waiter.abort();
	assert!(waiter.await.unwrap_err().is_cancelled());

	assert_eq!(h.host.flush(), 1);
	let session_a = h.starts_for(&TargetId::new("A"))[0].0.clone();
	let stale = h.manager.session(&session_a).expect("session registered");

	h.host.terminate(&session_a);
	eventually(|| h.manager.session(&session_a).is_none()).await;
	assert!(stale.connection().is_closed());
	assert_eq!(h.manager.snapshot().in_flight, 0);

	h.host.set_deferred(false);
	let fresh = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	assert!(!fresh.is_closed());
	assert_ne!(fresh.id(), stale.connection().id());
	assert_eq!(h.starts_for(&TargetId::new("A")).len(), 2);
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
	let h = Harness::new(MODERN_HOST);
	let a = FakeTarget::root("A", &h.root);
	let connection = h.manager.acquire_dap(target_ref(&a)).await.unwrap();
	let sessions = h.manager.sessions();
	assert_eq!(sessions.len(), 2);

	h.manager.dispose();
	h.manager.dispose();

	assert!(sessions.iter().all(|s| s.is_disposed()));
	assert!(connection.is_closed());
	assert_eq!(h.binders.disposed(), 1);
	assert_eq!(h.manager.snapshot(), RegistrySnapshot::default());

	let err = h.manager.acquire_dap(target_ref(&a)).await.unwrap_err();
	assert!(matches!(err, Error::Disposed));

	// The descriptor factory was unregistered.
	assert!(
		h.host
			.launch_root(SessionConfiguration::launch("pwa-node", "Again"), None)
			.is_err()
	);
}

#[tokio::test]
async fn test_dispose_fails_pending_waiters() {
	let h = Harness::new(MODERN_HOST);
	h.host.set_deferred(true);
	let a = FakeTarget::root("A", &h.root);

	let manager = h.manager.clone();
	let target = target_ref(&a);
	let waiter = tokio::spawn(async move { manager.acquire_dap(target).await });
	eventually(|| h.host.queued_starts() == 1).await;

	h.manager.dispose();
	let err = waiter.await.unwrap().unwrap_err();
	assert!(matches!(err, Error::Disposed));
}
