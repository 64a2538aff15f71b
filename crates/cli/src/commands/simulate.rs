//! `dapmux simulate`: replay a scenario against the loopback host.

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use dapmux::{
	Binder, BinderContext, BinderDelegate, BinderFactory, Connection, DebugHost, HostEvent, LoopbackHost, RegistrySnapshot,
	SessionManager, TargetRef,
};
use dapmux_protocol::{DebugSessionId, SessionConfiguration, SessionNesting, TargetId};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cli::SimulateArgs;
use crate::output::TextRender;
use crate::scenario::{Scenario, Step, TargetForest};

/// Time given to background listeners (renames, terminations) before the
/// final snapshot.
const QUIESCE: Duration = Duration::from_millis(20);

type Acquisition = JoinHandle<dapmux::Result<Arc<Connection>>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
	pub host_version: String,
	pub root_session: DebugSessionId,
	pub acquisitions: Vec<AcquireOutcome>,
	pub sessions: Vec<SessionSummary>,
	pub registry: RegistrySnapshot,
	pub binders_created: usize,
	pub binders_disposed: usize,
	pub events: Vec<HostEvent>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquireOutcome {
	pub target: TargetId,
	pub ok: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub connection: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
	pub id: DebugSessionId,
	pub name: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub parent: Option<DebugSessionId>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub target: Option<TargetId>,
	pub root: bool,
}

#[derive(Default)]
struct SimulationBinders {
	created: AtomicUsize,
	disposed: Arc<AtomicUsize>,
}

struct SimulationBinder {
	session: DebugSessionId,
	disposed: Arc<AtomicUsize>,
}

impl Binder for SimulationBinder {
	fn dispose(&self) {
		self.disposed.fetch_add(1, Ordering::SeqCst);
		debug!(session = %self.session, "binder disposed");
	}
}

impl BinderFactory for SimulationBinders {
	fn create_binder(&self, ctx: BinderContext, _delegate: Weak<dyn BinderDelegate>) -> dapmux::Result<Box<dyn Binder>> {
		self.created.fetch_add(1, Ordering::SeqCst);
		info!(
			session = %ctx.session.id,
			workspace_root = ?ctx.workspace_root,
			"binder created"
		);
		Ok(Box::new(SimulationBinder {
			session: ctx.session.id,
			disposed: Arc::clone(&self.disposed),
		}))
	}
}

struct Simulation {
	host: Arc<LoopbackHost>,
	manager: Arc<SessionManager>,
	forest: TargetForest,
	pending: Vec<(TargetId, Acquisition)>,
	outcomes: Vec<AcquireOutcome>,
	settle_timeout: Duration,
}

impl Simulation {
	fn target(&self, id: &TargetId) -> Result<TargetRef> {
		let target: TargetRef = self.forest.get(id).with_context(|| format!("unknown target {id}"))?;
		Ok(target)
	}

	/// Live session materialized for `target`, if any.
	fn session_for(&self, target: &TargetId) -> Option<DebugSessionId> {
		self.manager
			.sessions()
			.into_iter()
			.find(|session| session.record().pending_target() == Some(target) && !session.is_disposed())
			.map(|session| session.id().clone())
	}

	async fn step(&mut self, step: Step) -> Result<()> {
		debug!(?step, "running step");
		match step {
			Step::Acquire { target } => {
				let handle = self.target(&target)?;
				let manager = Arc::clone(&self.manager);
				self.pending.push((target, tokio::spawn(async move { manager.acquire_dap(handle).await })));
			}
			Step::Release { target } => {
				let handle = self.target(&target)?;
				self.manager.release_dap(&handle);
			}
			Step::Rename { target, name } => {
				let handle = self.forest.get(&target).with_context(|| format!("unknown target {target}"))?;
				handle.rename(&name);
			}
			Step::Terminate { target } => match self.session_for(&target) {
				Some(session) => self.host.terminate(&session),
				None => info!(target_id = %target, "no live session to terminate"),
			},
			Step::SetVersion { version } => self.host.set_version(version),
			Step::Flush => {
				let flushed = self.host.flush();
				debug!(flushed, "flushed deferred starts");
			}
			Step::Settle => self.settle().await,
			Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(ms)).await,
		}
		Ok(())
	}

	/// Waits for every outstanding acquire, sharing one deadline.
	async fn settle(&mut self) {
		let deadline = tokio::time::Instant::now() + self.settle_timeout;
		for (target, mut handle) in std::mem::take(&mut self.pending) {
			let outcome = match tokio::time::timeout_at(deadline, &mut handle).await {
				Ok(Ok(Ok(connection))) => Ok(connection.id()),
				Ok(Ok(Err(err))) => Err(err.to_string()),
				Ok(Err(join)) => Err(join.to_string()),
				Err(_) => {
					handle.abort();
					Err("timed out waiting for the session".to_string())
				}
			};
			self.outcomes.push(AcquireOutcome {
				target,
				ok: outcome.is_ok(),
				connection: outcome.as_ref().ok().copied(),
				error: outcome.err(),
			});
		}
	}

	fn report(self, root_session: DebugSessionId, binders: &SimulationBinders) -> SimulationReport {
		let mut sessions: Vec<SessionSummary> = self
			.manager
			.sessions()
			.into_iter()
			.map(|session| SessionSummary {
				id: session.id().clone(),
				name: session.record().name.clone(),
				parent: session.record().parent_session.clone(),
				target: session.record().pending_target().cloned(),
				root: session.is_root(),
			})
			.collect();
		sessions.sort_by_key(|s| session_ordinal(&s.id));

		SimulationReport {
			host_version: self.host.version(),
			root_session,
			acquisitions: self.outcomes,
			sessions,
			registry: self.manager.snapshot(),
			binders_created: binders.created.load(Ordering::SeqCst),
			binders_disposed: binders.disposed.load(Ordering::SeqCst),
			events: self.host.events(),
		}
	}
}

/// Loopback session ids are `session-<n>`; sort numerically.
fn session_ordinal(id: &DebugSessionId) -> (u64, String) {
	let n = id
		.as_str()
		.rsplit('-')
		.next()
		.and_then(|n| n.parse().ok())
		.unwrap_or(u64::MAX);
	(n, id.to_string())
}

pub async fn run(args: SimulateArgs) -> Result<SimulationReport> {
	let scenario = Scenario::load(&args.scenario)?;
	let version = args.host_version.clone().unwrap_or_else(|| scenario.host_version.clone());

	let host = Arc::new(LoopbackHost::new(version));
	host.set_deferred(args.deferred || scenario.deferred);
	host.set_connect_clients(true);

	let binders = Arc::new(SimulationBinders::default());
	let manager = SessionManager::new(host.clone(), binders.clone(), scenario.config.clone()).context("failed to start session manager")?;

	let root = host
		.launch_root(
			SessionConfiguration::launch(&scenario.config.debug_type, &scenario.root.name),
			scenario.root.folder(),
		)
		.context("failed to launch root session")?;
	info!(session = %root, targets = scenario.targets.len(), "root session started");

	let mut simulation = Simulation {
		host,
		manager: Arc::clone(&manager),
		forest: scenario.build_targets(&root),
		pending: Vec::new(),
		outcomes: Vec::new(),
		settle_timeout: Duration::from_millis(args.settle_timeout_ms),
	};

	for step in scenario.steps() {
		simulation.step(step).await?;
		tokio::task::yield_now().await;
	}
	simulation.settle().await;
	tokio::time::sleep(QUIESCE).await;

	let report = simulation.report(root, &binders);
	manager.dispose();
	Ok(report)
}

fn describe_nesting(nesting: &Option<SessionNesting>) -> String {
	match nesting {
		Some(SessionNesting::Hierarchy(options)) => format!("under {}, merged console", options.parent_session),
		Some(SessionNesting::Parent { parent_session }) => format!("under {parent_session}"),
		None => "root".to_string(),
	}
}

impl TextRender for SimulationReport {
	fn render_text(&self, out: &mut dyn Write) -> io::Result<()> {
		writeln!(out, "{} host {}, root session {}", "Simulated".bold(), self.host_version, self.root_session)?;

		writeln!(out, "\n{}", "Acquisitions".bold())?;
		for outcome in &self.acquisitions {
			match (&outcome.connection, &outcome.error) {
				(Some(connection), _) => writeln!(out, "  {} {} -> connection {connection}", "ok".green(), outcome.target)?,
				(None, Some(error)) => writeln!(out, "  {} {}: {error}", "failed".red(), outcome.target)?,
				(None, None) => writeln!(out, "  {} {}", "failed".red(), outcome.target)?,
			}
		}

		writeln!(out, "\n{}", "Sessions".bold())?;
		for session in &self.sessions {
			let role = match (&session.target, session.root) {
				(_, true) => "root".to_string(),
				(Some(target), false) => format!("target {target}"),
				(None, false) => "detached".to_string(),
			};
			writeln!(out, "  {}  {}  ({role})", session.id.as_str().cyan(), session.name)?;
		}

		writeln!(out, "\n{}", "Host events".bold())?;
		for event in &self.events {
			let line = match event {
				HostEvent::StartDebugging {
					session,
					configuration,
					nesting,
				} => format!("start {session} \"{}\" {}", configuration.name, describe_nesting(nesting)),
				HostEvent::DescriptorCreated { session, address } => format!("descriptor {session} at {address}"),
				HostEvent::DescriptorFailed { session, error } => format!("descriptor {session} failed: {error}"),
				HostEvent::Renamed { session, name } => format!("rename {session} to \"{name}\""),
				HostEvent::Terminated { session } => format!("terminate {session}"),
			};
			writeln!(out, "  {line}")?;
		}

		writeln!(
			out,
			"\nRegistry: {} sessions, {} pending, {} in flight, {} waiting; binders {} created, {} disposed",
			self.registry.sessions,
			self.registry.pending_targets,
			self.registry.in_flight,
			self.registry.callbacks,
			self.binders_created,
			self.binders_disposed
		)
	}
}
