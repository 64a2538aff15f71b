//! Contract between sessions and target binders.
//!
//! A binder discovers the targets below a root session. It asks its
//! [`BinderDelegate`] for a protocol connection per discovered target and
//! releases targets that vanish before their session is ready.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dapmux_protocol::DebugSessionRecord;
use dapmux_runtime::Connection;

use crate::error::Result;
use crate::target::TargetRef;

/// Debug adapter whose initialization a delegate may take over.
pub trait DebugAdapter: Send + Sync {
	/// Connection the adapter speaks over.
	fn connection(&self) -> &Arc<Connection>;
}

/// Services a binder needs from whoever owns the sessions.
#[async_trait]
pub trait BinderDelegate: Send + Sync {
	/// Resolves the protocol connection for `target`, creating its session on
	/// first request.
	async fn acquire_dap(&self, target: TargetRef) -> Result<Arc<Connection>>;

	/// Gives up on `target` before its session was materialized.
	///
	/// Waiters on the target fail with a target-gone error. No-op when nothing
	/// is pending.
	fn release_dap(&self, target: &TargetRef);

	/// Returns `true` if the delegate initialized `adapter` itself.
	async fn init_adapter(&self, adapter: &dyn DebugAdapter, target: &TargetRef) -> Result<bool>;
}

/// Discovers targets for one root session.
pub trait Binder: Send + Sync {
	/// Stops discovery and releases launcher resources.
	fn dispose(&self);
}

/// What a binder gets to know about the session it serves.
#[derive(Debug, Clone)]
pub struct BinderContext {
	/// Host record of the root session.
	pub session: DebugSessionRecord,
	/// Resolved workspace root.
	pub workspace_root: Option<PathBuf>,
	/// The root session's protocol connection.
	pub connection: Arc<Connection>,
}

/// Builds binders for root sessions.
///
/// Concrete launchers live behind this seam.
pub trait BinderFactory: Send + Sync {
	/// Creates the binder for a new root session.
	///
	/// The delegate is weak; a binder must not keep its session manager alive.
	fn create_binder(&self, ctx: BinderContext, delegate: Weak<dyn BinderDelegate>) -> Result<Box<dyn Binder>>;
}
