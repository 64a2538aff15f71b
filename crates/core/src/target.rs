//! Debuggable targets, as reported by target discovery.

use std::sync::Arc;

use dapmux_protocol::{DebugSessionId, TargetId};
use tokio::sync::broadcast;

/// Shared handle to a target.
pub type TargetRef = Arc<dyn Target>;

/// A debuggable execution context (process, worker, page).
///
/// Targets form a forest through [`parent`](Self::parent). Edges are stable
/// once observed, but a target may vanish at any time.
pub trait Target: Send + Sync {
	/// Stable identity, unique among live targets.
	fn id(&self) -> &TargetId;

	/// Current display name.
	fn name(&self) -> String;

	/// Parent target, or `None` for a root.
	fn parent(&self) -> Option<TargetRef>;

	/// Pre-existing root session a parentless target attaches under.
	fn target_origin(&self) -> DebugSessionId;

	/// Stream of display-name changes, when the name can still change.
	fn subscribe_name_changes(&self) -> Option<broadcast::Receiver<String>> {
		None
	}
}
