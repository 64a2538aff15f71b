//! Boundary to the debugging host.
//!
//! The host owns the user-visible debug sessions. The session core registers a
//! [`DescriptorFactory`] with it, asks it to start attach sessions, and listens
//! for termination notifications.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use dapmux_protocol::{DebugSessionId, DebugSessionRecord, DescriptorAddress, SessionConfiguration, SessionNesting, WorkspaceFolder};
use tokio::sync::broadcast;

use crate::error::Result;
use crate::subscription::Subscription;

/// Provider the host calls whenever it starts a debug session.
///
/// Called synchronously from the host's point of view: the returned address
/// must already accept connections.
pub trait DescriptorFactory: Send + Sync {
	/// Materializes a session for `record` and returns where to connect.
	fn create_debug_adapter_descriptor(&self, record: &DebugSessionRecord) -> Result<DescriptorAddress>;
}

/// Debugging host operations used by the session core.
#[async_trait]
pub trait DebugHost: Send + Sync {
	/// Host version, as a semver string.
	fn version(&self) -> String;

	/// Registers `factory` for sessions of `debug_type`.
	///
	/// Dropping the returned subscription unregisters it.
	fn register_descriptor_factory(&self, debug_type: &str, factory: Arc<dyn DescriptorFactory>) -> Subscription;

	/// Stream of terminated host session ids.
	fn subscribe_terminations(&self) -> broadcast::Receiver<DebugSessionId>;

	/// Starts a debug session.
	///
	/// Resolves to `false` when the host declined to start it. The descriptor
	/// factory may be invoked before or after this resolves.
	async fn start_debugging(
		&self,
		folder: Option<WorkspaceFolder>,
		configuration: SessionConfiguration,
		nesting: SessionNesting,
	) -> Result<bool>;

	/// Changes the display name of a running session.
	fn rename_session(&self, id: &DebugSessionId, name: &str);

	/// Ambient workspace root, if the host has one open.
	fn workspace_root(&self) -> Option<PathBuf> {
		None
	}
}
