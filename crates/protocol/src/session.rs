//! Debug session records and start configurations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::types::{DebugSessionId, TargetId};

/// Configuration key carrying the pending-target marker.
pub const PENDING_TARGET_KEY: &str = "__pendingTargetId";

/// Kind of debug request a configuration describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
	/// Start a new debuggee.
	Launch,
	/// Attach to something that already runs.
	Attach,
}

/// Launch configuration as the host sees it.
///
/// Unknown keys are preserved in [`extra`](Self::extra) so configurations
/// authored by users round-trip untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfiguration {
	/// Debugger type the host routes the session to (e.g. `"pwa-node"`).
	#[serde(rename = "type")]
	pub debug_type: String,
	/// Display name of the session.
	pub name: String,
	/// Launch or attach.
	pub request: RequestKind,
	/// Target this session was started for, when started by the session core.
	#[serde(rename = "__pendingTargetId", default, skip_serializing_if = "Option::is_none")]
	pub pending_target_id: Option<TargetId>,
	/// All remaining configuration keys.
	#[serde(flatten)]
	pub extra: Map<String, Value>,
}

impl SessionConfiguration {
	/// Builds the attach configuration used to materialize a session for `target`.
	pub fn attach(debug_type: impl Into<String>, name: impl Into<String>, target: TargetId) -> Self {
		Self {
			debug_type: debug_type.into(),
			name: name.into(),
			request: RequestKind::Attach,
			pending_target_id: Some(target),
			extra: Map::new(),
		}
	}

	/// Builds a plain launch configuration, as a user would author one.
	pub fn launch(debug_type: impl Into<String>, name: impl Into<String>) -> Self {
		Self {
			debug_type: debug_type.into(),
			name: name.into(),
			request: RequestKind::Launch,
			pending_target_id: None,
			extra: Map::new(),
		}
	}
}

/// Workspace folder a session was started in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFolder {
	/// Folder URI; only `file:` URIs map to a local path.
	pub uri: Url,
	/// Display name.
	pub name: String,
}

impl WorkspaceFolder {
	/// Returns the local filesystem path if the folder uses the `file:` scheme.
	pub fn local_path(&self) -> Option<PathBuf> {
		if self.uri.scheme() != "file" {
			return None;
		}
		self.uri.to_file_path().ok()
	}
}

/// Everything the host knows about a debug session it is starting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSessionRecord {
	/// Host-assigned identity.
	pub id: DebugSessionId,
	/// Display name at creation time.
	pub name: String,
	/// Configuration the session was started with.
	pub configuration: SessionConfiguration,
	/// Workspace folder, when the host has one for this session.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub workspace_folder: Option<WorkspaceFolder>,
	/// Parent session, when nested.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_session: Option<DebugSessionId>,
}

impl DebugSessionRecord {
	/// Returns the pending-target marker carried by the configuration, if any.
	pub fn pending_target(&self) -> Option<&TargetId> {
		self.configuration.pending_target_id.as_ref()
	}
}

/// Console placement for a nested session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsoleMode {
	/// The child gets its own debug console.
	#[default]
	Separate,
	/// The child writes into its parent's debug console.
	MergeWithParent,
}

/// Options for hosts that understand session hierarchies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOptions {
	/// Session the new one is nested under.
	pub parent_session: DebugSessionId,
	/// Where the child's console output goes.
	pub console_mode: ConsoleMode,
}

/// How a new session is nested under its parent when it is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SessionNesting {
	/// Full hierarchy support with console merging.
	Hierarchy(StartOptions),
	/// Plain parent-session argument, for older hosts.
	#[serde(rename_all = "camelCase")]
	Parent {
		/// Session the new one is nested under.
		parent_session: DebugSessionId,
	},
}

impl SessionNesting {
	/// Returns the parent session regardless of nesting style.
	pub fn parent(&self) -> &DebugSessionId {
		match self {
			SessionNesting::Hierarchy(options) => &options.parent_session,
			SessionNesting::Parent { parent_session } => parent_session,
		}
	}
}
