//! Scenario files for `dapmux simulate`.
//!
//! A scenario describes a host, the root session a user starts on it, a
//! forest of targets discovered under that root, and the steps a binder
//! would take against them:
//!
//! ```json
//! {
//!   "hostVersion": "1.90.0",
//!   "root": { "name": "Launch Program", "workspaceFolder": "file:///work/app" },
//!   "targets": [
//!     { "id": "main", "name": "main.js" },
//!     { "id": "worker-1", "parent": "main" }
//!   ],
//!   "steps": [
//!     { "op": "acquire", "target": "worker-1" },
//!     { "op": "rename", "target": "worker-1", "name": "worker (busy)" }
//!   ]
//! }
//! ```
//!
//! Without `steps`, every target is acquired in file order.


use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dapmux::{ManagerConfig, Target, TargetRef};
use dapmux_protocol::{DebugSessionId, TargetId, WorkspaceFolder};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

const NAME_CHANNEL_CAPACITY: usize = 16;

fn default_host_version() -> String {
	"1.90.0".to_string()
}

fn default_root_name() -> String {
	"Launch Program".to_string()
}

/// Problems with a scenario file.
#[derive(Debug, Error)]
pub enum ScenarioError {
	#[error("Failed to read scenario {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Failed to parse scenario {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("Target {0} is declared twice")]
	DuplicateTarget(TargetId),

	#[error("Target {target} names parent {parent}, which is not declared before it")]
	UnknownParent { target: TargetId, parent: TargetId },

	#[error("Step {index} refers to unknown target {target}")]
	UnknownTarget { index: usize, target: TargetId },
}

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
	/// Version the loopback host reports.
	#[serde(default = "default_host_version")]
	pub host_version: String,
	#[serde(default)]
	pub root: RootSpec,
	#[serde(default)]
	pub config: ManagerConfig,
	/// Queue host starts until a `flush` step.
	#[serde(default)]
	pub deferred: bool,
	pub targets: Vec<TargetSpec>,
	#[serde(default)]
	pub steps: Vec<Step>,
}

/// The user-started root session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootSpec {
	#[serde(default = "default_root_name")]
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub workspace_folder: Option<Url>,
}

impl Default for RootSpec {
	fn default() -> Self {
		Self {
			name: default_root_name(),
			workspace_folder: None,
		}
	}
}

impl RootSpec {
	pub fn folder(&self) -> Option<WorkspaceFolder> {
		self.workspace_folder.as_ref().map(|uri| WorkspaceFolder {
			name: uri.path_segments().and_then(|mut s| s.next_back()).unwrap_or_default().to_string(),
			uri: uri.clone(),
		})
	}
}

/// One discovered target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSpec {
	pub id: TargetId,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Parent target; roots attach under the root session.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent: Option<TargetId>,
}

/// What a binder does next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
	/// Request the target's connection without waiting for it.
	Acquire { target: TargetId },
	/// Give up on a target.
	Release { target: TargetId },
	/// Change a target's display name.
	Rename { target: TargetId, name: String },
	/// Have the host end the target's session.
	Terminate { target: TargetId },
	/// Change the host version.
	SetVersion { version: String },
	/// Materialize deferred host starts.
	Flush,
	/// Wait for every outstanding acquire.
	Settle,
	/// Pause.
	Sleep { ms: u64 },
}

impl Step {
	fn target(&self) -> Option<&TargetId> {
		match self {
			Step::Acquire { target } | Step::Release { target } | Step::Rename { target, .. } | Step::Terminate { target } => {
				Some(target)
			}
			_ => None,
		}
	}
}

impl Scenario {
	/// Reads and validates a scenario file.
	pub fn load(path: &Path) -> Result<Self, ScenarioError> {
		let raw = std::fs::read_to_string(path).map_err(|source| ScenarioError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		let scenario: Scenario = serde_json::from_str(&raw).map_err(|source| ScenarioError::Parse {
			path: path.to_path_buf(),
			source,
		})?;
		scenario.validate()?;
		Ok(scenario)
	}

	/// Checks target ids are unique, parents come first, and steps name
	/// declared targets.
	pub fn validate(&self) -> Result<(), ScenarioError> {
		let mut seen: HashSet<TargetId> = HashSet::new();
		for spec in &self.targets {
			if let Some(parent) = spec.parent.as_ref().filter(|parent| !seen.contains(*parent)) {
				return Err(ScenarioError::UnknownParent {
					target: spec.id.clone(),
					parent: parent.clone(),
				});
			}
			if !seen.insert(spec.id.clone()) {
				return Err(ScenarioError::DuplicateTarget(spec.id.clone()));
			}
		}
		for (index, step) in self.steps.iter().enumerate() {
			if let Some(target) = step.target().filter(|target| !seen.contains(*target)) {
				return Err(ScenarioError::UnknownTarget {
					index,
					target: target.clone(),
				});
			}
		}
		Ok(())
	}

	/// Steps to run; acquires every target when none are given.
	pub fn steps(&self) -> Vec<Step> {
		if !self.steps.is_empty() {
			return self.steps.clone();
		}
		self.targets
			.iter()
			.map(|spec| Step::Acquire { target: spec.id.clone() })
			.collect()
	}

	/// Builds the target forest. Parentless targets attach under `origin`.
	pub fn build_targets(&self, origin: &DebugSessionId) -> TargetForest {
		let mut forest = TargetForest::default();
		for spec in &self.targets {
			let parent = spec.parent.as_ref().and_then(|id| forest.get(id)).map(|p| -> TargetRef { p });
			let target = Arc::new(ScenarioTarget {
				id: spec.id.clone(),
				name: Mutex::new(spec.name.clone().unwrap_or_else(|| spec.id.to_string())),
				parent,
				origin: origin.clone(),
				names: broadcast::channel(NAME_CHANNEL_CAPACITY).0,
			});
			forest.targets.insert(spec.id.clone(), target);
		}
		forest
	}
}

/// Targets of a running simulation, by id.
#[derive(Default)]
pub struct TargetForest {
	targets: HashMap<TargetId, Arc<ScenarioTarget>>,
}

impl TargetForest {
	pub fn get(&self, id: &TargetId) -> Option<Arc<ScenarioTarget>> {
		self.targets.get(id).cloned()
	}

	pub fn len(&self) -> usize {
		self.targets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.targets.is_empty()
	}
}

/// Target whose name can be changed by scenario steps.
pub struct ScenarioTarget {
	id: TargetId,
	name: Mutex<String>,
	parent: Option<TargetRef>,
	origin: DebugSessionId,
	names: broadcast::Sender<String>,
}

impl ScenarioTarget {
	pub fn rename(&self, name: &str) {
		*self.name.lock() = name.to_string();
		// Nobody listening is fine: the session may not exist yet.
		let _ = self.names.send(name.to_string());
	}
}

impl Target for ScenarioTarget {
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
