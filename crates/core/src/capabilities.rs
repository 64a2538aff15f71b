//! Host capabilities derived from the host version.
//!
//! Capabilities are resolved from the version the host reports at the time
//! of each session start and passed along explicitly, so a host that upgrades
//! while the process runs is picked up on the next start.

use dapmux_protocol::{ConsoleMode, DebugSessionId, SessionNesting, StartOptions};

/// First host version that accepts hierarchical start options.
pub const SESSION_HIERARCHY_MIN_VERSION: &str = "1.49.0-insider";

/// First host version whose debug sessions can be renamed.
pub const SESSION_RENAME_MIN_VERSION: &str = "1.46.0-insider";

/// What the host can do, as far as session orchestration cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostCapabilities {
	/// Start options with parent session and console merging.
	pub session_hierarchy: bool,
	/// Renaming a running debug session.
	pub session_rename: bool,
}

impl HostCapabilities {
	/// Resolves capabilities from a semver host version string.
	///
	/// Unparseable versions resolve to no capabilities.
	pub fn resolve(version: &str) -> Self {
		Self {
			session_hierarchy: version_satisfies_min(version, SESSION_HIERARCHY_MIN_VERSION),
			session_rename: version_satisfies_min(version, SESSION_RENAME_MIN_VERSION),
		}
	}

	/// How to nest a new session under `parent` on this host.
	pub fn nesting(&self, parent: DebugSessionId) -> SessionNesting {
		if self.session_hierarchy {
			SessionNesting::Hierarchy(StartOptions {
				parent_session: parent,
				console_mode: ConsoleMode::MergeWithParent,
			})
		} else {
			SessionNesting::Parent { parent_session: parent }
		}
	}
}

/// Returns `true` if `version` >= `min_version`. Non-parseable versions return `false`.
fn version_satisfies_min(version: &str, min_version: &str) -> bool {
	match (semver::Version::parse(version.trim()), semver::Version::parse(min_version)) {
		(Ok(v), Ok(m)) => v >= m,
		_ => false,
	}
}
