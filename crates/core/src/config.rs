//! Session manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default `type` of attach configurations started for targets.
pub const DEFAULT_DEBUG_TYPE: &str = "pwa-node";

/// Default time a session transport waits for the host to connect.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Tunables for [`SessionManager`](crate::SessionManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagerConfig {
	/// Debugger type put in attach configurations.
	pub debug_type: String,
	/// How long each session transport waits for the host's connection.
	pub connect_timeout_ms: u64,
}

impl Default for ManagerConfig {
	fn default() -> Self {
		Self {
			debug_type: DEFAULT_DEBUG_TYPE.to_string(),
			connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
		}
	}
}

impl ManagerConfig {
	/// Sets the debugger type.
	pub fn with_debug_type(mut self, debug_type: impl Into<String>) -> Self {
		self.debug_type = debug_type.into();
		self
	}

	/// Sets the host connect timeout.
	pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
		self.connect_timeout_ms = timeout.as_millis() as u64;
		self
	}

	/// Host connect timeout as a [`Duration`].
	pub fn connect_timeout(&self) -> Duration {
		Duration::from_millis(self.connect_timeout_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults_fill_missing_fields() {
		let config: ManagerConfig = serde_json::from_str(r#"{"connectTimeoutMs": 250}"#).unwrap();
		assert_eq!(config.debug_type, DEFAULT_DEBUG_TYPE);
		assert_eq!(config.connect_timeout(), Duration::from_millis(250));

		let empty: ManagerConfig = serde_json::from_str("{}").unwrap();
		assert_eq!(empty, ManagerConfig::default());
	}

	#[test]
	fn test_builders() {
		let config = ManagerConfig::default()
			.with_debug_type("node")
			.with_connect_timeout(Duration::from_secs(2));
		assert_eq!(config.debug_type, "node");
		assert_eq!(config.connect_timeout_ms, 2000);
	}
}
