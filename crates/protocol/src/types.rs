//! Identity and address types used across the host boundary.

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			/// Wraps a raw identifier.
			pub fn new(id: impl Into<String>) -> Self {
				Self(id.into())
			}

			/// Returns the identifier as a string slice.
			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(id: &str) -> Self {
				Self(id.to_string())
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self(id)
			}
		}
	};
}

string_id! {
	/// Identity the host assigns to a debug session.
	DebugSessionId
}

string_id! {
	/// Identity of a debuggable target (process, worker, page).
	///
	/// Also used as the pending-target marker carried in attach configurations.
	TargetId
}

/// Address of a session's local transport endpoint.
///
/// Returned to the host from the descriptor factory; the host connects to it
/// exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DescriptorAddress {
	/// Host name or IP literal, always loopback for sessions created locally.
	pub host: String,
	/// TCP port the session transport listens on.
	pub port: u16,
}

impl DescriptorAddress {
	/// Creates an address from its parts.
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self { host: host.into(), port }
	}
}

impl From<SocketAddr> for DescriptorAddress {
	fn from(addr: SocketAddr) -> Self {
		Self {
			host: addr.ip().to_string(),
			port: addr.port(),
		}
	}
}

impl fmt::Display for DescriptorAddress {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.host.contains(':') {
			write!(f, "[{}]:{}", self.host, self.port)
		} else {
			write!(f, "{}:{}", self.host, self.port)
		}
	}
}
