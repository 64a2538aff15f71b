//! Error types for session orchestration.

use std::sync::Arc;

use dapmux_protocol::{DebugSessionId, TargetId};
use thiserror::Error;

/// Result type alias for session orchestration.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while creating, binding, or tearing down sessions.
///
/// `Clone` because one failure may be observed by every caller sharing a
/// single-flight future.
#[derive(Debug, Clone, Error)]
pub enum Error {
	/// The target disappeared before its session was materialized.
	#[error("Target {target} went away before its session was ready")]
	TargetGone { target: TargetId },

	/// The host materialized a session for a marker nobody registered.
	#[error("Invariant violation: no pending target registered for marker {0}")]
	UnknownPendingTarget(TargetId),

	/// A root target points at an origin session that is not registered.
	#[error("Invariant violation: origin session {origin} of target {target} is not registered")]
	MissingOriginSession { target: TargetId, origin: DebugSessionId },

	/// `create_binder` and `listen_to_target` were mixed on one session.
	#[error("Session {session} is already bound as {role}")]
	SessionAlreadyBound { session: DebugSessionId, role: &'static str },

	/// The host declined to start the attach session for a target.
	#[error("Host refused to start a session for target {target}")]
	StartRefused { target: TargetId },

	/// The host reported a failure.
	#[error("Host error: {0}")]
	Host(String),

	/// The binder factory failed to build a binder.
	#[error("Binder error: {0}")]
	Binder(String),

	/// The session manager has been disposed.
	#[error("Session manager disposed")]
	Disposed,

	/// Transport or connection failure.
	#[error(transparent)]
	Runtime(Arc<dapmux_runtime::Error>),
}

impl From<dapmux_runtime::Error> for Error {
	fn from(err: dapmux_runtime::Error) -> Self {
		Error::Runtime(Arc::new(err))
	}
}

impl Error {
	/// Returns true if the failure means the target is gone.
	pub fn is_target_gone(&self) -> bool {
		matches!(self, Error::TargetGone { .. })
	}

	/// Returns true for internal invariant violations.
	///
	/// These are programming errors; callers should not retry.
	pub fn is_invariant_violation(&self) -> bool {
		matches!(self, Error::UnknownPendingTarget(_) | Error::MissingOriginSession { .. })
	}
}
