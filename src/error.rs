//! Engine-wide error taxonomy

use thiserror::Error;

/// Failures surfaced by sync operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
	/// No signed-in user; fatal to the whole engine
	#[error("not authenticated")]
	NotAuthenticated,

	/// A referenced entity or invite does not exist
	#[error("not found: {0}")]
	NotFound(String),

	/// Invite past its expiry
	#[error("invite has expired")]
	Expired,

	/// Transport or server failure
	#[error("remote store failure: {0}")]
	Remote(String),

	/// Malformed change notification; swallowed at the feed boundary
	#[error("failed to decode change notification: {0}")]
	Decode(String),
}

impl SyncError {
	/// Whether this error must halt the engine rather than roll back a
	/// single mutation
	pub fn is_fatal(&self) -> bool {
		matches!(self, SyncError::NotAuthenticated)
	}
}

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
