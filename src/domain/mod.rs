//! Wire-level data model shared with the remote store
//!
//! All identifiers are opaque UUIDs, stable for the entity's lifetime.
//! Field names match the remote collections' snake_case columns, so the
//! structs (de)serialize against the wire without renames.

pub mod category;
pub mod invite;
pub mod item;
pub mod list;
pub mod membership;
pub mod profile;
pub mod timestamp;

pub use category::{Category, CategoryClassifier, KeywordClassifier};
pub use invite::{Invite, NewInvite};
pub use item::{Item, ItemPatch, NewItem};
pub use list::{List, NewList};
pub use membership::{MemberRole, Membership, NewMembership};
pub use profile::Profile;

/// Three-state optionality for update payloads.
///
/// A PATCH that omits a field (`Keep`) is distinct from one that nulls it
/// (`Clear`); plain `Option` cannot express the difference.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
	/// Leave the stored value untouched
	#[default]
	Keep,
	/// Null out the stored value
	Clear,
	/// Replace the stored value
	Set(T),
}

impl<T> Patch<T> {
	/// Apply this patch to an optional field in place
	pub fn apply_to(self, field: &mut Option<T>) {
		match self {
			Patch::Keep => {}
			Patch::Clear => *field = None,
			Patch::Set(value) => *field = Some(value),
		}
	}

	pub fn is_keep(&self) -> bool {
		matches!(self, Patch::Keep)
	}
}

impl<T> From<Option<T>> for Patch<T> {
	/// `Some` sets, `None` clears. Use `Patch::Keep` directly to omit.
	fn from(value: Option<T>) -> Self {
		match value {
			Some(v) => Patch::Set(v),
			None => Patch::Clear,
		}
	}
}
