//! Remote store boundary
//!
//! Typed CRUD over the four remote collections (plus the read-only profile
//! lookup). Every operation is single-shot and non-retrying; retry policy
//! belongs to the caller. Implementations hold no replica state and never
//! touch it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
	Invite, Item, ItemPatch, List, Membership, NewInvite, NewItem, NewList, NewMembership, Profile,
};
use crate::error::Result;

/// Client for the remote store's collections.
///
/// Failures come back already classified as [`crate::error::SyncError`]:
/// `NotAuthenticated` (fatal upstream), `NotFound`, or `Remote`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
	// -- lists ---------------------------------------------------------

	/// Create a list; returns the persisted record with server-assigned id
	/// and timestamps
	async fn create_list(&self, new: NewList) -> Result<List>;

	/// Rename a list, stamping the given `updated_at`
	async fn rename_list(&self, id: Uuid, name: String, updated_at: DateTime<Utc>) -> Result<()>;

	async fn delete_list(&self, id: Uuid) -> Result<()>;

	async fn fetch_list(&self, id: Uuid) -> Result<List>;

	/// Lists owned by a user, ordered by created_at descending
	async fn lists_owned_by(&self, owner_id: Uuid) -> Result<Vec<List>>;

	/// Lists by id set (shared lists resolved from memberships), ordered by
	/// created_at descending
	async fn lists_by_ids(&self, ids: &[Uuid]) -> Result<Vec<List>>;

	// -- items ---------------------------------------------------------

	/// Items of a list, ordered by category sort order then name
	async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<Item>>;

	async fn fetch_item(&self, id: Uuid) -> Result<Item>;

	/// Create an item; returns the persisted record with server-assigned id
	/// and timestamps
	async fn create_item(&self, new: NewItem) -> Result<Item>;

	/// Partially update an item, stamping the given `updated_at`
	async fn update_item(&self, id: Uuid, patch: ItemPatch, updated_at: DateTime<Utc>)
		-> Result<()>;

	async fn delete_item(&self, id: Uuid) -> Result<()>;

	/// Delete every checked item of a list in one call
	async fn delete_checked_items(&self, list_id: Uuid) -> Result<()>;

	// -- memberships ---------------------------------------------------

	async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>>;

	async fn memberships_for_list(&self, list_id: Uuid) -> Result<Vec<Membership>>;

	async fn create_membership(&self, new: NewMembership) -> Result<Membership>;

	async fn delete_membership(&self, id: Uuid) -> Result<()>;

	/// Delete the membership row for (list_id, user_id), used by "leave"
	async fn delete_membership_for(&self, list_id: Uuid, user_id: Uuid) -> Result<()>;

	// -- invites -------------------------------------------------------

	/// Create an invite; the code is server-assigned
	async fn create_invite(&self, new: NewInvite) -> Result<Invite>;

	/// Look up an invite by its code; `None` when no such code exists
	async fn invite_by_code(&self, code: &str) -> Result<Option<Invite>>;

	// -- profiles ------------------------------------------------------

	/// Resolve an email address to a profile; `None` when unknown
	async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>>;
}
