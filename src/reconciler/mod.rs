//! Reconciler - merges local mutations, remote responses and feed events
//! into the replica
//!
//! Every local mutation applies to the replica immediately (optimistic),
//! records a pending entry, then issues the remote call. Success clears the
//! pending entry; failure rolls back the optimistic change and surfaces the
//! error. Feed events merge through the replica's idempotent, stale-write-
//! rejecting upserts, so an event that merely echoes a still-pending local
//! mutation is harmless.
//!
//! Conflict rule: among candidate states for one entity id the strictly
//! greater `updated_at` wins; equal timestamps are idempotent repeats. The
//! update-returning remote calls carry no record back, so the only
//! server-confirmed states flowing in are create responses and feed events,
//! both merged under the same rule.

pub mod pending;

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
	CategoryClassifier, Item, ItemPatch, List, NewItem, NewList,
};
use crate::error::{Result, SyncError};
use crate::events::{EngineEvent, EventBus};
use crate::feed::{ItemEvent, ListEvent, SyncUpdate};
use crate::remote::RemoteStore;
use crate::replica::Replica;

use pending::{MutationKind, MutationTicket, PendingTable};

/// Merges all sources of change into the replica under one set of rules
pub struct Reconciler {
	remote: Arc<dyn RemoteStore>,
	replica: Arc<RwLock<Replica>>,
	classifier: Arc<dyn CategoryClassifier>,
	events: Arc<EventBus>,

	/// Per-entity serialization point for in-flight mutations
	pending: StdMutex<PendingTable>,
}

impl Reconciler {
	pub fn new(
		remote: Arc<dyn RemoteStore>,
		replica: Arc<RwLock<Replica>>,
		classifier: Arc<dyn CategoryClassifier>,
		events: Arc<EventBus>,
	) -> Self {
		Self {
			remote,
			replica,
			classifier,
			events,
			pending: StdMutex::new(PendingTable::default()),
		}
	}

	fn begin(&self, entity_id: Uuid, kind: MutationKind) -> MutationTicket {
		self.pending
			.lock()
			.expect("pending table lock poisoned")
			.begin(entity_id, kind)
	}

	/// Returns false when the ticket was superseded (no rollback allowed)
	fn settle(&self, ticket: MutationTicket) -> bool {
		self.pending
			.lock()
			.expect("pending table lock poisoned")
			.settle(ticket)
	}

	fn pending_ids(&self) -> std::collections::HashSet<Uuid> {
		self.pending
			.lock()
			.expect("pending table lock poisoned")
			.pending_ids()
	}

	pub fn pending_count(&self) -> usize {
		self.pending
			.lock()
			.expect("pending table lock poisoned")
			.len()
	}

	/// Drop all pending entries (sign-out, fatal teardown)
	pub fn clear_pending(&self) {
		self.pending
			.lock()
			.expect("pending table lock poisoned")
			.clear();
	}

	async fn current_user(&self) -> Result<Uuid> {
		self.replica
			.read()
			.await
			.current_user()
			.ok_or(SyncError::NotAuthenticated)
	}

	fn fail(&self, entity_id: Uuid, error: SyncError) -> SyncError {
		self.events.emit(EngineEvent::MutationFailed {
			entity_id,
			error: error.clone(),
		});
		error
	}

	fn changed(&self) {
		self.events.emit(EngineEvent::ReplicaChanged);
	}

	// -- local mutation paths: lists -----------------------------------

	/// Create a list optimistically under a client-generated placeholder
	/// id; the authoritative server record replaces it once the create
	/// call returns. Returns the server-assigned list id.
	pub async fn create_list(&self, name: &str) -> Result<Uuid> {
		let owner_id = self.current_user().await?;
		let name = name.trim().to_string();
		let now = Utc::now();
		let placeholder_id = Uuid::new_v4();

		{
			let mut replica = self.replica.write().await;
			replica.upsert_list(List::new_local(placeholder_id, owner_id, name.clone(), now));
		}
		let ticket = self.begin(placeholder_id, MutationKind::Create);
		self.changed();

		match self.remote.create_list(NewList { owner_id, name }).await {
			Ok(server_list) => {
				let server_id = server_list.id;
				{
					let mut replica = self.replica.write().await;
					// No remote event can reference the placeholder id;
					// swap it for the server identity. A faster feed echo
					// of the same row merges idempotently.
					replica.remove_list(placeholder_id);
					replica.upsert_list(server_list);
				}
				self.settle(ticket);
				self.changed();
				info!(list_id = %server_id, "list created");
				Ok(server_id)
			}
			Err(e) => {
				self.replica.write().await.remove_list(placeholder_id);
				self.settle(ticket);
				self.changed();
				Err(self.fail(placeholder_id, e))
			}
		}
	}

	/// Rename a list optimistically
	pub async fn rename_list(&self, list_id: Uuid, name: &str) -> Result<()> {
		let snapshot = self
			.replica
			.read()
			.await
			.get_list(list_id)
			.cloned()
			.ok_or_else(|| SyncError::NotFound("list".into()))?;

		let name = name.trim().to_string();
		let now = Utc::now();
		{
			let mut updated = snapshot.clone();
			updated.name = name.clone();
			updated.updated_at = now;
			self.replica.write().await.upsert_list(updated);
		}
		let ticket = self.begin(list_id, MutationKind::Update);
		self.changed();

		match self.remote.rename_list(list_id, name, now).await {
			Ok(()) => {
				self.settle(ticket);
				Ok(())
			}
			Err(e) => {
				if self.settle(ticket) && !e.is_fatal() {
					self.replica.write().await.restore_list(snapshot, now);
					self.changed();
				}
				Err(self.fail(list_id, e))
			}
		}
	}

	/// Delete a list optimistically; rollback re-fetches the list instead
	/// of reinserting the stale pre-delete snapshot
	pub async fn delete_list(&self, list_id: Uuid) -> Result<()> {
		let snapshot = self
			.replica
			.read()
			.await
			.get_list(list_id)
			.cloned()
			.ok_or_else(|| SyncError::NotFound("list".into()))?;
		let item_snapshots = self.replica.read().await.items_of(list_id);

		self.replica.write().await.remove_list(list_id);
		let ticket = self.begin(list_id, MutationKind::Delete);
		self.changed();

		match self.remote.delete_list(list_id).await {
			Ok(()) => {
				self.settle(ticket);
				info!(%list_id, "list deleted");
				Ok(())
			}
			Err(e) => {
				if self.settle(ticket) && !e.is_fatal() {
					self.rollback_list_delete(snapshot, item_snapshots).await;
					self.changed();
				}
				Err(self.fail(list_id, e))
			}
		}
	}

	/// A concurrent remote update may have changed the list between the
	/// local delete and this rollback, so prefer the server's current
	/// state over the pre-delete snapshot.
	async fn rollback_list_delete(&self, snapshot: List, items: Vec<Item>) {
		let list_id = snapshot.id;
		match self.remote.fetch_list(list_id).await {
			Ok(current) => {
				let mut replica = self.replica.write().await;
				replica.upsert_list(current);
				replica.grant_visibility(list_id);
				for item in items {
					replica.reinsert_item(item);
				}
			}
			Err(SyncError::NotFound(_)) => {
				// The delete went through elsewhere; stay removed
				debug!(%list_id, "delete rollback: list is gone remotely");
			}
			Err(e) => {
				warn!(%list_id, error = %e, "delete rollback re-fetch failed, restoring snapshot");
				let mut replica = self.replica.write().await;
				replica.reinsert_list(snapshot);
				for item in items {
					replica.reinsert_item(item);
				}
			}
		}
	}

	// -- local mutation paths: items -----------------------------------

	/// Add an item: classify its category (creation-time only), insert an
	/// optimistic placeholder, then swap in the server record. Returns the
	/// server-assigned item id.
	pub async fn add_item(
		&self,
		list_id: Uuid,
		name: &str,
		quantity: u32,
		unit: Option<String>,
	) -> Result<Uuid> {
		let added_by = self.current_user().await?;
		let name = name.trim().to_string();
		let quantity = quantity.max(1);
		let category = self.classifier.classify(&name);
		let now = Utc::now();
		let placeholder_id = Uuid::new_v4();

		let placeholder = Item {
			id: placeholder_id,
			list_id,
			name: name.clone(),
			quantity,
			unit: unit.clone(),
			is_checked: false,
			category_name: Some(category.name.clone()),
			category_icon: Some(category.icon.clone()),
			category_sort_order: category.sort_order,
			added_by: Some(added_by),
			created_at: now,
			updated_at: now,
		};

		self.replica.write().await.upsert_item(placeholder);
		let ticket = self.begin(placeholder_id, MutationKind::Create);
		self.changed();

		let new_item = NewItem {
			list_id,
			name,
			quantity,
			unit,
			is_checked: false,
			category_name: Some(category.name),
			category_icon: Some(category.icon),
			category_sort_order: category.sort_order,
			added_by: Some(added_by),
		};

		match self.remote.create_item(new_item).await {
			Ok(server_item) => {
				let server_id = server_item.id;
				{
					let mut replica = self.replica.write().await;
					replica.remove_item(placeholder_id);
					replica.upsert_item(server_item);
				}
				self.settle(ticket);
				self.changed();
				Ok(server_id)
			}
			Err(e) => {
				self.replica.write().await.remove_item(placeholder_id);
				self.settle(ticket);
				self.changed();
				Err(self.fail(placeholder_id, e))
			}
		}
	}

	/// Flip an item's checked flag optimistically. Returns the new state.
	pub async fn toggle_item(&self, item_id: Uuid) -> Result<bool> {
		let snapshot = self
			.replica
			.read()
			.await
			.get_item(item_id)
			.cloned()
			.ok_or_else(|| SyncError::NotFound("item".into()))?;

		let is_checked = !snapshot.is_checked;
		let now = Utc::now();
		{
			let mut toggled = snapshot.clone();
			toggled.is_checked = is_checked;
			toggled.updated_at = now;
			self.replica.write().await.upsert_item(toggled);
		}
		let ticket = self.begin(item_id, MutationKind::Update);
		self.changed();

		match self
			.remote
			.update_item(item_id, ItemPatch::toggle(is_checked), now)
			.await
		{
			Ok(()) => {
				self.settle(ticket);
				Ok(is_checked)
			}
			Err(e) => {
				if self.settle(ticket) && !e.is_fatal() {
					// visible un-toggle on failure
					self.replica.write().await.restore_item(snapshot, now);
					self.changed();
				}
				Err(self.fail(item_id, e))
			}
		}
	}

	/// Apply a partial update (name/quantity/unit/checked) optimistically
	pub async fn update_item(&self, item_id: Uuid, patch: ItemPatch) -> Result<()> {
		let snapshot = self
			.replica
			.read()
			.await
			.get_item(item_id)
			.cloned()
			.ok_or_else(|| SyncError::NotFound("item".into()))?;

		let now = Utc::now();
		{
			let mut updated = snapshot.clone();
			patch.clone().apply(&mut updated, now);
			self.replica.write().await.upsert_item(updated);
		}
		let ticket = self.begin(item_id, MutationKind::Update);
		self.changed();

		match self.remote.update_item(item_id, patch, now).await {
			Ok(()) => {
				self.settle(ticket);
				Ok(())
			}
			Err(e) => {
				if self.settle(ticket) && !e.is_fatal() {
					self.replica.write().await.restore_item(snapshot, now);
					self.changed();
				}
				Err(self.fail(item_id, e))
			}
		}
	}

	/// Delete an item optimistically; rollback re-fetches the entity
	/// rather than reinserting the stale pre-delete snapshot
	pub async fn delete_item(&self, item_id: Uuid) -> Result<()> {
		let snapshot = self
			.replica
			.read()
			.await
			.get_item(item_id)
			.cloned()
			.ok_or_else(|| SyncError::NotFound("item".into()))?;

		self.replica.write().await.remove_item(item_id);
		let ticket = self.begin(item_id, MutationKind::Delete);
		self.changed();

		match self.remote.delete_item(item_id).await {
			Ok(()) => {
				self.settle(ticket);
				Ok(())
			}
			Err(e) => {
				if self.settle(ticket) && !e.is_fatal() {
					self.rollback_item_delete(snapshot).await;
					self.changed();
				}
				Err(self.fail(item_id, e))
			}
		}
	}

	async fn rollback_item_delete(&self, snapshot: Item) {
		let item_id = snapshot.id;
		match self.remote.fetch_item(item_id).await {
			Ok(current) => {
				self.replica.write().await.upsert_item(current);
			}
			Err(SyncError::NotFound(_)) => {
				debug!(%item_id, "delete rollback: item is gone remotely");
			}
			Err(e) => {
				warn!(%item_id, error = %e, "delete rollback re-fetch failed, restoring snapshot");
				self.replica.write().await.reinsert_item(snapshot);
			}
		}
	}

	/// Remove every checked item of a list in one optimistic sweep; on
	/// failure the list's items are re-fetched wholesale. Returns how many
	/// items were cleared.
	pub async fn clear_checked_items(&self, list_id: Uuid) -> Result<usize> {
		let snapshots: Vec<Item> = {
			let replica = self.replica.read().await;
			replica
				.checked_item_ids(list_id)
				.into_iter()
				.filter_map(|id| replica.get_item(id).cloned())
				.collect()
		};
		if snapshots.is_empty() {
			return Ok(0);
		}

		let tickets: Vec<MutationTicket> = {
			let mut replica = self.replica.write().await;
			snapshots
				.iter()
				.map(|item| {
					replica.remove_item(item.id);
					self.begin(item.id, MutationKind::Delete)
				})
				.collect()
		};
		self.changed();

		match self.remote.delete_checked_items(list_id).await {
			Ok(()) => {
				for ticket in tickets {
					self.settle(ticket);
				}
				info!(%list_id, cleared = snapshots.len(), "checked items cleared");
				Ok(snapshots.len())
			}
			Err(e) => {
				for ticket in tickets {
					self.settle(ticket);
				}
				if !e.is_fatal() {
					match self.remote.items_for_list(list_id).await {
						Ok(items) => {
							let mut replica = self.replica.write().await;
							for item in items {
								replica.upsert_item(item);
							}
						}
						Err(fetch_err) => {
							warn!(%list_id, error = %fetch_err,
								"clear-checked rollback re-fetch failed, restoring snapshots");
							let mut replica = self.replica.write().await;
							for item in snapshots {
								replica.reinsert_item(item);
							}
						}
					}
					self.changed();
				}
				Err(self.fail(list_id, e))
			}
		}
	}

	// -- remote event path ---------------------------------------------

	/// Merge one decoded feed event into the replica
	pub async fn apply_update(&self, update: SyncUpdate) {
		match update {
			SyncUpdate::Item(event) => self.apply_item_event(event).await,
			SyncUpdate::List(event) => self.apply_list_event(event).await,
		}
	}

	async fn apply_item_event(&self, event: ItemEvent) {
		let changed = match event {
			ItemEvent::Inserted(item) | ItemEvent::Updated(item) => {
				// An echo of a still-pending local mutation either matches
				// (idempotent) or carries newer state (accepted); the
				// pending entry stays until its own call settles.
				self.replica.write().await.upsert_item(item)
			}
			ItemEvent::Deleted(deletion) => {
				self.replica.write().await.remove_item(deletion.item_id())
			}
		};
		if changed {
			self.changed();
		}
	}

	async fn apply_list_event(&self, event: ListEvent) {
		let changed = match event {
			ListEvent::Inserted(list) | ListEvent::Updated(list) => {
				self.replica.write().await.upsert_list(list)
			}
			ListEvent::Deleted { list_id } => self.replica.write().await.remove_list(list_id),
		};
		if changed {
			self.changed();
		}
	}

	// -- full re-fetch paths -------------------------------------------

	/// Rebuild the visible list set from the remote store: lists owned by
	/// the current user plus lists shared with them via memberships.
	/// Entities with in-flight mutations survive the sweep.
	pub async fn refresh_lists(&self) -> Result<()> {
		let user_id = self.current_user().await?;

		let owned = self.remote.lists_owned_by(user_id).await?;
		let memberships = self.remote.memberships_for_user(user_id).await?;

		let owned_ids: std::collections::HashSet<Uuid> =
			owned.iter().map(|list| list.id).collect();
		let shared_ids: Vec<Uuid> = memberships
			.iter()
			.map(|m| m.list_id)
			.filter(|id| !owned_ids.contains(id))
			.collect();

		let shared = if shared_ids.is_empty() {
			Vec::new()
		} else {
			self.remote.lists_by_ids(&shared_ids).await?
		};

		let mut keep: std::collections::HashSet<Uuid> = owned_ids;
		keep.extend(shared.iter().map(|list| list.id));
		keep.extend(self.pending_ids());

		{
			let mut replica = self.replica.write().await;
			for list in owned {
				replica.upsert_list(list);
			}
			for list in shared {
				let id = list.id;
				replica.upsert_list(list);
				// membership confirmed server-side, so the list may show
				replica.grant_visibility(id);
			}
			replica.retain_lists(&keep);
		}
		self.changed();
		Ok(())
	}

	/// Re-fetch the full item set of a list (required after every
	/// (re)subscribe since the feed has no replay)
	pub async fn refresh_items(&self, list_id: Uuid) -> Result<()> {
		let items = self.remote.items_for_list(list_id).await?;

		let mut keep: std::collections::HashSet<Uuid> =
			items.iter().map(|item| item.id).collect();
		keep.extend(self.pending_ids());

		{
			let mut replica = self.replica.write().await;
			for item in items {
				replica.upsert_item(item);
			}
			replica.retain_items(list_id, &keep);
		}
		self.changed();
		Ok(())
	}
}
