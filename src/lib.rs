//! cartsync-core
//!
//! Client-side synchronization and reconciliation engine for shared
//! shopping lists. The engine owns an in-memory replica driving the UI,
//! applies local mutations optimistically, talks to a remote store, and
//! merges a server-push change feed under idempotence and last-writer-wins
//! rules.
//!
//! There is no ambient global state: a [`SyncEngine`] is explicitly
//! constructed with its remote store, change feed and classifier injected,
//! and is shared by reference with whatever presentation layer consumes it.

pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod feed;
pub mod reconciler;
pub mod remote;
pub mod replica;
pub mod sharing;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::domain::{CategoryClassifier, Item, ItemPatch, List, Membership};
use crate::error::Result;
use crate::events::{EngineEvent, EventBus};
use crate::feed::{ChangeFeed, FeedSlot, FeedTopic, SubscriptionManager, SubscriptionState, SyncUpdate};
use crate::reconciler::Reconciler;
use crate::remote::RemoteStore;
use crate::replica::{ItemGroup, Replica};
use crate::sharing::SharingManager;

pub use error::SyncError;

/// The engine owning replica, reconciler, sharing and feed subscriptions
/// for one user session at a time
pub struct SyncEngine {
	config: EngineConfig,

	remote: Arc<dyn RemoteStore>,

	/// UI-authoritative state; only written by completed reconciliation
	/// steps
	replica: Arc<RwLock<Replica>>,

	/// Merge rules and the pending-mutation table
	reconciler: Arc<Reconciler>,

	/// Invite-code and membership management
	sharing: SharingManager,

	/// Feed subscription lifecycle (one item slot, one list slot)
	subscriptions: Arc<SubscriptionManager>,

	/// Event bus for state-change notifications
	events: Arc<EventBus>,

	/// Producer side of the decoded-update channel the apply loop consumes
	updates_tx: mpsc::Sender<SyncUpdate>,

	/// Which list's item feed is currently held
	active_list: RwLock<Option<Uuid>>,
}

impl SyncEngine {
	/// Wire up an engine from its injected boundaries. The returned engine
	/// is idle until [`SyncEngine::signed_in`] establishes a session.
	pub fn new(
		config: EngineConfig,
		remote: Arc<dyn RemoteStore>,
		feed: Arc<dyn ChangeFeed>,
		classifier: Arc<dyn CategoryClassifier>,
	) -> Arc<Self> {
		info!("Initializing sync engine");

		let events = Arc::new(EventBus::new(config.event_bus_capacity));
		let replica = Arc::new(RwLock::new(Replica::new()));
		let reconciler = Arc::new(Reconciler::new(
			remote.clone(),
			replica.clone(),
			classifier,
			events.clone(),
		));
		let sharing = SharingManager::new(
			remote.clone(),
			replica.clone(),
			events.clone(),
			config.invite_ttl_hours,
		);
		let subscriptions = Arc::new(SubscriptionManager::new(feed, events.clone()));

		let (updates_tx, mut updates_rx) =
			mpsc::channel::<SyncUpdate>(config.update_channel_capacity);

		// Single consuming loop: decoded feed events merge into the
		// replica one at a time, preserving delivery order.
		let apply_reconciler = reconciler.clone();
		tokio::spawn(async move {
			while let Some(update) = updates_rx.recv().await {
				apply_reconciler.apply_update(update).await;
			}
		});

		Arc::new(Self {
			config,
			remote,
			replica,
			reconciler,
			sharing,
			subscriptions,
			events,
			updates_tx,
			active_list: RwLock::new(None),
		})
	}

	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// Subscribe to engine events
	pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
		self.events.subscribe()
	}

	// -- auth boundary -------------------------------------------------

	/// A user session was established: rebuild the replica from the remote
	/// store and open the user's list feed
	pub async fn signed_in(&self, user_id: Uuid) -> Result<()> {
		info!(%user_id, "signed in, rebuilding replica");

		// A previous session may still hold subscriptions if the caller
		// skipped signed_out; no feed may outlive its user
		self.subscriptions.deactivate_all().await;
		*self.active_list.write().await = None;

		{
			let mut replica = self.replica.write().await;
			replica.clear();
			replica.set_current_user(Some(user_id));
		}
		self.reconciler.clear_pending();

		// Subscribe first, then re-fetch: the feed has no replay, and any
		// overlap is absorbed by replica idempotence.
		self.guard(
			self.subscriptions
				.activate(
					FeedSlot::Lists,
					FeedTopic::ListsOwnedBy(user_id),
					self.updates_tx.clone(),
				)
				.await,
		)
		.await?;
		self.guard(self.reconciler.refresh_lists().await).await?;

		self.events.emit(EngineEvent::SignedIn { user_id });
		Ok(())
	}

	/// The session ended: tear everything down and rebuild from empty on
	/// the next sign-in
	pub async fn signed_out(&self) {
		info!("signed out, tearing down");
		self.subscriptions.deactivate_all().await;
		self.reconciler.clear_pending();
		self.replica.write().await.clear();
		*self.active_list.write().await = None;
		self.events.emit(EngineEvent::SignedOut);
	}

	// -- active list ---------------------------------------------------

	/// Switch the item feed to `list_id` (tearing down the previous list's
	/// subscription first) and re-fetch its items
	pub async fn open_list(&self, list_id: Uuid) -> Result<()> {
		self.guard(
			self.subscriptions
				.activate(
					FeedSlot::Items,
					FeedTopic::ItemsOfList(list_id),
					self.updates_tx.clone(),
				)
				.await,
		)
		.await?;

		if let Err(e) = self.reconciler.refresh_items(list_id).await {
			// The slot is already on the new list; release it so the held
			// subscription and the reported active list stay in agreement
			self.subscriptions.deactivate(FeedSlot::Items).await;
			*self.active_list.write().await = None;
			return self.guard(Err(e)).await;
		}

		*self.active_list.write().await = Some(list_id);
		Ok(())
	}

	/// Release the active list's item feed
	pub async fn close_list(&self) {
		self.subscriptions.deactivate(FeedSlot::Items).await;
		*self.active_list.write().await = None;
	}

	pub async fn active_list(&self) -> Option<Uuid> {
		*self.active_list.read().await
	}

	pub fn subscription_state(&self, slot: FeedSlot) -> SubscriptionState {
		self.subscriptions.state(slot)
	}

	// -- mutations -----------------------------------------------------

	pub async fn create_list(&self, name: &str) -> Result<Uuid> {
		self.guard(self.reconciler.create_list(name).await).await
	}

	pub async fn rename_list(&self, list_id: Uuid, name: &str) -> Result<()> {
		self.guard(self.reconciler.rename_list(list_id, name).await)
			.await
	}

	pub async fn delete_list(&self, list_id: Uuid) -> Result<()> {
		self.guard(self.reconciler.delete_list(list_id).await).await
	}

	pub async fn add_item(
		&self,
		list_id: Uuid,
		name: &str,
		quantity: u32,
		unit: Option<String>,
	) -> Result<Uuid> {
		self.guard(self.reconciler.add_item(list_id, name, quantity, unit).await)
			.await
	}

	pub async fn toggle_item(&self, item_id: Uuid) -> Result<bool> {
		self.guard(self.reconciler.toggle_item(item_id).await).await
	}

	pub async fn update_item(&self, item_id: Uuid, patch: ItemPatch) -> Result<()> {
		self.guard(self.reconciler.update_item(item_id, patch).await)
			.await
	}

	pub async fn delete_item(&self, item_id: Uuid) -> Result<()> {
		self.guard(self.reconciler.delete_item(item_id).await).await
	}

	pub async fn clear_checked_items(&self, list_id: Uuid) -> Result<usize> {
		self.guard(self.reconciler.clear_checked_items(list_id).await)
			.await
	}

	// -- sharing -------------------------------------------------------

	pub async fn create_invite_code(&self, list_id: Uuid) -> Result<String> {
		self.guard(self.sharing.create_invite_code(list_id).await)
			.await
	}

	pub async fn join_list_by_code(&self, code: &str) -> Result<List> {
		self.guard(self.sharing.join_list_by_code(code).await).await
	}

	pub async fn members_of(&self, list_id: Uuid) -> Result<Vec<Membership>> {
		self.guard(self.sharing.members_of(list_id).await).await
	}

	pub async fn invite_user_by_email(&self, list_id: Uuid, email: &str) -> Result<Membership> {
		self.guard(self.sharing.invite_user_by_email(list_id, email).await)
			.await
	}

	pub async fn remove_member(&self, membership_id: Uuid) -> Result<()> {
		self.guard(self.sharing.remove_member(membership_id).await)
			.await
	}

	pub async fn leave_list(&self, list_id: Uuid) -> Result<()> {
		self.guard(self.sharing.leave_list(list_id).await).await
	}

	// -- read model ----------------------------------------------------

	/// Visible lists, most recently created first
	pub async fn lists(&self) -> Vec<List> {
		self.replica.read().await.lists()
	}

	/// Active (unchecked) items of a list, grouped and sorted for display
	pub async fn active_groups(&self, list_id: Uuid) -> Vec<ItemGroup> {
		self.replica.read().await.active_groups(list_id)
	}

	/// Checked items of a list, most recently checked first
	pub async fn checked_items(&self, list_id: Uuid) -> Vec<Item> {
		self.replica.read().await.checked_items(list_id)
	}

	/// (remaining, checked) item counts for a list. The active list is
	/// counted from the replica (which includes optimistic state); any
	/// other list is counted from the remote store, since the replica only
	/// holds items of the list currently open.
	pub async fn item_counts(&self, list_id: Uuid) -> Result<(usize, usize)> {
		if self.active_list().await == Some(list_id) {
			return Ok(self.replica.read().await.item_counts(list_id));
		}
		let items = self
			.guard(self.remote.items_for_list(list_id).await)
			.await?;
		let checked = items.iter().filter(|item| item.is_checked).count();
		Ok((items.len() - checked, checked))
	}

	pub async fn get_item(&self, item_id: Uuid) -> Option<Item> {
		self.replica.read().await.get_item(item_id).cloned()
	}

	pub async fn get_list(&self, list_id: Uuid) -> Option<List> {
		self.replica.read().await.get_list(list_id).cloned()
	}

	/// How many mutations are currently in flight
	pub fn pending_mutations(&self) -> usize {
		self.reconciler.pending_count()
	}

	// -- failure handling ----------------------------------------------

	/// `NotAuthenticated` is fatal to the whole engine; everything else
	/// already rolled back the triggering mutation and passes through
	async fn guard<T>(&self, result: Result<T>) -> Result<T> {
		if let Err(e) = &result {
			if e.is_fatal() {
				self.halt().await;
			}
		}
		result
	}

	async fn halt(&self) {
		error!("fatal sync error, halting engine");
		self.subscriptions.deactivate_all().await;
		self.reconciler.clear_pending();
		self.events.emit(EngineEvent::EngineHalted);
	}
}
