//! Change feed boundary and subscription lifecycle
//!
//! One logical subscription exists per list-of-interest: the active list's
//! items, and the lists owned by the current user. Raw notifications are
//! decoded into typed events; a malformed notification is logged and
//! dropped, the feed continues. Delivery is best-effort with no replay on
//! reconnect, so every (re)subscribe is followed by a full re-fetch by the
//! caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{Item, List};
use crate::error::{Result, SyncError};
use crate::events::{EngineEvent, EventBus};

/// A filter predicate naming one logical subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedTopic {
	/// `items where list_id = ...`
	ItemsOfList(Uuid),
	/// `lists where owner_id = ...`
	ListsOwnedBy(Uuid),
}

/// The two subscription slots the engine may hold at once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedSlot {
	/// The active list's item feed
	Items,
	/// The current user's list feed
	Lists,
}

/// Lifecycle of one logical subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
	Unsubscribed,
	Subscribing,
	Active,
	Error(String),
}

/// A raw change notification as delivered by the transport
#[derive(Debug, Clone, Deserialize)]
pub struct RawNotification {
	/// `insert`, `update` or `delete` (case-insensitive)
	pub operation: String,

	/// Full new record for inserts and updates
	#[serde(default)]
	pub record: Option<serde_json::Value>,

	/// Previous record for deletes; some transports supply only an id here
	#[serde(default)]
	pub old_record: Option<serde_json::Value>,
}

/// Server-push stream of filtered change notifications
#[async_trait]
pub trait ChangeFeed: Send + Sync {
	/// Open a subscription for `topic`; notifications arrive on the
	/// returned channel in transport order
	async fn subscribe(&self, topic: FeedTopic) -> Result<mpsc::Receiver<RawNotification>>;

	/// Tear down the subscription for `topic`; must complete before the
	/// caller opens a replacement
	async fn unsubscribe(&self, topic: &FeedTopic) -> Result<()>;
}

/// Identity carried by an item delete notification
#[derive(Debug, Clone, PartialEq)]
pub enum ItemDeletion {
	/// Transport supplied the full previous record
	Record(Box<Item>),
	/// Transport supplied only the id
	IdOnly(Uuid),
}

impl ItemDeletion {
	pub fn item_id(&self) -> Uuid {
		match self {
			ItemDeletion::Record(item) => item.id,
			ItemDeletion::IdOnly(id) => *id,
		}
	}
}

/// Typed change event for the item collection
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
	Inserted(Item),
	Updated(Item),
	Deleted(ItemDeletion),
}

/// Typed change event for the list collection
#[derive(Debug, Clone, PartialEq)]
pub enum ListEvent {
	Inserted(List),
	Updated(List),
	Deleted { list_id: Uuid },
}

/// Tagged union the reconciler consumes in its single event loop
#[derive(Debug, Clone, PartialEq)]
pub enum SyncUpdate {
	Item(ItemEvent),
	List(ListEvent),
}

/// Pull the entity id out of a delete payload that carries no decodable
/// previous record
fn id_hint(old_record: &serde_json::Value) -> Option<Uuid> {
	old_record
		.get("id")
		.and_then(|v| v.as_str())
		.and_then(|s| Uuid::parse_str(s).ok())
}

/// Decode a raw notification from an item subscription
pub fn decode_item_notification(raw: &RawNotification) -> Result<ItemEvent> {
	let op = raw.operation.to_ascii_lowercase();
	match op.as_str() {
		"insert" | "update" => {
			let record = raw
				.record
				.as_ref()
				.ok_or_else(|| SyncError::Decode(format!("{op} without record")))?;
			let item: Item = serde_json::from_value(record.clone())
				.map_err(|e| SyncError::Decode(e.to_string()))?;
			Ok(if op == "insert" {
				ItemEvent::Inserted(item)
			} else {
				ItemEvent::Updated(item)
			})
		}
		"delete" => {
			let old = raw
				.old_record
				.as_ref()
				.ok_or_else(|| SyncError::Decode("delete without old record".into()))?;
			if let Ok(item) = serde_json::from_value::<Item>(old.clone()) {
				return Ok(ItemEvent::Deleted(ItemDeletion::Record(Box::new(item))));
			}
			// Some transports strip the previous record down to its id
			id_hint(old)
				.map(|id| ItemEvent::Deleted(ItemDeletion::IdOnly(id)))
				.ok_or_else(|| SyncError::Decode("delete without usable identity".into()))
		}
		other => Err(SyncError::Decode(format!("unknown operation: {other}"))),
	}
}

/// Decode a raw notification from a list subscription
pub fn decode_list_notification(raw: &RawNotification) -> Result<ListEvent> {
	let op = raw.operation.to_ascii_lowercase();
	match op.as_str() {
		"insert" | "update" => {
			let record = raw
				.record
				.as_ref()
				.ok_or_else(|| SyncError::Decode(format!("{op} without record")))?;
			let list: List = serde_json::from_value(record.clone())
				.map_err(|e| SyncError::Decode(e.to_string()))?;
			Ok(if op == "insert" {
				ListEvent::Inserted(list)
			} else {
				ListEvent::Updated(list)
			})
		}
		"delete" => {
			let old = raw
				.old_record
				.as_ref()
				.ok_or_else(|| SyncError::Decode("delete without old record".into()))?;
			let list_id = serde_json::from_value::<List>(old.clone())
				.map(|list| list.id)
				.ok()
				.or_else(|| id_hint(old))
				.ok_or_else(|| SyncError::Decode("delete without usable identity".into()))?;
			Ok(ListEvent::Deleted { list_id })
		}
		other => Err(SyncError::Decode(format!("unknown operation: {other}"))),
	}
}

struct ActiveSubscription {
	topic: FeedTopic,
	pump: JoinHandle<()>,
}

/// Owns the engine's feed subscriptions and their lifecycle.
///
/// Activating a slot first tears down whatever that slot held, awaiting
/// the unsubscribe before opening the replacement, so at most one item
/// subscription and one list subscription are ever active and no events
/// leak across lists.
pub struct SubscriptionManager {
	feed: Arc<dyn ChangeFeed>,
	events: Arc<EventBus>,

	/// Slot bookkeeping; the lock also serializes teardown-then-subscribe
	slots: Mutex<HashMap<FeedSlot, ActiveSubscription>>,

	states: std::sync::RwLock<HashMap<FeedSlot, SubscriptionState>>,
}

impl SubscriptionManager {
	pub fn new(feed: Arc<dyn ChangeFeed>, events: Arc<EventBus>) -> Self {
		Self {
			feed,
			events,
			slots: Mutex::new(HashMap::new()),
			states: std::sync::RwLock::new(HashMap::new()),
		}
	}

	/// Current lifecycle state of a slot
	pub fn state(&self, slot: FeedSlot) -> SubscriptionState {
		self.states
			.read()
			.expect("subscription state lock poisoned")
			.get(&slot)
			.cloned()
			.unwrap_or(SubscriptionState::Unsubscribed)
	}

	fn set_state(&self, slot: FeedSlot, state: SubscriptionState) {
		self.states
			.write()
			.expect("subscription state lock poisoned")
			.insert(slot, state.clone());
		self.events
			.emit(EngineEvent::SubscriptionChanged { slot, state });
	}

	/// Subscribe `slot` to `topic`, tearing down the slot's previous
	/// subscription first. Decoded events flow into `updates`.
	pub async fn activate(
		&self,
		slot: FeedSlot,
		topic: FeedTopic,
		updates: mpsc::Sender<SyncUpdate>,
	) -> Result<()> {
		let mut slots = self.slots.lock().await;

		if let Some(previous) = slots.remove(&slot) {
			self.teardown(slot, previous).await;
		}

		self.set_state(slot, SubscriptionState::Subscribing);
		info!(?slot, ?topic, "opening feed subscription");

		let mut notifications = match self.feed.subscribe(topic.clone()).await {
			Ok(rx) => rx,
			Err(e) => {
				warn!(?slot, error = %e, "feed subscription failed");
				self.set_state(slot, SubscriptionState::Error(e.to_string()));
				return Err(e);
			}
		};

		let pump = tokio::spawn(async move {
			while let Some(raw) = notifications.recv().await {
				let decoded = match slot {
					FeedSlot::Items => decode_item_notification(&raw).map(SyncUpdate::Item),
					FeedSlot::Lists => decode_list_notification(&raw).map(SyncUpdate::List),
				};
				match decoded {
					Ok(update) => {
						if updates.send(update).await.is_err() {
							// Engine loop is gone; nothing left to feed
							break;
						}
					}
					Err(e) => {
						// One malformed event must not break the stream
						warn!(?slot, error = %e, "dropping undecodable notification");
					}
				}
			}
			debug!(?slot, "feed pump finished");
		});

		slots.insert(slot, ActiveSubscription { topic, pump });
		self.set_state(slot, SubscriptionState::Active);
		Ok(())
	}

	/// Tear down one slot, if subscribed
	pub async fn deactivate(&self, slot: FeedSlot) {
		let mut slots = self.slots.lock().await;
		if let Some(active) = slots.remove(&slot) {
			self.teardown(slot, active).await;
		}
	}

	/// Tear down every subscription (sign-out, fatal errors)
	pub async fn deactivate_all(&self) {
		let mut slots = self.slots.lock().await;
		let held: Vec<(FeedSlot, ActiveSubscription)> = slots.drain().collect();
		drop(slots);
		futures::future::join_all(
			held.into_iter()
				.map(|(slot, active)| self.teardown(slot, active)),
		)
		.await;
	}

	async fn teardown(&self, slot: FeedSlot, active: ActiveSubscription) {
		active.pump.abort();
		if let Err(e) = self.feed.unsubscribe(&active.topic).await {
			warn!(?slot, error = %e, "unsubscribe failed");
		}
		self.set_state(slot, SubscriptionState::Unsubscribed);
		info!(?slot, topic = ?active.topic, "feed subscription closed");
	}
}
