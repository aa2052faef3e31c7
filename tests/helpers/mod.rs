//! In-memory test doubles for the engine's injected boundaries
//!
//! `MockRemoteStore` is a full in-memory remote: server-assigned ids and
//! timestamps, per-operation failure injection and a call log.
//! `MockChangeFeed` hands out channels per topic so tests can push raw
//! notifications as if the server did.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::mpsc;
use uuid::Uuid;

use cartsync_core::domain::{
    Invite, Item, ItemPatch, List, Membership, NewInvite, NewItem, NewList, NewMembership, Profile,
};
use cartsync_core::error::{Result, SyncError};
use cartsync_core::feed::{ChangeFeed, FeedTopic, RawNotification};
use cartsync_core::remote::RemoteStore;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Poll `check` until it returns true or the timeout hits
pub async fn wait_for<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check() {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within timeout");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Let spawned tasks (feed pumps, apply loop) drain
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[derive(Default)]
struct RemoteState {
    lists: HashMap<Uuid, List>,
    items: HashMap<Uuid, Item>,
    memberships: HashMap<Uuid, Membership>,
    invites: Vec<Invite>,
    profiles: Vec<Profile>,
}

/// In-memory stand-in for the remote store
#[derive(Default)]
pub struct MockRemoteStore {
    state: Mutex<RemoteState>,

    /// Operation name -> error returned instead of executing
    failures: Mutex<HashMap<&'static str, SyncError>>,

    /// Operation name -> error returned on the next call only
    fail_once: Mutex<HashMap<&'static str, SyncError>>,

    /// Operation name -> artificial latency before the call resolves
    delays: Mutex<HashMap<&'static str, Duration>>,

    /// Operation names in call order
    calls: Mutex<Vec<&'static str>>,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail with a generic remote error until healed
    pub fn fail(&self, op: &'static str) {
        self.fail_with(op, SyncError::Remote(format!("injected failure in {op}")));
    }

    pub fn fail_with(&self, op: &'static str, error: SyncError) {
        self.failures.lock().unwrap().insert(op, error);
    }

    /// Fail only the next call to `op`
    pub fn fail_next(&self, op: &'static str) {
        self.fail_once
            .lock()
            .unwrap()
            .insert(op, SyncError::Remote(format!("injected failure in {op}")));
    }

    pub fn heal(&self, op: &'static str) {
        self.failures.lock().unwrap().remove(op);
    }

    /// Add artificial latency to every call of `op`
    pub fn delay(&self, op: &'static str, latency: Duration) {
        self.delays.lock().unwrap().insert(op, latency);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &'static str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|name| **name == op)
            .count()
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(op);
        let latency = self.delays.lock().unwrap().get(op).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.fail_once.lock().unwrap().remove(op) {
            return Err(error);
        }
        match self.failures.lock().unwrap().get(op) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    /// Overwrite an item in the remote state directly, simulating another
    /// client's write
    pub fn put_remote_item(&self, item: Item) {
        self.state.lock().unwrap().items.insert(item.id, item);
    }

    /// Drop an item from the remote state directly
    pub fn drop_remote_item(&self, id: Uuid) {
        self.state.lock().unwrap().items.remove(&id);
    }

    // -- seeding -------------------------------------------------------

    pub fn seed_list(&self, owner_id: Uuid, name: &str) -> List {
        let now = Utc::now();
        let list = List {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            created_at: now,
            updated_at: now,
            is_shared: false,
        };
        self.state
            .lock()
            .unwrap()
            .lists
            .insert(list.id, list.clone());
        list
    }

    pub fn seed_item(&self, list_id: Uuid, name: &str, is_checked: bool) -> Item {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            list_id,
            name: name.to_string(),
            quantity: 1,
            unit: None,
            is_checked,
            category_name: None,
            category_icon: None,
            category_sort_order: 999,
            added_by: None,
            created_at: now,
            updated_at: now,
        };
        self.state
            .lock()
            .unwrap()
            .items
            .insert(item.id, item.clone());
        item
    }

    pub fn seed_membership(&self, list_id: Uuid, user_id: Uuid) -> Membership {
        let membership = Membership {
            id: Uuid::new_v4(),
            list_id,
            user_id,
            role: cartsync_core::domain::MemberRole::Editor,
            invited_by: None,
            invited_at: Some(Utc::now()),
        };
        self.state
            .lock()
            .unwrap()
            .memberships
            .insert(membership.id, membership.clone());
        membership
    }

    pub fn seed_invite(&self, list_id: Uuid, expires_at: Option<DateTime<Utc>>) -> Invite {
        let invite = Invite {
            id: Uuid::new_v4(),
            list_id,
            code: invite_code(),
            created_by: Uuid::new_v4(),
            created_at: Some(Utc::now()),
            expires_at,
        };
        self.state.lock().unwrap().invites.push(invite.clone());
        invite
    }

    pub fn seed_profile(&self, email: &str) -> Profile {
        let profile = Profile {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            display_name: None,
            created_at: Some(Utc::now()),
        };
        self.state.lock().unwrap().profiles.push(profile.clone());
        profile
    }

    // -- inspection ----------------------------------------------------

    pub fn stored_item(&self, id: Uuid) -> Option<Item> {
        self.state.lock().unwrap().items.get(&id).cloned()
    }

    pub fn find_item_by_name(&self, list_id: Uuid, name: &str) -> Option<Item> {
        self.state
            .lock()
            .unwrap()
            .items
            .values()
            .find(|item| item.list_id == list_id && item.name == name)
            .cloned()
    }

    pub fn stored_list(&self, id: Uuid) -> Option<List> {
        self.state.lock().unwrap().lists.get(&id).cloned()
    }

    pub fn stored_invite(&self, code: &str) -> Option<Invite> {
        self.state
            .lock()
            .unwrap()
            .invites
            .iter()
            .find(|invite| invite.code == code)
            .cloned()
    }

    pub fn membership_exists(&self, list_id: Uuid, user_id: Uuid) -> bool {
        self.state
            .lock()
            .unwrap()
            .memberships
            .values()
            .any(|m| m.list_id == list_id && m.user_id == user_id)
    }
}

fn invite_code() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(6)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

#[async_trait]
impl RemoteStore for MockRemoteStore {
    async fn create_list(&self, new: NewList) -> Result<List> {
        self.enter("create_list").await?;
        let now = Utc::now();
        let list = List {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            name: new.name,
            created_at: now,
            updated_at: now,
            is_shared: false,
        };
        self.state
            .lock()
            .unwrap()
            .lists
            .insert(list.id, list.clone());
        Ok(list)
    }

    async fn rename_list(&self, id: Uuid, name: String, updated_at: DateTime<Utc>) -> Result<()> {
        self.enter("rename_list").await?;
        let mut state = self.state.lock().unwrap();
        let list = state
            .lists
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound("list".into()))?;
        list.name = name;
        list.updated_at = updated_at;
        Ok(())
    }

    async fn delete_list(&self, id: Uuid) -> Result<()> {
        self.enter("delete_list").await?;
        let mut state = self.state.lock().unwrap();
        state.lists.remove(&id);
        state.items.retain(|_, item| item.list_id != id);
        Ok(())
    }

    async fn fetch_list(&self, id: Uuid) -> Result<List> {
        self.enter("fetch_list").await?;
        self.state
            .lock()
            .unwrap()
            .lists
            .get(&id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound("list".into()))
    }

    async fn lists_owned_by(&self, owner_id: Uuid) -> Result<Vec<List>> {
        self.enter("lists_owned_by").await?;
        let mut lists: Vec<List> = self
            .state
            .lock()
            .unwrap()
            .lists
            .values()
            .filter(|list| list.owner_id == owner_id)
            .cloned()
            .collect();
        lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lists)
    }

    async fn lists_by_ids(&self, ids: &[Uuid]) -> Result<Vec<List>> {
        self.enter("lists_by_ids").await?;
        let state = self.state.lock().unwrap();
        let mut lists: Vec<List> = ids
            .iter()
            .filter_map(|id| state.lists.get(id).cloned())
            .collect();
        lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lists)
    }

    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<Item>> {
        self.enter("items_for_list").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|item| item.list_id == list_id)
            .cloned()
            .collect())
    }

    async fn fetch_item(&self, id: Uuid) -> Result<Item> {
        self.enter("fetch_item").await?;
        self.state
            .lock()
            .unwrap()
            .items
            .get(&id)
            .cloned()
            .ok_or_else(|| SyncError::NotFound("item".into()))
    }

    async fn create_item(&self, new: NewItem) -> Result<Item> {
        let now = Utc::now();
        let item = Item {
            id: Uuid::new_v4(),
            list_id: new.list_id,
            name: new.name,
            quantity: new.quantity,
            unit: new.unit,
            is_checked: new.is_checked,
            category_name: new.category_name,
            category_icon: new.category_icon,
            category_sort_order: new.category_sort_order,
            added_by: new.added_by,
            created_at: now,
            updated_at: now,
        };
        // Commit before the latency window: against a real server the row
        // exists (and is echoed on the feed) before the response reaches
        // the caller
        self.state
            .lock()
            .unwrap()
            .items
            .insert(item.id, item.clone());
        if let Err(error) = self.enter("create_item").await {
            self.state.lock().unwrap().items.remove(&item.id);
            return Err(error);
        }
        Ok(item)
    }

    async fn update_item(
        &self,
        id: Uuid,
        patch: ItemPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        self.enter("update_item").await?;
        let mut state = self.state.lock().unwrap();
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| SyncError::NotFound("item".into()))?;
        patch.apply(item, updated_at);
        Ok(())
    }

    async fn delete_item(&self, id: Uuid) -> Result<()> {
        self.enter("delete_item").await?;
        self.state.lock().unwrap().items.remove(&id);
        Ok(())
    }

    async fn delete_checked_items(&self, list_id: Uuid) -> Result<()> {
        self.enter("delete_checked_items").await?;
        self.state
            .lock()
            .unwrap()
            .items
            .retain(|_, item| item.list_id != list_id || !item.is_checked);
        Ok(())
    }

    async fn memberships_for_user(&self, user_id: Uuid) -> Result<Vec<Membership>> {
        self.enter("memberships_for_user").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn memberships_for_list(&self, list_id: Uuid) -> Result<Vec<Membership>> {
        self.enter("memberships_for_list").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .memberships
            .values()
            .filter(|m| m.list_id == list_id)
            .cloned()
            .collect())
    }

    async fn create_membership(&self, new: NewMembership) -> Result<Membership> {
        self.enter("create_membership").await?;
        let membership = Membership {
            id: Uuid::new_v4(),
            list_id: new.list_id,
            user_id: new.user_id,
            role: new.role,
            invited_by: new.invited_by,
            invited_at: Some(Utc::now()),
        };
        self.state
            .lock()
            .unwrap()
            .memberships
            .insert(membership.id, membership.clone());
        Ok(membership)
    }

    async fn delete_membership(&self, id: Uuid) -> Result<()> {
        self.enter("delete_membership").await?;
        self.state.lock().unwrap().memberships.remove(&id);
        Ok(())
    }

    async fn delete_membership_for(&self, list_id: Uuid, user_id: Uuid) -> Result<()> {
        self.enter("delete_membership_for").await?;
        self.state
            .lock()
            .unwrap()
            .memberships
            .retain(|_, m| !(m.list_id == list_id && m.user_id == user_id));
        Ok(())
    }

    async fn create_invite(&self, new: NewInvite) -> Result<Invite> {
        self.enter("create_invite").await?;
        let invite = Invite {
            id: Uuid::new_v4(),
            list_id: new.list_id,
            code: invite_code(),
            created_by: new.created_by,
            created_at: Some(Utc::now()),
            expires_at: new.expires_at,
        };
        self.state.lock().unwrap().invites.push(invite.clone());
        Ok(invite)
    }

    async fn invite_by_code(&self, code: &str) -> Result<Option<Invite>> {
        self.enter("invite_by_code").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .invites
            .iter()
            .find(|invite| invite.code == code)
            .cloned())
    }

    async fn profile_by_email(&self, email: &str) -> Result<Option<Profile>> {
        self.enter("profile_by_email").await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .profiles
            .iter()
            .find(|profile| profile.email.as_deref() == Some(email))
            .cloned())
    }
}

/// What the feed was asked to do, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCall {
    Subscribe(FeedTopic),
    Unsubscribe(FeedTopic),
}

/// Scriptable change feed: tests push raw notifications per topic
#[derive(Default)]
pub struct MockChangeFeed {
    senders: Mutex<HashMap<FeedTopic, mpsc::Sender<RawNotification>>>,
    log: Mutex<Vec<FeedCall>>,
}

impl MockChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<FeedCall> {
        self.log.lock().unwrap().clone()
    }

    pub fn is_subscribed(&self, topic: &FeedTopic) -> bool {
        self.senders.lock().unwrap().contains_key(topic)
    }

    pub fn subscription_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    /// Deliver a raw notification on a topic's channel
    pub async fn push(&self, topic: &FeedTopic, raw: RawNotification) {
        let sender = self
            .senders
            .lock()
            .unwrap()
            .get(topic)
            .cloned()
            .unwrap_or_else(|| panic!("no subscription for {topic:?}"));
        sender.send(raw).await.expect("feed channel closed");
    }
}

#[async_trait]
impl ChangeFeed for MockChangeFeed {
    async fn subscribe(&self, topic: FeedTopic) -> Result<mpsc::Receiver<RawNotification>> {
        let (tx, rx) = mpsc::channel(64);
        self.senders.lock().unwrap().insert(topic.clone(), tx);
        self.log.lock().unwrap().push(FeedCall::Subscribe(topic));
        Ok(rx)
    }

    async fn unsubscribe(&self, topic: &FeedTopic) -> Result<()> {
        self.senders.lock().unwrap().remove(topic);
        self.log
            .lock()
            .unwrap()
            .push(FeedCall::Unsubscribe(topic.clone()));
        Ok(())
    }
}

// -- raw notification builders -----------------------------------------

pub fn insert_of<T: serde::Serialize>(record: &T) -> RawNotification {
    RawNotification {
        operation: "INSERT".into(),
        record: Some(serde_json::to_value(record).unwrap()),
        old_record: None,
    }
}

pub fn update_of<T: serde::Serialize>(record: &T) -> RawNotification {
    RawNotification {
        operation: "UPDATE".into(),
        record: Some(serde_json::to_value(record).unwrap()),
        old_record: None,
    }
}

pub fn delete_of<T: serde::Serialize>(record: &T) -> RawNotification {
    RawNotification {
        operation: "DELETE".into(),
        record: None,
        old_record: Some(serde_json::to_value(record).unwrap()),
    }
}

/// Delete notification carrying only the row id, as lean transports do
pub fn delete_id_only(id: Uuid) -> RawNotification {
    RawNotification {
        operation: "DELETE".into(),
        record: None,
        old_record: Some(serde_json::json!({ "id": id.to_string() })),
    }
}
