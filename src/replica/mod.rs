//! In-memory replica of the remote state
//!
//! The replica is the UI-authoritative copy of lists and items. It is only
//! ever written by completed reconciliation steps; the remote store and the
//! change feed never touch it directly. All upserts are idempotent and
//! reject stale writes by `updated_at`, so echoed or repeated events are
//! harmless. The replica is memory-resident and rebuilt from the remote
//! store on (re)start.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{Item, List};

/// Active (unchecked) items of one category, for the grouped read model
#[derive(Debug, Clone, PartialEq)]
pub struct ItemGroup {
	pub category_name: String,
	pub category_icon: String,
	pub sort_order: i32,
	pub items: Vec<Item>,
}

/// Client-held, memory-resident copy of server state
#[derive(Debug, Default)]
pub struct Replica {
	current_user: Option<Uuid>,

	/// List ids the current user may see (owned or member-of)
	visible: HashSet<Uuid>,

	lists: HashMap<Uuid, List>,
	items: HashMap<Uuid, Item>,
}

impl Replica {
	pub fn new() -> Self {
		Self::default()
	}

	/// Forget everything; used on sign-out and before a sign-in rebuild
	pub fn clear(&mut self) {
		self.current_user = None;
		self.visible.clear();
		self.lists.clear();
		self.items.clear();
	}

	pub fn set_current_user(&mut self, user_id: Option<Uuid>) {
		self.current_user = user_id;
	}

	pub fn current_user(&self) -> Option<Uuid> {
		self.current_user
	}

	// -- visibility ----------------------------------------------------

	/// Grant visibility for a list id (owned or membership-confirmed)
	pub fn grant_visibility(&mut self, list_id: Uuid) {
		self.visible.insert(list_id);
	}

	pub fn is_visible(&self, list_id: Uuid) -> bool {
		self.visible.contains(&list_id)
	}

	// -- list mutations ------------------------------------------------

	/// Idempotent upsert. Returns false and leaves the held record in
	/// place when the incoming `updated_at` is strictly older.
	///
	/// Lists owned by the current user become visible automatically;
	/// shared lists require an explicit visibility grant (membership
	/// confirmation), so a user never sees a list they cannot access.
	pub fn upsert_list(&mut self, mut list: List) -> bool {
		if let Some(existing) = self.lists.get(&list.id) {
			if existing.updated_at > list.updated_at {
				return false;
			}
		}

		let owned = self.current_user == Some(list.owner_id);
		list.is_shared = !owned && self.current_user.is_some();
		if owned {
			self.visible.insert(list.id);
		}

		self.lists.insert(list.id, list);
		true
	}

	/// Remove a list, its visibility and all of its items. No-op when the
	/// id is not present.
	pub fn remove_list(&mut self, list_id: Uuid) -> bool {
		self.visible.remove(&list_id);
		let removed = self.lists.remove(&list_id).is_some();
		self.items.retain(|_, item| item.list_id != list_id);
		removed
	}

	/// Rollback restore: put a pre-mutation snapshot back, but only while
	/// the held record still carries the optimistic timestamp being rolled
	/// back. Newer state that arrived meanwhile wins.
	pub fn restore_list(&mut self, snapshot: List, optimistic_updated_at: DateTime<Utc>) -> bool {
		match self.lists.get(&snapshot.id) {
			Some(current) if current.updated_at == optimistic_updated_at => {
				self.lists.insert(snapshot.id, snapshot);
				true
			}
			_ => false,
		}
	}

	/// Reinsert a list that was optimistically removed. No-op if anything
	/// reappeared under the same id in the meantime.
	pub fn reinsert_list(&mut self, snapshot: List) -> bool {
		if self.lists.contains_key(&snapshot.id) {
			return false;
		}
		let id = snapshot.id;
		let applied = self.upsert_list(snapshot);
		if applied {
			self.visible.insert(id);
		}
		applied
	}

	/// Drop lists (and their items) whose id is not in `keep`; used after
	/// a full re-fetch so remotely vanished lists disappear locally
	pub fn retain_lists(&mut self, keep: &HashSet<Uuid>) {
		let stale: Vec<Uuid> = self
			.lists
			.keys()
			.filter(|id| !keep.contains(id))
			.copied()
			.collect();
		for id in stale {
			self.remove_list(id);
		}
	}

	// -- item mutations ------------------------------------------------

	/// Idempotent upsert with stale-write rejection: an incoming record
	/// strictly older than the held one is a no-op, an equal timestamp is
	/// accepted as an idempotent repeat
	pub fn upsert_item(&mut self, item: Item) -> bool {
		if let Some(existing) = self.items.get(&item.id) {
			if existing.updated_at > item.updated_at {
				return false;
			}
		}
		self.items.insert(item.id, item);
		true
	}

	/// No-op when the id is absent (covers a delete echoed after a local
	/// delete already removed it)
	pub fn remove_item(&mut self, item_id: Uuid) -> bool {
		self.items.remove(&item_id).is_some()
	}

	/// Rollback restore, same contract as [`Replica::restore_list`]
	pub fn restore_item(&mut self, snapshot: Item, optimistic_updated_at: DateTime<Utc>) -> bool {
		match self.items.get(&snapshot.id) {
			Some(current) if current.updated_at == optimistic_updated_at => {
				self.items.insert(snapshot.id, snapshot);
				true
			}
			_ => false,
		}
	}

	/// Reinsert an item that was optimistically removed. No-op if anything
	/// reappeared under the same id in the meantime.
	pub fn reinsert_item(&mut self, snapshot: Item) -> bool {
		if self.items.contains_key(&snapshot.id) {
			return false;
		}
		self.upsert_item(snapshot)
	}

	/// Drop items of `list_id` whose id is not in `keep`; used after a
	/// full re-fetch of the active list
	pub fn retain_items(&mut self, list_id: Uuid, keep: &HashSet<Uuid>) {
		self.items
			.retain(|id, item| item.list_id != list_id || keep.contains(id));
	}

	// -- read model ----------------------------------------------------

	pub fn get_list(&self, list_id: Uuid) -> Option<&List> {
		self.lists.get(&list_id)
	}

	pub fn get_item(&self, item_id: Uuid) -> Option<&Item> {
		self.items.get(&item_id)
	}

	/// Visible lists, most recently created first
	pub fn lists(&self) -> Vec<List> {
		let mut lists: Vec<List> = self
			.lists
			.values()
			.filter(|list| self.visible.contains(&list.id))
			.cloned()
			.collect();
		lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		lists
	}

	/// Active (unchecked) items of a list, grouped by category; groups
	/// sorted by category sort order ascending, items by name ascending
	pub fn active_groups(&self, list_id: Uuid) -> Vec<ItemGroup> {
		let mut groups: HashMap<String, ItemGroup> = HashMap::new();

		for item in self.items.values() {
			if item.list_id != list_id || item.is_checked {
				continue;
			}
			let group = groups
				.entry(item.category_label().to_string())
				.or_insert_with(|| ItemGroup {
					category_name: item.category_label().to_string(),
					category_icon: item.category_glyph().to_string(),
					sort_order: item.category_sort_order,
					items: Vec::new(),
				});
			group.items.push(item.clone());
		}

		let mut groups: Vec<ItemGroup> = groups.into_values().collect();
		for group in &mut groups {
			group.items.sort_by(|a, b| a.name.cmp(&b.name));
		}
		groups.sort_by(|a, b| {
			a.sort_order
				.cmp(&b.sort_order)
				.then_with(|| a.category_name.cmp(&b.category_name))
		});
		groups
	}

	/// Checked items of a list, most recently checked first
	pub fn checked_items(&self, list_id: Uuid) -> Vec<Item> {
		let mut checked: Vec<Item> = self
			.items
			.values()
			.filter(|item| item.list_id == list_id && item.is_checked)
			.cloned()
			.collect();
		checked.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
		checked
	}

	/// (remaining, checked) counts for a list's progress display
	pub fn item_counts(&self, list_id: Uuid) -> (usize, usize) {
		let mut remaining = 0;
		let mut checked = 0;
		for item in self.items.values() {
			if item.list_id != list_id {
				continue;
			}
			if item.is_checked {
				checked += 1;
			} else {
				remaining += 1;
			}
		}
		(remaining, checked)
	}

	/// Ids of checked items of a list (bulk clear support)
	pub fn checked_item_ids(&self, list_id: Uuid) -> Vec<Uuid> {
		self.items
			.values()
			.filter(|item| item.list_id == list_id && item.is_checked)
			.map(|item| item.id)
			.collect()
	}

	/// All items of a list, unsorted (snapshot support)
	pub fn items_of(&self, list_id: Uuid) -> Vec<Item> {
		self.items
			.values()
			.filter(|item| item.list_id == list_id)
			.cloned()
			.collect()
	}
}
