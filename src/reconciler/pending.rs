//! Pending-mutation bookkeeping
//!
//! One entry per entity id describes the in-flight remote call for that
//! entity. The table is the per-entity serialization point: a second local
//! mutation against the same id supersedes the first, whose eventual
//! settlement then becomes a no-op.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What kind of remote call is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
	Create,
	Update,
	Delete,
}

/// Proof of having begun a mutation; settling with a superseded ticket
/// does nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationTicket {
	pub entity_id: Uuid,
	token: u64,
}

#[derive(Debug, Clone)]
pub struct PendingMutation {
	pub kind: MutationKind,
	pub issued_at: DateTime<Utc>,
	token: u64,
}

/// Entity id -> in-flight mutation
#[derive(Debug, Default)]
pub struct PendingTable {
	entries: HashMap<Uuid, PendingMutation>,
	next_token: u64,
}

impl PendingTable {
	/// Record a mutation for `entity_id`, superseding any existing entry
	pub fn begin(&mut self, entity_id: Uuid, kind: MutationKind) -> MutationTicket {
		self.next_token += 1;
		let token = self.next_token;
		self.entries.insert(
			entity_id,
			PendingMutation {
				kind,
				issued_at: Utc::now(),
				token,
			},
		);
		MutationTicket { entity_id, token }
	}

	/// Clear the entry on settle (success or failure). Returns false when
	/// the ticket was superseded by a later mutation, in which case the
	/// caller must not roll anything back.
	pub fn settle(&mut self, ticket: MutationTicket) -> bool {
		match self.entries.get(&ticket.entity_id) {
			Some(entry) if entry.token == ticket.token => {
				self.entries.remove(&ticket.entity_id);
				true
			}
			_ => false,
		}
	}

	pub fn get(&self, entity_id: Uuid) -> Option<&PendingMutation> {
		self.entries.get(&entity_id)
	}

	pub fn is_pending(&self, entity_id: Uuid) -> bool {
		self.entries.contains_key(&entity_id)
	}

	/// Ids with in-flight mutations; full re-fetches must not evict these
	pub fn pending_ids(&self) -> HashSet<Uuid> {
		self.entries.keys().copied().collect()
	}

	/// Drop everything (sign-out, fatal teardown)
	pub fn clear(&mut self) {
		self.entries.clear();
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
