//! Shopping list entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp::iso8601;

/// A shopping list as stored in the `shopping_lists` collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct List {
    /// Unique identifier, server-assigned on create
    pub id: Uuid,

    /// Owning user; exactly one owner per list, always an implicit member
    pub owner_id: Uuid,

    pub name: String,

    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,

    /// Monotone non-decreasing; sole tie-breaker for conflicting writes
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,

    /// Derived client-side: true iff the current user is a member but not
    /// the owner. Never trusted from the wire.
    #[serde(default, skip_serializing)]
    pub is_shared: bool,
}

impl List {
    /// Build the optimistic local record for a list the current user is
    /// creating right now
    pub fn new_local(id: Uuid, owner_id: Uuid, name: String, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id,
            name,
            created_at: now,
            updated_at: now,
            is_shared: false,
        }
    }
}

/// Insert payload for list creation; id and timestamps are server-assigned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewList {
    pub owner_id: Uuid,
    pub name: String,
}
