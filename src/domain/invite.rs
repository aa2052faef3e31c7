//! Invite-code entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp::iso8601_option;

/// An invite row in the `list_invites` collection.
///
/// The code is a short opaque token, globally unique and server-assigned.
/// It is single-use for establishing a given membership but may be redeemed
/// by any holder before expiry; expired invites are inert, not deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invite {
    pub id: Uuid,
    pub list_id: Uuid,
    pub code: String,
    pub created_by: Uuid,

    #[serde(default, with = "iso8601_option")]
    pub created_at: Option<DateTime<Utc>>,

    /// Absent means the invite never expires
    #[serde(default, with = "iso8601_option")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Invite {
    /// Whether this invite can still establish a membership at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at < now)
    }
}

/// Insert payload for invite creation; the code is server-assigned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewInvite {
    pub list_id: Uuid,
    pub created_by: Uuid,

    #[serde(default, with = "iso8601_option")]
    pub expires_at: Option<DateTime<Utc>>,
}
