//! List membership entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp::iso8601_option;

/// What a member may do with a shared list
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Editor,
    Viewer,
}

/// A membership row in the `list_members` collection.
///
/// At most one row exists per (list_id, user_id); the owner is an implicit
/// member and has no row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Membership {
    pub id: Uuid,
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,

    #[serde(default)]
    pub invited_by: Option<Uuid>,

    #[serde(default, with = "iso8601_option")]
    pub invited_at: Option<DateTime<Utc>>,
}

/// Insert payload for membership creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMembership {
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub invited_by: Option<Uuid>,
}
