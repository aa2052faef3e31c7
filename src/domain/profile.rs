//! User profile entity (read-only lookup)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp::iso8601_option;

/// A row in the `profiles` collection, used to resolve an email address to
/// a user id when inviting directly
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: Uuid,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub display_name: Option<String>,

    #[serde(default, with = "iso8601_option")]
    pub created_at: Option<DateTime<Utc>>,
}
