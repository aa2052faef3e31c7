//! Shopping item entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::timestamp::iso8601;
use super::{Category, Patch};

/// An item as stored in the `shopping_items` collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    /// Unique identifier, server-assigned on create
    pub id: Uuid,

    /// Owning list; immutable for the item's lifetime, never null
    pub list_id: Uuid,

    pub name: String,

    /// Positive count (or measure, together with `unit`)
    pub quantity: u32,

    /// Optional short unit code ("pcs", "g", "ml", ...)
    #[serde(default)]
    pub unit: Option<String>,

    pub is_checked: bool,

    /// Category display fields, denormalized from the classifier at
    /// creation time and never re-derived on update
    #[serde(default)]
    pub category_name: Option<String>,

    #[serde(default)]
    pub category_icon: Option<String>,

    #[serde(default = "default_category_sort_order")]
    pub category_sort_order: i32,

    #[serde(default)]
    pub added_by: Option<Uuid>,

    #[serde(with = "iso8601")]
    pub created_at: DateTime<Utc>,

    /// Monotone non-decreasing; sole tie-breaker for conflicting writes
    #[serde(with = "iso8601")]
    pub updated_at: DateTime<Utc>,
}

fn default_category_sort_order() -> i32 {
    999
}

impl Item {
    /// Category name for display grouping, with the classifier fallback
    pub fn category_label(&self) -> &str {
        self.category_name.as_deref().unwrap_or(Category::FALLBACK_NAME)
    }

    /// Category icon for display grouping, with the classifier fallback
    pub fn category_glyph(&self) -> &str {
        self.category_icon.as_deref().unwrap_or(Category::FALLBACK_ICON)
    }
}

/// Insert payload for item creation; id and timestamps are server-assigned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewItem {
    pub list_id: Uuid,
    pub name: String,
    pub quantity: u32,
    pub unit: Option<String>,
    pub is_checked: bool,
    pub category_name: Option<String>,
    pub category_icon: Option<String>,
    pub category_sort_order: i32,
    pub added_by: Option<Uuid>,
}

/// Partial update for an item. Omitted fields (`None` / `Patch::Keep`)
/// leave the stored value untouched; category fields are deliberately
/// absent because they are never re-derived after creation.
#[derive(Debug, Clone, Default)]
pub struct ItemPatch {
    pub name: Option<String>,
    pub quantity: Option<u32>,
    pub unit: Patch<String>,
    pub is_checked: Option<bool>,
}

impl ItemPatch {
    /// Patch that only flips the checked flag
    pub fn toggle(is_checked: bool) -> Self {
        Self {
            is_checked: Some(is_checked),
            ..Self::default()
        }
    }

    /// Apply this patch to a local record, stamping the new `updated_at`
    pub fn apply(self, item: &mut Item, updated_at: DateTime<Utc>) {
        if let Some(name) = self.name {
            item.name = name;
        }
        if let Some(quantity) = self.quantity {
            item.quantity = quantity;
        }
        self.unit.apply_to(&mut item.unit);
        if let Some(is_checked) = self.is_checked {
            item.is_checked = is_checked;
        }
        item.updated_at = updated_at;
    }
}
