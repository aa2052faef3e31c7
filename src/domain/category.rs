//! Category classification boundary
//!
//! The classifier is consumed at item-create time only; its output is
//! denormalized onto the item and never re-derived on update. It is a pure
//! function with a fixed fallback category, never an error.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// A display category for grouping active items
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub name: String,
    pub icon: String,
    pub sort_order: i32,
}

impl Category {
    pub const FALLBACK_NAME: &'static str = "Other";
    pub const FALLBACK_ICON: &'static str = "📦";

    /// The fixed fallback for names no keyword matches
    pub fn fallback() -> Self {
        Self {
            name: Self::FALLBACK_NAME.into(),
            icon: Self::FALLBACK_ICON.into(),
            sort_order: 999,
        }
    }
}

/// Pure `name -> Category` classification
pub trait CategoryClassifier: Send + Sync {
    fn classify(&self, name: &str) -> Category;
}

struct CategoryDef {
    name: &'static str,
    icon: &'static str,
    sort_order: i32,
    keywords: &'static [&'static str],
}

static DEFAULT_CATEGORIES: Lazy<Vec<CategoryDef>> = Lazy::new(|| {
    vec![
        CategoryDef {
            name: "Fruits & Vegetables",
            icon: "🥦",
            sort_order: 10,
            keywords: &[
                "apple", "banana", "orange", "lemon", "grape", "berry", "tomato", "cucumber",
                "carrot", "onion", "garlic", "potato", "pepper", "salad", "lettuce", "cabbage",
                "broccoli", "avocado", "herb",
            ],
        },
        CategoryDef {
            name: "Dairy & Eggs",
            icon: "🥛",
            sort_order: 20,
            keywords: &[
                "milk", "cheese", "yogurt", "butter", "cream", "egg", "kefir", "curd",
            ],
        },
        CategoryDef {
            name: "Bakery",
            icon: "🍞",
            sort_order: 30,
            keywords: &["bread", "bun", "baguette", "croissant", "bagel", "loaf", "pita"],
        },
        CategoryDef {
            name: "Meat & Fish",
            icon: "🥩",
            sort_order: 40,
            keywords: &[
                "chicken", "beef", "pork", "sausage", "ham", "bacon", "fish", "salmon", "tuna",
                "shrimp", "turkey", "mince",
            ],
        },
        CategoryDef {
            name: "Pantry",
            icon: "🍝",
            sort_order: 50,
            keywords: &[
                "pasta", "rice", "flour", "sugar", "salt", "oil", "cereal", "oat", "bean",
                "lentil", "canned", "sauce", "vinegar", "spice",
            ],
        },
        CategoryDef {
            name: "Drinks",
            icon: "🥤",
            sort_order: 60,
            keywords: &["water", "juice", "soda", "coffee", "tea", "beer", "wine", "cola"],
        },
        CategoryDef {
            name: "Frozen",
            icon: "🧊",
            sort_order: 70,
            keywords: &["frozen", "ice cream", "pizza", "dumpling"],
        },
        CategoryDef {
            name: "Household",
            icon: "🧽",
            sort_order: 80,
            keywords: &[
                "soap", "detergent", "shampoo", "toothpaste", "paper towel", "toilet paper",
                "sponge", "trash bag", "foil",
            ],
        },
    ]
});

/// Default classifier: case-insensitive substring match over a fixed
/// keyword table, first hit wins, fallback otherwise
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordClassifier;

impl CategoryClassifier for KeywordClassifier {
    fn classify(&self, name: &str) -> Category {
        let lowered = name.to_lowercase();

        for def in DEFAULT_CATEGORIES.iter() {
            if def.keywords.iter().any(|kw| lowered.contains(kw)) {
                return Category {
                    name: def.name.into(),
                    icon: def.icon.into(),
                    sort_order: def.sort_order,
                };
            }
        }

        Category::fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_keywords_case_insensitively() {
        let classifier = KeywordClassifier;
        assert_eq!(classifier.classify("Whole Milk").name, "Dairy & Eggs");
        assert_eq!(classifier.classify("sourdough BREAD").name, "Bakery");
    }

    #[test]
    fn unknown_names_fall_back() {
        let category = KeywordClassifier.classify("mystery gadget");
        assert_eq!(category, Category::fallback());
        assert_eq!(category.sort_order, 999);
    }
}
