//! User settings and categories.

use crate::record::default_currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Label of the catch-all category, always ordered last and never deleted.
pub const OTHER_CATEGORY: &str = "Other";

/// Palette used for categories added without a color.
pub const CATEGORY_COLORS: &[&str] = &[
    "#ef4444", "#f97316", "#eab308", "#22c55e", "#14b8a6", "#3b82f6", "#8b5cf6", "#ec4899",
    "#64748b", "#a16207",
];

/// An expense category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Display label, unique case-insensitively.
    pub label: String,
    /// Hex color; empty means "assign one".
    #[serde(default)]
    pub color: String,
    /// Optional icon name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Position in the category list.
    #[serde(default)]
    pub order: u32,
    /// Last mutation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Category {
    /// Creates a category without a color (one is assigned on add).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            color: String::new(),
            icon: None,
            order: 0,
            updated_at: None,
        }
    }

    /// Sets the color.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Returns true for the catch-all category.
    pub fn is_other(&self) -> bool {
        self.label.eq_ignore_ascii_case(OTHER_CATEGORY)
    }

    /// Case-insensitive label match.
    pub fn matches(&self, label: &str) -> bool {
        self.label.eq_ignore_ascii_case(label)
    }
}

/// Partial update of a category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryPatch {
    /// New label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// New color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// New icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// Replicated user settings.
///
/// Fields this build does not know are kept in `extra` and written back
/// unchanged, so newer clients do not lose data through older ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Default currency for new records.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Categories ordered by `order`.
    #[serde(default)]
    pub categories: Vec<Category>,
    /// Last mutation time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Unknown settings fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Settings {
    fn default() -> Self {
        let labels = ["Food", "Transport", "Housing", "Entertainment", OTHER_CATEGORY];
        let categories = labels
            .iter()
            .zip(CATEGORY_COLORS)
            .enumerate()
            .map(|(order, (label, color))| Category {
                label: (*label).to_string(),
                color: (*color).to_string(),
                icon: None,
                order: order as u32,
                updated_at: None,
            })
            .collect();

        Self {
            currency: default_currency(),
            categories,
            updated_at: None,
            extra: Map::new(),
        }
    }
}

impl Settings {
    /// Finds a category by label, case-insensitively.
    pub fn category(&self, label: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.matches(label))
    }

    /// Returns the first palette color not used by any category, cycling by
    /// count once every color is taken.
    pub fn next_color(&self) -> String {
        CATEGORY_COLORS
            .iter()
            .find(|color| {
                !self
                    .categories
                    .iter()
                    .any(|c| c.color.eq_ignore_ascii_case(color))
            })
            .unwrap_or(&CATEGORY_COLORS[self.categories.len() % CATEGORY_COLORS.len()])
            .to_string()
    }

    /// Re-indexes `order` to `0..n` following the current order, with the
    /// catch-all category moved last.
    pub(crate) fn normalize_order(&mut self) {
        self.categories.sort_by_key(|c| (c.is_other(), c.order));
        for (index, category) in self.categories.iter_mut().enumerate() {
            category.order = index as u32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_other_last() {
        let settings = Settings::default();
        let last = settings.categories.last().unwrap();
        assert!(last.is_other());
        assert_eq!(last.order as usize, settings.categories.len() - 1);
    }

    #[test]
    fn next_color_skips_used_colors() {
        let settings = Settings::default();
        assert_eq!(settings.next_color(), CATEGORY_COLORS[settings.categories.len()]);
    }

    #[test]
    fn unknown_fields_round_trip_through_extra() {
        let json = r#"{"currency":"EUR","categories":[],"theme":"dark"}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.currency, "EUR");
        assert_eq!(settings.extra.get("theme"), Some(&Value::from("dark")));

        let back = serde_json::to_value(&settings).unwrap();
        assert_eq!(back["theme"], "dark");
    }

    #[test]
    fn normalize_moves_other_last() {
        let mut settings = Settings {
            categories: vec![
                Category {
                    order: 0,
                    ..Category::new(OTHER_CATEGORY)
                },
                Category {
                    order: 5,
                    ..Category::new("Food")
                },
            ],
            ..Settings::default()
        };
        settings.normalize_order();

        assert_eq!(settings.categories[0].label, "Food");
        assert_eq!(settings.categories[0].order, 0);
        assert_eq!(settings.categories[1].order, 1);
    }
}
