//! Dish categories and the image records grouped under them.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use super::error::DomainError;

/// A named category grouping interchangeable promotional images.
///
/// Case-preserving: `"Pho"` and `"pho"` are distinct keys. Reconciling
/// spellings and aliases is the resolver's job, not the index's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DishName(String);

impl DishName {
    pub fn new(name: impl Into<String>) -> Result<Self, DomainError> {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("dish name must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive substring containment against this category key.
    #[must_use]
    pub fn contains_ci(&self, needle: &str) -> bool {
        self.0.to_lowercase().contains(&needle.to_lowercase())
    }
}

impl fmt::Display for DishName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One image in the library. Belongs to exactly one dish at a time;
/// re-categorization moves it, never copies. The locator must resolve to a
/// publicly fetchable image for publishing to succeed without re-hosting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub locator: Url,
    pub dish: DishName,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dish_name_rejects_blank_input() {
        assert!(DishName::new("   ").is_err());
        assert!(DishName::new("").is_err());
    }

    #[test]
    fn dish_name_preserves_case_and_trims() {
        let dish = DishName::new("  Spring Roll ").expect("valid name");
        assert_eq!(dish.as_str(), "Spring Roll");
    }

    #[test]
    fn contains_ci_ignores_case_only() {
        let dish = DishName::new("Chicken Sandwich").expect("valid name");
        assert!(dish.contains_ci("sandwich"));
        assert!(dish.contains_ci("SAND"));
        assert!(!dish.contains_ci("pho"));
    }
}
