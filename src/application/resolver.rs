//! Dish-to-image resolution.
//!
//! Given a free-text dish name, picks one library image through a tiered
//! fallback strategy. Selection among equally valid candidates is uniform
//! random on purpose: repeated posts about the same dish should rotate
//! through its images.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use tracing::debug;

use crate::application::library::{ImageStore, StoreError};
use crate::domain::aliases::AliasTable;
use crate::domain::images::{DishName, ImageRecord};

pub struct DishResolver {
    store: Arc<dyn ImageStore>,
    aliases: AliasTable,
}

impl DishResolver {
    pub fn new(store: Arc<dyn ImageStore>, aliases: AliasTable) -> Self {
        Self { store, aliases }
    }

    /// Resolve a dish name to one image, or `None` when the library holds
    /// nothing suitable. An empty result is a valid outcome, not a fault.
    ///
    /// Tiers, first success wins:
    /// 1. exact category match on the literal query;
    /// 2. alias rewrite of the query, then another exact match;
    /// 3. the bare canonical category word from the alias rule;
    /// 4. for single-word queries only, a substring scan across every
    ///    category key. The scan is the local backstop for when upstream
    ///    tag search is stale or unavailable.
    pub async fn resolve(&self, query: &str) -> Result<Option<ImageRecord>, StoreError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        let snapshot = self.store.list_all().await?;

        if let Some(record) = pick_for_key(&snapshot, query) {
            debug!(target = "application::resolver", dish = query, tier = "exact", "image selected");
            return Ok(Some(record));
        }

        if let Some(rewrite) = self.aliases.rewrite(query) {
            if rewrite.rewritten != query {
                if let Some(record) = pick_for_key(&snapshot, &rewrite.rewritten) {
                    debug!(
                        target = "application::resolver",
                        dish = query,
                        rewritten = %rewrite.rewritten,
                        tier = "alias",
                        "image selected"
                    );
                    return Ok(Some(record));
                }
            }
            if let Some(record) = pick_for_key(&snapshot, &rewrite.canonical) {
                debug!(
                    target = "application::resolver",
                    dish = query,
                    category = %rewrite.canonical,
                    tier = "category",
                    "image selected"
                );
                return Ok(Some(record));
            }
        }

        if is_single_word(query) {
            let pool: Vec<ImageRecord> = snapshot
                .iter()
                .filter(|(dish, _)| dish.contains_ci(query))
                .flat_map(|(_, records)| records.iter().cloned())
                .collect();
            if let Some(record) = pool.choose(&mut rand::thread_rng()) {
                debug!(
                    target = "application::resolver",
                    dish = query,
                    candidates = pool.len(),
                    tier = "scan",
                    "image selected"
                );
                return Ok(Some(record.clone()));
            }
        }

        debug!(target = "application::resolver", dish = query, "no image matched");
        Ok(None)
    }
}

fn pick_for_key(
    snapshot: &BTreeMap<DishName, Vec<ImageRecord>>,
    key: &str,
) -> Option<ImageRecord> {
    snapshot
        .iter()
        .find(|(dish, _)| dish.as_str() == key)
        .and_then(|(_, records)| records.choose(&mut rand::thread_rng()).cloned())
}

fn is_single_word(query: &str) -> bool {
    !query.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use time::OffsetDateTime;
    use url::Url;

    use super::*;
    use crate::application::library::{NewImage, StoreError};

    struct FixedStore {
        dishes: BTreeMap<DishName, Vec<ImageRecord>>,
    }

    impl FixedStore {
        fn with(categories: &[(&str, &[&str])]) -> Self {
            let mut dishes = BTreeMap::new();
            for (name, locators) in categories {
                let dish = DishName::new(*name).expect("valid dish");
                let records = locators
                    .iter()
                    .map(|locator| ImageRecord {
                        locator: Url::parse(locator).expect("valid url"),
                        dish: dish.clone(),
                        created_at: OffsetDateTime::now_utc(),
                    })
                    .collect();
                dishes.insert(dish, records);
            }
            Self { dishes }
        }
    }

    #[async_trait]
    impl ImageStore for FixedStore {
        async fn list_all(&self) -> Result<BTreeMap<DishName, Vec<ImageRecord>>, StoreError> {
            Ok(self.dishes.clone())
        }

        async fn add(&self, _image: NewImage, _dish: &DishName) -> Result<ImageRecord, StoreError> {
            unimplemented!("read-only fixture")
        }

        async fn remove(&self, _locator: &Url) -> Result<(), StoreError> {
            unimplemented!("read-only fixture")
        }

        async fn recategorize(
            &self,
            _locator: &Url,
            _from: &DishName,
            _to: &DishName,
        ) -> Result<(), StoreError> {
            unimplemented!("read-only fixture")
        }
    }

    fn resolver(categories: &[(&str, &[&str])]) -> DishResolver {
        DishResolver::new(
            Arc::new(FixedStore::with(categories)),
            AliasTable::builtin().clone(),
        )
    }

    #[tokio::test]
    async fn exact_match_returns_a_member_of_that_category() {
        let resolver = resolver(&[(
            "Pho",
            &["https://img.example/pho-1.jpg", "https://img.example/pho-2.jpg"],
        )]);

        let record = resolver.resolve("Pho").await.unwrap().expect("match");
        assert_eq!(record.dish.as_str(), "Pho");
        assert!(record.locator.as_str().starts_with("https://img.example/pho-"));
    }

    #[tokio::test]
    async fn alias_rewrite_falls_back_to_the_canonical_category() {
        let resolver = resolver(&[("Sandwich", &["https://img.example/banh-mi.jpg"])]);

        let record = resolver
            .resolve("Chicken Banhmi")
            .await
            .unwrap()
            .expect("alias tiers find the sandwich");
        assert_eq!(record.dish.as_str(), "Sandwich");
    }

    #[tokio::test]
    async fn single_word_query_scans_category_keys() {
        let resolver = resolver(&[("Chicken Sandwich", &["https://img.example/cs.jpg"])]);

        let record = resolver
            .resolve("sandwich")
            .await
            .unwrap()
            .expect("substring scan matches");
        assert_eq!(record.dish.as_str(), "Chicken Sandwich");
    }

    #[tokio::test]
    async fn multi_word_queries_never_reach_the_substring_scan() {
        let resolver = resolver(&[("Grilled Lemongrass Chicken", &["https://img.example/glc.jpg"])]);

        // "lemongrass chicken" is a substring of the key, but the scan only
        // runs for single-word queries.
        let outcome = resolver.resolve("lemongrass chicken").await.unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn empty_library_resolves_to_none() {
        let resolver = resolver(&[]);
        assert!(resolver.resolve("Pho").await.unwrap().is_none());
        assert!(resolver.resolve("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolved_record_is_always_a_snapshot_member() {
        let resolver = resolver(&[
            ("Pho", &["https://img.example/pho.jpg"]),
            ("Sandwich", &["https://img.example/sw-1.jpg", "https://img.example/sw-2.jpg"]),
            ("Spring Roll", &["https://img.example/sr.jpg"]),
        ]);

        for query in ["Pho", "Sandwich", "roll"] {
            if let Some(record) = resolver.resolve(query).await.unwrap() {
                let known = [
                    "https://img.example/pho.jpg",
                    "https://img.example/sw-1.jpg",
                    "https://img.example/sw-2.jpg",
                    "https://img.example/sr.jpg",
                ];
                assert!(known.contains(&record.locator.as_str()));
            }
        }
    }
}
