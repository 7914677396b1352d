//! Resolver fallback tiers over a real file-backed library.

use std::sync::Arc;

use bytes::Bytes;
use tempfile::TempDir;
use url::Url;

use plateful::application::library::{ImageStore, NewImage};
use plateful::application::resolver::DishResolver;
use plateful::domain::aliases::AliasTable;
use plateful::domain::images::DishName;
use plateful::infra::library::FileLibrary;

struct Fixture {
    _workdir: TempDir,
    store: Arc<FileLibrary>,
}

impl Fixture {
    fn new() -> Self {
        let workdir = TempDir::new().expect("temp dir");
        let store = FileLibrary::new(
            workdir.path().join("images"),
            workdir.path().join("dish_image_map.json"),
            Url::parse("https://menu.example/images/").unwrap(),
        )
        .expect("library");
        Self {
            _workdir: workdir,
            store: Arc::new(store),
        }
    }

    async fn seed(&self, dish: &str, files: &[&str]) {
        let dish = DishName::new(dish).expect("valid dish");
        for file in files {
            self.store
                .add(
                    NewImage {
                        original_name: (*file).to_string(),
                        payload: Bytes::from_static(b"\xff\xd8\xff fixture bytes"),
                    },
                    &dish,
                )
                .await
                .expect("seed image");
        }
    }

    fn resolver(&self) -> DishResolver {
        let store: Arc<dyn ImageStore> = Arc::clone(&self.store);
        DishResolver::new(store, AliasTable::builtin().clone())
    }
}

#[tokio::test]
async fn exact_category_match_wins_first() {
    let fixture = Fixture::new();
    fixture.seed("Pho", &["pho-bowl.jpg", "pho-closeup.jpg"]).await;
    fixture.seed("Sandwich", &["banh-mi.jpg"]).await;

    let record = fixture
        .resolver()
        .resolve("Pho")
        .await
        .unwrap()
        .expect("match");
    assert_eq!(record.dish.as_str(), "Pho");
}

#[tokio::test]
async fn aliased_dish_name_lands_in_the_canonical_category() {
    let fixture = Fixture::new();
    fixture.seed("Sandwich", &["banh-mi.jpg"]).await;

    // No "Chicken Banhmi" category exists; the alias tiers route the query
    // to "Sandwich".
    let record = fixture
        .resolver()
        .resolve("Chicken Banhmi")
        .await
        .unwrap()
        .expect("alias fallback");
    assert_eq!(record.dish.as_str(), "Sandwich");
}

#[tokio::test]
async fn single_word_query_falls_back_to_a_substring_scan() {
    let fixture = Fixture::new();
    fixture.seed("Chicken Sandwich", &["chicken-sandwich.jpg"]).await;

    let record = fixture
        .resolver()
        .resolve("sandwich")
        .await
        .unwrap()
        .expect("substring fallback");
    assert_eq!(record.dish.as_str(), "Chicken Sandwich");
}

#[tokio::test]
async fn resolution_returns_a_record_present_in_the_snapshot() {
    let fixture = Fixture::new();
    fixture.seed("Pho", &["a.jpg", "b.jpg", "c.jpg"]).await;

    let snapshot = fixture.store.list_all().await.unwrap();
    let dish = DishName::new("Pho").unwrap();
    let known: Vec<_> = snapshot[&dish]
        .iter()
        .map(|record| record.locator.clone())
        .collect();

    for _ in 0..10 {
        let record = fixture
            .resolver()
            .resolve("Pho")
            .await
            .unwrap()
            .expect("match");
        assert!(known.contains(&record.locator));
    }
}

#[tokio::test]
async fn no_match_is_an_empty_result_not_an_error() {
    let fixture = Fixture::new();
    fixture.seed("Pho", &["pho.jpg"]).await;

    let outcome = fixture.resolver().resolve("Tiramisu").await.unwrap();
    assert!(outcome.is_none());

    // Multi-word queries skip the substring scan entirely.
    let outcome = fixture.resolver().resolve("pho deluxe bowl").await.unwrap();
    assert!(outcome.is_none());
}
