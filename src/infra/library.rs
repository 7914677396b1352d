//! File-backed image index.
//!
//! Payloads live under a root directory in date-sharded paths; the
//! dish → asset map is one JSON document rewritten atomically (temp file +
//! rename) on every mutation. All mutations serialize through a single
//! async mutex, which is what makes `recategorize` atomic from this
//! index's point of view.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use slug::slugify;
use time::OffsetDateTime;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio::fs;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::application::library::{ImageStore, NewImage, StoreError};
use crate::domain::images::{DishName, ImageRecord};

/// On-disk map document: dish name -> stored assets.
#[derive(Debug, Default, Serialize, Deserialize)]
struct MapDocument {
    #[serde(default)]
    dishes: BTreeMap<String, Vec<StoredAsset>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredAsset {
    /// Path relative to the payload root; doubles as the locator suffix.
    path: String,
    checksum: String,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
}

pub struct FileLibrary {
    root: PathBuf,
    map_path: PathBuf,
    public_base: Url,
    write_guard: Mutex<()>,
}

impl FileLibrary {
    /// Initialise the library rooted at `root`, creating the directory if
    /// necessary. `public_base` is the URL prefix under which payloads are
    /// served.
    pub fn new(root: PathBuf, map_path: PathBuf, public_base: Url) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            map_path,
            public_base,
            write_guard: Mutex::new(()),
        })
    }

    async fn read_map(&self) -> Result<MapDocument, StoreError> {
        match fs::read(&self.map_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                StoreError::integrity(format!("image map is not readable: {err}"))
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(MapDocument::default()),
            Err(err) => Err(StoreError::from_persistence(err)),
        }
    }

    async fn write_map(&self, document: &MapDocument) -> Result<(), StoreError> {
        let rendered =
            serde_json::to_vec_pretty(document).map_err(StoreError::from_persistence)?;
        let staged = self.map_path.with_extension("json.tmp");
        if let Some(parent) = self.map_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(StoreError::from_persistence)?;
        }
        fs::write(&staged, &rendered)
            .await
            .map_err(StoreError::from_persistence)?;
        fs::rename(&staged, &self.map_path)
            .await
            .map_err(StoreError::from_persistence)
    }

    fn locator_for(&self, relative: &str) -> Result<Url, StoreError> {
        self.public_base
            .join(relative)
            .map_err(|err| StoreError::from_persistence(format!("bad stored path: {err}")))
    }

    fn relative_from_locator(&self, locator: &Url) -> Option<String> {
        locator
            .as_str()
            .strip_prefix(self.public_base.as_str())
            .filter(|relative| !relative.is_empty())
            .map(ToString::to_string)
    }

    fn record(&self, dish: &DishName, asset: &StoredAsset) -> Result<ImageRecord, StoreError> {
        Ok(ImageRecord {
            locator: self.locator_for(&asset.path)?,
            dish: dish.clone(),
            created_at: asset.created_at,
        })
    }

    fn build_stored_path(original_name: &str) -> String {
        let (year, month, day) = OffsetDateTime::now_utc().to_calendar_date();
        let identifier = Uuid::new_v4();
        let filename = sanitize_filename(original_name);
        format!("{year}/{:02}/{:02}/{identifier}-{filename}", month as u8, day)
    }
}

#[async_trait]
impl ImageStore for FileLibrary {
    async fn list_all(&self) -> Result<BTreeMap<DishName, Vec<ImageRecord>>, StoreError> {
        let document = self.read_map().await?;
        let mut snapshot = BTreeMap::new();
        for (raw_name, assets) in &document.dishes {
            let Ok(dish) = DishName::new(raw_name.as_str()) else {
                warn!(
                    target = "infra::library",
                    dish = raw_name.as_str(),
                    "skipping unusable dish key in image map"
                );
                continue;
            };
            let records = assets
                .iter()
                .map(|asset| self.record(&dish, asset))
                .collect::<Result<Vec<_>, _>>()?;
            if !records.is_empty() {
                snapshot.insert(dish, records);
            }
        }
        Ok(snapshot)
    }

    async fn add(&self, image: NewImage, dish: &DishName) -> Result<ImageRecord, StoreError> {
        let mime = mime_guess::from_path(&image.original_name).first_or_octet_stream();
        if mime.type_() != mime_guess::mime::IMAGE {
            return Err(StoreError::invalid_input(format!(
                "`{}` does not look like an image",
                image.original_name
            )));
        }
        if image.payload.is_empty() {
            return Err(StoreError::invalid_input("image payload is empty"));
        }

        let _guard = self.write_guard.lock().await;
        let mut document = self.read_map().await?;

        let relative = Self::build_stored_path(&image.original_name);
        let absolute = self.root.join(&relative);
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(StoreError::from_persistence)?;
        }
        let mut file = fs::File::create(&absolute)
            .await
            .map_err(StoreError::from_persistence)?;
        file.write_all(&image.payload)
            .await
            .map_err(StoreError::from_persistence)?;
        file.flush().await.map_err(StoreError::from_persistence)?;

        let asset = StoredAsset {
            path: relative,
            checksum: hex::encode(Sha256::digest(&image.payload)),
            created_at: OffsetDateTime::now_utc(),
        };
        document
            .dishes
            .entry(dish.as_str().to_string())
            .or_default()
            .push(asset.clone());

        if let Err(err) = self.write_map(&document).await {
            // Orphaned payloads are worse than a failed add.
            let _ = fs::remove_file(&absolute).await;
            return Err(err);
        }
        self.record(dish, &asset)
    }

    async fn remove(&self, locator: &Url) -> Result<(), StoreError> {
        let Some(relative) = self.relative_from_locator(locator) else {
            return Err(StoreError::NotFound);
        };

        let _guard = self.write_guard.lock().await;
        let mut document = self.read_map().await?;

        let mut found = false;
        document.dishes.retain(|_, assets| {
            let before = assets.len();
            assets.retain(|asset| asset.path != relative);
            if assets.len() != before {
                found = true;
            }
            !assets.is_empty()
        });
        if !found {
            return Err(StoreError::NotFound);
        }
        self.write_map(&document).await?;

        match fs::remove_file(self.root.join(&relative)).await {
            Ok(()) => Ok(()),
            // The map is the source of truth; a missing payload is fine.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StoreError::from_persistence(err)),
        }
    }

    async fn recategorize(
        &self,
        locator: &Url,
        from: &DishName,
        to: &DishName,
    ) -> Result<(), StoreError> {
        let Some(relative) = self.relative_from_locator(locator) else {
            return Err(StoreError::NotFound);
        };

        let _guard = self.write_guard.lock().await;
        let mut document = self.read_map().await?;

        let source = document
            .dishes
            .get_mut(from.as_str())
            .ok_or(StoreError::NotFound)?;
        let position = source
            .iter()
            .position(|asset| asset.path == relative)
            .ok_or(StoreError::NotFound)?;
        let asset = source.remove(position);
        if source.is_empty() {
            document.dishes.remove(from.as_str());
        }
        document
            .dishes
            .entry(to.as_str().to_string())
            .or_default()
            .push(asset);

        // One document rewrite carries both sides of the move; a failure
        // here leaves the previous map intact on disk.
        self.write_map(&document).await
    }
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_filename_slugs_and_keeps_the_extension() {
        assert_eq!(sanitize_filename("Bánh Mì Close-Up.JPG"), "banh-mi-close-up.jpg");
        assert_eq!(sanitize_filename("???"), "image");
        assert_eq!(sanitize_filename("noext"), "noext");
    }

    #[test]
    fn locators_round_trip_through_the_public_base() {
        let library = FileLibrary::new(
            std::env::temp_dir().join("plateful-locator-test"),
            std::env::temp_dir().join("plateful-locator-test/map.json"),
            Url::parse("https://menu.example/images/").unwrap(),
        )
        .expect("library");

        let locator = library.locator_for("2025/03/09/abc-pho.jpg").unwrap();
        assert_eq!(
            locator.as_str(),
            "https://menu.example/images/2025/03/09/abc-pho.jpg"
        );
        assert_eq!(
            library.relative_from_locator(&locator).as_deref(),
            Some("2025/03/09/abc-pho.jpg")
        );

        let foreign = Url::parse("https://elsewhere.example/x.jpg").unwrap();
        assert!(library.relative_from_locator(&foreign).is_none());
    }
}
