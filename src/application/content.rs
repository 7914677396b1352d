//! Per-trigger content composition.
//!
//! The orchestrator pulls trigger data through the TTL cache, resolves an
//! image for the trigger's dish, obtains caption text (also cached, with
//! any caller-supplied regeneration salt folded into the key), and hands
//! the finished draft to the publish pipeline only on an explicit call —
//! publishing is never automatic.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use thiserror::Error;
use time::{Date, OffsetDateTime};
use tracing::warn;

use crate::application::library::{ImageStore, StoreError};
use crate::application::publish::{PublishError, PublishPipeline, PublishReceipt};
use crate::application::resolver::DishResolver;
use crate::cache::{CallSignature, TtlCache};
use crate::domain::images::ImageRecord;
use crate::domain::types::{
    CaptionContext, DateRange, HolidayOutlook, SalesItem, SalesReport, TriggerKind,
    UpcomingHoliday, WeatherSnapshot,
};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transient upstream failure: {message}")]
    Transport { message: String },
    #[error("upstream payload could not be interpreted: {message}")]
    Payload { message: String },
    #[error("caption generation failed: {message}")]
    Generation { message: String },
}

impl ProviderError {
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport {
            message: message.to_string(),
        }
    }

    pub fn payload(message: impl std::fmt::Display) -> Self {
        Self::Payload {
            message: message.to_string(),
        }
    }

    pub fn generation(message: impl std::fmt::Display) -> Self {
        Self::Generation {
            message: message.to_string(),
        }
    }
}

#[async_trait]
pub trait SalesProvider: Send + Sync {
    /// Ranked sellers for the window, best first.
    async fn top_selling_items(&self, range: &DateRange) -> Result<Vec<SalesItem>, ProviderError>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current_conditions(
        &self,
        location: &str,
    ) -> Result<Option<WeatherSnapshot>, ProviderError>;

    async fn tomorrow_forecast(
        &self,
        location: &str,
    ) -> Result<Option<WeatherSnapshot>, ProviderError>;
}

#[async_trait]
pub trait HolidayProvider: Send + Sync {
    /// The holiday name when tomorrow is one.
    async fn tomorrow_holiday(&self, country: &str) -> Result<Option<String>, ProviderError>;

    async fn next_upcoming_holiday(
        &self,
        country: &str,
        after: Date,
    ) -> Result<Option<UpcomingHoliday>, ProviderError>;
}

/// Opaque text capability: given a prompt context, returns text or fails.
#[async_trait]
pub trait CaptionWriter: Send + Sync {
    async fn compose(&self, context: &CaptionContext) -> Result<String, ProviderError>;
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error("draft has no image to publish")]
    MissingImage,
}

/// A finished caption + image pairing, ready for operator review.
#[derive(Debug, Clone)]
pub struct ContentDraft {
    pub trigger: TriggerKind,
    pub caption: String,
    pub image: Option<ImageRecord>,
    /// Operator-facing summary of the trigger data behind the draft.
    pub context: String,
}

/// Tunables for the orchestrator, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub trigger_ttl: Duration,
    pub caption_ttl: Duration,
    pub hashtags: String,
    pub city: String,
    pub country: String,
}

pub struct ContentOrchestrator {
    cache: Arc<TtlCache>,
    sales: Arc<dyn SalesProvider>,
    weather: Arc<dyn WeatherProvider>,
    holidays: Arc<dyn HolidayProvider>,
    captions: Arc<dyn CaptionWriter>,
    store: Arc<dyn ImageStore>,
    resolver: Arc<DishResolver>,
    pipeline: Arc<PublishPipeline>,
    settings: ContentSettings,
}

impl ContentOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cache: Arc<TtlCache>,
        sales: Arc<dyn SalesProvider>,
        weather: Arc<dyn WeatherProvider>,
        holidays: Arc<dyn HolidayProvider>,
        captions: Arc<dyn CaptionWriter>,
        store: Arc<dyn ImageStore>,
        resolver: Arc<DishResolver>,
        pipeline: Arc<PublishPipeline>,
        settings: ContentSettings,
    ) -> Self {
        Self {
            cache,
            sales,
            weather,
            holidays,
            captions,
            store,
            resolver,
            pipeline,
            settings,
        }
    }

    /// Yesterday's ranking, or an explicit no-data marker when the provider
    /// is unreachable. Raw provider failures never surface to the operator.
    pub async fn sales_report(&self) -> SalesReport {
        let range = DateRange::yesterday_utc(OffsetDateTime::now_utc());
        let signature = CallSignature::of("sales.top_selling_items")
            .arg(&range.start.unix_timestamp())
            .arg(&range.end.unix_timestamp())
            .finish();
        let sales = Arc::clone(&self.sales);

        let outcome: Result<Vec<SalesItem>, ProviderError> = self
            .cache
            .get_or_try_insert_with(signature, self.settings.trigger_ttl, || async move {
                sales.top_selling_items(&range).await
            })
            .await;

        match outcome {
            Ok(items) => SalesReport::Ranked(items),
            Err(err) => {
                warn!(
                    target = "application::content",
                    error = %err,
                    "sales provider unavailable; degrading to a no-data report"
                );
                SalesReport::Unavailable
            }
        }
    }

    pub async fn current_weather(&self) -> Result<Option<WeatherSnapshot>, ContentError> {
        let city = self.settings.city.clone();
        let signature = CallSignature::of("weather.current_conditions")
            .arg(&city)
            .finish();
        let weather = Arc::clone(&self.weather);
        let snapshot = self
            .cache
            .get_or_try_insert_with(signature, self.settings.trigger_ttl, || async move {
                weather.current_conditions(&city).await
            })
            .await?;
        Ok(snapshot)
    }

    pub async fn tomorrow_weather(&self) -> Result<Option<WeatherSnapshot>, ContentError> {
        let city = self.settings.city.clone();
        let signature = CallSignature::of("weather.tomorrow_forecast")
            .arg(&city)
            .finish();
        let weather = Arc::clone(&self.weather);
        let snapshot = self
            .cache
            .get_or_try_insert_with(signature, self.settings.trigger_ttl, || async move {
                weather.tomorrow_forecast(&city).await
            })
            .await?;
        Ok(snapshot)
    }

    pub async fn holiday_outlook(&self) -> Result<HolidayOutlook, ContentError> {
        let country = self.settings.country.clone();
        let tomorrow = OffsetDateTime::now_utc()
            .date()
            .next_day()
            .unwrap_or_else(|| OffsetDateTime::now_utc().date());
        let signature = CallSignature::of("holiday.outlook")
            .arg(&country)
            .arg(&tomorrow.to_string())
            .finish();
        let holidays = Arc::clone(&self.holidays);

        let outlook = self
            .cache
            .get_or_try_insert_with(signature, self.settings.trigger_ttl, || async move {
                if let Some(name) = holidays.tomorrow_holiday(&country).await? {
                    return Ok(HolidayOutlook::Tomorrow { name });
                }
                match holidays.next_upcoming_holiday(&country, tomorrow).await? {
                    Some(holiday) => Ok(HolidayOutlook::Upcoming {
                        days_away: (holiday.date - tomorrow).whole_days(),
                        name: holiday.name,
                        date: holiday.date,
                    }),
                    None => Ok(HolidayOutlook::Quiet),
                }
            })
            .await?;
        Ok(outlook)
    }

    /// Compose a draft for the trigger. `regenerate` is an optional
    /// cache-busting salt: a fresh salt deterministically bypasses the
    /// caption cache instead of waiting for expiry.
    pub async fn compose(
        &self,
        trigger: TriggerKind,
        regenerate: Option<&str>,
    ) -> Result<ContentDraft, ContentError> {
        match trigger {
            TriggerKind::Sales => self.compose_sales(regenerate).await,
            TriggerKind::Weather => self.compose_weather(regenerate).await,
            TriggerKind::Holiday => self.compose_holiday(regenerate).await,
        }
    }

    /// Hand a reviewed draft to the publish pipeline. Explicit user action
    /// only; nothing in this crate schedules a publish.
    pub async fn publish(&self, draft: &ContentDraft) -> Result<PublishReceipt, ContentError> {
        let image = draft.image.as_ref().ok_or(ContentError::MissingImage)?;
        let receipt = self
            .pipeline
            .publish(image.locator.clone(), draft.caption.clone())
            .await?;
        Ok(receipt)
    }

    async fn compose_sales(&self, salt: Option<&str>) -> Result<ContentDraft, ContentError> {
        let report = self.sales_report().await;
        let Some(top) = report.top_item().cloned() else {
            return Ok(ContentDraft {
                trigger: TriggerKind::Sales,
                caption: self.with_hashtags("Sales data is unavailable right now."),
                image: None,
                context: "no sales data".to_string(),
            });
        };

        let context = CaptionContext::Sales {
            dish: top.name.clone(),
        };
        let caption = self.caption_for(&context, salt).await?;
        let image = self.resolver.resolve(&top.name).await?;
        Ok(ContentDraft {
            trigger: TriggerKind::Sales,
            caption,
            image,
            context: format!("Top seller: {} ({} sold)", top.name, top.sold),
        })
    }

    async fn compose_weather(&self, salt: Option<&str>) -> Result<ContentDraft, ContentError> {
        let Some(snapshot) = self.current_weather().await? else {
            return Ok(ContentDraft {
                trigger: TriggerKind::Weather,
                caption: self.with_hashtags("Weather data is unavailable right now."),
                image: None,
                context: "no weather data".to_string(),
            });
        };

        // The orchestrator picks the dish so the caption writer stays an
        // opaque text capability; a random category keeps posts varied.
        let dish = self
            .random_library_dish()
            .await?
            .unwrap_or_else(|| "the kitchen's comfort-food favorite".to_string());

        let context = CaptionContext::Weather {
            dish: dish.clone(),
            description: snapshot.description.clone(),
            temperature_f: snapshot.temperature_f,
        };
        let caption = self.caption_for(&context, salt).await?;
        let image = self.resolver.resolve(&dish).await?;
        let summary = match self.tomorrow_weather().await? {
            Some(tomorrow) => format!(
                "{}, {:.0}°F (tomorrow: {}, {:.0}°F)",
                snapshot.description,
                snapshot.temperature_f,
                tomorrow.description,
                tomorrow.temperature_f
            ),
            None => format!("{}, {:.0}°F", snapshot.description, snapshot.temperature_f),
        };
        Ok(ContentDraft {
            trigger: TriggerKind::Weather,
            caption,
            image,
            context: summary,
        })
    }

    async fn compose_holiday(&self, salt: Option<&str>) -> Result<ContentDraft, ContentError> {
        let outlook = self.holiday_outlook().await?;
        let message = outlook.message();

        let context = CaptionContext::Holiday {
            message: message.clone(),
        };
        let caption = self.caption_for(&context, salt).await?;
        let image = self.image_for_caption(&caption).await?;
        Ok(ContentDraft {
            trigger: TriggerKind::Holiday,
            caption,
            image,
            context: message,
        })
    }

    async fn caption_for(
        &self,
        context: &CaptionContext,
        salt: Option<&str>,
    ) -> Result<String, ContentError> {
        let signature = CallSignature::of("caption.compose")
            .arg(context)
            .arg(&salt)
            .finish();
        let captions = Arc::clone(&self.captions);
        let context = context.clone();
        let text: String = self
            .cache
            .get_or_try_insert_with(signature, self.settings.caption_ttl, || async move {
                captions.compose(&context).await
            })
            .await?;
        Ok(self.with_hashtags(&text))
    }

    fn with_hashtags(&self, caption: &str) -> String {
        let trimmed = caption.trim();
        if self.settings.hashtags.is_empty() {
            trimmed.to_string()
        } else {
            format!("{trimmed}\n\n{}", self.settings.hashtags)
        }
    }

    async fn random_library_dish(&self) -> Result<Option<String>, ContentError> {
        let snapshot = self.store.list_all().await?;
        let keys: Vec<String> = snapshot.keys().map(|dish| dish.as_str().to_string()).collect();
        Ok(keys.choose(&mut rand::thread_rng()).cloned())
    }

    /// Pick an image for free text: prefer a category mentioned in the
    /// caption, otherwise fall back to any category for variety.
    async fn image_for_caption(&self, caption: &str) -> Result<Option<ImageRecord>, ContentError> {
        let snapshot = self.store.list_all().await?;
        let caption_lower = caption.to_lowercase();
        for dish in snapshot.keys() {
            if caption_lower.contains(&dish.as_str().to_lowercase()) {
                return Ok(self.resolver.resolve(dish.as_str()).await?);
            }
        }
        let keys: Vec<String> = snapshot.keys().map(|dish| dish.as_str().to_string()).collect();
        match keys.choose(&mut rand::thread_rng()) {
            Some(dish) => Ok(self.resolver.resolve(dish).await?),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use url::Url;

    use super::*;
    use crate::application::library::NewImage;
    use crate::application::publish::{
        CreationId, ImageRehoster, PlatformClient, PublishPipeline, RefreshedToken, TokenKeeper,
    };
    use crate::domain::aliases::AliasTable;
    use crate::domain::images::DishName;
    use crate::domain::types::{AccessToken, TokenHealth};

    struct EmptyStore;

    #[async_trait]
    impl ImageStore for EmptyStore {
        async fn list_all(&self) -> Result<BTreeMap<DishName, Vec<ImageRecord>>, StoreError> {
            Ok(BTreeMap::new())
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

    struct FlakySales;

    #[async_trait]
    impl SalesProvider for FlakySales {
        async fn top_selling_items(
            &self,
            _range: &DateRange,
        ) -> Result<Vec<SalesItem>, ProviderError> {
            Err(ProviderError::transport("connection refused"))
        }
    }

    struct QuietWeather;

    #[async_trait]
    impl WeatherProvider for QuietWeather {
        async fn current_conditions(
            &self,
            _location: &str,
        ) -> Result<Option<WeatherSnapshot>, ProviderError> {
            Ok(None)
        }

        async fn tomorrow_forecast(
            &self,
            _location: &str,
        ) -> Result<Option<WeatherSnapshot>, ProviderError> {
            Ok(None)
        }
    }

    struct QuietHolidays;

    #[async_trait]
    impl HolidayProvider for QuietHolidays {
        async fn tomorrow_holiday(&self, _country: &str) -> Result<Option<String>, ProviderError> {
            Ok(None)
        }

        async fn next_upcoming_holiday(
            &self,
            _country: &str,
            _after: Date,
        ) -> Result<Option<UpcomingHoliday>, ProviderError> {
            Ok(None)
        }
    }

    struct CountingWriter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CaptionWriter for CountingWriter {
        async fn compose(&self, context: &CaptionContext) -> Result<String, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("caption #{n} for {context:?}"))
        }
    }

    struct InertPlatform;

    #[async_trait]
    impl PlatformClient for InertPlatform {
        async fn create_media(
            &self,
            _account: &str,
            _token: &str,
            _image_url: &Url,
            _caption: &str,
        ) -> Result<CreationId, PublishError> {
            panic!("no publish expected in composition tests")
        }

        async fn publish_media(
            &self,
            _account: &str,
            _token: &str,
            _creation: &CreationId,
        ) -> Result<Option<String>, PublishError> {
            panic!("no publish expected in composition tests")
        }

        async fn token_status(&self, _token: &str) -> Result<TokenHealth, PublishError> {
            panic!("no publish expected in composition tests")
        }

        async fn refresh_token(&self, _token: &str) -> Result<RefreshedToken, PublishError> {
            panic!("no publish expected in composition tests")
        }
    }

    struct InertRehoster;

    #[async_trait]
    impl ImageRehoster for InertRehoster {
        async fn rehost(&self, _locator: &Url) -> Result<Url, PublishError> {
            panic!("no rehost expected in composition tests")
        }
    }

    fn orchestrator(writer: Arc<CountingWriter>) -> ContentOrchestrator {
        let store: Arc<dyn ImageStore> = Arc::new(EmptyStore);
        let resolver = Arc::new(DishResolver::new(
            Arc::clone(&store),
            AliasTable::builtin().clone(),
        ));
        let pipeline = Arc::new(PublishPipeline::new(
            Arc::new(InertPlatform),
            Arc::new(TokenKeeper::new(Some(AccessToken {
                value: "tok".to_string(),
                expires_at: None,
            }))),
            Arc::new(InertRehoster),
            Some("acct".to_string()),
        ));
        ContentOrchestrator::new(
            Arc::new(TtlCache::new()),
            Arc::new(FlakySales),
            Arc::new(QuietWeather),
            Arc::new(QuietHolidays),
            writer,
            store,
            resolver,
            pipeline,
            ContentSettings {
                trigger_ttl: Duration::from_secs(600),
                caption_ttl: Duration::from_secs(600),
                hashtags: "#test".to_string(),
                city: "New York".to_string(),
                country: "US".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn sales_transport_failure_degrades_to_no_data() {
        let writer = Arc::new(CountingWriter {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(Arc::clone(&writer));

        let report = orchestrator.sales_report().await;
        assert!(report.is_unavailable());

        let draft = orchestrator
            .compose(TriggerKind::Sales, None)
            .await
            .expect("degraded draft");
        assert!(draft.image.is_none());
        assert_eq!(draft.context, "no sales data");
        // The caption writer is never consulted without a top seller.
        assert_eq!(writer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn regeneration_salt_bypasses_the_caption_cache() {
        let writer = Arc::new(CountingWriter {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(Arc::clone(&writer));
        let context = CaptionContext::Holiday {
            message: "Tomorrow is Tet!".to_string(),
        };

        let first = orchestrator.caption_for(&context, None).await.unwrap();
        let replay = orchestrator.caption_for(&context, None).await.unwrap();
        assert_eq!(first, replay);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 1);

        let regenerated = orchestrator
            .caption_for(&context, Some("salt-1"))
            .await
            .unwrap();
        assert_ne!(first, regenerated);
        assert_eq!(writer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn hashtags_are_appended_once_per_caption() {
        let writer = Arc::new(CountingWriter {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(writer);
        let draft = orchestrator
            .compose(TriggerKind::Holiday, None)
            .await
            .expect("holiday draft");
        assert!(draft.caption.ends_with("#test"));
        assert_eq!(draft.caption.matches("#test").count(), 1);
    }

    #[tokio::test]
    async fn publishing_a_draft_without_an_image_is_refused() {
        let writer = Arc::new(CountingWriter {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = orchestrator(writer);
        let draft = ContentDraft {
            trigger: TriggerKind::Weather,
            caption: "caption".to_string(),
            image: None,
            context: "context".to_string(),
        };
        let err = orchestrator.publish(&draft).await.expect_err("no image");
        assert!(matches!(err, ContentError::MissingImage));
    }
}
