//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "plateful";

const DEFAULT_GRAPH_BASE: &str = "https://graph.facebook.com/v19.0/";
const DEFAULT_REFRESH_BASE: &str = "https://graph.instagram.com/";
const DEFAULT_MEDIA_HOST_BASE: &str = "https://media.plateful.dev/v1/";
const DEFAULT_SALES_BASE: &str = "https://connect.squareup.com/";
const DEFAULT_WEATHER_BASE: &str = "https://api.openweathermap.org/";
const DEFAULT_HOLIDAY_BASE: &str = "https://calendarific.com/";
const DEFAULT_CAPTION_BASE: &str = "https://api.openai.com/";
const DEFAULT_CAPTION_MODEL: &str = "gpt-4o-mini";
const DEFAULT_CITY: &str = "New York";
const DEFAULT_COUNTRY: &str = "US";
const DEFAULT_LIBRARY_DIR: &str = "library/images";
const DEFAULT_LIBRARY_MAP: &str = "library/dish_image_map.json";
const DEFAULT_PUBLIC_BASE: &str = "http://127.0.0.1:8080/images/";
const DEFAULT_STAGING_TAG: &str = "publish-staging";
const DEFAULT_TRIGGER_TTL_SECS: u64 = 600;
const DEFAULT_CAPTION_TTL_SECS: u64 = 600;
const DEFAULT_HASHTAGS: &str = "#plateful #freshdaily";
const DEFAULT_MAX_WIDTH: u32 = 1080;
const DEFAULT_JPEG_QUALITY: u8 = 85;
const DEFAULT_NEAR_EXPIRY_DAYS: u8 = 7;

/// Command-line arguments for the Plateful binary.
#[derive(Debug, Parser)]
#[command(name = "plateful", version, about = "Plateful content studio")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PLATEFUL_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Compose a draft for a trigger and print it for review.
    Preview(PreviewArgs),
    /// Compose a draft and publish it to the platform.
    Publish(PublishArgs),
    /// Access-token lifecycle operations.
    Token(TokenArgs),
    /// Manage the dish image library.
    Library(LibraryArgs),
}

#[derive(Debug, Args, Clone)]
pub struct PreviewArgs {
    /// Which trigger to compose from: sales, weather, or holiday.
    #[arg(long)]
    pub trigger: String,

    /// Bypass the caption cache and force a fresh generation.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub regenerate: bool,
}

#[derive(Debug, Args, Clone)]
pub struct PublishArgs {
    /// Which trigger to compose from: sales, weather, or holiday.
    #[arg(long)]
    pub trigger: String,

    /// Replace the generated caption with this text before publishing.
    #[arg(long, value_name = "TEXT")]
    pub caption: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum TokenCommand {
    /// Probe the platform for the token's validity and lifetime.
    Status,
    /// Exchange the current long-lived token for a renewed one.
    Refresh,
}

#[derive(Debug, Args, Clone)]
pub struct LibraryArgs {
    #[command(subcommand)]
    pub command: LibraryCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum LibraryCommand {
    /// List every dish category and its images.
    List,
    /// Add an image file to a dish category.
    Add {
        /// Path to the image file.
        #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
        file: PathBuf,
        /// Dish category to file the image under.
        #[arg(long)]
        dish: String,
    },
    /// Remove an image by locator.
    Remove {
        #[arg(value_name = "LOCATOR")]
        locator: Url,
    },
    /// Move an image between dish categories.
    Move {
        #[arg(value_name = "LOCATOR")]
        locator: Url,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub platform: PlatformSettings,
    pub media_host: MediaHostSettings,
    pub library: LibrarySettings,
    pub providers: ProviderSettings,
    pub cache: CacheSettings,
    pub captions: CaptionSettings,
    pub media: MediaSettings,
    pub aliases: AliasSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct PlatformSettings {
    pub account_id: Option<String>,
    pub access_token: Option<String>,
    pub graph_base: Url,
    pub refresh_base: Url,
    pub near_expiry_days: u8,
}

#[derive(Debug, Clone)]
pub struct MediaHostSettings {
    pub base: Url,
    pub api_key: Option<String>,
    pub staging_tag: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryBackend {
    File,
    Hosted,
}

#[derive(Debug, Clone)]
pub struct LibrarySettings {
    pub backend: LibraryBackend,
    pub directory: PathBuf,
    pub map_path: PathBuf,
    pub public_base_url: Url,
    /// Dish tags the hosted backend should search before any were added
    /// through this process.
    pub seed_tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub sales: SalesSettings,
    pub weather: WeatherSettings,
    pub holiday: HolidaySettings,
    pub caption: CaptionProviderSettings,
}

#[derive(Debug, Clone)]
pub struct SalesSettings {
    pub base: Url,
    pub access_token: Option<String>,
    pub location_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WeatherSettings {
    pub base: Url,
    pub api_key: Option<String>,
    pub city: String,
}

#[derive(Debug, Clone)]
pub struct HolidaySettings {
    pub base: Url,
    pub api_key: Option<String>,
    pub country: String,
}

#[derive(Debug, Clone)]
pub struct CaptionProviderSettings {
    pub base: Url,
    pub api_key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub trigger_ttl: Duration,
    pub caption_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct CaptionSettings {
    pub hashtags: String,
}

#[derive(Debug, Clone)]
pub struct MediaSettings {
    pub max_width: NonZeroU32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone)]
pub struct AliasSettings {
    pub file: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("PLATEFUL").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_cli_overrides(cli);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    platform: RawPlatformSettings,
    media_host: RawMediaHostSettings,
    library: RawLibrarySettings,
    sales: RawSalesSettings,
    weather: RawWeatherSettings,
    holiday: RawHolidaySettings,
    caption: RawCaptionSettings,
    cache: RawCacheSettings,
    hashtags: Option<String>,
    media: RawMediaSettings,
    aliases: RawAliasSettings,
}

impl RawSettings {
    fn apply_cli_overrides(&mut self, cli: &CliArgs) {
        if let Some(level) = cli.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = cli.log_json {
            self.logging.json = Some(json);
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPlatformSettings {
    account_id: Option<String>,
    access_token: Option<String>,
    graph_base: Option<String>,
    refresh_base: Option<String>,
    near_expiry_days: Option<u8>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMediaHostSettings {
    base: Option<String>,
    api_key: Option<String>,
    staging_tag: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLibrarySettings {
    backend: Option<String>,
    directory: Option<PathBuf>,
    map_path: Option<PathBuf>,
    public_base_url: Option<String>,
    seed_tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSalesSettings {
    base: Option<String>,
    access_token: Option<String>,
    location_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWeatherSettings {
    base: Option<String>,
    api_key: Option<String>,
    city: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHolidaySettings {
    base: Option<String>,
    api_key: Option<String>,
    country: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCaptionSettings {
    base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    trigger_ttl_seconds: Option<u64>,
    caption_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMediaSettings {
    max_width: Option<u32>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAliasSettings {
    file: Option<PathBuf>,
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            platform,
            media_host,
            library,
            sales,
            weather,
            holiday,
            caption,
            cache,
            hashtags,
            media,
            aliases,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            platform: build_platform_settings(platform)?,
            media_host: build_media_host_settings(media_host)?,
            library: build_library_settings(library)?,
            providers: ProviderSettings {
                sales: build_sales_settings(sales)?,
                weather: build_weather_settings(weather)?,
                holiday: build_holiday_settings(holiday)?,
                caption: build_caption_settings(caption)?,
            },
            cache: build_cache_settings(cache)?,
            captions: CaptionSettings {
                hashtags: hashtags.unwrap_or_else(|| DEFAULT_HASHTAGS.to_string()),
            },
            media: build_media_settings(media)?,
            aliases: AliasSettings {
                file: aliases.file,
            },
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_platform_settings(platform: RawPlatformSettings) -> Result<PlatformSettings, LoadError> {
    let graph_base = parse_base_url(
        platform.graph_base.as_deref().unwrap_or(DEFAULT_GRAPH_BASE),
        "platform.graph_base",
    )?;
    let refresh_base = parse_base_url(
        platform
            .refresh_base
            .as_deref()
            .unwrap_or(DEFAULT_REFRESH_BASE),
        "platform.refresh_base",
    )?;

    Ok(PlatformSettings {
        account_id: non_blank(platform.account_id),
        access_token: non_blank(platform.access_token),
        graph_base,
        refresh_base,
        near_expiry_days: platform.near_expiry_days.unwrap_or(DEFAULT_NEAR_EXPIRY_DAYS),
    })
}

fn build_media_host_settings(
    media_host: RawMediaHostSettings,
) -> Result<MediaHostSettings, LoadError> {
    let base = parse_base_url(
        media_host.base.as_deref().unwrap_or(DEFAULT_MEDIA_HOST_BASE),
        "media_host.base",
    )?;
    let staging_tag = media_host
        .staging_tag
        .filter(|tag| !tag.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STAGING_TAG.to_string());

    Ok(MediaHostSettings {
        base,
        api_key: non_blank(media_host.api_key),
        staging_tag,
    })
}

fn build_library_settings(library: RawLibrarySettings) -> Result<LibrarySettings, LoadError> {
    let backend = match library.backend.as_deref() {
        None | Some("file") => LibraryBackend::File,
        Some("hosted") => LibraryBackend::Hosted,
        Some(other) => {
            return Err(LoadError::invalid(
                "library.backend",
                format!("unknown backend `{other}` (expected `file` or `hosted`)"),
            ));
        }
    };
    let public_base_url = parse_base_url(
        library
            .public_base_url
            .as_deref()
            .unwrap_or(DEFAULT_PUBLIC_BASE),
        "library.public_base_url",
    )?;

    Ok(LibrarySettings {
        backend,
        directory: library
            .directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_DIR)),
        map_path: library
            .map_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LIBRARY_MAP)),
        public_base_url,
        seed_tags: library.seed_tags.unwrap_or_default(),
    })
}

fn build_sales_settings(sales: RawSalesSettings) -> Result<SalesSettings, LoadError> {
    Ok(SalesSettings {
        base: parse_base_url(
            sales.base.as_deref().unwrap_or(DEFAULT_SALES_BASE),
            "sales.base",
        )?,
        access_token: non_blank(sales.access_token),
        location_id: non_blank(sales.location_id),
    })
}

fn build_weather_settings(weather: RawWeatherSettings) -> Result<WeatherSettings, LoadError> {
    Ok(WeatherSettings {
        base: parse_base_url(
            weather.base.as_deref().unwrap_or(DEFAULT_WEATHER_BASE),
            "weather.base",
        )?,
        api_key: non_blank(weather.api_key),
        city: weather.city.unwrap_or_else(|| DEFAULT_CITY.to_string()),
    })
}

fn build_holiday_settings(holiday: RawHolidaySettings) -> Result<HolidaySettings, LoadError> {
    Ok(HolidaySettings {
        base: parse_base_url(
            holiday.base.as_deref().unwrap_or(DEFAULT_HOLIDAY_BASE),
            "holiday.base",
        )?,
        api_key: non_blank(holiday.api_key),
        country: holiday
            .country
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
    })
}

fn build_caption_settings(
    caption: RawCaptionSettings,
) -> Result<CaptionProviderSettings, LoadError> {
    Ok(CaptionProviderSettings {
        base: parse_base_url(
            caption.base.as_deref().unwrap_or(DEFAULT_CAPTION_BASE),
            "caption.base",
        )?,
        api_key: non_blank(caption.api_key),
        model: caption
            .model
            .unwrap_or_else(|| DEFAULT_CAPTION_MODEL.to_string()),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let trigger_secs = cache
        .trigger_ttl_seconds
        .unwrap_or(DEFAULT_TRIGGER_TTL_SECS);
    if trigger_secs == 0 {
        return Err(LoadError::invalid(
            "cache.trigger_ttl_seconds",
            "must be greater than zero",
        ));
    }
    let caption_secs = cache
        .caption_ttl_seconds
        .unwrap_or(DEFAULT_CAPTION_TTL_SECS);
    if caption_secs == 0 {
        return Err(LoadError::invalid(
            "cache.caption_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        trigger_ttl: Duration::from_secs(trigger_secs),
        caption_ttl: Duration::from_secs(caption_secs),
    })
}

fn build_media_settings(media: RawMediaSettings) -> Result<MediaSettings, LoadError> {
    let max_width = NonZeroU32::new(media.max_width.unwrap_or(DEFAULT_MAX_WIDTH))
        .ok_or_else(|| LoadError::invalid("media.max_width", "must be greater than zero"))?;

    let jpeg_quality = media.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    if !(1..=100).contains(&jpeg_quality) {
        return Err(LoadError::invalid(
            "media.jpeg_quality",
            "must be between 1 and 100",
        ));
    }

    Ok(MediaSettings {
        max_width,
        jpeg_quality,
    })
}

fn parse_base_url(raw: &str, key: &'static str) -> Result<Url, LoadError> {
    let url =
        Url::parse(raw).map_err(|err| LoadError::invalid(key, format!("invalid URL: {err}")))?;
    if url.cannot_be_a_base() {
        return Err(LoadError::invalid(key, "URL cannot be used as a base"));
    }
    Ok(url)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
