//! Value types shared across the content and publishing services.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::macros::time;
use time::{Date, Duration, OffsetDateTime};
use url::Url;

use super::error::DomainError;

/// The three content triggers a draft can be composed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    Sales,
    Weather,
    Holiday,
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sales => "sales",
            Self::Weather => "weather",
            Self::Holiday => "holiday",
        };
        f.write_str(label)
    }
}

impl FromStr for TriggerKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sales" => Ok(Self::Sales),
            "weather" => Ok(Self::Weather),
            "holiday" => Ok(Self::Holiday),
            other => Err(DomainError::validation(format!(
                "unknown trigger `{other}` (expected sales, weather, or holiday)"
            ))),
        }
    }
}

/// One line of the sales ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesItem {
    pub name: String,
    pub sold: u64,
}

/// Sales data as the orchestrator exposes it: either a ranking or an
/// explicit "no data" marker when the provider was unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SalesReport {
    Ranked(Vec<SalesItem>),
    Unavailable,
}

impl SalesReport {
    #[must_use]
    pub fn top_item(&self) -> Option<&SalesItem> {
        match self {
            Self::Ranked(items) => items.first(),
            Self::Unavailable => None,
        }
    }

    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

/// Conditions at one point in time, in imperial units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub description: String,
    pub temperature_f: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingHoliday {
    pub name: String,
    pub date: Date,
}

/// What the holiday calendar says about tomorrow and beyond.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HolidayOutlook {
    Tomorrow { name: String },
    Upcoming { name: String, date: Date, days_away: i64 },
    Quiet,
}

impl HolidayOutlook {
    /// Human-readable summary used in prompts and operator output.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Tomorrow { name } => format!("Tomorrow is {name}!"),
            Self::Upcoming {
                name, days_away, ..
            } => {
                format!("Tomorrow is not a holiday. {days_away} days left until {name}.")
            }
            Self::Quiet => "No upcoming holidays found.".to_string(),
        }
    }
}

/// Half-open UTC window handed to the sales provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl DateRange {
    /// The full previous UTC day relative to `now`.
    #[must_use]
    pub fn yesterday_utc(now: OffsetDateTime) -> Self {
        let today = now.date();
        let yesterday = today.previous_day().unwrap_or(today);
        Self {
            start: yesterday.with_time(time!(00:00:00)).assume_utc(),
            end: yesterday.with_time(time!(23:59:59)).assume_utc(),
        }
    }
}

/// Prompt context handed to the caption writer. Serialized into cache
/// signatures, so equal contexts share one generated caption per window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CaptionContext {
    Sales {
        dish: String,
    },
    Weather {
        dish: String,
        description: String,
        temperature_f: f64,
    },
    Holiday {
        message: String,
    },
}

/// Long-lived platform token. `expires_at == None` means validity must be
/// probed remotely.
#[derive(Clone, Serialize, Deserialize)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Option<OffsetDateTime>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of probing the platform's token-introspection endpoint. A valid
/// response without `expires_at` means "validity confirmed, lifetime
/// unknown".
#[derive(Debug, Clone, PartialEq)]
pub struct TokenHealth {
    pub is_valid: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPhase {
    Valid,
    NearExpiry,
    Expired,
}

impl fmt::Display for TokenPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Valid => "valid",
            Self::NearExpiry => "near expiry",
            Self::Expired => "expired",
        };
        f.write_str(label)
    }
}

impl TokenHealth {
    /// Classify the token lifecycle phase; driven by explicit checks, never
    /// by timers.
    #[must_use]
    pub fn phase(&self, now: OffsetDateTime, near_window: Duration) -> TokenPhase {
        if !self.is_valid {
            return TokenPhase::Expired;
        }
        match self.expires_at {
            None => TokenPhase::Valid,
            Some(at) if at <= now => TokenPhase::Expired,
            Some(at) if at - now <= near_window => TokenPhase::NearExpiry,
            Some(_) => TokenPhase::Valid,
        }
    }
}

/// State of one publish attempt. `Failed` absorbs from any non-terminal
/// state; there is no retry edge, a retry starts over from `Draft`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishState {
    Draft,
    ContainerCreated { creation_id: String },
    Published { post_id: Option<String> },
    Failed { reason: String },
}

impl PublishState {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::ContainerCreated { .. } => "container_created",
            Self::Published { .. } => "published",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Transient value object tracking one publish call; never persisted.
#[derive(Debug, Clone)]
pub struct PublishJob {
    pub image: Url,
    pub caption: String,
    pub state: PublishState,
}

impl PublishJob {
    #[must_use]
    pub fn new(image: Url, caption: String) -> Self {
        Self {
            image,
            caption,
            state: PublishState::Draft,
        }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn yesterday_window_covers_the_full_previous_day() {
        let now = datetime!(2025-03-10 15:30:00 UTC);
        let range = DateRange::yesterday_utc(now);
        assert_eq!(range.start, datetime!(2025-03-09 00:00:00 UTC));
        assert_eq!(range.end, datetime!(2025-03-09 23:59:59 UTC));
    }

    #[test]
    fn trigger_kind_parses_case_insensitively() {
        assert_eq!("Sales".parse::<TriggerKind>().unwrap(), TriggerKind::Sales);
        assert_eq!(
            "WEATHER".parse::<TriggerKind>().unwrap(),
            TriggerKind::Weather
        );
        assert!("brunch".parse::<TriggerKind>().is_err());
    }

    #[test]
    fn token_phase_tracks_expiry_window() {
        let now = datetime!(2025-06-01 12:00:00 UTC);
        let window = Duration::days(7);

        let invalid = TokenHealth {
            is_valid: false,
            expires_at: None,
            scopes: vec![],
        };
        assert_eq!(invalid.phase(now, window), TokenPhase::Expired);

        let unknown_lifetime = TokenHealth {
            is_valid: true,
            expires_at: None,
            scopes: vec![],
        };
        assert_eq!(unknown_lifetime.phase(now, window), TokenPhase::Valid);

        let near = TokenHealth {
            is_valid: true,
            expires_at: Some(now + Duration::days(3)),
            scopes: vec![],
        };
        assert_eq!(near.phase(now, window), TokenPhase::NearExpiry);

        let healthy = TokenHealth {
            is_valid: true,
            expires_at: Some(now + Duration::days(40)),
            scopes: vec![],
        };
        assert_eq!(healthy.phase(now, window), TokenPhase::Valid);
    }

    #[test]
    fn access_token_debug_redacts_the_value() {
        let token = AccessToken {
            value: "IGQVJ-secret".to_string(),
            expires_at: None,
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
