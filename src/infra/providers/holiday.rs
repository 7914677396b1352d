//! National-holiday lookups against a Calendarific-style calendar API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use time::macros::format_description;
use time::Date;
use url::Url;

use crate::application::content::{HolidayProvider, ProviderError};
use crate::domain::types::UpcomingHoliday;
use crate::infra::error::InfraError;

const NATIONAL_TYPE: &str = "National holiday";

pub struct CalendarificHolidays {
    http: Client,
    base: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct HolidaysEnvelope {
    response: HolidaysResponse,
}

#[derive(Debug, Deserialize)]
struct HolidaysResponse {
    #[serde(default)]
    holidays: Vec<HolidayEntry>,
}

#[derive(Debug, Deserialize)]
struct HolidayEntry {
    name: String,
    #[serde(default, rename = "type")]
    kinds: Vec<String>,
    date: HolidayDate,
}

#[derive(Debug, Deserialize)]
struct HolidayDate {
    iso: String,
}

impl CalendarificHolidays {
    pub fn new(base: Url, api_key: String) -> Result<Self, InfraError> {
        Ok(Self {
            http: super::http_client()?,
            base,
            api_key,
        })
    }

    async fn fetch(&self, query: &[(&str, String)]) -> Result<Vec<HolidayEntry>, ProviderError> {
        let endpoint = self
            .base
            .join("api/v2/holidays")
            .map_err(ProviderError::transport)?;
        let response = self
            .http
            .get(endpoint)
            .query(query)
            .send()
            .await
            .map_err(ProviderError::transport)?;
        let status = response.status();
        if !status.is_success() {
            let payload = response.text().await.unwrap_or_default();
            return Err(ProviderError::transport(format!(
                "holiday lookup returned {status}: {payload}"
            )));
        }
        let envelope: HolidaysEnvelope = response.json().await.map_err(ProviderError::payload)?;
        Ok(envelope
            .response
            .holidays
            .into_iter()
            .filter(|entry| entry.kinds.iter().any(|kind| kind == NATIONAL_TYPE))
            .collect())
    }
}

#[async_trait]
impl HolidayProvider for CalendarificHolidays {
    async fn tomorrow_holiday(&self, country: &str) -> Result<Option<String>, ProviderError> {
        let tomorrow = time::OffsetDateTime::now_utc()
            .date()
            .next_day()
            .ok_or_else(|| ProviderError::payload("calendar overflow"))?;
        let holidays = self
            .fetch(&[
                ("api_key", self.api_key.clone()),
                ("country", country.to_string()),
                ("year", tomorrow.year().to_string()),
                ("month", u8::from(tomorrow.month()).to_string()),
                ("day", tomorrow.day().to_string()),
            ])
            .await?;
        Ok(holidays.into_iter().next().map(|entry| entry.name))
    }

    async fn next_upcoming_holiday(
        &self,
        country: &str,
        after: Date,
    ) -> Result<Option<UpcomingHoliday>, ProviderError> {
        let holidays = self
            .fetch(&[
                ("api_key", self.api_key.clone()),
                ("country", country.to_string()),
                ("year", after.year().to_string()),
            ])
            .await?;

        let mut future: Vec<UpcomingHoliday> = holidays
            .into_iter()
            .filter_map(|entry| {
                parse_iso_date(&entry.date.iso).map(|date| UpcomingHoliday {
                    name: entry.name,
                    date,
                })
            })
            .filter(|holiday| holiday.date > after)
            .collect();
        future.sort_by_key(|holiday| holiday.date);
        Ok(future.into_iter().next())
    }
}

/// Calendar dates arrive as `YYYY-MM-DD`, sometimes with a time suffix.
fn parse_iso_date(iso: &str) -> Option<Date> {
    let format = format_description!("[year]-[month]-[day]");
    let day_part = iso.get(..10)?;
    Date::parse(day_part, &format).ok()
}

#[cfg(test)]
mod tests {
    use time::macros::date;

    use super::*;

    #[test]
    fn iso_dates_parse_with_and_without_time_suffix() {
        assert_eq!(parse_iso_date("2025-07-04"), Some(date!(2025 - 07 - 04)));
        assert_eq!(
            parse_iso_date("2025-12-25T00:00:00-05:00"),
            Some(date!(2025 - 12 - 25))
        );
        assert_eq!(parse_iso_date("soon"), None);
    }
}
