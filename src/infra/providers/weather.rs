//! Current conditions and tomorrow's forecast from an OpenWeather-style API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::application::content::{ProviderError, WeatherProvider};
use crate::domain::types::WeatherSnapshot;
use crate::infra::error::InfraError;

pub struct OpenWeatherProvider {
    http: Client,
    base: Url,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ConditionsPayload {
    weather: Vec<ConditionEntry>,
    main: MainEntry,
}

#[derive(Debug, Deserialize)]
struct ConditionEntry {
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainEntry {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ForecastPayload {
    #[serde(default)]
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt_txt: String,
    weather: Vec<ConditionEntry>,
    main: MainEntry,
}

impl OpenWeatherProvider {
    pub fn new(base: Url, api_key: String) -> Result<Self, InfraError> {
        Ok(Self {
            http: super::http_client()?,
            base,
            api_key,
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_conditions(
        &self,
        location: &str,
    ) -> Result<Option<WeatherSnapshot>, ProviderError> {
        let endpoint = self
            .base
            .join("data/2.5/weather")
            .map_err(ProviderError::transport)?;
        let response = self
            .http
            .get(endpoint)
            .query(&[
                ("q", location),
                ("appid", &self.api_key),
                ("units", "imperial"),
            ])
            .send()
            .await
            .map_err(ProviderError::transport)?;
        if !response.status().is_success() {
            // Missing cities and quota misses degrade to "no data".
            return Ok(None);
        }
        let payload: ConditionsPayload = response.json().await.map_err(ProviderError::payload)?;
        Ok(payload.weather.first().map(|entry| WeatherSnapshot {
            description: entry.description.clone(),
            temperature_f: payload.main.temp,
        }))
    }

    async fn tomorrow_forecast(
        &self,
        location: &str,
    ) -> Result<Option<WeatherSnapshot>, ProviderError> {
        let endpoint = self
            .base
            .join("data/2.5/forecast")
            .map_err(ProviderError::transport)?;
        let response = self
            .http
            .get(endpoint)
            .query(&[
                ("q", location),
                ("appid", &self.api_key),
                ("units", "imperial"),
            ])
            .send()
            .await
            .map_err(ProviderError::transport)?;
        if !response.status().is_success() {
            return Ok(None);
        }
        let payload: ForecastPayload = response.json().await.map_err(ProviderError::payload)?;

        let tomorrow = (OffsetDateTime::now_utc() + Duration::days(1)).date().to_string();
        let entries: Vec<&ForecastEntry> = payload
            .list
            .iter()
            .filter(|entry| entry.dt_txt.starts_with(&tomorrow))
            .collect();
        // The midday-ish slot reads better than 03:00.
        let Some(entry) = entries.get(entries.len() / 2) else {
            return Ok(None);
        };
        Ok(entry.weather.first().map(|condition| WeatherSnapshot {
            description: capitalize(&condition.description),
            temperature_f: entry.main.temp,
        }))
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
