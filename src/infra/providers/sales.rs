//! Sales ranking from a Square-style point-of-sale orders API.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::application::content::{ProviderError, SalesProvider};
use crate::domain::types::{DateRange, SalesItem};
use crate::infra::error::InfraError;

const TOP_ITEMS: usize = 5;

pub struct SquareSalesProvider {
    http: Client,
    base: Url,
    access_token: String,
    location_id: String,
}

#[derive(Debug, Deserialize)]
struct OrdersEnvelope {
    #[serde(default)]
    orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
struct Order {
    #[serde(default)]
    line_items: Vec<LineItem>,
}

#[derive(Debug, Deserialize)]
struct LineItem {
    name: Option<String>,
    quantity: Option<String>,
}

impl SquareSalesProvider {
    pub fn new(base: Url, access_token: String, location_id: String) -> Result<Self, InfraError> {
        Ok(Self {
            http: super::http_client()?,
            base,
            access_token,
            location_id,
        })
    }
}

#[async_trait]
impl SalesProvider for SquareSalesProvider {
    async fn top_selling_items(&self, range: &DateRange) -> Result<Vec<SalesItem>, ProviderError> {
        let endpoint = self
            .base
            .join("v2/orders/search")
            .map_err(ProviderError::transport)?;
        let start = range
            .start
            .format(&Rfc3339)
            .map_err(ProviderError::payload)?;
        let end = range.end.format(&Rfc3339).map_err(ProviderError::payload)?;

        let body = serde_json::json!({
            "location_ids": [self.location_id],
            "query": {
                "filter": {
                    "date_time_filter": {
                        "created_at": { "start_at": start, "end_at": end }
                    },
                    "state_filter": { "states": ["COMPLETED"] }
                },
                "sort": { "sort_field": "CREATED_AT", "sort_order": "DESC" }
            }
        });

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport)?;
        let status = response.status();
        if !status.is_success() {
            let payload = response.text().await.unwrap_or_default();
            return Err(ProviderError::transport(format!(
                "orders search returned {status}: {payload}"
            )));
        }
        let envelope: OrdersEnvelope = response.json().await.map_err(ProviderError::payload)?;

        Ok(rank_line_items(&envelope))
    }
}

fn rank_line_items(envelope: &OrdersEnvelope) -> Vec<SalesItem> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for order in &envelope.orders {
        for item in &order.line_items {
            let name = item.name.as_deref().unwrap_or("Unnamed Item");
            // Quantities arrive as decimal strings like "2.0".
            let quantity = item
                .quantity
                .as_deref()
                .and_then(|raw| raw.parse::<f64>().ok())
                .map_or(1, |value| value as u64);
            *counts.entry(name).or_insert(0) += quantity;
        }
    }

    let mut ranked: Vec<SalesItem> = counts
        .into_iter()
        .map(|(name, sold)| SalesItem {
            name: name.to_string(),
            sold,
        })
        .collect();
    ranked.sort_by(|a, b| b.sold.cmp(&a.sold).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(TOP_ITEMS);
    ranked
}
