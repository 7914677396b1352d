//! Caption text from a chat-completion endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::application::content::{CaptionWriter, ProviderError};
use crate::domain::types::CaptionContext;
use crate::infra::error::InfraError;

pub struct ChatCaptionWriter {
    http: Client,
    base: Url,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct CompletionPayload {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: String,
}

impl ChatCaptionWriter {
    pub fn new(base: Url, api_key: String, model: String) -> Result<Self, InfraError> {
        Ok(Self {
            http: super::http_client()?,
            base,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl CaptionWriter for ChatCaptionWriter {
    async fn compose(&self, context: &CaptionContext) -> Result<String, ProviderError> {
        let endpoint = self
            .base
            .join("v1/chat/completions")
            .map_err(ProviderError::transport)?;
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt_for(context) }],
        });

        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::transport)?;
        let status = response.status();
        if !status.is_success() {
            let payload = response.text().await.unwrap_or_default();
            return Err(ProviderError::generation(format!(
                "completion returned {status}: {payload}"
            )));
        }

        let payload: CompletionPayload =
            response.json().await.map_err(ProviderError::payload)?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .filter(|text| !text.is_empty())
            .ok_or_else(|| ProviderError::generation("completion carried no text"))
    }
}

fn prompt_for(context: &CaptionContext) -> String {
    match context {
        CaptionContext::Sales { dish } => format!(
            "Write a social media caption promoting the dish '{dish}' in an appetizing, fun, and catchy way."
        ),
        CaptionContext::Weather {
            dish,
            description,
            temperature_f,
        } => format!(
            "Write a social media caption recommending {dish} for a {description} day with a \
             temperature of {temperature_f}°F. Make the caption appealing and cozy, and mention \
             the dish by name."
        ),
        CaptionContext::Holiday { message } => format!(
            "Write a social media caption based on this holiday info: '{message}'. Connect it to \
             enjoying a delicious meal out. Make it festive and fun."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_carry_the_trigger_details() {
        let sales = prompt_for(&CaptionContext::Sales {
            dish: "Pho".to_string(),
        });
        assert!(sales.contains("'Pho'"));

        let weather = prompt_for(&CaptionContext::Weather {
            dish: "Sandwich".to_string(),
            description: "light rain".to_string(),
            temperature_f: 54.0,
        });
        assert!(weather.contains("light rain"));
        assert!(weather.contains("54"));

        let holiday = prompt_for(&CaptionContext::Holiday {
            message: "Tomorrow is Tet!".to_string(),
        });
        assert!(holiday.contains("Tet"));
    }
}
