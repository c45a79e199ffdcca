//! Chat-completions classifier (`OpenAI`-compatible endpoint).

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info_span, Instrument};

use crate::config::ClassifierConfig;
use crate::{AppError, Result};

use super::{from_json, Classification, Classifier};

const SYSTEM_PROMPT: &str = "You are a helpful assistant that analyzes and classifies incoming \
client messages for a software development and consulting company. Respond only with valid JSON.";

/// Build the user prompt asking for the five classification fields.
fn user_prompt(text: &str) -> String {
    format!(
        "Analyze the following message and classify it according to our task system.
Extract the following information and return it in JSON format with these exact field names:
{{
  \"taskType\": \"(FEATURE_REQUEST, BUG, REVISION, RESEARCH, or QUESTION)\",
  \"serviceCategory\": \"(STRATEGY, DESIGN, DEV, or CONSULT)\",
  \"urgency\": \"(urgent, medium, or low)\",
  \"title\": \"A concise title\",
  \"description\": \"A clear description\"
}}

Message:
{text}

Respond in JSON format only."
    )
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Classifier backed by a chat-completions HTTP API in JSON mode.
pub struct OpenAiClassifier {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenAiClassifier {
    /// Build a classifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be constructed.
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn request(&self, text: &str) -> Result<Classification> {
        if self.api_key.is_empty() {
            return Err(AppError::Classification("api key is not configured".into()));
        }

        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(text) },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Classification(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Classification(format!(
                "endpoint returned {status}: {detail}"
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|err| AppError::Classification(format!("malformed response: {err}")))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Classification("response has no content".into()))?;
        debug!(content = %content, "classifier raw answer");

        let value: Value = serde_json::from_str(&content)
            .map_err(|err| AppError::Classification(format!("answer is not JSON: {err}")))?;
        from_json(&value)
    }
}

impl Classifier for OpenAiClassifier {
    fn classify<'a>(
        &'a self,
        text: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Classification>> + Send + 'a>> {
        let span = info_span!("classify", model = %self.model, chars = text.len());
        Box::pin(self.request(text).instrument(span))
    }
}
