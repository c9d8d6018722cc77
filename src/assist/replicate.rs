use super::CaptionService;
use crate::config::AssistConfig;
use base64::Engine;
use clipforged_common::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

/// Request timeout for a single API call. Media payloads are inlined, so
/// job creation can take a while on large clips.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const SERVICE: &str = "replicate";

/// A prediction as returned by create and poll calls.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    pub urls: PredictionUrls,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    #[serde(default)]
    pub get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

/// Client for a Replicate-compatible prediction API.
pub struct ReplicateClient {
    client: Client,
    base_url: String,
    token: Option<String>,
    caption_model: String,
    caption_prompt: String,
    transcribe_version: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl ReplicateClient {
    pub fn new(config: &AssistConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                Client::new()
            });

        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone().filter(|t| !t.is_empty()),
            caption_model: config.caption_model.clone(),
            caption_prompt: config.caption_prompt.clone(),
            transcribe_version: config.transcribe_version.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls.max(1),
        }
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| Error::validation("assist api token not configured"))
    }

    /// Create a prediction and wait for it to reach a terminal state.
    pub async fn run(&self, url: &str, body: &Value) -> Result<Value> {
        let token = self.token()?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::tool(SERVICE, format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(Error::tool(
                SERVICE,
                format!("prediction create returned {status}: {error}"),
            ));
        }

        let prediction: Prediction = response
            .json()
            .await
            .map_err(|e| Error::tool(SERVICE, format!("invalid prediction response: {e}")))?;
        tracing::debug!(
            "Created prediction {} ({})",
            prediction.id.as_deref().unwrap_or("?"),
            prediction.status
        );

        let finished = self.wait(prediction, token).await?;
        match finished.status.as_str() {
            "succeeded" => Ok(finished.output),
            status => Err(Error::tool(
                SERVICE,
                format!("prediction {status}: {}", error_text(&finished.error)),
            )),
        }
    }

    async fn wait(&self, mut prediction: Prediction, token: &str) -> Result<Prediction> {
        let mut polls = 0;
        while !prediction.is_terminal() {
            if polls >= self.max_polls {
                return Err(Error::tool_timeout(
                    SERVICE,
                    self.poll_interval * self.max_polls,
                ));
            }
            let url = prediction
                .urls
                .get
                .clone()
                .ok_or_else(|| Error::tool(SERVICE, "prediction has no poll url"))?;

            tokio::time::sleep(self.poll_interval).await;
            polls += 1;

            let response = self
                .client
                .get(&url)
                .bearer_auth(token)
                .send()
                .await
                .map_err(|e| Error::tool(SERVICE, format!("poll failed: {e}")))?;
            if !response.status().is_success() {
                let status = response.status();
                let error = response.text().await.unwrap_or_default();
                return Err(Error::tool(SERVICE, format!("poll returned {status}: {error}")));
            }
            prediction = response
                .json()
                .await
                .map_err(|e| Error::tool(SERVICE, format!("invalid poll response: {e}")))?;
        }
        Ok(prediction)
    }
}

#[async_trait::async_trait]
impl CaptionService for ReplicateClient {
    async fn caption(&self, media: &[u8], mime: &str) -> Result<String> {
        let url = format!("{}/models/{}/predictions", self.base_url, self.caption_model);
        let body = json!({
            "input": {
                "prompt": self.caption_prompt,
                "videos": [data_uri(mime, media)],
            }
        });
        let output = self.run(&url, &body).await?;
        Ok(normalize_output(&output))
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let url = format!("{}/predictions", self.base_url);
        let body = json!({
            "version": self.transcribe_version,
            "input": {
                "audio": data_uri("audio/mp3", audio),
                "language": "auto",
                "translate": false,
                "temperature": 0,
                "transcription": "plain text",
                "condition_on_previous_text": true,
                "no_speech_threshold": 0.6,
            }
        });
        let output = self.run(&url, &body).await?;
        Ok(normalize_output(&output))
    }
}

fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

fn error_text(error: &Value) -> String {
    match error {
        Value::Null => "no error detail".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Flatten a prediction output to text.
///
/// Streams of string chunks are concatenated; transcription objects yield
/// `transcription` or `text`; anything else is rendered as JSON.
pub fn normalize_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Value::Object(map) => ["transcription", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| output.to_string()),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
