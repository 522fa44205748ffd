//! Reqwest adapters for the three AI services.
//!
//! Each adapter owns transport only: request body, auth headers, status
//! mapping and pulling the one text field the orchestrator needs out of the
//! response. A missing text field is a decode error, never an empty answer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::{json, Value};

use super::ports::{NarrativeSummarizer, PatternAnalyzer, PortError, TextExtractor};
use crate::models::VisionInsight;

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const VISION_BASE_URL: &str = "https://vision.googleapis.com";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PATTERN_MAX_TOKENS: u32 = 1000;
const SUMMARY_MAX_TOKENS: u32 = 500;
const VISION_MAX_RESULTS: u32 = 10;

/// Endpoint, credential and model for one service.
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(timeout).build()
}

async fn read_json(response: Response) -> Result<Value, PortError> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(PortError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).chars().take(500).collect(),
        });
    }
    serde_json::from_slice(&body).map_err(|e| PortError::Decode(format!("invalid JSON payload: {e}")))
}

/// Pattern analysis over the user's free-text entries (Anthropic messages API).
pub struct AnthropicPatternAnalyzer {
    client: Client,
    endpoint: ServiceEndpoint,
}

impl AnthropicPatternAnalyzer {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: ServiceEndpoint, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self { client: http_client(timeout)?, endpoint })
    }
}

fn pattern_request(model: &str, text: &str) -> Value {
    json!({
        "model": model,
        "max_tokens": PATTERN_MAX_TOKENS,
        "messages": [{
            "role": "user",
            "content": format!(
                "Analyze this health data and identify patterns. Focus on frequency of symptoms, triggers, and trends. Data: {text}"
            ),
        }],
    })
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

fn parse_messages(body: Value) -> Result<String, PortError> {
    let decoded: MessagesResponse =
        serde_json::from_value(body).map_err(|e| PortError::Decode(e.to_string()))?;
    decoded
        .content
        .into_iter()
        .next()
        .and_then(|block| block.text)
        .ok_or_else(|| PortError::Decode("messages response has no text content".into()))
}

#[async_trait]
impl PatternAnalyzer for AnthropicPatternAnalyzer {
    async fn analyze_patterns(&self, text: &str) -> Result<String, PortError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.endpoint.base_url))
            .header("x-api-key", &self.endpoint.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&pattern_request(&self.endpoint.model, text))
            .send()
            .await?;
        parse_messages(read_json(response).await?)
    }
}

/// Text recognition on uploaded images (Google Vision `images:annotate`).
pub struct GoogleVisionExtractor {
    client: Client,
    base_url: String,
    api_key: String,
}

impl GoogleVisionExtractor {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(base_url: String, api_key: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self { client: http_client(timeout)?, base_url, api_key })
    }
}

fn annotate_request(image_url: &str) -> Value {
    json!({
        "requests": [{
            "image": { "source": { "imageUri": image_url } },
            "features": [{ "type": "TEXT_DETECTION", "maxResults": VISION_MAX_RESULTS }],
        }],
    })
}

/// Document text when present, else the first text annotation, else `""`.
fn parse_annotation(body: &Value) -> Result<String, PortError> {
    let first = body
        .get("responses")
        .and_then(|r| r.get(0))
        .ok_or_else(|| PortError::Decode("annotate response has no responses".into()))?;

    if let Some(message) = first.pointer("/error/message").and_then(Value::as_str) {
        return Err(PortError::Decode(format!("annotate error: {message}")));
    }

    let text = first
        .pointer("/fullTextAnnotation/text")
        .or_else(|| first.pointer("/textAnnotations/0/description"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok(text.to_string())
}

#[async_trait]
impl TextExtractor for GoogleVisionExtractor {
    async fn extract_text(&self, image_url: &str) -> Result<String, PortError> {
        let response = self
            .client
            .post(format!("{}/v1/images:annotate", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&annotate_request(image_url))
            .send()
            .await?;
        parse_annotation(&read_json(response).await?)
    }
}

/// Human-readable write-up of the patterns and image findings (OpenAI chat completions).
pub struct OpenAiSummarizer {
    client: Client,
    endpoint: ServiceEndpoint,
}

impl OpenAiSummarizer {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: ServiceEndpoint, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self { client: http_client(timeout)?, endpoint })
    }
}

fn summary_request(model: &str, patterns: &str, insights: &[VisionInsight]) -> Result<Value, PortError> {
    let image_data = serde_json::to_string(insights).map_err(|e| PortError::Decode(e.to_string()))?;
    Ok(json!({
        "model": model,
        "max_tokens": SUMMARY_MAX_TOKENS,
        "messages": [{
            "role": "user",
            "content": format!(
                "Create a professional health summary and recommendations based on this analysis:\n\n\
                 Patterns: {patterns}\n\
                 Image Data: {image_data}\n\n\
                 Format as a narrative summary with actionable health tips."
            ),
        }],
    }))
}

fn parse_completion(body: &Value) -> Result<String, PortError> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PortError::Decode("completion response has no message content".into()))
}

#[async_trait]
impl NarrativeSummarizer for OpenAiSummarizer {
    async fn summarize(&self, patterns: &str, insights: &[VisionInsight]) -> Result<String, PortError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint.base_url))
            .bearer_auth(&self.endpoint.api_key)
            .json(&summary_request(&self.endpoint.model, patterns, insights)?)
            .send()
            .await?;
        parse_completion(&read_json(response).await?)
    }
}
