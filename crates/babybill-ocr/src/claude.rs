//! Receipt extraction with Anthropic's Claude vision models

use anyhow::Context;
use async_trait::async_trait;
use babybill_core::AppError;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::traits::{OcrService, ReceiptGuess};

const API_BASE: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

const RECEIPT_PROMPT: &str = r#"You are a receipt parser. Extract structured data from this receipt photo.
Return ONLY valid JSON with this exact format:
{
    "store_name": "Store Name",
    "date": "YYYY-MM-DD",
    "total_amount": "0.00",
    "subtotal": "0.00",
    "tax": "0.00",
    "discount": "0.00",
    "payment_method": "Cash|Credit|Debit|Unknown",
    "category": "Food|Bills|Gas|Shopping|Medical|Other",
    "items": [
        {"name": "Item name", "price": "0.00", "quantity": 1}
    ],
    "raw_text": "Every line of text printed on the receipt, separated by newlines"
}
If you can't determine a field, use "Unknown" for strings and "0.00" for amounts.
For category, pick the best match from: Food, Bills, Gas, Shopping, Medical, Other."#;

/// Claude vision receipt extractor
pub struct ClaudeReceiptOcr {
    http_client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl Debug for ClaudeReceiptOcr {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ClaudeReceiptOcr")
            .field("model", &self.model)
            .finish()
    }
}

// Messages API request/response structures
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<MessageParam>,
}

#[derive(Debug, Serialize)]
struct MessageParam {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Debug, Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlockResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlockResponse {
    Text { text: String },
    #[serde(other)]
    Other,
}

impl ClaudeReceiptOcr {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let api_key = api_key.into();
        validate_api_key(&api_key)?;

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for Claude")?;

        Ok(Self {
            http_client,
            api_key,
            model: model.into(),
            base_url: API_BASE.to_string(),
        })
    }

    /// Point the client at another Messages API host
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Call Claude Messages API with the photo and return the first text block
    async fn request_extraction(&self, image: &[u8]) -> Result<String, AppError> {
        use base64::Engine;
        let base64_image = base64::engine::general_purpose::STANDARD.encode(image);

        let body = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: 0.1,
            messages: vec![MessageParam {
                role: "user".to_string(),
                content: vec![
                    ContentBlock::Image {
                        source: ImageSource {
                            source_type: "base64".to_string(),
                            media_type: detect_media_type(image).to_string(),
                            data: base64_image,
                        },
                    },
                    ContentBlock::Text {
                        text: RECEIPT_PROMPT.to_string(),
                    },
                ],
            }],
        };

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Ocr(format!("Failed to send request to Claude: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Ocr(format!(
                "Claude request failed: {} - {}",
                status, error_text
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AppError::MalformedOcr(format!("Unexpected Claude reply: {}", e)))?;

        parsed
            .content
            .into_iter()
            .find_map(|b| match b {
                ContentBlockResponse::Text { text } => Some(text),
                ContentBlockResponse::Other => None,
            })
            .ok_or_else(|| AppError::MalformedOcr("Claude reply has no text".to_string()))
    }

    /// Parse Claude's JSON answer, tolerating a markdown code fence around it
    fn parse_extraction(text: &str) -> Result<ReceiptGuess, AppError> {
        let json_text = if text.contains("```json") {
            text.split("```json")
                .nth(1)
                .and_then(|s| s.split("```").next())
                .unwrap_or(text)
                .trim()
        } else if text.contains("```") {
            text.split("```")
                .nth(1)
                .and_then(|s| s.split("```").next())
                .unwrap_or(text)
                .trim()
        } else {
            text.trim()
        };

        let value: serde_json::Value = serde_json::from_str(json_text)
            .map_err(|e| AppError::MalformedOcr(format!("Answer is not valid JSON: {}", e)))?;
        ReceiptGuess::from_value(value)
    }
}

fn validate_api_key(api_key: &str) -> Result<(), AppError> {
    if api_key.is_empty() {
        return Err(AppError::Config(
            "Anthropic API key is required but not provided".to_string(),
        ));
    }
    if api_key == "your-api-key" || api_key == "sk-ant-" || api_key.len() < 10 {
        return Err(AppError::Config(
            "Anthropic API key appears to be invalid or a placeholder".to_string(),
        ));
    }
    Ok(())
}

/// Detect media type from image data using magic numbers
fn detect_media_type(data: &[u8]) -> &'static str {
    match data {
        [0x89, 0x50, 0x4E, 0x47, ..] => "image/png",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => "image/webp",
        _ => "image/jpeg",
    }
}

#[async_trait]
impl OcrService for ClaudeReceiptOcr {
    async fn process_receipt(&self, image: &[u8]) -> Result<ReceiptGuess, AppError> {
        let start = std::time::Instant::now();
        tracing::info!(image_size = image.len(), model = %self.model, "Sending receipt to Claude");

        let text = self.request_extraction(image).await?;
        let guess = Self::parse_extraction(&text)?;

        tracing::info!(
            store_name = %guess.store_name,
            total_amount = %guess.total_amount,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Claude extracted receipt"
        );
        Ok(guess)
    }

    fn name(&self) -> &str {
        "claude"
    }
}
