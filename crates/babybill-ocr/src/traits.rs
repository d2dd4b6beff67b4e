//! OCR service abstraction
//!
//! This module defines the OcrService trait and the structured guess it returns.

use async_trait::async_trait;
use babybill_core::constants::UNKNOWN;
use babybill_core::models::{Category, LineItem};
use babybill_core::money::{self, lenient};
use babybill_core::AppError;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Structured guess extracted from a receipt photo
///
/// Missing text fields read `"Unknown"` and missing amounts `0.00`; the user
/// confirms or corrects everything during review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptGuess {
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub store_name: String,
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub date: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default = "unknown", deserialize_with = "text_or_unknown")]
    pub payment_method: String,
    #[serde(default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub subtotal: Decimal,
    #[serde(default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub tax: Decimal,
    #[serde(default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub discount: Decimal,
    #[serde(default = "money::zero_amount", deserialize_with = "lenient::amount")]
    pub total_amount: Decimal,
    #[serde(default, deserialize_with = "items_or_empty")]
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub raw_text: Option<String>,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

fn text_or_unknown<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) => text,
        Some(Value::Number(number)) => number.to_string(),
        _ => unknown(),
    })
}

fn items_or_empty<'de, D>(deserializer: D) -> Result<Vec<LineItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<LineItem>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ReceiptGuess {
    /// Decode the `receipt` object of an OCR reply.
    ///
    /// Anything that is not a JSON object with decodable items is a malformed
    /// structure, which is fatal for the attempt.
    pub fn from_value(value: Value) -> Result<Self, AppError> {
        if !value.is_object() {
            return Err(AppError::MalformedOcr(
                "receipt is not a JSON object".to_string(),
            ));
        }
        serde_json::from_value(value).map_err(|e| AppError::MalformedOcr(e.to_string()))
    }
}

/// Wire reply of the receipt-processing service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub receipt: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl OcrResponse {
    /// Interpret the reply: a reported failure is retryable, a success without
    /// a usable receipt is malformed.
    pub fn into_guess(self) -> Result<ReceiptGuess, AppError> {
        if !self.success {
            return Err(AppError::Ocr(
                self.error
                    .unwrap_or_else(|| "Failed to process receipt".to_string()),
            ));
        }
        match self.receipt {
            Some(receipt) => ReceiptGuess::from_value(receipt),
            None => Err(AppError::MalformedOcr(
                "success reply without a receipt".to_string(),
            )),
        }
    }
}

/// Opaque receipt recognition
///
/// One call is one attempt: implementations never retry on their own.
#[async_trait]
pub trait OcrService: Send + Sync {
    /// Extract a structured guess from JPEG bytes
    async fn process_receipt(&self, image: &[u8]) -> Result<ReceiptGuess, AppError>;

    /// Backend name for logs
    fn name(&self) -> &str;
}
