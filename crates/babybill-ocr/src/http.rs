//! Client for the receipt-processing HTTP service
//!
//! `POST {base_url}/process-receipt` with a multipart `image` field; the reply is
//! `{ success, receipt?, error? }`.

use anyhow::Context;
use async_trait::async_trait;
use babybill_core::AppError;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::traits::{OcrResponse, OcrService, ReceiptGuess};

pub struct HttpOcrService {
    http_client: reqwest::Client,
    base_url: String,
}

impl Debug for HttpOcrService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("HttpOcrService")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl HttpOcrService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client for OCR service")?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/process-receipt", self.base_url)
    }
}

#[async_trait]
impl OcrService for HttpOcrService {
    async fn process_receipt(&self, image: &[u8]) -> Result<ReceiptGuess, AppError> {
        let start = std::time::Instant::now();
        let filename = format!("receipt_{}.jpg", Utc::now().timestamp_millis());

        let part = Part::bytes(image.to_vec())
            .file_name(filename)
            .mime_str("image/jpeg")
            .map_err(|e| AppError::Internal(format!("Invalid image part: {}", e)))?;
        let form = Form::new().part("image", part);

        tracing::info!(
            image_size = image.len(),
            endpoint = %self.endpoint(),
            "Sending receipt to OCR service"
        );

        let response = self
            .http_client
            .post(self.endpoint())
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Ocr(format!("Could not reach the OCR service: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Ocr(format!("Failed to read OCR reply: {}", e)))?;

        let parsed: OcrResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(AppError::Ocr(format!(
                    "OCR service request failed: {} - {}",
                    status, body
                )));
            }
            Err(e) => {
                return Err(AppError::MalformedOcr(format!(
                    "Reply is not valid JSON: {}",
                    e
                )));
            }
        };

        let result = parsed.into_guess();

        match &result {
            Ok(guess) => tracing::info!(
                store_name = %guess.store_name,
                total_amount = %guess.total_amount,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "OCR service extracted receipt"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                status = %status,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "OCR service did not return a receipt"
            ),
        }

        result
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn service(url: &str) -> HttpOcrService {
        HttpOcrService::new(url, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_process_receipt_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/process-receipt")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data.*".to_string()),
            )
            .match_body(Matcher::Regex(r#"name="image"; filename="receipt_\d+\.jpg""#.to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success": true, "receipt": {"store_name": "Costco", "date": "2024-01-01", "total_amount": "42.10", "category": "Food", "items": []}}"#,
            )
            .create_async()
            .await;

        let guess = service(&server.url())
            .process_receipt(b"jpeg bytes")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(guess.store_name, "Costco");
        assert_eq!(guess.total_amount.to_string(), "42.10");
    }

    #[tokio::test]
    async fn test_reported_failure_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/process-receipt")
            .with_status(500)
            .with_body(r#"{"error": "Failed to upload image"}"#)
            .create_async()
            .await;

        let err = service(&server.url())
            .process_receipt(b"jpeg")
            .await
            .unwrap_err();
        match err {
            AppError::Ocr(msg) => assert_eq!(msg, "Failed to upload image"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_error_page_is_retryable() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/process-receipt")
            .with_status(502)
            .with_body("<html>Bad Gateway</html>")
            .create_async()
            .await;

        let err = service(&server.url())
            .process_receipt(b"jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ocr(_)));
    }

    #[tokio::test]
    async fn test_garbled_success_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/process-receipt")
            .with_status(200)
            .with_body(r#"{"success": true, "receipt": "Costco 42.10"}"#)
            .create_async()
            .await;

        let err = service(&server.url())
            .process_receipt(b"jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MalformedOcr(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let err = service("http://127.0.0.1:9")
            .process_receipt(b"jpeg")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Ocr(_)));
    }
}
