use crate::{ClaudeReceiptOcr, HttpOcrService, OcrService};
use babybill_core::{AppError, Config, OcrBackend};
use std::sync::Arc;
use std::time::Duration;

/// Create the OCR backend selected by configuration
pub fn create_ocr_service(config: &Config) -> Result<Arc<dyn OcrService>, AppError> {
    let timeout = Duration::from_secs(config.ocr_timeout_secs);

    match config.ocr_backend {
        OcrBackend::Http => Ok(Arc::new(HttpOcrService::new(
            config.ocr_api_url.clone(),
            timeout,
        )?)),
        OcrBackend::Claude => {
            let api_key = config.anthropic_api_key.clone().ok_or_else(|| {
                AppError::Config("ANTHROPIC_API_KEY not configured".to_string())
            })?;
            Ok(Arc::new(ClaudeReceiptOcr::new(
                api_key,
                config.anthropic_model.clone(),
                timeout,
            )?))
        }
    }
}
