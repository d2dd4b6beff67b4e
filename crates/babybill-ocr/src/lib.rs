//! BabyBill OCR Library
//!
//! Turns a receipt photo into a structured guess. The recognition itself is
//! opaque: either a receipt-processing HTTP service or Claude vision.

pub mod claude;
pub mod factory;
pub mod http;
pub mod traits;

pub use claude::ClaudeReceiptOcr;
pub use factory::create_ocr_service;
pub use http::HttpOcrService;
pub use traits::{OcrResponse, OcrService, ReceiptGuess};
