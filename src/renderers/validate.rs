// menu-render-service/src/renderers/validate.rs

use crate::error::{OutputDefect, RenderError, Result};
use crate::models::RenderResult;
use tracing::warn;

const PDF_SIGNATURE: &[u8] = b"%PDF-";
const PDF_TRAILER: &[u8] = b"%%EOF";

pub const DEFAULT_MIN_PDF_BYTES: usize = 1000;

/// Byte-level sanity checks on print-to-PDF output. Never repairs.
#[derive(Debug, Clone)]
pub struct OutputValidator {
    min_bytes: usize,
}

impl Default for OutputValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_PDF_BYTES)
    }
}

impl OutputValidator {
    pub fn new(min_bytes: usize) -> Self {
        Self { min_bytes }
    }

    pub fn validate(&self, bytes: Vec<u8>) -> Result<RenderResult> {
        match self.inspect(&bytes) {
            None => Ok(RenderResult::validated(bytes)),
            Some(defect) => {
                warn!(
                    size_bytes = bytes.len(),
                    reason = %defect,
                    "Rejected PDF output"
                );
                Err(RenderError::InvalidOutput(defect))
            }
        }
    }

    fn inspect(&self, bytes: &[u8]) -> Option<OutputDefect> {
        if bytes.is_empty() {
            return Some(OutputDefect::Empty);
        }
        if !bytes.starts_with(PDF_SIGNATURE) {
            return Some(OutputDefect::MissingSignature);
        }
        if !bytes
            .windows(PDF_TRAILER.len())
            .any(|window| window == PDF_TRAILER)
        {
            return Some(OutputDefect::MissingTrailer);
        }
        if bytes.len() < self.min_bytes {
            return Some(OutputDefect::TooSmall {
                len: bytes.len(),
                min: self.min_bytes,
            });
        }
        None
    }
}
