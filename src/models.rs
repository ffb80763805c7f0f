// menu-render-service/src/models.rs

use crate::browser::BrowserHealth;
use crate::error::ErrorResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything needed to render one menu PDF.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub template_id: String,
    #[serde(default = "default_language")]
    pub language: String,
    pub restaurant: RestaurantSnapshot,
    pub categories: Vec<MenuCategory>,
    #[serde(default)]
    pub customizations: Customizations,
    #[serde(default)]
    pub page_format: PageFormat,
    #[serde(default)]
    pub margins: Margins,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantSnapshot {
    pub name: String,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub palette: ColorPalette,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorPalette {
    #[serde(default)]
    pub primary: Option<String>,
    #[serde(default)]
    pub secondary: Option<String>,
    #[serde(default)]
    pub accent: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default = "default_available")]
    pub available: bool,
    #[serde(default)]
    pub featured: bool,
}

fn default_available() -> bool {
    true
}

impl MenuItem {
    /// Available with a real, positive price.
    pub fn is_printable(&self) -> bool {
        self.available && matches!(self.price, Some(p) if p.is_finite() && p > 0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Customizations {
    /// Font settings keyed by language code.
    #[serde(default)]
    pub fonts: BTreeMap<String, FontSettings>,
    #[serde(default)]
    pub page_background: PageBackground,
    #[serde(default)]
    pub rows: RowStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSettings {
    pub family: String,
    /// Path of the font file inside the asset store, e.g. `fonts/Cairo-Regular.ttf`.
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub heading_family: Option<String>,
    #[serde(default)]
    pub heading_source: Option<String>,
    #[serde(default)]
    pub size_pt: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageBackground {
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowStyle {
    #[serde(default = "default_true")]
    pub show_dividers: bool,
    #[serde(default)]
    pub divider_color: Option<String>,
    #[serde(default)]
    pub price_color: Option<String>,
    #[serde(default)]
    pub compact: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RowStyle {
    fn default() -> Self {
        Self {
            show_dividers: true,
            divider_color: None,
            price_color: None,
            compact: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageFormat {
    #[default]
    A4,
    Letter,
}

/// Pixel dimensions at 96 DPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl PageFormat {
    pub fn viewport(self) -> Viewport {
        match self {
            PageFormat::A4 => Viewport {
                width: 794,
                height: 1123,
            },
            PageFormat::Letter => Viewport {
                width: 816,
                height: 1056,
            },
        }
    }

    /// Paper width and height in inches.
    pub fn paper_inches(self) -> (f64, f64) {
        match self {
            PageFormat::A4 => (210.0 / 25.4, 297.0 / 25.4),
            PageFormat::Letter => (8.5, 11.0),
        }
    }

    pub fn css_size(self) -> &'static str {
        match self {
            PageFormat::A4 => "A4",
            PageFormat::Letter => "letter",
        }
    }
}

/// Page margins in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

/// A validated PDF. Only the output validator constructs these.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderResult {
    pdf_bytes: Vec<u8>,
    byte_length: usize,
    validated: bool,
}

impl RenderResult {
    pub(crate) fn validated(pdf_bytes: Vec<u8>) -> Self {
        Self {
            byte_length: pdf_bytes.len(),
            pdf_bytes,
            validated: true,
        }
    }

    pub fn pdf_bytes(&self) -> &[u8] {
        &self.pdf_bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.pdf_bytes
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    pub fn is_validated(&self) -> bool {
        self.validated
    }
}

/// Command carried by an inbound Pub/Sub message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RenderCommand {
    Render(RenderRequest),
    Health {
        #[serde(default)]
        request_id: Option<String>,
    },
    Reset {
        #[serde(default)]
        request_id: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    pub job: RenderJob,
    /// Skip the stored-artifact lookup and render again.
    #[serde(default)]
    pub force_regenerate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfArtifact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_base64: Option<String>,
    pub content_type: String,
    pub byte_length: usize,
    pub sha256: String,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderResponse {
    pub request_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf: Option<PdfArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health: Option<BrowserHealth>,
    pub generated_at: DateTime<Utc>,
}

impl RenderResponse {
    fn new(request_id: String, status: &str) -> Self {
        Self {
            request_id,
            status: status.to_string(),
            pdf: None,
            error: None,
            health: None,
            generated_at: Utc::now(),
        }
    }

    pub fn success(request_id: String, pdf: PdfArtifact) -> Self {
        Self {
            pdf: Some(pdf),
            ..Self::new(request_id, "success")
        }
    }

    pub fn error(request_id: String, error: ErrorResponse) -> Self {
        Self {
            error: Some(error),
            ..Self::new(request_id, "error")
        }
    }

    pub fn health(request_id: String, health: BrowserHealth) -> Self {
        Self {
            health: Some(health),
            ..Self::new(request_id, "success")
        }
    }

    pub fn acknowledged(request_id: String) -> Self {
        Self::new(request_id, "success")
    }
}
