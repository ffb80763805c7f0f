// menu-render-service/src/renderers/pdf.rs

use crate::browser::{PdfOptions, RenderPage};
use crate::config::RenderConfig;
use crate::error::{RenderError, RenderStage, Result};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Upper bounds for every stage of an export that can hang.
#[derive(Debug, Clone)]
pub struct ExportTimeouts {
    pub navigation: Duration,
    pub fonts: Duration,
    pub network_idle: Duration,
    pub export: Duration,
}

impl Default for ExportTimeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            fonts: Duration::from_secs(5),
            network_idle: Duration::from_secs(3),
            export: Duration::from_secs(30),
        }
    }
}

impl From<&RenderConfig> for ExportTimeouts {
    fn from(config: &RenderConfig) -> Self {
        Self {
            navigation: Duration::from_millis(config.navigation_timeout_ms),
            fonts: Duration::from_millis(config.font_timeout_ms),
            network_idle: Duration::from_millis(config.network_idle_timeout_ms),
            export: Duration::from_millis(config.export_timeout_ms),
        }
    }
}

pub struct PdfExporter {
    timeouts: ExportTimeouts,
}

impl PdfExporter {
    pub fn new(timeouts: ExportTimeouts) -> Self {
        Self { timeouts }
    }

    /// Drive `page` from raw HTML to PDF bytes.
    ///
    /// Timed-out futures are dropped here; the caller closes the page so the
    /// browser stops any work that is still running for it.
    pub async fn export(&self, page: &dyn RenderPage, html: &str, options: &PdfOptions) -> Result<Vec<u8>> {
        let started_at = Instant::now();
        let navigation_ms = self.timeouts.navigation.as_millis() as u64;

        match timeout(self.timeouts.navigation, page.emulate_print_media()).await {
            Ok(result) => result.map_err(|e| RenderError::browser(RenderStage::Navigation, e))?,
            Err(_) => {
                return Err(RenderError::NavigationTimeout {
                    timeout_ms: navigation_ms,
                })
            }
        }

        match timeout(self.timeouts.navigation, page.set_content(html)).await {
            Ok(result) => result.map_err(|e| RenderError::browser(RenderStage::Navigation, e))?,
            Err(_) => {
                warn!(timeout_ms = navigation_ms, "Timed out loading menu HTML");
                return Err(RenderError::NavigationTimeout {
                    timeout_ms: navigation_ms,
                });
            }
        }
        debug!(
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "DOM content loaded"
        );

        match timeout(self.timeouts.fonts, page.wait_for_fonts()).await {
            Ok(result) => result.map_err(|e| RenderError::browser(RenderStage::Fonts, e))?,
            Err(_) => warn!(
                timeout_ms = self.timeouts.fonts.as_millis() as u64,
                "Web fonts not ready in time, printing with fallbacks"
            ),
        }

        match timeout(self.timeouts.network_idle, page.wait_for_network_idle()).await {
            Ok(result) => result.map_err(|e| RenderError::browser(RenderStage::NetworkIdle, e))?,
            Err(_) => debug!(
                timeout_ms = self.timeouts.network_idle.as_millis() as u64,
                "Network not idle before ceiling, continuing"
            ),
        }

        let pdf = match timeout(self.timeouts.export, page.print_to_pdf(options)).await {
            Ok(result) => result.map_err(|e| RenderError::browser(RenderStage::Export, e))?,
            Err(_) => {
                warn!(
                    timeout_ms = self.timeouts.export.as_millis() as u64,
                    "Timed out printing PDF"
                );
                return Err(RenderError::ExportTimeout {
                    timeout_ms: self.timeouts.export.as_millis() as u64,
                });
            }
        };

        info!(
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            size_kb = pdf.len() / 1024,
            "PDF exported"
        );

        Ok(pdf)
    }
}
