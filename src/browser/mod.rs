// menu-render-service/src/browser/mod.rs

//! Browser abstraction used by the render pipeline.
//!
//! The traits here are the only surface the pipeline sees; [`chromium`]
//! implements them over the DevTools protocol. Lifecycle policy (single
//! shared process, health checks, teardown) lives in [`manager`], page
//! construction in [`factory`].

pub mod chromium;
pub mod factory;
pub mod manager;

use crate::assets::RequestInterceptor;
use crate::models::{Margins, PageFormat, Viewport};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

pub use chromium::ChromiumLauncher;
pub use manager::{BrowserHandle, BrowserHealth, BrowserManager, BrowserSettings};

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    Launch(String),

    #[error("browser disconnected")]
    Disconnected,

    #[error("protocol error: {0}")]
    Protocol(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Starts browser processes.
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    async fn launch(&self) -> DriverResult<Arc<dyn BrowserSession>>;
}

/// One running browser process.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Connected and answering protocol calls.
    async fn is_healthy(&self) -> bool;

    /// Create an isolated context with its own cookie and storage jar.
    async fn new_context(&self, viewport: Viewport) -> DriverResult<Arc<dyn RenderContext>>;

    async fn close(&self) -> DriverResult<()>;
}

/// An isolated browsing context inside a session.
#[async_trait]
pub trait RenderContext: Send + Sync {
    fn viewport(&self) -> Viewport;

    async fn new_page(&self) -> DriverResult<Box<dyn RenderPage>>;

    /// Number of pages currently open in this context.
    async fn open_pages(&self) -> DriverResult<usize>;

    async fn close(&self) -> DriverResult<()>;
}

/// A single tab, used for exactly one render attempt.
#[async_trait]
pub trait RenderPage: Send + Sync {
    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()>;

    /// Route every subsequent resource request through `interceptor`.
    async fn attach_interceptor(&self, interceptor: Arc<dyn RequestInterceptor>)
        -> DriverResult<()>;

    async fn emulate_print_media(&self) -> DriverResult<()>;

    /// Load `html` and resolve once the DOM is constructed.
    async fn set_content(&self, html: &str) -> DriverResult<()>;

    async fn wait_for_fonts(&self) -> DriverResult<()>;

    /// Resolves once no subresource is still loading. May never resolve.
    async fn wait_for_network_idle(&self) -> DriverResult<()>;

    async fn print_to_pdf(&self, options: &PdfOptions) -> DriverResult<Vec<u8>>;

    async fn close(self: Box<Self>) -> DriverResult<()>;
}

/// Print-to-PDF parameters, in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub print_background: bool,
    pub prefer_css_page_size: bool,
}

const MM_PER_INCH: f64 = 25.4;

impl PdfOptions {
    pub fn new(format: PageFormat, margins: &Margins) -> Self {
        let (paper_width, paper_height) = format.paper_inches();
        Self {
            paper_width,
            paper_height,
            margin_top: margins.top / MM_PER_INCH,
            margin_right: margins.right / MM_PER_INCH,
            margin_bottom: margins.bottom / MM_PER_INCH,
            margin_left: margins.left / MM_PER_INCH,
            print_background: true,
            prefer_css_page_size: true,
        }
    }
}
