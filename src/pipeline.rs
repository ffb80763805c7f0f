// menu-render-service/src/pipeline.rs

use crate::assets::{AssetInterceptor, RequestInterceptor};
use crate::browser::{
    BrowserHandle, BrowserHealth, BrowserLauncher, BrowserManager, BrowserSettings, PdfOptions,
    RenderContext, RenderPage,
};
use crate::config::Config;
use crate::error::Result;
use crate::models::{PageFormat, RenderJob, RenderResult};
use crate::renderers::{ExportTimeouts, HtmlRenderer, OutputValidator, PdfExporter};
use crate::retry::RetryPolicy;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument};

/// Orchestrates: template → browser → page → export → validate, with retries.
pub struct MenuRenderer {
    html: HtmlRenderer,
    browsers: Arc<BrowserManager>,
    interceptor: Arc<dyn RequestInterceptor>,
    exporter: PdfExporter,
    validator: OutputValidator,
    retry: RetryPolicy,
}

impl MenuRenderer {
    pub fn new(
        html: HtmlRenderer,
        browsers: Arc<BrowserManager>,
        interceptor: Arc<dyn RequestInterceptor>,
        exporter: PdfExporter,
        validator: OutputValidator,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            html,
            browsers,
            interceptor,
            exporter,
            validator,
            retry,
        }
    }

    pub fn from_config(config: &Config, launcher: Arc<dyn BrowserLauncher>) -> anyhow::Result<Self> {
        let assets = AssetInterceptor::from_config(&config.assets)?;
        let html = HtmlRenderer::new(assets.base_href())?;

        let settings = BrowserSettings::from_config(
            &config.browser,
            Duration::from_millis(config.render.page_op_timeout_ms),
        );

        Ok(Self::new(
            html,
            Arc::new(BrowserManager::new(launcher, settings)),
            Arc::new(assets),
            PdfExporter::new(ExportTimeouts::from(&config.render)),
            OutputValidator::new(config.render.min_pdf_bytes),
            RetryPolicy::from(&config.render),
        ))
    }

    pub fn browsers(&self) -> &Arc<BrowserManager> {
        &self.browsers
    }

    /// Render one menu job to a validated PDF.
    #[instrument(skip(self, job), fields(
        template = %job.template_id,
        language = %job.language,
        format = ?job.page_format
    ))]
    pub async fn render(&self, job: &RenderJob) -> Result<RenderResult> {
        let started_at = Instant::now();
        let html = self.html.render(job)?;
        let options = PdfOptions::new(job.page_format, &job.margins);

        let format = job.page_format;
        let html = html.as_str();
        let options = &options;
        let browsers = &self.browsers;

        let result = self
            .retry
            .run(
                move |attempt| self.attempt(attempt, format, html, options),
                move || browsers.force_teardown(),
            )
            .await;

        match &result {
            Ok(pdf) => info!(
                size_kb = pdf.byte_length() / 1024,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "Menu PDF rendered"
            ),
            Err(e) => error!(
                error_type = e.error_type(),
                error = %e,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "Menu PDF render failed"
            ),
        }

        result
    }

    async fn attempt(
        &self,
        attempt: u32,
        format: PageFormat,
        html: &str,
        options: &PdfOptions,
    ) -> Result<RenderResult> {
        let browser = self.browsers.acquire_healthy_browser().await?;
        debug!(attempt, generation = browser.generation(), "Browser acquired");

        let context = self.browsers.acquire_context(&browser, format).await?;
        let mut lease = Lease {
            browsers: self.browsers.clone(),
            handle: browser,
            format,
            context: Some(context.clone()),
            page: None,
        };
        let pages = self.browsers.pages();

        let page = match pages.new_page(context.as_ref(), format).await {
            Ok(page) => lease.page.insert(page),
            Err(e) => {
                lease.release().await;
                return Err(e);
            }
        };

        let exported = match pages.intercept(page.as_ref(), self.interceptor.clone()).await {
            Ok(()) => self.exporter.export(page.as_ref(), html, options).await,
            Err(e) => Err(e),
        };

        lease.release().await;

        self.validator.validate(exported?)
    }

    pub async fn health(&self) -> BrowserHealth {
        self.browsers.health().await
    }

    /// Discard the browser; the next render launches a fresh one.
    pub async fn reset(&self) {
        info!("Resetting browser on request");
        self.browsers.force_teardown().await;
    }

    pub async fn shutdown(&self) {
        info!("Shutting down renderer");
        self.browsers.force_teardown().await;
    }
}

/// Page and context held by one attempt.
///
/// Released explicitly on every normal exit. If the render future is dropped
/// mid-attempt, the page is closed and the context released on a background
/// task instead.
struct Lease {
    browsers: Arc<BrowserManager>,
    handle: BrowserHandle,
    format: PageFormat,
    context: Option<Arc<dyn RenderContext>>,
    page: Option<Box<dyn RenderPage>>,
}

impl Lease {
    async fn release(mut self) {
        let cleanup = self.cleanup();
        cleanup.await;
    }

    fn cleanup(&mut self) -> impl Future<Output = ()> + Send + 'static {
        let browsers = self.browsers.clone();
        let handle = self.handle.clone();
        let format = self.format;
        let page = self.page.take();
        let context = self.context.take();

        async move {
            if let Some(page) = page {
                browsers.pages().close_page(page).await;
            }
            if let Some(context) = context {
                browsers.release_context(&handle, format, context).await;
            }
        }
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.page.is_none() && self.context.is_none() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        debug!(
            generation = self.handle.generation(),
            "Render abandoned mid-attempt, closing its page in the background"
        );
        runtime.spawn(self.cleanup());
    }
}
