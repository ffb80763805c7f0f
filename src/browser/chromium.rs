// menu-render-service/src/browser/chromium.rs

use super::{
    BrowserLauncher, BrowserSession, DriverError, DriverResult, PdfOptions, RenderContext,
    RenderPage,
};
use crate::assets::{InterceptedRequest, Interception, RequestInterceptor, ResourceKind};
use crate::config::BrowserConfig as LaunchConfig;
use crate::models::Viewport;
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetEmulatedMediaParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams, FulfillRequestParams, HeaderEntry, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, ResourceType};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams, GetTargetsParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_ARGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-extensions",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--font-render-hinting=none",
    "--hide-scrollbars",
    "--mute-audio",
];

const FONTS_READY: &str = "document.fonts.ready.then(() => true)";

const NETWORK_IDLE_PROBE: &str = "document.readyState === 'complete' \
    && Array.from(document.images).every((img) => img.complete)";

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

fn protocol(err: CdpError) -> DriverError {
    DriverError::Protocol(err.to_string())
}

fn script_result(err: serde_json::Error) -> DriverError {
    DriverError::Protocol(format!("unexpected script result: {}", err))
}

/// Launches headless Chromium over the DevTools protocol.
pub struct ChromiumLauncher {
    executable: Option<String>,
    extra_args: Vec<String>,
}

impl ChromiumLauncher {
    pub fn new(config: &LaunchConfig) -> Self {
        Self {
            executable: config.executable.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    fn browser_config(&self) -> DriverResult<BrowserConfig> {
        let mut builder = BrowserConfig::builder().no_sandbox();
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        for arg in DEFAULT_ARGS {
            builder = builder.arg(*arg);
        }
        for arg in &self.extra_args {
            builder = builder.arg(arg.clone());
        }
        builder.build().map_err(DriverError::Launch)
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> DriverResult<Arc<dyn BrowserSession>> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let connected = Arc::new(AtomicBool::new(true));
        let flag = connected.clone();
        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser event loop error");
                }
            }
            flag.store(false, Ordering::SeqCst);
            warn!("Browser connection closed");
        });

        info!(executable = ?self.executable, "Chromium process started");

        Ok(Arc::new(ChromiumSession {
            inner: Arc::new(SessionInner {
                browser: Mutex::new(Some(browser)),
                connected,
            }),
            events,
        }))
    }
}

struct SessionInner {
    browser: Mutex<Option<Browser>>,
    connected: Arc<AtomicBool>,
}

impl SessionInner {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

pub struct ChromiumSession {
    inner: Arc<SessionInner>,
    events: JoinHandle<()>,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn is_healthy(&self) -> bool {
        if !self.inner.is_connected() {
            return false;
        }
        let guard = self.inner.browser.lock().await;
        match guard.as_ref() {
            Some(browser) => browser.version().await.is_ok(),
            None => false,
        }
    }

    async fn new_context(&self, viewport: Viewport) -> DriverResult<Arc<dyn RenderContext>> {
        let guard = self.inner.browser.lock().await;
        let browser = guard.as_ref().ok_or(DriverError::Disconnected)?;
        let response = browser
            .execute(CreateBrowserContextParams::builder().build())
            .await
            .map_err(protocol)?;

        Ok(Arc::new(ChromiumContext {
            id: response.result.browser_context_id.clone(),
            session: self.inner.clone(),
            viewport,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.inner.connected.store(false, Ordering::SeqCst);
        let browser = self.inner.browser.lock().await.take();
        let result = match browser {
            Some(mut browser) => match browser.close().await {
                Ok(_) => {
                    let _ = browser.wait().await;
                    Ok(())
                }
                Err(e) => {
                    if let Some(Err(kill_error)) = browser.kill().await {
                        warn!(error = %kill_error, "Failed to kill browser process");
                    }
                    Err(protocol(e))
                }
            },
            None => Ok(()),
        };
        self.events.abort();
        result
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.events.abort();
    }
}

struct ChromiumContext {
    id: BrowserContextId,
    session: Arc<SessionInner>,
    viewport: Viewport,
}

#[async_trait]
impl RenderContext for ChromiumContext {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn new_page(&self) -> DriverResult<Box<dyn RenderPage>> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(self.id.clone())
            .build()
            .map_err(DriverError::Protocol)?;

        let guard = self.session.browser.lock().await;
        let browser = guard.as_ref().ok_or(DriverError::Disconnected)?;
        let page = browser.new_page(params).await.map_err(protocol)?;

        Ok(Box::new(ChromiumPage {
            page,
            interception: StdMutex::new(None),
        }))
    }

    async fn open_pages(&self) -> DriverResult<usize> {
        let guard = self.session.browser.lock().await;
        let browser = guard.as_ref().ok_or(DriverError::Disconnected)?;
        let response = browser
            .execute(GetTargetsParams::builder().build())
            .await
            .map_err(protocol)?;

        Ok(response
            .result
            .target_infos
            .iter()
            .filter(|target| {
                target.r#type == "page" && target.browser_context_id.as_ref() == Some(&self.id)
            })
            .count())
    }

    async fn close(&self) -> DriverResult<()> {
        let guard = self.session.browser.lock().await;
        let Some(browser) = guard.as_ref() else {
            return Ok(());
        };
        browser
            .execute(DisposeBrowserContextParams::new(self.id.clone()))
            .await
            .map(|_| ())
            .map_err(protocol)
    }
}

/// Aborts the wrapped task when dropped.
struct TaskGuard(JoinHandle<()>);

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

struct ChromiumPage {
    page: Page,
    interception: StdMutex<Option<TaskGuard>>,
}

impl ChromiumPage {
    fn stop_interception(&self) {
        let task = match self.interception.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(task);
    }

    async fn evaluate_bool(&self, expression: &str) -> DriverResult<bool> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(DriverError::Protocol)?;
        self.page
            .evaluate_expression(params)
            .await
            .map_err(protocol)?
            .into_value::<bool>()
            .map_err(script_result)
    }
}

#[async_trait]
impl RenderPage for ChromiumPage {
    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        let params = SetDeviceMetricsOverrideParams::new(
            i64::from(viewport.width),
            i64::from(viewport.height),
            1.0,
            false,
        );
        self.page.execute(params).await.map(|_| ()).map_err(protocol)
    }

    async fn attach_interceptor(
        &self,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> DriverResult<()> {
        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(protocol)?;

        let page = self.page.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request = InterceptedRequest {
                    url: event.request.url.clone(),
                    kind: resource_kind(&event.resource_type),
                };
                let outcome = match interceptor.classify(&request).await {
                    Interception::Fulfill(response) => {
                        let headers = vec![
                            HeaderEntry::new("Content-Type", response.content_type),
                            HeaderEntry::new("Access-Control-Allow-Origin", "*"),
                        ];
                        match FulfillRequestParams::builder()
                            .request_id(event.request_id.clone())
                            .response_code(i64::from(response.status))
                            .response_headers(headers)
                            .body(general_purpose::STANDARD.encode(&response.body))
                            .build()
                        {
                            Ok(params) => page.execute(params).await.map(|_| ()),
                            Err(e) => {
                                warn!(url = %request.url, error = %e, "Could not build fulfill params");
                                page.execute(ContinueRequestParams::new(event.request_id.clone()))
                                    .await
                                    .map(|_| ())
                            }
                        }
                    }
                    Interception::Block => page
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ()),
                    Interception::PassThrough => page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ()),
                };
                if let Err(e) = outcome {
                    debug!(url = %request.url, error = %e, "Intercepted request not resolved");
                }
            }
        });

        if let Ok(mut guard) = self.interception.lock() {
            *guard = Some(TaskGuard(task));
        }

        let pattern = RequestPattern::builder()
            .url_pattern("*")
            .request_stage(RequestStage::Request)
            .build();
        self.page
            .execute(FetchEnableParams::builder().pattern(pattern).build())
            .await
            .map(|_| ())
            .map_err(protocol)
    }

    async fn emulate_print_media(&self) -> DriverResult<()> {
        self.page
            .execute(SetEmulatedMediaParams::builder().media("print").build())
            .await
            .map(|_| ())
            .map_err(protocol)
    }

    async fn set_content(&self, html: &str) -> DriverResult<()> {
        self.page.set_content(html).await.map(|_| ()).map_err(protocol)
    }

    async fn wait_for_fonts(&self) -> DriverResult<()> {
        self.evaluate_bool(FONTS_READY).await.map(|_| ())
    }

    async fn wait_for_network_idle(&self) -> DriverResult<()> {
        loop {
            if self.evaluate_bool(NETWORK_IDLE_PROBE).await? {
                return Ok(());
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    async fn print_to_pdf(&self, options: &PdfOptions) -> DriverResult<Vec<u8>> {
        let params = PrintToPdfParams::builder()
            .print_background(options.print_background)
            .prefer_css_page_size(options.prefer_css_page_size)
            .paper_width(options.paper_width)
            .paper_height(options.paper_height)
            .margin_top(options.margin_top)
            .margin_right(options.margin_right)
            .margin_bottom(options.margin_bottom)
            .margin_left(options.margin_left)
            .build();
        self.page.pdf(params).await.map_err(protocol)
    }

    async fn close(self: Box<Self>) -> DriverResult<()> {
        self.stop_interception();
        let ChromiumPage { page, .. } = *self;
        page.close().await.map_err(protocol)
    }
}

fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::WebSocket => ResourceKind::WebSocket,
        _ => ResourceKind::Other,
    }
}
