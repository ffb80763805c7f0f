#![allow(dead_code)]

use async_trait::async_trait;
use menu_render_service::assets::{AssetInterceptor, RequestInterceptor};
use menu_render_service::browser::{
    BrowserLauncher, BrowserManager, BrowserSession, BrowserSettings, DriverError, DriverResult,
    PdfOptions, RenderContext, RenderPage,
};
use menu_render_service::models::{RenderJob, Viewport};
use menu_render_service::renderers::{ExportTimeouts, HtmlRenderer, OutputValidator, PdfExporter};
use menu_render_service::retry::RetryPolicy;
use menu_render_service::MenuRenderer;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ASSET_ORIGIN: &str = "https://assets.menu-render.local";

/// Bytes that pass the output validator.
pub fn fake_pdf() -> Vec<u8> {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.extend(std::iter::repeat(b'0').take(1500));
    bytes.extend_from_slice(b"\n%%EOF\n");
    bytes
}

/// Knobs and counters shared by every object the fake driver hands out.
#[derive(Default)]
pub struct Script {
    pub fail_launches: AtomicU32,
    pub launch_delay_ms: AtomicU64,
    pub fail_exports: AtomicU32,
    pub invalid_outputs: AtomicU32,
    pub hang_navigation: AtomicBool,
    pub hang_fonts: AtomicBool,
    pub hang_network_idle: AtomicBool,
    pub hang_export: AtomicBool,
    crashed_through: AtomicU32,

    pub launch_calls: AtomicU32,
    pub launches: AtomicU32,
    pub sessions_closed: AtomicU32,
    pub contexts_created: AtomicU32,
    pub contexts_closed: AtomicU32,
    pub pages_opened: AtomicU32,
    pub pages_closed: AtomicU32,
    pub interceptors_attached: AtomicU32,
    pub prints: AtomicU32,
    pub last_html: Mutex<Option<String>>,
    pub last_options: Mutex<Option<PdfOptions>>,
}

impl Script {
    /// Every browser launched so far stops answering health checks.
    pub fn crash_browsers(&self) {
        self.crashed_through
            .store(self.launches.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    pub fn last_html(&self) -> Option<String> {
        self.last_html.lock().unwrap().clone()
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub struct FakeLauncher {
    pub script: Arc<Script>,
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self) -> DriverResult<Arc<dyn BrowserSession>> {
        self.script.launch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.script.launch_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if take_one(&self.script.fail_launches) {
            return Err(DriverError::Launch("chrome exited with status 127".into()));
        }
        let generation = self.script.launches.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Arc::new(FakeSession {
            script: self.script.clone(),
            generation,
            closed: AtomicBool::new(false),
        }))
    }
}

struct FakeSession {
    script: Arc<Script>,
    generation: u32,
    closed: AtomicBool,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn is_healthy(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
            && self.generation > self.script.crashed_through.load(Ordering::SeqCst)
    }

    async fn new_context(&self, viewport: Viewport) -> DriverResult<Arc<dyn RenderContext>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(DriverError::Disconnected);
        }
        self.script.contexts_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeContext {
            shared: Arc::new(ContextShared {
                script: self.script.clone(),
                open: AtomicUsize::new(0),
            }),
            viewport,
        }))
    }

    async fn close(&self) -> DriverResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.script.sessions_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct ContextShared {
    script: Arc<Script>,
    open: AtomicUsize,
}

struct FakeContext {
    shared: Arc<ContextShared>,
    viewport: Viewport,
}

#[async_trait]
impl RenderContext for FakeContext {
    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn new_page(&self) -> DriverResult<Box<dyn RenderPage>> {
        self.shared.open.fetch_add(1, Ordering::SeqCst);
        self.shared.script.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            context: self.shared.clone(),
            viewport: Mutex::new(None),
            interceptor: Mutex::new(None),
        }))
    }

    async fn open_pages(&self) -> DriverResult<usize> {
        Ok(self.shared.open.load(Ordering::SeqCst))
    }

    async fn close(&self) -> DriverResult<()> {
        self.shared.script.contexts_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    context: Arc<ContextShared>,
    viewport: Mutex<Option<Viewport>>,
    interceptor: Mutex<Option<Arc<dyn RequestInterceptor>>>,
}

impl FakePage {
    fn script(&self) -> &Script {
        &self.context.script
    }
}

#[async_trait]
impl RenderPage for FakePage {
    async fn set_viewport(&self, viewport: Viewport) -> DriverResult<()> {
        *self.viewport.lock().unwrap() = Some(viewport);
        Ok(())
    }

    async fn attach_interceptor(
        &self,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> DriverResult<()> {
        *self.interceptor.lock().unwrap() = Some(interceptor);
        self.script().interceptors_attached.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn emulate_print_media(&self) -> DriverResult<()> {
        Ok(())
    }

    async fn set_content(&self, html: &str) -> DriverResult<()> {
        if self.script().hang_navigation.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        *self.script().last_html.lock().unwrap() = Some(html.to_string());
        Ok(())
    }

    async fn wait_for_fonts(&self) -> DriverResult<()> {
        if self.script().hang_fonts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn wait_for_network_idle(&self) -> DriverResult<()> {
        if self.script().hang_network_idle.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn print_to_pdf(&self, options: &PdfOptions) -> DriverResult<Vec<u8>> {
        let script = self.script();
        script.prints.fetch_add(1, Ordering::SeqCst);
        *script.last_options.lock().unwrap() = Some(options.clone());

        if script.hang_export.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if take_one(&script.fail_exports) {
            return Err(DriverError::Protocol("Target crashed".into()));
        }
        if take_one(&script.invalid_outputs) {
            return Ok(b"<html>not a pdf</html>".to_vec());
        }
        Ok(fake_pdf())
    }

    async fn close(self: Box<Self>) -> DriverResult<()> {
        self.context.open.fetch_sub(1, Ordering::SeqCst);
        self.script().pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub script: Arc<Script>,
    pub renderer: Arc<MenuRenderer>,
    _assets: tempfile::TempDir,
}

pub struct HarnessOptions {
    pub launch_attempts: u32,
    pub max_attempts: u32,
    pub timeouts: ExportTimeouts,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            launch_attempts: 3,
            max_attempts: 3,
            timeouts: ExportTimeouts {
                navigation: Duration::from_millis(500),
                fonts: Duration::from_millis(200),
                network_idle: Duration::from_millis(100),
                export: Duration::from_millis(500),
            },
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let assets = tempfile::tempdir().expect("asset dir");
        let script = Arc::new(Script::default());

        let launcher = Arc::new(FakeLauncher {
            script: script.clone(),
        });
        let settings = BrowserSettings {
            launch_attempts: options.launch_attempts,
            launch_timeout: Duration::from_secs(2),
            launch_retry_delay: Duration::from_millis(1),
            health_check_timeout: Duration::from_millis(200),
            page_op_timeout: Duration::from_millis(500),
        };

        let interceptor =
            AssetInterceptor::new(assets.path().to_path_buf(), ASSET_ORIGIN, Vec::new())
                .expect("interceptor");
        let html = HtmlRenderer::new(interceptor.base_href()).expect("templates");

        let renderer = MenuRenderer::new(
            html,
            Arc::new(BrowserManager::new(launcher, settings)),
            Arc::new(interceptor),
            PdfExporter::new(options.timeouts),
            OutputValidator::default(),
            RetryPolicy {
                max_attempts: options.max_attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
            },
        );

        Self {
            script,
            renderer: Arc::new(renderer),
            _assets: assets,
        }
    }
}

pub fn job(language: &str) -> RenderJob {
    serde_json::from_value(serde_json::json!({
        "template_id": "classic",
        "language": language,
        "restaurant": { "name": "Bistro Nour", "currency": "EUR" },
        "categories": [
            {
                "name": "Mezze",
                "items": [
                    { "name": "Hummus", "price": 6.5 },
                    { "name": "Falafel", "price": 7.0, "featured": true }
                ]
            }
        ]
    }))
    .expect("valid job")
}
