// menu-render-service/src/browser/manager.rs

//! Lifecycle of the one shared browser process.
//!
//! All launch, health-check and teardown work goes through a single async
//! mutex. A caller that arrives while a launch is in flight waits on the lock
//! and then finds the freshly launched handle, so concurrent requests never
//! start a second process.

use super::factory::PageFactory;
use super::{BrowserLauncher, BrowserSession, RenderContext};
use crate::config::BrowserConfig;
use crate::error::{RenderError, Result};
use crate::models::PageFormat;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub launch_attempts: u32,
    pub launch_timeout: Duration,
    pub launch_retry_delay: Duration,
    pub health_check_timeout: Duration,
    /// Bound on context/page creation and close calls.
    pub page_op_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            launch_attempts: 3,
            launch_timeout: Duration::from_secs(20),
            launch_retry_delay: Duration::from_secs(1),
            health_check_timeout: Duration::from_secs(2),
            page_op_timeout: Duration::from_secs(5),
        }
    }
}

impl BrowserSettings {
    pub fn from_config(config: &BrowserConfig, page_op_timeout: Duration) -> Self {
        Self {
            launch_attempts: config.launch_attempts.max(1),
            launch_timeout: config.launch_timeout(),
            launch_retry_delay: config.launch_retry_delay(),
            health_check_timeout: config.health_check_timeout(),
            page_op_timeout,
        }
    }
}

/// Shared reference to the live browser, tagged with its launch generation.
#[derive(Clone)]
pub struct BrowserHandle {
    generation: u64,
    session: Arc<dyn BrowserSession>,
}

impl BrowserHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn session(&self) -> &dyn BrowserSession {
        self.session.as_ref()
    }
}

impl fmt::Debug for BrowserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserHandle")
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct BrowserHealth {
    pub healthy: bool,
    pub details: String,
}

#[derive(Debug, Clone, Copy)]
struct HealthCheck {
    healthy: bool,
    at: Instant,
}

#[derive(Default)]
struct ManagerState {
    handle: Option<BrowserHandle>,
    idle_contexts: HashMap<PageFormat, Arc<dyn RenderContext>>,
    failed_launches: u32,
    last_health: Option<HealthCheck>,
}

pub struct BrowserManager {
    launcher: Arc<dyn BrowserLauncher>,
    settings: BrowserSettings,
    pages: PageFactory,
    state: Mutex<ManagerState>,
    generations: AtomicU64,
    teardowns: AtomicU64,
}

impl BrowserManager {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, settings: BrowserSettings) -> Self {
        Self {
            launcher,
            pages: PageFactory::new(settings.page_op_timeout),
            settings,
            state: Mutex::new(ManagerState::default()),
            generations: AtomicU64::new(0),
            teardowns: AtomicU64::new(0),
        }
    }

    pub fn pages(&self) -> &PageFactory {
        &self.pages
    }

    /// Number of browser processes launched so far.
    pub fn launch_count(&self) -> u64 {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn teardown_count(&self) -> u64 {
        self.teardowns.load(Ordering::SeqCst)
    }

    /// Return the live browser, launching one if none is healthy.
    pub async fn acquire_healthy_browser(&self) -> Result<BrowserHandle> {
        let mut state = self.state.lock().await;

        if let Some(handle) = state.handle.clone() {
            let healthy = self.check(&handle).await;
            state.last_health = Some(HealthCheck {
                healthy,
                at: Instant::now(),
            });
            if healthy {
                return Ok(handle);
            }
            warn!(
                generation = handle.generation,
                "Browser failed health check, relaunching"
            );
            self.discard(&mut state).await;
        }

        self.launch(&mut state).await
    }

    async fn check(&self, handle: &BrowserHandle) -> bool {
        timeout(
            self.settings.health_check_timeout,
            handle.session.is_healthy(),
        )
        .await
        .unwrap_or(false)
    }

    async fn launch(&self, state: &mut ManagerState) -> Result<BrowserHandle> {
        let mut last_error = String::new();

        while state.failed_launches < self.settings.launch_attempts {
            let attempt = state.failed_launches + 1;
            let started_at = Instant::now();

            match timeout(self.settings.launch_timeout, self.launcher.launch()).await {
                Ok(Ok(session)) => {
                    let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
                    let handle = BrowserHandle {
                        generation,
                        session,
                    };
                    state.handle = Some(handle.clone());
                    state.failed_launches = 0;
                    state.last_health = Some(HealthCheck {
                        healthy: true,
                        at: Instant::now(),
                    });
                    info!(
                        generation,
                        attempt,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "Browser launched"
                    );
                    return Ok(handle);
                }
                Ok(Err(e)) => last_error = e.to_string(),
                Err(_) => {
                    last_error = format!(
                        "launch timed out after {}ms",
                        self.settings.launch_timeout.as_millis()
                    )
                }
            }

            state.failed_launches += 1;
            warn!(
                attempt,
                max_attempts = self.settings.launch_attempts,
                error = %last_error,
                "Browser launch attempt failed"
            );

            if state.failed_launches < self.settings.launch_attempts {
                sleep(self.settings.launch_retry_delay).await;
            }
        }

        let attempts = state.failed_launches;
        state.failed_launches = 0;
        error!(attempts, error = %last_error, "Giving up on browser launch");
        Err(RenderError::BrowserLaunchFailed {
            attempts,
            message: last_error,
        })
    }

    /// Hand out an idle context for `format` if it still probes clean,
    /// otherwise create a fresh one.
    pub async fn acquire_context(
        &self,
        handle: &BrowserHandle,
        format: PageFormat,
    ) -> Result<Arc<dyn RenderContext>> {
        let idle = {
            let mut state = self.state.lock().await;
            if is_current(&state, handle) {
                state.idle_contexts.remove(&format)
            } else {
                None
            }
        };

        if let Some(context) = idle {
            if context.viewport() == format.viewport() && self.pages.probe(context.as_ref()).await {
                debug!(generation = handle.generation, "Reusing idle browser context");
                return Ok(context);
            }
            debug!(generation = handle.generation, "Discarding stale browser context");
            self.close_context(context).await;
        }

        self.pages.new_context(handle.session(), format).await
    }

    /// Park a finished context for reuse, or close it.
    pub async fn release_context(
        &self,
        handle: &BrowserHandle,
        format: PageFormat,
        context: Arc<dyn RenderContext>,
    ) {
        let reusable = matches!(
            timeout(self.settings.page_op_timeout, context.open_pages()).await,
            Ok(Ok(0))
        );

        if reusable {
            let mut state = self.state.lock().await;
            if is_current(&state, handle) && !state.idle_contexts.contains_key(&format) {
                state.idle_contexts.insert(format, context);
                return;
            }
        }

        self.close_context(context).await;
    }

    async fn close_context(&self, context: Arc<dyn RenderContext>) {
        match timeout(self.settings.page_op_timeout, context.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Ignoring context close failure"),
            Err(_) => debug!("Context close timed out"),
        }
    }

    /// Close everything and forget the browser. Never fails.
    pub async fn force_teardown(&self) {
        let mut state = self.state.lock().await;
        self.discard(&mut state).await;
        state.failed_launches = 0;
        state.last_health = None;
        self.teardowns.fetch_add(1, Ordering::SeqCst);
    }

    async fn discard(&self, state: &mut ManagerState) {
        for (_, context) in state.idle_contexts.drain() {
            self.close_context(context).await;
        }

        if let Some(handle) = state.handle.take() {
            match timeout(self.settings.page_op_timeout, handle.session.close()).await {
                Ok(Ok(())) => info!(generation = handle.generation, "Browser closed"),
                Ok(Err(e)) => warn!(
                    generation = handle.generation,
                    error = %e,
                    "Ignoring browser close failure"
                ),
                Err(_) => warn!(generation = handle.generation, "Browser close timed out"),
            }
        }
    }

    pub async fn health(&self) -> BrowserHealth {
        let mut state = self.state.lock().await;
        let Some(handle) = state.handle.clone() else {
            return BrowserHealth {
                healthy: false,
                details: "no browser running; one launches on the next render".to_string(),
            };
        };

        let healthy = self.check(&handle).await;
        let previous = state.last_health.replace(HealthCheck {
            healthy,
            at: Instant::now(),
        });
        let previous = previous
            .map(|check| {
                format!(
                    ", previous check {} {}ms ago",
                    if check.healthy { "passed" } else { "failed" },
                    check.at.elapsed().as_millis()
                )
            })
            .unwrap_or_default();

        BrowserHealth {
            healthy,
            details: format!(
                "browser generation {} {}, {} idle context(s){}",
                handle.generation,
                if healthy { "connected" } else { "unresponsive" },
                state.idle_contexts.len(),
                previous
            ),
        }
    }
}

fn is_current(state: &ManagerState, handle: &BrowserHandle) -> bool {
    state
        .handle
        .as_ref()
        .is_some_and(|current| current.generation == handle.generation)
}
