// menu-render-service/src/browser/factory.rs

use super::{BrowserSession, RenderContext, RenderPage};
use crate::assets::RequestInterceptor;
use crate::error::{RenderError, RenderStage, Result};
use crate::models::PageFormat;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Creates contexts and pages sized for one physical sheet.
#[derive(Debug, Clone)]
pub struct PageFactory {
    op_timeout: Duration,
}

impl PageFactory {
    pub fn new(op_timeout: Duration) -> Self {
        Self { op_timeout }
    }

    pub async fn new_context(
        &self,
        session: &dyn BrowserSession,
        format: PageFormat,
    ) -> Result<Arc<dyn RenderContext>> {
        match timeout(self.op_timeout, session.new_context(format.viewport())).await {
            Ok(result) => result.map_err(|e| RenderError::browser(RenderStage::Context, e)),
            Err(_) => Err(RenderError::browser(
                RenderStage::Context,
                "timed out creating browser context",
            )),
        }
    }

    /// Open a page whose viewport matches `format` before any content loads.
    pub async fn new_page(
        &self,
        context: &dyn RenderContext,
        format: PageFormat,
    ) -> Result<Box<dyn RenderPage>> {
        let page = match timeout(self.op_timeout, context.new_page()).await {
            Ok(result) => result.map_err(|e| RenderError::browser(RenderStage::Page, e))?,
            Err(_) => {
                return Err(RenderError::browser(
                    RenderStage::Page,
                    "timed out opening page",
                ))
            }
        };

        let sized = timeout(self.op_timeout, page.set_viewport(format.viewport())).await;
        match sized {
            Ok(Ok(())) => Ok(page),
            Ok(Err(e)) => {
                let _ = timeout(self.op_timeout, page.close()).await;
                Err(RenderError::browser(RenderStage::Page, e))
            }
            Err(_) => {
                let _ = timeout(self.op_timeout, page.close()).await;
                Err(RenderError::browser(
                    RenderStage::Page,
                    "timed out sizing viewport",
                ))
            }
        }
    }

    /// A reusable context holds no pages and can open and close a throwaway one.
    pub async fn probe(&self, context: &dyn RenderContext) -> bool {
        let probe = async {
            match context.open_pages().await {
                Ok(0) => {}
                Ok(open) => {
                    debug!(open_pages = open, "Context still holds pages");
                    return false;
                }
                Err(e) => {
                    debug!(error = %e, "Context page listing failed");
                    return false;
                }
            }
            match context.new_page().await {
                Ok(page) => page.close().await.is_ok(),
                Err(e) => {
                    debug!(error = %e, "Context could not open probe page");
                    false
                }
            }
        };
        timeout(self.op_timeout, probe).await.unwrap_or(false)
    }

    /// Route every request the page makes through `interceptor`.
    pub async fn intercept(
        &self,
        page: &dyn RenderPage,
        interceptor: Arc<dyn RequestInterceptor>,
    ) -> Result<()> {
        match timeout(self.op_timeout, page.attach_interceptor(interceptor)).await {
            Ok(result) => result.map_err(|e| RenderError::browser(RenderStage::Intercept, e)),
            Err(_) => Err(RenderError::browser(
                RenderStage::Intercept,
                "timed out enabling request interception",
            )),
        }
    }

    pub async fn close_page(&self, page: Box<dyn RenderPage>) {
        match timeout(self.op_timeout, page.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Page close failed"),
            Err(_) => debug!("Page close timed out"),
        }
    }
}
