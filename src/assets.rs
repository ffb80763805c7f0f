// menu-render-service/src/assets.rs

//! Resource request policy for render pages.
//!
//! Every request a page makes while loading is classified here: assets under
//! the configured origin are served from disk, trackers and websockets are
//! blocked, anything else continues to the network.

use crate::config::AssetConfig;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use url::Url;

/// Resource type as reported by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Font,
    Script,
    WebSocket,
    Other,
}

#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub kind: ResourceKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl AssetResponse {
    fn not_found() -> Self {
        Self {
            status: 404,
            content_type: "text/plain".to_string(),
            body: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Interception {
    Fulfill(AssetResponse),
    Block,
    PassThrough,
}

#[async_trait]
pub trait RequestInterceptor: Send + Sync {
    async fn classify(&self, request: &InterceptedRequest) -> Interception;
}

/// Serves the static asset store and blocks tracking hosts.
pub struct AssetInterceptor {
    root: PathBuf,
    origin: Url,
    blocked_domains: Vec<String>,
}

impl AssetInterceptor {
    pub fn new(root: PathBuf, origin: &str, blocked_domains: Vec<String>) -> anyhow::Result<Self> {
        let origin = Url::parse(origin)
            .map_err(|e| anyhow::anyhow!("invalid asset origin {:?}: {}", origin, e))?;
        let blocked_domains = blocked_domains
            .into_iter()
            .map(|domain| domain.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();

        Ok(Self {
            root,
            origin,
            blocked_domains,
        })
    }

    pub fn from_config(config: &AssetConfig) -> anyhow::Result<Self> {
        Self::new(
            config.root.clone(),
            &config.origin,
            config.blocked_domains.clone(),
        )
    }

    /// Base URL templates should use for relative asset references.
    pub fn base_href(&self) -> String {
        let mut base = self.origin.as_str().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        base
    }

    fn is_local(&self, url: &Url) -> bool {
        url.scheme() == self.origin.scheme()
            && url.host_str() == self.origin.host_str()
            && url.port_or_known_default() == self.origin.port_or_known_default()
    }

    fn is_blocked_host(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.blocked_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Map a URL path onto the asset root, refusing anything that escapes it.
    fn resolve_path(&self, url_path: &str) -> Option<PathBuf> {
        let decoded = urlencoding::decode(url_path.trim_start_matches('/')).ok()?;
        let relative = Path::new(decoded.as_ref());
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return None,
            }
        }
        if resolved == self.root {
            return None;
        }
        Some(resolved)
    }

    async fn serve(&self, url: &Url) -> AssetResponse {
        let Some(path) = self.resolve_path(url.path()) else {
            warn!(url = %url, "Rejected asset path outside the asset root");
            return AssetResponse::not_found();
        };

        match tokio::fs::read(&path).await {
            Ok(body) => {
                let content_type = mime_guess::from_path(&path)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string();
                debug!(
                    path = %path.display(),
                    size_bytes = body.len(),
                    content_type = %content_type,
                    "Serving local asset"
                );
                AssetResponse {
                    status: 200,
                    content_type,
                    body,
                }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Local asset unavailable, answering 404"
                );
                AssetResponse::not_found()
            }
        }
    }
}

#[async_trait]
impl RequestInterceptor for AssetInterceptor {
    async fn classify(&self, request: &InterceptedRequest) -> Interception {
        if request.kind == ResourceKind::WebSocket {
            return Interception::Block;
        }

        let url = match Url::parse(&request.url) {
            Ok(url) => url,
            Err(_) => return Interception::PassThrough,
        };

        match url.scheme() {
            "ws" | "wss" => return Interception::Block,
            "http" | "https" => {}
            _ => return Interception::PassThrough,
        }

        if self.is_local(&url) {
            return Interception::Fulfill(self.serve(&url).await);
        }

        if let Some(host) = url.host_str() {
            if self.is_blocked_host(host) {
                debug!(host = %host, "Blocked tracking request");
                return Interception::Block;
            }
        }

        Interception::PassThrough
    }
}
