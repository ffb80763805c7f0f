// menu-render-service/src/pubsub/handler.rs

use crate::error::ErrorResponse;
use crate::models::{PdfArtifact, RenderCommand, RenderRequest, RenderResponse};
use crate::pipeline::MenuRenderer;
use crate::storage::{cache_key, sha256_hex, ArtifactStore, StoredArtifact, PDF_CONTENT_TYPE};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct MessageHandler {
    renderer: Arc<MenuRenderer>,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl MessageHandler {
    pub fn new(renderer: Arc<MenuRenderer>, store: Option<Arc<dyn ArtifactStore>>) -> Self {
        Self { renderer, store }
    }

    /// Turn one raw message into exactly one response. Never fails.
    pub async fn handle_message(&self, data: &[u8]) -> RenderResponse {
        let command: RenderCommand = match serde_json::from_slice(data) {
            Ok(command) => command,
            Err(e) => {
                error!("Failed to parse request: {}", e);
                return RenderResponse::error(
                    "unknown".to_string(),
                    ErrorResponse {
                        error: format!("Invalid request format: {}", e),
                        error_type: "invalid_request".to_string(),
                        retryable: false,
                    },
                );
            }
        };

        match command {
            RenderCommand::Render(request) => self.handle_render(request).await,
            RenderCommand::Health { request_id } => {
                let health = self.renderer.health().await;
                RenderResponse::health(request_id.unwrap_or_else(new_request_id), health)
            }
            RenderCommand::Reset { request_id } => {
                self.renderer.reset().await;
                RenderResponse::acknowledged(request_id.unwrap_or_else(new_request_id))
            }
        }
    }

    async fn handle_render(&self, request: RenderRequest) -> RenderResponse {
        let request_id = request.request_id.unwrap_or_else(new_request_id);
        let job = request.job;

        info!(
            request_id = %request_id,
            template = %job.template_id,
            language = %job.language,
            force_regenerate = request.force_regenerate,
            "Processing menu render request"
        );

        let stored = self.store.as_ref().and_then(|store| match cache_key(&job) {
            Ok(key) => Some((store, key)),
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Cannot derive storage key");
                None
            }
        });

        if let (Some((store, key)), false) = (&stored, request.force_regenerate) {
            match store.find(key).await {
                Ok(Some(artifact)) => {
                    info!(request_id = %request_id, key = %key, "Serving stored menu PDF");
                    return RenderResponse::success(request_id, uploaded(artifact, true));
                }
                Ok(None) => {}
                Err(e) => warn!(
                    request_id = %request_id,
                    error = %e,
                    "Stored PDF lookup failed, rendering instead"
                ),
            }
        }

        let result = match self.renderer.render(&job).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    request_id = %request_id,
                    error_type = e.error_type(),
                    error = %e,
                    "Failed to render menu"
                );
                return RenderResponse::error(request_id, e.to_error_response());
            }
        };

        if let Some((store, key)) = &stored {
            match store.put(key, result.pdf_bytes()).await {
                Ok(artifact) => {
                    return RenderResponse::success(request_id, uploaded(artifact, false));
                }
                Err(e) => warn!(
                    request_id = %request_id,
                    error = %e,
                    "Upload failed, returning PDF inline"
                ),
            }
        }

        let bytes = result.into_bytes();
        info!(
            request_id = %request_id,
            size_kb = bytes.len() / 1024,
            "Returning menu PDF inline"
        );

        RenderResponse::success(
            request_id,
            PdfArtifact {
                url: None,
                sha256: sha256_hex(&bytes),
                byte_length: bytes.len(),
                content_base64: Some(general_purpose::STANDARD.encode(&bytes)),
                content_type: PDF_CONTENT_TYPE.to_string(),
                cached: false,
            },
        )
    }
}

fn uploaded(artifact: StoredArtifact, cached: bool) -> PdfArtifact {
    PdfArtifact {
        url: Some(artifact.url),
        content_base64: None,
        content_type: PDF_CONTENT_TYPE.to_string(),
        byte_length: artifact.byte_length,
        sha256: artifact.sha256,
        cached,
    }
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
