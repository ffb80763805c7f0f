// menu-render-service/src/main.rs

use google_cloud_pubsub::client::{Client, ClientConfig};
use google_cloud_pubsub::subscription::{ReceiveConfig, Subscription};
use menu_render_service::browser::ChromiumLauncher;
use menu_render_service::config::Config;
use menu_render_service::pubsub::{MessageHandler, Publisher};
use menu_render_service::storage::{ArtifactStore, GcsArtifactStore};
use menu_render_service::MenuRenderer;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Print to stderr BEFORE logging initialization to catch early failures
    eprintln!("Starting menu-render-service...");

    let config = match Config::load() {
        Ok(cfg) => {
            eprintln!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            eprintln!("FATAL: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.service.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        "Starting Menu Render Service"
    );

    let launcher = Arc::new(ChromiumLauncher::new(&config.browser));
    let renderer = match MenuRenderer::from_config(&config, launcher) {
        Ok(renderer) => Arc::new(renderer),
        Err(e) => {
            error!(error = %e, "Failed to build renderer");
            eprintln!("FATAL: Failed to build renderer: {:#}", e);
            return Err(e.into());
        }
    };

    let store: Option<Arc<dyn ArtifactStore>> = if config.storage.enabled {
        match GcsArtifactStore::new(&config.storage.bucket).await {
            Ok(store) => {
                info!(bucket = %config.storage.bucket, "Artifact storage enabled");
                Some(Arc::new(store))
            }
            Err(e) => {
                warn!(error = %e, "Artifact storage unavailable, PDFs will be returned inline");
                None
            }
        }
    } else {
        None
    };

    let client_config = match ClientConfig::default().with_auth().await {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to create Pub/Sub client config: {}", e);
            eprintln!("FATAL: Failed to create Pub/Sub client config: {}", e);
            return Err(e.into());
        }
    };

    let client = match Client::new(client_config).await {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to create Pub/Sub client: {}", e);
            eprintln!("FATAL: Failed to create Pub/Sub client: {}", e);
            return Err(e.into());
        }
    };

    info!(
        project_id = %config.pubsub.project_id,
        subscription = %config.pubsub.request_subscription,
        "Pub/Sub client ready"
    );

    let subscription = client.subscription(&config.pubsub.request_subscription);
    let publisher = Arc::new(Publisher::new(
        &client,
        &config.pubsub.project_id,
        &config.pubsub.response_topic,
    ));
    let handler = Arc::new(MessageHandler::new(renderer.clone(), store));

    let cancel = CancellationToken::new();
    let cancel_for_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal, cancelling message processing");
                cancel_for_signal.cancel();
            }
            Err(err) => {
                error!("Unable to listen for shutdown signal: {}", err);
            }
        }
    });

    process_messages(
        subscription,
        handler,
        publisher,
        config.pubsub.max_concurrent_messages,
        cancel,
    )
    .await;

    renderer.shutdown().await;
    info!("Menu Render Service stopped");

    Ok(())
}

async fn process_messages(
    subscription: Subscription,
    handler: Arc<MessageHandler>,
    publisher: Arc<Publisher>,
    max_concurrent: usize,
    cancel: CancellationToken,
) {
    info!(max_concurrent, "Starting message processing loop");

    while !cancel.is_cancelled() {
        let handler = handler.clone();
        let publisher = publisher.clone();

        let result = subscription
            .receive(
                move |message, cancel| {
                    let handler = handler.clone();
                    let publisher = publisher.clone();

                    async move {
                        if cancel.is_cancelled() {
                            return;
                        }

                        let message_id = message.message.message_id.clone();
                        info!(message_id = %message_id, "Processing message");

                        let response = handler.handle_message(&message.message.data).await;
                        publisher.publish_response(&response).await;

                        if let Err(e) = message.ack().await {
                            error!(
                                message_id = %message_id,
                                error = %e,
                                "Failed to acknowledge message"
                            );
                        }
                    }
                },
                cancel.clone(),
                Some(ReceiveConfig {
                    worker_count: max_concurrent.max(1),
                    ..Default::default()
                }),
            )
            .await;

        if let Err(e) = result {
            error!("Error receiving messages: {}", e);
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(tokio::time::Duration::from_secs(5)) => {}
            }
        }
    }

    info!("Message processing loop exited");
}
