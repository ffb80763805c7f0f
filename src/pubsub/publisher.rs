// menu-render-service/src/pubsub/publisher.rs

use crate::models::RenderResponse;
use google_cloud_googleapis::pubsub::v1::PubsubMessage;
use google_cloud_pubsub::client::Client;
use google_cloud_pubsub::publisher::Publisher as PubSubPublisher;
use std::collections::HashMap;
use tracing::{error, info};

/// Publishes one response message per handled request.
pub struct Publisher {
    publisher: PubSubPublisher,
    topic_name: String,
}

impl Publisher {
    pub fn new(client: &Client, project_id: &str, topic_name: &str) -> Self {
        let topic = client.topic(topic_name);
        let publisher = topic.new_publisher(None);

        info!(
            project_id = %project_id,
            topic = %topic_name,
            "Publisher initialized"
        );

        Self {
            publisher,
            topic_name: topic_name.to_string(),
        }
    }

    pub async fn publish_response(&self, response: &RenderResponse) {
        let data = match serde_json::to_vec(response) {
            Ok(data) => data,
            Err(e) => {
                error!(request_id = %response.request_id, error = %e, "Failed to serialize response");
                return;
            }
        };

        // Attributes let subscribers filter without decoding the body.
        let message = PubsubMessage {
            data,
            attributes: HashMap::from([
                ("request_id".to_string(), response.request_id.clone()),
                ("status".to_string(), response.status.clone()),
            ]),
            ..Default::default()
        };

        let awaiter = self.publisher.publish(message).await;

        match awaiter.get().await {
            Ok(message_id) => {
                info!(
                    request_id = %response.request_id,
                    status = %response.status,
                    message_id = %message_id,
                    topic = %self.topic_name,
                    "Render response published"
                );
            }
            Err(e) => {
                error!(
                    request_id = %response.request_id,
                    error = %e,
                    "Failed to publish response"
                );
            }
        }
    }
}
