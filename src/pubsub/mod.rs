// menu-render-service/src/pubsub/mod.rs

mod handler;
mod publisher;

pub use handler::MessageHandler;
pub use publisher::Publisher;
