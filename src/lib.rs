// menu-render-service/src/lib.rs

//! Renders restaurant menus to print-ready PDFs through one shared headless
//! browser.

pub mod assets;
pub mod browser;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod pubsub;
pub mod renderers;
pub mod retry;
pub mod storage;

pub use error::{ErrorResponse, RenderError, Result};
pub use models::{PageFormat, RenderJob, RenderResult};
pub use pipeline::MenuRenderer;
