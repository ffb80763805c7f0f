// menu-render-service/src/renderers/mod.rs

mod html;
mod pdf;
mod validate;

pub use html::{is_rtl, HtmlRenderer};
pub use pdf::{ExportTimeouts, PdfExporter};
pub use validate::{OutputValidator, DEFAULT_MIN_PDF_BYTES};
