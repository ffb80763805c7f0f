// menu-render-service/src/error.rs

use std::fmt;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RenderError>;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStage {
    Context,
    Page,
    Intercept,
    Navigation,
    Fonts,
    NetworkIdle,
    Export,
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RenderStage::Context => "context",
            RenderStage::Page => "page",
            RenderStage::Intercept => "intercept",
            RenderStage::Navigation => "navigation",
            RenderStage::Fonts => "fonts",
            RenderStage::NetworkIdle => "network_idle",
            RenderStage::Export => "export",
        };
        f.write_str(name)
    }
}

/// Reason a PDF buffer was rejected by the output validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputDefect {
    Empty,
    MissingSignature,
    MissingTrailer,
    TooSmall { len: usize, min: usize },
}

impl fmt::Display for OutputDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputDefect::Empty => f.write_str("buffer is empty"),
            OutputDefect::MissingSignature => f.write_str("missing %PDF- signature"),
            OutputDefect::MissingTrailer => f.write_str("missing %%EOF trailer"),
            OutputDefect::TooSmall { len, min } => {
                write!(f, "{} bytes is below the {} byte minimum", len, min)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Browser launch failed after {attempts} attempt(s): {message}")]
    BrowserLaunchFailed { attempts: u32, message: String },

    #[error("Navigation timed out after {timeout_ms}ms")]
    NavigationTimeout { timeout_ms: u64 },

    #[error("PDF export timed out after {timeout_ms}ms")]
    ExportTimeout { timeout_ms: u64 },

    #[error("Browser failure during {stage}: {message}")]
    Browser { stage: RenderStage, message: String },

    #[error("Invalid PDF output: {0}")]
    InvalidOutput(OutputDefect),

    #[error("Rendering failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: Box<RenderError> },
}

impl From<handlebars::TemplateError> for RenderError {
    fn from(err: handlebars::TemplateError) -> Self {
        RenderError::Template(err.to_string())
    }
}

impl From<handlebars::RenderError> for RenderError {
    fn from(err: handlebars::RenderError) -> Self {
        RenderError::Template(err.to_string())
    }
}

impl RenderError {
    pub(crate) fn browser(stage: RenderStage, err: impl fmt::Display) -> Self {
        RenderError::Browser {
            stage,
            message: err.to_string(),
        }
    }

    /// Whether a caller may usefully submit the same job again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RenderError::InvalidInput(_) | RenderError::Template(_) => false,
            RenderError::BrowserLaunchFailed { .. }
            | RenderError::NavigationTimeout { .. }
            | RenderError::ExportTimeout { .. }
            | RenderError::Browser { .. }
            | RenderError::InvalidOutput(_) => true,
            RenderError::Exhausted { last, .. } => match last.as_ref() {
                RenderError::InvalidOutput(_) => false,
                other => other.is_retryable(),
            },
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            RenderError::InvalidInput(_) => "invalid_input",
            RenderError::Template(_) => "template_error",
            RenderError::BrowserLaunchFailed { .. } => "browser_launch_failed",
            RenderError::NavigationTimeout { .. } => "navigation_timeout",
            RenderError::ExportTimeout { .. } => "export_timeout",
            RenderError::Browser { .. } => "browser_failure",
            RenderError::InvalidOutput(_) => "invalid_output",
            RenderError::Exhausted { .. } => "exhausted",
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            RenderError::NavigationTimeout { .. } | RenderError::ExportTimeout { .. } => true,
            RenderError::Exhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }

    /// Message safe to show end users; details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            RenderError::InvalidInput(reason) => format!("The menu cannot be rendered: {}", reason),
            RenderError::Template(_) => "The selected template could not be rendered".to_string(),
            _ if self.is_timeout() => "Rendering the menu timed out, please try again".to_string(),
            _ if self.is_retryable() => {
                "The PDF service is temporarily unavailable, please try again".to_string()
            }
            _ => "The PDF could not be generated".to_string(),
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.public_message(),
            error_type: self.error_type().to_string(),
            retryable: self.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
    pub retryable: bool,
}
