//! Automated-participant response port.
//!
//! A responder turns a rendered prompt into the next line of an automated
//! participant. Failures are ordinary values here; the lobby recovers from
//! every one of them with a fallback message.

use async_trait::async_trait;
use thiserror::Error;

pub mod canned;
pub mod openai;

pub use canned::CannedResponder;
pub use openai::OpenAiResponder;

#[derive(Debug, Error)]
pub enum ResponderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion service returned status {0}")]
    Status(u16),
    #[error("completion service returned no content")]
    EmptyCompletion,
    #[error("completion timed out")]
    Timeout,
}

impl ResponderError {
    /// Label for `parley_automated_fallbacks_total{reason}`.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Status(_) => "status",
            Self::EmptyCompletion => "empty",
            Self::Timeout => "timeout",
        }
    }
}

#[async_trait]
pub trait Responder: Send + Sync {
    /// Complete `prompt`, returning the text to post.
    async fn complete(&self, prompt: &str) -> Result<String, ResponderError>;
}
