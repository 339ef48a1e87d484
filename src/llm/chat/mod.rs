pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::chat::Turn;

/// Receives each text delta as soon as it has been decoded.
pub type DeltaCallback<'a> = &'a mut (dyn FnMut(&str) + Send);

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("HTTP {status}: {body}")]
    Transport {
        status: u16,
        body: String,
    },

    #[error("unexpected response payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Connection, timeout or body-read failure. The request URL is stripped
    /// since it carries the API key.
    #[error("{0}")]
    Http(reqwest::Error),
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Http(err.without_url())
    }
}

impl ChatError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Transport { status, .. } => Some(*status),
            ChatError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Sends the whole conversation and returns the model's reply.
    ///
    /// When the client streams and `on_delta` is given, every decoded delta is
    /// passed to it in arrival order; the returned string is their concatenation.
    async fn generate_content(
        &self,
        turns: &[Turn],
        on_delta: Option<DeltaCallback<'_>>
    ) -> Result<String, ChatError>;

    fn supports_streaming(&self) -> bool {
        false
    }

    fn get_model(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn http_errors_do_not_carry_the_request_url() {
        let err: ChatError = reqwest::Client::new()
            .get("http://127.0.0.1:1/v1beta/models?key=SECRET-KEY-123")
            .send().await
            .unwrap_err()
            .into();

        assert!(matches!(err, ChatError::Http(_)));
        assert!(!err.to_string().contains("SECRET-KEY-123"));
    }
}
