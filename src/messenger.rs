//! Messenger port
//!
//! The only way the core touches a chat surface. Real adapters (Slack,
//! Telegram, webhooks) live outside the core; the loop never imports a
//! messaging SDK directly.

use async_trait::async_trait;
use tracing::info;

/// Error types for outbound message delivery.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("send failed: {0}")]
    SendFailed(String),

    #[error("rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("channel not ready")]
    NotReady,
}

/// Outbound message delivery. Implementations may be sync or async under the
/// hood; the core tolerates either.
#[async_trait]
pub trait MessengerPort: Send + Sync {
    async fn send(&self, user_id: &str, text: &str) -> Result<(), MessengerError>;
}

/// Messenger that logs instead of delivering. Lets the binary run end-to-end
/// without a chat SDK configured.
#[derive(Debug, Default)]
pub struct ConsoleMessenger;

#[async_trait]
impl MessengerPort for ConsoleMessenger {
    async fn send(&self, user_id: &str, text: &str) -> Result<(), MessengerError> {
        info!(user_id, "outbound message:\n{}", text);
        Ok(())
    }
}
