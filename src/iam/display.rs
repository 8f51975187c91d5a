use async_trait::async_trait;

use super::{InAppMessage, InAppMessagePromptKind};

/// Renders in-app messages. Implemented by the platform layer.
///
/// After a successful display, the driver reports back through the engine's
/// `on_message_*` callbacks (will display, was displayed, clicks, page changes, dismissal).
#[async_trait]
pub trait DisplayDriver: Send + Sync {
    /// Start displaying `message`.
    ///
    /// Returns `None` if the display could not be attempted (e.g. no UI context is available);
    /// the message is put back at the head of the queue. Returns `Some(false)` if the display
    /// failed after it was attempted, and `Some(true)` once the message is shown.
    async fn display_message(&self, message: &InAppMessage) -> Option<bool>;

    /// Dismiss the message currently shown, if any.
    async fn dismiss_current_in_app_message(&self);
}

/// Outcome of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptResult {
    /// The user granted the permission.
    Accepted,
    /// The user denied the permission.
    Denied,
    /// The app cannot request this permission (e.g. missing manifest entry).
    Unavailable,
}

/// Shows permission prompts requested by in-app message buttons.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Show the prompt and wait for the user's answer.
    async fn handle_prompt(&self, prompt: InAppMessagePromptKind) -> PromptResult;
}

/// [`PromptHandler`] for hosts without prompt support. Every prompt is unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPromptHandler;

#[async_trait]
impl PromptHandler for NoopPromptHandler {
    async fn handle_prompt(&self, _prompt: InAppMessagePromptKind) -> PromptResult {
        PromptResult::Unavailable
    }
}
