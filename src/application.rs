//! Host application state as seen by the SDK core.
use async_trait::async_trait;

/// Provided by the platform layer. Tells the core whether the app is visible and whether the UI
/// is ready to present an in-app message.
#[async_trait]
pub trait ApplicationService: Send + Sync {
    /// Returns `true` while the host application is in the foreground.
    fn is_in_foreground(&self) -> bool;

    /// Wait until system conditions allow displaying UI (an activity is available, no system
    /// dialog is covering it, etc.).
    ///
    /// Returns `false` if the conditions cannot be met, in which case the caller gives up on the
    /// current display attempt.
    async fn wait_until_system_conditions_available(&self) -> bool;
}
