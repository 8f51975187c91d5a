use std::time::Duration;

use async_trait::async_trait;

use crate::{consistency::RywData, Result};

use super::InAppMessage;

/// Returns the current session duration. Evaluated on every request attempt so retries report
/// the elapsed time at the moment they are sent.
pub type SessionDurationProvider<'a> = &'a (dyn Fn() -> Duration + Send + Sync);

/// Backend operations used by the in-app message engine.
#[async_trait]
pub trait InAppBackend: Send + Sync {
    /// List the in-app messages for a push subscription.
    ///
    /// Returns `None` if the messages could not be retrieved. Failures are not retried by the
    /// engine; the next fetch trigger tries again.
    async fn list_in_app_messages(
        &self,
        app_id: &str,
        subscription_id: &str,
        ryw_data: Option<RywData>,
        session_duration: SessionDurationProvider<'_>,
    ) -> Option<Vec<InAppMessage>>;

    /// Report that a message variant was displayed.
    async fn send_impression(
        &self,
        app_id: &str,
        subscription_id: &str,
        variant_id: &str,
        message_id: &str,
    ) -> Result<()>;

    /// Report a click on a message element.
    async fn send_click(
        &self,
        app_id: &str,
        subscription_id: &str,
        variant_id: &str,
        message_id: &str,
        click_id: Option<&str>,
        is_first_click: bool,
    ) -> Result<()>;

    /// Report that a page of a multi-page message was viewed.
    async fn send_page_impression(
        &self,
        app_id: &str,
        subscription_id: &str,
        variant_id: &str,
        message_id: &str,
        page_id: &str,
    ) -> Result<()>;
}
