//! Public callbacks for the host application.
use super::{InAppMessage, InAppMessageClickResult};

/// Notified as an in-app message goes through its display lifecycle.
///
/// All methods have empty default implementations, so listeners only implement what they need.
pub trait InAppMessageLifecycleListener: Send + Sync {
    /// `message` is about to be displayed.
    fn on_will_display(&self, _message: &InAppMessage) {}
    /// `message` is now visible.
    fn on_did_display(&self, _message: &InAppMessage) {}
    /// `message` is about to be dismissed.
    fn on_will_dismiss(&self, _message: &InAppMessage) {}
    /// `message` was dismissed.
    fn on_did_dismiss(&self, _message: &InAppMessage) {}
}

/// Notified when the user clicks an element of an in-app message.
pub trait InAppMessageClickListener: Send + Sync {
    /// `result` describes the clicked element of `message`.
    fn on_click(&self, message: &InAppMessage, result: &InAppMessageClickResult);
}

impl<T: Fn(&InAppMessage, &InAppMessageClickResult) + Send + Sync> InAppMessageClickListener
    for T
{
    fn on_click(&self, message: &InAppMessage, result: &InAppMessageClickResult) {
        self(message, result)
    }
}
