//! Triggers decide *when* an in-app message may be shown.
//!
//! A message carries a trigger expression: an OR of AND-groups of [`Trigger`] conditions. Custom
//! triggers compare a value set by the host application (held by the [`TriggerStore`]) with the
//! value in the message. Time-based ("dynamic") triggers compare elapsed session time or the
//! time since the last in-app message was dismissed.
//!
//! The [`TriggerController`] evaluates expressions and fans trigger changes out to
//! [`TriggerHandler`]s so the in-app message engine can re-evaluate messages.
mod controller;
pub(crate) mod dynamic;
mod models;
mod store;

pub use controller::TriggerController;
pub use models::{Trigger, TriggerKind, TriggerOperator, TriggerValue};
pub use store::TriggerStore;

/// Receives trigger change events.
pub trait TriggerHandler: Send + Sync {
    /// A custom trigger value was added, changed or removed.
    fn on_trigger_changed(&self, _key: &str) {}

    /// A time-based trigger was satisfied during evaluation.
    fn on_trigger_completed(&self, _trigger_id: &str) {}

    /// A time-based trigger that was not satisfied before may now be satisfied.
    fn on_trigger_condition_changed(&self, _trigger_id: &str) {}
}
