use std::{collections::HashMap, sync::Arc};

use crate::iam::InAppMessage;

use super::{
    dynamic::DynamicTriggerController, Trigger, TriggerHandler, TriggerKind, TriggerOperator,
    TriggerStore, TriggerValue,
};

/// Evaluates message trigger expressions against the trigger store and the time-based trigger
/// sources.
pub struct TriggerController {
    store: Arc<TriggerStore>,
    dynamic: DynamicTriggerController,
}

impl TriggerController {
    pub(crate) fn new(store: Arc<TriggerStore>, dynamic: DynamicTriggerController) -> Self {
        TriggerController { store, dynamic }
    }

    /// Subscribe to trigger changes from both the trigger store and the time-based triggers.
    pub fn subscribe(&self, handler: &Arc<dyn TriggerHandler>) {
        self.store.subscribe(handler);
        self.dynamic.subscribe(handler);
    }

    /// Returns `true` if `message` should be shown according to its triggers.
    ///
    /// The trigger expression is an OR of AND-groups. A message without triggers is always
    /// satisfied.
    pub fn evaluate_message_triggers(&self, message: &InAppMessage) -> bool {
        if message.triggers.is_empty() {
            return true;
        }

        let values = self.store.snapshot();
        message.triggers.iter().any(|and_group| {
            and_group
                .iter()
                .all(|trigger| self.evaluate_trigger(trigger, &values))
        })
    }

    /// Returns `true` if every trigger of `message` is time-based. A message without triggers
    /// has no dynamic triggers.
    pub fn message_has_only_dynamic_triggers(&self, message: &InAppMessage) -> bool {
        !message.triggers.is_empty()
            && message
                .triggers
                .iter()
                .flatten()
                .all(|trigger| trigger.kind.is_dynamic())
    }

    /// Returns `true` if any trigger of `message` refers to one of `keys`, either by custom
    /// property or by trigger id (time-based triggers are reported by id).
    pub fn is_trigger_on_message<S: AsRef<str>>(&self, message: &InAppMessage, keys: &[S]) -> bool {
        message.triggers.iter().flatten().any(|trigger| {
            keys.iter().any(|key| {
                let key = key.as_ref();
                key == trigger.property || key == trigger.trigger_id
            })
        })
    }

    fn evaluate_trigger(&self, trigger: &Trigger, values: &HashMap<String, TriggerValue>) -> bool {
        match trigger.kind {
            // Unknown kinds are never satisfied.
            TriggerKind::Unknown => false,
            TriggerKind::SessionTime | TriggerKind::TimeSinceLastInAppMessage => {
                self.dynamic.should_fire(trigger)
            }
            TriggerKind::Custom => trigger
                .operator
                .eval(values.get(&trigger.property), trigger.value.as_ref()),
        }
    }
}

impl TriggerOperator {
    /// Apply the operator to the device-side value (`device`) and the message-side value
    /// (`expected`). Returns `false` if the operator cannot be applied.
    pub(crate) fn eval(&self, device: Option<&TriggerValue>, expected: Option<&TriggerValue>) -> bool {
        self.try_eval(device, expected).unwrap_or(false)
    }

    fn try_eval(
        &self,
        device: Option<&TriggerValue>,
        expected: Option<&TriggerValue>,
    ) -> Option<bool> {
        let Some(device) = device else {
            // Without a local value, only "does not exist" can hold.
            return Some(*self == Self::NotExists);
        };

        match self {
            Self::Exists => Some(true),
            Self::NotExists => Some(false),

            Self::Contains => {
                let TriggerValue::List(items) = device else {
                    return None;
                };
                Some(items.contains(expected?))
            }

            Self::EqualTo
            | Self::NotEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo
            | Self::LessThan
            | Self::LessThanOrEqualTo => {
                let expected = expected?;
                match (device, expected) {
                    (TriggerValue::String(d), TriggerValue::String(e)) => {
                        self.compare_strings(d, e)
                    }
                    (TriggerValue::Number(d), TriggerValue::Number(e)) => {
                        Some(self.compare_numbers(*d, *e))
                    }
                    // flexible comparison between differently typed values
                    (device, TriggerValue::Number(e)) => {
                        Some(self.compare_numbers(device.coerce_number()?, *e))
                    }
                    (device, expected) => {
                        self.compare_strings(&device.to_flex_string(), &expected.to_flex_string())
                    }
                }
            }
        }
    }

    fn compare_strings(&self, device: &str, expected: &str) -> Option<bool> {
        match self {
            Self::EqualTo => Some(device == expected),
            Self::NotEqualTo => Some(device != expected),
            _ => {
                log::warn!(target: "onesignal", operator:debug = self; "unsupported operator for string trigger");
                None
            }
        }
    }

    fn compare_numbers(&self, device: f64, expected: f64) -> bool {
        match self {
            Self::EqualTo => device == expected,
            Self::NotEqualTo => device != expected,
            Self::LessThan => device < expected,
            Self::LessThanOrEqualTo => device <= expected,
            Self::GreaterThan => device > expected,
            Self::GreaterThanOrEqualTo => device >= expected,
            Self::Exists | Self::NotExists | Self::Contains => false,
        }
    }
}
