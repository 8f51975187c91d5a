use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::events::EventProducer;

use super::{TriggerHandler, TriggerValue};

/// `TriggerStore` holds the custom trigger values set by the host application.
///
/// Every change that actually adds, replaces or removes a value is announced with
/// [`TriggerHandler::on_trigger_changed`], after the store lock has been released.
#[derive(Default)]
pub struct TriggerStore {
    triggers: RwLock<HashMap<String, TriggerValue>>,
    handlers: EventProducer<dyn TriggerHandler>,
}

impl TriggerStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, overwriting any previous value.
    pub fn add_trigger(&self, key: impl Into<String>, value: impl Into<TriggerValue>) {
        let key = key.into();
        let value = value.into();
        let changed = {
            let mut triggers = self.write();
            triggers.insert(key.clone(), value.clone()) != Some(value)
        };
        log::debug!(target: "onesignal", trigger_key:display = key, changed; "trigger added");
        if changed {
            self.handlers.fire(|h| h.on_trigger_changed(&key));
        }
    }

    /// Set several triggers, firing one change per key.
    pub fn add_triggers(&self, triggers: impl IntoIterator<Item = (String, TriggerValue)>) {
        for (key, value) in triggers {
            self.add_trigger(key, value);
        }
    }

    /// Remove `key`. No-op if the key is not set.
    pub fn remove_trigger(&self, key: &str) {
        let removed = self.write().remove(key).is_some();
        if removed {
            log::debug!(target: "onesignal", trigger_key = key; "trigger removed");
            self.handlers.fire(|h| h.on_trigger_changed(key));
        }
    }

    /// Remove several triggers.
    pub fn remove_triggers<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.remove_trigger(key);
        }
    }

    /// Remove all triggers.
    pub fn clear_triggers(&self) {
        let removed: Vec<String> = self.write().drain().map(|(key, _)| key).collect();
        for key in &removed {
            self.handlers.fire(|h| h.on_trigger_changed(key));
        }
    }

    /// Current value of `key`.
    pub fn get(&self, key: &str) -> Option<TriggerValue> {
        self.read().get(key).cloned()
    }

    /// Snapshot of all trigger values.
    pub fn snapshot(&self) -> HashMap<String, TriggerValue> {
        self.read().clone()
    }

    pub(crate) fn subscribe(&self, handler: &Arc<dyn TriggerHandler>) {
        self.handlers.subscribe(handler);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, TriggerValue>> {
        self.triggers
            .read()
            .expect("thread holding triggers lock should not panic")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, TriggerValue>> {
        self.triggers
            .write()
            .expect("thread holding triggers lock should not panic")
    }
}
