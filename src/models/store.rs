//! Thread-safe in-memory stores for the "current" models.
//!
//! A store always holds a model: readers receive a *snapshot* (a clone) that is not affected by
//! further writes. Writers either replace the model completely or update it in place, and every
//! change is announced to subscribers together with a [`ModelChangeTag`] describing whether the
//! change should be propagated to the backend.
use std::sync::{Arc, RwLock};

use crate::events::EventProducer;

use super::SubscriptionModel;

/// Describes where a model change originates and whether it should drive backend operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChangeTag {
    /// A local change that should be propagated to the backend.
    Normal,
    /// A local change that must not be propagated to the backend.
    NoPropagate,
    /// The model was refreshed from the backend.
    Hydrate,
}

/// Subscriber of a [`SingletonModelStore`].
pub trait SingletonModelStoreHandler<T>: Send + Sync {
    /// The whole model was replaced.
    fn on_model_replaced(&self, _model: &T, _tag: ModelChangeTag) {}
    /// The model was updated in place.
    fn on_model_updated(&self, _old: &T, _new: &T, _tag: ModelChangeTag) {}
}

/// Store for a model that always exists exactly once (config, identity, properties).
pub struct SingletonModelStore<T> {
    model: RwLock<T>,
    handlers: EventProducer<dyn SingletonModelStoreHandler<T>>,
}

impl<T: Clone + Send + Sync + 'static> SingletonModelStore<T> {
    #[allow(missing_docs)]
    pub fn new(model: T) -> Self {
        SingletonModelStore {
            model: RwLock::new(model),
            handlers: EventProducer::new(),
        }
    }

    /// Snapshot of the current model.
    pub fn model(&self) -> T {
        self.model
            .read()
            .expect("thread holding model lock should not panic")
            .clone()
    }

    /// Read the current model without cloning it.
    pub fn with_model<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&*self
            .model
            .read()
            .expect("thread holding model lock should not panic"))
    }

    /// Atomically swap in `model`.
    pub fn replace(&self, model: T, tag: ModelChangeTag) {
        {
            let mut slot = self
                .model
                .write()
                .expect("thread holding model lock should not panic");
            *slot = model.clone();
        }
        self.handlers.fire(|h| h.on_model_replaced(&model, tag));
    }

    /// Update the model in place. Subscribers receive the model before and after the update.
    pub fn update(&self, tag: ModelChangeTag, f: impl FnOnce(&mut T)) {
        let (old, new) = {
            let mut slot = self
                .model
                .write()
                .expect("thread holding model lock should not panic");
            let old = slot.clone();
            f(&mut *slot);
            (old, slot.clone())
        };
        self.handlers.fire(|h| h.on_model_updated(&old, &new, tag));
    }

    /// Register a change handler. The handler is held weakly.
    pub fn subscribe(&self, handler: &Arc<dyn SingletonModelStoreHandler<T>>) {
        self.handlers.subscribe(handler);
    }

    /// Unregister a change handler.
    pub fn unsubscribe(&self, handler: &Arc<dyn SingletonModelStoreHandler<T>>) {
        self.handlers.unsubscribe(handler);
    }
}

/// Subscriber of a [`SubscriptionModelStore`].
pub trait SubscriptionModelStoreHandler: Send + Sync {
    /// `model` was added.
    fn on_subscription_added(&self, _model: &SubscriptionModel, _tag: ModelChangeTag) {}
    /// `model` was removed.
    fn on_subscription_removed(&self, _model: &SubscriptionModel, _tag: ModelChangeTag) {}
    /// The subscription changed from `old` to `new`.
    fn on_subscription_updated(
        &self,
        _old: &SubscriptionModel,
        _new: &SubscriptionModel,
        _tag: ModelChangeTag,
    ) {
    }
}

/// Store for the current user's subscriptions (push, email, sms), keyed by subscription id.
#[derive(Default)]
pub struct SubscriptionModelStore {
    models: RwLock<Vec<SubscriptionModel>>,
    handlers: EventProducer<dyn SubscriptionModelStoreHandler>,
}

impl SubscriptionModelStore {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all subscriptions.
    pub fn list(&self) -> Vec<SubscriptionModel> {
        self.read().clone()
    }

    /// Snapshot of the subscription `id`.
    pub fn get(&self, id: &str) -> Option<SubscriptionModel> {
        self.read().iter().find(|m| m.id == id).cloned()
    }

    /// Add `model`, replacing an existing subscription with the same id.
    pub fn add(&self, model: SubscriptionModel, tag: ModelChangeTag) {
        let removed = {
            let mut models = self.write();
            let removed = models
                .iter()
                .position(|m| m.id == model.id)
                .map(|index| models.remove(index));
            models.push(model.clone());
            removed
        };
        if let Some(removed) = removed {
            self.handlers
                .fire(|h| h.on_subscription_removed(&removed, tag));
        }
        self.handlers.fire(|h| h.on_subscription_added(&model, tag));
    }

    /// Remove all subscriptions.
    pub fn clear(&self, tag: ModelChangeTag) {
        let removed = std::mem::take(&mut *self.write());
        for model in &removed {
            self.handlers.fire(|h| h.on_subscription_removed(model, tag));
        }
    }

    /// Replace all subscriptions with `models`.
    pub fn replace_all(&self, models: Vec<SubscriptionModel>, tag: ModelChangeTag) {
        let removed = std::mem::replace(&mut *self.write(), models.clone());
        for model in &removed {
            self.handlers.fire(|h| h.on_subscription_removed(model, tag));
        }
        for model in &models {
            self.handlers.fire(|h| h.on_subscription_added(model, tag));
        }
    }

    /// Update the subscription with `id` in place. Returns `false` if there is no such
    /// subscription.
    pub fn update(
        &self,
        id: &str,
        tag: ModelChangeTag,
        f: impl FnOnce(&mut SubscriptionModel),
    ) -> bool {
        let changed = {
            let mut models = self.write();
            models.iter_mut().find(|m| m.id == id).map(|model| {
                let old = model.clone();
                f(model);
                (old, model.clone())
            })
        };
        match changed {
            Some((old, new)) => {
                self.handlers
                    .fire(|h| h.on_subscription_updated(&old, &new, tag));
                true
            }
            None => false,
        }
    }

    /// Register a change handler. The handler is held weakly.
    pub fn subscribe(&self, handler: &Arc<dyn SubscriptionModelStoreHandler>) {
        self.handlers.subscribe(handler);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<SubscriptionModel>> {
        self.models
            .read()
            .expect("thread holding subscriptions lock should not panic")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<SubscriptionModel>> {
        self.models
            .write()
            .expect("thread holding subscriptions lock should not panic")
    }
}
