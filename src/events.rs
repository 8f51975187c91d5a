//! A publish/subscribe registry for SDK-internal and public callbacks.
use std::sync::{Arc, Mutex, Weak};

/// `EventProducer` keeps an ordered list of weakly-held handlers and fans events out to them.
///
/// Handlers are held weakly so that a component subscribing to a store it also owns does not form
/// a reference cycle. Subscribers that have been dropped are pruned the next time an event fires.
///
/// Events are delivered over a snapshot of the handler list, so a handler may subscribe or
/// unsubscribe (itself or others) from inside a callback.
pub struct EventProducer<H: ?Sized> {
    handlers: Mutex<Vec<Weak<H>>>,
}

impl<H: ?Sized> Default for EventProducer<H> {
    fn default() -> Self {
        EventProducer {
            handlers: Mutex::new(Vec::new()),
        }
    }
}

impl<H: ?Sized> EventProducer<H> {
    /// Create an empty producer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler`. The producer does not keep the handler alive.
    pub fn subscribe(&self, handler: &Arc<H>) {
        self.lock().push(Arc::downgrade(handler));
    }

    /// Remove `handler`. No-op if it is not subscribed.
    pub fn unsubscribe(&self, handler: &Arc<H>) {
        let target = Arc::downgrade(handler);
        self.lock().retain(|h| !Weak::ptr_eq(h, &target));
    }

    /// Returns `true` if at least one live handler is subscribed.
    pub fn has_subscribers(&self) -> bool {
        self.lock().iter().any(|h| h.strong_count() > 0)
    }

    /// Call `f` for each live handler, in subscription order.
    pub fn fire(&self, mut f: impl FnMut(&H)) {
        let snapshot: Vec<Arc<H>> = {
            let mut handlers = self.lock();
            handlers.retain(|h| h.strong_count() > 0);
            handlers.iter().filter_map(Weak::upgrade).collect()
        };

        for handler in snapshot {
            f(&handler);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Weak<H>>> {
        self.handlers
            .lock()
            .expect("thread holding handlers lock should not panic")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use super::EventProducer;

    trait Counter: Send + Sync {
        fn hit(&self);
    }

    #[derive(Default)]
    struct AtomicCounter(AtomicUsize);

    impl Counter for AtomicCounter {
        fn hit(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn fires_all_subscribers_in_order() {
        let producer = EventProducer::<dyn Fn(&mut Vec<u8>) + Send + Sync>::new();
        let first: Arc<dyn Fn(&mut Vec<u8>) + Send + Sync> = Arc::new(|v| v.push(1));
        let second: Arc<dyn Fn(&mut Vec<u8>) + Send + Sync> = Arc::new(|v| v.push(2));
        producer.subscribe(&first);
        producer.subscribe(&second);

        let mut seen = Vec::new();
        producer.fire(|h| h(&mut seen));

        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn dropped_handlers_are_not_called() {
        let producer = EventProducer::<dyn Counter>::new();
        let kept = Arc::new(AtomicCounter::default());
        let kept_dyn: Arc<dyn Counter> = kept.clone();
        producer.subscribe(&kept_dyn);
        {
            let dropped: Arc<dyn Counter> = Arc::new(AtomicCounter::default());
            producer.subscribe(&dropped);
        }

        producer.fire(|h| h.hit());

        assert_eq!(kept.0.load(Ordering::SeqCst), 1);
        assert!(producer.has_subscribers());
    }

    #[test]
    fn handler_can_unsubscribe_itself_while_firing() {
        let producer = Arc::new(EventProducer::<dyn Fn() + Send + Sync>::new());
        let slot: Arc<Mutex<Option<Arc<dyn Fn() + Send + Sync>>>> = Arc::new(Mutex::new(None));

        let handler: Arc<dyn Fn() + Send + Sync> = {
            let producer = producer.clone();
            let slot = slot.clone();
            Arc::new(move || {
                if let Some(me) = slot.lock().unwrap().as_ref() {
                    producer.unsubscribe(me);
                }
            })
        };
        *slot.lock().unwrap() = Some(handler.clone());
        producer.subscribe(&handler);

        producer.fire(|h| h());

        assert!(!producer.has_subscribers());
    }
}
