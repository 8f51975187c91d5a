//! Session tracking. A session starts when the host application comes to the foreground after
//! being away long enough; the platform layer decides when and calls
//! [`SessionService::start_session`].
use std::{
    sync::{Arc, RwLock},
    time::Duration,
};

use crate::{
    clock::{Clock, Timestamp},
    events::EventProducer,
};

/// Notified when a new session starts.
pub trait SessionLifecycleHandler: Send + Sync {
    /// A new session started.
    fn on_session_started(&self);
}

/// Owns the current session start time and fans out session events.
pub struct SessionService {
    clock: Arc<dyn Clock>,
    start_time: RwLock<Timestamp>,
    handlers: EventProducer<dyn SessionLifecycleHandler>,
}

impl SessionService {
    #[allow(missing_docs)]
    pub fn new(clock: Arc<dyn Clock>) -> SessionService {
        let now = clock.now();
        SessionService {
            clock,
            start_time: RwLock::new(now),
            handlers: EventProducer::new(),
        }
    }

    /// Start a new session and notify subscribers.
    pub fn start_session(&self) {
        let now = self.clock.now();
        *self
            .start_time
            .write()
            .expect("thread holding session lock should not panic") = now;
        log::debug!(target: "onesignal", start_time:display = now; "session started");
        self.handlers.fire(|h| h.on_session_started());
    }

    /// When the current session started.
    pub fn start_time(&self) -> Timestamp {
        *self
            .start_time
            .read()
            .expect("thread holding session lock should not panic")
    }

    /// Time elapsed since the current session started.
    pub fn session_duration(&self) -> Duration {
        (self.clock.now() - self.start_time())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Register a session handler. The handler is held weakly.
    pub fn subscribe(&self, handler: &Arc<dyn SessionLifecycleHandler>) {
        self.handlers.subscribe(handler);
    }
}
