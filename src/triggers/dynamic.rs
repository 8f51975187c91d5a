//! Time-based triggers: session duration and time since the last in-app message.
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::runtime::Handle;

use crate::{clock::Clock, events::EventProducer, iam::InAppState, session::SessionService};

use super::{Trigger, TriggerHandler, TriggerKind, TriggerOperator};

/// Two intervals closer than this (in milliseconds) are considered equal.
const REQUIRED_ACCURACY_MS: f64 = 300.0;

/// Interval reported for "time since last in-app message" when none was dismissed yet.
const NEVER_DISMISSED_INTERVAL_MS: f64 = 999_999_000.0;

pub(crate) struct DynamicTriggerController {
    clock: Arc<dyn Clock>,
    session: Arc<SessionService>,
    state: Arc<InAppState>,
    runtime: Handle,
    /// Trigger ids with a pending timer.
    scheduled: Arc<Mutex<HashSet<String>>>,
    handlers: Arc<EventProducer<dyn TriggerHandler>>,
}

enum Outcome {
    Fired,
    Schedule(Duration),
    NotFired,
}

impl DynamicTriggerController {
    pub(crate) fn new(
        clock: Arc<dyn Clock>,
        session: Arc<SessionService>,
        state: Arc<InAppState>,
        runtime: Handle,
    ) -> Self {
        DynamicTriggerController {
            clock,
            session,
            state,
            runtime,
            scheduled: Arc::new(Mutex::new(HashSet::new())),
            handlers: Arc::new(EventProducer::new()),
        }
    }

    pub(crate) fn subscribe(&self, handler: &Arc<dyn TriggerHandler>) {
        self.handlers.subscribe(handler);
    }

    /// Evaluate a time-based trigger.
    ///
    /// Emits [`TriggerHandler::on_trigger_completed`] when the trigger is satisfied. When it is
    /// not satisfied yet but will be after some time, schedules a single timer per trigger id
    /// that emits [`TriggerHandler::on_trigger_condition_changed`] once it elapses.
    pub(crate) fn should_fire(&self, trigger: &Trigger) -> bool {
        let Some(required_secs) = trigger.value.as_ref().and_then(|v| v.as_number()) else {
            return false;
        };
        let required_ms = required_secs * 1000.0;

        let current_ms = match trigger.kind {
            TriggerKind::SessionTime => self.session.session_duration().as_millis() as f64,
            TriggerKind::TimeSinceLastInAppMessage => {
                if self.state.is_message_showing() {
                    return false;
                }
                match self.state.last_time_dismissed() {
                    Some(dismissed) => (self.clock.now() - dismissed).num_milliseconds() as f64,
                    None => NEVER_DISMISSED_INTERVAL_MS,
                }
            }
            TriggerKind::Custom | TriggerKind::Unknown => return false,
        };

        let outcome = {
            let mut scheduled = self
                .scheduled
                .lock()
                .expect("thread holding scheduled triggers lock should not panic");

            if evaluate_time_interval(required_ms, current_ms, trigger.operator) {
                Outcome::Fired
            } else {
                let offset = required_ms - current_ms;
                if offset <= 0.0 || !scheduled.insert(trigger.trigger_id.clone()) {
                    Outcome::NotFired
                } else {
                    Outcome::Schedule(Duration::from_millis(offset as u64))
                }
            }
        };

        match outcome {
            Outcome::Fired => {
                log::trace!(target: "onesignal", trigger_id:display = trigger.trigger_id; "dynamic trigger fired");
                self.handlers
                    .fire(|h| h.on_trigger_completed(&trigger.trigger_id));
                true
            }
            Outcome::Schedule(offset) => {
                log::debug!(target: "onesignal",
                            trigger_id:display = trigger.trigger_id,
                            offset_ms = offset.as_millis() as u64;
                            "scheduling dynamic trigger timer");
                self.schedule(trigger.trigger_id.clone(), offset);
                false
            }
            Outcome::NotFired => false,
        }
    }

    fn schedule(&self, trigger_id: String, offset: Duration) {
        let scheduled = Arc::clone(&self.scheduled);
        let handlers = Arc::clone(&self.handlers);
        self.runtime.spawn(async move {
            tokio::time::sleep(offset).await;
            scheduled
                .lock()
                .expect("thread holding scheduled triggers lock should not panic")
                .remove(&trigger_id);
            handlers.fire(|h| h.on_trigger_condition_changed(&trigger_id));
        });
    }
}

fn evaluate_time_interval(required_ms: f64, current_ms: f64, operator: TriggerOperator) -> bool {
    match operator {
        TriggerOperator::LessThan => current_ms < required_ms,
        TriggerOperator::LessThanOrEqualTo => {
            current_ms <= required_ms || roughly_equal(required_ms, current_ms)
        }
        // Equality counts as greater so no timer has to be scheduled a millisecond ahead.
        TriggerOperator::GreaterThan => current_ms >= required_ms,
        TriggerOperator::GreaterThanOrEqualTo => {
            current_ms >= required_ms || roughly_equal(required_ms, current_ms)
        }
        TriggerOperator::EqualTo => roughly_equal(required_ms, current_ms),
        TriggerOperator::NotEqualTo => !roughly_equal(required_ms, current_ms),
        TriggerOperator::Exists | TriggerOperator::NotExists | TriggerOperator::Contains => false,
    }
}

fn roughly_equal(left: f64, right: f64) -> bool {
    (left - right).abs() < REQUIRED_ACCURACY_MS
}
