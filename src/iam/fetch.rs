//! Fetching the message list from the backend.
use std::{sync::Arc, time::Duration};

use crate::{consistency::IamFetchReadyCondition, user::is_local_id};

use super::{engine::EngineState, InAppMessage, InAppMessageEngine};

impl InAppMessageEngine {
    /// Fetch the messages of the current push subscription once its backend state is readable,
    /// then evaluate them.
    ///
    /// Does nothing without a confirmed push subscription, without an app id, without user
    /// consent, while the app is in the background, or when the last successful fetch was less
    /// than `fetch_iam_min_interval` ago. Failures are not retried here; the next trigger
    /// (session start, subscription change, ...) fetches again.
    pub(crate) async fn fetch_messages_when_conditions_are_met(&self) {
        let config = self.config.model();
        let Some(subscription_id) = config
            .push_subscription_id
            .clone()
            .filter(|id| !id.is_empty() && !is_local_id(id))
        else {
            log::debug!(target: "onesignal", "no confirmed push subscription, not fetching in-app messages");
            return;
        };
        if config.app_id.is_empty() || !config.has_consent() {
            log::debug!(target: "onesignal", "missing app id or consent, not fetching in-app messages");
            return;
        }

        let onesignal_id = self.identity.with_model(|identity| identity.onesignal_id.clone());
        let receiver = self
            .consistency
            .get_ryw_data_from_awaitable_condition(IamFetchReadyCondition::new(onesignal_id))
            .await;
        // A dropped sender resolves like a condition resolved without data.
        let ryw_data = receiver.await.ok().flatten();

        if !self.application.is_in_foreground() {
            log::debug!(target: "onesignal", "app is in background, not fetching in-app messages");
            return;
        }

        let (now, previous_fetch) = {
            let mut last_fetch = self.last_fetch.lock().await;
            let now = self.clock.now();
            if let Some(last) = *last_fetch {
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                if elapsed < config.fetch_iam_min_interval {
                    log::debug!(target: "onesignal",
                                elapsed_ms = elapsed.as_millis() as u64;
                                "in-app messages fetched recently, skipping fetch");
                    return;
                }
            }
            (now, last_fetch.replace(now))
        };

        let session = Arc::clone(&self.session);
        let session_duration = move || session.session_duration();
        let Some(messages) = self
            .backend
            .list_in_app_messages(&config.app_id, &subscription_id, ryw_data, &session_duration)
            .await
        else {
            // Only successful fetches count towards the rate limit.
            let mut last_fetch = self.last_fetch.lock().await;
            if *last_fetch == Some(now) {
                *last_fetch = previous_fetch;
            }
            return;
        };

        log::debug!(target: "onesignal", count = messages.len(); "fetched in-app messages");
        self.apply_fetched_messages(messages);
        self.evaluate_messages().await;
    }

    /// Replace the message list and flag the messages touched by triggers that changed before
    /// this first fetch completed.
    fn apply_fetched_messages(&self, messages: Vec<InAppMessage>) {
        let mut inner = self.lock();
        let EngineState {
            messages: current,
            redisplayed,
            early_session_triggers,
            has_completed_first_fetch,
            ..
        } = &mut *inner;

        *current = messages;
        if !early_session_triggers.is_empty() {
            let keys: Vec<&str> = early_session_triggers.iter().map(String::as_str).collect();
            for message in current.iter_mut() {
                if redisplayed.contains_key(&message.message_id)
                    && self.triggers.is_trigger_on_message(message, &keys)
                {
                    message.is_trigger_changed = true;
                }
            }
            early_session_triggers.clear();
        }
        *has_completed_first_fetch = true;
    }
}
