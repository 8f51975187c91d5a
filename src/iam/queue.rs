//! Display queue and the display lifecycle callbacks.
use std::{future::Future, pin::Pin};

use crate::{
    clock::Timestamp,
    preferences::{PREFS_OS_DISMISSED_IAMS, PREFS_OS_LAST_TIME_IAM_DISMISSED},
};

use super::{InAppMessage, InAppMessageEngine, InAppMessagePromptKind, InAppMessageRecord};

impl InAppMessageEngine {
    /// Add `message` to the display queue (unless already queued or showing) and try to show the
    /// head of the queue.
    pub(crate) async fn queue_message_for_display(&self, message: InAppMessage) {
        let message_id = message.message_id.clone();
        if self.state.enqueue(message) {
            log::debug!(target: "onesignal", message_id:display = message_id; "message queued for display");
        }
        self.attempt_to_show_message().await;
    }

    /// Show the head of the display queue if nothing is showing and displaying is not paused.
    pub(crate) async fn attempt_to_show_message(&self) {
        if !self
            .application
            .wait_until_system_conditions_available()
            .await
        {
            log::debug!(target: "onesignal", "system conditions not available, not showing in-app message");
            return;
        }

        let Some(message) = self.state.dequeue_for_display() else {
            return;
        };

        log::debug!(target: "onesignal", message_id:display = message.message_id; "displaying message");
        match self.display.display_message(&message).await {
            None => {
                log::debug!(target: "onesignal",
                            message_id:display = message.message_id;
                            "display could not be attempted, message put back in queue");
                self.state.requeue_front(message);
            }
            Some(false) => {
                log::warn!(target: "onesignal", message_id:display = message.message_id; "failed to display message");
                // Dropped until the next fetch so evaluation cannot queue it again right away.
                self.lock()
                    .messages
                    .retain(|m| m.message_id != message.message_id);
                self.message_was_dismissed(&message, true).await;
            }
            Some(true) => {}
        }
    }

    /// Queue a preview message sent to a test device. Previews are never persisted nor
    /// reported.
    pub async fn display_preview_message(&self, mut message: InAppMessage) {
        message.is_preview = true;
        self.queue_message_for_display(message).await;
    }

    /// Called by the display driver before `message` appears.
    pub fn on_message_will_display(&self, message: &InAppMessage) {
        self.lifecycle_listeners.fire(|l| l.on_will_display(message));
    }

    /// Called by the display driver before `message` is dismissed.
    pub fn on_message_will_dismiss(&self, message: &InAppMessage) {
        self.lifecycle_listeners.fire(|l| l.on_will_dismiss(message));
    }

    /// Called by the display driver once `message` was dismissed.
    pub async fn on_message_was_dismissed(&self, message: &InAppMessage) {
        self.message_was_dismissed(message, false).await;
    }

    pub(super) async fn message_was_dismissed(&self, message: &InAppMessage, failed: bool) {
        if !message.is_preview {
            let dismissed = {
                let mut inner = self.lock();
                inner.dismissed.insert(message.message_id.clone());
                inner.dismissed.clone()
            };

            // A failed display is only remembered for this run, so it is retried next launch.
            if !failed {
                let now = self.clock.now();
                self.preferences
                    .save_string_set(PREFS_OS_DISMISSED_IAMS, Some(dismissed));
                self.state.set_last_time_dismissed(now);
                self.preferences
                    .save_i64(PREFS_OS_LAST_TIME_IAM_DISMISSED, Some(now.timestamp_millis()));
                self.persist_display(message, now).await;
            }
        }

        if self.state.defer_dismissal_if_prompting(message) {
            log::debug!(target: "onesignal",
                        message_id:display = message.message_id;
                        "prompt is showing, deferring dismissal");
            return;
        }

        self.finish_dismissal(message).await;
    }

    async fn finish_dismissal(&self, message: &InAppMessage) {
        self.lifecycle_listeners.fire(|l| l.on_did_dismiss(message));
        self.state.clear_showing();
        self.show_next_or_evaluate().await;
    }

    /// Show the next queued message, or re-evaluate all messages if the queue is empty.
    ///
    /// Boxed because showing a message can lead back here through a dismissal.
    pub(super) fn show_next_or_evaluate(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if self.state.has_queued_messages() {
                self.attempt_to_show_message().await;
            } else {
                self.evaluate_messages().await;
            }
        })
    }

    /// Record the display in the message's redisplay history and save it.
    async fn persist_display(&self, message: &InAppMessage, now: Timestamp) {
        let record = {
            let mut inner = self.lock();
            let record = match inner
                .messages
                .iter_mut()
                .find(|m| m.message_id == message.message_id)
            {
                Some(live) => {
                    record_display(live, now);
                    InAppMessageRecord::from(&*live)
                }
                None => {
                    let mut message = message.clone();
                    record_display(&mut message, now);
                    InAppMessageRecord::from(&message)
                }
            };
            inner
                .redisplayed
                .insert(record.message_id.clone(), record.clone());
            record
        };

        if let Err(err) = self.repository.save_in_app_message(record).await {
            log::warn!(target: "onesignal",
                       message_id:display = message.message_id;
                       "failed to save in-app message display history: {:?}", err);
        }
    }

    /// Show the prompts of a click, each at most once per message. The message is dismissed
    /// first; its dismissal completes after the last prompt.
    pub(super) async fn process_prompts(
        &self,
        message: &InAppMessage,
        prompts: &[InAppMessagePromptKind],
    ) {
        let pending: Vec<InAppMessagePromptKind> = {
            let mut inner = self.lock();
            let prompted = inner
                .prompted
                .entry(message.message_id.clone())
                .or_default();
            prompts
                .iter()
                .copied()
                .filter(|prompt| prompted.insert(*prompt))
                .collect()
        };
        let Some(first) = pending.first() else {
            return;
        };

        self.state.set_current_prompt(Some(*first));
        self.display.dismiss_current_in_app_message().await;

        for prompt in pending {
            self.state.set_current_prompt(Some(prompt));
            let result = self.prompts.handle_prompt(prompt).await;
            log::debug!(target: "onesignal",
                        message_id:display = message.message_id,
                        prompt:debug = prompt,
                        result:debug = result;
                        "prompt completed");
        }
        self.state.set_current_prompt(None);

        if let Some(dismissed) = self.state.take_pending_dismissal() {
            self.finish_dismissal(&dismissed).await;
        }
    }
}

fn record_display(message: &mut InAppMessage, now: Timestamp) {
    message.redisplay_stats.last_display_time = Some(now);
    message.redisplay_stats.increment_display_quantity();
    message.is_trigger_changed = false;
    message.is_displayed_in_session = true;
}
