use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use crate::clock::Timestamp;

use super::{InAppMessage, InAppMessagePromptKind};

/// Display state shared between the engine and the time-based triggers.
///
/// The display queue, the id of the message currently showing and the `paused` flag live under a
/// single lock so that dequeuing a message and marking it as showing is atomic.
#[derive(Default)]
pub(crate) struct InAppState {
    inner: Mutex<DisplayState>,
}

#[derive(Default)]
struct DisplayState {
    queue: VecDeque<InAppMessage>,
    showing: Option<String>,
    paused: bool,
    last_time_dismissed: Option<Timestamp>,
    current_prompt: Option<InAppMessagePromptKind>,
    /// Dismissal reported while a prompt was active, finished once prompts complete.
    pending_dismissal: Option<InAppMessage>,
}

impl InAppState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_message_showing(&self) -> bool {
        self.lock().showing.is_some()
    }

    pub(crate) fn message_id_showing(&self) -> Option<String> {
        self.lock().showing.clone()
    }

    pub(crate) fn clear_showing(&self) {
        self.lock().showing = None;
    }

    pub(crate) fn last_time_dismissed(&self) -> Option<Timestamp> {
        self.lock().last_time_dismissed
    }

    pub(crate) fn set_last_time_dismissed(&self, time: Timestamp) {
        self.lock().last_time_dismissed = Some(time);
    }

    pub(crate) fn paused(&self) -> bool {
        self.lock().paused
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.lock().paused = paused;
    }

    pub(crate) fn current_prompt(&self) -> Option<InAppMessagePromptKind> {
        self.lock().current_prompt
    }

    pub(crate) fn set_current_prompt(&self, prompt: Option<InAppMessagePromptKind>) {
        self.lock().current_prompt = prompt;
    }

    /// Add `message` to the back of the queue unless it is already queued or showing. Returns
    /// `true` if the message was added.
    pub(crate) fn enqueue(&self, message: InAppMessage) -> bool {
        let mut state = self.lock();
        if state.contains(&message.message_id) {
            return false;
        }
        state.queue.push_back(message);
        true
    }

    /// Put `message` back at the head of the queue and clear the showing state.
    pub(crate) fn requeue_front(&self, message: InAppMessage) {
        let mut state = self.lock();
        if state.showing.as_deref() == Some(&message.message_id) {
            state.showing = None;
        }
        if !state.contains(&message.message_id) {
            state.queue.push_front(message);
        }
    }

    /// Pop the head of the queue and mark it as showing. Returns `None` while paused, when the
    /// queue is empty or when another message is showing.
    pub(crate) fn dequeue_for_display(&self) -> Option<InAppMessage> {
        let mut state = self.lock();
        if state.paused || state.showing.is_some() {
            return None;
        }
        let message = state.queue.pop_front()?;
        state.showing = Some(message.message_id.clone());
        Some(message)
    }

    pub(crate) fn has_queued_messages(&self) -> bool {
        !self.lock().queue.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn queued_ids(&self) -> Vec<String> {
        self.lock()
            .queue
            .iter()
            .map(|m| m.message_id.clone())
            .collect()
    }

    /// Keep `message` aside if a prompt is active. Returns `true` if the dismissal was deferred.
    pub(crate) fn defer_dismissal_if_prompting(&self, message: &InAppMessage) -> bool {
        let mut state = self.lock();
        if state.current_prompt.is_none() {
            return false;
        }
        state.pending_dismissal = Some(message.clone());
        true
    }

    pub(crate) fn take_pending_dismissal(&self) -> Option<InAppMessage> {
        self.lock().pending_dismissal.take()
    }

    fn lock(&self) -> MutexGuard<'_, DisplayState> {
        self.inner
            .lock()
            .expect("thread holding display state lock should not panic")
    }
}

impl DisplayState {
    fn contains(&self, message_id: &str) -> bool {
        self.showing.as_deref() == Some(message_id)
            || self.queue.iter().any(|m| m.message_id == message_id)
    }
}
