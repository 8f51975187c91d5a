//! Impression, page impression and click reporting.
//!
//! Each report is sent at most once: the id is added to its dedup set before the request, removed
//! again if the request fails (so a later event can retry), and the set is persisted on success.
use std::collections::HashSet;

use crate::{
    models::ModelChangeTag,
    preferences::{
        PREFS_OS_CLICKED_CLICK_IDS_IAMS, PREFS_OS_IMPRESSIONED_IAMS,
        PREFS_OS_PAGE_IMPRESSIONED_IAMS,
    },
};

use super::{
    engine::EngineState, InAppMessage, InAppMessageClickResult, InAppMessageEngine,
    InAppMessagePage,
};

/// Language used for variant selection when the user has none.
const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Copy)]
enum ReportKind {
    Impression,
    PageImpression,
    Click,
}

impl ReportKind {
    fn ids(self, state: &mut EngineState) -> &mut HashSet<String> {
        match self {
            ReportKind::Impression => &mut state.impressioned,
            ReportKind::PageImpression => &mut state.viewed_page_ids,
            ReportKind::Click => &mut state.clicked_click_ids,
        }
    }

    fn preference_key(self) -> &'static str {
        match self {
            ReportKind::Impression => PREFS_OS_IMPRESSIONED_IAMS,
            ReportKind::PageImpression => PREFS_OS_PAGE_IMPRESSIONED_IAMS,
            ReportKind::Click => PREFS_OS_CLICKED_CLICK_IDS_IAMS,
        }
    }
}

/// Where a report goes.
struct ReportTarget {
    app_id: String,
    subscription_id: String,
    variant_id: String,
}

impl InAppMessageEngine {
    /// Called by the display driver once `message` is visible.
    pub async fn on_message_was_displayed(&self, message: &InAppMessage) {
        self.lifecycle_listeners.fire(|l| l.on_did_display(message));
        if message.is_preview {
            return;
        }

        let Some(target) = self.report_target(message) else {
            return;
        };
        let key = message.message_id.clone();
        if !self.insert_id(ReportKind::Impression, &key) {
            return;
        }

        let result = self
            .backend
            .send_impression(
                &target.app_id,
                &target.subscription_id,
                &target.variant_id,
                &message.message_id,
            )
            .await;
        self.complete_report(ReportKind::Impression, &key, result);
    }

    /// Called by the display driver when the user navigates to another page of `message`.
    pub async fn on_message_page_changed(&self, message: &InAppMessage, page: &InAppMessagePage) {
        if message.is_preview {
            return;
        }

        let Some(target) = self.report_target(message) else {
            return;
        };
        let key = format!("{}{}", message.message_id, page.page_id);
        if !self.insert_id(ReportKind::PageImpression, &key) {
            return;
        }

        let result = self
            .backend
            .send_page_impression(
                &target.app_id,
                &target.subscription_id,
                &target.variant_id,
                &message.message_id,
                &page.page_id,
            )
            .await;
        self.complete_report(ReportKind::PageImpression, &key, result);
    }

    /// Called by the display driver when the user clicks an element of `message`.
    pub async fn on_message_action_occurred(
        &self,
        message: &InAppMessage,
        mut result: InAppMessageClickResult,
    ) {
        result.is_first_click = self
            .update_live_message(&message.message_id, InAppMessage::take_action_as_unique)
            .unwrap_or_else(|| message.clone().take_action_as_unique());

        self.click_listeners.fire(|l| l.on_click(message, &result));
        self.process_prompts(message, &result.prompts).await;

        if message.is_preview {
            return;
        }

        self.apply_tags(&result);
        self.report_click(message, &result).await;
    }

    fn apply_tags(&self, result: &InAppMessageClickResult) {
        let Some(tags) = &result.tags else {
            return;
        };
        if tags.adds.is_empty() && tags.removes.is_empty() {
            return;
        }
        self.properties.update(ModelChangeTag::Normal, |properties| {
            for (key, value) in &tags.adds {
                properties.tags.insert(key.clone(), value.clone());
            }
            for key in &tags.removes {
                properties.tags.remove(key);
            }
        });
    }

    async fn report_click(&self, message: &InAppMessage, result: &InAppMessageClickResult) {
        let Some(target) = self.report_target(message) else {
            return;
        };
        let click_id = result.click_id.as_deref();

        if let Some(click_id) = click_id {
            let admitted = {
                let mut inner = self.lock();
                let live = inner
                    .messages
                    .iter()
                    .find(|m| m.message_id == message.message_id)
                    .unwrap_or(message);
                // With redisplay, a click is reported once per display cycle rather than once
                // per message.
                let available_by_redisplay =
                    live.redisplay_stats.redisplay_enabled && live.is_click_available(click_id);
                if !available_by_redisplay && inner.clicked_click_ids.contains(click_id) {
                    false
                } else {
                    inner.clicked_click_ids.insert(click_id.to_owned());
                    true
                }
            };
            if !admitted {
                log::trace!(target: "onesignal", click_id; "click already reported");
                return;
            }
            self.update_live_message(&message.message_id, |m| m.add_click_id(click_id));
        }

        let response = self
            .backend
            .send_click(
                &target.app_id,
                &target.subscription_id,
                &target.variant_id,
                &message.message_id,
                click_id,
                result.is_first_click,
            )
            .await;

        match click_id {
            Some(click_id) => {
                if response.is_err() {
                    self.update_live_message(&message.message_id, |m| m.remove_click_id(click_id));
                }
                self.complete_report(ReportKind::Click, click_id, response);
            }
            None => {
                if let Err(err) = response {
                    log::warn!(target: "onesignal",
                               message_id:display = message.message_id;
                               "failed to report click: {:?}", err);
                }
            }
        }
    }

    fn report_target(&self, message: &InAppMessage) -> Option<ReportTarget> {
        let language = self
            .properties
            .with_model(|p| p.language.clone())
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_owned());
        let Some(variant_id) = message.variant_id(&language) else {
            log::debug!(target: "onesignal",
                        message_id:display = message.message_id,
                        language:display = language;
                        "no variant for message, not reporting");
            return None;
        };

        let config = self.config.model();
        let subscription_id = config.push_subscription_id.filter(|id| !id.is_empty())?;
        Some(ReportTarget {
            app_id: config.app_id,
            subscription_id,
            variant_id: variant_id.to_owned(),
        })
    }

    /// Returns `false` if `key` was already reported.
    fn insert_id(&self, kind: ReportKind, key: &str) -> bool {
        let inserted = kind.ids(&mut self.lock()).insert(key.to_owned());
        if !inserted {
            log::trace!(target: "onesignal", key, kind:debug = kind; "already reported");
        }
        inserted
    }

    fn complete_report(&self, kind: ReportKind, key: &str, result: crate::Result<()>) {
        match result {
            Ok(()) => {
                let ids = kind.ids(&mut self.lock()).clone();
                self.preferences
                    .save_string_set(kind.preference_key(), Some(ids));
            }
            Err(err) => {
                log::warn!(target: "onesignal", key, kind:debug = kind; "report failed, will retry on next event: {:?}", err);
                kind.ids(&mut self.lock()).remove(key);
            }
        }
    }
}
