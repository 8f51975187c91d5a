use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{clock::Timestamp, triggers::Trigger};

/// Variant platforms in order of preference.
const PREFERRED_VARIANT_ORDER: [&str; 3] = ["android", "app", "all"];

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
///
/// This helps to isolate errors in a subtree: if one message fails to parse (e.g., new server
/// format), the rest of the messages are still usable.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// Response format of the in-app message list endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InAppMessageListResponse {
    /// Messages for this subscription. Each message is wrapped in `TryParse` so that one bad
    /// message does not hide the others.
    #[serde(default)]
    pub in_app_messages: Vec<TryParse<InAppMessage>>,
}

impl InAppMessageListResponse {
    /// Successfully parsed messages. Messages that failed to parse are logged and skipped.
    pub fn into_messages(self) -> Vec<InAppMessage> {
        self.in_app_messages
            .into_iter()
            .filter_map(|message| match message {
                TryParse::Parsed(message) => Some(message),
                TryParse::ParseFailed(json) => {
                    log::warn!(target: "onesignal",
                               message_id:display = json.get("id").and_then(|id| id.as_str()).unwrap_or("<unknown>");
                               "skipping in-app message that failed to parse");
                    None
                }
            })
            .collect()
    }
}

/// How often and how frequently a message may be shown again after being dismissed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Option<RedisplayConfig>")]
pub struct RedisplayStats {
    /// When the message was last displayed (dismissed after a successful display).
    pub last_display_time: Option<Timestamp>,
    /// How many times the message was displayed.
    pub display_quantity: u32,
    /// Maximum number of displays. `None` means unlimited.
    pub display_limit: Option<u32>,
    /// Minimum time between two displays.
    pub display_delay: Duration,
    /// Whether the server configured redisplay for this message.
    pub redisplay_enabled: bool,
}

impl Default for RedisplayStats {
    fn default() -> Self {
        RedisplayStats {
            last_display_time: None,
            display_quantity: 0,
            display_limit: Some(1),
            display_delay: Duration::ZERO,
            redisplay_enabled: false,
        }
    }
}

#[derive(Deserialize)]
struct RedisplayConfig {
    #[serde(default = "default_display_limit")]
    limit: i64,
    #[serde(default)]
    delay: u64,
}

fn default_display_limit() -> i64 {
    1
}

impl From<Option<RedisplayConfig>> for RedisplayStats {
    fn from(config: Option<RedisplayConfig>) -> Self {
        let Some(config) = config else {
            return RedisplayStats::default();
        };
        RedisplayStats {
            display_limit: u32::try_from(config.limit).ok(),
            display_delay: Duration::from_secs(config.delay),
            redisplay_enabled: true,
            ..RedisplayStats::default()
        }
    }
}

impl RedisplayStats {
    /// Returns `true` while the display limit is not reached and the delay since the last display
    /// has elapsed.
    pub fn should_display_again(&self, now: Timestamp) -> bool {
        let below_limit = match self.display_limit {
            Some(limit) => self.display_quantity < limit,
            None => true,
        };
        below_limit && self.is_delay_time_satisfied(now)
    }

    /// Returns `true` if enough time passed since the last display.
    pub fn is_delay_time_satisfied(&self, now: Timestamp) -> bool {
        let Some(last_display_time) = self.last_display_time else {
            return true;
        };
        let elapsed = (now - last_display_time).to_std().unwrap_or(Duration::ZERO);
        elapsed.as_secs() >= self.display_delay.as_secs()
    }

    /// Copy the display history from a saved record.
    pub fn set_display_stats(&mut self, last_display_time: Option<Timestamp>, display_quantity: u32) {
        self.last_display_time = last_display_time;
        self.display_quantity = display_quantity;
    }

    /// Count one more display.
    pub fn increment_display_quantity(&mut self) {
        self.display_quantity += 1;
    }
}

/// An in-app message as served by the backend plus the local display state attached to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InAppMessage {
    /// Backend message id.
    #[serde(rename = "id")]
    pub message_id: String,
    /// Platform -> language -> variant id.
    #[serde(default)]
    pub variants: HashMap<String, HashMap<String, String>>,
    /// OR of AND-groups.
    #[serde(default)]
    pub triggers: Vec<Vec<Trigger>>,
    /// Redisplay configuration and display history.
    #[serde(default, rename = "redisplay")]
    pub redisplay_stats: RedisplayStats,
    /// The message is finished once this time has passed.
    #[serde(default, deserialize_with = "deserialize_end_time")]
    pub end_time: Option<Timestamp>,
    /// Whether the message content uses liquid templating.
    #[serde(default)]
    pub has_liquid: bool,
    /// Preview messages are sent to test devices. They are never persisted nor reported.
    #[serde(default)]
    pub is_preview: bool,

    /// Explicitly finished (e.g. by the backend ending the campaign).
    #[serde(skip)]
    pub finished: bool,
    /// Whether the message was displayed in the current session.
    #[serde(skip)]
    pub is_displayed_in_session: bool,
    /// Set when one of the message's triggers changed since the last display.
    #[serde(skip)]
    pub is_trigger_changed: bool,
    #[serde(skip)]
    click_ids: HashSet<String>,
    #[serde(skip)]
    action_taken: bool,
}

fn deserialize_end_time<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Timestamp>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&chrono::Utc))
            .map_err(|err| {
                log::warn!(target: "onesignal", end_time:display = s; "invalid in-app message end_time: {:?}", err);
            })
            .ok()
    }))
}

impl InAppMessage {
    /// Create a message with no triggers, variants or redisplay configuration.
    pub fn new(message_id: impl Into<String>) -> InAppMessage {
        InAppMessage {
            message_id: message_id.into(),
            variants: HashMap::new(),
            triggers: Vec::new(),
            redisplay_stats: RedisplayStats::default(),
            end_time: None,
            has_liquid: false,
            is_preview: false,
            finished: false,
            is_displayed_in_session: false,
            is_trigger_changed: false,
            click_ids: HashSet::new(),
            action_taken: false,
        }
    }

    /// Returns `true` if the message was explicitly finished or its end time has passed.
    pub fn is_finished(&self, now: Timestamp) -> bool {
        self.finished || self.end_time.is_some_and(|end| end < now)
    }

    /// Variant to report events for, given the user's `language`.
    pub fn variant_id(&self, language: &str) -> Option<&str> {
        let variants = PREFERRED_VARIANT_ORDER
            .iter()
            .find_map(|platform| self.variants.get(*platform))?;
        variants
            .get(language)
            .or_else(|| variants.get("default"))
            .map(String::as_str)
    }

    /// Returns `true` if `click_id` has not been recorded for the current display cycle.
    pub fn is_click_available(&self, click_id: &str) -> bool {
        !self.click_ids.contains(click_id)
    }

    /// Record `click_id` for the current display cycle.
    pub fn add_click_id(&mut self, click_id: impl Into<String>) {
        self.click_ids.insert(click_id.into());
    }

    /// Forget `click_id`, e.g. after its report failed.
    pub fn remove_click_id(&mut self, click_id: &str) {
        self.click_ids.remove(click_id);
    }

    /// Forget all recorded click ids.
    pub fn clear_click_ids(&mut self) {
        self.click_ids.clear();
    }

    /// Click ids recorded for the current display cycle.
    pub fn click_ids(&self) -> &HashSet<String> {
        &self.click_ids
    }

    pub(crate) fn set_click_ids(&mut self, click_ids: HashSet<String>) {
        self.click_ids = click_ids;
    }

    /// Returns `true` the first time an action is taken on this message instance.
    pub fn take_action_as_unique(&mut self) -> bool {
        !std::mem::replace(&mut self.action_taken, true)
    }
}

/// Kind of prompt an in-app message button may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InAppMessagePromptKind {
    /// Notification permission prompt.
    Push,
    /// Location permission prompt.
    Location,
}

/// Tag changes requested by a click.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InAppMessageTagAction {
    /// Tags to set.
    #[serde(default)]
    pub adds: HashMap<String, String>,
    /// Tag keys to remove.
    #[serde(default)]
    pub removes: Vec<String>,
}

/// Result of a click on an element of a displayed message, reported by the display driver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InAppMessageClickResult {
    /// Id of the clicked element. Clicks are reported at most once per id.
    #[serde(default, rename = "id")]
    pub click_id: Option<String>,
    /// Name of the clicked element.
    #[serde(default, rename = "name")]
    pub click_name: Option<String>,
    /// URL to open.
    #[serde(default)]
    pub url: Option<String>,
    /// Whether the click closes the message.
    #[serde(default, rename = "close")]
    pub close_message: bool,
    /// Tag changes requested by the click.
    #[serde(default)]
    pub tags: Option<InAppMessageTagAction>,
    /// Prompts to show after the click.
    #[serde(default)]
    pub prompts: Vec<InAppMessagePromptKind>,
    /// Set by the engine: `true` if this is the first click on the message instance.
    #[serde(skip)]
    pub is_first_click: bool,
}

/// A page of a multi-page message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InAppMessagePage {
    /// Page identifier, unique within the message.
    pub page_id: String,
    /// Position of the page in the message.
    #[serde(default)]
    pub page_index: Option<u32>,
}
