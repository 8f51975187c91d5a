//! Key-value persistence consumed by the SDK core. The platform layer provides the durable
//! implementation (e.g. shared preferences); [`InMemoryPreferences`] is used by default and in
//! tests.
use std::{
    collections::{HashMap, HashSet},
    sync::RwLock,
};

/// Ids of in-app messages that were dismissed.
pub const PREFS_OS_DISMISSED_IAMS: &str = "PREFS_OS_DISPLAYED_IAMS";
/// Ids of in-app messages an impression was reported for.
pub const PREFS_OS_IMPRESSIONED_IAMS: &str = "PREFS_OS_IMPRESSIONED_IAMS";
/// Click ids already reported.
pub const PREFS_OS_CLICKED_CLICK_IDS_IAMS: &str = "PREFS_OS_CLICKED_CLICK_IDS_IAMS";
/// Message-prefixed page ids a page impression was reported for.
pub const PREFS_OS_PAGE_IMPRESSIONED_IAMS: &str = "PREFS_OS_PAGE_IMPRESSIONED_IAMS";
/// Unix millis of the last in-app message dismissal.
pub const PREFS_OS_LAST_TIME_IAM_DISMISSED: &str = "PREFS_OS_LAST_TIME_IAM_DISMISSED";
/// Player id written by the 4.x SDK.
pub const PREFS_LEGACY_PLAYER_ID: &str = "GT_PLAYER_ID";
/// User sync values JSON written by the 4.x SDK.
pub const PREFS_LEGACY_USER_SYNCVALUES: &str = "ONESIGNAL_USERSTATE_SYNCVALYES_CURRENT_STATE";

/// Key-value storage. Saving `None` removes the key.
pub trait Preferences: Send + Sync {
    /// Value of the string `key`.
    fn get_string(&self, key: &str) -> Option<String>;
    /// Set or remove the string `key`.
    fn save_string(&self, key: &str, value: Option<String>);
    /// Value of the string set `key`.
    fn get_string_set(&self, key: &str) -> Option<HashSet<String>>;
    /// Set or remove the string set `key`.
    fn save_string_set(&self, key: &str, value: Option<HashSet<String>>);
    /// Value of the integer `key`.
    fn get_i64(&self, key: &str) -> Option<i64>;
    /// Set or remove the integer `key`.
    fn save_i64(&self, key: &str, value: Option<i64>);
}

#[derive(Debug, Clone, PartialEq)]
enum PrefValue {
    String(String),
    StringSet(HashSet<String>),
    I64(i64),
}

/// Thread-safe in-memory [`Preferences`].
#[derive(Debug, Default)]
pub struct InMemoryPreferences {
    values: RwLock<HashMap<String, PrefValue>>,
}

impl InMemoryPreferences {
    /// Create empty preferences.
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Option<PrefValue> {
        self.values
            .read()
            .expect("thread holding preferences lock should not panic")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: Option<PrefValue>) {
        let mut values = self
            .values
            .write()
            .expect("thread holding preferences lock should not panic");
        match value {
            Some(value) => {
                values.insert(key.to_owned(), value);
            }
            None => {
                values.remove(key);
            }
        }
    }
}

impl Preferences for InMemoryPreferences {
    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            PrefValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn save_string(&self, key: &str, value: Option<String>) {
        self.set(key, value.map(PrefValue::String));
    }

    fn get_string_set(&self, key: &str) -> Option<HashSet<String>> {
        match self.get(key)? {
            PrefValue::StringSet(s) => Some(s),
            _ => None,
        }
    }

    fn save_string_set(&self, key: &str, value: Option<HashSet<String>>) {
        self.set(key, value.map(PrefValue::StringSet));
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key)? {
            PrefValue::I64(v) => Some(v),
            _ => None,
        }
    }

    fn save_i64(&self, key: &str, value: Option<i64>) {
        self.set(key, value.map(PrefValue::I64));
    }
}
