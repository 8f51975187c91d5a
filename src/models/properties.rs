use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Properties of the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PropertiesModel {
    /// Id of the user these properties belong to.
    pub onesignal_id: String,
    /// Preferred language, e.g. `en`.
    #[serde(default)]
    pub language: Option<String>,
    /// IANA time zone id.
    #[serde(default)]
    pub timezone_id: Option<String>,
    /// ISO 3166 country code.
    #[serde(default)]
    pub country: Option<String>,
    /// User tags (key -> value).
    #[serde(default)]
    pub tags: HashMap<String, String>,
}
