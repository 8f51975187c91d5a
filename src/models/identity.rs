use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Identity of the current user.
///
/// A default `IdentityModel` has an empty `onesignal_id`, which means the user has not been
/// initialized yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IdentityModel {
    /// Local (`local-` prefixed) or backend-assigned user id.
    pub onesignal_id: String,
    /// Developer-supplied identity. `None` for anonymous users.
    pub external_id: Option<String>,
    /// Token used to authenticate requests made on behalf of this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_token: Option<String>,
    /// Additional aliases (label -> id).
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl IdentityModel {
    /// Returns `true` once a user id has been assigned.
    pub fn has_onesignal_id(&self) -> bool {
        !self.onesignal_id.is_empty()
    }

    /// Returns `true` if the user has no external id.
    pub fn is_anonymous(&self) -> bool {
        self.external_id.is_none()
    }
}
