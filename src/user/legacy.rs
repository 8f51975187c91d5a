//! State persisted by the 4.x SDK that is migrated into the current user model.
use serde::Deserialize;

use crate::models::{SubscriptionModel, SubscriptionStatus, SubscriptionType};

/// The subset of the 4.x user sync values needed to rebuild the push subscription.
#[derive(Debug, Default, Deserialize)]
struct LegacySyncValues {
    #[serde(default)]
    notification_types: Option<i32>,
    #[serde(default)]
    identifier: Option<String>,
}

/// Rebuild the push subscription `player_id` from the 4.x sync values JSON.
///
/// Returns `None` if `sync_values` is not valid JSON.
pub(super) fn push_subscription_from_sync_values(
    player_id: &str,
    sync_values: &str,
    sdk: &str,
) -> Option<SubscriptionModel> {
    let values: LegacySyncValues = match serde_json::from_str(sync_values) {
        Ok(values) => values,
        Err(err) => {
            log::warn!(target: "onesignal", player_id, err:display = err; "failed to parse legacy user sync values");
            return None;
        }
    };

    let status = values
        .notification_types
        .map(SubscriptionStatus::from)
        .unwrap_or(SubscriptionStatus::Subscribed);
    let opted_in = !matches!(
        status,
        SubscriptionStatus::NoPermission | SubscriptionStatus::Unsubscribe
    );

    Some(SubscriptionModel {
        id: player_id.to_owned(),
        subscription_type: SubscriptionType::Push,
        opted_in,
        address: values.identifier.unwrap_or_default(),
        status,
        sdk: sdk.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::push_subscription_from_sync_values;
    use crate::models::{SubscriptionStatus, SubscriptionType};

    #[test]
    fn subscribed_legacy_user() {
        let model = push_subscription_from_sync_values(
            "player",
            r#"{"notification_types":1,"identifier":"tok"}"#,
            "5.0.0",
        )
        .unwrap();

        assert_eq!(model.id, "player");
        assert_eq!(model.subscription_type, SubscriptionType::Push);
        assert!(model.opted_in);
        assert_eq!(model.address, "tok");
        assert_eq!(model.status, SubscriptionStatus::Subscribed);
    }

    #[test]
    fn unsubscribed_legacy_user_is_opted_out() {
        let model =
            push_subscription_from_sync_values("player", r#"{"notification_types":-2}"#, "5.0.0")
                .unwrap();

        assert!(!model.opted_in);
        assert_eq!(model.address, "");
        assert_eq!(model.status, SubscriptionStatus::Unsubscribe);
    }

    #[test]
    fn unknown_code_means_no_permission() {
        let model =
            push_subscription_from_sync_values("player", r#"{"notification_types":7}"#, "5.0.0")
                .unwrap();

        assert!(!model.opted_in);
        assert_eq!(model.status, SubscriptionStatus::NoPermission);
    }

    #[test]
    fn invalid_json() {
        assert!(push_subscription_from_sync_values("player", "{", "5.0.0").is_none());
    }
}
