use serde::{Deserialize, Serialize};

/// Channel of a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum SubscriptionType {
    #[default]
    Push,
    Email,
    Sms,
}

/// Status of a subscription. Codes match the values exchanged with the backend and the values
/// persisted by the 4.x SDK as `notification_types`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i32", from = "i32")]
#[allow(missing_docs)]
pub enum SubscriptionStatus {
    Subscribed,
    #[default]
    NoPermission,
    Unsubscribe,
    MissingAndroidSupportLibrary,
    MissingFirebaseFcmLibrary,
    OutdatedAndroidSupportLibrary,
    InvalidFcmSenderId,
    OutdatedGooglePlayServicesApp,
    FirebaseFcmInitError,
    FirebaseFcmServiceNotAvailable,
    FirebaseFcmMiscException,
    Disabled,
    Errored,
}

impl SubscriptionStatus {
    /// Integer code of the status.
    pub fn code(self) -> i32 {
        match self {
            Self::Subscribed => 1,
            Self::NoPermission => 0,
            Self::Unsubscribe => -2,
            Self::MissingAndroidSupportLibrary => -3,
            Self::MissingFirebaseFcmLibrary => -4,
            Self::OutdatedAndroidSupportLibrary => -5,
            Self::InvalidFcmSenderId => -6,
            Self::OutdatedGooglePlayServicesApp => -7,
            Self::FirebaseFcmInitError => -8,
            Self::FirebaseFcmServiceNotAvailable => -9,
            Self::FirebaseFcmMiscException => -11,
            Self::Disabled => -31,
            Self::Errored => -99,
        }
    }

    /// Status for `code`, `None` for unknown codes.
    pub fn from_code(code: i32) -> Option<SubscriptionStatus> {
        Some(match code {
            1 => Self::Subscribed,
            0 => Self::NoPermission,
            -2 => Self::Unsubscribe,
            -3 => Self::MissingAndroidSupportLibrary,
            -4 => Self::MissingFirebaseFcmLibrary,
            -5 => Self::OutdatedAndroidSupportLibrary,
            -6 => Self::InvalidFcmSenderId,
            -7 => Self::OutdatedGooglePlayServicesApp,
            -8 => Self::FirebaseFcmInitError,
            -9 => Self::FirebaseFcmServiceNotAvailable,
            -11 => Self::FirebaseFcmMiscException,
            -31 => Self::Disabled,
            -99 => Self::Errored,
            _ => return None,
        })
    }
}

impl From<SubscriptionStatus> for i32 {
    fn from(value: SubscriptionStatus) -> i32 {
        value.code()
    }
}

impl From<i32> for SubscriptionStatus {
    fn from(value: i32) -> SubscriptionStatus {
        SubscriptionStatus::from_code(value).unwrap_or(SubscriptionStatus::NoPermission)
    }
}

/// A push, email or sms subscription of the current user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SubscriptionModel {
    /// Local (`local-` prefixed) or backend-assigned subscription id.
    pub id: String,
    #[serde(rename = "type")]
    /// Push, email or SMS.
    pub subscription_type: SubscriptionType,
    /// Whether the user wants to receive messages on this subscription.
    pub opted_in: bool,
    /// Push token, email address or phone number.
    pub address: String,
    /// Delivery status reported by the device.
    pub status: SubscriptionStatus,
    /// Version of the SDK that created the subscription.
    #[serde(default)]
    pub sdk: String,
}
