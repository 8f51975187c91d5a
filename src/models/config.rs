use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Long-lived application configuration. Fields are updated locally (e.g. the push subscription
/// id) or hydrated from remote params with [`ModelChangeTag::Hydrate`](super::ModelChangeTag).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfigModel {
    /// OneSignal application id.
    pub app_id: String,
    /// Id of this device's push subscription.
    #[serde(default)]
    pub push_subscription_id: Option<String>,
    /// Whether the host requires the user's consent before any data is sent.
    #[serde(default)]
    pub consent_required: Option<bool>,
    /// Whether the user has given consent.
    #[serde(default)]
    pub consent_given: Option<bool>,
    /// Minimum interval between two in-app message fetches.
    #[serde(default = "ConfigModel::default_fetch_iam_min_interval")]
    pub fetch_iam_min_interval: Duration,
    /// How long the operation repo waits to batch operations not enqueued with `flush`.
    #[serde(default = "ConfigModel::default_op_repo_execution_interval")]
    pub op_repo_execution_interval: Duration,
    /// Upper bound for the operation retry backoff.
    #[serde(default = "ConfigModel::default_op_repo_max_backoff")]
    pub op_repo_max_backoff: Duration,
    /// Retries of an in-app message fetch answered with 425/429 when the server does not provide
    /// its own limit.
    #[serde(default)]
    pub iam_fetch_retry_limit: u32,
}

impl ConfigModel {
    /// Default value for [`ConfigModel::fetch_iam_min_interval`].
    pub const DEFAULT_FETCH_IAM_MIN_INTERVAL: Duration = Duration::from_secs(30);
    /// Default value for [`ConfigModel::op_repo_execution_interval`].
    pub const DEFAULT_OP_REPO_EXECUTION_INTERVAL: Duration = Duration::from_secs(5);
    /// Default value for [`ConfigModel::op_repo_max_backoff`].
    pub const DEFAULT_OP_REPO_MAX_BACKOFF: Duration = Duration::from_secs(120);

    /// Create a configuration for `app_id` with default tunables.
    pub fn new(app_id: impl Into<String>) -> ConfigModel {
        ConfigModel {
            app_id: app_id.into(),
            push_subscription_id: None,
            consent_required: None,
            consent_given: None,
            fetch_iam_min_interval: Self::DEFAULT_FETCH_IAM_MIN_INTERVAL,
            op_repo_execution_interval: Self::DEFAULT_OP_REPO_EXECUTION_INTERVAL,
            op_repo_max_backoff: Self::DEFAULT_OP_REPO_MAX_BACKOFF,
            iam_fetch_retry_limit: 0,
        }
    }

    /// Returns `true` unless consent is required and has not been given.
    pub fn has_consent(&self) -> bool {
        self.consent_required != Some(true) || self.consent_given == Some(true)
    }

    fn default_fetch_iam_min_interval() -> Duration {
        Self::DEFAULT_FETCH_IAM_MIN_INTERVAL
    }

    fn default_op_repo_execution_interval() -> Duration {
        Self::DEFAULT_OP_REPO_EXECUTION_INTERVAL
    }

    fn default_op_repo_max_backoff() -> Duration {
        Self::DEFAULT_OP_REPO_MAX_BACKOFF
    }
}
