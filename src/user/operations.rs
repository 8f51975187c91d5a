use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A unit of backend synchronization work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "kebab-case")]
#[allow(missing_docs)]
pub enum Operation {
    /// Create the user `onesignal_id` on the backend, or identify it with `external_id`.
    ///
    /// `existing_onesignal_id` is the id of the anonymous user being converted into the
    /// identified one, if any.
    LoginUser {
        app_id: String,
        onesignal_id: String,
        external_id: Option<String>,
        existing_onesignal_id: Option<String>,
    },
    /// Create the user `onesignal_id` from a subscription that already exists on the backend
    /// (migration from the 4.x SDK).
    LoginUserFromSubscription {
        app_id: String,
        onesignal_id: String,
        legacy_subscription_id: String,
    },
    /// Reload the user `onesignal_id` from the backend.
    RefreshUser {
        app_id: String,
        onesignal_id: String,
    },
    /// Move the subscription `from_subscription_id` to the user `to_onesignal_id`.
    TransferSubscription {
        app_id: String,
        from_subscription_id: String,
        to_onesignal_id: String,
    },
}

impl Operation {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::LoginUser { .. } => "login-user",
            Operation::LoginUserFromSubscription { .. } => "login-user-from-subscription",
            Operation::RefreshUser { .. } => "refresh-user",
            Operation::TransferSubscription { .. } => "transfer-subscription",
        }
    }

    /// Id of the user the operation applies to.
    pub fn onesignal_id(&self) -> &str {
        match self {
            Operation::LoginUser { onesignal_id, .. }
            | Operation::LoginUserFromSubscription { onesignal_id, .. }
            | Operation::RefreshUser { onesignal_id, .. } => onesignal_id,
            Operation::TransferSubscription {
                to_onesignal_id, ..
            } => to_onesignal_id,
        }
    }

    /// Replace local ids the backend has assigned permanent ids to.
    pub fn translate_ids(&mut self, translations: &HashMap<String, String>) {
        let translate = |id: &mut String| {
            if let Some(translated) = translations.get(id.as_str()) {
                *id = translated.clone();
            }
        };
        match self {
            Operation::LoginUser {
                onesignal_id,
                existing_onesignal_id,
                ..
            } => {
                translate(onesignal_id);
                if let Some(existing) = existing_onesignal_id {
                    translate(existing);
                }
            }
            Operation::LoginUserFromSubscription { onesignal_id, .. }
            | Operation::RefreshUser { onesignal_id, .. } => translate(onesignal_id),
            Operation::TransferSubscription {
                from_subscription_id,
                to_onesignal_id,
                ..
            } => {
                translate(from_subscription_id);
                translate(to_onesignal_id);
            }
        }
    }
}

/// Ordered queue of operations. Operations execute in enqueue order.
#[async_trait]
pub trait OperationQueue: Send + Sync {
    /// Enqueue `operation` without waiting for it. Transient failures are retried internally.
    ///
    /// With `flush`, the queue is processed immediately instead of after the batching interval.
    fn enqueue(&self, operation: Operation, flush: bool);

    /// Enqueue `operation` and wait until it was executed.
    ///
    /// Returns `Ok(false)` if the operation failed without possible retry, and
    /// [`Error::OperationQueueClosed`](crate::Error::OperationQueueClosed) if the queue stopped
    /// before executing it.
    async fn enqueue_and_wait(&self, operation: Operation, flush: bool) -> Result<bool>;
}

/// Outcome of executing an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    /// The operation succeeded.
    Success,
    /// The operation succeeded and the backend assigned permanent ids to local ids
    /// (local id -> backend id). Queued operations are rewritten accordingly.
    SuccessWithIdTranslations(HashMap<String, String>),
    /// Transient failure, the operation is retried with backoff.
    FailRetry,
    /// Permanent failure, the operation is dropped.
    FailNoRetry,
}

/// Performs operations against the backend. Implemented by the platform layer.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Execute `operation` and report how it went.
    async fn execute(&self, operation: &Operation) -> ExecutionResult;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::Operation;

    #[test]
    fn translate_ids_rewrites_local_ids() {
        let translations = HashMap::from([
            ("local-user".to_owned(), "user".to_owned()),
            ("local-sub".to_owned(), "sub".to_owned()),
        ]);
        let mut refresh = Operation::RefreshUser {
            app_id: "app".to_owned(),
            onesignal_id: "local-user".to_owned(),
        };
        let mut transfer = Operation::TransferSubscription {
            app_id: "app".to_owned(),
            from_subscription_id: "local-sub".to_owned(),
            to_onesignal_id: "other".to_owned(),
        };

        refresh.translate_ids(&translations);
        transfer.translate_ids(&translations);

        assert_eq!(refresh.onesignal_id(), "user");
        assert_eq!(
            transfer,
            Operation::TransferSubscription {
                app_id: "app".to_owned(),
                from_subscription_id: "sub".to_owned(),
                to_onesignal_id: "other".to_owned(),
            }
        );
    }

    #[test]
    fn serializes_with_name_tag() {
        let operation = Operation::RefreshUser {
            app_id: "app".to_owned(),
            onesignal_id: "user".to_owned(),
        };
        assert_eq!(
            serde_json::to_value(&operation).unwrap(),
            serde_json::json!({"name": "refresh-user", "app_id": "app", "onesignal_id": "user"})
        );
    }
}
