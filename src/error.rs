use std::sync::Arc;

/// Represents a result type for operations in the SDK core.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// crate-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the SDK core.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The current user has not been initialized yet. This always indicates that the host
    /// application called into the SDK before initialization completed.
    #[error("user has not been initialized, call init_user() first")]
    NotInitialized,

    /// Invalid base URL configuration.
    #[error("invalid base_url configuration")]
    InvalidBaseUrl(#[source] url::ParseError),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// The backend answered with a non-2xx status code.
    #[error("backend responded with status {status}")]
    Backend {
        /// HTTP status code of the response.
        status: u16,
    },

    /// The backend payload could not be parsed.
    #[error("malformed backend payload")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    MalformedPayload(#[source] Arc<serde_json::Error>),

    /// The login operation for `external_id` could not be completed by the backend. The local
    /// user switch stays applied.
    #[error("could not login user {external_id}")]
    LoginFailed {
        /// External id the host application logged in with.
        external_id: String,
    },

    /// Refreshing the user from the backend failed after a login.
    #[error("could not refresh user {onesignal_id}")]
    RefreshFailed {
        /// Id of the user that could not be refreshed.
        onesignal_id: String,
    },

    /// The client was built outside of a tokio runtime and no runtime handle was provided.
    #[error("no tokio runtime available, provide one with ClientConfig::runtime()")]
    NoRuntime,

    /// A collaborator that has no default was not provided to
    /// [`ClientConfig`](crate::ClientConfig).
    #[error("missing {name}, provide one with ClientConfig::{name}()")]
    MissingCollaborator {
        /// Name of the missing collaborator's setter.
        name: &'static str,
    },

    /// The operation queue worker has stopped and cannot accept operations anymore.
    #[error("operation queue is closed")]
    OperationQueueClosed,
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::MalformedPayload(Arc::new(value))
    }
}
