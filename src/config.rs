use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    application::ApplicationService,
    client::Operations,
    clock::{Clock, SystemClock},
    iam::{
        DisplayDriver, HttpBackendConfig, HttpInAppBackend, InAppBackend, InAppRepository,
        InMemoryInAppRepository, NoopPromptHandler, PromptHandler, DEFAULT_BASE_URL,
    },
    models::ConfigModel,
    preferences::{InMemoryPreferences, Preferences},
    user::{OperationExecutor, OperationQueue},
    Client, Error, Result,
};

/// Configuration for [`Client`].
///
/// The display driver, the application service and either an operation executor or an
/// operation queue come from the platform layer and must be provided. Every other collaborator
/// has an in-memory or HTTP default.
pub struct ClientConfig {
    pub(crate) config: ConfigModel,
    pub(crate) base_url: String,
    pub(crate) display: Option<Arc<dyn DisplayDriver>>,
    pub(crate) application: Option<Arc<dyn ApplicationService>>,
    pub(crate) operation_executor: Option<Arc<dyn OperationExecutor>>,
    pub(crate) operation_queue: Option<Arc<dyn OperationQueue>>,
    pub(crate) backend: Option<Arc<dyn InAppBackend>>,
    pub(crate) repository: Arc<dyn InAppRepository>,
    pub(crate) preferences: Arc<dyn Preferences>,
    pub(crate) prompts: Arc<dyn PromptHandler>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) runtime: Option<Handle>,
}

impl ClientConfig {
    /// Create a default configuration for the OneSignal app `app_id`.
    ///
    /// ```
    /// # use onesignal_core::ClientConfig;
    /// ClientConfig::new("app-id");
    /// ```
    pub fn new(app_id: impl Into<String>) -> Self {
        ClientConfig {
            config: ConfigModel::new(app_id),
            base_url: DEFAULT_BASE_URL.to_owned(),
            display: None,
            application: None,
            operation_executor: None,
            operation_queue: None,
            backend: None,
            repository: Arc::new(InMemoryInAppRepository::new()),
            preferences: Arc::new(InMemoryPreferences::new()),
            prompts: Arc::new(NoopPromptHandler),
            clock: Arc::new(SystemClock),
            runtime: None,
        }
    }

    /// Set the driver rendering in-app messages.
    pub fn display_driver(&mut self, display: Arc<dyn DisplayDriver>) -> &mut Self {
        self.display = Some(display);
        self
    }

    /// Set the service reporting the host application's state.
    pub fn application(&mut self, application: Arc<dyn ApplicationService>) -> &mut Self {
        self.application = Some(application);
        self
    }

    /// Execute backend operations with `executor` on a built-in [`OperationRepo`].
    ///
    /// [`OperationRepo`]: crate::user::OperationRepo
    pub fn operation_executor(&mut self, executor: Arc<dyn OperationExecutor>) -> &mut Self {
        self.operation_executor = Some(executor);
        self
    }

    /// Use a custom operation queue. Takes precedence over
    /// [`operation_executor`](Self::operation_executor).
    pub fn operation_queue(&mut self, queue: Arc<dyn OperationQueue>) -> &mut Self {
        self.operation_queue = Some(queue);
        self
    }

    /// Use a custom in-app message backend instead of [`HttpInAppBackend`].
    pub fn backend(&mut self, backend: Arc<dyn InAppBackend>) -> &mut Self {
        self.backend = Some(backend);
        self
    }

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn base_url(&mut self, base_url: impl Into<String>) -> &mut Self {
        self.base_url = base_url.into();
        self
    }

    /// Persist the in-app message display history in `repository`.
    pub fn repository(&mut self, repository: Arc<dyn InAppRepository>) -> &mut Self {
        self.repository = repository;
        self
    }

    /// Persist SDK state in `preferences`.
    pub fn preferences(&mut self, preferences: Arc<dyn Preferences>) -> &mut Self {
        self.preferences = preferences;
        self
    }

    /// Show permission prompts requested by in-app messages with `prompts`.
    pub fn prompt_handler(&mut self, prompts: Arc<dyn PromptHandler>) -> &mut Self {
        self.prompts = prompts;
        self
    }

    /// Override the time source. Mostly useful for tests.
    pub fn clock(&mut self, clock: Arc<dyn Clock>) -> &mut Self {
        self.clock = clock;
        self
    }

    /// Run background tasks on `runtime`. Defaults to the runtime [`to_client`](Self::to_client)
    /// is called from.
    pub fn runtime(&mut self, runtime: Handle) -> &mut Self {
        self.runtime = Some(runtime);
        self
    }

    /// Id of this device's push subscription, if it is already known.
    pub fn push_subscription_id(&mut self, id: impl Into<String>) -> &mut Self {
        self.config.push_subscription_id = Some(id.into());
        self
    }

    /// Require the user's consent before fetching in-app messages.
    pub fn consent_required(&mut self, required: bool) -> &mut Self {
        self.config.consent_required = Some(required);
        self
    }

    /// Whether the user has given consent.
    pub fn consent_given(&mut self, given: bool) -> &mut Self {
        self.config.consent_given = Some(given);
        self
    }

    /// Minimum interval between two in-app message fetches.
    pub fn fetch_iam_min_interval(&mut self, interval: std::time::Duration) -> &mut Self {
        self.config.fetch_iam_min_interval = interval;
        self
    }

    /// How long operations not enqueued with `flush` wait to be batched.
    pub fn op_repo_execution_interval(&mut self, interval: std::time::Duration) -> &mut Self {
        self.config.op_repo_execution_interval = interval;
        self
    }

    /// Upper bound for the operation retry backoff.
    pub fn op_repo_max_backoff(&mut self, max: std::time::Duration) -> &mut Self {
        self.config.op_repo_max_backoff = max;
        self
    }

    /// Retries of an in-app message fetch answered with 425/429 when the server does not send
    /// its own limit.
    pub fn iam_fetch_retry_limit(&mut self, limit: u32) -> &mut Self {
        self.config.iam_fetch_retry_limit = limit;
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingCollaborator`] if a required collaborator was not provided.
    /// - [`Error::NoRuntime`] if called outside of a tokio runtime and no
    ///   [`runtime`](Self::runtime) was provided.
    /// - [`Error::InvalidBaseUrl`] if the base URL cannot be parsed.
    pub fn to_client(&self) -> Result<Client> {
        let runtime = match &self.runtime {
            Some(runtime) => runtime.clone(),
            None => Handle::try_current().map_err(|_| Error::NoRuntime)?,
        };
        let display = self
            .display
            .clone()
            .ok_or(Error::MissingCollaborator {
                name: "display_driver",
            })?;
        let application = self
            .application
            .clone()
            .ok_or(Error::MissingCollaborator {
                name: "application",
            })?;
        let operations = match (&self.operation_queue, &self.operation_executor) {
            (Some(queue), _) => Operations::Queue(queue.clone()),
            (None, Some(executor)) => Operations::Executor(executor.clone()),
            (None, None) => {
                return Err(Error::MissingCollaborator {
                    name: "operation_executor",
                })
            }
        };
        let backend: Arc<dyn InAppBackend> = match &self.backend {
            Some(backend) => backend.clone(),
            None => Arc::new(HttpInAppBackend::new(HttpBackendConfig {
                base_url: self.base_url.clone(),
                retry_limit: self.config.iam_fetch_retry_limit,
            })?),
        };

        Ok(Client::new(
            self,
            runtime,
            display,
            application,
            backend,
            operations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ClientConfig;
    use crate::{
        testing::{FakeApplication, FakeDisplayDriver, FakeOperationQueue},
        Error,
    };

    #[test]
    fn to_client_requires_runtime() {
        let mut config = ClientConfig::new("app");
        config
            .display_driver(Arc::new(FakeDisplayDriver::default()))
            .application(Arc::new(FakeApplication::default()))
            .operation_queue(Arc::new(FakeOperationQueue::default()));

        assert!(matches!(config.to_client(), Err(Error::NoRuntime)));
    }

    #[tokio::test]
    async fn to_client_requires_platform_collaborators() {
        let mut config = ClientConfig::new("app");
        assert!(matches!(
            config.to_client(),
            Err(Error::MissingCollaborator {
                name: "display_driver"
            })
        ));

        config
            .display_driver(Arc::new(FakeDisplayDriver::default()))
            .application(Arc::new(FakeApplication::default()));
        assert!(matches!(
            config.to_client(),
            Err(Error::MissingCollaborator {
                name: "operation_executor"
            })
        ));
    }

    #[tokio::test]
    async fn invalid_base_url() {
        let mut config = ClientConfig::new("app");
        config
            .display_driver(Arc::new(FakeDisplayDriver::default()))
            .application(Arc::new(FakeApplication::default()))
            .operation_queue(Arc::new(FakeOperationQueue::default()))
            .base_url("not a url");

        assert!(matches!(config.to_client(), Err(Error::InvalidBaseUrl(_))));
    }
}
