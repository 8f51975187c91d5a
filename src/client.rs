use std::sync::Arc;

use tokio::runtime::Handle;

use crate::{
    application::ApplicationService,
    consistency::ConsistencyManager,
    iam::{
        DisplayDriver, EngineDependencies, InAppBackend, InAppMessage,
        InAppMessageClickListener, InAppMessageClickResult, InAppMessageEngine,
        InAppMessageLifecycleListener, InAppMessagePage, InAppState,
    },
    models::{
        ConfigModelStore, IdentityModel, IdentityModelStore, PropertiesModel,
        PropertiesModelStore, SubscriptionModelStore,
    },
    session::SessionService,
    triggers::{dynamic::DynamicTriggerController, TriggerController, TriggerStore, TriggerValue},
    user::{OperationExecutor, OperationQueue, OperationRepo, UserManager},
    ClientConfig, Result,
};

/// Where backend operations go.
pub(crate) enum Operations {
    Queue(Arc<dyn OperationQueue>),
    /// Run on a built-in [`OperationRepo`].
    Executor(Arc<dyn OperationExecutor>),
}

/// The SDK core of one OneSignal app.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// The client owns the current user and its models, the in-app message engine and the trigger
/// store. The platform layer forwards application events (session start, display callbacks) to
/// it and reads the models to render UI.
pub struct Client {
    config: Arc<ConfigModelStore>,
    identity: Arc<IdentityModelStore>,
    properties: Arc<PropertiesModelStore>,
    subscriptions: Arc<SubscriptionModelStore>,
    session: Arc<SessionService>,
    consistency: Arc<ConsistencyManager>,
    triggers: Arc<TriggerStore>,
    in_app_messages: Arc<InAppMessageEngine>,
    user: UserManager,
}

impl Client {
    pub(crate) fn new(
        config: &ClientConfig,
        runtime: Handle,
        display: Arc<dyn DisplayDriver>,
        application: Arc<dyn ApplicationService>,
        backend: Arc<dyn InAppBackend>,
        operations: Operations,
    ) -> Client {
        let config_store = Arc::new(ConfigModelStore::new(config.config.clone()));
        let identity = Arc::new(IdentityModelStore::new(IdentityModel::default()));
        let properties = Arc::new(PropertiesModelStore::new(PropertiesModel::default()));
        let subscriptions = Arc::new(SubscriptionModelStore::new());
        let session = Arc::new(SessionService::new(config.clock.clone()));
        let consistency = Arc::new(ConsistencyManager::new());
        let state = Arc::new(InAppState::new());

        let operations: Arc<dyn OperationQueue> = match operations {
            Operations::Queue(queue) => queue,
            Operations::Executor(executor) => {
                Arc::new(OperationRepo::new(executor, config_store.clone(), &runtime))
            }
        };

        let triggers = Arc::new(TriggerStore::new());
        let trigger_controller = Arc::new(TriggerController::new(
            triggers.clone(),
            DynamicTriggerController::new(
                config.clock.clone(),
                session.clone(),
                state.clone(),
                runtime.clone(),
            ),
        ));

        let in_app_messages = InAppMessageEngine::new(EngineDependencies {
            config: config_store.clone(),
            identity: identity.clone(),
            properties: properties.clone(),
            session: session.clone(),
            application,
            backend,
            repository: config.repository.clone(),
            preferences: config.preferences.clone(),
            display,
            prompts: config.prompts.clone(),
            triggers: trigger_controller,
            consistency: consistency.clone(),
            clock: config.clock.clone(),
            state,
            runtime,
        });
        in_app_messages.start();

        let user = UserManager::new(
            config_store.clone(),
            identity.clone(),
            properties.clone(),
            subscriptions.clone(),
            config.preferences.clone(),
            operations,
        );

        Client {
            config: config_store,
            identity,
            properties,
            subscriptions,
            session,
            consistency,
            triggers,
            in_app_messages,
            user,
        }
    }

    /// Create the device's user if there is none yet (see [`UserManager::init_user`]).
    pub fn init_user(&self, force_create_user: bool) {
        self.user.init_user(force_create_user);
    }

    /// Switch to the user identified by `external_id` (see [`UserManager::login`]).
    pub async fn login(&self, external_id: &str, jwt_token: Option<String>) -> Result<()> {
        self.user.login(external_id, jwt_token).await
    }

    /// Switch to a new anonymous user (see [`UserManager::logout`]).
    pub fn logout(&self) -> Result<()> {
        self.user.logout()
    }

    /// Start a new session. Fetches in-app messages.
    pub fn start_session(&self) {
        self.session.start_session();
    }

    /// Set the custom trigger `key`.
    pub fn add_trigger(&self, key: impl Into<String>, value: impl Into<TriggerValue>) {
        self.triggers.add_trigger(key, value);
    }

    /// Set several custom triggers.
    pub fn add_triggers(&self, triggers: impl IntoIterator<Item = (String, TriggerValue)>) {
        self.triggers.add_triggers(triggers);
    }

    /// Remove the custom trigger `key`.
    pub fn remove_trigger(&self, key: &str) {
        self.triggers.remove_trigger(key);
    }

    /// Remove several custom triggers.
    pub fn remove_triggers<'a>(&self, keys: impl IntoIterator<Item = &'a str>) {
        self.triggers.remove_triggers(keys);
    }

    /// Remove all custom triggers.
    pub fn clear_triggers(&self) {
        self.triggers.clear_triggers();
    }

    /// Pause or resume displaying in-app messages. Messages becoming eligible while paused are
    /// shown once resumed.
    pub fn set_paused(&self, paused: bool) {
        self.in_app_messages.set_paused(paused);
    }

    /// Whether displaying in-app messages is paused.
    pub fn paused(&self) -> bool {
        self.in_app_messages.paused()
    }

    /// Register `listener` for in-app message lifecycle events. The client only keeps a weak
    /// reference.
    pub fn add_lifecycle_listener(&self, listener: &Arc<dyn InAppMessageLifecycleListener>) {
        self.in_app_messages.add_lifecycle_listener(listener);
    }

    /// Unregister a lifecycle listener.
    pub fn remove_lifecycle_listener(&self, listener: &Arc<dyn InAppMessageLifecycleListener>) {
        self.in_app_messages.remove_lifecycle_listener(listener);
    }

    /// Register `listener` for in-app message clicks. The client only keeps a weak reference.
    pub fn add_click_listener(&self, listener: &Arc<dyn InAppMessageClickListener>) {
        self.in_app_messages.add_click_listener(listener);
    }

    /// Unregister a click listener.
    pub fn remove_click_listener(&self, listener: &Arc<dyn InAppMessageClickListener>) {
        self.in_app_messages.remove_click_listener(listener);
    }

    /// To be called by the display driver before `message` appears.
    pub fn on_message_will_display(&self, message: &InAppMessage) {
        self.in_app_messages.on_message_will_display(message);
    }

    /// To be called by the display driver once `message` is visible.
    pub async fn on_message_was_displayed(&self, message: &InAppMessage) {
        self.in_app_messages.on_message_was_displayed(message).await;
    }

    /// To be called by the display driver before `message` is dismissed.
    pub fn on_message_will_dismiss(&self, message: &InAppMessage) {
        self.in_app_messages.on_message_will_dismiss(message);
    }

    /// To be called by the display driver once `message` was dismissed.
    pub async fn on_message_was_dismissed(&self, message: &InAppMessage) {
        self.in_app_messages.on_message_was_dismissed(message).await;
    }

    /// To be called by the display driver when the user clicked an element of `message`.
    pub async fn on_message_action_occurred(
        &self,
        message: &InAppMessage,
        result: InAppMessageClickResult,
    ) {
        self.in_app_messages
            .on_message_action_occurred(message, result)
            .await;
    }

    /// To be called by the display driver when a page of `message` is shown.
    pub async fn on_message_page_changed(&self, message: &InAppMessage, page: &InAppMessagePage) {
        self.in_app_messages
            .on_message_page_changed(message, page)
            .await;
    }

    /// Display a preview message sent to this device by a test notification.
    pub async fn display_preview_message(&self, message: InAppMessage) {
        self.in_app_messages.display_preview_message(message).await;
    }

    /// Id of the current user. Empty before [`init_user`](Self::init_user).
    pub fn onesignal_id(&self) -> String {
        self.user.onesignal_id()
    }

    /// External id of the current user, `None` if the user is anonymous.
    pub fn external_id(&self) -> Option<String> {
        self.user.external_id()
    }

    /// Id of this device's push subscription.
    pub fn push_subscription_id(&self) -> Option<String> {
        self.user.push_subscription_id()
    }

    /// Application configuration. Updated by the platform layer (e.g. once the push subscription
    /// was created, or with remote params).
    pub fn config(&self) -> &Arc<ConfigModelStore> {
        &self.config
    }

    /// Identity of the current user.
    pub fn identity(&self) -> &Arc<IdentityModelStore> {
        &self.identity
    }

    /// Properties of the current user.
    pub fn properties(&self) -> &Arc<PropertiesModelStore> {
        &self.properties
    }

    /// Subscriptions of the current user.
    pub fn subscriptions(&self) -> &Arc<SubscriptionModelStore> {
        &self.subscriptions
    }

    /// Read-your-write tokens of completed backend writes. The operation executor records them
    /// here so in-app message fetches observe the writes.
    pub fn consistency(&self) -> &Arc<ConsistencyManager> {
        &self.consistency
    }

    /// The in-app message engine.
    pub fn in_app_messages(&self) -> &Arc<InAppMessageEngine> {
        &self.in_app_messages
    }
}
