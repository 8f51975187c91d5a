//! In-memory collaborators and a fully wired environment for unit tests.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, Weak,
    },
};

use async_trait::async_trait;
use tokio::runtime::{Handle, Runtime};

use crate::{
    application::ApplicationService,
    clock::{Clock, Timestamp},
    consistency::{ConsistencyManager, RywData},
    iam::{
        DisplayDriver, EngineDependencies, InAppBackend, InAppMessage, InAppMessageEngine,
        InAppMessageLifecycleListener, InAppMessagePromptKind, InAppState,
        InMemoryInAppRepository, PromptHandler, PromptResult, SessionDurationProvider,
    },
    models::{
        ConfigModel, ConfigModelStore, IdentityModel, IdentityModelStore, ModelChangeTag,
        PropertiesModel, PropertiesModelStore, SubscriptionModel, SubscriptionModelStore,
        SubscriptionStatus, SubscriptionType,
    },
    preferences::InMemoryPreferences,
    session::SessionService,
    triggers::{
        dynamic::DynamicTriggerController, Trigger, TriggerController, TriggerKind,
        TriggerOperator, TriggerStore, TriggerValue,
    },
    user::{
        ExecutionResult, Operation, OperationExecutor, OperationQueue, UserManager, UserSwitcher,
    },
    Result,
};

/// Clock that only moves when told to.
pub(crate) struct ManualClock(Mutex<Timestamp>);

impl ManualClock {
    pub(crate) fn new() -> ManualClock {
        ManualClock(Mutex::new(
            chrono::DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .to_utc(),
        ))
    }

    pub(crate) fn now(&self) -> Timestamp {
        *self.0.lock().unwrap()
    }

    pub(crate) fn advance(&self, by: chrono::Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        ManualClock::now(self)
    }
}

#[derive(Default)]
struct BackendState {
    messages: Vec<InAppMessage>,
    fail_list: bool,
    list_calls: usize,
    last_ryw_token: Option<String>,
    fail_reports: bool,
    reports: Vec<String>,
}

/// Backend serving a fixed message list and recording reports.
#[derive(Default)]
pub(crate) struct FakeBackend(Mutex<BackendState>);

impl FakeBackend {
    pub(crate) fn set_messages(&self, messages: Vec<InAppMessage>) {
        self.0.lock().unwrap().messages = messages;
    }

    pub(crate) fn fail_list(&self) {
        self.0.lock().unwrap().fail_list = true;
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.0.lock().unwrap().list_calls
    }

    pub(crate) fn last_ryw_token(&self) -> Option<String> {
        self.0.lock().unwrap().last_ryw_token.clone()
    }

    pub(crate) fn fail_reports(&self, fail: bool) {
        self.0.lock().unwrap().fail_reports = fail;
    }

    /// Successful reports, e.g. `"impression m m-variant"`.
    pub(crate) fn reports(&self) -> Vec<String> {
        self.0.lock().unwrap().reports.clone()
    }

    fn report(&self, report: String) -> Result<()> {
        let mut state = self.0.lock().unwrap();
        if state.fail_reports {
            return Err(crate::Error::Backend { status: 500 });
        }
        state.reports.push(report);
        Ok(())
    }
}

#[async_trait]
impl InAppBackend for FakeBackend {
    async fn list_in_app_messages(
        &self,
        _app_id: &str,
        _subscription_id: &str,
        ryw_data: Option<RywData>,
        _session_duration: SessionDurationProvider<'_>,
    ) -> Option<Vec<InAppMessage>> {
        let mut state = self.0.lock().unwrap();
        state.list_calls += 1;
        state.last_ryw_token = ryw_data.and_then(|data| data.ryw_token);
        if state.fail_list {
            None
        } else {
            Some(state.messages.clone())
        }
    }

    async fn send_impression(
        &self,
        _app_id: &str,
        _subscription_id: &str,
        variant_id: &str,
        message_id: &str,
    ) -> Result<()> {
        self.report(format!("impression {message_id} {variant_id}"))
    }

    async fn send_click(
        &self,
        _app_id: &str,
        _subscription_id: &str,
        variant_id: &str,
        message_id: &str,
        click_id: Option<&str>,
        is_first_click: bool,
    ) -> Result<()> {
        let first = if is_first_click { " first" } else { "" };
        self.report(format!(
            "click {message_id} {variant_id} {}{first}",
            click_id.unwrap_or("-")
        ))
    }

    async fn send_page_impression(
        &self,
        _app_id: &str,
        _subscription_id: &str,
        variant_id: &str,
        message_id: &str,
        page_id: &str,
    ) -> Result<()> {
        self.report(format!("page {message_id} {variant_id} {page_id}"))
    }
}

#[derive(Default)]
struct DisplayState {
    results: VecDeque<Option<bool>>,
    attempts: usize,
    displayed: Vec<String>,
    dismiss_calls: usize,
    dismiss_with: Option<(Weak<InAppMessageEngine>, InAppMessage)>,
}

/// Display driver recording displayed message ids. Displays succeed unless told otherwise.
#[derive(Default)]
pub(crate) struct FakeDisplayDriver(Mutex<DisplayState>);

impl FakeDisplayDriver {
    /// Result of the next display attempt.
    pub(crate) fn push_result(&self, result: Option<bool>) {
        self.0.lock().unwrap().results.push_back(result);
    }

    pub(crate) fn displayed(&self) -> Vec<String> {
        self.0.lock().unwrap().displayed.clone()
    }

    /// Number of display attempts, whatever their result.
    pub(crate) fn attempts(&self) -> usize {
        self.0.lock().unwrap().attempts
    }

    pub(crate) fn dismiss_calls(&self) -> usize {
        self.0.lock().unwrap().dismiss_calls
    }

    /// Report the dismissal of `message` to `engine` on the next dismiss request.
    pub(crate) fn dismiss_with(&self, engine: Arc<InAppMessageEngine>, message: InAppMessage) {
        self.0.lock().unwrap().dismiss_with = Some((Arc::downgrade(&engine), message));
    }
}

#[async_trait]
impl DisplayDriver for FakeDisplayDriver {
    async fn display_message(&self, message: &InAppMessage) -> Option<bool> {
        let mut state = self.0.lock().unwrap();
        state.attempts += 1;
        let result = state.results.pop_front().unwrap_or(Some(true));
        if result == Some(true) {
            state.displayed.push(message.message_id.clone());
        }
        result
    }

    async fn dismiss_current_in_app_message(&self) {
        let dismiss = {
            let mut state = self.0.lock().unwrap();
            state.dismiss_calls += 1;
            state.dismiss_with.take()
        };
        if let Some((engine, message)) = dismiss {
            if let Some(engine) = engine.upgrade() {
                engine.on_message_was_dismissed(&message).await;
            }
        }
    }
}

/// Application that is in the foreground and ready to display unless told otherwise.
pub(crate) struct FakeApplication {
    foreground: AtomicBool,
    system_conditions_available: AtomicBool,
}

impl Default for FakeApplication {
    fn default() -> Self {
        FakeApplication {
            foreground: AtomicBool::new(true),
            system_conditions_available: AtomicBool::new(true),
        }
    }
}

impl FakeApplication {
    pub(crate) fn set_foreground(&self, foreground: bool) {
        self.foreground.store(foreground, Ordering::SeqCst);
    }

    pub(crate) fn set_system_conditions_available(&self, available: bool) {
        self.system_conditions_available
            .store(available, Ordering::SeqCst);
    }
}

#[async_trait]
impl ApplicationService for FakeApplication {
    fn is_in_foreground(&self) -> bool {
        self.foreground.load(Ordering::SeqCst)
    }

    async fn wait_until_system_conditions_available(&self) -> bool {
        self.system_conditions_available.load(Ordering::SeqCst)
    }
}

/// Prompt handler accepting every prompt.
#[derive(Default)]
pub(crate) struct FakePromptHandler(Mutex<Vec<InAppMessagePromptKind>>);

impl FakePromptHandler {
    pub(crate) fn shown(&self) -> Vec<InAppMessagePromptKind> {
        self.0.lock().unwrap().clone()
    }
}

#[async_trait]
impl PromptHandler for FakePromptHandler {
    async fn handle_prompt(&self, prompt: InAppMessagePromptKind) -> PromptResult {
        self.0.lock().unwrap().push(prompt);
        PromptResult::Accepted
    }
}

/// Lifecycle listener recording events as `"<event> <message id>"`.
#[derive(Default)]
pub(crate) struct RecordingLifecycleListener(Mutex<Vec<String>>);

impl RecordingLifecycleListener {
    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn record(&self, event: &str, message: &InAppMessage) {
        self.0
            .lock()
            .unwrap()
            .push(format!("{event} {}", message.message_id));
    }
}

impl InAppMessageLifecycleListener for RecordingLifecycleListener {
    fn on_will_display(&self, message: &InAppMessage) {
        self.record("will_display", message);
    }
    fn on_did_display(&self, message: &InAppMessage) {
        self.record("did_display", message);
    }
    fn on_will_dismiss(&self, message: &InAppMessage) {
        self.record("will_dismiss", message);
    }
    fn on_did_dismiss(&self, message: &InAppMessage) {
        self.record("did_dismiss", message);
    }
}

/// Operation queue recording operations. Waits resolve with the pushed results, then `true`.
#[derive(Default)]
pub(crate) struct FakeOperationQueue {
    operations: Mutex<Vec<Operation>>,
    wait_results: Mutex<VecDeque<bool>>,
}

impl FakeOperationQueue {
    pub(crate) fn operations(&self) -> Vec<Operation> {
        self.operations.lock().unwrap().clone()
    }

    pub(crate) fn push_wait_result(&self, result: bool) {
        self.wait_results.lock().unwrap().push_back(result);
    }
}

#[async_trait]
impl OperationQueue for FakeOperationQueue {
    fn enqueue(&self, operation: Operation, _flush: bool) {
        self.operations.lock().unwrap().push(operation);
    }

    async fn enqueue_and_wait(&self, operation: Operation, _flush: bool) -> Result<bool> {
        self.operations.lock().unwrap().push(operation);
        Ok(self.wait_results.lock().unwrap().pop_front().unwrap_or(true))
    }
}

/// Executor recording executed operations. Results are taken from the pushed ones, then
/// `Success`.
#[derive(Default)]
pub(crate) struct FakeExecutor {
    executed: Mutex<Vec<Operation>>,
    results: Mutex<VecDeque<ExecutionResult>>,
}

impl FakeExecutor {
    pub(crate) fn push_results(&self, results: impl IntoIterator<Item = ExecutionResult>) {
        self.results.lock().unwrap().extend(results);
    }

    /// User ids of the executed operations, in execution order.
    pub(crate) fn executed_ids(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|op| op.onesignal_id().to_owned())
            .collect()
    }
}

#[async_trait]
impl OperationExecutor for FakeExecutor {
    async fn execute(&self, operation: &Operation) -> ExecutionResult {
        self.executed.lock().unwrap().push(operation.clone());
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExecutionResult::Success)
    }
}

/// All stores and fakes of a client, wired together.
///
/// The current user is `"user"` with the push subscription `"sub"` (app `"app"`).
pub(crate) struct TestEnv {
    pub clock: Arc<ManualClock>,
    pub session: Arc<SessionService>,
    pub state: Arc<InAppState>,
    pub trigger_store: Arc<TriggerStore>,
    pub trigger_controller: Arc<TriggerController>,
    pub config: Arc<ConfigModelStore>,
    pub identity: Arc<IdentityModelStore>,
    pub properties: Arc<PropertiesModelStore>,
    pub subscriptions: Arc<SubscriptionModelStore>,
    pub preferences: Arc<InMemoryPreferences>,
    pub consistency: Arc<ConsistencyManager>,
    pub backend: Arc<FakeBackend>,
    pub display: Arc<FakeDisplayDriver>,
    pub application: Arc<FakeApplication>,
    pub repository: Arc<InMemoryInAppRepository>,
    pub prompts: Arc<FakePromptHandler>,
    pub operations: Arc<FakeOperationQueue>,
    runtime: Handle,
    // Only set when the test does not run inside a runtime.
    _owned_runtime: Option<Runtime>,
}

impl TestEnv {
    pub(crate) fn new() -> TestEnv {
        let _ = env_logger::builder().is_test(true).try_init();

        let (runtime, owned_runtime) = match Handle::try_current() {
            Ok(handle) => (handle, None),
            Err(_) => {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                (runtime.handle().clone(), Some(runtime))
            }
        };

        let clock = Arc::new(ManualClock::new());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let session = Arc::new(SessionService::new(dyn_clock.clone()));
        let state = Arc::new(InAppState::new());
        let trigger_store = Arc::new(TriggerStore::new());
        let trigger_controller = Arc::new(TriggerController::new(
            trigger_store.clone(),
            DynamicTriggerController::new(dyn_clock, session.clone(), state.clone(), runtime.clone()),
        ));

        let mut config = ConfigModel::new("app");
        config.push_subscription_id = Some("sub".to_owned());
        let subscriptions = Arc::new(SubscriptionModelStore::new());
        subscriptions.add(
            SubscriptionModel {
                id: "sub".to_owned(),
                subscription_type: SubscriptionType::Push,
                opted_in: true,
                address: "token".to_owned(),
                status: SubscriptionStatus::Subscribed,
                sdk: String::new(),
            },
            ModelChangeTag::NoPropagate,
        );

        TestEnv {
            clock,
            session,
            state,
            trigger_store,
            trigger_controller,
            config: Arc::new(ConfigModelStore::new(config)),
            identity: Arc::new(IdentityModelStore::new(IdentityModel {
                onesignal_id: "user".to_owned(),
                ..IdentityModel::default()
            })),
            properties: Arc::new(PropertiesModelStore::new(PropertiesModel {
                onesignal_id: "user".to_owned(),
                ..PropertiesModel::default()
            })),
            subscriptions,
            preferences: Arc::new(InMemoryPreferences::new()),
            consistency: Arc::new(ConsistencyManager::new()),
            backend: Arc::default(),
            display: Arc::default(),
            application: Arc::default(),
            repository: Arc::default(),
            prompts: Arc::default(),
            operations: Arc::default(),
            runtime,
            _owned_runtime: owned_runtime,
        }
    }

    /// Build and start an engine over this environment.
    pub(crate) fn engine(&self) -> Arc<InAppMessageEngine> {
        let engine = InAppMessageEngine::new(EngineDependencies {
            config: self.config.clone(),
            identity: self.identity.clone(),
            properties: self.properties.clone(),
            session: self.session.clone(),
            application: self.application.clone(),
            backend: self.backend.clone(),
            repository: self.repository.clone(),
            preferences: self.preferences.clone(),
            display: self.display.clone(),
            prompts: self.prompts.clone(),
            triggers: self.trigger_controller.clone(),
            consistency: self.consistency.clone(),
            clock: self.clock.clone(),
            state: self.state.clone(),
            runtime: self.runtime.clone(),
        });
        engine.start();
        engine
    }

    pub(crate) fn user_switcher(&self) -> UserSwitcher {
        UserSwitcher {
            config: self.config.clone(),
            identity: self.identity.clone(),
            properties: self.properties.clone(),
            subscriptions: self.subscriptions.clone(),
            preferences: self.preferences.clone(),
            operations: self.operations.clone(),
        }
    }

    pub(crate) fn user_manager(&self) -> UserManager {
        UserManager::new(
            self.config.clone(),
            self.identity.clone(),
            self.properties.clone(),
            self.subscriptions.clone(),
            self.preferences.clone(),
            self.operations.clone(),
        )
    }
}

/// Message `id` with the given trigger expression and no variants.
pub(crate) fn message_with_triggers(id: &str, triggers: Vec<Vec<Trigger>>) -> InAppMessage {
    let mut message = InAppMessage::new(id);
    message.triggers = triggers;
    message
}

/// Trigger with a unique id.
pub(crate) fn trigger(
    property: &str,
    kind: TriggerKind,
    operator: TriggerOperator,
    value: Option<TriggerValue>,
) -> Trigger {
    static NEXT_ID: AtomicUsize = AtomicUsize::new(0);
    Trigger {
        trigger_id: format!("trigger-{}", NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        kind,
        property: property.to_owned(),
        operator,
        value,
    }
}
