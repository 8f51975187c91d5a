use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use tokio::runtime::Handle;

use crate::{
    application::ApplicationService,
    clock::{Clock, Timestamp},
    consistency::ConsistencyManager,
    events::EventProducer,
    models::{
        ConfigModel, ConfigModelStore, IdentityModel, IdentityModelStore, ModelChangeTag,
        PropertiesModelStore, SingletonModelStoreHandler,
    },
    preferences::{
        Preferences, PREFS_OS_CLICKED_CLICK_IDS_IAMS, PREFS_OS_DISMISSED_IAMS,
        PREFS_OS_IMPRESSIONED_IAMS, PREFS_OS_LAST_TIME_IAM_DISMISSED,
        PREFS_OS_PAGE_IMPRESSIONED_IAMS,
    },
    session::{SessionLifecycleHandler, SessionService},
    triggers::{TriggerController, TriggerHandler},
    user::is_local_id,
};

use super::{
    DisplayDriver, InAppBackend, InAppMessage, InAppMessageClickListener,
    InAppMessageLifecycleListener, InAppMessagePromptKind, InAppMessageRecord, InAppRepository,
    InAppState, PromptHandler,
};

/// Collaborators of the [`InAppMessageEngine`].
pub(crate) struct EngineDependencies {
    pub config: Arc<ConfigModelStore>,
    pub identity: Arc<IdentityModelStore>,
    pub properties: Arc<PropertiesModelStore>,
    pub session: Arc<SessionService>,
    pub application: Arc<dyn ApplicationService>,
    pub backend: Arc<dyn InAppBackend>,
    pub repository: Arc<dyn InAppRepository>,
    pub preferences: Arc<dyn Preferences>,
    pub display: Arc<dyn DisplayDriver>,
    pub prompts: Arc<dyn PromptHandler>,
    pub triggers: Arc<TriggerController>,
    pub consistency: Arc<ConsistencyManager>,
    pub clock: Arc<dyn Clock>,
    pub state: Arc<InAppState>,
    pub runtime: Handle,
}

/// Engine-owned message state. Every read and write goes through [`InAppMessageEngine::lock`].
#[derive(Default)]
pub(super) struct EngineState {
    /// Messages from the last successful fetch.
    pub(super) messages: Vec<InAppMessage>,
    /// Display history of messages that were displayed at least once.
    pub(super) redisplayed: HashMap<String, InAppMessageRecord>,
    pub(super) dismissed: HashSet<String>,
    pub(super) impressioned: HashSet<String>,
    /// Message-prefixed page ids.
    pub(super) viewed_page_ids: HashSet<String>,
    pub(super) clicked_click_ids: HashSet<String>,
    /// Custom trigger keys changed before the first fetch of this run completed.
    pub(super) early_session_triggers: HashSet<String>,
    pub(super) has_completed_first_fetch: bool,
    /// Prompts already shown, per message.
    pub(super) prompted: HashMap<String, HashSet<InAppMessagePromptKind>>,
}

/// Orchestrates fetching, evaluating, queuing, displaying and reporting in-app messages.
///
/// The engine reacts to session starts, trigger changes and identity/subscription changes, and
/// to the callbacks the [`DisplayDriver`] reports while a message is on screen.
pub struct InAppMessageEngine {
    pub(super) config: Arc<ConfigModelStore>,
    pub(super) identity: Arc<IdentityModelStore>,
    pub(super) properties: Arc<PropertiesModelStore>,
    pub(super) session: Arc<SessionService>,
    pub(super) application: Arc<dyn ApplicationService>,
    pub(super) backend: Arc<dyn InAppBackend>,
    pub(super) repository: Arc<dyn InAppRepository>,
    pub(super) preferences: Arc<dyn Preferences>,
    pub(super) display: Arc<dyn DisplayDriver>,
    pub(super) prompts: Arc<dyn PromptHandler>,
    pub(super) triggers: Arc<TriggerController>,
    pub(super) consistency: Arc<ConsistencyManager>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) state: Arc<InAppState>,
    runtime: Handle,
    inner: Mutex<EngineState>,
    /// Time of the last successful fetch, or of the fetch in flight. Checked and updated
    /// atomically.
    pub(super) last_fetch: tokio::sync::Mutex<Option<Timestamp>>,
    pub(super) lifecycle_listeners: EventProducer<dyn InAppMessageLifecycleListener>,
    pub(super) click_listeners: EventProducer<dyn InAppMessageClickListener>,
    this: Weak<InAppMessageEngine>,
}

impl InAppMessageEngine {
    /// Create the engine and restore the persisted dedup sets. Call [`start`](Self::start) to
    /// subscribe it to its event sources.
    pub(crate) fn new(deps: EngineDependencies) -> Arc<InAppMessageEngine> {
        let load = |key| deps.preferences.get_string_set(key).unwrap_or_default();
        let state = EngineState {
            dismissed: load(PREFS_OS_DISMISSED_IAMS),
            impressioned: load(PREFS_OS_IMPRESSIONED_IAMS),
            viewed_page_ids: load(PREFS_OS_PAGE_IMPRESSIONED_IAMS),
            clicked_click_ids: load(PREFS_OS_CLICKED_CLICK_IDS_IAMS),
            ..EngineState::default()
        };
        if let Some(millis) = deps.preferences.get_i64(PREFS_OS_LAST_TIME_IAM_DISMISSED) {
            if let Some(time) = chrono::DateTime::from_timestamp_millis(millis) {
                deps.state.set_last_time_dismissed(time);
            }
        }

        Arc::new_cyclic(|this| InAppMessageEngine {
            config: deps.config,
            identity: deps.identity,
            properties: deps.properties,
            session: deps.session,
            application: deps.application,
            backend: deps.backend,
            repository: deps.repository,
            preferences: deps.preferences,
            display: deps.display,
            prompts: deps.prompts,
            triggers: deps.triggers,
            consistency: deps.consistency,
            clock: deps.clock,
            state: deps.state,
            runtime: deps.runtime,
            inner: Mutex::new(state),
            last_fetch: tokio::sync::Mutex::new(None),
            lifecycle_listeners: EventProducer::new(),
            click_listeners: EventProducer::new(),
            this: this.clone(),
        })
    }

    /// Subscribe to trigger, session and model events, and load the saved display history in the
    /// background.
    pub(crate) fn start(self: &Arc<Self>) {
        let trigger_handler: Arc<dyn TriggerHandler> = self.clone();
        self.triggers.subscribe(&trigger_handler);

        let session_handler: Arc<dyn SessionLifecycleHandler> = self.clone();
        self.session.subscribe(&session_handler);

        let config_handler: Arc<dyn SingletonModelStoreHandler<ConfigModel>> = self.clone();
        self.config.subscribe(&config_handler);

        let identity_handler: Arc<dyn SingletonModelStoreHandler<IdentityModel>> = self.clone();
        self.identity.subscribe(&identity_handler);

        self.spawn(|engine| async move { engine.load_redisplayed_messages().await });
    }

    /// Whether displaying messages is paused.
    pub fn paused(&self) -> bool {
        self.state.paused()
    }

    /// Pause or resume displaying messages. Queued messages stay queued while paused; resuming
    /// shows the head of the queue, or re-evaluates all messages if the queue is empty.
    pub fn set_paused(&self, paused: bool) {
        log::debug!(target: "onesignal", paused; "in-app messages paused changed");
        self.state.set_paused(paused);
        if !paused {
            self.spawn(|engine| async move { engine.show_next_or_evaluate().await });
        }
    }

    /// Register a lifecycle listener. The listener is held weakly: keep the `Arc` alive for as
    /// long as it should receive events.
    pub fn add_lifecycle_listener(&self, listener: &Arc<dyn InAppMessageLifecycleListener>) {
        self.lifecycle_listeners.subscribe(listener);
    }

    /// Unregister a lifecycle listener.
    pub fn remove_lifecycle_listener(&self, listener: &Arc<dyn InAppMessageLifecycleListener>) {
        self.lifecycle_listeners.unsubscribe(listener);
    }

    /// Register a click listener. The listener is held weakly.
    pub fn add_click_listener(&self, listener: &Arc<dyn InAppMessageClickListener>) {
        self.click_listeners.subscribe(listener);
    }

    /// Unregister a click listener.
    pub fn remove_click_listener(&self, listener: &Arc<dyn InAppMessageClickListener>) {
        self.click_listeners.unsubscribe(listener);
    }

    /// Evaluate every fetched message and queue the ones that should be displayed.
    pub(crate) async fn evaluate_messages(&self) {
        // Trigger evaluation may call back into the engine, so it runs on a copy without
        // holding the lock.
        let candidates = self.lock().messages.clone();
        let now = self.clock.now();

        let mut to_queue = Vec::new();
        for candidate in candidates {
            if !self.triggers.evaluate_message_triggers(&candidate) {
                continue;
            }
            let only_dynamic = self.triggers.message_has_only_dynamic_triggers(&candidate);

            let mut inner = self.lock();
            let Some(index) = inner
                .messages
                .iter()
                .position(|m| m.message_id == candidate.message_id)
            else {
                // Replaced by a newer fetch.
                continue;
            };

            if inner.set_data_for_redisplay(index, only_dynamic, now) {
                self.persist_dedup_sets(&inner);
            }

            let message = &inner.messages[index];
            if !inner.dismissed.contains(&message.message_id) && !message.is_finished(now) {
                to_queue.push(message.clone());
            } else {
                log::trace!(target: "onesignal",
                            message_id:display = message.message_id;
                            "message is dismissed or finished, not queuing");
            }
        }

        for message in to_queue {
            self.queue_message_for_display(message).await;
        }
    }

    /// Load saved display history, dropping records too old to matter.
    pub(crate) async fn load_redisplayed_messages(&self) {
        if let Err(err) = self
            .repository
            .clean_cached_in_app_messages(self.clock.now())
            .await
        {
            log::warn!(target: "onesignal", "failed to clean cached in-app messages: {:?}", err);
        }

        match self.repository.list_in_app_messages().await {
            Ok(records) => {
                let mut inner = self.lock();
                for record in records {
                    // In-memory records are at least as fresh as saved ones.
                    inner
                        .redisplayed
                        .entry(record.message_id.clone())
                        .or_insert(record);
                }
            }
            Err(err) => {
                log::warn!(target: "onesignal", "failed to load in-app message display history: {:?}", err);
            }
        }
    }

    /// Flag redisplayable messages with a trigger in `keys` as changed.
    pub(super) fn mark_trigger_changed(&self, keys: &[&str]) {
        let mut inner = self.lock();
        let EngineState {
            messages,
            redisplayed,
            ..
        } = &mut *inner;
        for message in messages.iter_mut() {
            if !message.is_trigger_changed
                && redisplayed.contains_key(&message.message_id)
                && self.triggers.is_trigger_on_message(message, keys)
            {
                log::trace!(target: "onesignal", message_id:display = message.message_id; "trigger changed on displayed message");
                message.is_trigger_changed = true;
            }
        }
    }

    /// Apply `f` to the fetched message with `message_id`. Returns `None` if there is no such
    /// message (e.g. previews).
    pub(super) fn update_live_message<R>(
        &self,
        message_id: &str,
        f: impl FnOnce(&mut InAppMessage) -> R,
    ) -> Option<R> {
        self.lock()
            .messages
            .iter_mut()
            .find(|m| m.message_id == message_id)
            .map(f)
    }

    pub(super) fn persist_dedup_sets(&self, state: &EngineState) {
        self.preferences
            .save_string_set(PREFS_OS_DISMISSED_IAMS, Some(state.dismissed.clone()));
        self.preferences
            .save_string_set(PREFS_OS_IMPRESSIONED_IAMS, Some(state.impressioned.clone()));
        self.preferences.save_string_set(
            PREFS_OS_PAGE_IMPRESSIONED_IAMS,
            Some(state.viewed_page_ids.clone()),
        );
    }

    pub(super) fn spawn<F, Fut>(&self, f: F)
    where
        F: FnOnce(Arc<InAppMessageEngine>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if let Some(engine) = self.this.upgrade() {
            self.runtime.spawn(f(engine));
        }
    }

    pub(super) fn spawn_evaluation(&self) {
        self.spawn(|engine| async move { engine.evaluate_messages().await });
    }

    pub(super) fn spawn_fetch(&self) {
        self.spawn(|engine| async move { engine.fetch_messages_when_conditions_are_met().await });
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.inner
            .lock()
            .expect("thread holding in-app message state lock should not panic")
    }

    #[cfg(test)]
    pub(super) fn with_state<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        f(&mut *self.lock())
    }
}

impl EngineState {
    /// Carry the display history over to the freshly fetched message at `index` and make it
    /// displayable again if its redisplay conditions hold. Returns `true` if the dedup sets
    /// changed.
    fn set_data_for_redisplay(&mut self, index: usize, only_dynamic: bool, now: Timestamp) -> bool {
        let message = &mut self.messages[index];
        if !self.dismissed.contains(&message.message_id) {
            return false;
        }
        let Some(record) = self.redisplayed.get(&message.message_id) else {
            return false;
        };

        message
            .redisplay_stats
            .set_display_stats(record.last_display_time, record.display_quantity);
        message.is_displayed_in_session = record.displayed_in_session;
        message.set_click_ids(record.click_ids.clone());

        let never_displayed_in_session = !message.is_displayed_in_session;
        let trigger_has_changed = message.is_trigger_changed
            || (never_displayed_in_session && message.triggers.is_empty())
            || (never_displayed_in_session && only_dynamic);

        if !(trigger_has_changed
            && message.redisplay_stats.is_delay_time_satisfied(now)
            && message.redisplay_stats.should_display_again(now))
        {
            return false;
        }

        log::debug!(target: "onesignal",
                    message_id:display = message.message_id,
                    display_quantity = message.redisplay_stats.display_quantity;
                    "message eligible for redisplay");
        self.dismissed.remove(&message.message_id);
        self.impressioned.remove(&message.message_id);
        // Page impressions are scoped to one display of one message, so the whole set is
        // cleared whenever any message is redisplayed.
        self.viewed_page_ids.clear();
        message.clear_click_ids();
        true
    }
}

impl TriggerHandler for InAppMessageEngine {
    fn on_trigger_changed(&self, key: &str) {
        log::debug!(target: "onesignal", trigger_key = key; "trigger changed");
        self.mark_trigger_changed(&[key]);
        {
            let mut inner = self.lock();
            if !inner.has_completed_first_fetch {
                inner.early_session_triggers.insert(key.to_owned());
            }
        }
        self.spawn_evaluation();
    }

    fn on_trigger_completed(&self, trigger_id: &str) {
        self.mark_trigger_changed(&[trigger_id]);
    }

    fn on_trigger_condition_changed(&self, trigger_id: &str) {
        self.mark_trigger_changed(&[trigger_id]);
        self.spawn_evaluation();
    }
}

impl SessionLifecycleHandler for InAppMessageEngine {
    fn on_session_started(&self) {
        {
            let mut inner = self.lock();
            for record in inner.redisplayed.values_mut() {
                record.displayed_in_session = false;
            }
        }
        self.spawn_fetch();
    }
}

impl SingletonModelStoreHandler<ConfigModel> for InAppMessageEngine {
    fn on_model_replaced(&self, _model: &ConfigModel, tag: ModelChangeTag) {
        if tag == ModelChangeTag::Hydrate {
            self.spawn_fetch();
        }
    }

    fn on_model_updated(&self, old: &ConfigModel, new: &ConfigModel, _tag: ModelChangeTag) {
        if old.app_id != new.app_id || old.push_subscription_id != new.push_subscription_id {
            self.spawn_fetch();
        }
    }
}

impl SingletonModelStoreHandler<IdentityModel> for InAppMessageEngine {
    fn on_model_replaced(&self, model: &IdentityModel, tag: ModelChangeTag) {
        // A backend refresh may swap in the backend-assigned id wholesale.
        if tag == ModelChangeTag::Hydrate
            && model.has_onesignal_id()
            && !is_local_id(&model.onesignal_id)
        {
            self.spawn_fetch();
        }
    }

    fn on_model_updated(&self, old: &IdentityModel, new: &IdentityModel, _tag: ModelChangeTag) {
        // The user was created on the backend: messages can now be fetched for it.
        if is_local_id(&old.onesignal_id)
            && new.has_onesignal_id()
            && !is_local_id(&new.onesignal_id)
        {
            self.spawn_fetch();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::{
        consistency::{ConsistencyKey, RywData},
        iam::{InAppMessage, InAppMessageRecord},
        models::{IdentityModel, ModelChangeTag},
        preferences::{Preferences, PREFS_OS_PAGE_IMPRESSIONED_IAMS},
        testing::{message_with_triggers, trigger, TestEnv},
        triggers::{TriggerKind, TriggerOperator},
    };

    fn record(message_id: &str, display_quantity: u32) -> InAppMessageRecord {
        InAppMessageRecord {
            message_id: message_id.to_owned(),
            display_quantity,
            last_display_time: None,
            click_ids: Default::default(),
            displayed_in_session: false,
        }
    }

    fn redisplayable(message_id: &str, limit: u32) -> InAppMessage {
        let mut message = message_with_triggers(message_id, vec![]);
        message.redisplay_stats.redisplay_enabled = true;
        message.redisplay_stats.display_limit = Some(limit);
        message
    }

    #[tokio::test]
    async fn finished_message_is_never_queued() {
        let env = TestEnv::new();
        let engine = env.engine();
        let mut finished = message_with_triggers("finished", vec![]);
        finished.finished = true;
        engine.with_state(|s| s.messages = vec![finished]);

        engine.evaluate_messages().await;

        assert!(env.state.queued_ids().is_empty());
        assert!(env.display.displayed().is_empty());
    }

    #[tokio::test]
    async fn message_past_end_time_is_never_queued() {
        let env = TestEnv::new();
        let engine = env.engine();
        let mut message = message_with_triggers("ended", vec![]);
        message.end_time = Some(env.clock.now() - chrono::Duration::seconds(1));
        engine.with_state(|s| s.messages = vec![message]);

        engine.evaluate_messages().await;

        assert!(env.display.displayed().is_empty());
    }

    #[tokio::test]
    async fn unsatisfied_triggers_are_not_queued() {
        let env = TestEnv::new();
        let engine = env.engine();
        let message = message_with_triggers(
            "m",
            vec![vec![trigger("level", TriggerKind::Custom, TriggerOperator::Exists, None)]],
        );
        engine.with_state(|s| s.messages = vec![message]);

        engine.evaluate_messages().await;
        assert!(env.display.displayed().is_empty());

        env.trigger_store.add_trigger("level", 2.0);
        engine.evaluate_messages().await;
        assert_eq!(env.display.displayed(), vec!["m"]);
    }

    #[tokio::test]
    async fn dismissed_message_without_history_stays_dismissed() {
        let env = TestEnv::new();
        let engine = env.engine();
        engine.with_state(|s| {
            s.messages = vec![redisplayable("m", 5)];
            s.dismissed.insert("m".to_owned());
        });

        engine.evaluate_messages().await;

        assert!(env.display.displayed().is_empty());
    }

    #[tokio::test]
    async fn dismissed_message_is_redisplayed_below_limit() {
        let env = TestEnv::new();
        let engine = env.engine();
        engine.with_state(|s| {
            s.messages = vec![redisplayable("m", 3)];
            s.dismissed.insert("m".to_owned());
            s.impressioned.insert("m".to_owned());
            s.viewed_page_ids.insert("otherpage".to_owned());
            s.redisplayed.insert("m".to_owned(), record("m", 1));
        });

        engine.evaluate_messages().await;

        assert_eq!(env.display.displayed(), vec!["m"]);
        engine.with_state(|s| {
            assert!(!s.dismissed.contains("m"));
            assert!(!s.impressioned.contains("m"));
            assert!(s.viewed_page_ids.is_empty());
            assert_eq!(s.messages[0].redisplay_stats.display_quantity, 1);
        });
        assert_eq!(
            env.preferences.get_string_set(PREFS_OS_PAGE_IMPRESSIONED_IAMS),
            Some(Default::default())
        );
    }

    #[tokio::test]
    async fn dismissed_message_at_limit_is_not_redisplayed() {
        let env = TestEnv::new();
        let engine = env.engine();
        engine.with_state(|s| {
            s.messages = vec![redisplayable("m", 2)];
            s.dismissed.insert("m".to_owned());
            s.redisplayed.insert("m".to_owned(), record("m", 2));
        });

        engine.evaluate_messages().await;

        assert!(env.display.displayed().is_empty());
        engine.with_state(|s| assert!(s.dismissed.contains("m")));
    }

    #[tokio::test]
    async fn redisplay_waits_for_delay() {
        let env = TestEnv::new();
        let engine = env.engine();
        let mut message = redisplayable("m", 5);
        message.redisplay_stats.display_delay = Duration::from_secs(60);
        let last_display_time = env.clock.now();
        engine.with_state(|s| {
            s.messages = vec![message];
            s.dismissed.insert("m".to_owned());
            s.redisplayed.insert(
                "m".to_owned(),
                InAppMessageRecord {
                    last_display_time: Some(last_display_time),
                    ..record("m", 1)
                },
            );
        });

        engine.evaluate_messages().await;
        assert!(env.display.displayed().is_empty());

        env.clock.advance(chrono::Duration::seconds(60));
        engine.evaluate_messages().await;
        assert_eq!(env.display.displayed(), vec!["m"]);
    }

    #[tokio::test]
    async fn message_displayed_in_session_needs_trigger_change() {
        let env = TestEnv::new();
        let engine = env.engine();
        let mut message = redisplayable("m", 5);
        message.triggers = vec![vec![trigger(
            "level",
            TriggerKind::Custom,
            TriggerOperator::Exists,
            None,
        )]];
        env.trigger_store.add_trigger("level", 1.0);
        engine.with_state(|s| {
            s.messages = vec![message];
            s.dismissed.insert("m".to_owned());
            s.redisplayed.insert(
                "m".to_owned(),
                InAppMessageRecord {
                    displayed_in_session: true,
                    ..record("m", 1)
                },
            );
        });

        engine.evaluate_messages().await;
        assert!(env.display.displayed().is_empty());

        engine.mark_trigger_changed(&["level"]);
        engine.evaluate_messages().await;
        assert_eq!(env.display.displayed(), vec!["m"]);
    }

    #[tokio::test]
    async fn session_start_resets_displayed_in_session() {
        let env = TestEnv::new();
        let engine = env.engine();
        engine.with_state(|s| {
            s.redisplayed.insert(
                "m".to_owned(),
                InAppMessageRecord {
                    displayed_in_session: true,
                    ..record("m", 1)
                },
            );
        });

        env.session.start_session();

        engine.with_state(|s| assert!(!s.redisplayed["m"].displayed_in_session));
    }

    async fn ready_for(env: &TestEnv, onesignal_id: &str) {
        env.consistency
            .set_ryw_data(
                onesignal_id,
                ConsistencyKey::User,
                RywData {
                    ryw_token: Some("1".to_owned()),
                    ryw_delay: None,
                },
            )
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn hydrated_backend_identity_fetches_messages() {
        let env = TestEnv::new();
        ready_for(&env, "remote").await;
        let _engine = env.engine();

        env.identity.replace(
            IdentityModel {
                onesignal_id: "local-1".to_owned(),
                ..IdentityModel::default()
            },
            ModelChangeTag::NoPropagate,
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(env.backend.list_calls(), 0);

        env.identity.replace(
            IdentityModel {
                onesignal_id: "remote".to_owned(),
                ..IdentityModel::default()
            },
            ModelChangeTag::Hydrate,
        );
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(env.backend.list_calls(), 1);
    }

    #[tokio::test]
    async fn load_redisplayed_messages_reads_repository() {
        use crate::iam::InAppRepository;

        let env = TestEnv::new();
        env.repository
            .save_in_app_message(record("saved", 2))
            .await
            .unwrap();
        let engine = env.engine();

        engine.load_redisplayed_messages().await;

        engine.with_state(|s| assert_eq!(s.redisplayed["saved"].display_quantity, 2));
    }
}
