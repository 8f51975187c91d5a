use std::sync::Arc;

use crate::{
    models::{
        ConfigModelStore, IdentityModel, IdentityModelStore, ModelChangeTag, PropertiesModel,
        PropertiesModelStore, SubscriptionModel, SubscriptionModelStore, SubscriptionStatus,
        SubscriptionType,
    },
    preferences::{Preferences, PREFS_LEGACY_PLAYER_ID, PREFS_LEGACY_USER_SYNCVALUES},
};

use super::{create_local_id, legacy, Operation, OperationQueue};

/// Version recorded on subscriptions created by this SDK.
pub(crate) const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Swaps the current identity, properties and subscriptions for a new user.
pub(crate) struct UserSwitcher {
    pub(crate) config: Arc<ConfigModelStore>,
    pub(crate) identity: Arc<IdentityModelStore>,
    pub(crate) properties: Arc<PropertiesModelStore>,
    pub(crate) subscriptions: Arc<SubscriptionModelStore>,
    pub(crate) preferences: Arc<dyn Preferences>,
    pub(crate) operations: Arc<dyn OperationQueue>,
}

impl UserSwitcher {
    /// Make a new local user current.
    ///
    /// The push subscription of the previous user is carried over. If it already exists, it
    /// keeps its id and is transferred to the new user on the backend (unless
    /// `suppress_backend_operation`); otherwise a new local push subscription is created.
    /// `modify` can adjust the new identity and properties before they are published.
    pub(crate) fn create_and_switch_to_new_user(
        &self,
        suppress_backend_operation: bool,
        modify: impl FnOnce(&mut IdentityModel, &mut PropertiesModel),
    ) {
        let onesignal_id = create_local_id();
        let mut identity = IdentityModel {
            onesignal_id: onesignal_id.clone(),
            ..IdentityModel::default()
        };
        let mut properties = PropertiesModel {
            onesignal_id: onesignal_id.clone(),
            ..PropertiesModel::default()
        };
        modify(&mut identity, &mut properties);

        let config = self.config.model();
        let app_id = config.app_id;
        let current_push = config
            .push_subscription_id
            .as_deref()
            .and_then(|id| self.subscriptions.get(id));

        let new_push = match &current_push {
            Some(current) => SubscriptionModel {
                sdk: SDK_VERSION.to_owned(),
                ..current.clone()
            },
            None => SubscriptionModel {
                id: create_local_id(),
                subscription_type: SubscriptionType::Push,
                opted_in: true,
                address: String::new(),
                status: SubscriptionStatus::NoPermission,
                sdk: SDK_VERSION.to_owned(),
            },
        };
        let new_push_id = new_push.id.clone();

        log::debug!(target: "onesignal",
                    onesignal_id:display = onesignal_id,
                    push_subscription_id:display = new_push_id,
                    transfer = current_push.is_some();
                    "switching to new user");

        self.config.update(ModelChangeTag::Normal, |c| {
            c.push_subscription_id = Some(new_push_id)
        });

        // Subscriptions are removed before the identity changes so that no subscription is ever
        // observed as belonging to both users.
        self.subscriptions.clear(ModelChangeTag::NoPropagate);
        self.identity.replace(identity, ModelChangeTag::Normal);
        self.properties.replace(properties, ModelChangeTag::Normal);

        match current_push {
            _ if suppress_backend_operation => {
                self.subscriptions
                    .replace_all(vec![new_push], ModelChangeTag::NoPropagate);
            }
            Some(current) => {
                self.operations.enqueue(
                    Operation::TransferSubscription {
                        app_id,
                        from_subscription_id: current.id,
                        to_onesignal_id: onesignal_id,
                    },
                    false,
                );
                self.subscriptions
                    .replace_all(vec![new_push], ModelChangeTag::NoPropagate);
            }
            None => {
                self.subscriptions
                    .replace_all(vec![new_push], ModelChangeTag::Normal);
            }
        }
    }

    /// Create the first user of this device, migrating the 4.x player if there is one.
    pub(crate) fn create_initial_user(&self) {
        let app_id = self.config.with_model(|c| c.app_id.clone());

        let Some(player_id) = self.preferences.get_string(PREFS_LEGACY_PLAYER_ID) else {
            log::debug!(target: "onesignal", "creating new device-scoped user");
            self.create_and_switch_to_new_user(false, |_, _| {});
            let onesignal_id = self.identity.with_model(|i| i.onesignal_id.clone());
            self.operations.enqueue(
                Operation::LoginUser {
                    app_id,
                    onesignal_id,
                    external_id: None,
                    existing_onesignal_id: None,
                },
                false,
            );
            return;
        };

        log::info!(target: "onesignal", player_id:display = player_id; "migrating legacy player");

        let sync_values = self.preferences.get_string(PREFS_LEGACY_USER_SYNCVALUES);
        if let Some(push) = sync_values.as_deref().and_then(|values| {
            legacy::push_subscription_from_sync_values(&player_id, values, SDK_VERSION)
        }) {
            self.config.update(ModelChangeTag::Normal, |c| {
                c.push_subscription_id = Some(player_id.clone())
            });
            // The backend already knows this subscription.
            self.subscriptions.add(push, ModelChangeTag::NoPropagate);
        }

        self.create_and_switch_to_new_user(true, |_, _| {});
        let onesignal_id = self.identity.with_model(|i| i.onesignal_id.clone());
        self.operations.enqueue(
            Operation::LoginUserFromSubscription {
                app_id,
                onesignal_id,
                legacy_subscription_id: player_id,
            },
            true,
        );

        // Cleared after enqueueing: an interrupted migration is attempted again on next launch.
        self.preferences.save_string(PREFS_LEGACY_PLAYER_ID, None);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        models::{ModelChangeTag, SubscriptionModel, SubscriptionStatus, SubscriptionType},
        preferences::{Preferences, PREFS_LEGACY_PLAYER_ID, PREFS_LEGACY_USER_SYNCVALUES},
        testing::TestEnv,
        user::{is_local_id, Operation},
    };

    #[test]
    fn new_user_gets_local_push_subscription() {
        let env = TestEnv::new();
        env.subscriptions.clear(ModelChangeTag::NoPropagate);
        let switcher = env.user_switcher();

        switcher.create_and_switch_to_new_user(false, |identity, _| {
            identity.external_id = Some("alice".to_owned())
        });

        let identity = env.identity.model();
        assert!(is_local_id(&identity.onesignal_id));
        assert_eq!(identity.external_id.as_deref(), Some("alice"));
        assert_eq!(env.properties.model().onesignal_id, identity.onesignal_id);

        let subscriptions = env.subscriptions.list();
        assert_eq!(subscriptions.len(), 1);
        assert!(is_local_id(&subscriptions[0].id));
        assert!(subscriptions[0].opted_in);
        assert_eq!(
            env.config.model().push_subscription_id.as_deref(),
            Some(subscriptions[0].id.as_str())
        );
        assert!(env.operations.operations().is_empty());
    }

    #[test]
    fn existing_push_subscription_is_transferred() {
        let env = TestEnv::new();
        let switcher = env.user_switcher();

        switcher.create_and_switch_to_new_user(false, |_, _| {});

        let onesignal_id = env.identity.model().onesignal_id;
        let subscriptions = env.subscriptions.list();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].id, "sub");
        assert_eq!(subscriptions[0].address, "token");
        assert_eq!(
            env.operations.operations(),
            vec![Operation::TransferSubscription {
                app_id: "app".to_owned(),
                from_subscription_id: "sub".to_owned(),
                to_onesignal_id: onesignal_id,
            }]
        );
    }

    #[test]
    fn suppressed_switch_enqueues_nothing() {
        let env = TestEnv::new();
        let switcher = env.user_switcher();

        switcher.create_and_switch_to_new_user(true, |_, _| {});

        assert_eq!(env.subscriptions.list()[0].id, "sub");
        assert!(env.operations.operations().is_empty());
    }

    #[test]
    fn initial_user_without_legacy_player() {
        let env = TestEnv::new();
        let switcher = env.user_switcher();

        switcher.create_initial_user();

        let onesignal_id = env.identity.model().onesignal_id;
        assert!(is_local_id(&onesignal_id));
        let operations = env.operations.operations();
        assert_eq!(
            operations.last(),
            Some(&Operation::LoginUser {
                app_id: "app".to_owned(),
                onesignal_id,
                external_id: None,
                existing_onesignal_id: None,
            })
        );
    }

    #[test]
    fn legacy_player_is_migrated() {
        let env = TestEnv::new();
        env.config
            .update(ModelChangeTag::NoPropagate, |c| c.push_subscription_id = None);
        env.subscriptions.clear(ModelChangeTag::NoPropagate);
        env.preferences
            .save_string(PREFS_LEGACY_PLAYER_ID, Some("player".to_owned()));
        env.preferences.save_string(
            PREFS_LEGACY_USER_SYNCVALUES,
            Some(r#"{"notification_types":1,"identifier":"tok"}"#.to_owned()),
        );
        let switcher = env.user_switcher();

        switcher.create_initial_user();

        let onesignal_id = env.identity.model().onesignal_id;
        assert_eq!(
            env.subscriptions.list(),
            vec![SubscriptionModel {
                id: "player".to_owned(),
                subscription_type: SubscriptionType::Push,
                opted_in: true,
                address: "tok".to_owned(),
                status: SubscriptionStatus::Subscribed,
                sdk: super::SDK_VERSION.to_owned(),
            }]
        );
        assert_eq!(
            env.config.model().push_subscription_id.as_deref(),
            Some("player")
        );
        assert_eq!(
            env.operations.operations(),
            vec![Operation::LoginUserFromSubscription {
                app_id: "app".to_owned(),
                onesignal_id,
                legacy_subscription_id: "player".to_owned(),
            }]
        );
        assert_eq!(env.preferences.get_string(PREFS_LEGACY_PLAYER_ID), None);
    }
}
