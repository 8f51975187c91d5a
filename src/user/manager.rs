use std::sync::{Arc, Mutex};

use crate::{
    models::{ConfigModelStore, IdentityModelStore, PropertiesModelStore, SubscriptionModelStore},
    preferences::Preferences,
    Error, Result,
};

use super::{switcher::UserSwitcher, Operation, OperationQueue};

/// Owns the identity transitions of the current user: initialization, login and logout.
///
/// Only one transition runs at a time. The local switch to the new user is applied
/// immediately; the backend is updated through the [`OperationQueue`].
pub struct UserManager {
    switcher: UserSwitcher,
    transition: Mutex<()>,
}

impl UserManager {
    pub(crate) fn new(
        config: Arc<ConfigModelStore>,
        identity: Arc<IdentityModelStore>,
        properties: Arc<PropertiesModelStore>,
        subscriptions: Arc<SubscriptionModelStore>,
        preferences: Arc<dyn Preferences>,
        operations: Arc<dyn OperationQueue>,
    ) -> UserManager {
        UserManager {
            switcher: UserSwitcher {
                config,
                identity,
                properties,
                subscriptions,
                preferences,
                operations,
            },
            transition: Mutex::new(()),
        }
    }

    /// Create the device's user if there is none yet, or unconditionally with
    /// `force_create_user`. A player left behind by the 4.x SDK is migrated instead of creating
    /// an unrelated user.
    pub fn init_user(&self, force_create_user: bool) {
        let _transition = self.lock();
        if force_create_user || !self.switcher.identity.with_model(|i| i.has_onesignal_id()) {
            self.switcher.create_initial_user();
        }
    }

    /// Switch to the user identified by `external_id`.
    ///
    /// Logging in with the current external id only refreshes the user. Otherwise a new local
    /// user is made current right away; an anonymous current user is converted into the new
    /// one on the backend. Completes once the backend login and the following refresh have
    /// been executed.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if [`UserManager::init_user`] was not called.
    /// - [`Error::LoginFailed`] if the backend rejected the login. The local switch stays
    ///   applied.
    /// - [`Error::RefreshFailed`] if the user could not be refreshed after the login.
    pub async fn login(&self, external_id: &str, jwt_token: Option<String>) -> Result<()> {
        let app_id = self.switcher.config.with_model(|c| c.app_id.clone());

        let login = {
            let _transition = self.lock();
            let current = self.switcher.identity.model();
            if !current.has_onesignal_id() {
                return Err(Error::NotInitialized);
            }

            if current.external_id.as_deref() == Some(external_id) {
                log::debug!(target: "onesignal", external_id; "already logged in, refreshing user");
                self.switcher.operations.enqueue(
                    Operation::RefreshUser {
                        app_id,
                        onesignal_id: current.onesignal_id,
                    },
                    true,
                );
                return Ok(());
            }

            self.switcher
                .create_and_switch_to_new_user(false, |identity, _| {
                    identity.external_id = Some(external_id.to_owned());
                    identity.jwt_token = jwt_token;
                });

            Operation::LoginUser {
                app_id: app_id.clone(),
                onesignal_id: self.onesignal_id(),
                external_id: Some(external_id.to_owned()),
                // Only an anonymous user can be converted into the identified one.
                existing_onesignal_id: current.is_anonymous().then_some(current.onesignal_id),
            }
        };

        if !self.switcher.operations.enqueue_and_wait(login, true).await? {
            log::error!(target: "onesignal", external_id; "could not login user");
            return Err(Error::LoginFailed {
                external_id: external_id.to_owned(),
            });
        }

        // The login may have translated the local id.
        let onesignal_id = self.onesignal_id();
        let refresh = Operation::RefreshUser {
            app_id,
            onesignal_id: onesignal_id.clone(),
        };
        if !self.switcher.operations.enqueue_and_wait(refresh, true).await? {
            log::error!(target: "onesignal", onesignal_id:display = onesignal_id; "could not refresh user after login");
            return Err(Error::RefreshFailed { onesignal_id });
        }

        Ok(())
    }

    /// Switch to a new anonymous user. Does nothing if the current user is already anonymous.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] if [`UserManager::init_user`] was not called.
    pub fn logout(&self) -> Result<()> {
        let _transition = self.lock();
        let current = self.switcher.identity.model();
        if !current.has_onesignal_id() {
            return Err(Error::NotInitialized);
        }
        if current.is_anonymous() {
            return Ok(());
        }

        self.switcher.create_and_switch_to_new_user(false, |_, _| {});
        self.switcher.operations.enqueue(
            Operation::LoginUser {
                app_id: self.switcher.config.with_model(|c| c.app_id.clone()),
                onesignal_id: self.onesignal_id(),
                external_id: None,
                existing_onesignal_id: None,
            },
            false,
        );
        Ok(())
    }

    /// Id of the current user. Empty before [`UserManager::init_user`].
    pub fn onesignal_id(&self) -> String {
        self.switcher.identity.with_model(|i| i.onesignal_id.clone())
    }

    /// External id of the current user, `None` if the user is anonymous.
    pub fn external_id(&self) -> Option<String> {
        self.switcher.identity.with_model(|i| i.external_id.clone())
    }

    /// Id of this device's push subscription.
    pub fn push_subscription_id(&self) -> Option<String> {
        self.switcher
            .config
            .with_model(|c| c.push_subscription_id.clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.transition
            .lock()
            .expect("thread holding user transition lock should not panic")
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        models::{IdentityModel, ModelChangeTag},
        testing::TestEnv,
        user::{is_local_id, Operation},
        Error,
    };

    #[tokio::test]
    async fn login_converts_anonymous_user() {
        let env = TestEnv::new();
        let manager = env.user_manager();

        manager.login("alice", None).await.unwrap();

        let onesignal_id = manager.onesignal_id();
        assert!(is_local_id(&onesignal_id));
        assert_eq!(manager.external_id().as_deref(), Some("alice"));
        let operations = env.operations.operations();
        assert_eq!(
            operations[1..],
            [
                Operation::LoginUser {
                    app_id: "app".to_owned(),
                    onesignal_id: onesignal_id.clone(),
                    external_id: Some("alice".to_owned()),
                    existing_onesignal_id: Some("user".to_owned()),
                },
                Operation::RefreshUser {
                    app_id: "app".to_owned(),
                    onesignal_id,
                },
            ]
        );
        assert!(matches!(
            operations[0],
            Operation::TransferSubscription { .. }
        ));
    }

    #[tokio::test]
    async fn login_from_identified_user_does_not_convert() {
        let env = TestEnv::new();
        env.identity.update(ModelChangeTag::NoPropagate, |i| {
            i.external_id = Some("bob".to_owned())
        });
        let manager = env.user_manager();

        manager.login("alice", None).await.unwrap();

        let login = env
            .operations
            .operations()
            .into_iter()
            .find(|op| matches!(op, Operation::LoginUser { .. }));
        assert!(matches!(
            login,
            Some(Operation::LoginUser {
                existing_onesignal_id: None,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn login_with_same_external_id_only_refreshes() {
        let env = TestEnv::new();
        env.identity.update(ModelChangeTag::NoPropagate, |i| {
            i.external_id = Some("alice".to_owned())
        });
        let manager = env.user_manager();

        manager.login("alice", None).await.unwrap();

        assert_eq!(manager.onesignal_id(), "user");
        assert_eq!(
            env.operations.operations(),
            vec![Operation::RefreshUser {
                app_id: "app".to_owned(),
                onesignal_id: "user".to_owned(),
            }]
        );
    }

    #[tokio::test]
    async fn failed_login_keeps_local_switch() {
        let env = TestEnv::new();
        env.operations.push_wait_result(false);
        let manager = env.user_manager();

        let result = manager.login("alice", Some("jwt".to_owned())).await;

        assert!(matches!(
            result,
            Err(Error::LoginFailed { external_id }) if external_id == "alice"
        ));
        assert_eq!(manager.external_id().as_deref(), Some("alice"));
        assert_eq!(env.identity.model().jwt_token.as_deref(), Some("jwt"));
        assert!(!env
            .operations
            .operations()
            .iter()
            .any(|op| matches!(op, Operation::RefreshUser { .. })));
    }

    #[tokio::test]
    async fn failed_refresh_after_login() {
        let env = TestEnv::new();
        env.operations.push_wait_result(true);
        env.operations.push_wait_result(false);
        let manager = env.user_manager();

        let result = manager.login("alice", None).await;

        assert!(matches!(result, Err(Error::RefreshFailed { .. })));
    }

    #[tokio::test]
    async fn login_before_init_fails() {
        let env = TestEnv::new();
        env.identity
            .replace(IdentityModel::default(), ModelChangeTag::NoPropagate);
        let manager = env.user_manager();

        assert!(matches!(
            manager.login("alice", None).await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(manager.logout(), Err(Error::NotInitialized)));
        assert!(env.operations.operations().is_empty());
    }

    #[test]
    fn logout_of_anonymous_user_does_nothing() {
        let env = TestEnv::new();
        let manager = env.user_manager();

        manager.logout().unwrap();

        assert_eq!(manager.onesignal_id(), "user");
        assert!(env.operations.operations().is_empty());
    }

    #[test]
    fn logout_switches_to_anonymous_user() {
        let env = TestEnv::new();
        env.identity.update(ModelChangeTag::NoPropagate, |i| {
            i.external_id = Some("alice".to_owned())
        });
        let manager = env.user_manager();

        manager.logout().unwrap();

        let onesignal_id = manager.onesignal_id();
        assert!(is_local_id(&onesignal_id));
        assert_eq!(manager.external_id(), None);
        assert_eq!(
            env.operations.operations().last(),
            Some(&Operation::LoginUser {
                app_id: "app".to_owned(),
                onesignal_id,
                external_id: None,
                existing_onesignal_id: None,
            })
        );
    }

    #[test]
    fn init_user_is_noop_for_existing_user() {
        let env = TestEnv::new();
        let manager = env.user_manager();

        manager.init_user(false);
        assert_eq!(manager.onesignal_id(), "user");

        manager.init_user(true);
        assert_ne!(manager.onesignal_id(), "user");
    }
}
