//! Models describing the current application configuration and the current user. Each model is
//! held by a store that can only swap or update it atomically.
mod config;
mod identity;
mod properties;
mod store;
mod subscription;

pub use config::ConfigModel;
pub use identity::IdentityModel;
pub use properties::PropertiesModel;
pub use store::{
    ModelChangeTag, SingletonModelStore, SingletonModelStoreHandler, SubscriptionModelStore,
    SubscriptionModelStoreHandler,
};
pub use subscription::{SubscriptionModel, SubscriptionStatus, SubscriptionType};

/// Store of the SDK configuration.
pub type ConfigModelStore = SingletonModelStore<ConfigModel>;
/// Store of the current user's identity.
pub type IdentityModelStore = SingletonModelStore<IdentityModel>;
/// Store of the current user's properties.
pub type PropertiesModelStore = SingletonModelStore<PropertiesModel>;
