//! In-app messages: fetching, eligibility, the display queue and event reporting.
//!
//! The [`InAppMessageEngine`] is the core of this module. It fetches the message list of the
//! current push subscription from an [`InAppBackend`], evaluates each message's triggers and
//! redisplay configuration, queues eligible messages and hands them one at a time to the
//! [`DisplayDriver`]. Impressions, page views and clicks are reported at most once each.
mod backend;
mod display;
mod engine;
mod fetch;
mod http_backend;
mod lifecycle;
mod models;
mod queue;
mod reporting;
mod repository;
mod state;

pub use backend::{InAppBackend, SessionDurationProvider};
pub use display::{DisplayDriver, NoopPromptHandler, PromptHandler, PromptResult};
pub use engine::InAppMessageEngine;
pub(crate) use engine::EngineDependencies;
pub use http_backend::{HttpBackendConfig, HttpInAppBackend, DEFAULT_BASE_URL};
pub use lifecycle::{InAppMessageClickListener, InAppMessageLifecycleListener};
pub use models::{
    InAppMessage, InAppMessageClickResult, InAppMessageListResponse, InAppMessagePage,
    InAppMessagePromptKind, InAppMessageTagAction, RedisplayStats, TryParse,
};
pub use repository::{
    InAppMessageRecord, InAppRepository, InMemoryInAppRepository, MESSAGE_CACHE_RETENTION_DAYS,
};
pub(crate) use state::InAppState;
