//! Platform-independent core of the OneSignal SDK: the current user and its identity
//! transitions, and in-app messages.
//!
//! # Overview
//!
//! The SDK core revolves around a [`Client`], created from a [`ClientConfig`]. The platform layer
//! provides the pieces that depend on the host: a [`DisplayDriver`](iam::DisplayDriver) rendering
//! in-app messages, an [`ApplicationService`](application::ApplicationService) reporting the app
//! state, and an [`OperationExecutor`](user::OperationExecutor) performing user operations
//! against the backend.
//!
//! In-app messages are fetched for the current push subscription, shown when their
//! [triggers](triggers) are satisfied, and their impressions and clicks are reported once.
//! User changes ([`Client::login`], [`Client::logout`]) are applied locally right away and
//! synchronized with the backend through an ordered [operation queue](user::OperationQueue).
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum. Most SDK work happens in the background and
//! is logged rather than returned; errors returned to the caller usually indicate that
//! developer's attention is needed.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages,
//! under the `onesignal` target. Consider integrating a `log`-compatible logger implementation
//! for better visibility into SDK operations.
//!
//! # Async runtime
//!
//! Background work (fetching, display, the operation queue worker, trigger timers) runs on a
//! [tokio](https://tokio.rs) runtime: either the one [`ClientConfig::to_client`] is called from
//! or the one passed to [`ClientConfig::runtime`].

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

pub mod application;
pub mod clock;
pub mod consistency;
pub mod iam;
pub mod models;
pub mod preferences;
pub mod session;
pub mod triggers;
pub mod user;

mod client;
mod config;
mod error;
mod events;

#[cfg(test)]
mod testing;

pub use client::Client;
pub use config::ClientConfig;
pub use error::{Error, Result};
