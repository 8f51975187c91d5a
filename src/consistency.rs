//! Read-your-write consistency tracking.
//!
//! Backend writes (user updates, subscription updates) answer with an opaque RYW token. Reads that
//! must reflect those writes (fetching in-app messages) wait until the tokens they depend on are
//! known and send the token along, so the backend can delay the read until the write is visible.
use std::{cmp::Ordering, collections::HashMap, time::Duration};

use tokio::sync::{oneshot, Mutex};

/// Token proving that a prior write is visible, plus an optional delay the backend asked the
/// client to wait before reading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RywData {
    /// Token of the write, compared against the backend's replica state.
    pub ryw_token: Option<String>,
    /// Time to wait before reading.
    pub ryw_delay: Option<Duration>,
}

/// Kind of write a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsistencyKey {
    /// User property/identity update.
    User,
    /// Push subscription update.
    Subscription,
}

/// Tokens per user id.
pub type IndexedTokens = HashMap<String, HashMap<ConsistencyKey, RywData>>;

/// A condition on the collected tokens.
pub trait Condition: Send + Sync {
    /// Identifies the kind of condition, see [`ConsistencyManager::resolve_conditions_with_id`].
    fn id(&self) -> &'static str;

    /// Returns `true` once the condition can be resolved.
    fn is_met(&self, tokens: &IndexedTokens) -> bool;

    /// Token data to resolve the condition with.
    fn ryw_data(&self, tokens: &IndexedTokens) -> Option<RywData>;
}

/// Satisfied once a user update token exists for the user. The session count is updated on every
/// new session, so a user token is always expected; a subscription update is not, so the
/// subscription token is only used when present.
pub struct IamFetchReadyCondition {
    onesignal_id: String,
}

impl IamFetchReadyCondition {
    /// Condition kind, shared by all instances.
    pub const ID: &'static str = "IamFetchReadyCondition";

    /// Condition for the user `onesignal_id`.
    pub fn new(onesignal_id: impl Into<String>) -> Self {
        IamFetchReadyCondition {
            onesignal_id: onesignal_id.into(),
        }
    }
}

impl Condition for IamFetchReadyCondition {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn is_met(&self, tokens: &IndexedTokens) -> bool {
        tokens
            .get(&self.onesignal_id)
            .is_some_and(|t| t.contains_key(&ConsistencyKey::User))
    }

    fn ryw_data(&self, tokens: &IndexedTokens) -> Option<RywData> {
        let tokens = tokens.get(&self.onesignal_id)?;
        [ConsistencyKey::User, ConsistencyKey::Subscription]
            .iter()
            .filter_map(|key| tokens.get(key))
            .max_by(|a, b| compare_tokens(a.ryw_token.as_deref(), b.ryw_token.as_deref()))
            .cloned()
    }
}

/// Tokens are decimal sequence numbers of arbitrary length; anything else compares as text.
fn compare_tokens(a: Option<&str>, b: Option<&str>) -> Ordering {
    let is_numeric = |t: &str| !t.is_empty() && t.bytes().all(|c| c.is_ascii_digit());
    match (a, b) {
        (Some(a), Some(b)) if is_numeric(a) && is_numeric(b) => {
            let (a, b) = (a.trim_start_matches('0'), b.trim_start_matches('0'));
            a.len().cmp(&b.len()).then_with(|| a.cmp(b))
        }
        _ => a.cmp(&b),
    }
}

struct Waiter {
    condition: Box<dyn Condition>,
    sender: oneshot::Sender<Option<RywData>>,
}

#[derive(Default)]
struct Inner {
    tokens: IndexedTokens,
    waiters: Vec<Waiter>,
}

impl Inner {
    fn complete_met_conditions(&mut self) {
        let waiters = std::mem::take(&mut self.waiters);
        for waiter in waiters {
            if waiter.condition.is_met(&self.tokens) {
                let data = waiter.condition.ryw_data(&self.tokens);
                // Receiver dropped means nobody is waiting anymore.
                let _ = waiter.sender.send(data);
            } else {
                self.waiters.push(waiter);
            }
        }
    }
}

/// Collects RYW tokens per user id and resolves conditions waiting on them.
#[derive(Default)]
pub struct ConsistencyManager {
    inner: Mutex<Inner>,
}

impl ConsistencyManager {
    #[allow(missing_docs)]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the token of a completed write and resolve any condition it satisfies.
    pub async fn set_ryw_data(&self, id: &str, key: ConsistencyKey, data: RywData) {
        let mut inner = self.inner.lock().await;
        inner
            .tokens
            .entry(id.to_owned())
            .or_default()
            .insert(key, data);
        inner.complete_met_conditions();
    }

    /// Register `condition` and return a receiver resolved as soon as it is met. The receiver
    /// yields `None` if the condition gets resolved without data.
    pub async fn get_ryw_data_from_awaitable_condition(
        &self,
        condition: impl Condition + 'static,
    ) -> oneshot::Receiver<Option<RywData>> {
        let (sender, receiver) = oneshot::channel();
        let mut inner = self.inner.lock().await;
        inner.waiters.push(Waiter {
            condition: Box::new(condition),
            sender,
        });
        inner.complete_met_conditions();
        receiver
    }

    /// Resolve every pending condition of kind `id` with `None`. Used when the write a condition
    /// waits for has failed and will never produce a token.
    pub async fn resolve_conditions_with_id(&self, id: &str) {
        let mut inner = self.inner.lock().await;
        let waiters = std::mem::take(&mut inner.waiters);
        for waiter in waiters {
            if waiter.condition.id() == id {
                let _ = waiter.sender.send(None);
            } else {
                inner.waiters.push(waiter);
            }
        }
    }
}
