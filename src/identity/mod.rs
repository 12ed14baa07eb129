//! Identity provider boundary
//!
//! A provider signs users in and out and announces every change of the
//! active identity on a watch channel. Consumers hold an [`AuthSubscription`];
//! dropping it releases the subscription.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

pub mod local;

pub use local::LocalIdentityProvider;

/// Stable user identifier issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    /// Human-readable identifier shown as "signed in as"
    pub display: String,
}

/// What the user supplies to the interactive sign-in flow
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
}

impl Credentials {
    pub fn email(email: impl Into<String>) -> Self {
        Self { email: email.into() }
    }
}

/// Sign-in / sign-out failure
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("identity store error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("identity store poisoned")]
    Poisoned,
}

/// A change of the active identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
}

impl From<Option<Identity>> for AuthEvent {
    fn from(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => AuthEvent::SignedIn(identity),
            None => AuthEvent::SignedOut,
        }
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Run the sign-in flow and make the resulting identity active
    async fn sign_in(&self, credentials: &Credentials) -> Result<Identity, AuthError>;

    /// Clear the active identity
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Currently active identity, if any
    fn current(&self) -> Option<Identity>;

    /// Subscribe to identity changes
    fn subscribe(&self) -> AuthSubscription;
}

/// Broadcasts the active identity to subscribers
pub struct AuthChannel {
    tx: watch::Sender<Option<Identity>>,
}

impl AuthChannel {
    pub fn new(initial: Option<Identity>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replace the active identity and notify subscribers
    pub fn publish(&self, identity: Option<Identity>) {
        self.tx.send_replace(identity);
    }

    pub fn current(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    /// New subscription; the current value counts as already seen
    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription { rx: self.tx.subscribe() }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Scoped subscription to identity changes
pub struct AuthSubscription {
    rx: watch::Receiver<Option<Identity>>,
}

impl AuthSubscription {
    /// Identity at the time of the last observed change
    pub fn current(&self) -> Option<Identity> {
        self.rx.borrow().clone()
    }

    /// Pending change, if one arrived since the last call
    pub fn try_next(&mut self) -> Option<AuthEvent> {
        match self.rx.has_changed() {
            Ok(true) => Some(self.rx.borrow_and_update().clone().into()),
            _ => None,
        }
    }

    /// Wait for the next change. Returns `None` once the provider is gone.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(id: &str) -> Identity {
        Identity {
            user_id: UserId::new(id),
            display: format!("{}@example.com", id),
        }
    }

    #[test]
    fn test_subscription_sees_only_new_changes() {
        let channel = AuthChannel::new(Some(identity("a")));
        let mut sub = channel.subscribe();
        assert_eq!(sub.try_next(), None);
        assert_eq!(sub.current(), Some(identity("a")));

        channel.publish(None);
        assert_eq!(sub.try_next(), Some(AuthEvent::SignedOut));
        assert_eq!(sub.try_next(), None);
    }

    #[test]
    fn test_last_change_wins() {
        let channel = AuthChannel::new(None);
        let mut sub = channel.subscribe();

        channel.publish(Some(identity("a")));
        channel.publish(Some(identity("b")));
        assert_eq!(sub.try_next(), Some(AuthEvent::SignedIn(identity("b"))));
    }

    #[test]
    fn test_drop_releases_subscription() {
        let channel = AuthChannel::new(None);
        let sub = channel.subscribe();
        assert_eq!(channel.subscriber_count(), 1);
        drop(sub);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_next_waits_for_change() {
        let channel = AuthChannel::new(None);
        let mut sub = channel.subscribe();

        let waiter = tokio::spawn(async move { sub.next().await });
        channel.publish(Some(identity("a")));

        let event = waiter.await.unwrap();
        assert_eq!(event, Some(AuthEvent::SignedIn(identity("a"))));
    }
}
