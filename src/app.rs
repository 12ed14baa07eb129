//! Application controller
//!
//! Owns all application state: the active identity, the ledger and the
//! suggestion requestor. It subscribes to identity changes once, on
//! construction, and the subscription is released when the controller is
//! dropped. Every operation failure is caught here and kept as the notice
//! a UI shows; nothing propagates further.

use std::sync::Arc;
use tracing::{error, info};

use crate::error::Error;
use crate::identity::{AuthEvent, AuthSubscription, Credentials, Identity, IdentityProvider};
use crate::ledger::{Ledger, SessionMark, Subject};
use crate::store::DocumentStore;
use crate::suggest::{RecommendationService, SuggestionRequestor, SuggestionView};

pub struct App {
    identity: Arc<dyn IdentityProvider>,
    auth: AuthSubscription,
    ledger: Ledger,
    requestor: SuggestionRequestor,
    user: Option<Identity>,
    notice: Option<String>,
}

impl App {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        service: Arc<dyn RecommendationService>,
    ) -> Self {
        let auth = identity.subscribe();
        Self {
            identity,
            auth,
            ledger: Ledger::new(store),
            requestor: SuggestionRequestor::new(service),
            user: None,
            notice: None,
        }
    }

    /// Pick up whoever is signed in right now
    pub async fn start(&mut self) {
        let event = AuthEvent::from(self.auth.current());
        self.apply(event).await;
    }

    /// Apply identity changes announced since the last call.
    /// Returns true if anything changed.
    pub async fn sync_identity(&mut self) -> bool {
        let mut changed = false;
        while let Some(event) = self.auth.try_next() {
            self.apply(event).await;
            changed = true;
        }
        changed
    }

    async fn apply(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(identity) => {
                if let Some(e) = self.ledger.load(&identity.user_id).await.err() {
                    self.fail("Failed to load subjects", &e);
                }
                self.user = Some(identity);
            }
            AuthEvent::SignedOut => {
                self.ledger.clear();
                self.user = None;
            }
        }
    }

    fn fail(&mut self, context: &str, e: &Error) {
        let message = format!("{}: {}", context, e);
        error!("{}", message);
        self.notice = Some(message);
    }

    pub async fn sign_in(&mut self, credentials: &Credentials) -> Option<Identity> {
        self.notice = None;
        match self.identity.sign_in(credentials).await {
            Ok(identity) => {
                self.sync_identity().await;
                Some(identity)
            }
            Err(e) => {
                self.fail("Sign in failed", &Error::Auth(e));
                None
            }
        }
    }

    pub async fn sign_out(&mut self) {
        match self.identity.sign_out().await {
            Ok(()) => {
                self.sync_identity().await;
            }
            Err(e) => self.fail("Sign out failed", &Error::Auth(e)),
        }
    }

    pub fn user(&self) -> Option<&Identity> {
        self.user.as_ref()
    }

    pub fn signed_in_as(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.display.as_str())
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn subjects(&self) -> &[Subject] {
        self.ledger.subjects()
    }

    /// Last failure message, if any
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn suggestion_view(&self) -> SuggestionView {
        self.requestor.view()
    }

    pub async fn add_subject(&mut self, name: &str) -> Option<Subject> {
        match self.ledger.add(name).await {
            Ok(subject) => subject,
            Err(e) => {
                self.fail("Failed to add subject", &e);
                None
            }
        }
    }

    /// Mark a subject, found by id or name, present or absent
    pub async fn mark(&mut self, key: &str, mark: SessionMark) -> Option<Subject> {
        let id = match self.ledger.find(key) {
            Some(subject) => subject.id().clone(),
            None => {
                self.fail("Failed to update attendance", &Error::UnknownSubject(key.to_string()));
                return None;
            }
        };
        match self.ledger.mark(&id, mark).await {
            Ok(subject) => Some(subject),
            Err(e) => {
                self.fail("Failed to update attendance", &e);
                None
            }
        }
    }

    pub async fn remove_subject(&mut self, key: &str) -> Option<Subject> {
        let id = match self.ledger.find(key) {
            Some(subject) => subject.id().clone(),
            None => {
                self.fail("Failed to remove subject", &Error::UnknownSubject(key.to_string()));
                return None;
            }
        };
        match self.ledger.remove(&id).await {
            Ok(subject) => Some(subject),
            Err(e) => {
                self.fail("Failed to remove subject", &e);
                None
            }
        }
    }

    /// Ask for a suggestion and return the text to show.
    ///
    /// `None` when there is nothing to ask about; the reason is in the notice.
    pub async fn suggest(&mut self) -> Option<String> {
        self.notice = None;
        match self.requestor.request_suggestion(self.ledger.subjects()).await {
            Ok(outcome) => {
                info!("Suggestion request finished (success: {})", outcome.is_success());
                Some(outcome.text())
            }
            Err(e) => {
                self.fail("Cannot request a suggestion", &e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocalIdentityProvider;
    use crate::store::MemoryStore;
    use crate::suggest::{SuggestError, SuggestRequest, SuggestResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoService {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RecommendationService for EchoService {
        async fn suggest(&self, request: &SuggestRequest) -> Result<SuggestResponse, SuggestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SuggestResponse {
                suggestion: Some(format!("{} subjects", request.subjects.len())),
            })
        }
    }

    struct Fixture {
        app: App,
        identity: Arc<LocalIdentityProvider>,
        store: Arc<MemoryStore>,
        service: Arc<EchoService>,
    }

    fn fixture() -> Fixture {
        let identity = Arc::new(LocalIdentityProvider::open_in_memory().unwrap());
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(EchoService { calls: AtomicUsize::new(0) });
        let app = App::new(identity.clone(), store.clone(), service.clone());
        Fixture { app, identity, store, service }
    }

    #[tokio::test]
    async fn test_sign_in_loads_and_sign_out_clears() {
        let mut f = fixture();
        f.app.start().await;
        assert!(f.app.user().is_none());

        f.app.sign_in(&Credentials::email("ada@example.com")).await.unwrap();
        assert_eq!(f.app.signed_in_as(), Some("ada@example.com"));
        assert!(f.app.ledger().is_loaded());

        f.app.add_subject("Math").await.unwrap();
        assert_eq!(f.app.subjects().len(), 1);

        f.app.sign_out().await;
        assert!(f.app.user().is_none());
        assert!(f.app.subjects().is_empty());
        assert!(!f.app.ledger().is_loaded());
    }

    #[tokio::test]
    async fn test_switching_users_rebuilds_ledger() {
        let mut f = fixture();
        f.app.sign_in(&Credentials::email("ada@example.com")).await.unwrap();
        f.app.add_subject("Math").await.unwrap();

        f.app.sign_in(&Credentials::email("bob@example.com")).await.unwrap();
        assert!(f.app.subjects().is_empty());

        f.app.sign_in(&Credentials::email("ada@example.com")).await.unwrap();
        assert_eq!(f.app.subjects()[0].name(), "Math");
    }

    #[tokio::test]
    async fn test_reacts_to_external_identity_change() {
        let mut f = fixture();
        f.app.sign_in(&Credentials::email("ada@example.com")).await.unwrap();

        f.identity.sign_out().await.unwrap();
        assert!(f.app.sync_identity().await);
        assert!(f.app.user().is_none());
        assert!(!f.app.sync_identity().await);
    }

    #[tokio::test]
    async fn test_failures_become_notices() {
        let mut f = fixture();

        assert!(f.app.sign_in(&Credentials::email("not-an-email")).await.is_none());
        assert!(f.app.notice().unwrap().starts_with("Sign in failed"));

        f.app.sign_in(&Credentials::email("ada@example.com")).await.unwrap();
        assert!(f.app.notice().is_none());

        f.store.set_fail_writes(true);
        assert!(f.app.add_subject("Math").await.is_none());
        assert!(f.app.notice().unwrap().starts_with("Failed to add subject"));

        assert!(f.app.mark("Nope", SessionMark::Present).await.is_none());
        assert!(f.app.notice().unwrap().starts_with("Failed to update attendance"));
    }

    #[tokio::test]
    async fn test_load_failure_reported_on_sign_in() {
        let mut f = fixture();
        f.store.set_fail_reads(true);

        f.app.sign_in(&Credentials::email("ada@example.com")).await.unwrap();
        assert!(f.app.user().is_some());
        assert!(!f.app.ledger().is_loaded());
        assert!(f.app.notice().unwrap().starts_with("Failed to load subjects"));

        assert!(f.app.add_subject("Math").await.is_none());
        assert_eq!(
            f.app.notice(),
            Some("Failed to add subject: subjects not loaded; sign in again to retry")
        );
    }

    #[tokio::test]
    async fn test_suggest_with_empty_ledger_skips_service() {
        let mut f = fixture();
        f.app.sign_in(&Credentials::email("ada@example.com")).await.unwrap();

        assert_eq!(f.app.suggest().await, None);
        assert_eq!(f.service.calls.load(Ordering::SeqCst), 0);
        assert!(f.app.notice().is_some());

        f.app.add_subject("Math").await.unwrap();
        f.app.mark("math", SessionMark::Present).await.unwrap();
        assert_eq!(f.app.suggest().await.as_deref(), Some("1 subjects"));
        assert_eq!(f.service.calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.app.suggestion_view().text.as_deref(), Some("1 subjects"));
    }

    #[tokio::test]
    async fn test_drop_releases_auth_subscription() {
        let Fixture { app, identity, .. } = fixture();
        assert_eq!(identity.subscriber_count(), 1);
        drop(app);
        assert_eq!(identity.subscriber_count(), 0);
    }
}
