use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast::error::RecvError, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::store::{CredentialEvent, CredentialStore, SessionMarker, TabSession};
use super::verifier::{TokenVerifier, Verification};
use crate::auth::{Role, TenantId};

pub const DEFAULT_REVALIDATION_PERIOD: Duration = Duration::from_secs(10 * 60);

/// Signed-in identity as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub tenant_id: TenantId,
    pub user_id: i64,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub is_active: bool,
}

impl SessionUser {
    /// Accept only a valid, active payload that names a tenant
    fn from_verification(verification: Verification) -> Option<Self> {
        if !verification.valid {
            return None;
        }
        let payload = verification.payload?;
        let tenant_id = payload.customer_id.and_then(TenantId::new)?;
        if !payload.is_active {
            return None;
        }
        Some(Self {
            tenant_id,
            user_id: payload.user_id,
            username: payload.username,
            email: payload.email,
            role: payload.role,
            is_active: payload.is_active,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Anonymous,
    Authenticated(SessionUser),
}

impl SessionState {
    pub fn user(&self) -> Option<&SessionUser> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

/// Background task that stops when the handle is dropped
pub struct BackgroundTask(JoinHandle<()>);

impl BackgroundTask {
    pub fn is_finished(&self) -> bool {
        self.0.is_finished()
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Shared authentication state of one client tab
pub struct SessionProvider {
    credentials: Arc<dyn CredentialStore>,
    tab: TabSession,
    verifier: Arc<dyn TokenVerifier>,
    state: watch::Sender<SessionState>,
}

impl SessionProvider {
    pub fn new(credentials: Arc<dyn CredentialStore>, tab: TabSession, verifier: Arc<dyn TokenVerifier>) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        Self {
            credentials,
            tab,
            verifier,
            state,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Startup check
    ///
    /// A tab that went away without logging out leaves a marker. If one is
    /// found the stored credential is re-verified and dropped when stale
    /// before anything else happens. Then whatever credential remains is
    /// verified with the server.
    pub async fn bootstrap(&self) -> SessionState {
        self.state.send_replace(SessionState::Loading);

        if self.tab.take_markers() {
            info!("Previous session ended without logout, checking stored credential");
            self.clear_stale().await;
        }

        let Some(token) = self.credentials.load().await else {
            return self.publish(SessionState::Anonymous);
        };

        match self.check(&token).await {
            Some(user) => self.publish(SessionState::Authenticated(user)),
            None => {
                self.credentials.clear().await;
                self.publish(SessionState::Anonymous)
            }
        }
    }

    /// Verify a freshly issued token and store it only if the server accepts it
    ///
    /// An accepted token overwrites the stored one in place, so other tabs
    /// never observe a removal. A rejected token clears the credential.
    pub async fn login(&self, token: &str) -> bool {
        self.state.send_replace(SessionState::Loading);

        match self.check(token).await {
            Some(user) => {
                self.credentials.save(token).await;
                info!("Signed in as {} ({})", user.username, user.role);
                self.publish(SessionState::Authenticated(user));
                true
            }
            None => {
                warn!("Login rejected: token failed verification");
                self.credentials.clear().await;
                self.publish(SessionState::Anonymous);
                false
            }
        }
    }

    pub async fn logout(&self) {
        self.credentials.clear().await;
        self.publish(SessionState::Anonymous);
        info!("Signed out");
    }

    /// Drop the stored credential if the server no longer accepts it
    pub async fn clear_stale(&self) {
        let Some(token) = self.credentials.load().await else {
            return;
        };
        if self.check(&token).await.is_none() {
            info!("Stored credential is stale, clearing it");
            self.credentials.clear().await;
            self.publish(SessionState::Anonymous);
        }
    }

    /// Record that this tab is going away without an explicit logout
    pub fn mark_unload(&self) {
        self.tab.mark(SessionMarker::Closed);
    }

    /// Re-check while a user is signed in. Logs out when the server disagrees.
    pub async fn revalidate(&self) {
        if self.state.borrow().user().is_none() {
            return;
        }
        let token = self.credentials.load().await;
        let user = match token {
            Some(token) => self.check(&token).await,
            None => None,
        };
        match user {
            Some(user) => {
                self.state.send_if_modified(|state| {
                    let next = SessionState::Authenticated(user);
                    if *state != next {
                        *state = next;
                        true
                    } else {
                        false
                    }
                });
            }
            None => {
                warn!("Session no longer valid, signing out");
                self.logout().await;
            }
        }
    }

    /// Periodic revalidation. The first check happens one period after start.
    pub fn spawn_revalidation(self: &Arc<Self>, period: Duration) -> BackgroundTask {
        let provider = Arc::clone(self);
        BackgroundTask(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                provider.revalidate().await;
            }
        }))
    }

    /// Follow credential removal made by any other tab
    ///
    /// A removal only signs this tab out when the shared credential is still
    /// gone by the time the event is handled.
    pub fn spawn_cross_tab_listener(self: &Arc<Self>) -> BackgroundTask {
        let provider = Arc::clone(self);
        let mut events = self.credentials.subscribe();
        BackgroundTask(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(CredentialEvent::Removed) => {
                        if provider.state.borrow().user().is_none() {
                            continue;
                        }
                        if provider.credentials.load().await.is_none() {
                            debug!("Credential removed in another tab");
                            provider.publish(SessionState::Anonymous);
                        }
                    }
                    Ok(CredentialEvent::Stored) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Missed {} credential events, revalidating", skipped);
                        provider.revalidate().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    /// Verifier failures count as invalid
    async fn check(&self, token: &str) -> Option<SessionUser> {
        match self.verifier.verify(token).await {
            Ok(verification) => SessionUser::from_verification(verification),
            Err(e) => {
                warn!("Token verification failed: {}", e);
                None
            }
        }
    }

    fn publish(&self, state: SessionState) -> SessionState {
        self.state.send_replace(state.clone());
        state
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::session::store::MemoryCredentialStore;
    use crate::session::verifier::VerifiedPayload;
    use crate::session::SessionError;
    use async_trait::async_trait;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Verifier answering from a table of known tokens
    #[derive(Default)]
    pub(crate) struct FakeVerifier {
        pub tokens: DashMap<String, VerifiedPayload>,
        pub unreachable: std::sync::atomic::AtomicBool,
        pub calls: AtomicUsize,
    }

    impl FakeVerifier {
        pub fn with(token: &str, role: Role, active: bool, tenant: Option<i64>) -> Arc<Self> {
            let verifier = Arc::new(Self::default());
            verifier.tokens.insert(token.to_string(), payload(role, active, tenant));
            verifier
        }
    }

    pub(crate) fn payload(role: Role, active: bool, tenant: Option<i64>) -> VerifiedPayload {
        VerifiedPayload {
            user_id: 5,
            username: "desk@example.com".to_string(),
            email: None,
            role,
            is_active: active,
            customer_id: tenant,
        }
    }

    #[async_trait]
    impl TokenVerifier for FakeVerifier {
        async fn verify(&self, token: &str) -> Result<Verification, SessionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(SessionError::UnexpectedStatus(503));
            }
            Ok(match self.tokens.get(token) {
                Some(payload) => Verification {
                    valid: true,
                    payload: Some(payload.clone()),
                },
                None => Verification::invalid(),
            })
        }
    }

    fn provider(store: &MemoryCredentialStore, verifier: Arc<FakeVerifier>) -> Arc<SessionProvider> {
        Arc::new(SessionProvider::new(Arc::new(store.clone()), TabSession::new(), verifier))
    }

    #[tokio::test]
    async fn test_bootstrap_without_credential() {
        let store = MemoryCredentialStore::new();
        let provider = provider(&store, Arc::new(FakeVerifier::default()));
        assert_eq!(provider.state(), SessionState::Loading);
        assert_eq!(provider.bootstrap().await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_bootstrap_restores_valid_credential() {
        let store = MemoryCredentialStore::new();
        store.save("good").await;
        let provider = provider(&store, FakeVerifier::with("good", Role::Agent, true, Some(3)));

        let state = provider.bootstrap().await;
        let user = state.user().unwrap();
        assert_eq!(user.role, Role::Agent);
        assert_eq!(user.tenant_id.get(), 3);
    }

    #[tokio::test]
    async fn test_bootstrap_clears_unacceptable_credentials() {
        for (active, tenant) in [(false, Some(3)), (true, None), (true, Some(0))] {
            let store = MemoryCredentialStore::new();
            store.save("tok").await;
            let provider = provider(&store, FakeVerifier::with("tok", Role::Admin, active, tenant));

            assert_eq!(provider.bootstrap().await, SessionState::Anonymous);
            assert_eq!(store.load().await, None);
        }
    }

    #[tokio::test]
    async fn test_verifier_failure_fails_closed() {
        let store = MemoryCredentialStore::new();
        store.save("good").await;
        let verifier = FakeVerifier::with("good", Role::Agent, true, Some(3));
        verifier.unreachable.store(true, Ordering::SeqCst);
        let provider = provider(&store, verifier);

        assert_eq!(provider.bootstrap().await, SessionState::Anonymous);
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn test_unload_marker_triggers_stale_check() {
        let store = MemoryCredentialStore::new();
        store.save("expired").await;
        let verifier = Arc::new(FakeVerifier::default());
        let tab = TabSession::new();
        tab.mark(SessionMarker::Closed);
        let provider = SessionProvider::new(Arc::new(store.clone()), tab.clone(), verifier.clone());

        assert_eq!(provider.bootstrap().await, SessionState::Anonymous);
        assert_eq!(store.load().await, None);
        assert!(!tab.has_marker(SessionMarker::Closed));
        // Stale check cleared the credential, so bootstrap had nothing left to verify.
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_stores_only_verified_tokens() {
        let store = MemoryCredentialStore::new();
        let provider = provider(&store, FakeVerifier::with("good", Role::Admin, true, Some(9)));

        assert!(!provider.login("forged").await);
        assert_eq!(store.load().await, None);
        assert_eq!(provider.state(), SessionState::Anonymous);

        assert!(provider.login("good").await);
        assert_eq!(store.load().await.as_deref(), Some("good"));
        assert!(provider.state().user().is_some());

        provider.logout().await;
        assert_eq!(store.load().await, None);
        assert_eq!(provider.state(), SessionState::Anonymous);
    }

    #[tokio::test]
    async fn test_mark_unload() {
        let tab = TabSession::new();
        let provider = SessionProvider::new(
            Arc::new(MemoryCredentialStore::new()),
            tab.clone(),
            Arc::new(FakeVerifier::default()),
        );
        provider.mark_unload();
        assert!(tab.has_marker(SessionMarker::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_logs_out_revoked_session() {
        let store = MemoryCredentialStore::new();
        let verifier = FakeVerifier::with("good", Role::Agent, true, Some(3));
        let provider = provider(&store, verifier.clone());
        assert!(provider.login("good").await);

        let _task = provider.spawn_revalidation(DEFAULT_REVALIDATION_PERIOD);
        let mut states = provider.subscribe();

        verifier.tokens.clear();
        tokio::time::advance(DEFAULT_REVALIDATION_PERIOD + Duration::from_secs(1)).await;
        states
            .wait_for(|state| *state == SessionState::Anonymous)
            .await
            .unwrap();
        assert_eq!(store.load().await, None);
    }

    #[tokio::test]
    async fn test_logout_in_one_tab_reaches_the_other() {
        let store = MemoryCredentialStore::new();
        let verifier = FakeVerifier::with("good", Role::Agent, true, Some(3));
        let first = provider(&store, verifier.clone());
        let second = provider(&store, verifier);

        assert!(first.login("good").await);
        assert!(second.bootstrap().await.user().is_some());

        let _listener = second.spawn_cross_tab_listener();
        let mut states = second.subscribe();
        first.logout().await;

        states
            .wait_for(|state| *state == SessionState::Anonymous)
            .await
            .unwrap();
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_own_login_keeps_listening_tab_signed_in() {
        let store = MemoryCredentialStore::new();
        let tab = provider(&store, FakeVerifier::with("good", Role::Agent, true, Some(3)));
        let _listener = tab.spawn_cross_tab_listener();

        assert!(tab.login("good").await);
        settle().await;

        assert!(tab.state().user().is_some());
        assert_eq!(store.load().await.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_login_in_another_tab_keeps_first_tab_signed_in() {
        let store = MemoryCredentialStore::new();
        let verifier = FakeVerifier::with("good", Role::Agent, true, Some(3));
        let first = provider(&store, verifier.clone());
        let second = provider(&store, verifier);

        assert!(first.login("good").await);
        let _listener = first.spawn_cross_tab_listener();

        assert!(second.login("good").await);
        settle().await;

        assert!(first.state().user().is_some());
        assert_eq!(store.load().await.as_deref(), Some("good"));
    }

    #[tokio::test]
    async fn test_stale_removal_event_ignored_once_credential_restored() {
        let store = MemoryCredentialStore::new();
        let verifier = FakeVerifier::with("good", Role::Agent, true, Some(3));
        let tab = provider(&store, verifier);
        assert!(tab.login("good").await);
        let _listener = tab.spawn_cross_tab_listener();

        // Removal and re-store land before the listener runs.
        store.clear().await;
        store.save("good").await;
        settle().await;

        assert!(tab.state().user().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revalidation_stops_when_handle_dropped() {
        let store = MemoryCredentialStore::new();
        let verifier = FakeVerifier::with("good", Role::Agent, true, Some(3));
        let provider = provider(&store, verifier.clone());
        assert!(provider.login("good").await);
        let calls_after_login = verifier.calls.load(Ordering::SeqCst);

        let task = provider.spawn_revalidation(Duration::from_secs(60));
        assert!(!task.is_finished());
        drop(task);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(verifier.calls.load(Ordering::SeqCst), calls_after_login);
        assert!(provider.state().user().is_some());
    }
}
