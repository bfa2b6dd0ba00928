//! The session manager: single source of truth for who is logged in.
//!
//! ```text
//! Loading ──bootstrap──▶ Authenticating ──profile ok──▶ Authenticated
//!    │                         └──────fetch fails─────▶ Anonymous
//!    └──no token──▶ Anonymous ──challenge──▶ MfaPending ──verify──▶ Authenticated
//! ```
//!
//! Synchronous operations take the state lock once and publish a fresh
//! [`AuthView`]. Async continuations (`bootstrap`, `refresh_user`) capture
//! the session epoch before awaiting and drop their result if any
//! identity-changing operation ran in the meantime.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::config::SessionConfig;
use crate::error::Error;
use crate::payload::LoginOutcome;
use crate::storage::{CredentialStore, SessionStorage};
use crate::traits::{Navigator, ProfileFetcher, ProfileFetcherDyn};
use crate::types::{AccessToken, MfaChallengeToken, RefreshToken, UserProfile};

/// Observable session state, derived from stored credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// `bootstrap()` has not run yet.
    Loading,
    /// A stored token is being checked against the backend.
    Authenticating,
    Anonymous,
    MfaPending,
    Authenticated,
}

impl SessionStatus {
    /// True until bootstrap has settled. Route guards should render neither
    /// protected content nor the login screen while this holds.
    #[must_use]
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Loading | Self::Authenticating)
    }
}

/// Snapshot handed to route guards and components.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthView {
    pub status: SessionStatus,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

impl AuthView {
    fn new(status: SessionStatus, user: Option<UserProfile>) -> Self {
        Self {
            status,
            user,
            is_authenticated: status == SessionStatus::Authenticated,
            is_loading: status.is_loading(),
        }
    }
}

/// Receives failures the manager swallows (bootstrap) or reports
/// (`refresh_user`). Never sees token values.
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Loading,
    Verifying,
    Settled,
    Disposed,
}

struct State {
    phase: Phase,
    user: Option<UserProfile>,
    epoch: u64,
}

struct Shared {
    state: RwLock<State>,
    credentials: CredentialStore,
    fetcher: Arc<dyn ProfileFetcherDyn>,
    navigator: Option<Arc<dyn Navigator>>,
    on_error: Option<ErrorHook>,
    config: SessionConfig,
    view_tx: watch::Sender<AuthView>,
}

impl Shared {
    fn status(&self, state: &State) -> SessionStatus {
        match state.phase {
            Phase::Loading => SessionStatus::Loading,
            Phase::Verifying => SessionStatus::Authenticating,
            Phase::Disposed => SessionStatus::Anonymous,
            Phase::Settled => {
                if self.credentials.access_token().is_some() {
                    SessionStatus::Authenticated
                } else if self.credentials.mfa_challenge().is_some() {
                    SessionStatus::MfaPending
                } else {
                    SessionStatus::Anonymous
                }
            }
        }
    }

    // A profile without a token is never observable.
    fn user(&self, state: &State) -> Option<UserProfile> {
        self.credentials.access_token().and(state.user.clone())
    }

    fn view(&self, state: &State) -> AuthView {
        AuthView::new(self.status(state), self.user(state))
    }

    /// Must be called with the write lock held so views publish in order.
    fn publish(&self, state: &State) -> SessionStatus {
        let view = self.view(state);
        let status = view.status;
        self.view_tx.send_replace(view);
        status
    }

    fn wipe(&self, state: &mut State) {
        self.credentials.clear_all();
        state.user = None;
        state.epoch += 1;
    }

    fn report(&self, error: &Error) {
        if let Some(hook) = &self.on_error {
            hook(error);
        }
    }
}

/// Builder for [`SessionManager`]; the composition root wires collaborators here.
pub struct SessionBuilder {
    storage: Arc<dyn SessionStorage>,
    fetcher: Arc<dyn ProfileFetcherDyn>,
    config: SessionConfig,
    navigator: Option<Arc<dyn Navigator>>,
    on_error: Option<ErrorHook>,
}

impl SessionBuilder {
    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Called with the login path on `logout()`.
    #[must_use]
    pub fn with_navigator(mut self, navigator: impl Navigator) -> Self {
        self.navigator = Some(Arc::new(navigator));
        self
    }

    #[must_use]
    pub fn with_error_hook(mut self, hook: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn build(self) -> SessionManager {
        let state = State {
            phase: Phase::Loading,
            user: None,
            epoch: 0,
        };
        let (view_tx, _) = watch::channel(AuthView::new(SessionStatus::Loading, None));

        SessionManager {
            shared: Arc::new(Shared {
                state: RwLock::new(state),
                credentials: CredentialStore::new(self.storage),
                fetcher: self.fetcher,
                navigator: self.navigator,
                on_error: self.on_error,
                config: self.config,
                view_tx,
            }),
        }
    }
}

/// Tab-scoped authentication session.
///
/// Cheap to clone; clones share one session. Create one per tab (or per test)
/// through [`SessionManager::builder`].
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn builder(storage: impl SessionStorage, fetcher: impl ProfileFetcher) -> SessionBuilder {
        SessionBuilder {
            storage: Arc::new(storage),
            fetcher: Arc::new(fetcher),
            config: SessionConfig::default(),
            navigator: None,
            on_error: None,
        }
    }

    #[must_use]
    pub fn new(storage: impl SessionStorage, fetcher: impl ProfileFetcher) -> Self {
        Self::builder(storage, fetcher).build()
    }

    /// Validate the stored access token by fetching the current profile.
    ///
    /// Never fails: any fetch error wipes all stored credentials and settles
    /// on [`SessionStatus::Anonymous`]. The error goes to the error hook only.
    /// Without a stored token no request is made.
    pub async fn bootstrap(&self) -> SessionStatus {
        let (token, epoch) = {
            let mut state = self.shared.state.write();
            if state.phase == Phase::Disposed {
                return SessionStatus::Anonymous;
            }

            let Some(token) = self.shared.credentials.access_token() else {
                state.phase = Phase::Settled;
                state.user = None;
                let status = self.shared.publish(&state);
                tracing::debug!(?status, "Bootstrap found no stored access token");
                return status;
            };

            if self.shared.credentials.mfa_challenge().is_some() {
                tracing::warn!("Stored MFA challenge alongside access token; dropping challenge");
                self.shared.credentials.clear_challenge();
            }

            state.phase = Phase::Verifying;
            state.user = None;
            self.shared.publish(&state);
            (token, state.epoch)
        };

        let result = self.shared.fetcher.fetch_dyn(&token).await;

        let mut state = self.shared.state.write();
        if state.epoch != epoch || state.phase == Phase::Disposed {
            tracing::debug!("Session changed during bootstrap; discarding profile result");
            return self.shared.status(&state);
        }

        state.phase = Phase::Settled;
        match result {
            Ok(profile) => {
                tracing::info!(user = ?profile.id, "Session restored");
                state.user = Some(profile);
                self.shared.publish(&state)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Stored access token rejected; continuing anonymous");
                self.shared.wipe(&mut state);
                let status = self.shared.publish(&state);
                drop(state);
                self.shared.report(&e);
                status
            }
        }
    }

    /// Record a completed login.
    ///
    /// The caller has already obtained `access_token`/`refresh_token` from a
    /// successful login or MFA verification. Any pending challenge is dropped.
    pub fn login(
        &self,
        access_token: AccessToken,
        refresh_token: RefreshToken,
        profile: Option<UserProfile>,
    ) {
        let mut state = self.shared.state.write();
        if state.phase == Phase::Disposed {
            tracing::debug!("Ignoring login on disposed session");
            return;
        }

        self.shared.credentials.store_tokens(&access_token, &refresh_token);
        state.user = profile;
        state.phase = Phase::Settled;
        state.epoch += 1;
        self.shared.publish(&state);

        match &state.user {
            Some(user) => tracing::info!(user = ?user.id, "Logged in"),
            None => tracing::info!("Logged in without profile"),
        }
    }

    /// Enter the MFA-pending state, or replace the challenge during recovery.
    ///
    /// A challenge never coexists with an access token: if one is stored, it
    /// is discarded together with the refresh token and cached profile.
    pub fn begin_mfa_challenge(&self, challenge: MfaChallengeToken) {
        let mut state = self.shared.state.write();
        if state.phase == Phase::Disposed {
            return;
        }

        if self.shared.credentials.access_token().is_some() {
            tracing::warn!("MFA challenge issued over an authenticated session; dropping tokens");
        }
        self.shared.credentials.store_challenge(&challenge);
        state.user = None;
        state.phase = Phase::Settled;
        state.epoch += 1;
        self.shared.publish(&state);
        tracing::info!("MFA challenge pending");
    }

    /// The pending challenge token, if any.
    #[must_use]
    pub fn resolve_mfa_challenge(&self) -> Option<MfaChallengeToken> {
        let _state = self.shared.state.read();
        self.shared.credentials.mfa_challenge()
    }

    /// Drop the pending challenge (after verification, or on cancel/expiry).
    pub fn clear_mfa_challenge(&self) {
        let mut state = self.shared.state.write();
        if state.phase == Phase::Disposed {
            return;
        }
        if self.shared.credentials.mfa_challenge().is_none() {
            return;
        }

        self.shared.credentials.clear_challenge();
        state.epoch += 1;
        self.shared.publish(&state);
        tracing::debug!("MFA challenge cleared");
    }

    /// Route the success payload of a login, verify or recovery exchange.
    ///
    /// Only these exchanges change the session. Profile-affecting calls such
    /// as `enable_mfa`/`disable_mfa` leave the cached profile stale until
    /// [`refresh_user`](Self::refresh_user) runs.
    pub fn apply_login_outcome(&self, outcome: LoginOutcome) -> SessionStatus {
        match outcome {
            LoginOutcome::Authenticated(grant) => {
                self.login(grant.access_token, grant.refresh_token, grant.user);
            }
            LoginOutcome::MfaRequired(challenge) => {
                self.begin_mfa_challenge(challenge.mfa_token);
            }
        }
        self.status()
    }

    /// Wipe every credential and the cached profile, then navigate to login.
    ///
    /// In-flight profile fetches are not cancelled; their results are
    /// discarded when they land.
    pub fn logout(&self) {
        {
            let mut state = self.shared.state.write();
            if state.phase == Phase::Disposed {
                return;
            }
            self.shared.wipe(&mut state);
            state.phase = Phase::Settled;
            self.shared.publish(&state);
        }
        tracing::info!("Logged out");

        if let Some(navigator) = &self.shared.navigator {
            navigator.navigate(self.shared.config.login_path());
        }
    }

    /// Re-read the profile with the stored access token.
    ///
    /// Returns `Ok(None)` when there is no token, before `bootstrap()` has
    /// settled, or when the session changed while the request was in flight (the result is discarded). An
    /// unauthorized response invalidates the session; other failures leave
    /// it as is. Both are returned and passed to the error hook.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error.
    pub async fn refresh_user(&self) -> Result<Option<UserProfile>, Error> {
        let (token, epoch) = {
            let state = self.shared.state.read();
            if state.phase != Phase::Settled {
                return Ok(None);
            }
            match self.shared.credentials.access_token() {
                Some(token) => (token, state.epoch),
                None => return Ok(None),
            }
        };

        let result = self.shared.fetcher.fetch_dyn(&token).await;

        let mut state = self.shared.state.write();
        let current = self.shared.credentials.access_token();
        if state.epoch != epoch || current.as_ref() != Some(&token) {
            tracing::debug!("Session changed during profile refresh; discarding result");
            return Ok(None);
        }

        match result {
            Ok(profile) => {
                state.user = Some(profile.clone());
                self.shared.publish(&state);
                Ok(Some(profile))
            }
            Err(e) => {
                if e.is_unauthorized() {
                    tracing::warn!(error = %e, "Access token rejected; session invalidated");
                    self.shared.wipe(&mut state);
                    state.phase = Phase::Settled;
                    self.shared.publish(&state);
                } else {
                    tracing::warn!(error = %e, "Profile refresh failed");
                }
                drop(state);
                self.shared.report(&e);
                Err(e)
            }
        }
    }

    /// Tear the session down: wipe storage and state without navigating.
    /// Every later operation is a no-op.
    pub fn dispose(&self) {
        let mut state = self.shared.state.write();
        if state.phase == Phase::Disposed {
            return;
        }
        self.shared.wipe(&mut state);
        state.phase = Phase::Disposed;
        self.shared.publish(&state);
        tracing::debug!("Session disposed");
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let state = self.shared.state.read();
        self.shared.status(&state)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    #[must_use]
    pub fn view(&self) -> AuthView {
        let state = self.shared.state.read();
        self.shared.view(&state)
    }

    /// Receiver that observes every published [`AuthView`].
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthView> {
        self.shared.view_tx.subscribe()
    }

    #[must_use]
    pub fn current_user(&self) -> Option<UserProfile> {
        let state = self.shared.state.read();
        self.shared.user(&state)
    }

    #[must_use]
    pub fn access_token(&self) -> Option<AccessToken> {
        let _state = self.shared.state.read();
        self.shared.credentials.access_token()
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<RefreshToken> {
        let _state = self.shared.state.read();
        self.shared.credentials.refresh_token()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;
    use tokio::sync::oneshot;

    use super::*;
    use crate::payload::{MfaChallenge, TokenGrant};
    use crate::storage::{
        ACCESS_TOKEN_KEY, MFA_CHALLENGE_TOKEN_KEY, MemoryStorage, REFRESH_TOKEN_KEY,
    };

    type FetchResult = Result<UserProfile, Error>;

    enum Reply {
        Ready(FetchResult),
        Gated(oneshot::Receiver<FetchResult>),
    }

    #[derive(Default)]
    struct ScriptedFetcher {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn push(&self, result: FetchResult) {
            self.replies.lock().push_back(Reply::Ready(result));
        }

        fn gate(&self) -> oneshot::Sender<FetchResult> {
            let (tx, rx) = oneshot::channel();
            self.replies.lock().push_back(Reply::Gated(rx));
            tx
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ProfileFetcher for ScriptedFetcher {
        async fn fetch_current_user(&self, _access_token: &AccessToken) -> FetchResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.replies.lock().pop_front();
            match reply {
                Some(Reply::Ready(result)) => result,
                Some(Reply::Gated(rx)) => rx
                    .await
                    .unwrap_or_else(|_| Err(Error::Fetch("gate dropped".into()))),
                None => Err(Error::Fetch("no scripted reply".into())),
            }
        }
    }

    struct Harness {
        storage: MemoryStorage,
        fetcher: Arc<ScriptedFetcher>,
        session: SessionManager,
    }

    fn harness() -> Harness {
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(ScriptedFetcher::default());
        let session = SessionManager::new(storage.clone(), fetcher.clone());
        Harness {
            storage,
            fetcher,
            session,
        }
    }

    fn profile() -> UserProfile {
        UserProfile::new("u-1", "analyst@example.com", "analyst").with_name("Ada", "Byron")
    }

    fn unauthorized() -> Error {
        Error::Api {
            operation: "profile fetch",
            status: Some(401),
            detail: "token expired".into(),
        }
    }

    fn assert_invariants(session: &SessionManager) {
        let view = session.view();
        let has_access = session.access_token().is_some();
        if view.status == SessionStatus::Authenticated {
            assert!(has_access, "authenticated without access token");
        }
        if view.user.is_some() {
            assert!(has_access, "profile visible without access token");
        }
        assert!(
            !(has_access && session.resolve_mfa_challenge().is_some()),
            "challenge and access token both present"
        );
    }

    async fn wait_for_calls(fetcher: &ScriptedFetcher, n: usize) {
        while fetcher.calls() < n {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn starts_loading() {
        let h = harness();
        let view = h.session.view();
        assert_eq!(view.status, SessionStatus::Loading);
        assert!(view.is_loading);
        assert!(!view.is_authenticated);
    }

    #[test]
    fn login_then_logout_leaves_nothing() {
        let h = harness();
        h.session.login(
            AccessToken::new("acc"),
            RefreshToken::new("ref"),
            Some(profile()),
        );
        assert_eq!(h.session.status(), SessionStatus::Authenticated);
        assert_eq!(h.session.current_user(), Some(profile()));
        assert_invariants(&h.session);

        h.session.logout();

        assert_eq!(h.session.status(), SessionStatus::Anonymous);
        assert!(h.session.access_token().is_none());
        assert!(h.session.refresh_token().is_none());
        assert!(h.session.resolve_mfa_challenge().is_none());
        assert!(h.session.current_user().is_none());
        assert!(h.storage.is_empty());
    }

    #[test]
    fn login_without_profile_is_authenticated() {
        let h = harness();
        h.session.login(AccessToken::new("acc"), RefreshToken::new("ref"), None);
        let view = h.session.view();
        assert!(view.is_authenticated);
        assert!(view.user.is_none());
        assert_eq!(h.storage.get(REFRESH_TOKEN_KEY).as_deref(), Some("ref"));
    }

    #[test]
    fn challenge_round_trip() {
        let h = harness();
        h.session.begin_mfa_challenge(MfaChallengeToken::new("chal-1"));
        assert_eq!(h.session.status(), SessionStatus::MfaPending);
        assert_eq!(
            h.session.resolve_mfa_challenge(),
            Some(MfaChallengeToken::new("chal-1"))
        );

        h.session.clear_mfa_challenge();
        assert!(h.session.resolve_mfa_challenge().is_none());
        assert_eq!(h.session.status(), SessionStatus::Anonymous);
    }

    #[test]
    fn resolve_does_not_mutate() {
        let h = harness();
        h.session.begin_mfa_challenge(MfaChallengeToken::new("chal"));
        let _ = h.session.resolve_mfa_challenge();
        let _ = h.session.resolve_mfa_challenge();
        assert!(h.storage.contains(MFA_CHALLENGE_TOKEN_KEY));
    }

    #[test]
    fn recovery_replaces_challenge() {
        let h = harness();
        h.session.begin_mfa_challenge(MfaChallengeToken::new("chal-1"));
        h.session.begin_mfa_challenge(MfaChallengeToken::new("recovery-2"));
        assert_eq!(
            h.session.resolve_mfa_challenge(),
            Some(MfaChallengeToken::new("recovery-2"))
        );
    }

    #[test]
    fn verify_success_resolves_challenge() {
        let h = harness();
        h.session.begin_mfa_challenge(MfaChallengeToken::new("chal"));
        h.session.login(
            AccessToken::new("acc"),
            RefreshToken::new("ref"),
            Some(profile()),
        );

        assert_eq!(h.session.status(), SessionStatus::Authenticated);
        assert!(h.session.resolve_mfa_challenge().is_none());
        assert_invariants(&h.session);
    }

    #[test]
    fn challenge_over_authenticated_session_drops_tokens() {
        let h = harness();
        h.session.login(
            AccessToken::new("acc"),
            RefreshToken::new("ref"),
            Some(profile()),
        );
        h.session.begin_mfa_challenge(MfaChallengeToken::new("chal"));

        assert_eq!(h.session.status(), SessionStatus::MfaPending);
        assert!(h.session.access_token().is_none());
        assert!(h.session.current_user().is_none());
        assert_invariants(&h.session);
    }

    #[test]
    fn apply_login_outcome_routes_payloads() {
        let h = harness();
        let status = h.session.apply_login_outcome(LoginOutcome::MfaRequired(MfaChallenge::new(
            MfaChallengeToken::new("chal"),
        )));
        assert_eq!(status, SessionStatus::MfaPending);

        let grant = TokenGrant::new(AccessToken::new("acc"), RefreshToken::new("ref"))
            .with_user(profile());
        let status = h.session.apply_login_outcome(LoginOutcome::Authenticated(grant));
        assert_eq!(status, SessionStatus::Authenticated);
        assert_eq!(h.session.current_user(), Some(profile()));
        assert_invariants(&h.session);
    }

    #[test]
    fn logout_navigates_to_login_path() {
        let visited = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = visited.clone();
        let session = SessionManager::builder(MemoryStorage::new(), ScriptedFetcher::default())
            .with_config(SessionConfig::new().with_login_path("/auth/login"))
            .with_navigator(move |path: &str| sink.lock().push(path.to_owned()))
            .build();

        session.login(AccessToken::new("acc"), RefreshToken::new("ref"), None);
        session.logout();

        assert_eq!(*visited.lock(), vec!["/auth/login".to_string()]);
    }

    #[test]
    fn token_removed_externally_hides_profile() {
        let h = harness();
        h.session.login(
            AccessToken::new("acc"),
            RefreshToken::new("ref"),
            Some(profile()),
        );
        h.storage.remove(ACCESS_TOKEN_KEY);

        assert!(h.session.current_user().is_none());
        assert_ne!(h.session.status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn bootstrap_without_token_skips_network() {
        let h = harness();
        let status = h.session.bootstrap().await;

        assert_eq!(status, SessionStatus::Anonymous);
        assert!(!h.session.view().is_loading);
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn bootstrap_with_valid_token_authenticates() {
        let h = harness();
        h.storage.set(ACCESS_TOKEN_KEY, "acc");
        h.storage.set(REFRESH_TOKEN_KEY, "ref");
        h.fetcher.push(Ok(profile()));

        let status = h.session.bootstrap().await;

        assert_eq!(status, SessionStatus::Authenticated);
        assert_eq!(h.session.current_user(), Some(profile()));
        assert_eq!(h.fetcher.calls(), 1);
        assert_invariants(&h.session);
    }

    #[tokio::test]
    async fn bootstrap_failure_wipes_and_is_idempotent() {
        let errors = Arc::new(AtomicUsize::new(0));
        let counter = errors.clone();
        let storage = MemoryStorage::new();
        let fetcher = Arc::new(ScriptedFetcher::default());
        let session = SessionManager::builder(storage.clone(), fetcher.clone())
            .with_error_hook(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build();

        storage.set(ACCESS_TOKEN_KEY, "stale");
        storage.set(REFRESH_TOKEN_KEY, "stale-ref");
        fetcher.push(Err(unauthorized()));

        assert_eq!(session.bootstrap().await, SessionStatus::Anonymous);
        assert!(storage.is_empty());
        assert_eq!(errors.load(Ordering::SeqCst), 1);

        assert_eq!(session.bootstrap().await, SessionStatus::Anonymous);
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bootstrap_network_failure_degrades_to_anonymous() {
        let h = harness();
        h.storage.set(ACCESS_TOKEN_KEY, "acc");
        h.fetcher.push(Err(Error::Fetch("connection refused".into())));

        assert_eq!(h.session.bootstrap().await, SessionStatus::Anonymous);
        assert!(h.session.access_token().is_none());
    }

    #[tokio::test]
    async fn bootstrap_restores_pending_challenge() {
        let h = harness();
        h.storage.set(MFA_CHALLENGE_TOKEN_KEY, "chal");

        assert_eq!(h.session.bootstrap().await, SessionStatus::MfaPending);
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn bootstrap_drops_challenge_stored_with_token() {
        let h = harness();
        h.storage.set(ACCESS_TOKEN_KEY, "acc");
        h.storage.set(MFA_CHALLENGE_TOKEN_KEY, "chal");
        h.fetcher.push(Ok(profile()));

        assert_eq!(h.session.bootstrap().await, SessionStatus::Authenticated);
        assert!(h.session.resolve_mfa_challenge().is_none());
    }

    #[tokio::test]
    async fn bootstrap_reports_authenticating_while_in_flight() {
        let h = harness();
        h.storage.set(ACCESS_TOKEN_KEY, "acc");
        let gate = h.fetcher.gate();

        let session = h.session.clone();
        let task = tokio::spawn(async move { session.bootstrap().await });
        wait_for_calls(&h.fetcher, 1).await;

        let view = h.session.view();
        assert_eq!(view.status, SessionStatus::Authenticating);
        assert!(view.is_loading);
        assert!(!view.is_authenticated);

        gate.send(Ok(profile())).unwrap();
        assert_eq!(task.await.unwrap(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn logout_during_bootstrap_wins() {
        let h = harness();
        h.storage.set(ACCESS_TOKEN_KEY, "acc");
        let gate = h.fetcher.gate();

        let session = h.session.clone();
        let task = tokio::spawn(async move { session.bootstrap().await });
        wait_for_calls(&h.fetcher, 1).await;

        h.session.logout();
        gate.send(Ok(profile())).unwrap();

        assert_eq!(task.await.unwrap(), SessionStatus::Anonymous);
        assert!(h.session.current_user().is_none());
        assert!(h.storage.is_empty());
    }

    #[tokio::test]
    async fn stale_bootstrap_failure_keeps_new_login() {
        let h = harness();
        h.storage.set(ACCESS_TOKEN_KEY, "old");
        let gate = h.fetcher.gate();

        let session = h.session.clone();
        let task = tokio::spawn(async move { session.bootstrap().await });
        wait_for_calls(&h.fetcher, 1).await;

        h.session.login(
            AccessToken::new("new"),
            RefreshToken::new("new-ref"),
            Some(profile()),
        );
        gate.send(Err(unauthorized())).unwrap();

        assert_eq!(task.await.unwrap(), SessionStatus::Authenticated);
        assert_eq!(h.session.access_token(), Some(AccessToken::new("new")));
        assert_eq!(h.session.current_user(), Some(profile()));
    }

    #[tokio::test]
    async fn logout_during_refresh_is_not_resurrected() {
        let h = harness();
        h.session.login(AccessToken::new("acc"), RefreshToken::new("ref"), None);
        let gate = h.fetcher.gate();

        let session = h.session.clone();
        let task = tokio::spawn(async move { session.refresh_user().await });
        wait_for_calls(&h.fetcher, 1).await;

        h.session.logout();
        gate.send(Ok(profile())).unwrap();

        assert!(task.await.unwrap().unwrap().is_none());
        assert_eq!(h.session.status(), SessionStatus::Anonymous);
        assert!(h.session.current_user().is_none());
        assert_invariants(&h.session);
    }

    #[tokio::test]
    async fn refresh_updates_cached_profile() {
        let h = harness();
        h.session.login(
            AccessToken::new("acc"),
            RefreshToken::new("ref"),
            Some(profile()),
        );
        let updated = profile().with_department("Incident Response");
        h.fetcher.push(Ok(updated.clone()));

        let fetched = h.session.refresh_user().await.unwrap();

        assert_eq!(fetched, Some(updated.clone()));
        assert_eq!(h.session.current_user(), Some(updated));
    }

    #[tokio::test]
    async fn refresh_unauthorized_invalidates_session() {
        let h = harness();
        h.session.login(
            AccessToken::new("acc"),
            RefreshToken::new("ref"),
            Some(profile()),
        );
        h.fetcher.push(Err(unauthorized()));

        let err = h.session.refresh_user().await.unwrap_err();

        assert!(err.is_unauthorized());
        assert_eq!(h.session.status(), SessionStatus::Anonymous);
        assert!(h.storage.is_empty());
    }

    #[tokio::test]
    async fn refresh_transport_failure_keeps_session() {
        let h = harness();
        h.session.login(
            AccessToken::new("acc"),
            RefreshToken::new("ref"),
            Some(profile()),
        );
        h.fetcher.push(Err(Error::Fetch("timeout".into())));

        assert!(h.session.refresh_user().await.is_err());
        assert_eq!(h.session.status(), SessionStatus::Authenticated);
        assert_eq!(h.session.current_user(), Some(profile()));
    }

    #[tokio::test]
    async fn refresh_before_bootstrap_leaves_session_loading() {
        let h = harness();
        h.storage.set(ACCESS_TOKEN_KEY, "acc");
        h.fetcher.push(Err(unauthorized()));

        assert!(h.session.refresh_user().await.unwrap().is_none());
        assert_eq!(h.fetcher.calls(), 0);
        assert_eq!(h.session.status(), SessionStatus::Loading);
        assert!(h.session.current_user().is_none());

        assert_eq!(h.session.bootstrap().await, SessionStatus::Anonymous);
        assert!(h.storage.is_empty());
        assert!(!h.session.view().is_loading);
    }

    #[tokio::test]
    async fn refresh_without_token_is_noop() {
        let h = harness();
        assert!(h.session.refresh_user().await.unwrap().is_none());
        assert_eq!(h.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let h = harness();
        let mut rx = h.session.subscribe();
        assert!(rx.borrow_and_update().is_loading);

        h.storage.set(ACCESS_TOKEN_KEY, "acc");
        h.fetcher.push(Ok(profile()));
        h.session.bootstrap().await;

        assert!(rx.has_changed().unwrap());
        let view = rx.borrow_and_update().clone();
        assert!(view.is_authenticated);
        assert_eq!(view.user, Some(profile()));

        h.session.logout();
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.status, SessionStatus::Anonymous);
        assert!(view.user.is_none());
    }

    #[tokio::test]
    async fn disposed_session_ignores_operations() {
        let h = harness();
        h.session.login(AccessToken::new("acc"), RefreshToken::new("ref"), None);
        h.session.dispose();

        h.session.login(AccessToken::new("again"), RefreshToken::new("ref"), None);
        h.session.begin_mfa_challenge(MfaChallengeToken::new("chal"));
        h.storage.set(ACCESS_TOKEN_KEY, "sneaky");

        assert_eq!(h.session.bootstrap().await, SessionStatus::Anonymous);
        assert_eq!(h.session.status(), SessionStatus::Anonymous);
        assert_eq!(h.fetcher.calls(), 0);
        assert!(h.session.refresh_user().await.unwrap().is_none());
    }

    #[test]
    fn sessions_are_isolated() {
        let a = harness();
        let b = harness();
        a.session.login(AccessToken::new("acc"), RefreshToken::new("ref"), None);

        assert!(a.session.is_authenticated());
        assert!(b.session.access_token().is_none());
    }
}
