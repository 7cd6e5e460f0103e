//! Session lifecycle: initialize, OTP login, logout, profile refresh and the
//! resume gate.
//!
//! All session mutation goes through [`AuthController`]. Every write that
//! follows a network await is checked against the session generation, which
//! login and logout bump; a reply that belongs to an earlier session is
//! dropped.

use crate::validate;
use pilot_api::{AccountApi, ApiEnvelope, ApiError, BearerToken, ResumeUpload};
use pilot_core::{has_resume, ProfileUpdate, Session, UserProfile};
use pilot_security::SessionStore;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Authenticated,
    Anonymous,
}

/// What consumers observe: the session plus the lifecycle flags.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Session,
    pub loading: bool,
    pub generation: u64,
}

impl SessionSnapshot {
    pub fn user(&self) -> Option<&UserProfile> {
        self.session.user.as_ref()
    }

    pub fn has_resume(&self) -> bool {
        has_resume(self.user())
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }
}

/// Outcome of a controller operation, always safe to show to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpResult {
    pub success: bool,
    pub message: Option<String>,
}

impl OpResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

struct State {
    phase: SessionPhase,
    session: Session,
    loading: bool,
    generation: u64,
}

impl State {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            session: self.session.clone(),
            loading: self.loading,
            generation: self.generation,
        }
    }
}

struct Inner {
    api: Arc<dyn AccountApi>,
    store: Arc<dyn SessionStore>,
    bearer: BearerToken,
    state: Mutex<State>,
    updates: watch::Sender<SessionSnapshot>,
    enrichment: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct AuthController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for AuthController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthController")
            .field("snapshot", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl AuthController {
    pub fn new(
        api: Arc<dyn AccountApi>,
        store: Arc<dyn SessionStore>,
        bearer: BearerToken,
    ) -> Self {
        let state = State {
            phase: SessionPhase::Uninitialized,
            session: Session::default(),
            loading: true,
            generation: 0,
        };
        let (updates, _) = watch::channel(state.snapshot());
        bearer.set(None);
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                bearer,
                state: Mutex::new(state),
                updates,
                enrichment: Mutex::new(None),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.updates.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.updates.borrow().is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.inner.updates.borrow().session.user.clone()
    }

    pub fn bearer_token(&self) -> Option<String> {
        self.inner.updates.borrow().session.token.clone()
    }

    /// Resume gate from the cached user only.
    pub fn check_resume_status_sync(&self) -> bool {
        self.inner.updates.borrow().has_resume()
    }

    /// Restores the persisted session and validates it against the backend.
    ///
    /// A cached profile is published before the network call. When the
    /// profile fetch fails the session is kept if a cached user exists and
    /// cleared otherwise.
    pub async fn initialize(&self) -> SessionPhase {
        let stored = match self.inner.store.load() {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!("could not read the stored session: {err}");
                Session::default()
            }
        };

        let Some(token) = stored.token.clone() else {
            let mut state = self.inner.state.lock().await;
            state.generation += 1;
            state.phase = SessionPhase::Anonymous;
            state.session = Session::default();
            state.loading = false;
            self.inner.bearer.set(None);
            self.publish(&state);
            tracing::debug!("no stored session");
            return SessionPhase::Anonymous;
        };

        let cached_user = stored.user.clone();
        let generation = {
            let mut state = self.inner.state.lock().await;
            state.generation += 1;
            state.loading = true;
            state.session = stored;
            if cached_user.is_some() {
                state.phase = SessionPhase::Authenticated;
            }
            self.inner.bearer.set(Some(token.clone()));
            self.publish(&state);
            state.generation
        };

        let fetched = self.fetch_profile().await;

        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            tracing::debug!("session changed during initialize; dropping profile result");
            return state.phase;
        }
        match fetched {
            Ok(user) => {
                state.session = Session {
                    token: Some(token),
                    user: merge_profile(user, cached_user.as_ref()),
                };
                state.phase = SessionPhase::Authenticated;
                self.persist(&state.session);
                tracing::info!("session restored");
            }
            Err(reason) if cached_user.is_some() => {
                state.phase = SessionPhase::Authenticated;
                tracing::warn!("profile check failed, keeping cached session: {reason}");
            }
            Err(reason) => {
                state.session = Session::default();
                state.phase = SessionPhase::Anonymous;
                self.inner.bearer.set(None);
                self.clear_store();
                tracing::info!("stored token rejected without a cached user: {reason}");
            }
        }
        state.loading = false;
        self.publish(&state);
        state.phase
    }

    pub async fn send_otp(&self, email: &str) -> OpResult {
        let email = match validate::email(email) {
            Ok(email) => email,
            Err(err) => return OpResult::fail(err.to_string()),
        };
        match self.inner.api.send_otp(&email).await {
            Ok(envelope) if envelope.is_success() => {
                tracing::info!("otp requested");
                OpResult::ok(
                    envelope
                        .message()
                        .unwrap_or_else(|| "OTP sent to your email".to_string()),
                )
            }
            Ok(envelope) => OpResult::fail(envelope.failure_message("Failed to send OTP")),
            Err(err) => OpResult::fail(failure_text(&err)),
        }
    }

    /// Verifies the OTP and stores the token with a minimal user. A resume
    /// check then runs in the background; its outcome never fails the login.
    pub async fn login(&self, email: &str, otp: &str) -> OpResult {
        let email = match validate::email(email) {
            Ok(email) => email,
            Err(err) => return OpResult::fail(err.to_string()),
        };
        let otp = match validate::otp(otp) {
            Ok(otp) => otp,
            Err(err) => return OpResult::fail(err.to_string()),
        };
        if let Some(refusal) = login_refusal(self.snapshot().phase) {
            return OpResult::fail(refusal);
        }

        let envelope = match self.inner.api.verify_otp(&email, &otp).await {
            Ok(envelope) => envelope,
            Err(err) => return OpResult::fail(failure_text(&err)),
        };
        let Some(token) = envelope.token() else {
            return OpResult::fail(envelope.failure_message("Invalid OTP. Please try again."));
        };
        if embedded_user(&envelope) {
            tracing::debug!("verify response carried a user object; using the minimal user");
        }

        let generation = {
            let mut state = self.inner.state.lock().await;
            if let Some(refusal) = login_refusal(state.phase) {
                return OpResult::fail(refusal);
            }
            state.generation += 1;
            state.phase = SessionPhase::Authenticated;
            state.loading = false;
            state.session = Session {
                token: Some(token.clone()),
                user: Some(UserProfile::minimal(email)),
            };
            self.inner.bearer.set(Some(token));
            self.persist(&state.session);
            self.publish(&state);
            tracing::info!("signed in");
            state.generation
        };

        let controller = self.clone();
        let handle = tokio::spawn(async move {
            controller.reconcile_resume(generation).await;
        });
        if let Some(previous) = self.inner.enrichment.lock().await.replace(handle) {
            previous.abort();
        }

        OpResult::ok("Login successful")
    }

    /// Waits for the background work started by [`login`](Self::login).
    pub async fn settle(&self) {
        let handle = self.inner.enrichment.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!("resume enrichment task failed: {err}");
                }
            }
        }
    }

    /// Clears the local session whatever the backend answers.
    pub async fn logout(&self) -> OpResult {
        let (phase, had_token) = {
            let state = self.inner.state.lock().await;
            (state.phase, state.session.token.is_some())
        };

        if had_token {
            match self.inner.api.logout().await {
                Ok(envelope) if !envelope.is_success() => {
                    tracing::warn!(
                        "backend logout was not acknowledged: {}",
                        envelope.failure_message("no reason given")
                    );
                }
                Ok(_) => tracing::debug!("backend logout acknowledged"),
                Err(err) => tracing::warn!("backend logout failed: {err}"),
            }
        }

        let mut state = self.inner.state.lock().await;
        state.generation += 1;
        state.session = Session::default();
        state.loading = false;
        if phase != SessionPhase::Uninitialized {
            state.phase = SessionPhase::Anonymous;
        }
        self.inner.bearer.set(None);
        self.clear_store();
        self.publish(&state);
        tracing::info!("signed out");
        OpResult::ok("Logged out successfully")
    }

    /// Authoritative resume gate.
    ///
    /// A true local gate answers without a network call. Otherwise the
    /// backend is asked; a positive answer is written back to the cached
    /// user. A failed check falls back to the local gate.
    pub async fn check_resume_status(&self) -> bool {
        let generation = {
            let state = self.inner.state.lock().await;
            if has_resume(state.session.user.as_ref()) {
                return true;
            }
            if state.session.token.is_none() {
                return false;
            }
            state.generation
        };
        self.reconcile_resume(generation).await
    }

    async fn reconcile_resume(&self, generation: u64) -> bool {
        let remote = match self.inner.api.resume_status().await {
            Ok(envelope) => envelope.resume_indicator(),
            Err(err) => {
                tracing::warn!("resume status check failed, using cached gate: {err}");
                false
            }
        };

        let mut state = self.inner.state.lock().await;
        let current = state.generation == generation && state.session.token.is_some();
        if remote && !current {
            tracing::debug!("session changed during resume check; dropping result");
            return has_resume(state.session.user.as_ref());
        }
        if remote {
            match state.session.user.as_mut() {
                Some(user) if !user.resume_indicator() => {
                    user.mark_resume_uploaded();
                    self.persist(&state.session);
                    self.publish(&state);
                    tracing::info!("resume confirmed by backend");
                }
                Some(_) => {}
                None => tracing::debug!("resume confirmed but no cached user to record it on"),
            }
        }
        remote || has_resume(state.session.user.as_ref())
    }

    /// Uploads a resume and opens the gate locally on success.
    pub async fn upload_resume(&self, path: &Path) -> OpResult {
        let generation = match self.authenticated_generation().await {
            Some(generation) => generation,
            None => return OpResult::fail("Please sign in first"),
        };
        let file = match validate::resume_file(path) {
            Ok(file) => file,
            Err(err) => return OpResult::fail(err.to_string()),
        };
        let bytes = match tokio::fs::read(&file.path).await {
            Ok(bytes) => bytes,
            Err(err) => return OpResult::fail(format!("Could not read {}: {err}", path.display())),
        };

        let upload = ResumeUpload {
            file_name: file.file_name,
            mime_type: file.mime_type.to_string(),
            bytes,
        };
        match self.inner.api.upload_resume(upload).await {
            Ok(envelope) if envelope.is_success() => {}
            Ok(envelope) => {
                return OpResult::fail(envelope.failure_message("Failed to upload resume"))
            }
            Err(err) => return OpResult::fail(failure_text(&err)),
        }

        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            tracing::debug!("session changed during upload; local gate left untouched");
        } else if let Some(user) = state.session.user.as_mut() {
            user.mark_resume_uploaded();
            self.persist(&state.session);
            self.publish(&state);
            tracing::info!("resume uploaded");
        } else {
            tracing::debug!("resume uploaded without a cached user; nothing to record");
        }
        OpResult::ok("Resume uploaded successfully")
    }

    pub async fn update_profile(&self, update: ProfileUpdate) -> OpResult {
        let Some(generation) = self.authenticated_generation().await else {
            return OpResult::fail("Please sign in first");
        };
        if update.is_empty() {
            return OpResult::fail("Nothing to update");
        }
        if let Some(email) = &update.email {
            if let Err(err) = validate::email(email) {
                return OpResult::fail(err.to_string());
            }
        }

        match self.inner.api.update_profile(&update).await {
            Ok(envelope) if envelope.is_success() => {}
            Ok(envelope) => {
                return OpResult::fail(envelope.failure_message("Failed to update profile"))
            }
            Err(err) => return OpResult::fail(failure_text(&err)),
        }

        match self.fetch_profile().await {
            Ok(user) => {
                self.store_profile(generation, user).await;
            }
            Err(reason) => tracing::warn!("profile re-fetch after update failed: {reason}"),
        }
        OpResult::ok("Profile updated successfully")
    }

    /// Re-reads the profile from the backend. Failure leaves the session alone.
    pub async fn refresh_profile(&self) -> OpResult {
        let Some(generation) = self.authenticated_generation().await else {
            return OpResult::fail("Please sign in first");
        };
        match self.fetch_profile().await {
            Ok(user) => {
                if self.store_profile(generation, user).await {
                    OpResult::ok("Profile refreshed")
                } else {
                    OpResult::fail("The session changed while refreshing")
                }
            }
            Err(reason) => OpResult::fail(reason),
        }
    }

    async fn authenticated_generation(&self) -> Option<u64> {
        let state = self.inner.state.lock().await;
        (state.phase == SessionPhase::Authenticated && state.session.token.is_some())
            .then_some(state.generation)
    }

    async fn store_profile(&self, generation: u64, user: UserProfile) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.generation != generation {
            tracing::debug!("session changed during profile fetch; dropping result");
            return false;
        }
        state.session.user = merge_profile(user, state.session.user.as_ref());
        self.persist(&state.session);
        self.publish(&state);
        true
    }

    async fn fetch_profile(&self) -> Result<UserProfile, String> {
        let envelope = self
            .inner
            .api
            .get_profile()
            .await
            .map_err(|err| failure_text(&err))?;
        envelope
            .profile()
            .ok_or_else(|| envelope.failure_message("Failed to load your profile"))
    }

    fn publish(&self, state: &State) {
        self.inner.updates.send_replace(state.snapshot());
    }

    fn persist(&self, session: &Session) {
        if let Err(err) = self.inner.store.save(session) {
            tracing::warn!("could not persist session: {err}");
        }
    }

    fn clear_store(&self) {
        if let Err(err) = self.inner.store.clear() {
            tracing::warn!("could not clear stored session: {err}");
        }
    }
}

fn login_refusal(phase: SessionPhase) -> Option<&'static str> {
    match phase {
        SessionPhase::Anonymous => None,
        SessionPhase::Authenticated => Some("Already signed in; log out first"),
        SessionPhase::Uninitialized => Some("The session has not been initialized yet"),
    }
}

fn embedded_user(envelope: &ApiEnvelope) -> bool {
    envelope.body().get("user").is_some()
        || envelope.data().and_then(|data| data.get("user")).is_some()
}

/// A profile reply without an email keeps the address we already know;
/// with no known address there is no user to record.
fn merge_profile(mut user: UserProfile, previous: Option<&UserProfile>) -> Option<UserProfile> {
    if user.email.trim().is_empty() {
        user.email = previous?.email.clone();
    }
    Some(user)
}

fn failure_text(err: &ApiError) -> String {
    if err.is_transport() {
        tracing::warn!("backend unreachable: {err}");
    } else if err.is_unauthorized() {
        tracing::info!("backend rejected the session token: {err}");
    }
    err.user_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pilot_api::{AuthApi, UserApi};
    use pilot_security::MemorySessionStore;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    type Reply = Result<Value, u16>;

    /// Scripted backend: each endpoint pops the next queued reply; an empty
    /// queue answers with a transport-style 503.
    #[derive(Default)]
    struct FakeApi {
        send_otp: StdMutex<VecDeque<Reply>>,
        verify: StdMutex<VecDeque<Reply>>,
        logout: StdMutex<VecDeque<Reply>>,
        profile: StdMutex<VecDeque<Reply>>,
        update: StdMutex<VecDeque<Reply>>,
        upload: StdMutex<VecDeque<Reply>>,
        resume: StdMutex<VecDeque<Reply>>,
        resume_gate: Option<Arc<Notify>>,
        profile_gate: Option<Arc<Notify>>,
        resume_started: Arc<Notify>,
        calls: StdMutex<Vec<&'static str>>,
        bearer: BearerToken,
    }

    impl FakeApi {
        fn queue(slot: &StdMutex<VecDeque<Reply>>, reply: Reply) {
            slot.lock().expect("queue").push_back(reply);
        }

        fn reply(
            &self,
            name: &'static str,
            slot: &StdMutex<VecDeque<Reply>>,
        ) -> Result<ApiEnvelope, ApiError> {
            self.calls.lock().expect("calls").push(name);
            match slot.lock().expect("queue").pop_front() {
                Some(Ok(body)) => Ok(ApiEnvelope::from_value(body)),
                Some(Err(status)) if status == 401 => Err(ApiError::Unauthorized {
                    message: "Token expired".to_string(),
                }),
                Some(Err(status)) => Err(ApiError::Status {
                    status,
                    message: "Server error".to_string(),
                }),
                None => Err(ApiError::Status {
                    status: 503,
                    message: "unscripted".to_string(),
                }),
            }
        }

        fn calls(&self, name: &str) -> usize {
            self.calls
                .lock()
                .expect("calls")
                .iter()
                .filter(|call| **call == name)
                .count()
        }
    }

    #[async_trait]
    impl AuthApi for FakeApi {
        async fn send_otp(&self, _email: &str) -> Result<ApiEnvelope, ApiError> {
            self.reply("send_otp", &self.send_otp)
        }

        async fn verify_otp(&self, _email: &str, _otp: &str) -> Result<ApiEnvelope, ApiError> {
            self.reply("verify_otp", &self.verify)
        }

        async fn logout(&self) -> Result<ApiEnvelope, ApiError> {
            assert!(self.bearer.is_set(), "logout must carry the bearer token");
            self.reply("logout", &self.logout)
        }
    }

    #[async_trait]
    impl UserApi for FakeApi {
        async fn get_profile(&self) -> Result<ApiEnvelope, ApiError> {
            if let Some(gate) = &self.profile_gate {
                gate.notified().await;
            }
            self.reply("get_profile", &self.profile)
        }

        async fn update_profile(&self, _update: &ProfileUpdate) -> Result<ApiEnvelope, ApiError> {
            self.reply("update_profile", &self.update)
        }

        async fn upload_resume(&self, upload: ResumeUpload) -> Result<ApiEnvelope, ApiError> {
            assert_eq!(upload.mime_type, "application/pdf");
            self.reply("upload_resume", &self.upload)
        }

        async fn resume_status(&self) -> Result<ApiEnvelope, ApiError> {
            self.resume_started.notify_one();
            if let Some(gate) = &self.resume_gate {
                gate.notified().await;
            }
            self.reply("resume_status", &self.resume)
        }
    }

    struct Harness {
        api: Arc<FakeApi>,
        store: Arc<MemorySessionStore>,
        controller: AuthController,
    }

    fn harness(api: FakeApi, stored: Session) -> Harness {
        let bearer = api.bearer.clone();
        let api = Arc::new(api);
        let store = Arc::new(MemorySessionStore::with_session(stored));
        let controller = AuthController::new(api.clone(), store.clone(), bearer);
        Harness {
            api,
            store,
            controller,
        }
    }

    fn cached(token: &str, user: Value) -> Session {
        Session {
            token: Some(token.to_string()),
            user: Some(serde_json::from_value(user).expect("user")),
        }
    }

    async fn signed_in(api: FakeApi) -> Harness {
        FakeApi::queue(&api.verify, Ok(json!({"data": {"token": "abc"}})));
        let h = harness(api, Session::default());
        assert_eq!(h.controller.initialize().await, SessionPhase::Anonymous);
        assert!(h.controller.login("a@b.com", "123456").await.success);
        h.controller.settle().await;
        h
    }

    #[tokio::test]
    async fn initialize_without_token_is_anonymous_and_offline() {
        let h = harness(FakeApi::default(), Session::default());
        assert_eq!(h.controller.initialize().await, SessionPhase::Anonymous);
        let snapshot = h.controller.snapshot();
        assert!(!snapshot.loading);
        assert_eq!(h.api.calls("get_profile"), 0);
    }

    #[tokio::test]
    async fn initialize_replaces_cache_with_server_profile() {
        let api = FakeApi::default();
        FakeApi::queue(
            &api.profile,
            Ok(json!({"code": "1", "data": {"email": "a@b.com", "name": "Ada", "hasResume": true}})),
        );
        let h = harness(api, cached("tok", json!({"email": "a@b.com"})));

        assert_eq!(h.controller.initialize().await, SessionPhase::Authenticated);
        let user = h.controller.current_user().expect("user");
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert!(h.controller.check_resume_status_sync());
        assert_eq!(h.store.current().user, Some(user));
        assert_eq!(h.api.bearer.get().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn initialize_fails_open_with_cached_user() {
        let api = FakeApi::default();
        FakeApi::queue(&api.profile, Err(401));
        let stored = cached("tok", json!({"email": "a@b.com", "resumeStatus": "uploaded"}));
        let h = harness(api, stored.clone());

        assert_eq!(h.controller.initialize().await, SessionPhase::Authenticated);
        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.session, stored);
        assert!(!snapshot.loading);
        assert_eq!(h.store.current(), stored);
    }

    #[tokio::test]
    async fn initialize_clears_token_without_cached_user() {
        let api = FakeApi::default();
        FakeApi::queue(&api.profile, Err(500));
        let h = harness(
            api,
            Session {
                token: Some("tok".to_string()),
                user: None,
            },
        );

        assert_eq!(h.controller.initialize().await, SessionPhase::Anonymous);
        assert_eq!(h.store.current(), Session::default());
        assert!(!h.api.bearer.is_set());
    }

    #[tokio::test]
    async fn initialize_keeps_token_on_bare_success_reply() {
        let api = FakeApi::default();
        FakeApi::queue(&api.profile, Ok(json!({"code": "1", "message": "Profile fetched"})));
        let h = harness(
            api,
            Session {
                token: Some("tok".to_string()),
                user: None,
            },
        );

        assert_eq!(h.controller.initialize().await, SessionPhase::Authenticated);
        assert_eq!(h.store.current().token.as_deref(), Some("tok"));
        assert_eq!(h.controller.current_user(), None);
        assert!(h.api.bearer.is_set());
    }

    #[tokio::test]
    async fn profile_without_email_keeps_cached_address() {
        let api = FakeApi::default();
        FakeApi::queue(&api.profile, Ok(json!({"code": "1", "name": "Ada"})));
        let h = harness(api, cached("tok", json!({"email": "a@b.com"})));

        assert_eq!(h.controller.initialize().await, SessionPhase::Authenticated);
        let user = h.controller.current_user().expect("user");
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn initialize_publishes_cached_user_before_validation() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            profile_gate: Some(gate.clone()),
            ..FakeApi::default()
        };
        FakeApi::queue(&api.profile, Ok(json!({"code": "1", "data": {"email": "a@b.com"}})));
        let h = harness(api, cached("tok", json!({"email": "a@b.com"})));
        let mut updates = h.controller.subscribe();

        let controller = h.controller.clone();
        let task = tokio::spawn(async move { controller.initialize().await });

        updates.changed().await.expect("optimistic publish");
        let optimistic = updates.borrow_and_update().clone();
        assert_eq!(optimistic.phase, SessionPhase::Authenticated);
        assert!(optimistic.loading);
        assert_eq!(optimistic.user().map(|user| user.email.as_str()), Some("a@b.com"));

        gate.notify_one();
        assert_eq!(task.await.expect("join"), SessionPhase::Authenticated);
        assert!(!h.controller.snapshot().loading);
    }

    #[tokio::test]
    async fn send_otp_accepts_status_success() {
        let api = FakeApi::default();
        FakeApi::queue(&api.send_otp, Ok(json!({"status": "success"})));
        FakeApi::queue(&api.send_otp, Ok(json!({"code": "0", "message": "OTP sent successfully"})));
        let h = harness(api, Session::default());

        let first = h.controller.send_otp("a@b.com").await;
        assert!(first.success);

        let second = h.controller.send_otp("a@b.com").await;
        assert!(!second.success);
        assert_eq!(second.message(), "OTP sent successfully");
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_backend() {
        let h = harness(FakeApi::default(), Session::default());
        h.controller.initialize().await;

        assert!(!h.controller.send_otp("not-an-email").await.success);
        assert!(!h.controller.login("a@b.com", "12345").await.success);
        assert_eq!(h.api.calls("send_otp"), 0);
        assert_eq!(h.api.calls("verify_otp"), 0);
    }

    #[tokio::test]
    async fn login_stores_token_and_minimal_user() {
        let h = signed_in(FakeApi::default()).await;

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Authenticated);
        assert_eq!(snapshot.session.token.as_deref(), Some("abc"));
        let user = snapshot.user().expect("user");
        assert_eq!(user.email, "a@b.com");
        assert!(user.authenticated);
        assert!(!snapshot.has_resume());
        assert_eq!(h.store.current(), snapshot.session);
        assert_eq!(h.api.calls("get_profile"), 0);
        assert_eq!(h.api.calls("resume_status"), 1);
    }

    #[tokio::test]
    async fn login_without_token_reports_server_message() {
        let api = FakeApi::default();
        FakeApi::queue(&api.verify, Ok(json!({"code": "0", "message": "Invalid OTP"})));
        let h = harness(api, Session::default());
        h.controller.initialize().await;

        let result = h.controller.login("a@b.com", "123456").await;
        assert_eq!(result, OpResult::fail("Invalid OTP"));
        assert_eq!(h.controller.snapshot().phase, SessionPhase::Anonymous);
    }

    #[tokio::test]
    async fn login_enrichment_opens_gate_when_backend_confirms() {
        let api = FakeApi::default();
        FakeApi::queue(&api.resume, Ok(json!({"code": "1", "data": {"hasResume": true}})));
        let h = signed_in(api).await;

        assert!(h.controller.check_resume_status_sync());
        assert!(h.store.current().user.expect("user").has_resume);
    }

    #[tokio::test]
    async fn login_is_refused_while_signed_in() {
        let h = signed_in(FakeApi::default()).await;
        let again = h.controller.login("a@b.com", "123456").await;
        assert!(!again.success);
        assert_eq!(h.api.calls("verify_otp"), 1);
    }

    #[tokio::test]
    async fn logout_clears_even_when_backend_fails() {
        let api = FakeApi::default();
        FakeApi::queue(&api.logout, Err(500));
        let h = signed_in(api).await;

        let result = h.controller.logout().await;
        assert!(result.success);
        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert_eq!(snapshot.session, Session::default());
        assert_eq!(h.store.current(), Session::default());
        assert!(!h.api.bearer.is_set());
        assert_eq!(h.api.calls("logout"), 1);
    }

    #[tokio::test]
    async fn logout_before_initialize_only_clears_the_store() {
        let h = harness(FakeApi::default(), cached("tok", json!({"email": "a@b.com"})));
        assert!(h.controller.logout().await.success);
        assert_eq!(h.controller.snapshot().phase, SessionPhase::Uninitialized);
        assert_eq!(h.store.current(), Session::default());
        assert_eq!(h.api.calls("logout"), 0);
    }

    #[tokio::test]
    async fn true_gate_skips_the_network() {
        let api = FakeApi::default();
        FakeApi::queue(&api.profile, Err(503));
        let h = harness(api, cached("tok", json!({"email": "a@b.com", "resumeUploaded": true})));
        h.controller.initialize().await;

        assert!(h.controller.check_resume_status().await);
        assert_eq!(h.api.calls("resume_status"), 0);
    }

    #[tokio::test]
    async fn resume_check_never_downgrades() {
        let api = FakeApi::default();
        FakeApi::queue(&api.resume, Ok(json!({"hasResume": true})));
        FakeApi::queue(&api.resume, Ok(json!({"hasResume": false})));
        let h = signed_in(api).await;

        assert!(h.controller.check_resume_status_sync());
        assert!(h.controller.check_resume_status().await);
        assert!(h.controller.check_resume_status_sync());
        assert_eq!(h.api.calls("resume_status"), 1);
    }

    #[tokio::test]
    async fn failed_resume_check_falls_back_to_local_gate() {
        let api = FakeApi::default();
        FakeApi::queue(&api.resume, Ok(json!({"code": "1", "data": {"hasResume": false}})));
        FakeApi::queue(&api.resume, Err(500));
        let h = signed_in(api).await;

        assert!(!h.controller.check_resume_status().await);
        assert_eq!(h.api.calls("resume_status"), 2);
        assert!(h.controller.is_authenticated());
    }

    #[tokio::test]
    async fn resume_confirmation_never_invents_a_user() {
        let api = FakeApi::default();
        FakeApi::queue(&api.profile, Ok(json!({"code": "1", "message": "Profile fetched"})));
        FakeApi::queue(&api.resume, Ok(json!({"hasResume": true})));
        FakeApi::queue(&api.upload, Ok(json!({"code": "1"})));
        let h = harness(
            api,
            Session {
                token: Some("tok".to_string()),
                user: None,
            },
        );
        assert_eq!(h.controller.initialize().await, SessionPhase::Authenticated);

        assert!(h.controller.check_resume_status().await);
        assert_eq!(h.store.current().user, None);

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cv.pdf");
        std::fs::write(&path, b"%PDF").expect("write");
        assert!(h.controller.upload_resume(&path).await.success);
        assert_eq!(h.store.current().user, None);
        assert_eq!(h.controller.current_user(), None);
    }

    #[tokio::test]
    async fn bare_success_code_does_not_open_the_gate() {
        let api = FakeApi::default();
        FakeApi::queue(&api.resume, Ok(json!({"code": "1"})));
        let h = signed_in(api).await;
        assert!(!h.controller.check_resume_status_sync());
    }

    #[tokio::test]
    async fn upload_opens_gate_without_another_check() {
        let api = FakeApi::default();
        FakeApi::queue(&api.upload, Ok(json!({"code": "1", "message": "stored"})));
        let h = signed_in(api).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cv.pdf");
        std::fs::write(&path, b"%PDF").expect("write");

        let result = h.controller.upload_resume(&path).await;
        assert!(result.success, "{result:?}");
        assert!(h.controller.check_resume_status().await);
        assert_eq!(h.api.calls("resume_status"), 1);

        let stored = h.store.current().user.expect("user");
        assert!(stored.has_resume && stored.resume_uploaded);
    }

    #[tokio::test]
    async fn upload_rejects_bad_files_locally() {
        let h = signed_in(FakeApi::default()).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cv.png");
        std::fs::write(&path, b"png").expect("write");

        assert!(!h.controller.upload_resume(&path).await.success);
        assert_eq!(h.api.calls("upload_resume"), 0);
    }

    #[tokio::test]
    async fn stale_resume_check_does_not_reinstate_session() {
        let gate = Arc::new(Notify::new());
        let api = FakeApi {
            resume_gate: Some(gate.clone()),
            ..FakeApi::default()
        };
        FakeApi::queue(&api.verify, Ok(json!({"data": {"token": "abc"}})));
        FakeApi::queue(&api.resume, Ok(json!({"hasResume": true})));
        let h = harness(api, Session::default());
        h.controller.initialize().await;
        assert!(h.controller.login("a@b.com", "123456").await.success);

        h.api.resume_started.notified().await;
        assert!(h.controller.logout().await.success);
        gate.notify_one();
        h.controller.settle().await;

        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.phase, SessionPhase::Anonymous);
        assert_eq!(snapshot.session, Session::default());
        assert_eq!(h.store.current(), Session::default());
    }

    #[tokio::test]
    async fn refresh_failure_keeps_session() {
        let api = FakeApi::default();
        FakeApi::queue(&api.profile, Err(500));
        let h = signed_in(api).await;

        let result = h.controller.refresh_profile().await;
        assert_eq!(result, OpResult::fail("Server error"));
        assert!(h.controller.is_authenticated());
        assert_eq!(h.controller.bearer_token().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn update_profile_refetches_and_persists() {
        let api = FakeApi::default();
        FakeApi::queue(&api.update, Ok(json!({"code": "1"})));
        FakeApi::queue(&api.profile, Ok(json!({"data": {"email": "a@b.com", "name": "New"}})));
        let h = signed_in(api).await;

        let update = ProfileUpdate {
            name: Some("New".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(h.controller.update_profile(update).await.success);
        assert_eq!(
            h.store.current().user.and_then(|user| user.name).as_deref(),
            Some("New")
        );
        assert!(!h.controller.update_profile(ProfileUpdate::default()).await.success);
    }
}
