use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::SessionPolicy;
use crate::error::{Error, Result};
use crate::observability::{
    CLIENT_AUTH_FAILURES, CLIENT_REPLAY_REJECTIONS, CLIENT_REPLAYS, CLIENT_REQUEST_DURATION,
    CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS, REFRESH_CALLS, REFRESH_DURATION, REFRESH_FAILURES,
};
use crate::refresh::{Admission, RefreshCoordinator};
use crate::request::{ApiRequest, ApiResponse};
use crate::session::SessionStore;
use crate::transport::Transport;
use crate::types::TokenResponse;

/// An HTTP client that keeps the session alive.
///
/// Every request carries the session credential.  When the server rejects a request for
/// authentication, the client renews the session through the refresh endpoint and sends the
/// request once more.  Concurrent rejections share a single refresh: the first rejected request
/// performs it, the others wait and are replayed after it settles.
///
/// Cloning is cheap; clones share the transport, the session and the refresh state.
///
/// ```
/// use classifieds::testing::ScriptedTransport;
/// use classifieds::{SessionClient, SessionPolicy, UserResponse};
///
/// # tokio_test::block_on(async {
/// let transport = ScriptedTransport::new();
/// transport.respond_sequence(
///     "GET",
///     "/users/me",
///     &[(401, ""), (200, r#"{"email":"jan@example.com"}"#)],
/// );
/// transport.respond("POST", "/auth/refreshToken", 200, "");
///
/// let client = SessionClient::new(transport.clone(), SessionPolicy::default());
/// let user: UserResponse = client.get_json("/users/me").await?;
/// assert_eq!(user.email, "jan@example.com");
/// assert_eq!(transport.calls("/auth/refreshToken"), 1);
/// # Ok::<(), classifieds::Error>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    refresh: Arc<RefreshCoordinator>,
    policy: SessionPolicy,
}

impl SessionClient {
    /// Create a client with its own, empty session.
    pub fn new(transport: Arc<dyn Transport>, policy: SessionPolicy) -> Self {
        Self::with_session(transport, policy, Arc::new(SessionStore::new()))
    }

    /// Create a client over an existing session store.
    pub fn with_session(
        transport: Arc<dyn Transport>,
        policy: SessionPolicy,
        session: Arc<SessionStore>,
    ) -> Self {
        Self {
            transport,
            session,
            refresh: Arc::new(RefreshCoordinator::new()),
            policy,
        }
    }

    /// The session this client maintains.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// The refresh state, for inspection.
    pub fn refresh_state(&self) -> &RefreshCoordinator {
        &self.refresh
    }

    /// The policy in effect.
    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Forget the session and release anything waiting on a refresh.
    pub fn reset(&self) {
        let released = self.refresh.reset();
        if released > 0 {
            tracing::debug!(released, "released requests parked behind a token refresh");
        }
        self.session.clear();
    }

    /// Send a request, recovering from an expired session at most once.
    ///
    /// Returns the response for 2xx statuses and the matching [`Error`] otherwise.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let response = self.dispatch(&request).await?;
        if request.is_exempt() || !self.policy.is_auth_failure(response.status) {
            return Self::into_result(response);
        }
        CLIENT_AUTH_FAILURES.click();
        if request.is_retried() {
            return Err(Error::from_response(&response));
        }
        request.mark_retried();

        match self.refresh.admit() {
            Admission::Follower(waiter) => {
                tracing::debug!(path = %request.path, "waiting for in-flight token refresh");
                match waiter.await {
                    Ok(Ok(())) => self.replay(request).await,
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(Error::abort(
                        "token refresh was abandoned before it completed",
                    )),
                }
            }
            Admission::Leader(guard) => {
                tracing::debug!(path = %request.path, "session rejected; refreshing token");
                let (outcome, token) = match self.refresh_session().await {
                    Ok(token) => (Ok(()), token),
                    Err(err) => (Err(err), None),
                };
                let committed = guard.settle_with(&outcome, || {
                    if let Some(token) = token {
                        self.session.set_access_token(token);
                    }
                });
                let Some(woken) = committed else {
                    tracing::debug!(path = %request.path, "session was reset during token refresh");
                    return Err(Error::abort(
                        "session was reset while waiting for token refresh",
                    ));
                };
                match outcome {
                    Ok(()) => {
                        tracing::debug!(replaying = woken + 1, "token refresh succeeded");
                        self.replay(request).await
                    }
                    Err(err) => {
                        tracing::warn!(rejected = woken + 1, error = %err, "token refresh failed");
                        self.session.expire();
                        Err(err)
                    }
                }
            }
        }
    }

    /// Send a request and decode the JSON body of the response.
    pub async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.send(request).await?.json()
    }

    /// Send a request and discard the body of the response.
    pub async fn send_empty(&self, request: ApiRequest) -> Result<()> {
        self.send(request).await.map(|_| ())
    }

    /// `GET path` and decode the JSON response.
    pub async fn get_json<T: DeserializeOwned>(&self, path: impl Into<String>) -> Result<T> {
        self.send_json(ApiRequest::get(path)).await
    }

    /// `POST path` with a JSON body and decode the JSON response.
    pub async fn post_json<B, T>(&self, path: impl Into<String>, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(ApiRequest::post(path).with_json(body)?).await
    }

    /// Remember any bearer token in a login response body.
    pub(crate) fn absorb_token(&self, response: &ApiResponse) {
        if let Some(token) = Self::token_in(response) {
            self.session.set_access_token(token);
        }
    }

    fn token_in(response: &ApiResponse) -> Option<String> {
        if response.body.is_empty() {
            return None;
        }
        response.json::<TokenResponse>().ok()?.token
    }

    /// Renew the session and return any new bearer token.  Goes straight to the transport so
    /// that it is never intercepted.
    async fn refresh_session(&self) -> Result<Option<String>> {
        REFRESH_CALLS.click();
        let start = Instant::now();
        let request = ApiRequest::post(self.policy.refresh_path.clone()).exempt_from_refresh();
        let result = match self.dispatch(&request).await {
            Ok(response) if response.is_success() => Ok(Self::token_in(&response)),
            Ok(response) => Err(Error::from_response(&response)),
            Err(err) => Err(err),
        };
        REFRESH_DURATION.add(start.elapsed().as_secs_f64());
        if result.is_err() {
            REFRESH_FAILURES.click();
        }
        result
    }

    /// Re-issue a request after a successful refresh.  A second rejection is final.
    async fn replay(&self, request: ApiRequest) -> Result<ApiResponse> {
        CLIENT_REPLAYS.click();
        let response = self.dispatch(&request).await?;
        if self.policy.is_auth_failure(response.status) {
            CLIENT_REPLAY_REJECTIONS.click();
            tracing::warn!(
                path = %request.path,
                status = response.status,
                "request rejected again after token refresh"
            );
            if self.policy.expire_on_replay_rejection {
                self.session.expire();
            }
            return Err(Error::from_response(&response));
        }
        Self::into_result(response)
    }

    /// Attach the credential and hand the request to the transport.
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse> {
        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = match self.session.access_token() {
            Some(token) => {
                let outbound = request
                    .clone()
                    .with_header("authorization", &format!("Bearer {token}"))?;
                self.transport.execute(&outbound).await
            }
            None => self.transport.execute(request).await,
        };
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());
        if result.is_err() {
            CLIENT_REQUEST_ERRORS.click();
        }
        result
    }

    fn into_result(response: ApiResponse) -> Result<ApiResponse> {
        if response.is_success() {
            Ok(response)
        } else {
            CLIENT_REQUEST_ERRORS.click();
            Err(Error::from_response(&response))
        }
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("session", &self.session.status())
            .field("refreshing", &self.refresh.is_refreshing())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStatus;
    use crate::testing::ScriptedTransport;
    use serde_json::json;

    fn client(transport: &Arc<ScriptedTransport>) -> SessionClient {
        SessionClient::new(transport.clone(), SessionPolicy::default())
    }

    #[tokio::test]
    async fn passes_through_success() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/categories", 200, r#"{"categories":[]}"#);
        let client = client(&transport);
        let value: serde_json::Value = client.get_json("/categories").await.unwrap();
        assert_eq!(value, json!({"categories": []}));
        assert_eq!(transport.calls("/auth/refreshToken"), 0);
    }

    #[tokio::test]
    async fn non_auth_errors_are_not_retried() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/advertisements/get/9", 404, r#"{"message":"no such ad"}"#);
        transport.respond("POST", "/advertisements/new", 500, "boom");
        let client = client(&transport);

        let err = client
            .send(ApiRequest::get("/advertisements/get/9"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let err = client
            .send(ApiRequest::post("/advertisements/new"))
            .await
            .unwrap_err();
        assert!(err.is_server_error());
        assert_eq!(transport.calls("/advertisements/get/9"), 1);
        assert_eq!(transport.calls("/advertisements/new"), 1);
        assert_eq!(transport.calls("/auth/refreshToken"), 0);
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let transport = ScriptedTransport::new();
        transport.fail("GET", "/users/me", Error::connection("refused", None));
        let err = client(&transport)
            .send(ApiRequest::get("/users/me"))
            .await
            .unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn refreshes_once_and_replays() {
        let transport = ScriptedTransport::new();
        transport.respond_sequence("GET", "/favorite/me", &[(401, ""), (200, "[]")]);
        transport.respond("POST", "/auth/refreshToken", 200, "");
        let client = client(&transport);

        let favorites: Vec<serde_json::Value> = client.get_json("/favorite/me").await.unwrap();
        assert!(favorites.is_empty());
        assert_eq!(transport.calls("/favorite/me"), 2);
        assert_eq!(transport.calls("/auth/refreshToken"), 1);
        assert!(!client.refresh_state().is_refreshing());
    }

    #[tokio::test]
    async fn forbidden_also_triggers_refresh() {
        let transport = ScriptedTransport::new();
        transport.respond_sequence("GET", "/users/me", &[(403, ""), (200, r#"{"email":"jan@example.com"}"#)]);
        transport.respond("POST", "/auth/refreshToken", 200, "");
        let user: crate::types::UserResponse = client(&transport).get_json("/users/me").await.unwrap();
        assert_eq!(user.email, "jan@example.com");
        assert_eq!(transport.calls("/auth/refreshToken"), 1);
    }

    #[tokio::test]
    async fn stores_refreshed_bearer_token() {
        let transport = ScriptedTransport::new();
        transport.respond_sequence("GET", "/users/me", &[(401, ""), (200, r#"{"email":"jan@example.com"}"#)]);
        transport.respond("POST", "/auth/refreshToken", 200, r#"{"token":"fresh"}"#);
        let client = client(&transport);
        client.session().set_access_token("stale");

        client.send(ApiRequest::get("/users/me")).await.unwrap();
        let seen = transport.requests("/users/me");
        assert_eq!(seen[0].header("authorization").as_deref(), Some("Bearer stale"));
        assert_eq!(seen[1].header("authorization").as_deref(), Some("Bearer fresh"));
        // The refresh call itself carries the old credential.
        let refresh = transport.requests("/auth/refreshToken");
        assert_eq!(refresh[0].header("authorization").as_deref(), Some("Bearer stale"));
    }

    #[tokio::test]
    async fn replay_rejection_is_terminal() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/chats/summary", 401, r#"{"message":"still expired"}"#);
        transport.respond("POST", "/auth/refreshToken", 200, "");
        let client = client(&transport);
        client.session().mark_authenticated();

        let err = client
            .send(ApiRequest::get("/chats/summary"))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(transport.calls("/chats/summary"), 2);
        assert_eq!(transport.calls("/auth/refreshToken"), 1);
        assert_eq!(client.session().status(), SessionStatus::Expired);
    }

    #[tokio::test]
    async fn replay_rejection_can_keep_session() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/chats/summary", 403, "");
        transport.respond("POST", "/auth/refreshToken", 200, "");
        let policy = SessionPolicy {
            expire_on_replay_rejection: false,
            ..SessionPolicy::default()
        };
        let client = SessionClient::new(transport.clone(), policy);
        client.session().mark_authenticated();

        let err = client
            .send(ApiRequest::get("/chats/summary"))
            .await
            .unwrap_err();
        assert!(err.is_permission());
        assert_eq!(client.session().status(), SessionStatus::Authenticated);
    }

    #[tokio::test]
    async fn refresh_failure_expires_session() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/favorite/me", 401, "");
        transport.respond("POST", "/auth/refreshToken", 401, r#"{"message":"refresh token expired"}"#);
        let client = client(&transport);
        client.session().set_access_token("stale");
        client.session().mark_authenticated();

        let err = client
            .send(ApiRequest::get("/favorite/me"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Authentication error: refresh token expired");
        assert_eq!(transport.calls("/favorite/me"), 1);
        assert_eq!(client.session().status(), SessionStatus::Expired);
        assert!(client.session().access_token().is_none());
        assert!(!client.refresh_state().is_refreshing());
    }

    #[tokio::test]
    async fn anonymous_rejection_with_failed_refresh_expires() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/favorite/me", 401, "");
        transport.respond("POST", "/auth/refreshToken", 401, "");
        let client = client(&transport);
        assert_eq!(client.session().status(), SessionStatus::Anonymous);

        let err = client
            .send(ApiRequest::get("/favorite/me"))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(client.session().status(), SessionStatus::Expired);
    }

    #[tokio::test]
    async fn refresh_transport_failure_is_reported() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/favorite/me", 401, "");
        transport.fail("POST", "/auth/refreshToken", Error::timeout("slow", Some(30.0)));
        let err = client(&transport)
            .send(ApiRequest::get("/favorite/me"))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn exempt_requests_are_not_intercepted() {
        let transport = ScriptedTransport::new();
        transport.respond("POST", "/auth/login", 401, r#"{"message":"bad credentials"}"#);
        let err = client(&transport)
            .send(ApiRequest::post("/auth/login").exempt_from_refresh())
            .await
            .unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(transport.calls("/auth/refreshToken"), 0);
    }

    #[tokio::test]
    async fn statuses_outside_policy_are_plain_errors() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/users/me", 403, "");
        let policy = SessionPolicy {
            auth_failure_statuses: vec![401],
            ..SessionPolicy::default()
        };
        let client = SessionClient::new(transport.clone(), policy);
        assert!(
            client
                .send(ApiRequest::get("/users/me"))
                .await
                .unwrap_err()
                .is_permission()
        );
        assert_eq!(transport.calls("/auth/refreshToken"), 0);
    }

    #[tokio::test]
    async fn reset_clears_session() {
        let transport = ScriptedTransport::new();
        let client = client(&transport);
        client.session().set_access_token("abc");
        client.session().mark_authenticated();
        client.reset();
        assert_eq!(client.session().status(), SessionStatus::Anonymous);
        assert!(client.session().access_token().is_none());
    }
}
