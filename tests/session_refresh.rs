//! End-to-end behavior of session recovery against a scripted server.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bytes::Bytes;
    use futures::future::join_all;
    use serde_json::json;
    use tokio::time::Instant;

    use classifieds::testing::ScriptedTransport;
    use classifieds::{ApiRequest, RequestBody, SessionClient, SessionPolicy, SessionStatus};

    const REFRESH: &str = "/auth/refreshToken";

    /// A server that only accepts `Bearer fresh` and hands that token out on refresh.
    fn expired_session(refresh_delay: Duration) -> (Arc<ScriptedTransport>, SessionClient) {
        let transport = ScriptedTransport::new();
        transport.require_bearer("fresh", &[REFRESH]);
        transport.respond_after("POST", REFRESH, 200, r#"{"token":"fresh"}"#, refresh_delay);
        let client = SessionClient::new(transport.clone(), SessionPolicy::default());
        client.session().set_access_token("stale");
        client.session().mark_authenticated();
        (transport, client)
    }

    fn message(n: usize) -> ApiRequest {
        ApiRequest::post("/chats/messages")
            .with_json(&json!({"recipient": format!("user{n}@example.com"), "content": format!("wiadomość {n}")}))
            .unwrap()
    }

    fn body_of(request: &ApiRequest) -> Bytes {
        match &request.body {
            RequestBody::Json(bytes) => bytes.clone(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_rejected_calls_share_one_refresh() {
        let (transport, client) = expired_session(Duration::from_millis(50));
        transport.echo("POST", "/chats/messages");

        let first = message(1);
        let second = message(2);
        let (a, b) = tokio::join!(client.send(first.clone()), client.send(second.clone()));

        assert_eq!(a.unwrap().body, body_of(&first));
        assert_eq!(b.unwrap().body, body_of(&second));
        assert_eq!(transport.calls(REFRESH), 1);
        assert_eq!(transport.calls("/chats/messages"), 4);
        assert_eq!(client.session().status(), SessionStatus::Authenticated);
        assert!(!client.refresh_state().is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn many_rejected_calls_replay_after_refresh() {
        const N: usize = 8;
        let (transport, client) = expired_session(Duration::from_millis(50));
        transport.echo("POST", "/chats/messages");
        let start = Instant::now();

        let requests: Vec<ApiRequest> = (0..N).map(message).collect();
        let results = join_all(requests.iter().cloned().map(|r| client.send(r))).await;

        assert_eq!(transport.calls(REFRESH), 1);
        for (request, result) in requests.iter().zip(results) {
            assert_eq!(result.unwrap().body, body_of(request));
        }

        let seen = transport.requests("/chats/messages");
        assert_eq!(seen.len(), 2 * N);
        let (rejected, replayed): (Vec<_>, Vec<_>) = seen
            .iter()
            .partition(|r| r.header("authorization").as_deref() == Some("Bearer stale"));
        assert_eq!(rejected.len(), N);
        assert_eq!(replayed.len(), N);
        for replay in &replayed {
            assert_eq!(replay.header("authorization").as_deref(), Some("Bearer fresh"));
            assert!(replay.at >= start + Duration::from_millis(50));
        }
        // Each original body is replayed exactly once, byte for byte.
        for request in &requests {
            let body = body_of(request);
            let copies = replayed
                .iter()
                .filter(|r| r.json_body() == Some(&body))
                .count();
            assert_eq!(copies, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_rejects_everyone() {
        let transport = ScriptedTransport::new();
        transport.require_bearer("fresh", &[REFRESH]);
        transport.respond_after(
            "POST",
            REFRESH,
            401,
            r#"{"message":"refresh token expired"}"#,
            Duration::from_millis(50),
        );
        transport.echo("POST", "/chats/messages");
        let client = SessionClient::new(transport.clone(), SessionPolicy::default());
        client.session().set_access_token("stale");
        client.session().mark_authenticated();
        let mut status = client.session().subscribe();

        let (a, b) = tokio::join!(client.send(message(1)), client.send(message(2)));
        for result in [a, b] {
            let err = result.unwrap_err();
            assert!(err.is_authentication());
            assert_eq!(err.to_string(), "Authentication error: refresh token expired");
        }
        assert_eq!(transport.calls(REFRESH), 1);
        // No replays: only the two original attempts reached the server.
        assert_eq!(transport.calls("/chats/messages"), 2);
        assert_eq!(client.session().status(), SessionStatus::Expired);
        assert!(client.session().access_token().is_none());
        assert!(client.session().current_user().is_none());
        assert!(status.has_changed().unwrap());
        assert_eq!(*status.borrow_and_update(), SessionStatus::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn replayed_request_is_never_retried_twice() {
        let transport = ScriptedTransport::new();
        transport.respond("GET", "/favorite/me", 401, "");
        // Both rejections must land while the refresh is outstanding.
        transport.respond_after("POST", REFRESH, 200, "", Duration::from_millis(50));
        let client = SessionClient::new(transport.clone(), SessionPolicy::default());

        let (a, b) = tokio::join!(
            client.send(ApiRequest::get("/favorite/me")),
            client.send(ApiRequest::get("/favorite/me")),
        );
        assert!(a.unwrap_err().is_authentication());
        assert!(b.unwrap_err().is_authentication());
        assert_eq!(transport.calls("/favorite/me"), 4);
        assert_eq!(transport.calls(REFRESH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn later_expiry_triggers_a_new_refresh() {
        let (transport, client) = expired_session(Duration::from_millis(10));
        transport.respond("GET", "/users/me", 200, r#"{"email":"jan@example.com"}"#);

        client.send(ApiRequest::get("/users/me")).await.unwrap();
        assert_eq!(transport.calls(REFRESH), 1);

        // The server rotates its key; the fresh token is stale again.
        client.session().set_access_token("rotated-out");
        client.send(ApiRequest::get("/users/me")).await.unwrap();
        assert_eq!(transport.calls(REFRESH), 2);
    }

    #[tokio::test]
    async fn abandoned_refresh_releases_waiters() {
        let (transport, client) = expired_session(Duration::from_secs(3600));
        transport.respond("GET", "/users/me", 200, r#"{"email":"jan@example.com"}"#);

        let leader = {
            let client = client.clone();
            tokio::spawn(async move { client.send(ApiRequest::get("/users/me")).await })
        };
        while !client.refresh_state().is_refreshing() {
            tokio::task::yield_now().await;
        }
        let follower = {
            let client = client.clone();
            tokio::spawn(async move { client.send(ApiRequest::get("/users/me")).await })
        };
        while client.refresh_state().pending() == 0 {
            tokio::task::yield_now().await;
        }

        leader.abort();
        assert!(leader.await.unwrap_err().is_cancelled());
        let err = follower.await.unwrap().unwrap_err();
        assert!(err.is_abort());
        assert!(!client.refresh_state().is_refreshing());
        assert_eq!(transport.calls(REFRESH), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_during_refresh_rejects_waiters() {
        let (transport, client) = expired_session(Duration::from_millis(50));
        transport.respond("GET", "/users/me", 200, r#"{"email":"jan@example.com"}"#);

        let waiter = async {
            while !client.refresh_state().is_refreshing() {
                tokio::task::yield_now().await;
            }
            let follower = client.send(ApiRequest::get("/users/me"));
            let reset = async {
                while client.refresh_state().pending() == 0 {
                    tokio::task::yield_now().await;
                }
                client.reset();
            };
            tokio::join!(follower, reset).0
        };
        let (leader, follower) = tokio::join!(client.send(ApiRequest::get("/users/me")), waiter);

        assert!(follower.unwrap_err().is_abort());
        // The refreshed token must not outlive the reset.
        assert!(leader.unwrap_err().is_abort());
        assert!(client.session().access_token().is_none());
        assert_eq!(client.session().status(), SessionStatus::Anonymous);
        assert_eq!(transport.calls("/auth/refreshToken"), 1);
    }
}
