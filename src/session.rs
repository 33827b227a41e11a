//! Local session state.
//!
//! The credential itself belongs to the server.  What lives here is what the client is allowed
//! to know about it: an optional bearer token handed out by the login or refresh endpoints, the
//! cached profile of the signed-in user, and a status that UI code can watch in order to send
//! the user back to the login view once the session cannot be recovered.

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::types::UserResponse;

/// Where the local session stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nobody has signed in, or the user signed out.
    Anonymous,
    /// The server has accepted a login or returned the current user.
    Authenticated,
    /// A token refresh failed; local session data has been cleared.
    ///
    /// Also reached from [`SessionStatus::Anonymous`] when an anonymous request is rejected and
    /// the refresh fails, so it does not imply that anyone was ever signed in.
    Expired,
}

#[derive(Debug, Default)]
struct SessionData {
    access_token: Option<String>,
    user: Option<UserResponse>,
}

/// Shared, cheaply-locked session state.
#[derive(Debug)]
pub struct SessionStore {
    data: Mutex<SessionData>,
    status: watch::Sender<SessionStatus>,
}

impl SessionStore {
    /// An empty, anonymous session.
    pub fn new() -> Self {
        let (status, _) = watch::channel(SessionStatus::Anonymous);
        Self {
            data: Mutex::new(SessionData::default()),
            status,
        }
    }

    /// The bearer token to attach to outbound requests, if the server issued one.
    pub fn access_token(&self) -> Option<String> {
        self.data.lock().access_token.clone()
    }

    /// Remember the bearer token returned by a login or refresh.
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.data.lock().access_token = Some(token.into());
    }

    /// The cached profile of the signed-in user.
    pub fn current_user(&self) -> Option<UserResponse> {
        self.data.lock().user.clone()
    }

    /// Cache the signed-in user's profile and mark the session authenticated.
    pub fn set_current_user(&self, user: UserResponse) {
        self.data.lock().user = Some(user);
        self.set_status(SessionStatus::Authenticated);
    }

    /// Drop the cached user without touching the credential.
    pub fn forget_user(&self) {
        self.data.lock().user = None;
    }

    /// True when the server has accepted this session and it has not been cleared since.
    pub fn is_authenticated(&self) -> bool {
        self.status() == SessionStatus::Authenticated
    }

    /// The current status.
    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Mark the session authenticated.
    pub fn mark_authenticated(&self) {
        self.set_status(SessionStatus::Authenticated);
    }

    /// Clear everything after the server refused to renew the session.
    pub fn expire(&self) {
        self.wipe();
        self.set_status(SessionStatus::Expired);
    }

    /// Clear everything after the user signed out.
    pub fn clear(&self) {
        self.wipe();
        self.set_status(SessionStatus::Anonymous);
    }

    fn wipe(&self) {
        let mut data = self.data.lock();
        data.access_token = None;
        data.user = None;
    }

    fn set_status(&self, status: SessionStatus) {
        self.status.send_replace(status);
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jan() -> UserResponse {
        UserResponse {
            user_id: Some("u-1".to_string()),
            email: "jan@example.com".to_string(),
            name: Some("Jan Kowalski".to_string()),
            role: Some("USER".to_string()),
            rating_count: 3,
            average_rating: 4.5,
        }
    }

    #[test]
    fn starts_anonymous() {
        let store = SessionStore::new();
        assert_eq!(store.status(), SessionStatus::Anonymous);
        assert!(store.access_token().is_none());
        assert!(store.current_user().is_none());
    }

    #[test]
    fn expire_clears_data() {
        let store = SessionStore::new();
        store.set_access_token("abc");
        store.set_current_user(jan());
        assert!(store.is_authenticated());

        store.expire();
        assert_eq!(store.status(), SessionStatus::Expired);
        assert!(store.access_token().is_none());
        assert!(store.current_user().is_none());
    }

    #[tokio::test]
    async fn subscribers_see_expiry() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();
        store.mark_authenticated();
        store.expire();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SessionStatus::Expired);
    }

    #[test]
    fn clear_returns_to_anonymous() {
        let store = SessionStore::new();
        store.set_current_user(jan());
        store.clear();
        assert_eq!(store.status(), SessionStatus::Anonymous);
    }
}
