use std::fmt;

use serde::{Deserialize, Serialize};

/// Credentials for `POST /auth/login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl LoginRequest {
    /// Create a login request.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Account details for `POST /auth/signup`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Display name.
    pub name: String,
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body returned by login and refresh when the server hands out bearer tokens.
///
/// Cookie-based deployments return an empty body; every field is therefore optional.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Access token to send as `Authorization: Bearer`.
    #[serde(default)]
    pub token: Option<String>,
    /// Lifetime of the access token in milliseconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Long-lived refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The signed-in user as returned by `GET /users/me`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    /// Server-side user id.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Account email; doubles as the chat username.
    pub email: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Role, e.g. `USER` or `ADMIN`.
    #[serde(default)]
    pub role: Option<String>,
    /// Number of ratings received.
    #[serde(default)]
    pub rating_count: u32,
    /// Mean rating received.
    #[serde(default)]
    pub average_rating: f64,
}

/// Seller rating summary.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RatingStats {
    /// Mean rating.
    pub rating: f64,
    /// Number of ratings.
    pub count: u32,
}

/// The signed-in user in the shape UI code works with.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: Option<String>,
    pub email: String,
    pub name: Option<String>,
    pub role: Option<String>,
    pub is_admin: bool,
    pub stats: RatingStats,
}

impl From<UserResponse> for User {
    fn from(dto: UserResponse) -> Self {
        let is_admin = dto.role.as_deref() == Some("ADMIN");
        Self {
            id: dto.user_id,
            email: dto.email,
            name: dto.name,
            role: dto.role,
            is_admin,
            stats: RatingStats {
                rating: dto.average_rating,
                count: dto.rating_count,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_from_dto() {
        let dto: UserResponse = serde_json::from_str(
            r#"{"userId":"42","email":"admin@example.com","name":"Ala","role":"ADMIN","ratingCount":7,"averageRating":4.25}"#,
        )
        .unwrap();
        let user = User::from(dto);
        assert!(user.is_admin);
        assert_eq!(user.id.as_deref(), Some("42"));
        assert_eq!(user.stats, RatingStats { rating: 4.25, count: 7 });
    }

    #[test]
    fn sparse_user_dto() {
        let dto: UserResponse = serde_json::from_str(r#"{"email":"jan@example.com"}"#).unwrap();
        let user = User::from(dto);
        assert!(!user.is_admin);
        assert_eq!(user.stats.count, 0);
    }

    #[test]
    fn debug_hides_secrets() {
        let login = LoginRequest::new("jan@example.com", "hunter2");
        assert!(!format!("{login:?}").contains("hunter2"));
        let tokens = TokenResponse {
            token: Some("secret-token".to_string()),
            ..TokenResponse::default()
        };
        assert!(!format!("{tokens:?}").contains("secret-token"));
    }

    #[test]
    fn empty_token_body() {
        let tokens: TokenResponse = serde_json::from_str("{}").unwrap();
        assert!(tokens.token.is_none());
    }
}
