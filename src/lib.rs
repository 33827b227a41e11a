//! Session-aware client for the classifieds marketplace API.
//!
//! [`SessionClient`] is the core: it attaches the session credential to every request and,
//! when the server rejects the session, renews it with a single shared refresh call before
//! replaying the rejected requests.  [`Marketplace`] layers the marketplace endpoints on top.

// Public modules
pub mod client;
pub mod config;
pub mod error;
pub mod favorites;
pub mod marketplace;
pub mod observability;
pub mod refresh;
pub mod request;
pub mod session;
pub mod testing;
pub mod transport;
pub mod types;
pub mod utils;

// Re-exports
pub use client::SessionClient;
pub use config::{ClientArgs, ClientConfig, SessionPolicy};
pub use error::{Error, Result};
pub use favorites::{FavoriteSet, FavoriteToggle};
pub use marketplace::{ImageUpload, Marketplace};
pub use observability::register_biometrics;
pub use request::{ApiRequest, ApiResponse, FormPart, RequestBody};
pub use session::{SessionStatus, SessionStore};
pub use transport::{HttpTransport, Transport};
pub use types::*;
