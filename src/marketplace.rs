//! Typed access to the marketplace API.

use std::sync::Arc;

use bytes::Bytes;

use crate::client::SessionClient;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::favorites::FavoriteSet;
use crate::observability::FAVORITE_ROLLBACKS;
use crate::request::{ApiRequest, FormPart};
use crate::session::SessionStore;
use crate::transport::{HttpTransport, Transport};
use crate::types::{
    AdSearchParams, Advertisement, Category, CategoryList, ChatSummary,
    CreateAdvertisementRequest, FavoriteAdvertisement, LoginRequest, Page, RegisterRequest,
    UserResponse,
};

/// An image attached to a new advertisement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageUpload {
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type, e.g. `image/jpeg`.
    pub content_type: String,
    /// Raw image bytes.
    pub data: Bytes,
}

impl ImageUpload {
    /// Describe one image to upload.
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// Client for the classifieds marketplace.
///
/// Authentication endpoints are called without session recovery; everything else goes through
/// the [`SessionClient`], which renews an expired session transparently.
#[derive(Clone, Debug)]
pub struct Marketplace {
    client: SessionClient,
}

impl Marketplace {
    /// Create a client for the API described by `config`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config.api_url, config.timeout())?;
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Create a client over any transport.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self {
            client: SessionClient::new(transport, config.session.clone()),
        }
    }

    /// The underlying session client, for endpoints not covered here.
    pub fn client(&self) -> &SessionClient {
        &self.client
    }

    /// The local session.
    pub fn session(&self) -> &Arc<SessionStore> {
        self.client.session()
    }

    ////////////////////////////////////////////// auth //////////////////////////////////////////////

    /// Sign in and return the signed-in user.
    ///
    /// The login only counts once the user has been fetched.  If that fetch fails, the local
    /// session is cleared again and the error returned.
    pub async fn login(&self, credentials: &LoginRequest) -> Result<UserResponse> {
        let request = ApiRequest::post("/auth/login")
            .with_json(credentials)?
            .exempt_from_refresh();
        let response = self.client.send(request).await?;
        self.client.absorb_token(&response);
        self.session().mark_authenticated();
        match self.current_user().await {
            Ok(user) => {
                tracing::debug!(email = %credentials.email, "signed in");
                Ok(user)
            }
            Err(err) => {
                tracing::warn!(email = %credentials.email, error = %err, "could not load user after login");
                self.session().clear();
                Err(err)
            }
        }
    }

    /// Create an account.  Does not sign in.
    pub async fn signup(&self, account: &RegisterRequest) -> Result<()> {
        let request = ApiRequest::post("/auth/signup")
            .with_json(account)?
            .exempt_from_refresh();
        self.client.send_empty(request).await
    }

    /// Sign out.
    ///
    /// The local session is cleared even if the server call fails; that failure is logged and
    /// otherwise ignored.
    pub async fn logout(&self) {
        let request = ApiRequest::post("/auth/logout").exempt_from_refresh();
        if let Err(err) = self.client.send_empty(request).await {
            tracing::warn!(error = %err, "server-side logout failed");
        }
        self.client.reset();
    }

    /// Fetch the signed-in user and cache it in the session.
    pub async fn current_user(&self) -> Result<UserResponse> {
        let user: UserResponse = self.client.get_json("/users/me").await?;
        self.session().set_current_user(user.clone());
        Ok(user)
    }

    /// Ask the server whether the session is still good.
    ///
    /// Returns the user if it is.  Any failure clears the cached user and yields `None`.
    pub async fn check_session(&self) -> Option<UserResponse> {
        match self.current_user().await {
            Ok(user) => Some(user),
            Err(err) => {
                tracing::debug!(error = %err, "no valid session");
                self.session().forget_user();
                None
            }
        }
    }

    ///////////////////////////////////////// advertisements /////////////////////////////////////////

    /// Search listings.  Returns the first page unless `params` asks for another.
    pub async fn search_advertisements(
        &self,
        params: &AdSearchParams,
    ) -> Result<Vec<Advertisement>> {
        Ok(self.search_advertisements_page(params).await?.content)
    }

    /// Search listings, keeping the pagination metadata.
    pub async fn search_advertisements_page(
        &self,
        params: &AdSearchParams,
    ) -> Result<Page<Advertisement>> {
        params.validate()?;
        let request = ApiRequest::get("/advertisements/search").with_query_pairs(params.to_query());
        self.client.send_json(request).await
    }

    /// Fetch one listing.
    pub async fn advertisement(&self, id: &str) -> Result<Advertisement> {
        let id = path_segment("advertisement id", id)?;
        self.client
            .get_json(format!("/advertisements/get/{id}"))
            .await
    }

    /// Publish a listing with its images.
    pub async fn create_advertisement(
        &self,
        advertisement: &CreateAdvertisementRequest,
        images: &[ImageUpload],
    ) -> Result<Advertisement> {
        advertisement.validate()?;
        let mut parts = vec![FormPart::json("advertisementDto", advertisement)?];
        parts.extend(images.iter().map(|image| {
            FormPart::file(
                "files",
                image.file_name.clone(),
                image.content_type.clone(),
                image.data.clone(),
            )
        }));
        let request = ApiRequest::post("/advertisements/new").with_multipart(parts);
        self.client.send_json(request).await
    }

    /////////////////////////////////////////// favorites ////////////////////////////////////////////

    /// The signed-in user's favorites.
    pub async fn favorites(&self) -> Result<Vec<FavoriteAdvertisement>> {
        self.client.get_json("/favorite/me").await
    }

    /// Mark a listing as favorite.
    pub async fn add_favorite(&self, id: &str) -> Result<()> {
        let id = path_segment("advertisement id", id)?;
        self.client
            .send_empty(ApiRequest::post(format!("/favorite/{id}")))
            .await
    }

    /// Remove a listing from favorites.
    pub async fn remove_favorite(&self, id: &str) -> Result<()> {
        let id = path_segment("advertisement id", id)?;
        self.client
            .send_empty(ApiRequest::delete(format!("/favorite/{id}")))
            .await
    }

    /// Reload `favorites` from the server.  Signed-out users have no favorites.
    pub async fn load_favorites(&self, favorites: &mut FavoriteSet) -> Result<()> {
        if !self.session().is_authenticated() {
            favorites.clear();
            return Ok(());
        }
        let remote = self.favorites().await?;
        favorites.replace(&remote);
        Ok(())
    }

    /// Flip a listing's favorite state, optimistically.
    ///
    /// `favorites` reflects the change before the server is asked.  If the server call fails,
    /// the change is rolled back and the error returned.  Returns true if the listing is now a
    /// favorite.
    pub async fn toggle_favorite(&self, favorites: &mut FavoriteSet, id: &str) -> Result<bool> {
        if !self.session().is_authenticated() {
            return Err(Error::authentication("sign in to manage favorites"));
        }
        path_segment("advertisement id", id)?;
        let toggle = favorites.toggle(id);
        let result = if toggle.added {
            self.add_favorite(id).await
        } else {
            self.remove_favorite(id).await
        };
        match result {
            Ok(()) => Ok(toggle.added),
            Err(err) => {
                FAVORITE_ROLLBACKS.click();
                tracing::debug!(id, error = %err, "favorite change rolled back");
                favorites.rollback(&toggle);
                Err(err)
            }
        }
    }

    //////////////////////////////////////// categories & chat ///////////////////////////////////////

    /// All listing categories.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        let list: CategoryList = self.client.get_json("/categories").await?;
        Ok(list.categories)
    }

    /// One summary per conversation of the signed-in user.
    pub async fn chat_summaries(&self) -> Result<Vec<ChatSummary>> {
        self.client.get_json("/chats/summary").await
    }
}

/// Check that `value` can be used as a single path segment.
fn path_segment<'a>(what: &str, value: &'a str) -> Result<&'a str> {
    if value.is_empty() || value.contains(['/', '?', '#']) {
        return Err(Error::validation(
            format!("{what} {value:?} is not a valid path segment"),
            Some(what.to_string()),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segments() {
        assert_eq!(path_segment("id", "a-1").unwrap(), "a-1");
        assert!(path_segment("id", "").is_err());
        assert!(path_segment("id", "../users").is_err());
        assert!(path_segment("id", "1?x=2").is_err());
    }
}
