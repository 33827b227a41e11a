//! The seam between the session client and the network.
//!
//! A [`Transport`] turns an [`ApiRequest`] into an [`ApiResponse`].  It reports every HTTP status
//! as a response; only failures that leave no response behind (refused connections, timeouts,
//! broken bodies) are errors.  This keeps status interpretation, and therefore session
//! recovery, in one place.

use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client as ReqwestClient, RequestBuilder};
use url::Url;

use crate::error::{Error, Result};
use crate::request::{ApiRequest, ApiResponse, RequestBody};

/// Executes requests against the remote API.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and read the full response.
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/////////////////////////////////////////// HttpTransport ///////////////////////////////////////////

/// A [`Transport`] backed by `reqwest`.
///
/// Session cookies set by the server are kept in the client's cookie store and sent back
/// automatically, so cookie-based sessions need no help from the caller.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the API rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .cookie_store(true)
            .default_headers(Self::default_headers())
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// The API root every request path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    /// Resolve a request path against the base URL, keeping any path prefix the base carries.
    fn url_for(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        Ok(url)
    }

    fn build(&self, request: &ApiRequest) -> Result<RequestBuilder> {
        let url = self.url_for(&request.path)?;
        let mut builder = self
            .client
            .request(request.method.clone(), url)
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(bytes.clone()),
            RequestBody::Multipart(parts) => {
                let mut form = Form::new();
                for part in parts {
                    let mut p = Part::bytes(part.data.to_vec())
                        .mime_str(&part.content_type)
                        .map_err(|e| {
                            Error::validation(
                                format!("invalid content type {:?}: {e}", part.content_type),
                                Some(part.name.clone()),
                            )
                        })?;
                    if let Some(file_name) = &part.file_name {
                        p = p.file_name(file_name.clone());
                    }
                    form = form.part(part.name.clone(), p);
                }
                builder.multipart(form)
            }
        };
        Ok(builder)
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let response = self
            .build(request)?
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| self.map_send_error(e))?;
        Ok(ApiResponse {
            status,
            path: request.path.clone(),
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths() {
        let transport = HttpTransport::new("http://localhost:8080", Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.url_for("/favorite/me").unwrap().as_str(),
            "http://localhost:8080/favorite/me"
        );

        let transport =
            HttpTransport::new("https://api.example.com/v2/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            transport.url_for("/auth/refreshToken").unwrap().as_str(),
            "https://api.example.com/v2/auth/refreshToken"
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(HttpTransport::new("not a url", Duration::from_secs(5)).is_err());
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        // Port 9 (discard) is essentially never listening on loopback.
        let transport = HttpTransport::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = transport
            .execute(&ApiRequest::get("/categories"))
            .await
            .unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }
}
