//! Outbound request and inbound response descriptions.
//!
//! An [`ApiRequest`] is a complete, owned description of a call: it can be sent, parked while a
//! token refresh is outstanding, and sent again without losing anything.  Bodies are serialized
//! once when the request is built so that a replay transmits exactly the same bytes.

use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/////////////////////////////////////////////// Body ///////////////////////////////////////////////

/// One part of a `multipart/form-data` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormPart {
    /// Form field name.
    pub name: String,
    /// File name reported to the server, if this part is a file.
    pub file_name: Option<String>,
    /// MIME type of the part.
    pub content_type: String,
    /// Raw part contents.
    pub data: Bytes,
}

impl FormPart {
    /// A JSON-encoded part, as used for the advertisement DTO.
    pub fn json<T: Serialize>(name: impl Into<String>, value: &T) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            file_name: None,
            content_type: "application/json".to_string(),
            data: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    /// A file part.
    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type: content_type.into(),
            data: data.into(),
        }
    }
}

/// The body of an [`ApiRequest`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// A JSON document, already serialized.
    Json(Bytes),
    /// A `multipart/form-data` body.
    Multipart(Vec<FormPart>),
}

///////////////////////////////////////////// ApiRequest ////////////////////////////////////////////

/// An outbound call description.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the API base URL, e.g. `/favorite/me`.
    pub path: String,
    /// Query string pairs, in order.
    pub query: Vec<(String, String)>,
    /// Extra request headers.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
    retried: bool,
    exempt: bool,
}

impl ApiRequest {
    /// Create a request with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: RequestBody::Empty,
            retried: false,
            exempt: false,
        }
    }

    /// Create a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Create a POST request.
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Create a PUT request.
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    /// Create a DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Serialize `value` as the JSON body.
    pub fn with_json<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self> {
        self.body = RequestBody::Json(Bytes::from(serde_json::to_vec(value)?));
        Ok(self)
    }

    /// Use a multipart body made of `parts`.
    pub fn with_multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    /// Append one query pair.
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append all `pairs` to the query string.
    pub fn with_query_pairs(mut self, pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    /// Set a header, replacing any previous value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::validation(format!("invalid header name: {e}"), None))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::validation(format!("invalid header value: {e}"), None))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Issue this request without session recovery.
    ///
    /// Used for the calls that establish or renew a session (login, signup, logout, refresh): an
    /// authentication failure on them is an answer, not an expired session.
    pub fn exempt_from_refresh(mut self) -> Self {
        self.exempt = true;
        self
    }

    /// True once this request has been re-issued after a token refresh.
    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// True if authentication failures on this request are never intercepted.
    pub fn is_exempt(&self) -> bool {
        self.exempt
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }
}

//////////////////////////////////////////// ApiResponse ////////////////////////////////////////////

/// A fully-read HTTP response.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Path of the request that produced this response.
    pub path: String,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl ApiResponse {
    /// Create a response with no headers.
    pub fn new(status: u16, path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            path: path.into(),
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Look up a header as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|val| val.to_str().ok())
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::serialization(
                format!("Failed to parse response from {}: {e}", self.path),
                Some(Box::new(e)),
            )
        })
    }

    /// The body as (lossy) UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body_is_serialized_once() {
        let req = ApiRequest::post("/auth/login")
            .with_json(&json!({"email": "jan@example.com", "password": "hunter2"}))
            .unwrap();
        let RequestBody::Json(bytes) = &req.body else {
            panic!("expected a JSON body");
        };
        let copy = req.clone();
        assert_eq!(copy.body, RequestBody::Json(bytes.clone()));
    }

    #[test]
    fn retried_flag_starts_clear() {
        let mut req = ApiRequest::get("/users/me");
        assert!(!req.is_retried());
        assert!(!req.is_exempt());
        req.mark_retried();
        assert!(req.is_retried());
        assert!(ApiRequest::post("/auth/refreshToken").exempt_from_refresh().is_exempt());
    }

    #[test]
    fn query_pairs_keep_order() {
        let req = ApiRequest::get("/advertisements/search")
            .with_query("title", "rower")
            .with_query("maxPrice", 500);
        assert_eq!(
            req.query,
            vec![
                ("title".to_string(), "rower".to_string()),
                ("maxPrice".to_string(), "500".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_bad_header() {
        assert!(ApiRequest::get("/").with_header("bad header", "x").is_err());
    }

    #[test]
    fn response_helpers() {
        let resp = ApiResponse::new(200, "/categories", r#"{"categories":[]}"#);
        assert!(resp.is_success());
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value, json!({"categories": []}));
        assert!(resp.json::<Vec<u8>>().is_err());
        assert!(!ApiResponse::new(401, "/users/me", "").is_success());
    }
}
