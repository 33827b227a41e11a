//! An in-memory [`Transport`] driven by a script.
//!
//! `ScriptedTransport` answers requests from canned responses and records everything it is
//! asked to send, which makes it possible to exercise session recovery without a server.  It
//! can also play a minimal bearer-token server: once [`ScriptedTransport::require_bearer`] is
//! set, requests that do not carry that token are answered with 401 before the script is
//! consulted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::HeaderMap;
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::request::{ApiRequest, ApiResponse, RequestBody};
use crate::transport::Transport;

/// What the transport observed for one request.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    /// HTTP method, upper case.
    pub method: String,
    /// Request path, without the query string.
    pub path: String,
    /// Query pairs in the order they were added.
    pub query: Vec<(String, String)>,
    /// Headers as sent, including the credential.
    pub headers: HeaderMap,
    /// Body as sent.
    pub body: RequestBody,
    /// When the transport received the request.
    pub at: Instant,
}

impl RecordedRequest {
    /// A header value as an owned string.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|val| val.to_str().ok())
            .map(String::from)
    }

    /// The JSON body bytes, if the request had one.
    pub fn json_body(&self) -> Option<&Bytes> {
        match &self.body {
            RequestBody::Json(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
enum Reply {
    Status { status: u16, body: String },
    Echo,
    Fail(Error),
}

#[derive(Clone, Debug)]
struct Step {
    reply: Reply,
    delay: Option<Duration>,
}

#[derive(Debug, Default)]
struct Script {
    /// Consumed front to back; the last step repeats forever.
    steps: VecDeque<Step>,
}

impl Script {
    fn next(&mut self) -> Option<Step> {
        if self.steps.len() > 1 {
            self.steps.pop_front()
        } else {
            self.steps.front().cloned()
        }
    }
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<(String, String), Script>,
    log: Vec<RecordedRequest>,
    required_bearer: Option<String>,
    open_paths: Vec<String>,
}

/// A scripted, recording transport.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    state: Mutex<State>,
}

impl ScriptedTransport {
    /// An empty script.  Unscripted requests get a 404.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Always answer `method path` with `status` and `body`.
    pub fn respond(&self, method: &str, path: &str, status: u16, body: &str) {
        self.set(method, path, vec![Self::status(status, body, None)]);
    }

    /// Answer `method path` with `status` and `body` after `delay`.
    pub fn respond_after(&self, method: &str, path: &str, status: u16, body: &str, delay: Duration) {
        self.set(method, path, vec![Self::status(status, body, Some(delay))]);
    }

    /// Answer successive calls with successive entries; the last entry repeats.
    pub fn respond_sequence(&self, method: &str, path: &str, replies: &[(u16, &str)]) {
        let steps = replies
            .iter()
            .map(|(status, body)| Self::status(*status, body, None))
            .collect();
        self.set(method, path, steps);
    }

    /// Answer `method path` with 200 and the request's own JSON body.
    pub fn echo(&self, method: &str, path: &str) {
        self.set(
            method,
            path,
            vec![Step {
                reply: Reply::Echo,
                delay: None,
            }],
        );
    }

    /// Fail `method path` at the transport level.
    pub fn fail(&self, method: &str, path: &str, error: Error) {
        self.set(
            method,
            path,
            vec![Step {
                reply: Reply::Fail(error),
                delay: None,
            }],
        );
    }

    /// Reject every request not carrying `Authorization: Bearer {token}` with 401, except those
    /// to the paths listed in `open_paths`.
    pub fn require_bearer(&self, token: &str, open_paths: &[&str]) {
        let mut state = self.state.lock();
        state.required_bearer = Some(token.to_string());
        state.open_paths = open_paths.iter().map(|p| p.to_string()).collect();
    }

    /// Number of requests sent to `path`.
    pub fn calls(&self, path: &str) -> usize {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    /// Requests sent to `path`, in order.
    pub fn requests(&self, path: &str) -> Vec<RecordedRequest> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Every request sent, in order.
    pub fn log(&self) -> Vec<RecordedRequest> {
        self.state.lock().log.clone()
    }

    fn status(status: u16, body: &str, delay: Option<Duration>) -> Step {
        Step {
            reply: Reply::Status {
                status,
                body: body.to_string(),
            },
            delay,
        }
    }

    fn set(&self, method: &str, path: &str, steps: Vec<Step>) {
        self.state.lock().scripts.insert(
            (method.to_uppercase(), path.to_string()),
            Script {
                steps: steps.into(),
            },
        );
    }

    /// Record the request and pick its reply.  `None` means nothing is scripted for it.
    fn plan(&self, request: &ApiRequest) -> Option<Step> {
        let mut state = self.state.lock();
        let recorded = RecordedRequest {
            method: request.method.as_str().to_string(),
            path: request.path.clone(),
            query: request.query.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            at: Instant::now(),
        };
        let authorized = match &state.required_bearer {
            Some(token) => {
                state.open_paths.contains(&request.path)
                    || recorded.header("authorization") == Some(format!("Bearer {token}"))
            }
            None => true,
        };
        state.log.push(recorded);
        if !authorized {
            return Some(Self::status(401, r#"{"message":"token expired"}"#, None));
        }
        let key = (request.method.as_str().to_string(), request.path.clone());
        state.scripts.get_mut(&key).and_then(Script::next)
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let Some(step) = self.plan(request) else {
            return Ok(ApiResponse::new(
                404,
                request.path.clone(),
                r#"{"message":"no script for this request"}"#,
            ));
        };
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }
        match step.reply {
            Reply::Status { status, body } => Ok(ApiResponse::new(status, request.path.clone(), body)),
            Reply::Echo => {
                let body = match &request.body {
                    RequestBody::Json(bytes) => bytes.clone(),
                    _ => Bytes::new(),
                };
                Ok(ApiResponse::new(200, request.path.clone(), body))
            }
            Reply::Fail(err) => Err(err),
        }
    }
}
