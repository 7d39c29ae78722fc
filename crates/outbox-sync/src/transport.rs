//! Transport abstraction for replaying operations.
//!
//! A [`Remote`] turns one pending operation into one request and reports
//! either the completed response or a transport failure. Implementations
//! may use HTTP or anything else that can carry a request.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use outbox_core::PendingOperation;

use crate::error::SyncError;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// A completed response from the remote.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP-style status code.
    pub status: u16,
    /// Decoded JSON body. An undecodable body is an empty object.
    pub body: Value,
}

impl RemoteResponse {
    /// Create a response from a status and an already decoded body.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Create a response from raw body bytes.
    ///
    /// Decoding never fails: anything that is not valid JSON becomes `{}`.
    pub fn from_bytes(status: u16, bytes: &[u8]) -> Self {
        let body = serde_json::from_slice(bytes).unwrap_or_else(|e| {
            tracing::debug!(status, error = %e, "response body is not JSON, using empty object");
            Value::Object(Default::default())
        });
        Self { status, body }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport trait for replaying a pending operation.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Remote: Send + Sync {
    /// Issue the request for `op`.
    ///
    /// Returns `Ok` whenever the remote answered, whatever it answered.
    /// Returns a transport-class error (see [`SyncError::is_transport`]) when
    /// the request could not be completed.
    async fn call(&self, op: &PendingOperation) -> Result<RemoteResponse>;
}

#[async_trait]
impl<R: Remote + ?Sized> Remote for Arc<R> {
    async fn call(&self, op: &PendingOperation) -> Result<RemoteResponse> {
        (**self).call(op).await
    }
}

/// HTTP transport using reqwest.
pub mod http {
    use super::*;
    use reqwest::header::ACCEPT;
    use reqwest::Url;
    use std::time::Duration;

    /// Configuration for [`HttpRemote`].
    #[derive(Debug, Clone)]
    pub struct HttpRemoteConfig {
        /// Base URL that relative endpoints are resolved against.
        pub base_url: Option<Url>,
        /// Client-side timeout for one request.
        ///
        /// `None` (the default) leaves the bound to
        /// [`SyncConfig::request_timeout`](crate::SyncConfig::request_timeout),
        /// which covers every call a drain makes. When both are set the
        /// shorter one fires first; either way the result is a timeout.
        pub timeout: Option<Duration>,
        /// User-Agent header value.
        pub user_agent: String,
    }

    impl Default for HttpRemoteConfig {
        fn default() -> Self {
            Self {
                base_url: None,
                timeout: None,
                user_agent: concat!("outbox/", env!("CARGO_PKG_VERSION")).to_string(),
            }
        }
    }

    impl HttpRemoteConfig {
        /// Resolve relative endpoints against `base_url`.
        pub fn with_base_url(mut self, base_url: Url) -> Self {
            self.base_url = Some(base_url);
            self
        }

        /// Bound each request at the client as well.
        pub fn with_timeout(mut self, timeout: Duration) -> Self {
            self.timeout = Some(timeout);
            self
        }
    }

    /// Replays operations as `GET endpoint?param=value...` requests.
    pub struct HttpRemote {
        client: reqwest::Client,
        base_url: Option<Url>,
    }

    impl HttpRemote {
        /// Build a remote with its own connection pool.
        pub fn new(config: HttpRemoteConfig) -> Result<Self> {
            let mut builder = reqwest::Client::builder().user_agent(config.user_agent);
            if let Some(timeout) = config.timeout {
                builder = builder.timeout(timeout);
            }
            let client = builder
                .build()
                .map_err(|e| SyncError::Transport(format!("failed to build client: {}", e)))?;

            Ok(Self {
                client,
                base_url: config.base_url,
            })
        }

        /// Turn an operation's endpoint into an absolute URL.
        pub fn resolve(&self, endpoint: &str) -> Result<Url> {
            if let Ok(url) = Url::parse(endpoint) {
                return Ok(url);
            }

            let base = self.base_url.as_ref().ok_or_else(|| {
                SyncError::InvalidEndpoint(format!("{} is relative and no base URL is set", endpoint))
            })?;
            base.join(endpoint)
                .map_err(|e| SyncError::InvalidEndpoint(format!("{}: {}", endpoint, e)))
        }
    }

    fn transport_error(e: reqwest::Error) -> SyncError {
        if e.is_timeout() {
            SyncError::Timeout(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }

    #[async_trait]
    impl Remote for HttpRemote {
        async fn call(&self, op: &PendingOperation) -> Result<RemoteResponse> {
            let url = self.resolve(&op.endpoint)?;

            let response = self
                .client
                .get(url)
                .query(&op.query_pairs())
                .header(ACCEPT, "application/json")
                .send()
                .await
                .map_err(transport_error)?;

            let status = response.status().as_u16();
            let bytes = response.bytes().await.map_err(transport_error)?;

            Ok(RemoteResponse::from_bytes(status, &bytes))
        }
    }
}

/// A scriptable in-memory remote for testing.
///
/// Records every call it receives and answers from a queue of scripted
/// replies, falling back to a default reply.
pub mod memory {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// What the remote does with the next call.
    #[derive(Debug, Clone)]
    pub enum Reply {
        /// Answer with a completed response.
        Respond(RemoteResponse),
        /// Fail as if the network were unreachable.
        Fail(String),
    }

    impl Reply {
        /// `200 {"ok": true}`.
        pub fn ok() -> Self {
            Reply::Respond(RemoteResponse::new(200, serde_json::json!({ "ok": true })))
        }

        /// `200 {"code": "already_marked"}`.
        pub fn already_marked() -> Self {
            Reply::Respond(RemoteResponse::new(
                200,
                serde_json::json!({ "code": "already_marked" }),
            ))
        }

        /// A completed response that signals a logical failure.
        pub fn rejected(message: &str) -> Self {
            Reply::Respond(RemoteResponse::new(
                422,
                serde_json::json!({ "ok": false, "error": message }),
            ))
        }

        /// A transport failure.
        pub fn unreachable() -> Self {
            Reply::Fail("network unreachable".into())
        }
    }

    struct MemoryRemoteState {
        calls: Vec<PendingOperation>,
        script: VecDeque<Reply>,
        fallback: Reply,
    }

    /// In-memory remote implementation.
    pub struct MemoryRemote {
        state: Mutex<MemoryRemoteState>,
        delay: Option<Duration>,
    }

    impl MemoryRemote {
        /// A remote that accepts everything.
        pub fn new() -> Self {
            Self::with_fallback(Reply::ok())
        }

        /// A remote that answers every unscripted call with `fallback`.
        pub fn with_fallback(fallback: Reply) -> Self {
            Self {
                state: Mutex::new(MemoryRemoteState {
                    calls: Vec::new(),
                    script: VecDeque::new(),
                    fallback,
                }),
                delay: None,
            }
        }

        /// Sleep this long inside every call.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        /// Queue a reply for the next unanswered call.
        pub fn push_reply(&self, reply: Reply) {
            self.lock().script.push_back(reply);
        }

        /// Replace the reply used once the script runs out.
        pub fn set_fallback(&self, reply: Reply) {
            let mut state = self.lock();
            state.fallback = reply;
        }

        /// Every operation received so far, in call order.
        pub fn calls(&self) -> Vec<PendingOperation> {
            self.lock().calls.clone()
        }

        /// Number of calls received so far.
        pub fn call_count(&self) -> usize {
            self.lock().calls.len()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, MemoryRemoteState> {
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }
    }

    impl Default for MemoryRemote {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Remote for MemoryRemote {
        async fn call(&self, op: &PendingOperation) -> Result<RemoteResponse> {
            let reply = {
                let mut state = self.lock();
                state.calls.push(op.clone());
                let fallback = state.fallback.clone();
                state.script.pop_front().unwrap_or(fallback)
            };

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match reply {
                Reply::Respond(response) => Ok(response),
                Reply::Fail(message) => Err(SyncError::Transport(message)),
            }
        }
    }
}
