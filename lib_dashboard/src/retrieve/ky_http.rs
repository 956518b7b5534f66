//! # Resilient HTTP Client
//!
//! A wrapper around `reqwest` that never lets a transport error escape. Each call
//! returns the decoded payload or a [`RequestFailure`]:
//!
//! - every attempt is bounded by the configured timeout;
//! - `Authorization: Bearer <token>` is attached unless the endpoint is the login
//!   endpoint;
//! - a 401 refreshes the credential and retries once; a second 401 tears the
//!   session down (token cleared, [`SessionEvent::Expired`] broadcast) and is
//!   reported as `Unauthorized`;
//! - a 403 is `Forbidden` and never retried;
//! - bodies must be JSON carrying `"ok": true`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::auth::TokenStore;
use crate::configs::{AuthSettings, HttpSettings};
use crate::errors::{CallResult, RequestFailure};

/// Session lifecycle notifications for the login collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The credential was rejected twice and has been cleared.
    Expired,
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// HTTP verb.
    pub method: Method,
    /// JSON body, if any.
    pub body: Option<Value>,
}

impl CallOptions {
    /// A `GET` without body.
    pub fn get() -> Self {
        Self { method: Method::GET, body: None }
    }

    /// A `POST` with a JSON body.
    pub fn post(body: Value) -> Self {
        Self { method: Method::POST, body: Some(body) }
    }

    /// A `PUT` with a JSON body.
    pub fn put(body: Value) -> Self {
        Self { method: Method::PUT, body: Some(body) }
    }

    /// A `DELETE` without body.
    pub fn delete() -> Self {
        Self { method: Method::DELETE, body: None }
    }
}

/// The resilient client.
pub struct ResilientClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL every endpoint is joined onto.
    base_url: Url,
    /// Source of the bearer credential.
    tokens: Arc<TokenStore>,
    /// Endpoint exempt from bearer injection.
    login_endpoint: String,
    /// Bound on each attempt.
    timeout: Duration,
    /// Set once the session has been torn down; cleared by the next success.
    torn_down: AtomicBool,
    /// Session notifications.
    session_tx: broadcast::Sender<SessionEvent>,
}

impl ResilientClient {
    /// Builds a client for `http.base_url`.
    ///
    /// # Errors
    /// Returns the parse error if the base URL is not absolute.
    pub fn new(
        http: &HttpSettings,
        auth: &AuthSettings,
        tokens: Arc<TokenStore>,
    ) -> Result<Self, url::ParseError> {
        let base_url = Url::parse(&http.base_url)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(http.transient_retries);
        let inner = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let (session_tx, _) = broadcast::channel(8);
        Ok(Self {
            inner,
            base_url,
            tokens,
            login_endpoint: auth.login_endpoint.clone(),
            timeout: http.timeout(),
            torn_down: AtomicBool::new(false),
            session_tx,
        })
    }

    /// Subscribes to session notifications.
    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }

    /// The token store backing this client.
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Calls `endpoint` and decodes the body into `T`.
    pub async fn call<T>(&self, endpoint: &str, options: CallOptions) -> CallResult<T>
    where
        T: DeserializeOwned,
    {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(RequestFailure::Unreachable("endpoint must not be empty".to_string()));
        }
        let url = self
            .base_url
            .join(endpoint.trim_start_matches('/'))
            .map_err(|e| RequestFailure::Unreachable(format!("bad endpoint '{}': {}", endpoint, e)))?;
        let is_login = same_endpoint(endpoint, &self.login_endpoint);

        let mut retried = false;
        loop {
            let bearer = if is_login { None } else { Some(self.tokens.get()) };
            let (status, body) = match self.execute(url.clone(), &options, bearer).await {
                Ok(pair) => pair,
                Err(failure) => {
                    log::warn!("{} {} failed: {}", options.method, endpoint, failure);
                    return Err(failure);
                }
            };

            if status == StatusCode::UNAUTHORIZED && !is_login {
                if !retried {
                    log::warn!("{} {} returned 401; refreshing credential and retrying.", options.method, endpoint);
                    self.tokens.refresh();
                    retried = true;
                    continue;
                }
                self.teardown();
                return Err(RequestFailure::Unauthorized);
            }

            return match status {
                StatusCode::UNAUTHORIZED => Err(RequestFailure::Unauthorized),
                StatusCode::FORBIDDEN => {
                    log::warn!("{} {} forbidden (403).", options.method, endpoint);
                    Err(RequestFailure::Forbidden)
                }
                s if !s.is_success() => {
                    log::warn!("{} {} returned status {}.", options.method, endpoint, s.as_u16());
                    Err(RequestFailure::ServerError(s.as_u16()))
                }
                s => {
                    self.torn_down.store(false, Ordering::SeqCst);
                    decode_body(endpoint, s, &body)
                }
            };
        }
    }

    /// One bounded attempt. Returns the status and the raw body.
    async fn execute(
        &self,
        url: Url,
        options: &CallOptions,
        bearer: Option<String>,
    ) -> CallResult<(StatusCode, String)> {
        let mut req = self.inner.request(options.method.clone(), url);

        if let Some(token) = bearer {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(body) = &options.body {
            req = req.header(CONTENT_TYPE, "application/json").body(body.to_string());
        }

        let attempt = async {
            let response = req.send().await?;
            let status = response.status();
            let text = response.text().await.map_err(reqwest_middleware::Error::from)?;
            Ok::<_, reqwest_middleware::Error>((status, text))
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Err(_) => Err(RequestFailure::Timeout),
            Ok(Err(reqwest_middleware::Error::Reqwest(e))) if e.is_timeout() => Err(RequestFailure::Timeout),
            Ok(Err(e)) => Err(RequestFailure::Unreachable(e.to_string())),
            Ok(Ok(pair)) => Ok(pair),
        }
    }

    /// Clears the credential and notifies the login collaborator, once per expiry.
    fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            log::debug!("Session already torn down; not notifying again.");
            return;
        }
        log::error!("Credential rejected after refresh; tearing down the session.");
        self.tokens.clear();
        let _ = self.session_tx.send(SessionEvent::Expired);
    }
}

fn same_endpoint(a: &str, b: &str) -> bool {
    let norm = |s: &str| s.trim().trim_start_matches('/').trim_end_matches('/').to_string();
    !b.trim().is_empty() && norm(a) == norm(b)
}

fn decode_body<T: DeserializeOwned>(endpoint: &str, status: StatusCode, body: &str) -> CallResult<T> {
    let value: Value = serde_json::from_str(body).map_err(|_| {
        RequestFailure::Unreachable(format!("non-JSON response from {}", endpoint))
    })?;

    if value.get("ok") != Some(&Value::Bool(true)) {
        log::warn!("{} answered {} without the success marker.", endpoint, status.as_u16());
        return Err(RequestFailure::ServerError(status.as_u16()));
    }

    serde_json::from_value(value).map_err(|e| {
        log::warn!("{} payload did not match the expected shape: {}", endpoint, e);
        RequestFailure::Malformed(e.to_string())
    })
}
