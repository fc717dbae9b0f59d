//! HTTP transport used by the session handler.
//!
//! The [`Transport`] trait is the seam between the session logic and the
//! wire. [`ReqwestTransport`] implements it with a blocking `reqwest`
//! client and classifies every failure into a [`TransportError`] so the
//! session can decide what to retry.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use magics_config::ServerAddress;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::Value;

use crate::error::TransportError;

/// HTTP method of an API request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
}

/// Body of an API request.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// No body.
    Empty,
    /// A JSON document.
    Json(Value),
    /// URL-encoded form fields.
    Form(Vec<(String, String)>),
}

/// A request to the queue server, relative to its base address.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: RequestBody,
    bearer: Option<String>,
    replayable: bool,
}

impl ApiRequest {
    /// A `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: RequestBody::Empty,
            bearer: None,
            replayable: true,
        }
    }

    /// A `POST` request without a body.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    /// A `POST` request with a JSON body.
    #[must_use]
    pub fn post_json(path: impl Into<String>, body: Value) -> Self {
        Self {
            body: RequestBody::Json(body),
            ..Self::post(path)
        }
    }

    /// A `POST` request with form fields.
    #[must_use]
    pub fn post_form(path: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            body: RequestBody::Form(fields),
            ..Self::post(path)
        }
    }

    /// Attaches a bearer token.
    #[must_use]
    pub fn with_bearer(mut self, token: Option<String>) -> Self {
        self.bearer = token;
        self
    }

    /// Marks the request as unsafe to resend once it has left the client.
    ///
    /// A timeout after sending is then reported as
    /// [`TransportError::Unconfirmed`] instead of being retried.
    #[must_use]
    pub const fn without_replay(mut self) -> Self {
        self.replayable = false;
        self
    }

    /// Whether the request may be resent after an unanswered attempt.
    #[must_use]
    pub const fn is_replayable(&self) -> bool {
        self.replayable
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Path relative to the server address.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request body.
    #[must_use]
    pub const fn body(&self) -> &RequestBody {
        &self.body
    }

    /// Bearer token, when attached.
    #[must_use]
    pub fn bearer(&self) -> Option<&str> {
        self.bearer.as_deref()
    }
}

/// Executes API requests against the queue server.
pub trait Transport: Send + Sync {
    /// Sends `request` and decodes the JSON response.
    ///
    /// # Errors
    ///
    /// Returns a classified [`TransportError`].
    fn execute(&self, request: &ApiRequest) -> Result<Value, TransportError>;

    /// Sends `request` and returns the response body as a line reader.
    ///
    /// # Errors
    ///
    /// Returns a classified [`TransportError`].
    fn open_stream(&self, request: &ApiRequest) -> Result<Box<dyn BufRead + Send>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: &ApiRequest) -> Result<Value, TransportError> {
        (**self).execute(request)
    }

    fn open_stream(&self, request: &ApiRequest) -> Result<Box<dyn BufRead + Send>, TransportError> {
        (**self).open_stream(request)
    }
}

/// Blocking `reqwest` implementation of [`Transport`].
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    address: ServerAddress,
    client: Client,
    stream_client: Client,
}

impl ReqwestTransport {
    /// Builds a transport applying `timeout` to every non-streaming request.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Client`] if the HTTP client cannot be
    /// initialised.
    pub fn new(address: ServerAddress, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| TransportError::Client {
                message: error.to_string(),
            })?;
        let stream_client = Client::builder()
            .connect_timeout(timeout)
            .timeout(None)
            .build()
            .map_err(|error| TransportError::Client {
                message: error.to_string(),
            })?;
        Ok(Self {
            address,
            client,
            stream_client,
        })
    }

    fn prepare(&self, client: &Client, request: &ApiRequest) -> Result<RequestBuilder, TransportError> {
        let url = self
            .address
            .endpoint(request.path())
            .map_err(|error| TransportError::Endpoint {
                path: request.path().to_owned(),
                message: error.to_string(),
            })?;
        let mut builder = match request.method() {
            Method::Get => client.get(url),
            Method::Post => client.post(url),
        };
        builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Form(fields) => builder.form(fields),
        };
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    fn send(&self, client: &Client, request: &ApiRequest) -> Result<Response, TransportError> {
        let response = self
            .prepare(client, request)?
            .send()
            .map_err(|error| classify_send_error(&error, request.is_replayable()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

impl Transport for ReqwestTransport {
    fn execute(&self, request: &ApiRequest) -> Result<Value, TransportError> {
        let response = self.send(&self.client, request)?;
        response.json::<Value>().map_err(|error| TransportError::Decode {
            message: error.to_string(),
        })
    }

    fn open_stream(&self, request: &ApiRequest) -> Result<Box<dyn BufRead + Send>, TransportError> {
        let response = self.send(&self.stream_client, request)?;
        Ok(Box::new(BufReader::new(response)))
    }
}

/// Classifies a failed exchange.
///
/// Connect failures never reached the server and are retried. A timeout is
/// retried only for requests that may be replayed; anything else that went
/// wrong after sending is reported as unconfirmed.
fn classify_send_error(error: &reqwest::Error, replayable: bool) -> TransportError {
    let message = error.to_string();
    if error.is_decode() {
        return TransportError::Decode { message };
    }
    if error.is_builder() || error.is_redirect() {
        return TransportError::Client { message };
    }
    if error.is_connect() || (error.is_timeout() && replayable) {
        return TransportError::Transient { message };
    }
    TransportError::Unconfirmed { message }
}

/// Maps a non-success HTTP status to the error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> TransportError {
    let message = error_detail(body);
    match status.as_u16() {
        401 | 403 => TransportError::Unauthorized {
            status: status.as_u16(),
            message,
        },
        408 | 429 | 502 | 503 | 504 => TransportError::Transient {
            message: format!("{status}: {message}"),
        },
        code => TransportError::Rejected {
            status: code,
            message,
        },
    }
}

/// Extracts the server's explanation from an error body.
fn error_detail(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let detail = parsed.as_ref().and_then(|value| {
        value
            .get("detail")
            .or_else(|| value.get("msg"))
            .map(|detail| match detail {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
    });
    detail.unwrap_or_else(|| body.trim().to_owned())
}
