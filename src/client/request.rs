//! Request options, bodies and URL normalization.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// One part of a multipart form.
#[derive(Clone, Debug)]
pub enum Part {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: String,
        bytes: Bytes,
        mime_type: Option<String>,
    },
}

/// Multipart payload that can be cloned and re-sent on retry.
///
/// `reqwest::multipart::Form` is consumed on send, so the parts are kept
/// here and turned into a form per attempt.
#[derive(Clone, Debug, Default)]
pub struct MultipartBody {
    parts: Vec<Part>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part::Text {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a file part. The MIME type is guessed from `file_name`.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            file_name: file_name.into(),
            bytes: bytes.into(),
            mime_type: None,
        });
        self
    }

    pub fn file_with_mime(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
        mime_type: impl Into<String>,
    ) -> Self {
        self.parts.push(Part::File {
            name: name.into(),
            file_name: file_name.into(),
            bytes: bytes.into(),
            mime_type: Some(mime_type.into()),
        });
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub(crate) fn to_form(&self) -> Result<reqwest::multipart::Form> {
        let mut form = reqwest::multipart::Form::new();
        for part in &self.parts {
            form = match part {
                Part::Text { name, value } => form.text(name.clone(), value.clone()),
                Part::File {
                    name,
                    file_name,
                    bytes,
                    mime_type,
                } => {
                    let mime = mime_type.clone().unwrap_or_else(|| {
                        mime_guess::from_path(file_name)
                            .first_or_octet_stream()
                            .to_string()
                    });
                    let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                        .file_name(file_name.clone())
                        .mime_str(&mime)?;
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }

    fn signature(&self) -> String {
        self.parts
            .iter()
            .map(|part| match part {
                Part::Text { name, value } => format!("{name}={value}"),
                Part::File {
                    name,
                    file_name,
                    bytes,
                    ..
                } => format!("{name}@{file_name}:{}", STANDARD.encode(bytes)),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Request payload.
#[derive(Clone, Debug)]
pub enum Body {
    Json(Value),
    Text(String),
    Binary {
        bytes: Bytes,
        content_type: Option<String>,
    },
    Multipart(MultipartBody),
}

impl Body {
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }

    pub fn binary(bytes: impl Into<Bytes>) -> Self {
        Body::Binary {
            bytes: bytes.into(),
            content_type: None,
        }
    }

    /// Whether the JSON content type is attached for this body.
    pub fn is_json_like(&self) -> bool {
        matches!(self, Body::Json(_) | Body::Text(_))
    }

    fn signature(&self) -> String {
        match self {
            Body::Json(value) => value.to_string(),
            Body::Text(text) => text.clone(),
            Body::Binary { bytes, .. } => STANDARD.encode(bytes),
            Body::Multipart(multipart) => multipart.signature(),
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<MultipartBody> for Body {
    fn from(multipart: MultipartBody) -> Self {
        Body::Multipart(multipart)
    }
}

/// Per-call options for [`AuthClient::request`](super::AuthClient::request).
#[derive(Clone, Debug)]
pub struct RequestOptions {
    pub method: Method,
    /// Applied after the auth and timezone headers, so they can override both.
    pub headers: Vec<(String, String)>,
    pub body: Option<Body>,
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            body: None,
            timeout: None,
            cancel: None,
        }
    }
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Reads are safe to share between concurrent identical callers.
    pub fn is_deduplicated(&self) -> bool {
        self.method.is_safe()
    }

    /// Timeout for one attempt: explicit if set, else `default` unless the
    /// caller brought its own cancellation token.
    pub fn attempt_timeout(&self, default: Duration) -> Option<Duration> {
        match (self.timeout, &self.cancel) {
            (Some(timeout), _) => Some(timeout),
            (None, Some(_)) => None,
            (None, None) => Some(default),
        }
    }

    /// Dedup key: `METHOD:url:body`.
    pub fn dedup_key(&self, url: &str) -> String {
        let body = self.body.as_ref().map(Body::signature).unwrap_or_default();
        format!("{}:{url}:{body}", self.method)
    }
}

/// Resolve a caller path against the backend base URL and routing prefix.
pub fn normalize_url(base_url: &str, api_prefix: &str, input: &str) -> String {
    if input.starts_with("http://") || input.starts_with("https://") {
        return input.to_string();
    }

    let path = if input.starts_with('/') {
        input.to_string()
    } else {
        format!("/{input}")
    };

    let prefix = api_prefix.trim_end_matches('/');
    let has_prefix = prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with(['/', '?', '#']));

    let path = if has_prefix {
        path
    } else {
        format!("{prefix}{path}")
    };

    format!("{}{path}", base_url.trim_end_matches('/'))
}
