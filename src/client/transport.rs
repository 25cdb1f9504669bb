//! HTTP transport seam.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use super::network::NetworkConfig;
use super::request::Body;
use super::response::ApiResponse;
use crate::{Error, Result};

/// A single fully-prepared attempt.
#[derive(Clone, Debug)]
pub struct OutgoingRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Body>,
}

impl OutgoingRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Insert a header, replacing any earlier value with the same name.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::InvalidRequest(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::InvalidRequest(format!("invalid value for header {name}: {e}")))?;
        self.headers.insert(name, value);
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Sends one request and buffers the response.
///
/// Non-2xx statuses are returned as responses, not errors; status handling
/// belongs to the caller.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: OutgoingRequest) -> Result<ApiResponse>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        Self::with_network(None)
    }

    pub fn with_network(network: Option<&NetworkConfig>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(network) = network {
            builder = network.apply_to_builder(builder)?;
        }
        Ok(Self {
            http: builder.build()?,
        })
    }

    pub fn with_http(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<ApiResponse> {
        let has_content_type = request.headers.contains_key(CONTENT_TYPE);
        let mut builder = self
            .http
            .request(request.method, &request.url)
            .headers(request.headers);

        builder = match request.body {
            None => builder,
            Some(Body::Json(value)) => builder.body(value.to_string()),
            Some(Body::Text(text)) => builder.body(text),
            Some(Body::Binary {
                bytes,
                content_type,
            }) => {
                let builder = builder.body(bytes);
                match content_type {
                    Some(ct) if !has_content_type => builder.header(CONTENT_TYPE, ct),
                    _ => builder,
                }
            }
            Some(Body::Multipart(multipart)) => builder.multipart(multipart.to_form()?),
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}
