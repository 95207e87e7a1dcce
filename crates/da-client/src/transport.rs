//! Seam between the orchestration logic and the wire.
//!
//! Everything the pipeline says to the remote service goes through the
//! `Transport` trait: `HttpTransport` speaks real HTTP via reqwest, and
//! `MemoryTransport` (see `memory`) fakes the whole service for tests.

use async_trait::async_trait;
use da_core::Error;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;

/// HTTP method subset the service surface uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
}

/// Request body variants.
#[derive(Clone, Debug)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    /// URL-encoded form (the token grant).
    Form(Vec<(String, String)>),
    /// Raw bytes; content type comes from the request headers.
    Bytes(Vec<u8>),
    /// Multipart form upload: text fields first, then one file part.
    Multipart {
        fields: Vec<(String, String)>,
        file_name: String,
        file: Vec<u8>,
    },
}

/// One request. When `headers` is None the session client injects its
/// bearer/json defaults; `Some` (even empty) suppresses that entirely,
/// which is how pre-signed targets are called without credentials.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Body,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: None,
            body: Body::Empty,
        }
    }

    pub fn post(url: impl Into<String>, body: Body) -> Self {
        Self {
            method: Method::Post,
            url: url.into(),
            headers: None,
            body,
        }
    }

    pub fn put(url: impl Into<String>, body: Body) -> Self {
        Self {
            method: Method::Put,
            url: url.into(),
            headers: None,
            body,
        }
    }

    pub fn patch(url: impl Into<String>, body: Body) -> Self {
        Self {
            method: Method::Patch,
            url: url.into(),
            headers: None,
            body,
        }
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// A response the remote actually produced, 2xx or not.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| {
            Error::transport(
                Some(self.status),
                format!("decoding response body: {e}"),
            )
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one exchange. Ok for any response the remote produced,
    /// including non-2xx; Err only for network-level failures.
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, Error>;
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Patch => self.client.patch(&request.url),
        };

        if let Some(headers) = &request.headers {
            for (name, value) in headers {
                builder = builder.header(name, value);
            }
        }

        builder = match request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(&value),
            Body::Form(fields) => builder.form(&fields),
            Body::Bytes(bytes) => builder.body(bytes),
            Body::Multipart {
                fields,
                file_name,
                file,
            } => {
                let mut form = reqwest::multipart::Form::new();
                for (name, value) in fields {
                    form = form.text(name, value);
                }
                form = form.part(
                    "file",
                    reqwest::multipart::Part::bytes(file).file_name(file_name),
                );
                builder.multipart(form)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Error::transport(None, e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::transport(Some(status), e.to_string()))?
            .to_vec();
        Ok(ApiResponse { status, body })
    }
}
