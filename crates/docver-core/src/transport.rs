//! HttpTransport trait for the raw request/response exchange.
//!
//! Implementations:
//! - `ReqwestTransport` - Native HTTP via reqwest
//! - `MockTransport` - Scripted responses for testing
//!
//! A transport knows nothing about authentication, content negotiation or
//! status classification. It either returns the response the server sent,
//! whatever its status, or fails before one was obtained.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// No response was obtained (DNS, connect, timeout, dropped connection).
    #[error("Connection failed: {0}")]
    Unreachable(String),

    /// The request could not be assembled locally.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// One named part of a multipart form body
#[derive(Debug, Clone, PartialEq)]
pub struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    /// MIME type of this part (e.g. "text/plain")
    pub mime: Option<String>,
    pub data: Vec<u8>,
}

impl FormPart {
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            file_name: None,
            mime: None,
            data: value.as_bytes().to_vec(),
        }
    }

    pub fn file(name: &str, file_name: &str, mime: &str, data: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            file_name: Some(file_name.to_string()),
            mime: Some(mime.to_string()),
            data,
        }
    }
}

/// Request body as handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingBody {
    /// Already-encoded bytes; the caller chose the content type.
    Bytes(Vec<u8>),
    /// Form parts; the transport sets the content type and boundary.
    Multipart(Vec<FormPart>),
}

/// A fully prepared request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<OutgoingBody>,
}

impl HttpRequest {
    /// Body bytes, if this request carries an encoded body.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Some(OutgoingBody::Bytes(bytes)) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    /// Body decoded as JSON, if it carries one.
    pub fn body_json(&self) -> Option<serde_json::Value> {
        self.body_bytes()
            .and_then(|bytes| serde_json::from_slice(bytes).ok())
    }
}

/// The response as received, before any interpretation
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Response with a JSON body and `application/json` content type.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status);
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response.body = value.to_string().into_bytes();
        response
    }

    /// Response with a `text/plain` body.
    pub fn text(status: StatusCode, body: &str) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        response.body = body.as_bytes().to_vec();
        response
    }
}

/// Raw HTTP exchange.
///
/// Implementations must be `Send + Sync` so one transport can serve
/// controllers on any task.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send the request and return whatever response the server produced.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a transport whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.request(request.method, &request.url);

        match request.body {
            Some(OutgoingBody::Bytes(bytes)) => builder = builder.body(bytes),
            Some(OutgoingBody::Multipart(parts)) => builder = builder.multipart(build_form(parts)?),
            None => {}
        }

        // Applied after the form so explicit headers replace reqwest's defaults
        builder = builder.headers(request.headers);

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(classify)?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn build_form(parts: Vec<FormPart>) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for part in parts {
        let mut field = reqwest::multipart::Part::bytes(part.data);
        if let Some(file_name) = part.file_name {
            field = field.file_name(file_name);
        }
        if let Some(mime) = part.mime {
            field = field
                .mime_str(&mime)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        }
        form = form.part(part.name, field);
    }
    Ok(form)
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Unreachable(error.to_string())
    }
}

/// Scripted transport for testing.
///
/// Responses are returned in the order they were pushed. Every request is
/// recorded, including ones that find the script exhausted (those fail as
/// unreachable).
#[derive(Default)]
pub struct MockTransport {
    responses: Mutex<VecDeque<Result<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: HttpResponse) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(response));
        self
    }

    pub fn push_json(&self, status: StatusCode, value: serde_json::Value) -> &Self {
        self.push_response(HttpResponse::json(status, &value))
    }

    /// Queue a failure that happens before any response exists.
    pub fn push_unreachable(&self, detail: &str) -> &Self {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(TransportError::Unreachable(detail.to_string())));
        self
    }

    /// All requests received so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Unreachable("no scripted response".into())))
    }
}
