//! ApiClient: one authenticated request against the document service.
//!
//! Every call goes through `request`, which:
//! 1. Computes default headers (JSON content type unless the body is a form)
//! 2. Lets caller headers override those defaults
//! 3. Attaches the bearer token last, so callers can never replace it
//! 4. Classifies the outcome as a `Payload` or an `ApiError`
//!
//! Nothing is retried or cached here.

use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::transport::{
    FormPart, HttpRequest, HttpResponse, HttpTransport, OutgoingBody, ReqwestTransport,
    TransportError,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Fixed user-facing text for a service that could not be reached.
pub const UNREACHABLE_MESSAGE: &str = "unable to connect to the service";

#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with a non-success status.
    #[error("{message}")]
    Remote { status: StatusCode, message: String },

    /// No response was obtained. `detail` is diagnostic only.
    #[error("{}", UNREACHABLE_MESSAGE)]
    Transport { detail: String },

    /// The request could not be built locally.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A success response claimed JSON but did not parse.
    #[error("Invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// HTTP status, for failures where the service answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Transport { .. })
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Body supplied by a caller
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Structured payload, serialized as JSON.
    Json(serde_json::Value),
    /// Pre-encoded text sent as-is.
    Text(String),
    /// Form payload; the transport owns its content type.
    Multipart(Vec<FormPart>),
}

/// Options for a single request. Defaults to a GET with no body.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<RequestBody>,
    pub headers: HeaderMap,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: RequestBody) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Successful outcome of a request
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// 204 No Content
    Empty,
    /// Parsed JSON body
    Json(serde_json::Value),
    /// Any other body, as text
    Text(String),
}

impl Payload {
    /// Decode into `T`, treating no content and JSON `null` as `None`.
    pub fn into_json<T: DeserializeOwned>(self) -> std::result::Result<Option<T>, serde_json::Error> {
        match self {
            Payload::Empty | Payload::Json(serde_json::Value::Null) => Ok(None),
            Payload::Json(value) => serde_json::from_value(value).map(Some),
            Payload::Text(text) if text.trim().is_empty() => Ok(None),
            Payload::Text(text) => serde_json::from_str(&text).map(Some),
        }
    }
}

/// Authenticated client for the document service.
pub struct ApiClient<T: HttpTransport = ReqwestTransport> {
    base_url: String,
    transport: T,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient<ReqwestTransport> {
    /// Build a reqwest-backed client from configuration.
    pub fn from_config(config: &ClientConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        Ok(Self::new(&config.base_url, transport, credentials))
    }
}

impl<T: HttpTransport> ApiClient<T> {
    /// `base_url` is joined verbatim with service-relative endpoints.
    pub fn new(base_url: &str, transport: T, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            transport,
            credentials,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn get(&self, endpoint: &str) -> Result<Payload> {
        self.request(endpoint, RequestOptions::get()).await
    }

    pub async fn post_json(&self, endpoint: &str, body: serde_json::Value) -> Result<Payload> {
        self.request(endpoint, RequestOptions::post(RequestBody::Json(body)))
            .await
    }

    /// Perform one request against `endpoint` (e.g. `/api/documents/1/versions`).
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Payload> {
        let headers = self.build_headers(options.body.as_ref(), options.headers)?;
        let body = options.body.map(encode_body).transpose()?;
        let request = HttpRequest {
            method: options.method,
            url: format!("{}{}", self.base_url, endpoint),
            headers,
            body,
        };

        debug!("{} {}", request.method, request.url);

        match self.transport.send(request).await {
            Ok(response) => interpret(endpoint, response),
            Err(TransportError::Unreachable(detail)) => {
                error!("Request to {} failed (is the service running?): {}", endpoint, detail);
                Err(ApiError::Transport { detail })
            }
            Err(TransportError::InvalidRequest(detail)) => {
                error!("Request to {} could not be built: {}", endpoint, detail);
                Err(ApiError::InvalidRequest(detail))
            }
        }
    }

    fn build_headers(&self, body: Option<&RequestBody>, caller: HeaderMap) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if !matches!(body, Some(RequestBody::Multipart(_))) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        // Replaces defaults with the same name, keeps multi-valued caller headers
        headers.extend(caller);

        if let Some(token) = self.credentials.token() {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidRequest("credential token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        Ok(headers)
    }
}

fn encode_body(body: RequestBody) -> Result<OutgoingBody> {
    match body {
        RequestBody::Json(value) => serde_json::to_vec(&value)
            .map(OutgoingBody::Bytes)
            .map_err(|e| ApiError::InvalidRequest(e.to_string())),
        RequestBody::Text(text) => Ok(OutgoingBody::Bytes(text.into_bytes())),
        RequestBody::Multipart(parts) => Ok(OutgoingBody::Multipart(parts)),
    }
}

fn interpret(endpoint: &str, response: HttpResponse) -> Result<Payload> {
    let status = response.status;

    if !status.is_success() {
        let text = String::from_utf8_lossy(&response.body).into_owned();
        error!("API call failed: {} {} {}", endpoint, status.as_u16(), text);
        let message = if text.is_empty() {
            format!("API Error: {}", status.as_u16())
        } else {
            text
        };
        return Err(ApiError::Remote { status, message });
    }

    if status == StatusCode::NO_CONTENT {
        return Ok(Payload::Empty);
    }

    let is_json = response
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));

    if is_json {
        serde_json::from_slice(&response.body)
            .map(Payload::Json)
            .map_err(|source| {
                error!("Failed to parse JSON from {}: {}", endpoint, source);
                ApiError::Decode {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })
    } else {
        Ok(Payload::Text(
            String::from_utf8_lossy(&response.body).into_owned(),
        ))
    }
}
