use std::env;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUESTS, CLIENT_REQUEST_ERRORS, CLIENT_TTFB};
use crate::sse::process_sse;
use crate::types::{ChatRequest, ChatStreamEvent};

/// Base URL used when neither an explicit URL nor the environment provides one.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Environment variable consulted for the base URL.
pub const API_URL_ENV: &str = "WEATHERCHAT_API_URL";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A lazily decoded stream of chat events for one response.
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent>> + Send>>;

/// Something that can carry one chat request and stream back its events.
///
/// The session controller talks to the backend only through this trait, so
/// tests and alternative transports can script the event sequence.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue `request` and return the decoded event stream.
    ///
    /// Failures before the body starts (connection errors, non-success status)
    /// are returned as `Err`; failures while reading the body surface as an
    /// `Err` item on the stream. Once `cancel` fires the stream should end
    /// promptly.
    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatEventStream>;
}

/// HTTP client for the weather assistant's chat endpoint.
///
/// No overall request timeout is applied, because a streamed answer may
/// legitimately take minutes; only connection establishment is bounded.
#[derive(Debug, Clone)]
pub struct WeatherChatClient {
    client: ReqwestClient,
    base_url: Url,
    connect_timeout: Duration,
}

impl WeatherChatClient {
    /// Create a new client.
    ///
    /// The base URL can be provided directly or read from the
    /// WEATHERCHAT_API_URL environment variable; it defaults to
    /// `http://localhost:8000`.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<String>, connect_timeout: Option<Duration>) -> Result<Self> {
        let base_url = match base_url {
            Some(url) => url,
            None => env::var(API_URL_ENV).unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
        };
        let base_url = parse_base_url(&base_url)?;

        let connect_timeout = connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            base_url,
            connect_timeout,
        })
    }

    /// The base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The URL of the chat endpoint.
    pub fn chat_url(&self) -> Result<Url> {
        Ok(self.base_url.join("chat")?)
    }

    fn default_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
        headers
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        // The backend reports failures as {"detail": ...}, where detail is a
        // string or a list of validation problems.
        #[derive(Deserialize)]
        struct ErrorResponse {
            detail: Option<serde_json::Value>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.detail)
            .map(|detail| match detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            });
        let error_message = match detail {
            Some(detail) => detail,
            None if !error_body.trim().is_empty() => error_body.trim().to_string(),
            None => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };

        match status_code {
            400 | 422 => Error::bad_request(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_message),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.connect_timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    /// Send a chat request and get a streaming response.
    ///
    /// Returns once the response headers arrive; the body is decoded lazily.
    /// Cancelling `cancel` aborts the wait for headers and ends the stream.
    pub async fn stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatEventStream> {
        let url = self.chat_url()?;
        CLIENT_REQUESTS.click();
        let start = Instant::now();

        let send = self
            .client
            .post(url)
            .headers(self.default_headers())
            .json(request)
            .send();
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(Error::abort("chat request cancelled"));
            }
            response = send => response,
        };
        let response = response.map_err(|e| {
            CLIENT_REQUEST_ERRORS.click();
            self.map_send_error(e)
        })?;
        CLIENT_TTFB.add(start.elapsed().as_secs_f64());

        if !response.status().is_success() {
            CLIENT_REQUEST_ERRORS.click();
            return Err(Self::process_error_response(response).await);
        }

        Ok(Box::pin(process_sse(response.bytes_stream(), cancel)))
    }
}

#[async_trait::async_trait]
impl ChatTransport for WeatherChatClient {
    async fn stream_chat(
        &self,
        request: ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChatEventStream> {
        self.stream(&request, cancel).await
    }
}

/// Parse a base URL so that joining `chat` appends rather than replaces the
/// final path segment.
fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
