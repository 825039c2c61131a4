//! apiprobe's HTTP client is a thin wrapper around `reqwest::Client` that
//! * sends a [`PreparedRequest`] exactly as the driver built it
//! * captures request and response logs for the reporters

use http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use tracing::*;
use url::Url;

use crate::driver::PreparedRequest;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct LogRequest {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LogResponse {
    /// `None` when the request never produced a response.
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Log {
    pub request: LogRequest,
    pub response: LogResponse,
}

#[derive(Debug, Clone)]
pub struct Response {
    pub headers: HeaderMap,
    pub status: StatusCode,
    pub text: String,
}

impl Response {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.text)
    }

    async fn from(res: reqwest::Response) -> Result<Self, Error> {
        let headers = res.headers().clone();
        let status = res.status();
        let text = res.text().await?;
        Ok(Response {
            headers,
            status,
            text,
        })
    }
}

/// Outcome of a single exchange. The log is always present, even when the
/// transport failed.
#[derive(Debug)]
pub struct Sent {
    pub log: Log,
    pub result: Result<Response, Error>,
}

#[derive(Clone, Default)]
pub struct Client {
    pub(crate) inner: reqwest::Client,
}

impl Client {
    pub fn new() -> Client {
        Client::default()
    }

    /// Construct a client with an optional per-request timeout.
    pub fn with_timeout(timeout: Option<Duration>) -> Result<Client, Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Client {
            inner: builder.build()?,
        })
    }

    pub async fn send(&self, req: &PreparedRequest) -> Sent {
        debug!("Requesting {} {}", req.method, req.url);

        let body = req.body.as_ref().map(|body| body.to_string());
        let log_request = LogRequest {
            url: req.url.clone(),
            method: req.method.clone(),
            headers: req.headers.clone(),
            body: body.clone(),
        };

        let mut builder = self
            .inner
            .request(req.method.clone(), req.url.clone())
            .headers(req.headers.clone());
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let result = match builder.send().await {
            Ok(res) => Response::from(res).await,
            Err(e) => Err(e.into()),
        };

        let log_response = match &result {
            Ok(res) => LogResponse {
                status: Some(res.status),
                headers: res.headers.clone(),
                body: res.text.clone(),
            },
            Err(e) => {
                debug!("request to {} failed: {e}", req.url);
                LogResponse::default()
            }
        };

        Sent {
            log: Log {
                request: log_request,
                response: log_response,
            },
            result,
        }
    }
}
