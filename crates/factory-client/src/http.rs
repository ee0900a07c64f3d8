//! HTTP client for the console REST endpoints.

use std::collections::VecDeque;

use factory_core::{BatchResult, NdjsonDecoder, Requirements, RunBatchBody, StreamEvent};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::ClientError;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// HTTP client for the console API.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if the server is up.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let url = self.url("/api/health");
        debug!(url = %url, "Checking health");

        let response = self.inner.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    /// Installed tools and deploy auth on the server's machine.
    pub async fn requirements(&self) -> Result<Requirements, ClientError> {
        self.get_json("/api/requirements").await
    }

    /// Store the deploy token on the server.
    pub async fn save_token(&self, token: &str) -> Result<(), ClientError> {
        let url = self.url("/api/token");
        debug!(url = %url, "Saving token");

        let response = self
            .inner
            .post(&url)
            .json(&serde_json::json!({ "token": token }))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Run a batch and wait for the final result.
    pub async fn run_batch(&self, body: &RunBatchBody) -> Result<BatchResult, ClientError> {
        let url = self.url("/api/run-batch");
        debug!(url = %url, "Running buffered batch");

        let response = self.inner.post(&url).json(body).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Run a batch and follow its event stream.
    ///
    /// Validation errors surface here as [`ClientError::Api`]; once the
    /// stream is open, events are read with [`EventStream::next_event`].
    /// Dropping the stream disconnects, which stops the run.
    pub async fn run_batch_stream(&self, body: &RunBatchBody) -> Result<EventStream, ClientError> {
        let url = self.url("/api/run-batch-stream");
        debug!(url = %url, "Opening batch stream");

        let response = self.inner.post(&url).json(body).send().await?;
        Ok(EventStream::new(check(response).await?))
    }

    /// Get JSON from an endpoint.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let url = self.url(path);
        debug!(url = %url, "GET request");

        let response = self.inner.get(&url).send().await?;
        Ok(check(response).await?.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Pass successful responses through; turn error statuses into
/// [`ClientError::Api`] using the server's `{"error": …}` body when present.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status.to_string()
            } else {
                text
            }
        });

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

/// Events of a running batch, decoded from the NDJSON body.
#[derive(Debug)]
pub struct EventStream {
    response: reqwest::Response,
    decoder: NdjsonDecoder<StreamEvent>,
    pending: VecDeque<StreamEvent>,
    done: bool,
}

impl EventStream {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            decoder: NdjsonDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    /// Next event, or `None` once the server closed the stream.
    pub async fn next_event(&mut self) -> Result<Option<StreamEvent>, ClientError> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }
            if self.done {
                return Ok(None);
            }

            match self.response.chunk().await? {
                Some(bytes) => self.pending.extend(self.decoder.push(&bytes)?),
                None => {
                    self.done = true;
                    self.pending.extend(std::mem::take(&mut self.decoder).finish()?);
                }
            }
        }
    }
}
