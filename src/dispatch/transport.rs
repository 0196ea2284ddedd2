use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

use crate::dispatch::payload::Payload;
use crate::error::GenError;

/// Largest body accepted from the service (generated video can be big).
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// Status, content type and body of one HTTP exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Outbound side of the client: one submission or one status query.
///
/// Implementations report every HTTP status as a [`RawResponse`]; only
/// failures without a status (connect, TLS, body read) are errors.
pub trait Transport: Send + Sync {
    fn submit(
        &self,
        payload: &Payload,
    ) -> impl Future<Output = Result<RawResponse, GenError>> + Send;

    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<RawResponse, GenError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn submit(
        &self,
        payload: &Payload,
    ) -> impl Future<Output = Result<RawResponse, GenError>> + Send {
        (**self).submit(payload)
    }

    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<RawResponse, GenError>> + Send {
        (**self).get(url, headers)
    }
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    max_body: usize,
}

impl HttpTransport {
    pub fn new() -> Result<Self, GenError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            max_body: MAX_RESPONSE_BYTES,
        }
    }

    /// Override the body size cap.
    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    /// Read status, content type and body, giving up as soon as the body
    /// (declared or received so far) passes `max_body`.
    async fn read(&self, mut response: reqwest::Response) -> Result<RawResponse, GenError> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let declared = response.content_length();
        if let Some(declared) = declared.filter(|&n| n > self.max_body as u64) {
            return Err(self.too_large(declared));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_body {
                return Err(self.too_large((body.len() + chunk.len()) as u64));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(RawResponse {
            status,
            content_type,
            body,
        })
    }

    fn too_large(&self, seen: u64) -> GenError {
        GenError::Protocol(format!(
            "response too large: at least {seen} bytes (max {})",
            self.max_body
        ))
    }
}

impl Transport for HttpTransport {
    async fn submit(&self, payload: &Payload) -> Result<RawResponse, GenError> {
        let mut req = self.client.post(&payload.url);
        for (k, v) in &payload.headers {
            req = req.header(k, v);
        }
        let response = req.multipart(payload.to_form()?).send().await?;
        self.read(response).await
    }

    async fn get(&self, url: &str, headers: &[(String, String)]) -> Result<RawResponse, GenError> {
        let mut req = self.client.get(url);
        for (k, v) in headers {
            req = req.header(k, v);
        }
        let response = req.send().await?;
        self.read(response).await
    }
}
