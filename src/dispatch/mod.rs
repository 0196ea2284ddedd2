pub mod async_poll;
pub mod clock;
pub mod payload;
pub mod sync;
pub mod transport;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, CredentialSource, PollConfig};
use crate::dispatch::async_poll::AsyncPollInterpreter;
use crate::dispatch::clock::{Clock, TokioClock};
use crate::dispatch::payload::{Mode, build_payload};
use crate::dispatch::sync::SyncInterpreter;
use crate::dispatch::transport::{HttpTransport, RawResponse, Transport};
use crate::error::GenError;
use crate::request::GenerationRequest;

/// Content type reported when the service omits the header.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A finished generation result. Only built from a complete success body.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl Artifact {
    pub(crate) fn from_response(response: RawResponse) -> Self {
        Self {
            content_type: response
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            bytes: response.body,
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("len", &self.bytes.len())
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// Mode-specific handling of the submission response. Both modes share
/// payload construction; they differ only here.
pub trait ResponseInterpreter: Send + Sync {
    fn mode(&self) -> Mode;

    fn interpret(
        &self,
        submission: RawResponse,
    ) -> impl Future<Output = Result<Artifact, GenError>> + Send;
}

/// Entry point for callers: submit a request in either mode and get back an
/// artifact or a classified error.
///
/// Holds no per-call state, so one client can serve concurrent calls.
#[derive(Clone)]
pub struct GenerationClient<T = HttpTransport, C = TokioClock> {
    transport: T,
    clock: C,
    host: String,
    poll: PollConfig,
    credentials: Arc<dyn CredentialSource>,
}

impl GenerationClient {
    /// HTTP transport and wall clock, configured from `config`.
    pub fn from_config(config: &Config) -> Result<Self, GenError> {
        Self::with_parts(
            HttpTransport::new()?,
            TokioClock,
            &config.host,
            config.poll,
            Arc::new(config.credentials()),
        )
    }
}

impl<T: Transport, C: Clock> GenerationClient<T, C> {
    /// Assemble a client from explicit parts. Rejects a poll config whose
    /// timeout does not exceed its interval.
    pub fn with_parts(
        transport: T,
        clock: C,
        host: &str,
        poll: PollConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, GenError> {
        poll.validate()?;
        Ok(Self {
            transport,
            clock,
            host: host.trim_end_matches('/').to_string(),
            poll,
            credentials,
        })
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub async fn generate(
        &self,
        endpoint: &str,
        request: &GenerationRequest,
        mode: Mode,
        cancel: Option<&CancellationToken>,
    ) -> Result<Artifact, GenError> {
        match mode {
            Mode::Sync => self.run(endpoint, request, &SyncInterpreter, cancel).await,
            Mode::Async => {
                let interpreter = AsyncPollInterpreter::new(
                    &self.transport,
                    &self.clock,
                    &self.host,
                    &*self.credentials,
                    self.poll,
                    cancel,
                );
                self.run(endpoint, request, &interpreter, cancel).await
            }
        }
    }

    pub async fn generate_sync(
        &self,
        endpoint: &str,
        request: &GenerationRequest,
    ) -> Result<Artifact, GenError> {
        self.generate(endpoint, request, Mode::Sync, None).await
    }

    pub async fn generate_async(
        &self,
        endpoint: &str,
        request: &GenerationRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Artifact, GenError> {
        self.generate(endpoint, request, Mode::Async, cancel).await
    }

    async fn run<I: ResponseInterpreter>(
        &self,
        endpoint: &str,
        request: &GenerationRequest,
        interpreter: &I,
        cancel: Option<&CancellationToken>,
    ) -> Result<Artifact, GenError> {
        let mode = interpreter.mode();
        let payload = build_payload(&self.host, endpoint, request, mode, &*self.credentials)?;

        tracing::info!(endpoint = endpoint, mode = ?mode, "submitting generation request");

        let start = self.clock.now();
        let submission =
            until_cancelled(cancel, &self.clock, start, self.transport.submit(&payload)).await?;

        if !submission.is_success() {
            tracing::warn!(
                endpoint = endpoint,
                status = submission.status,
                "submission rejected"
            );
        }

        interpreter.interpret(submission).await
    }
}

/// Race `fut` against `cancel`. Cancellation wins ties and reports the time
/// since `start` on `clock`.
pub(crate) async fn until_cancelled<O, C, F>(
    cancel: Option<&CancellationToken>,
    clock: &C,
    start: Instant,
    fut: F,
) -> Result<O, GenError>
where
    C: Clock,
    F: Future<Output = Result<O, GenError>>,
{
    let Some(token) = cancel else {
        return fut.await;
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => {
            let elapsed_ms = clock.now().saturating_duration_since(start).as_millis() as u64;
            Err(GenError::Cancelled(elapsed_ms))
        }
        result = fut => result,
    }
}
