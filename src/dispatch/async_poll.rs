use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::config::{CredentialSource, PollConfig};
use crate::dispatch::clock::Clock;
use crate::dispatch::payload::{Mode, build_poll_request};
use crate::dispatch::transport::{RawResponse, Transport};
use crate::dispatch::{Artifact, ResponseInterpreter, until_cancelled};
use crate::error::GenError;

/// Status the results endpoint uses for "still processing".
pub const STATUS_IN_PROGRESS: u16 = 202;

/// A job the service has accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedJob {
    pub id: String,
    pub submitted_at: Instant,
}

/// Outcome of a single status query.
#[derive(Debug, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Succeeded(Artifact),
    Failed { status: u16, detail: String },
}

/// Pull the job id out of a submission response.
///
/// A non-2xx submission is a transport failure; a 2xx without a usable `id`
/// is a protocol failure.
pub fn parse_submission(response: &RawResponse) -> Result<String, GenError> {
    if !response.is_success() {
        return Err(GenError::Transport {
            status: response.status,
            body: response.body_text(),
        });
    }

    let v: serde_json::Value = serde_json::from_slice(&response.body)
        .map_err(|e| GenError::Protocol(format!("submission response is not JSON: {e}")))?;

    let id = match &v["id"] {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    };
    if id.is_empty() {
        return Err(GenError::Protocol("Expected id in response".into()));
    }
    // The id becomes a path segment of the results URL.
    if !id.chars().all(is_unreserved) {
        return Err(GenError::Protocol(format!("job id is not URL-safe: {id:?}")));
    }
    Ok(id)
}

/// RFC 3986 unreserved characters.
fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~')
}

/// Classify one results response. 202 keeps polling, any other 2xx carries
/// the artifact, everything else is terminal.
pub fn interpret_poll(response: RawResponse) -> JobStatus {
    if response.status == STATUS_IN_PROGRESS {
        JobStatus::InProgress
    } else if response.is_success() {
        JobStatus::Succeeded(Artifact::from_response(response))
    } else {
        JobStatus::Failed {
            status: response.status,
            detail: response.body_text(),
        }
    }
}

/// Deferred mode: extract the job id, then poll `/results/{id}` on a fixed
/// interval until a terminal status, the deadline, or cancellation.
pub struct AsyncPollInterpreter<'a, T, C> {
    transport: &'a T,
    clock: &'a C,
    host: &'a str,
    credentials: &'a dyn CredentialSource,
    poll: PollConfig,
    cancel: Option<&'a CancellationToken>,
}

impl<'a, T: Transport, C: Clock> AsyncPollInterpreter<'a, T, C> {
    pub fn new(
        transport: &'a T,
        clock: &'a C,
        host: &'a str,
        credentials: &'a dyn CredentialSource,
        poll: PollConfig,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            transport,
            clock,
            host,
            credentials,
            poll,
            cancel,
        }
    }

    /// Drive an accepted job to a terminal outcome.
    ///
    /// The deadline is checked after every in-progress answer and before
    /// committing to the next wait, so time spent here is bounded by
    /// `timeout + poll_interval` plus one in-flight query.
    pub async fn poll(&self, job: &SubmittedJob) -> Result<Artifact, GenError> {
        let mut polls: u32 = 0;

        loop {
            let (url, headers) = build_poll_request(self.host, &job.id, self.credentials)?;

            tracing::debug!(job_id = job.id, attempt = polls + 1, "polling results at {url}");

            let response = until_cancelled(
                self.cancel,
                self.clock,
                job.submitted_at,
                self.transport.get(&url, &headers),
            )
            .await?;
            polls += 1;

            let elapsed = self.clock.now().saturating_duration_since(job.submitted_at);

            match interpret_poll(response) {
                JobStatus::InProgress => {
                    if elapsed >= self.poll.timeout {
                        tracing::warn!(
                            job_id = job.id,
                            polls = polls,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "async generation job timed out"
                        );
                        return Err(GenError::TimedOut {
                            job_id: job.id.clone(),
                            timeout_secs: self.poll.timeout.as_secs(),
                            polls,
                        });
                    }

                    tracing::debug!(
                        job_id = job.id,
                        attempt = polls,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "job still in progress"
                    );

                    until_cancelled(self.cancel, self.clock, job.submitted_at, async {
                        self.clock.sleep(self.poll.poll_interval).await;
                        Ok(())
                    })
                    .await?;
                }
                JobStatus::Succeeded(artifact) => {
                    tracing::info!(
                        job_id = job.id,
                        polls = polls,
                        elapsed_ms = elapsed.as_millis() as u64,
                        bytes = artifact.bytes.len(),
                        content_type = artifact.content_type,
                        "async generation job completed"
                    );
                    return Ok(artifact);
                }
                // A momentary 5xx is as terminal as a 4xx here; resubmitting
                // is the caller's call.
                JobStatus::Failed { status, detail } => {
                    tracing::warn!(
                        job_id = job.id,
                        status = status,
                        polls = polls,
                        "async generation job failed"
                    );
                    return Err(GenError::Transport {
                        status,
                        body: detail,
                    });
                }
            }
        }
    }
}

impl<T: Transport, C: Clock> ResponseInterpreter for AsyncPollInterpreter<'_, T, C> {
    fn mode(&self) -> Mode {
        Mode::Async
    }

    async fn interpret(&self, submission: RawResponse) -> Result<Artifact, GenError> {
        let id = parse_submission(&submission)?;
        let job = SubmittedJob {
            id,
            submitted_at: self.clock.now(),
        };

        tracing::info!(
            job_id = job.id,
            poll_interval_secs = self.poll.poll_interval.as_secs_f64(),
            timeout_secs = self.poll.timeout.as_secs(),
            "async generation job accepted"
        );

        self.poll(&job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &[u8]) -> RawResponse {
        RawResponse {
            status,
            content_type: Some("application/json".into()),
            body: body.to_vec(),
        }
    }

    #[test]
    fn submission_id_extracted() {
        let id = parse_submission(&response(200, br#"{"id":"job-42"}"#)).unwrap();
        assert_eq!(id, "job-42");
    }

    #[test]
    fn numeric_submission_id_accepted() {
        let id = parse_submission(&response(200, br#"{"id":12345}"#)).unwrap();
        assert_eq!(id, "12345");
    }

    #[test]
    fn submission_without_id_is_protocol_error() {
        let bodies = [
            &br#"{"status":"queued"}"#[..],
            br#"{"id":""}"#,
            br#"{"id":null}"#,
            b"<html>",
        ];
        for body in bodies {
            let err = parse_submission(&response(200, body)).unwrap_err();
            assert!(
                matches!(err, GenError::Protocol(_)),
                "body {:?}",
                String::from_utf8_lossy(body)
            );
        }
    }

    #[test]
    fn job_id_that_would_change_the_url_is_rejected() {
        for id in ["../admin", "a/b", "job?x=1", "job#frag", "job 42", "%2e%2e"] {
            let body = serde_json::json!({ "id": id }).to_string();
            let err = parse_submission(&response(200, body.as_bytes())).unwrap_err();
            assert!(matches!(err, GenError::Protocol(_)), "id {id:?}");
        }
    }

    #[test]
    fn url_safe_job_id_accepted() {
        let body = br#"{"id":"a1B2-c3_d4.e5~f6"}"#;
        assert_eq!(parse_submission(&response(200, body)).unwrap(), "a1B2-c3_d4.e5~f6");
    }

    #[test]
    fn rejected_submission_is_transport_error() {
        let err = parse_submission(&response(401, b"unauthorized")).unwrap_err();
        assert!(matches!(
            err,
            GenError::Transport { status: 401, ref body } if body == "unauthorized"
        ));
    }

    #[test]
    fn poll_statuses_classified() {
        assert_eq!(interpret_poll(response(202, b"{}")), JobStatus::InProgress);
        assert!(matches!(interpret_poll(response(200, b"png")), JobStatus::Succeeded(_)));
        assert_eq!(
            interpret_poll(response(404, b"no such job")),
            JobStatus::Failed {
                status: 404,
                detail: "no such job".into()
            }
        );
        assert!(matches!(
            interpret_poll(response(503, b"")),
            JobStatus::Failed { status: 503, .. }
        ));
    }
}
