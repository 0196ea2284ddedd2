use crate::dispatch::payload::Mode;
use crate::dispatch::transport::RawResponse;
use crate::dispatch::{Artifact, ResponseInterpreter};
use crate::error::GenError;

/// Immediate mode: the submission response is the artifact.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncInterpreter;

impl SyncInterpreter {
    pub fn interpret_now(&self, submission: RawResponse) -> Result<Artifact, GenError> {
        if !submission.is_success() {
            return Err(GenError::Transport {
                status: submission.status,
                body: submission.body_text(),
            });
        }
        Ok(Artifact::from_response(submission))
    }
}

impl ResponseInterpreter for SyncInterpreter {
    fn mode(&self) -> Mode {
        Mode::Sync
    }

    async fn interpret(&self, submission: RawResponse) -> Result<Artifact, GenError> {
        self.interpret_now(submission)
    }
}
