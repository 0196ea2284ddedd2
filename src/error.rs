use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    #[error("malformed server response: {0}")]
    Protocol(String),

    #[error("timeout after {timeout_secs} seconds (job {job_id}, {polls} polls)")]
    TimedOut {
        job_id: String,
        timeout_secs: u64,
        polls: u32,
    },

    #[error("cancelled after {0}ms")]
    Cancelled(u64),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl GenError {
    /// HTTP status carried by transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns true for failures where resubmitting a fresh job may succeed.
    /// The client never acts on this itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            // 429 and 5xx are transient, other 4xx are the caller's fault
            Self::Transport { status, .. } => *status == 429 || *status >= 500,
            Self::TimedOut { .. } => true,
            Self::Request(_) => true,
            _ => false,
        }
    }

    /// Short reason suitable for display. Keeps the server-provided detail
    /// but never echoes credentials or job identifiers.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => format!("invalid request: {msg}"),
            Self::Config(msg) => format!("configuration error: {msg}"),
            Self::Transport { status, body } => {
                let body = body.trim();
                if body.is_empty() {
                    format!("generation failed with HTTP {status}")
                } else {
                    format!("generation failed with HTTP {status}: {}", preview(body, 500))
                }
            }
            Self::Protocol(msg) => format!("unexpected response from generation service: {msg}"),
            Self::TimedOut { timeout_secs, .. } => {
                format!("generation timed out after {timeout_secs} seconds")
            }
            Self::Cancelled(_) => "generation cancelled".to_string(),
            Self::Request(_) => "request to generation service failed".to_string(),
        }
    }
}

/// Head of `text`, at most `max` chars, with an ellipsis when cut.
fn preview(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if out.len() < text.len() {
        out.push_str("...");
    }
    out
}
