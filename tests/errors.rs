use mediagen::GenError;

#[test]
fn transport_display_matches_http_status_and_body() {
    let err = GenError::Transport {
        status: 500,
        body: "internal error".into(),
    };
    assert_eq!(err.to_string(), "HTTP 500: internal error");
    assert_eq!(err.status(), Some(500));
}

#[test]
fn retryable_classification() {
    let transport = |status| GenError::Transport {
        status,
        body: String::new(),
    };
    assert!(transport(429).is_retryable());
    assert!(transport(502).is_retryable());
    assert!(!transport(400).is_retryable());
    assert!(!transport(404).is_retryable());
    assert!(
        GenError::TimedOut {
            job_id: "job".into(),
            timeout_secs: 30,
            polls: 4
        }
        .is_retryable()
    );
    assert!(!GenError::Validation("prompt is required".into()).is_retryable());
    assert!(!GenError::Protocol("Expected id in response".into()).is_retryable());
    assert!(!GenError::Cancelled(10).is_retryable());
}

#[test]
fn user_message_keeps_server_detail() {
    let err = GenError::Transport {
        status: 400,
        body: r#"{"errors":["aspect_ratio: invalid"]}"#.into(),
    };
    let msg = err.user_message();
    assert!(msg.starts_with("generation failed with HTTP 400"));
    assert!(msg.contains("aspect_ratio: invalid"));
}

#[test]
fn user_message_truncates_huge_bodies() {
    let err = GenError::Transport {
        status: 502,
        body: "x".repeat(10_000),
    };
    let msg = err.user_message();
    assert!(msg.len() < 600);
    assert!(msg.ends_with("..."));
}

#[test]
fn timeout_user_message_omits_job_id() {
    let err = GenError::TimedOut {
        job_id: "a1b2c3-secret".into(),
        timeout_secs: 500,
        polls: 50,
    };
    let msg = err.user_message();
    assert_eq!(msg, "generation timed out after 500 seconds");
    assert!(!msg.contains("a1b2c3"));
}

#[test]
fn cancelled_is_distinct_from_timeout() {
    let err = GenError::Cancelled(1234);
    assert_eq!(err.to_string(), "cancelled after 1234ms");
    assert_eq!(err.user_message(), "generation cancelled");
    assert_eq!(err.status(), None);
}
