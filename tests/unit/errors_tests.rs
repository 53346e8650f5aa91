/*!
 * Tests for the error taxonomy
 */

use subflow::errors::{AppError, PipelineError, ProviderError};

#[test]
fn test_fromStatus_shouldMapAuthAndRateLimits() {
    assert!(matches!(
        ProviderError::from_status(401, "bad key"),
        ProviderError::AuthenticationError(_)
    ));
    assert!(matches!(
        ProviderError::from_status(429, "slow down"),
        ProviderError::RateLimitExceeded(_)
    ));
    assert!(matches!(
        ProviderError::from_status(503, "busy"),
        ProviderError::ApiError { status_code: 503, .. }
    ));
}

#[test]
fn test_billed_shouldKeepUsageOfFailedCall() {
    let error = ProviderError::EmptyResponse.billed(120);
    assert_eq!(error.billed_usage(), 120);
    assert_eq!(error.to_string(), "Provider returned no translations (120 units billed)");

    let unbilled = ProviderError::ParseError("garbage".to_string()).billed(0);
    assert!(matches!(unbilled, ProviderError::ParseError(_)));
    assert_eq!(unbilled.billed_usage(), 0);
}

#[test]
fn test_isRetryable_shouldSeparateTransientFromTerminal() {
    let transient = [
        PipelineError::Provider(ProviderError::Timeout { seconds: 60 }),
        PipelineError::Persistence("database is locked".to_string()),
        PipelineError::SourceFetch("connection reset".to_string()),
    ];
    for error in &transient {
        assert!(error.is_retryable(), "{} should be retryable", error);
    }

    let terminal = [
        PipelineError::SourceUnavailable("none".to_string()),
        PipelineError::CountMismatch {
            expected: 60,
            received: 59,
        },
        PipelineError::Parse("empty".to_string()),
        PipelineError::JobNotFound(7),
        PipelineError::IdentityAmbiguous {
            opaque_id: "x".to_string(),
            confidence: 0.1,
        },
    ];
    for error in &terminal {
        assert!(error.is_terminal(), "{} should be terminal", error);
    }
}

#[test]
fn test_fromAnyhow_shouldRecoverWrappedPipelineError() {
    let wrapped = anyhow::Error::new(PipelineError::JobNotFound(3));
    assert!(matches!(PipelineError::from(wrapped), PipelineError::JobNotFound(3)));

    let other = anyhow::anyhow!("disk full");
    match PipelineError::from(other) {
        PipelineError::Persistence(message) => assert!(message.contains("disk full")),
        unexpected => panic!("unexpected variant: {:?}", unexpected),
    }
}

#[test]
fn test_display_shouldDescribeCountMismatch() {
    let error = PipelineError::CountMismatch {
        expected: 10,
        received: 8,
    };
    assert_eq!(
        error.to_string(),
        "Translation count mismatch: expected 10, received 8"
    );
}

#[test]
fn test_appError_shouldWrapPipelineAndIoErrors() {
    let app: AppError = PipelineError::Parse("bad".to_string()).into();
    assert!(matches!(app, AppError::Pipeline(_)));

    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    assert!(matches!(AppError::from(io), AppError::File(_)));
}
