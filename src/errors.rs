/*!
 * Error types for the subflow pipeline.
 *
 * Provider failures are transient and feed the batch retry policy, pipeline
 * errors describe why a job or batch cannot make progress, and `AppError`
 * wraps everything for the CLI surface.
 */

use thiserror::Error;

/// Errors that can occur when talking to a translation backend
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The call did not finish inside its time budget
    #[error("Provider call timed out after {seconds}s")]
    Timeout {
        /// Budget that was exceeded
        seconds: u64,
    },

    /// The provider answered without any translated text
    #[error("Provider returned no translations")]
    EmptyResponse,

    /// The backend does not offer the requested capability
    #[error("Operation not supported by backend: {0}")]
    Unsupported(String),

    /// A call that failed after the provider had already billed it
    #[error("{source} ({usage} units billed)")]
    Billed {
        /// What went wrong with the answer
        source: Box<ProviderError>,
        /// Usage reported for the call
        usage: u64,
    },
}

impl ProviderError {
    /// Map a non-success HTTP status to the closest provider error
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError {
                status_code,
                message,
            },
        }
    }
}

impl ProviderError {
    /// Attach the usage a failed call was still billed for
    pub fn billed(self, usage: u64) -> Self {
        if usage == 0 {
            self
        } else {
            Self::Billed {
                source: Box::new(self),
                usage,
            }
        }
    }

    /// Usage billed for the failed call; zero when nothing was reported
    pub fn billed_usage(&self) -> u64 {
        match self {
            Self::Billed { usage, .. } => *usage,
            _ => 0,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout { seconds: 0 }
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }
}

/// Errors raised while driving a translation job through the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No usable source subtitle could be fetched
    #[error("Source subtitle unavailable: {0}")]
    SourceUnavailable(String),

    /// Translation backend failure (after retries when raised by a worker)
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// The source provider could not be reached; safe to redeliver
    #[error("Source provider error: {0}")]
    SourceFetch(String),

    /// Backend kept returning the wrong number of entries
    #[error("Translation count mismatch: expected {expected}, received {received}")]
    CountMismatch {
        /// Number of texts sent
        expected: usize,
        /// Number of texts in the last answer
        received: usize,
    },

    /// Content identity could not be resolved with enough confidence
    #[error("Content identity for '{opaque_id}' is ambiguous (confidence {confidence:.2})")]
    IdentityAmbiguous {
        /// Identifier supplied by the client
        opaque_id: String,
        /// Resolver confidence in the 0..=1 range
        confidence: f32,
    },

    /// The source document could not be parsed into cues
    #[error("Subtitle parse error: {0}")]
    Parse(String),

    /// Store or artifact I/O failed; safe to redeliver
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Requested status change is not part of the job lifecycle
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// The referenced job does not exist
    #[error("Translation job {0} not found")]
    JobNotFound(i64),
}

impl PipelineError {
    /// Whether a redelivery of the same task could change the outcome
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Persistence(_) | Self::Provider(_) | Self::SourceFetch(_)
        )
    }

    /// Errors that end the job no matter how often the task is retried
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }
}

impl From<anyhow::Error> for PipelineError {
    fn from(error: anyhow::Error) -> Self {
        match error.downcast::<PipelineError>() {
            Ok(pipeline) => pipeline,
            Err(other) => Self::Persistence(format!("{:#}", other)),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from the job pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::Config(error.to_string())
    }
}
