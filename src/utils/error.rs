use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Upstream API returned {status}: {message}")]
    UpstreamError { status: u16, message: String },

    #[error("Malformed response from stage '{stage}': {message}")]
    MalformedResponse { stage: String, message: String },

    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<AnalyzerError>,
    },

    #[error("Invalid document '{file_name}': {reason}")]
    InvalidDocument { file_name: String, reason: String },

    #[error("Missing API key: {hint}")]
    MissingApiKey { hint: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Network,
    Upstream,
    Response,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnalyzerError {
    /// Wraps an error with the name of the stage it came from. Already
    /// wrapped errors are returned untouched.
    pub fn in_stage(self, stage: &str) -> Self {
        match self {
            wrapped @ AnalyzerError::StageFailed { .. } => wrapped,
            other => AnalyzerError::StageFailed {
                stage: stage.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The innermost error, looking through stage wrappers.
    pub fn root(&self) -> &AnalyzerError {
        match self {
            AnalyzerError::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.root() {
            AnalyzerError::ApiError(_) => ErrorCategory::Network,
            AnalyzerError::UpstreamError { .. } => ErrorCategory::Upstream,
            AnalyzerError::MalformedResponse { .. } | AnalyzerError::SerializationError(_) => {
                ErrorCategory::Response
            }
            AnalyzerError::InvalidDocument { .. } => ErrorCategory::Input,
            AnalyzerError::MissingApiKey { .. }
            | AnalyzerError::ConfigError { .. }
            | AnalyzerError::InvalidConfigValueError { .. }
            | AnalyzerError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            AnalyzerError::IoError(_) | AnalyzerError::StageFailed { .. } => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network | ErrorCategory::Upstream if self.is_retryable() => {
                ErrorSeverity::Medium
            }
            ErrorCategory::Network | ErrorCategory::Upstream => ErrorSeverity::High,
            ErrorCategory::Response | ErrorCategory::Input => ErrorSeverity::High,
            ErrorCategory::Configuration | ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// Whether a repeated request could plausibly succeed. Follows the
    /// hosted SDK: timeouts, conflicts, rate limits and server errors.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            AnalyzerError::ApiError(e) => e.is_timeout() || e.is_connect(),
            AnalyzerError::UpstreamError { status, .. } => {
                matches!(*status, 408 | 409 | 429) || *status >= 500
            }
            _ => false,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.root() {
            AnalyzerError::MissingApiKey { .. } => {
                "Set ANTHROPIC_API_KEY in the environment or add it to secrets.toml"
            }
            AnalyzerError::UpstreamError { status: 401, .. }
            | AnalyzerError::UpstreamError { status: 403, .. } => {
                "Check that the API key is valid and has access to the configured model"
            }
            AnalyzerError::UpstreamError { status: 429, .. } => {
                "Rate limit reached; wait a moment and run the analysis again"
            }
            AnalyzerError::UpstreamError { .. } | AnalyzerError::ApiError(_) => {
                "The API could not be reached or failed; retry later or raise timeout_seconds"
            }
            AnalyzerError::InvalidDocument { .. } => "Upload a readable PDF energy bill",
            AnalyzerError::MalformedResponse { .. } | AnalyzerError::SerializationError(_) => {
                "The model did not return the expected JSON; run the analysis again"
            }
            AnalyzerError::IoError(_) => "Check file paths and permissions",
            _ => "Review the configuration file and command-line flags",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            AnalyzerError::StageFailed { stage, source } => {
                format!("{} failed: {}", stage, source.user_friendly_message())
            }
            AnalyzerError::MissingApiKey { .. } => {
                "No ANTHROPIC_API_KEY was found".to_string()
            }
            AnalyzerError::UpstreamError { status, message } => {
                format!("The API rejected the request ({}): {}", status, message)
            }
            AnalyzerError::InvalidDocument { file_name, reason } => {
                format!("'{}' is not a usable PDF: {}", file_name, reason)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
