/*!
 * Error types for the attrclean application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use thiserror::Error;

/// Errors that can occur when calling a translation provider
#[derive(Error, Debug)]
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

    /// The request did not complete within the provider timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// A batch reply could not be decomposed into the expected entries
    #[error("Unusable batch response: {0}")]
    Unparseable(#[from] ParseError),
}

impl ProviderError {
    /// Classify a transport error from reqwest
    pub fn from_reqwest(provider: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout(format!("{}: {}", provider, error))
        } else if error.is_connect() {
            Self::ConnectionError(format!("{}: {}", provider, error))
        } else {
            Self::RequestFailed(format!("{}: {}", provider, error))
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code: status, message },
        }
    }
}

/// Errors raised by the response parser
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The response held a different number of entries than requested
    #[error("insufficient translations: expected {expected}, found {found}")]
    Insufficient {
        /// Number of entries requested
        expected: usize,
        /// Number of entries recovered from the response
        found: usize,
    },

    /// The response was empty or whitespace only
    #[error("empty response")]
    Empty,
}

/// Errors raised while an edit session is open or being closed
#[derive(Error, Debug)]
pub enum TransactionError {
    /// A change was attempted outside an edit session
    #[error("layer '{0}' is not in edit mode")]
    NotEditing(String),

    /// An edit session was requested while one is already open
    #[error("layer '{0}' is already in edit mode")]
    AlreadyEditing(String),

    /// The store refused to commit the buffered changes
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// The feature count changed across the commit
    #[error("feature count changed from {before} to {after} during commit")]
    FeatureCountMismatch {
        /// Count before the task started
        before: usize,
        /// Count after the commit
        after: usize,
    },

    /// The named field does not exist
    #[error("unknown field '{0}'")]
    UnknownField(String),

    /// The feature id does not exist
    #[error("unknown feature {0}")]
    UnknownFeature(u64),
}

/// Errors raised by layer stores outside of a transaction
#[derive(Error, Debug)]
pub enum LayerError {
    /// Reading or writing the backing file failed
    #[error("I/O error on layer '{path}': {message}")]
    Io {
        /// Path of the layer file
        path: String,
        /// Underlying error message
        message: String,
    },

    /// The layer file is not valid
    #[error("invalid layer data: {0}")]
    InvalidData(String),

    /// The named field does not exist
    #[error("field '{0}' not found in layer")]
    FieldNotFound(String),

    /// The named field already exists
    #[error("field '{0}' already exists")]
    FieldExists(String),

    /// A transactional step failed
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Missing or invalid credential, endpoint, or request parameter
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A provider call failed
    #[error("Provider error: {0}")]
    AdapterCall(#[from] ProviderError),

    /// A batch response could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Commit failure or post-commit check failure
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    /// Layer store failure outside the edit session
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// The run was cancelled by the user
    #[error("Translation cancelled")]
    Cancelled,
}

/// Errors raised by the attribute cleaning operations
#[derive(Error, Debug)]
pub enum CleaningError {
    /// An option is out of range or inconsistent
    #[error("Invalid cleaning option: {0}")]
    InvalidOption(String),

    /// The supplied pattern is not a valid regular expression
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Layer store failure
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// The edit session failed
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from a layer store
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    /// Error from translation
    #[error("Translation error: {0}")]
    Translation(#[from] TranslationError),

    /// Error from a cleaning operation
    #[error("Cleaning error: {0}")]
    Cleaning(#[from] CleaningError),
}

// Utility functions for error conversion
impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
