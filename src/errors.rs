//! Errors for fleet sync
use reqwest::Method;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    /// Transport failure, no response was received (status 0)
    #[error("Network error: {method} {url}: {message}")]
    Network {
        method: Method,
        url: String,
        message: String,
    },

    /// Error status with a JSON (or empty) body
    #[error("HTTP {status} from {method} {url}: {body}")]
    Http {
        status: u16,
        method: Method,
        url: String,
        body: String,
    },

    /// 401, or an HTML login page served where JSON was expected
    #[error("Authentication required for {method} {url}")]
    AuthenticationRequired { method: Method, url: String },

    /// Non-JSON body that is not a login page
    #[error("Unexpected {content_type} response ({status}) from {method} {url}")]
    UnexpectedResponse {
        status: u16,
        method: Method,
        url: String,
        content_type: String,
    },

    /// Validation message reported by the backend
    #[error("Validation failed: {message}")]
    Validation { status: u16, message: String },

    /// JSON did not match the expected schema
    #[error("Could not decode response from {method} {url}: {message}")]
    Decode {
        method: Method,
        url: String,
        message: String,
    },

    #[error("No vessel selected")]
    NoVesselSelected,

    /// The vessel context was dropped, no further selection changes will come
    #[error("Vessel context closed")]
    ContextClosed,

    #[error("Invalid vessel id")]
    InvalidVesselId(String),

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Serialization error")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("HTTP client error")]
    ClientError(#[from] reqwest::Error),

    #[error("IO error")]
    IoError(#[from] std::io::Error),
}

impl FleetError {
    /// HTTP status associated with the error, 0 when no response was received
    pub fn status(&self) -> u16 {
        match self {
            FleetError::Http { status, .. }
            | FleetError::UnexpectedResponse { status, .. }
            | FleetError::Validation { status, .. } => *status,
            FleetError::AuthenticationRequired { .. } => 401,
            _ => 0,
        }
    }

    /// Transient failures worth retrying for idempotent requests
    pub fn is_retryable(&self) -> bool {
        match self {
            FleetError::Network { .. } => true,
            FleetError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
