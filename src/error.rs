//! Error types and handling for `SmogMap`

use thiserror::Error;

/// Main error type for the `SmogMap` library
#[derive(Error, Debug)]
pub enum SmogMapError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Non-2xx response from the air quality API
    #[error("{status} {status_text}")]
    Transport { status: u16, status_text: String },

    /// The request never produced a response (connect, timeout, TLS)
    #[error("Network error: {message}")]
    Network { message: String },

    /// Upstream JSON did not have the expected shape
    #[error("Unexpected data shape: {message}")]
    DataShape { message: String },

    /// Input validation errors
    #[error("Invalid input: {message}")]
    Validation { message: String },

    /// Cache operation errors
    #[error("Cache error: {message}")]
    Cache { message: String },
}

impl SmogMapError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new transport error from a response status
    pub fn transport<S: Into<String>>(status: u16, status_text: S) -> Self {
        Self::Transport {
            status,
            status_text: status_text.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new data shape error
    pub fn data_shape<S: Into<String>>(message: S) -> Self {
        Self::DataShape {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Whether this error came from talking to the API (either flavour)
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Network { .. })
    }

    /// Get a user-friendly error message
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            SmogMapError::Config { .. } => {
                "Configuration error. Please check your config file.".to_string()
            }
            SmogMapError::Transport {
                status,
                status_text,
            } => {
                format!("The air quality service answered {status} {status_text}.")
            }
            SmogMapError::Network { .. } => {
                "Unable to reach the air quality service. Please check your internet connection."
                    .to_string()
            }
            SmogMapError::DataShape { .. } => {
                "The air quality service returned data in an unexpected format.".to_string()
            }
            SmogMapError::Validation { message } => {
                format!("Invalid input: {message}")
            }
            SmogMapError::Cache { .. } => {
                "Cache operation failed. You may need to clear your cache.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = SmogMapError::config("missing base url");
        assert!(matches!(config_err, SmogMapError::Config { .. }));

        let transport_err = SmogMapError::transport(503, "Service Unavailable");
        assert!(matches!(
            transport_err,
            SmogMapError::Transport { status: 503, .. }
        ));

        let shape_err = SmogMapError::data_shape("station without id");
        assert!(matches!(shape_err, SmogMapError::DataShape { .. }));
    }

    #[test]
    fn test_transport_display_matches_status_line() {
        let err = SmogMapError::transport(404, "Not Found");
        assert_eq!(err.to_string(), "404 Not Found");
        assert!(err.is_transport());
        assert!(SmogMapError::network("timed out").is_transport());
        assert!(!SmogMapError::data_shape("x").is_transport());
    }

    #[test]
    fn test_user_messages() {
        let config_err = SmogMapError::config("test");
        assert!(config_err.user_message().contains("Configuration error"));

        let network_err = SmogMapError::network("test");
        assert!(network_err.user_message().contains("Unable to reach"));

        let transport_err = SmogMapError::transport(500, "Internal Server Error");
        assert!(transport_err.user_message().contains("500"));

        let validation_err = SmogMapError::validation("test input");
        assert!(validation_err.user_message().contains("test input"));

        let cache_err = SmogMapError::cache("disk full");
        assert!(cache_err.user_message().contains("Cache operation failed"));
    }
}
