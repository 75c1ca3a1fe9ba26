use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Service '{service_id}' is currently closed")]
    ServiceClosed { service_id: String },

    #[error("Service '{service_id}' does not exist")]
    ServiceNotFound { service_id: String },

    #[error("Invalid priority tier: {value}")]
    InvalidPriority { value: String },

    #[error("Invalid direction: {value}")]
    InvalidDirection { value: String },

    #[error("Queue store error: {message}")]
    StoreError { message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Scheduling,
    Storage,
    Configuration,
}

impl QueueError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            QueueError::ServiceClosed { .. }
            | QueueError::ServiceNotFound { .. }
            | QueueError::InvalidPriority { .. }
            | QueueError::InvalidDirection { .. } => ErrorCategory::Scheduling,
            QueueError::StoreError { .. }
            | QueueError::IoError(_)
            | QueueError::SerializationError(_) => ErrorCategory::Storage,
            QueueError::ConfigValidationError { .. }
            | QueueError::InvalidConfigValueError { .. }
            | QueueError::MissingConfigError { .. } => ErrorCategory::Configuration,
        }
    }

    /// Scheduling errors leave the store untouched, so the caller can retry
    /// or pick another service.
    pub fn is_recoverable(&self) -> bool {
        self.category() == ErrorCategory::Scheduling
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            QueueError::ServiceClosed { service_id } => {
                format!("The '{}' queue is closed right now, try again later", service_id)
            }
            QueueError::ServiceNotFound { service_id } => {
                format!("There is no service called '{}'", service_id)
            }
            QueueError::InvalidPriority { value } => {
                format!("'{}' is not a priority, use low, medium or high", value)
            }
            QueueError::InvalidDirection { value } => {
                format!("'{}' is not a direction, use up or down", value)
            }
            other => match other.category() {
                ErrorCategory::Storage => format!("Queue data could not be read or saved: {}", other),
                _ => format!("Configuration problem: {}", other),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
