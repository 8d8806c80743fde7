// graph_bulk_importer/src/error.rs
// Defines the error type shared by the mapper, the loaders and the driver.

use thiserror::Error;

#[derive(Debug, Error,)]
pub enum ImporterError {
    #[error("{name} cannot be null, empty or whitespace: {reason}")]
    InvalidArgument { name: String, reason: String, },
    #[error("{shape} does not have expected property '{field}'")]
    MissingField { shape: String, field: String, },
    #[error("Failed to connect to database: {0}")]
    ConnectionError(String,),
    #[error("Failed to import data: {0}")]
    IngestionError(String,),
    #[error("Invalid configuration: {0}")]
    ConfigurationError(String,),
    #[error("Database specific error: {0}")]
    DatabaseError(String,),
    #[error("Bulk import cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error,),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error,),
    #[error("Other error: {0}")]
    Other(String,),
}

impl ImporterError {
    pub fn invalid_argument(name: &str, reason: impl Into<String,>,) -> Self {
        ImporterError::InvalidArgument {
            name:   name.to_string(),
            reason: reason.into(),
        }
    }

    pub fn missing_field(shape: &str, field: &str,) -> Self {
        ImporterError::MissingField {
            shape: shape.to_string(),
            field: field.to_string(),
        }
    }

    pub fn is_transient(&self,) -> bool {
        match self {
            ImporterError::ConnectionError(_,) => true,
            ImporterError::DatabaseError(msg,) => {
                let m = msg.to_lowercase();
                m.contains("timeout",)
                    || m.contains("connection",)
                    || m.contains("busy",)
                    || m.contains("deadlock",)
                    || m.contains("throttl",)
                    || m.contains("connection reset",)
                    || m.contains("service unavailable",)
            },
            _ => false,
        }
    }
}

pub type Result<T,> = std::result::Result<T, ImporterError,>;
