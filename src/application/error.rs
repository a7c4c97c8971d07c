//! Application-level errors (wraps domain errors)

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::{DomainError, FaultCategory, SecurityFault};

/// Application errors wrap domain errors and add application-level context.
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),

    #[error("config error: {message}")]
    Config { message: String },

    #[error("invalid {format} document {}: {message}", .path.display())]
    Format {
        format: String,
        path: PathBuf,
        message: String,
    },

    #[error("no reader registered for '{0}'")]
    UnknownReader(String),

    #[error("loading '{config}' aborted: {source}")]
    LoadAborted {
        config: String,
        #[source]
        source: Box<ApplicationError>,
    },

    #[error("operation failed: {context}")]
    OperationFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ApplicationError {
    /// Fault category of the underlying cause, looking through load aborts.
    pub fn category(&self) -> FaultCategory {
        match self {
            ApplicationError::Domain(e) => e.category(),
            ApplicationError::LoadAborted { source, .. } => source.category(),
            _ => FaultCategory::Structural,
        }
    }

    /// Innermost domain error, if the failure originated in the domain.
    pub fn domain_error(&self) -> Option<&DomainError> {
        match self {
            ApplicationError::Domain(e) => Some(e),
            ApplicationError::LoadAborted { source, .. } => source.domain_error(),
            _ => None,
        }
    }

    pub(crate) fn aborted(config: impl Into<String>, source: ApplicationError) -> Self {
        match source {
            // nested include aborts keep the outermost configuration name
            ApplicationError::LoadAborted { source, .. } => ApplicationError::LoadAborted {
                config: config.into(),
                source,
            },
            other => ApplicationError::LoadAborted {
                config: config.into(),
                source: Box::new(other),
            },
        }
    }
}

impl From<SecurityFault> for ApplicationError {
    fn from(fault: SecurityFault) -> Self {
        ApplicationError::Domain(DomainError::Security(fault))
    }
}

/// Result type for application layer operations.
pub type ApplicationResult<T> = Result<T, ApplicationError>;
