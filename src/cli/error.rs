//! CLI-level errors (wraps infrastructure errors)

use thiserror::Error;

use crate::application::ApplicationError;
use crate::domain::{DomainError, FaultCategory};
use crate::infrastructure::InfraError;

/// CLI errors are the top-level error type.
/// These are what get displayed to the user.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Infra(#[from] InfraError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("{0}")]
    Usage(String),
}

impl From<ApplicationError> for CliError {
    fn from(e: ApplicationError) -> Self {
        CliError::Infra(InfraError::Application(e))
    }
}

impl From<DomainError> for CliError {
    fn from(e: DomainError) -> Self {
        ApplicationError::Domain(e).into()
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

impl CliError {
    /// Get the appropriate exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgs(_) | CliError::Usage(_) => crate::exitcode::USAGE,
            CliError::Infra(e) => match e {
                InfraError::Io { .. } => crate::exitcode::IOERR,
                InfraError::Vault { .. } => crate::exitcode::UNAVAILABLE,
                InfraError::Application(app) => application_exit_code(app),
            },
        }
    }
}

fn application_exit_code(e: &ApplicationError) -> i32 {
    if e.category() == FaultCategory::Security {
        return crate::exitcode::NOPERM;
    }
    match e {
        ApplicationError::Config { .. } => crate::exitcode::CONFIG,
        ApplicationError::Format { .. } => crate::exitcode::DATAERR,
        ApplicationError::UnknownReader(_) => crate::exitcode::USAGE,
        ApplicationError::OperationFailed { .. } => crate::exitcode::IOERR,
        ApplicationError::LoadAborted { source, .. } => application_exit_code(source),
        ApplicationError::Domain(d) => match d {
            DomainError::MalformedQuery { .. } => crate::exitcode::USAGE,
            DomainError::UnresolvedInclude { .. } | DomainError::UnresolvedResource { .. } => {
                crate::exitcode::NOINPUT
            }
            _ => crate::exitcode::DATAERR,
        },
    }
}
