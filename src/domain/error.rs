//! Domain-level errors (no external dependencies)

use thiserror::Error;

/// Fault taxonomy used to decide how a failure propagates through a load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCategory {
    /// Malformed input or an incomplete tree: aborts the load.
    Structural,
    /// Vault or passcode problems: aborts the load.
    Security,
    /// A lifecycle transition that is not allowed from the current state.
    State,
}

/// Failures raised by the encryption vault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecurityFault {
    #[error("vault unavailable: {vault}: {reason}")]
    VaultUnavailable { vault: String, reason: String },

    #[error("decryption returned an empty value (vault {vault})")]
    EmptyDecryption { vault: String },

    #[error("vault passcode does not match configuration key hash (vault {vault})")]
    PasscodeMismatch { vault: String },

    #[error("cipher failure in vault {vault}: {reason}")]
    Cipher { vault: String, reason: String },
}

/// Domain errors represent violations of the tree model and query language.
/// Lookup misses are not errors: they surface as `Ok(None)`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("malformed query '{query}': {reason}")]
    MalformedQuery { query: String, reason: String },

    #[error("invalid node name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("node has no name assigned")]
    UnnamedNode,

    #[error("required value missing: {0}")]
    MissingRequired(String),

    #[error("unresolved include at {path}: {reason}")]
    UnresolvedInclude { path: String, reason: String },

    #[error("unresolved resource at {path}: {reason}")]
    UnresolvedResource { path: String, reason: String },

    #[error("include '{name}' requires version {required}, found {actual}")]
    IncompatibleVersion {
        name: String,
        required: String,
        actual: String,
    },

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("cannot convert '{value}' to {target}")]
    TypeCoercion { value: String, target: String },

    #[error("include cycle detected at: {0}")]
    IncludeCycle(String),

    #[error("unsupported operation on {kind} node: {operation}")]
    UnsupportedOperation { kind: String, operation: String },

    #[error("invalid state transition: {operation} from {state}")]
    InvalidState { state: String, operation: String },

    #[error("stale or foreign node handle")]
    StaleHandle,

    #[error(transparent)]
    Security(#[from] SecurityFault),
}

impl DomainError {
    pub fn category(&self) -> FaultCategory {
        match self {
            DomainError::Security(_) => FaultCategory::Security,
            DomainError::InvalidState { .. } => FaultCategory::State,
            _ => FaultCategory::Structural,
        }
    }

    pub(crate) fn malformed(query: &str, reason: impl Into<String>) -> Self {
        DomainError::MalformedQuery {
            query: query.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_of_security_fault() {
        let err: DomainError = SecurityFault::EmptyDecryption {
            vault: "default".into(),
        }
        .into();
        assert_eq!(err.category(), FaultCategory::Security);
    }

    #[test]
    fn test_category_of_structural_faults() {
        assert_eq!(
            DomainError::malformed("a[", "unterminated index").category(),
            FaultCategory::Structural
        );
        assert_eq!(DomainError::UnnamedNode.category(), FaultCategory::Structural);
    }
}
