//! Error types for the object store gateway and the backup store built on it.

use std::io;
use thiserror::Error;

/// Failures reported by an [`ObjectStoreGateway`](crate::services::gateway::ObjectStoreGateway).
///
/// `Service` is a rejection issued by the remote store itself (unknown upload,
/// bad part list, missing copy source). Every other variant is a transport or
/// backend fault.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{code}: {}", message.as_deref().unwrap_or("no message"))]
    Service {
        code: String,
        message: Option<String>,
    },
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Build a service rejection with a diagnostic message.
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            code: code.into(),
            message: Some(message.into()),
        }
    }

    /// True when the remote store answered and refused the request.
    pub fn is_service(&self) -> bool {
        matches!(self, Self::Service { .. })
    }

    /// Most specific diagnostic available: the service message, falling back
    /// to the error code.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Service { code, message } => message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(code)
                .to_string(),
            other => other.to_string(),
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced by [`BackupStore`](crate::services::backup_store::BackupStore).
#[derive(Debug, Error)]
pub enum BackupStoreError {
    #[error("backup file `{0}` already exists")]
    BackupFileExists(String),
    #[error("invalid backup filename `{0}`")]
    InvalidFilename(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("object store unavailable")]
    StoreUnavailable(#[source] GatewayError),
}

impl From<GatewayError> for BackupStoreError {
    fn from(err: GatewayError) -> Self {
        if err.is_service() {
            BackupStoreError::Storage(err.diagnostic())
        } else {
            BackupStoreError::StoreUnavailable(err)
        }
    }
}

pub type BackupStoreResult<T> = Result<T, BackupStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_diagnostic_prefers_message() {
        let err = GatewayError::service("NoSuchUpload", "upload abc does not exist");
        assert_eq!(err.diagnostic(), "upload abc does not exist");
    }

    #[test]
    fn service_diagnostic_falls_back_to_code() {
        let err = GatewayError::Service {
            code: "AccessDenied".into(),
            message: Some("  ".into()),
        };
        assert_eq!(err.diagnostic(), "AccessDenied");

        let mapped: BackupStoreError = err.into();
        assert!(matches!(mapped, BackupStoreError::Storage(ref m) if m == "AccessDenied"));
    }

    #[test]
    fn transport_faults_stay_unavailable() {
        let err = GatewayError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
        let mapped: BackupStoreError = err.into();
        assert!(matches!(
            mapped,
            BackupStoreError::StoreUnavailable(GatewayError::Io(_))
        ));
    }
}
