//! Error types for the registry and the configuration store.

use mockd_protocol::{ControlError, ControlErrorCode};

/// Failures of lifecycle and persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Server already running on port {0}")]
    PortInUse(u16),

    #[error("No server running on port {0}")]
    NoServerOnPort(u16),

    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to persist configuration for port {port}: {source}")]
    Persistence {
        port: u16,
        #[source]
        source: StoreError,
    },
}

/// Failures writing the configuration document.
///
/// Read failures never surface: a missing or corrupt document reads as empty.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize configurations: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RegistryError {
    pub fn port(&self) -> u16 {
        match self {
            Self::PortInUse(port) | Self::NoServerOnPort(port) => *port,
            Self::Bind { port, .. } | Self::Persistence { port, .. } => *port,
        }
    }

    pub fn code(&self) -> ControlErrorCode {
        match self {
            Self::PortInUse(_) => ControlErrorCode::PortInUse,
            Self::NoServerOnPort(_) => ControlErrorCode::NoServerOnPort,
            Self::Bind { .. } => ControlErrorCode::BindFailure,
            Self::Persistence { .. } => ControlErrorCode::PersistenceFailure,
        }
    }
}

impl From<RegistryError> for ControlError {
    fn from(err: RegistryError) -> Self {
        ControlError::for_port(err.code(), err.port(), err.to_string())
    }
}
