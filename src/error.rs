// file: src/error.rs
// version: 3.0.0
// guid: 57b83a63-07b6-4534-aa6c-51e8797254e0

use thiserror::Error;

/// Result type alias for the registrar
pub type Result<T> = std::result::Result<T, RegistrarError>;

/// Error types for the node registrar
#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed hardware report: {0}")]
    Parse(String),

    #[error("Cannot fingerprint hardware: {0}")]
    Fingerprint(String),

    #[error("Featureless device cannot be hashed: {0}")]
    FeaturelessDevice(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cluster store error: {0}")]
    Store(String),

    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Certificate authority {0} unconfigured")]
    CaMissing(&'static str),

    #[error("Identity error: {0}")]
    Identity(String),

    #[error("Command `{command}` failed (exit code {exit_code:?}): {stderr}")]
    Process {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Coarse classification used to decide how an error is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller sent something unusable; stored state is untouched
    Input,
    /// The requested record does not exist
    NotFound,
    /// A collaborator (store, CA, storage cluster) failed
    Dependency,
    /// Anything else
    Internal,
}

impl RegistrarError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new report parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new fingerprint error
    pub fn fingerprint(msg: impl Into<String>) -> Self {
        Self::Fingerprint(msg.into())
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a new timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a new identity error
    pub fn identity(msg: impl Into<String>) -> Self {
        Self::Identity(msg.into())
    }

    /// Create a new archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse(_)
            | Self::Fingerprint(_)
            | Self::FeaturelessDevice(_)
            | Self::Validation(_)
            | Self::Serialization(_) => ErrorKind::Input,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Store(_)
            | Self::Etcd(_)
            | Self::Timeout(_)
            | Self::CaMissing(_)
            | Self::Identity(_)
            | Self::Process { .. } => ErrorKind::Dependency,
            Self::Io(_) | Self::Config(_) | Self::Archive(_) | Self::Yaml(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_errors_are_classified_as_input() {
        assert_eq!(RegistrarError::parse("bad json").kind(), ErrorKind::Input);
        assert_eq!(RegistrarError::fingerprint("no serials").kind(), ErrorKind::Input);
        assert_eq!(
            RegistrarError::FeaturelessDevice("pci".to_string()).kind(),
            ErrorKind::Input
        );
    }

    #[test]
    fn test_dependency_errors_are_classified_as_dependency() {
        assert_eq!(RegistrarError::CaMissing("key").kind(), ErrorKind::Dependency);
        assert_eq!(RegistrarError::timeout("etcd get").kind(), ErrorKind::Dependency);
        let err = RegistrarError::Process {
            command: "ceph osd create".to_string(),
            exit_code: Some(22),
            stderr: "EINVAL".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert!(err.to_string().contains("ceph osd create"));
    }

    #[test]
    fn test_ca_missing_message() {
        let err = RegistrarError::CaMissing("key");
        assert_eq!(err.to_string(), "Certificate authority key unconfigured");
    }
}
