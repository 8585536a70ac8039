//! Error types for loading and transport.

use thiserror::Error;

/// Errors that can resolve a bundle request.
///
/// `Clone` because one failed attempt is delivered to every caller
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// No descriptor was registered under this name.
    #[error("Unknown bundle: {0}")]
    UnknownBundle(String),

    /// The bundle's loader returned an error.
    #[error("Bundle {bundle} failed to load: {message}")]
    Failed { bundle: String, message: String },

    /// The bundle's loader panicked.
    #[error("Bundle {0} loader panicked")]
    Panicked(String),

    /// The load task went away before reporting a result.
    #[error("Bundle {0} load was aborted")]
    Aborted(String),
}

impl LoadError {
    /// Name of the bundle this error belongs to.
    pub fn bundle(&self) -> &str {
        match self {
            LoadError::UnknownBundle(name)
            | LoadError::Panicked(name)
            | LoadError::Aborted(name) => name,
            LoadError::Failed { bundle, .. } => bundle,
        }
    }
}

/// Errors that can occur when handing a batch to a transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Writing to a file or socket failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The payload could not be encoded.
    #[error("Failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The receiving end is gone.
    #[error("Transport closed")]
    Closed,

    /// The receiver refused the payload.
    #[error("Payload rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_names_its_bundle() {
        let err = LoadError::Failed {
            bundle: "charts".into(),
            message: "404".into(),
        };
        assert_eq!(err.bundle(), "charts");
        assert_eq!(err.to_string(), "Bundle charts failed to load: 404");
        assert_eq!(LoadError::Panicked("x".into()).bundle(), "x");
    }

    #[test]
    fn io_errors_convert() {
        let err: TransportError =
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
