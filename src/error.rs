//! Error types for the export engine

use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing, planning or encoding an export
#[derive(Error, Debug)]
pub enum Error {
    /// The capture target does not exist at call time
    #[error("Region not found: {0}")]
    RegionNotFound(String),

    /// The rasterizer located the region but could not produce pixels
    #[error("Capture failed: {0}")]
    CaptureError(String),

    /// The captured raster has no pixels in one dimension
    #[error("Captured region is empty")]
    EmptyCapture,

    /// The document encoder rejected an operation
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// Catch-all raised by the export entry points; the cause is kept as the source
    #[error("Failed to export PDF")]
    ExportFailed(#[source] Box<Error>),

    /// Invalid export options
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap `self` as an `ExportFailed` unless it already is one.
    pub fn into_export_failed(self) -> Error {
        match self {
            Error::ExportFailed(_) => self,
            other => Error::ExportFailed(Box::new(other)),
        }
    }

    /// The innermost error, looking through `ExportFailed` wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::ExportFailed(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// Whether this error (or the cause it wraps) is a missing capture target.
    pub fn is_region_not_found(&self) -> bool {
        matches!(self.root_cause(), Error::RegionNotFound(_))
    }

    /// Full message including the wrapped cause, suitable for logs.
    pub fn detailed_message(&self) -> String {
        match self {
            Error::ExportFailed(inner) => format!("{}: {}", self, inner.detailed_message()),
            other => other.to_string(),
        }
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::CaptureError(err.to_string())
    }
}

impl From<lopdf::Error> for Error {
    fn from(err: lopdf::Error) -> Self {
        Error::EncodingFailed(err.to_string())
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_failed_keeps_cause() {
        let err = Error::RegionNotFound("kpi-panel".into()).into_export_failed();
        assert_eq!(err.to_string(), "Failed to export PDF");
        assert!(err.is_region_not_found());
        assert_eq!(
            err.detailed_message(),
            "Failed to export PDF: Region not found: kpi-panel"
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Region not found: kpi-panel"));
    }

    #[test]
    fn wrapping_is_idempotent() {
        let err = Error::EncodingFailed("disk full".into())
            .into_export_failed()
            .into_export_failed();
        match err {
            Error::ExportFailed(inner) => assert!(matches!(*inner, Error::EncodingFailed(_))),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
