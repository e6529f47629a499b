//! Error types for regulatory file preparation.
//! Every stage reports through one taxonomy so the orchestration can turn any
//! failure into a single human-readable message.

use thiserror::Error;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Classified failures of the prepare/verify pipelines
#[derive(Error, Debug, miette::Diagnostic)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(dgoj::configuration),
        help("fix the processor configuration; this error is never retried")
    )]
    ConfigurationError(String),

    #[error("Invalid PEM format: {0}")]
    #[diagnostic(code(dgoj::pem))]
    InvalidPemFormat(String),

    #[error("Key load error: {0}")]
    #[diagnostic(code(dgoj::key))]
    KeyLoadError(String),

    #[error("XML parse error: {0}")]
    #[diagnostic(code(dgoj::xml))]
    XmlParseError(String),

    #[error("Signing error: {0}")]
    #[diagnostic(code(dgoj::signing))]
    SigningError(String),

    #[error("Archive error: {0}")]
    #[diagnostic(code(dgoj::archive))]
    ArchiveError(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(dgoj::io))]
    IoError(String),

    #[error("Verification error: {0}")]
    #[diagnostic(code(dgoj::verification))]
    VerificationError(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(error: std::io::Error) -> Self {
        PipelineError::IoError(error.to_string())
    }
}

impl From<openssl::error::ErrorStack> for PipelineError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        PipelineError::SigningError(error.to_string())
    }
}

impl From<zip::result::ZipError> for PipelineError {
    fn from(error: zip::result::ZipError) -> Self {
        PipelineError::ArchiveError(error.to_string())
    }
}

impl From<quick_xml::Error> for PipelineError {
    fn from(error: quick_xml::Error) -> Self {
        PipelineError::XmlParseError(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PipelineError::ConfigurationError("Certificate missing".to_string());
        assert_eq!(error.to_string(), "Configuration error: Certificate missing");

        let error = PipelineError::InvalidPemFormat("missing BEGIN marker".to_string());
        assert_eq!(error.to_string(), "Invalid PEM format: missing BEGIN marker");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        match PipelineError::from(io) {
            PipelineError::IoError(msg) => assert!(msg.contains("no such file")),
            other => panic!("Wrong error type: {other:?}"),
        }
    }

    #[test]
    fn test_zip_error_maps_to_archive_error() {
        let error: PipelineError = zip::result::ZipError::FileNotFound.into();
        assert!(matches!(error, PipelineError::ArchiveError(_)));
    }
}
