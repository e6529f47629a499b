//! DGOJ Regulatory File Signer Library
//!
//! Prepares XML files for submission to the Spanish gambling regulator
//! (DGOJ): XAdES-BES signature, Deflate compression and WinZip AES-256
//! encryption, in that order.
//!
//! ```no_run
//! use dgoj_signer::{prepare_regulatory_file, PrepareConfiguration};
//!
//! let config = PrepareConfiguration::from_properties([
//!     ("Certificate Path", "/etc/dgoj/cert.pem"),
//!     ("Private Key Path", "/etc/dgoj/key.pem"),
//!     ("ZIP Encryption Password", "Tr0ub4dor&3#Complex$Pass!word1234567890ABCDEFGHIJK"),
//! ]);
//! let outcome = prepare_regulatory_file(&config, b"<Root><Value>42</Value></Root>");
//! assert!(outcome.is_success());
//! ```

pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

pub use domain::artifact::{ArtifactAttributes, PipelineOutcome, PreparedArtifact};
pub use domain::credential::{CredentialInput, CredentialSlot, NormalizedPem};
pub use domain::types::{EntryFilename, KeyPassword, SignatureMethod, ZipPassword};
pub use domain::verification::VerificationReport;
pub use infra::config::{ConfigManager, PipelineSettings, PrepareConfiguration};
pub use infra::error::{PipelineError, PipelineResult};
pub use pipelines::{PrepareWorkflow, VerifyWorkflow};
pub use services::{
    normalize_pem, CredentialResolver, EncryptedArchiver, KeyMaterial, SignatureVerifier,
    XadesSigner,
};

/// Validate `config` and run the full pipeline over `xml`.
///
/// Configuration errors are reported as a failure outcome like any other
/// stage error.
#[must_use]
pub fn prepare_regulatory_file(config: &PrepareConfiguration, xml: &[u8]) -> PipelineOutcome {
    pipelines::prepare::outcome_of(
        PrepareWorkflow::from_configuration(config).and_then(|workflow| workflow.execute(xml)),
    )
}
