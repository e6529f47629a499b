//! `VerifyWorkflow`: opens a prepared archive and verifies the signed XML in it.
//!
//! Mirror image of `PrepareWorkflow`; delegates to the archiver and the
//! signature verifier.

use crate::{
    domain::{types::ZipPassword, verification::VerificationReport},
    services::{archiver::EncryptedArchiver, signature_verifier::SignatureVerifier},
    PipelineError, PipelineResult,
};
use openssl::x509::X509;

/// Orchestrates verification of a prepared archive.
pub struct VerifyWorkflow {
    archiver: EncryptedArchiver,
}

impl Default for VerifyWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl VerifyWorkflow {
    #[must_use]
    pub fn new() -> Self {
        Self {
            archiver: EncryptedArchiver::new(),
        }
    }

    /// Decrypt `entry` (or the only entry when `None`) and verify its signature.
    ///
    /// With `trusted` set the signature must verify against that certificate;
    /// otherwise the certificate embedded in `ds:KeyInfo` is used.
    pub fn verify_archive(
        &self,
        archive: &[u8],
        entry: Option<&str>,
        password: &ZipPassword,
        trusted: Option<&X509>,
    ) -> PipelineResult<VerificationReport> {
        let entry = match entry {
            Some(name) => name.to_string(),
            None => self.single_entry(archive)?,
        };
        log::info!("Verifying signed entry '{entry}'");
        let signed_xml = self.archiver.open_entry(archive, &entry, password)?;

        let verifier = match trusted {
            Some(certificate) => SignatureVerifier::with_trusted_certificate(certificate.clone()),
            None => SignatureVerifier::new(),
        };
        verifier.verify(&signed_xml)
    }

    fn single_entry(&self, archive: &[u8]) -> PipelineResult<String> {
        let mut names = self.archiver.list_entries(archive)?;
        match names.len() {
            1 => Ok(names.remove(0)),
            count => Err(PipelineError::ArchiveError(format!(
                "expected exactly one entry, archive has {count}; name the entry to verify"
            ))),
        }
    }
}
