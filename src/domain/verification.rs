//! Verification domain types for XAdES-signed documents.
//!
//! Aggregates results from verification steps; the cryptographic checks live
//! in the verifier service. This keeps the domain layer free of direct crypto
//! dependencies while providing a stable reporting contract to the workflows.

use serde::Serialize;

/// Result of verifying a signed XML document.
///
/// - `references_ok`: every `ds:Reference` digest matches its recomputed value
/// - `signature_ok`: `ds:SignatureValue` verifies over canonical `ds:SignedInfo`
/// - `signing_certificate_ok`: the XAdES `SigningCertificate` digest matches
///   the certificate in `ds:KeyInfo`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub references_ok: bool,
    pub signature_ok: bool,
    pub signing_certificate_ok: bool,
    /// Human-readable reasons for each failed check
    pub failures: Vec<String>,
}

impl VerificationReport {
    #[must_use]
    pub fn new(references_ok: bool, signature_ok: bool, signing_certificate_ok: bool) -> Self {
        Self {
            references_ok,
            signature_ok,
            signing_certificate_ok,
            failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_failures(mut self, failures: Vec<String>) -> Self {
        self.failures = failures;
        self
    }

    /// Overall success indicator - true only if all checks passed.
    #[must_use]
    pub fn success(&self) -> bool {
        self.references_ok && self.signature_ok && self.signing_certificate_ok
    }
}
