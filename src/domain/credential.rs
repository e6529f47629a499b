//! Credential domain types.
//!
//! A credential slot (certificate or private key) is configured through a
//! path-form and a PEM-form property. Exactly one of them may be populated; the
//! populated value is classified once into a [`CredentialInput`] and every later
//! stage works with that tagged value.

use crate::domain::constants::PEM_HEADER_PREFIX;
use crate::infra::error::{PipelineError, PipelineResult};
use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

/// The two credential slots the signer needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSlot {
    Certificate,
    PrivateKey,
}

impl CredentialSlot {
    /// Display name used by the host's property sheet
    #[must_use]
    pub fn property_name(&self) -> &'static str {
        match self {
            CredentialSlot::Certificate => "Certificate",
            CredentialSlot::PrivateKey => "Private Key",
        }
    }
}

impl fmt::Display for CredentialSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property_name())
    }
}

/// Where the credential material comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialInput {
    /// Filesystem path; contents are read verbatim
    FilePath(PathBuf),
    /// PEM text that may carry transport artifacts (escaped newlines, CRLF)
    InlinePem(Zeroizing<String>),
}

impl CredentialInput {
    /// Classify a raw configuration value as inline PEM or a filesystem path.
    ///
    /// Leading whitespace and leading escaped line breaks (`\n`, `\r` written
    /// as two characters) are skipped before looking for the BEGIN marker.
    #[must_use]
    pub fn classify(value: &str) -> Self {
        if looks_like_pem(value) {
            CredentialInput::InlinePem(Zeroizing::new(value.to_string()))
        } else {
            CredentialInput::FilePath(PathBuf::from(value.trim()))
        }
    }

    /// Resolve the path-form / PEM-form property pair of one slot.
    ///
    /// Both set or neither set is a configuration error.
    pub fn from_dual_input(
        slot: CredentialSlot,
        path_value: Option<&str>,
        pem_value: Option<&str>,
    ) -> PipelineResult<Self> {
        let path_value = path_value.filter(|v| !v.trim().is_empty());
        let pem_value = pem_value.filter(|v| !v.trim().is_empty());

        match (path_value, pem_value) {
            (Some(_), Some(_)) => Err(PipelineError::ConfigurationError(format!(
                "'{slot} Path' and '{slot}' are mutually exclusive; set only one"
            ))),
            (None, None) => Err(PipelineError::ConfigurationError(format!(
                "Either '{slot} Path' or '{slot}' must be provided"
            ))),
            (Some(value), None) | (None, Some(value)) => Ok(Self::classify(value)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            CredentialInput::FilePath(_) => "file path",
            CredentialInput::InlinePem(_) => "inline PEM",
        }
    }
}

// Inline PEM content is never printed
impl fmt::Debug for CredentialInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialInput::FilePath(path) => f.debug_tuple("FilePath").field(path).finish(),
            CredentialInput::InlinePem(pem) => write!(f, "InlinePem(len={})", pem.len()),
        }
    }
}

fn looks_like_pem(value: &str) -> bool {
    let mut rest = value.trim_start();
    loop {
        if let Some(stripped) = rest
            .strip_prefix("\\n")
            .or_else(|| rest.strip_prefix("\\r"))
        {
            rest = stripped.trim_start();
        } else {
            break;
        }
    }
    rest.starts_with(PEM_HEADER_PREFIX)
}

/// Canonical PEM block: BEGIN line, base64 wrapped at 64 columns, END line,
/// joined by `\n` with no trailing newline.
#[derive(Clone, PartialEq, Eq)]
pub struct NormalizedPem {
    label: String,
    text: Zeroizing<String>,
}

impl NormalizedPem {
    /// Only the normalizer constructs these; callers go through
    /// `services::pem_normalizer::normalize_pem`.
    pub(crate) fn from_parts(label: String, text: String) -> Self {
        Self {
            label,
            text: Zeroizing::new(text),
        }
    }

    /// Block label, e.g. `CERTIFICATE` or `ENCRYPTED PRIVATE KEY`
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }
}

impl fmt::Debug for NormalizedPem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NormalizedPem(label={}, len={})",
            self.label,
            self.text.len()
        )
    }
}
