//! Type-safe wrappers using new-type pattern
//!
//! This module provides validated wrappers for pipeline configuration values
//! so that invalid settings are rejected before any cryptographic work.

use crate::domain::constants::{DEFAULT_XML_FILENAME, EXPECTED_ZIP_PASSWORD_LENGTH};
use crate::infra::error::{PipelineError, PipelineResult};
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroizing;

/// Placement of the XAdES signature relative to the signed document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureMethod {
    /// Signature element is embedded as a child of the document element
    #[default]
    Enveloped,
    /// Signature element wraps the document inside a `ds:Object`
    Enveloping,
}

impl SignatureMethod {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureMethod::Enveloped => "enveloped",
            SignatureMethod::Enveloping => "enveloping",
        }
    }
}

impl FromStr for SignatureMethod {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "enveloped" => Ok(SignatureMethod::Enveloped),
            "enveloping" => Ok(SignatureMethod::Enveloping),
            other => Err(PipelineError::ConfigurationError(format!(
                "Unrecognized signature method '{other}'. Expected 'enveloped' or 'enveloping'"
            ))),
        }
    }
}

impl fmt::Display for SignatureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Password protecting the output archive
#[derive(Clone)]
pub struct ZipPassword(Zeroizing<String>);

impl ZipPassword {
    /// Create a new `ZipPassword`; only emptiness is a hard error
    pub fn new(password: impl Into<String>) -> PipelineResult<Self> {
        let password = Zeroizing::new(password.into());
        if password.is_empty() {
            return Err(PipelineError::ConfigurationError(
                "ZIP Encryption Password must not be empty".to_string(),
            ));
        }
        Ok(ZipPassword(password))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deviations from the regulator's password policy.
    ///
    /// The policy asks for 50 characters mixing letters, digits and special
    /// characters. These are reported, not enforced.
    #[must_use]
    pub fn policy_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let length = self.0.chars().count();
        if length != EXPECTED_ZIP_PASSWORD_LENGTH {
            warnings.push(format!(
                "ZIP password has {length} characters, expected {EXPECTED_ZIP_PASSWORD_LENGTH}"
            ));
        }
        if !self.0.chars().any(|c| c.is_ascii_alphabetic()) {
            warnings.push("ZIP password contains no letters".to_string());
        }
        if !self.0.chars().any(|c| c.is_ascii_digit()) {
            warnings.push("ZIP password contains no digits".to_string());
        }
        if !self.0.chars().any(|c| !c.is_ascii_alphanumeric()) {
            warnings.push("ZIP password contains no special characters".to_string());
        }
        warnings
    }
}

impl fmt::Debug for ZipPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ZipPassword([REDACTED], len={})", self.0.len())
    }
}

// Display is redacted to avoid accidental logging
impl fmt::Display for ZipPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[PASSWORD REDACTED]")
    }
}

/// Password for an encrypted private key
#[derive(Clone)]
pub struct KeyPassword(Zeroizing<String>);

impl KeyPassword {
    /// Blank input means "no password"
    #[must_use]
    pub fn from_optional(value: Option<&str>) -> Option<Self> {
        value
            .filter(|v| !v.trim().is_empty())
            .map(|v| KeyPassword(Zeroizing::new(v.to_string())))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for KeyPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPassword([REDACTED])")
    }
}

/// Name of the single XML entry inside the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryFilename(String);

impl EntryFilename {
    /// Create a new `EntryFilename` after validation
    pub fn new(name: impl AsRef<str>) -> PipelineResult<Self> {
        let name = name.as_ref().trim();
        Self::validate(name)?;
        Ok(EntryFilename(name.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> PipelineResult<()> {
        if name.is_empty() {
            return Err(PipelineError::ConfigurationError(
                "XML Filename must not be empty".to_string(),
            ));
        }
        if name.starts_with('/') || name.contains('\\') {
            return Err(PipelineError::ConfigurationError(format!(
                "XML Filename must be a relative name using '/' separators: {name}"
            )));
        }
        if name.split('/').any(|part| part == ".." || part.is_empty()) {
            return Err(PipelineError::ConfigurationError(format!(
                "XML Filename contains an empty or parent path component: {name}"
            )));
        }
        Ok(())
    }
}

impl Default for EntryFilename {
    fn default() -> Self {
        EntryFilename(DEFAULT_XML_FILENAME.to_string())
    }
}

impl fmt::Display for EntryFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
