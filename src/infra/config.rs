//! Configuration management infrastructure.
//!
//! A prepare run is configured either from a TOML file (CLI use) or from the
//! host's property sheet, whose keys are human-readable display names. Both
//! routes produce a [`PrepareConfiguration`] of raw optional strings, which
//! [`PrepareConfiguration::validate`] turns into typed [`PipelineSettings`]
//! before any cryptographic work starts.

use crate::domain::credential::{CredentialInput, CredentialSlot};
use crate::domain::types::{EntryFilename, KeyPassword, SignatureMethod, ZipPassword};
use crate::infra::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Host property names
pub const PROP_CERTIFICATE_PATH: &str = "Certificate Path";
pub const PROP_CERTIFICATE: &str = "Certificate";
pub const PROP_PRIVATE_KEY_PATH: &str = "Private Key Path";
pub const PROP_PRIVATE_KEY: &str = "Private Key";
pub const PROP_PRIVATE_KEY_PASSWORD: &str = "Private Key Password";
pub const PROP_ZIP_PASSWORD: &str = "ZIP Encryption Password";
pub const PROP_SIGNATURE_METHOD: &str = "Signature Method";
pub const PROP_XML_FILENAME: &str = "XML Filename";

/// Raw prepare configuration, as written in a file or property sheet
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrepareConfiguration {
    /// Filesystem path to the signing certificate
    pub certificate_path: Option<String>,

    /// Inline PEM certificate (exclusive with `certificate_path`)
    pub certificate: Option<String>,

    /// Filesystem path to the private key
    pub private_key_path: Option<String>,

    /// Inline PEM private key (exclusive with `private_key_path`)
    pub private_key: Option<String>,

    pub private_key_password: Option<String>,

    /// Password for the AES-256 archive (required)
    pub zip_password: Option<String>,

    /// `enveloped` (default) or `enveloping`
    pub signature_method: Option<String>,

    /// Entry name inside the archive, default `enveloped.xml`
    pub xml_filename: Option<String>,
}

impl PrepareConfiguration {
    /// Build from the host's property map. Blank values count as unset;
    /// unrecognized keys are ignored.
    pub fn from_properties<I, K, V>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            let value: String = value.into();
            let value = if value.trim().is_empty() {
                None
            } else {
                Some(value)
            };
            match key.as_ref() {
                PROP_CERTIFICATE_PATH => config.certificate_path = value,
                PROP_CERTIFICATE => config.certificate = value,
                PROP_PRIVATE_KEY_PATH => config.private_key_path = value,
                PROP_PRIVATE_KEY => config.private_key = value,
                PROP_PRIVATE_KEY_PASSWORD => config.private_key_password = value,
                PROP_ZIP_PASSWORD => config.zip_password = value,
                PROP_SIGNATURE_METHOD => config.signature_method = value,
                PROP_XML_FILENAME => config.xml_filename = value,
                other => log::debug!("Ignoring unknown property '{other}'"),
            }
        }
        config
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|e| {
            PipelineError::ConfigurationError(format!("Failed to parse config file: {e}"))
        })
    }

    /// Check every option and convert to typed settings.
    pub fn validate(&self) -> PipelineResult<PipelineSettings> {
        let certificate = CredentialInput::from_dual_input(
            CredentialSlot::Certificate,
            self.certificate_path.as_deref(),
            self.certificate.as_deref(),
        )?;
        let private_key = CredentialInput::from_dual_input(
            CredentialSlot::PrivateKey,
            self.private_key_path.as_deref(),
            self.private_key.as_deref(),
        )?;

        let zip_password = match self.zip_password.as_deref() {
            Some(password) => ZipPassword::new(password)?,
            None => {
                return Err(PipelineError::ConfigurationError(format!(
                    "'{PROP_ZIP_PASSWORD}' is required"
                )))
            }
        };
        for warning in zip_password.policy_warnings() {
            log::warn!("{warning}");
        }

        let signature_method = match self.signature_method.as_deref() {
            Some(method) if !method.trim().is_empty() => method.parse()?,
            _ => SignatureMethod::default(),
        };
        let xml_filename = match self.xml_filename.as_deref() {
            Some(name) if !name.trim().is_empty() => EntryFilename::new(name)?,
            _ => EntryFilename::default(),
        };

        log::debug!(
            "Configuration valid: certificate from {}, private key from {}, method {signature_method}, entry '{xml_filename}'",
            certificate.kind(),
            private_key.kind()
        );

        Ok(PipelineSettings {
            certificate,
            private_key,
            key_password: KeyPassword::from_optional(self.private_key_password.as_deref()),
            zip_password,
            signature_method,
            xml_filename,
        })
    }
}

// Credential values and passwords are never printed
impl fmt::Debug for PrepareConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let set = |value: &Option<String>| if value.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("PrepareConfiguration")
            .field("certificate_path", &self.certificate_path)
            .field("certificate", &set(&self.certificate))
            .field("private_key_path", &self.private_key_path)
            .field("private_key", &set(&self.private_key))
            .field("private_key_password", &set(&self.private_key_password))
            .field("zip_password", &set(&self.zip_password))
            .field("signature_method", &self.signature_method)
            .field("xml_filename", &self.xml_filename)
            .finish()
    }
}

/// Validated, typed settings for one prepare run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub certificate: CredentialInput,
    pub private_key: CredentialInput,
    pub key_password: Option<KeyPassword>,
    pub zip_password: ZipPassword,
    pub signature_method: SignatureMethod,
    pub xml_filename: EntryFilename,
}

/// Configuration manager for handling config files
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a configuration manager with custom path
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    /// Load configuration from file
    pub fn load(&self) -> PipelineResult<PrepareConfiguration> {
        log::info!("Loading configuration from: {}", self.config_path.display());

        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            PipelineError::ConfigurationError(format!(
                "Failed to read config file {}: {}",
                self.config_path.display(),
                e
            ))
        })?;

        PrepareConfiguration::from_toml_str(&content)
    }

    /// Get the configuration file path
    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}
