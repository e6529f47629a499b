//! `PrepareWorkflow` orchestrates regulatory file preparation.
//!
//! Credential resolution, XAdES signing and encrypted archiving run strictly
//! in that order. The first failing stage ends the run; `run` folds the
//! typed result into a [`PipelineOutcome`] for the host.

use crate::{
    domain::artifact::{ArtifactAttributes, PipelineOutcome, PreparedArtifact},
    infra::config::{PipelineSettings, PrepareConfiguration},
    services::{
        archiver::EncryptedArchiver, credential_resolver::CredentialResolver,
        xades_signer::XadesSigner,
    },
    PipelineResult,
};
use chrono::{DateTime, Utc};

pub struct PrepareWorkflow {
    settings: PipelineSettings,
    resolver: CredentialResolver,
    archiver: EncryptedArchiver,
}

impl PrepareWorkflow {
    #[must_use]
    pub fn new(settings: PipelineSettings) -> Self {
        Self {
            settings,
            resolver: CredentialResolver::new(),
            archiver: EncryptedArchiver::new(),
        }
    }

    /// Validate raw configuration and build a workflow from it.
    ///
    /// Exclusivity and option errors surface here, before any key is loaded.
    pub fn from_configuration(config: &PrepareConfiguration) -> PipelineResult<Self> {
        Ok(Self::new(config.validate()?))
    }

    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Prepare `xml` using the current time as the XAdES signing time.
    pub fn execute(&self, xml: &[u8]) -> PipelineResult<PreparedArtifact> {
        self.execute_at(xml, Utc::now())
    }

    /// Prepare `xml` with an explicit signing time.
    pub fn execute_at(
        &self,
        xml: &[u8],
        signing_time: DateTime<Utc>,
    ) -> PipelineResult<PreparedArtifact> {
        let settings = &self.settings;
        log::info!(
            "Preparing regulatory file: {} bytes of XML, {} signature",
            xml.len(),
            settings.signature_method
        );

        // 1. Credentials
        let material = self.resolver.resolve(
            &settings.certificate,
            &settings.private_key,
            settings.key_password.as_ref(),
        )?;

        // 2. XAdES-BES signature
        let signed = XadesSigner::new(&material).sign(
            xml,
            settings.signature_method,
            signing_time,
        )?;
        log::info!("Signed XML: {} bytes", signed.len());

        // 3. Deflate + AES-256 archive
        let archive =
            self.archiver
                .create(&settings.xml_filename, &signed, &settings.zip_password)?;

        Ok(PreparedArtifact::new(
            archive,
            ArtifactAttributes::for_method(settings.signature_method),
        ))
    }

    /// Run the pipeline and report the host-facing outcome.
    #[must_use]
    pub fn run(&self, xml: &[u8]) -> PipelineOutcome {
        outcome_of(self.execute(xml))
    }
}

/// Fold a typed pipeline result into the host-facing outcome.
#[must_use]
pub fn outcome_of(result: PipelineResult<PreparedArtifact>) -> PipelineOutcome {
    match result {
        Ok(artifact) => {
            log::info!(
                "Regulatory file prepared: {} bytes",
                artifact.bytes().len()
            );
            PipelineOutcome::Success(artifact)
        }
        Err(error) => {
            log::error!("Failed to prepare regulatory file: {error}");
            PipelineOutcome::Failure {
                error_message: error.to_string(),
            }
        }
    }
}
