//! Pipeline output types.
//!
//! A prepare invocation ends in exactly one [`PipelineOutcome`]: the encrypted
//! archive with its descriptive attributes, or an error message. There is no
//! partial variant.

use crate::domain::constants::{
    ATTR_ENCRYPTED, ATTR_ERROR_MESSAGE, ATTR_MIME_TYPE, ATTR_SIGNATURE_METHOD, ATTR_SIGNED,
    ZIP_MIME_TYPE,
};
use crate::domain::types::SignatureMethod;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Metadata attached to a successfully prepared artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactAttributes {
    pub content_type: String,
    pub signed: bool,
    pub encrypted: bool,
    pub signature_method: String,
}

impl ArtifactAttributes {
    #[must_use]
    pub fn for_method(method: SignatureMethod) -> Self {
        Self {
            content_type: ZIP_MIME_TYPE.to_string(),
            signed: true,
            encrypted: true,
            signature_method: method.as_str().to_string(),
        }
    }

    /// Attributes in the host's flat string form (`mime.type`, `dgoj.signed`, ...)
    #[must_use]
    pub fn to_host_attributes(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (ATTR_MIME_TYPE.to_string(), self.content_type.clone()),
            (ATTR_SIGNED.to_string(), self.signed.to_string()),
            (ATTR_ENCRYPTED.to_string(), self.encrypted.to_string()),
            (
                ATTR_SIGNATURE_METHOD.to_string(),
                self.signature_method.clone(),
            ),
        ])
    }
}

/// Encrypted archive bytes plus attributes
#[derive(Clone, PartialEq, Eq)]
pub struct PreparedArtifact {
    bytes: Vec<u8>,
    attributes: ArtifactAttributes,
}

impl PreparedArtifact {
    #[must_use]
    pub fn new(bytes: Vec<u8>, attributes: ArtifactAttributes) -> Self {
        Self { bytes, attributes }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn attributes(&self) -> &ArtifactAttributes {
        &self.attributes
    }
}

impl fmt::Debug for PreparedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PreparedArtifact(len={}, attributes={:?})",
            self.bytes.len(),
            self.attributes
        )
    }
}

/// Outcome of one prepare invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Success(PreparedArtifact),
    Failure { error_message: String },
}

impl PipelineOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success(_))
    }

    /// Archive bytes, present only on success
    #[must_use]
    pub fn artifact_bytes(&self) -> Option<&[u8]> {
        match self {
            PipelineOutcome::Success(artifact) => Some(artifact.bytes()),
            PipelineOutcome::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            PipelineOutcome::Success(_) => None,
            PipelineOutcome::Failure { error_message } => Some(error_message),
        }
    }

    /// Host relationship name
    #[must_use]
    pub fn relationship(&self) -> &'static str {
        match self {
            PipelineOutcome::Success(_) => "success",
            PipelineOutcome::Failure { .. } => "failure",
        }
    }

    /// Attributes to write on the host's unit of data
    #[must_use]
    pub fn host_attributes(&self) -> BTreeMap<String, String> {
        match self {
            PipelineOutcome::Success(artifact) => artifact.attributes().to_host_attributes(),
            PipelineOutcome::Failure { error_message } => BTreeMap::from([(
                ATTR_ERROR_MESSAGE.to_string(),
                error_message.clone(),
            )]),
        }
    }
}
