//! Service layer module root.
//! Contains the credential, signing, verification and archiving services the
//! pipelines sequence.

pub mod archiver;
pub mod credential_resolver;
pub mod pem_normalizer;
pub mod signature_verifier;
pub mod xades_signer;

pub use archiver::EncryptedArchiver;
pub use credential_resolver::{CredentialResolver, KeyMaterial};
pub use pem_normalizer::normalize_pem;
pub use signature_verifier::SignatureVerifier;
pub use xades_signer::{SignatureIds, XadesSigner};
