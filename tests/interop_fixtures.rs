//! Artifacts produced outside this crate, checked against our reader and verifier.
//!
//! `tests/fixtures/generate_fixtures.py` regenerates them: the archive is a
//! hand-assembled WinZip AE-2 file and the XML is signed over hand-written
//! Canonical XML, neither going through this crate.

use dgoj_signer::{EncryptedArchiver, SignatureVerifier, VerifyWorkflow, ZipPassword};
use openssl::x509::X509;

const FIXTURE_ARCHIVE: &[u8] = include_bytes!("fixtures/ae2_submission.zip");
const FIXTURE_SIGNED_XML: &[u8] = include_bytes!("fixtures/signed_submission.xml");
const FIXTURE_CERTIFICATE: &str = include_str!("fixtures/signer_certificate.pem");
const FIXTURE_PASSWORD: &str = "Fixture#Pass-2024!abcdefghijklmnopqrstuvwxyz012345";

fn password() -> ZipPassword {
    ZipPassword::new(FIXTURE_PASSWORD).unwrap()
}

fn certificate() -> X509 {
    X509::from_pem(FIXTURE_CERTIFICATE.as_bytes()).unwrap()
}

#[test]
fn fixture_archive_is_ae2_with_zero_crc() {
    // Local header: method 99 at +8, CRC-32 at +14
    assert_eq!(&FIXTURE_ARCHIVE[0..4], b"PK\x03\x04");
    assert_eq!(u16::from_le_bytes([FIXTURE_ARCHIVE[8], FIXTURE_ARCHIVE[9]]), 99);
    assert_eq!(&FIXTURE_ARCHIVE[14..18], &[0, 0, 0, 0]);
}

#[test]
fn externally_built_ae2_archive_decrypts() {
    let archiver = EncryptedArchiver::new();
    assert_eq!(
        archiver.list_entries(FIXTURE_ARCHIVE).unwrap(),
        vec!["enveloped.xml"]
    );
    let content = archiver
        .open_entry(FIXTURE_ARCHIVE, "enveloped.xml", &password())
        .unwrap();
    assert_eq!(content, FIXTURE_SIGNED_XML);
}

#[test]
fn externally_signed_xml_verifies() {
    let report = SignatureVerifier::with_trusted_certificate(certificate())
        .verify(FIXTURE_SIGNED_XML)
        .unwrap();
    assert!(report.success(), "failures: {:?}", report.failures);

    // Embedded KeyInfo certificate is the same one
    let report = SignatureVerifier::new().verify(FIXTURE_SIGNED_XML).unwrap();
    assert!(report.success(), "failures: {:?}", report.failures);
}

#[test]
fn tampered_fixture_fails_reference_check() {
    let tampered = String::from_utf8(FIXTURE_SIGNED_XML.to_vec())
        .unwrap()
        .replace("<Importe>12.50</Importe>", "<Importe>99.50</Importe>");
    let report = SignatureVerifier::with_trusted_certificate(certificate())
        .verify(tampered.as_bytes())
        .unwrap();
    assert!(!report.success());
    assert!(!report.references_ok);
    assert!(report.signature_ok, "SignedInfo itself is untouched");
}

#[test]
fn verify_workflow_accepts_fixture_archive() {
    let report = VerifyWorkflow::new()
        .verify_archive(FIXTURE_ARCHIVE, None, &password(), Some(&certificate()))
        .unwrap();
    assert!(report.success(), "failures: {:?}", report.failures);
}
