//! Shared helpers for integration tests.
//!
//! Credentials are generated at runtime with OpenSSL: a throwaway RSA key and
//! a self-signed certificate. Nothing touches hardware or the network.

#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::symm::Cipher;
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::fs;
use std::path::{Path, PathBuf};

/// Password meeting the regulator's 50-character policy (50 characters, mixed classes)
pub const STRONG_ZIP_PASSWORD: &str = "Tr0ub4dor&3#Complex$Pass!word1234567890ABCDEFGHIJK";

pub const SAMPLE_XML: &[u8] = b"<Root><Value>42</Value></Root>";

/// RSA key plus matching self-signed certificate
pub struct TestCredentials {
    pub key: PKey<Private>,
    pub certificate: X509,
}

impl TestCredentials {
    pub fn generate() -> Self {
        Self::with_common_name("DGOJ Test Operator")
    }

    pub fn with_common_name(common_name: &str) -> Self {
        let key = PKey::from_rsa(Rsa::generate(2048).expect("RSA generation")).expect("PKey");

        let mut name = X509NameBuilder::new().expect("name builder");
        name.append_entry_by_text("C", "ES").expect("C");
        name.append_entry_by_text("O", "Test Gaming Operator").expect("O");
        name.append_entry_by_text("CN", common_name).expect("CN");
        let name = name.build();

        let mut builder = X509Builder::new().expect("X509 builder");
        builder.set_version(2).expect("version");
        let serial = BigNum::from_u32(0x2024)
            .and_then(|bn| bn.to_asn1_integer())
            .expect("serial");
        builder.set_serial_number(&serial).expect("serial");
        builder.set_subject_name(&name).expect("subject");
        builder.set_issuer_name(&name).expect("issuer");
        builder.set_pubkey(&key).expect("pubkey");
        builder
            .set_not_before(&Asn1Time::days_from_now(0).expect("not_before"))
            .expect("not_before");
        builder
            .set_not_after(&Asn1Time::days_from_now(365).expect("not_after"))
            .expect("not_after");
        builder.sign(&key, MessageDigest::sha256()).expect("sign");

        Self {
            key,
            certificate: builder.build(),
        }
    }

    pub fn certificate_pem(&self) -> String {
        String::from_utf8(self.certificate.to_pem().expect("cert PEM")).expect("UTF-8")
    }

    pub fn key_pem(&self) -> String {
        String::from_utf8(self.key.private_key_to_pem_pkcs8().expect("key PEM")).expect("UTF-8")
    }

    pub fn encrypted_key_pem(&self, password: &str) -> String {
        let pem = self
            .key
            .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.as_bytes())
            .expect("encrypted key PEM");
        String::from_utf8(pem).expect("UTF-8")
    }

    /// Write `cert.pem` and `key.pem` into `dir`
    pub fn write_to(&self, dir: &Path) -> (PathBuf, PathBuf) {
        let cert_path = dir.join("cert.pem");
        let key_path = dir.join("key.pem");
        fs::write(&cert_path, self.certificate_pem()).expect("write cert");
        fs::write(&key_path, self.key_pem()).expect("write key");
        (cert_path, key_path)
    }
}
