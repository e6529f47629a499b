//! Verification service: checks an XAdES-BES signed XML document.
//!
//! Recomputes every `ds:Reference` digest, verifies `ds:SignatureValue` over
//! the canonical `ds:SignedInfo`, and confirms the XAdES signing-certificate
//! digest. Cryptographic mismatches are reported in the
//! [`VerificationReport`]; documents missing the structures a verifier needs
//! fail with `VerificationError`.

use crate::domain::constants::{
    C14N_ALGORITHM, DSIG_NS, ENVELOPED_TRANSFORM, ENVELOPING_NESTING, MAX_ELEMENT_DEPTH,
    RSA_SHA256_ALGORITHM, SHA256_DIGEST_ALGORITHM, XADES_NS, XADES_SIGNED_PROPERTIES_TYPE,
};
use crate::domain::verification::VerificationReport;
use crate::domain::xml::{
    canonicalize_document, canonicalize_subtree, element_namespace, find_element,
    parse_document_with_max_depth, Document, Element, Located,
};
use crate::infra::error::{PipelineError, PipelineResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use openssl::hash::MessageDigest;
use openssl::sign::Verifier;
use openssl::x509::X509;
use sha2::{Digest, Sha256};

/// Verifies signatures produced by the XAdES signer (or any compatible tool)
#[derive(Default)]
pub struct SignatureVerifier {
    trusted_certificate: Option<X509>,
}

impl SignatureVerifier {
    /// Verifier that trusts the certificate embedded in `ds:KeyInfo`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifier that checks the signature against a known certificate
    #[must_use]
    pub fn with_trusted_certificate(certificate: X509) -> Self {
        Self {
            trusted_certificate: Some(certificate),
        }
    }

    /// Parse and verify; documents may nest as deep as any input the signer
    /// accepts once wrapped in an enveloping signature.
    pub fn verify(&self, xml: &[u8]) -> PipelineResult<VerificationReport> {
        let document =
            parse_document_with_max_depth(xml, MAX_ELEMENT_DEPTH + ENVELOPING_NESTING)?;
        self.verify_document(&document)
    }

    pub fn verify_document(&self, document: &Document) -> PipelineResult<VerificationReport> {
        let signature = find_element(&document.root, |ancestors, element| {
            element.local_name() == "Signature"
                && element_namespace(ancestors, element) == Some(DSIG_NS)
        })
        .ok_or_else(|| missing("ds:Signature element"))?;

        let signed_info = signature
            .child(DSIG_NS, "SignedInfo")
            .ok_or_else(|| missing("ds:SignedInfo"))?;
        check_algorithm(&signed_info, "CanonicalizationMethod", C14N_ALGORITHM)?;
        check_algorithm(&signed_info, "SignatureMethod", RSA_SHA256_ALGORITHM)?;

        let mut failures = Vec::new();

        let references = signed_info.children(DSIG_NS, "Reference");
        if references.is_empty() {
            return Err(missing("ds:Reference"));
        }
        let mut references_ok = true;
        let mut covers_signed_properties = false;
        for reference in &references {
            if reference.element.attribute("Type") == Some(XADES_SIGNED_PROPERTIES_TYPE) {
                covers_signed_properties = true;
            }
            if let Some(failure) = check_reference(document, &signature, reference)? {
                references_ok = false;
                failures.push(failure);
            }
        }

        let embedded = embedded_certificate(&signature)?;
        let certificate = match (&self.trusted_certificate, embedded) {
            (Some(trusted), _) => trusted.clone(),
            (None, Some(embedded)) => embedded,
            (None, None) => {
                return Err(PipelineError::VerificationError(
                    "no certificate available: ds:KeyInfo carries no X509Certificate and none was supplied"
                        .to_string(),
                ))
            }
        };

        let signature_ok = check_signature_value(&signature, &signed_info, &certificate)?;
        if !signature_ok {
            failures.push("ds:SignatureValue does not verify over ds:SignedInfo".to_string());
        }

        let mut signing_certificate_ok = check_signing_certificate(&signature, &certificate)?;
        if !signing_certificate_ok {
            failures.push(
                "XAdES SigningCertificate digest does not match the verifying certificate"
                    .to_string(),
            );
        }
        if !covers_signed_properties {
            signing_certificate_ok = false;
            failures.push("xades:SignedProperties is not covered by any reference".to_string());
        }

        let report = VerificationReport::new(references_ok, signature_ok, signing_certificate_ok)
            .with_failures(failures);
        if report.success() {
            log::info!("Signature verified: {} reference(s) checked", references.len());
        } else {
            log::warn!("Signature verification failed: {:?}", report.failures);
        }
        Ok(report)
    }
}

fn missing(what: &str) -> PipelineError {
    PipelineError::VerificationError(format!("signed document has no {what}"))
}

fn check_algorithm(
    signed_info: &Located<'_>,
    local_name: &str,
    expected: &str,
) -> PipelineResult<()> {
    let element = signed_info
        .child(DSIG_NS, local_name)
        .ok_or_else(|| missing(&format!("ds:{local_name}")))?;
    match element.element.attribute("Algorithm") {
        Some(algorithm) if algorithm == expected => Ok(()),
        other => Err(PipelineError::VerificationError(format!(
            "unsupported {local_name} algorithm: {}",
            other.unwrap_or("<missing>")
        ))),
    }
}

/// Recompute one reference digest; `Some(reason)` on mismatch.
fn check_reference(
    document: &Document,
    signature: &Located<'_>,
    reference: &Located<'_>,
) -> PipelineResult<Option<String>> {
    let uri = reference
        .element
        .attribute("URI")
        .ok_or_else(|| missing("URI on ds:Reference"))?;

    let digest_method = reference
        .child(DSIG_NS, "DigestMethod")
        .ok_or_else(|| missing("ds:DigestMethod"))?;
    if digest_method.element.attribute("Algorithm") != Some(SHA256_DIGEST_ALGORITHM) {
        return Err(PipelineError::VerificationError(format!(
            "unsupported digest algorithm for reference '{uri}'"
        )));
    }

    let mut enveloped = false;
    if let Some(transforms) = reference.child(DSIG_NS, "Transforms") {
        for transform in transforms.children(DSIG_NS, "Transform") {
            match transform.element.attribute("Algorithm") {
                Some(ENVELOPED_TRANSFORM) => enveloped = true,
                Some(C14N_ALGORITHM) => {}
                other => {
                    return Err(PipelineError::VerificationError(format!(
                        "unsupported transform {} in reference '{uri}'",
                        other.unwrap_or("<missing>")
                    )))
                }
            }
        }
    }
    let exclude = enveloped.then_some(signature.element);

    let canonical = if uri.is_empty() {
        canonicalize_document(document, exclude)
    } else if let Some(id) = uri.strip_prefix('#') {
        let target = find_element(&document.root, |_, element| {
            element.attribute("Id") == Some(id)
        })
        .ok_or_else(|| {
            PipelineError::VerificationError(format!("reference target '{uri}' not found"))
        })?;
        canonicalize_subtree(&target.ancestors, target.element, exclude)
    } else {
        return Err(PipelineError::VerificationError(format!(
            "unsupported reference URI '{uri}'"
        )));
    };

    let expected = reference
        .child(DSIG_NS, "DigestValue")
        .ok_or_else(|| missing("ds:DigestValue"))?
        .element
        .text();
    let actual = Sha256::digest(&canonical);
    match decode_b64(&expected) {
        Some(expected) if expected.as_slice() == actual.as_slice() => Ok(None),
        _ => Ok(Some(format!("digest mismatch for reference '{uri}'"))),
    }
}

fn embedded_certificate(signature: &Located<'_>) -> PipelineResult<Option<X509>> {
    let Some(node) = signature.descend(&[
        (DSIG_NS, "KeyInfo"),
        (DSIG_NS, "X509Data"),
        (DSIG_NS, "X509Certificate"),
    ]) else {
        return Ok(None);
    };
    let der = decode_b64(&node.element.text()).ok_or_else(|| {
        PipelineError::VerificationError("ds:X509Certificate is not valid base64".to_string())
    })?;
    X509::from_der(&der).map(Some).map_err(|e| {
        PipelineError::VerificationError(format!("ds:X509Certificate is not a certificate: {e}"))
    })
}

fn check_signature_value(
    signature: &Located<'_>,
    signed_info: &Located<'_>,
    certificate: &X509,
) -> PipelineResult<bool> {
    let value = signature
        .child(DSIG_NS, "SignatureValue")
        .ok_or_else(|| missing("ds:SignatureValue"))?;
    let Some(signature_bytes) = decode_b64(&value.element.text()) else {
        return Ok(false);
    };

    let public_key = certificate.public_key().map_err(|e| {
        PipelineError::VerificationError(format!("certificate public key unusable: {e}"))
    })?;
    let canonical = canonicalize_subtree(&signed_info.ancestors, signed_info.element, None);

    let mut verifier = Verifier::new(MessageDigest::sha256(), &public_key)
        .map_err(|e| PipelineError::VerificationError(format!("Failed to create verifier: {e}")))?;
    verifier
        .update(&canonical)
        .map_err(|e| PipelineError::VerificationError(format!("Failed to hash SignedInfo: {e}")))?;
    // OpenSSL reports malformed signature blobs as errors; both mean "invalid"
    Ok(verifier.verify(&signature_bytes).unwrap_or(false))
}

fn check_signing_certificate(signature: &Located<'_>, certificate: &X509) -> PipelineResult<bool> {
    let Some(cert_digest) = find_element(signature.element, |ancestors, element| {
        element.local_name() == "CertDigest"
            && element_namespace(&with_outer(&signature.ancestors, ancestors), element)
                == Some(XADES_NS)
    }) else {
        return Ok(false);
    };
    let value = cert_digest
        .element
        .child_elements()
        .find(|e| e.local_name() == "DigestValue")
        .map(|e| e.text())
        .unwrap_or_default();

    let der = certificate
        .to_der()
        .map_err(|e| PipelineError::VerificationError(format!("certificate encoding: {e}")))?;
    let actual = Sha256::digest(&der);
    Ok(decode_b64(&value).is_some_and(|expected| expected.as_slice() == actual.as_slice()))
}

fn with_outer<'a>(outer: &[&'a Element], inner: &[&'a Element]) -> Vec<&'a Element> {
    outer.iter().chain(inner.iter()).copied().collect()
}

fn decode_b64(text: &str) -> Option<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_document_is_verification_error() {
        let result = SignatureVerifier::new().verify(b"<Root><Value>42</Value></Root>");
        assert!(matches!(result, Err(PipelineError::VerificationError(_))));
    }

    #[test]
    fn foreign_signature_namespace_is_ignored() {
        let xml = br#"<Root xmlns:ds="urn:not-dsig"><ds:Signature/></Root>"#;
        assert!(matches!(
            SignatureVerifier::new().verify(xml),
            Err(PipelineError::VerificationError(msg)) if msg.contains("ds:Signature")
        ));
    }

    #[test]
    fn unsupported_algorithms_are_rejected() {
        let xml = br#"<Root><ds:Signature xmlns:ds="http://www.w3.org/2000/09/xmldsig#"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="http://www.w3.org/2001/10/xml-exc-c14n#"/><ds:SignatureMethod Algorithm="http://www.w3.org/2001/04/xmldsig-more#rsa-sha256"/></ds:SignedInfo></ds:Signature></Root>"#;
        assert!(matches!(
            SignatureVerifier::new().verify(xml),
            Err(PipelineError::VerificationError(msg)) if msg.contains("CanonicalizationMethod")
        ));
    }
}
