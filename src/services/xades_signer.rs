//! XAdES-BES signature creation.
//!
//! Produces an XML-DSig signature (RSA-SHA256, SHA-256 digests, inclusive
//! C14N 1.0) carrying the XAdES `SignedProperties` required for the BES form:
//! signing time and a digest of the signing certificate. The signature is
//! either embedded in the document (enveloped) or wraps it (enveloping).
//!
//! Element Ids are derived from the digest of the canonical input document,
//! so the output depends only on the input, the key material, the method and
//! the signing time.

use crate::domain::constants::{
    C14N_ALGORITHM, DSIG_NS, DSIG_PREFIX, ENVELOPED_TRANSFORM, RSA_SHA256_ALGORITHM,
    SHA256_DIGEST_ALGORITHM, XADES_NS, XADES_PREFIX, XADES_SIGNED_PROPERTIES_TYPE,
};
use crate::domain::types::SignatureMethod;
use crate::domain::xml::{
    canonicalize_document, canonicalize_subtree, parse_document, serialize_document, Document,
    Element,
};
use crate::infra::error::{PipelineError, PipelineResult};
use crate::services::credential_resolver::KeyMaterial;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use openssl::hash::MessageDigest;
use openssl::sign::Signer;
use openssl::x509::{X509NameRef, X509};
use sha2::{Digest, Sha256};

/// Media type declared for the signed data object
const SIGNED_DATA_MIME_TYPE: &str = "text/xml";

/// Ids of the elements a signature references internally
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureIds {
    pub signature: String,
    pub signed_properties: String,
    pub reference: String,
    pub object: String,
    pub signature_value: String,
}

impl SignatureIds {
    /// Derive Ids from the canonical form of the document being signed.
    #[must_use]
    pub fn derive(canonical_document: &[u8]) -> Self {
        let digest = Sha256::digest(canonical_document);
        let suffix = hex::encode(&digest[..8]);
        Self {
            signature: format!("Signature-{suffix}"),
            signed_properties: format!("SignedProperties-{suffix}"),
            reference: format!("Reference-{suffix}"),
            object: format!("Object-{suffix}"),
            signature_value: format!("SignatureValue-{suffix}"),
        }
    }
}

/// Signs XML documents with a resolved key and certificate
pub struct XadesSigner<'k> {
    material: &'k KeyMaterial,
}

impl<'k> XadesSigner<'k> {
    #[must_use]
    pub fn new(material: &'k KeyMaterial) -> Self {
        Self { material }
    }

    /// Parse, sign and serialize.
    ///
    /// Malformed input fails with `XmlParseError` before any signing work.
    pub fn sign(
        &self,
        xml: &[u8],
        method: SignatureMethod,
        signing_time: DateTime<Utc>,
    ) -> PipelineResult<Vec<u8>> {
        let document = parse_document(xml)?;
        log::debug!(
            "Parsed input document with root <{}>",
            document.root.name
        );
        let signed = self.sign_document(document, method, signing_time)?;
        Ok(serialize_document(&signed))
    }

    /// Sign an already parsed document.
    pub fn sign_document(
        &self,
        document: Document,
        method: SignatureMethod,
        signing_time: DateTime<Utc>,
    ) -> PipelineResult<Document> {
        let canonical = canonicalize_document(&document, None);
        let ids = SignatureIds::derive(&canonical);
        log::info!("Creating {method} XAdES-BES signature {}", ids.signature);

        match method {
            SignatureMethod::Enveloped => {
                self.sign_enveloped(document, &canonical, &ids, signing_time)
            }
            SignatureMethod::Enveloping => self.sign_enveloping(document, &ids, signing_time),
        }
    }

    fn sign_enveloped(
        &self,
        mut document: Document,
        canonical: &[u8],
        ids: &SignatureIds,
        signing_time: DateTime<Utc>,
    ) -> PipelineResult<Document> {
        // With the signature excluded, the canonical document is exactly the input
        let reference = data_reference(
            ids,
            "",
            &[ENVELOPED_TRANSFORM, C14N_ALGORITHM],
            canonical,
        );
        let root_shell = shell(&document.root);
        let signature = self.assemble(ids, &[&root_shell], reference, None, signing_time)?;
        document.root.push_child(signature);
        Ok(document)
    }

    fn sign_enveloping(
        &self,
        document: Document,
        ids: &SignatureIds,
        signing_time: DateTime<Utc>,
    ) -> PipelineResult<Document> {
        let Document {
            prolog,
            root,
            epilog,
        } = document;

        let object = ds("Object")
            .with_attribute("Id", ids.object.as_str())
            .with_child(root);
        let signature_shell = signature_shell(ids);
        let canonical_object = canonicalize_subtree(&[&signature_shell], &object, None);
        let reference = data_reference(
            ids,
            &format!("#{}", ids.object),
            &[C14N_ALGORITHM],
            &canonical_object,
        );

        let signature = self.assemble(ids, &[], reference, Some(object), signing_time)?;
        Ok(Document {
            prolog,
            root: signature,
            epilog,
        })
    }

    /// Build the complete `ds:Signature` element.
    ///
    /// `ancestors` are the (attribute-only) elements the signature will be
    /// placed under; their namespace scope is part of every digest.
    fn assemble(
        &self,
        ids: &SignatureIds,
        ancestors: &[&Element],
        data_reference: Element,
        data_object: Option<Element>,
        signing_time: DateTime<Utc>,
    ) -> PipelineResult<Element> {
        let certificate = self.material.certificate();
        let certificate_der = self.material.certificate_der()?;

        let signature_shell = signature_shell(ids);
        let object_shell = ds("Object");
        let qualifying_shell = xades("QualifyingProperties")
            .with_attribute(format!("xmlns:{XADES_PREFIX}"), XADES_NS)
            .with_attribute("Target", format!("#{}", ids.signature));

        let signed_properties =
            signed_properties(ids, certificate, &certificate_der, signing_time)?;
        let properties_scope = chain(
            ancestors,
            &[&signature_shell, &object_shell, &qualifying_shell],
        );
        let canonical_properties = canonicalize_subtree(&properties_scope, &signed_properties, None);

        let signed_info = ds("SignedInfo")
            .with_child(ds("CanonicalizationMethod").with_attribute("Algorithm", C14N_ALGORITHM))
            .with_child(ds("SignatureMethod").with_attribute("Algorithm", RSA_SHA256_ALGORITHM))
            .with_child(data_reference)
            .with_child(
                ds("Reference")
                    .with_attribute("Type", XADES_SIGNED_PROPERTIES_TYPE)
                    .with_attribute("URI", format!("#{}", ids.signed_properties))
                    .with_child(transforms(&[C14N_ALGORITHM]))
                    .with_child(digest_method())
                    .with_child(ds("DigestValue").with_text(digest_b64(&canonical_properties))),
            );

        let signed_info_scope = chain(ancestors, &[&signature_shell]);
        let canonical_signed_info = canonicalize_subtree(&signed_info_scope, &signed_info, None);
        let signature_value = self.rsa_sha256(&canonical_signed_info)?;

        let key_info = ds("KeyInfo").with_child(
            ds("X509Data")
                .with_child(ds("X509Certificate").with_text(STANDARD.encode(&certificate_der))),
        );

        let mut signature = signature_shell
            .with_child(signed_info)
            .with_child(
                ds("SignatureValue")
                    .with_attribute("Id", ids.signature_value.as_str())
                    .with_text(STANDARD.encode(signature_value)),
            )
            .with_child(key_info)
            .with_child(object_shell.with_child(qualifying_shell.with_child(signed_properties)));
        if let Some(object) = data_object {
            signature.push_child(object);
        }
        Ok(signature)
    }

    fn rsa_sha256(&self, data: &[u8]) -> PipelineResult<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), self.material.private_key())
            .map_err(|e| PipelineError::SigningError(format!("Failed to create signer: {e}")))?;
        signer
            .update(data)
            .map_err(|e| PipelineError::SigningError(format!("Failed to hash SignedInfo: {e}")))?;
        let signature = signer
            .sign_to_vec()
            .map_err(|e| PipelineError::SigningError(format!("RSA signing failed: {e}")))?;
        log::debug!("Created {}-byte RSA-SHA256 signature value", signature.len());
        Ok(signature)
    }
}

fn signed_properties(
    ids: &SignatureIds,
    certificate: &X509,
    certificate_der: &[u8],
    signing_time: DateTime<Utc>,
) -> PipelineResult<Element> {
    let serial = certificate
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_dec_str())
        .map_err(|e| PipelineError::SigningError(format!("Invalid certificate serial: {e}")))?;

    let issuer = rfc4514_name(certificate.issuer_name())?;

    let signing_certificate = xades("SigningCertificate").with_child(
        xades("Cert")
            .with_child(
                xades("CertDigest")
                    .with_child(digest_method())
                    .with_child(ds("DigestValue").with_text(digest_b64(certificate_der))),
            )
            .with_child(
                xades("IssuerSerial")
                    .with_child(
                        ds("X509IssuerName").with_text(issuer),
                    )
                    .with_child(ds("X509SerialNumber").with_text(serial.to_string())),
            ),
    );

    Ok(xades("SignedProperties")
        .with_attribute("Id", ids.signed_properties.as_str())
        .with_child(
            xades("SignedSignatureProperties")
                .with_child(
                    xades("SigningTime")
                        .with_text(signing_time.to_rfc3339_opts(SecondsFormat::Secs, true)),
                )
                .with_child(signing_certificate),
        )
        .with_child(
            xades("SignedDataObjectProperties").with_child(
                xades("DataObjectFormat")
                    .with_attribute("ObjectReference", format!("#{}", ids.reference))
                    .with_child(xades("MimeType").with_text(SIGNED_DATA_MIME_TYPE)),
            ),
        ))
}

fn data_reference(
    ids: &SignatureIds,
    uri: &str,
    transform_algorithms: &[&str],
    canonical: &[u8],
) -> Element {
    ds("Reference")
        .with_attribute("Id", ids.reference.as_str())
        .with_attribute("URI", uri)
        .with_child(transforms(transform_algorithms))
        .with_child(digest_method())
        .with_child(ds("DigestValue").with_text(digest_b64(canonical)))
}

fn transforms(algorithms: &[&str]) -> Element {
    algorithms.iter().fold(ds("Transforms"), |parent, algorithm| {
        parent.with_child(ds("Transform").with_attribute("Algorithm", *algorithm))
    })
}

fn digest_method() -> Element {
    ds("DigestMethod").with_attribute("Algorithm", SHA256_DIGEST_ALGORITHM)
}

fn signature_shell(ids: &SignatureIds) -> Element {
    ds("Signature")
        .with_attribute(format!("xmlns:{DSIG_PREFIX}"), DSIG_NS)
        .with_attribute("Id", ids.signature.as_str())
}

fn ds(local_name: &str) -> Element {
    Element::new(format!("{DSIG_PREFIX}:{local_name}"))
}

fn xades(local_name: &str) -> Element {
    Element::new(format!("{XADES_PREFIX}:{local_name}"))
}

/// Element with the same name and attributes but no children
fn shell(element: &Element) -> Element {
    Element {
        name: element.name.clone(),
        attributes: element.attributes.clone(),
        children: Vec::new(),
    }
}

fn chain<'a>(outer: &[&'a Element], inner: &[&'a Element]) -> Vec<&'a Element> {
    outer.iter().chain(inner.iter()).copied().collect()
}

pub(crate) fn digest_b64(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}

/// Distinguished name in RFC 4514 string form (most specific RDN first).
///
/// An entry whose value cannot be decoded to UTF-8 is a `SigningError`.
fn rfc4514_name(name: &X509NameRef) -> PipelineResult<String> {
    let mut parts = Vec::new();
    for entry in name.entries() {
        let object = entry.object();
        let key = object
            .nid()
            .short_name()
            .map(str::to_string)
            .unwrap_or_else(|_| object.to_string());
        let value = entry.data().as_utf8().map_err(|e| {
            PipelineError::SigningError(format!(
                "certificate issuer attribute {key} cannot be decoded: {e}"
            ))
        })?;
        parts.push(format!("{key}={}", escape_rdn_value(&value)));
    }
    parts.reverse();
    Ok(parts.join(","))
}

fn escape_rdn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());
    for (index, c) in value.chars().enumerate() {
        let edge_space = c == ' ' && (index == 0 || index == last);
        if matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';')
            || (c == '#' && index == 0)
            || edge_space
        {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::xml::{element_namespace, find_element};
    use openssl::asn1::{Asn1Integer, Asn1Time, Asn1Type};
    use openssl::bn::BigNum;
    use openssl::nid::Nid;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::X509NameBuilder;

    fn material() -> KeyMaterial {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("C", "ES").unwrap();
        name.append_entry_by_text("O", "Operador, S.A.").unwrap();
        name.append_entry_by_text("CN", "dgoj-test").unwrap();
        let name = name.build();

        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        let serial = Asn1Integer::from_bn(&BigNum::from_u32(4242).unwrap()).unwrap();
        builder.set_serial_number(&serial).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(30).unwrap())
            .unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        KeyMaterial::new(key, builder.build()).unwrap()
    }

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-07-01T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn enveloped_signature_is_last_child() {
        let material = material();
        let signer = XadesSigner::new(&material);
        let signed = signer
            .sign(
                b"<Root><Value>42</Value></Root>",
                SignatureMethod::Enveloped,
                fixed_time(),
            )
            .unwrap();
        let text = String::from_utf8(signed.clone()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));

        let doc = parse_document(&signed).unwrap();
        assert_eq!(doc.root.name, "Root");
        let last = doc.root.child_elements().last().unwrap();
        assert_eq!(last.name, "ds:Signature");
        assert_eq!(element_namespace(&[&doc.root], last), Some(DSIG_NS));
        assert!(text.contains("<xades:SigningTime>2024-07-01T10:30:00Z</xades:SigningTime>"));
        assert!(text.contains(ENVELOPED_TRANSFORM));
        assert!(text.contains("URI=\"\""));
    }

    #[test]
    fn enveloping_signature_wraps_document() {
        let material = material();
        let signed = XadesSigner::new(&material)
            .sign(
                b"<Root><Value>42</Value></Root>",
                SignatureMethod::Enveloping,
                fixed_time(),
            )
            .unwrap();
        let doc = parse_document(&signed).unwrap();
        assert_eq!(doc.root.name, "ds:Signature");

        let object_id = doc.root.attribute("Id").unwrap().replace("Signature-", "Object-");
        let object = find_element(&doc.root, |_, e| e.attribute("Id") == Some(object_id.as_str()))
            .unwrap();
        let wrapped = object.element.child_elements().next().unwrap();
        assert_eq!(wrapped.name, "Root");
        assert!(String::from_utf8(signed)
            .unwrap()
            .contains(&format!("URI=\"#{object_id}\"")));
    }

    #[test]
    fn signing_is_deterministic_for_fixed_time() {
        let material = material();
        let signer = XadesSigner::new(&material);
        let xml = b"<Root><Value>42</Value></Root>";
        let first = signer.sign(xml, SignatureMethod::Enveloped, fixed_time()).unwrap();
        let second = signer.sign(xml, SignatureMethod::Enveloped, fixed_time()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn issuer_serial_uses_rfc4514_and_decimal() {
        let material = material();
        let signed = XadesSigner::new(&material)
            .sign(b"<r/>", SignatureMethod::Enveloped, fixed_time())
            .unwrap();
        let text = String::from_utf8(signed).unwrap();
        assert!(text.contains(
            "<ds:X509IssuerName>CN=dgoj-test,O=Operador\\, S.A.,C=ES</ds:X509IssuerName>"
        ));
        assert!(text.contains("<ds:X509SerialNumber>4242</ds:X509SerialNumber>"));
    }

    #[test]
    fn malformed_input_is_parse_error() {
        let material = material();
        let result = XadesSigner::new(&material).sign(
            b"<Root><Value>42</Root>",
            SignatureMethod::Enveloped,
            fixed_time(),
        );
        assert!(matches!(result, Err(PipelineError::XmlParseError(_))));
    }

    #[test]
    fn ids_share_document_suffix() {
        let ids = SignatureIds::derive(b"<Root></Root>");
        let suffix = ids.signature.trim_start_matches("Signature-");
        assert_eq!(suffix.len(), 16);
        assert_eq!(ids.object, format!("Object-{suffix}"));
        assert_eq!(ids.signed_properties, format!("SignedProperties-{suffix}"));
    }

    #[test]
    fn undecodable_issuer_value_is_signing_error() {
        // Odd-length BMPString cannot be converted to UTF-8
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_nid_with_type(Nid::COMMONNAME, "abc", Asn1Type::BMPSTRING)
            .unwrap();
        let name = name.build();
        match rfc4514_name(&name) {
            Err(PipelineError::SigningError(msg)) => assert!(msg.contains("CN")),
            other => panic!("expected SigningError, got {other:?}"),
        }
    }

    #[test]
    fn rdn_escaping() {
        assert_eq!(escape_rdn_value("a,b"), "a\\,b");
        assert_eq!(escape_rdn_value("#x"), "\\#x");
        assert_eq!(escape_rdn_value(" x "), "\\ x\\ ");
        assert_eq!(escape_rdn_value("plain"), "plain");
    }
}
