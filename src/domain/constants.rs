//! Centralized constants for algorithm identifiers, namespaces and defaults.
//! Keep this intentionally small; only broadly reused literals should live here.

// === XML Signature algorithm URIs ===

/// XML-DSig namespace
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// Inclusive Canonical XML 1.0 (omits comments)
pub const C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";

/// RSA PKCS#1 v1.5 with SHA-256
pub const RSA_SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";

/// SHA-256 digest method
pub const SHA256_DIGEST_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

/// Enveloped signature transform
pub const ENVELOPED_TRANSFORM: &str = "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

// === XAdES ===

/// XAdES 1.3.2 namespace
pub const XADES_NS: &str = "http://uri.etsi.org/01903/v1.3.2#";

/// Reference type marking the SignedProperties reference
pub const XADES_SIGNED_PROPERTIES_TYPE: &str = "http://uri.etsi.org/01903#SignedProperties";

/// Prefix used for XML-DSig elements we emit
pub const DSIG_PREFIX: &str = "ds";

/// Prefix used for XAdES elements we emit
pub const XADES_PREFIX: &str = "xades";

/// The reserved `xml` namespace, never declared
pub const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

// === XML parsing limits ===

/// Deepest element nesting accepted in input documents
pub const MAX_ELEMENT_DEPTH: usize = 256;

/// Extra nesting an enveloping signature adds above the signed content
/// (`ds:Signature` and `ds:Object`)
pub const ENVELOPING_NESTING: usize = 2;

/// Total bytes that internal DTD entity references may expand to per document
pub const MAX_ENTITY_EXPANSION: usize = 1 << 20;

// === PEM ===

/// Marker that opens every PEM block
pub const PEM_HEADER_PREFIX: &str = "-----BEGIN";

/// Base64 line width mandated by RFC 7468
pub const PEM_LINE_WIDTH: usize = 64;

/// Maximum characters of offending input echoed back in PEM errors
pub const PEM_SNIPPET_LENGTH: usize = 50;

// === Pipeline defaults and attributes ===

/// Default name of the XML entry inside the archive
pub const DEFAULT_XML_FILENAME: &str = "enveloped.xml";

/// Content type of the produced artifact
pub const ZIP_MIME_TYPE: &str = "application/zip";

/// Length the regulator expects for the archive password
pub const EXPECTED_ZIP_PASSWORD_LENGTH: usize = 50;

pub const ATTR_MIME_TYPE: &str = "mime.type";
pub const ATTR_SIGNED: &str = "dgoj.signed";
pub const ATTR_ENCRYPTED: &str = "dgoj.encrypted";
pub const ATTR_SIGNATURE_METHOD: &str = "dgoj.signature.method";
pub const ATTR_ERROR_MESSAGE: &str = "error.message";
