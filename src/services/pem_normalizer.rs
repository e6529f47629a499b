//! PEM normalization for credentials pulled out of secret stores.
//!
//! Secret managers and JSON transport routinely mangle PEM text: newlines
//! arrive as the two-character escape `\n`, line endings turn into CRLF, and
//! the base64 body gets re-wrapped or flattened onto one line. The normalizer
//! rebuilds a strict RFC 7468 block from whatever survived.

use crate::domain::constants::{PEM_LINE_WIDTH, PEM_SNIPPET_LENGTH};
use crate::domain::credential::NormalizedPem;
use crate::infra::error::{PipelineError, PipelineResult};
use regex::Regex;
use std::sync::LazyLock;
use zeroize::Zeroizing;

/// BEGIN marker; the label is uppercase letters, digits and spaces
static BEGIN_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-----BEGIN ([A-Z0-9 ]+)-----").expect("PEM marker regex is valid")
});

/// Rebuild the first PEM block found in `raw`.
///
/// Idempotent: normalizing an already normalized block returns it unchanged.
pub fn normalize_pem(raw: &str) -> PipelineResult<NormalizedPem> {
    let trimmed = raw.trim();

    let unescaped = if trimmed.contains("\\n") && !trimmed.contains('\n') {
        Zeroizing::new(trimmed.replace("\\n", "\n"))
    } else {
        Zeroizing::new(trimmed.to_string())
    };
    let text = Zeroizing::new(
        unescaped
            .replace("\\r", "")
            .replace("\r\n", "\n")
            .replace('\r', "\n"),
    );

    let captures = BEGIN_MARKER.captures(&text).ok_or_else(|| missing_block(raw))?;
    let (Some(begin_match), Some(label_match)) = (captures.get(0), captures.get(1)) else {
        return Err(missing_block(raw));
    };
    let label = label_match.as_str().to_string();

    let end_marker = format!("-----END {label}-----");
    let body_start = begin_match.end();
    let body_len = text[body_start..]
        .find(&end_marker)
        .ok_or_else(|| missing_block(raw))?;
    let body = &text[body_start..body_start + body_len];

    if body.contains(':') {
        return Err(PipelineError::InvalidPemFormat(format!(
            "PEM block '{label}' carries RFC 1421 headers, which are not accepted inline; \
             convert the key to PKCS#8 or supply it as a file path"
        )));
    }

    let compact: Zeroizing<String> =
        Zeroizing::new(body.chars().filter(|c| !c.is_whitespace()).collect());
    if compact.is_empty() {
        return Err(PipelineError::InvalidPemFormat(format!(
            "PEM block '{label}' has an empty body"
        )));
    }
    if let Some(bad) = compact
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')))
    {
        return Err(PipelineError::InvalidPemFormat(format!(
            "PEM block '{label}' contains invalid base64 character {bad:?}"
        )));
    }

    let mut normalized = String::with_capacity(compact.len() + compact.len() / PEM_LINE_WIDTH + 64);
    normalized.push_str("-----BEGIN ");
    normalized.push_str(&label);
    normalized.push_str("-----\n");
    // Body is pure ASCII at this point, so byte chunks are char boundaries
    for line in compact.as_bytes().chunks(PEM_LINE_WIDTH) {
        normalized.push_str(&String::from_utf8_lossy(line));
        normalized.push('\n');
    }
    normalized.push_str(&end_marker);

    log::debug!(
        "Normalized PEM block '{label}' ({} base64 characters)",
        compact.len()
    );
    Ok(NormalizedPem::from_parts(label, normalized))
}

fn missing_block(raw: &str) -> PipelineError {
    PipelineError::InvalidPemFormat(format!(
        "no BEGIN/END block found in input starting with: {}",
        snippet(raw.trim())
    ))
}

fn snippet(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(PEM_SNIPPET_LENGTH).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}
