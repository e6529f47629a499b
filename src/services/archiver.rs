//! Encrypted archive creation and extraction.
//!
//! The regulator's decryption tooling expects a single-entry ZIP using
//! Deflate compression and WinZip AES-256 encryption (AE-2: PBKDF2-HMAC-SHA1
//! key derivation, AES-CTR, HMAC-SHA1 authentication code, CRC zeroed).
//! Archives are built fully in memory.

use crate::domain::types::{EntryFilename, ZipPassword};
use crate::infra::error::{PipelineError, PipelineResult};
use std::io::{Cursor, Read, Write};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{AesMode, CompressionMethod, ZipArchive, ZipWriter};

/// Builds and opens password-protected single-entry archives
pub struct EncryptedArchiver;

impl Default for EncryptedArchiver {
    fn default() -> Self {
        Self::new()
    }
}

impl EncryptedArchiver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compress and encrypt `content` as the only entry of a new archive.
    ///
    /// Either the complete archive is returned or an `ArchiveError`.
    pub fn create(
        &self,
        entry: &EntryFilename,
        content: &[u8],
        password: &ZipPassword,
    ) -> PipelineResult<Vec<u8>> {
        let options = FileOptions::<()>::default()
            .compression_method(CompressionMethod::Deflated)
            .with_aes_encryption(AesMode::Aes256, password.as_str());

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file(entry.as_str(), options).map_err(|e| {
            PipelineError::ArchiveError(format!("Failed to start entry '{entry}': {e}"))
        })?;
        writer.write_all(content).map_err(|e| {
            PipelineError::ArchiveError(format!("Failed to write entry '{entry}': {e}"))
        })?;
        let mut archive = writer
            .finish()
            .map_err(|e| PipelineError::ArchiveError(format!("Failed to finish archive: {e}")))?
            .into_inner();
        rewrite_as_ae2(&mut archive)?;

        log::info!(
            "Created AES-256 archive with entry '{entry}': {} -> {} bytes",
            content.len(),
            archive.len()
        );
        Ok(archive)
    }

    /// Decrypt and return the contents of one entry.
    pub fn open_entry(
        &self,
        archive: &[u8],
        entry: &str,
        password: &ZipPassword,
    ) -> PipelineResult<Vec<u8>> {
        let mut zip = open_archive(archive)?;
        let mut file = zip
            .by_name_decrypt(entry, password.as_str().as_bytes())
            .map_err(|e| match e {
                ZipError::InvalidPassword => PipelineError::ArchiveError(format!(
                    "wrong password for entry '{entry}'"
                )),
                ZipError::FileNotFound => {
                    PipelineError::ArchiveError(format!("archive has no entry '{entry}'"))
                }
                other => PipelineError::ArchiveError(format!(
                    "Failed to open entry '{entry}': {other}"
                )),
            })?;

        let mut content = Vec::with_capacity(usize::try_from(file.size()).unwrap_or(0));
        // The AE-2 authentication code is checked once the entry is fully read
        file.read_to_end(&mut content).map_err(|e| {
            PipelineError::ArchiveError(format!("Failed to decrypt entry '{entry}': {e}"))
        })?;
        Ok(content)
    }

    /// Names of the entries in archive order
    pub fn list_entries(&self, archive: &[u8]) -> PipelineResult<Vec<String>> {
        let zip = open_archive(archive)?;
        Ok(zip.file_names().map(str::to_string).collect())
    }
}

const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;
const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4b50;
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x0605_4b50;
const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4b50;
const LOCAL_HEADER_LEN: usize = 30;
const CENTRAL_HEADER_LEN: usize = 46;
const END_OF_CENTRAL_DIRECTORY_LEN: usize = 22;
const AES_EXTRA_FIELD_ID: u16 = 0x9901;
const AE2_VENDOR_VERSION: u16 = 2;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Mark every WinZip AES entry as AE-2: vendor version 2 and a zero CRC-32
/// in the local header, the central directory and any data descriptor.
///
/// The zip writer emits AE-1 (real CRC) for all but tiny entries. The AES
/// authentication code covers only the ciphertext, so patching the headers
/// leaves the entry verifiable.
fn rewrite_as_ae2(archive: &mut [u8]) -> PipelineResult<()> {
    let eocd = archive
        .len()
        .checked_sub(END_OF_CENTRAL_DIRECTORY_LEN)
        .filter(|&at| read_u32(archive, at).ok() == Some(END_OF_CENTRAL_DIRECTORY_SIGNATURE))
        .ok_or_else(|| malformed("end of central directory not found"))?;
    let entries = read_u16(archive, eocd + 10)?;
    let mut central = read_u32(archive, eocd + 16)? as usize;

    for _ in 0..entries {
        if read_u32(archive, central)? != CENTRAL_HEADER_SIGNATURE {
            return Err(malformed("central directory header signature mismatch"));
        }
        let compressed_size = read_u32(archive, central + 20)? as usize;
        let name_len = read_u16(archive, central + 28)? as usize;
        let extra_len = read_u16(archive, central + 30)? as usize;
        let comment_len = read_u16(archive, central + 32)? as usize;
        let local = read_u32(archive, central + 42)? as usize;

        let extra = central + CENTRAL_HEADER_LEN + name_len;
        mark_ae2(archive, extra, extra_len)?;
        write_u32(archive, central + 16, 0)?;

        if read_u32(archive, local)? != LOCAL_HEADER_SIGNATURE {
            return Err(malformed("local header signature mismatch"));
        }
        let flags = read_u16(archive, local + 6)?;
        let local_name_len = read_u16(archive, local + 26)? as usize;
        let local_extra_len = read_u16(archive, local + 28)? as usize;
        mark_ae2(archive, local + LOCAL_HEADER_LEN + local_name_len, local_extra_len)?;
        write_u32(archive, local + 14, 0)?;

        if flags & FLAG_DATA_DESCRIPTOR != 0 {
            let descriptor =
                local + LOCAL_HEADER_LEN + local_name_len + local_extra_len + compressed_size;
            let crc_at = if read_u32(archive, descriptor)? == DATA_DESCRIPTOR_SIGNATURE {
                descriptor + 4
            } else {
                descriptor
            };
            write_u32(archive, crc_at, 0)?;
        }

        central += CENTRAL_HEADER_LEN + name_len + extra_len + comment_len;
    }
    Ok(())
}

/// Set the vendor version of the AES extra field within `len` bytes at `start`
fn mark_ae2(archive: &mut [u8], start: usize, len: usize) -> PipelineResult<()> {
    let mut at = start;
    while at + 4 <= start + len {
        let id = read_u16(archive, at)?;
        let size = read_u16(archive, at + 2)? as usize;
        if id == AES_EXTRA_FIELD_ID {
            if size < 7 {
                return Err(malformed("AES extra field is truncated"));
            }
            return write_u16(archive, at + 4, AE2_VENDOR_VERSION);
        }
        at += 4 + size;
    }
    Err(malformed("entry carries no WinZip AES extra field"))
}

fn read_u16(bytes: &[u8], at: usize) -> PipelineResult<u16> {
    bytes
        .get(at..at + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| malformed("header runs past the end of the archive"))
}

fn read_u32(bytes: &[u8], at: usize) -> PipelineResult<u32> {
    bytes
        .get(at..at + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| malformed("header runs past the end of the archive"))
}

fn write_u16(bytes: &mut [u8], at: usize, value: u16) -> PipelineResult<()> {
    bytes
        .get_mut(at..at + 2)
        .ok_or_else(|| malformed("header runs past the end of the archive"))?
        .copy_from_slice(&value.to_le_bytes());
    Ok(())
}

fn write_u32(bytes: &mut [u8], at: usize, value: u32) -> PipelineResult<()> {
    bytes
        .get_mut(at..at + 4)
        .ok_or_else(|| malformed("header runs past the end of the archive"))?
        .copy_from_slice(&value.to_le_bytes());
    Ok(())
}

fn malformed(what: &str) -> PipelineError {
    PipelineError::ArchiveError(format!("Unexpected archive layout: {what}"))
}

fn open_archive(archive: &[u8]) -> PipelineResult<ZipArchive<Cursor<&[u8]>>> {
    ZipArchive::new(Cursor::new(archive))
        .map_err(|e| PipelineError::ArchiveError(format!("Not a readable ZIP archive: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "Tr0ub4dor&3#Complex$Pass!word1234567890ABCDEFGHIJK";

    fn password() -> ZipPassword {
        ZipPassword::new(PASSWORD).unwrap()
    }

    #[test]
    fn single_entry_round_trip() {
        let archiver = EncryptedArchiver::new();
        let entry = EntryFilename::default();
        let content = b"<Root><Value>42</Value></Root>".repeat(20);

        let archive = archiver.create(&entry, &content, &password()).unwrap();
        assert_eq!(archiver.list_entries(&archive).unwrap(), vec!["enveloped.xml"]);
        assert_eq!(
            archiver
                .open_entry(&archive, "enveloped.xml", &password())
                .unwrap(),
            content
        );
    }

    #[test]
    fn headers_are_ae2_with_zero_crc() {
        let archiver = EncryptedArchiver::new();
        // Large enough that the writer would otherwise keep the real CRC
        let content = b"<Root><Value>42</Value></Root>".repeat(20);
        let archive = archiver
            .create(&EntryFilename::default(), &content, &password())
            .unwrap();

        assert_eq!(read_u32(&archive, 0).unwrap(), LOCAL_HEADER_SIGNATURE);
        assert_eq!(read_u32(&archive, 14).unwrap(), 0, "local header CRC");

        let eocd = archive.len() - END_OF_CENTRAL_DIRECTORY_LEN;
        let central = read_u32(&archive, eocd + 16).unwrap() as usize;
        assert_eq!(read_u32(&archive, central).unwrap(), CENTRAL_HEADER_SIGNATURE);
        assert_eq!(read_u32(&archive, central + 16).unwrap(), 0, "central CRC");

        let ae2 = [0x01, 0x99, 0x07, 0x00, 0x02, 0x00, b'A', b'E', 0x03, 0x08, 0x00];
        let count = archive.windows(ae2.len()).filter(|w| *w == ae2).count();
        assert_eq!(count, 2, "AE-2 extra field in local and central headers");
    }

    #[test]
    fn layout_errors_are_archive_errors() {
        let mut truncated = vec![0u8; 10];
        assert!(matches!(
            rewrite_as_ae2(&mut truncated),
            Err(PipelineError::ArchiveError(msg)) if msg.contains("end of central directory")
        ));

        let mut plain = Vec::new();
        {
            let mut writer = ZipWriter::new(Cursor::new(&mut plain));
            writer
                .start_file("a.xml", FileOptions::<()>::default())
                .unwrap();
            writer.write_all(b"<a/>").unwrap();
            writer.finish().unwrap();
        }
        assert!(matches!(
            rewrite_as_ae2(&mut plain),
            Err(PipelineError::ArchiveError(msg)) if msg.contains("no WinZip AES")
        ));
    }

    #[test]
    fn wrong_password_fails() {
        let archiver = EncryptedArchiver::new();
        let archive = archiver
            .create(&EntryFilename::default(), b"secret", &password())
            .unwrap();
        let wrong = ZipPassword::new("not-the-password").unwrap();
        assert!(matches!(
            archiver.open_entry(&archive, "enveloped.xml", &wrong),
            Err(PipelineError::ArchiveError(_))
        ));
    }

    #[test]
    fn content_is_not_stored_in_clear() {
        let archiver = EncryptedArchiver::new();
        let marker = b"PLAINTEXT-MARKER-PLAINTEXT-MARKER";
        let archive = archiver
            .create(&EntryFilename::default(), marker, &password())
            .unwrap();
        assert!(!archive.windows(marker.len()).any(|w| w == marker));
    }

    #[test]
    fn missing_entry_and_garbage_input() {
        let archiver = EncryptedArchiver::new();
        let archive = archiver
            .create(&EntryFilename::default(), b"x", &password())
            .unwrap();
        assert!(matches!(
            archiver.open_entry(&archive, "other.xml", &password()),
            Err(PipelineError::ArchiveError(msg)) if msg.contains("other.xml")
        ));
        assert!(matches!(
            archiver.list_entries(b"definitely not a zip"),
            Err(PipelineError::ArchiveError(_))
        ));
    }
}
