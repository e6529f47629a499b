//! Archive format checks for compatibility with the regulator's tooling.

mod common;

use common::STRONG_ZIP_PASSWORD;
use dgoj_signer::{EncryptedArchiver, EntryFilename, PipelineError, ZipPassword};

/// WinZip AES extra field: id 0x9901, size 7, AE-2, "AE", AES-256, Deflate
const AE2_EXTRA_FIELD: [u8; 11] = [0x01, 0x99, 0x07, 0x00, 0x02, 0x00, b'A', b'E', 0x03, 0x08, 0x00];

fn password() -> ZipPassword {
    ZipPassword::new(STRONG_ZIP_PASSWORD).unwrap()
}

fn create(entry: &str, content: &[u8]) -> Vec<u8> {
    EncryptedArchiver::new()
        .create(&EntryFilename::new(entry).unwrap(), content, &password())
        .unwrap()
}

#[test]
fn local_header_declares_winzip_aes() {
    let archive = create("enveloped.xml", b"<Root><Value>42</Value></Root>");

    assert_eq!(&archive[0..4], b"PK\x03\x04");
    let flags = u16::from_le_bytes([archive[6], archive[7]]);
    assert_eq!(flags & 0x0001, 1, "encryption flag must be set");
    let method = u16::from_le_bytes([archive[8], archive[9]]);
    assert_eq!(method, 99, "AES entries use compression method 99");

    let name_len = usize::from(u16::from_le_bytes([archive[26], archive[27]]));
    let extra_len = usize::from(u16::from_le_bytes([archive[28], archive[29]]));
    assert_eq!(&archive[30..30 + name_len], b"enveloped.xml");
    let extra = &archive[30 + name_len..30 + name_len + extra_len];
    assert!(
        extra.windows(AE2_EXTRA_FIELD.len()).any(|w| w == AE2_EXTRA_FIELD),
        "AE-2 extra field missing: {extra:02x?}"
    );
}

#[test]
fn crc_is_zeroed_in_local_and_central_headers() {
    // Above the size where AE-1 with a real CRC would otherwise be written
    let content = b"<Root><Value>42</Value></Root>".repeat(50);
    let archive = create("enveloped.xml", &content);

    assert_eq!(&archive[14..18], &[0, 0, 0, 0], "local header CRC-32");

    let eocd = archive.len() - 22;
    assert_eq!(&archive[eocd..eocd + 4], b"PK\x05\x06");
    let central = u32::from_le_bytes(archive[eocd + 16..eocd + 20].try_into().unwrap()) as usize;
    assert_eq!(&archive[central..central + 4], b"PK\x01\x02");
    assert_eq!(&archive[central + 16..central + 20], &[0, 0, 0, 0], "central CRC-32");

    let name_len = usize::from(u16::from_le_bytes([archive[central + 28], archive[central + 29]]));
    let extra_len = usize::from(u16::from_le_bytes([archive[central + 30], archive[central + 31]]));
    let extra_start = central + 46 + name_len;
    let extra = &archive[extra_start..extra_start + extra_len];
    assert!(
        extra.windows(AE2_EXTRA_FIELD.len()).any(|w| w == AE2_EXTRA_FIELD),
        "central directory AE-2 extra field missing: {extra:02x?}"
    );

    assert_eq!(
        EncryptedArchiver::new()
            .open_entry(&archive, "enveloped.xml", &password())
            .unwrap(),
        content
    );
}

#[test]
fn round_trip_preserves_bytes() {
    let content: Vec<u8> = (0..10_000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
    let archive = create("lote.xml", &content);

    let archiver = EncryptedArchiver::new();
    assert_eq!(archiver.list_entries(&archive).unwrap(), vec!["lote.xml"]);
    assert_eq!(
        archiver.open_entry(&archive, "lote.xml", &password()).unwrap(),
        content
    );
}

#[test]
fn wrong_password_is_archive_error() {
    let archive = create("enveloped.xml", b"payload");
    let wrong = ZipPassword::new(STRONG_ZIP_PASSWORD.replace('T', "t")).unwrap();
    match EncryptedArchiver::new().open_entry(&archive, "enveloped.xml", &wrong) {
        Err(PipelineError::ArchiveError(_)) => {}
        other => panic!("expected ArchiveError, got {other:?}"),
    }
}

#[test]
fn nested_entry_names_are_kept() {
    let archive = create("2024/06/lote.xml", b"<a/>");
    assert_eq!(
        EncryptedArchiver::new().list_entries(&archive).unwrap(),
        vec!["2024/06/lote.xml"]
    );
}
