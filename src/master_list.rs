//! Master-list ingestion.
//!
//! The backend distributes the master list either as a bare structure that
//! is handed to the eCard layer unmodified, or as a zip archive with one
//! DER-encoded certificate per entry. The two are told apart by the zip
//! local-file-header magic.

use std::io::{Cursor, Read};

use tracing::{error, warn};
use x509_cert::der::Decode;
use x509_cert::Certificate;

/// Local-file-header magic of the zip format (`PK`).
pub const ZIP_MAGIC: [u8; 2] = [0x50, 0x4b];

/// An ingested master list: either the certificate set extracted from a zip
/// package, or the raw blob when the list was not zip-packaged.
#[derive(Debug, Clone)]
pub enum MasterList {
    Certificates(Vec<Certificate>),
    Raw(Vec<u8>),
}

impl MasterList {
    pub fn certificates(&self) -> Option<&[Certificate]> {
        match self {
            MasterList::Certificates(certs) => Some(certs),
            MasterList::Raw(_) => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The blob announced itself as a zip archive but the archive directory
    /// could not be opened. This is a configuration-level failure, distinct
    /// from a valid archive that happens to contain no usable entries.
    #[error("master list archive is not readable: {0}")]
    ArchiveUnreadable(#[from] zip::result::ZipError),
}

/// Whether `data` carries the zip local-file-header magic.
pub fn is_zip(data: &[u8]) -> bool {
    data.len() >= 2 && data[0..2] == ZIP_MAGIC
}

/// Decode a raw master-list blob.
///
/// Zip-packaged lists are unpacked entry by entry; an entry that cannot be
/// read or parsed as a certificate is logged and skipped so one corrupt
/// entry cannot poison the rest of the list. Everything else passes through
/// as [`MasterList::Raw`].
pub fn ingest(data: &[u8], log_prefix: &str) -> Result<MasterList, Error> {
    if !is_zip(data) {
        return Ok(MasterList::Raw(data.to_vec()));
    }

    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(|e| {
        error!("{log_prefix}master list zip archive not readable: {e}");
        Error::ArchiveUnreadable(e)
    })?;

    let mut certificates = Vec::new();
    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{log_prefix}cannot open master list entry {index}: {e}");
                continue;
            }
        };
        let mut der = Vec::with_capacity(entry.size() as usize);
        if let Err(e) = entry.read_to_end(&mut der) {
            warn!("{log_prefix}cannot read master list entry {index}: {e}");
            continue;
        }
        match Certificate::from_der(&der) {
            Ok(certificate) => certificates.push(certificate),
            Err(e) => {
                warn!("{log_prefix}cannot parse a certificate from master list entry {index}: {e}")
            }
        }
    }
    Ok(MasterList::Certificates(certificates))
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    pub(crate) fn zip_of(entries: &[&[u8]]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options =
            FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (i, entry) in entries.iter().enumerate() {
            writer.start_file(format!("cert_{i}.der"), options).unwrap();
            writer.write_all(entry).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    const CERT_1: &[u8] = include_bytes!("../tests/data/master_list_cert_1.der");
    const CERT_2: &[u8] = include_bytes!("../tests/data/master_list_cert_2.der");

    #[test]
    fn non_zip_blob_passes_through_raw() {
        let blob = vec![0x30, 0x82, 0x01, 0x00];
        match ingest(&blob, "test: ").unwrap() {
            MasterList::Raw(raw) => assert_eq!(raw, blob),
            MasterList::Certificates(_) => panic!("expected raw pass-through"),
        }
    }

    #[test]
    fn short_blob_is_not_zip() {
        assert!(!is_zip(&[0x50]));
        assert!(is_zip(&[0x50, 0x4b]));
        assert!(is_zip(&[0x50, 0x4b, 0x03, 0x04]));
    }

    #[test]
    fn zip_prefix_always_routes_through_extraction() {
        // Starts with PK but is not a valid archive: must fail, not fall
        // back to raw pass-through.
        let bogus = vec![0x50, 0x4b, 0xff, 0xff];
        assert!(matches!(
            ingest(&bogus, "test: "),
            Err(Error::ArchiveUnreadable(_))
        ));
    }

    #[test]
    fn extracts_all_certificates() {
        let blob = zip_of(&[CERT_1, CERT_2]);
        let list = ingest(&blob, "test: ").unwrap();
        assert_eq!(list.certificates().unwrap().len(), 2);
    }

    #[test]
    fn corrupt_entry_is_skipped_not_fatal() {
        let blob = zip_of(&[CERT_1, b"this is not a certificate", CERT_2]);
        let list = ingest(&blob, "test: ").unwrap();
        assert_eq!(list.certificates().unwrap().len(), 2);
    }

    #[test]
    fn archive_of_garbage_yields_an_empty_set() {
        let blob = zip_of(&[b"garbage"]);
        let list = ingest(&blob, "test: ").unwrap();
        assert!(list.certificates().unwrap().is_empty());
    }
}
