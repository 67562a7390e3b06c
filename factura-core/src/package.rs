//! Transport packaging: signed XML into a single-entry zip, base64 for the
//! SOAP body.
use crate::document::DocumentId;
use base64ct::{Base64, Encoding};
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("archive error: {source}")]
    Zip {
        #[from]
        source: zip::result::ZipError,
    },
    #[error("archive I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("archive decode error: {0}")]
    Decode(String),
    #[error("archive is empty")]
    EmptyArchive,
}

/// Build `{documentID}.zip` holding `{documentID}.xml`. The signed bytes go
/// in verbatim; re-encoding them would invalidate the signature.
pub fn package(signed_xml: &[u8], id: &DocumentId) -> Result<Vec<u8>, PackageError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    writer.start_file(id.xml_file_name(), options)?;
    writer.write_all(signed_xml)?;
    let cursor = writer.finish()?;
    Ok(cursor.into_inner())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    Base64::encode_string(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, PackageError> {
    Base64::decode_vec(text.trim()).map_err(|e| PackageError::Decode(e.to_string()))
}

/// Read the first entry of a receipt archive (the CDR the authority
/// returns is a zip holding one response document).
pub fn read_first_entry(archive_bytes: &[u8]) -> Result<(String, Vec<u8>), PackageError> {
    let mut archive = ZipArchive::new(Cursor::new(archive_bytes))?;
    if archive.is_empty() {
        return Err(PackageError::EmptyArchive);
    }
    let mut entry = archive.by_index(0)?;
    let mut content = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut content)?;
    Ok((entry.name().to_string(), content))
}
