//! Archive batch encoding: CSV document, gzip compressed.

use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};
use crate::model::{ArchiveRow, RecordKind};

/// Encodes one batch as a gzip-compressed CSV document.
///
/// The header row is the kind's fixed column set; every row must carry
/// exactly that many values.
///
/// # Errors
///
/// Returns an encode error if a row's value count disagrees with the
/// kind's columns or the CSV/gzip writers fail.
pub fn encode_batch(kind: RecordKind, rows: &[ArchiveRow]) -> Result<Bytes> {
    let columns = kind.columns();
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(columns)
        .map_err(|e| Error::encode(format!("{kind} header: {e}")))?;

    for row in rows {
        if row.values.len() != columns.len() {
            return Err(Error::encode(format!(
                "{kind} row {} has {} values, expected {}",
                row.id,
                row.values.len(),
                columns.len()
            )));
        }
        writer
            .write_record(&row.values)
            .map_err(|e| Error::encode(format!("{kind} row {}: {e}", row.id)))?;
    }

    let csv_bytes = writer
        .into_inner()
        .map_err(|e| Error::encode(format!("{kind} flush: {e}")))?;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&csv_bytes)
        .map_err(|e| Error::encode(format!("{kind} gzip: {e}")))?;
    let compressed = encoder
        .finish()
        .map_err(|e| Error::encode(format!("{kind} gzip finish: {e}")))?;

    Ok(Bytes::from(compressed))
}
