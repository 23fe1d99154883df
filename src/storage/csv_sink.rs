//! CSV record output
//!
//! Every field is quoted, so embedded commas, quotes and newlines in product
//! descriptions survive a round trip.

use crate::catalog::{ProductRecord, CSV_HEADERS};
use crate::storage::sink::{RecordSink, StorageResult};
use csv::{QuoteStyle, Writer, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::path::Path;

/// Writes records as CSV rows in `CSV_HEADERS` order
pub struct CsvSink {
    writer: Writer<File>,
    rows: u64,
}

impl CsvSink {
    /// Opens `path` for writing
    ///
    /// # Arguments
    ///
    /// * `path` - Output file, created if missing
    /// * `append` - Keep existing rows (resume) instead of truncating
    ///
    /// The header row is written only when the file starts out empty.
    pub fn create(path: &Path, append: bool) -> StorageResult<Self> {
        let file = if append {
            OpenOptions::new().create(true).append(true).open(path)?
        } else {
            File::create(path)?
        };
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(CSV_HEADERS)?;
            writer.flush()?;
        }

        Ok(Self { writer, rows: 0 })
    }

    /// Rows written through this sink
    pub fn rows_written(&self) -> u64 {
        self.rows
    }
}

impl RecordSink for CsvSink {
    fn write(&mut self, record: &ProductRecord) -> StorageResult<()> {
        self.writer.serialize(record.to_row())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.writer.flush()?;
        Ok(())
    }
}
