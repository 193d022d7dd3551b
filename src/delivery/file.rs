/// Append-only CSV file sink
use log::{error, info};
use std::borrow::Cow;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use crate::delivery::{DeliveryError, Severity};
use crate::records::{Record, CSV_HEADER};

#[derive(Debug, Clone)]
pub struct FileSink {
    directory: PathBuf,
    filename: String,
}

impl FileSink {
    pub fn new(directory: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }

    /// Append records in order, writing the header first if the file is new
    pub fn append_all(&self, records: &[Record]) -> Severity {
        match self.write_records(records) {
            Ok(()) => Severity::Normal,
            Err(e) => {
                error!("Write CSV exception ({}): {}", self.path().display(), e);
                Severity::Error
            }
        }
    }

    fn write_records(&self, records: &[Record]) -> Result<(), DeliveryError> {
        if records.is_empty() {
            return Err(DeliveryError::NoData);
        }

        if !self.directory.exists() {
            info!("Create ({})", self.directory.display());
            fs::create_dir_all(&self.directory)?;
        }

        let target = self.path();
        let needs_header = !target.is_file();
        let file = OpenOptions::new().create(true).append(true).open(&target)?;
        let mut writer = BufWriter::new(file);

        info!("Writing CSV file ({})", target.display());
        if needs_header {
            write_row(&mut writer, &CSV_HEADER)?;
        }
        for record in records {
            write_row(&mut writer, &record.row())?;
        }
        writer.flush()?;

        Ok(())
    }
}

fn write_row(out: &mut impl Write, fields: &[&str]) -> io::Result<()> {
    let line = fields
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(out, "{}", line)
}

/// Quote a field if it holds a delimiter, quote or line break
fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}
