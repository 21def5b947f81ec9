use std::fmt;
use std::io::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use flate2::write::GzEncoder;
use flate2::Compression;
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use tracing::debug;

use crate::errors::{ExportError, Result};
use crate::store::{Storage, Visibility};
use crate::table::ExportTable;

/// Output serialization format.
///
/// `json` is recognized but rejected at parse time, before any data is
/// fetched or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    CsvGz,
    Parquet,
}

impl ExportFormat {
    /// The label used for the format partition segment of object keys.
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::CsvGz => "csv.gz",
            ExportFormat::Parquet => "parquet",
        }
    }

    /// The file extension, identical to the label for all supported formats.
    pub fn extension(&self) -> &'static str {
        self.label()
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "csv" => Ok(ExportFormat::Csv),
            "csv.gz" => Ok(ExportFormat::CsvGz),
            "parquet" => Ok(ExportFormat::Parquet),
            "json" => Err(ExportError::UnsupportedFormat(
                "json exports are not supported yet".into(),
            )),
            other => Err(ExportError::UnsupportedFormat(format!(
                "{other} is not a supported export format"
            ))),
        }
    }
}

/// Which kind of write location the worker targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
    S3,
    Local,
}

impl FromStr for DestinationKind {
    type Err = ExportError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "s3" => Ok(DestinationKind::S3),
            "local" => Ok(DestinationKind::Local),
            other => Err(ExportError::UnsupportedDestination(other.into())),
        }
    }
}

/// A fully-configured write location.
#[derive(Clone)]
pub enum Destination {
    S3 {
        storage: Storage,
        visibility: Visibility,
    },
    Local {
        root: PathBuf,
    },
}

impl Destination {
    /// Bucket name recorded in ledger metadata, if any.
    pub fn bucket(&self) -> Option<&str> {
        match self {
            Destination::S3 { storage, .. } => Some(storage.bucket()),
            Destination::Local { .. } => None,
        }
    }

    /// The object store behind this destination, for the move/check passes.
    pub fn object_store(&self) -> Option<(&Storage, Visibility)> {
        match self {
            Destination::S3 {
                storage,
                visibility,
            } => Some((storage, *visibility)),
            Destination::Local { .. } => None,
        }
    }
}

/// Serializes a table and persists it under `stub` plus the format
/// extension. Returns the final path and the time spent encoding and
/// writing.
pub async fn write_table(
    table: &ExportTable,
    stub: &str,
    format: &ExportFormat,
    destination: &Destination,
) -> Result<(String, Duration)> {
    let started = Instant::now();

    let body = encode_table(table, format)?;
    let bytes = body.len();
    let path = format!("{stub}.{}", format.extension());

    match destination {
        Destination::S3 {
            storage,
            visibility,
        } => {
            storage.put(&path, body, *visibility).await?;
        }
        Destination::Local { root } => {
            let full_path = root.join(&path);
            if let Some(parent) = full_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&full_path, &body).await?;
        }
    }

    debug!(path, bytes, rows = table.len(), "Wrote export file");

    Ok((path, started.elapsed()))
}

fn encode_table(table: &ExportTable, format: &ExportFormat) -> Result<Vec<u8>> {
    match format {
        ExportFormat::Csv => table.to_csv_bytes(),
        ExportFormat::CsvGz => {
            let csv = table.to_csv_bytes()?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&csv)?;
            Ok(encoder.finish()?)
        }
        ExportFormat::Parquet => {
            let batch = table.to_record_batch()?;
            let properties = WriterProperties::builder()
                .set_compression(parquet::basic::Compression::SNAPPY)
                .build();

            let mut buffer = Vec::new();
            let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties))?;
            writer.write(&batch)?;
            writer.close()?;

            Ok(buffer)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_formats_parse() {
        assert_eq!("csv".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(
            "csv.gz".parse::<ExportFormat>().unwrap(),
            ExportFormat::CsvGz
        );
        assert_eq!(
            "parquet".parse::<ExportFormat>().unwrap(),
            ExportFormat::Parquet
        );
    }

    #[test]
    fn json_format_is_rejected() {
        let error = "json".parse::<ExportFormat>().unwrap_err();
        assert!(matches!(error, ExportError::UnsupportedFormat(_)));
        assert_eq!(error.to_string(), "json exports are not supported yet");
    }

    #[test]
    fn unknown_format_is_rejected() {
        let error = "avro".parse::<ExportFormat>().unwrap_err();
        assert_eq!(error.to_string(), "avro is not a supported export format");
    }

    #[test]
    fn unknown_destination_is_rejected() {
        assert_eq!("s3".parse::<DestinationKind>().unwrap(), DestinationKind::S3);
        assert_eq!(
            "local".parse::<DestinationKind>().unwrap(),
            DestinationKind::Local
        );

        let error = "ftp".parse::<DestinationKind>().unwrap_err();
        assert!(matches!(error, ExportError::UnsupportedDestination(_)));
        assert_eq!(error.to_string(), "ftp is not a valid write location");
    }

    #[test]
    fn extension_matches_label() {
        for format in [ExportFormat::Csv, ExportFormat::CsvGz, ExportFormat::Parquet] {
            assert_eq!(format.label(), format.extension());
        }
    }
}
