use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int32Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use csv::{QuoteStyle, Terminator, WriterBuilder};

use crate::errors::Result;
use crate::fetch::MeasurementBatch;

/// Column order of the published files. Everything else the export view
/// returns is dropped during the reshape.
pub const EXPORT_COLUMNS: [&str; 9] = [
    "location_id",
    "sensors_id",
    "location",
    "datetime",
    "lat",
    "lon",
    "parameter",
    "units",
    "value",
];

/// One row of the canonical export schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub location_id: i32,
    pub sensors_id: i32,
    pub location: Option<String>,
    pub datetime: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub parameter: String,
    pub units: String,
    pub value: f64,
}

/// A measurement batch pruned to the canonical export columns, ready to be
/// serialized by the file writer.
#[derive(Debug, Clone, Default)]
pub struct ExportTable {
    rows: Vec<ExportRow>,
}

impl ExportTable {
    pub fn new(rows: Vec<ExportRow>) -> Self {
        ExportTable { rows }
    }

    /// Reshapes a fetched batch into the export schema.
    pub fn from_batch(batch: MeasurementBatch) -> Self {
        let rows = batch
            .into_rows()
            .into_iter()
            .map(|row| ExportRow {
                location_id: row.location_id,
                sensors_id: row.sensors_id,
                location: row.location,
                datetime: row.datetime,
                lat: row.lat,
                lon: row.lon,
                parameter: row.parameter,
                units: row.units,
                value: row.value,
            })
            .collect();

        ExportTable { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[ExportRow] {
        &self.rows
    }

    /// Serializes the table to CSV.
    ///
    /// All non-numeric fields are quoted and the line terminator is a bare
    /// `\n` on every platform, so the same table always produces the same
    /// bytes.
    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::NonNumeric)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(EXPORT_COLUMNS)?;

        for row in &self.rows {
            writer.write_record([
                row.location_id.to_string(),
                row.sensors_id.to_string(),
                row.location.clone().unwrap_or_default(),
                row.datetime.clone(),
                row.lat.map(|v| v.to_string()).unwrap_or_default(),
                row.lon.map(|v| v.to_string()).unwrap_or_default(),
                row.parameter.clone(),
                row.units.clone(),
                row.value.to_string(),
            ])?;
        }

        writer
            .into_inner()
            .map_err(|e| crate::errors::ExportError::Io(std::io::Error::other(e.to_string())))
    }

    /// Converts the table into an arrow record batch for the parquet writer.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let schema = Schema::new(vec![
            Field::new("location_id", DataType::Int32, false),
            Field::new("sensors_id", DataType::Int32, false),
            Field::new("location", DataType::Utf8, true),
            Field::new("datetime", DataType::Utf8, false),
            Field::new("lat", DataType::Float64, true),
            Field::new("lon", DataType::Float64, true),
            Field::new("parameter", DataType::Utf8, false),
            Field::new("units", DataType::Utf8, false),
            Field::new("value", DataType::Float64, false),
        ]);

        let location_ids: Int32Array = self.rows.iter().map(|r| r.location_id).collect::<Vec<_>>().into();
        let sensors_ids: Int32Array = self.rows.iter().map(|r| r.sensors_id).collect::<Vec<_>>().into();
        let locations: StringArray = self
            .rows
            .iter()
            .map(|r| r.location.as_deref())
            .collect::<Vec<_>>()
            .into();
        let datetimes: StringArray = self
            .rows
            .iter()
            .map(|r| r.datetime.as_str())
            .collect::<Vec<_>>()
            .into();
        let lats: Float64Array = self.rows.iter().map(|r| r.lat).collect::<Vec<_>>().into();
        let lons: Float64Array = self.rows.iter().map(|r| r.lon).collect::<Vec<_>>().into();
        let parameters: StringArray = self
            .rows
            .iter()
            .map(|r| r.parameter.as_str())
            .collect::<Vec<_>>()
            .into();
        let units: StringArray = self
            .rows
            .iter()
            .map(|r| r.units.as_str())
            .collect::<Vec<_>>()
            .into();
        let values: Float64Array = self.rows.iter().map(|r| r.value).collect::<Vec<_>>().into();

        let columns: Vec<ArrayRef> = vec![
            Arc::new(location_ids),
            Arc::new(sensors_ids),
            Arc::new(locations),
            Arc::new(datetimes),
            Arc::new(lats),
            Arc::new(lons),
            Arc::new(parameters),
            Arc::new(units),
            Arc::new(values),
        ];

        let batch = RecordBatch::try_new(Arc::new(schema), columns)?;
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;

    fn sample_table() -> ExportTable {
        ExportTable::new(vec![
            ExportRow {
                location_id: 61936,
                sensors_id: 3,
                location: Some("Site A".into()),
                datetime: "2023-07-15T01:00:00-06:00".into(),
                lat: Some(35.5),
                lon: Some(-97.1),
                parameter: "pm25".into(),
                units: "µg/m³".into(),
                value: 12.5,
            },
            ExportRow {
                location_id: 61936,
                sensors_id: 4,
                location: None,
                datetime: "2023-07-15T02:00:00-06:00".into(),
                lat: None,
                lon: None,
                parameter: "o3".into(),
                units: "ppm".into(),
                value: 0.003,
            },
        ])
    }

    #[test]
    fn csv_bytes_are_stable() {
        let bytes = sample_table().to_csv_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();

        let expected = concat!(
            "\"location_id\",\"sensors_id\",\"location\",\"datetime\",\"lat\",\"lon\",\"parameter\",\"units\",\"value\"\n",
            "61936,3,\"Site A\",\"2023-07-15T01:00:00-06:00\",35.5,-97.1,\"pm25\",\"µg/m³\",12.5\n",
            "61936,4,\"\",\"2023-07-15T02:00:00-06:00\",\"\",\"\",\"o3\",\"ppm\",0.003\n",
        );

        assert_eq!(text, expected);
    }

    #[test]
    fn csv_bytes_do_not_depend_on_platform() {
        let first = sample_table().to_csv_bytes().unwrap();
        let second = sample_table().to_csv_bytes().unwrap();
        assert_eq!(first, second);
        assert!(!first.windows(2).any(|w| w == b"\r\n"));
    }

    #[test]
    fn record_batch_matches_export_schema() {
        let batch = sample_table().to_record_batch().unwrap();

        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), EXPORT_COLUMNS.len());

        let names: Vec<_> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, EXPORT_COLUMNS);

        let locations = batch
            .column(2)
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(locations.value(0), "Site A");
        assert!(locations.is_null(1));
    }

    #[test]
    fn reshape_drops_non_export_columns() {
        use crate::fetch::{MeasurementBatch, MeasurementRow};

        let batch = MeasurementBatch::new(vec![MeasurementRow {
            location_id: 7,
            sensors_id: 1,
            location: Some("x".into()),
            ismobile: Some(false),
            sensor: Some("s-1".into()),
            datetime: "2021-01-01T05:00:00+00:00".into(),
            parameter: "no2".into(),
            units: "ppm".into(),
            value: 0.01,
            lat: Some(1.0),
            lon: Some(2.0),
            provider: "p1".into(),
            country: "us".into(),
        }]);

        let table = ExportTable::from_batch(batch);
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows()[0].parameter, "no2");
        assert_eq!(table.rows()[0].location.as_deref(), Some("x"));
    }
}
