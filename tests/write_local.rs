use std::fs;
use std::io::Read;

use flate2::read::GzDecoder;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::TempDir;

use open_data_export::write::write_table;
use open_data_export::{Destination, ExportFormat, ExportRow, ExportTable};

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

const STUB: &str =
    "records/csv/provider=p1/country=us/locationid=61936/year=2023/month=07/location-61936-20230715";

#[tokio::test]
async fn writes_csv_to_a_local_root() {
    let dir = TempDir::new().unwrap();
    let destination = Destination::Local {
        root: dir.path().to_path_buf(),
    };

    let table = sample_table();
    let (path, _elapsed) = write_table(&table, STUB, &ExportFormat::Csv, &destination)
        .await
        .expect("Failed to write csv");

    assert_eq!(path, format!("{STUB}.csv"));

    let text = fs::read_to_string(dir.path().join(&path)).unwrap();
    assert!(text.starts_with("\"location_id\""));
    assert_eq!(text.lines().count(), 3);
    assert!(text.contains("\"Site A\""));
}

#[tokio::test]
async fn gzipped_csv_decompresses_to_the_same_bytes() {
    let dir = TempDir::new().unwrap();
    let destination = Destination::Local {
        root: dir.path().to_path_buf(),
    };

    let table = sample_table();
    let (path, _elapsed) = write_table(&table, STUB, &ExportFormat::CsvGz, &destination)
        .await
        .expect("Failed to write csv.gz");

    assert_eq!(path, format!("{STUB}.csv.gz"));

    let file = fs::File::open(dir.path().join(&path)).unwrap();
    let mut decoder = GzDecoder::new(file);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).unwrap();

    assert_eq!(decompressed, table.to_csv_bytes().unwrap());
}

#[tokio::test]
async fn parquet_round_trips_through_the_arrow_reader() {
    let dir = TempDir::new().unwrap();
    let destination = Destination::Local {
        root: dir.path().to_path_buf(),
    };

    let table = sample_table();
    let (path, _elapsed) = write_table(&table, STUB, &ExportFormat::Parquet, &destination)
        .await
        .expect("Failed to write parquet");

    assert_eq!(path, format!("{STUB}.parquet"));

    let file = fs::File::open(dir.path().join(&path)).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .unwrap()
        .build()
        .unwrap();

    let batches: Vec<_> = reader.collect::<Result<Vec<_>, _>>().unwrap();
    let rows: usize = batches.iter().map(|batch| batch.num_rows()).sum();
    assert_eq!(rows, table.len());

    let names: Vec<_> = batches[0]
        .schema()
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect();
    assert_eq!(
        names,
        [
            "location_id",
            "sensors_id",
            "location",
            "datetime",
            "lat",
            "lon",
            "parameter",
            "units",
            "value"
        ]
    );
}

#[tokio::test]
async fn rewriting_a_unit_produces_the_same_path_and_bytes() {
    let dir = TempDir::new().unwrap();
    let destination = Destination::Local {
        root: dir.path().to_path_buf(),
    };

    let table = sample_table();
    let (first_path, _) = write_table(&table, STUB, &ExportFormat::Csv, &destination)
        .await
        .unwrap();
    let first_bytes = fs::read(dir.path().join(&first_path)).unwrap();

    let (second_path, _) = write_table(&table, STUB, &ExportFormat::Csv, &destination)
        .await
        .unwrap();
    let second_bytes = fs::read(dir.path().join(&second_path)).unwrap();

    assert_eq!(first_path, second_path);
    assert_eq!(first_bytes, second_bytes);
}
