use chrono::NaiveDate;

use crate::write::ExportFormat;

/// Renders a calendar day as the compact `YYYYMMDD` form used in file names.
pub fn compact_day(day: &NaiveDate) -> String {
    day.format("%Y%m%d").to_string()
}

/// Builds the canonical object key stub (without extension) for one
/// location/day file.
///
/// The stub plus the format extension must match the key recorded in the
/// export log, so both the writer and the ledger update derive from it.
pub fn canonical_stub(
    format: &ExportFormat,
    provider: &str,
    country: &str,
    location_id: i32,
    day: &NaiveDate,
) -> String {
    format!(
        "records/{format}/provider={provider}/country={country}/locationid={location_id}/year={year}/month={month}/location-{location_id}-{day}",
        format = format.label(),
        year = day.format("%Y"),
        month = day.format("%m"),
        day = compact_day(day),
    )
}

/// Builds the full canonical object key, extension included.
pub fn canonical_key(
    format: &ExportFormat,
    provider: &str,
    country: &str,
    location_id: i32,
    day: &NaiveDate,
) -> String {
    format!(
        "{}.{}",
        canonical_stub(format, provider, country, location_id, day),
        format.extension()
    )
}

/// Builds the legacy object key, which predates the `provider=` partition
/// segment. Files under this layout are relocated by the move pass.
pub fn legacy_key(
    format: &ExportFormat,
    country: &str,
    location_id: i32,
    day: &NaiveDate,
) -> String {
    format!(
        "records/{format}/country={country}/locationid={location_id}/year={year}/month={month}/location-{location_id}-{day}.{extension}",
        format = format.label(),
        year = day.format("%Y"),
        month = day.format("%m"),
        day = compact_day(day),
        extension = format.extension(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn canonical_key_is_deterministic() {
        let key = canonical_key(&ExportFormat::CsvGz, "p1", "us", 61936, &day(2023, 7, 15));
        assert_eq!(
            key,
            "records/csv.gz/provider=p1/country=us/locationid=61936/year=2023/month=07/location-61936-20230715.csv.gz"
        );
    }

    #[test]
    fn single_digit_components_are_zero_padded() {
        let key = canonical_key(&ExportFormat::Csv, "na", "cl", 7, &day(2021, 3, 4));
        assert_eq!(
            key,
            "records/csv/provider=na/country=cl/locationid=7/year=2021/month=03/location-7-20210304.csv"
        );
    }

    #[test]
    fn legacy_key_omits_provider_segment() {
        let key = legacy_key(&ExportFormat::Parquet, "us", 61936, &day(2023, 7, 15));
        assert_eq!(
            key,
            "records/parquet/country=us/locationid=61936/year=2023/month=07/location-61936-20230715.parquet"
        );
    }

    #[test]
    fn key_extends_stub() {
        let d = day(2022, 12, 1);
        let stub = canonical_stub(&ExportFormat::Parquet, "p9", "fr", 12, &d);
        let key = canonical_key(&ExportFormat::Parquet, "p9", "fr", 12, &d);
        assert_eq!(key, format!("{stub}.parquet"));
    }
}
