use std::time::{Duration, Instant};

use chrono::NaiveDate;
use indoc::indoc;
use sqlx::{query_as, FromRow, PgExecutor};
use tracing::debug;

use crate::errors::Result;

/// One measurement row as returned by the export view.
///
/// `datetime` is the pre-rendered local-time text form, which is what ends
/// up in the exported files; the numeric timestamp never leaves the
/// database.
#[derive(FromRow, Debug, Clone)]
pub struct MeasurementRow {
    pub location_id: i32,
    pub sensors_id: i32,
    pub location: Option<String>,
    pub ismobile: Option<bool>,
    pub sensor: Option<String>,
    pub datetime: String,
    pub parameter: String,
    pub units: String,
    pub value: f64,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub provider: String,
    pub country: String,
}

/// The measurement rows for one location day.
///
/// Owned by a single unit of work for its lifetime; an empty batch is a
/// valid, non-error result.
#[derive(Debug, Clone, Default)]
pub struct MeasurementBatch {
    rows: Vec<MeasurementRow>,
}

impl MeasurementBatch {
    pub fn new(rows: Vec<MeasurementRow>) -> Self {
        MeasurementBatch { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[MeasurementRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<MeasurementRow> {
        self.rows
    }

    /// Provider partition value, taken from the first row.
    pub fn provider(&self) -> Option<&str> {
        self.rows.first().map(|row| row.provider.as_str())
    }

    /// Country partition value, taken from the first row.
    pub fn country(&self) -> Option<&str> {
        self.rows.first().map(|row| row.country.as_str())
    }
}

/// Fetches all measurements for one location and day.
///
/// The day window is evaluated in the location's own timezone, so a file
/// always contains one full local day. Using an exclusive lower bound and
/// inclusive upper bound assigns a midnight reading to the day it closes.
pub async fn fetch_measurements<'e>(
    executor: impl PgExecutor<'e>,
    location_id: i32,
    day: &NaiveDate,
) -> Result<(MeasurementBatch, Duration)> {
    let started = Instant::now();

    debug!(location_id, day = %day, "Fetching measurement data");

    let sql = indoc! {r#"
        select location_id
             , sensors_id
             , location
             , ismobile
             , sensor
             , datetime_str as datetime
             , measurand as parameter
             , units
             , value
             , lat
             , lon
             , coalesce(provider, 'no-provider') as provider
             , lower(coalesce(country, 'no-country')) as country
            from measurement_data_export
            where location_id = $1
            and datetime > timezone(tz, ($2)::timestamp)
            and datetime <= timezone(tz, ($2)::timestamp + '1 day'::interval)
            order by datetime asc, sensors_id asc
    "#};

    let rows = query_as(sql)
        .bind(location_id)
        .bind(day)
        .fetch_all(executor)
        .await?;

    Ok((MeasurementBatch::new(rows), started.elapsed()))
}
