use std::time::{Duration, Instant};

use chrono::NaiveDate;
use getset::Getters;
use sqlx::{query_as, FromRow, PgExecutor};

use crate::errors::Result;

/// One (location, day) pair selected for processing.
///
/// Claimed rows also carry the measurement count recorded by the selection
/// procedure, which is a volume hint only and may be stale.
#[derive(FromRow, Getters, Debug, Clone, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct ExportUnit {
    location_id: i32,
    day: NaiveDate,
    records: Option<i64>,
}

impl ExportUnit {
    pub fn new(location_id: i32, day: NaiveDate) -> Self {
        ExportUnit {
            location_id,
            day,
            records: None,
        }
    }
}

/// Claims up to `limit` pending location days.
///
/// `get_pending` marks the rows it hands back as part of the selection, so
/// two concurrent passes never receive the same unit.
pub async fn claim_pending<'e>(
    executor: impl PgExecutor<'e>,
    limit: i64,
) -> Result<(Vec<ExportUnit>, Duration)> {
    let started = Instant::now();

    let units = query_as(
        r#"
            select location_id, day, records
                from get_pending($1)
        "#,
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok((units, started.elapsed()))
}
