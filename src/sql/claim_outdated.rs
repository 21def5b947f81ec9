use std::time::{Duration, Instant};

use sqlx::{query_as, PgExecutor};

use crate::errors::Result;
use crate::sql::claim_pending::ExportUnit;

/// Claims up to `limit` location days whose recorded format version is older
/// than `version`, scheduling them for re-export.
pub async fn claim_outdated<'e>(
    executor: impl PgExecutor<'e>,
    version: i32,
    limit: i64,
) -> Result<(Vec<ExportUnit>, Duration)> {
    let started = Instant::now();

    let units = query_as(
        r#"
            select location_id, day, records
                from outdated_location_days($1, $2)
        "#,
    )
    .bind(version)
    .bind(limit)
    .fetch_all(executor)
    .await?;

    Ok((units, started.elapsed()))
}
