use std::time::{Duration, Instant};

use chrono::NaiveDate;
use getset::Getters;
use indoc::indoc;
use sqlx::{query_as, FromRow, PgExecutor};

use crate::errors::Result;
use crate::sql::UnitFilter;

/// An exported location day due for an object visibility check.
#[derive(FromRow, Getters, Debug, Clone, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct CheckUnit {
    location_id: i32,
    day: NaiveDate,
    key: String,
}

/// Claims up to `limit` check candidates in a single statement.
///
/// Eligible rows were exported without error, hold a key, and were last
/// checked more than a day ago. Stamping `checked_on` inside the claim is
/// both the claim mark and the "last checked" record; a failed check then
/// writes an error on top of it.
pub async fn claim_check_candidates<'e>(
    executor: impl PgExecutor<'e>,
    filter: &UnitFilter,
    limit: i64,
) -> Result<(Vec<CheckUnit>, Duration)> {
    let started = Instant::now();

    let sql = indoc! {r#"
        with candidates as (
            select l.location_id
                 , l.day
                 , l.key
                from open_data_export_logs l
                where l.exported_on is not null
                and l.records > 0
                and l.key is not null
                and (l.has_error is null or not l.has_error)
                and (l.checked_on is null or l.checked_on < now() - '1 day'::interval)
                and ($2::int is null or l.location_id = $2)
                and ($3::date is null or l.day = $3)
                order by l.checked_on asc nulls first
                limit $1
                for update
                skip locked
        )
        update open_data_export_logs as logs
            set checked_on = now()
            from candidates c
            where logs.location_id = c.location_id
            and logs.day = c.day
            returning c.location_id, c.day, c.key
    "#};

    let units = query_as(sql)
        .bind(limit)
        .bind(filter.location_id)
        .bind(filter.day)
        .fetch_all(executor)
        .await?;

    Ok((units, started.elapsed()))
}
