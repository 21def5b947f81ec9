use chrono::NaiveDate;
use indoc::indoc;
use sqlx::{query, PgExecutor};

use crate::errors::Result;

/// Marks one location day as exported, recording the row count, the final
/// object key and the time spent producing it.
///
/// Re-running with the same fields is safe: the update is keyed on
/// (location_id, day) and simply overwrites the previous terminal state.
pub async fn mark_exported<'e>(
    executor: impl PgExecutor<'e>,
    location_id: i32,
    day: &NaiveDate,
    records: i64,
    key: &str,
    bucket: Option<&str>,
    seconds: f64,
    version: i32,
) -> Result<bool> {
    let sql = indoc! {r#"
        update open_data_export_logs
            set exported_on = now()
            , records = $3
            , key = $4
            , version = $5
            , has_error = false
            , metadata = jsonb_build_object(
                  'bucket', ($6)::text
                , 'key', ($4)::text
                , 'sec', ($7)::numeric
                , 'version', ($5)::int
            )
            where location_id = $1
            and day = $2
    "#};

    let result = query(sql)
        .bind(location_id)
        .bind(day)
        .bind(records)
        .bind(key)
        .bind(version)
        .bind(bucket)
        .bind(seconds)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Marks one location day as processed with zero measurement rows.
///
/// An empty day is a terminal success, not an error: no file is written and
/// no key is recorded.
pub async fn mark_empty<'e>(
    executor: impl PgExecutor<'e>,
    location_id: i32,
    day: &NaiveDate,
    seconds: f64,
    version: i32,
) -> Result<bool> {
    let sql = indoc! {r#"
        update open_data_export_logs
            set exported_on = now()
            , records = 0
            , key = null
            , version = $3
            , has_error = false
            , metadata = jsonb_build_object(
                  'sec', ($4)::numeric
                , 'version', ($3)::int
            )
            where location_id = $1
            and day = $2
    "#};

    let result = query(sql)
        .bind(location_id)
        .bind(day)
        .bind(version)
        .bind(seconds)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Records a per-unit failure with its message and timestamp.
pub async fn mark_error<'e>(
    executor: impl PgExecutor<'e>,
    location_id: i32,
    day: &NaiveDate,
    message: &str,
) -> Result<bool> {
    let sql = indoc! {r#"
        update open_data_export_logs
            set has_error = true
            , metadata = jsonb_build_object(
                  'error', true
                , 'message', ($3)::text
                , 'at', now()
            )
            where location_id = $1
            and day = $2
    "#};

    let result = query(sql)
        .bind(location_id)
        .bind(day)
        .bind(message)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Records the canonical key after a file has been relocated.
pub async fn mark_moved<'e>(
    executor: impl PgExecutor<'e>,
    location_id: i32,
    day: &NaiveDate,
    key: &str,
    bucket: Option<&str>,
) -> Result<bool> {
    let sql = indoc! {r#"
        update open_data_export_logs
            set key = $3
            , metadata = coalesce(metadata, '{}'::jsonb) || jsonb_build_object(
                  'bucket', ($4)::text
                , 'key', ($3)::text
            )
            where location_id = $1
            and day = $2
    "#};

    let result = query(sql)
        .bind(location_id)
        .bind(day)
        .bind(key)
        .bind(bucket)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}
