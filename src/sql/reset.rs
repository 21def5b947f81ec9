use sqlx::{query, PgExecutor};

use crate::errors::Result;

/// Rebuilds the export log from the measurement tables, requeueing every
/// location day. Used before a full re-export.
pub async fn reset_export_logs<'e>(executor: impl PgExecutor<'e>) -> Result<u64> {
    let result = query("select * from reset_export_logs()")
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}
