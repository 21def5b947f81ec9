use getset::Getters;
use sqlx::{query_as, FromRow, PgExecutor};

use crate::errors::Result;

/// Ledger totals reported by the ping method.
#[derive(FromRow, Getters, Debug, Clone)]
#[getset(get = "pub")]
pub struct LedgerStats {
    now: String,
    total: i64,
    exported: i64,
}

/// Returns the database time plus total and exported row counts from the
/// export log. Doubles as a connectivity test.
pub async fn ledger_stats<'e>(executor: impl PgExecutor<'e>) -> Result<LedgerStats> {
    let stats = query_as(
        r#"
            select now()::text as now
                 , count(1) as total
                 , coalesce(sum((exported_on is not null)::int), 0)::bigint as exported
                from open_data_export_logs
        "#,
    )
    .fetch_one(executor)
    .await?;

    Ok(stats)
}
