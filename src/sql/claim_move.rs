use std::time::{Duration, Instant};

use chrono::NaiveDate;
use getset::Getters;
use indoc::indoc;
use sqlx::{query_as, FromRow, PgExecutor};

use crate::errors::Result;
use crate::sql::UnitFilter;

/// An exported location day whose file still lives under the legacy layout.
#[derive(FromRow, Getters, Debug, Clone, PartialEq, Eq)]
#[getset(get = "pub")]
pub struct MoveUnit {
    location_id: i32,
    day: NaiveDate,
    country: String,
    provider: String,
}

/// Claims up to `limit` move candidates in a single statement.
///
/// The claim stamps `metadata.moved_on` on selection so that overlapping
/// passes cannot pick up the same file; `skip locked` keeps concurrent
/// claimers from blocking each other.
pub async fn claim_move_candidates<'e>(
    executor: impl PgExecutor<'e>,
    filter: &UnitFilter,
    limit: i64,
) -> Result<(Vec<MoveUnit>, Duration)> {
    let started = Instant::now();

    let sql = indoc! {r#"
        with candidates as (
            select l.location_id
                 , l.day
                 , lower(coalesce(sn.country, 'no-country')) as country
                 , coalesce(p.export_prefix, 'no-provider') as provider
                from open_data_export_logs l
                join sensor_nodes sn on (sn.location_id = l.location_id)
                join providers p on (p.source_name = sn.source_name)
                where l.exported_on is not null
                and (l.metadata->>'moved_on') is null
                and ($2::int is null or l.location_id = $2)
                and ($3::date is null or l.day = $3)
                limit $1
                for update of l
                skip locked
        )
        update open_data_export_logs as logs
            set metadata = coalesce(logs.metadata, '{}'::jsonb)
                || jsonb_build_object('moved_on', now())
            from candidates c
            where logs.location_id = c.location_id
            and logs.day = c.day
            returning c.location_id, c.day, c.country, c.provider
    "#};

    let units = query_as(sql)
        .bind(limit)
        .bind(filter.location_id)
        .bind(filter.day)
        .fetch_all(executor)
        .await?;

    Ok((units, started.elapsed()))
}
