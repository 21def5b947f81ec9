use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tracing::{error, info, warn};

use crate::dispatcher::ExportWorker;
use crate::errors::{ExportError, Result};
use crate::fetch::fetch_measurements;
use crate::paths::canonical_stub;
use crate::sql::claim_pending::ExportUnit;
use crate::sql::update_unit::{mark_empty, mark_error, mark_exported};
use crate::table::ExportTable;
use crate::write::write_table;

/// Terminal state of one processed unit.
///
/// An explicit result type rather than an exception: an empty day and a
/// failed day are different outcomes, and the dispatcher needs to tell them
/// apart without parsing error strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Rows were written and the ledger records the file
    Exported { records: u64 },
    /// No measurements existed for the unit; recorded as a non-error
    Empty,
    /// The file was relocated to its canonical key
    Relocated,
    /// The file's visibility was verified (and repaired if needed)
    Verified,
    /// The unit failed; the message is also recorded in the ledger
    Failed { message: String },
}

/// Immutable per-unit result record returned by every worker task.
///
/// The dispatcher reduces over these; nothing is accumulated from inside a
/// task.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub location_id: i32,
    pub day: NaiveDate,
    pub outcome: UnitOutcome,
    pub fetch: Duration,
    pub write: Duration,
    pub ledger: Duration,
}

impl UnitReport {
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, UnitOutcome::Failed { .. })
    }

    pub fn records(&self) -> u64 {
        match &self.outcome {
            UnitOutcome::Exported { records } => *records,
            _ => 0,
        }
    }
}

/// Per-phase timings threaded through a unit's execution so the report stays
/// accurate even when a later phase fails.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Phases {
    pub fetch: Duration,
    pub write: Duration,
    pub ledger: Duration,
}

impl Phases {
    pub(crate) fn into_report(
        self,
        location_id: i32,
        day: NaiveDate,
        outcome: UnitOutcome,
    ) -> UnitReport {
        UnitReport {
            location_id,
            day,
            outcome,
            fetch: self.fetch,
            write: self.write,
            ledger: self.ledger,
        }
    }
}

/// Runs one export unit end to end: fetch, reshape, write, ledger update.
///
/// Never returns an error. Any failure is converted into exactly one
/// errored ledger update; if even that update fails the unit is left
/// claimed and will be retried by a later pass.
pub(crate) async fn process_export_unit(worker: &ExportWorker, unit: ExportUnit) -> UnitReport {
    let location_id = *unit.location_id();
    let day = *unit.day();
    let mut phases = Phases::default();

    let outcome = match try_export(worker, location_id, &day, &mut phases).await {
        Ok(outcome) => outcome,
        Err(e) => record_unit_error(worker, location_id, &day, e, &mut phases).await,
    };

    phases.into_report(location_id, day, outcome)
}

async fn try_export(
    worker: &ExportWorker,
    location_id: i32,
    day: &NaiveDate,
    phases: &mut Phases,
) -> Result<UnitOutcome> {
    let (batch, fetch_elapsed) = fetch_measurements(worker.pg_pool(), location_id, day).await?;
    phases.fetch = fetch_elapsed;

    if batch.is_empty() {
        let started = Instant::now();
        let updated = mark_empty(
            worker.pg_pool(),
            location_id,
            day,
            phases.fetch.as_secs_f64(),
            *worker.export_version(),
        )
        .await?;
        phases.ledger = started.elapsed();

        if !updated {
            warn!(location_id, day = %day, "No ledger row for empty unit");
        }
        info!(location_id, day = %day, "No measurements for location day");
        return Ok(UnitOutcome::Empty);
    }

    // Partition values come from the data itself; the fetch coalesces both
    // to a placeholder when the metadata tables have no value.
    let provider = batch.provider().unwrap_or("no-provider").to_string();
    let country = batch.country().unwrap_or("no-country").to_string();

    let table = ExportTable::from_batch(batch);
    let records = table.len() as i64;

    let stub = canonical_stub(worker.format(), &provider, &country, location_id, day);
    let (key, write_elapsed) = write_table(&table, &stub, worker.format(), worker.destination()).await?;
    phases.write = write_elapsed;

    let seconds = (phases.fetch + phases.write).as_secs_f64();
    let started = Instant::now();
    let updated = mark_exported(
        worker.pg_pool(),
        location_id,
        day,
        records,
        &key,
        worker.destination().bucket(),
        seconds,
        *worker.export_version(),
    )
    .await?;
    phases.ledger = started.elapsed();

    if !updated {
        warn!(location_id, day = %day, "No ledger row for exported unit");
    }
    info!(location_id, day = %day, records, key, "Exported location day");

    Ok(UnitOutcome::Exported {
        records: records as u64,
    })
}

/// Converts a unit failure into its errored ledger record.
///
/// A failing ledger write here is logged but not retried; the unit stays
/// claimed in its prior state and re-enters a later batch.
pub(crate) async fn record_unit_error(
    worker: &ExportWorker,
    location_id: i32,
    day: &NaiveDate,
    error: ExportError,
    phases: &mut Phases,
) -> UnitOutcome {
    let message = error.to_string();
    warn!(location_id, day = %day, error = %message, "Failed to process unit");

    let started = Instant::now();
    if let Err(ledger_error) = mark_error(worker.pg_pool(), location_id, day, &message).await {
        error!(
            location_id,
            day = %day,
            error = %ledger_error,
            "Could not record unit error, unit stays claimed for retry"
        );
    }
    phases.ledger += started.elapsed();

    UnitOutcome::Failed { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_outcome_is_not_a_success() {
        let report = Phases::default().into_report(
            1,
            NaiveDate::from_ymd_opt(2023, 7, 15).unwrap(),
            UnitOutcome::Failed {
                message: "boom".into(),
            },
        );
        assert!(!report.succeeded());
        assert_eq!(report.records(), 0);
    }

    #[test]
    fn empty_outcome_is_a_success_with_zero_records() {
        let report = Phases::default().into_report(
            1,
            NaiveDate::from_ymd_opt(2023, 7, 15).unwrap(),
            UnitOutcome::Empty,
        );
        assert!(report.succeeded());
        assert_eq!(report.records(), 0);
    }

    #[test]
    fn exported_outcome_carries_records() {
        let report = Phases::default().into_report(
            1,
            NaiveDate::from_ymd_opt(2023, 7, 15).unwrap(),
            UnitOutcome::Exported { records: 288 },
        );
        assert!(report.succeeded());
        assert_eq!(report.records(), 288);
    }
}
