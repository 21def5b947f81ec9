use std::future::Future;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use futures::{stream, StreamExt};
use getset::Getters;
use sqlx::PgPool;
use tracing::info;

use crate::builder::ExportWorkerOptions;
use crate::errors::{ExportError, Result};
use crate::executor::{process_export_unit, UnitOutcome, UnitReport};
use crate::mover::{process_check_unit, process_move_unit};
use crate::sql::claim_check::claim_check_candidates;
use crate::sql::claim_move::claim_move_candidates;
use crate::sql::claim_outdated::claim_outdated;
use crate::sql::claim_pending::{claim_pending, ExportUnit};
use crate::sql::reset::reset_export_logs;
use crate::sql::stats::ledger_stats;
use crate::sql::UnitFilter;
use crate::write::{Destination, ExportFormat};

/// Format version written into the ledger with every export. Bumping it
/// makes previously exported location days eligible for the outdated pass.
pub const CURRENT_EXPORT_VERSION: i32 = 2;

/// Workers process I/O bound units, so the pool is sized a little past the
/// core count to keep connections busy while other tasks wait on S3.
pub(crate) const CONCURRENCY_HEADROOM: usize = 2;

/// The kinds of batches one dispatch pass can process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkKind {
    /// Location days queued for a first export
    Pending,
    /// Previously exported location days with an old format version
    Outdated,
    /// Exported files still sitting under the legacy key layout
    MoveCandidates,
    /// Exported files due for a visibility check
    CheckCandidates,
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::Pending => "pending",
            WorkKind::Outdated => "outdated",
            WorkKind::MoveCandidates => "move",
            WorkKind::CheckCandidates => "check",
        }
    }
}

/// The export worker: one instance per process, owning the connection pool
/// and the configured write location.
///
/// All state shared between units lives in the database or the object
/// store; the worker itself is immutable while a pass runs.
#[derive(Getters)]
#[getset(get = "pub")]
pub struct ExportWorker {
    /// Unique identifier for this worker instance
    pub(crate) worker_id: String,
    /// Maximum number of units processed concurrently
    pub(crate) concurrency: usize,
    /// Database connection pool
    pub(crate) pg_pool: PgPool,
    /// Where files are written
    pub(crate) destination: Destination,
    /// Output serialization format
    pub(crate) format: ExportFormat,
    /// Format version stamped on every export
    pub(crate) export_version: i32,
}

impl ExportWorker {
    pub fn options() -> ExportWorkerOptions {
        ExportWorkerOptions::default()
    }

    /// Runs one dispatch pass over up to `limit` units of `kind`.
    ///
    /// Returns the number of successfully processed units. Per-unit
    /// failures are recorded in the ledger and logged, never raised; only a
    /// failure to claim the batch aborts the pass.
    pub async fn run(&self, kind: WorkKind, limit: i64) -> Result<usize> {
        self.run_filtered(kind, &UnitFilter::default(), limit).await
    }

    /// Like [`run`](Self::run), optionally narrowed to one location and/or
    /// day. The filter only applies to the move/check kinds; the pending
    /// and outdated selections are owned by their stored procedures.
    pub async fn run_filtered(
        &self,
        kind: WorkKind,
        filter: &UnitFilter,
        limit: i64,
    ) -> Result<usize> {
        let started = Instant::now();

        let (reports, claim_elapsed) = match kind {
            WorkKind::Pending => {
                let (units, claim) = claim_pending(self.pg_pool(), limit).await?;
                let reports = self
                    .fan_out(units, |unit| process_export_unit(self, unit))
                    .await;
                (reports, claim)
            }
            WorkKind::Outdated => {
                let (units, claim) =
                    claim_outdated(self.pg_pool(), self.export_version, limit).await?;
                let reports = self
                    .fan_out(units, |unit| process_export_unit(self, unit))
                    .await;
                (reports, claim)
            }
            WorkKind::MoveCandidates => {
                let (storage, visibility) = self.require_object_store()?;
                let (units, claim) =
                    claim_move_candidates(self.pg_pool(), filter, limit).await?;
                let reports = self
                    .fan_out(units, |unit| {
                        process_move_unit(self, storage, visibility, unit)
                    })
                    .await;
                (reports, claim)
            }
            WorkKind::CheckCandidates => {
                let (storage, visibility) = self.require_object_store()?;
                let (units, claim) =
                    claim_check_candidates(self.pg_pool(), filter, limit).await?;
                let reports = self
                    .fan_out(units, |unit| {
                        process_check_unit(self, storage, visibility, unit)
                    })
                    .await;
                (reports, claim)
            }
        };

        let summary = BatchSummary::reduce(kind, claim_elapsed, started.elapsed(), &reports);
        summary.log();

        Ok(summary.succeeded)
    }

    /// Exports one explicit location day, bypassing the queue selection.
    /// The ledger is still updated exactly as in a queued export.
    pub async fn export_one(&self, location_id: i32, day: NaiveDate) -> UnitReport {
        process_export_unit(self, ExportUnit::new(location_id, day)).await
    }

    /// Connectivity test: database time plus ledger totals.
    pub async fn ping(&self) -> Result<String> {
        let stats = ledger_stats(self.pg_pool()).await?;
        Ok(format!(
            "{} of {} rows as of {}",
            stats.exported(),
            stats.total(),
            stats.now()
        ))
    }

    /// Resets the export log, requeueing every location day.
    pub async fn reset(&self) -> Result<u64> {
        reset_export_logs(self.pg_pool()).await
    }

    fn require_object_store(&self) -> Result<(&crate::store::Storage, crate::store::Visibility)> {
        self.destination.object_store().ok_or_else(|| {
            ExportError::Storage("the move and check passes require an s3 write location".into())
        })
    }

    /// Fans a batch out over a bounded pool and collects results as they
    /// complete. Each task returns its own immutable report; nothing is
    /// shared between units.
    async fn fan_out<U, F, Fut>(&self, units: Vec<U>, run_unit: F) -> Vec<UnitReport>
    where
        F: Fn(U) -> Fut,
        Fut: Future<Output = UnitReport>,
    {
        stream::iter(units)
            .map(run_unit)
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}

/// Aggregated result of one dispatch pass.
#[derive(Debug, Clone, Copy)]
pub struct BatchSummary {
    pub kind: WorkKind,
    pub claimed: usize,
    pub succeeded: usize,
    pub empty: usize,
    pub failed: usize,
    pub records: u64,
    pub claim: Duration,
    pub fetch: Duration,
    pub write: Duration,
    pub ledger: Duration,
    pub total: Duration,
}

impl BatchSummary {
    /// Folds the per-unit reports into batch totals.
    pub fn reduce(
        kind: WorkKind,
        claim: Duration,
        total: Duration,
        reports: &[UnitReport],
    ) -> Self {
        let mut summary = BatchSummary {
            kind,
            claimed: reports.len(),
            succeeded: 0,
            empty: 0,
            failed: 0,
            records: 0,
            claim,
            fetch: Duration::ZERO,
            write: Duration::ZERO,
            ledger: Duration::ZERO,
            total,
        };

        for report in reports {
            if report.succeeded() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            if matches!(report.outcome, UnitOutcome::Empty) {
                summary.empty += 1;
            }
            summary.records += report.records();
            summary.fetch += report.fetch;
            summary.write += report.write;
            summary.ledger += report.ledger;
        }

        summary
    }

    /// Effective throughput over the whole pass, claim included.
    pub fn units_per_second(&self) -> f64 {
        let seconds = self.total.as_secs_f64();
        if seconds > 0.0 {
            self.claimed as f64 / seconds
        } else {
            0.0
        }
    }

    /// Share of accumulated busy time spent in each phase, as percentages
    /// (fetch, write, ledger).
    pub fn phase_percentages(&self) -> (f64, f64, f64) {
        let busy = (self.fetch + self.write + self.ledger).as_secs_f64();
        if busy == 0.0 {
            return (0.0, 0.0, 0.0);
        }
        (
            self.fetch.as_secs_f64() / busy * 100.0,
            self.write.as_secs_f64() / busy * 100.0,
            self.ledger.as_secs_f64() / busy * 100.0,
        )
    }

    /// Emits the one summary line every pass produces.
    pub fn log(&self) {
        let (fetch_pct, write_pct, ledger_pct) = self.phase_percentages();

        info!(
            kind = self.kind.as_str(),
            claimed = self.claimed,
            succeeded = self.succeeded,
            empty = self.empty,
            failed = self.failed,
            records = self.records,
            claim_ms = self.claim.as_millis() as u64,
            elapsed_ms = self.total.as_millis() as u64,
            fetch_pct = format!("{fetch_pct:.1}"),
            write_pct = format!("{write_pct:.1}"),
            ledger_pct = format!("{ledger_pct:.1}"),
            units_per_sec = format!("{:.2}", self.units_per_second()),
            "Processed batch"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Phases, UnitOutcome};

    fn report(outcome: UnitOutcome, fetch_ms: u64, write_ms: u64, ledger_ms: u64) -> UnitReport {
        let phases = Phases {
            fetch: Duration::from_millis(fetch_ms),
            write: Duration::from_millis(write_ms),
            ledger: Duration::from_millis(ledger_ms),
        };
        phases.into_report(1, chrono::NaiveDate::from_ymd_opt(2023, 7, 15).unwrap(), outcome)
    }

    #[test]
    fn reduce_counts_partial_failures_without_raising() {
        let reports = vec![
            report(UnitOutcome::Exported { records: 100 }, 30, 20, 10),
            report(UnitOutcome::Empty, 5, 0, 2),
            report(
                UnitOutcome::Failed {
                    message: "boom".into(),
                },
                1,
                0,
                1,
            ),
        ];

        let summary = BatchSummary::reduce(
            WorkKind::Pending,
            Duration::from_millis(7),
            Duration::from_millis(100),
            &reports,
        );

        assert_eq!(summary.claimed, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.records, 100);
        assert_eq!(summary.fetch, Duration::from_millis(36));
        assert_eq!(summary.write, Duration::from_millis(20));
        assert_eq!(summary.ledger, Duration::from_millis(13));
    }

    #[test]
    fn phase_percentages_sum_to_one_hundred() {
        let reports = vec![report(UnitOutcome::Exported { records: 1 }, 50, 30, 20)];
        let summary = BatchSummary::reduce(
            WorkKind::Pending,
            Duration::ZERO,
            Duration::from_millis(100),
            &reports,
        );

        let (fetch, write, ledger) = summary.phase_percentages();
        assert!((fetch - 50.0).abs() < 1e-9);
        assert!((write - 30.0).abs() < 1e-9);
        assert!((ledger - 20.0).abs() < 1e-9);
        assert!((fetch + write + ledger - 100.0).abs() < 1e-9);
    }

    #[test]
    fn empty_batch_summary_is_all_zero() {
        let summary = BatchSummary::reduce(
            WorkKind::CheckCandidates,
            Duration::from_millis(3),
            Duration::from_millis(4),
            &[],
        );

        assert_eq!(summary.claimed, 0);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.phase_percentages(), (0.0, 0.0, 0.0));
    }

    #[test]
    fn throughput_uses_wall_clock() {
        let reports = vec![
            report(UnitOutcome::Exported { records: 1 }, 10, 10, 10),
            report(UnitOutcome::Exported { records: 1 }, 10, 10, 10),
        ];
        let summary = BatchSummary::reduce(
            WorkKind::Pending,
            Duration::ZERO,
            Duration::from_secs(2),
            &reports,
        );

        assert!((summary.units_per_second() - 1.0).abs() < 1e-9);
    }
}
