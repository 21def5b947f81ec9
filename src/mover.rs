use std::time::Instant;

use tracing::{debug, info};

use crate::dispatcher::ExportWorker;
use crate::errors::{ExportError, Result};
use crate::executor::{record_unit_error, Phases, UnitOutcome, UnitReport};
use crate::paths::{canonical_key, legacy_key};
use crate::sql::claim_check::CheckUnit;
use crate::sql::claim_move::MoveUnit;
use crate::sql::update_unit::mark_moved;
use crate::store::{Storage, Visibility};

/// Relocates one exported file from its legacy key to the canonical key and
/// records the new key in the ledger.
pub(crate) async fn process_move_unit(
    worker: &ExportWorker,
    storage: &Storage,
    visibility: Visibility,
    unit: MoveUnit,
) -> UnitReport {
    let location_id = *unit.location_id();
    let day = *unit.day();
    let mut phases = Phases::default();

    let outcome = match try_move(worker, storage, visibility, &unit, &mut phases).await {
        Ok(outcome) => outcome,
        Err(e) => record_unit_error(worker, location_id, &day, e, &mut phases).await,
    };

    phases.into_report(location_id, day, outcome)
}

async fn try_move(
    worker: &ExportWorker,
    storage: &Storage,
    visibility: Visibility,
    unit: &MoveUnit,
    phases: &mut Phases,
) -> Result<UnitOutcome> {
    let location_id = *unit.location_id();
    let day = unit.day();

    let from_key = legacy_key(worker.format(), unit.country(), location_id, day);
    let to_key = canonical_key(
        worker.format(),
        unit.provider(),
        unit.country(),
        location_id,
        day,
    );

    let started = Instant::now();
    if from_key == to_key {
        // Nothing to relocate; make sure the policy still holds.
        storage.set_visibility(&to_key, visibility).await?;
    } else if storage.exists(&from_key).await? {
        storage.copy(&from_key, &to_key, visibility).await?;
        storage.delete(&from_key).await?;
        debug!(from_key, to_key, "Moved object");
    } else if storage.exists(&to_key).await? {
        // An earlier pass copied the file but died before the ledger update.
        debug!(to_key, "Source already relocated");
    } else {
        return Err(ExportError::Storage(format!(
            "source object {from_key} does not exist"
        )));
    }
    phases.write = started.elapsed();

    let started = Instant::now();
    mark_moved(
        worker.pg_pool(),
        location_id,
        day,
        &to_key,
        Some(storage.bucket()),
    )
    .await?;
    phases.ledger = started.elapsed();

    info!(location_id, day = %day, key = to_key, "Relocated location day file");

    Ok(UnitOutcome::Relocated)
}

/// Verifies one exported file's visibility, repairing it when it does not
/// match the configured policy. The claim already stamped `checked_on`.
pub(crate) async fn process_check_unit(
    worker: &ExportWorker,
    storage: &Storage,
    visibility: Visibility,
    unit: CheckUnit,
) -> UnitReport {
    let location_id = *unit.location_id();
    let day = *unit.day();
    let mut phases = Phases::default();

    let outcome = match try_check(storage, visibility, &unit, &mut phases).await {
        Ok(outcome) => outcome,
        Err(e) => record_unit_error(worker, location_id, &day, e, &mut phases).await,
    };

    phases.into_report(location_id, day, outcome)
}

async fn try_check(
    storage: &Storage,
    visibility: Visibility,
    unit: &CheckUnit,
    phases: &mut Phases,
) -> Result<UnitOutcome> {
    let key = unit.key();

    let started = Instant::now();
    if !storage.exists(key).await? {
        return Err(ExportError::Storage(format!(
            "exported object {key} does not exist"
        )));
    }

    if !storage.visibility_matches(key, visibility).await? {
        storage.set_visibility(key, visibility).await?;
        info!(
            location_id = unit.location_id(),
            day = %unit.day(),
            key,
            "Repaired object visibility"
        );
    }
    phases.write = started.elapsed();

    Ok(UnitOutcome::Verified)
}
