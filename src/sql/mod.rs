use chrono::NaiveDate;

pub mod claim_check;
pub mod claim_move;
pub mod claim_outdated;
pub mod claim_pending;
pub mod reset;
pub mod stats;
pub mod update_unit;

/// Optional narrowing of a move/check pass to one location and/or day.
///
/// An empty filter selects across the whole ledger; the claim statements
/// treat each `None` as "any value".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitFilter {
    pub location_id: Option<i32>,
    pub day: Option<NaiveDate>,
}
