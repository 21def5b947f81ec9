//! Export worker for the OpenAQ open data archive.
//!
//! Measurements live in PostgreSQL; the published archive is one file per
//! location per day in an S3 bucket. This crate coordinates the two: it
//! claims batches of (location, day) units from a SQL export log, fans them
//! out over a bounded pool of concurrent tasks, writes CSV/CSV.gz/Parquet
//! files, and records per-unit success or failure back in the log.
//!
//! The export log is the single source of truth. Units are claimed with
//! single atomic statements so that overlapping passes never process the
//! same unit twice, and every processed unit ends in exactly one terminal
//! ledger update. A unit that fails mid-flight stays claimed and is picked
//! up again by a later pass.

pub mod builder;
pub mod dispatcher;
pub mod errors;
pub mod executor;
pub mod fetch;
pub mod mover;
pub mod paths;
pub mod request;
pub mod sql;
pub mod store;
pub mod table;
pub mod write;

pub use builder::{ExportWorkerOptions, WorkerBuildError};
pub use dispatcher::{BatchSummary, ExportWorker, WorkKind, CURRENT_EXPORT_VERSION};
pub use errors::{ExportError, Result};
pub use executor::{UnitOutcome, UnitReport};
pub use fetch::{MeasurementBatch, MeasurementRow};
pub use request::{dispatch, Request, Response};
pub use sql::claim_pending::ExportUnit;
pub use sql::UnitFilter;
pub use store::{Storage, Visibility};
pub use table::{ExportRow, ExportTable};
pub use write::{Destination, DestinationKind, ExportFormat};
