use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dispatcher::{ExportWorker, WorkKind};
use crate::errors::{ExportError, Result};
use crate::sql::UnitFilter;

/// Default batch size when an invocation does not specify one.
pub const DEFAULT_LIMIT: i64 = 500;

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// One dispatch invocation: a method plus its arguments.
///
/// The wire shape is `{"method": "...", "args": {...}}`. Validation happens
/// here at the boundary; by the time a worker method runs, every argument
/// is typed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "method", content = "args", rename_all = "lowercase")]
pub enum Request {
    /// Export pending location days
    Export(ExportArgs),
    /// Relocate exported files to the canonical key layout
    Move(FilterArgs),
    /// Verify and repair exported file visibility
    Check(FilterArgs),
    /// Export one explicit location day, bypassing the queue
    Dump(DumpArgs),
    /// Report database time and ledger totals
    Ping,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ExportArgs {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

/// Arguments shared by the move and check methods.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FilterArgs {
    #[serde(default = "default_limit")]
    pub limit: i64,

    #[serde(default, alias = "node")]
    pub location_id: Option<i32>,

    #[serde(default)]
    pub day: Option<NaiveDate>,
}

impl FilterArgs {
    fn filter(&self) -> UnitFilter {
        UnitFilter {
            location_id: self.location_id,
            day: self.day,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DumpArgs {
    #[serde(alias = "node")]
    pub location_id: i32,

    pub day: NaiveDate,
}

impl Request {
    /// Parses an invocation payload, rejecting unknown methods and
    /// malformed arguments before any work starts.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ExportError::InvalidRequest(e.to_string()))
    }
}

/// What an invocation hands back: a processed-unit count or a status line.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Response {
    Count(u64),
    Status(String),
}

/// Routes one request to the worker.
///
/// Per-unit failures stay inside the pass (ledger + logs); only batch-level
/// failures surface as an error here.
pub async fn dispatch(worker: &ExportWorker, request: Request) -> Result<Response> {
    match request {
        Request::Export(args) => {
            let processed = worker.run(WorkKind::Pending, args.limit).await?;
            Ok(Response::Count(processed as u64))
        }
        Request::Move(args) => {
            let processed = worker
                .run_filtered(WorkKind::MoveCandidates, &args.filter(), args.limit)
                .await?;
            Ok(Response::Count(processed as u64))
        }
        Request::Check(args) => {
            let processed = worker
                .run_filtered(WorkKind::CheckCandidates, &args.filter(), args.limit)
                .await?;
            Ok(Response::Count(processed as u64))
        }
        Request::Dump(args) => {
            let report = worker.export_one(args.location_id, args.day).await;
            Ok(Response::Count(report.records()))
        }
        Request::Ping => {
            let status = worker.ping().await?;
            Ok(Response::Status(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_request_parses_with_limit() {
        let request = Request::from_value(json!({
            "method": "export",
            "args": { "limit": 25 }
        }))
        .unwrap();

        assert_eq!(request, Request::Export(ExportArgs { limit: 25 }));
    }

    #[test]
    fn export_limit_defaults() {
        let request = Request::from_value(json!({
            "method": "export",
            "args": {}
        }))
        .unwrap();

        assert_eq!(
            request,
            Request::Export(ExportArgs {
                limit: DEFAULT_LIMIT
            })
        );
    }

    #[test]
    fn ping_needs_no_args() {
        let request = Request::from_value(json!({ "method": "ping" })).unwrap();
        assert_eq!(request, Request::Ping);
    }

    #[test]
    fn dump_accepts_node_alias() {
        let request = Request::from_value(json!({
            "method": "dump",
            "args": { "node": 61936, "day": "2023-07-15" }
        }))
        .unwrap();

        assert_eq!(
            request,
            Request::Dump(DumpArgs {
                location_id: 61936,
                day: NaiveDate::from_ymd_opt(2023, 7, 15).unwrap(),
            })
        );
    }

    #[test]
    fn move_filter_is_optional() {
        let request = Request::from_value(json!({
            "method": "move",
            "args": { "limit": 3 }
        }))
        .unwrap();

        let Request::Move(args) = request else {
            panic!("expected a move request");
        };
        assert_eq!(args.limit, 3);
        assert_eq!(args.filter(), UnitFilter::default());
    }

    #[test]
    fn unknown_method_is_rejected() {
        let error = Request::from_value(json!({ "method": "explode" })).unwrap_err();
        assert!(matches!(error, ExportError::InvalidRequest(_)));
    }

    #[test]
    fn malformed_day_is_rejected() {
        let error = Request::from_value(json!({
            "method": "dump",
            "args": { "location_id": 1, "day": "15-07-2023" }
        }))
        .unwrap_err();
        assert!(matches!(error, ExportError::InvalidRequest(_)));
    }

    #[test]
    fn count_response_serializes_bare() {
        let body = serde_json::to_string(&Response::Count(42)).unwrap();
        assert_eq!(body, "42");

        let body = serde_json::to_string(&Response::Status("ok".into())).unwrap();
        assert_eq!(body, "\"ok\"");
    }
}
