//! Workflow snapshot query handler.

use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use beacon_core::filter::{FilterSpec, StatusFilter, TimeRange};
use beacon_core::record::WorkflowRecord;
use beacon_store::ListQuery;

use crate::error::ApiResult;
use crate::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for the workflow snapshot.
#[derive(Debug, Deserialize)]
pub struct WorkflowsQuery {
    /// Maximum number of records to return
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Repository substring filter
    #[serde(default)]
    pub repository: Option<String>,
    /// Conclusion filter
    #[serde(default)]
    pub status: StatusFilter,
    /// Time range filter
    #[serde(default)]
    pub time_range: TimeRange,
    /// Caller's UTC offset in minutes (browser convention)
    #[serde(default)]
    pub utc_offset: i32,
}

fn default_limit() -> usize {
    50
}

/// Snapshot response payload.
#[derive(Debug, Serialize)]
pub struct WorkflowListData {
    /// Matching records, most recently updated first
    pub workflows: Vec<WorkflowRecord>,
    /// Number of records returned
    pub count: usize,
}

/// Workflow snapshot handler.
///
/// GET /api/v1/workflows
pub async fn list_workflows(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WorkflowsQuery>,
) -> ApiResult<ApiResponse<WorkflowListData>> {
    let workflows = state
        .store
        .list(ListQuery {
            filter: FilterSpec {
                time_range: query.time_range,
                status: query.status,
            },
            repository: query.repository,
            limit: query.limit,
            utc_offset: query.utc_offset,
        })
        .await?;

    let count = workflows.len();
    Ok(ApiResponse::success(WorkflowListData { workflows, count }))
}
