//! Audit log viewer API.

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::Serialize;
use tracing::instrument;

use insight_library_core::{ActivityLog, ActivityLogQuery};

use crate::{
    error::FunctionError, middleware::AuthenticatedCaller, services::accounts, state::AppState,
};

/// One page of audit entries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogPage {
    pub logs: Vec<ActivityLog>,
    pub page: u32,
    pub page_size: u32,
}

/// List audit entries, newest first (admin only).
///
/// Query parameters: `action`, `search`, `page` (zero-based), `pageSize`.
///
/// # Errors
///
/// 403 for non-admins, 400 for an unknown `action` or malformed paging.
#[instrument(skip_all)]
pub async fn list_logs(
    AuthenticatedCaller(caller): AuthenticatedCaller,
    State(state): State<AppState>,
    query: Result<Query<ActivityLogQuery>, QueryRejection>,
) -> Result<Json<ActivityLogPage>, FunctionError> {
    caller.require_admin(accounts::ONLY_ADMINS_LOGS)?;
    let Query(query) = query.map_err(|e| FunctionError::BadRequest(e.body_text()))?;
    let logs = state.accounts().activity_logs(&caller, &query).await?;

    Ok(Json(ActivityLogPage {
        logs,
        page: query.page,
        page_size: query.limit(),
    }))
}
