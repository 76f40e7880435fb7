use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use common::api::AgentSeenEntry;

use crate::{app_state::AppState, error::ApiResult, persistence::agent_seen};

pub fn router() -> Router<AppState> {
    Router::<AppState>::new().route("/api/v1/agents/{agent_id}/seen", get(seen))
}

/// Last projected event per discovery type; empty for an unknown agent.
async fn seen(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> ApiResult<Json<Vec<AgentSeenEntry>>> {
    let entries = agent_seen::list_agent_seen(&state.db, &agent_id).await?;
    Ok(Json(entries))
}
