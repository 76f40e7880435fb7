use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use common::api::HostListEntry;

use super::ListQuery;
use crate::{
    app_state::AppState,
    error::ApiResult,
    persistence::{HostFilters, host_list},
};

pub fn router() -> Router<AppState> {
    Router::<AppState>::new().route("/api/v1/hosts", get(list_hosts))
}

async fn list_hosts(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Vec<HostListEntry>>> {
    let query = ListQuery::new(pairs);
    let limit = query.limit(state.limits.list_page_max)?;
    let filters = HostFilters {
        sids: query.values("sid"),
        cluster_ids: query.values("cluster_id"),
    };

    let hosts = host_list::list_hosts(&state.db, &filters, limit).await?;
    Ok(Json(hosts))
}
