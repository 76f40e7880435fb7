use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use common::api::{ClusterListEntry, ClusterType};

use super::ListQuery;
use crate::{
    app_state::AppState,
    error::{ApiResult, AppError},
    persistence::{ClusterFilters, cluster_list},
};

pub fn router() -> Router<AppState> {
    Router::<AppState>::new()
        .route("/api/v1/clusters", get(list_clusters))
        .route("/api/v1/clusters/{id}", get(get_cluster))
}

async fn list_clusters(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> ApiResult<Json<Vec<ClusterListEntry>>> {
    let query = ListQuery::new(pairs);
    let limit = query.limit(state.limits.list_page_max)?;
    let cluster_types = query
        .values("cluster_type")
        .iter()
        .map(|raw| raw.parse::<ClusterType>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(AppError::bad_request)?;

    let filters = ClusterFilters {
        names: query.values("name"),
        sids: query.values("sid"),
        cluster_types,
    };
    let clusters = cluster_list::list_clusters(&state.db, &filters, limit).await?;
    Ok(Json(clusters))
}

async fn get_cluster(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ClusterListEntry>> {
    cluster_list::get_cluster(&state.db, &id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("cluster {id} not found")))
}
