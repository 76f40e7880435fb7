use sqlx::{QueryBuilder, SqlitePool};

pub mod agent_seen;
pub mod cluster_list;
pub mod events;
pub mod host_list;
pub mod migrations;

pub type Db = SqlitePool;

pub use cluster_list::{ClusterFilters, ClusterListRow};
pub use events::DiscoveryEvent;
pub use host_list::{HostFilters, HostUpdate};
pub use migrations::{MigrationLabel, MigrationRunOutcome, MigrationSnapshot};

/// Appends `AND column IN (...)`; an empty list adds no constraint.
fn push_in<'a>(qb: &mut QueryBuilder<'a, sqlx::Sqlite>, column: &str, values: &[&'a str]) {
    if values.is_empty() {
        return;
    }
    qb.push(format!(" AND {column} IN ("));
    let mut separated = qb.separated(", ");
    for value in values {
        separated.push_bind(*value);
    }
    separated.push_unseparated(")");
}

/// Round trip used by the health endpoint.
pub async fn ping(db: &Db) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(db)
        .await
        .is_ok()
}
