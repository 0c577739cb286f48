//! Read-only cluster listing over the registry

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

use crate::error::Error;
use crate::registry::ClusterRecord;
use crate::Result;

use super::AppState;

fn cluster_view(state: &AppState, record: &ClusterRecord) -> Value {
    json!({
        "name": record.name,
        "master": record.master,
        "status": record.status,
        "connected": state.pool.contains(&record.name),
    })
}

/// `GET /clusters` - every registered cluster with its pool connectivity
pub async fn list(State(state): State<AppState>) -> Result<Json<Value>> {
    let records = state.registry.list_clusters().await?;
    let views: Vec<Value> = records.iter().map(|r| cluster_view(&state, r)).collect();
    Ok(Json(json!({"data": views})))
}

/// `GET /clusters/{name}` - one registered cluster
pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>> {
    let records = state.registry.list_clusters().await?;
    let record = records
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| Error::ClusterNotFound(name))?;
    Ok(Json(json!({"data": cluster_view(&state, record)})))
}
