//! Resource facade HTTP surface
//!
//! Routes under `/apps/{appid}/_proxy/clusters/{cluster}` expose the
//! uniform CRUD surface. Native kinds resolve through the per-cluster
//! resource map; `apis/{group}/{version}` routes address CRD instances,
//! resolving their coordinates from the definition when the version is
//! absent or `undefined`.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::error::Error;
use crate::resource::{paginate, DeleteOptions, Facade, PageQuery, ResourceMapEntry};
use crate::Result;

use super::AppState;

/// The facade route table
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/apps/{appid}/_proxy/clusters/{cluster}/{kind}",
            get(list_all).post(create_all),
        )
        .route(
            "/apps/{appid}/_proxy/clusters/{cluster}/{kind}/{name}",
            get(get_all).put(update_all).delete(delete_all),
        )
        .route(
            "/apps/{appid}/_proxy/clusters/{cluster}/namespaces/{namespace}/{kind}",
            get(list_namespaced).post(create_namespaced),
        )
        .route(
            "/apps/{appid}/_proxy/clusters/{cluster}/namespaces/{namespace}/{kind}/{name}",
            get(get_namespaced)
                .put(update_namespaced)
                .delete(delete_namespaced),
        )
        .route(
            "/apps/{appid}/_proxy/clusters/{cluster}/apis/{group}/{version}/{kind}",
            get(list_crd).post(create_crd),
        )
        .route(
            "/apps/{appid}/_proxy/clusters/{cluster}/apis/{group}/{version}/{kind}/{name}",
            get(get_crd).put(update_crd).delete(delete_crd),
        )
        .route(
            "/apps/{appid}/_proxy/clusters/{cluster}/apis/{group}/{version}/namespaces/{namespace}/{kind}",
            get(list_crd_namespaced).post(create_crd_namespaced),
        )
        .route(
            "/apps/{appid}/_proxy/clusters/{cluster}/apis/{group}/{version}/namespaces/{namespace}/{kind}/{name}",
            get(get_crd_namespaced)
                .put(update_crd_namespaced)
                .delete(delete_crd_namespaced),
        )
}

async fn facade_for(state: &AppState, cluster: &str) -> Result<Facade> {
    Ok(Facade::new(state.pool.manager(cluster).await?))
}

async fn crd_entry_for(
    facade: &Facade,
    group: &str,
    version: &str,
    kind: &str,
) -> Result<ResourceMapEntry> {
    crate::resource::resolve_crd_entry(facade.client(), group, version, kind).await
}

fn to_values(objs: Vec<kube::api::DynamicObject>) -> Result<Vec<Value>> {
    objs.into_iter()
        .map(|o| serde_json::to_value(o).map_err(|e| Error::serialization(e.to_string())))
        .collect()
}

fn data(value: impl serde::Serialize) -> Result<Json<Value>> {
    Ok(Json(json!({
        "data": serde_json::to_value(value).map_err(|e| Error::serialization(e.to_string()))?
    })))
}

// =============================================================================
// Shared operation bodies
// =============================================================================

async fn do_list(
    state: AppState,
    cluster: String,
    namespace: String,
    kind: String,
    query: PageQuery,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let selector = query.label_selector.clone().unwrap_or_default();
    let objs = facade.list(&kind, &namespace, &selector).await?;
    data(paginate(to_values(objs)?, &query))
}

async fn do_get(
    state: AppState,
    cluster: String,
    namespace: String,
    kind: String,
    name: String,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    data(facade.get(&kind, &namespace, &name).await?)
}

async fn do_create(
    state: AppState,
    cluster: String,
    namespace: String,
    kind: String,
    body: Value,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    data(facade.create(&kind, &namespace, body).await?)
}

async fn do_update(
    state: AppState,
    cluster: String,
    namespace: String,
    kind: String,
    name: String,
    body: Value,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    data(facade.update(&kind, &namespace, &name, body).await?)
}

async fn do_delete(
    state: AppState,
    cluster: String,
    namespace: String,
    kind: String,
    name: String,
    options: DeleteOptions,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    facade.delete(&kind, &namespace, &name, options).await?;
    data("ok")
}

// =============================================================================
// Native kind handlers
// =============================================================================

async fn list_all(
    State(state): State<AppState>,
    Path((_appid, cluster, kind)): Path<(String, String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    do_list(state, cluster, String::new(), kind, query).await
}

async fn create_all(
    State(state): State<AppState>,
    Path((_appid, cluster, kind)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    do_create(state, cluster, String::new(), kind, body).await
}

async fn get_all(
    State(state): State<AppState>,
    Path((_appid, cluster, kind, name)): Path<(String, String, String, String)>,
) -> Result<Json<Value>> {
    do_get(state, cluster, String::new(), kind, name).await
}

async fn update_all(
    State(state): State<AppState>,
    Path((_appid, cluster, kind, name)): Path<(String, String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    do_update(state, cluster, String::new(), kind, name, body).await
}

async fn delete_all(
    State(state): State<AppState>,
    Path((_appid, cluster, kind, name)): Path<(String, String, String, String)>,
    Query(options): Query<DeleteOptions>,
) -> Result<Json<Value>> {
    do_delete(state, cluster, String::new(), kind, name, options).await
}

async fn list_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, namespace, kind)): Path<(String, String, String, String)>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    do_list(state, cluster, namespace, kind, query).await
}

async fn create_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, namespace, kind)): Path<(String, String, String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    do_create(state, cluster, namespace, kind, body).await
}

async fn get_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, namespace, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<Json<Value>> {
    do_get(state, cluster, namespace, kind, name).await
}

async fn update_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, namespace, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    do_update(state, cluster, namespace, kind, name, body).await
}

async fn delete_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, namespace, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
    Query(options): Query<DeleteOptions>,
) -> Result<Json<Value>> {
    do_delete(state, cluster, namespace, kind, name, options).await
}

// =============================================================================
// CRD instance handlers
// =============================================================================

async fn list_crd(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, kind)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    let selector = query.label_selector.clone().unwrap_or_default();
    let objs = facade.list_with(&entry, "", &selector).await?;
    data(paginate(to_values(objs)?, &query))
}

async fn create_crd(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, kind)): Path<(
        String,
        String,
        String,
        String,
        String,
    )>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    data(facade.create_with(&entry, "", body).await?)
}

async fn get_crd(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    data(facade.get_with(&entry, "", &name).await?)
}

async fn update_crd(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    data(facade.update_with(&entry, "", &name, body).await?)
}

async fn delete_crd(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
    Query(options): Query<DeleteOptions>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    facade.delete_with(&entry, "", &name, options).await?;
    data("ok")
}

async fn list_crd_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, namespace, kind)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    let selector = query.label_selector.clone().unwrap_or_default();
    let objs = facade.list_with(&entry, &namespace, &selector).await?;
    data(paginate(to_values(objs)?, &query))
}

async fn create_crd_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, namespace, kind)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    data(facade.create_with(&entry, &namespace, body).await?)
}

async fn get_crd_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, namespace, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    data(facade.get_with(&entry, &namespace, &name).await?)
}

async fn update_crd_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, namespace, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    data(facade.update_with(&entry, &namespace, &name, body).await?)
}

async fn delete_crd_namespaced(
    State(state): State<AppState>,
    Path((_appid, cluster, group, version, namespace, kind, name)): Path<(
        String,
        String,
        String,
        String,
        String,
        String,
        String,
    )>,
    Query(options): Query<DeleteOptions>,
) -> Result<Json<Value>> {
    let facade = facade_for(&state, &cluster).await?;
    let entry = crd_entry_for(&facade, &group, &version, &kind).await?;
    facade.delete_with(&entry, &namespace, &name, options).await?;
    data("ok")
}
