//! Terminal provisioning and the exec WebSocket route

use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::MaybeUser;
use crate::error::Error;
use crate::terminal::{generate_session_id, generate_token, handle_terminal_socket, TerminalResult};
use crate::Result;

use super::AppState;

/// Query parameters of the provisioning request
#[derive(Debug, Deserialize)]
pub struct TerminalQuery {
    /// Target container, required
    #[serde(default)]
    pub container: String,
    /// Shell the client wants to run, optional
    #[serde(default)]
    pub cmd: String,
}

/// `POST /kubernetes/apps/{appid}/pods/{pod}/terminal/namespaces/{namespace}/clusters/{cluster}`
///
/// Mints a session id and token and, when the caller is authenticated,
/// remembers the session-to-user binding until the WebSocket bind arrives.
pub async fn provision(
    State(state): State<AppState>,
    Path((_appid, pod, namespace, cluster)): Path<(String, String, String, String)>,
    Query(query): Query<TerminalQuery>,
    MaybeUser(user): MaybeUser,
) -> Result<Json<Value>> {
    if pod.is_empty() || query.container.is_empty() {
        return Err(Error::validation("pod and container are required"));
    }

    let session_id = generate_session_id();
    let token = generate_token(
        &namespace,
        &pod,
        &state.config.app_key,
        chrono::Utc::now().timestamp(),
    );

    if let Some(user) = user {
        info!(
            session = %session_id,
            user = %user.name,
            admin = user.admin,
            "terminal session provisioned"
        );
        state.sessions.insert(&session_id, user);
    } else {
        info!(session = %session_id, "terminal session provisioned without user");
    }

    let result = TerminalResult {
        session_id,
        token,
        cluster,
        namespace,
        pod,
        container: query.container,
        cmd: query.cmd,
    };
    Ok(Json(json!({"data": result})))
}

/// `GET /ws/pods/exec` - upgrade to the terminal WebSocket
pub async fn exec_socket(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_terminal_socket(socket, state))
}
