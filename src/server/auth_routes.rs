//! Login and identity handlers

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::auth::{self, AuthUser};
use crate::error::Error;
use crate::Result;

use super::AppState;

/// Credential payload for password logins
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login name
    pub username: String,
    /// Plaintext password, verified against the configured backend
    pub password: String,
}

/// `POST /login/{name}` - authenticate and mint a login token
///
/// The path segment names the backend; only the built-in `db` backend is
/// in-process, OAuth2 and LDAP terminate elsewhere.
pub async fn login(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>> {
    if name != "db" {
        return Err(Error::validation(format!("unknown authenticator: {name}")));
    }

    let user = state
        .authenticator
        .authenticate(&request.username, &request.password)
        .await?;
    let token = auth::mint_token(&state.config, &user)?;

    info!(user = %user.name, admin = user.admin, "login succeeded");
    Ok(Json(json!({"data": {"token": token}})))
}

/// `GET /currentuser` - the identity behind the presented token
pub async fn current_user(AuthUser(user): AuthUser) -> Json<Value> {
    Json(json!({"data": user}))
}
