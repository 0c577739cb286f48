//! Error types for Gantry

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Main error type for Gantry operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Cluster name is not present in the pool
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),

    /// Cluster is flagged maintaining in the registry
    #[error("cluster under maintenance: {0}")]
    ClusterMaintaining(String),

    /// Resource kind is not present in the cluster's resource map
    #[error("unsupported resource kind: {0}")]
    KindUnsupported(String),

    /// Namespaced kind requested without a namespace
    #[error("namespace cannot be empty for namespaced resource {0}")]
    NamespaceRequired(String),

    /// Object not found in cache or upstream
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication failure; the message never reveals which check failed
    #[error("unauthorized")]
    Unauthorized,

    /// Malformed request input
    #[error("validation error: {0}")]
    Validation(String),

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubeconfig parsing or client construction error
    #[error("kubeconfig error: {0}")]
    Kubeconfig(String),

    /// Registry backend error
    #[error("registry error: {0}")]
    Registry(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a registry error with the given message
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::ClusterNotFound(_) | Error::NotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            Error::KindUnsupported(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Error::ClusterMaintaining(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "cluster under maintenance".to_string())
            }
            Error::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            Error::Validation(_) | Error::NamespaceRequired(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            Error::Kube(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unauthorized responses never say whether the token was malformed,
    /// expired, or simply wrong.
    #[test]
    fn unauthorized_does_not_leak_cause() {
        let err = Error::Unauthorized;
        assert_eq!(err.to_string(), "unauthorized");
    }

    #[test]
    fn maintenance_maps_to_service_unavailable() {
        let resp = Error::ClusterMaintaining("prod-eu".into()).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn missing_cluster_maps_to_not_found() {
        let resp = Error::ClusterNotFound("gone".into()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_error_body_is_generic() {
        let err = Error::internal("db password leaked here");
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
