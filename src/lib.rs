//! Gantry - multi-cluster Kubernetes control plane
//!
//! Gantry fronts many Kubernetes API servers behind a single HTTP/WebSocket
//! service. It keeps a live pool of authenticated, cache-backed clients that
//! is continuously reconciled against a cluster registry, exposes a uniform
//! CRUD surface over every core and custom resource type, and multiplexes an
//! interactive exec terminal into pods with a per-user command policy.
//!
//! # Architecture
//!
//! - A background reconciler diffs the registry against the in-process pool
//!   of cluster managers, building and tearing down clients as cluster
//!   records appear, change, or are deleted
//! - Each manager runs reflector-backed caches for a fixed set of hot kinds;
//!   the resource facade reads through those caches and writes through the
//!   API server
//! - Terminal sessions bridge a WebSocket to the pod exec subresource; a
//!   virtual-terminal state machine reconstructs each committed command line
//!   so the policy gate sees what the shell will actually execute
//!
//! # Modules
//!
//! - [`registry`] - cluster records and command rules, behind async traits
//! - [`cluster`] - cluster manager pool, reconciler, informer lifecycle
//! - [`resource`] - uniform CRUD facade, resource map, paging
//! - [`terminal`] - exec sessions, VT emulation, command policy
//! - [`auth`] - JWT issuance and validation, login authenticators
//! - [`server`] - axum router and request handlers
//! - [`config`] - process-wide configuration
//! - [`error`] - error types

#![deny(missing_docs)]

pub mod auth;
pub mod cluster;
pub mod config;
pub mod error;
pub mod registry;
pub mod resource;
pub mod server;
pub mod terminal;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// These constants define the defaults used throughout Gantry. Centralizing
// them here keeps server configs and test fixtures consistent.

/// Default interval between reconciler passes
pub const DEFAULT_RECONCILE_PERIOD_SECS: u64 = 5;

/// Client-side request rate carried on every cluster client configuration
///
/// kube clients do not throttle client-side; the value documents the rate
/// the upstream API servers are provisioned for.
pub const CLIENT_QPS: u32 = 50;

/// Client-side burst allowance, see [`CLIENT_QPS`]
pub const CLIENT_BURST: u32 = 100;

/// Terminal session token lifetime in seconds
pub const TERMINAL_TOKEN_TTL_SECS: i64 = 600;

/// Issuer claim stamped into login JWTs
pub const JWT_ISSUER: &str = "gwayne";
