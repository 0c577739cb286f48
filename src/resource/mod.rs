//! Uniform resource access over every pooled cluster
//!
//! A per-cluster resource map resolves plural kind names to their
//! group/version/resource coordinates; the facade routes reads through the
//! informer caches where one exists and all writes through the API server.

mod crd;
mod facade;
mod map;
mod page;

pub use crd::{best_served_version, resolve_crd_entry, VERSION_UNDEFINED};
pub use facade::{DeleteOptions, Facade};
pub use map::{ResourceMap, ResourceMapEntry, CACHEABLE_KINDS, NATIVE_GROUPS};
pub use page::{paginate, Page, PageQuery};
