//! Control-plane service deriving per-cluster OpenAPI schemas.
//!
//! Four trigger controllers (cluster-access CRs, an anchor namespace, an
//! anchor resource matched by a CEL predicate, and initializing kcp
//! workspaces) plus a hot-reloadable virtual-workspace config all converge
//! on one [`reconcile::SchemaReconciler`]: discover the cluster's API
//! surface, enrich it with scope, category and relationship metadata, stamp
//! connection metadata, and publish the document through a keyed store with
//! change notification.

pub mod anchor;
pub mod broadcast;
pub mod clusteraccess;
pub mod clusterpath;
pub mod controller;
pub mod crd;
pub mod discovery;
pub mod error;
pub mod metrics;
pub mod namespace;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod telemetry;
pub mod virtualworkspace;
pub mod watcher;
pub mod workspace;
