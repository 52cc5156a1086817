use crate::store::StoreError;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All errors possible to occur during schema generation and reconciliation
#[derive(Error, Debug)]
pub enum Error {
    /// Any error originating from the `kube-rs` crate
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    /// Error from the finalizer helper wrapping a reconciliation error
    #[error("Finalizer Error: {0}")]
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    /// Failure while querying server groups, resources or OpenAPI documents
    #[error("Discovery Error: {0}")]
    DiscoveryError(#[source] kube::Error),

    /// Schema store failure; `StoreError::NotExist` is usually handled by
    /// callers before this propagates
    #[error("Store Error: {0}")]
    StoreError(#[from] StoreError),

    /// An enricher aborted the schema pipeline
    #[error("Enricher {name} Error: {source}")]
    EnricherError {
        name: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// JSON serialization error
    #[error("Serialization Error: {0}")]
    SerializationError(#[source] serde_json::Error),

    /// Virtual workspace configuration could not be parsed
    #[error("YAML Error: {0}")]
    YamlError(#[source] serde_yaml::Error),

    /// Configuration file could not be read
    #[error("IO Error: {0}")]
    IoError(#[source] std::io::Error),

    /// A serialized schema document was not a JSON object
    #[error("Invalid Schema Document: expected a JSON object")]
    InvalidSchemaDocument,

    /// Kubeconfig bytes could not be parsed or converted to a rest config
    #[error("Kubeconfig Error: {0}")]
    KubeconfigError(#[source] kube::config::KubeconfigError),

    /// URL rewriting produced an invalid URI
    #[error("Invalid URI: {0}")]
    InvalidUri(#[source] http::Error),

    /// Virtual workspace URL could not be parsed
    #[error("Invalid Virtual Workspace URL: {0}")]
    InvalidVirtualWorkspaceUrl(String),

    /// Error in user input or resource definition, typically missing fields
    #[error("Invalid Input: {0}")]
    UserInputError(String),

    /// Missing or unreadable secret data referenced by a `ClusterAccess`
    #[error("Invalid Cluster Auth: {0}")]
    InvalidClusterAuth(String),

    /// The logical cluster carries no `kcp.io/path` annotation
    #[error("Missing Path Annotation")]
    MissingPathAnnotation,

    /// The logical cluster has a deletion timestamp; the carried path lets
    /// callers clean up the schema written for it
    #[error("Cluster {path} is deleted")]
    ClusterDeleted { path: String },

    /// The anchor predicate failed to compile at controller setup
    #[error("Predicate Compile Error: {0}")]
    PredicateCompileError(String),

    /// File watcher could not register the configuration directory
    #[error("Watch Error: {0}")]
    WatchError(#[source] notify_debouncer_mini::notify::Error),

    /// Trace id was invalid, probably due to telemetry not being initialized
    #[error("Invalid Trace ID")]
    InvalidTraceId,
}

impl Error {
    pub fn metric_label(&self) -> String {
        format!("{self:?}")
            .split([' ', '(', '{'])
            .next()
            // safe unwrap: split always yields at least one element
            .unwrap()
            .to_lowercase()
    }
}
