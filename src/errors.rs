use thiserror::Error;

/// Registry missing, malformed, or its enabled set is empty. Fatal for the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("property registry not found at {0}")]
    RegistryMissing(String),
    #[error("property registry at {path} is malformed: {source}")]
    RegistryMalformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("property registry has no enabled properties")]
    EmptyEnabledSet,
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Scoped to one property: dataset absent, malformed, or missing the history
/// a requested detector window needs. Logged and skipped, never fatal.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("clean dataset not found for property {property_id} at {key}")]
    NotFound { property_id: String, key: String },
    #[error("clean dataset for property {property_id} is malformed: {source}")]
    Malformed {
        property_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("clean dataset for property {property_id} has insufficient history: needed {needed} days, found {found}")]
    InsufficientHistory {
        property_id: String,
        needed: i64,
        found: i64,
    },
    #[error("clean dataset for property {property_id} has an invalid metric value: {detail}")]
    InvalidValue { property_id: String, detail: String },
    #[error("blob store error reading {property_id}: {source}")]
    Blob {
        property_id: String,
        #[source]
        source: BlobError,
    },
}

/// Unexpected failure inside a detector. Scoped to (property, detector); the
/// other three detectors for that property still run.
#[derive(Debug, Error)]
#[error("detector {detector} failed for property {property_id}: {message}")]
pub struct DetectorError {
    pub detector: &'static str,
    pub property_id: String,
    pub message: String,
}

/// Artifact write failed after retries.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to persist {key} after {attempts} attempt(s): {source}")]
    WriteFailed {
        key: String,
        attempts: u32,
        #[source]
        source: BlobError,
    },
}

/// Digest was produced and persisted, but handoff to the delivery adapter failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("no delivery adapter configured")]
    NotConfigured,
    #[error("delivery to {recipients:?} failed: {message}")]
    TransportFailed {
        recipients: Vec<String>,
        message: String,
    },
}

/// The blob store out-of-scope collaborator's error surface.
#[derive(Debug, Error, Clone)]
pub enum BlobError {
    #[error("blob {0} not found")]
    NotFound(String),
    #[error("io error on blob {key}: {message}")]
    Io { key: String, message: String },
}

/// The run was cancelled or a per-property/per-run budget elapsed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run cancelled")]
    Cancelled,
    #[error("run timed out after {0:?}")]
    TimedOut(std::time::Duration),
}
