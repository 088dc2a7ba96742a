use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::root::SliceKey;

/// Setup-time mistakes in how slices were composed.
///
/// These are programmer errors and surface from `CompositionBuilder` and
/// `CoreReducer::validate`, never from a running reduction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error("slice key '{0}' is already registered")]
    DuplicateKey(Arc<str>),

    #[error("slice key '{0}' is reserved for a built-in slice")]
    ReservedKey(Arc<str>),

    #[error("slice '{0}' is missing from the root state")]
    MissingSlice(SliceKey),

    #[error("slice '{0}' holds a value of an unexpected type")]
    SliceTypeMismatch(SliceKey),

    #[error("root state carries unregistered slice '{0}'")]
    UnknownSlice(Arc<str>),
}

/// A malformed or type-mismatched action payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    #[error("dataset id must not be empty")]
    EmptyDatasetId,

    #[error("dataset '{data_id}' row {row} has {actual} values, expected {expected}")]
    RowWidthMismatch {
        data_id: String,
        row: usize,
        expected: usize,
        actual: usize,
    },

    #[error("dataset '{0}' declares field '{1}' more than once")]
    DuplicateField(String, String),

    #[error("dataset '{0}' is not loaded")]
    UnknownDataset(String),

    #[error("dataset '{0}' is already loaded")]
    DatasetExists(String),

    #[error("layer '{0}' does not exist")]
    UnknownLayer(String),

    #[error("layer '{0}' already exists")]
    LayerExists(String),

    #[error("filter '{0}' does not exist")]
    UnknownFilter(String),

    #[error("field '{field}' does not exist in dataset '{data_id}'")]
    UnknownField { data_id: String, field: String },

    #[error("layer '{layer_id}' is missing required column '{column}'")]
    MissingColumn { layer_id: String, column: String },

    #[error("layer type '{layer_type}' cannot be built from layer '{layer_id}' columns")]
    IncompatibleLayerType { layer_id: String, layer_type: String },

    #[error("value does not fit filter '{0}'")]
    InvalidFilterValue(String),

    #[error("map style '{0}' is not in the style catalog")]
    UnknownMapStyle(String),

    #[error("map control '{0}' does not exist")]
    UnknownMapControl(String),

    #[error("split map index {0} is out of range")]
    SplitMapIndex(usize),

    #[error("layer order must list every layer exactly once")]
    InvalidLayerOrder,

    #[error("map size {0} must be finite and positive")]
    InvalidMapSize(String),
}

/// A step of a combined updater failed; the root was rolled back.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("combined step '{step}' on {slice} failed: {source}")]
pub struct CombinedUpdaterError {
    pub step: &'static str,
    pub slice: SliceKey,
    #[source]
    pub source: StepError,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error(transparent)]
    Payload(#[from] PayloadError),

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error("{0}")]
    Rejected(Arc<str>),
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Error)]
pub enum SavedConfigError {
    #[error("invalid saved config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid saved config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum SessionLogError {
    #[error("session log I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("session log record {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("session log encode: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstanceError {
    #[error("instance '{0}' is not registered")]
    UnknownInstance(String),

    #[error("instance '{0}' is already registered")]
    DuplicateInstance(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store was dropped; the action was not queued")]
    Closed,

    #[error(transparent)]
    SessionLog(#[from] SessionLogError),
}
