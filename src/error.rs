//! Error types for quake-forge
//!
//! ## Table of Contents
//! - **CompositeError**: Main error enum covering all failure modes
//! - **Result**: Type alias for `Result<T, CompositeError>`

use thiserror::Error;

use crate::types::{CollectionId, GroupId};

/// Result type alias for quake-forge operations
pub type Result<T> = std::result::Result<T, CompositeError>;

/// Main error type for composite model operations
#[derive(Error, Debug)]
pub enum CompositeError {
    /// Two sources with the same ID inside one source model or group
    #[error("the source ID {source_id} is duplicated in {scope}")]
    DuplicatedId {
        /// The offending source ID
        source_id: String,
        /// Source model or group holding the duplicate
        scope: String,
    },

    /// A source was added to a group of a different tectonic region type
    #[error("tectonic region type mismatch: group is {expected}, source {source_id} is {found}")]
    TrtMismatch {
        /// TRT of the receiving group
        expected: String,
        /// TRT of the source
        found: String,
        /// ID of the rejected source
        source_id: String,
    },

    /// Full enumeration produced a zero total weight
    #[error("all realizations have zero weight")]
    NoViableRealizations,

    /// Sampling produced a number of realizations different from the configured one
    #[error("expected {expected} sampled realizations, got {actual}")]
    SampleCountMismatch {
        /// Configured number of logic tree samples
        expected: usize,
        /// Realizations actually produced
        actual: usize,
    },

    /// No collection was allocated for an oversampled group
    #[error("no collection for group {group_id}, sample {sample}")]
    MissingCollection {
        /// Group ID
        group_id: GroupId,
        /// Sample index
        sample: usize,
    },

    /// A collection ID does not belong to any group
    #[error("there is no group associated to the collection {0}")]
    UnknownCollection(CollectionId),

    /// A stochastic tag does not carry a collection marker
    #[error("malformed collection tag: {0:?}")]
    MalformedTag(String),

    /// Invalid logic tree definition
    #[error("invalid logic tree: {0}")]
    InvalidLogicTree(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Site filtering failed for a source
    #[error("filtering of source {source_id} failed: {reason}")]
    Filter {
        /// Source being filtered
        source_id: String,
        /// Underlying reason
        reason: String,
    },

    /// Splitting failed for a source
    #[error("splitting of source {source_id} failed: {reason}")]
    Split {
        /// Source being split
        source_id: String,
        /// Underlying reason
        reason: String,
    },

    /// Worker pool could not be created
    #[error("worker pool error: {0}")]
    WorkerPool(String),

    /// Metrics collection or export failure
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CompositeError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a logic tree error
    pub fn logic_tree(msg: impl Into<String>) -> Self {
        Self::InvalidLogicTree(msg.into())
    }

    /// Create a filter error for the given source
    pub fn filter(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Filter {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a split error for the given source
    pub fn split(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Split {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a metrics error
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// True for errors raised by a source collaborator during processing
    pub fn is_task_failure(&self) -> bool {
        matches!(self, Self::Filter { .. } | Self::Split { .. })
    }
}

impl From<prometheus::Error> for CompositeError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for CompositeError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        Self::WorkerPool(err.to_string())
    }
}
