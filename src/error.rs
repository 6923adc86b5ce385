//! Error taxonomy for the reference store
//!
//! One enum covers the whole crate so callers can match on a single type.
//! Probe and lock failures are fatal to the operation that raised them;
//! per-record corruption during load is isolated at the persistence layer
//! (skip + `tracing::warn!`) and never surfaces as an error here.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the reference store and its components
#[derive(Error, Debug)]
pub enum StoreError {
    /// The OS/runtime probe for the current environment failed.
    ///
    /// Fatal to store construction: without a resolved environment there
    /// is nothing to key reference records by.
    #[error("environment probe failed: {0}")]
    IdentityProbe(String),

    /// A distribution fit failed on the given samples.
    ///
    /// Degenerate input (e.g. all-identical samples) or an unsupported
    /// family. The store's persisted state is left unchanged.
    #[error("failed to fit '{family}' model: {reason}")]
    Fitting { family: String, reason: String },

    /// An unfit model was evaluated, serialized, or compared.
    ///
    /// Indicates a logic error upstream, typically a corrupted document
    /// that produced a record with no parameters.
    #[error("invalid model state: {0}")]
    InvalidState(String),

    /// The write-side advisory lock was not acquired within the bounded wait.
    #[error("could not acquire store lock {path:?} within {waited:?}")]
    LockTimeout { path: PathBuf, waited: Duration },

    /// More than one reference record matched an exact key.
    ///
    /// Fatal: either the store was edited by hand or the insert logic is
    /// broken.
    #[error("found {count} reference records for key {key} (expected at most 1)")]
    Consistency { key: String, count: usize },

    /// A whole on-disk document failed to parse as a JSON list.
    #[error("malformed {what} document {path:?}: {reason}")]
    Corrupt {
        what: &'static str,
        path: PathBuf,
        reason: String,
    },

    /// Invalid store configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
