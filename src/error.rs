//! DbError: unified error type for the layout database and deep store
//!
//! Errors of this type signal programming errors or invariant violations
//! (e.g. using a deep layer whose store is gone). Degenerate inputs such as
//! empty hierarchies or empty regions are not errors; they produce empty
//! results.

use thiserror::Error;

/// Unified error type for database, store and checker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DbError {
    /// The deep shape store owning a layer has been dropped.
    #[error("The deep shape store no longer exists")]
    Detached,
    /// An operation needing exactly one working layout found several.
    #[error("Operation requires a singular deep shape store, but it holds {0} working layouts")]
    NotSingular(usize),
    /// A self-intersecting polygon was found while odd polygons are rejected.
    #[error("Odd polygon (self-intersecting or non-orientable) found: {0}")]
    OddPolygon(String),
    #[error("Invalid working layout index {0}")]
    InvalidLayout(usize),
    #[error("Invalid cell index {0}")]
    InvalidCell(usize),
    #[error("Invalid layer index {0}")]
    InvalidLayer(usize),
    /// `single` was used with a check that needs different polygons or layers.
    #[error("A check requiring different polygons or layers cannot run on a single polygon")]
    SingleCheckNotAllowed,
    /// Mapping back to an original layout that is not the working layout's source.
    #[error("The target layout is not the source layout of this working layout")]
    NotOriginalLayout,
    #[error("pop_state called without a matching push_state")]
    EmptyStateStack,
    #[error("Cannot create the worker pool: {0}")]
    WorkerPool(String),
}

/// Result alias for database operations
pub type DbResult<T> = Result<T, DbError>;
