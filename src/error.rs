use thiserror::Error;

use crate::set::Category;

/// Top-level error type for the model layer.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Tag(#[from] TagError),

    #[error(transparent)]
    Set(#[from] SetError),

    #[error(transparent)]
    Db(#[from] DbError),
}

/// Errors related to entity-ID assignment.
#[derive(Debug, Error)]
pub enum IdError {
    #[error("{category} ID {id} is already in use")]
    Duplicate { category: Category, id: i64 },

    #[error("entity IDs must be positive, got {id}")]
    NonPositive { id: i64 },
}

/// Errors related to category and dimension tags on entity sets.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("set is tagged {found}, not {want}")]
    CategoryMismatch { want: Category, found: Category },

    #[error("set has geometric dimension {found}, expected {want} for {category}")]
    DimensionMismatch {
        category: Category,
        want: i64,
        found: i64,
    },

    #[error("set carries neither a category nor a geometric-dimension tag")]
    MissingTags,

    #[error("set has no {tag} tag")]
    MissingTag { tag: &'static str },

    #[error("{tag} tag holds a value of the wrong kind")]
    Malformed { tag: &'static str },

    #[error("unknown category tag value {0:?}")]
    UnknownCategory(String),
}

/// Errors related to entity-set wrappers.
#[derive(Debug, Error)]
pub enum SetError {
    #[error("entity set is no longer attached to a mesh database")]
    Stale,

    #[error("entity belongs to a different model")]
    ForeignModel,

    #[error("no {category} with ID {id} in this model")]
    NotFound { category: Category, id: i64 },

    #[error("no volume or surface with ID {id} in this model")]
    UnresolvedMember { id: i64 },
}

/// Errors surfaced by the mesh database itself.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("set handle is not present in the mesh database")]
    InvalidHandle,

    #[error("vertex or triangle handle is not present in the mesh database")]
    InvalidElement,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("failed to parse model file: {0}")]
    Parse(String),

    #[error("unknown model file format {0:?}")]
    UnknownFormat(String),

    #[error("model file version {file_version} is newer than supported version {supported_version}")]
    FutureVersion {
        file_version: u32,
        supported_version: u32,
    },
}

/// Convenience type alias for results using [`ModelError`].
pub type Result<T> = std::result::Result<T, ModelError>;
