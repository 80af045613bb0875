pub mod group;
pub mod surface;
pub mod volume;

pub use group::{Group, GroupMember, GroupSpec};
pub use surface::Surface;
pub use volume::Volume;

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, SetError, TagError};
use crate::mesh::{
    Point3, SetHandle, TagValue, TriHandle, CATEGORY_TAG, GEOM_DIMENSION_TAG, GLOBAL_ID_TAG,
};
use crate::model::Model;

/// The role of an entity set within a model.
///
/// Category and geometric dimension are mutually derivable; the pairing is
/// fixed by [`dimension`](Category::dimension) and
/// [`from_dimension`](Category::from_dimension).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Surface,
    Volume,
    Group,
}

impl Category {
    /// Every category, in dimension order.
    pub const ALL: [Category; 3] = [Category::Surface, Category::Volume, Category::Group];

    /// The topological dimension encoded by this category. Groups use the
    /// conventional grouping dimension 4.
    #[must_use]
    pub fn dimension(self) -> i64 {
        match self {
            Category::Surface => 2,
            Category::Volume => 3,
            Category::Group => 4,
        }
    }

    /// The category encoding a topological dimension, if any.
    #[must_use]
    pub fn from_dimension(dimension: i64) -> Option<Self> {
        match dimension {
            2 => Some(Category::Surface),
            3 => Some(Category::Volume),
            4 => Some(Category::Group),
            _ => None,
        }
    }

    /// The tag string naming this category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Surface => "Surface",
            Category::Volume => "Volume",
            Category::Group => "Group",
        }
    }

    pub(crate) fn parse(value: &str) -> Result<Self> {
        match value {
            "Surface" => Ok(Category::Surface),
            "Volume" => Ok(Category::Volume),
            "Group" => Ok(Category::Group),
            other => Err(TagError::UnknownCategory(other.to_owned()).into()),
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Category::Surface => 0,
            Category::Volume => 1,
            Category::Group => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Composite identity of an entity: the owning model instance plus the set
/// handle.
///
/// Two models opened on the same file hand out keys that never compare
/// equal, even when the raw handles coincide. Equality and hashing cover
/// both components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityKey {
    pub(crate) model: u64,
    pub(crate) handle: SetHandle,
}

/// Operations shared by every typed entity-set wrapper.
///
/// Wrappers are plain values; all state lives in the owning [`Model`], which
/// every accessor takes explicitly. Accessors fail with
/// [`SetError::Stale`](crate::error::SetError) once the underlying set is
/// deleted, and with
/// [`SetError::ForeignModel`](crate::error::SetError) when handed to a model
/// other than the one that produced the wrapper.
pub trait EntitySet: Copy {
    /// The category every value of this type belongs to.
    const CATEGORY: Category;

    /// The composite identity of this entity.
    fn key(&self) -> EntityKey;

    /// The raw database handle inside this wrapper.
    #[must_use]
    fn handle(&self) -> SetHandle {
        self.key().handle
    }

    /// Returns this entity's numeric ID.
    ///
    /// # Errors
    ///
    /// Fails if the entity is stale or foreign to `model`.
    fn id(&self, model: &Model) -> Result<i64> {
        let handle = attached(model, self.key())?;
        model
            .registry()
            .id_of(Self::CATEGORY, handle)
            .ok_or_else(|| SetError::Stale.into())
    }

    /// Re-keys this entity. `Some(id)` claims that exact ID; `None` assigns
    /// one past the largest ID currently in use for the category. The old ID
    /// is released for reuse.
    ///
    /// # Errors
    ///
    /// Fails if the ID is already held by a different live entity of the
    /// same category, or if the entity is stale or foreign to `model`.
    fn set_id(&self, model: &mut Model, id: Option<i64>) -> Result<i64> {
        let handle = attached(model, self.key())?;
        let assigned = model.registry_mut().assign(Self::CATEGORY, handle, id)?;
        model
            .db_mut()
            .tag_set(GLOBAL_ID_TAG, handle, TagValue::Int(assigned))?;
        Ok(assigned)
    }

    /// Deletes the underlying set, releasing its ID and removing it from
    /// every group. The wrapper (and any copy of it) turns stale.
    ///
    /// # Errors
    ///
    /// Fails if the entity is already stale or foreign to `model`.
    fn delete(self, model: &mut Model) -> Result<()> {
        let handle = attached(model, self.key())?;
        model.registry_mut().release(Self::CATEGORY, handle);
        model.db_mut().delete_set(handle);
        Ok(())
    }

    /// Number of triangles reachable from this entity.
    ///
    /// # Errors
    ///
    /// Fails if the entity is stale or foreign to `model`.
    fn num_triangles(&self, model: &Model) -> Result<usize> {
        Ok(self.triangle_handles(model)?.len())
    }

    /// The triangles of this set and, recursively, of its contained sets.
    ///
    /// # Errors
    ///
    /// Fails if the entity is stale or foreign to `model`.
    fn triangle_handles(&self, model: &Model) -> Result<Vec<TriHandle>> {
        let handle = attached(model, self.key())?;
        Ok(model.db().triangles_of(handle)?)
    }

    /// Triangle connectivity and coordinates, optionally deduplicated per
    /// vertex.
    ///
    /// # Errors
    ///
    /// Fails if the entity is stale or foreign to `model`.
    fn triangle_conn_and_coords(
        &self,
        model: &Model,
        compress: bool,
    ) -> Result<(Vec<[usize; 3]>, Vec<Point3>)> {
        let handle = attached(model, self.key())?;
        Ok(model.db().conn_and_coords(handle, compress)?)
    }

    /// Per-triangle row indices into a deduplicated coordinate array.
    ///
    /// # Errors
    ///
    /// Fails if the entity is stale or foreign to `model`.
    fn triangle_coordinate_mapping(
        &self,
        model: &Model,
    ) -> Result<(HashMap<TriHandle, [usize; 3]>, Vec<Point3>)> {
        let handle = attached(model, self.key())?;
        Ok(model.db().coordinate_mapping(handle)?)
    }
}

/// Checks ownership and liveness, resolving merge aliases along the way.
pub(crate) fn attached(model: &Model, key: EntityKey) -> Result<SetHandle> {
    if key.model != model.instance() {
        return Err(SetError::ForeignModel.into());
    }
    let handle = model.registry().canonical(key.handle);
    if model.db().contains_set(handle) {
        Ok(handle)
    } else {
        Err(SetError::Stale.into())
    }
}

/// Validates a raw set's category and dimension tags against `want`, filling
/// in whichever of the two is missing, and indexes the set in the registry
/// when it is not yet known there.
///
/// A set carrying neither tag cannot be claimed for any category and is
/// rejected outright.
pub(crate) fn bind(model: &mut Model, handle: SetHandle, want: Category) -> Result<()> {
    if !model.db().contains_set(handle) {
        return Err(SetError::Stale.into());
    }

    let category = match model.db().tag_get(CATEGORY_TAG, handle) {
        None => None,
        Some(TagValue::Str(value)) => Some(Category::parse(value)?),
        Some(TagValue::Int(_)) => return Err(TagError::Malformed { tag: CATEGORY_TAG }.into()),
    };
    let dimension = match model.db().tag_get(GEOM_DIMENSION_TAG, handle) {
        None => None,
        Some(TagValue::Int(value)) => Some(*value),
        Some(TagValue::Str(_)) => {
            return Err(TagError::Malformed {
                tag: GEOM_DIMENSION_TAG,
            }
            .into())
        }
    };

    match (category, dimension) {
        (Some(category), Some(dimension)) => {
            check_category(want, category)?;
            check_dimension(want, dimension)?;
        }
        (Some(category), None) => {
            check_category(want, category)?;
            tracing::warn!(
                category = %want,
                "set has no geometric-dimension tag; deriving it from the category"
            );
            model
                .db_mut()
                .tag_set(GEOM_DIMENSION_TAG, handle, TagValue::Int(want.dimension()))?;
        }
        (None, Some(dimension)) => {
            check_dimension(want, dimension)?;
            tracing::warn!(
                category = %want,
                "set has no category tag; deriving it from the geometric dimension"
            );
            model
                .db_mut()
                .tag_set(CATEGORY_TAG, handle, TagValue::Str(want.as_str().to_owned()))?;
        }
        (None, None) => return Err(TagError::MissingTags.into()),
    }

    if model.registry().id_of(want, handle).is_none() {
        let tagged = model
            .db()
            .tag_get(GLOBAL_ID_TAG, handle)
            .and_then(TagValue::as_int);
        let assigned = match tagged {
            Some(id) => model.registry_mut().assign(want, handle, Some(id))?,
            None => model.registry_mut().allocate(want, handle),
        };
        model
            .db_mut()
            .tag_set(GLOBAL_ID_TAG, handle, TagValue::Int(assigned))?;
    }
    Ok(())
}

fn check_category(want: Category, found: Category) -> Result<()> {
    if found == want {
        Ok(())
    } else {
        Err(TagError::CategoryMismatch { want, found }.into())
    }
}

fn check_dimension(want: Category, found: i64) -> Result<()> {
    if found == want.dimension() {
        Ok(())
    } else {
        Err(TagError::DimensionMismatch {
            category: want,
            want: want.dimension(),
            found,
        }
        .into())
    }
}

/// Creates a fresh set tagged for `category`, registered under `id` (or the
/// next ID past the category's max when `None`).
pub(crate) fn create_set(model: &mut Model, category: Category, id: Option<i64>) -> Result<SetHandle> {
    use crate::error::IdError;

    // Validate up front so a rejected ID leaves no half-created set behind.
    if let Some(id) = id {
        if id < 1 {
            return Err(IdError::NonPositive { id }.into());
        }
        if model.registry().lookup(category, id).is_some() {
            return Err(IdError::Duplicate { category, id }.into());
        }
    }
    let handle = model.db_mut().create_meshset();
    model
        .db_mut()
        .tag_set(CATEGORY_TAG, handle, TagValue::Str(category.as_str().to_owned()))?;
    model
        .db_mut()
        .tag_set(GEOM_DIMENSION_TAG, handle, TagValue::Int(category.dimension()))?;
    let assigned = model.registry_mut().assign(category, handle, id)?;
    model
        .db_mut()
        .tag_set(GLOBAL_ID_TAG, handle, TagValue::Int(assigned))?;
    Ok(handle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn category_and_dimension_are_mutually_derivable() {
        for category in Category::ALL {
            assert_eq!(Category::from_dimension(category.dimension()), Some(category));
        }
        assert_eq!(Category::from_dimension(1), None);
    }

    #[test]
    fn category_strings_round_trip() {
        for category in Category::ALL {
            assert_eq!(Category::parse(category.as_str()).unwrap(), category);
        }
        assert!(Category::parse("Curve").is_err());
    }
}
