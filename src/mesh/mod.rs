pub mod file;
pub mod measure;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, SparseSecondaryMap};

use crate::error::DbError;

pub use file::FORMAT_VERSION;

slotmap::new_key_type! {
    /// Opaque handle to an entity set in the mesh database.
    pub struct SetHandle;

    /// Opaque handle to a mesh vertex.
    pub struct VertexHandle;

    /// Opaque handle to a mesh triangle.
    pub struct TriHandle;
}

/// 3D point type.
pub type Point3 = nalgebra::Point3<f64>;

/// 3D vector type.
pub type Vector3 = nalgebra::Vector3<f64>;

/// Tag naming an entity set's role ("Volume", "Surface", "Group").
pub const CATEGORY_TAG: &str = "CATEGORY";

/// Tag holding an entity set's topological dimension.
pub const GEOM_DIMENSION_TAG: &str = "GEOM_DIMENSION";

/// Tag holding an entity set's numeric ID.
pub const GLOBAL_ID_TAG: &str = "GLOBAL_ID";

/// Tag holding a set's human-readable name.
pub const NAME_TAG: &str = "NAME";

/// A value stored under a named tag on an entity set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TagValue {
    Int(i64),
    Str(String),
}

impl TagValue {
    /// Returns the integer payload, if this is an integer tag.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            TagValue::Int(value) => Some(*value),
            TagValue::Str(_) => None,
        }
    }

    /// Returns the string payload, if this is a string tag.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Int(_) => None,
            TagValue::Str(value) => Some(value),
        }
    }
}

/// Contents of a single entity set: child sets and triangles, both ordered
/// and duplicate-free.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct SetRecord {
    pub(crate) children: Vec<SetHandle>,
    pub(crate) triangles: Vec<TriHandle>,
}

/// In-process mesh database: arenas of entity sets, vertices, and triangles,
/// with sparse named tags and surface sense records.
///
/// Entities reference each other via generational handles, so a handle held
/// across a deletion simply stops resolving rather than dangling.
#[derive(Debug, Default, Clone)]
pub struct MeshDb {
    pub(crate) sets: SlotMap<SetHandle, SetRecord>,
    pub(crate) vertices: SlotMap<VertexHandle, [f64; 3]>,
    pub(crate) triangles: SlotMap<TriHandle, [VertexHandle; 3]>,
    pub(crate) tags: BTreeMap<String, SparseSecondaryMap<SetHandle, TagValue>>,
    pub(crate) senses: SparseSecondaryMap<SetHandle, [Option<SetHandle>; 2]>,
}

impl MeshDb {
    /// Creates a new, empty mesh database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // --- Set operations ---

    /// Creates an empty entity set and returns its handle.
    pub fn create_meshset(&mut self) -> SetHandle {
        self.sets.insert(SetRecord::default())
    }

    /// Returns `true` if the handle resolves to a live set.
    #[must_use]
    pub fn contains_set(&self, handle: SetHandle) -> bool {
        self.sets.contains_key(handle)
    }

    /// Deletes a set together with its tags, sense record, triangles, and
    /// membership in other sets. Child sets themselves are left alive.
    pub fn delete_set(&mut self, handle: SetHandle) {
        let Some(record) = self.sets.remove(handle) else {
            return;
        };
        for tri in record.triangles {
            self.triangles.remove(tri);
        }
        for map in self.tags.values_mut() {
            map.remove(handle);
        }
        self.senses.remove(handle);
        for record in self.sets.values_mut() {
            record.children.retain(|child| *child != handle);
        }
    }

    /// Number of live sets.
    #[must_use]
    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    // --- Containment ---

    /// Adds `child` to `parent`'s contents. Adding a member twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if either set does not exist.
    pub fn add_child(&mut self, parent: SetHandle, child: SetHandle) -> Result<(), DbError> {
        if !self.sets.contains_key(child) {
            return Err(DbError::InvalidHandle);
        }
        let record = self.sets.get_mut(parent).ok_or(DbError::InvalidHandle)?;
        if !record.children.contains(&child) {
            record.children.push(child);
        }
        Ok(())
    }

    /// Removes `child` from `parent`'s contents. Removing an absent member
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if `parent` does not exist.
    pub fn remove_child(&mut self, parent: SetHandle, child: SetHandle) -> Result<(), DbError> {
        let record = self.sets.get_mut(parent).ok_or(DbError::InvalidHandle)?;
        record.children.retain(|c| *c != child);
        Ok(())
    }

    /// Returns the child sets of `parent` in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if `parent` does not exist.
    pub fn children(&self, parent: SetHandle) -> Result<&[SetHandle], DbError> {
        self.sets
            .get(parent)
            .map(|record| record.children.as_slice())
            .ok_or(DbError::InvalidHandle)
    }

    /// Returns every set that lists `child` among its contents.
    #[must_use]
    pub fn sets_containing(&self, child: SetHandle) -> Vec<SetHandle> {
        self.sets
            .iter()
            .filter(|(_, record)| record.children.contains(&child))
            .map(|(handle, _)| handle)
            .collect()
    }

    // --- Tags ---

    /// Writes `value` under the named tag on `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if the set does not exist.
    pub fn tag_set(&mut self, name: &str, handle: SetHandle, value: TagValue) -> Result<(), DbError> {
        if !self.sets.contains_key(handle) {
            return Err(DbError::InvalidHandle);
        }
        self.tags
            .entry(name.to_owned())
            .or_default()
            .insert(handle, value);
        Ok(())
    }

    /// Reads the named tag on `handle`, if present.
    #[must_use]
    pub fn tag_get(&self, name: &str, handle: SetHandle) -> Option<&TagValue> {
        self.tags.get(name).and_then(|map| map.get(handle))
    }

    /// Removes the named tag from `handle`, if present.
    pub fn tag_remove(&mut self, name: &str, handle: SetHandle) {
        if let Some(map) = self.tags.get_mut(name) {
            map.remove(handle);
        }
    }

    /// Iterates over every set carrying the named tag, in no particular
    /// order.
    pub fn tagged_sets<'a>(
        &'a self,
        name: &str,
    ) -> impl Iterator<Item = (SetHandle, &'a TagValue)> + 'a {
        self.tags
            .get(name)
            .into_iter()
            .flat_map(|map| map.iter().map(|(handle, value)| (handle, value)))
    }

    // --- Surface senses ---

    /// Returns the (forward, reverse) sense pair recorded on a surface set.
    /// Sides referencing deleted sets read as absent.
    #[must_use]
    pub fn sense(&self, surface: SetHandle) -> [Option<SetHandle>; 2] {
        let pair = self.senses.get(surface).copied().unwrap_or([None, None]);
        pair.map(|side| side.filter(|volume| self.sets.contains_key(*volume)))
    }

    /// Records the (forward, reverse) sense pair on a surface set.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if the surface set does not exist.
    pub fn set_sense(
        &mut self,
        surface: SetHandle,
        pair: [Option<SetHandle>; 2],
    ) -> Result<(), DbError> {
        if !self.sets.contains_key(surface) {
            return Err(DbError::InvalidHandle);
        }
        self.senses.insert(surface, pair);
        Ok(())
    }

    // --- Mesh elements ---

    /// Inserts a vertex and returns its handle.
    pub fn add_vertex(&mut self, point: Point3) -> VertexHandle {
        self.vertices.insert([point.x, point.y, point.z])
    }

    /// Returns the coordinates of a vertex.
    #[must_use]
    pub fn vertex(&self, handle: VertexHandle) -> Option<Point3> {
        self.vertices.get(handle).map(|c| Point3::new(c[0], c[1], c[2]))
    }

    /// Inserts a triangle over three existing vertices and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidElement`] if any corner vertex does not exist.
    pub fn add_triangle(&mut self, corners: [VertexHandle; 3]) -> Result<TriHandle, DbError> {
        if corners.iter().any(|v| !self.vertices.contains_key(*v)) {
            return Err(DbError::InvalidElement);
        }
        Ok(self.triangles.insert(corners))
    }

    /// Returns the corner vertices of a triangle.
    #[must_use]
    pub fn triangle(&self, handle: TriHandle) -> Option<[VertexHandle; 3]> {
        self.triangles.get(handle).copied()
    }

    /// Adds triangles to a set's contents. Duplicates are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if the set does not exist, or
    /// [`DbError::InvalidElement`] if any triangle does not exist.
    pub fn add_triangles(&mut self, set: SetHandle, tris: &[TriHandle]) -> Result<(), DbError> {
        if tris.iter().any(|t| !self.triangles.contains_key(*t)) {
            return Err(DbError::InvalidElement);
        }
        let record = self.sets.get_mut(set).ok_or(DbError::InvalidHandle)?;
        for tri in tris {
            if !record.triangles.contains(tri) {
                record.triangles.push(*tri);
            }
        }
        Ok(())
    }

    /// Gathers the triangles of a set and, recursively, of its child sets.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if the root set does not exist.
    pub fn triangles_of(&self, set: SetHandle) -> Result<Vec<TriHandle>, DbError> {
        if !self.sets.contains_key(set) {
            return Err(DbError::InvalidHandle);
        }
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![set];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(record) = self.sets.get(current) {
                out.extend_from_slice(&record.triangles);
                stack.extend_from_slice(&record.children);
            }
        }
        Ok(out)
    }

    /// Returns triangle connectivity as index triples into a coordinate
    /// array.
    ///
    /// Uncompressed, each triangle gets three private coordinate rows.
    /// Compressed, rows are deduplicated per vertex handle and connectivity
    /// indexes into the unique rows.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if the set does not exist, or
    /// [`DbError::InvalidElement`] if the mesh references a missing vertex.
    pub fn conn_and_coords(
        &self,
        set: SetHandle,
        compress: bool,
    ) -> Result<(Vec<[usize; 3]>, Vec<Point3>), DbError> {
        let tris = self.triangles_of(set)?;
        let mut conn = Vec::with_capacity(tris.len());
        let mut coords = Vec::new();
        let mut index_of: HashMap<VertexHandle, usize> = HashMap::new();

        for tri in tris {
            let corners = self.triangle(tri).ok_or(DbError::InvalidElement)?;
            let mut row = [0_usize; 3];
            for (slot, corner) in row.iter_mut().zip(corners) {
                let point = self.vertex(corner).ok_or(DbError::InvalidElement)?;
                if compress {
                    if let Some(&index) = index_of.get(&corner) {
                        *slot = index;
                    } else {
                        index_of.insert(corner, coords.len());
                        *slot = coords.len();
                        coords.push(point);
                    }
                } else {
                    *slot = coords.len();
                    coords.push(point);
                }
            }
            conn.push(row);
        }
        Ok((conn, coords))
    }

    /// Returns a per-triangle mapping into a deduplicated coordinate array.
    ///
    /// Each reachable triangle maps to the row indices of its three corners;
    /// triangles sharing a vertex share the row.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidHandle`] if the set does not exist, or
    /// [`DbError::InvalidElement`] if the mesh references a missing vertex.
    pub fn coordinate_mapping(
        &self,
        set: SetHandle,
    ) -> Result<(HashMap<TriHandle, [usize; 3]>, Vec<Point3>), DbError> {
        let tris = self.triangles_of(set)?;
        let mut mapping = HashMap::with_capacity(tris.len());
        let mut coords = Vec::new();
        let mut index_of: HashMap<VertexHandle, usize> = HashMap::new();

        for tri in tris {
            let corners = self.triangle(tri).ok_or(DbError::InvalidElement)?;
            let mut row = [0_usize; 3];
            for (slot, corner) in row.iter_mut().zip(corners) {
                *slot = if let Some(&index) = index_of.get(&corner) {
                    index
                } else {
                    let point = self.vertex(corner).ok_or(DbError::InvalidElement)?;
                    index_of.insert(corner, coords.len());
                    coords.push(point);
                    coords.len() - 1
                };
            }
            mapping.insert(tri, row);
        }
        Ok((mapping, coords))
    }
}
