use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, SparseSecondaryMap};

use super::{MeshDb, SetHandle, SetRecord, TagValue, TriHandle, VertexHandle};
use crate::error::DbError;

/// Current snapshot format version.
pub const FORMAT_VERSION: u32 = 1;

/// Format identifier written into every snapshot.
const FORMAT_NAME: &str = "meshmodel";

/// The top-level file structure.
///
/// Arenas serialize slot-for-slot, so handles held before a write resolve to
/// the same entities after reopening. Sparse per-handle state (tags, senses)
/// is flattened to pair lists to stay representable in JSON.
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    format: String,
    version: u32,
    sets: SlotMap<SetHandle, SetRecord>,
    vertices: SlotMap<VertexHandle, [f64; 3]>,
    triangles: SlotMap<TriHandle, [VertexHandle; 3]>,
    tags: Vec<(String, Vec<(SetHandle, TagValue)>)>,
    senses: Vec<(SetHandle, [Option<SetHandle>; 2])>,
}

impl MeshDb {
    /// Serializes the whole database to a pretty-printed JSON snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the file cannot be written, or
    /// [`DbError::Parse`] if serialization itself fails.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<(), DbError> {
        let snapshot = Snapshot {
            format: FORMAT_NAME.to_owned(),
            version: FORMAT_VERSION,
            sets: self.sets.clone(),
            vertices: self.vertices.clone(),
            triangles: self.triangles.clone(),
            tags: self
                .tags
                .iter()
                .map(|(name, map)| {
                    let pairs = map
                        .iter()
                        .map(|(handle, value)| (handle, value.clone()))
                        .collect();
                    (name.clone(), pairs)
                })
                .collect(),
            senses: self.senses.iter().map(|(h, pair)| (h, *pair)).collect(),
        };
        let text = serde_json::to_string_pretty(&snapshot).map_err(|e| DbError::Parse(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Reads a database back from a JSON snapshot.
    ///
    /// Validates the format identifier and version before rebuilding the
    /// sparse state.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Io`] if the file cannot be read,
    /// [`DbError::Parse`] on malformed JSON, [`DbError::UnknownFormat`] for a
    /// foreign format identifier, and [`DbError::FutureVersion`] when the
    /// file was written by a newer library.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let text = fs::read_to_string(path)?;
        let snapshot: Snapshot =
            serde_json::from_str(&text).map_err(|e| DbError::Parse(e.to_string()))?;

        if snapshot.format != FORMAT_NAME {
            return Err(DbError::UnknownFormat(snapshot.format));
        }
        if snapshot.version > FORMAT_VERSION {
            return Err(DbError::FutureVersion {
                file_version: snapshot.version,
                supported_version: FORMAT_VERSION,
            });
        }

        let mut tags = std::collections::BTreeMap::new();
        for (name, pairs) in snapshot.tags {
            let mut map = SparseSecondaryMap::new();
            for (handle, value) in pairs {
                map.insert(handle, value);
            }
            tags.insert(name, map);
        }
        let mut senses = SparseSecondaryMap::new();
        for (handle, pair) in snapshot.senses {
            senses.insert(handle, pair);
        }

        Ok(Self {
            sets: snapshot.sets,
            vertices: snapshot.vertices,
            triangles: snapshot.triangles,
            tags,
            senses,
        })
    }
}
