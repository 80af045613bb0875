use super::{attached, Category, EntityKey, EntitySet, Volume};
use crate::error::Result;
use crate::mesh::{measure, SetHandle};
use crate::model::Model;

/// A two-sided triangulated boundary between volumes.
///
/// The sense pair orders the adjacent volumes as (forward, reverse); either
/// side may be absent for an unbounded exterior. Each side can be rewritten
/// without disturbing the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Surface {
    pub(crate) key: EntityKey,
}

impl EntitySet for Surface {
    const CATEGORY: Category = Category::Surface;

    fn key(&self) -> EntityKey {
        self.key
    }
}

impl Surface {
    /// Wraps an existing set as a surface, validating its tags.
    ///
    /// # Errors
    ///
    /// Returns a tag validation error under the same rules as
    /// [`Volume::bind`].
    pub fn bind(model: &mut Model, handle: SetHandle) -> Result<Self> {
        super::bind(model, handle, Category::Surface)?;
        Ok(Self {
            key: EntityKey {
                model: model.instance(),
                handle,
            },
        })
    }

    /// Creates a new surface. `Some(id)` claims that exact ID; `None` takes
    /// one past the largest surface ID in use.
    ///
    /// # Errors
    ///
    /// Returns a duplicate-ID error if the requested ID is taken.
    pub fn create(model: &mut Model, id: Option<i64>) -> Result<Self> {
        let handle = super::create_set(model, Category::Surface, id)?;
        Ok(Self {
            key: EntityKey {
                model: model.instance(),
                handle,
            },
        })
    }

    /// The (forward, reverse) sense pair as volumes.
    ///
    /// # Errors
    ///
    /// Fails if the surface is stale or foreign to `model`.
    pub fn surf_sense(&self, model: &Model) -> Result<[Option<Volume>; 2]> {
        let handle = attached(model, self.key)?;
        let pair = model.db().sense(handle);
        Ok(pair.map(|side| {
            side.map(|volume| Volume {
                key: EntityKey {
                    model: self.key.model,
                    handle: volume,
                },
            })
        }))
    }

    /// The volume on the forward side, if any.
    ///
    /// # Errors
    ///
    /// Fails if the surface is stale or foreign to `model`.
    pub fn forward_volume(&self, model: &Model) -> Result<Option<Volume>> {
        Ok(self.surf_sense(model)?[0])
    }

    /// The volume on the reverse side, if any.
    ///
    /// # Errors
    ///
    /// Fails if the surface is stale or foreign to `model`.
    pub fn reverse_volume(&self, model: &Model) -> Result<Option<Volume>> {
        Ok(self.surf_sense(model)?[1])
    }

    /// Rewrites the forward side of the sense pair, leaving the reverse side
    /// untouched.
    ///
    /// # Errors
    ///
    /// Fails if the surface or the new volume is stale or foreign to
    /// `model`.
    pub fn set_forward_volume(&self, model: &mut Model, volume: Option<Volume>) -> Result<()> {
        self.set_sense_side(model, 0, volume)
    }

    /// Rewrites the reverse side of the sense pair, leaving the forward side
    /// untouched.
    ///
    /// # Errors
    ///
    /// Fails if the surface or the new volume is stale or foreign to
    /// `model`.
    pub fn set_reverse_volume(&self, model: &mut Model, volume: Option<Volume>) -> Result<()> {
        self.set_sense_side(model, 1, volume)
    }

    fn set_sense_side(
        &self,
        model: &mut Model,
        side: usize,
        volume: Option<Volume>,
    ) -> Result<()> {
        let handle = attached(model, self.key)?;
        let volume_handle = match volume {
            Some(volume) => Some(attached(model, volume.key)?),
            None => None,
        };
        let mut pair = model.db().sense(handle);
        pair[side] = volume_handle;
        model.db_mut().set_sense(handle, pair)?;
        Ok(())
    }

    /// The adjacent volumes in (forward, reverse) order, skipping absent
    /// sides.
    ///
    /// # Errors
    ///
    /// Fails if the surface is stale or foreign to `model`.
    pub fn volumes(&self, model: &Model) -> Result<Vec<Volume>> {
        Ok(self.surf_sense(model)?.into_iter().flatten().collect())
    }

    /// The total area of this surface's triangles.
    ///
    /// # Errors
    ///
    /// Fails if the surface is stale, foreign to `model`, or has a mesh
    /// referencing missing elements.
    pub fn area(&self, model: &Model) -> Result<f64> {
        let handle = attached(model, self.key)?;
        Ok(measure::surface_area(model.db(), handle)?)
    }
}
