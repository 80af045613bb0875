use super::{attached, Category, EntityKey, EntitySet, Surface, Volume};
use crate::error::{Result, TagError};
use crate::mesh::{TagValue, NAME_TAG};
use crate::model::Model;

/// A named collection of volumes and surfaces.
///
/// Groups key semantic metadata (materials, boundary conditions) to parts of
/// a model. Creation is idempotent by name, and merging two groups leaves a
/// single surviving identity that old lookups resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Group {
    pub(crate) key: EntityKey,
}

impl EntitySet for Group {
    const CATEGORY: Category = Category::Group;

    fn key(&self) -> EntityKey {
        self.key
    }
}

/// A member reference inside a [`GroupSpec`]: either a live entity or a raw
/// ID to resolve against the model (volumes first, surfaces second).
#[derive(Debug, Clone)]
pub enum GroupMember {
    Id(i64),
    Volume(Volume),
    Surface(Surface),
}

impl From<i64> for GroupMember {
    fn from(id: i64) -> Self {
        GroupMember::Id(id)
    }
}

impl From<Volume> for GroupMember {
    fn from(volume: Volume) -> Self {
        GroupMember::Volume(volume)
    }
}

impl From<Surface> for GroupMember {
    fn from(surface: Surface) -> Self {
        GroupMember::Surface(surface)
    }
}

/// One entry of a bulk group load: the group's name, its ID, and the members
/// to add.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub name: String,
    pub id: i64,
    pub members: Vec<GroupMember>,
}

impl GroupSpec {
    /// Creates a spec from anything convertible to members.
    pub fn new<N, M>(name: N, id: i64, members: impl IntoIterator<Item = M>) -> Self
    where
        N: Into<String>,
        M: Into<GroupMember>,
    {
        Self {
            name: name.into(),
            id,
            members: members.into_iter().map(Into::into).collect(),
        }
    }
}

impl Group {
    /// Wraps an existing set as a group, validating its tags.
    ///
    /// # Errors
    ///
    /// Returns a tag validation error under the same rules as
    /// [`Volume::bind`].
    pub fn bind(model: &mut Model, handle: crate::mesh::SetHandle) -> Result<Self> {
        super::bind(model, handle, Category::Group)?;
        Ok(Self {
            key: EntityKey {
                model: model.instance(),
                handle,
            },
        })
    }

    /// Returns the live group named `name`, creating one when none exists.
    /// A fresh group takes the ID one past the category max.
    ///
    /// # Errors
    ///
    /// Fails only on database errors while materializing a new set.
    pub fn create(model: &mut Model, name: &str) -> Result<Self> {
        if let Some(existing) = model.group_by_name(name) {
            return Ok(existing);
        }
        let handle = super::create_set(model, Category::Group, None)?;
        model
            .db_mut()
            .tag_set(NAME_TAG, handle, TagValue::Str(name.to_owned()))?;
        Ok(Self {
            key: EntityKey {
                model: model.instance(),
                handle,
            },
        })
    }

    /// This group's name.
    ///
    /// # Errors
    ///
    /// Fails if the group is stale, foreign to `model`, or carries no name
    /// tag.
    pub fn name(&self, model: &Model) -> Result<String> {
        let handle = attached(model, self.key)?;
        model
            .db()
            .tag_get(NAME_TAG, handle)
            .and_then(TagValue::as_str)
            .map(str::to_owned)
            .ok_or_else(|| TagError::MissingTag { tag: NAME_TAG }.into())
    }

    /// Renames this group in place. Name-keyed lookups see the new name
    /// immediately; the old name stops resolving.
    ///
    /// # Errors
    ///
    /// Fails if the group is stale or foreign to `model`.
    pub fn set_name(&self, model: &mut Model, name: &str) -> Result<()> {
        let handle = attached(model, self.key)?;
        model
            .db_mut()
            .tag_set(NAME_TAG, handle, TagValue::Str(name.to_owned()))?;
        Ok(())
    }

    /// Adds an entity to this group. Adding a present member is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if the group or the member is stale or foreign to `model`.
    pub fn add_set<E: EntitySet>(&self, model: &mut Model, member: &E) -> Result<()> {
        let group = attached(model, self.key)?;
        let member = attached(model, member.key())?;
        model.db_mut().add_child(group, member)?;
        Ok(())
    }

    /// Removes an entity from this group. Removing an absent member is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Fails if the group or the member is stale or foreign to `model`.
    pub fn remove_set<E: EntitySet>(&self, model: &mut Model, member: &E) -> Result<()> {
        let group = attached(model, self.key)?;
        let member = attached(model, member.key())?;
        model.db_mut().remove_child(group, member)?;
        Ok(())
    }

    /// Whether an entity is a member of this group.
    ///
    /// # Errors
    ///
    /// Fails if the group or the entity is stale or foreign to `model`.
    pub fn contains<E: EntitySet>(&self, model: &Model, member: &E) -> Result<bool> {
        let group = attached(model, self.key)?;
        let member = attached(model, member.key())?;
        Ok(model.db().children(group)?.contains(&member))
    }

    /// The member volumes, in membership order.
    ///
    /// # Errors
    ///
    /// Fails if the group is stale or foreign to `model`.
    pub fn volumes(&self, model: &Model) -> Result<Vec<Volume>> {
        let group = attached(model, self.key)?;
        let mut volumes = Vec::new();
        for child in model.db().children(group)? {
            if model.registry().id_of(Category::Volume, *child).is_some() {
                volumes.push(Volume {
                    key: EntityKey {
                        model: self.key.model,
                        handle: *child,
                    },
                });
            }
        }
        Ok(volumes)
    }

    /// The member surfaces, in membership order.
    ///
    /// # Errors
    ///
    /// Fails if the group is stale or foreign to `model`.
    pub fn surfaces(&self, model: &Model) -> Result<Vec<Surface>> {
        let group = attached(model, self.key)?;
        let mut surfaces = Vec::new();
        for child in model.db().children(group)? {
            if model.registry().id_of(Category::Surface, *child).is_some() {
                surfaces.push(Surface {
                    key: EntityKey {
                        model: self.key.model,
                        handle: *child,
                    },
                });
            }
        }
        Ok(surfaces)
    }

    /// IDs of the member volumes, in membership order.
    ///
    /// # Errors
    ///
    /// Fails if the group is stale or foreign to `model`.
    pub fn volume_ids(&self, model: &Model) -> Result<Vec<i64>> {
        self.volumes(model)?
            .iter()
            .map(|volume| volume.id(model))
            .collect()
    }

    /// IDs of the member surfaces, in membership order.
    ///
    /// # Errors
    ///
    /// Fails if the group is stale or foreign to `model`.
    pub fn surface_ids(&self, model: &Model) -> Result<Vec<i64>> {
        self.surfaces(model)?
            .iter()
            .map(|surface| surface.id(model))
            .collect()
    }

    /// Member volumes keyed by ID.
    ///
    /// # Errors
    ///
    /// Fails if the group is stale or foreign to `model`.
    pub fn volumes_by_id(&self, model: &Model) -> Result<std::collections::BTreeMap<i64, Volume>> {
        self.volumes(model)?
            .into_iter()
            .map(|volume| Ok((volume.id(model)?, volume)))
            .collect()
    }

    /// Merges `other` into this group: membership is unioned, the other set
    /// is deleted and its ID released, and `other` is repointed at the
    /// surviving group so the two wrappers compare equal afterwards. Old
    /// copies of the merged-away wrapper keep resolving through the alias
    /// table. Merging a group with itself is a no-op.
    ///
    /// # Errors
    ///
    /// Fails if either group is stale or foreign to `model`.
    pub fn merge(&self, model: &mut Model, other: &mut Group) -> Result<()> {
        let canonical = attached(model, self.key)?;
        let merged = attached(model, other.key)?;
        if merged != canonical {
            let members = model.db().children(merged)?.to_vec();
            for member in members {
                model.db_mut().add_child(canonical, member)?;
            }
            model.registry_mut().release(Category::Group, merged);
            model.db_mut().delete_set(merged);
            model.registry_mut().record_alias(merged, canonical);
        }
        other.key = self.key;
        Ok(())
    }
}
