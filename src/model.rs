use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, SetError};
use crate::mesh::{MeshDb, SetHandle, TagValue, CATEGORY_TAG, GLOBAL_ID_TAG, NAME_TAG};
use crate::registry::IdRegistry;
use crate::set::{Category, EntityKey, EntitySet, Group, GroupMember, GroupSpec, Surface, Volume};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// A boundary-representation mesh model: one mesh database plus the ID and
/// group bookkeeping layered over it.
///
/// Every `Model` carries a process-unique instance number. Entities remember
/// which instance produced them, so wrappers from two models opened on the
/// same file never compare equal and cannot be used across models.
#[derive(Debug)]
pub struct Model {
    db: MeshDb,
    registry: IdRegistry,
    instance: u64,
}

impl Model {
    /// Creates a model over an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self {
            db: MeshDb::new(),
            registry: IdRegistry::new(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Wraps an existing database, indexing every category-tagged set.
    ///
    /// Sets carrying a category but no ID are assigned the smallest free ID
    /// of their category, with a warning.
    ///
    /// # Errors
    ///
    /// Returns a duplicate-ID error if two sets of one category carry the
    /// same ID tag.
    pub fn from_db(db: MeshDb) -> Result<Self> {
        let mut model = Self {
            db,
            registry: IdRegistry::new(),
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
        };

        let mut tagged = Vec::new();
        let mut untagged = Vec::new();
        for (handle, value) in model.db.tagged_sets(CATEGORY_TAG) {
            let Some(name) = value.as_str() else {
                tracing::warn!("ignoring set whose category tag is not a string");
                continue;
            };
            let Ok(category) = Category::parse(name) else {
                tracing::warn!(category = name, "ignoring set with unrecognized category");
                continue;
            };
            match model.db.tag_get(GLOBAL_ID_TAG, handle).and_then(TagValue::as_int) {
                Some(id) => tagged.push((category, handle, id)),
                None => untagged.push((category, handle)),
            }
        }
        for (category, handle, id) in tagged {
            model.registry.assign(category, handle, Some(id))?;
        }
        for (category, handle) in untagged {
            let id = model.registry.allocate(category, handle);
            tracing::warn!(%category, id, "set had no ID tag; assigned the smallest free ID");
            model.db.tag_set(GLOBAL_ID_TAG, handle, TagValue::Int(id))?;
        }
        Ok(model)
    }

    /// Opens a model from a database snapshot on disk.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed, or if its contents
    /// violate the ID uniqueness invariant.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_db(MeshDb::from_file(path)?)
    }

    /// Writes the underlying database to disk via its serializer.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be written.
    pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Ok(self.db.write_file(path)?)
    }

    /// The wrapped mesh database.
    #[must_use]
    pub fn db(&self) -> &MeshDb {
        &self.db
    }

    /// Mutable access to the wrapped mesh database.
    ///
    /// This is the escape hatch for collaborator-level edits (meshes,
    /// senses, extra tags). Deleting sets here bypasses the ID registry;
    /// prefer [`EntitySet::delete`](crate::set::EntitySet::delete).
    pub fn db_mut(&mut self) -> &mut MeshDb {
        &mut self.db
    }

    pub(crate) fn instance(&self) -> u64 {
        self.instance
    }

    pub(crate) fn registry(&self) -> &IdRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut IdRegistry {
        &mut self.registry
    }

    pub(crate) fn key_for(&self, handle: SetHandle) -> EntityKey {
        EntityKey {
            model: self.instance,
            handle,
        }
    }

    // --- Lookups ---

    /// All volumes, in ascending ID order.
    #[must_use]
    pub fn volumes(&self) -> Vec<Volume> {
        self.registry
            .iter(Category::Volume)
            .map(|(_, handle)| Volume {
                key: self.key_for(handle),
            })
            .collect()
    }

    /// All surfaces, in ascending ID order.
    #[must_use]
    pub fn surfaces(&self) -> Vec<Surface> {
        self.registry
            .iter(Category::Surface)
            .map(|(_, handle)| Surface {
                key: self.key_for(handle),
            })
            .collect()
    }

    /// All groups, in ascending ID order.
    #[must_use]
    pub fn groups(&self) -> Vec<Group> {
        self.registry
            .iter(Category::Group)
            .map(|(_, handle)| Group {
                key: self.key_for(handle),
            })
            .collect()
    }

    /// Volumes keyed by ID.
    #[must_use]
    pub fn volumes_by_id(&self) -> BTreeMap<i64, Volume> {
        self.registry
            .iter(Category::Volume)
            .map(|(id, handle)| {
                (
                    id,
                    Volume {
                        key: self.key_for(handle),
                    },
                )
            })
            .collect()
    }

    /// Surfaces keyed by ID.
    #[must_use]
    pub fn surfaces_by_id(&self) -> BTreeMap<i64, Surface> {
        self.registry
            .iter(Category::Surface)
            .map(|(id, handle)| {
                (
                    id,
                    Surface {
                        key: self.key_for(handle),
                    },
                )
            })
            .collect()
    }

    /// Groups keyed by name. Unnamed groups are skipped.
    #[must_use]
    pub fn groups_by_name(&self) -> BTreeMap<String, Group> {
        self.registry
            .iter(Category::Group)
            .filter_map(|(_, handle)| {
                let name = self
                    .db
                    .tag_get(NAME_TAG, handle)
                    .and_then(TagValue::as_str)?;
                Some((
                    name.to_owned(),
                    Group {
                        key: self.key_for(handle),
                    },
                ))
            })
            .collect()
    }

    /// The volume with the given ID.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no volume has that ID.
    pub fn volume_by_id(&self, id: i64) -> Result<Volume> {
        self.registry
            .lookup(Category::Volume, id)
            .map(|handle| Volume {
                key: self.key_for(handle),
            })
            .ok_or_else(|| {
                SetError::NotFound {
                    category: Category::Volume,
                    id,
                }
                .into()
            })
    }

    /// The surface with the given ID.
    ///
    /// # Errors
    ///
    /// Returns a not-found error if no surface has that ID.
    pub fn surface_by_id(&self, id: i64) -> Result<Surface> {
        self.registry
            .lookup(Category::Surface, id)
            .map(|handle| Surface {
                key: self.key_for(handle),
            })
            .ok_or_else(|| {
                SetError::NotFound {
                    category: Category::Surface,
                    id,
                }
                .into()
            })
    }

    /// The live group named `name`, if any.
    #[must_use]
    pub fn group_by_name(&self, name: &str) -> Option<Group> {
        for (_, handle) in self.registry.iter(Category::Group) {
            if self.db.tag_get(NAME_TAG, handle).and_then(TagValue::as_str) == Some(name) {
                return Some(Group {
                    key: self.key_for(handle),
                });
            }
        }
        None
    }

    // --- Creation ---

    /// Creates a volume; see [`Volume::create`].
    ///
    /// # Errors
    ///
    /// Returns a duplicate-ID error if the requested ID is taken.
    pub fn create_volume(&mut self, id: Option<i64>) -> Result<Volume> {
        Volume::create(self, id)
    }

    /// Creates a surface; see [`Surface::create`].
    ///
    /// # Errors
    ///
    /// Returns a duplicate-ID error if the requested ID is taken.
    pub fn create_surface(&mut self, id: Option<i64>) -> Result<Surface> {
        Surface::create(self, id)
    }

    /// Creates or finds the group named `name`; see [`Group::create`].
    ///
    /// # Errors
    ///
    /// Fails only on database errors while materializing a new set.
    pub fn create_group(&mut self, name: &str) -> Result<Group> {
        Group::create(self, name)
    }

    /// Bulk-loads groups: one group per spec (created or reused by name),
    /// re-keyed to the spec's ID, with every member added. Raw integer
    /// members resolve against volumes first, then surfaces.
    ///
    /// # Errors
    ///
    /// Fails on an ID collision, an unresolvable member, or a stale member
    /// entity.
    pub fn add_groups(&mut self, specs: impl IntoIterator<Item = GroupSpec>) -> Result<()> {
        enum Resolved {
            Vol(Volume),
            Surf(Surface),
        }

        for spec in specs {
            // Resolve every member first so a bad spec creates nothing.
            let mut resolved = Vec::with_capacity(spec.members.len());
            for member in spec.members {
                let entity = match member {
                    GroupMember::Volume(volume) => Resolved::Vol(volume),
                    GroupMember::Surface(surface) => Resolved::Surf(surface),
                    GroupMember::Id(id) => {
                        if let Ok(volume) = self.volume_by_id(id) {
                            Resolved::Vol(volume)
                        } else if let Ok(surface) = self.surface_by_id(id) {
                            Resolved::Surf(surface)
                        } else {
                            return Err(SetError::UnresolvedMember { id }.into());
                        }
                    }
                };
                resolved.push(entity);
            }
            let group = Group::create(self, &spec.name)?;
            group.set_id(self, Some(spec.id))?;
            for member in resolved {
                match member {
                    Resolved::Vol(volume) => group.add_set(self, &volume)?,
                    Resolved::Surf(surface) => group.add_set(self, &surface)?,
                }
            }
        }
        Ok(())
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Model: {} Volumes, {} Surfaces, {} Groups",
            self.registry.count(Category::Volume),
            self.registry.count(Category::Surface),
            self.registry.count(Category::Group),
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::testutil::fuel_pin_model;
    use std::collections::HashMap;

    #[test]
    fn display_reports_the_census() {
        let model = fuel_pin_model();
        assert_eq!(model.to_string(), "Model: 4 Volumes, 21 Surfaces, 5 Groups");
    }

    #[test]
    fn lookups_agree_with_each_other() {
        let model = fuel_pin_model();

        assert_eq!(model.volumes().len(), 4);
        assert_eq!(model.volumes_by_id().len(), 4);
        assert_eq!(model.volume_by_id(1).unwrap(), model.volumes()[0]);
        assert!(matches!(
            model.volume_by_id(999),
            Err(ModelError::Set(SetError::NotFound { .. }))
        ));

        let groups = model.groups_by_name();
        assert_eq!(groups.len(), 5);
        assert_eq!(
            model.group_by_name("mat:fuel"),
            groups.get("mat:fuel").copied()
        );
        assert_eq!(model.group_by_name("mat:void"), None);
    }

    #[test]
    fn entities_from_distinct_models_never_compare_equal() {
        let model1 = fuel_pin_model();
        let model2 = fuel_pin_model();

        let v1 = model1.volumes_by_id()[&1];
        let v2 = model2.volumes_by_id()[&1];

        // Same underlying handle, different owning model.
        assert_eq!(v1.handle(), v2.handle());
        assert_ne!(v1, v2);
    }

    #[test]
    fn hashing_keeps_same_handle_entities_from_two_models_apart() {
        let model1 = fuel_pin_model();
        let model2 = fuel_pin_model();

        let mut by_group: HashMap<crate::set::Group, String> = HashMap::new();
        for group in model1.groups() {
            by_group.insert(group, group.name(&model1).unwrap());
        }
        for group in model2.groups() {
            by_group.insert(group, group.name(&model2).unwrap());
        }

        assert_eq!(
            by_group.len(),
            model1.groups().len() + model2.groups().len()
        );
    }

    #[test]
    fn write_and_reopen_preserves_custom_ids() {
        let mut model = fuel_pin_model();
        let v1 = model.volumes_by_id()[&1];
        v1.set_id(&mut model, Some(12345)).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pin_copy.json");
        model.write_file(&path).unwrap();

        let reopened = Model::open(&path).unwrap();
        assert!(reopened.volumes_by_id().contains_key(&12345));
        // Raw handles survive the snapshot slot-for-slot.
        assert_eq!(
            reopened.volumes_by_id()[&12345].handle(),
            v1.handle()
        );
        assert_eq!(
            reopened.to_string(),
            "Model: 4 Volumes, 21 Surfaces, 5 Groups"
        );
    }

    #[test]
    fn reopened_groups_keep_names_and_membership() {
        let model = fuel_pin_model();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pin.json");
        model.write_file(&path).unwrap();

        let reopened = Model::open(&path).unwrap();
        let fuel = reopened.groups_by_name()["mat:fuel"];
        assert_eq!(fuel.volume_ids(&reopened).unwrap(), vec![1]);
    }

    #[test]
    fn duplicate_ids_in_a_database_are_rejected() {
        let mut db = MeshDb::new();
        for _ in 0..2 {
            let set = db.create_meshset();
            db.tag_set(CATEGORY_TAG, set, TagValue::Str("Volume".into()))
                .unwrap();
            db.tag_set(GLOBAL_ID_TAG, set, TagValue::Int(7)).unwrap();
        }

        let err = Model::from_db(db).unwrap_err();
        assert!(err.to_string().contains("already"));
    }

    #[test]
    fn unindexed_sets_receive_the_smallest_free_id() {
        let mut db = MeshDb::new();
        for id in [2_i64, 5] {
            let set = db.create_meshset();
            db.tag_set(CATEGORY_TAG, set, TagValue::Str("Volume".into()))
                .unwrap();
            db.tag_set(GLOBAL_ID_TAG, set, TagValue::Int(id)).unwrap();
        }
        let bare = db.create_meshset();
        db.tag_set(CATEGORY_TAG, bare, TagValue::Str("Volume".into()))
            .unwrap();

        let model = Model::from_db(db).unwrap();
        assert_eq!(model.volumes_by_id().keys().copied().collect::<Vec<_>>(), vec![1, 2, 5]);
        assert_eq!(
            model.db().tag_get(GLOBAL_ID_TAG, bare),
            Some(&TagValue::Int(1))
        );
    }

    #[test]
    fn add_groups_builds_exactly_the_requested_groups() {
        let mut model = fuel_pin_model();
        let volumes = model.volumes_by_id();
        let surfaces = model.surfaces_by_id();

        for group in model.groups() {
            group.delete(&mut model).unwrap();
        }
        assert!(model.groups().is_empty());

        let specs = vec![
            GroupSpec::new("mat:fuel", 10, [1_i64, 2]),
            GroupSpec::new("mat:Graveyard", 50, [volumes[&6]]),
            GroupSpec::new("mat:41", 20, [3_i64]),
            GroupSpec::new("boundary:Reflecting", 30, [19_i64, 20, 21]),
            GroupSpec::new("boundary:Vacuum", 40, [surfaces[&17], surfaces[&18]]),
        ];
        model.add_groups(specs).unwrap();

        let groups = model.groups_by_name();
        assert_eq!(groups.len(), 5);

        let mut fuel_ids = groups["mat:fuel"].volume_ids(&model).unwrap();
        fuel_ids.sort_unstable();
        assert_eq!(fuel_ids, vec![1, 2]);
        // Raw IDs resolve to volumes before surfaces.
        assert!(groups["mat:fuel"].surface_ids(&model).unwrap().is_empty());

        assert_eq!(groups["mat:Graveyard"].volume_ids(&model).unwrap(), vec![6]);
        assert_eq!(groups["mat:41"].volume_ids(&model).unwrap(), vec![3]);
        assert_eq!(groups["mat:fuel"].id(&model).unwrap(), 10);

        let mut reflecting = groups["boundary:Reflecting"].surface_ids(&model).unwrap();
        reflecting.sort_unstable();
        assert_eq!(reflecting, vec![19, 20, 21]);

        let mut vacuum = groups["boundary:Vacuum"].surface_ids(&model).unwrap();
        vacuum.sort_unstable();
        assert_eq!(vacuum, vec![17, 18]);
    }

    #[test]
    fn add_groups_rejects_unresolvable_members() {
        let mut model = fuel_pin_model();
        let err = model
            .add_groups(vec![GroupSpec::new("mat:ghost", 90, [999_i64])])
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::Set(SetError::UnresolvedMember { id: 999 })
        ));
        // The bad spec must not have left a half-built group behind.
        assert!(model.group_by_name("mat:ghost").is_none());
    }

    #[test]
    fn foreign_entities_are_rejected() {
        let model1 = fuel_pin_model();
        let mut model2 = fuel_pin_model();
        let foreign = model1.volumes_by_id()[&1];

        let group = model2.groups_by_name()["mat:fuel"];
        let err = group.add_set(&mut model2, &foreign).unwrap_err();
        assert!(matches!(err, ModelError::Set(SetError::ForeignModel)));
    }

    #[test]
    fn census_tracks_creation_and_deletion() {
        let mut model = fuel_pin_model();
        model.create_volume(None).unwrap();
        assert_eq!(model.to_string(), "Model: 5 Volumes, 21 Surfaces, 5 Groups");

        let group = model.groups_by_name()["mat:water"];
        group.delete(&mut model).unwrap();
        assert_eq!(model.to_string(), "Model: 5 Volumes, 21 Surfaces, 4 Groups");
    }
}
