use super::{attached, Category, EntityKey, EntitySet, Group, Surface};
use crate::error::Result;
use crate::mesh::{measure, SetHandle};
use crate::model::Model;

/// A bounded region of space, enclosed by its child surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Volume {
    pub(crate) key: EntityKey,
}

impl EntitySet for Volume {
    const CATEGORY: Category = Category::Volume;

    fn key(&self) -> EntityKey {
        self.key
    }
}

impl Volume {
    /// Wraps an existing set as a volume, validating its tags.
    ///
    /// A missing category or dimension tag is derived from the other and
    /// written back with a warning; a set carrying neither, or carrying
    /// tags for a different category, is rejected.
    ///
    /// # Errors
    ///
    /// Returns a tag validation error as described above.
    pub fn bind(model: &mut Model, handle: SetHandle) -> Result<Self> {
        super::bind(model, handle, Category::Volume)?;
        Ok(Self {
            key: EntityKey {
                model: model.instance(),
                handle,
            },
        })
    }

    /// Creates a new volume. `Some(id)` claims that exact ID; `None` takes
    /// one past the largest volume ID in use.
    ///
    /// # Errors
    ///
    /// Returns a duplicate-ID error if the requested ID is taken.
    pub fn create(model: &mut Model, id: Option<i64>) -> Result<Self> {
        let handle = super::create_set(model, Category::Volume, id)?;
        Ok(Self {
            key: EntityKey {
                model: model.instance(),
                handle,
            },
        })
    }

    /// The surfaces bounding this volume.
    ///
    /// # Errors
    ///
    /// Fails if the volume is stale or foreign to `model`.
    pub fn surfaces(&self, model: &Model) -> Result<Vec<Surface>> {
        let handle = attached(model, self.key)?;
        let mut surfaces = Vec::new();
        for child in model.db().children(handle)? {
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

    /// Every group this volume is a member of.
    ///
    /// # Errors
    ///
    /// Fails if the volume is stale or foreign to `model`.
    pub fn groups(&self, model: &Model) -> Result<Vec<Group>> {
        let handle = attached(model, self.key)?;
        let mut groups = Vec::new();
        for parent in model.db().sets_containing(handle) {
            if model.registry().id_of(Category::Group, parent).is_some() {
                groups.push(Group {
                    key: EntityKey {
                        model: self.key.model,
                        handle: parent,
                    },
                });
            }
        }
        Ok(groups)
    }

    /// The material assigned to this volume via `mat:` group membership,
    /// if any.
    ///
    /// # Errors
    ///
    /// Fails if the volume is stale or foreign to `model`.
    pub fn material(&self, model: &Model) -> Result<Option<String>> {
        for group in self.groups(model)? {
            if let Some(material) = group
                .name(model)?
                .strip_prefix("mat:")
                .map(str::to_owned)
            {
                return Ok(Some(material));
            }
        }
        Ok(None)
    }

    /// Moves this volume into the group named `mat:<material>`, creating the
    /// group on demand and leaving any previous material group.
    ///
    /// # Errors
    ///
    /// Fails if the volume is stale or foreign to `model`.
    pub fn set_material(&self, model: &mut Model, material: &str) -> Result<()> {
        for group in self.groups(model)? {
            if group.name(model)?.starts_with("mat:") {
                group.remove_set(model, self)?;
            }
        }
        let group = Group::create(model, &format!("mat:{material}"))?;
        group.add_set(model, self)
    }

    /// The volume of space enclosed by this volume's surfaces.
    ///
    /// # Errors
    ///
    /// Fails if the volume is stale, foreign to `model`, or has a mesh
    /// referencing missing elements.
    pub fn volume(&self, model: &Model) -> Result<f64> {
        let handle = attached(model, self.key)?;
        Ok(measure::enclosed_volume(model.db(), handle)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::mesh::{TagValue, CATEGORY_TAG, GEOM_DIMENSION_TAG};
    use crate::testutil::fuel_pin_model;
    use approx::assert_relative_eq;

    #[test]
    fn create_with_and_without_explicit_id() {
        let mut model = fuel_pin_model();

        let v100 = Volume::create(&mut model, Some(100)).unwrap();
        assert_eq!(v100.id(&model).unwrap(), 100);
        assert_eq!(model.volumes_by_id().get(&100), Some(&v100));

        // Unset creation takes one past the new max of 100.
        let next = Volume::create(&mut model, None).unwrap();
        assert_eq!(next.id(&model).unwrap(), 101);
    }

    #[test]
    fn id_reassignment_guards_against_collisions() {
        let mut model = fuel_pin_model();
        let v1 = model.volumes_by_id()[&1];

        let err = v1.set_id(&mut model, Some(2)).unwrap_err();
        assert!(err.to_string().contains("already"));
        assert!(matches!(err, ModelError::Id(_)));
        // The failed assignment must not have disturbed anything.
        assert_eq!(v1.id(&model).unwrap(), 1);

        v1.set_id(&mut model, Some(9876)).unwrap();
        assert_eq!(v1.id(&model).unwrap(), 9876);

        // A fresh volume gets the next ID after the raised max.
        let v2 = Volume::create(&mut model, None).unwrap();
        assert_eq!(v2.id(&model).unwrap(), 9877);

        // Free 9876 and 9877 again; unset creation still jumps past the max.
        v1.set_id(&mut model, Some(101)).unwrap();
        v2.delete(&mut model).unwrap();
        let v3 = Volume::create(&mut model, None).unwrap();
        assert_eq!(v3.id(&model).unwrap(), 102);
    }

    #[test]
    fn setting_own_id_is_a_no_op() {
        let mut model = fuel_pin_model();
        let v1 = model.volumes_by_id()[&1];
        assert_eq!(v1.set_id(&mut model, Some(1)).unwrap(), 1);
        assert_eq!(v1.id(&model).unwrap(), 1);
    }

    #[test]
    fn material_follows_group_membership() {
        let mut model = fuel_pin_model();
        let v1 = model.volumes_by_id()[&1];

        assert_eq!(v1.material(&model).unwrap().as_deref(), Some("fuel"));
        assert!(model.groups_by_name()["mat:fuel"]
            .contains(&model, &v1)
            .unwrap());

        let old_len = model.groups_by_name()["mat:fuel"]
            .volumes(&model)
            .unwrap()
            .len();

        v1.set_material(&mut model, "olive oil").unwrap();

        assert_eq!(v1.material(&model).unwrap().as_deref(), Some("olive oil"));
        let groups = model.groups_by_name();
        assert!(groups.contains_key("mat:olive oil"));
        assert!(groups["mat:olive oil"].contains(&model, &v1).unwrap());
        assert!(!groups["mat:fuel"].contains(&model, &v1).unwrap());
        assert_eq!(
            groups["mat:fuel"].volumes(&model).unwrap().len(),
            old_len - 1
        );
        assert_eq!(groups["mat:olive oil"].volumes(&model).unwrap().len(), 1);
    }

    #[test]
    fn bind_derives_a_missing_category_tag() {
        let mut model = fuel_pin_model();
        let raw = model.db_mut().create_meshset();
        model
            .db_mut()
            .tag_set(GEOM_DIMENSION_TAG, raw, TagValue::Int(3))
            .unwrap();

        let volume = Volume::bind(&mut model, raw).unwrap();
        assert_eq!(
            model.db().tag_get(CATEGORY_TAG, raw),
            Some(&TagValue::Str("Volume".into()))
        );
        // Binding indexed the set, so it now has an ID like any volume.
        assert!(volume.id(&model).unwrap() > 0);
    }

    #[test]
    fn bind_rejects_mismatched_tags() {
        let mut model = fuel_pin_model();
        let s1 = model.surfaces_by_id()[&1];
        assert!(matches!(
            Volume::bind(&mut model, s1.handle()),
            Err(ModelError::Tag(_))
        ));
    }

    #[test]
    fn bind_rejects_a_bare_set() {
        let mut model = fuel_pin_model();
        let raw = model.db_mut().create_meshset();
        assert!(matches!(
            Volume::bind(&mut model, raw),
            Err(ModelError::Tag(_))
        ));
    }

    #[test]
    fn deleted_volume_turns_stale() {
        let mut model = fuel_pin_model();
        let v1 = model.volumes_by_id()[&1];
        let copy = v1;
        v1.delete(&mut model).unwrap();

        let err = copy.id(&model).unwrap_err();
        assert!(err.to_string().contains("no longer attached"));
        assert!(!model.volumes_by_id().contains_key(&1));
    }

    #[test]
    fn triangle_queries_delegate_through_children() {
        let model = fuel_pin_model();
        let v1 = model.volumes_by_id()[&1];

        assert_eq!(v1.num_triangles(&model).unwrap(), 12);
        let (conn, coords) = v1.triangle_conn_and_coords(&model, false).unwrap();
        let (uconn, ucoords) = v1.triangle_conn_and_coords(&model, true).unwrap();
        assert_eq!(conn.len(), 12);
        assert_eq!(coords.len(), 36);
        assert_eq!(ucoords.len(), 8);
        for (row, urow) in conn.iter().zip(&uconn) {
            for (i, ui) in row.iter().zip(urow) {
                assert_eq!(coords[*i], ucoords[*ui]);
            }
        }

        // A group resolves triangles through its member volumes.
        let fuel = model.groups_by_name()["mat:fuel"];
        assert_eq!(fuel.num_triangles(&model).unwrap(), 12);
    }

    #[test]
    fn coordinate_mapping_keys_rows_by_triangle() {
        let model = fuel_pin_model();
        let v1 = model.volumes_by_id()[&1];

        let (mapping, coords) = v1.triangle_coordinate_mapping(&model).unwrap();
        let tris = v1.triangle_handles(&model).unwrap();

        assert_eq!(mapping.len(), 12);
        assert_eq!(coords.len(), 8);
        for tri in &tris {
            let row = mapping[tri];
            let corners = model.db().triangle(*tri).unwrap();
            for (index, corner) in row.iter().zip(corners) {
                assert_eq!(coords[*index], model.db().vertex(corner).unwrap());
            }
        }
    }

    #[test]
    fn enclosed_volume_of_the_fuel_box() {
        let model = fuel_pin_model();
        let v1 = model.volumes_by_id()[&1];
        assert_relative_eq!(v1.volume(&model).unwrap(), 1.0, max_relative = 1e-12);
    }
}
