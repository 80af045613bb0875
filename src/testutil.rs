#![allow(clippy::unwrap_used)]

//! Test fixtures: a small reactor-pin-like model with enough structure to
//! exercise IDs, groups, senses, and measures.

use std::sync::Once;

use crate::mesh::{MeshDb, Point3, SetHandle};
use crate::model::Model;
use crate::set::{EntitySet, Group, Surface, Volume};

/// Installs a test-friendly tracing subscriber once per process so warnings
/// from tag inference show up in test output.
pub(crate) fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Adds an axis-aligned box to `set` as 12 outward-wound triangles.
pub(crate) fn add_box(db: &mut MeshDb, set: SetHandle, min: Point3, max: Point3) {
    let corners = [
        Point3::new(min.x, min.y, min.z),
        Point3::new(max.x, min.y, min.z),
        Point3::new(max.x, max.y, min.z),
        Point3::new(min.x, max.y, min.z),
        Point3::new(min.x, min.y, max.z),
        Point3::new(max.x, min.y, max.z),
        Point3::new(max.x, max.y, max.z),
        Point3::new(min.x, max.y, max.z),
    ];
    let verts: Vec<_> = corners.into_iter().map(|p| db.add_vertex(p)).collect();
    const FACES: [[usize; 3]; 12] = [
        [0, 2, 1], // bottom
        [0, 3, 2],
        [4, 5, 6], // top
        [4, 6, 7],
        [0, 1, 5], // front
        [0, 5, 4],
        [2, 3, 7], // back
        [2, 7, 6],
        [0, 4, 7], // left
        [0, 7, 3],
        [1, 2, 6], // right
        [1, 6, 5],
    ];
    for face in FACES {
        let tri = db
            .add_triangle([verts[face[0]], verts[face[1]], verts[face[2]]])
            .unwrap();
        db.add_triangles(set, &[tri]).unwrap();
    }
}

/// Builds a model shaped like the classic fuel-pin fixture: volumes 1-3 plus
/// a graveyard at ID 6, 21 surfaces (the first four carrying box shells),
/// and five groups.
pub(crate) fn fuel_pin_model() -> Model {
    init_tracing();
    let mut model = Model::new();

    let v1 = Volume::create(&mut model, Some(1)).unwrap();
    let v2 = Volume::create(&mut model, Some(2)).unwrap();
    let v3 = Volume::create(&mut model, Some(3)).unwrap();
    let v6 = Volume::create(&mut model, Some(6)).unwrap();

    let surfaces: Vec<Surface> = (1..=21)
        .map(|id| Surface::create(&mut model, Some(id)).unwrap())
        .collect();

    // Shell meshes for the four volumes, nested pin-style.
    let shells = [
        (surfaces[0], v1, Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
        (surfaces[1], v2, Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 2.0)),
        (surfaces[2], v3, Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 4.0)),
        (surfaces[3], v6, Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 3.0, 3.0)),
    ];
    for (surface, volume, min, max) in shells {
        model
            .db_mut()
            .add_child(volume.handle(), surface.handle())
            .unwrap();
        add_box(model.db_mut(), surface.handle(), min, max);
    }

    // Surface 1 separates the fuel from the clad.
    surfaces[0].set_forward_volume(&mut model, Some(v1)).unwrap();
    surfaces[0].set_reverse_volume(&mut model, Some(v2)).unwrap();
    for (surface, volume) in [(surfaces[1], v2), (surfaces[2], v3), (surfaces[3], v6)] {
        surface.set_forward_volume(&mut model, Some(volume)).unwrap();
    }

    for (name, volume) in [
        ("mat:fuel", v1),
        ("mat:41", v2),
        ("mat:water", v3),
        ("mat:Graveyard", v6),
    ] {
        let group = Group::create(&mut model, name).unwrap();
        group.add_set(&mut model, &volume).unwrap();
    }
    let vacuum = Group::create(&mut model, "boundary:Vacuum").unwrap();
    for surface in &surfaces[18..21] {
        vacuum.add_set(&mut model, surface).unwrap();
    }

    model
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_has_the_advertised_census() {
        let model = fuel_pin_model();
        assert_eq!(model.volumes().len(), 4);
        assert_eq!(model.surfaces().len(), 21);
        assert_eq!(model.groups().len(), 5);
    }
}
