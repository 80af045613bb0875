use super::{MeshDb, SetHandle, Vector3};
use crate::error::DbError;

/// Computes the volume enclosed by a volume set's surfaces.
///
/// Uses the signed tetrahedron method: for each triangle, `(1/6) * v0 .
/// (v1 x v2)`, summed over all triangles of each child surface. A surface
/// whose reverse sense references the volume contributes with flipped sign,
/// so shared boundary surfaces count correctly for both neighbors.
///
/// # Errors
///
/// Returns an error if the set does not exist or its mesh references a
/// missing element.
pub fn enclosed_volume(db: &MeshDb, volume: SetHandle) -> Result<f64, DbError> {
    let mut signed = 0.0;
    for surface in db.children(volume)? {
        let sign = if db.sense(*surface)[1] == Some(volume) {
            -1.0
        } else {
            1.0
        };
        for tri in db.triangles_of(*surface)? {
            let [v0, v1, v2] = triangle_corners(db, tri)?;
            signed += sign * v0.dot(&v1.cross(&v2));
        }
    }
    Ok((signed / 6.0).abs())
}

/// Computes the total area of a surface set's triangles.
///
/// # Errors
///
/// Returns an error if the set does not exist or its mesh references a
/// missing element.
pub fn surface_area(db: &MeshDb, surface: SetHandle) -> Result<f64, DbError> {
    let mut total = 0.0;
    for tri in db.triangles_of(surface)? {
        let [v0, v1, v2] = triangle_corners(db, tri)?;
        total += (v1 - v0).cross(&(v2 - v0)).norm() * 0.5;
    }
    Ok(total)
}

fn triangle_corners(
    db: &MeshDb,
    tri: super::TriHandle,
) -> Result<[Vector3; 3], DbError> {
    let corners = db.triangle(tri).ok_or(DbError::InvalidElement)?;
    let mut out = [Vector3::zeros(); 3];
    for (slot, corner) in out.iter_mut().zip(corners) {
        let point = db.vertex(corner).ok_or(DbError::InvalidElement)?;
        *slot = point.coords;
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mesh::Point3;
    use crate::testutil::add_box;
    use approx::assert_relative_eq;

    #[test]
    fn box_volume() {
        let mut db = MeshDb::new();
        let volume = db.create_meshset();
        let surface = db.create_meshset();
        db.add_child(volume, surface).unwrap();
        db.set_sense(surface, [Some(volume), None]).unwrap();
        add_box(
            &mut db,
            surface,
            Point3::new(1.0, 2.0, 3.0),
            Point3::new(3.0, 5.0, 7.0),
        );

        // 2 * 3 * 4 = 24
        let volume = enclosed_volume(&db, volume).unwrap();
        assert_relative_eq!(volume, 24.0, max_relative = 1e-12);
    }

    #[test]
    fn reverse_sense_flips_the_contribution() {
        let mut db = MeshDb::new();
        let inner = db.create_meshset();
        let outer = db.create_meshset();
        let inner_surf = db.create_meshset();
        let outer_surf = db.create_meshset();
        db.add_child(inner, inner_surf).unwrap();
        db.add_child(outer, outer_surf).unwrap();
        db.add_child(outer, inner_surf).unwrap();
        // The shared surface faces into `inner`; `outer` sees it reversed.
        db.set_sense(inner_surf, [Some(inner), Some(outer)]).unwrap();
        db.set_sense(outer_surf, [Some(outer), None]).unwrap();
        add_box(
            &mut db,
            inner_surf,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
        );
        add_box(
            &mut db,
            outer_surf,
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(2.0, 2.0, 2.0),
        );

        assert_relative_eq!(enclosed_volume(&db, inner).unwrap(), 1.0, max_relative = 1e-12);
        // 27 total minus the unit void
        assert_relative_eq!(enclosed_volume(&db, outer).unwrap(), 26.0, max_relative = 1e-12);
    }

    #[test]
    fn box_area() {
        let mut db = MeshDb::new();
        let surface = db.create_meshset();
        add_box(
            &mut db,
            surface,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 3.0, 4.0),
        );

        // 2*(2*3 + 2*4 + 3*4) = 52
        assert_relative_eq!(surface_area(&db, surface).unwrap(), 52.0, max_relative = 1e-12);
    }
}
