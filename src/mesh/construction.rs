use fixedbitset as fb;

use super::{ElementKind, MeshError, TriangleMesh};
use crate::Vec3;

/// Construct a mesh from densely indexed points,
/// checking that every element refers to an existing point.
pub fn build_mesh(
    points: Vec<Vec3>,
    lines: Vec<[usize; 2]>,
    triangles: Vec<[usize; 3]>,
) -> Result<TriangleMesh, MeshError> {
    let point_count = points.len();
    check_elements(&lines, &triangles, |kind, element, vertex| {
        if vertex < point_count {
            Ok(())
        } else {
            Err(MeshError::VertexOutOfBounds {
                kind,
                element,
                vertex,
                point_count,
            })
        }
    })?;

    Ok(TriangleMesh {
        points,
        lines,
        triangles,
    })
}

/// Construct a mesh from points with sparse ids.
///
/// Ids that were never given coordinates get a zero point as a placeholder,
/// which is fine as long as no element refers to them (checked here).
pub fn build_mesh_from_tagged(
    tagged_points: impl IntoIterator<Item = (usize, Vec3)>,
    lines: Vec<[usize; 2]>,
    triangles: Vec<[usize; 3]>,
) -> Result<TriangleMesh, MeshError> {
    let mut points: Vec<Vec3> = Vec::new();
    let mut defined = fb::FixedBitSet::default();
    for (id, point) in tagged_points {
        if id >= points.len() {
            points.resize(id + 1, Vec3::zeros());
            defined.grow(id + 1);
        }
        points[id] = point;
        defined.insert(id);
    }

    check_elements(&lines, &triangles, |kind, element, vertex| {
        if defined.contains(vertex) {
            Ok(())
        } else {
            Err(MeshError::UndefinedVertex {
                kind,
                element,
                vertex,
            })
        }
    })?;

    Ok(TriangleMesh {
        points,
        lines,
        triangles,
    })
}

fn check_elements(
    lines: &[[usize; 2]],
    triangles: &[[usize; 3]],
    check_vertex: impl Fn(ElementKind, usize, usize) -> Result<(), MeshError>,
) -> Result<(), MeshError> {
    for (element, line) in lines.iter().enumerate() {
        for &vertex in line {
            check_vertex(ElementKind::Line, element, vertex)?;
        }
    }
    for (element, tri) in triangles.iter().enumerate() {
        for &vertex in tri {
            check_vertex(ElementKind::Triangle, element, vertex)?;
        }
    }
    Ok(())
}

//
// small meshes for testing
//

/// A unit square in the xy-plane split into two triangles
/// along the diagonal from the origin:
///
/// ```text
/// 3 ___ 2
///  |  /|
///  | / |
///  |/__|
/// 0     1
/// ```
///
/// No line constraints are included.
///
/// This is public for visibility in doctests and integration tests.
/// It is not meant to be used by users and thus hidden from docs.
#[doc(hidden)]
pub fn unit_square_mesh() -> TriangleMesh {
    let points = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    #[rustfmt::skip]
    let triangles = vec![
        [0, 1, 2],
        [0, 2, 3],
    ];
    TriangleMesh {
        points,
        lines: Vec::new(),
        triangles,
    }
}

/// A flat rectangular grid of `nx` by `ny` unit squares in the xy-plane,
/// each split into two triangles along the diagonal
/// going up and to the right.
///
/// Vertex `(i, j)` is at `(i, j, 0)` and has the id `j * (nx + 1) + i`.
/// If `boundary_lines` is set, every edge on the outer boundary
/// is also included as a line constraint.
#[doc(hidden)]
pub fn grid_mesh(nx: usize, ny: usize, boundary_lines: bool) -> TriangleMesh {
    let vert_id = |i: usize, j: usize| j * (nx + 1) + i;

    let mut points = Vec::with_capacity((nx + 1) * (ny + 1));
    for j in 0..=ny {
        for i in 0..=nx {
            points.push(Vec3::new(i as f64, j as f64, 0.0));
        }
    }

    let mut triangles = Vec::with_capacity(2 * nx * ny);
    for j in 0..ny {
        for i in 0..nx {
            let (v00, v10) = (vert_id(i, j), vert_id(i + 1, j));
            let (v01, v11) = (vert_id(i, j + 1), vert_id(i + 1, j + 1));
            triangles.push([v00, v10, v11]);
            triangles.push([v00, v11, v01]);
        }
    }

    let mut lines = Vec::new();
    if boundary_lines {
        for i in 0..nx {
            lines.push([vert_id(i, 0), vert_id(i + 1, 0)]);
            lines.push([vert_id(i + 1, ny), vert_id(i, ny)]);
        }
        for j in 0..ny {
            lines.push([vert_id(nx, j), vert_id(nx, j + 1)]);
            lines.push([vert_id(0, j + 1), vert_id(0, j)]);
        }
    }

    TriangleMesh {
        points,
        lines,
        triangles,
    }
}

/// Three triangles sharing the edge between vertices 0 and 1,
/// making it non-manifold.
/// One triangle points up the y axis, one down, and one up the z axis.
#[doc(hidden)]
pub fn fan_mesh() -> TriangleMesh {
    let points = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.5, 1.0, 0.0),
        Vec3::new(0.5, -1.0, 0.0),
        Vec3::new(0.5, 0.0, 1.0),
    ];
    #[rustfmt::skip]
    let triangles = vec![
        [0, 1, 2],
        [1, 0, 3],
        [0, 1, 4],
    ];
    TriangleMesh {
        points,
        lines: Vec::new(),
        triangles,
    }
}

/// The closed surface of a tetrahedron, which has no boundary edges.
#[doc(hidden)]
pub fn tetrahedron_surface() -> TriangleMesh {
    let points = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
    ];
    #[rustfmt::skip]
    let triangles = vec![
        [0, 2, 1],
        [0, 1, 3],
        [1, 2, 3],
        [0, 3, 2],
    ];
    TriangleMesh {
        points,
        lines: Vec::new(),
        triangles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::relative_eq;

    #[test]
    fn out_of_bounds_vertices_are_rejected() {
        let points = vec![Vec3::zeros(); 3];
        let err = TriangleMesh::new(points.clone(), vec![[0, 3]], vec![[0, 1, 2]]).unwrap_err();
        assert_eq!(
            err,
            MeshError::VertexOutOfBounds {
                kind: ElementKind::Line,
                element: 0,
                vertex: 3,
                point_count: 3,
            }
        );

        let err =
            TriangleMesh::new(points.clone(), vec![], vec![[0, 1, 2], [2, 1, 7]]).unwrap_err();
        assert!(matches!(
            err,
            MeshError::VertexOutOfBounds {
                kind: ElementKind::Triangle,
                element: 1,
                vertex: 7,
                ..
            }
        ));

        assert!(TriangleMesh::new(points, vec![[0, 1]], vec![[0, 1, 2]]).is_ok());
    }

    #[test]
    fn sparse_tags_size_the_point_table() {
        let tagged = vec![
            (7, Vec3::new(0.0, 1.0, 0.0)),
            (2, Vec3::new(0.0, 0.0, 0.0)),
            (4, Vec3::new(1.0, 0.0, 0.0)),
        ];
        let mesh = TriangleMesh::from_tagged_points(tagged.clone(), vec![[2, 4]], vec![[2, 4, 7]])
            .unwrap();
        assert_eq!(mesh.points().len(), 8);
        assert_eq!(mesh.points()[7], Vec3::new(0.0, 1.0, 0.0));
        assert!(relative_eq!(mesh.triangle_area(0), 0.5));

        let err =
            TriangleMesh::from_tagged_points(tagged, vec![], vec![[2, 4, 5]]).unwrap_err();
        assert_eq!(
            err,
            MeshError::UndefinedVertex {
                kind: ElementKind::Triangle,
                element: 0,
                vertex: 5,
            }
        );
    }

    #[test]
    fn grid_mesh_is_correct() {
        let mesh = grid_mesh(3, 2, true);
        assert_eq!(mesh.points().len(), 12);
        assert_eq!(mesh.triangles().len(), 12);
        // perimeter of a 3x2 rectangle
        assert_eq!(mesh.lines().len(), 10);
        let total_area: f64 = (0..mesh.triangles().len())
            .map(|t| mesh.triangle_area(t))
            .sum();
        assert!(relative_eq!(total_area, 6.0));
        assert!(mesh.is_planar_xy(1e-12));
        // all triangles are oriented the same way
        for t in 0..mesh.triangles().len() {
            let n = mesh.triangle_normal(t, 1e-14).unwrap();
            assert!(relative_eq!(n.z, -1.0));
        }

        assert!(grid_mesh(2, 2, false).lines().is_empty());
    }

    #[test]
    fn non_planar_meshes_are_detected() {
        assert!(unit_square_mesh().is_planar_xy(1e-12));
        assert!(!fan_mesh().is_planar_xy(1e-12));
        assert!(!tetrahedron_surface().is_planar_xy(1e-12));
    }
}
