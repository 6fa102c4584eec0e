//! Crouzeix–Raviart stiffness coefficients for the cross field.
//!
//! Each unique edge `e` owns the two unknowns `2e` and `2e + 1`,
//! the real and imaginary parts of `exp(4iθ)`,
//! where θ is the cross angle relative to the edge direction
//! (from the lower to the higher vertex id).
//! An interior edge is coupled to the four other edges
//! of its two incident triangles.
//! The coupling transports the neighbor's value into the edge's own frame
//! by rotating it by four times the angle between the two edges,
//! and weights it with the Crouzeix–Raviart cotangent weight
//! of the angle between them.

use fixedbitset as fb;
use itertools::izip;

use crate::{
    geometry,
    mesh::topology::{EdgeKind, Topology},
    system::SystemBuilder,
    TriangleMesh, Vec3, LOG_TARGET,
};

/// Error in computing stiffness coefficients.
///
/// These all indicate unusable input mesh quality,
/// except for [`AssemblyError::TopologyFault`]
/// which indicates a broken invariant in the edge tables.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AssemblyError {
    /// Stiffness coefficients are only defined for edges with exactly two triangles.
    #[error("edge {edge} has {occurrences} incident triangles, expected 2")]
    NotInterior {
        /// Index of the edge.
        edge: usize,
        /// Number of triangles on the edge.
        occurrences: usize,
    },
    /// An edge is too short to have a direction.
    #[error("edge {edge} ({v1} -> {v2}) is too short, length = {length}")]
    EdgeTooShort {
        /// Index of the edge.
        edge: usize,
        /// First vertex of the edge.
        v1: usize,
        /// Second vertex of the edge.
        v2: usize,
        /// Length of the edge.
        length: f64,
    },
    /// A triangle is too thin to have a normal.
    #[error("triangle {triangle} is degenerate, normal length = {normal_length}")]
    DegenerateTriangle {
        /// Index of the triangle.
        triangle: usize,
        /// Length of the unnormalized normal.
        normal_length: f64,
    },
    /// The local frame of an edge could not be constructed.
    #[error("edge {edge} has a degenerate frame in triangle {triangle}, length(e_y) = {length}")]
    DegenerateFrame {
        /// Index of the edge.
        edge: usize,
        /// Triangle the frame was built in.
        triangle: usize,
        /// Length of the out-of-edge frame vector.
        length: f64,
    },
    /// A neighboring edge doesn't share an endpoint with the edge.
    /// This can't happen with a correctly built [`Topology`].
    #[error("edge {edge} and its neighbor {neighbor} in triangle {triangle} share no vertex")]
    TopologyFault {
        /// Index of the edge.
        edge: usize,
        /// Index of the neighboring edge.
        neighbor: usize,
        /// Triangle containing both edges.
        triangle: usize,
    },
    /// The Crouzeix–Raviart weights of an edge sum to zero and can't be normalized.
    #[error("Crouzeix-Raviart weights of edge {edge} sum to {sum}")]
    DegenerateWeights {
        /// Index of the edge.
        edge: usize,
        /// Sum of the unnormalized weights.
        sum: f64,
    },
}

/// The coupling of one interior edge to its four neighbors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeStencil {
    /// The two other edges of the first incident triangle,
    /// followed by the two other edges of the second one.
    pub neighbors: [usize; 4],
    /// Angle in `[0, 2π)` of each neighbor's direction
    /// in the local frame of the edge.
    pub rotations: [f64; 4],
    /// Crouzeix–Raviart weights normalized to sum to -1.
    pub weights: [f64; 4],
}

impl EdgeStencil {
    /// Compute the stencil of an interior edge.
    pub fn compute(
        mesh: &TriangleMesh,
        topology: &Topology,
        edge: usize,
        epsilon: f64,
    ) -> Result<Self, AssemblyError> {
        let occurrences = topology.occurrences(edge);
        if occurrences.len() != 2 {
            return Err(AssemblyError::NotInterior {
                edge,
                occurrences: occurrences.len(),
            });
        }

        let [v1, v2] = topology.edge(edge);
        let e_x = geometry::normalize(mesh.edge_vector([v1, v2]), epsilon).map_err(|length| {
            AssemblyError::EdgeTooShort {
                edge,
                v1,
                v2,
                length,
            }
        })?;

        let mut neighbors = [0; 4];
        let mut rotations = [0.0; 4];
        let mut weights = [0.0; 4];
        let mut prev_normal: Option<Vec3> = None;

        for (side, occ) in occurrences.iter().enumerate() {
            let tri = occ.triangle;
            let mut normal = mesh
                .triangle_normal(tri, epsilon)
                .ok_or_else(|| AssemblyError::DegenerateTriangle {
                    triangle: tri,
                    normal_length: geometry::triangle_cross(&mesh.triangle_points(tri)).norm(),
                })?
                .into_inner();
            // orient the second triangle consistently with the first
            // so that the frames on both sides agree
            if matches!(prev_normal, Some(prev) if prev.dot(&normal) < 0.0) {
                normal = -normal;
            }
            prev_normal = Some(normal);

            let e_y = geometry::normalize(normal.cross(&e_x.into_inner()), epsilon).map_err(|length| {
                AssemblyError::DegenerateFrame {
                    edge,
                    triangle: tri,
                    length,
                }
            })?;

            for k in 0..2 {
                let slot = 2 * side + k;
                let neighbor = topology.edge_of(tri, (occ.local_edge + 1 + k) % 3);
                let [n1, n2] = topology.edge(neighbor);
                let dir = geometry::normalize(mesh.edge_vector([n1, n2]), epsilon).map_err(
                    |length| AssemblyError::EdgeTooShort {
                        edge: neighbor,
                        v1: n1,
                        v2: n2,
                        length,
                    },
                )?;
                neighbors[slot] = neighbor;
                rotations[slot] = geometry::angle_in_frame(&dir, &e_x, &e_y);

                // angle between the edges measured at their shared vertex
                let inner_angle = if n1 == v1 {
                    geometry::angle_between(&dir, &e_x)
                } else if n2 == v1 {
                    geometry::angle_between(&dir, &-e_x)
                } else if n1 == v2 {
                    geometry::angle_between(&-dir, &e_x)
                } else if n2 == v2 {
                    geometry::angle_between(&-dir, &-e_x)
                } else {
                    return Err(AssemblyError::TopologyFault {
                        edge,
                        neighbor,
                        triangle: tri,
                    });
                };
                weights[slot] = -2.0 / inner_angle.tan();
            }
        }

        let neg_sum = -weights.iter().sum::<f64>();
        if neg_sum.abs() <= epsilon {
            return Err(AssemblyError::DegenerateWeights {
                edge,
                sum: -neg_sum,
            });
        }
        for w in &mut weights {
            *w /= neg_sum;
        }

        Ok(Self {
            neighbors,
            rotations,
            weights,
        })
    }

    /// Append this stencil's coefficients for `edge` to a system.
    ///
    /// Each neighbor contributes a 2x2 block
    /// rotating by four times its angle, scaled by its weight,
    /// and the edge gets a unit diagonal.
    pub fn push_to(&self, edge: usize, system: &mut SystemBuilder) {
        let (x_i, y_i) = (2 * edge, 2 * edge + 1);
        system.push_diagonal(x_i, 1.0);
        system.push_diagonal(y_i, 1.0);
        for (&neighbor, &alpha, &w) in izip!(&self.neighbors, &self.rotations, &self.weights) {
            let (x_j, y_j) = (2 * neighbor, 2 * neighbor + 1);
            let (sin, cos) = (4.0 * alpha).sin_cos();
            system.push(x_i, x_j, w * cos);
            system.push(x_i, y_j, -w * sin);
            system.push(y_i, x_j, w * sin);
            system.push(y_i, y_j, w * cos);
        }
    }
}

/// Lumped mass of an interior edge,
/// one third of the total area of its two triangles.
pub fn lumped_mass(mesh: &TriangleMesh, topology: &Topology, edge: usize) -> f64 {
    topology
        .occurrences(edge)
        .iter()
        .map(|occ| mesh.triangle_area(occ.triangle))
        .sum::<f64>()
        / 3.0
}

/// Edges whose values are fixed rather than solved for.
///
/// These are all boundary and non-manifold edges,
/// plus every edge that coincides with a line constraint of the mesh.
/// Also returns the number of line constraints that matched no edge.
pub fn dirichlet_edges(mesh: &TriangleMesh, topology: &Topology) -> (fb::FixedBitSet, usize) {
    let mut dirichlet = fb::FixedBitSet::with_capacity(topology.edge_count());
    for edge in 0..topology.edge_count() {
        if topology.edge_kind(edge) != EdgeKind::Regular {
            dirichlet.insert(edge);
        }
    }
    let mut unmatched_lines = 0;
    for &[a, b] in mesh.lines() {
        match topology.find_edge(a, b) {
            Some(edge) => dirichlet.insert(edge),
            None => unmatched_lines += 1,
        }
    }
    (dirichlet, unmatched_lines)
}

/// Stiffness contributions and lumped masses of a whole mesh,
/// ready to be compacted into a matrix.
#[derive(Clone, Debug)]
pub struct Stiffness {
    /// Sparse contributions, two rows per edge.
    pub system: SystemBuilder,
    /// Lumped mass per row; 1 for the rows of fixed edges.
    pub mass: Vec<f64>,
}

/// Assemble the stiffness contributions of every edge.
///
/// Edges in `dirichlet` only get unit diagonals;
/// every other edge gets its full stencil.
pub fn assemble_stiffness(
    mesh: &TriangleMesh,
    topology: &Topology,
    dirichlet: &fb::FixedBitSet,
    epsilon: f64,
) -> Result<Stiffness, AssemblyError> {
    let unknowns = 2 * topology.edge_count();
    let mut system = SystemBuilder::new(unknowns);
    let mut mass = vec![1.0; unknowns];

    for edge in 0..topology.edge_count() {
        if dirichlet.contains(edge) {
            system.push_diagonal(2 * edge, 1.0);
            system.push_diagonal(2 * edge + 1, 1.0);
            continue;
        }
        let stencil = EdgeStencil::compute(mesh, topology, edge, epsilon).map_err(|err| {
            log::error!(target: LOG_TARGET, edge = edge; "failed to compute stiffness coefficients: {err}");
            err
        })?;
        stencil.push_to(edge, &mut system);

        let edge_mass = lumped_mass(mesh, topology, edge);
        mass[2 * edge] = edge_mass;
        mass[2 * edge + 1] = edge_mass;
    }

    Ok(Stiffness { system, mass })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{fan_mesh, grid_mesh, unit_square_mesh};
    use approx::{abs_diff_eq, relative_eq};
    use std::f64::consts::FRAC_PI_4;

    fn topology(mesh: &TriangleMesh) -> Topology {
        Topology::build(mesh.triangles(), mesh.points().len()).unwrap()
    }

    #[test]
    fn unit_square_diagonal_stencil() {
        let mesh = unit_square_mesh();
        let topo = topology(&mesh);
        let diagonal = topo.find_edge(0, 2).unwrap();
        let stencil = EdgeStencil::compute(&mesh, &topo, diagonal, 1e-14).unwrap();

        // the diagonal is local edge 2 of triangle [0, 1, 2],
        // followed by local edges 0 and 1;
        // in triangle [0, 2, 3] it's local edge 0, followed by 1 and 2
        let expected_neighbors = [
            topo.find_edge(0, 1).unwrap(),
            topo.find_edge(1, 2).unwrap(),
            topo.find_edge(2, 3).unwrap(),
            topo.find_edge(0, 3).unwrap(),
        ];
        assert_eq!(stencil.neighbors, expected_neighbors);

        // all sides meet the diagonal at 45 degrees,
        // so all weights are equal
        for w in stencil.weights {
            assert!(relative_eq!(w, -0.25), "weights {:?}", stencil.weights);
        }
        // the sides are at odd multiples of 45 degrees from the diagonal,
        // so the 4-fold rotation flips the sign
        for alpha in stencil.rotations {
            let quarter_turns = alpha / FRAC_PI_4;
            assert!(
                abs_diff_eq!(quarter_turns, quarter_turns.round(), epsilon = 1e-12)
                    && quarter_turns.round() as i64 % 2 == 1,
                "rotations {:?}",
                stencil.rotations
            );
            assert!(relative_eq!((4.0 * alpha).cos(), -1.0));
        }
    }

    #[test]
    fn weights_sum_to_minus_one() {
        // skew the grid so that angles aren't all 45 or 90 degrees
        let mut mesh = grid_mesh(3, 3, false);
        let skewed: Vec<Vec3> = mesh
            .points()
            .iter()
            .map(|p| Vec3::new(p.x + 0.3 * p.y + 0.05 * p.x * p.x, p.y, 0.1 * p.x * p.y))
            .collect();
        mesh = TriangleMesh::new(skewed, vec![], mesh.triangles().to_vec()).unwrap();
        let topo = topology(&mesh);

        let mut interior_count = 0;
        for edge in 0..topo.edge_count() {
            if topo.edge_kind(edge) != EdgeKind::Regular {
                continue;
            }
            interior_count += 1;
            let stencil = EdgeStencil::compute(&mesh, &topo, edge, 1e-14).unwrap();
            let sum: f64 = stencil.weights.iter().sum();
            assert!(relative_eq!(sum, -1.0, epsilon = 1e-12), "edge {edge}: sum {sum}");
            for alpha in stencil.rotations {
                assert!((0.0..std::f64::consts::TAU).contains(&alpha));
            }
        }
        assert_eq!(interior_count, 33 - 12);
    }

    #[test]
    fn boundary_edges_have_no_stencil() {
        let mesh = unit_square_mesh();
        let topo = topology(&mesh);
        let side = topo.find_edge(0, 1).unwrap();
        assert_eq!(
            EdgeStencil::compute(&mesh, &topo, side, 1e-14).unwrap_err(),
            AssemblyError::NotInterior {
                edge: side,
                occurrences: 1
            }
        );
    }

    #[test]
    fn degenerate_geometry_is_reported() {
        // two triangles sharing an edge whose endpoints coincide in space
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let mesh = TriangleMesh::new(points, vec![], vec![[0, 1, 2], [1, 0, 3]]).unwrap();
        let topo = topology(&mesh);
        let shared = topo.find_edge(0, 1).unwrap();
        assert!(matches!(
            EdgeStencil::compute(&mesh, &topo, shared, 1e-14),
            Err(AssemblyError::EdgeTooShort { edge, .. }) if edge == shared
        ));

        // a flat triangle next to a good one
        let points = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.5, 1.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
        ];
        let mesh = TriangleMesh::new(points, vec![], vec![[0, 1, 2], [1, 0, 3]]).unwrap();
        let topo = topology(&mesh);
        let shared = topo.find_edge(0, 1).unwrap();
        assert!(matches!(
            EdgeStencil::compute(&mesh, &topo, shared, 1e-14),
            Err(AssemblyError::DegenerateTriangle { triangle: 1, .. })
        ));
    }

    #[test]
    fn unit_square_system() {
        let mesh = unit_square_mesh();
        let topo = topology(&mesh);
        let (dirichlet, unmatched) = dirichlet_edges(&mesh, &topo);
        assert_eq!(unmatched, 0);
        // everything but the diagonal is on the boundary
        let diagonal = topo.find_edge(0, 2).unwrap();
        assert_eq!(dirichlet.count_ones(..), 4);
        assert!(!dirichlet.contains(diagonal));

        let stiffness = assemble_stiffness(&mesh, &topo, &dirichlet, 1e-14).unwrap();
        assert!(relative_eq!(stiffness.mass[2 * diagonal], 1.0 / 3.0));
        assert!(relative_eq!(stiffness.mass[2 * diagonal + 1], 1.0 / 3.0));
        assert_eq!(stiffness.mass.iter().filter(|&&m| m == 1.0).count(), 8);

        let mat = stiffness.system.compact(1e-14).unwrap();
        assert_eq!(mat.nrows(), 10);
        // each fixed row only has its diagonal
        for edge in dirichlet.ones() {
            for row in [2 * edge, 2 * edge + 1] {
                assert_eq!(mat.row(row).col_indices(), &[row]);
                assert_eq!(mat.row(row).values(), &[1.0]);
            }
        }
        // the diagonal's real part couples to the real parts of all four sides
        // with weight -1/4 rotated by 180 degrees;
        // the imaginary couplings are tiny and dropped
        let real_row = mat.row(2 * diagonal);
        let mut expected_cols: Vec<usize> = dirichlet.ones().map(|e| 2 * e).collect();
        expected_cols.push(2 * diagonal);
        expected_cols.sort_unstable();
        assert_eq!(real_row.col_indices(), &expected_cols[..]);
        for (&col, &val) in izip!(real_row.col_indices(), real_row.values()) {
            let expected = if col == 2 * diagonal { 1.0 } else { 0.25 };
            assert!(relative_eq!(val, expected), "col {col}: {val}");
        }
    }

    #[test]
    fn lines_and_non_manifold_edges_are_fixed() {
        let mesh = grid_mesh(2, 2, true);
        let topo = topology(&mesh);
        let (dirichlet, unmatched) = dirichlet_edges(&mesh, &topo);
        assert_eq!(unmatched, 0);
        // lines coincide with the boundary here
        assert_eq!(dirichlet.count_ones(..), 8);

        let with_stray_line = TriangleMesh::new(
            mesh.points().to_vec(),
            vec![[4, 0], [0, 8]],
            mesh.triangles().to_vec(),
        )
        .unwrap();
        let (dirichlet, unmatched) = dirichlet_edges(&with_stray_line, &topo);
        // the diagonal 0-4 is interior, 0-8 is not an edge
        assert_eq!(unmatched, 1);
        assert!(dirichlet.contains(topo.find_edge(0, 4).unwrap()));
        assert_eq!(dirichlet.count_ones(..), 9);

        let fan = fan_mesh();
        let fan_topo = topology(&fan);
        let (dirichlet, _) = dirichlet_edges(&fan, &fan_topo);
        // every edge of the fan is either boundary or non-manifold
        assert_eq!(dirichlet.count_ones(..), fan_topo.edge_count());
    }
}
