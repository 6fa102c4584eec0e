//! The computed cross field and everything derived from it.

use std::collections::BTreeMap;

use fixedbitset as fb;
use nalgebra as na;

use crate::{mesh::topology::Topology, view::VectorGlyph, TriangleMesh, UnitVec3, Vec3};

/// A cross field over the edges of a triangle mesh.
///
/// Each edge stores the vector `(cos 4θ, sin 4θ)`
/// where θ is the angle of one of the cross's four branches
/// relative to the edge direction (from the lower to the higher vertex id),
/// measured in the plane of the edge's incident triangles.
/// Any of the four branches gives the same vector,
/// which is why the field is solved for in this form.
#[derive(Clone, Debug)]
pub struct CrossField {
    topology: Topology,
    dirichlet: fb::FixedBitSet,
    values: na::DVector<f64>,
    epsilon: f64,
}

/// Local frame of an edge for turning angles into world-space vectors.
struct EdgeFrame {
    /// unit edge direction
    tangent: UnitVec3,
    /// in-surface direction perpendicular to the edge
    bitangent: UnitVec3,
    /// unit surface normal
    normal: UnitVec3,
}

impl CrossField {
    /// Wrap solved edge values.
    ///
    /// `values` must have two entries per edge of `topology`.
    pub(crate) fn new(
        topology: Topology,
        dirichlet: fb::FixedBitSet,
        values: na::DVector<f64>,
        epsilon: f64,
    ) -> Self {
        debug_assert_eq!(values.len(), 2 * topology.edge_count());
        Self {
            topology,
            dirichlet,
            values,
            epsilon,
        }
    }

    /// The edge topology the field is defined on.
    #[inline]
    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Raw edge values, real part of edge `e` at `2e` and imaginary part at `2e + 1`.
    #[inline]
    pub fn values(&self) -> &na::DVector<f64> {
        &self.values
    }

    pub(crate) fn values_mut(&mut self) -> &mut na::DVector<f64> {
        &mut self.values
    }

    /// Whether an edge was held fixed during the computation.
    #[inline]
    pub fn is_dirichlet(&self, edge: usize) -> bool {
        self.dirichlet.contains(edge)
    }

    /// The set of edges held fixed during the computation.
    #[inline]
    pub fn dirichlet(&self) -> &fb::FixedBitSet {
        &self.dirichlet
    }

    /// Magnitude of an edge's value.
    #[inline]
    pub fn magnitude(&self, edge: usize) -> f64 {
        self.values[2 * edge].hypot(self.values[2 * edge + 1])
    }

    /// Cross angle of an edge relative to the edge direction, in `(-π/4, π/4]`.
    ///
    /// Edges with a magnitude not greater than epsilon have no meaningful angle
    /// and get zero.
    pub fn angle(&self, edge: usize) -> f64 {
        let len = self.magnitude(edge);
        if len > self.epsilon {
            let (x, y) = (self.values[2 * edge] / len, self.values[2 * edge + 1] / len);
            y.atan2(x) / 4.0
        } else {
            0.0
        }
    }

    /// Cross angles of all edges in edge order.
    pub fn angles(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.topology.edge_count()).map(|edge| self.angle(edge))
    }

    /// Map from each edge's vertex pair (in ascending order) to its cross angle.
    pub fn edge_to_angle(&self) -> BTreeMap<(usize, usize), f64> {
        let mut map = BTreeMap::new();
        self.fill_edge_to_angle(&mut map);
        map
    }

    /// Insert every edge's cross angle into an existing map,
    /// replacing previous entries for the same vertex pairs.
    pub fn fill_edge_to_angle(&self, map: &mut BTreeMap<(usize, usize), f64>) {
        for (&[a, b], angle) in self.topology.edges().iter().zip(self.angles()) {
            map.insert((a, b), angle);
        }
    }

    fn edge_frame(&self, mesh: &TriangleMesh, edge: usize) -> Option<EdgeFrame> {
        let mut normals = self
            .topology
            .occurrences(edge)
            .iter()
            .filter_map(|occ| mesh.triangle_normal(occ.triangle, self.epsilon));
        let first = normals.next()?.into_inner();
        // only regular edges average their normals;
        // boundary and non-manifold edges use the first triangle
        let avg = match (self.topology.occurrences(edge).len(), normals.next()) {
            (2, Some(second)) => {
                let second = second.into_inner();
                if first.dot(&second) < 0.0 {
                    first - second
                } else {
                    first + second
                }
            }
            _ => first,
        };
        let normal = na::Unit::try_new(avg, self.epsilon)?;
        let tangent = na::Unit::try_new(mesh.edge_vector(self.topology.edge(edge)), self.epsilon)?;
        let bitangent = na::Unit::try_new(normal.cross(&tangent.into_inner()), self.epsilon)?;
        Some(EdgeFrame {
            tangent,
            bitangent,
            normal,
        })
    }

    /// World-space unit direction of one branch of an edge's cross,
    /// or `None` if the edge's value is zero or its geometry is degenerate.
    pub fn cross_direction(&self, mesh: &TriangleMesh, edge: usize) -> Option<Vec3> {
        if self.magnitude(edge) <= self.epsilon {
            return None;
        }
        let frame = self.edge_frame(mesh, edge)?;
        let (sin, cos) = self.angle(edge).sin_cos();
        Some(cos * frame.tangent.into_inner() + sin * frame.bitangent.into_inner())
    }

    /// [`cross_direction`][Self::cross_direction] for every edge in edge order.
    pub fn cross_directions(&self, mesh: &TriangleMesh) -> Vec<Option<Vec3>> {
        (0..self.topology.edge_count())
            .map(|edge| self.cross_direction(mesh, edge))
            .collect()
    }

    /// Two perpendicular branches of the cross at the midpoint of every edge,
    /// scaled by the edge's value magnitude.
    ///
    /// Edges without a cross direction are skipped.
    pub fn cross_glyphs(&self, mesh: &TriangleMesh) -> Vec<VectorGlyph> {
        let mut glyphs = Vec::with_capacity(2 * self.topology.edge_count());
        for edge in 0..self.topology.edge_count() {
            let Some(frame) = self.edge_frame(mesh, edge) else {
                continue;
            };
            let Some(dir) = self.cross_direction(mesh, edge) else {
                continue;
            };
            let point = mesh.edge_midpoint(self.topology.edge(edge));
            let branch = self.magnitude(edge) * dir;
            glyphs.push(VectorGlyph {
                point,
                vector: branch,
            });
            glyphs.push(VectorGlyph {
                point,
                vector: frame.normal.cross(&branch),
            });
        }
        glyphs
    }

    /// Vertex-averaged representative vectors of the cross field in the xy-plane.
    ///
    /// For every edge with a cross direction,
    /// the global angle φ of the direction in the xy-plane
    /// is encoded as `(cos 4φ, sin 4φ, 0)`,
    /// and every vertex gets the average over its edges.
    /// This only makes sense for meshes lying in the xy-plane.
    pub fn planar_representatives(&self, mesh: &TriangleMesh) -> Vec<VectorGlyph> {
        let mut sums = vec![Vec3::zeros(); mesh.points().len()];
        let mut counts = vec![0usize; mesh.points().len()];
        for (edge, dir) in self.cross_directions(mesh).into_iter().enumerate() {
            let Some(dir) = dir else {
                continue;
            };
            let phi = dir.y.atan2(dir.x);
            let (sin, cos) = (4.0 * phi).sin_cos();
            for vert in self.topology.edge(edge) {
                sums[vert] += Vec3::new(cos, sin, 0.0);
                counts[vert] += 1;
            }
        }

        itertools::izip!(mesh.points(), sums, counts)
            .filter(|(_, _, count)| *count > 0)
            .map(|(&point, sum, count)| VectorGlyph {
                point,
                vector: sum / count as f64,
            })
            .collect()
    }
}
