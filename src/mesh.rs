//! The input data structure, a triangle mesh with optional line constraints.

/// Low-level mesh construction, validation, and small meshes used in tests.
mod construction;
/// re-export the testing meshes for use in other modules' tests
/// (pub because they're also used in doctests and integration tests)
#[doc(hidden)]
pub use construction::{fan_mesh, grid_mesh, tetrahedron_surface, unit_square_mesh};

pub mod topology;

use crate::{geometry, UnitVec3, Vec3};

/// A triangulated surface in 3D space.
///
/// Vertices are identified by their index in [`points`][Self::points].
/// Line elements are pairs of vertex ids marking edges
/// where the cross field must be aligned with the edge
/// (typically curves of the underlying geometry).
///
/// The mesh is read-only once constructed;
/// every vertex id referenced by a line or triangle
/// is guaranteed to be a valid index into the points.
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    points: Vec<Vec3>,
    lines: Vec<[usize; 2]>,
    triangles: Vec<[usize; 3]>,
}

/// Error in constructing a [`TriangleMesh`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// An element refers to a vertex that doesn't exist.
    #[error("{kind} {element} refers to vertex {vertex}, but the mesh has {point_count} points")]
    VertexOutOfBounds {
        /// Which kind of element had the invalid vertex.
        kind: ElementKind,
        /// Index of the element.
        element: usize,
        /// The invalid vertex id.
        vertex: usize,
        /// Number of points in the mesh.
        point_count: usize,
    },
    /// An element refers to a vertex id that was never given coordinates.
    #[error("{kind} {element} refers to vertex {vertex}, which has no coordinates")]
    UndefinedVertex {
        /// Which kind of element had the invalid vertex.
        kind: ElementKind,
        /// Index of the element.
        element: usize,
        /// The vertex id without coordinates.
        vertex: usize,
    },
}

/// The kinds of elements a [`TriangleMesh`] is made of.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// A line segment constraint.
    Line,
    /// A triangle.
    Triangle,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Line => write!(f, "line"),
            Self::Triangle => write!(f, "triangle"),
        }
    }
}

impl TriangleMesh {
    /// Construct a mesh from points indexed by position
    /// and elements referring to those indices.
    pub fn new(
        points: Vec<Vec3>,
        lines: Vec<[usize; 2]>,
        triangles: Vec<[usize; 3]>,
    ) -> Result<Self, MeshError> {
        construction::build_mesh(points, lines, triangles)
    }

    /// Construct a mesh from points with possibly sparse, unordered ids.
    ///
    /// The point table is sized to fit the largest id,
    /// and elements may only refer to ids that were given coordinates.
    /// This is the form in which mesh files such as gmsh's `.msh` provide their nodes.
    pub fn from_tagged_points(
        points: impl IntoIterator<Item = (usize, Vec3)>,
        lines: Vec<[usize; 2]>,
        triangles: Vec<[usize; 3]>,
    ) -> Result<Self, MeshError> {
        construction::build_mesh_from_tagged(points, lines, triangles)
    }

    /// All points of the mesh, indexed by vertex id.
    #[inline]
    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    /// Line constraints of the mesh.
    #[inline]
    pub fn lines(&self) -> &[[usize; 2]] {
        &self.lines
    }

    /// Triangles of the mesh.
    #[inline]
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    /// Get the corner points of a triangle.
    #[inline]
    pub fn triangle_points(&self, triangle: usize) -> [Vec3; 3] {
        self.triangles[triangle].map(|v| self.points[v])
    }

    /// Unsigned area of a triangle.
    #[inline]
    pub fn triangle_area(&self, triangle: usize) -> f64 {
        geometry::triangle_area(&self.triangle_points(triangle))
    }

    /// Unit normal of a triangle, `None` if the triangle is degenerate.
    ///
    /// See [`geometry::triangle_normal`] for the orientation convention.
    #[inline]
    pub fn triangle_normal(&self, triangle: usize, epsilon: f64) -> Option<UnitVec3> {
        geometry::triangle_normal(&self.triangle_points(triangle), epsilon)
    }

    /// Vector from the first to the second vertex of an edge.
    #[inline]
    pub fn edge_vector(&self, edge: [usize; 2]) -> Vec3 {
        self.points[edge[1]] - self.points[edge[0]]
    }

    /// Midpoint of an edge.
    #[inline]
    pub fn edge_midpoint(&self, edge: [usize; 2]) -> Vec3 {
        0.5 * (self.points[edge[0]] + self.points[edge[1]])
    }

    /// Check whether every triangle is parallel to the xy-plane,
    /// i.e. all normals are within `tolerance` of the z axis.
    ///
    /// Degenerate triangles are ignored.
    pub fn is_planar_xy(&self, tolerance: f64) -> bool {
        (0..self.triangles.len())
            .filter_map(|t| self.triangle_normal(t, 0.0))
            .all(|n| n.x.abs() <= tolerance && n.y.abs() <= tolerance)
    }
}
