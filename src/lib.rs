//! Four-fold symmetric direction fields ("cross fields") on triangle meshes.
//!
//! A cross field assigns to every edge of a triangulated surface
//! an orientation that is invariant under rotations by 90 degrees.
//! Such fields are used to align the elements of quadrilateral meshes.
//!
//! The field is discretized with Crouzeix–Raviart elements,
//! meaning there is one unknown per mesh edge.
//! Each unknown is a 2-vector encoding four times the cross angle
//! relative to the edge's own direction,
//! so that all four equivalent directions of a cross map to the same value.
//! Edges on the mesh boundary, on non-manifold junctions,
//! and on user-supplied line constraints are pinned to be aligned with the edge.
//! The remaining values are found by a fixed number of implicit heat diffusion steps
//! with a shrinking timestep, each followed by a projection back to unit length.
//!
//! The whole pipeline runs through [`compute_cross_field`]:
//! ```
//! use crossfield::{
//!     compute_cross_field, mesh::grid_mesh, solver::BiCgStab, view::ViewCollection,
//!     CrossFieldConfig,
//! };
//!
//! let mesh = grid_mesh(4, 4, true);
//! let mut views = ViewCollection::default();
//! let field = compute_cross_field(
//!     &mesh,
//!     &CrossFieldConfig::default(),
//!     &mut BiCgStab::default(),
//!     &mut views,
//! )?;
//! let angles = field.edge_to_angle();
//! assert_eq!(angles.len(), field.topology().edge_count());
//! assert!(views.get("crosses").is_some());
//! # Ok::<(), crossfield::CrossFieldError>(())
//! ```
//!
//! Logging goes through the [`log`] facade with the target [`LOG_TARGET`].

#![warn(missing_docs)]

pub mod geometry;

pub mod mesh;
#[doc(inline)]
pub use mesh::{topology::Topology, TriangleMesh};

pub mod assembly;

pub mod system;

pub mod solver;
#[doc(inline)]
pub use solver::LinearSolver;

pub mod diffusion;

pub mod field;
#[doc(inline)]
pub use field::CrossField;

pub mod view;
#[doc(inline)]
pub use view::ViewSink;

pub mod cross_field;
#[doc(inline)]
pub use cross_field::{
    compute_cross_field, CrossFieldConfig, CrossFieldError, DIFFUSION_ITERATIONS,
};

pub mod gmsh;

/// Target used for every log record emitted by this crate.
pub const LOG_TARGET: &str = "cross_field";

// nalgebra re-exports of common types for convenience

pub use nalgebra as na;
/// Type alias for a 3D `nalgebra` vector.
pub type Vec3 = na::Vector3<f64>;
/// Type alias for a 3D `nalgebra` unit vector.
pub type UnitVec3 = na::Unit<Vec3>;
