//! The full cross field computation from a mesh to a [`CrossField`].

use itertools::Itertools;

use crate::{
    assembly::{self, AssemblyError},
    diffusion::{self, HeatDiffusion, TimestepSchedule},
    field::CrossField,
    gmsh::GmshError,
    mesh::{topology::TopologyError, MeshError},
    solver::{LinearSolver, SolverError},
    system::SystemError,
    view::{ViewError, ViewSink},
    Topology, TriangleMesh, LOG_TARGET,
};

/// Number of heat diffusion steps taken.
pub const DIFFUSION_ITERATIONS: usize = 10;

/// Name of the final view of crosses on edges.
pub const CROSSES_VIEW: &str = "crosses";
/// Name of the vertex-averaged planar representative view.
pub const PLANAR_VIEW: &str = "crosses_rep_planar";

/// Parameters of a cross field computation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CrossFieldConfig {
    /// Lengths and magnitudes not greater than this are treated as zero.
    pub epsilon: f64,
    /// Emit a view named `crosses_<i>` after every diffusion step `i`.
    pub iteration_views: bool,
    /// Emit the `crosses_rep_planar` view if the mesh lies in the xy-plane.
    pub planar_representatives: bool,
    /// How far from the z axis triangle normals may deviate
    /// for the mesh to count as planar.
    pub planarity_tolerance: f64,
}

impl Default for CrossFieldConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-14,
            iteration_views: false,
            planar_representatives: true,
            planarity_tolerance: 1e-9,
        }
    }
}

/// Error in computing a cross field.
#[derive(thiserror::Error, Debug)]
pub enum CrossFieldError {
    /// Loading the mesh failed.
    #[error(transparent)]
    Gmsh(#[from] GmshError),
    /// The mesh is invalid.
    #[error(transparent)]
    Mesh(#[from] MeshError),
    /// The edge topology could not be built.
    #[error("failed to compute mesh adjacencies: {0}")]
    Topology(#[from] TopologyError),
    /// The mesh has no edges at all.
    #[error("the mesh has no edges")]
    NoEdges,
    /// No edge is fixed, so the field is undetermined.
    #[error("no boundary conditions: the mesh has no boundary, non-manifold or line edges")]
    NoBoundaryConditions,
    /// Every edge is fixed, leaving nothing to compute.
    #[error("no interior edges: every edge has a boundary condition")]
    NoInteriorEdges,
    /// Computing stiffness coefficients failed.
    #[error("failed to compute stiffness matrix coefficients: {0}")]
    Assembly(#[from] AssemblyError),
    /// Building the sparse system failed.
    #[error("failed to prepare system: {0}")]
    System(#[from] SystemError),
    /// A diffusion step failed to solve.
    #[error("failed to solve linear system: {0}")]
    Solver(#[from] SolverError),
    /// Emitting a view failed.
    #[error("failed to emit view: {0}")]
    View(#[from] ViewError),
}

/// Minimum, average and maximum of a set of edge lengths.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EdgeLengthStats {
    /// Shortest edge length.
    pub min: f64,
    /// Average edge length.
    pub avg: f64,
    /// Longest edge length.
    pub max: f64,
}

impl EdgeLengthStats {
    /// Compute the statistics over every edge of a topology,
    /// `None` if there are no edges.
    pub fn compute(mesh: &TriangleMesh, topology: &Topology) -> Option<Self> {
        let lengths = topology
            .edges()
            .iter()
            .map(|&edge| mesh.edge_vector(edge).norm());
        let (min, max) = lengths.clone().minmax().into_option()?;
        let avg = lengths.sum::<f64>() / topology.edge_count() as f64;
        Some(Self { min, avg, max })
    }
}

fn logged(err: impl Into<CrossFieldError>) -> CrossFieldError {
    let err = err.into();
    log::error!(target: LOG_TARGET, "{err}");
    err
}

/// Compute a cross field on a triangle mesh.
///
/// Boundary edges, non-manifold edges and edges matching a line of the mesh
/// are fixed to crosses aligned with the edge.
/// The rest of the field is smoothed out from these
/// by [`DIFFUSION_ITERATIONS`] steps of heat diffusion with renormalization,
/// each step solved with `solver`.
///
/// Views of the field are emitted to `views`:
/// one named `crosses_<i>` per step if [`CrossFieldConfig::iteration_views`] is set,
/// the final [`CROSSES_VIEW`],
/// and the [`PLANAR_VIEW`] for meshes in the xy-plane
/// if [`CrossFieldConfig::planar_representatives`] is set.
pub fn compute_cross_field<S, V>(
    mesh: &TriangleMesh,
    config: &CrossFieldConfig,
    solver: &mut S,
    views: &mut V,
) -> Result<CrossField, CrossFieldError>
where
    S: LinearSolver,
    V: ViewSink,
{
    log::info!(
        target: LOG_TARGET,
        points = mesh.points().len(),
        lines = mesh.lines().len(),
        triangles = mesh.triangles().len();
        "computing cross field with heat diffusion and projection"
    );

    let topology = Topology::build(mesh.triangles(), mesh.points().len()).map_err(logged)?;
    let edge_count = topology.edge_count();
    log::info!(target: LOG_TARGET, edges = edge_count; "computed mesh adjacencies");
    if edge_count == 0 {
        return Err(logged(CrossFieldError::NoEdges));
    }

    let (dirichlet, unmatched_lines) = assembly::dirichlet_edges(mesh, &topology);
    let fixed_count = dirichlet.count_ones(..);
    log::info!(target: LOG_TARGET, fixed = fixed_count; "boundary conditions: crosses fixed on edges");
    if unmatched_lines > 0 {
        log::info!(target: LOG_TARGET, lines = unmatched_lines; "ignored lines that match no edge");
    }
    if fixed_count == 0 {
        return Err(logged(CrossFieldError::NoBoundaryConditions));
    }
    if fixed_count == edge_count {
        return Err(logged(CrossFieldError::NoInteriorEdges));
    }

    log::info!(target: LOG_TARGET, "computing stiffness matrix coefficients (Crouzeix-Raviart)");
    let stiffness = assembly::assemble_stiffness(mesh, &topology, &dirichlet, config.epsilon)?;

    let Some(lengths) = EdgeLengthStats::compute(mesh, &topology) else {
        return Err(logged(CrossFieldError::NoEdges));
    };
    log::info!(
        target: LOG_TARGET,
        min = lengths.min,
        avg = lengths.avg,
        max = lengths.max;
        "edge size"
    );

    let stiffness_matrix = stiffness.system.compact(config.epsilon).map_err(logged)?;

    log::info!(
        target: LOG_TARGET,
        iterations = DIFFUSION_ITERATIONS,
        unknowns = 2 * edge_count;
        "heat diffusion and projection loop"
    );
    let mut field = CrossField::new(
        topology,
        dirichlet.clone(),
        diffusion::initial_state(edge_count, &dirichlet),
        config.epsilon,
    );
    let heat = HeatDiffusion {
        stiffness: &stiffness_matrix,
        mass: &stiffness.mass,
        dirichlet: &dirichlet,
        schedule: TimestepSchedule::from_edge_lengths(
            lengths.min,
            lengths.max,
            DIFFUSION_ITERATIONS,
        ),
        epsilon: config.epsilon,
    };
    let final_state = heat.run(solver, |iteration, state| {
        if config.iteration_views {
            field.values_mut().copy_from(state);
            views
                .add_view(&format!("crosses_{iteration}"), field.cross_glyphs(mesh))
                .map_err(logged)?;
        }
        Ok::<(), CrossFieldError>(())
    })?;
    *field.values_mut() = final_state;

    let zero_count = (0..edge_count)
        .filter(|&edge| !field.is_dirichlet(edge) && field.magnitude(edge) <= config.epsilon)
        .count();
    if zero_count > 0 {
        log::warn!(target: LOG_TARGET, edges = zero_count; "edges with a zero cross after diffusion");
    }

    log::info!(target: LOG_TARGET, "creating visualization view with crosses");
    views
        .add_view(CROSSES_VIEW, field.cross_glyphs(mesh))
        .map_err(logged)?;
    if config.planar_representatives {
        if mesh.is_planar_xy(config.planarity_tolerance) {
            views
                .add_view(PLANAR_VIEW, field.planar_representatives(mesh))
                .map_err(logged)?;
        } else {
            log::warn!(target: LOG_TARGET, "mesh is not in the xy-plane, skipping planar representative view");
        }
    }

    log::info!(target: LOG_TARGET, "cross field done");
    Ok(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mesh::{grid_mesh, tetrahedron_surface, unit_square_mesh},
        solver::{BiCgStab, DenseLu},
        view::{DiscardViews, ViewCollection},
    };
    use approx::relative_eq;
    use std::f64::consts::FRAC_PI_4;

    #[test]
    fn unit_square_diagonal_is_axis_aligned() {
        let mesh = unit_square_mesh();
        let mut views = ViewCollection::default();
        let field = compute_cross_field(
            &mesh,
            &CrossFieldConfig::default(),
            &mut DenseLu,
            &mut views,
        )
        .unwrap();

        let angles = field.edge_to_angle();
        // ±π/4 are the same cross
        assert!(relative_eq!(angles[&(0, 2)].abs(), FRAC_PI_4, epsilon = 1e-12));
        for side in [(0, 1), (0, 3), (1, 2), (2, 3)] {
            assert_eq!(angles[&side], 0.0);
        }
        itertools::assert_equal(views.names(), [CROSSES_VIEW, PLANAR_VIEW]);
    }

    #[test]
    fn iteration_views_are_emitted() {
        let mesh = grid_mesh(3, 2, false);
        let config = CrossFieldConfig {
            iteration_views: true,
            ..Default::default()
        };
        let mut views = ViewCollection::default();
        compute_cross_field(&mesh, &config, &mut BiCgStab::default(), &mut views).unwrap();

        let expected_names: Vec<String> = (0..DIFFUSION_ITERATIONS)
            .map(|i| format!("crosses_{i}"))
            .chain([CROSSES_VIEW.to_string(), PLANAR_VIEW.to_string()])
            .collect();
        itertools::assert_equal(views.names(), expected_names.iter().map(String::as_str));
        let last_iteration = views.get(&format!("crosses_{}", DIFFUSION_ITERATIONS - 1));
        assert_eq!(last_iteration, views.get(CROSSES_VIEW));
    }

    #[test]
    fn non_planar_meshes_skip_planar_view() {
        // fold the grid along x = 1
        let flat = grid_mesh(2, 2, false);
        let folded: Vec<crate::Vec3> = flat
            .points()
            .iter()
            .map(|p| crate::Vec3::new(p.x.min(1.0), p.y, (p.x - 1.0).max(0.0)))
            .collect();
        let mesh = TriangleMesh::new(folded, vec![], flat.triangles().to_vec()).unwrap();
        let mut views = ViewCollection::default();
        compute_cross_field(
            &mesh,
            &CrossFieldConfig::default(),
            &mut DenseLu,
            &mut views,
        )
        .unwrap();
        itertools::assert_equal(views.names(), [CROSSES_VIEW]);
    }

    #[test]
    fn malformed_inputs_fail() {
        let config = CrossFieldConfig::default();

        let empty = TriangleMesh::new(vec![], vec![], vec![]).unwrap();
        assert!(matches!(
            compute_cross_field(&empty, &config, &mut DenseLu, &mut DiscardViews),
            Err(CrossFieldError::NoEdges)
        ));

        let square = unit_square_mesh();
        let fully_constrained =
            TriangleMesh::new(square.points().to_vec(), vec![[2, 0]], square.triangles().to_vec())
                .unwrap();
        assert!(matches!(
            compute_cross_field(&fully_constrained, &config, &mut DenseLu, &mut DiscardViews),
            Err(CrossFieldError::NoInteriorEdges)
        ));

        assert!(matches!(
            compute_cross_field(&tetrahedron_surface(), &config, &mut DenseLu, &mut DiscardViews),
            Err(CrossFieldError::NoBoundaryConditions)
        ));
    }

    #[test]
    fn wrapped_errors_keep_their_details() {
        let err = Topology::build(&[[0, 1, 5]], 3).unwrap_err();
        let message = CrossFieldError::from(err).to_string();
        assert_eq!(
            message,
            "failed to compute mesh adjacencies: \
             triangle 0 refers to vertex 5, but there are only 3 vertices"
        );

        let err = SolverError::Breakdown { iteration: 7 };
        let message = CrossFieldError::from(err.clone()).to_string();
        assert!(message.ends_with(&err.to_string()), "{message}");
    }

    #[test]
    fn edge_length_statistics() {
        let mesh = grid_mesh(2, 1, false);
        let topo = Topology::build(mesh.triangles(), mesh.points().len()).unwrap();
        let stats = EdgeLengthStats::compute(&mesh, &topo).unwrap();
        assert_eq!(stats.min, 1.0);
        assert!(relative_eq!(stats.max, 2.0f64.sqrt()));
        // 7 unit edges and 2 diagonals
        assert!(relative_eq!(stats.avg, (7.0 + 2.0 * 2.0f64.sqrt()) / 9.0));

        let empty = Topology::build(&[], 0).unwrap();
        assert_eq!(EdgeLengthStats::compute(&mesh, &empty), None);
    }
}
