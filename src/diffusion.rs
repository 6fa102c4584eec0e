//! Heat diffusion of the edge unknowns with renormalization.
//!
//! Every step solves `(I + dt M⁻¹ K) x_next = x` for the free edges,
//! keeping the fixed edges at `(1, 0)`,
//! then projects every free edge value back onto the unit circle.
//! The timestep shrinks linearly from the square of the longest edge
//! to the square of the shortest one,
//! smoothing coarse features first and fine ones last.

use fixedbitset as fb;
use nalgebra as na;
use nalgebra_sparse as nas;

use crate::{
    solver::{LinearSolver, SolverError},
    system::{SystemBuilder, SystemError},
    LOG_TARGET,
};

/// Linearly decreasing timesteps over a fixed number of iterations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimestepSchedule {
    /// Timestep of the first iteration.
    pub first: f64,
    /// Timestep of the last iteration.
    pub last: f64,
    /// Number of iterations.
    pub iterations: usize,
}

impl TimestepSchedule {
    /// Schedule going from the squared longest edge length
    /// to the squared shortest edge length.
    pub fn from_edge_lengths(min_length: f64, max_length: f64, iterations: usize) -> Self {
        Self {
            first: max_length * max_length,
            last: min_length * min_length,
            iterations,
        }
    }

    /// Timestep of the `i`th iteration.
    ///
    /// A single-iteration schedule uses the first timestep.
    pub fn dt(&self, i: usize) -> f64 {
        if self.iterations <= 1 {
            return self.first;
        }
        let t = i as f64 / (self.iterations - 1) as f64;
        self.first + (self.last - self.first) * t
    }

    /// Iterate over all timesteps in order.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.iterations).map(|i| self.dt(i))
    }
}

/// The starting state: `(1, 0)` on fixed edges and zero elsewhere.
pub fn initial_state(edge_count: usize, dirichlet: &fb::FixedBitSet) -> na::DVector<f64> {
    let mut state = na::DVector::zeros(2 * edge_count);
    for edge in dirichlet.ones().filter(|&e| e < edge_count) {
        state[2 * edge] = 1.0;
    }
    state
}

/// Build the implicit diffusion operator for one timestep.
///
/// Free rows get `δ_ij + dt / mass_i · K_ij`,
/// rows of fixed edges become a lone unit diagonal.
pub fn diffusion_operator(
    stiffness: &nas::CsrMatrix<f64>,
    mass: &[f64],
    dirichlet: &fb::FixedBitSet,
    dt: f64,
) -> Result<nas::CsrMatrix<f64>, SystemError> {
    let mut builder = SystemBuilder::new(stiffness.nrows());
    for row in 0..stiffness.nrows() {
        builder.push_diagonal(row, 1.0);
    }
    for (row, col, &val) in stiffness.triplet_iter() {
        if dirichlet.contains(row / 2) {
            continue;
        }
        builder.push(row, col, dt / mass[row] * val);
    }
    builder.compact(0.0)
}

/// Project free edge values onto the unit circle
/// and reset fixed edges to exactly `(1, 0)`.
///
/// Free edges whose magnitude is not greater than `epsilon`
/// are left as they are.
pub fn renormalize(state: &mut na::DVector<f64>, dirichlet: &fb::FixedBitSet, epsilon: f64) {
    let edge_count = state.len() / 2;
    for edge in 0..edge_count {
        let (x, y) = (2 * edge, 2 * edge + 1);
        if dirichlet.contains(edge) {
            state[x] = 1.0;
            state[y] = 0.0;
            continue;
        }
        let len = state[x].hypot(state[y]);
        if len > epsilon {
            state[x] /= len;
            state[y] /= len;
        }
    }
}

/// A fully assembled diffusion problem.
#[derive(Clone, Debug)]
pub struct HeatDiffusion<'a> {
    /// Compacted stiffness matrix, two rows per edge.
    pub stiffness: &'a nas::CsrMatrix<f64>,
    /// Lumped mass per row.
    pub mass: &'a [f64],
    /// Edges held fixed at `(1, 0)`.
    pub dirichlet: &'a fb::FixedBitSet,
    /// Timestep per iteration.
    pub schedule: TimestepSchedule,
    /// Magnitude below which values aren't renormalized.
    pub epsilon: f64,
}

impl HeatDiffusion<'_> {
    /// Run every iteration of the schedule from the initial state.
    ///
    /// `on_iteration` is called with the iteration index
    /// and the renormalized state after each step;
    /// an error from it stops the diffusion.
    pub fn run<E>(
        &self,
        solver: &mut impl LinearSolver,
        mut on_iteration: impl FnMut(usize, &na::DVector<f64>) -> Result<(), E>,
    ) -> Result<na::DVector<f64>, E>
    where
        E: From<SolverError> + From<SystemError>,
    {
        let mut state = initial_state(self.stiffness.nrows() / 2, self.dirichlet);
        for (iteration, dt) in self.schedule.iter().enumerate() {
            log::info!(target: LOG_TARGET, iteration = iteration, dt = dt; "diffusion step");
            let operator = diffusion_operator(self.stiffness, self.mass, self.dirichlet, dt)
                .map_err(|err| {
                    log::error!(target: LOG_TARGET, iteration = iteration; "building the diffusion operator failed: {err}");
                    err
                })?;
            state = solver.solve(&operator, &state).map_err(|err| {
                log::error!(target: LOG_TARGET, iteration = iteration; "linear solve failed: {err}");
                err
            })?;
            renormalize(&mut state, self.dirichlet, self.epsilon);
            on_iteration(iteration, &state)?;
        }
        Ok(state)
    }
}
