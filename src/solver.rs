// fans-core - distributed FFT-accelerated voxel FEM solver kernel
// Copyright (C) 2026 the fans-core contributors

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Orchestrates the per-iteration primitives an external fixed-point or
//! Krylov driver calls: residual assembly, convolution, error measurement,
//! and post-processing. The outer iterative algorithm itself is not part of
//! this crate — callers drive `Solver` in their own loop.

use std::sync::Arc;

use tracing::info;

use crate::config::SolverConfig;
use crate::convolution::DistributedFft;
use crate::error::SolverResult;
use crate::error_reducer::ErrorReducer;
use crate::field::FieldStore;
use crate::green_operator::GreenOperator;
use crate::grid::{Decomposition, Grid};
use crate::homogenization::{self, HomogenizationResult};
use crate::material::MaterialModel;
use crate::mixed_bc::{GradientSink, MixedBcController};
use crate::residual::ResidualAssembler;
use crate::topology::Topology;
use crate::writer::ResultWriter;

/// Narrow capability passed to a [`MixedBcController`]: the macroscopic
/// gradient surface of a live `material`, without handing over the solver.
struct MaterialGradientSink<'a, const H: usize> {
    material: &'a mut dyn MaterialModel<H>,
}

impl<'a, const H: usize> GradientSink for MaterialGradientSink<'a, H> {
    fn n_str(&self) -> usize {
        self.material.n_str()
    }

    fn gradient(&self) -> &[f64] {
        self.material.macroscale_loading()
    }

    fn set_gradient(&mut self, g0: &[f64]) {
        self.material.set_gradient(g0);
    }
}

/// The residual-assembly/convolution/error-measurement kernel for an
/// `H`-DOF-per-node cell problem.
pub struct Solver<const H: usize> {
    pub grid: Grid,
    pub decomp: Decomposition,
    pub config: SolverConfig,
    ms: Vec<u16>,
    field: FieldStore,
    sweep_assembler: ResidualAssembler,
    green: GreenOperator<H>,
    fft: DistributedFft<H>,
    error_reducer: ErrorReducer,
    topology: Arc<dyn Topology>,
    iter: usize,
    mixed_bc: Option<Box<dyn MixedBcController>>,
}

impl<const H: usize> Solver<H> {
    pub fn new(
        config: SolverConfig,
        ms: Vec<u16>,
        material: &dyn MaterialModel<H>,
        topology: Arc<dyn Topology>,
    ) -> SolverResult<Self> {
        let grid = Grid::new(config.dims, config.cell_size)?;
        let rank = topology.rank() as usize;
        let size = topology.size() as usize;
        let decomp = match config.decomposition {
            Some(over) => Decomposition::from_override(over),
            None => Decomposition::block(&grid, rank, size, H),
        };
        if ms.len() != decomp.local_n0 * grid.ny * grid.nz {
            return Err(crate::error::SolverError::Config(format!(
                "micro-structure length {} does not match owned voxel count {}",
                ms.len(),
                decomp.local_n0 * grid.ny * grid.nz
            )));
        }

        let field = FieldStore::new(&grid, &decomp, H);
        let sweep_assembler = ResidualAssembler::new(&grid, &decomp);
        let green = GreenOperator::build(&grid, &decomp, material);
        let fft = DistributedFft::new(&grid, &decomp, size);
        let error_reducer = ErrorReducer::new(config.n_it);

        if rank == 0 {
            info!(nx = grid.nx, ny = grid.ny, nz = grid.nz, "fundamental solution constructed");
        }

        Ok(Self {
            grid,
            decomp,
            config,
            ms,
            field,
            sweep_assembler,
            green,
            fft,
            error_reducer,
            topology,
            iter: 0,
            mixed_bc: None,
        })
    }

    /// Parallelize the FFT's z-axis stage across `n` threads.
    pub fn with_threads(mut self, n: usize) -> Self {
        self.fft = self.fft.with_threads(n);
        self
    }

    /// Attach a mixed boundary-condition controller and enable it for load
    /// step `step`. The controller is handed a [`GradientSink`] bridging to
    /// `material`, not the solver itself, for the duration of the call.
    pub fn enable_mixed_bc(
        &mut self,
        mut controller: Box<dyn MixedBcController>,
        material: &mut dyn MaterialModel<H>,
        step: usize,
    ) {
        let mut sink = MaterialGradientSink { material };
        controller.enable(&mut sink, step);
        self.mixed_bc = Some(controller);
    }

    /// Let the attached controller (if any) adjust the macroscopic gradient
    /// after a converged (or perturbation) solve.
    pub fn update_mixed_bc(&mut self, material: &mut dyn MaterialModel<H>) {
        if let Some(controller) = self.mixed_bc.as_mut() {
            let mut sink = MaterialGradientSink { material };
            controller.update(&mut sink);
        }
    }

    /// Stop enforcing the mixed boundary condition; the gradient is left
    /// as-is.
    pub fn disable_mixed_bc(&mut self) {
        if let Some(controller) = self.mixed_bc.as_mut() {
            controller.disable();
        }
    }

    pub fn u(&self) -> &[f64] {
        self.field.u()
    }

    pub fn u_mut(&mut self) -> &mut [f64] {
        self.field.u_mut()
    }

    /// Assemble the residual `r` from the current `u`.
    pub fn assemble_residual(&mut self, material: &mut dyn MaterialModel<H>) {
        let padding = 2;
        let (u, r, halo) = self.field.u_r_halo_mut();
        self.sweep_assembler.assemble::<H>(
            u,
            r,
            halo,
            &self.ms,
            padding,
            material,
            self.topology.as_ref(),
        );
    }

    /// Forward-transform `r`, apply the reference operator, inverse-transform
    /// back in place. `r`'s two layouts (real padded, post-transpose complex)
    /// alias the same [`FieldStore`] buffer, so the forward input and the
    /// post-convolution complex state are each snapshotted once — the one
    /// copy genuine read/write aliasing requires — while the transform
    /// outputs themselves are written straight into `FieldStore` rather than
    /// through extra scratch buffers.
    pub fn convolve(&mut self) {
        let padding = 2;
        let row_len_pad = self.grid.ny * (self.grid.nz + padding) * H;
        let real_len = self.decomp.local_n0 * row_len_pad;
        let n_complex = self.decomp.local_n1 * self.grid.nx * self.grid.nz_complex() * H;

        let real_padded = self.field.r()[..real_len].to_vec();
        self.fft.forward(
            &real_padded,
            self.topology.as_ref(),
            self.field.r_as_complex_mut(n_complex),
        );
        self.fft
            .convolve(self.field.r_as_complex_mut(n_complex), &self.green);

        let mut freq = self.field.r_as_complex(n_complex).to_vec();
        self.fft.inverse(
            &mut freq,
            self.topology.as_ref(),
            &mut self.field.r_mut()[..real_len],
        );
    }

    /// Measure and record the residual norm for the current iteration,
    /// advancing the internal iteration counter.
    pub fn compute_error(&mut self) -> f64 {
        let padding = 2;
        let nz_pad = self.grid.nz + padding;
        let mut valid = Vec::with_capacity(self.decomp.local_n0 * self.grid.ny * self.grid.nz * H);
        let r = self.field.r();
        for ix in 0..self.decomp.local_n0 {
            for iy in 0..self.grid.ny {
                let row_base = (ix * self.grid.ny + iy) * nz_pad * H;
                valid.extend_from_slice(&r[row_base..row_base + self.grid.nz * H]);
            }
        }
        let err = self.error_reducer.compute_error(
            &valid,
            self.iter,
            &self.config.error_parameters,
            self.topology.as_ref(),
        );
        self.iter += 1;
        err
    }

    pub fn error_history(&self) -> &[f64] {
        self.error_reducer.history()
    }

    /// Homogenized stress/strain averages.
    pub fn homogenize(&mut self, material: &mut dyn MaterialModel<H>) -> HomogenizationResult {
        homogenization::homogenize(
            &self.grid,
            &self.decomp,
            self.field.u_mut(),
            &self.ms,
            self.config.n_mat,
            material,
            self.topology.as_ref(),
        )
    }

    /// Homogenized tangent via perturbation (nonlinear) or unit probes
    /// (linear). `solve_step` is the caller's own fixed-point/Krylov loop,
    /// invoked once per probe with the gradient already installed on
    /// `material`.
    ///
    /// Any attached mixed-BC controller is disabled for the duration of the
    /// probes (a prescribed-stress controller fighting a unit/perturbation
    /// gradient probe would corrupt the tangent), and the convergence
    /// tolerance/error type are tightened to `max(1e-6, tol)`/relative so
    /// every probe resolves to the same accuracy regardless of how the
    /// caller configured the outer solve.
    ///
    /// If `"homogenized_tangent"` is named in `config.results_to_write`, the
    /// symmetrized result is also handed to `writer` under the `step` load
    /// step, the same path convention [`Solver::postprocess`] uses.
    pub fn homogenized_tangent(
        &mut self,
        material: &mut dyn MaterialModel<H>,
        pert_param: f64,
        step: usize,
        writer: &mut dyn ResultWriter,
        mut solve_step: impl FnMut(&mut Self, &mut dyn MaterialModel<H>),
    ) -> SolverResult<Vec<f64>> {
        self.disable_mixed_bc();
        let saved_tol = self.config.tol;
        let saved_error_type = self.config.error_parameters.error_type;
        self.config.tol = saved_tol.max(1e-6);
        self.config.error_parameters.error_type = crate::config::ErrorType::Relative;

        let n_str = material.n_str();
        let unperturbed = self.homogenize(material).stress_average;
        let g0 = material.macroscale_loading().to_vec();
        let is_linear = material.is_linear();

        let mut tangent = vec![0.0; n_str * n_str];
        for i in 0..n_str {
            let snapshot = material.snapshot_internal_variables();

            let mut probe = vec![0.0; n_str];
            if is_linear {
                probe[i] = 1.0;
            } else {
                probe.copy_from_slice(&g0);
                probe[i] += pert_param;
            }
            material.set_gradient(&probe);

            solve_step(self, material);
            let perturbed = self.homogenize(material).stress_average;

            for row in 0..n_str {
                tangent[row * n_str + i] = if is_linear {
                    perturbed[row]
                } else {
                    (perturbed[row] - unperturbed[row]) / pert_param
                };
            }

            material.restore_internal_variables(&snapshot);
        }

        homogenization::symmetrize(&mut tangent, n_str);

        self.config.tol = saved_tol;
        self.config.error_parameters.error_type = saved_error_type;

        if self
            .config
            .results_to_write
            .iter()
            .any(|s| s == "homogenized_tangent")
        {
            let path = format!(
                "{}_results/{}/load{}/time_step0/homogenized_tangent",
                self.config.ms_datasetname, self.config.results_prefix, step
            );
            writer.write_matrix(&path, &tangent, n_str)?;
        }

        Ok(tangent)
    }

    /// Homogenize, then hand the datasets named in `config.results_to_write`
    /// to `writer`, including the synthesized total displacement field and
    /// (if `"absolute_error"` is requested) the per-iteration error history
    /// this solver has accumulated so far.
    /// `step` identifies the load step `L` in the output path convention.
    pub fn postprocess(
        &mut self,
        material: &mut dyn MaterialModel<H>,
        g0: &[f64],
        step: usize,
        writer: &mut dyn ResultWriter,
    ) -> SolverResult<HomogenizationResult> {
        let result = homogenization::postprocess(
            &self.grid,
            &self.decomp,
            self.field.u_mut(),
            &self.ms,
            &self.config,
            g0,
            step,
            material,
            self.topology.as_ref(),
            writer,
        )?;

        if self.config.results_to_write.iter().any(|s| s == "absolute_error") {
            let path = format!(
                "{}_results/{}/load{}/time_step0/absolute_error",
                self.config.ms_datasetname, self.config.results_prefix, step
            );
            writer.write_scalar_history(&path, self.error_reducer.history())?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ErrorMeasure, ErrorParameters, ErrorType};
    use crate::material::linear::LinearIsotropic;
    use crate::topology::SingleRankTopology;

    fn test_config(dims: [usize; 3]) -> SolverConfig {
        SolverConfig {
            dims,
            cell_size: [1.0, 1.0, 1.0],
            n_mat: 1,
            n_it: 5,
            tol: 1e-8,
            error_parameters: ErrorParameters {
                measure: ErrorMeasure::L2,
                error_type: ErrorType::Absolute,
                norm_reduction: crate::config::NormReduction::Max,
            },
            results_to_write: vec![],
            results_prefix: String::new(),
            ms_datasetname: String::new(),
            decomposition: None,
        }
    }

    #[test]
    fn zero_gradient_converges_immediately() {
        let grid_dims = [4, 4, 4];
        let config = test_config(grid_dims);
        let ms = vec![0u16; 4 * 4 * 4];
        let material = LinearIsotropic::conduction(&[1.0]);
        let topo: Arc<dyn Topology> = Arc::new(SingleRankTopology);
        let mut solver = Solver::<1>::new(config, ms, &material, topo).unwrap();

        let mut material = LinearIsotropic::conduction(&[1.0]);
        material.set_gradient(&[0.0, 0.0, 0.0]);
        solver.assemble_residual(&mut material);
        let err = solver.compute_error();
        assert!(err.abs() < 1e-12);
    }

    #[test]
    fn nonzero_gradient_homogeneous_material_gives_zero_residual() {
        // A homogeneous reference material under a uniform macroscopic
        // gradient has a constant flux field, hence zero element residual
        // even before any fluctuation correction.
        let config = test_config([4, 4, 4]);
        let ms = vec![0u16; 4 * 4 * 4];
        let material = LinearIsotropic::conduction(&[1.0]);
        let topo: Arc<dyn Topology> = Arc::new(SingleRankTopology);
        let mut solver = Solver::<1>::new(config, ms, &material, topo).unwrap();

        let mut material = LinearIsotropic::conduction(&[1.0]);
        material.set_gradient(&[1.0, 0.0, 0.0]);
        solver.assemble_residual(&mut material);
        let err = solver.compute_error();
        assert!(err.abs() < 1e-8);
    }

    #[test]
    fn convolve_leaves_zero_residual_field_zero() {
        let config = test_config([4, 4, 4]);
        let ms = vec![0u16; 4 * 4 * 4];
        let material = LinearIsotropic::conduction(&[1.0]);
        let topo: Arc<dyn Topology> = Arc::new(SingleRankTopology);
        let mut solver = Solver::<1>::new(config, ms, &material, topo).unwrap();

        let mut material = LinearIsotropic::conduction(&[1.0]);
        material.set_gradient(&[0.0, 0.0, 0.0]);
        solver.assemble_residual(&mut material);
        solver.convolve();
        assert!(solver.field.r().iter().all(|&v| v.abs() < 1e-8));
    }

    struct DoublingController {
        active: bool,
    }

    impl MixedBcController for DoublingController {
        fn enable(&mut self, _sink: &mut dyn GradientSink, _step: usize) {
            self.active = true;
        }
        fn disable(&mut self) {
            self.active = false;
        }
        fn update(&mut self, sink: &mut dyn GradientSink) {
            let doubled: Vec<f64> = sink.gradient().iter().map(|v| v * 2.0).collect();
            sink.set_gradient(&doubled);
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    #[test]
    fn mixed_bc_updates_gradient_and_tangent_probes_disable_it() {
        let config = test_config([4, 4, 4]);
        let ms = vec![0u16; 4 * 4 * 4];
        let material = LinearIsotropic::conduction(&[1.0]);
        let topo: Arc<dyn Topology> = Arc::new(SingleRankTopology);
        let mut solver = Solver::<1>::new(config, ms, &material, topo).unwrap();

        let mut material = LinearIsotropic::conduction(&[1.0]);
        material.set_gradient(&[1.0, 0.0, 0.0]);

        solver.enable_mixed_bc(Box::new(DoublingController { active: false }), &mut material, 0);
        assert!(solver.mixed_bc.as_ref().unwrap().is_active());

        solver.update_mixed_bc(&mut material);
        assert_eq!(material.macroscale_loading(), &[2.0, 0.0, 0.0]);

        solver.config.results_to_write.push("homogenized_tangent".into());
        let n_str = material.n_str();
        let mut writer = crate::writer::NullResultWriter;
        let tangent = solver
            .homogenized_tangent(&mut material, 1e-4, 0, &mut writer, |_solver, _material| {})
            .unwrap();
        assert_eq!(tangent.len(), n_str * n_str);
        assert!(!solver.mixed_bc.as_ref().unwrap().is_active());
    }
}
