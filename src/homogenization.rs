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

//! Post-processing: homogenized stress/strain averages, the total
//! displacement field, and typed dataset output. The homogenized tangent's
//! perturb-and-resolve loop lives in [`crate::solver::Solver`] since it needs
//! the whole fixed-point iteration; this module holds the per-probe
//! averaging math plus [`postprocess`], which additionally synthesizes
//! `u_total` and writes the requested datasets.

use crate::config::SolverConfig;
use crate::error::SolverResult;
use crate::grid::{Decomposition, Grid};
use crate::material::MaterialModel;
use crate::sweep::ElementSweep;
use crate::topology::Topology;
use crate::writer::ResultWriter;

/// Per-voxel strain/stress plus their global and per-phase averages.
pub struct HomogenizationResult {
    pub strain: Vec<f64>,
    pub stress: Vec<f64>,
    pub strain_average: Vec<f64>,
    pub stress_average: Vec<f64>,
    pub phase_strain_average: Vec<Vec<f64>>,
    pub phase_stress_average: Vec<Vec<f64>>,
}

/// Ghost-exchange `u`, sweep every owned element with absolute (not
/// corner-relative) nodal values, and accumulate global plus per-phase
/// strain/stress averages. Equivalent to the reference's
/// `get_homogenized_stress`, generalized to also report per-phase values for
/// `postprocess`.
pub fn homogenize<const H: usize>(
    grid: &Grid,
    decomp: &Decomposition,
    u: &mut [f64],
    ms: &[u16],
    n_mat: usize,
    material: &mut dyn MaterialModel<H>,
    topology: &dyn Topology,
) -> HomogenizationResult {
    let n_str = material.n_str();
    let n_voxels = decomp.local_n0 * grid.ny * grid.nz;
    let mut strain = vec![0.0; n_voxels * n_str];
    let mut stress = vec![0.0; n_voxels * n_str];
    let mut strain_average = vec![0.0; n_str];
    let mut stress_average = vec![0.0; n_str];
    let mut phase_strain_average = vec![vec![0.0; n_str]; n_mat];
    let mut phase_stress_average = vec![vec![0.0; n_str]; n_mat];
    let mut phase_counts = vec![0usize; n_mat];

    let row_len = grid.ny * grid.nz * H;
    let (owned, ghost) = u.split_at_mut(decomp.local_n0 * row_len);
    topology.sendrecv_ring(&owned[..row_len], &mut ghost[..row_len]);

    let sweep = ElementSweep::new(grid, decomp);
    let mut u_e = vec![0.0; 8 * H];
    sweep.sweep(0, |idx, _idx_pad| {
        let voxel = idx[0];
        let phase = ms[voxel];
        for corner in 0..8 {
            for comp in 0..H {
                u_e[H * corner + comp] = u[H * idx[corner] + comp];
            }
        }
        let (strain_e, stress_e) = material.strain_stress(&u_e, phase, voxel);

        strain[voxel * n_str..(voxel + 1) * n_str].copy_from_slice(&strain_e);
        stress[voxel * n_str..(voxel + 1) * n_str].copy_from_slice(&stress_e);
        for c in 0..n_str {
            strain_average[c] += strain_e[c];
            stress_average[c] += stress_e[c];
            phase_strain_average[phase as usize][c] += strain_e[c];
            phase_stress_average[phase as usize][c] += stress_e[c];
        }
        phase_counts[phase as usize] += 1;
    });

    topology.allreduce_sum_into(&mut strain_average);
    topology.allreduce_sum_into(&mut stress_average);
    for p in 0..n_mat {
        topology.allreduce_sum_into(&mut phase_strain_average[p]);
        topology.allreduce_sum_into(&mut phase_stress_average[p]);
        phase_counts[p] = topology.allreduce_sum_usize(phase_counts[p]);
    }

    let n_total = (grid.nx * grid.ny * grid.nz) as f64;
    for c in 0..n_str {
        strain_average[c] /= n_total;
        stress_average[c] /= n_total;
    }
    for p in 0..n_mat {
        let count = phase_counts[p].max(1) as f64;
        for c in 0..n_str {
            phase_strain_average[p][c] /= count;
            phase_stress_average[p][c] /= count;
        }
    }

    HomogenizationResult {
        strain,
        stress,
        strain_average,
        stress_average,
        phase_strain_average,
        phase_stress_average,
    }
}

/// `homogenize`, then hand the datasets named in `config.results_to_write`
/// to `writer` (path convention
/// `<ms_datasetname>_results/<results_prefix>/load<step>/time_step0/<quantity>`),
/// including the synthesized total displacement `u_total = u + G₀·x`.
#[allow(clippy::too_many_arguments)]
pub fn postprocess<const H: usize>(
    grid: &Grid,
    decomp: &Decomposition,
    u: &mut [f64],
    ms: &[u16],
    config: &SolverConfig,
    g0: &[f64],
    step: usize,
    material: &mut dyn MaterialModel<H>,
    topology: &dyn Topology,
    writer: &mut dyn ResultWriter,
) -> SolverResult<HomogenizationResult> {
    let result = homogenize(grid, decomp, u, ms, config.n_mat, material, topology);

    let wants = |name: &str| config.results_to_write.iter().any(|s| s == name);
    let path = |quantity: &str| {
        format!(
            "{}_results/{}/load{}/time_step0/{}",
            config.ms_datasetname, config.results_prefix, step, quantity
        )
    };

    if wants("stress_average") {
        writer.write_vector(&path("stress_average"), &result.stress_average)?;
    }
    if wants("strain_average") {
        writer.write_vector(&path("strain_average"), &result.strain_average)?;
    }
    if wants("phase_stress_average") {
        for (k, phase_avg) in result.phase_stress_average.iter().enumerate() {
            writer.write_vector(&path(&format!("phase_stress_average_phase{k}")), phase_avg)?;
        }
    }
    if wants("phase_strain_average") {
        for (k, phase_avg) in result.phase_strain_average.iter().enumerate() {
            writer.write_vector(&path(&format!("phase_strain_average_phase{k}")), phase_avg)?;
        }
    }

    let n_str = material.n_str();
    let slab_dims = [decomp.local_n0, grid.ny, grid.nz, n_str];
    if wants("strain") {
        writer.write_slab(&path("strain"), &result.strain, &slab_dims)?;
    }
    if wants("stress") {
        writer.write_slab(&path("stress"), &result.stress, &slab_dims)?;
    }

    let owned_len = decomp.local_n0 * grid.ny * grid.nz * H;
    if wants("displacement_fluctuation") {
        writer.write_slab(
            &path("displacement_fluctuation"),
            &u[..owned_len],
            &[decomp.local_n0, grid.ny, grid.nz, H],
        )?;
    }
    if wants("displacement") {
        let u_total = total_displacement::<H>(grid, decomp, &u[..owned_len], g0);
        writer.write_slab(
            &path("displacement"),
            &u_total,
            &[decomp.local_n0, grid.ny, grid.nz, H],
        )?;
    }

    Ok(result)
}

/// Synthesize `u_total = u + G₀·x` at every owned node: the scalar case
/// (`H = 1`) adds a linear gradient, the mechanics case (`H = 3`) applies the
/// symmetric strain tensor decoded from `g0`'s Mandel components (shear
/// entries carry the `√2` Mandel scaling and must be divided back out before
/// use as tensor components).
fn total_displacement<const H: usize>(
    grid: &Grid,
    decomp: &Decomposition,
    u_owned: &[f64],
    g0: &[f64],
) -> Vec<f64> {
    let lengths = grid.lengths();
    let mut u_total = u_owned.to_vec();

    for ix in 0..decomp.local_n0 {
        let x = (decomp.local_0_start + ix) as f64 * grid.dx - lengths[0] / 2.0;
        for iy in 0..grid.ny {
            let y = iy as f64 * grid.dy - lengths[1] / 2.0;
            for iz in 0..grid.nz {
                let z = iz as f64 * grid.dz - lengths[2] / 2.0;
                let base = ((ix * grid.ny + iy) * grid.nz + iz) * H;
                if H == 1 {
                    u_total[base] += g0[0] * x + g0[1] * y + g0[2] * z;
                } else {
                    let e11 = g0[0];
                    let e22 = g0[1];
                    let e33 = g0[2];
                    let e12 = g0[3] / std::f64::consts::SQRT_2;
                    let e13 = g0[4] / std::f64::consts::SQRT_2;
                    let e23 = g0[5] / std::f64::consts::SQRT_2;
                    u_total[base] += e11 * x + e12 * y + e13 * z;
                    u_total[base + 1] += e12 * x + e22 * y + e23 * z;
                    u_total[base + 2] += e13 * x + e23 * y + e33 * z;
                }
            }
        }
    }
    u_total
}

/// Symmetrize a flattened `n x n` row-major matrix in place:
/// `M <- 0.5 * (M + M^T)`.
pub fn symmetrize(matrix: &mut [f64], n: usize) {
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (matrix[i * n + j] + matrix[j * n + i]);
            matrix[i * n + j] = avg;
            matrix[j * n + i] = avg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::linear::LinearIsotropic;
    use crate::topology::SingleRankTopology;

    #[test]
    fn symmetrize_averages_off_diagonal() {
        let mut m = vec![1.0, 2.0, 4.0, 3.0];
        symmetrize(&mut m, 2);
        assert_eq!(m, vec![1.0, 3.0, 3.0, 3.0]);
    }

    #[test]
    fn zero_displacement_gives_zero_homogenized_stress() {
        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        let mut material = LinearIsotropic::conduction(&[1.0, 2.0]);
        material.set_gradient(&[0.0, 0.0, 0.0]);
        let mut u = vec![0.0; (decomp.local_n0 + 1) * grid.ny * grid.nz];
        let ms = vec![0u16; grid.nx * grid.ny * grid.nz];
        let topo = SingleRankTopology;

        let result = homogenize::<1>(&grid, &decomp, &mut u, &ms, 2, &mut material, &topo);
        assert!(result.stress_average.iter().all(|&v| v.abs() < 1e-12));
    }

    #[test]
    fn total_displacement_scalar_adds_linear_gradient_at_cell_center() {
        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        let u_owned = vec![0.0; decomp.local_n0 * grid.ny * grid.nz];
        let g0 = [1.0, 0.0, 0.0];

        let u_total = total_displacement::<1>(&grid, &decomp, &u_owned, &g0);
        // ix = 0 sits at x = -Lx/2 = -2.0, so u_total = g0[0] * x = -2.0.
        assert!((u_total[0] - (-2.0)).abs() < 1e-12);
    }

    #[test]
    fn postprocess_writes_every_requested_dataset_without_error() {
        use crate::config::{ErrorMeasure, ErrorParameters, ErrorType, NormReduction};
        use crate::writer::NullResultWriter;

        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        let config = SolverConfig {
            dims: [4, 4, 4],
            cell_size: [1.0, 1.0, 1.0],
            n_mat: 1,
            n_it: 5,
            tol: 1e-8,
            error_parameters: ErrorParameters {
                measure: ErrorMeasure::L2,
                error_type: ErrorType::Absolute,
                norm_reduction: NormReduction::Max,
            },
            results_to_write: vec![
                "stress_average".into(),
                "strain_average".into(),
                "phase_stress_average".into(),
                "phase_strain_average".into(),
                "strain".into(),
                "stress".into(),
                "displacement_fluctuation".into(),
                "displacement".into(),
            ],
            results_prefix: "run0".into(),
            ms_datasetname: "ms".into(),
            decomposition: None,
        };
        let mut material = LinearIsotropic::conduction(&[1.0]);
        material.set_gradient(&[1.0, 0.0, 0.0]);
        let mut u = vec![0.0; (decomp.local_n0 + 1) * grid.ny * grid.nz];
        let ms = vec![0u16; grid.nx * grid.ny * grid.nz];
        let topo = SingleRankTopology;
        let mut writer = NullResultWriter;

        let result = postprocess::<1>(
            &grid,
            &decomp,
            &mut u,
            &ms,
            &config,
            &[1.0, 0.0, 0.0],
            0,
            &mut material,
            &topo,
            &mut writer,
        )
        .unwrap();
        assert_eq!(result.phase_stress_average.len(), 1);
    }
}
