//! End-to-end scenarios against the public `Solver` API, using the
//! scalar-conductivity reference material (`testsupport` feature).

use std::sync::Arc;

use fans_core::config::{ErrorMeasure, ErrorParameters, ErrorType, NormReduction, SolverConfig};
use fans_core::grid::{Decomposition, Grid};
use fans_core::homogenization;
use fans_core::material::linear::LinearIsotropic;
use fans_core::solver::Solver;
use fans_core::topology::SingleRankTopology;
use fans_core::MaterialModel;

fn config(dims: [usize; 3], n_mat: usize, n_it: usize) -> SolverConfig {
    SolverConfig {
        dims,
        cell_size: [1.0, 1.0, 1.0],
        n_mat,
        n_it,
        tol: 1e-8,
        error_parameters: ErrorParameters {
            measure: ErrorMeasure::L2,
            error_type: ErrorType::Absolute,
            norm_reduction: NormReduction::Max,
        },
        results_to_write: vec![],
        results_prefix: String::new(),
        ms_datasetname: String::new(),
        decomposition: None,
    }
}

#[test]
fn homogeneous_body_under_uniform_gradient_has_zero_residual_and_stays_zero_after_convolution() {
    let dims = [4, 4, 4];
    let ms = vec![0u16; dims[0] * dims[1] * dims[2]];
    let seed_material = LinearIsotropic::conduction(&[2.0]);
    let topo: Arc<dyn fans_core::Topology> = Arc::new(SingleRankTopology);
    let mut solver = Solver::<1>::new(config(dims, 1, 5), ms, &seed_material, topo).unwrap();

    let mut material = LinearIsotropic::conduction(&[2.0]);
    material.set_gradient(&[1.0, -0.5, 0.25]);
    solver.assemble_residual(&mut material);
    let err_before = solver.compute_error();
    assert!(err_before.abs() < 1e-8, "residual before convolution: {err_before}");

    solver.convolve();
    let err_after = solver.compute_error();
    assert!(err_after.abs() < 1e-8, "residual after convolution: {err_after}");
}

#[test]
fn error_history_length_matches_configured_iteration_budget() {
    let dims = [4, 4, 4];
    let n_it = 4;
    let ms = vec![0u16; dims[0] * dims[1] * dims[2]];
    let seed_material = LinearIsotropic::conduction(&[1.0]);
    let topo: Arc<dyn fans_core::Topology> = Arc::new(SingleRankTopology);
    let mut solver = Solver::<1>::new(config(dims, 1, n_it), ms, &seed_material, topo).unwrap();

    let mut material = LinearIsotropic::conduction(&[1.0]);
    material.set_gradient(&[1.0, 0.0, 0.0]);
    for _ in 0..=n_it {
        solver.assemble_residual(&mut material);
        solver.compute_error();
    }

    assert_eq!(solver.error_history().len(), n_it + 1);
    assert!(solver.error_history().iter().all(|v| v.is_finite()));
}

#[test]
fn two_phase_laminate_global_average_is_the_mean_of_equal_sized_phase_averages() {
    let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
    let decomp = Decomposition::block(&grid, 0, 1, 1);
    let mut material = LinearIsotropic::conduction(&[1.0, 9.0]);
    material.set_gradient(&[1.0, 0.0, 0.0]);

    // Phase 0 fills x in [0,2), phase 1 fills x in [2,4): exactly half the
    // voxels each, so the global average is the unweighted mean of the two
    // phase averages.
    let mut ms = vec![0u16; grid.nx * grid.ny * grid.nz];
    for ix in 2..grid.nx {
        for iy in 0..grid.ny {
            for iz in 0..grid.nz {
                ms[(ix * grid.ny + iy) * grid.nz + iz] = 1;
            }
        }
    }

    let mut u = vec![0.0; (decomp.local_n0 + 1) * grid.ny * grid.nz];
    for (i, v) in u.iter_mut().enumerate() {
        *v = ((i * 5) % 7) as f64 * 0.1;
    }
    let topo = SingleRankTopology;

    let result = homogenization::homogenize::<1>(
        &grid, &decomp, &mut u, &ms, 2, &mut material, &topo,
    );

    for c in 0..result.stress_average.len() {
        let mean = 0.5 * (result.phase_stress_average[0][c] + result.phase_stress_average[1][c]);
        assert!(
            (result.stress_average[c] - mean).abs() < 1e-8,
            "component {c}: global {} vs phase mean {}",
            result.stress_average[c],
            mean
        );
    }
}
