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

//! FFT-accelerated voxel finite-element kernel for the cell problem of
//! computational homogenization.
//!
//! This crate assembles the out-of-balance residual of a trilinear-hex
//! discretization, applies a reference-medium Green operator through a
//! distributed real-to-complex FFT, and reports convergence and homogenized
//! stress/tangent — the primitives a fixed-point or Krylov driver calls each
//! iteration. It does not implement that outer iterative loop; see
//! [`solver::Solver`] for what is and isn't provided.
//!
//! Usage
//! -----
//! Requires the `testsupport` feature for [`material::linear::LinearIsotropic`],
//! the scalar-conductivity reference material used here and in this crate's
//! own tests.
//!
//! ```ignore
//! use std::sync::Arc;
//! use fans_core::config::{ErrorMeasure, ErrorParameters, ErrorType, SolverConfig};
//! use fans_core::material::linear::LinearIsotropic;
//! use fans_core::solver::Solver;
//! use fans_core::topology::SingleRankTopology;
//! use fans_core::MaterialModel;
//!
//! let config = SolverConfig {
//!     dims: [4, 4, 4],
//!     cell_size: [1.0, 1.0, 1.0],
//!     n_mat: 1,
//!     n_it: 10,
//!     tol: 1e-6,
//!     error_parameters: ErrorParameters {
//!         measure: ErrorMeasure::L2,
//!         error_type: ErrorType::Relative,
//!         norm_reduction: Default::default(),
//!     },
//!     results_to_write: vec![],
//!     results_prefix: String::new(),
//!     ms_datasetname: String::new(),
//!     decomposition: None,
//! };
//! let ms = vec![0u16; 4 * 4 * 4];
//! let material = LinearIsotropic::conduction(&[1.0]);
//! let topology = Arc::new(SingleRankTopology);
//! let mut solver = Solver::<1>::new(config, ms, &material, topology).unwrap();
//! let mut material = LinearIsotropic::conduction(&[1.0]);
//! material.set_gradient(&[1.0, 0.0, 0.0]);
//! solver.assemble_residual(&mut material);
//! let _err = solver.compute_error();
//! ```

pub mod config;
pub mod convolution;
pub mod error;
pub mod error_reducer;
pub mod field;
pub mod green_operator;
pub mod grid;
pub mod homogenization;
pub mod material;
pub mod mixed_bc;
pub mod residual;
pub mod solver;
pub mod sweep;
pub mod topology;
pub mod writer;

pub use config::SolverConfig;
pub use error::{SolverError, SolverResult};
pub use grid::{Decomposition, Grid};
pub use material::MaterialModel;
pub use solver::Solver;
pub use topology::Topology;
