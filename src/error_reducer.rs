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

//! Residual norm measurement and convergence history.

use tracing::info;

use crate::config::{ErrorMeasure, ErrorParameters, ErrorType, NormReduction};
use crate::topology::Topology;

/// Tracks the absolute error history across iterations and reports either
/// the raw value or the value relative to the iteration-0 baseline.
pub struct ErrorReducer {
    err_all: Vec<f64>,
}

impl ErrorReducer {
    pub fn new(n_it: usize) -> Self {
        Self {
            err_all: vec![0.0; n_it + 1],
        }
    }

    pub fn history(&self) -> &[f64] {
        &self.err_all
    }

    /// Compute the local norm of `r`, reduce it globally per
    /// `params.norm_reduction`, record it at `iter`, log it, and return the
    /// value `params.error_type` asks for.
    pub fn compute_error(
        &mut self,
        r: &[f64],
        iter: usize,
        params: &ErrorParameters,
        topology: &dyn Topology,
    ) -> f64 {
        let local = match params.measure {
            ErrorMeasure::L1 => r.iter().map(|v| v.abs()).sum::<f64>(),
            ErrorMeasure::L2 => r.iter().map(|v| v * v).sum::<f64>().sqrt(),
            ErrorMeasure::Linfinity => r.iter().fold(0.0f64, |m, v| m.max(v.abs())),
        };

        let global = match params.norm_reduction {
            NormReduction::Max => topology.allreduce_max(local),
            NormReduction::AlgebraicSum => match params.measure {
                ErrorMeasure::L1 => topology.allreduce_sum_scalar(local),
                ErrorMeasure::L2 => {
                    let local_sq = local * local;
                    topology.allreduce_sum_scalar(local_sq).sqrt()
                }
                ErrorMeasure::Linfinity => topology.allreduce_max(local),
            },
        };

        self.err_all[iter] = global;
        let err0 = self.err_all[0];
        let err_rel = if iter == 0 { 100.0 } else { global / err0 };

        if topology.rank() == 0 {
            if iter == 0 {
                info!(err0, "before first iteration");
            } else {
                info!(iter, err = global, ratio = err_rel, "residual norm");
            }
        }

        match params.error_type {
            ErrorType::Absolute => global,
            ErrorType::Relative => err_rel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SingleRankTopology;

    fn params(measure: ErrorMeasure, error_type: ErrorType) -> ErrorParameters {
        ErrorParameters {
            measure,
            error_type,
            norm_reduction: NormReduction::Max,
        }
    }

    #[test]
    fn l2_norm_matches_euclidean_length() {
        let mut reducer = ErrorReducer::new(2);
        let topo = SingleRankTopology;
        let err = reducer.compute_error(
            &[3.0, 4.0],
            0,
            &params(ErrorMeasure::L2, ErrorType::Absolute),
            &topo,
        );
        assert!((err - 5.0).abs() < 1e-12);
    }

    #[test]
    fn relative_error_is_one_hundred_at_iteration_zero() {
        let mut reducer = ErrorReducer::new(2);
        let topo = SingleRankTopology;
        let err = reducer.compute_error(
            &[1.0],
            0,
            &params(ErrorMeasure::L1, ErrorType::Relative),
            &topo,
        );
        assert_eq!(err, 100.0);
    }

    #[test]
    fn relative_error_normalizes_by_baseline() {
        let mut reducer = ErrorReducer::new(2);
        let topo = SingleRankTopology;
        reducer.compute_error(&[2.0], 0, &params(ErrorMeasure::L1, ErrorType::Absolute), &topo);
        let err = reducer.compute_error(
            &[1.0],
            1,
            &params(ErrorMeasure::L1, ErrorType::Relative),
            &topo,
        );
        assert!((err - 0.5).abs() < 1e-12);
    }
}
