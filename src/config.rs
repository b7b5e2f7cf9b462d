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

//! Configuration data handed to the solver by an external `Reader`.
//!
//! Parsing this out of an actual config file or an HDF5 attribute set is out
//! of scope for this crate; `SolverConfig` only pins down the shape of the
//! data a real reader would produce.

use serde::{Deserialize, Serialize};

use crate::error::SolverError;

/// Residual norm used by the [`crate::error_reducer::ErrorReducer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorMeasure {
    L1,
    L2,
    Linfinity,
}

impl ErrorMeasure {
    pub fn parse(s: &str) -> Result<Self, SolverError> {
        match s {
            "L1" => Ok(Self::L1),
            "L2" => Ok(Self::L2),
            "Linfinity" => Ok(Self::Linfinity),
            other => Err(SolverError::Config(format!("unknown measure type: {other}"))),
        }
    }
}

/// Whether [`crate::error_reducer::ErrorReducer::compute_error`] reports an
/// absolute residual norm or one normalized by the iteration-0 value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    Absolute,
    Relative,
}

impl ErrorType {
    pub fn parse(s: &str) -> Result<Self, SolverError> {
        match s {
            "absolute" => Ok(Self::Absolute),
            "relative" => Ok(Self::Relative),
            other => Err(SolverError::Config(format!("unknown error type: {other}"))),
        }
    }
}

/// How per-rank local norms are combined into a global one in
/// [`crate::error_reducer::ErrorReducer`].
///
/// The reference FANS solver always reduces with `MPI_MAX`, even for L1/L2,
/// which understates the true global norm in exchange for a cheap,
/// conservative upper bound. `Max` preserves that behavior for
/// bit-compatibility with the reference; `AlgebraicSum` is the mathematically
/// correct alternative, exposed as a configurable switch rather than the
/// default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum NormReduction {
    #[default]
    Max,
    AlgebraicSum,
}

/// Error-measurement configuration (`measure`/`type` pair in the reference
/// reader's `errorParameters` map).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorParameters {
    pub measure: ErrorMeasure,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    #[serde(default)]
    pub norm_reduction: NormReduction,
}

/// Optional decomposition override. When absent, [`crate::grid::Decomposition`]
/// derives a block decomposition from `(nx, rank, size)`, the Rust-native
/// analogue of querying the FFT library's "local size" routine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecompositionOverride {
    pub local_n0: usize,
    pub local_0_start: usize,
    pub local_n1: usize,
    pub local_1_start: usize,
    pub alloc_local: usize,
}

/// Everything a `Reader` hands the solver that isn't the micro-structure
/// array or the material model itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Global grid dimensions `(Nx, Ny, Nz)`.
    pub dims: [usize; 3],
    /// Physical cell sizes `(dx, dy, dz)`.
    pub cell_size: [f64; 3],
    /// Number of distinct material phases in the micro-structure.
    pub n_mat: usize,
    /// Maximum number of solver iterations.
    pub n_it: usize,
    /// Convergence tolerance on the configured error measure.
    pub tol: f64,
    pub error_parameters: ErrorParameters,
    /// Dataset names to emit during [`crate::homogenization`] post-processing.
    #[serde(default)]
    pub results_to_write: Vec<String>,
    /// Prefix used when composing output dataset paths.
    #[serde(default)]
    pub results_prefix: String,
    /// Base name of the micro-structure dataset, used to compose output
    /// dataset paths (`<ms_datasetname>_results/...`).
    #[serde(default)]
    pub ms_datasetname: String,
    /// Explicit decomposition, overriding the derived block decomposition.
    #[serde(default)]
    pub decomposition: Option<DecompositionOverride>,
}

impl SolverConfig {
    /// Physical domain lengths `(Lx, Ly, Lz) = (Nx*dx, Ny*dy, Nz*dz)`.
    pub fn lengths(&self) -> [f64; 3] {
        [
            self.dims[0] as f64 * self.cell_size[0],
            self.dims[1] as f64 * self.cell_size[1],
            self.dims[2] as f64 * self.cell_size[2],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_measure_roundtrips_through_parse() {
        assert_eq!(ErrorMeasure::parse("L1").unwrap(), ErrorMeasure::L1);
        assert_eq!(ErrorMeasure::parse("L2").unwrap(), ErrorMeasure::L2);
        assert_eq!(
            ErrorMeasure::parse("Linfinity").unwrap(),
            ErrorMeasure::Linfinity
        );
        assert!(ErrorMeasure::parse("bogus").is_err());
    }

    #[test]
    fn error_type_rejects_unknown_strings() {
        assert!(ErrorType::parse("absolute").is_ok());
        assert!(ErrorType::parse("relative").is_ok());
        assert!(matches!(
            ErrorType::parse("nonsense"),
            Err(SolverError::Config(_))
        ));
    }

    #[test]
    fn config_deserializes_from_json() {
        let json = serde_json::json!({
            "dims": [4, 4, 4],
            "cell_size": [1.0, 1.0, 1.0],
            "n_mat": 2,
            "n_it": 100,
            "tol": 1e-6,
            "error_parameters": {"measure": "L2", "type": "relative"}
        });
        let cfg: SolverConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.dims, [4, 4, 4]);
        assert_eq!(cfg.lengths(), [4.0, 4.0, 4.0]);
    }
}
