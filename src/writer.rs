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

//! Result output interface.
//!
//! Writing datasets to an HDF5 file is out of scope for this crate; a real
//! caller supplies an implementation of [`ResultWriter`] (backed by `hdf5`
//! or any other sink). [`crate::homogenization`]/[`crate::solver`] only ever
//! call through this trait.

use crate::error::SolverResult;

/// A sink for the named datasets [`crate::homogenization::postprocess`]
/// produces, one method per dataset family, keyed by the
/// `<ms_datasetname>_results/<results_prefix>/load<L>/time_step<T>/<quantity>`
/// path convention.
pub trait ResultWriter {
    /// A small rank-global vector already reduced across ranks (e.g.
    /// `stress_average`, `strain_average`, a `phase_*_average_phase<k>`).
    fn write_vector(&mut self, path: &str, data: &[f64]) -> SolverResult<()>;
    /// A per-iteration scalar history (`absolute_error`).
    fn write_scalar_history(&mut self, path: &str, data: &[f64]) -> SolverResult<()>;
    /// A per-rank slabbed dataset of `dims` shape (`microstructure`,
    /// `displacement`, `displacement_fluctuation`, `residual`, `strain`,
    /// `stress`).
    fn write_slab(&mut self, path: &str, data: &[f64], dims: &[usize]) -> SolverResult<()>;
    /// A flattened `n x n` row-major matrix (`homogenized_tangent`).
    fn write_matrix(&mut self, path: &str, data: &[f64], n: usize) -> SolverResult<()>;
}

/// No-op writer, for callers (and this crate's own tests) that don't need
/// persisted output.
#[derive(Debug, Default)]
pub struct NullResultWriter;

impl ResultWriter for NullResultWriter {
    fn write_vector(&mut self, _path: &str, _data: &[f64]) -> SolverResult<()> {
        Ok(())
    }

    fn write_scalar_history(&mut self, _path: &str, _data: &[f64]) -> SolverResult<()> {
        Ok(())
    }

    fn write_slab(&mut self, _path: &str, _data: &[f64], _dims: &[usize]) -> SolverResult<()> {
        Ok(())
    }

    fn write_matrix(&mut self, _path: &str, _data: &[f64], _n: usize) -> SolverResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_writer_always_succeeds() {
        let mut writer = NullResultWriter;
        assert!(writer.write_vector("x", &[1.0, 2.0]).is_ok());
        assert!(writer.write_scalar_history("err", &[1.0, 0.5]).is_ok());
        assert!(writer.write_slab("slab", &[1.0, 2.0], &[2, 1]).is_ok());
        assert!(writer.write_matrix("tangent", &[1.0, 0.0, 0.0, 1.0], 2).is_ok());
    }
}
