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

//! Error types shared across the solver kernel.
//!
//! The reference implementation treats configuration mistakes, allocation
//! failures and collective-communication failures as three distinct fatal
//! conditions; we keep that three-way split as an enum instead of panicking
//! so a caller embedding the solver in a larger driver can at least log and
//! abort cleanly.

use thiserror::Error;

/// Errors the solver kernel can report.
///
/// None of these variants imply a retry: non-convergence of the outer
/// iteration is communicated through `err_all`/`iteration_count`, not through
/// this type.
#[derive(Debug, Error)]
pub enum SolverError {
    /// An unrecognized configuration value (error measure/type string, an
    /// invalid grid dimension, ...).
    #[error("configuration error: {0}")]
    Config(String),
    /// A buffer could not be allocated at the requested size.
    #[error("allocation error: {0}")]
    Allocation(String),
    /// A collective communication step failed. Every rank must reach every
    /// collective or the run deadlocks, so this is always fatal for the
    /// whole run, not just the reporting rank.
    #[error("collective communication error: {0}")]
    Collective(String),
}

/// Convenience alias used throughout the crate.
pub type SolverResult<T> = Result<T, SolverError>;
