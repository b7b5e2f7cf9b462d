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

//! Grid dimensions and the 1-D slab decomposition.

use crate::error::SolverError;
use crate::topology::{block_offsets, block_sizes};

/// Global grid dimensions and physical cell size.
///
/// Invariants (checked by [`Grid::new`]): all dimensions are positive even
/// integers, and at least one of `nx`/`nz` is even — both requirements of the
/// real-to-complex FFT layout (`Nz/2 + 1` complex planes, a transposed-out
/// layout needing an even split axis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

impl Grid {
    pub fn new(dims: [usize; 3], cell_size: [f64; 3]) -> Result<Self, SolverError> {
        let [nx, ny, nz] = dims;
        let [dx, dy, dz] = cell_size;
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(SolverError::Config(
                "grid dimensions must be positive".into(),
            ));
        }
        if nx % 2 != 0 && nz % 2 != 0 {
            return Err(SolverError::Config(
                "at least one of nx, nz must be even for the r2c FFT layout".into(),
            ));
        }
        if dx <= 0.0 || dy <= 0.0 || dz <= 0.0 {
            return Err(SolverError::Config("cell size must be positive".into()));
        }
        Ok(Self {
            nx,
            ny,
            nz,
            dx,
            dy,
            dz,
        })
    }

    /// Number of complex planes along z after an in-place r2c transform.
    pub fn nz_complex(&self) -> usize {
        self.nz / 2 + 1
    }

    /// Total voxel count `Nx * Ny * Nz`.
    pub fn n_voxels(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Physical domain lengths `(Lx, Ly, Lz)`.
    pub fn lengths(&self) -> [f64; 3] {
        [
            self.nx as f64 * self.dx,
            self.ny as f64 * self.dy,
            self.nz as f64 * self.dz,
        ]
    }
}

/// This rank's slab of the global grid, before and after the FFT's
/// transposed-out forward transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decomposition {
    /// Owned slab count along x in the real layout.
    pub local_n0: usize,
    /// First owned x index in the real layout (in voxels, not bytes).
    pub local_0_start: usize,
    /// Owned slab count along y in the post-transpose complex layout.
    pub local_n1: usize,
    /// First owned y index in the post-transpose complex layout.
    pub local_1_start: usize,
    /// Size, in `f64`, the residual buffer's complex-reinterpreted view must
    /// be able to address — the larger of the real-padded layout and the
    /// post-transpose complex layout (matches `std::max(alloc_local*2, ...)`
    /// in the reference constructor).
    pub alloc_local: usize,
}

impl Decomposition {
    /// Derive a decomposition the way the reference FFTW "local size" query
    /// would, for rank `rank` of `size`: block-split `nx` for the real
    /// layout and `ny` for the post-transpose complex layout.
    pub fn block(grid: &Grid, rank: usize, size: usize, h: usize) -> Self {
        let n0_sizes = block_sizes(grid.nx, size);
        let n0_offsets = block_offsets(&n0_sizes);
        let n1_sizes = block_sizes(grid.ny, size);
        let n1_offsets = block_offsets(&n1_sizes);

        let local_n0 = n0_sizes[rank];
        let local_n1 = n1_sizes[rank];

        let real_padded_len = (local_n0 + 1) * grid.ny * (grid.nz + 2) * h;
        let complex_len = local_n1 * grid.nx * grid.nz_complex() * h * 2;
        let alloc_local = real_padded_len.max(complex_len);

        Self {
            local_n0,
            local_0_start: n0_offsets[rank],
            local_n1,
            local_1_start: n1_offsets[rank],
            alloc_local,
        }
    }

    /// Build from an explicit override supplied by a `Reader` instead of
    /// deriving one locally.
    pub fn from_override(o: crate::config::DecompositionOverride) -> Self {
        Self {
            local_n0: o.local_n0,
            local_0_start: o.local_0_start,
            local_n1: o.local_n1,
            local_1_start: o.local_1_start,
            alloc_local: o.alloc_local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_rejects_odd_nx_and_nz() {
        assert!(Grid::new([3, 4, 3], [1.0, 1.0, 1.0]).is_err());
        assert!(Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).is_ok());
        assert!(Grid::new([3, 4, 4], [1.0, 1.0, 1.0]).is_ok());
    }

    #[test]
    fn decomposition_single_rank_owns_everything() {
        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        assert_eq!(decomp.local_n0, 4);
        assert_eq!(decomp.local_0_start, 0);
        assert_eq!(decomp.local_n1, 4);
        assert_eq!(decomp.local_1_start, 0);
    }

    #[test]
    fn decomposition_sums_to_global_dims() {
        let grid = Grid::new([8, 8, 4], [1.0, 1.0, 1.0]).unwrap();
        let size = 3;
        let total_n0: usize = (0..size)
            .map(|r| Decomposition::block(&grid, r, size, 1).local_n0)
            .sum();
        let total_n1: usize = (0..size)
            .map(|r| Decomposition::block(&grid, r, size, 1).local_n1)
            .sum();
        assert_eq!(total_n0, grid.nx);
        assert_eq!(total_n1, grid.ny);
    }
}
