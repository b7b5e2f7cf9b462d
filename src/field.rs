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

//! Owns the three buffers the solver mutates every iteration: the
//! fluctuation field `u`, the residual/FFT buffer `r`, and the halo receive
//! buffer used when folding residual contributions back from a neighbor.

use num_complex::Complex64;

use crate::grid::{Decomposition, Grid};

/// Real-valued field storage shared between the residual assembler and the
/// distributed FFT.
///
/// `r` is allocated large enough to also be addressed as a `Complex64` slice
/// in place (the post-transform layout), exactly like the reference
/// implementation's `v_r`/`rhat` pair sharing one `fftw_alloc_real` buffer.
/// Reinterpretation is done with `bytemuck` rather than a raw pointer cast:
/// `num_complex::Complex<f64>` is `#[repr(C)]` with two adjacent `f64`
/// fields, so a `[f64]` of even length and a `[Complex64]` half that length
/// describe the same bytes.
pub struct FieldStore {
    pub h: usize,
    /// `(local_n0 + 1) * Ny * Nz * H`
    u: Vec<f64>,
    /// `alloc_local` — large enough for both the padded real layout and the
    /// post-transpose complex layout.
    r: Vec<f64>,
    /// `Ny * (Nz + 2) * H` scratch for the residual ghost-fold receive.
    halo: Vec<f64>,
}

impl FieldStore {
    pub fn new(grid: &Grid, decomp: &Decomposition, h: usize) -> Self {
        let u_len = (decomp.local_n0 + 1) * grid.ny * grid.nz * h;
        let halo_len = grid.ny * (grid.nz + 2) * h;
        Self {
            h,
            u: vec![0.0; u_len],
            r: vec![0.0; decomp.alloc_local],
            halo: vec![0.0; halo_len],
        }
    }

    pub fn u(&self) -> &[f64] {
        &self.u
    }

    pub fn u_mut(&mut self) -> &mut [f64] {
        &mut self.u
    }

    pub fn r(&self) -> &[f64] {
        &self.r
    }

    pub fn r_mut(&mut self) -> &mut [f64] {
        &mut self.r
    }

    pub fn halo_mut(&mut self) -> &mut [f64] {
        &mut self.halo
    }

    /// Borrow `u`, `r` and `halo` mutably at once, split so the residual
    /// assembler can gather/scatter/fold through one [`Solver`](crate::solver::Solver)
    /// call without three overlapping `&mut self.field` borrows.
    pub fn u_r_halo_mut(&mut self) -> (&mut [f64], &mut [f64], &mut [f64]) {
        (&mut self.u, &mut self.r, &mut self.halo)
    }

    /// Reinterpret the first `n_complex` `Complex64` values of `r` as a
    /// mutable complex slice, for the distributed FFT stages.
    pub fn r_as_complex_mut(&mut self, n_complex: usize) -> &mut [Complex64] {
        let words = n_complex * 2;
        bytemuck::cast_slice_mut(&mut self.r[..words])
    }

    pub fn r_as_complex(&self, n_complex: usize) -> &[Complex64] {
        let words = n_complex * 2;
        bytemuck::cast_slice(&self.r[..words])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complex_reinterpretation_round_trips() {
        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        let mut store = FieldStore::new(&grid, &decomp, 1);
        {
            let complex = store.r_as_complex_mut(2);
            complex[0] = Complex64::new(1.0, 2.0);
            complex[1] = Complex64::new(3.0, 4.0);
        }
        assert_eq!(&store.r()[..4], &[1.0, 2.0, 3.0, 4.0]);
    }
}
