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

//! Residual assembly: the translation-invariant element sweep that turns the
//! fluctuation field `u` into the out-of-balance residual `r`.

use crate::grid::{Decomposition, Grid};
use crate::material::MaterialModel;
use crate::sweep::ElementSweep;
use crate::topology::Topology;

pub struct ResidualAssembler {
    sweep: ElementSweep,
    ny: usize,
    nz: usize,
    local_n0: usize,
}

impl ResidualAssembler {
    pub fn new(grid: &Grid, decomp: &Decomposition) -> Self {
        Self {
            sweep: ElementSweep::new(grid, decomp),
            ny: grid.ny,
            nz: grid.nz,
            local_n0: decomp.local_n0,
        }
    }

    /// Assemble `r` (real padded layout, `padding` reals of slack per row)
    /// from `u` (unpadded layout) and the per-voxel phase table `ms`.
    ///
    /// `u` must already hold valid data for `local_n0 * Ny * Nz * H`
    /// entries; this call performs the ring ghost exchange of `u`'s leading
    /// slab into its own trailing ghost slab, and afterwards folds the
    /// neighbor's received residual contribution (via `halo`) back into this
    /// rank's first owned slab — exactly the two `MPI_Sendrecv` calls in the
    /// reference `compute_residual_basic`.
    pub fn assemble<const H: usize>(
        &self,
        u: &mut [f64],
        r: &mut [f64],
        halo: &mut [f64],
        ms: &[u16],
        padding: usize,
        material: &mut dyn MaterialModel<H>,
        topology: &dyn Topology,
    ) {
        let row_len = self.ny * self.nz * H;
        let row_len_pad = self.ny * (self.nz + padding) * H;

        r[..self.local_n0 * row_len_pad].fill(0.0);
        r[self.local_n0 * row_len_pad..(self.local_n0 + 1) * row_len_pad].fill(0.0);

        let (owned, ghost) = u.split_at_mut(self.local_n0 * row_len);
        topology.sendrecv_ring(&owned[..row_len], &mut ghost[..row_len]);

        let mut u_e = vec![0.0; 8 * H];
        self.sweep.sweep(padding, |idx, idx_pad| {
            let voxel = idx[0];
            let phase = ms[voxel];
            for corner in 0..8 {
                for comp in 0..H {
                    u_e[H * corner + comp] =
                        u[H * idx[corner] + comp] - u[H * idx[0] + comp];
                }
            }
            let res_e = material.element_residual(&u_e, phase, voxel);
            for corner in 0..8 {
                for comp in 0..H {
                    r[H * idx_pad[corner] + comp] += res_e[H * corner + comp];
                }
            }
        });

        let tail_start = self.local_n0 * row_len_pad;
        topology.sendrecv_ring(&r[tail_start..tail_start + row_len_pad], halo);

        for (dst, src) in r[..row_len_pad].iter_mut().zip(halo.iter()) {
            *dst += src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::linear::LinearIsotropic;
    use crate::topology::SingleRankTopology;

    #[test]
    fn zero_gradient_zero_displacement_gives_zero_residual() {
        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        let assembler = ResidualAssembler::new(&grid, &decomp);
        let mut material = LinearIsotropic::conduction(&[1.0]);
        material.initialize_internal_variables(decomp.local_n0 * grid.ny * grid.nz, 8);

        let mut u = vec![0.0; (decomp.local_n0 + 1) * grid.ny * grid.nz];
        let mut r = vec![0.0; (decomp.local_n0 + 1) * grid.ny * (grid.nz + 2)];
        let mut halo = vec![0.0; grid.ny * (grid.nz + 2)];
        let ms = vec![0u16; grid.nx * grid.ny * grid.nz];
        let topo = SingleRankTopology;

        assembler.assemble::<1>(&mut u, &mut r, &mut halo, &ms, 2, &mut material, &topo);
        assert!(r.iter().all(|&v| v.abs() < 1e-12));
    }
}
