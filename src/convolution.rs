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

//! Distributed real-to-complex FFT, decomposed into the three stages FFTW's
//! MPI transform would otherwise hide: a local 2D transform over the owned
//! x-slab's `(y, z)` plane, a global transpose of `x` against `y`, and a
//! local 1D transform over the now-local `x` axis. `convolve` sits between
//! the forward and inverse transform and applies the precomputed reference
//! operator mode by mode.

use std::sync::Arc;

use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::{Fft, FftPlanner};

use crate::green_operator::GreenOperator;
use crate::grid::{Decomposition, Grid};
use crate::topology::{block_offsets, block_sizes, Topology};

/// Caches the FFT plans and per-rank block layout needed to drive the three
/// transform stages; built once per solver instance and reused every
/// iteration, the way the reference implementation creates its FFTW plans
/// once in `CreateFFTWPlans`.
pub struct DistributedFft<const H: usize> {
    nx: usize,
    ny: usize,
    nz: usize,
    nz_complex: usize,
    local_n0: usize,
    local_n1: usize,
    r2c: Arc<dyn RealToComplex<f64>>,
    c2r: Arc<dyn ComplexToReal<f64>>,
    fft_y: Arc<dyn Fft<f64>>,
    ifft_y: Arc<dyn Fft<f64>>,
    fft_x: Arc<dyn Fft<f64>>,
    ifft_x: Arc<dyn Fft<f64>>,
    x_sizes: Vec<usize>,
    x_offsets: Vec<usize>,
    y_sizes: Vec<usize>,
    y_offsets: Vec<usize>,
    /// Scratch holding the local 2D transform's result, shape
    /// `[local_n0][Ny][Nz_complex][H]`, reused across calls.
    local_xform: Vec<Complex64>,
    pool: Option<scoped_threadpool::Pool>,
}

impl<const H: usize> DistributedFft<H> {
    pub fn new(grid: &Grid, decomp: &Decomposition, size: usize) -> Self {
        let mut real_planner = RealFftPlanner::<f64>::new();
        let mut complex_planner = FftPlanner::<f64>::new();

        let x_sizes = block_sizes(grid.nx, size);
        let x_offsets = block_offsets(&x_sizes);
        let y_sizes = block_sizes(grid.ny, size);
        let y_offsets = block_offsets(&y_sizes);

        let local_xform_len = decomp.local_n0 * grid.ny * grid.nz_complex() * H;

        Self {
            nx: grid.nx,
            ny: grid.ny,
            nz: grid.nz,
            nz_complex: grid.nz_complex(),
            local_n0: decomp.local_n0,
            local_n1: decomp.local_n1,
            r2c: real_planner.plan_fft_forward(grid.nz),
            c2r: real_planner.plan_fft_inverse(grid.nz),
            fft_y: complex_planner.plan_fft_forward(grid.ny),
            ifft_y: complex_planner.plan_fft_inverse(grid.ny),
            fft_x: complex_planner.plan_fft_forward(grid.nx),
            ifft_x: complex_planner.plan_fft_inverse(grid.nx),
            x_sizes,
            x_offsets,
            y_sizes,
            y_offsets,
            local_xform: vec![Complex64::new(0.0, 0.0); local_xform_len],
            pool: None,
        }
    }

    /// Parallelize the z-axis r2c/c2r stage across `n` worker threads,
    /// chunked by whole owned x-slabs (each slab's row is independent, no
    /// cross-thread writes).
    pub fn with_threads(mut self, n: usize) -> Self {
        if n > 1 {
            self.pool = Some(scoped_threadpool::Pool::new(n as u32));
        }
        self
    }

    /// Forward real-to-complex transform. `real_padded` is this rank's owned
    /// x-slab in the padded real layout (`local_n0 * Ny * (Nz + 2) * H`
    /// elements, the trailing 2 reals per row ignored — padding only matters
    /// for the reference's in-place FFTW layout, not this out-of-place one).
    /// `out` receives the post-transpose complex field, `local_n1 * Nx *
    /// Nz_complex * H` entries in `(iy, ix, iz)` row-major order with `H`
    /// trailing components, matching [`GreenOperator`]'s frequency indexing.
    pub fn forward(&mut self, real_padded: &[f64], topology: &dyn Topology, out: &mut [Complex64]) {
        self.local_r2c_z(real_padded);
        self.local_c2c_y(Direction::Forward);
        self.transpose_x_to_y(topology, out);
        self.local_c2c_x(out, Direction::Forward);
    }

    /// Inverse of [`Self::forward`]: consumes the post-convolution complex
    /// field and writes the real padded layout back into `real_padded`.
    pub fn inverse(
        &mut self,
        complex_in: &mut [Complex64],
        topology: &dyn Topology,
        real_padded: &mut [f64],
    ) {
        self.local_c2c_x(complex_in, Direction::Inverse);
        self.transpose_y_to_x(topology, complex_in);
        self.local_c2c_y(Direction::Inverse);
        self.local_c2r_z(real_padded);
    }

    /// Apply the reference operator to every owned frequency.
    pub fn convolve(&self, rhat: &mut [Complex64], green: &GreenOperator<H>) {
        let n_freq = green.n_freq();
        for ind in 0..n_freq {
            let base = ind * H;
            let mut v: [Complex64; H] = std::array::from_fn(|h| rhat[base + h]);
            green.apply(ind, &mut v);
            for h in 0..H {
                rhat[base + h] = v[h];
            }
        }
    }

    fn local_r2c_z(&mut self, real_padded: &[f64]) {
        let row_stride = (self.nz + 2) * H;
        let xform_row_len = self.ny * self.nz_complex * H;
        let (nz, nz_complex) = (self.nz, self.nz_complex);
        let r2c = &self.r2c;

        match self.pool.as_mut() {
            Some(pool) => {
                let threads = pool.thread_count().max(1) as usize;
                let chunk_slabs = self.local_n0.div_ceil(threads).max(1);
                pool.scoped(|scope| {
                    let real_chunks = real_padded.chunks(chunk_slabs * self.ny * row_stride);
                    let xform_chunks = self.local_xform.chunks_mut(chunk_slabs * xform_row_len);
                    for (real_chunk, xform_chunk) in real_chunks.zip(xform_chunks) {
                        let r2c = r2c.clone();
                        scope.execute(move || {
                            r2c_rows::<H>(real_chunk, xform_chunk, row_stride, nz, nz_complex, &r2c);
                        });
                    }
                });
            }
            None => {
                r2c_rows::<H>(real_padded, &mut self.local_xform, row_stride, nz, nz_complex, r2c);
            }
        }
    }

    fn local_c2r_z(&mut self, real_padded: &mut [f64]) {
        let row_stride = (self.nz + 2) * H;
        let mut in_buf = self.c2r.make_input_vec();
        let mut out_buf = vec![0.0f64; self.nz];
        for ix in 0..self.local_n0 {
            for iy in 0..self.ny {
                let src_base = ((ix * self.ny + iy) * self.nz_complex) * H;
                let row_base = (ix * self.ny + iy) * row_stride;
                for h in 0..H {
                    for iz in 0..self.nz_complex {
                        in_buf[iz] = self.local_xform[src_base + iz * H + h];
                    }
                    self.c2r.process(&mut in_buf, &mut out_buf).expect("c2r transform");
                    for iz in 0..self.nz {
                        real_padded[row_base + iz * H + h] = out_buf[iz];
                    }
                }
            }
        }
    }

    fn local_c2c_y(&mut self, direction: Direction) {
        let fft = match direction {
            Direction::Forward => &self.fft_y,
            Direction::Inverse => &self.ifft_y,
        };
        let mut buf = vec![Complex64::new(0.0, 0.0); self.ny];
        for ix in 0..self.local_n0 {
            for iz in 0..self.nz_complex {
                for h in 0..H {
                    for iy in 0..self.ny {
                        let idx = ((ix * self.ny + iy) * self.nz_complex + iz) * H + h;
                        buf[iy] = self.local_xform[idx];
                    }
                    fft.process(&mut buf);
                    for iy in 0..self.ny {
                        let idx = ((ix * self.ny + iy) * self.nz_complex + iz) * H + h;
                        self.local_xform[idx] = buf[iy];
                    }
                }
            }
        }
    }

    fn local_c2c_x(&self, field: &mut [Complex64], direction: Direction) {
        let fft = match direction {
            Direction::Forward => &self.fft_x,
            Direction::Inverse => &self.ifft_x,
        };
        let mut buf = vec![Complex64::new(0.0, 0.0); self.nx];
        for iy in 0..self.local_n1 {
            for iz in 0..self.nz_complex {
                for h in 0..H {
                    for ix in 0..self.nx {
                        let idx = (iy * self.nx * self.nz_complex + ix * self.nz_complex + iz) * H + h;
                        buf[ix] = field[idx];
                    }
                    fft.process(&mut buf);
                    for ix in 0..self.nx {
                        let idx = (iy * self.nx * self.nz_complex + ix * self.nz_complex + iz) * H + h;
                        field[idx] = buf[ix];
                    }
                }
            }
        }
    }

    /// Redistribute `local_xform` (owned by x-slab) into `out` (owned by
    /// y-slab), i.e. the forward global transpose.
    fn transpose_x_to_y(&self, topology: &dyn Topology, out: &mut [Complex64]) {
        let size = self.y_sizes.len();
        let per_elem = self.nz_complex * H;

        let mut send = Vec::with_capacity(self.local_xform.len());
        let mut send_counts = vec![0usize; size];
        for (d, &y_size) in self.y_sizes.iter().enumerate() {
            let y_start = self.y_offsets[d];
            send_counts[d] = self.local_n0 * y_size * per_elem;
            for ix in 0..self.local_n0 {
                let row_base = ix * self.ny * per_elem;
                for iy in y_start..y_start + y_size {
                    let start = row_base + iy * per_elem;
                    send.extend_from_slice(&self.local_xform[start..start + per_elem]);
                }
            }
        }

        let recv_counts: Vec<usize> = self
            .x_sizes
            .iter()
            .map(|&x_size| x_size * self.local_n1 * per_elem)
            .collect();
        let mut recv = vec![Complex64::new(0.0, 0.0); recv_counts.iter().sum()];
        topology.transpose_xy(&send, &send_counts, &mut recv, &recv_counts);

        let recv_offsets = block_offsets(&recv_counts);
        for (s, &x_size) in self.x_sizes.iter().enumerate() {
            let x_start = self.x_offsets[s];
            let mut cursor = recv_offsets[s];
            for ix_local in 0..x_size {
                let ix = x_start + ix_local;
                for iy_local in 0..self.local_n1 {
                    let dest = (iy_local * self.nx * self.nz_complex + ix * self.nz_complex) * H;
                    out[dest..dest + per_elem].copy_from_slice(&recv[cursor..cursor + per_elem]);
                    cursor += per_elem;
                }
            }
        }
    }

    /// Inverse of [`Self::transpose_x_to_y`]: redistribute `field` (owned by
    /// y-slab) back into `local_xform` (owned by x-slab).
    fn transpose_y_to_x(&mut self, topology: &dyn Topology, field: &[Complex64]) {
        let size = self.x_sizes.len();
        let per_elem = self.nz_complex * H;

        let mut send = Vec::with_capacity(field.len());
        let mut send_counts = vec![0usize; size];
        for (d, &x_size) in self.x_sizes.iter().enumerate() {
            let x_start = self.x_offsets[d];
            send_counts[d] = x_size * self.local_n1 * per_elem;
            for ix in x_start..x_start + x_size {
                for iy in 0..self.local_n1 {
                    let start = (iy * self.nx * self.nz_complex + ix * self.nz_complex) * H;
                    send.extend_from_slice(&field[start..start + per_elem]);
                }
            }
        }

        let recv_counts: Vec<usize> = self
            .y_sizes
            .iter()
            .map(|&y_size| self.local_n0 * y_size * per_elem)
            .collect();
        let mut recv = vec![Complex64::new(0.0, 0.0); recv_counts.iter().sum()];
        topology.transpose_xy(&send, &send_counts, &mut recv, &recv_counts);

        let recv_offsets = block_offsets(&recv_counts);
        for (s, &y_size) in self.y_sizes.iter().enumerate() {
            let y_start = self.y_offsets[s];
            let mut cursor = recv_offsets[s];
            for ix in 0..self.local_n0 {
                let row_base = ix * self.ny * per_elem;
                for iy_local in 0..y_size {
                    let iy = y_start + iy_local;
                    let dest = row_base + iy * per_elem;
                    self.local_xform[dest..dest + per_elem]
                        .copy_from_slice(&recv[cursor..cursor + per_elem]);
                    cursor += per_elem;
                }
            }
        }
    }
}

/// Transforms every `(ix, iy, h)` row in `real_chunk` (a contiguous run of
/// whole x-slabs) independently, writing into the matching rows of
/// `xform_chunk`. Used both serially and as the per-thread body when a pool
/// is configured.
fn r2c_rows<const H: usize>(
    real_chunk: &[f64],
    xform_chunk: &mut [Complex64],
    row_stride: usize,
    nz: usize,
    nz_complex: usize,
    r2c: &Arc<dyn RealToComplex<f64>>,
) {
    let mut in_buf = vec![0.0f64; nz];
    let mut out_buf = r2c.make_output_vec();
    let rows = real_chunk.len() / row_stride;
    for row in 0..rows {
        let row_base = row * row_stride;
        let dest_base = row * nz_complex * H;
        for h in 0..H {
            for iz in 0..nz {
                in_buf[iz] = real_chunk[row_base + iz * H + h];
            }
            r2c.process(&mut in_buf, &mut out_buf).expect("r2c transform");
            for iz in 0..nz_complex {
                xform_chunk[dest_base + iz * H + h] = out_buf[iz];
            }
        }
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Forward,
    Inverse,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SingleRankTopology;

    #[test]
    fn forward_then_inverse_round_trips_single_rank() {
        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        let topo = SingleRankTopology;
        let mut fft = DistributedFft::<1>::new(&grid, &decomp, 1);

        let row_stride = (grid.nz + 2) * 1;
        let mut real = vec![0.0; decomp.local_n0 * grid.ny * row_stride];
        for (i, v) in real.iter_mut().enumerate() {
            if i % row_stride < grid.nz {
                *v = (i % 7) as f64;
            }
        }
        let original = real.clone();

        let n_complex = decomp.local_n1 * grid.nx * grid.nz_complex();
        let mut freq = vec![Complex64::new(0.0, 0.0); n_complex];
        fft.forward(&real, &topo, &mut freq);
        fft.inverse(&mut freq, &topo, &mut real);

        let norm = (grid.nx * grid.ny * grid.nz) as f64;
        for (a, b) in real.iter().zip(original.iter()) {
            assert!((a / norm - b).abs() < 1e-8, "{} vs {}", a / norm, b);
        }
    }
}
