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

//! Construction and application of the reference-medium Green operator.
//!
//! One `H x H` symmetric matrix is stored per owned frequency triple,
//! derived from the reference material's `8H x 8H` element stiffness
//! projected onto the Fourier mode shape. Consecutive frequencies are packed
//! into shared column groups (lower triangle for the even one, upper for the
//! odd) so the convolution step only ever needs to read, never transpose.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::grid::{Decomposition, Grid};
use crate::material::MaterialModel;

/// Per-frequency inverse reference operator, packed two-to-a-block.
pub struct GreenOperator<const H: usize> {
    /// `2*H*H` floats per pair of frequencies: `[0, H*H)` the even
    /// frequency's lower triangle (column-major, unused entries zero),
    /// `[H*H, 2*H*H)` the odd frequency's upper triangle.
    data: Vec<f64>,
    nx: usize,
    nz_complex: usize,
    local_n1: usize,
}

impl<const H: usize> GreenOperator<H> {
    /// Number of owned frequency triples, in the same `(iy, ix, iz)`
    /// row-major order used to index `data`.
    pub fn n_freq(&self) -> usize {
        self.local_n1 * self.nx * self.nz_complex
    }

    pub fn build(
        grid: &Grid,
        decomp: &Decomposition,
        material: &dyn MaterialModel<H>,
    ) -> Self {
        let nx = grid.nx;
        let ny = grid.ny;
        let nz = grid.nz;
        let nz_complex = grid.nz_complex();
        let local_n1 = decomp.local_n1;
        let local_1_start = decomp.local_1_start;

        let ker0 = material.reference_element_stiffness();
        debug_assert_eq!(ker0.len(), 8 * H * 8 * H);

        let n_freq = local_n1 * nx * nz_complex;
        let n_pairs = n_freq.div_ceil(2);
        let mut data = vec![0.0; n_pairs * 2 * H * H];

        let eta = |i: f64, n: usize| -> Complex64 {
            let theta = 2.0 * PI * i / n as f64;
            Complex64::new(theta.cos(), theta.sin())
        };

        for iy in 0..local_n1 {
            let global_iy = local_1_start + iy;
            for ix in 0..nx {
                for iz in 0..nz_complex {
                    if ix == 0 && global_iy == 0 && iz == 0 {
                        continue;
                    }
                    let ex = eta(ix as f64, nx);
                    let ey = eta(global_iy as f64, ny);
                    let ez = eta(iz as f64, nz);
                    let a = [
                        Complex64::new(1.0, 0.0),
                        ex,
                        ey,
                        ex * ey,
                        ez,
                        ex * ez,
                        ez * ey,
                        ex * ey * ez,
                    ];
                    let mut aa = [[0.0; 8]; 8];
                    for p in 0..8 {
                        for q in 0..8 {
                            aa[p][q] = a[p].re * a[q].re + a[p].im * a[q].im;
                        }
                    }

                    let mut block = vec![0.0; H * H];
                    for i in 0..H {
                        for j in i..H {
                            let mut sum = 0.0;
                            for p in 0..8 {
                                for q in 0..8 {
                                    sum += ker0[(8 * i + p) * (8 * H) + (8 * j + q)] * aa[p][q];
                                }
                            }
                            block[i * H + j] = sum;
                            block[j * H + i] = sum;
                        }
                    }
                    let inv = gauss_jordan_inverse(&block, H)
                        .expect("reference element stiffness must be invertible per mode");

                    let ind = iy * (nx * nz_complex) + ix * nz_complex + iz;
                    let pair = ind / 2;
                    let base = pair * 2 * H * H;
                    let (dest_offset, lower) = if ind % 2 == 0 {
                        (base, true)
                    } else {
                        (base + H * H, false)
                    };
                    for col in 0..H {
                        for row in 0..H {
                            let keep = if lower { row >= col } else { row <= col };
                            if keep {
                                data[dest_offset + col * H + row] = inv[row * H + col];
                            }
                        }
                    }
                }
            }
        }

        let norm = (nx * ny * nz) as f64;
        for v in data.iter_mut() {
            *v /= norm;
        }

        Self {
            data,
            nx,
            nz_complex,
            local_n1,
        }
    }

    /// Apply the stored symmetric matrix for frequency `ind` (row-major
    /// `(iy, ix, iz)` index, same order as [`Self::build`]) to `v` in place.
    pub fn apply(&self, ind: usize, v: &mut [Complex64; H]) {
        let pair = ind / 2;
        let base = pair * 2 * H * H;
        let (offset, lower) = if ind % 2 == 0 {
            (base, true)
        } else {
            (base + H * H, false)
        };
        let mut out = [Complex64::new(0.0, 0.0); H];
        for row in 0..H {
            for col in 0..H {
                let (r, c) = if (lower && row >= col) || (!lower && row <= col) {
                    (row, col)
                } else {
                    (col, row)
                };
                out[row] += self.data[offset + c * H + r] * v[col];
            }
        }
        *v = out;
    }
}

/// Gauss-Jordan inversion with partial pivoting for a small, row-major `h x
/// h` matrix. `H` is always 1 or 3 in this crate's supported problems, so no
/// external linear-algebra dependency is pulled in for this.
fn gauss_jordan_inverse(m: &[f64], h: usize) -> Option<Vec<f64>> {
    let mut aug = vec![0.0; h * 2 * h];
    for i in 0..h {
        for j in 0..h {
            aug[i * 2 * h + j] = m[i * h + j];
        }
        aug[i * 2 * h + h + i] = 1.0;
    }

    for col in 0..h {
        let pivot_row = (col..h).max_by(|&a, &b| {
            aug[a * 2 * h + col]
                .abs()
                .partial_cmp(&aug[b * 2 * h + col].abs())
                .unwrap()
        })?;
        if aug[pivot_row * 2 * h + col].abs() < 1e-14 {
            return None;
        }
        if pivot_row != col {
            for k in 0..2 * h {
                aug.swap(col * 2 * h + k, pivot_row * 2 * h + k);
            }
        }
        let pivot = aug[col * 2 * h + col];
        for k in 0..2 * h {
            aug[col * 2 * h + k] /= pivot;
        }
        for row in 0..h {
            if row == col {
                continue;
            }
            let factor = aug[row * 2 * h + col];
            if factor == 0.0 {
                continue;
            }
            for k in 0..2 * h {
                aug[row * 2 * h + k] -= factor * aug[col * 2 * h + k];
            }
        }
    }

    let mut inv = vec![0.0; h * h];
    for i in 0..h {
        for j in 0..h {
            inv[i * h + j] = aug[i * 2 * h + h + j];
        }
    }
    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::linear::LinearIsotropic;

    #[test]
    fn inverts_identity() {
        let id = vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
        let inv = gauss_jordan_inverse(&id, 3).unwrap();
        assert_eq!(inv, id);
    }

    #[test]
    fn inverts_scalar() {
        let inv = gauss_jordan_inverse(&[2.0], 1).unwrap();
        assert!((inv[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn dc_mode_is_zero() {
        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        let mat = LinearIsotropic::conduction(&[1.0]);
        let op = GreenOperator::<1>::build(&grid, &decomp, &mat);
        let mut v = [Complex64::new(1.0, 1.0)];
        op.apply(0, &mut v);
        assert_eq!(v[0], Complex64::new(0.0, 0.0));
    }

    #[test]
    fn nonzero_mode_is_not_annihilated() {
        let grid = Grid::new([4, 4, 4], [1.0, 1.0, 1.0]).unwrap();
        let decomp = Decomposition::block(&grid, 0, 1, 1);
        let mat = LinearIsotropic::conduction(&[1.0]);
        let op = GreenOperator::<1>::build(&grid, &decomp, &mat);
        let mut v = [Complex64::new(1.0, 0.0)];
        op.apply(1, &mut v);
        assert!(v[0].norm() > 0.0);
    }
}
