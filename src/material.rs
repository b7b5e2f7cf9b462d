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

//! Constitutive-law interface the kernel drives but never implements.
//!
//! The kernel is generic over the number of DOFs per node (`H`: 1 for scalar
//! conduction, 3 for mechanics) and over the material law itself. Everything
//! a real material model would own — internal variables, phase tables,
//! nonlinear iteration — lives behind this trait; the kernel only calls it at
//! the points the reference solver calls `Matmodel<howmany>`.

/// A constitutive law for an `H`-DOF-per-node problem.
///
/// Implementors own whatever internal state their law needs (plasticity
/// history, phase properties, ...); the kernel treats all of it as opaque
/// except through the methods below.
pub trait MaterialModel<const H: usize> {
    /// The `8H x 8H` reference element stiffness used to build the
    /// [`crate::green_operator::GreenOperator`]. Row/column `8*i + j` is
    /// corner `i`, DOF `j`.
    fn reference_element_stiffness(&self) -> Vec<f64>;

    /// Per-element residual contribution for one voxel's trilinear element.
    /// `u_e` has length `8*H` (corner-relative displacements, see
    /// [`crate::residual`]); the result has the same length.
    fn element_residual(&mut self, u_e: &[f64], phase: u16, voxel: usize) -> Vec<f64>;

    /// Strain and stress at one voxel, in Mandel notation, from the same
    /// corner-relative `u_e` used by `element_residual`.
    fn strain_stress(&mut self, u_e: &[f64], phase: u16, voxel: usize) -> (Vec<f64>, Vec<f64>);

    /// Install the macroscopic loading `g0` (length `n_str()`) that
    /// `element_residual`/`strain_stress` add to the local gradient.
    fn set_gradient(&mut self, g0: &[f64]);

    /// Allocate internal-variable storage for `n_voxels` owned voxels with
    /// `n_gauss` integration points each (8 for the trilinear element).
    fn initialize_internal_variables(&mut self, n_voxels: usize, n_gauss: usize);

    /// Commit the internal-variable state after a converged outer iteration.
    fn update_internal_variables(&mut self);

    /// Capture internal-variable state so a probing solve (homogenized
    /// tangent) can be rolled back without contaminating history.
    fn snapshot_internal_variables(&self) -> Vec<f64>;

    /// Restore state captured by `snapshot_internal_variables`.
    fn restore_internal_variables(&mut self, snapshot: &[f64]);

    /// The macroscopic loading last installed by `set_gradient`.
    fn macroscale_loading(&self) -> &[f64];

    /// Number of independent strain/stress components (1 for conduction, 6
    /// for mechanics in Mandel notation).
    fn n_str(&self) -> usize;

    /// Whether the law is linear, i.e. `get_homogenized_tangent` can use unit
    /// probes instead of finite-difference perturbation.
    fn is_linear(&self) -> bool;
}

/// Minimal reference material used only to exercise this crate's own
/// invariants (translation invariance, DC-mode annihilation, laminate
/// homogenization, ...). Not a general-purpose constitutive law.
#[cfg(any(test, feature = "testsupport"))]
pub mod linear {
    use super::MaterialModel;

    /// Isotropic linear conductivity/elasticity keyed by a per-phase scalar
    /// or tensor stored as a flat `H x H` row-major matrix.
    ///
    /// For `H == 1` this is scalar heat conduction (`n_str() == 3`, the
    /// temperature gradient); for `H == 3` it is isotropic linear elasticity
    /// in Mandel notation (`n_str() == 6`).
    pub struct LinearIsotropic<const H: usize> {
        /// `phase_tensors[p]` is the `H x H` constitutive tensor of phase `p`.
        phase_tensors: Vec<Vec<f64>>,
        gradient: Vec<f64>,
        n_str: usize,
    }

    impl LinearIsotropic<1> {
        /// Scalar conductivities, one per phase.
        pub fn conduction(conductivities: &[f64]) -> Self {
            let tensors = conductivities.iter().map(|&k| vec![k]).collect();
            Self {
                phase_tensors: tensors,
                gradient: vec![0.0; 3],
                n_str: 3,
            }
        }

        fn b_matrix(u_e: &[f64]) -> [f64; 3] {
            // Corner-relative trilinear gradient at the element center
            // (reference cube of unit side), i.e. the central-difference
            // average of the 8 corner values along each axis.
            let mut grad = [0.0; 3];
            // Corner ordering from ElementSweep: 0=(0,0,0) 1=(1,0,0)
            // 2=(0,1,0) 3=(1,1,0) 4=(0,0,1) 5=(1,0,1) 6=(0,1,1) 7=(1,1,1).
            let c = u_e;
            grad[0] = 0.25 * ((c[1] - c[0]) + (c[3] - c[2]) + (c[5] - c[4]) + (c[7] - c[6]));
            grad[1] = 0.25 * ((c[2] - c[0]) + (c[3] - c[1]) + (c[6] - c[4]) + (c[7] - c[5]));
            grad[2] = 0.25 * ((c[4] - c[0]) + (c[5] - c[1]) + (c[6] - c[2]) + (c[7] - c[3]));
            grad
        }
    }

    impl MaterialModel<1> for LinearIsotropic<1> {
        fn reference_element_stiffness(&self) -> Vec<f64> {
            // Trilinear-element conductivity stiffness for a unit-conductivity
            // unit cube, built from the same gradient operator used in
            // `element_residual`.
            let mut k = vec![0.0; 8 * 8];
            for a in 0..8 {
                let mut ea = [0.0; 8];
                ea[a] = 1.0;
                let ga = Self::b_matrix(&ea);
                for b in 0..8 {
                    let mut eb = [0.0; 8];
                    eb[b] = 1.0;
                    let gb = Self::b_matrix(&eb);
                    k[a * 8 + b] = ga[0] * gb[0] + ga[1] * gb[1] + ga[2] * gb[2];
                }
            }
            k
        }

        fn element_residual(&mut self, u_e: &[f64], phase: u16, _voxel: usize) -> Vec<f64> {
            let kappa = self.phase_tensors[phase as usize][0];
            let grad = Self::b_matrix(u_e);
            let flux = [
                kappa * (grad[0] + self.gradient[0]),
                kappa * (grad[1] + self.gradient[1]),
                kappa * (grad[2] + self.gradient[2]),
            ];
            (0..8)
                .map(|a| {
                    flux[0] * Self::shape_grad(a, 0)
                        + flux[1] * Self::shape_grad(a, 1)
                        + flux[2] * Self::shape_grad(a, 2)
                })
                .collect()
        }

        fn strain_stress(&mut self, u_e: &[f64], phase: u16, _voxel: usize) -> (Vec<f64>, Vec<f64>) {
            let kappa = self.phase_tensors[phase as usize][0];
            let grad = Self::b_matrix(u_e);
            let total = [
                grad[0] + self.gradient[0],
                grad[1] + self.gradient[1],
                grad[2] + self.gradient[2],
            ];
            let flux = vec![kappa * total[0], kappa * total[1], kappa * total[2]];
            (total.to_vec(), flux)
        }

        fn set_gradient(&mut self, g0: &[f64]) {
            self.gradient.copy_from_slice(g0);
        }

        fn initialize_internal_variables(&mut self, _n_voxels: usize, _n_gauss: usize) {}

        fn update_internal_variables(&mut self) {}

        fn snapshot_internal_variables(&self) -> Vec<f64> {
            self.gradient.clone()
        }

        fn restore_internal_variables(&mut self, snapshot: &[f64]) {
            self.gradient.copy_from_slice(snapshot);
        }

        fn macroscale_loading(&self) -> &[f64] {
            &self.gradient
        }

        fn n_str(&self) -> usize {
            self.n_str
        }

        fn is_linear(&self) -> bool {
            true
        }
    }

    impl LinearIsotropic<1> {
        /// Shape-function gradient of corner `a` along axis `axis`, matching
        /// the central-difference weights in `b_matrix`.
        fn shape_grad(a: usize, axis: usize) -> f64 {
            let sign = |bit: usize| if (a >> bit) & 1 == 1 { 1.0 } else { -1.0 };
            match axis {
                0 => 0.25 * sign(0),
                1 => 0.25 * sign(1),
                _ => 0.25 * sign(2),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn zero_gradient_zero_displacement_gives_zero_residual() {
            let mut mat = LinearIsotropic::conduction(&[1.0, 2.0]);
            mat.set_gradient(&[0.0, 0.0, 0.0]);
            let u_e = [0.0; 8];
            let res = mat.element_residual(&u_e, 0, 0);
            assert!(res.iter().all(|&v| v.abs() < 1e-12));
        }

        #[test]
        fn snapshot_restore_roundtrips_gradient() {
            let mut mat = LinearIsotropic::conduction(&[1.0]);
            mat.set_gradient(&[1.0, 2.0, 3.0]);
            let snap = mat.snapshot_internal_variables();
            mat.set_gradient(&[9.0, 9.0, 9.0]);
            mat.restore_internal_variables(&snap);
            assert_eq!(mat.macroscale_loading(), &[1.0, 2.0, 3.0]);
        }
    }
}
