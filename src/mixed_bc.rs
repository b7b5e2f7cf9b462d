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

//! Mixed boundary-condition hook.
//!
//! A mixed-BC controller mutates the macroscopic gradient between solves
//! (e.g. enforcing a prescribed stress component instead of a prescribed
//! strain). Its internals are out of scope here; the core only needs a
//! narrow capability to read/write the gradient it drives, which is what
//! [`GradientSink`] provides instead of the controller owning the solver
//! outright.

/// The macroscopic-loading surface a [`MixedBcController`] is allowed to
/// touch, without owning the solver it's attached to.
pub trait GradientSink {
    fn n_str(&self) -> usize;
    fn gradient(&self) -> &[f64];
    fn set_gradient(&mut self, g0: &[f64]);
}

/// An external collaborator that adjusts the macroscopic gradient step by
/// step to satisfy a mixed boundary condition (e.g. a target average
/// stress). Not implemented in this crate; callers provide their own.
pub trait MixedBcController {
    /// Called once to begin enforcing the condition, `step` identifying the
    /// load step the caller is on.
    fn enable(&mut self, sink: &mut dyn GradientSink, step: usize);
    /// Stop enforcing the condition; the gradient is left as-is.
    fn disable(&mut self);
    /// Called after each converged (or perturbation) solve to adjust the
    /// gradient toward the target.
    fn update(&mut self, sink: &mut dyn GradientSink);
    fn is_active(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedGradient {
        g: Vec<f64>,
    }

    impl GradientSink for FixedGradient {
        fn n_str(&self) -> usize {
            self.g.len()
        }
        fn gradient(&self) -> &[f64] {
            &self.g
        }
        fn set_gradient(&mut self, g0: &[f64]) {
            self.g.copy_from_slice(g0);
        }
    }

    struct DoubleEveryUpdate {
        active: bool,
    }

    impl MixedBcController for DoubleEveryUpdate {
        fn enable(&mut self, _sink: &mut dyn GradientSink, _step: usize) {
            self.active = true;
        }
        fn disable(&mut self) {
            self.active = false;
        }
        fn update(&mut self, sink: &mut dyn GradientSink) {
            let doubled: Vec<f64> = sink.gradient().iter().map(|v| v * 2.0).collect();
            sink.set_gradient(&doubled);
        }
        fn is_active(&self) -> bool {
            self.active
        }
    }

    #[test]
    fn controller_mutates_gradient_through_sink_without_owning_it() {
        let mut sink = FixedGradient { g: vec![1.0, 2.0] };
        let mut controller = DoubleEveryUpdate { active: false };
        controller.enable(&mut sink, 0);
        controller.update(&mut sink);
        assert_eq!(sink.gradient(), &[2.0, 4.0]);
        assert!(controller.is_active());
        controller.disable();
        assert!(!controller.is_active());
    }
}
