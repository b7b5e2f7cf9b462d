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

//! Collective-communication abstraction.
//!
//! Every ghost exchange, reduction and the FFT's global transpose in this
//! crate goes through the [`Topology`] trait instead of calling an MPI
//! binding directly. That keeps the raw `mpi::*` calls confined to
//! [`MpiTopology`] (mirroring how `green-kernels` pairs its optional `mpi`
//! feature with a small distributed-utilities layer) and lets every test in
//! this crate run against [`SingleRankTopology`] without an `mpiexec`
//! launcher.

use num_complex::Complex64;

/// A rank's view of the collective operations the solver needs.
///
/// All methods are collective: every rank in the communicator must call the
/// same sequence of them, with matching buffer sizes, or the run deadlocks.
pub trait Topology: Send + Sync {
    /// This rank's index in `[0, size())`.
    fn rank(&self) -> i32;
    /// Total number of ranks in the communicator.
    fn size(&self) -> i32;

    /// Ring exchange: send `send` to `rank - 1 (mod size)`, receive into
    /// `recv` from `rank + 1 (mod size)`. `send` and `recv` must be the same
    /// length. Blocking, matches `MPI_Sendrecv` tagged 0 in the reference
    /// implementation.
    fn sendrecv_ring(&self, send: &[f64], recv: &mut [f64]);

    /// Global maximum reduction of a single scalar (the reference solver's
    /// deliberately-non-algebraic norm reduction, see
    /// [`crate::config::NormReduction`]).
    fn allreduce_max(&self, local: f64) -> f64;

    /// Global sum reduction of a single scalar.
    fn allreduce_sum_scalar(&self, local: f64) -> f64;

    /// Global, elementwise sum reduction of a buffer, in place.
    fn allreduce_sum_into(&self, buf: &mut [f64]);

    /// Global sum reduction of a single counter.
    fn allreduce_sum_usize(&self, local: usize) -> usize;

    /// Collective barrier.
    fn barrier(&self);

    /// Global transpose of the FFT's distributed axis: every rank sends
    /// contiguous chunks of `send` (sized by `send_counts`, in `Complex64`
    /// units) to every other rank and receives contiguous chunks into `recv`
    /// (sized by `recv_counts`). This is the MPI `Alltoallv` this crate uses
    /// in place of linking `fftw3_mpi`; see `convolution.rs`.
    fn transpose_xy(
        &self,
        send: &[Complex64],
        send_counts: &[usize],
        recv: &mut [Complex64],
        recv_counts: &[usize],
    );
}

/// In-process stand-in for a communicator of size 1.
///
/// Used both as the degenerate single-rank case of a real run and as the
/// implementation every unit test in this crate runs against, since spinning
/// up an MPI launcher is outside a `cargo test` process's reach. All
/// collectives reduce to the identity or a local copy.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleRankTopology;

impl Topology for SingleRankTopology {
    fn rank(&self) -> i32 {
        0
    }

    fn size(&self) -> i32 {
        1
    }

    fn sendrecv_ring(&self, send: &[f64], recv: &mut [f64]) {
        recv.copy_from_slice(send);
    }

    fn allreduce_max(&self, local: f64) -> f64 {
        local
    }

    fn allreduce_sum_scalar(&self, local: f64) -> f64 {
        local
    }

    fn allreduce_sum_into(&self, _buf: &mut [f64]) {}

    fn allreduce_sum_usize(&self, local: usize) -> usize {
        local
    }

    fn barrier(&self) {}

    fn transpose_xy(
        &self,
        send: &[Complex64],
        send_counts: &[usize],
        recv: &mut [Complex64],
        recv_counts: &[usize],
    ) {
        debug_assert_eq!(send_counts, recv_counts);
        recv.copy_from_slice(send);
    }
}

/// Splits `n` into `size` blocks the way the reference FFTW "local size"
/// query would: the first `n % size` ranks get `ceil(n / size)` elements,
/// the rest get `floor(n / size)`.
pub fn block_sizes(n: usize, size: usize) -> Vec<usize> {
    let base = n / size;
    let remainder = n % size;
    (0..size)
        .map(|rank| base + usize::from(rank < remainder))
        .collect()
}

/// Cumulative offsets for [`block_sizes`] (the starting index of each block).
pub fn block_offsets(sizes: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(sizes.len());
    let mut acc = 0;
    for &s in sizes {
        offsets.push(acc);
        acc += s;
    }
    offsets
}

#[cfg(feature = "mpi")]
mod mpi_backend {
    use super::Topology;
    use mpi::collective::SystemOperation;
    use mpi::datatype::PartitionMut;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;
    use num_complex::Complex64;

    /// Real, multi-process communicator backed by the `mpi` crate (rsmpi).
    ///
    /// Every raw `mpi::*` call in this crate lives in this module; the rest
    /// of the solver only ever sees the [`Topology`] trait.
    pub struct MpiTopology {
        world: SimpleCommunicator,
    }

    impl MpiTopology {
        /// Wrap the world communicator of an already-initialized MPI
        /// [`mpi::environment::Universe`]. Call `mpi::initialize()` once at
        /// process startup and keep the `Universe` alive for the process
        /// lifetime before constructing this.
        pub fn new(world: SimpleCommunicator) -> Self {
            Self { world }
        }
    }

    impl Topology for MpiTopology {
        fn rank(&self) -> i32 {
            self.world.rank()
        }

        fn size(&self) -> i32 {
            self.world.size()
        }

        fn sendrecv_ring(&self, send: &[f64], recv: &mut [f64]) {
            let size = self.world.size();
            let rank = self.world.rank();
            let prev = (rank + size - 1) % size;
            let next = (rank + 1) % size;
            self.world
                .process_at_rank(prev)
                .send_receive_into(send, &self.world.process_at_rank(next), recv);
        }

        fn allreduce_max(&self, local: f64) -> f64 {
            let mut global = 0.0;
            self.world
                .all_reduce_into(&local, &mut global, SystemOperation::max());
            global
        }

        fn allreduce_sum_scalar(&self, local: f64) -> f64 {
            let mut global = 0.0;
            self.world
                .all_reduce_into(&local, &mut global, SystemOperation::sum());
            global
        }

        fn allreduce_sum_into(&self, buf: &mut [f64]) {
            let local = buf.to_vec();
            self.world
                .all_reduce_into(&local[..], buf, SystemOperation::sum());
        }

        fn allreduce_sum_usize(&self, local: usize) -> usize {
            let local = local as u64;
            let mut global = 0u64;
            self.world
                .all_reduce_into(&local, &mut global, SystemOperation::sum());
            global as usize
        }

        fn barrier(&self) {
            self.world.barrier();
        }

        fn transpose_xy(
            &self,
            send: &[Complex64],
            send_counts: &[usize],
            recv: &mut [Complex64],
            recv_counts: &[usize],
        ) {
            // Complex64 has no native MPI datatype in rsmpi; reinterpret as
            // interleaved f64 pairs (safe: num_complex::Complex<f64> is
            // repr(C) with two adjacent f64 fields) and double every count.
            let send_f64: &[f64] = bytemuck::cast_slice(send);
            let recv_f64: &mut [f64] = bytemuck::cast_slice_mut(recv);
            let send_counts: Vec<i32> = send_counts.iter().map(|&c| (c * 2) as i32).collect();
            let recv_counts: Vec<i32> = recv_counts.iter().map(|&c| (c * 2) as i32).collect();
            let send_displs = super::block_offsets(
                &send_counts.iter().map(|&c| c as usize).collect::<Vec<_>>(),
            )
            .into_iter()
            .map(|d| d as i32)
            .collect::<Vec<_>>();
            let recv_displs = super::block_offsets(
                &recv_counts.iter().map(|&c| c as usize).collect::<Vec<_>>(),
            )
            .into_iter()
            .map(|d| d as i32)
            .collect::<Vec<_>>();
            let send_partition = mpi::datatype::Partition::new(send_f64, send_counts, send_displs);
            let mut recv_partition = PartitionMut::new(recv_f64, recv_counts, recv_displs);
            self.world
                .all_to_all_varcount_into(&send_partition, &mut recv_partition);
        }
    }
}

#[cfg(feature = "mpi")]
pub use mpi_backend::MpiTopology;
