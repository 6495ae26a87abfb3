//! The collective communication substrate.
//!
//! All routines of this crate are written against the [Communicator] trait. Two
//! implementations exist:
//! - [local::LocalComm], one thread per rank inside the current process, always available.
//! - `mpi::MpiComm`, backed by MPI, available with the `mpi` feature.
//!
//! Every method except [Communicator::rank], [Communicator::size], [Communicator::ids],
//! [Communicator::wall_clock] and [Communicator::abort] is collective: all ranks must call
//! it in the same order.
pub mod local;
#[cfg(feature = "mpi")]
pub mod mpi;

use std::sync::Arc;

use bytemuck::Pod;

use crate::{constants::LEADER_RANK, error::ParticleError, ids::IdAllocator};

/// Collective operations used to ingest and redistribute particles.
pub trait Communicator {
    /// Rank of the calling process.
    fn rank(&self) -> usize;

    /// Number of processes.
    fn size(&self) -> usize;

    /// The id allocator of the calling rank. It lives as long as the rank, so every
    /// container created on the rank draws from the same counter.
    fn ids(&self) -> Arc<IdAllocator>;

    /// Whether the calling process is the leader that reports and draws.
    fn is_leader(&self) -> bool {
        self.rank() == LEADER_RANK
    }

    /// Block until every rank has arrived.
    fn barrier(&self);

    /// Broadcast `buf` from `root`. On the other ranks `buf` is resized to fit.
    fn broadcast<T: Pod>(&self, buf: &mut Vec<T>, root: usize);

    /// Sum `value` over all ranks. The result is only available on `root`.
    fn reduce_sum(&self, value: u64, root: usize) -> Option<u64>;

    /// Maximum of `value` over all ranks. The result is only available on `root`.
    fn reduce_max(&self, value: f64, root: usize) -> Option<f64>;

    /// Minimum of `value` over all ranks. The result is only available on `root`.
    fn reduce_min(&self, value: f64, root: usize) -> Option<f64>;

    /// Sum `value` over all ranks and return the result everywhere.
    fn all_reduce_sum(&self, value: u64) -> u64;

    /// Maximum of `value` over all ranks, returned everywhere.
    fn all_reduce_max(&self, value: u64) -> u64;

    /// Logical and of `value` over all ranks, returned everywhere.
    fn all_reduce_and(&self, value: bool) -> bool;

    /// Send `counts[r]` consecutive elements of `send` to rank `r`.
    ///
    /// The elements received are returned ordered by source rank.
    fn all_to_all_varcount<T: Pod>(&self, send: &[T], counts: &[usize]) -> Vec<T>;

    /// Seconds since an arbitrary fixed point in the past.
    fn wall_clock(&self) -> f64;

    /// Terminate the whole distributed computation after logging `error`.
    fn abort(&self, error: &ParticleError) -> !;
}
