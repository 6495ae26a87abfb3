//! MPI backed communicator.
use ::mpi::{
    collective::SystemOperation,
    datatype::{Partition, PartitionMut},
    environment::Universe,
    topology::SimpleCommunicator,
    traits::{Communicator as MpiCommunicator, CommunicatorCollectives, Root},
};
use std::sync::Arc;

use bytemuck::Pod;
use itertools::Itertools;

use crate::{comm::Communicator, error::ParticleError, ids::IdAllocator, tools::displacements};

/// The MPI world communicator.
///
/// MPI is initialized on construction and finalized when the value is dropped.
pub struct MpiComm {
    world: SimpleCommunicator,
    ids: Arc<IdAllocator>,
    _universe: Universe,
}

impl MpiComm {
    /// Initialize MPI and wrap the world communicator.
    pub fn new() -> Result<Self, ParticleError> {
        let universe = ::mpi::initialize()
            .ok_or_else(|| ParticleError::Precondition("MPI has already been initialized".into()))?;
        let world = universe.world();

        Ok(Self {
            world,
            ids: Arc::new(IdAllocator::new()),
            _universe: universe,
        })
    }

    /// Return the underlying rsmpi communicator.
    pub fn world(&self) -> &SimpleCommunicator {
        &self.world
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn ids(&self) -> Arc<IdAllocator> {
        self.ids.clone()
    }

    fn barrier(&self) {
        self.world.barrier();
    }

    fn broadcast<T: Pod>(&self, buf: &mut Vec<T>, root: usize) {
        let root_process = self.world.process_at_rank(root as i32);

        // The length goes first so that the receivers can size their buffers.
        let mut len = buf.len() as u64;
        root_process.broadcast_into(&mut len);
        buf.resize(len as usize, T::zeroed());

        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf.as_mut_slice());
        root_process.broadcast_into(bytes);
    }

    fn reduce_sum(&self, value: u64, root: usize) -> Option<u64> {
        let root_process = self.world.process_at_rank(root as i32);

        if self.rank() == root {
            let mut total = 0_u64;
            root_process.reduce_into_root(&value, &mut total, SystemOperation::sum());
            Some(total)
        } else {
            root_process.reduce_into(&value, SystemOperation::sum());
            None
        }
    }

    fn reduce_max(&self, value: f64, root: usize) -> Option<f64> {
        let root_process = self.world.process_at_rank(root as i32);

        if self.rank() == root {
            let mut max = 0.0_f64;
            root_process.reduce_into_root(&value, &mut max, SystemOperation::max());
            Some(max)
        } else {
            root_process.reduce_into(&value, SystemOperation::max());
            None
        }
    }

    fn reduce_min(&self, value: f64, root: usize) -> Option<f64> {
        let root_process = self.world.process_at_rank(root as i32);

        if self.rank() == root {
            let mut min = 0.0_f64;
            root_process.reduce_into_root(&value, &mut min, SystemOperation::min());
            Some(min)
        } else {
            root_process.reduce_into(&value, SystemOperation::min());
            None
        }
    }

    fn all_reduce_sum(&self, value: u64) -> u64 {
        let mut total = 0_u64;
        self.world
            .all_reduce_into(&value, &mut total, SystemOperation::sum());
        total
    }

    fn all_reduce_max(&self, value: u64) -> u64 {
        let mut max = 0_u64;
        self.world
            .all_reduce_into(&value, &mut max, SystemOperation::max());
        max
    }

    fn all_reduce_and(&self, value: bool) -> bool {
        let mut all = false;
        self.world
            .all_reduce_into(&value, &mut all, SystemOperation::logical_and());
        all
    }

    fn all_to_all_varcount<T: Pod>(&self, send: &[T], counts: &[usize]) -> Vec<T> {
        assert_eq!(counts.len(), self.size());

        // Everything travels as bytes, so scale the counts by the element size.
        let elem_size = std::mem::size_of::<T>();
        let counts = counts
            .iter()
            .map(|&count| (count * elem_size) as i32)
            .collect_vec();

        let mut recv_counts = vec![0_i32; counts.len()];
        self.world.all_to_all_into(&counts[..], &mut recv_counts[..]);

        let nbytes = recv_counts.iter().sum::<i32>() as usize;
        let mut output = vec![0_u8; nbytes];

        let send_bytes: &[u8] = bytemuck::cast_slice(send);
        let send_partition = Partition::new(send_bytes, &counts[..], displacements(&counts));
        let mut recv_partition =
            PartitionMut::new(&mut output[..], &recv_counts[..], displacements(&recv_counts));

        self.world
            .all_to_all_varcount_into(&send_partition, &mut recv_partition);

        bytemuck::pod_collect_to_vec(&output)
    }

    fn wall_clock(&self) -> f64 {
        ::mpi::time()
    }

    fn abort(&self, error: &ParticleError) -> ! {
        log::error!("rank {}: {}", self.rank(), error);
        self.world.abort(1)
    }
}
