//! The distributed particle container.
//!
//! A [ParticleContainer] holds the particles of the calling rank and knows the hierarchy
//! they live on and the communicator connecting the ranks. Particles enter it through the
//! file readers in [ascii] and [binary] or the generators in [generators].
//!
//! All `init_*` routines and [ParticleContainer::redistribute] are collective. A fatal
//! condition on any rank, such as a malformed file or a particle outside the domain, is
//! logged on that rank and ends the whole computation through
//! [Communicator::abort].
pub mod ascii;
pub mod binary;
pub mod generators;

use std::sync::Arc;

use crate::{
    comm::Communicator,
    config::ParticleConfig,
    constants::{LEADER_RANK, SPACEDIM},
    error::ParticleError,
    ids::IdAllocator,
    particle::Particle,
    redistribute::{is_settled, redistribute, resolve, RedistributeStats},
    store::ParticleStore,
    traits::GridDatabase,
};

/// Particles with `NR` extra reals and `NI` extra integers, distributed over the ranks
/// of a communicator.
pub struct ParticleContainer<'a, G, C, const NR: usize, const NI: usize>
where
    G: GridDatabase + ?Sized,
    C: Communicator,
{
    gdb: &'a G,
    comm: &'a C,
    ids: Arc<IdAllocator>,
    store: ParticleStore<NR, NI>,
    config: ParticleConfig,
}

impl<'a, G, C, const NR: usize, const NI: usize> ParticleContainer<'a, G, C, NR, NI>
where
    G: GridDatabase + ?Sized,
    C: Communicator,
{
    /// An empty container drawing ids from the allocator of the calling rank.
    pub fn new(gdb: &'a G, comm: &'a C, config: ParticleConfig) -> Self {
        Self::with_ids(gdb, comm, config, comm.ids())
    }

    /// An empty container drawing ids from `ids` instead of the rank's allocator.
    ///
    /// Ids are only unique among the containers sharing an allocator.
    pub fn with_ids(
        gdb: &'a G,
        comm: &'a C,
        config: ParticleConfig,
        ids: Arc<IdAllocator>,
    ) -> Self {
        Self {
            gdb,
            comm,
            ids,
            store: ParticleStore::new(gdb.finest_level() + 1),
            config,
        }
    }

    /// The hierarchy.
    pub fn gdb(&self) -> &'a G {
        self.gdb
    }

    /// The communicator.
    pub fn comm(&self) -> &'a C {
        self.comm
    }

    /// The configuration.
    pub fn config(&self) -> &ParticleConfig {
        &self.config
    }

    /// The id allocator.
    pub fn ids(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    /// The particles of this rank.
    pub fn store(&self) -> &ParticleStore<NR, NI> {
        &self.store
    }

    /// Iterate over the particles of this rank.
    pub fn particles(&self) -> impl Iterator<Item = &Particle<NR, NI>> + '_ {
        self.store.particles()
    }

    /// Number of particles on this rank.
    pub fn local_count(&self) -> usize {
        self.store.len()
    }

    /// Number of particles on all ranks. Collective.
    pub fn total_count(&self) -> u64 {
        self.comm.all_reduce_sum(self.store.len() as u64)
    }

    /// Send every particle to the rank owning it. Collective.
    pub fn redistribute(&mut self) -> RedistributeStats {
        let result = self.redistribute_store();
        self.or_abort(result)
    }

    /// Check that on every rank each particle sits in the bag of the grid containing it and
    /// that the grid is owned by the rank. Collective.
    pub fn ok(&self) -> bool {
        let local = is_settled(&self.store, self.gdb, self.comm.rank());
        self.comm.all_reduce_and(local)
    }

    /// The smallest and largest particle memory in bytes held by any rank. The result is
    /// only available on the leader. Collective.
    pub fn byte_spread(&self) -> Option<(f64, f64)> {
        let bytes = (self.store.len() * std::mem::size_of::<Particle<NR, NI>>()) as f64;
        let min = self.comm.reduce_min(bytes, LEADER_RANK);
        let max = self.comm.reduce_max(bytes, LEADER_RANK);
        min.zip(max)
    }

    fn redistribute_store(&mut self) -> Result<RedistributeStats, ParticleError> {
        redistribute(&mut self.store, self.gdb, self.comm)
    }

    /// Unwrap `result` or abort the distributed computation.
    fn or_abort<T>(&self, result: Result<T, ParticleError>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => self.comm.abort(&e),
        }
    }

    /// Place a new particle at `pos`, shifting it across periodic boundaries if needed,
    /// and give it a fresh identity.
    fn create_particle(&self, pos: [f64; SPACEDIM]) -> Result<Particle<NR, NI>, ParticleError> {
        let (pos, (level, grid)) =
            resolve(self.gdb, pos).map_err(|position| ParticleError::InvalidParticle {
                would_be_id: self.ids.peek(),
                position,
            })?;

        let mut particle = Particle::new(pos);
        particle.level = level;
        particle.grid = grid;
        particle.id = self.ids.next();
        particle.cpu = self.comm.rank();
        Ok(particle)
    }

    /// Log the global sum of `count` on the leader. Collective if `verbose > 0`.
    fn report_count(&self, what: &str, count: usize) {
        if self.config.verbose > 0 {
            if let Some(total) = self.comm.reduce_sum(count as u64, LEADER_RANK) {
                log::info!("{}: {}", what, total);
            }
        }
    }

    /// Log the particle memory spread on the leader. Collective if `verbose > 1`.
    fn report_bytes(&self) {
        if self.config.verbose > 1 {
            if let Some((min, max)) = self.byte_spread() {
                log::info!("particle bytes per rank: min {} max {}", min, max);
            }
        }
    }

    /// Log the time of the slowest rank since `start` on the leader. Collective if
    /// `verbose > 1`.
    fn report_time(&self, what: &str, start: f64) {
        if self.config.verbose > 1 {
            let elapsed = self.comm.wall_clock() - start;
            if let Some(slowest) = self.comm.reduce_max(elapsed, LEADER_RANK) {
                log::info!("{} time: {:.3}s", what, slowest);
            }
        }
    }
}

/// A generated particle carries `mass` in real slot 0 and zeros elsewhere.
fn with_mass<const NR: usize, const NI: usize>(
    mut particle: Particle<NR, NI>,
    mass: f64,
) -> Particle<NR, NI> {
    if NR > 0 {
        particle.rdata[0] = mass;
    }
    particle
}

#[cfg(test)]
pub(crate) mod test {
    use std::path::PathBuf;

    use itertools::Itertools;

    use super::{with_mass, ParticleContainer};
    use crate::comm::{local::LocalUniverse, Communicator};
    use crate::config::ParticleConfig;
    use crate::geometry::{Geometry, RealBox};
    use crate::hierarchy::AmrHierarchy;
    use crate::layout::{BoxLayout, IndexBox};
    use crate::particle::Particle;

    /// Route log output of the tests through env_logger.
    pub(crate) fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// A periodic unit cube with 16^3 cells and a refined patch in one corner.
    pub(crate) fn test_hierarchy(nprocs: usize) -> AmrHierarchy {
        let geometry = Geometry::new(RealBox::new([0.0; 3], [1.0; 3]), [16, 16, 16], [true; 3]);
        let mut hierarchy = AmrHierarchy::uniform(geometry, 8, nprocs);
        hierarchy.add_level(BoxLayout::new(
            vec![IndexBox::new([0, 0, 0], [15, 15, 7])],
            vec![nprocs / 2],
        ));
        hierarchy
    }

    /// A path in the temp directory unique to this process.
    pub(crate) fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("amr_particles_{}_{}", std::process::id(), name))
    }

    #[test]
    fn test_empty_container() {
        let gdb = test_hierarchy(3);
        let results = LocalUniverse::new(3)
            .run(|comm| {
                let mut pc =
                    ParticleContainer::<_, _, 1, 0>::new(&gdb, comm, ParticleConfig::default());
                let stats = pc.redistribute();
                (pc.total_count(), pc.ok(), stats.received)
            })
            .unwrap();

        assert!(results.iter().all(|&r| r == (0, true, 0)));
    }

    #[test]
    fn test_create_particle() {
        init_logging();
        let gdb = test_hierarchy(2);
        let results = LocalUniverse::new(2)
            .run(|comm| {
                let pc =
                    ParticleContainer::<_, _, 2, 0>::new(&gdb, comm, ParticleConfig::default());

                // Outside the domain, but periodic in every direction.
                let p = pc.create_particle([1.25, 0.5, 0.75]).unwrap();
                let p = with_mass(p, 3.0);
                let q: Particle<2, 0> = pc.create_particle([0.1, 0.1, 0.1]).unwrap();

                (p, q, comm.rank())
            })
            .unwrap();

        for (p, q, rank) in results {
            assert_eq!(p.pos, [0.25, 0.5, 0.75]);
            assert_eq!(p.rdata, [3.0, 0.0]);
            assert_eq!((p.id, p.cpu), (1, rank));
            assert_eq!((q.id, q.level), (2, 1));
        }
    }

    #[test]
    fn test_ids_unique_across_containers() {
        let gdb = test_hierarchy(2);
        let results = LocalUniverse::new(2)
            .run(|comm| {
                let config = ParticleConfig::default();
                let mut first = ParticleContainer::<_, _, 1, 0>::new(&gdb, comm, config.clone());
                let mut second = ParticleContainer::<_, _, 1, 0>::new(&gdb, comm, config);
                first.init_random(10, 1, 1.0, false, None);
                second.init_random(10, 2, 1.0, false, None);
                first
                    .particles()
                    .chain(second.particles())
                    .map(|p| (p.id, p.cpu))
                    .collect_vec()
            })
            .unwrap();

        let ids = results.into_iter().flatten().collect_vec();
        assert_eq!(ids.len(), 20);
        assert_eq!(ids.iter().unique().count(), 20);
    }

    #[test]
    fn test_byte_spread() {
        let gdb = test_hierarchy(3);
        let spreads = LocalUniverse::new(3)
            .run(|comm| {
                let mut pc =
                    ParticleContainer::<_, _, 2, 1>::new(&gdb, comm, ParticleConfig::default());
                if comm.rank() == 1 {
                    for pos in [[0.1, 0.1, 0.1], [0.9, 0.9, 0.9]] {
                        let particle = pc.create_particle(pos).unwrap();
                        pc.store.push(particle);
                    }
                }
                pc.byte_spread()
            })
            .unwrap();

        let size = std::mem::size_of::<Particle<2, 1>>() as f64;
        assert_eq!(spreads[0], Some((0.0, 2.0 * size)));
        assert!(spreads[1..].iter().all(Option::is_none));
    }
}
