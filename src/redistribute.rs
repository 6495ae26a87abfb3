//! Move particles to the ranks owning them.
use itertools::Itertools;

use crate::{
    comm::Communicator,
    constants::SPACEDIM,
    error::ParticleError,
    particle::Particle,
    store::ParticleStore,
    traits::{GridDatabase, SpatialLocator},
};

/// What a redistribution did on the calling rank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RedistributeStats {
    /// Particles that stayed on this rank.
    pub kept: usize,
    /// Particles sent to other ranks.
    pub sent: usize,
    /// Particles received from other ranks.
    pub received: usize,
}

/// Find `(level, grid)` of `pos`, shifting it once across periodic boundaries if it
/// lies outside the hierarchy. Returns the possibly shifted position together with
/// its location, or the shifted position as error.
pub fn resolve<L: SpatialLocator + ?Sized>(
    locator: &L,
    pos: [f64; SPACEDIM],
) -> Result<([f64; SPACEDIM], (usize, usize)), [f64; SPACEDIM]> {
    if let Some(location) = locator.locate(&pos) {
        return Ok((pos, location));
    }
    let wrapped = locator.periodic_wrap(pos);
    locator
        .locate(&wrapped)
        .map(|location| (wrapped, location))
        .ok_or(wrapped)
}

/// Re-resolve every particle of `store` and send those owned elsewhere to their owner.
///
/// Collective. Every rank must call it, with or without particles. On return every
/// particle on this rank sits in the bag of the grid containing it, and that grid is
/// owned by this rank. A particle that cannot be placed even after a periodic shift is an
/// [ParticleError::InvalidParticle] error.
pub fn redistribute<G, C, const NR: usize, const NI: usize>(
    store: &mut ParticleStore<NR, NI>,
    gdb: &G,
    comm: &C,
) -> Result<RedistributeStats, ParticleError>
where
    G: GridDatabase + ?Sized,
    C: Communicator,
{
    assert_eq!(store.nlevels(), gdb.finest_level() + 1);

    let rank = comm.rank();
    let size = comm.size();

    let mut outgoing = vec![Vec::<u8>::new(); size];
    let mut stats = RedistributeStats::default();

    for mut particle in store.drain() {
        let (pos, (level, grid)) =
            resolve(gdb, particle.pos).map_err(|position| ParticleError::InvalidParticle {
                would_be_id: particle.id,
                position,
            })?;
        particle.pos = pos;
        particle.level = level;
        particle.grid = grid;

        let owner = gdb.owner_rank(level, grid);
        if owner == rank {
            store.push(particle);
            stats.kept += 1;
        } else {
            particle.pack_into(&mut outgoing[owner]);
            stats.sent += 1;
        }
    }

    let counts = outgoing.iter().map(|buf| buf.len()).collect_vec();
    let send = outgoing.concat();
    let received = comm.all_to_all_varcount(&send, &counts);

    for bytes in received.chunks_exact(Particle::<NR, NI>::WIRE_BYTES) {
        store.push(Particle::unpack(bytes));
        stats.received += 1;
    }

    store.prune();

    log::debug!(
        "rank {}: redistribute kept {}, sent {}, received {}",
        rank,
        stats.kept,
        stats.sent,
        stats.received
    );

    Ok(stats)
}

/// Check that every particle of `store` is in the bag of the grid containing it and that
/// this rank owns that grid. Local, not collective.
pub fn is_settled<G, const NR: usize, const NI: usize>(
    store: &ParticleStore<NR, NI>,
    gdb: &G,
    rank: usize,
) -> bool
where
    G: GridDatabase + ?Sized,
{
    store.iter().all(|(level, grid, particle)| {
        gdb.owner_rank(level, grid) == rank && gdb.locate(&particle.pos) == Some((level, grid))
    })
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use rand::Rng;

    use super::{is_settled, redistribute, RedistributeStats};
    use crate::comm::{local::LocalUniverse, Communicator};
    use crate::error::ParticleError;
    use crate::geometry::{Geometry, RealBox};
    use crate::hierarchy::AmrHierarchy;
    use crate::layout::{BoxLayout, IndexBox};
    use crate::particle::Particle;
    use crate::store::ParticleStore;
    use crate::tools::seeded_rng;

    fn hierarchy(nprocs: usize) -> AmrHierarchy {
        let geometry = Geometry::new(
            RealBox::new([0.0; 3], [1.0; 3]),
            [16, 16, 16],
            [true, true, true],
        );
        let mut hierarchy = AmrHierarchy::uniform(geometry, 8, nprocs);
        hierarchy.add_level(BoxLayout::new(
            vec![
                IndexBox::new([0, 0, 0], [7, 7, 7]),
                IndexBox::new([16, 16, 16], [23, 23, 31]),
            ],
            vec![0, nprocs - 1],
        ));
        hierarchy
    }

    /// Each rank creates `count` particles, some of them slightly outside the domain,
    /// all with a wrong level and grid hint.
    fn scattered_store(rank: usize, count: usize) -> ParticleStore<1, 1> {
        let mut rng = seeded_rng(rank as u64 + 100);
        let mut store = ParticleStore::new(2);
        for index in 0..count {
            let mut p = Particle::<1, 1>::new(std::array::from_fn(|_| rng.gen_range(-0.1..1.1)));
            p.id = index as u64 + 1;
            p.cpu = rank;
            p.rdata = [index as f64];
            p.idata = [rank as i64];
            store.push(p);
        }
        store
    }

    #[test]
    fn test_ownership_and_conservation() {
        for nprocs in [1, 3, 8] {
            let gdb = hierarchy(nprocs);
            let results = LocalUniverse::new(nprocs)
                .run(|comm| {
                    let mut store = scattered_store(comm.rank(), 500);
                    let before = comm.all_reduce_sum(store.len() as u64);
                    redistribute(&mut store, &gdb, comm).unwrap();
                    let after = comm.all_reduce_sum(store.len() as u64);

                    assert!(is_settled(&store, &gdb, comm.rank()));
                    (before, after)
                })
                .unwrap();

            for (before, after) in results {
                assert_eq!(before, 500 * nprocs as u64);
                assert_eq!(after, before);
            }
        }
    }

    #[test]
    fn test_payload_survives() {
        let gdb = hierarchy(4);
        let identities = LocalUniverse::new(4)
            .run(|comm| {
                let mut store = scattered_store(comm.rank(), 100);
                redistribute(&mut store, &gdb, comm).unwrap();
                store
                    .particles()
                    .map(|p| {
                        assert_eq!(p.rdata[0], (p.id - 1) as f64);
                        assert_eq!(p.idata[0], p.cpu as i64);
                        (p.cpu, p.id)
                    })
                    .collect_vec()
            })
            .unwrap();

        let identities = identities.into_iter().flatten().collect_vec();
        assert_eq!(identities.len(), 400);
        assert_eq!(identities.iter().unique().count(), 400);
    }

    #[test]
    fn test_idempotent() {
        let gdb = hierarchy(5);
        let stats = LocalUniverse::new(5)
            .run(|comm| {
                let mut store = scattered_store(comm.rank(), 200);
                redistribute(&mut store, &gdb, comm).unwrap();
                let len = store.len();
                let stats = redistribute(&mut store, &gdb, comm).unwrap();
                assert_eq!(store.len(), len);
                stats
            })
            .unwrap();

        for s in stats {
            assert_eq!(s.sent, 0);
            assert_eq!(s.received, 0);
            assert_eq!(
                s,
                RedistributeStats {
                    kept: s.kept,
                    sent: 0,
                    received: 0
                }
            );
        }
    }

    #[test]
    fn test_empty_ranks_participate() {
        let gdb = hierarchy(4);
        let counts = LocalUniverse::new(4)
            .run(|comm| {
                let mut store = if comm.rank() == 2 {
                    scattered_store(2, 300)
                } else {
                    ParticleStore::new(2)
                };
                redistribute(&mut store, &gdb, comm).unwrap();
                store.len()
            })
            .unwrap();

        assert_eq!(counts.iter().sum::<usize>(), 300);
        assert!(counts.iter().filter(|&&c| c > 0).count() > 1);
    }

    #[test]
    fn test_invalid_particle() {
        let geometry = Geometry::new(
            RealBox::new([0.0; 3], [1.0; 3]),
            [4, 4, 4],
            [false, false, false],
        );
        let gdb = AmrHierarchy::uniform(geometry, 4, 1);

        let mut store = ParticleStore::<0, 0>::new(1);
        let mut p = Particle::new([0.5, 1.5, 0.5]);
        p.id = 9;
        store.push(p);

        let result = LocalUniverse::new(1)
            .run(|comm| redistribute(&mut store.clone(), &gdb, comm))
            .unwrap();

        match &result[0] {
            Err(ParticleError::InvalidParticle {
                would_be_id,
                position,
            }) => {
                assert_eq!(*would_be_id, 9);
                assert_eq!(*position, [0.5, 1.5, 0.5]);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
