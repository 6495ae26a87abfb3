//! Synthetic particle distributions.
use rand::Rng;

use super::{with_mass, ParticleContainer};
use crate::{
    comm::Communicator,
    constants::{LEADER_RANK, SPACEDIM},
    error::ParticleError,
    geometry::{Geometry, RealBox},
    layout::BoxLayout,
    random::RandomStreams,
    traits::GridDatabase,
};

/// Draw a point uniformly in `geometry`, rejecting coordinates outside of `bx` one
/// direction at a time.
fn draw_position<R: Rng>(rng: &mut R, geometry: &Geometry, bx: &RealBox) -> [f64; SPACEDIM] {
    let lo = geometry.prob_lo();
    let len: [f64; SPACEDIM] = std::array::from_fn(|d| geometry.domain().length(d));

    std::array::from_fn(|d| loop {
        let x = lo[d] + rng.gen::<f64>() * len[d];
        if bx.lo()[d] <= x && x <= bx.hi()[d] {
            break x;
        }
    })
}

impl<G, C, const NR: usize, const NI: usize> ParticleContainer<'_, G, C, NR, NI>
where
    G: GridDatabase + ?Sized,
    C: Communicator,
{
    /// Create `count` particles uniformly distributed in `containing`, or in the whole
    /// domain if `None`. Collective.
    ///
    /// With `serialize` the leader draws all positions from one generator and broadcasts
    /// them, so the particles are the same for any number of ranks. Otherwise rank `r`
    /// draws its share from a generator seeded with `seed + r`.
    pub fn init_random(
        &mut self,
        count: usize,
        seed: u64,
        mass: f64,
        serialize: bool,
        containing: Option<RealBox>,
    ) {
        let result = self.generate_random(count, seed, mass, serialize, containing);
        self.or_abort(result)
    }

    /// Create one particle per cell of the boxes of `partition` owned by this rank, placed
    /// at `offset` in units of the level 0 cell size. Each offset lies in `[0, 1)`.
    /// Collective.
    pub fn init_one_per_cell(&mut self, offset: [f64; SPACEDIM], mass: f64, partition: &BoxLayout) {
        let result = if offset.iter().any(|o| !(0.0..1.0).contains(o)) {
            Err(ParticleError::Precondition(format!(
                "cell offset {:?} outside of [0, 1)",
                offset
            )))
        } else {
            self.generate_per_cell(partition, mass, "init_one_per_cell", || vec![offset])
        };
        self.or_abort(result)
    }

    /// Create `n` particles per cell of the boxes of `partition` owned by this rank, at
    /// independently drawn positions inside the cell. Collective.
    pub fn init_n_random_per_cell(
        &mut self,
        n: usize,
        seed: u64,
        mass: f64,
        partition: &BoxLayout,
    ) {
        let result = if n == 0 {
            Err(ParticleError::Precondition("n must be positive".into()))
        } else if seed == 0 {
            Err(ParticleError::Precondition("seed must be positive".into()))
        } else {
            let mut rng = RandomStreams::new(seed).stream(self.comm.rank());
            self.generate_per_cell(partition, mass, "init_n_random_per_cell", || {
                (0..n)
                    .map(|_| std::array::from_fn(|_| rng.gen::<f64>()))
                    .collect()
            })
        };
        self.or_abort(result)
    }

    fn generate_random(
        &mut self,
        count: usize,
        seed: u64,
        mass: f64,
        serialize: bool,
        containing: Option<RealBox>,
    ) -> Result<(), ParticleError> {
        let start = self.comm.wall_clock();

        if count == 0 {
            return Err(ParticleError::Precondition("count must be positive".into()));
        }
        if seed == 0 {
            return Err(ParticleError::Precondition("seed must be positive".into()));
        }

        let gdb = self.gdb;
        let geometry = gdb.geometry(0);
        let bx = containing.unwrap_or(*geometry.domain());
        if !bx.is_valid() || !geometry.domain().contains_box(&bx) {
            return Err(ParticleError::Precondition(format!(
                "containing box {} not inside the domain {}",
                bx,
                geometry.domain()
            )));
        }

        let streams = RandomStreams::new(seed);
        let rank = self.comm.rank();
        let nprocs = self.comm.size();
        let mut created = 0;

        if serialize {
            let mut positions = Vec::<f64>::new();
            if self.comm.is_leader() {
                let mut rng = streams.serial();
                positions.reserve(count * SPACEDIM);
                for _ in 0..count {
                    positions.extend_from_slice(&draw_position(&mut rng, geometry, &bx));
                }
            }
            self.comm.broadcast(&mut positions, LEADER_RANK);

            // Every rank sees all positions and keeps the ones it owns.
            for chunk in positions.chunks_exact(SPACEDIM) {
                let pos: [f64; SPACEDIM] = std::array::from_fn(|d| chunk[d]);
                let Some((level, grid)) = gdb.locate(&pos) else {
                    return Err(ParticleError::InvalidParticle {
                        would_be_id: self.ids.peek(),
                        position: pos,
                    });
                };
                if gdb.owner_rank(level, grid) == rank {
                    let particle = self.create_particle(pos)?;
                    self.store.push(with_mass(particle, mass));
                    created += 1;
                }
            }
        } else {
            let mut rng = streams.stream(rank);
            let mine = count / nprocs + if rank == 0 { count % nprocs } else { 0 };
            for _ in 0..mine {
                let particle = self.create_particle(draw_position(&mut rng, geometry, &bx))?;
                self.store.push(with_mass(particle, mass));
            }
            created = mine;
            self.redistribute_store()?;
        }

        self.report_count("Total number of particles", created);
        self.report_time("init_random", start);

        Ok(())
    }

    /// Create particles at the offsets returned by `offsets` in every cell of the local boxes of
    /// `partition`, then redistribute.
    fn generate_per_cell<F>(
        &mut self,
        partition: &BoxLayout,
        mass: f64,
        what: &str,
        mut offsets: F,
    ) -> Result<(), ParticleError>
    where
        F: FnMut() -> Vec<[f64; SPACEDIM]>,
    {
        let start = self.comm.wall_clock();

        let gdb = self.gdb;
        let geometry = gdb.geometry(0);
        let lo = geometry.prob_lo();
        let dx = geometry.cell_size();
        let mut created = 0;

        for (_, bx) in partition.local_boxes(self.comm.rank()) {
            for cell in bx.cells() {
                for offset in offsets() {
                    let pos =
                        std::array::from_fn(|d| lo[d] + (cell[d] as f64 + offset[d]) * dx[d]);
                    let particle = self.create_particle(pos)?;
                    self.store.push(with_mass(particle, mass));
                    created += 1;
                }
            }
        }

        self.redistribute_store()?;

        self.report_count("Total number of particles", created);
        self.report_time(what, start);

        Ok(())
    }
}
