//! Pass plans for bounded memory ingestion.
//!
//! Reading a file is split into passes. After each pass every rank redistributes what has
//! been read so far, so that no reader holds more than one pass worth of particles that
//! do not belong to it. The plans below are pure values computed identically on every
//! rank; [StagedStore] holds the particles while they are in flight.
use std::ops::Range;

use crate::{
    comm::Communicator,
    error::ParticleError,
    redistribute::{redistribute, RedistributeStats},
    store::ParticleStore,
    tools::chunk_range,
    traits::GridDatabase,
};

/// Readers and redistribution groups of the text reader.
///
/// The first `nreaders` ranks read. They are split into `nredist` groups of
/// `nreaders / nredist` readers. In pass `k` the readers of group `k` hand over their
/// particles and everyone redistributes. Readers left over after the last group get one
/// pass each.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextPassPlan {
    nreaders: usize,
    nredist: usize,
    passes: Vec<Range<usize>>,
}

impl TextPassPlan {
    /// Number of readers and of redistribution groups for `nprocs` processes.
    ///
    /// Runs of up to 16384 processes use more readers than requested so that no reader
    /// has to buffer too much. Beyond that the requested readers flush in one group. The
    /// reader count never exceeds `nprocs`.
    pub fn cadence(nprocs: usize, max_readers: usize) -> (usize, usize) {
        assert!(nprocs > 0 && max_readers > 0);

        let (nreaders, nredist) = if nprocs <= 1024 {
            let nreaders = max_readers.min(nprocs);
            (nreaders, if nreaders > 1 { 2 } else { 1 })
        } else if nprocs <= 4096 {
            (max_readers.max(128), 4)
        } else if nprocs <= 8192 {
            (max_readers.max(384), 32)
        } else if nprocs <= 16384 {
            (max_readers.max(512), 48)
        } else {
            (max_readers, 1)
        };

        (nreaders.min(nprocs), nredist)
    }

    /// The plan for `nprocs` processes.
    pub fn new(nprocs: usize, max_readers: usize) -> Self {
        let (nreaders, nredist) = Self::cadence(nprocs, max_readers);
        let group = nreaders / nredist;

        let mut passes = (0..nredist)
            .map(|k| k * group..(k + 1) * group)
            .collect::<Vec<_>>();
        passes.extend((nredist * group..nreaders).map(|reader| reader..reader + 1));

        Self {
            nreaders,
            nredist,
            passes,
        }
    }

    /// Number of ranks that read.
    pub fn nreaders(&self) -> usize {
        self.nreaders
    }

    /// Number of redistribution groups.
    pub fn nredist(&self) -> usize {
        self.nredist
    }

    /// Whether `rank` reads.
    pub fn is_reader(&self, rank: usize) -> bool {
        rank < self.nreaders
    }

    /// The readers flushing in each pass.
    pub fn passes(&self) -> &[Range<usize>] {
        &self.passes
    }

    /// `(start, count)` of the records of `reader` in a file with `total` records. The
    /// last reader takes the remainder.
    pub fn records(&self, total: usize, reader: usize) -> (usize, usize) {
        chunk_range(total, self.nreaders, reader, self.nreaders - 1)
    }
}

/// Record ranges and passes of the binary reader.
///
/// Reader `i` of `nreaders` reads a contiguous range of records. The first reader takes
/// the remainder. Each pass reads at most `max_per_pass` records per reader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryPassPlan {
    total: usize,
    nreaders: usize,
    max_per_pass: usize,
    npasses: usize,
}

impl BinaryPassPlan {
    /// The plan for `total` records, `nreaders` readers and passes of `max_per_pass` records.
    pub fn new(total: usize, nreaders: usize, max_per_pass: usize) -> Self {
        assert!(nreaders > 0 && max_per_pass > 0);

        let largest = chunk_range(total, nreaders, 0, 0).1;
        let npasses = total
            .div_ceil(max_per_pass * nreaders)
            .max(largest.div_ceil(max_per_pass));

        Self {
            total,
            nreaders,
            max_per_pass,
            npasses,
        }
    }

    /// Total number of records.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of passes.
    pub fn npasses(&self) -> usize {
        self.npasses
    }

    /// `(start, count)` of the records of `reader`.
    pub fn records(&self, reader: usize) -> (usize, usize) {
        chunk_range(self.total, self.nreaders, reader, 0)
    }

    /// `(start, count)` of the records `reader` reads in `pass`. The count is 0 once the
    /// reader is done.
    pub fn pass_records(&self, reader: usize, pass: usize) -> (usize, usize) {
        let (start, count) = self.records(reader);
        let offset = (pass * self.max_per_pass).min(count);
        let n = self.max_per_pass.min(count - offset);
        (start + offset, n)
    }
}

/// Particles being ingested, split into those read in the current pass and those that
/// already reached their owner.
#[derive(Clone, Debug)]
pub struct StagedStore<const NR: usize, const NI: usize> {
    transient: ParticleStore<NR, NI>,
    settled: ParticleStore<NR, NI>,
}

impl<const NR: usize, const NI: usize> StagedStore<NR, NI> {
    /// An empty staged store with `nlevels` levels.
    pub fn new(nlevels: usize) -> Self {
        Self {
            transient: ParticleStore::new(nlevels),
            settled: ParticleStore::new(nlevels),
        }
    }

    /// A staged store whose first pass starts out with the particles of `store`.
    pub fn from_transient(store: ParticleStore<NR, NI>) -> Self {
        let settled = ParticleStore::new(store.nlevels());
        Self {
            transient: store,
            settled,
        }
    }

    /// The particles of the current pass.
    pub fn transient_mut(&mut self) -> &mut ParticleStore<NR, NI> {
        &mut self.transient
    }

    /// The particles settled so far.
    pub fn settled(&self) -> &ParticleStore<NR, NI> {
        &self.settled
    }

    /// Redistribute the current pass and move the result into the settled particles.
    /// Collective.
    pub fn settle<G, C>(&mut self, gdb: &G, comm: &C) -> Result<RedistributeStats, ParticleError>
    where
        G: GridDatabase + ?Sized,
        C: Communicator,
    {
        let stats = redistribute(&mut self.transient, gdb, comm)?;
        self.settled.absorb(&mut self.transient);
        Ok(stats)
    }

    /// Give up the settled particles. Anything still transient is dropped.
    pub fn into_settled(self) -> ParticleStore<NR, NI> {
        self.settled
    }
}
