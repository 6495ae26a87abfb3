//! An in-process communicator that runs every rank on its own thread.
//!
//! All collectives are built on a single rendezvous: each rank deposits one byte
//! message per destination, the last rank to arrive transposes the mailboxes, and
//! everybody collects the messages addressed to it. A new rendezvous only opens once
//! every rank has collected from the previous one.
use std::mem;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytemuck::Pod;
use itertools::Itertools;

use crate::{comm::Communicator, error::ParticleError, ids::IdAllocator, tools::displacements};

/// A set of ranks living on threads of the current process.
///
/// ```
/// use amr_particles::comm::{local::LocalUniverse, Communicator};
///
/// let ranks = LocalUniverse::new(4)
///     .run(|comm| comm.all_reduce_sum(comm.rank() as u64))
///     .unwrap();
/// assert_eq!(ranks, vec![6; 4]);
/// ```
pub struct LocalUniverse {
    size: usize,
}

impl LocalUniverse {
    /// Create a universe with `size` ranks.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "a universe needs at least one rank");
        Self { size }
    }

    /// Number of ranks.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `f` on every rank and return the results ordered by rank.
    ///
    /// If any rank aborts or panics the whole universe is torn down and the
    /// diagnostic of the first failing rank is returned.
    pub fn run<T, F>(&self, f: F) -> Result<Vec<T>, ParticleError>
    where
        T: Send,
        F: Fn(&LocalComm) -> T + Sync,
    {
        let shared = Shared::new(self.size);

        let outcomes = std::thread::scope(|s| {
            let handles = (0..self.size)
                .map(|rank| {
                    let shared = &shared;
                    let f = &f;
                    s.spawn(move || {
                        let _guard = AbortOnPanic { shared, rank };
                        f(&LocalComm {
                            rank,
                            shared,
                            ids: Arc::new(IdAllocator::new()),
                        })
                    })
                })
                .collect_vec();

            handles
                .into_iter()
                .map(|handle| handle.join())
                .collect_vec()
        });

        if let Some((rank, message)) = shared.lock().abort.take() {
            return Err(ParticleError::Aborted { rank, message });
        }

        outcomes
            .into_iter()
            .enumerate()
            .map(|(rank, outcome)| {
                outcome.map_err(|_| ParticleError::Aborted {
                    rank,
                    message: "rank panicked".into(),
                })
            })
            .collect()
    }
}

#[derive(Default)]
struct Rendezvous {
    generation: u64,
    arrived: usize,
    departed: usize,
    draining: bool,
    // outboxes[src][dst] and inboxes[dst][src]
    outboxes: Vec<Vec<Vec<u8>>>,
    inboxes: Vec<Vec<Vec<u8>>>,
    abort: Option<(usize, String)>,
}

struct Shared {
    size: usize,
    start: Instant,
    state: Mutex<Rendezvous>,
    changed: Condvar,
}

impl Shared {
    fn new(size: usize) -> Self {
        Self {
            size,
            start: Instant::now(),
            state: Mutex::new(Rendezvous {
                outboxes: vec![Vec::new(); size],
                inboxes: vec![Vec::new(); size],
                ..Default::default()
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Rendezvous> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_checked(&self) -> MutexGuard<'_, Rendezvous> {
        Self::check(self.lock())
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Rendezvous>) -> MutexGuard<'a, Rendezvous> {
        Self::check(
            self.changed
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn check(guard: MutexGuard<'_, Rendezvous>) -> MutexGuard<'_, Rendezvous> {
        if let Some((rank, _)) = &guard.abort {
            let rank = *rank;
            drop(guard);
            panic!("collective interrupted, rank {} aborted", rank);
        }
        guard
    }

    fn raise_abort(&self, rank: usize, message: String) {
        let mut state = self.lock();
        if state.abort.is_none() {
            state.abort = Some((rank, message));
        }
        self.changed.notify_all();
    }

    /// Deposit one message per destination and collect one message per source.
    fn exchange(&self, rank: usize, outgoing: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        assert_eq!(outgoing.len(), self.size);

        let mut state = self.lock_checked();

        while state.draining {
            state = self.wait(state);
        }

        state.outboxes[rank] = outgoing;
        state.arrived += 1;

        if state.arrived == self.size {
            let mut inboxes = vec![Vec::with_capacity(self.size); self.size];
            for src in 0..self.size {
                let outbox = mem::take(&mut state.outboxes[src]);
                for (dst, message) in outbox.into_iter().enumerate() {
                    inboxes[dst].push(message);
                }
            }
            state.inboxes = inboxes;
            state.arrived = 0;
            state.departed = 0;
            state.draining = true;
            state.generation += 1;
            self.changed.notify_all();
        } else {
            let generation = state.generation;
            while state.generation == generation {
                state = self.wait(state);
            }
        }

        let incoming = mem::take(&mut state.inboxes[rank]);
        state.departed += 1;
        if state.departed == self.size {
            state.draining = false;
            self.changed.notify_all();
        }

        incoming
    }
}

struct AbortOnPanic<'a> {
    shared: &'a Shared,
    rank: usize,
}

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.shared
                .raise_abort(self.rank, format!("rank {} panicked", self.rank));
        }
    }
}

/// The communicator handed to each rank of a [LocalUniverse].
pub struct LocalComm<'a> {
    rank: usize,
    shared: &'a Shared,
    ids: Arc<IdAllocator>,
}

impl LocalComm<'_> {
    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> Vec<Vec<u8>> {
        self.shared.exchange(self.rank, outgoing)
    }

    /// Send `bytes` to every rank and receive the contribution of every rank.
    fn all_gather_bytes(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.exchange(vec![bytes.to_vec(); self.size()])
    }

    /// Send `bytes` to `root`. Returns the contributions of all ranks on root.
    fn gather_bytes(&self, bytes: &[u8], root: usize) -> Option<Vec<Vec<u8>>> {
        let mut outgoing = vec![Vec::new(); self.size()];
        outgoing[root] = bytes.to_vec();
        let incoming = self.exchange(outgoing);
        (self.rank == root).then_some(incoming)
    }
}

fn decode<T: Pod>(bytes: &[u8]) -> T {
    bytemuck::pod_read_unaligned(bytes)
}

impl Communicator for LocalComm<'_> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn ids(&self) -> Arc<IdAllocator> {
        self.ids.clone()
    }

    fn barrier(&self) {
        self.exchange(vec![Vec::new(); self.size()]);
    }

    fn broadcast<T: Pod>(&self, buf: &mut Vec<T>, root: usize) {
        let outgoing = if self.rank == root {
            vec![bytemuck::cast_slice::<T, u8>(buf).to_vec(); self.size()]
        } else {
            vec![Vec::new(); self.size()]
        };
        let incoming = self.exchange(outgoing);
        if self.rank != root {
            *buf = bytemuck::pod_collect_to_vec(&incoming[root]);
        }
    }

    fn reduce_sum(&self, value: u64, root: usize) -> Option<u64> {
        self.gather_bytes(bytemuck::bytes_of(&value), root)
            .map(|all| all.iter().map(|bytes| decode::<u64>(bytes)).sum())
    }

    fn reduce_max(&self, value: f64, root: usize) -> Option<f64> {
        self.gather_bytes(bytemuck::bytes_of(&value), root).map(|all| {
            all.iter()
                .map(|bytes| decode::<f64>(bytes))
                .fold(f64::MIN, f64::max)
        })
    }

    fn reduce_min(&self, value: f64, root: usize) -> Option<f64> {
        self.gather_bytes(bytemuck::bytes_of(&value), root).map(|all| {
            all.iter()
                .map(|bytes| decode::<f64>(bytes))
                .fold(f64::MAX, f64::min)
        })
    }

    fn all_reduce_sum(&self, value: u64) -> u64 {
        self.all_gather_bytes(bytemuck::bytes_of(&value))
            .iter()
            .map(|bytes| decode::<u64>(bytes))
            .sum()
    }

    fn all_reduce_max(&self, value: u64) -> u64 {
        self.all_gather_bytes(bytemuck::bytes_of(&value))
            .iter()
            .map(|bytes| decode::<u64>(bytes))
            .max()
            .unwrap_or(value)
    }

    fn all_reduce_and(&self, value: bool) -> bool {
        self.all_gather_bytes(&[u8::from(value)])
            .iter()
            .all(|bytes| bytes[0] != 0)
    }

    fn all_to_all_varcount<T: Pod>(&self, send: &[T], counts: &[usize]) -> Vec<T> {
        assert_eq!(counts.len(), self.size());
        assert_eq!(counts.iter().sum::<usize>(), send.len());

        let outgoing = counts
            .iter()
            .zip(displacements(counts))
            .map(|(&count, displ)| {
                bytemuck::cast_slice::<T, u8>(&send[displ..displ + count]).to_vec()
            })
            .collect_vec();

        self.exchange(outgoing)
            .iter()
            .flat_map(|bytes| bytemuck::pod_collect_to_vec::<u8, T>(bytes))
            .collect()
    }

    fn wall_clock(&self) -> f64 {
        self.shared.start.elapsed().as_secs_f64()
    }

    fn abort(&self, error: &ParticleError) -> ! {
        log::error!("rank {}: {}", self.rank, error);
        self.shared.raise_abort(self.rank, error.to_string());
        panic!("rank {} aborted: {}", self.rank, error);
    }
}
