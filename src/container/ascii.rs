//! Reading particles from text files.
//!
//! The file holds whitespace separated numbers: the number of particles, then for each
//! particle its position followed by the extra real data. Line breaks carry no meaning,
//! so a record may span several lines.
//! ```text
//! 2
//! 0.1 0.2 0.3 1.0
//! 0.4 0.5
//! 0.6 2.0
//! ```
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use itertools::Itertools;

use super::ParticleContainer;
use crate::{
    comm::Communicator,
    constants::SPACEDIM,
    error::ParticleError,
    particle::Particle,
    pipeline::TextPassPlan,
    traits::GridDatabase,
};

/// Whitespace separated tokens of a text file, read sequentially.
struct Tokens {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    pending: std::vec::IntoIter<String>,
}

impl Tokens {
    fn open(path: &Path) -> Result<Self, ParticleError> {
        let file = File::open(path).map_err(|source| ParticleError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            pending: Vec::new().into_iter(),
        })
    }

    /// The next token, or `None` at the end of the file.
    fn next_token(&mut self) -> Result<Option<String>, ParticleError> {
        loop {
            if let Some(token) = self.pending.next() {
                return Ok(Some(token));
            }
            match self.lines.next() {
                Some(line) => {
                    self.pending = line?
                        .split_whitespace()
                        .map(str::to_string)
                        .collect_vec()
                        .into_iter();
                }
                None => return Ok(None),
            }
        }
    }

    fn header(&mut self) -> Result<usize, ParticleError> {
        let token = self
            .next_token()?
            .ok_or_else(|| ParticleError::format(&self.path, "0", "missing particle count"))?;
        token.parse::<usize>().map_err(|e| {
            ParticleError::format(&self.path, "0", format!("bad particle count {:?}: {}", token, e))
        })
    }

    /// Skip `records` records of `stride` values each.
    fn skip(&mut self, records: usize, stride: usize) -> Result<(), ParticleError> {
        for skipped in 0..records * stride {
            if self.next_token()?.is_none() {
                return Err(ParticleError::format(
                    &self.path,
                    "1",
                    format!("file ends after {} of {} skipped records", skipped / stride, records),
                ));
            }
        }
        Ok(())
    }

    fn value(&mut self) -> Result<f64, ParticleError> {
        let token = self
            .next_token()?
            .ok_or_else(|| ParticleError::format(&self.path, "2", "unexpected end of file"))?;
        token
            .parse::<f64>()
            .map_err(|e| ParticleError::format(&self.path, "2", format!("{:?}: {}", token, e)))
    }

    /// Parse the next record into a position and `extra.len()` extra values.
    fn record(&mut self, extra: &mut [f64]) -> Result<[f64; SPACEDIM], ParticleError> {
        let mut pos = [0.0; SPACEDIM];
        for x in pos.iter_mut().chain(extra.iter_mut()) {
            *x = self.value()?;
        }
        Ok(pos)
    }
}

impl<G, C, const NR: usize, const NI: usize> ParticleContainer<'_, G, C, NR, NI>
where
    G: GridDatabase + ?Sized,
    C: Communicator,
{
    /// Read particles from the text file `path`. Collective.
    ///
    /// The first ranks of the communicator each read a contiguous range of records, the
    /// others only take part in redistributing. Each record carries a position followed by
    /// `extradata` values stored in the first extra real slots. Particles on or beyond the
    /// domain boundary are moved an eighth of a cell inwards.
    ///
    /// With `replication` set to `[n0, n1, n2]` every particle read is repeated `n0 * n1 * n2`
    /// times, shifted by multiples of `extent[d] / n[d]` along each direction `d`.
    pub fn init_from_ascii_file(
        &mut self,
        path: impl AsRef<Path>,
        extradata: usize,
        replication: Option<[usize; SPACEDIM]>,
    ) {
        let result = self.read_ascii(path.as_ref(), extradata, replication);
        self.or_abort(result)
    }

    fn read_ascii(
        &mut self,
        path: &Path,
        extradata: usize,
        replication: Option<[usize; SPACEDIM]>,
    ) -> Result<(), ParticleError> {
        let start = self.comm.wall_clock();

        if path.as_os_str().is_empty() {
            return Err(ParticleError::Precondition("empty file name".into()));
        }
        if extradata > NR {
            return Err(ParticleError::Precondition(format!(
                "extradata {} exceeds {} real slots",
                extradata, NR
            )));
        }
        let factors = replication.unwrap_or([1; SPACEDIM]);
        if factors.iter().any(|&n| n == 0) {
            return Err(ParticleError::Precondition(format!(
                "replication factors {:?} must be positive",
                factors
            )));
        }

        let rank = self.comm.rank();
        let plan = TextPassPlan::new(self.comm.size(), self.config.max_readers);

        let mut buffered = Vec::new();
        let mut read = 0;

        if plan.is_reader(rank) {
            let mut tokens = Tokens::open(path)?;
            let count = tokens.header()?;
            let (first, mine) = plan.records(count, rank);
            tokens.skip(first, SPACEDIM + extradata)?;

            log::debug!(
                "rank {}: reading records {}..{} of {}",
                rank,
                first,
                first + mine,
                path.display()
            );

            let gdb = self.gdb;
            let geometry = gdb.geometry(0);
            let extent: [f64; SPACEDIM] =
                std::array::from_fn(|d| geometry.domain().length(d) / factors[d] as f64);
            let replicas = factors
                .iter()
                .map(|&n| 1..=n)
                .multi_cartesian_product()
                .filter(|rep| rep.iter().any(|&m| m != 1))
                .collect_vec();

            let mut extra = vec![0.0; extradata];
            for _ in 0..mine {
                let pos = geometry.snap_inside(tokens.record(&mut extra)?);

                let mut particle: Particle<NR, NI> = self.create_particle(pos)?;
                particle.rdata[..extradata].copy_from_slice(&extra);
                buffered.push(particle);
                read += 1;

                for rep in &replicas {
                    let shifted = std::array::from_fn(|d| {
                        particle.pos[d] + (rep[d] - 1) as f64 * extent[d]
                    });
                    let mut replica = self.create_particle(shifted)?;
                    replica.rdata = particle.rdata;
                    replica.idata = particle.idata;
                    buffered.push(replica);
                }
            }
        }

        let created = buffered.len();

        for (pass, readers) in plan.passes().iter().enumerate() {
            if readers.contains(&rank) {
                for particle in buffered.drain(..) {
                    self.store.push(particle);
                }
            }
            if self.config.verbose > 0 && self.comm.is_leader() {
                log::info!(
                    "redistributing pass {} from readers {} to {}",
                    pass,
                    readers.start,
                    readers.end - 1
                );
            }
            self.redistribute_store()?;
        }

        if factors == [1; SPACEDIM] {
            self.report_count("Total number of particles", created);
        } else {
            if self.config.verbose > 0 && self.comm.is_leader() {
                log::info!("replication factors: {:?}", factors);
            }
            self.report_count("Total number of particles read", read);
            self.report_count("Total number of particles after replication", created);
        }
        self.report_bytes();
        self.report_time("init_from_ascii_file", start);

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use itertools::Itertools;

    use crate::comm::{local::LocalUniverse, Communicator};
    use crate::config::ParticleConfig;
    use crate::container::test::{init_logging, temp_path, test_hierarchy};
    use crate::container::ParticleContainer;
    use crate::error::ParticleError;

    fn write_ascii(name: &str, particles: &[[f64; 4]]) -> std::path::PathBuf {
        let path = temp_path(name);
        let mut contents = format!("{}\n", particles.len());
        for p in particles {
            contents += &format!("{} {} {} {}\n", p[0], p[1], p[2], p[3]);
        }
        fs::write(&path, contents).unwrap();
        path
    }

    fn grid_particles(n: usize) -> Vec<[f64; 4]> {
        (0..n)
            .map(|i| {
                let t = (i as f64 + 0.5) / n as f64;
                [t, (3.0 * t) % 1.0, (7.0 * t) % 1.0, i as f64]
            })
            .collect_vec()
    }

    #[test]
    fn test_read_all_records() {
        init_logging();
        let path = write_ascii("read_all.txt", &grid_particles(1001));
        let gdb = test_hierarchy(5);

        for max_readers in [1, 3, 64] {
            let config = ParticleConfig {
                max_readers,
                verbose: 2,
                ..Default::default()
            };
            let results = LocalUniverse::new(5)
                .run(|comm| {
                    let mut pc = ParticleContainer::<_, _, 2, 0>::new(&gdb, comm, config.clone());
                    pc.init_from_ascii_file(&path, 1, None);
                    assert!(pc.ok());
                    (
                        pc.total_count(),
                        pc.particles().map(|p| p.rdata[0] as usize).collect_vec(),
                    )
                })
                .unwrap();

            assert!(results.iter().all(|r| r.0 == 1001));
            let masses = results.into_iter().flat_map(|r| r.1).sorted().collect_vec();
            assert_eq!(masses, (0..1001).collect_vec());
        }

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_boundary_snap() {
        let path = write_ascii("snap.txt", &[[0.0, 1.0, 0.5, 0.0]]);
        let gdb = test_hierarchy(1);
        let dx = 1.0 / 16.0;

        let pos = LocalUniverse::new(1)
            .run(|comm| {
                let mut pc =
                    ParticleContainer::<_, _, 0, 0>::new(&gdb, comm, ParticleConfig::default());
                pc.init_from_ascii_file(&path, 0, None);
                let pos = pc.particles().next().unwrap().pos;
                pos
            })
            .unwrap()[0];

        assert_eq!(pos[0], dx / 8.0);
        assert_eq!(pos[1], 1.0 - dx / 8.0);
        assert_eq!(pos[2], 0.5);
        assert!(pos.iter().all(|&x| 0.0 < x && x < 1.0));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_replication() {
        let particles = grid_particles(50);
        let path = write_ascii("replicate.txt", &particles);
        let gdb = test_hierarchy(4);

        let results = LocalUniverse::new(4)
            .run(|comm| {
                let mut pc =
                    ParticleContainer::<_, _, 1, 0>::new(&gdb, comm, ParticleConfig::default());
                pc.init_from_ascii_file(&path, 1, Some([2, 2, 1]));
                assert!(pc.ok());
                pc.particles().map(|p| (p.cpu, p.id, p.rdata[0], p.pos)).collect_vec()
            })
            .unwrap();

        let results = results.into_iter().flatten().collect_vec();
        assert_eq!(results.len(), 4 * 50);
        assert_eq!(results.iter().map(|r| (r.0, r.1)).unique().count(), 200);

        // Each original shows up four times, with shifts that are multiples of 1/2.
        for (index, original) in particles.iter().enumerate() {
            let copies = results.iter().filter(|r| r.2 == index as f64).collect_vec();
            assert_eq!(copies.len(), 4);
            for copy in copies {
                for d in 0..2 {
                    let shift = (copy.3[d] - original[d]).rem_euclid(1.0) * 2.0;
                    assert!((shift - shift.round()).abs() < 1e-9);
                }
                assert!((copy.3[2] - original[2]).abs() < 1e-12);
            }
        }

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_aborts() {
        let gdb = test_hierarchy(3);
        let path = temp_path("does_not_exist.txt");

        let result = LocalUniverse::new(3).run(|comm| {
            let mut pc =
                ParticleContainer::<_, _, 0, 0>::new(&gdb, comm, ParticleConfig::default());
            pc.init_from_ascii_file(&path, 0, None);
            comm.rank()
        });

        assert!(matches!(result, Err(ParticleError::Aborted { .. })));
    }

    #[test]
    fn test_truncated_file_aborts() {
        let path = temp_path("truncated.txt");
        fs::write(&path, "10\n0.5 0.5 0.5\n").unwrap();
        let gdb = test_hierarchy(2);

        let result = LocalUniverse::new(2).run(|comm| {
            let mut pc =
                ParticleContainer::<_, _, 0, 0>::new(&gdb, comm, ParticleConfig::default());
            pc.init_from_ascii_file(&path, 0, None);
        });

        match result {
            Err(ParticleError::Aborted { message, .. }) => assert!(message.contains("failed @ ")),
            other => panic!("expected an abort, got {:?}", other),
        }

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_records_spanning_lines() {
        let path = temp_path("split_records.txt");
        fs::write(&path, "2\n0.5 0.5\n0.5 7.0\n0.25 0.25 0.25\n3.0\n").unwrap();
        let gdb = test_hierarchy(2);
        let config = ParticleConfig {
            max_readers: 2,
            ..Default::default()
        };

        let results = LocalUniverse::new(2)
            .run(|comm| {
                let mut pc = ParticleContainer::<_, _, 1, 0>::new(&gdb, comm, config.clone());
                pc.init_from_ascii_file(&path, 1, None);
                pc.particles().map(|p| (p.pos, p.rdata[0])).collect_vec()
            })
            .unwrap();

        let particles = results
            .into_iter()
            .flatten()
            .sorted_by(|a, b| a.1.total_cmp(&b.1))
            .collect_vec();
        assert_eq!(particles, vec![([0.25, 0.25, 0.25], 3.0), ([0.5, 0.5, 0.5], 7.0)]);

        fs::remove_file(&path).unwrap();
    }
}
