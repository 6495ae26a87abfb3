//! Reading particles from binary files.
//!
//! A binary particle file is laid out as
//! ```text
//! [i64 NP][i32 DM][i32 NX][NP * (DM + NX) floats]
//! ```
//! in native byte order. The floats are either all 32 or all 64 bit wide; the width is
//! inferred from the file size. Each record holds the `DM` coordinates followed by `NX`
//! extra values.
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use itertools::Itertools;

use super::ParticleContainer;
use crate::{
    comm::Communicator,
    constants::{BINARY_HEADER_BYTES, DOUBLE_BYTES, FLOAT_BYTES, LEADER_RANK, SPACEDIM},
    error::ParticleError,
    pipeline::{BinaryPassPlan, StagedStore},
    random::draw_ranks,
    store::ParticleStore,
    traits::GridDatabase,
};

/// An open binary particle file, positioned somewhere in its data section.
struct BinarySource {
    path: PathBuf,
    reader: BufReader<File>,
    np: usize,
    nx: usize,
    width: u64,
}

impl BinarySource {
    /// Open `path` and validate its header for reading `extradata` of at most `nr` values.
    fn open(path: &Path, extradata: usize, nr: usize) -> Result<Self, ParticleError> {
        let file = File::open(path).map_err(|source| ParticleError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let mut header = [0_u8; BINARY_HEADER_BYTES as usize];
        reader
            .read_exact(&mut header)
            .map_err(|e| ParticleError::format(path, "header", e.to_string()))?;

        let np: i64 = bytemuck::pod_read_unaligned(&header[0..8]);
        let dm: i32 = bytemuck::pod_read_unaligned(&header[8..12]);
        let nx: i32 = bytemuck::pod_read_unaligned(&header[12..16]);

        if np <= 0 {
            return Err(ParticleError::format(path, "header", format!("NP = {} <= 0", np)));
        }
        if dm != SPACEDIM as i32 {
            return Err(ParticleError::format(
                path,
                "header",
                format!("DM = {} != {}", dm, SPACEDIM),
            ));
        }
        if nx < 0 || nx as usize > nr {
            return Err(ParticleError::format(
                path,
                "header",
                format!("NX = {} outside of [0, {}]", nx, nr),
            ));
        }
        if extradata > nx as usize {
            return Err(ParticleError::format(
                path,
                "header",
                format!("extradata {} > NX = {}", extradata, nx),
            ));
        }

        let nx = nx as usize;
        let values = (np as u64)
            .checked_mul((SPACEDIM + nx) as u64)
            .filter(|values| values.checked_mul(DOUBLE_BYTES).is_some())
            .ok_or_else(|| {
                ParticleError::format(path, "header", format!("NP = {} is too large", np))
            })?;
        let np = np as usize;
        let data_bytes = file_size.saturating_sub(BINARY_HEADER_BYTES);
        let width = data_bytes / values;

        if data_bytes % values != 0 || (width != FLOAT_BYTES && width != DOUBLE_BYTES) {
            return Err(ParticleError::format(
                path,
                "header",
                format!(
                    "{} data bytes do not hold {} values of 4 or 8 bytes",
                    data_bytes, values
                ),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            np,
            nx,
            width,
        })
    }

    /// Number of values per record.
    fn stride(&self) -> usize {
        SPACEDIM + self.nx
    }

    /// Position the file at the start of record `index`.
    fn seek_record(&mut self, index: usize) -> Result<(), ParticleError> {
        let offset = BINARY_HEADER_BYTES + (index * self.stride()) as u64 * self.width;
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read the next `count` records, widened to `f64`.
    fn read_records(&mut self, count: usize) -> Result<Vec<f64>, ParticleError> {
        let mut bytes = vec![0_u8; count * self.stride() * self.width as usize];
        self.reader.read_exact(&mut bytes).map_err(|e| {
            ParticleError::format(&self.path, "2", format!("reading {} records: {}", count, e))
        })?;

        let values = if self.width == FLOAT_BYTES {
            bytemuck::pod_collect_to_vec::<u8, f32>(&bytes)
                .into_iter()
                .map(f64::from)
                .collect_vec()
        } else {
            bytemuck::pod_collect_to_vec::<u8, f64>(&bytes)
        };
        Ok(values)
    }
}

impl<G, C, const NR: usize, const NI: usize> ParticleContainer<'_, G, C, NR, NI>
where
    G: GridDatabase + ?Sized,
    C: Communicator,
{
    /// Read particles from the binary file `path`. Collective.
    ///
    /// Up to `max_readers` ranks, drawn pseudo randomly, read contiguous ranges of the
    /// file. Reading proceeds in passes of at most `max_particles_per_read` records per
    /// reader, each pass followed by a redistribution, so no rank ever holds much more
    /// than one pass of particles it does not own. The first `extradata` extra values of
    /// each record are kept, the rest are skipped.
    pub fn init_from_binary_file(&mut self, path: impl AsRef<Path>, extradata: usize) {
        let result = self.read_binary(path.as_ref(), extradata);
        self.or_abort(result)
    }

    /// Read every binary file listed in the text file `path`, one path per line. Collective.
    pub fn init_from_binary_meta_file(&mut self, path: impl AsRef<Path>, extradata: usize) {
        let result = self.read_binary_meta(path.as_ref(), extradata);
        self.or_abort(result)
    }

    /// The ranks reading binary files, sorted ascending. Identical on every rank. Collective.
    pub fn binary_reader_ranks(&self) -> Vec<usize> {
        let nprocs = self.comm.size();
        let nreaders = self.config.max_readers.min(nprocs);

        if nreaders == nprocs {
            return (0..nprocs).collect_vec();
        }

        let mut ranks = if self.comm.is_leader() {
            draw_ranks(self.config.reader_seed, nprocs, nreaders)
                .into_iter()
                .map(|r| r as u64)
                .collect_vec()
        } else {
            Vec::new()
        };
        self.comm.broadcast(&mut ranks, LEADER_RANK);

        ranks.into_iter().map(|r| r as usize).collect_vec()
    }

    fn read_binary(&mut self, path: &Path, extradata: usize) -> Result<(), ParticleError> {
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

        let rank = self.comm.rank();
        let readers = self.binary_reader_ranks();
        let reader_index = readers.iter().position(|&r| r == rank);

        let mut source = match reader_index {
            Some(_) => Some(BinarySource::open(path, extradata, NR)?),
            None => None,
        };

        let local_np = source.as_ref().map_or(0, |s| s.np);
        let np = self.comm.all_reduce_max(local_np as u64) as usize;
        let plan = BinaryPassPlan::new(np, readers.len(), self.config.max_particles_per_read);

        if let (Some(index), Some(source)) = (reader_index, source.as_mut()) {
            let (first, count) = plan.records(index);
            source.seek_record(first)?;
            log::debug!(
                "rank {}: reading records {}..{} of {} ({} byte floats)",
                rank,
                first,
                first + count,
                path.display(),
                source.width
            );
        }

        if self.config.verbose > 0 && self.comm.is_leader() {
            log::info!(
                "reading {} particles from {} on {} readers in {} passes",
                np,
                path.display(),
                readers.len(),
                plan.npasses()
            );
        }

        let nlevels = self.store.nlevels();
        let existing = std::mem::replace(&mut self.store, ParticleStore::new(nlevels));
        let mut staged = StagedStore::from_transient(existing);
        let geometry = self.gdb.geometry(0);
        let mut read = 0;

        for pass in 0..plan.npasses() {
            if let (Some(index), Some(source)) = (reader_index, source.as_mut()) {
                let (_, count) = plan.pass_records(index, pass);
                let values = source.read_records(count)?;

                for record in values.chunks_exact(source.stride()) {
                    let pos = geometry.snap_inside(std::array::from_fn(|d| record[d]));
                    let mut particle = self.create_particle(pos)?;
                    particle.rdata[..extradata]
                        .copy_from_slice(&record[SPACEDIM..SPACEDIM + extradata]);
                    staged.transient_mut().push(particle);
                }
                read += count;
            }

            let stats = staged.settle(self.gdb, self.comm)?;
            log::debug!("rank {}: pass {} {:?}", rank, pass, stats);
        }

        self.store = staged.into_settled();

        self.report_count("Total number of particles", read);
        self.report_bytes();
        self.report_time("init_from_binary_file", start);

        Ok(())
    }

    fn read_binary_meta(&mut self, path: &Path, extradata: usize) -> Result<(), ParticleError> {
        let start = self.comm.wall_clock();

        let file = File::open(path).map_err(|source| ParticleError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let files = BufReader::new(file)
            .lines()
            .map_ok(|line| line.trim().to_string())
            .filter_ok(|line| !line.is_empty())
            .collect::<Result<Vec<_>, _>>()?;

        for file in files {
            if self.config.verbose > 1 && self.comm.is_leader() {
                log::info!("init_from_binary_meta_file: processing file {}", file);
            }
            self.read_binary(Path::new(&file), extradata)?;
        }

        self.report_time("init_from_binary_meta_file", start);

        Ok(())
    }
}
