//! The particle record.
use bytemuck::Pod;

use crate::constants::SPACEDIM;

/// A point particle carrying `NR` extra reals and `NI` extra integers.
///
/// The pair `(id, cpu)` is the global identity, assigned once at creation. The pair
/// `(level, grid)` is a cached guess where the particle lives and is re-resolved before
/// the particle is moved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle<const NR: usize, const NI: usize> {
    /// Position.
    pub pos: [f64; SPACEDIM],
    /// Extra real data. Slot 0 holds the mass for generated particles.
    pub rdata: [f64; NR],
    /// Extra integer data.
    pub idata: [i64; NI],
    /// Id, unique on the creating rank.
    pub id: u64,
    /// The creating rank.
    pub cpu: usize,
    /// Level hint.
    pub level: usize,
    /// Grid hint.
    pub grid: usize,
}

impl<const NR: usize, const NI: usize> Particle<NR, NI> {
    /// Size of a particle on the wire. Every field travels as an 8 byte word.
    pub const WIRE_BYTES: usize = 8 * (SPACEDIM + NR + NI + 4);

    /// A particle at `pos` with zeroed payload and identity.
    pub fn new(pos: [f64; SPACEDIM]) -> Self {
        Self {
            pos,
            rdata: [0.0; NR],
            idata: [0; NI],
            id: 0,
            cpu: 0,
            level: 0,
            grid: 0,
        }
    }

    /// Append the wire representation to `buf`. Native byte order is used.
    pub fn pack_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(bytemuck::cast_slice(&self.pos));
        buf.extend_from_slice(bytemuck::cast_slice(&self.rdata));
        buf.extend_from_slice(bytemuck::cast_slice(&self.idata));
        let tail = [
            self.id,
            self.cpu as u64,
            self.level as u64,
            self.grid as u64,
        ];
        buf.extend_from_slice(bytemuck::cast_slice(&tail));
    }

    /// Read a particle from its wire representation.
    ///
    /// `bytes` must hold at least [Self::WIRE_BYTES] bytes.
    pub fn unpack(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() >= Self::WIRE_BYTES);
        let mut offset = 0;

        let pos = std::array::from_fn(|_| read_word::<f64>(bytes, &mut offset));
        let rdata = std::array::from_fn(|_| read_word::<f64>(bytes, &mut offset));
        let idata = std::array::from_fn(|_| read_word::<i64>(bytes, &mut offset));
        let id = read_word::<u64>(bytes, &mut offset);
        let cpu = read_word::<u64>(bytes, &mut offset) as usize;
        let level = read_word::<u64>(bytes, &mut offset) as usize;
        let grid = read_word::<u64>(bytes, &mut offset) as usize;

        Self {
            pos,
            rdata,
            idata,
            id,
            cpu,
            level,
            grid,
        }
    }
}

fn read_word<T: Pod>(bytes: &[u8], offset: &mut usize) -> T {
    let end = *offset + std::mem::size_of::<T>();
    let value = bytemuck::pod_read_unaligned(&bytes[*offset..end]);
    *offset = end;
    value
}
