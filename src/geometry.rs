//! Geometry information

use itertools::izip;

use crate::constants::{BOUNDARY_SNAP_FRACTION, SPACEDIM};

/// A box in physical space, given by its lower and upper corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RealBox {
    lo: [f64; SPACEDIM],
    hi: [f64; SPACEDIM],
}

impl RealBox {
    /// Create a new box from its lower and upper corner.
    pub fn new(lo: [f64; SPACEDIM], hi: [f64; SPACEDIM]) -> Self {
        Self { lo, hi }
    }

    /// Lower corner.
    pub fn lo(&self) -> [f64; SPACEDIM] {
        self.lo
    }

    /// Upper corner.
    pub fn hi(&self) -> [f64; SPACEDIM] {
        self.hi
    }

    /// Extent along direction `d`.
    pub fn length(&self, d: usize) -> f64 {
        self.hi[d] - self.lo[d]
    }

    /// A box is valid if its upper corner lies strictly above its lower corner.
    pub fn is_valid(&self) -> bool {
        izip!(self.lo, self.hi).all(|(lo, hi)| lo < hi)
    }

    /// Check whether `other` lies within this box. Touching faces count as contained.
    pub fn contains_box(&self, other: &RealBox) -> bool {
        (0..SPACEDIM).all(|d| self.lo[d] <= other.lo[d] && other.hi[d] <= self.hi[d])
    }

    /// Check whether a point lies within the box, boundaries included.
    pub fn contains(&self, point: &[f64; SPACEDIM]) -> bool {
        (0..SPACEDIM).all(|d| self.lo[d] <= point[d] && point[d] <= self.hi[d])
    }
}

impl std::fmt::Display for RealBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(lo: {:?}, hi: {:?})", self.lo, self.hi)
    }
}

/// The physical domain of one level together with its cell discretization.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    domain: RealBox,
    n_cell: [usize; SPACEDIM],
    periodic: [bool; SPACEDIM],
}

impl Geometry {
    /// Create a new geometry with `n_cell` cells along each direction.
    pub fn new(domain: RealBox, n_cell: [usize; SPACEDIM], periodic: [bool; SPACEDIM]) -> Self {
        assert!(domain.is_valid(), "invalid domain {}", domain);
        assert!(n_cell.iter().all(|&n| n > 0));
        Self {
            domain,
            n_cell,
            periodic,
        }
    }

    /// The physical domain.
    pub fn domain(&self) -> &RealBox {
        &self.domain
    }

    /// Lower corner of the domain.
    pub fn prob_lo(&self) -> [f64; SPACEDIM] {
        self.domain.lo
    }

    /// Upper corner of the domain.
    pub fn prob_hi(&self) -> [f64; SPACEDIM] {
        self.domain.hi
    }

    /// Number of cells along each direction.
    pub fn n_cell(&self) -> [usize; SPACEDIM] {
        self.n_cell
    }

    /// Periodicity along each direction.
    pub fn periodic(&self) -> [bool; SPACEDIM] {
        self.periodic
    }

    /// Cell size along each direction.
    pub fn cell_size(&self) -> [f64; SPACEDIM] {
        std::array::from_fn(|d| self.domain.length(d) / self.n_cell[d] as f64)
    }

    /// Index of the cell containing `pos`, or `None` if `pos` lies outside the domain.
    pub fn cell_index(&self, pos: &[f64; SPACEDIM]) -> Option<[i64; SPACEDIM]> {
        let dx = self.cell_size();
        let mut index = [0_i64; SPACEDIM];

        for d in 0..SPACEDIM {
            let i = ((pos[d] - self.domain.lo[d]) / dx[d]).floor();
            if !(i >= 0.0 && i < self.n_cell[d] as f64) {
                return None;
            }
            index[d] = i as i64;
        }

        Some(index)
    }

    /// Shift `pos` by one domain length along every periodic direction on which it lies outside.
    pub fn periodic_wrap(&self, mut pos: [f64; SPACEDIM]) -> [f64; SPACEDIM] {
        for d in 0..SPACEDIM {
            if !self.periodic[d] {
                continue;
            }
            let length = self.domain.length(d);
            if pos[d] < self.domain.lo[d] {
                pos[d] += length;
            } else if pos[d] >= self.domain.hi[d] {
                pos[d] -= length;
            }
        }
        pos
    }

    /// Move coordinates lying on or beyond the domain boundary a fraction of a cell inwards.
    pub fn snap_inside(&self, mut pos: [f64; SPACEDIM]) -> [f64; SPACEDIM] {
        let dx = self.cell_size();
        for d in 0..SPACEDIM {
            let delta = BOUNDARY_SNAP_FRACTION * dx[d];
            if pos[d] <= self.domain.lo[d] {
                pos[d] += delta;
            }
            if pos[d] >= self.domain.hi[d] {
                pos[d] -= delta;
            }
        }
        pos
    }

    /// The geometry of the next finer level.
    pub fn refine(&self, ratio: usize) -> Self {
        Self {
            domain: self.domain,
            n_cell: self.n_cell.map(|n| n * ratio),
            periodic: self.periodic,
        }
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(domain: {}, n_cell: {:?}, periodic: {:?})",
            self.domain, self.n_cell, self.periodic
        )
    }
}

#[cfg(test)]
mod test {
    use super::{Geometry, RealBox};

    fn unit_geometry() -> Geometry {
        Geometry::new(
            RealBox::new([0.0, 0.0, 0.0], [1.0, 2.0, 1.0]),
            [8, 8, 4],
            [true, false, true],
        )
    }

    #[test]
    fn test_cell_index() {
        let geom = unit_geometry();

        assert_eq!(geom.cell_index(&[0.0, 0.0, 0.0]), Some([0, 0, 0]));
        assert_eq!(geom.cell_index(&[0.99, 1.99, 0.5]), Some([7, 7, 2]));
        assert_eq!(geom.cell_index(&[1.0, 0.5, 0.5]), None);
        assert_eq!(geom.cell_index(&[-0.01, 0.5, 0.5]), None);
    }

    #[test]
    fn test_periodic_wrap() {
        let geom = unit_geometry();

        let wrapped = geom.periodic_wrap([1.25, -0.5, -0.25]);
        assert_eq!(wrapped, [0.25, -0.5, 0.75]);
        assert!(geom.cell_index(&geom.periodic_wrap([1.25, 0.5, -0.25])).is_some());
    }

    #[test]
    fn test_snap_inside() {
        let geom = unit_geometry();
        let dx = geom.cell_size();

        let pos = geom.snap_inside([0.0, 2.0, 0.5]);

        assert_eq!(pos[0], dx[0] / 8.0);
        assert_eq!(pos[1], 2.0 - dx[1] / 8.0);
        assert_eq!(pos[2], 0.5);
        assert!(geom.domain().contains(&pos));
    }
}
