//! Index space boxes and their distribution over ranks.
use itertools::Itertools;

use crate::constants::SPACEDIM;

/// A box of cells given by inclusive lower and upper cell indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IndexBox {
    lo: [i64; SPACEDIM],
    hi: [i64; SPACEDIM],
}

impl IndexBox {
    /// Create a box from inclusive corners.
    pub fn new(lo: [i64; SPACEDIM], hi: [i64; SPACEDIM]) -> Self {
        assert!(
            (0..SPACEDIM).all(|d| lo[d] <= hi[d]),
            "empty box {:?} {:?}",
            lo,
            hi
        );
        Self { lo, hi }
    }

    /// The box covering `n_cell` cells from the origin.
    pub fn from_extent(n_cell: [usize; SPACEDIM]) -> Self {
        Self::new([0; SPACEDIM], n_cell.map(|n| n as i64 - 1))
    }

    /// Lower corner.
    pub fn lo(&self) -> [i64; SPACEDIM] {
        self.lo
    }

    /// Upper corner, inclusive.
    pub fn hi(&self) -> [i64; SPACEDIM] {
        self.hi
    }

    /// Number of cells along direction `d`.
    pub fn length(&self, d: usize) -> usize {
        (self.hi[d] - self.lo[d] + 1) as usize
    }

    /// Total number of cells.
    pub fn num_cells(&self) -> usize {
        (0..SPACEDIM).map(|d| self.length(d)).product()
    }

    /// Check whether a cell lies in the box.
    pub fn contains(&self, cell: &[i64; SPACEDIM]) -> bool {
        (0..SPACEDIM).all(|d| self.lo[d] <= cell[d] && cell[d] <= self.hi[d])
    }

    /// Iterate over all cells of the box. The first direction varies fastest.
    pub fn cells(&self) -> impl Iterator<Item = [i64; SPACEDIM]> + '_ {
        (0..SPACEDIM)
            .rev()
            .map(move |d| self.lo[d]..=self.hi[d])
            .multi_cartesian_product()
            .map(|rev_index| std::array::from_fn(|d| rev_index[SPACEDIM - 1 - d]))
    }

    /// Refine the box by `ratio`.
    pub fn refine(&self, ratio: usize) -> Self {
        let ratio = ratio as i64;
        Self::new(
            self.lo.map(|l| l * ratio),
            self.hi.map(|h| (h + 1) * ratio - 1),
        )
    }

    /// Chop the box into pieces of at most `max_size` cells along every direction.
    pub fn chop(&self, max_size: usize) -> Vec<IndexBox> {
        assert!(max_size > 0);
        let max_size = max_size as i64;

        (0..SPACEDIM)
            .rev()
            .map(|d| {
                (self.lo[d]..=self.hi[d])
                    .step_by(max_size as usize)
                    .map(|start| (start, (start + max_size - 1).min(self.hi[d])))
                    .collect_vec()
            })
            .multi_cartesian_product()
            .map(|rev_ranges| {
                IndexBox::new(
                    std::array::from_fn(|d| rev_ranges[SPACEDIM - 1 - d].0),
                    std::array::from_fn(|d| rev_ranges[SPACEDIM - 1 - d].1),
                )
            })
            .collect()
    }
}

/// A list of boxes together with the rank owning each box.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxLayout {
    boxes: Vec<IndexBox>,
    owners: Vec<usize>,
}

impl BoxLayout {
    /// Create a layout from boxes and their owning ranks.
    pub fn new(boxes: Vec<IndexBox>, owners: Vec<usize>) -> Self {
        assert_eq!(boxes.len(), owners.len());
        Self { boxes, owners }
    }

    /// Chop `domain` into boxes of at most `max_grid_size` cells per direction and
    /// assign them round robin to `nprocs` ranks.
    pub fn chopped(domain: IndexBox, max_grid_size: usize, nprocs: usize) -> Self {
        assert!(nprocs > 0);
        let boxes = domain.chop(max_grid_size);
        let owners = (0..boxes.len()).map(|index| index % nprocs).collect_vec();
        Self { boxes, owners }
    }

    /// The boxes.
    pub fn boxes(&self) -> &[IndexBox] {
        &self.boxes
    }

    /// The owning rank of each box.
    pub fn owners(&self) -> &[usize] {
        &self.owners
    }

    /// Number of boxes.
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Whether the layout has no boxes.
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Index of the box containing `cell`.
    pub fn find(&self, cell: &[i64; SPACEDIM]) -> Option<usize> {
        self.boxes.iter().position(|b| b.contains(cell))
    }

    /// Iterate over `(index, box)` of the boxes owned by `rank`.
    pub fn local_boxes(&self, rank: usize) -> impl Iterator<Item = (usize, &IndexBox)> + '_ {
        self.boxes
            .iter()
            .enumerate()
            .filter(move |(index, _)| self.owners[*index] == rank)
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::{BoxLayout, IndexBox};

    #[test]
    fn test_cells() {
        let b = IndexBox::new([1, 0, 2], [2, 1, 2]);
        let cells = b.cells().collect_vec();

        assert_eq!(cells.len(), b.num_cells());
        assert_eq!(cells[0], [1, 0, 2]);
        assert_eq!(cells[1], [2, 0, 2]);
        assert_eq!(cells[3], [2, 1, 2]);
    }

    #[test]
    fn test_chop_covers_domain() {
        let domain = IndexBox::from_extent([10, 8, 3]);
        let pieces = domain.chop(4);

        assert_eq!(pieces.len(), 3 * 2);
        assert_eq!(
            pieces.iter().map(|b| b.num_cells()).sum::<usize>(),
            domain.num_cells()
        );
        for cell in domain.cells() {
            assert_eq!(pieces.iter().filter(|b| b.contains(&cell)).count(), 1);
        }
    }

    #[test]
    fn test_refine() {
        let b = IndexBox::new([1, 0, 0], [2, 0, 3]).refine(2);
        assert_eq!(b.lo(), [2, 0, 0]);
        assert_eq!(b.hi(), [5, 1, 7]);
    }

    #[test]
    fn test_round_robin() {
        let layout = BoxLayout::chopped(IndexBox::from_extent([8, 8, 8]), 4, 3);

        assert_eq!(layout.len(), 8);
        assert_eq!(layout.local_boxes(0).count(), 3);
        assert_eq!(layout.local_boxes(2).count(), 2);
        assert_eq!(layout.find(&[7, 7, 7]), Some(7));
    }
}
