//! A block structured AMR hierarchy.
use crate::{
    constants::{REF_RATIO, SPACEDIM},
    geometry::Geometry,
    layout::{BoxLayout, IndexBox},
    traits::{GridDatabase, SpatialLocator},
};

/// One level of the hierarchy.
#[derive(Clone, Debug)]
pub struct AmrLevel {
    geometry: Geometry,
    layout: BoxLayout,
}

impl AmrLevel {
    /// The level geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// The grids of this level and their owners.
    pub fn layout(&self) -> &BoxLayout {
        &self.layout
    }
}

/// Levels of grids, each finer one refined by [REF_RATIO] against the previous one.
///
/// Level 0 is expected to cover the whole domain. Finer levels may cover parts of it.
#[derive(Clone, Debug)]
pub struct AmrHierarchy {
    levels: Vec<AmrLevel>,
}

impl AmrHierarchy {
    /// Create a single level hierarchy.
    pub fn new(geometry: Geometry, layout: BoxLayout) -> Self {
        Self {
            levels: vec![AmrLevel { geometry, layout }],
        }
    }

    /// A single level hierarchy whose domain is chopped into boxes of at most
    /// `max_grid_size` cells and dealt out round robin to `nprocs` ranks.
    pub fn uniform(geometry: Geometry, max_grid_size: usize, nprocs: usize) -> Self {
        let layout = BoxLayout::chopped(
            IndexBox::from_extent(geometry.n_cell()),
            max_grid_size,
            nprocs,
        );
        Self::new(geometry, layout)
    }

    /// Add a finer level. The boxes of `layout` are in the index space of the new level.
    pub fn add_level(&mut self, layout: BoxLayout) -> &mut Self {
        let geometry = self.levels[self.finest_level()].geometry.refine(REF_RATIO);
        let domain = IndexBox::from_extent(geometry.n_cell());

        for b in layout.boxes() {
            assert!(
                domain.contains(&b.lo()) && domain.contains(&b.hi()),
                "box {:?} outside of the level domain",
                b
            );
        }

        self.levels.push(AmrLevel { geometry, layout });
        self
    }

    /// The levels of the hierarchy.
    pub fn levels(&self) -> &[AmrLevel] {
        &self.levels
    }
}

impl SpatialLocator for AmrHierarchy {
    fn locate(&self, pos: &[f64; SPACEDIM]) -> Option<(usize, usize)> {
        self.levels.iter().enumerate().rev().find_map(|(lev, level)| {
            level
                .geometry
                .cell_index(pos)
                .and_then(|cell| level.layout.find(&cell))
                .map(|grid| (lev, grid))
        })
    }

    fn periodic_wrap(&self, pos: [f64; SPACEDIM]) -> [f64; SPACEDIM] {
        self.levels[0].geometry.periodic_wrap(pos)
    }

    fn owner_rank(&self, level: usize, grid: usize) -> usize {
        self.levels[level].layout.owners()[grid]
    }
}

impl GridDatabase for AmrHierarchy {
    fn finest_level(&self) -> usize {
        self.levels.len() - 1
    }

    fn geometry(&self, level: usize) -> &Geometry {
        &self.levels[level].geometry
    }

    fn box_array(&self, level: usize) -> &[IndexBox] {
        self.levels[level].layout.boxes()
    }

    fn distribution_map(&self, level: usize) -> &[usize] {
        self.levels[level].layout.owners()
    }
}
