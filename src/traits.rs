//! Traits for the spatial hierarchy particles live on.
use crate::{constants::SPACEDIM, geometry::Geometry, layout::IndexBox};

/// Maps positions to the grid, level and rank they belong to.
pub trait SpatialLocator {
    /// Return `(level, grid)` of the finest grid containing `pos`, or `None` if no grid does.
    fn locate(&self, pos: &[f64; SPACEDIM]) -> Option<(usize, usize)>;

    /// Shift `pos` back into the domain along periodic directions.
    fn periodic_wrap(&self, pos: [f64; SPACEDIM]) -> [f64; SPACEDIM];

    /// Rank owning `grid` on `level`.
    fn owner_rank(&self, level: usize, grid: usize) -> usize;
}

/// The block structured hierarchy of grids.
pub trait GridDatabase: SpatialLocator {
    /// Index of the finest level.
    fn finest_level(&self) -> usize;

    /// Geometry of `level`.
    fn geometry(&self, level: usize) -> &Geometry;

    /// The grids of `level`.
    fn box_array(&self, level: usize) -> &[IndexBox];

    /// The owning rank of each grid of `level`.
    fn distribution_map(&self, level: usize) -> &[usize];
}
