//! Per rank particle storage.
use std::collections::HashMap;

use crate::particle::Particle;

/// The particles held by one rank, bagged by level and grid.
///
/// Each level maps a grid index to an unordered bag. The bags are only authoritative
/// after a redistribution: between reading and redistributing a particle may sit in the
/// bag of a grid some other rank owns.
#[derive(Clone, Debug)]
pub struct ParticleStore<const NR: usize, const NI: usize> {
    levels: Vec<HashMap<usize, Vec<Particle<NR, NI>>>>,
}

impl<const NR: usize, const NI: usize> ParticleStore<NR, NI> {
    /// An empty store with `nlevels` levels.
    pub fn new(nlevels: usize) -> Self {
        Self {
            levels: (0..nlevels).map(|_| HashMap::new()).collect(),
        }
    }

    /// Number of levels.
    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    /// Put `particle` into the bag given by its level and grid hint.
    pub fn push(&mut self, particle: Particle<NR, NI>) {
        assert!(
            particle.level < self.levels.len(),
            "level {} out of range",
            particle.level
        );
        self.levels[particle.level]
            .entry(particle.grid)
            .or_default()
            .push(particle);
    }

    /// The bags of `level`.
    pub fn level(&self, level: usize) -> &HashMap<usize, Vec<Particle<NR, NI>>> {
        &self.levels[level]
    }

    /// The bag of grid `grid` on `level`, if any.
    pub fn bag(&self, level: usize, grid: usize) -> Option<&[Particle<NR, NI>]> {
        self.levels[level].get(&grid).map(|bag| bag.as_slice())
    }

    /// Number of particles on `level`.
    pub fn level_len(&self, level: usize) -> usize {
        self.levels[level].values().map(|bag| bag.len()).sum()
    }

    /// Number of particles on all levels.
    pub fn len(&self) -> usize {
        (0..self.levels.len()).map(|l| self.level_len(l)).sum()
    }

    /// Whether the store holds no particles.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over `(level, grid, particle)` of all particles.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Particle<NR, NI>)> + '_ {
        self.levels.iter().enumerate().flat_map(|(level, bags)| {
            bags.iter()
                .flat_map(move |(&grid, bag)| bag.iter().map(move |p| (level, grid, p)))
        })
    }

    /// Iterate over all particles.
    pub fn particles(&self) -> impl Iterator<Item = &Particle<NR, NI>> + '_ {
        self.levels
            .iter()
            .flat_map(|bags| bags.values().flatten())
    }

    /// Remove and return all particles.
    pub fn drain(&mut self) -> Vec<Particle<NR, NI>> {
        let mut out = Vec::with_capacity(self.len());
        for bags in self.levels.iter_mut() {
            for (_, mut bag) in bags.drain() {
                out.append(&mut bag);
            }
        }
        out
    }

    /// Move all particles of `other` into this store, keeping their bags.
    pub fn absorb(&mut self, other: &mut ParticleStore<NR, NI>) {
        assert_eq!(self.levels.len(), other.levels.len());
        for (mine, theirs) in self.levels.iter_mut().zip(other.levels.iter_mut()) {
            for (grid, mut bag) in theirs.drain() {
                mine.entry(grid).or_default().append(&mut bag);
            }
        }
    }

    /// Drop empty bags.
    pub fn prune(&mut self) {
        for bags in self.levels.iter_mut() {
            bags.retain(|_, bag| !bag.is_empty());
        }
    }
}

#[cfg(test)]
mod test {
    use super::ParticleStore;
    use crate::particle::Particle;

    fn particle(level: usize, grid: usize) -> Particle<1, 0> {
        let mut p = Particle::new([0.0; 3]);
        p.level = level;
        p.grid = grid;
        p
    }

    #[test]
    fn test_push_and_count() {
        let mut store = ParticleStore::<1, 0>::new(2);
        store.push(particle(0, 3));
        store.push(particle(0, 3));
        store.push(particle(1, 0));

        assert_eq!(store.len(), 3);
        assert_eq!(store.level_len(0), 2);
        assert_eq!(store.bag(0, 3).map(|b| b.len()), Some(2));
        assert!(store.bag(1, 3).is_none());
        assert_eq!(store.iter().filter(|(l, g, _)| *l == 1 && *g == 0).count(), 1);
    }

    #[test]
    fn test_absorb_and_drain() {
        let mut settled = ParticleStore::<1, 0>::new(2);
        let mut transient = ParticleStore::<1, 0>::new(2);
        settled.push(particle(0, 1));
        transient.push(particle(0, 1));
        transient.push(particle(1, 2));

        settled.absorb(&mut transient);

        assert!(transient.is_empty());
        assert_eq!(settled.bag(0, 1).map(|b| b.len()), Some(2));
        assert_eq!(settled.drain().len(), 3);
        assert!(settled.is_empty());
    }
}
