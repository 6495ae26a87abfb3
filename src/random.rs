//! Seeded random number streams.
use itertools::Itertools;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;

use crate::tools::seeded_rng;

/// Reproducible generators derived from one base seed.
///
/// Rank `r` draws from the stream seeded with `seed + r`. The streams are meant for
/// simulation inputs, they are not independent in any cryptographic sense.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomStreams {
    seed: u64,
}

impl RandomStreams {
    /// Streams derived from `seed`.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// The base seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The generator a single process uses when drawing for everyone.
    pub fn serial(&self) -> ChaCha8Rng {
        seeded_rng(self.seed)
    }

    /// The generator of `rank`.
    pub fn stream(&self, rank: usize) -> ChaCha8Rng {
        seeded_rng(self.seed.wrapping_add(rank as u64))
    }
}

/// Draw `count` distinct ranks out of `0..nprocs`, sorted ascending.
///
/// If every rank is requested the identity is returned without drawing.
pub fn draw_ranks(seed: u64, nprocs: usize, count: usize) -> Vec<usize> {
    assert!(count <= nprocs);
    if count == nprocs {
        return (0..nprocs).collect_vec();
    }
    let mut rng = seeded_rng(seed);
    sample(&mut rng, nprocs, count).into_iter().sorted().collect_vec()
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use rand::Rng;

    use super::{draw_ranks, RandomStreams};

    #[test]
    fn test_streams_reproducible() {
        let streams = RandomStreams::new(17);

        let a = streams.stream(3).gen::<u64>();
        let b = RandomStreams::new(17).stream(3).gen::<u64>();
        let c = streams.stream(4).gen::<u64>();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(streams.serial().gen::<u64>(), streams.stream(0).gen::<u64>());
    }

    #[test]
    fn test_draw_ranks() {
        let ranks = draw_ranks(1, 37, 5);

        assert_eq!(ranks.len(), 5);
        assert_eq!(ranks.iter().unique().count(), 5);
        assert!(ranks.iter().all(|&r| r < 37));
        assert!(ranks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ranks, draw_ranks(1, 37, 5));

        assert_eq!(draw_ranks(1, 4, 4), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_last_rank_can_be_drawn() {
        // Over many seeds every rank, including the last one, must show up.
        let drawn = (1..200)
            .flat_map(|seed| draw_ranks(seed, 6, 2))
            .unique()
            .sorted()
            .collect_vec();
        assert_eq!(drawn, (0..6).collect_vec());
    }
}
