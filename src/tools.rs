//! Utility routines.

use num::traits::Zero;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Compute displacements from a vector of counts.
///
/// This is useful for varcount exchanges. Let
/// count [ 3, 4, 5]. Then the corresponding displacements are
/// [0, 3, 7]. Note that the last element `5` is ignored.
pub fn displacements<T: Zero + Copy>(counts: &[T]) -> Vec<T> {
    counts
        .iter()
        .scan(T::zero(), |acc, &x| {
            let tmp = *acc;
            *acc = *acc + x;
            Some(tmp)
        })
        .collect()
}

/// Get a seeded rng
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Split `total` items into `parts` contiguous chunks of `total / parts` items.
///
/// The remainder `total % parts` is added to the chunk `remainder_to`. Chunks are laid
/// out in order, so the chunks tile `[0, total)` exactly. Returns `(start, count)` of
/// chunk `index`.
pub fn chunk_range(
    total: usize,
    parts: usize,
    index: usize,
    remainder_to: usize,
) -> (usize, usize) {
    assert!(parts > 0 && index < parts && remainder_to < parts);

    let chunk = total / parts;
    let rem = total % parts;

    let start = index * chunk + if index > remainder_to { rem } else { 0 };
    let count = chunk + if index == remainder_to { rem } else { 0 };

    (start, count)
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use super::{chunk_range, displacements};

    #[test]
    fn test_displacements() {
        assert_eq!(displacements(&[3, 4, 5]), vec![0, 3, 7]);
        assert_eq!(displacements::<usize>(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_chunk_ranges_tile() {
        for (total, parts) in [(10_000, 3), (7, 4), (5, 5), (3, 4), (0, 2)] {
            for remainder_to in [0, parts - 1] {
                let ranges = (0..parts)
                    .map(|index| chunk_range(total, parts, index, remainder_to))
                    .collect_vec();

                let mut next = 0;
                for &(start, count) in &ranges {
                    assert_eq!(start, next);
                    next += count;
                }
                assert_eq!(next, total);
            }
        }
    }

    #[test]
    fn test_remainder_placement() {
        assert_eq!(chunk_range(10, 4, 0, 0), (0, 4));
        assert_eq!(chunk_range(10, 4, 1, 0), (4, 2));
        assert_eq!(chunk_range(10, 4, 3, 3), (6, 4));
    }
}
