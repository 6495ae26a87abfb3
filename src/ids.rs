//! Process local particle ids.
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out particle ids that are unique on the calling rank.
///
/// Ids start at 1 and are never reused. Together with the creating rank they identify a
/// particle globally. Overflow of the 64 bit counter is not handled.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdAllocator {
    /// Create an allocator whose first id is 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Return a fresh id.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next call to [IdAllocator::next] would return.
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use itertools::Itertools;

    use super::IdAllocator;

    #[test]
    fn test_sequential() {
        let ids = IdAllocator::new();

        assert_eq!(ids.peek(), 1);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
        assert_eq!(ids.peek(), 3);
    }

    #[test]
    fn test_unique_across_threads() {
        let ids = Arc::new(IdAllocator::new());

        let drawn = std::thread::scope(|s| {
            let handles = (0..4)
                .map(|_| {
                    let ids = ids.clone();
                    s.spawn(move || (0..1000).map(|_| ids.next()).collect_vec())
                })
                .collect_vec();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect_vec()
        });

        assert_eq!(drawn.len(), 4000);
        assert_eq!(drawn.iter().unique().count(), 4000);
        assert_eq!(*drawn.iter().min().unwrap(), 1);
        assert_eq!(ids.peek(), 4001);
    }
}
