use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonic 32-bit id generator for one logical connection.
///
/// The first value handed out is [`Sequence::INITIAL`].
#[derive(Debug)]
pub struct Sequence {
    next: AtomicU32,
}

impl Sequence {
    pub const INITIAL: u32 = 1;

    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(Self::INITIAL),
        }
    }

    /// Take the next id. Safe to call from many tasks; no two callers get the same value
    /// until the counter wraps.
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn starts_at_initial_and_increments() {
        let seq = Sequence::new();
        assert_eq!(seq.next(), Sequence::INITIAL);
        assert_eq!(seq.next(), Sequence::INITIAL + 1);
        assert_eq!(seq.next(), Sequence::INITIAL + 2);
    }

    #[test]
    fn concurrent_callers_never_share_a_value() {
        let seq = Arc::new(Sequence::new());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..1000).map(|_| seq.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for worker in workers {
            for value in worker.join().unwrap() {
                assert!(seen.insert(value), "duplicate sequence value {value}");
            }
        }
        assert_eq!(seen.len(), 4000);
        assert_eq!(seq.next(), Sequence::INITIAL + 4000);
    }
}
