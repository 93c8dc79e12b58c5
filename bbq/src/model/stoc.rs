//! Subtree occupancy counter.

/// Subtree occupancy counter (StOC).
///
/// A `width`-bit counter whose low `width - 1` bits hold the count and whose top bit, the waterlevel, is set while
/// the count is at least 2. Non-emptiness is `low[0] | waterlevel`, so it never needs a wide reduction. The waterlevel
/// is updated from the old low bits only, the same way the generated logic does it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stoc {
    low: usize,
    waterlevel: bool,
    mask: usize,
}

impl Stoc {
    /// Creates new, zero counter of `width` bits.
    pub fn new(width: usize) -> Self {
        let low_bits = width.saturating_sub(1);
        let mask = if low_bits >= usize::BITS as usize { usize::MAX } else { (1 << low_bits) - 1 };
        Self { low: 0, waterlevel: false, mask }
    }

    /// `wl' = wl | low[0]`, `low' = low + 1`.
    pub fn increment(&mut self) {
        self.waterlevel |= self.low & 1 == 1;
        self.low = self.low.wrapping_add(1) & self.mask;
    }

    /// `wl' = |low[W-1:2] | &low[1:0]`, `low' = low - 1`.
    pub fn decrement(&mut self) {
        self.waterlevel = (self.low >> 2) != 0 || self.low & 0b11 == 0b11;
        self.low = self.low.wrapping_sub(1) & self.mask;
    }

    /// Whether the subtree holds any entry.
    pub fn is_nonzero(&self) -> bool { self.low & 1 == 1 || self.waterlevel }

    /// The count held in the low bits.
    pub fn count(&self) -> usize { self.low }

    /// The waterlevel bit.
    pub fn waterlevel(&self) -> bool { self.waterlevel }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn waterlevel_tracks_two() {
        let mut stoc = Stoc::new(5);
        let mut seen = Vec::new();
        for _ in 0..3 {
            stoc.increment();
            seen.push((stoc.count(), stoc.waterlevel(), stoc.is_nonzero()));
        }
        for _ in 0..3 {
            stoc.decrement();
            seen.push((stoc.count(), stoc.waterlevel(), stoc.is_nonzero()));
        }
        assert_eq!(
            seen,
            vec![(1, false, true), (2, true, true), (3, true, true), (2, true, true), (1, false, true), (0, false, false)]
        );
    }

    proptest! {
        #[test]
        fn matches_plain_count(ops in proptest::collection::vec(any::<bool>(), 0..200)) {
            // 8-bit counter: counts up to 127.
            let mut stoc = Stoc::new(8);
            let mut count = 0usize;
            for enqueue in ops {
                if enqueue && count < 127 {
                    stoc.increment();
                    count += 1;
                } else if !enqueue && count > 0 {
                    stoc.decrement();
                    count -= 1;
                }
                prop_assert_eq!(stoc.count(), count);
                prop_assert_eq!(stoc.waterlevel(), count >= 2);
                prop_assert_eq!(stoc.is_nonzero(), count != 0);
            }
        }
    }
}
