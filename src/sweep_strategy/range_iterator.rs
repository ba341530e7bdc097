use gcd::Gcd;
use rand::Rng;

/// Yields the host suffixes of an inclusive `u8` range in two modes:
///
/// **Randomized** — created by `RangeIterator::new_random`:
///    - The algorithm generates a permutation of indices `0..N-1` using the
///      additive congruential step `x_{i+1} = (x_i + step) % N`.
///    - `step` is chosen so `gcd(step, N) == 1` to ensure the sequence is a
///      full-length cycle (visits each index exactly once).
///    - `x_0` is chosen uniformly in `0..N`.
///
///      For more information: <https://en.wikipedia.org/wiki/Linear_congruential_generator>
///
/// **Serial** — `RangeIterator::new_serial`: plain ascending order.
#[derive(Debug)]
pub struct RangeIterator {
    start: u32,
    total: u32,
    remaining: u32,
    pick: u32,
    step: u32,
}

impl RangeIterator {
    /// Construct a randomized iterator (LCG permutation).
    ///
    /// Precondition: `start <= end`.
    pub fn new_random(start: u8, end: u8) -> Self {
        let total = u32::from(end) - u32::from(start) + 1;
        let step = pick_random_coprime(total);
        let first = rand::rng().random_range(0..total);

        Self {
            start: u32::from(start),
            total,
            remaining: total,
            pick: first,
            step,
        }
    }

    /// Construct a serial iterator; a step of one from index zero.
    ///
    /// Precondition: `start <= end`.
    pub fn new_serial(start: u8, end: u8) -> Self {
        let total = u32::from(end) - u32::from(start) + 1;
        Self {
            start: u32::from(start),
            total,
            remaining: total,
            pick: 0,
            step: 1,
        }
    }
}

impl Iterator for RangeIterator {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        // a full cycle of `total` steps returns to the seed
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let cur = self.pick;
        self.pick = (cur + self.step) % self.total;

        u8::try_from(self.start + cur).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RangeIterator {}

/// The probability that two random integers are coprime to one another
/// works out to be around 61%, so we pick a random candidate and test it.
/// After 10 unlucky tries we fall back to `end - 1`, which is always coprime
/// with `end` but gives a plain descending walk.
///
/// Candidates come from the middle half of the range since steps close to
/// either boundary barely differ from a serial walk.
fn pick_random_coprime(end: u32) -> u32 {
    if end < 4 {
        return 1;
    }
    let range_boundary = end / 4;
    let lower_range = range_boundary;
    let upper_range = end - range_boundary;
    let mut rng = rand::rng();

    for _ in 0..10 {
        let candidate = rng.random_range(lower_range..upper_range);
        if end.gcd(candidate) == 1 {
            return candidate;
        }
    }

    end - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn sorted(it: RangeIterator) -> Vec<u8> {
        let mut v: Vec<u8> = it.collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn random_range_iterator_visits_every_suffix_once() {
        for (start, end) in [(1u8, 254u8), (1, 1), (10, 12), (0, 255)] {
            let result = sorted(RangeIterator::new_random(start, end));
            let expected: Vec<u8> = (start..=end).collect();
            assert_eq!(expected, result);

            let unique = result.iter().copied().collect::<HashSet<u8>>().len();
            assert_eq!(unique, result.len());
        }
    }

    #[test]
    fn serial_range_iterator_is_ascending() {
        let result: Vec<u8> = RangeIterator::new_serial(1, 254).collect();
        assert_eq!((1..=254).collect::<Vec<u8>>(), result);
    }

    #[test]
    fn size_hint_counts_down() {
        let mut it = RangeIterator::new_random(1, 254);
        assert_eq!(it.size_hint(), (254, Some(254)));
        it.next();
        assert_eq!(it.size_hint(), (253, Some(253)));
        let rest = it.by_ref().count();
        assert_eq!(rest, 253);
        assert_eq!(it.size_hint(), (0, Some(0)));
    }

    #[test]
    fn coprime_step_is_coprime() {
        for _ in 0..100 {
            let step = pick_random_coprime(254);
            assert_eq!(254u32.gcd(step), 1);
            assert_ne!(step, 1);
        }
    }
}
