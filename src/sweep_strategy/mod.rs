//! Provides the order in which host suffixes are handed to the scanner.
mod range_iterator;
use crate::address::{FIRST_HOST_SUFFIX, LAST_HOST_SUFFIX};
use crate::input::ScanOrder;
use range_iterator::RangeIterator;

/// Represents the order of a sweep over the host range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepStrategy {
    Serial(SerialRange),
    Random(RandomRange),
}

impl SweepStrategy {
    pub fn pick(order: ScanOrder) -> Self {
        match order {
            ScanOrder::Serial => SweepStrategy::Serial(SerialRange::default()),
            ScanOrder::Random => SweepStrategy::Random(RandomRange::default()),
        }
    }

    /// Every host suffix of the range, each exactly once.
    pub fn suffixes(&self) -> RangeIterator {
        match self {
            SweepStrategy::Serial(range) => RangeIterator::new_serial(range.start, range.end),
            SweepStrategy::Random(range) => RangeIterator::new_random(range.start, range.end),
        }
    }
}

/// As the name implies SerialRange will always generate suffixes in
/// ascending order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialRange {
    start: u8,
    end: u8,
}

impl Default for SerialRange {
    fn default() -> Self {
        Self {
            start: FIRST_HOST_SUFFIX,
            end: LAST_HOST_SUFFIX,
        }
    }
}

/// RandomRange walks the same suffixes in a permuted order, built from an
/// additive congruential step rather than a shuffled vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomRange {
    start: u8,
    end: u8,
}

impl Default for RandomRange {
    fn default() -> Self {
        Self {
            start: FIRST_HOST_SUFFIX,
            end: LAST_HOST_SUFFIX,
        }
    }
}
