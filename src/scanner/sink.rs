//! Collects probe outcomes into the reachable and unreachable sets.
use crate::address::Address;
use std::sync::{Mutex, PoisonError};

/// Whether a host answered its probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reachability {
    Reachable,
    Unreachable,
}

/// The classification of one address, produced exactly once per probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeOutcome {
    pub address: Address,
    pub reachability: Reachability,
}

impl ProbeOutcome {
    pub fn reachable(address: Address) -> Self {
        Self {
            address,
            reachability: Reachability::Reachable,
        }
    }

    pub fn unreachable(address: Address) -> Self {
        Self {
            address,
            reachability: Reachability::Unreachable,
        }
    }
}

/// A copy of both result sets, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSnapshot {
    pub reachable: Vec<Address>,
    pub unreachable: Vec<Address>,
}

impl ResultSnapshot {
    pub fn len(&self) -> usize {
        self.reachable.len() + self.unreachable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Append-only store for the two result sets of a sweep.
///
/// Both sets sit behind one lock, so `record` is atomic with respect to
/// `snapshot`: a snapshot never sees an outcome half-recorded.
#[derive(Debug, Default)]
pub struct ResultSink {
    sets: Mutex<ResultSnapshot>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the outcome's address to the set matching its reachability.
    pub fn record(&self, outcome: ProbeOutcome) {
        let mut sets = self.sets.lock().unwrap_or_else(PoisonError::into_inner);
        match outcome.reachability {
            Reachability::Reachable => sets.reachable.push(outcome.address),
            Reachability::Unreachable => sets.unreachable.push(outcome.address),
        }
    }

    pub fn snapshot(&self) -> ResultSnapshot {
        self.sets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sets.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops everything recorded so far.
    pub fn clear(&self) {
        *self.sets.lock().unwrap_or_else(PoisonError::into_inner) = ResultSnapshot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::{ProbeOutcome, ResultSink};
    use crate::address::Prefix;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn records_into_matching_set() {
        let sink = ResultSink::new();
        let prefix = Prefix::new(10, 0, 0);

        sink.record(ProbeOutcome::reachable(prefix.host(1).unwrap()));
        sink.record(ProbeOutcome::unreachable(prefix.host(2).unwrap()));
        sink.record(ProbeOutcome::reachable(prefix.host(3).unwrap()));

        let snapshot = sink.snapshot();
        assert_eq!(
            snapshot.reachable,
            vec![prefix.host(1).unwrap(), prefix.host(3).unwrap()]
        );
        assert_eq!(snapshot.unreachable, vec![prefix.host(2).unwrap()]);
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn concurrent_writers_lose_nothing() {
        let sink = Arc::new(ResultSink::new());
        let prefix = Prefix::new(192, 168, 0);

        let handles: Vec<_> = (0..8u8)
            .map(|worker| {
                let sink = Arc::clone(&sink);
                thread::spawn(move || {
                    for suffix in (1..=254u8).filter(|s| s % 8 == worker) {
                        let address = prefix.host(suffix).unwrap();
                        if suffix % 2 == 0 {
                            sink.record(ProbeOutcome::reachable(address));
                        } else {
                            sink.record(ProbeOutcome::unreachable(address));
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 254);
        assert_eq!(snapshot.reachable.len(), 127);

        let all: HashSet<_> = snapshot
            .reachable
            .iter()
            .chain(snapshot.unreachable.iter())
            .copied()
            .collect();
        assert_eq!(all, prefix.hosts().collect::<HashSet<_>>());
    }

    #[test]
    fn clear_empties_both_sets() {
        let sink = ResultSink::new();
        sink.record(ProbeOutcome::reachable(Prefix::new(10, 0, 0).host(9).unwrap()));
        sink.clear();
        assert!(sink.is_empty());
        assert!(sink.snapshot().is_empty());
    }
}
