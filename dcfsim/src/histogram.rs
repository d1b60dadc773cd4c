use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counts of drawn backoff values, broken down by the number of stations in the run.
///
/// Stations append to it on every draw; it is only read once the runs are over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffHistogram {
    counts: BTreeMap<u32, BTreeMap<usize, u64>>,
}

/// A single histogram cell in the long CSV format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramRow {
    /// Drawn number of backoff slots.
    #[serde(rename = "BACKOFF")]
    pub backoff: u32,
    /// Number of stations of the run the value was drawn in.
    #[serde(rename = "N_OF_STATIONS")]
    pub stations: usize,
    /// Occurrences.
    #[serde(rename = "COUNT")]
    pub count: u64,
}

impl BackoffHistogram {
    /// Records a single draw of `backoff` slots in a run with `stations` stations.
    pub fn record(&mut self, backoff: u32, stations: usize) {
        *self
            .counts
            .entry(backoff)
            .or_default()
            .entry(stations)
            .or_default() += 1;
    }

    /// Adds all counts of `other` to this histogram.
    pub fn merge(&mut self, other: &BackoffHistogram) {
        for row in other.rows() {
            *self
                .counts
                .entry(row.backoff)
                .or_default()
                .entry(row.stations)
                .or_default() += row.count;
        }
    }

    /// Number of times `backoff` was drawn with `stations` stations.
    #[must_use]
    pub fn count(&self, backoff: u32, stations: usize) -> u64 {
        self.counts
            .get(&backoff)
            .and_then(|per_station| per_station.get(&stations))
            .copied()
            .unwrap_or(0)
    }

    /// Total number of recorded draws.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().flat_map(BTreeMap::values).sum()
    }

    /// Largest value drawn.
    #[must_use]
    pub fn max_backoff(&self) -> Option<u32> {
        self.counts.keys().next_back().copied()
    }

    /// Iterates over non-empty cells, sorted by backoff value and then station count.
    pub fn rows(&self) -> impl Iterator<Item = HistogramRow> + '_ {
        self.counts.iter().flat_map(|(&backoff, per_station)| {
            per_station
                .iter()
                .map(move |(&stations, &count)| HistogramRow {
                    backoff,
                    stations,
                    count,
                })
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_and_merge() {
        let mut first = BackoffHistogram::default();
        first.record(7, 2);
        first.record(7, 2);
        first.record(3, 2);
        let mut second = BackoffHistogram::default();
        second.record(7, 1);
        second.record(7, 2);
        second.record(15, 1);

        first.merge(&second);
        assert_eq!(first.count(7, 2), 3);
        assert_eq!(first.count(7, 1), 1);
        assert_eq!(first.count(0, 1), 0);
        assert_eq!(first.total(), 6);
        assert_eq!(first.max_backoff(), Some(15));
        assert_eq!(
            first
                .rows()
                .map(|r| (r.backoff, r.stations, r.count))
                .collect::<Vec<_>>(),
            vec![(3, 2, 1), (7, 1, 1), (7, 2, 3), (15, 1, 1)]
        );
    }

    #[test]
    fn test_empty() {
        let histogram = BackoffHistogram::default();
        assert_eq!(histogram.total(), 0);
        assert_eq!(histogram.max_backoff(), None);
        assert_eq!(histogram.rows().count(), 0);
    }
}
