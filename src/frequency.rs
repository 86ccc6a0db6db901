use std::{collections::HashMap, hash::Hash};

use serde::Serialize;

use crate::data::round_to;

/// Placeholder label for missing cells in cross-tabulations.
pub const NULL_LABEL: &str = "(null)";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
    pub percent: f64,
}

/// Occurrence counter with deterministic, count-descending output.
#[derive(Debug, Clone)]
pub struct FrequencyCounter<K> {
    total: usize,
    counts: HashMap<K, usize>,
}

impl<K> Default for FrequencyCounter<K> {
    fn default() -> Self {
        Self {
            total: 0,
            counts: HashMap::new(),
        }
    }
}

impl<K> FrequencyCounter<K>
where
    K: Eq + Hash + Ord + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&mut self, key: K) {
        self.total += 1;
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn distinct(&self) -> usize {
        self.counts.len()
    }

    /// Entries sorted by count (descending), then key (ascending). `top == 0`
    /// returns everything.
    pub fn sorted(&self, top: usize) -> Vec<(K, usize)> {
        let mut items = self
            .counts
            .iter()
            .map(|(key, count)| (key.clone(), *count))
            .collect::<Vec<_>>();
        items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if top > 0 && items.len() > top {
            items.truncate(top);
        }
        items
    }

    pub fn most_common(&self) -> Option<(K, usize)> {
        self.sorted(1).into_iter().next()
    }
}

impl FrequencyCounter<String> {
    pub fn from_values<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a str>>,
    {
        let mut counter = Self::new();
        for value in values.into_iter().flatten() {
            counter.ingest(value.to_string());
        }
        counter
    }

    /// Top entries with their share of `denominator` as a percentage.
    pub fn value_counts(&self, top: usize, denominator: usize) -> Vec<ValueCount> {
        self.sorted(top)
            .into_iter()
            .map(|(value, count)| ValueCount {
                value,
                count,
                percent: percent_of(count, denominator),
            })
            .collect()
    }
}

pub fn percent_of(count: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(count as f64 / total as f64 * 100.0, 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_orders_by_count_then_key() {
        let counter = FrequencyCounter::from_values(
            ["b", "a", "b", "c", "a", "d"].into_iter().map(Some),
        );
        let sorted = counter.sorted(3);
        assert_eq!(
            sorted,
            vec![("a".to_string(), 2), ("b".to_string(), 2), ("c".to_string(), 1)]
        );
        assert_eq!(counter.total(), 6);
        assert_eq!(counter.distinct(), 4);
    }

    #[test]
    fn from_values_skips_missing_cells() {
        let counter = FrequencyCounter::from_values([Some("x"), None, Some("x")]);
        assert_eq!(counter.total(), 2);
        let counts = counter.value_counts(0, 4);
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].count, 2);
        assert_eq!(counts[0].percent, 50.0);
    }

    #[test]
    fn percent_of_zero_total_is_zero() {
        assert_eq!(percent_of(3, 0), 0.0);
        assert_eq!(percent_of(1, 3), 33.33);
    }
}
