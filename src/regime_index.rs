//! Join of classified months against the return matrix month index.

use crate::regime::ClassifiedMonth;
use crate::types::{RegimeLabel, YearMonth};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Regime label per aligned month.
///
/// Only months that are both classified and present in the return index
/// are kept, so every month carries exactly one label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegimeIndex {
    labels: BTreeMap<YearMonth, RegimeLabel>,
    /// Classified months with no row in the return index.
    unaligned: usize,
}

impl RegimeIndex {
    pub fn build(classified: &[ClassifiedMonth], matrix_dates: &[YearMonth]) -> Self {
        let available: BTreeSet<&YearMonth> = matrix_dates.iter().collect();
        let mut labels = BTreeMap::new();
        let mut unaligned = 0;
        for month in classified {
            if available.contains(&month.date) {
                labels.insert(month.date, month.label);
            } else {
                unaligned += 1;
            }
        }
        Self { labels, unaligned }
    }

    pub fn label_for(&self, date: &YearMonth) -> Option<RegimeLabel> {
        self.labels.get(date).copied()
    }

    /// Aligned months of one regime, in chronological order.
    pub fn dates_for(&self, label: RegimeLabel) -> Vec<YearMonth> {
        self.labels
            .iter()
            .filter(|(_, l)| **l == label)
            .map(|(d, _)| *d)
            .collect()
    }

    /// All four regime buckets, empty ones included.
    pub fn partition(&self) -> BTreeMap<RegimeLabel, Vec<YearMonth>> {
        let mut buckets: BTreeMap<RegimeLabel, Vec<YearMonth>> =
            RegimeLabel::ALL.iter().map(|l| (*l, Vec::new())).collect();
        for (date, label) in &self.labels {
            buckets.entry(*label).or_default().push(*date);
        }
        buckets
    }

    /// Every aligned month.
    pub fn dates(&self) -> impl Iterator<Item = &YearMonth> {
        self.labels.keys()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn unaligned(&self) -> usize {
        self.unaligned
    }
}
