//! Data models for the aggregation pipeline
//!
//! Observations are validated at the ingestion boundary and immutable
//! afterwards. All trade values use Decimal so that per-period totals
//! are exact.

use std::collections::{BTreeSet, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Partner code of the synthetic "World" aggregate
pub const WORLD_CODE: u32 = 0;

/// Name of the synthesized residual category
pub const OTHER_NAME: &str = "Other";

/// One (partner, period, value) record for the fixed reporter country.
/// Identity is `(partner_code, period)`; at most one observation per
/// identity survives in an [`ObservationSet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub partner_code: u32,
    pub partner_name: String,
    /// Year (or year+month) encoded as a fixed-width numeric string
    pub period: String,
    /// Non-negative, in the reporting currency
    pub trade_value: Decimal,
}

impl Observation {
    pub fn new(
        partner_code: u32,
        partner_name: impl Into<String>,
        period: impl Into<String>,
        trade_value: Decimal,
    ) -> Self {
        Self {
            partner_code,
            partner_name: partner_name.into(),
            period: period.into(),
            trade_value,
        }
    }

    /// Identity key within an observation set
    pub fn key(&self) -> (u32, String) {
        (self.partner_code, self.period.clone())
    }

    /// Whether this is the World aggregate row
    pub fn is_world(&self) -> bool {
        self.partner_code == WORLD_CODE
    }
}

/// Outcome of one merge round, for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MergeOutcome {
    pub added: usize,
    /// Incoming observations dropped because their identity was already present
    pub dropped: usize,
}

/// Growing accumulator of observations within one query epoch.
///
/// Invariant: no two members share a `(partner_code, period)` identity.
/// On conflict the first-seen observation wins; later fetches can never
/// overwrite earlier ones.
#[derive(Debug, Default)]
pub struct ObservationSet {
    by_key: HashMap<(u32, String), Observation>,
}

impl ObservationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of incoming observations, dropping duplicates.
    ///
    /// Mutates `self` in place (the set and the merged result alias);
    /// an empty batch leaves the set unchanged.
    pub fn merge(&mut self, incoming: Vec<Observation>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for obs in incoming {
            match self.by_key.entry(obs.key()) {
                std::collections::hash_map::Entry::Occupied(_) => outcome.dropped += 1,
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(obs);
                    outcome.added += 1;
                }
            }
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.by_key.values()
    }

    pub fn get(&self, partner_code: u32, period: &str) -> Option<&Observation> {
        self.by_key.get(&(partner_code, period.to_string()))
    }

    /// The period axis: distinct periods, sorted ascending.
    ///
    /// Periods are fixed-width numeric strings, so string order is
    /// chronological order. Recompute after every merge; new rounds can
    /// introduce new periods.
    pub fn periods(&self) -> Vec<String> {
        let distinct: BTreeSet<&str> = self.by_key.values().map(|o| o.period.as_str()).collect();
        distinct.into_iter().map(str::to_string).collect()
    }

    /// Distinct partner names, excluding the World aggregate
    pub fn partner_names(&self) -> BTreeSet<String> {
        self.by_key
            .values()
            .filter(|o| !o.is_world())
            .map(|o| o.partner_name.clone())
            .collect()
    }

    /// Largest World trade value across all periods, for the value scale
    pub fn max_world_value(&self) -> Decimal {
        self.by_key
            .values()
            .filter(|o| o.is_world())
            .map(|o| o.trade_value)
            .max()
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn obs(code: u32, name: &str, period: &str, value: Decimal) -> Observation {
        Observation::new(code, name, period, value)
    }

    #[test]
    fn test_merge_dedups_by_identity() {
        let mut set = ObservationSet::new();
        let outcome = set.merge(vec![
            obs(0, "World", "2019", dec!(1000)),
            obs(124, "Canada", "2019", dec!(100)),
        ]);
        assert_eq!(outcome.added, 2);
        assert_eq!(outcome.dropped, 0);

        // Same identity, different value: first write wins
        let outcome = set.merge(vec![obs(124, "Canada", "2019", dec!(999))]);
        assert_eq!(outcome.added, 0);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(set.get(124, "2019").unwrap().trade_value, dec!(100));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = vec![
            obs(0, "World", "2019", dec!(1000)),
            obs(842, "USA", "2019", dec!(350)),
        ];
        let mut set = ObservationSet::new();
        set.merge(batch.clone());
        let before: Vec<String> = set.periods();
        let len_before = set.len();

        let outcome = set.merge(batch);
        assert_eq!(outcome.added, 0);
        assert_eq!(set.len(), len_before);
        assert_eq!(set.periods(), before);
    }

    #[test]
    fn test_empty_merge_is_noop() {
        let mut set = ObservationSet::new();
        set.merge(vec![obs(0, "World", "2019", dec!(1))]);
        let outcome = set.merge(Vec::new());
        assert_eq!(outcome, MergeOutcome::default());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_periods_sorted_and_partners_exclude_world() {
        let mut set = ObservationSet::new();
        set.merge(vec![
            obs(0, "World", "2020", dec!(1)),
            obs(124, "Canada", "2018", dec!(1)),
            obs(842, "USA", "2019", dec!(1)),
        ]);
        assert_eq!(set.periods(), vec!["2018", "2019", "2020"]);
        let partners = set.partner_names();
        assert!(partners.contains("Canada"));
        assert!(partners.contains("USA"));
        assert!(!partners.contains("World"));
    }

    #[test]
    fn test_max_world_value() {
        let mut set = ObservationSet::new();
        set.merge(vec![
            obs(0, "World", "2018", dec!(500)),
            obs(0, "World", "2019", dec!(900)),
            obs(124, "Canada", "2019", dec!(5000)),
        ]);
        // Partner values never contribute to the world maximum
        assert_eq!(set.max_world_value(), dec!(900));
    }
}
