//! Partner selection and stacked-series building
//!
//! The pure reshaping core: turns a flat observation set into the
//! per-period rows a stack layout consumes, and decides which partners
//! from the latest-period snapshot deserve a full-history fetch.
//! No network or rendering calls happen here.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::error::{Result, TradeDataError};
use crate::model::{Observation, ObservationSet, OTHER_NAME, WORLD_CODE};

/// One row per period, keyed by partner name for the stack generator.
///
/// `Other` is always present; it may be negative when the named partners
/// already exceed reported World trade (a data anomaly that is rendered
/// as-is, see [`build_series`]).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRow {
    pub period: String,
    #[serde(rename = "Other")]
    pub other: Decimal,
    #[serde(flatten)]
    pub partner_values: BTreeMap<String, Decimal>,
}

/// Output of one series-building pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesTable {
    /// Rows ordered by ascending period
    pub rows: Vec<SeriesRow>,
    /// Exact partner-name set used for the rows, including "Other".
    /// The renderer needs this to build a consistent stacking key order.
    pub partners: BTreeSet<String>,
    /// Largest World value seen, for the renderer's value scale
    pub max_world_value: Decimal,
}

/// Partners from the latest-period snapshot whose trade meets
/// `threshold * world_value`, as codes, order-independent.
///
/// Expects exactly one observation per partner for a single period (the
/// "latest period, all partners" fetch). Partners already fully fetched
/// are *not* subtracted here; the orchestrator owns that bookkeeping.
pub fn select_top_up_partners(
    latest: &[Observation],
    threshold: Decimal,
    hs6: &str,
) -> Result<Vec<u32>> {
    let world = latest
        .iter()
        .find(|o| o.partner_code == WORLD_CODE)
        .ok_or_else(|| TradeDataError::MissingWorld {
            hs6: hs6.to_string(),
        })?;

    let floor = threshold * world.trade_value;
    Ok(latest
        .iter()
        .filter(|o| o.partner_code != WORLD_CODE && o.trade_value >= floor)
        .map(|o| o.partner_code)
        .collect())
}

/// Reshape the accumulated observations into stacked-series rows.
///
/// Rows are rebuilt from scratch on every pass because the partner set
/// can grow between fetch rounds. For each period:
/// - `Other` = World value minus the sum of named-partner values,
///   emitted unclamped even when negative;
/// - every partner in the set gets a value, zero when no observation
///   exists for that partner/period pair.
///
/// Output is deterministic for identical input.
pub fn build_series(observations: &ObservationSet, periods: &[String]) -> SeriesTable {
    let mut partners = observations.partner_names();

    let rows = periods
        .iter()
        .map(|period| {
            let world_value = match observations.get(WORLD_CODE, period) {
                Some(world) => world.trade_value,
                None => {
                    warn!(period = %period, "no World observation for period, using 0");
                    Decimal::ZERO
                }
            };

            let mut partner_values: BTreeMap<String, Decimal> =
                partners.iter().map(|p| (p.clone(), Decimal::ZERO)).collect();
            let mut partner_total = Decimal::ZERO;
            for obs in observations.iter() {
                if obs.period == *period && !obs.is_world() {
                    partner_total += obs.trade_value;
                    partner_values.insert(obs.partner_name.clone(), obs.trade_value);
                }
            }

            let other = world_value - partner_total;
            if other < Decimal::ZERO {
                warn!(
                    period = %period,
                    other = %other,
                    "named partners exceed reported World trade"
                );
            }

            SeriesRow {
                period: period.clone(),
                other,
                partner_values,
            }
        })
        .collect();

    partners.insert(OTHER_NAME.to_string());

    SeriesTable {
        rows,
        partners,
        max_world_value: observations.max_world_value(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn obs(code: u32, name: &str, period: &str, value: Decimal) -> Observation {
        Observation::new(code, name, period, value)
    }

    fn snapshot() -> Vec<Observation> {
        vec![
            obs(0, "World", "2020", dec!(1000)),
            obs(124, "Canada", "2020", dec!(50)),
            obs(842, "USA", "2020", dec!(49.999)),
            obs(156, "China", "2020", dec!(400)),
        ]
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let picked = select_top_up_partners(&snapshot(), dec!(0.05), "850440").unwrap();
        assert!(picked.contains(&124), "exactly 5% must be included");
        assert!(picked.contains(&156));
        assert!(!picked.contains(&842), "49.999 of 1000 is below 5%");
        assert!(!picked.contains(&0), "World is never a top-up candidate");
    }

    #[test]
    fn test_missing_world_is_reported() {
        let latest = vec![obs(124, "Canada", "2020", dec!(50))];
        let err = select_top_up_partners(&latest, dec!(0.05), "850440").unwrap_err();
        assert!(matches!(err, TradeDataError::MissingWorld { .. }));
    }

    #[test]
    fn test_series_totals_conserved() {
        let mut set = ObservationSet::new();
        set.merge(vec![
            obs(0, "World", "2020", dec!(100000)),
            obs(124, "Canada", "2020", dec!(60000)),
            obs(842, "USA", "2020", dec!(35000)),
        ]);
        let table = build_series(&set, &set.periods());

        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.period, "2020");
        assert_eq!(row.other, dec!(5000));
        assert_eq!(row.partner_values["Canada"], dec!(60000));
        assert_eq!(row.partner_values["USA"], dec!(35000));

        let partner_sum: Decimal = row.partner_values.values().copied().sum();
        assert_eq!(row.other + partner_sum, dec!(100000));
    }

    #[test]
    fn test_every_partner_has_a_value_for_every_period() {
        let mut set = ObservationSet::new();
        set.merge(vec![
            obs(0, "World", "2019", dec!(500)),
            obs(0, "World", "2020", dec!(600)),
            obs(124, "Canada", "2019", dec!(100)),
            // USA only observed in 2020
            obs(842, "USA", "2020", dec!(200)),
        ]);
        let table = build_series(&set, &set.periods());

        for row in &table.rows {
            for partner in table.partners.iter().filter(|p| *p != OTHER_NAME) {
                assert!(
                    row.partner_values.contains_key(partner),
                    "{partner} missing in {}",
                    row.period
                );
            }
        }
        assert_eq!(table.rows[1].partner_values["Canada"], Decimal::ZERO);
        assert_eq!(table.rows[0].partner_values["USA"], Decimal::ZERO);
    }

    #[test]
    fn test_negative_other_is_not_clamped() {
        let mut set = ObservationSet::new();
        set.merge(vec![
            obs(0, "World", "2020", dec!(100)),
            obs(156, "China", "2020", dec!(150)),
        ]);
        let table = build_series(&set, &set.periods());
        assert_eq!(table.rows[0].other, dec!(-50));
    }

    #[test]
    fn test_missing_world_period_treated_as_zero() {
        let mut set = ObservationSet::new();
        set.merge(vec![obs(124, "Canada", "2020", dec!(40))]);
        let table = build_series(&set, &set.periods());
        assert_eq!(table.rows[0].other, dec!(-40));
    }

    #[test]
    fn test_other_always_present_in_partner_set() {
        let set = ObservationSet::new();
        let table = build_series(&set, &[]);
        assert!(table.partners.contains(OTHER_NAME));
    }

    #[test]
    fn test_deterministic_output() {
        let mut set = ObservationSet::new();
        set.merge(snapshot());
        let periods = set.periods();
        let a = build_series(&set, &periods);
        let b = build_series(&set, &periods);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a.rows).unwrap(),
            serde_json::to_string(&b.rows).unwrap()
        );
    }
}
