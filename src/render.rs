//! Chart surface seam
//!
//! The rendering collaborator behind a trait so the loader never talks
//! to a concrete output. The production surface keeps the latest chart
//! snapshot in memory for the API to serve; tests substitute recording
//! surfaces to observe exactly what each epoch rendered.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::loader::LoaderPhase;
use crate::series::{SeriesRow, SeriesTable};

/// Accent palette cycled over partners
pub const ACCENT_PALETTE: [&str; 8] = [
    "#7fc97f", "#beaed4", "#fdc086", "#ffff99", "#386cb0", "#f0027f", "#bf5b17", "#666666",
];

/// Everything a renderer needs to draw the stacked chart
#[derive(Debug, Clone, Serialize)]
pub struct ChartSnapshot {
    /// HS code this chart belongs to
    pub hs6: Option<String>,
    pub phase: LoaderPhase,
    /// True while a fetch sequence is still in flight
    pub loading: bool,
    /// "no data" / "problem loading" text shown in place of the chart
    pub message: Option<String>,
    /// Period domain for the time scale
    pub periods: Vec<String>,
    /// Stacked rows, rebuilt from scratch on every render pass
    pub rows: Vec<SeriesRow>,
    /// Stacking key order: partner names in color-assignment order
    pub partners: Vec<String>,
    /// Stable partner-to-color mapping for the life of one epoch
    pub colors: BTreeMap<String, String>,
    /// World maximum for the value scale
    pub max_world_value: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Default for ChartSnapshot {
    fn default() -> Self {
        Self {
            hs6: None,
            phase: LoaderPhase::Idle,
            loading: false,
            message: None,
            periods: Vec::new(),
            rows: Vec::new(),
            partners: Vec::new(),
            colors: BTreeMap::new(),
            max_world_value: Decimal::ZERO,
            updated_at: Utc::now(),
        }
    }
}

/// Rendering collaborator for one chart slot.
///
/// The loader calls these between fetch rounds; implementations must be
/// cheap and non-blocking since they run on the response path.
pub trait ChartSurface: Send + Sync {
    /// New epoch: drop any previous chart, show the loading indicator
    fn begin(&self, hs6: &str);

    /// Replace the chart contents with a freshly built series table
    fn render(&self, hs6: &str, table: &SeriesTable, phase: LoaderPhase);

    /// Show a message in place of the chart and stop loading
    fn fail(&self, hs6: &str, message: &str);

    /// Sequence complete: clear the loading indicator
    fn finish(&self, hs6: &str);
}

/// Production surface: latest snapshot behind a lock, served as JSON
#[derive(Default)]
pub struct SharedChart {
    inner: RwLock<ChartSnapshot>,
}

impl SharedChart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ChartSnapshot {
        self.inner.read().clone()
    }
}

impl ChartSurface for SharedChart {
    fn begin(&self, hs6: &str) {
        let mut snap = self.inner.write();
        *snap = ChartSnapshot {
            hs6: Some(hs6.to_string()),
            phase: LoaderPhase::FetchingPrimary,
            loading: true,
            ..Default::default()
        };
    }

    fn render(&self, hs6: &str, table: &SeriesTable, phase: LoaderPhase) {
        let mut snap = self.inner.write();
        snap.hs6 = Some(hs6.to_string());
        snap.phase = phase;
        snap.periods = table.rows.iter().map(|r| r.period.clone()).collect();
        snap.rows = table.rows.clone();
        snap.max_world_value = table.max_world_value;
        snap.message = None;
        snap.updated_at = Utc::now();

        // Assign colors to partners first seen this pass; existing
        // assignments survive so a partner keeps its color while the
        // set grows across rounds.
        for partner in &table.partners {
            if !snap.colors.contains_key(partner) {
                let color = ACCENT_PALETTE[snap.colors.len() % ACCENT_PALETTE.len()];
                snap.colors.insert(partner.clone(), color.to_string());
                snap.partners.push(partner.clone());
            }
        }
    }

    fn fail(&self, hs6: &str, message: &str) {
        let mut snap = self.inner.write();
        snap.hs6 = Some(hs6.to_string());
        snap.phase = LoaderPhase::Done;
        snap.loading = false;
        snap.message = Some(message.to_string());
        snap.updated_at = Utc::now();
    }

    fn finish(&self, hs6: &str) {
        let mut snap = self.inner.write();
        snap.hs6 = Some(hs6.to_string());
        snap.phase = LoaderPhase::Done;
        snap.loading = false;
        snap.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Observation, ObservationSet};
    use crate::series::build_series;
    use rust_decimal_macros::dec;

    fn table(names: &[(u32, &str)]) -> SeriesTable {
        let mut set = ObservationSet::new();
        let mut batch = vec![Observation::new(0, "World", "2020", dec!(1000))];
        for (code, name) in names {
            batch.push(Observation::new(*code, *name, "2020", dec!(100)));
        }
        set.merge(batch);
        build_series(&set, &set.periods())
    }

    #[test]
    fn test_begin_clears_previous_chart() {
        let chart = SharedChart::new();
        chart.render(
            "271019",
            &table(&[(124, "Canada")]),
            LoaderPhase::FetchingTopUps,
        );
        chart.begin("850440");

        let snap = chart.snapshot();
        assert_eq!(snap.hs6.as_deref(), Some("850440"));
        assert!(snap.loading);
        assert!(snap.rows.is_empty());
        assert!(snap.colors.is_empty());
    }

    #[test]
    fn test_colors_stable_as_partner_set_grows() {
        let chart = SharedChart::new();
        chart.begin("850440");
        chart.render(
            "850440",
            &table(&[(124, "Canada")]),
            LoaderPhase::FetchingLatestAll,
        );
        let first = chart.snapshot().colors["Canada"].clone();

        chart.render(
            "850440",
            &table(&[(124, "Canada"), (36, "Australia")]),
            LoaderPhase::FetchingTopUps,
        );
        let snap = chart.snapshot();
        assert_eq!(snap.colors["Canada"], first);
        assert!(snap.colors.contains_key("Australia"));
        assert!(snap.colors.contains_key("Other"));
    }

    #[test]
    fn test_fail_replaces_chart_with_message() {
        let chart = SharedChart::new();
        chart.begin("850440");
        chart.fail("850440", "problem loading trade data");

        let snap = chart.snapshot();
        assert!(!snap.loading);
        assert_eq!(snap.phase, LoaderPhase::Done);
        assert_eq!(snap.message.as_deref(), Some("problem loading trade data"));
    }
}
