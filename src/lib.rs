//! tradestack - incremental trade-data aggregation for HS-code lookups
//!
//! Looks up a 6-digit Harmonized System code in a locally bundled
//! tariff/gain dataset and progressively overlays live bilateral trade
//! statistics from the UN Comtrade API, reshaped into the stacked
//! series a chart renderer consumes.
//!
//! ## Architecture
//!
//! - **Dataset**: one-shot CSV load of HS codes, descriptions and
//!   precomputed provincial gain figures
//! - **Comtrade client**: typed, validated ingestion of the remote
//!   trade API's duck-shaped records
//! - **Series core**: deduplicating observation set, market-share
//!   partner selection, stacked-series building
//! - **Loader**: the cancellable multi-round fetch orchestrator; a new
//!   selection supersedes the one in flight via epoch tokens
//! - **Chart surface**: rendering seam holding the latest snapshot for
//!   the HTTP API

use std::sync::Arc;

pub mod comtrade;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loader;
pub mod model;
pub mod render;
pub mod series;

pub use comtrade::{ComtradeClient, PartnerScope, PeriodScope, TradeFetcher, TradeQuery};
pub use config::Config;
pub use dataset::{HsDataset, HsRecord};
pub use error::{Result, TradeDataError};
pub use loader::{EpochToken, IncrementalLoader, LoaderPhase};
pub use model::{Observation, ObservationSet};
pub use render::{ChartSnapshot, ChartSurface, SharedChart};
pub use series::{build_series, select_top_up_partners, SeriesRow, SeriesTable};

/// Application state shared across API handlers
pub struct AppState {
    pub config: Arc<Config>,
    pub dataset: Arc<HsDataset>,
    pub chart: Arc<SharedChart>,
    pub loader: Arc<IncrementalLoader<ComtradeClient>>,
}
