//! Incremental trade-data loader
//!
//! Drives the multi-round fetch sequence for one HS-code lookup:
//! World + home-country history first, then a latest-period scan of all
//! partners to rank them, then batched full-history top-ups for every
//! partner above the share threshold, re-rendering after each round.
//!
//! A new selection supersedes the one in flight. There is no request
//! abort; each response handler re-checks its epoch token against the
//! latest one and discards stale results before any merge or render.
//! Token check and surface write happen under one lock, so a stale
//! epoch can never overwrite what a newer one has drawn.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::comtrade::{PartnerScope, PeriodScope, TradeFetcher, TradeQuery};
use crate::config::Config;
use crate::model::{ObservationSet, WORLD_CODE};
use crate::render::ChartSurface;
use crate::series::{build_series, select_top_up_partners};

/// Message shown when the API answered but had nothing for this code
pub const NO_DATA_MESSAGE: &str = "no trade data available for this code";
/// Message shown when the fetch itself failed
pub const PROBLEM_MESSAGE: &str = "problem loading trade data";

/// Identifies one lookup; monotonically increasing, newest wins
pub type EpochToken = u64;

/// Loader state within one epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoaderPhase {
    Idle,
    FetchingPrimary,
    FetchingLatestAll,
    FetchingTopUps,
    Done,
    /// Superseded by a newer epoch; absorbing
    Invalidated,
}

/// Orchestrator for the fetch sequence of the currently selected code
pub struct IncrementalLoader<F: TradeFetcher> {
    fetcher: F,
    surface: Arc<dyn ChartSurface>,
    home_partner: u32,
    share_threshold: Decimal,
    batch_size: usize,
    current_epoch: AtomicU64,
    /// Held across every token-check-then-surface-write pair, so a
    /// stale epoch can never mutate the surface after a newer one has
    /// stamped
    epoch_gate: Mutex<()>,
}

impl<F: TradeFetcher> IncrementalLoader<F> {
    pub fn new(fetcher: F, surface: Arc<dyn ChartSurface>, config: &Config) -> Self {
        Self {
            fetcher,
            surface,
            home_partner: config.home_partner,
            share_threshold: config.share_threshold,
            batch_size: config.topup_batch_size.max(1),
            current_epoch: AtomicU64::new(0),
            epoch_gate: Mutex::new(()),
        }
    }

    /// Stamp a new epoch, invalidating whatever was in flight
    pub fn begin_epoch(&self) -> EpochToken {
        self.current_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether `epoch` is still the one the user is waiting on
    pub fn is_current(&self, epoch: EpochToken) -> bool {
        self.current_epoch.load(Ordering::SeqCst) == epoch
    }

    /// Run the full fetch sequence for one epoch. Returns the phase the
    /// epoch ended in. An epoch already superseded at entry never
    /// touches the surface.
    pub async fn run_epoch(&self, epoch: EpochToken, hs6: &str) -> LoaderPhase {
        {
            let _gate = self.epoch_gate.lock();
            if !self.is_current(epoch) {
                return self.discard(epoch, hs6);
            }
            self.surface.begin(hs6);
        }
        self.run_rounds(epoch, hs6).await
    }

    /// Token check and render as one atomic step. False means the epoch
    /// was superseded and nothing was written.
    fn render_current(
        &self,
        epoch: EpochToken,
        hs6: &str,
        set: &ObservationSet,
        phase: LoaderPhase,
    ) -> bool {
        let _gate = self.epoch_gate.lock();
        if !self.is_current(epoch) {
            return false;
        }
        self.surface
            .render(hs6, &build_series(set, &set.periods()), phase);
        true
    }

    fn fail_current(&self, epoch: EpochToken, hs6: &str, message: &str) -> LoaderPhase {
        let _gate = self.epoch_gate.lock();
        if !self.is_current(epoch) {
            return self.discard(epoch, hs6);
        }
        self.surface.fail(hs6, message);
        LoaderPhase::Done
    }

    fn finish_current(&self, epoch: EpochToken, hs6: &str) -> LoaderPhase {
        let _gate = self.epoch_gate.lock();
        if !self.is_current(epoch) {
            return self.discard(epoch, hs6);
        }
        self.surface.finish(hs6);
        LoaderPhase::Done
    }

    async fn run_rounds(&self, epoch: EpochToken, hs6: &str) -> LoaderPhase {
        info!(hs6 = %hs6, epoch, "lookup started");

        // Round 1: World + home country, full history. This seeds the
        // period axis and the value scale.
        let primary = TradeQuery {
            hs6: hs6.to_string(),
            partners: PartnerScope::Codes(vec![WORLD_CODE, self.home_partner]),
            periods: PeriodScope::All,
        };
        let result = self.fetcher.fetch(&primary).await;
        if !self.is_current(epoch) {
            return self.discard(epoch, hs6);
        }
        let observations = match result {
            Ok(obs) if !obs.is_empty() => obs,
            Ok(_) => {
                info!(hs6 = %hs6, "empty dataset from trade API");
                return self.fail_current(epoch, hs6, NO_DATA_MESSAGE);
            }
            Err(e) => {
                warn!(hs6 = %hs6, error = %e, "primary fetch failed");
                return self.fail_current(epoch, hs6, PROBLEM_MESSAGE);
            }
        };

        // Partners whose full history is already in the set; never
        // re-requested within this epoch.
        let mut fetched: HashSet<u32> = [WORLD_CODE, self.home_partner].into();

        let mut set = ObservationSet::new();
        let outcome = set.merge(observations);
        debug!(hs6 = %hs6, added = outcome.added, "primary round merged");
        if !self.render_current(epoch, hs6, &set, LoaderPhase::FetchingLatestAll) {
            return self.discard(epoch, hs6);
        }

        // Round 2: all partners, latest period only. Feeds the partner
        // selector; never merged into the accumulator, otherwise every
        // minor partner would join the series with a one-period history.
        let latest_query = TradeQuery {
            hs6: hs6.to_string(),
            partners: PartnerScope::All,
            periods: PeriodScope::Latest,
        };
        let latest = self.fetcher.fetch(&latest_query).await;
        if !self.is_current(epoch) {
            return self.discard(epoch, hs6);
        }
        let queue: Vec<u32> = match latest {
            Ok(snapshot) => match select_top_up_partners(&snapshot, self.share_threshold, hs6) {
                Ok(codes) => codes.into_iter().filter(|c| !fetched.contains(c)).collect(),
                Err(e) => {
                    warn!(hs6 = %hs6, error = %e, "cannot rank partners");
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(hs6 = %hs6, error = %e, "latest-period scan failed");
                Vec::new()
            }
        };
        debug!(hs6 = %hs6, candidates = queue.len(), "top-up queue built");

        // Rounds 3..N: pop up to batch_size codes per request. A failed
        // batch stops further top-ups but keeps what already rendered.
        for batch in queue.chunks(self.batch_size) {
            let query = TradeQuery {
                hs6: hs6.to_string(),
                partners: PartnerScope::Codes(batch.to_vec()),
                periods: PeriodScope::All,
            };
            let result = self.fetcher.fetch(&query).await;
            if !self.is_current(epoch) {
                return self.discard(epoch, hs6);
            }
            match result {
                Ok(obs) => {
                    fetched.extend(batch.iter().copied());
                    let outcome = set.merge(obs);
                    debug!(
                        hs6 = %hs6,
                        partners = batch.len(),
                        added = outcome.added,
                        dropped = outcome.dropped,
                        "top-up batch merged"
                    );
                    if !self.render_current(epoch, hs6, &set, LoaderPhase::FetchingTopUps) {
                        return self.discard(epoch, hs6);
                    }
                }
                Err(e) => {
                    warn!(hs6 = %hs6, error = %e, "top-up batch failed, keeping partial chart");
                    break;
                }
            }
        }

        info!(hs6 = %hs6, epoch, observations = set.len(), "lookup complete");
        self.finish_current(epoch, hs6)
    }

    /// Stale response path: no merge, no render, no further requests.
    /// The newer epoch's `begin` already owns the surface.
    fn discard(&self, epoch: EpochToken, hs6: &str) -> LoaderPhase {
        debug!(hs6 = %hs6, epoch, "epoch superseded, discarding response");
        LoaderPhase::Invalidated
    }
}

impl<F: TradeFetcher + 'static> IncrementalLoader<F> {
    /// Begin a new lookup in the background and return its token.
    ///
    /// The stamp and the surface clear happen under the epoch gate as
    /// one step, so two racing selections always leave the surface
    /// owned by the newer epoch.
    pub fn select(self: &Arc<Self>, hs6: String) -> EpochToken {
        let epoch = {
            let _gate = self.epoch_gate.lock();
            let epoch = self.begin_epoch();
            self.surface.begin(&hs6);
            epoch
        };
        let loader = Arc::clone(self);
        tokio::spawn(async move {
            loader.run_rounds(epoch, &hs6).await;
        });
        epoch
    }
}
