use chrono::{DateTime, Utc};
use dealwatch_core::{Candidate, CandidateStore, CycleStats, DatabaseError, DedupRecord, UpstreamError};
use price_client::{candidate_from_raw, CategoryFanOut, DealQuery, PriceSource};
use publisher::{compose_deal_post, PublishGovernor, Publisher};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::dedup::DedupStore;
use crate::filter::FilterChain;
use crate::ranker::Ranker;

/// Stages of one processing cycle. `Failed` is absorbing; a cycle that
/// reaches it still emits its partial statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Fetching,
    PersistFiltering,
    PublishFiltering,
    Ranking,
    Publishing,
    Done,
    Failed,
}

impl fmt::Display for CycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleState::Fetching => "fetching",
            CycleState::PersistFiltering => "persist-filtering",
            CycleState::PublishFiltering => "publish-filtering",
            CycleState::Ranking => "ranking",
            CycleState::Publishing => "publishing",
            CycleState::Done => "done",
            CycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How each cycle acquires candidates.
#[derive(Debug, Clone)]
pub enum FetchMode {
    /// One unscoped listing call; suits tight token plans.
    Single,
    /// Concurrent per-category fetch across the given category set.
    FanOut { categories: Vec<u64> },
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub fetch_mode: FetchMode,
    pub base_query: DealQuery,
    /// Discount floor for the relaxed retry when the primary query is empty.
    pub fallback_min_discount: f64,
    pub niche_only_publish: bool,
    pub publishing_enabled: bool,
}

/// Ties the whole pipeline together: fetch, persist-tier filtering with
/// dedup, publish-tier filtering, ranking, and the governor-gated publish
/// loop. One cycle runs to completion before the next begins; the caller
/// owns scheduling.
pub struct Orchestrator<S: PriceSource + 'static, C: CandidateStore, P: Publisher> {
    source: Arc<S>,
    store: Arc<C>,
    publisher: Arc<P>,
    fanout: CategoryFanOut<S>,
    filters: FilterChain,
    dedup: DedupStore,
    ranker: Ranker,
    governor: Mutex<PublishGovernor>,
    config: EngineConfig,
}

impl<S: PriceSource + 'static, C: CandidateStore, P: Publisher> Orchestrator<S, C, P> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<S>,
        store: Arc<C>,
        publisher: Arc<P>,
        fanout: CategoryFanOut<S>,
        filters: FilterChain,
        dedup: DedupStore,
        ranker: Ranker,
        governor: PublishGovernor,
        config: EngineConfig,
    ) -> Self {
        Self {
            source,
            store,
            publisher,
            fanout,
            filters,
            dedup,
            ranker,
            governor: Mutex::new(governor),
            config,
        }
    }

    pub fn dedup(&self) -> &DedupStore {
        &self.dedup
    }

    /// Daily-cadence hook, invoked by the scheduling layer.
    pub fn reset_publish_period(&self) {
        self.governor.lock().unwrap().reset_period(Utc::now());
    }

    pub async fn run_cycle(&self) -> CycleStats {
        let started = Instant::now();
        let mut stats = CycleStats::default();
        info!("cycle started ({})", CycleState::Fetching);

        let candidates = match self.fetch_stage(&mut stats).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("fetch stage unreachable: {}", e);
                stats.errors += 1;
                return self.finish(stats, started, CycleState::Failed).await;
            }
        };

        debug!("entering {}", CycleState::PersistFiltering);
        let now = Utc::now();
        let mut persisted = Vec::new();
        for candidate in candidates {
            if let Err(e) = self.recover_cooldowns(&candidate.product_id, now).await {
                error!("persistence unreachable, aborting cycle: {}", e);
                stats.errors += 1;
                return self.finish(stats, started, CycleState::Failed).await;
            }
            if self.dedup.is_in_detect_cooldown(&candidate.product_id, now) {
                stats.filtered_out += 1;
                continue;
            }
            if !self.filters.passes_persist_tier(&candidate) {
                stats.filtered_out += 1;
                continue;
            }
            match self.store.save_candidate(&candidate).await {
                Ok(_) => {
                    self.dedup.record_detected(&candidate.product_id, now);
                    stats.persisted += 1;
                    persisted.push(candidate);
                }
                Err(e) if e.is_connection_failure() => {
                    error!("persistence unreachable, aborting cycle: {}", e);
                    stats.errors += 1;
                    return self.finish(stats, started, CycleState::Failed).await;
                }
                Err(e) => {
                    warn!("failed to persist {}: {}", candidate.product_id, e);
                    stats.errors += 1;
                }
            }
        }

        debug!("entering {}", CycleState::PublishFiltering);
        let mut publishable = Vec::new();
        for candidate in persisted {
            if self.dedup.is_in_publish_cooldown(&candidate.product_id, now) {
                stats.filtered_out += 1;
                continue;
            }
            if !self
                .filters
                .passes_publish_tier(&candidate, self.config.niche_only_publish)
            {
                stats.filtered_out += 1;
                continue;
            }
            publishable.push(candidate);
        }

        debug!("entering {}", CycleState::Ranking);
        let ranked = self.ranker.top(&publishable);
        info!(
            "{} candidates ranked for publish consideration",
            ranked.len()
        );

        debug!("entering {}", CycleState::Publishing);
        if self.config.publishing_enabled {
            for scored in &ranked {
                let now = Utc::now();
                if !self.governor.lock().unwrap().can_publish(now) {
                    info!("posting governor closed, deferring remaining candidates");
                    break;
                }

                let candidate = &scored.candidate;
                let niche = self.filters.is_niche_product(candidate);
                let text = compose_deal_post(candidate, niche);

                match self.publisher.publish(&text).await {
                    Ok(post_id) => {
                        let now = Utc::now();
                        self.governor.lock().unwrap().record_publish(now);
                        self.dedup.record_published(&candidate.product_id, now, &post_id);
                        stats.published += 1;
                        info!(
                            "published {} (score {:.1}) as post {}",
                            candidate.product_id, scored.score, post_id
                        );

                        if let Err(e) = self
                            .store
                            .mark_published(&candidate.product_id, &post_id, now)
                            .await
                        {
                            if e.is_connection_failure() {
                                error!("persistence unreachable, aborting cycle: {}", e);
                                stats.errors += 1;
                                return self.finish(stats, started, CycleState::Failed).await;
                            }
                            warn!("failed to record publish for {}: {}", candidate.product_id, e);
                            stats.errors += 1;
                        }
                    }
                    Err(e) => {
                        warn!("publish failed for {}: {}", candidate.product_id, e);
                        stats.errors += 1;
                    }
                }
            }
        } else {
            debug!("publishing disabled, skipping {} candidates", ranked.len());
        }

        self.finish(stats, started, CycleState::Done).await
    }

    /// On the first sighting of a product this process lifetime, consult
    /// persisted history so cooldowns survive restarts. Only a
    /// connection-level store failure propagates; a failed lookup just
    /// leaves the product treated as fresh.
    async fn recover_cooldowns(
        &self,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        if self.dedup.is_known(product_id) {
            return Ok(());
        }
        let since = now - self.dedup.lookback();
        match self.store.find_recent(product_id, since).await {
            Ok(Some(stored)) => {
                self.dedup.hydrate(
                    product_id,
                    DedupRecord {
                        last_detected_at: stored.detected_at,
                        last_published_at: stored.published_at.filter(|_| stored.published),
                        published_post_id: None,
                    },
                );
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) if e.is_connection_failure() => Err(e),
            Err(e) => {
                warn!("history lookup failed for {}: {}", product_id, e);
                Ok(())
            }
        }
    }

    async fn fetch_stage(&self, stats: &mut CycleStats) -> Result<Vec<Candidate>, UpstreamError> {
        match &self.config.fetch_mode {
            FetchMode::Single => {
                stats.categories_checked = 1;
                let raw = self.source.list_price_drops(&self.config.base_query).await?;
                stats.fetched = raw.len() as u32;
                let mut candidates = convert_raw(&raw, stats);
                if candidates.is_empty() {
                    candidates = self.fallback_fetch(stats).await?;
                }
                Ok(candidates)
            }
            FetchMode::FanOut { categories } => {
                let outcome = self.fanout.fetch(&self.config.base_query, categories).await;
                stats.categories_checked = outcome.categories_checked as u32;
                stats.categories_failed = outcome.categories_failed as u32;
                stats.fetched = outcome.fetched as u32;
                stats.filtered_out += outcome.invalid as u32;

                if outcome.categories_checked > 0
                    && outcome.categories_failed == outcome.categories_checked
                {
                    return Err(UpstreamError::Transport {
                        details: "every category fetch failed".to_string(),
                    });
                }

                let mut candidates = outcome.candidates;
                if candidates.is_empty() {
                    candidates = self.fallback_fetch(stats).await?;
                }
                Ok(candidates)
            }
        }
    }

    /// Relaxed unscoped retry used when the primary query finds nothing.
    async fn fallback_fetch(&self, stats: &mut CycleStats) -> Result<Vec<Candidate>, UpstreamError> {
        let relaxed = self
            .config
            .base_query
            .relaxed(self.config.fallback_min_discount);
        info!(
            "primary query empty, retrying with discount floor {:.0}%",
            self.config.fallback_min_discount
        );
        let raw = self.source.list_price_drops(&relaxed).await?;
        stats.fetched += raw.len() as u32;
        Ok(convert_raw(&raw, stats))
    }

    async fn finish(&self, mut stats: CycleStats, started: Instant, state: CycleState) -> CycleStats {
        stats.completed = state == CycleState::Done;
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        if let Err(e) = self.store.record_metrics(&stats).await {
            warn!("failed to record cycle metrics: {}", e);
        }

        info!(
            "cycle {} in {}ms: fetched {} persisted {} published {} filtered {} errors {}",
            state,
            stats.elapsed_ms,
            stats.fetched,
            stats.persisted,
            stats.published,
            stats.filtered_out,
            stats.errors
        );
        stats
    }
}

fn convert_raw(raw: &[price_client::RawDeal], stats: &mut CycleStats) -> Vec<Candidate> {
    let mut candidates = Vec::with_capacity(raw.len());
    for entry in raw {
        match candidate_from_raw(entry) {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                debug!("dropping malformed entry: {}", e);
                stats.filtered_out += 1;
            }
        }
    }
    candidates
}
