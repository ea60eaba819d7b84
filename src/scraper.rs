//! The collection pipeline: discovery, deduplication, enrichment, export.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::client::TwitchApi;
use crate::dedup::Deduplicator;
use crate::enrich;
use crate::error::ScoutError;
use crate::export;
use crate::pagination::{self, FetchOutcome};
use crate::progress::{Phase, ProgressTracker};
use crate::types::{ExportConfig, Page, SearchCriteria, Streamer};

/// Accumulated state of one collection run.
///
/// `phase` marks how far the run has completed; on failure the state is
/// handed back to the caller so a follow-up run can pick up from the next
/// incomplete phase with every merged record preserved.
#[derive(Debug, Clone, Default)]
pub struct CollectionState {
    pub phase: Phase,
    pub records: Deduplicator,
    pub streamers: Vec<Streamer>,
}

/// A failed run, carrying the partial state needed to resume it.
#[derive(Debug)]
pub struct CollectionFailure {
    pub error: ScoutError,
    pub failed_in: Phase,
    pub state: CollectionState,
}

impl fmt::Display for CollectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "collection failed in {} (completed through {}): {}",
            self.failed_in, self.state.phase, self.error
        )
    }
}

impl std::error::Error for CollectionFailure {}

pub type CollectionResult = std::result::Result<CollectionState, Box<CollectionFailure>>;

/// Drives the phase state machine over a [`TwitchApi`] implementation.
pub struct Scraper {
    api: Arc<dyn TwitchApi>,
    progress: ProgressTracker,
    cancel: CancellationToken,
}

impl Scraper {
    pub fn new(api: Arc<dyn TwitchApi>) -> Self {
        Self::with_cancellation(api, CancellationToken::new())
    }

    pub fn with_cancellation(api: Arc<dyn TwitchApi>, cancel: CancellationToken) -> Self {
        Scraper {
            api,
            progress: ProgressTracker::new(),
            cancel,
        }
    }

    /// Handle for observing phase and counters while a run is in flight.
    pub fn progress(&self) -> ProgressTracker {
        self.progress.clone()
    }

    /// Collect streamers matching the criteria, exporting at the end when an
    /// export target is configured.
    #[instrument(skip(self, criteria, export_config), fields(game_id = ?criteria.game_id, language = ?criteria.language))]
    pub async fn collect(
        &self,
        criteria: &SearchCriteria,
        export_config: Option<&ExportConfig>,
    ) -> CollectionResult {
        self.run(CollectionState::default(), criteria, export_config)
            .await
    }

    /// Continue a failed run. Completed phases are skipped; records merged
    /// before the failure are preserved.
    pub async fn resume(
        &self,
        state: CollectionState,
        criteria: &SearchCriteria,
        export_config: Option<&ExportConfig>,
    ) -> CollectionResult {
        info!(completed_through = %state.phase, "resuming collection");
        self.run(state, criteria, export_config).await
    }

    async fn run(
        &self,
        mut state: CollectionState,
        criteria: &SearchCriteria,
        export_config: Option<&ExportConfig>,
    ) -> CollectionResult {
        if let Err(e) = criteria.validate() {
            return Err(self.fail(state, Phase::Idle, e));
        }

        counter!("streamscout_runs_total").increment(1);
        let run_started = Instant::now();

        if state.phase.rank() < Phase::Authenticating.rank() {
            self.progress.set_phase(Phase::Authenticating);
            if let Err(e) = self.api.ensure_authenticated().await {
                return Err(self.fail(state, Phase::Authenticating, e));
            }
            state.phase = Phase::Authenticating;
        }

        if state.phase.rank() < Phase::CollectingLive.rank() {
            self.progress.set_phase(Phase::CollectingLive);
            info!("searching live streams");
            let phase_started = Instant::now();

            let outcome = self.collect_live(criteria).await;
            let merged = merge_outcome_records(&mut state, &outcome, criteria.limit);
            counter!("streamscout_records_merged_total", "phase" => "live").increment(merged);
            self.progress.set_live_found(state.records.len() as u64);

            if let Some(stop) = self.check_outcome(&mut state, outcome, Phase::CollectingLive) {
                return Err(stop);
            }
            histogram!("streamscout_phase_duration_seconds", "phase" => "live")
                .record(phase_started.elapsed().as_secs_f64());
            info!(found = state.records.len(), "live discovery finished");
            state.phase = Phase::CollectingLive;
        }

        if state.phase.rank() < Phase::CollectingOffline.rank() {
            let live_total = state.records.len();
            if criteria.include_offline && live_total < criteria.limit {
                self.progress.set_phase(Phase::CollectingOffline);
                info!("searching offline channels");
                let phase_started = Instant::now();

                let outcome = self
                    .collect_offline(criteria, criteria.limit - live_total)
                    .await;
                let merged = merge_outcome_records(&mut state, &outcome, criteria.limit);
                counter!("streamscout_records_merged_total", "phase" => "offline")
                    .increment(merged);
                self.progress
                    .set_offline_found((state.records.len() - live_total) as u64);

                if let Some(stop) =
                    self.check_outcome(&mut state, outcome, Phase::CollectingOffline)
                {
                    return Err(stop);
                }
                histogram!("streamscout_phase_duration_seconds", "phase" => "offline")
                    .record(phase_started.elapsed().as_secs_f64());
                info!(
                    found = state.records.len() - live_total,
                    "offline discovery finished"
                );
            }
            state.phase = Phase::CollectingOffline;
        }

        if state.phase.rank() < Phase::Enriching.rank() {
            self.progress.set_phase(Phase::Enriching);
            if self.cancel.is_cancelled() {
                return Err(self.fail(state, Phase::Enriching, ScoutError::Cancelled));
            }
            info!(records = state.records.len(), "enriching profiles");
            let phase_started = Instant::now();

            let ids: Vec<String> = state.records.ids().cloned().collect();
            let profiles = match enrich::fetch_profiles(self.api.as_ref(), &ids).await {
                Ok(profiles) => profiles,
                Err(e) => return Err(self.fail(state, Phase::Enriching, e)),
            };

            let mut streamers = Vec::with_capacity(profiles.len());
            let mut dropped: u64 = 0;
            for raw in state.records.records() {
                match profiles.get(&raw.twitch_id) {
                    Some(profile) => streamers.push(enrich::build_streamer(raw.clone(), profile)),
                    None => {
                        let gap = ScoutError::PartialData(raw.twitch_id.clone());
                        warn!(error = %gap, "dropping record");
                        dropped += 1;
                    }
                }
            }
            if dropped > 0 {
                self.progress.record_errors(dropped);
                counter!("streamscout_records_dropped_total").increment(dropped);
            }
            histogram!("streamscout_phase_duration_seconds", "phase" => "enrich")
                .record(phase_started.elapsed().as_secs_f64());
            state.streamers = streamers;
            state.phase = Phase::Enriching;
        }

        if state.phase.rank() < Phase::Exporting.rank() {
            if let Some(config) = export_config {
                self.progress.set_phase(Phase::Exporting);
                if let Err(e) = export::write(&state.streamers, config, criteria) {
                    return Err(self.fail(state, Phase::Exporting, e));
                }
            }
            state.phase = Phase::Exporting;
        }

        state.phase = Phase::Complete;
        self.progress.set_phase(Phase::Complete);
        histogram!("streamscout_run_duration_seconds").record(run_started.elapsed().as_secs_f64());
        info!(total = state.streamers.len(), "collection complete");
        Ok(state)
    }

    async fn collect_live(&self, criteria: &SearchCriteria) -> FetchOutcome {
        let api = Arc::clone(&self.api);
        let progress = self.progress.clone();
        let game_id = criteria.game_id.clone();
        let language = criteria.language.clone();
        let min_viewers = criteria.min_viewers;
        let max_viewers = criteria.max_viewers;

        pagination::fetch_all(criteria.limit, &self.cancel, move |first, after| {
            let api = Arc::clone(&api);
            let progress = progress.clone();
            let game_id = game_id.clone();
            let language = language.clone();
            async move {
                let page = api
                    .get_streams(game_id.as_deref(), language.as_deref(), first, after.as_deref())
                    .await?;
                progress.record_processed(page.items.len() as u64);
                let items = page
                    .items
                    .into_iter()
                    .filter(|stream| {
                        let viewers = stream.viewer_count.unwrap_or(0);
                        viewers >= min_viewers && max_viewers.map_or(true, |max| viewers <= max)
                    })
                    .collect();
                Ok(Page {
                    items,
                    cursor: page.cursor,
                })
            }
        })
        .await
    }

    async fn collect_offline(&self, criteria: &SearchCriteria, remaining: usize) -> FetchOutcome {
        let api = Arc::clone(&self.api);
        let progress = self.progress.clone();
        // The search endpoint wants a text query, not filters.
        let query = criteria
            .game_name
            .clone()
            .or_else(|| criteria.game_id.clone())
            .unwrap_or_else(|| "streamer".to_string());
        let language = criteria.language.clone();

        pagination::fetch_all(remaining, &self.cancel, move |first, after| {
            let api = Arc::clone(&api);
            let progress = progress.clone();
            let query = query.clone();
            let language = language.clone();
            async move {
                let page = api
                    .search_channels(&query, first, after.as_deref(), false)
                    .await?;
                progress.record_processed(page.items.len() as u64);
                let items = page
                    .items
                    .into_iter()
                    // Live channels were already collected in the previous phase.
                    .filter(|channel| !channel.is_live)
                    .filter(|channel| match (&language, &channel.language) {
                        (Some(wanted), Some(actual)) => wanted == actual,
                        (Some(_), None) => false,
                        (None, _) => true,
                    })
                    .collect();
                Ok(Page {
                    items,
                    cursor: page.cursor,
                })
            }
        })
        .await
    }

    /// Decide what a discovery outcome means for the run: cancellation and
    /// authentication failures stop it, anything else truncates the phase
    /// and the run carries on with what was merged.
    fn check_outcome(
        &self,
        state: &mut CollectionState,
        outcome: FetchOutcome,
        phase: Phase,
    ) -> Option<Box<CollectionFailure>> {
        if outcome.cancelled {
            return Some(self.fail(std::mem::take(state), phase, ScoutError::Cancelled));
        }
        if let Some(error) = outcome.truncated_by {
            if matches!(error, ScoutError::Authentication(_)) {
                return Some(self.fail(std::mem::take(state), phase, error));
            }
            warn!(phase = %phase, error = %error, "discovery phase ended early");
            self.progress.record_errors(1);
        }
        None
    }

    fn fail(
        &self,
        state: CollectionState,
        failed_in: Phase,
        error: ScoutError,
    ) -> Box<CollectionFailure> {
        self.progress.set_phase(Phase::Failed);
        counter!("streamscout_run_failures_total").increment(1);
        error!(phase = %failed_in, error = %error, "collection failed");
        Box::new(CollectionFailure {
            error,
            failed_in,
            state,
        })
    }
}

/// Fold freshly fetched records into the run state, stopping at the cap.
/// Returns how many new identities were added.
fn merge_outcome_records(
    state: &mut CollectionState,
    outcome: &FetchOutcome,
    limit: usize,
) -> u64 {
    let mut added = 0;
    for raw in &outcome.records {
        if state.records.len() >= limit {
            break;
        }
        if state.records.merge(raw.clone()) {
            added += 1;
        }
    }
    added
}
