//! # Rentwatch
//!
//! Batch engine that resolves noisy landlord mentions from NYC public records
//! into canonical owners and scores every building and owner portfolio for
//! housing quality.
//!
//! A run normalizes a raw snapshot, resolves owners, builds portfolios,
//! scores everything against citywide references and publishes one complete
//! [`Generation`] to a [`ServingStore`]. The same snapshot and configuration
//! always produce the same generation.

pub mod config;
pub mod dsu;
pub mod index;
pub mod linker;
pub mod model;
pub mod normalize;
pub mod persistence;
pub mod portfolio;
pub mod profile;
pub mod publish;
pub mod ranking;
pub mod scoring;
pub mod search;
pub mod similarity;

// Re-export main types for convenience
pub use config::{RentwatchConfig, ResolverTuning, ScoringConfig, ScoringProfile};
pub use linker::Resolution;
pub use model::{Bbl, Borough, Building, CanonicalOwner, Grade, OwnerId};
pub use normalize::{NormalizedSnapshot, RawSnapshot};
pub use persistence::PersistentServingStore;
pub use portfolio::PortfolioBook;
pub use publish::{BuildingReport, Generation, MemoryServingStore, OwnerReport, ServingStore};
pub use scoring::{Score, ScoreBook, ScoringEngine};
pub use search::{AddressIndex, SearchHit};

use anyhow::Result;
use chrono::NaiveDate;
use profile::profile_scope;
use publish::{PublishInputs, ReportOptions};
use tracing::{info, instrument};

/// Intermediate results of one run, kept for inspection.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub as_of: NaiveDate,
    pub snapshot: NormalizedSnapshot,
    pub resolution: Resolution,
    pub portfolios: PortfolioBook,
    pub scores: ScoreBook,
    pub generation: Generation,
}

/// Main API for a pipeline run
pub struct Rentwatch {
    config: RentwatchConfig,
    scoring: ScoringConfig,
    pool: Option<rayon::ThreadPool>,
}

impl Rentwatch {
    /// Create a pipeline from a validated configuration.
    pub fn new(config: RentwatchConfig) -> Result<Self> {
        config.validate()?;
        let scoring = config.scoring_config();
        let pool = match config.pipeline.worker_threads {
            Some(threads) if threads > 0 => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|idx| format!("rentwatch-worker-{idx}"))
                    .build()?,
            ),
            _ => None,
        };
        Ok(Self {
            config,
            scoring,
            pool,
        })
    }

    /// Replace the scoring calibration for subsequent runs.
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Result<Self> {
        scoring.validate()?;
        self.scoring = scoring;
        Ok(self)
    }

    pub fn config(&self) -> &RentwatchConfig {
        &self.config
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Configured as-of date, else the latest date in the snapshot, else the epoch.
    pub fn as_of_for(&self, snapshot: &NormalizedSnapshot) -> NaiveDate {
        self.config
            .pipeline
            .as_of
            .or(snapshot.latest_date)
            .unwrap_or_default()
    }

    /// Run every stage and assemble the generation without publishing it.
    pub fn run(&self, raw: &RawSnapshot) -> Result<Generation> {
        Ok(self.run_detailed(raw)?.generation)
    }

    /// Run every stage, keeping the intermediate results.
    pub fn run_detailed(&self, raw: &RawSnapshot) -> Result<RunOutput> {
        match &self.pool {
            Some(pool) => pool.install(|| self.run_stages(raw)),
            None => self.run_stages(raw),
        }
    }

    /// Run the pipeline and swap the result into `store`.
    ///
    /// On any failure the store keeps serving its previous generation.
    pub fn run_and_publish(&self, raw: &RawSnapshot, store: &dyn ServingStore) -> Result<u64> {
        let generation = self.run(raw)?;
        let _guard = profile_scope("publish");
        let number = store.publish(generation)?;
        info!(generation = number, "Run published");
        Ok(number)
    }

    #[instrument(skip_all, level = "debug")]
    fn run_stages(&self, raw: &RawSnapshot) -> Result<RunOutput> {
        let snapshot = {
            let _guard = profile_scope("normalize");
            normalize::normalize_snapshot(raw)
        };
        let as_of = self.as_of_for(&snapshot);

        let resolution = {
            let _guard = profile_scope("resolve");
            linker::resolve_owners(&snapshot.mentions, &self.config.resolver)?
        };

        let (activity, portfolios) = {
            let _guard = profile_scope("portfolio");
            let activity = portfolio::collect_activity(
                &snapshot,
                as_of,
                self.scoring.complaints.recent_window_days,
            );
            let portfolios = portfolio::build_portfolios(
                &snapshot,
                &resolution,
                &activity,
                &self.scoring.ownership,
            );
            (activity, portfolios)
        };

        let scores = {
            let _guard = profile_scope("score");
            ScoringEngine::new(&self.scoring).score_all(&snapshot, &activity, &portfolios)
        };

        let generation = {
            let _guard = profile_scope("assemble");
            publish::build_generation(
                &PublishInputs {
                    snapshot: &snapshot,
                    resolution: &resolution,
                    book: &portfolios,
                    activity: &activity,
                    scores: &scores,
                    as_of,
                },
                ReportOptions {
                    recent_event_limit: self.config.publish.recent_event_limit,
                    leaderboard_size: self.config.publish.leaderboard_size,
                },
            )
        };

        info!(
            %as_of,
            buildings = generation.buildings.len(),
            owners = generation.owners.len(),
            rejected = snapshot.stats.total_rejected(),
            "Pipeline run complete"
        );

        Ok(RunOutput {
            as_of,
            snapshot,
            resolution,
            portfolios,
            scores,
            generation,
        })
    }
}

/// Build the address search index for a published generation.
pub fn search_index(generation: &Generation) -> AddressIndex {
    AddressIndex::from_generation(generation, config::DEFAULT_SEARCH_MIN_SIMILARITY)
}
