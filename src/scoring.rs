//! # Scoring Engine
//!
//! Raw metrics, sub-scores, overall score, grade and percentiles for every
//! building and every portfolio. A portfolio is scored as one virtual
//! building built from its aggregated counts, against the same citywide
//! references as individual buildings.

use crate::config::ScoringConfig;
use crate::model::{Bbl, Borough, Grade, OwnerId, SubScoreKind, ViolationCounts};
use crate::portfolio::{BuildingActivity, Portfolio, PortfolioBook};
use crate::normalize::NormalizedSnapshot;
use crate::ranking::{grouped_percentile_ranks, percentile_ranks, round2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// What a score is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreScope {
    Building(Bbl),
    Portfolio(OwnerId),
}

/// Ownership inputs of one scored unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OwnershipInput {
    pub portfolio_buildings: usize,
    pub opacity: f64,
}

impl OwnershipInput {
    pub fn from_portfolio(portfolio: &Portfolio) -> Self {
        Self {
            portfolio_buildings: portfolio.total_buildings,
            opacity: portfolio.opacity,
        }
    }
}

/// The raw values behind a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub units: Option<u64>,
    pub violations: ViolationCounts,
    pub open_violations: u32,
    pub complaints_total: u32,
    pub complaints_last_12_months: u32,
    pub evictions: u32,
    pub portfolio_buildings: Option<usize>,
    pub opacity: Option<f64>,
    /// Severity-weighted violations per unit.
    pub violation_density: Option<f64>,
    /// Recency-weighted complaints per unit.
    pub complaint_rate: Option<f64>,
    pub eviction_rate: Option<f64>,
    pub ownership_pressure: Option<f64>,
    pub closed_fraction: Option<f64>,
    pub median_days_to_close: Option<f64>,
    pub average_days_to_close: Option<f64>,
}

impl RawMetrics {
    /// Compute metrics from activity counts, a unit denominator and optional ownership.
    pub fn compute(
        activity: &BuildingActivity,
        units: Option<u64>,
        ownership: Option<OwnershipInput>,
        config: &ScoringConfig,
    ) -> Self {
        let units = units.filter(|u| *u > 0);
        let per_unit = |value: f64| units.map(|u| value / u as f64);

        let weights = &config.class_weights;
        let severity = activity.violations.c as f64 * weights.c
            + activity.violations.b as f64 * weights.b
            + activity.violations.a as f64 * weights.a;
        let weighted_complaints = activity.complaints_recent as f64
            + config.complaints.older_weight * activity.complaints_older as f64;

        let ownership_pressure = ownership.map(|input| {
            (1.0 + input.portfolio_buildings as f64).log2()
                * (1.0 + config.ownership.opacity_weight * input.opacity)
        });

        Self {
            units,
            violations: activity.violations,
            open_violations: activity.open_violations,
            complaints_total: activity.complaints_total(),
            complaints_last_12_months: activity.complaints_recent,
            evictions: activity.evictions,
            portfolio_buildings: ownership.map(|o| o.portfolio_buildings),
            opacity: ownership.map(|o| o.opacity),
            violation_density: per_unit(severity),
            complaint_rate: per_unit(weighted_complaints),
            eviction_rate: per_unit(activity.evictions as f64),
            ownership_pressure,
            closed_fraction: activity.closed_fraction(),
            median_days_to_close: activity.median_days_to_close(),
            average_days_to_close: activity.average_days_to_close(),
        }
    }
}

/// Raw values that map to 50 for each dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub violation_density: f64,
    pub complaint_rate: f64,
    pub eviction_rate: f64,
    pub ownership_pressure: f64,
    pub days_to_close: f64,
}

impl References {
    /// Resolve references from the building population.
    pub fn from_population(metrics: &[&RawMetrics], config: &ScoringConfig) -> Self {
        let median_of = |select: fn(&RawMetrics) -> Option<f64>| {
            let mut values: Vec<f64> = metrics.iter().filter_map(|m| select(m)).collect();
            median(&mut values)
        };
        Self {
            violation_density: config
                .calibration(SubScoreKind::Violation)
                .reference
                .resolve(median_of(|m| m.violation_density)),
            complaint_rate: config
                .calibration(SubScoreKind::Complaints)
                .reference
                .resolve(median_of(|m| m.complaint_rate)),
            eviction_rate: config
                .calibration(SubScoreKind::Eviction)
                .reference
                .resolve(median_of(|m| m.eviction_rate)),
            ownership_pressure: config
                .calibration(SubScoreKind::Ownership)
                .reference
                .resolve(median_of(|m| m.ownership_pressure)),
            days_to_close: config
                .calibration(SubScoreKind::Resolution)
                .reference
                .resolve(median_of(|m| m.median_days_to_close)),
        }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    values.sort_by(f64::total_cmp);
    Some(if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    })
}

/// Five sub-scores in `[0, 100]`, 100 = best; `None` = insufficient data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub violation: Option<f64>,
    pub complaints: Option<f64>,
    pub eviction: Option<f64>,
    pub ownership: Option<f64>,
    pub resolution: Option<f64>,
}

impl SubScores {
    pub fn get(&self, kind: SubScoreKind) -> Option<f64> {
        match kind {
            SubScoreKind::Violation => self.violation,
            SubScoreKind::Complaints => self.complaints,
            SubScoreKind::Eviction => self.eviction,
            SubScoreKind::Ownership => self.ownership,
            SubScoreKind::Resolution => self.resolution,
        }
    }

    pub fn set(&mut self, kind: SubScoreKind, value: Option<f64>) {
        let slot = match kind {
            SubScoreKind::Violation => &mut self.violation,
            SubScoreKind::Complaints => &mut self.complaints,
            SubScoreKind::Eviction => &mut self.eviction,
            SubScoreKind::Ownership => &mut self.ownership,
            SubScoreKind::Resolution => &mut self.resolution,
        };
        *slot = value;
    }

    pub fn compute(metrics: &RawMetrics, references: &References, config: &ScoringConfig) -> Self {
        let transform = |kind: SubScoreKind, raw: Option<f64>, reference: f64| {
            raw.map(|x| round2(config.calibration(kind).transform.apply(x, reference)))
        };

        let resolution = metrics.closed_fraction.map(|closed| {
            let days_component = match metrics.median_days_to_close {
                Some(days) => config
                    .calibration(SubScoreKind::Resolution)
                    .transform
                    .apply(days, references.days_to_close),
                // Closed without usable dates: judge on the closed share alone.
                None => 100.0 * closed,
            };
            let score = config.closed_weight * 100.0 * closed
                + (1.0 - config.closed_weight) * days_component;
            round2(score.clamp(0.0, 100.0))
        });

        Self {
            violation: transform(
                SubScoreKind::Violation,
                metrics.violation_density,
                references.violation_density,
            ),
            complaints: transform(
                SubScoreKind::Complaints,
                metrics.complaint_rate,
                references.complaint_rate,
            ),
            eviction: transform(
                SubScoreKind::Eviction,
                metrics.eviction_rate,
                references.eviction_rate,
            ),
            ownership: transform(
                SubScoreKind::Ownership,
                metrics.ownership_pressure,
                references.ownership_pressure,
            ),
            resolution,
        }
    }

    /// Weighted mean over the available sub-scores.
    pub fn overall(&self, config: &ScoringConfig) -> Option<f64> {
        let mut weighted = 0.0;
        let mut weight_sum = 0.0;
        for kind in SubScoreKind::ALL {
            if let Some(score) = self.get(kind) {
                let weight = config.weights.get(kind);
                weighted += weight * score;
                weight_sum += weight;
            }
        }
        (weight_sum > 0.0).then(|| round2(weighted / weight_sum))
    }

    pub fn missing(&self) -> Vec<SubScoreKind> {
        SubScoreKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind).is_none())
            .collect()
    }
}

/// Percentile of each sub-score within that sub-score's own population.
///
/// A null sub-score has no percentile and is left out of the population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScorePercentiles {
    pub city: SubScores,
    pub borough: SubScores,
}

/// A complete, explainable score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub scope: ScoreScope,
    pub borough: Option<Borough>,
    pub sub_scores: SubScores,
    pub overall: Option<f64>,
    pub grade: Option<Grade>,
    pub percentile_city: Option<f64>,
    pub percentile_borough: Option<f64>,
    pub sub_score_percentiles: SubScorePercentiles,
    pub metrics: RawMetrics,
    /// Dimensions without enough data to score.
    pub insufficient_data: Vec<SubScoreKind>,
}

impl Score {
    fn build(
        scope: ScoreScope,
        borough: Option<Borough>,
        metrics: RawMetrics,
        references: &References,
        config: &ScoringConfig,
    ) -> Self {
        let sub_scores = SubScores::compute(&metrics, references, config);
        let overall = sub_scores.overall(config);
        Self {
            scope,
            borough,
            sub_scores,
            overall,
            grade: overall.map(|value| config.grades.grade(value)),
            percentile_city: None,
            percentile_borough: None,
            sub_score_percentiles: SubScorePercentiles::default(),
            insufficient_data: sub_scores.missing(),
            metrics,
        }
    }
}

/// Scores of one run.
#[derive(Debug, Clone)]
pub struct ScoreBook {
    pub references: References,
    pub buildings: BTreeMap<Bbl, Score>,
    pub portfolios: BTreeMap<OwnerId, Score>,
}

/// Scores buildings and portfolios under one immutable calibration.
#[derive(Debug, Clone, Copy)]
pub struct ScoringEngine<'a> {
    config: &'a ScoringConfig,
}

impl<'a> ScoringEngine<'a> {
    pub fn new(config: &'a ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        self.config
    }

    /// Score every building and portfolio of a run.
    #[instrument(skip_all, level = "debug")]
    pub fn score_all(
        &self,
        snapshot: &NormalizedSnapshot,
        activity: &BTreeMap<Bbl, BuildingActivity>,
        book: &PortfolioBook,
    ) -> ScoreBook {
        let empty = BuildingActivity::default();
        let building_metrics: Vec<(Bbl, Borough, RawMetrics)> = snapshot
            .buildings
            .par_iter()
            .map(|(bbl, building)| {
                let counts = activity.get(bbl).unwrap_or(&empty);
                let ownership = book.portfolio_of(*bbl).map(OwnershipInput::from_portfolio);
                let units = building.scoring_units().map(u64::from);
                (
                    *bbl,
                    building.borough,
                    RawMetrics::compute(counts, units, ownership, self.config),
                )
            })
            .collect();

        let population: Vec<&RawMetrics> = building_metrics.iter().map(|(_, _, m)| m).collect();
        let references = References::from_population(&population, self.config);

        let mut buildings: Vec<Score> = building_metrics
            .into_par_iter()
            .map(|(bbl, borough, metrics)| {
                Score::build(
                    ScoreScope::Building(bbl),
                    Some(borough),
                    metrics,
                    &references,
                    self.config,
                )
            })
            .collect();
        buildings.sort_by_key(|score| score.scope);

        let mut portfolios: Vec<Score> = book
            .portfolios
            .par_iter()
            .map(|portfolio| {
                let units = Some(portfolio.total_units);
                let metrics = RawMetrics::compute(
                    &portfolio.activity,
                    units,
                    Some(OwnershipInput::from_portfolio(portfolio)),
                    self.config,
                );
                Score::build(
                    ScoreScope::Portfolio(portfolio.owner_id),
                    portfolio.primary_borough,
                    metrics,
                    &references,
                    self.config,
                )
            })
            .collect();
        portfolios.sort_by_key(|score| score.scope);

        assign_percentiles(&mut buildings);
        assign_percentiles(&mut portfolios);

        let graded = buildings.iter().filter(|s| s.grade.is_some()).count();
        info!(
            buildings = buildings.len(),
            graded_buildings = graded,
            portfolios = portfolios.len(),
            "Scored buildings and portfolios"
        );

        ScoreBook {
            references,
            buildings: buildings
                .into_iter()
                .filter_map(|score| match score.scope {
                    ScoreScope::Building(bbl) => Some((bbl, score)),
                    ScoreScope::Portfolio(_) => None,
                })
                .collect(),
            portfolios: portfolios
                .into_iter()
                .filter_map(|score| match score.scope {
                    ScoreScope::Portfolio(owner) => Some((owner, score)),
                    ScoreScope::Building(_) => None,
                })
                .collect(),
        }
    }
}

type Ranks = BTreeMap<ScoreScope, f64>;

/// City and borough ranks of whatever `value` selects; scores where it is
/// null are not part of the population.
fn rank_by(scores: &[Score], value: impl Fn(&Score) -> Option<f64>) -> (Ranks, Ranks) {
    let city: Vec<(ScoreScope, f64)> = scores
        .iter()
        .filter_map(|s| value(s).map(|v| (s.scope, v)))
        .collect();
    let by_borough: Vec<(ScoreScope, Borough, f64)> = scores
        .iter()
        .filter_map(|s| Some((s.scope, s.borough?, value(s)?)))
        .collect();
    (percentile_ranks(&city), grouped_percentile_ranks(&by_borough))
}

/// Citywide and per-borough percentiles of the overall score and of each
/// sub-score.
fn assign_percentiles(scores: &mut [Score]) {
    let population: &[Score] = scores;
    let (city_ranks, borough_ranks) = rank_by(population, |s| s.overall);
    let per_kind: Vec<(SubScoreKind, Ranks, Ranks)> = SubScoreKind::ALL
        .into_iter()
        .map(|kind| {
            let (city, borough) = rank_by(population, |s| s.sub_scores.get(kind));
            (kind, city, borough)
        })
        .collect();

    for score in scores.iter_mut() {
        score.percentile_city = city_ranks.get(&score.scope).copied();
        score.percentile_borough = borough_ranks.get(&score.scope).copied();
        for (kind, city, borough) in &per_kind {
            let percentiles = &mut score.sub_score_percentiles;
            percentiles.city.set(*kind, city.get(&score.scope).copied());
            percentiles.borough.set(*kind, borough.get(&score.scope).copied());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn references() -> References {
        References {
            violation_density: 0.5,
            complaint_rate: 0.1,
            eviction_rate: 0.01,
            ownership_pressure: 1.0,
            days_to_close: 30.0,
        }
    }

    fn activity(c: u32, b: u32, a: u32) -> BuildingActivity {
        BuildingActivity {
            violations: ViolationCounts { a, b, c },
            open_violations: a + b + c,
            ..BuildingActivity::default()
        }
    }

    #[test]
    fn test_severe_building_scores_below_mild_building() {
        let config = ScoringConfig::default();
        let severe = RawMetrics::compute(&activity(40, 10, 5), Some(50), None, &config);
        let mild = RawMetrics::compute(&activity(0, 0, 2), Some(50), None, &config);
        let severe_scores = SubScores::compute(&severe, &references(), &config);
        let mild_scores = SubScores::compute(&mild, &references(), &config);
        assert!(severe_scores.violation.unwrap() < mild_scores.violation.unwrap());
    }

    #[test]
    fn test_zero_units_yields_null_rates() {
        let config = ScoringConfig::default();
        let metrics = RawMetrics::compute(&activity(1, 0, 0), Some(0), None, &config);
        assert_eq!(metrics.violation_density, None);
        assert_eq!(metrics.complaint_rate, None);
        assert_eq!(metrics.eviction_rate, None);
        let scores = SubScores::compute(&metrics, &references(), &config);
        assert_eq!(scores.violation, None);
        assert_eq!(scores.ownership, None);
        // Resolution does not depend on units.
        assert!(scores.resolution.is_some());
    }

    #[test]
    fn test_overall_renormalizes_over_available() {
        let config = ScoringConfig::default();
        let scores = SubScores {
            violation: Some(80.0),
            complaints: None,
            eviction: Some(40.0),
            ownership: None,
            resolution: None,
        };
        // (0.30 * 80 + 0.25 * 40) / 0.55
        assert_eq!(scores.overall(&config), Some(61.82));
        assert_eq!(SubScores::default().overall(&config), None);
        assert_eq!(scores.missing().len(), 3);
    }

    #[test]
    fn test_resolution_score_components() {
        let config = ScoringConfig::default();
        let mut counts = activity(0, 0, 4);
        counts.open_violations = 2;
        counts.closed_violations = 2;
        counts.days_to_close = vec![30, 30];
        let metrics = RawMetrics::compute(&counts, Some(10), None, &config);
        let scores = SubScores::compute(&metrics, &references(), &config);
        // 0.6 * 100 * 0.5 + 0.4 * 50
        assert_eq!(scores.resolution, Some(50.0));

        let mut all_open = activity(0, 0, 3);
        all_open.open_violations = 3;
        let metrics = RawMetrics::compute(&all_open, Some(10), None, &config);
        let scores = SubScores::compute(&metrics, &references(), &config);
        assert_eq!(scores.resolution, Some(0.0));
    }

    #[test]
    fn test_ownership_pressure_grows_with_portfolio_and_opacity() {
        let config = ScoringConfig::default();
        let small = RawMetrics::compute(
            &BuildingActivity::default(),
            Some(10),
            Some(OwnershipInput {
                portfolio_buildings: 1,
                opacity: 0.0,
            }),
            &config,
        );
        assert!((small.ownership_pressure.unwrap() - 1.0).abs() < 1e-9);
        let large_opaque = RawMetrics::compute(
            &BuildingActivity::default(),
            Some(10),
            Some(OwnershipInput {
                portfolio_buildings: 31,
                opacity: 1.0,
            }),
            &config,
        );
        assert!((large_opaque.ownership_pressure.unwrap() - 10.0).abs() < 1e-9);
        let scores = SubScores::compute(&large_opaque, &references(), &config);
        assert!(scores.ownership.unwrap() < 10.0);
    }

    fn scored(bbl: u64, borough: Borough, violation: f64, eviction: Option<f64>) -> Score {
        let config = ScoringConfig::default();
        Score {
            scope: ScoreScope::Building(Bbl(bbl)),
            borough: Some(borough),
            sub_scores: SubScores {
                violation: Some(violation),
                eviction,
                ..SubScores::default()
            },
            overall: Some(violation),
            grade: None,
            percentile_city: None,
            percentile_borough: None,
            sub_score_percentiles: SubScorePercentiles::default(),
            metrics: RawMetrics::compute(&BuildingActivity::default(), None, None, &config),
            insufficient_data: Vec::new(),
        }
    }

    #[test]
    fn test_null_sub_score_left_out_of_its_percentile_population() {
        let mut scores = vec![
            scored(1000010001, Borough::Manhattan, 10.0, Some(50.0)),
            scored(1000010002, Borough::Manhattan, 20.0, None),
            scored(1000010003, Borough::Manhattan, 30.0, Some(90.0)),
            scored(2000010001, Borough::Bronx, 40.0, None),
        ];
        assign_percentiles(&mut scores);

        let city = |idx: usize| scores[idx].sub_score_percentiles.city;
        let borough = |idx: usize| scores[idx].sub_score_percentiles.borough;
        assert_eq!(city(0).violation, Some(0.0));
        assert_eq!(city(1).violation, Some(33.33));
        assert_eq!(city(3).violation, Some(100.0));
        assert_eq!(borough(1).violation, Some(50.0));
        assert_eq!(borough(3).violation, Some(100.0));

        // Two members with an eviction score; the nulls rank nowhere.
        assert_eq!(city(0).eviction, Some(0.0));
        assert_eq!(city(2).eviction, Some(100.0));
        assert_eq!(city(1).eviction, None);
        assert_eq!(borough(3).eviction, None);
        assert_eq!(city(0).complaints, None);

        assert_eq!(scores[1].percentile_city, Some(33.33));
    }

    #[test]
    fn test_references_use_population_median_with_floor() {
        let config = ScoringConfig::default();
        let metrics: Vec<RawMetrics> = [(0, 0, 0), (2, 0, 0), (4, 0, 0)]
            .into_iter()
            .map(|(c, b, a)| RawMetrics::compute(&activity(c, b, a), Some(10), None, &config))
            .collect();
        let population: Vec<&RawMetrics> = metrics.iter().collect();
        let refs = References::from_population(&population, &config);
        // densities 0, 2, 4 -> median 2
        assert_eq!(refs.violation_density, 2.0);
        // complaint rates all zero -> floor
        assert_eq!(refs.complaint_rate, 0.1);
        // no closed violations anywhere -> floor
        assert_eq!(refs.days_to_close, 30.0);
    }
}
