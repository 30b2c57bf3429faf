//! # Publisher
//!
//! Assembles a complete [`Generation`] of building and owner reports and
//! swaps it into a [`ServingStore`] in one step. Readers see either the old
//! generation or the new one, never a mix.

use crate::linker::{Resolution, ResolutionStats};
use crate::model::{Bbl, Borough, ClusterKind, EventKind, Grade, OwnerId};
use crate::normalize::{NormalizedSnapshot, RejectionStats};
use crate::portfolio::{BuildingActivity, PortfolioBook};
use crate::scoring::{References, Score, ScoreBook};
use anyhow::Result;
use chrono::NaiveDate;
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// One dated event shown on a building report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub kind: EventKind,
    pub id: String,
    pub date: NaiveDate,
    pub detail: Option<String>,
}

/// Owner block of a building report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerSummary {
    pub owner_id: OwnerId,
    pub display_name: String,
    pub mailing_address: String,
    pub is_llc: bool,
    pub portfolio_size: usize,
    pub overall: Option<f64>,
    pub grade: Option<Grade>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationSummary {
    pub total: u32,
    pub open: u32,
    pub class_a: u32,
    pub class_b: u32,
    pub class_c: u32,
    pub average_days_to_close: Option<f64>,
    pub median_days_to_close: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub violations: ViolationSummary,
    pub complaints_total: u32,
    pub complaints_last_12_months: u32,
    /// Complaint counts per type, busiest first (ties by type name).
    pub complaints_by_type: Vec<ComplaintTypeCount>,
    pub evictions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintTypeCount {
    pub complaint_type: String,
    pub count: u32,
}

impl ActivitySummary {
    pub fn from_activity(activity: &BuildingActivity) -> Self {
        Self {
            violations: ViolationSummary {
                total: activity.violations.total(),
                open: activity.open_violations,
                class_a: activity.violations.a,
                class_b: activity.violations.b,
                class_c: activity.violations.c,
                average_days_to_close: activity.average_days_to_close(),
                median_days_to_close: activity.median_days_to_close(),
            },
            complaints_total: activity.complaints_total(),
            complaints_last_12_months: activity.complaints_recent,
            complaints_by_type: complaint_type_counts(activity),
            evictions: activity.evictions,
        }
    }
}

fn complaint_type_counts(activity: &BuildingActivity) -> Vec<ComplaintTypeCount> {
    let mut counts: Vec<ComplaintTypeCount> = activity
        .complaints_by_type
        .iter()
        .map(|(kind, count)| ComplaintTypeCount {
            complaint_type: kind.clone(),
            count: *count,
        })
        .collect();
    // BTreeMap order already breaks ties by name; the sort is stable.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

/// Published per-building record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingReport {
    pub bbl: Bbl,
    pub address: Option<String>,
    pub borough: Borough,
    pub zip: Option<String>,
    pub total_units: Option<u32>,
    pub residential_units: Option<u32>,
    pub year_built: Option<u16>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub score: Score,
    pub owner: Option<OwnerSummary>,
    pub activity: ActivitySummary,
    /// Most recent events, newest first.
    pub recent_events: Vec<EventRecord>,
}

/// One row of an owner's building list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioBuilding {
    pub bbl: Bbl,
    pub address: Option<String>,
    pub borough: Borough,
    pub overall: Option<f64>,
    pub grade: Option<Grade>,
}

/// Published per-owner record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerReport {
    pub owner_id: OwnerId,
    pub display_name: String,
    pub mailing_address: String,
    pub is_llc: bool,
    pub cluster_kind: ClusterKind,
    pub mention_count: usize,
    pub total_buildings: usize,
    pub total_units: u64,
    pub llc_buildings: usize,
    pub opacity: f64,
    pub primary_borough: Option<Borough>,
    pub activity: ActivitySummary,
    pub score: Score,
    pub buildings: Vec<PortfolioBuilding>,
}

/// Keys of the worst-scored entries, worst first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboards {
    pub worst_buildings: Vec<Bbl>,
    pub worst_owners: Vec<OwnerId>,
}

/// Run counters published alongside the reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub rejections: RejectionStats,
    pub resolution: ResolutionStats,
}

/// One complete published output of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    /// Assigned by the serving store on publish; 0 before that.
    pub number: u64,
    pub as_of: NaiveDate,
    pub references: References,
    /// Sorted by BBL.
    pub buildings: Vec<BuildingReport>,
    /// Sorted by owner id.
    pub owners: Vec<OwnerReport>,
    pub leaderboards: Leaderboards,
    pub summary: RunSummary,
}

impl Generation {
    pub fn building(&self, bbl: Bbl) -> Option<&BuildingReport> {
        self.buildings
            .binary_search_by_key(&bbl, |report| report.bbl)
            .ok()
            .map(|idx| &self.buildings[idx])
    }

    pub fn owner(&self, owner: OwnerId) -> Option<&OwnerReport> {
        self.owners
            .binary_search_by_key(&owner, |report| report.owner_id)
            .ok()
            .map(|idx| &self.owners[idx])
    }

    /// Lowest overall scores first; ties by BBL. Unscored buildings are skipped.
    pub fn worst_buildings(&self, limit: usize) -> Vec<&BuildingReport> {
        worst_first(&self.buildings, limit, |r| (r.score.overall, r.bbl))
    }

    /// Lowest portfolio scores first; ties by owner id.
    pub fn worst_owners(&self, limit: usize) -> Vec<&OwnerReport> {
        worst_first(&self.owners, limit, |r| (r.score.overall, r.owner_id))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn worst_first<T, K, F>(items: &[T], limit: usize, key: F) -> Vec<&T>
where
    K: Ord,
    F: Fn(&T) -> (Option<f64>, K),
{
    let mut scored: Vec<(f64, K, &T)> = items
        .iter()
        .filter_map(|item| {
            let (overall, tie) = key(item);
            overall.map(|value| (value, tie, item))
        })
        .collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(limit).map(|(_, _, item)| item).collect()
}

/// Report shape settings.
#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    pub recent_event_limit: usize,
    pub leaderboard_size: usize,
}

/// Everything the publisher reads from earlier stages.
pub struct PublishInputs<'a> {
    pub snapshot: &'a NormalizedSnapshot,
    pub resolution: &'a Resolution,
    pub book: &'a PortfolioBook,
    pub activity: &'a BTreeMap<Bbl, BuildingActivity>,
    pub scores: &'a ScoreBook,
    pub as_of: NaiveDate,
}

/// Numeric ids compare as numbers ("9" before "10") and ahead of other ids.
fn event_id_key(id: &str) -> (bool, u64, &str) {
    match id.parse::<u64>() {
        Ok(number) => (false, number, id),
        Err(_) => (true, 0, id),
    }
}

/// Dated events per building, newest first, then kind, then id.
fn events_by_building(snapshot: &NormalizedSnapshot, limit: usize) -> BTreeMap<Bbl, Vec<EventRecord>> {
    let mut events: BTreeMap<Bbl, Vec<EventRecord>> = BTreeMap::new();
    for violation in &snapshot.violations {
        if let Some(date) = violation.inspection_date {
            events.entry(violation.bbl).or_default().push(EventRecord {
                kind: EventKind::Violation,
                id: violation.id.to_string(),
                date,
                detail: Some(format!("Class {}", violation.class.as_str())),
            });
        }
    }
    for complaint in &snapshot.complaints {
        events.entry(complaint.bbl).or_default().push(EventRecord {
            kind: EventKind::Complaint,
            id: complaint.id.to_string(),
            date: complaint.created_date,
            detail: complaint.complaint_type.clone(),
        });
    }
    for eviction in &snapshot.evictions {
        if let Some(date) = eviction.executed_date {
            events.entry(eviction.bbl).or_default().push(EventRecord {
                kind: EventKind::Eviction,
                id: eviction.court_index.clone(),
                date,
                detail: None,
            });
        }
    }
    events.par_iter_mut().for_each(|(_, list)| {
        list.sort_by(|a, b| {
            (Reverse(a.date), a.kind, event_id_key(&a.id))
                .cmp(&(Reverse(b.date), b.kind, event_id_key(&b.id)))
        });
        list.truncate(limit);
    });
    events
}

/// Assemble the generation for one run.
pub fn build_generation(inputs: &PublishInputs<'_>, options: ReportOptions) -> Generation {
    let PublishInputs {
        snapshot,
        resolution,
        book,
        activity,
        scores,
        as_of,
    } = *inputs;

    let mut events = events_by_building(snapshot, options.recent_event_limit);
    let empty = BuildingActivity::default();

    let owner_summary = |owner_id: OwnerId| -> Option<OwnerSummary> {
        let owner = resolution.owner(owner_id)?;
        let portfolio = book.portfolio(owner_id)?;
        let score = scores.portfolios.get(&owner_id);
        Some(OwnerSummary {
            owner_id,
            display_name: owner.display_name.clone(),
            mailing_address: owner.mailing_address.clone(),
            is_llc: owner.is_llc,
            portfolio_size: portfolio.total_buildings,
            overall: score.and_then(|s| s.overall),
            grade: score.and_then(|s| s.grade),
        })
    };

    let buildings: Vec<BuildingReport> = snapshot
        .buildings
        .values()
        .filter_map(|building| {
            let score = scores.buildings.get(&building.bbl)?.clone();
            Some(BuildingReport {
                bbl: building.bbl,
                address: building.address.clone(),
                borough: building.borough,
                zip: building.zip.clone(),
                total_units: building.total_units,
                residential_units: building.residential_units,
                year_built: building.year_built,
                latitude: building.latitude,
                longitude: building.longitude,
                score,
                owner: book
                    .owner_of(building.bbl)
                    .and_then(|owner_id| owner_summary(owner_id)),
                activity: ActivitySummary::from_activity(
                    activity.get(&building.bbl).unwrap_or(&empty),
                ),
                recent_events: events.remove(&building.bbl).unwrap_or_default(),
            })
        })
        .collect();

    let owners: Vec<OwnerReport> = book
        .portfolios
        .iter()
        .filter_map(|portfolio| {
            let owner = resolution.owner(portfolio.owner_id)?;
            let score = scores.portfolios.get(&portfolio.owner_id)?.clone();
            let member_buildings = portfolio
                .buildings
                .iter()
                .filter_map(|bbl| {
                    let building = snapshot.buildings.get(bbl)?;
                    let building_score = scores.buildings.get(bbl);
                    Some(PortfolioBuilding {
                        bbl: *bbl,
                        address: building.address.clone(),
                        borough: building.borough,
                        overall: building_score.and_then(|s| s.overall),
                        grade: building_score.and_then(|s| s.grade),
                    })
                })
                .collect();
            Some(OwnerReport {
                owner_id: owner.id,
                display_name: owner.display_name.clone(),
                mailing_address: owner.mailing_address.clone(),
                is_llc: owner.is_llc,
                cluster_kind: owner.kind,
                mention_count: owner.members.len(),
                total_buildings: portfolio.total_buildings,
                total_units: portfolio.total_units,
                llc_buildings: portfolio.llc_buildings,
                opacity: portfolio.opacity,
                primary_borough: portfolio.primary_borough,
                activity: ActivitySummary::from_activity(&portfolio.activity),
                score,
                buildings: member_buildings,
            })
        })
        .collect();

    let mut generation = Generation {
        number: 0,
        as_of,
        references: scores.references,
        buildings,
        owners,
        leaderboards: Leaderboards::default(),
        summary: RunSummary {
            rejections: snapshot.stats.clone(),
            resolution: resolution.stats.clone(),
        },
    };
    generation.leaderboards = Leaderboards {
        worst_buildings: generation
            .worst_buildings(options.leaderboard_size)
            .iter()
            .map(|r| r.bbl)
            .collect(),
        worst_owners: generation
            .worst_owners(options.leaderboard_size)
            .iter()
            .map(|r| r.owner_id)
            .collect(),
    };
    generation
}

/// Storage that serves the current generation to readers.
pub trait ServingStore: Send + Sync {
    /// Atomically replace the current generation; returns its assigned number.
    fn publish(&self, generation: Generation) -> Result<u64>;

    /// The generation readers currently see.
    fn current(&self) -> Result<Option<Arc<Generation>>>;
}

/// In-memory serving store; publish is a pointer swap under a write lock.
#[derive(Debug, Default)]
pub struct MemoryServingStore {
    current: RwLock<Option<Arc<Generation>>>,
}

impl MemoryServingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ServingStore for MemoryServingStore {
    fn publish(&self, mut generation: Generation) -> Result<u64> {
        let mut guard = self.current.write();
        let number = guard.as_ref().map(|g| g.number).unwrap_or(0) + 1;
        generation.number = number;
        *guard = Some(Arc::new(generation));
        info!(generation = number, "Published generation to memory store");
        Ok(number)
    }

    fn current(&self) -> Result<Option<Arc<Generation>>> {
        Ok(self.current.read().clone())
    }
}
