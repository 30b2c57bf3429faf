//! # Portfolio Builder
//!
//! Per-building activity aggregation and per-owner portfolios.

use crate::config::{OwnershipPolicy, SingletonLlcPolicy};
use crate::linker::Resolution;
use crate::model::{Bbl, Borough, OwnerId, ViolationCounts, ViolationStatus};
use crate::normalize::NormalizedSnapshot;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Event counts for one building, or summed over a portfolio.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildingActivity {
    pub violations: ViolationCounts,
    pub open_violations: u32,
    pub closed_violations: u32,
    /// Days from inspection to close for closed violations with both dates, ascending.
    pub days_to_close: Vec<i64>,
    pub complaints_recent: u32,
    pub complaints_older: u32,
    /// Complaint counts per complaint type; untyped complaints count under
    /// [`UNSPECIFIED_COMPLAINT_TYPE`].
    pub complaints_by_type: BTreeMap<String, u32>,
    pub evictions: u32,
}

pub const UNSPECIFIED_COMPLAINT_TYPE: &str = "UNSPECIFIED";

impl BuildingActivity {
    pub fn complaints_total(&self) -> u32 {
        self.complaints_recent + self.complaints_older
    }

    /// Closed share of all violations; `None` without violations.
    pub fn closed_fraction(&self) -> Option<f64> {
        let total = self.violations.total();
        (total > 0).then(|| self.closed_violations as f64 / total as f64)
    }

    pub fn median_days_to_close(&self) -> Option<f64> {
        median_sorted_i64(&self.days_to_close)
    }

    pub fn average_days_to_close(&self) -> Option<f64> {
        if self.days_to_close.is_empty() {
            return None;
        }
        let sum: i64 = self.days_to_close.iter().sum();
        Some(sum as f64 / self.days_to_close.len() as f64)
    }

    /// Add another building's counts.
    pub fn absorb(&mut self, other: &BuildingActivity) {
        self.violations.absorb(&other.violations);
        self.open_violations += other.open_violations;
        self.closed_violations += other.closed_violations;
        self.days_to_close.extend_from_slice(&other.days_to_close);
        self.days_to_close.sort_unstable();
        self.complaints_recent += other.complaints_recent;
        self.complaints_older += other.complaints_older;
        for (kind, count) in &other.complaints_by_type {
            *self.complaints_by_type.entry(kind.clone()).or_insert(0) += count;
        }
        self.evictions += other.evictions;
    }
}

fn median_sorted_i64(values: &[i64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    Some(if n % 2 == 1 {
        values[n / 2] as f64
    } else {
        (values[n / 2 - 1] + values[n / 2]) as f64 / 2.0
    })
}

/// True when a complaint created on `created` falls inside the recent window
/// ending at `as_of`. Complaints dated after `as_of` count as recent.
pub fn is_recent(created: NaiveDate, as_of: NaiveDate, window_days: i64) -> bool {
    (as_of - created).num_days() < window_days
}

/// Count events per known building.
///
/// Events for BBLs without a building record are ignored.
#[instrument(skip(snapshot), level = "debug")]
pub fn collect_activity(
    snapshot: &NormalizedSnapshot,
    as_of: NaiveDate,
    recent_window_days: i64,
) -> BTreeMap<Bbl, BuildingActivity> {
    let mut activity: BTreeMap<Bbl, BuildingActivity> = snapshot
        .buildings
        .keys()
        .map(|bbl| (*bbl, BuildingActivity::default()))
        .collect();
    let mut orphaned = 0usize;

    for violation in &snapshot.violations {
        let Some(entry) = activity.get_mut(&violation.bbl) else {
            orphaned += 1;
            continue;
        };
        entry.violations.record(violation.class);
        match violation.status {
            ViolationStatus::Open => entry.open_violations += 1,
            ViolationStatus::Closed => entry.closed_violations += 1,
        }
        if let Some(days) = violation.days_to_close() {
            entry.days_to_close.push(days);
        }
    }

    for complaint in &snapshot.complaints {
        let Some(entry) = activity.get_mut(&complaint.bbl) else {
            orphaned += 1;
            continue;
        };
        if is_recent(complaint.created_date, as_of, recent_window_days) {
            entry.complaints_recent += 1;
        } else {
            entry.complaints_older += 1;
        }
        let kind = complaint
            .complaint_type
            .as_deref()
            .unwrap_or(UNSPECIFIED_COMPLAINT_TYPE);
        *entry.complaints_by_type.entry(kind.to_string()).or_insert(0) += 1;
    }

    for eviction in &snapshot.evictions {
        match activity.get_mut(&eviction.bbl) {
            Some(entry) => entry.evictions += 1,
            None => orphaned += 1,
        }
    }

    activity
        .par_iter_mut()
        .for_each(|(_, entry)| entry.days_to_close.sort_unstable());

    if orphaned > 0 {
        debug!(orphaned, "Ignored events without a building record");
    }
    activity
}

/// All buildings attributed to one canonical owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub owner_id: OwnerId,
    /// Member buildings, ascending.
    pub buildings: Vec<Bbl>,
    pub total_buildings: usize,
    pub total_units: u64,
    pub activity: BuildingActivity,
    /// Buildings registered under an LLC mention.
    pub llc_buildings: usize,
    /// Weighted share of buildings held under LLC mentions, in `[0, 1]`.
    pub opacity: f64,
    /// Borough holding most of the buildings (ties go to the lowest code).
    pub primary_borough: Option<Borough>,
}

/// Portfolios indexed by owner, plus the building → owner map.
#[derive(Debug, Clone, Default)]
pub struct PortfolioBook {
    /// `portfolios[i].owner_id == OwnerId(i)`.
    pub portfolios: Vec<Portfolio>,
    pub building_owner: BTreeMap<Bbl, OwnerId>,
}

impl PortfolioBook {
    pub fn portfolio(&self, owner: OwnerId) -> Option<&Portfolio> {
        self.portfolios.get(owner.0 as usize)
    }

    pub fn owner_of(&self, bbl: Bbl) -> Option<OwnerId> {
        self.building_owner.get(&bbl).copied()
    }

    pub fn portfolio_of(&self, bbl: Bbl) -> Option<&Portfolio> {
        self.owner_of(bbl).and_then(|owner| self.portfolio(owner))
    }
}

/// Build one portfolio per canonical owner.
#[instrument(skip_all, level = "debug")]
pub fn build_portfolios(
    snapshot: &NormalizedSnapshot,
    resolution: &Resolution,
    activity: &BTreeMap<Bbl, BuildingActivity>,
    policy: &OwnershipPolicy,
) -> PortfolioBook {
    let portfolios: Vec<Portfolio> = resolution
        .owners
        .par_iter()
        .map(|owner| {
            // bbl -> mention is LLC
            let mut members: BTreeMap<Bbl, bool> = BTreeMap::new();
            for mention_id in &owner.members {
                if let Some(mention) = snapshot.mentions.get(mention_id.0 as usize) {
                    let llc = members.entry(mention.bbl).or_insert(false);
                    *llc |= mention.is_llc;
                }
            }

            let buildings: Vec<Bbl> = members.keys().copied().collect();
            let total_buildings = buildings.len();
            let llc_buildings = members.values().filter(|llc| **llc).count();

            let mut total_units = 0u64;
            let mut portfolio_activity = BuildingActivity::default();
            let mut boroughs: BTreeMap<Borough, usize> = BTreeMap::new();
            for bbl in &buildings {
                if let Some(building) = snapshot.buildings.get(bbl) {
                    total_units += building.scoring_units().unwrap_or(0) as u64;
                    *boroughs.entry(building.borough).or_insert(0) += 1;
                }
                if let Some(counts) = activity.get(bbl) {
                    portfolio_activity.absorb(counts);
                }
            }

            let llc_weight = if owner.has_controller() {
                policy.resolved_llc_weight
            } else {
                1.0
            };
            let opacity = if total_buildings == 0
                || (total_buildings == 1 && policy.singleton_llc == SingletonLlcPolicy::Exclude)
            {
                0.0
            } else {
                llc_buildings as f64 * llc_weight / total_buildings as f64
            };

            let primary_borough = boroughs
                .iter()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
                .map(|(borough, _)| *borough);

            Portfolio {
                owner_id: owner.id,
                buildings,
                total_buildings,
                total_units,
                activity: portfolio_activity,
                llc_buildings,
                opacity,
                primary_borough,
            }
        })
        .collect();

    let mut building_owner = BTreeMap::new();
    for portfolio in &portfolios {
        for bbl in &portfolio.buildings {
            building_owner.insert(*bbl, portfolio.owner_id);
        }
    }

    info!(
        portfolios = portfolios.len(),
        owned_buildings = building_owner.len(),
        "Built portfolios"
    );
    PortfolioBook {
        portfolios,
        building_owner,
    }
}
