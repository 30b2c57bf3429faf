//! # Record Normalizer
//!
//! Canonicalizes loosely typed source rows (buildings, violations, complaints,
//! evictions, registrations) into typed records keyed by BBL. Malformed rows
//! are dropped and counted per source; a bad row never fails the run.

use crate::model::{
    Bbl, Borough, Building, Complaint, Eviction, MentionId, RawOwnerMention, Violation,
    ViolationClass, ViolationStatus,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};

/// One loosely typed input row, as produced by the open-data extractors.
pub type RawRow = serde_json::Map<String, Value>;

/// Per-source extracts for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSnapshot {
    pub buildings: Vec<RawRow>,
    pub violations: Vec<RawRow>,
    pub complaints: Vec<RawRow>,
    pub evictions: Vec<RawRow>,
    pub registrations: Vec<RawRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Buildings,
    Violations,
    Complaints,
    Evictions,
    Registrations,
}

/// Why a row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingBbl,
    MissingId,
    MissingName,
    BadDate,
    BadClass,
    NotHousing,
    NonResidential,
    /// A numeric field too large for its column (unit counts, year built).
    OutOfRange,
}

/// Accepted / rejected / superseded counts for one source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub accepted: usize,
    pub superseded: usize,
    pub rejected: BTreeMap<RejectReason, usize>,
    /// Accepted rows whose status value was not recognized and defaulted to open.
    pub unknown_status: usize,
}

impl SourceStats {
    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }

    fn reject(&mut self, reason: RejectReason) {
        *self.rejected.entry(reason).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionStats {
    pub sources: BTreeMap<Source, SourceStats>,
}

impl RejectionStats {
    pub fn source(&self, source: Source) -> SourceStats {
        self.sources.get(&source).cloned().unwrap_or_default()
    }

    pub fn total_rejected(&self) -> usize {
        self.sources.values().map(SourceStats::rejected_total).sum()
    }
}

/// Typed output of the normalizer.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSnapshot {
    pub buildings: BTreeMap<Bbl, Building>,
    pub violations: Vec<Violation>,
    pub complaints: Vec<Complaint>,
    pub evictions: Vec<Eviction>,
    /// Owner mentions, one per building, indexed by `MentionId`.
    pub mentions: Vec<RawOwnerMention>,
    pub stats: RejectionStats,
    /// Latest date observed anywhere in the snapshot.
    pub latest_date: Option<NaiveDate>,
}

/// A registration row after typing, before deduplication.
#[derive(Debug, Clone)]
struct Registration {
    registration_id: u64,
    bbl: Bbl,
    owner_name: String,
    mailing_address: String,
    mailing_zip: Option<String>,
    last_registration_date: Option<NaiveDate>,
    building_address: Option<String>,
    building_zip: Option<String>,
    total_units: Option<u32>,
}

/// Normalize every source of a snapshot.
#[instrument(skip(raw), level = "debug")]
pub fn normalize_snapshot(raw: &RawSnapshot) -> NormalizedSnapshot {
    let mut stats = RejectionStats::default();

    let buildings = collect_rows(&raw.buildings, Source::Buildings, &mut stats, parse_building);
    let (violations, status_recognized): (Vec<Violation>, Vec<bool>) =
        collect_rows(&raw.violations, Source::Violations, &mut stats, parse_violation)
            .into_iter()
            .unzip();
    let unknown_status = status_recognized.iter().filter(|known| !**known).count();
    if unknown_status > 0 {
        if let Some(source) = stats.sources.get_mut(&Source::Violations) {
            source.unknown_status = unknown_status;
        }
        warn!(
            rows = unknown_status,
            "Violations with an unrecognized status were treated as open"
        );
    }
    let complaints = collect_rows(&raw.complaints, Source::Complaints, &mut stats, parse_complaint);
    let evictions = collect_rows(&raw.evictions, Source::Evictions, &mut stats, parse_eviction);
    let registrations = collect_rows(
        &raw.registrations,
        Source::Registrations,
        &mut stats,
        parse_registration,
    );

    let mut building_map: BTreeMap<Bbl, Building> = BTreeMap::new();
    for building in buildings {
        // Re-ingestion of the same key replaces attributes.
        building_map.insert(building.bbl, building);
    }

    let (kept, superseded) = latest_registration_per_building(registrations);
    if let Some(source) = stats.sources.get_mut(&Source::Registrations) {
        source.accepted -= superseded;
        source.superseded = superseded;
    }

    for registration in &kept {
        building_map
            .entry(registration.bbl)
            .or_insert_with(|| building_from_registration(registration));
    }

    let mentions = kept
        .iter()
        .enumerate()
        .map(|(idx, registration)| mention_from_registration(MentionId(idx as u32), registration))
        .collect();

    let latest_date = violations
        .iter()
        .flat_map(|v| [v.inspection_date, v.closed_date])
        .chain(complaints.iter().flat_map(|c| [Some(c.created_date), c.closed_date]))
        .chain(evictions.iter().map(|e| e.executed_date))
        .chain(kept.iter().map(|r| r.last_registration_date))
        .flatten()
        .max();

    for (source, source_stats) in &stats.sources {
        if source_stats.rejected_total() > 0 {
            warn!(
                source = ?source,
                rejected = source_stats.rejected_total(),
                reasons = ?source_stats.rejected,
                "Dropped malformed rows"
            );
        }
    }
    info!(
        buildings = building_map.len(),
        violations = violations.len(),
        complaints = complaints.len(),
        evictions = evictions.len(),
        mentions = kept.len(),
        "Normalized snapshot"
    );

    NormalizedSnapshot {
        buildings: building_map,
        violations,
        complaints,
        evictions,
        mentions,
        stats,
        latest_date,
    }
}

/// Parse rows in parallel, keep input order, and count outcomes.
fn collect_rows<T, F>(rows: &[RawRow], source: Source, stats: &mut RejectionStats, parse: F) -> Vec<T>
where
    T: Send,
    F: Fn(&RawRow) -> Result<T, RejectReason> + Sync,
{
    let parsed: Vec<Result<T, RejectReason>> = rows.par_iter().map(|row| parse(row)).collect();
    let source_stats = stats.sources.entry(source).or_default();
    let mut accepted = Vec::with_capacity(parsed.len());
    for outcome in parsed {
        match outcome {
            Ok(record) => accepted.push(record),
            Err(reason) => source_stats.reject(reason),
        }
    }
    source_stats.accepted = accepted.len();
    accepted
}

/// Keep the most recent registration per BBL (by registration date, then id).
fn latest_registration_per_building(
    registrations: Vec<Registration>,
) -> (Vec<Registration>, usize) {
    let total = registrations.len();
    let mut latest: BTreeMap<Bbl, Registration> = BTreeMap::new();
    for registration in registrations {
        match latest.get(&registration.bbl) {
            Some(current)
                if (current.last_registration_date, current.registration_id)
                    >= (
                        registration.last_registration_date,
                        registration.registration_id,
                    ) => {}
            _ => {
                latest.insert(registration.bbl, registration);
            }
        }
    }
    let mut kept: Vec<Registration> = latest.into_values().collect();
    kept.sort_by_key(|r| (r.registration_id, r.bbl));
    let superseded = total - kept.len();
    (kept, superseded)
}

fn building_from_registration(registration: &Registration) -> Building {
    Building {
        bbl: registration.bbl,
        address: registration.building_address.clone(),
        borough: registration.bbl.borough().unwrap_or(Borough::Manhattan),
        zip: registration.building_zip.clone(),
        total_units: registration.total_units,
        residential_units: None,
        year_built: None,
        latitude: None,
        longitude: None,
    }
}

fn mention_from_registration(id: MentionId, registration: &Registration) -> RawOwnerMention {
    let display_address = collapse_whitespace(&registration.mailing_address);
    let (street, embedded_zip) = split_mailing_address(&display_address);
    let zip = registration.mailing_zip.clone().or(embedded_zip);
    RawOwnerMention {
        id,
        source_record_id: registration.registration_id,
        bbl: registration.bbl,
        display_name: collapse_whitespace(&registration.owner_name),
        comparison_name: comparison_name(&registration.owner_name),
        display_address,
        street,
        zip,
        is_llc: is_llc_name(&registration.owner_name),
    }
}

// =============================================================================
// Row parsers
// =============================================================================

fn parse_building(row: &RawRow) -> Result<Building, RejectReason> {
    let bbl = parse_bbl(row).ok_or(RejectReason::MissingBbl)?;
    let address = field_str(row, &["address", "full_address"]).or_else(|| {
        join_present(&[
            field_str(row, &["housenumber", "house_number"]),
            field_str(row, &["streetname", "street_name"]),
        ])
    });
    Ok(Building {
        bbl,
        address: address.map(|a| collapse_whitespace(&a)),
        borough: bbl.borough().ok_or(RejectReason::MissingBbl)?,
        zip: field_str(row, &["zipcode", "zip", "zip_code"]).and_then(|z| normalize_zip(&z)),
        total_units: field_u32(row, &["unitstotal", "totalunits", "total_units"])?,
        residential_units: field_u32(row, &["unitsres", "residential_units"])?,
        year_built: field_u64(row, &["yearbuilt", "year_built"])
            .filter(|year| *year > 0)
            .map(u16::try_from)
            .transpose()
            .map_err(|_| RejectReason::OutOfRange)?,
        latitude: field_f64(row, &["latitude"]),
        longitude: field_f64(row, &["longitude"]),
    })
}

/// A typed violation and whether its status value was recognized.
fn parse_violation(row: &RawRow) -> Result<(Violation, bool), RejectReason> {
    let id = field_u64(row, &["violationid", "violation_id"]).ok_or(RejectReason::MissingId)?;
    let bbl = parse_bbl(row).ok_or(RejectReason::MissingBbl)?;
    let class = field_str(row, &["class", "violation_class"])
        .and_then(|raw| ViolationClass::parse(&raw))
        .ok_or(RejectReason::BadClass)?;
    let inspection_date = optional_date(row, &["inspectiondate", "inspection_date"])?;
    let status_date = optional_date(row, &["currentstatusdate", "current_status_date"])?;

    let current = field_str(row, &["currentstatus", "current_status"])
        .map(|s| s.to_ascii_uppercase());
    let violation_status = field_str(row, &["violationstatus", "violation_status"])
        .map(|s| s.to_ascii_uppercase());
    let open = match (&current, &violation_status) {
        (_, Some(status)) if status == "OPEN" => Some(true),
        (_, Some(status)) if status == "CLOSE" || status == "CLOSED" => Some(false),
        (Some(current), _) => Some(current == "OPEN" || current == "NOV SENT"),
        (None, None) => Some(true),
        (None, Some(status)) => {
            debug!(violation = id, status = %status, "Unrecognized violation status");
            None
        }
    };
    let status_recognized = open.is_some();
    let open = open.unwrap_or(true);
    let status = if open {
        ViolationStatus::Open
    } else {
        ViolationStatus::Closed
    };

    let violation = Violation {
        id,
        bbl,
        class,
        status,
        inspection_date,
        closed_date: if open { None } else { status_date },
        description: field_str(row, &["novdescription", "description"]),
    };
    Ok((violation, status_recognized))
}

/// Complaint types counted as housing related.
const HOUSING_COMPLAINT_TYPES: &[&str] = &[
    "HEAT/HOT WATER",
    "HEATING",
    "PLUMBING",
    "WATER SYSTEM",
    "ELECTRIC",
    "ELEVATOR",
    "APPLIANCE",
    "PAINT/PLASTER",
    "FLOORING/STAIRS",
    "DOOR/WINDOW",
    "SAFETY",
    "GENERAL CONSTRUCTION/PLUMBING",
    "UNSANITARY CONDITION",
    "PAINT - LOSS OF COVERAGE OR PEELING",
    "WATER LEAK",
    "MOLD",
    "RODENT",
    "PEST",
    "ROACH",
    "VERMIN",
];

fn parse_complaint(row: &RawRow) -> Result<Complaint, RejectReason> {
    let id = field_u64(row, &["unique_key", "uniquekey"]).ok_or(RejectReason::MissingId)?;
    let bbl = parse_bbl(row).ok_or(RejectReason::MissingBbl)?;
    let created_date = optional_date(row, &["created_date", "createddate"])?
        .ok_or(RejectReason::BadDate)?;
    let closed_date = optional_date(row, &["closed_date", "closeddate"])?;
    let complaint_type = field_str(row, &["complaint_type", "complainttype"]);
    let agency = field_str(row, &["agency"]).map(|a| a.to_ascii_uppercase());

    if let Some(kind) = &complaint_type {
        let upper = kind.to_ascii_uppercase();
        let housing = HOUSING_COMPLAINT_TYPES.contains(&upper.as_str());
        if !housing && agency.as_deref() != Some("HPD") {
            return Err(RejectReason::NotHousing);
        }
    }

    Ok(Complaint {
        id,
        bbl,
        created_date,
        closed_date,
        complaint_type,
        status: field_str(row, &["status"]),
    })
}

fn parse_eviction(row: &RawRow) -> Result<Eviction, RejectReason> {
    let court_index = field_str(row, &["court_index_number", "courtindexnumber"])
        .ok_or(RejectReason::MissingId)?;
    let bbl = parse_bbl(row).ok_or(RejectReason::MissingBbl)?;
    let indicator = field_str(
        row,
        &["residential_commercial_ind", "residentialcommercialind"],
    );
    if indicator
        .as_deref()
        .is_some_and(|ind| ind.eq_ignore_ascii_case("commercial"))
    {
        return Err(RejectReason::NonResidential);
    }
    Ok(Eviction {
        court_index,
        bbl,
        executed_date: optional_date(row, &["executed_date", "executeddate"])?,
        address: field_str(row, &["eviction_address", "evictionaddress"])
            .map(|a| collapse_whitespace(&a)),
    })
}

fn parse_registration(row: &RawRow) -> Result<Registration, RejectReason> {
    let registration_id = field_u64(row, &["registrationid", "registration_id"])
        .ok_or(RejectReason::MissingId)?;
    let bbl = parse_bbl(row).ok_or(RejectReason::MissingBbl)?;

    let owner_name = field_str(row, &["owner_name", "corporationname", "corporation_name"])
        .or_else(|| {
            join_present(&[
                field_str(row, &["firstname", "first_name"]),
                field_str(row, &["middleinitial", "middle_initial"]),
                field_str(row, &["lastname", "last_name"]),
            ])
        })
        .ok_or(RejectReason::MissingName)?;

    let mailing_address = field_str(row, &["mailing_address", "business_address"])
        .or_else(|| {
            join_present(&[
                field_str(row, &["businesshousenumber"]),
                field_str(row, &["businessstreetname"]),
            ])
        })
        .unwrap_or_default();

    Ok(Registration {
        registration_id,
        bbl,
        owner_name,
        mailing_address,
        mailing_zip: field_str(row, &["mailing_zip", "businesszip"])
            .and_then(|z| normalize_zip(&z)),
        last_registration_date: optional_date(
            row,
            &["lastregistrationdate", "last_registration_date"],
        )?,
        building_address: join_present(&[
            field_str(row, &["housenumber", "house_number"]),
            field_str(row, &["streetname", "street_name"]),
        ])
        .map(|a| collapse_whitespace(&a)),
        building_zip: field_str(row, &["zip", "zipcode"]).and_then(|z| normalize_zip(&z)),
        total_units: field_u32(row, &["totalunits", "total_units"])?,
    })
}

// =============================================================================
// Field access
// =============================================================================

/// First non-empty value among `keys`, rendered as a trimmed string.
fn field_str(row: &RawRow, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn field_f64(row: &RawRow, keys: &[&str]) -> Option<f64> {
    field_str(row, keys)
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

/// Integer field; accepts float renderings of integers ("12.0").
fn field_u64(row: &RawRow, keys: &[&str]) -> Option<u64> {
    let value = field_f64(row, keys)?;
    (value >= 0.0 && value.fract() == 0.0).then_some(value as u64)
}

/// A count that must fit in `u32`; larger values reject the row.
fn field_u32(row: &RawRow, keys: &[&str]) -> Result<Option<u32>, RejectReason> {
    field_u64(row, keys)
        .map(u32::try_from)
        .transpose()
        .map_err(|_| RejectReason::OutOfRange)
}

fn join_present(parts: &[Option<String>]) -> Option<String> {
    let joined = parts
        .iter()
        .flatten()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.trim().is_empty()).then_some(joined)
}

/// A date field: absent is `None`, present but unparseable rejects the row.
fn optional_date(row: &RawRow, keys: &[&str]) -> Result<Option<NaiveDate>, RejectReason> {
    match field_str(row, keys) {
        None => Ok(None),
        Some(raw) => parse_date(&raw).map(Some).ok_or(RejectReason::BadDate),
    }
}

/// BBL from a `bbl` field, or from borough + block + lot components.
pub fn parse_bbl(row: &RawRow) -> Option<Bbl> {
    if let Some(raw) = field_str(row, &["bbl"]) {
        return Bbl::parse(&raw);
    }
    let borough = field_str(row, &["boroid", "boro", "borough", "borocode"])
        .and_then(|raw| Borough::parse(&raw))?;
    let block = field_u64(row, &["block"])?;
    let lot = field_u64(row, &["lot"])?;
    Bbl::from_parts(borough, u32::try_from(block).ok()?, u32::try_from(lot).ok()?)
}

/// Accepts `YYYY-MM-DD`, ISO datetimes (with or without offset), and `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(datetime.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%m/%d/%Y %I:%M:%S %p"] {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }
    NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").ok()
}

// =============================================================================
// Text normalization
// =============================================================================

/// Legal-entity suffix tokens dropped from comparison names.
const ENTITY_SUFFIXES: &[&str] = &[
    "LLC",
    "INC",
    "INCORPORATED",
    "CORP",
    "CORPORATION",
    "CO",
    "COMPANY",
    "LP",
    "LTD",
    "LIMITED",
    "PLLC",
    "PC",
];

/// Street designators folded to their USPS abbreviations.
const STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("AV", "AVE"),
    ("BOULEVARD", "BLVD"),
    ("ROAD", "RD"),
    ("DRIVE", "DR"),
    ("LANE", "LN"),
    ("PLACE", "PL"),
    ("COURT", "CT"),
    ("PARKWAY", "PKWY"),
    ("TERRACE", "TER"),
    ("EAST", "E"),
    ("WEST", "W"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
];

/// Unit designators; the designator and the token after it are dropped.
const UNIT_DESIGNATORS: &[&str] = &["APT", "APARTMENT", "STE", "SUITE", "UNIT", "FL", "FLOOR", "RM", "ROOM"];

/// Trim and collapse internal whitespace, preserving case.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Uppercase tokens with punctuation removed and dotted initialisms joined
/// ("L.L.C." becomes "LLC").
fn tokens(raw: &str) -> Vec<String> {
    let upper = raw.to_uppercase().replace(['\'', '\u{2019}'], "");
    let pieces: Vec<&str> = upper
        .split(|c: char| !c.is_alphanumeric())
        .filter(|piece| !piece.is_empty())
        .collect();

    let mut out = Vec::with_capacity(pieces.len());
    let mut letters = String::new();
    for piece in pieces {
        let single_letter = piece.chars().count() == 1 && piece.chars().all(char::is_alphabetic);
        if single_letter {
            letters.push_str(piece);
            continue;
        }
        if !letters.is_empty() {
            out.push(std::mem::take(&mut letters));
        }
        out.push(piece.to_string());
    }
    if !letters.is_empty() {
        out.push(letters);
    }
    out
}

fn abbreviate(token: &str) -> &str {
    STREET_ABBREVIATIONS
        .iter()
        .find(|(long, _)| *long == token)
        .map(|(_, short)| *short)
        .unwrap_or(token)
}

/// Comparison form of an owner name: uppercase, no punctuation, no entity
/// suffixes, street words abbreviated.
pub fn comparison_name(raw: &str) -> String {
    tokens(raw)
        .iter()
        .filter(|token| !ENTITY_SUFFIXES.contains(&token.as_str()))
        .map(|token| abbreviate(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when the name carries an LLC designator (`LLC`, `L.L.C.`, `L L C`).
pub fn is_llc_name(raw: &str) -> bool {
    tokens(raw).iter().any(|token| token == "LLC")
}

fn zip_pattern() -> &'static Regex {
    static ZIP: OnceLock<Regex> = OnceLock::new();
    ZIP.get_or_init(|| Regex::new(r"(\d{5})(?:-\d{4})?\s*$").expect("valid zip pattern"))
}

/// Five-digit postal code from a raw zip field ("10001-1234" becomes "10001").
pub fn normalize_zip(raw: &str) -> Option<String> {
    let digits: String = raw.trim().chars().take_while(char::is_ascii_digit).collect();
    (digits.len() >= 5).then(|| digits[..5].to_string())
}

/// Split a one-line mailing address into its normalized street and trailing zip.
///
/// The street is the first comma-separated segment once the zip is removed:
/// `"123 Main Street, New York, NY 10001"` gives `("123 MAIN ST", Some("10001"))`.
pub fn split_mailing_address(raw: &str) -> (String, Option<String>) {
    let trimmed = raw.trim();
    let (rest, zip) = match zip_pattern().captures(trimmed) {
        Some(captures) => {
            let whole = captures.get(0).map(|m| m.start()).unwrap_or(trimmed.len());
            let zip = captures.get(1).map(|m| m.as_str().to_string());
            (&trimmed[..whole], zip)
        }
        None => (trimmed, None),
    };
    let street_part = rest.split(',').next().unwrap_or_default();
    (normalize_street(street_part), zip)
}

/// Normalized street line: uppercase, abbreviated designators, ordinal
/// suffixes and unit numbers removed.
pub fn normalize_street(raw: &str) -> String {
    let prepared = raw.replace('#', " APT ");
    let mut out: Vec<String> = Vec::new();
    let mut skip_next = false;
    for token in tokens(&prepared) {
        if skip_next {
            skip_next = false;
            continue;
        }
        if UNIT_DESIGNATORS.contains(&token.as_str()) {
            skip_next = true;
            continue;
        }
        out.push(strip_ordinal(abbreviate(&token)).to_string());
    }
    out.join(" ")
}

/// "42ND" becomes "42"; other tokens pass through.
fn strip_ordinal(token: &str) -> &str {
    for suffix in ["ST", "ND", "RD", "TH"] {
        if let Some(number) = token.strip_suffix(suffix) {
            if !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit()) {
                return number;
            }
        }
    }
    token
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> RawRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_comparison_name_strips_suffix_and_abbreviates() {
        assert_eq!(comparison_name("123 MAIN ST LLC"), "123 MAIN ST");
        assert_eq!(comparison_name("123  Main Street, L.L.C."), "123 MAIN ST");
        assert_eq!(comparison_name("O'Brien Realty Corp."), "OBRIEN REALTY");
        assert_eq!(comparison_name("LLC"), "");
    }

    #[test]
    fn test_llc_detection() {
        assert!(is_llc_name("123 Main St LLC"));
        assert!(is_llc_name("Harbor Holdings L.L.C."));
        assert!(is_llc_name("harbor holdings l l c"));
        assert!(!is_llc_name("Harbor Holdings Inc"));
        assert!(!is_llc_name("WELLCARE REALTY"));
    }

    #[test]
    fn test_split_mailing_address() {
        assert_eq!(
            split_mailing_address("123 Main Street, 10001"),
            ("123 MAIN ST".to_string(), Some("10001".to_string()))
        );
        assert_eq!(
            split_mailing_address("123 MAIN ST, New York, NY 10001-2233"),
            ("123 MAIN ST".to_string(), Some("10001".to_string()))
        );
        assert_eq!(
            split_mailing_address("55 West 42nd Street Apt 4B"),
            ("55 W 42 ST".to_string(), None)
        );
        assert_eq!(split_mailing_address("PO BOX 12 #3").0, "PO BOX 12");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 4, 5);
        assert_eq!(parse_date("2023-04-05"), expected);
        assert_eq!(parse_date("2023-04-05T13:45:00.000"), expected);
        assert_eq!(parse_date("2023-04-05T13:45:00Z"), expected);
        assert_eq!(parse_date("04/05/2023"), expected);
        assert_eq!(parse_date("04/05/2023 01:45:00 PM"), expected);
        assert_eq!(parse_date("yesterday"), None);
    }

    #[test]
    fn test_parse_bbl_from_components() {
        let components = row(json!({"boroid": "3", "block": "1234", "lot": 56}));
        assert_eq!(parse_bbl(&components), Some(Bbl(3012340056)));
        let named = row(json!({"borough": "BROOKLYN", "block": 1234, "lot": "56"}));
        assert_eq!(parse_bbl(&named), Some(Bbl(3012340056)));
        let direct = row(json!({"bbl": "1000010001"}));
        assert_eq!(parse_bbl(&direct), Some(Bbl(1000010001)));
        assert_eq!(parse_bbl(&row(json!({"block": 1}))), None);
    }

    #[test]
    fn test_bad_rows_are_counted_not_fatal() {
        let snapshot = RawSnapshot {
            violations: vec![
                row(json!({"violationid": 1, "bbl": "1000010001", "class": "C",
                           "inspectiondate": "2024-01-02", "currentstatus": "OPEN"})),
                row(json!({"violationid": 2, "class": "B"})),
                row(json!({"violationid": 3, "bbl": "1000010001", "class": "I"})),
                row(json!({"violationid": 4, "bbl": "1000010001", "class": "A",
                           "inspectiondate": "not a date"})),
                row(json!({"bbl": "1000010001", "class": "A"})),
            ],
            ..RawSnapshot::default()
        };
        let normalized = normalize_snapshot(&snapshot);
        assert_eq!(normalized.violations.len(), 1);
        let stats = normalized.stats.source(Source::Violations);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected_total(), 4);
        assert_eq!(stats.rejected.get(&RejectReason::MissingBbl), Some(&1));
        assert_eq!(stats.rejected.get(&RejectReason::BadClass), Some(&1));
        assert_eq!(stats.rejected.get(&RejectReason::BadDate), Some(&1));
        assert_eq!(stats.rejected.get(&RejectReason::MissingId), Some(&1));
    }

    #[test]
    fn test_violation_status_and_close_date() {
        let (closed, _) = parse_violation(&row(json!({
            "violationid": 9, "bbl": "2000010001", "class": "b",
            "inspectiondate": "2024-01-01", "currentstatus": "VIOLATION CLOSED",
            "currentstatusdate": "2024-02-10", "violationstatus": "Close"
        })))
        .unwrap();
        assert_eq!(closed.status, ViolationStatus::Closed);
        assert_eq!(closed.days_to_close(), Some(40));

        let (nov, _) = parse_violation(&row(json!({
            "violationid": 10, "bbl": "2000010001", "class": "A",
            "currentstatus": "NOV SENT", "currentstatusdate": "2024-02-10"
        })))
        .unwrap();
        assert_eq!(nov.status, ViolationStatus::Open);
        assert_eq!(nov.closed_date, None);
    }

    #[test]
    fn test_non_housing_complaints_rejected() {
        let noise = parse_complaint(&row(json!({
            "unique_key": 1, "bbl": "1000010001", "created_date": "2024-01-01",
            "complaint_type": "Noise - Street/Sidewalk", "agency": "NYPD"
        })));
        assert_eq!(noise.unwrap_err(), RejectReason::NotHousing);

        let heat = parse_complaint(&row(json!({
            "unique_key": 2, "bbl": "1000010001", "created_date": "2024-01-01",
            "complaint_type": "HEAT/HOT WATER", "agency": "HPD"
        })));
        assert!(heat.is_ok());
    }

    #[test]
    fn test_latest_registration_wins_and_builds_building() {
        let snapshot = RawSnapshot {
            registrations: vec![
                row(json!({"registrationid": 10, "bbl": "1000010001",
                           "owner_name": "OLD OWNER LLC", "mailing_address": "1 A St, 10001",
                           "lastregistrationdate": "2020-01-01",
                           "housenumber": "5", "streetname": "Elm Street",
                           "zip": "10002", "totalunits": "8"})),
                row(json!({"registrationid": 11, "bbl": "1000010001",
                           "owner_name": "NEW OWNER LLC", "mailing_address": "2 B St, 10001",
                           "lastregistrationdate": "2023-01-01"})),
            ],
            ..RawSnapshot::default()
        };
        let normalized = normalize_snapshot(&snapshot);
        assert_eq!(normalized.mentions.len(), 1);
        assert_eq!(normalized.mentions[0].display_name, "NEW OWNER LLC");
        assert_eq!(normalized.mentions[0].id, MentionId(0));
        let stats = normalized.stats.source(Source::Registrations);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.superseded, 1);
        assert!(normalized.buildings.contains_key(&Bbl(1000010001)));
    }

    #[test]
    fn test_mention_without_zip_is_unparseable() {
        let snapshot = RawSnapshot {
            registrations: vec![row(json!({
                "registrationid": 1, "bbl": "1000010001",
                "owner_name": "  Jane   Doe ", "mailing_address": "PO Box 7"
            }))],
            ..RawSnapshot::default()
        };
        let normalized = normalize_snapshot(&snapshot);
        let mention = &normalized.mentions[0];
        assert_eq!(mention.display_name, "Jane Doe");
        assert_eq!(mention.comparison_name, "JANE DOE");
        assert!(!mention.is_parseable());
    }

    #[test]
    fn test_oversized_counts_reject_the_row() {
        let snapshot = RawSnapshot {
            buildings: vec![
                row(json!({"bbl": "1000010001", "unitsres": 4294967306u64})),
                row(json!({"bbl": "1000010002", "yearbuilt": 70000})),
                row(json!({"bbl": "1000010003", "unitsres": 12, "yearbuilt": 1931})),
            ],
            registrations: vec![row(json!({
                "registrationid": 1, "bbl": "1000010004",
                "owner_name": "JANE DOE", "totalunits": 5000000000u64
            }))],
            ..RawSnapshot::default()
        };
        let normalized = normalize_snapshot(&snapshot);
        assert_eq!(normalized.buildings.len(), 1);
        let kept = &normalized.buildings[&Bbl(1000010003)];
        assert_eq!(kept.residential_units, Some(12));
        assert_eq!(kept.year_built, Some(1931));

        let buildings = normalized.stats.source(Source::Buildings);
        assert_eq!(buildings.rejected.get(&RejectReason::OutOfRange), Some(&2));
        let registrations = normalized.stats.source(Source::Registrations);
        assert_eq!(registrations.rejected.get(&RejectReason::OutOfRange), Some(&1));
        assert!(normalized.mentions.is_empty());
    }

    #[test]
    fn test_unknown_violation_status_is_counted() {
        let violation = |id: u64, status: &str| {
            row(json!({"violationid": id, "bbl": "1000010001", "class": "B",
                       "violationstatus": status}))
        };
        let snapshot = RawSnapshot {
            violations: vec![
                violation(1, "Open"),
                violation(2, "Close"),
                violation(3, "Pending Review"),
            ],
            ..RawSnapshot::default()
        };
        let normalized = normalize_snapshot(&snapshot);
        let stats = normalized.stats.source(Source::Violations);
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.unknown_status, 1);
        assert_eq!(normalized.violations[2].status, ViolationStatus::Open);

        let (_, recognized) = parse_violation(&violation(4, "closed")).unwrap();
        assert!(recognized);
    }
}
