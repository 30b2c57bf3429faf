//! # Data Model
//!
//! Core data structures for owner resolution and building scoring.
//! Includes the borough-block-lot key, typed source records, raw owner mentions,
//! and the resolved owner entities.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Borough-block-lot key of a NYC tax lot.
///
/// Stored as the 10-digit integer `B BBBBB LLLL`; the leading digit is the
/// borough code so numeric order matches textual order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bbl(pub u64);

impl Bbl {
    /// Build a BBL from its components. Returns `None` when a component is out of range.
    pub fn from_parts(borough: Borough, block: u32, lot: u32) -> Option<Self> {
        if block > 99_999 || lot > 9_999 {
            return None;
        }
        Some(Self(
            borough.code() as u64 * 1_000_000_000 + block as u64 * 10_000 + lot as u64,
        ))
    }

    /// Parse a 10-digit BBL string such as `"1000010001"`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        // Some feeds render the key as a float ("1000010001.0").
        let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
        if digits.len() != 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u64 = digits.parse().ok()?;
        let bbl = Self(value);
        bbl.borough().map(|_| bbl)
    }

    /// Borough encoded in the leading digit.
    pub fn borough(&self) -> Option<Borough> {
        Borough::from_code((self.0 / 1_000_000_000) as u8)
    }

    pub fn block(&self) -> u32 {
        ((self.0 / 10_000) % 100_000) as u32
    }

    pub fn lot(&self) -> u32 {
        (self.0 % 10_000) as u32
    }
}

impl fmt::Display for Bbl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

/// The five NYC boroughs, numbered as in the BBL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Borough {
    Manhattan,
    Bronx,
    Brooklyn,
    Queens,
    StatenIsland,
}

impl Borough {
    pub const ALL: [Borough; 5] = [
        Borough::Manhattan,
        Borough::Bronx,
        Borough::Brooklyn,
        Borough::Queens,
        Borough::StatenIsland,
    ];

    pub fn code(self) -> u8 {
        match self {
            Borough::Manhattan => 1,
            Borough::Bronx => 2,
            Borough::Brooklyn => 3,
            Borough::Queens => 4,
            Borough::StatenIsland => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Borough::Manhattan),
            2 => Some(Borough::Bronx),
            3 => Some(Borough::Brooklyn),
            4 => Some(Borough::Queens),
            5 => Some(Borough::StatenIsland),
            _ => None,
        }
    }

    /// Accepts a numeric code ("3") or a name in any case ("BROOKLYN", "Staten Island", "MN").
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        if let Ok(code) = upper.parse::<u8>() {
            return Self::from_code(code);
        }
        match upper.as_str() {
            "MANHATTAN" | "MN" | "NEW YORK" => Some(Borough::Manhattan),
            "BRONX" | "BX" | "THE BRONX" => Some(Borough::Bronx),
            "BROOKLYN" | "BK" | "KINGS" => Some(Borough::Brooklyn),
            "QUEENS" | "QN" => Some(Borough::Queens),
            "STATEN ISLAND" | "SI" | "RICHMOND" => Some(Borough::StatenIsland),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Borough::Manhattan => "Manhattan",
            Borough::Bronx => "Bronx",
            Borough::Brooklyn => "Brooklyn",
            Borough::Queens => "Queens",
            Borough::StatenIsland => "Staten Island",
        }
    }
}

impl fmt::Display for Borough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Compact identifier for raw owner mentions. Dense: equals the mention's
/// position in the normalized mention list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MentionId(pub u32);

impl fmt::Display for MentionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// Identifier of a canonical owner (one per resolved cluster).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerId(pub u32);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "O{}", self.0)
    }
}

/// A building (tax lot) and its descriptive attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub bbl: Bbl,
    pub address: Option<String>,
    pub borough: Borough,
    pub zip: Option<String>,
    pub total_units: Option<u32>,
    pub residential_units: Option<u32>,
    pub year_built: Option<u16>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Building {
    /// Unit count used as the scoring denominator: residential units when
    /// known, otherwise total units.
    pub fn scoring_units(&self) -> Option<u32> {
        match (self.residential_units, self.total_units) {
            (Some(res), _) if res > 0 => Some(res),
            (_, Some(total)) if total > 0 => Some(total),
            _ => None,
        }
    }
}

/// HPD violation class, from least (`A`, non-hazardous) to most severe
/// (`C`, immediately hazardous).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ViolationClass {
    A,
    B,
    C,
}

impl ViolationClass {
    pub fn parse(raw: &str) -> Option<Self> {
        let upper = raw.trim().to_ascii_uppercase();
        let code = upper.strip_prefix("CLASS").map(str::trim).unwrap_or(&upper);
        match code {
            "A" => Some(ViolationClass::A),
            "B" => Some(ViolationClass::B),
            "C" => Some(ViolationClass::C),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViolationClass::A => "A",
            ViolationClass::B => "B",
            ViolationClass::C => "C",
        }
    }
}

/// Open/closed state of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub id: u64,
    pub bbl: Bbl,
    pub class: ViolationClass,
    pub status: ViolationStatus,
    pub inspection_date: Option<NaiveDate>,
    pub closed_date: Option<NaiveDate>,
    pub description: Option<String>,
}

impl Violation {
    /// Days between inspection and closure, when both are known and ordered.
    pub fn days_to_close(&self) -> Option<i64> {
        if self.status != ViolationStatus::Closed {
            return None;
        }
        let opened = self.inspection_date?;
        let closed = self.closed_date?;
        let days = (closed - opened).num_days();
        (days >= 0).then_some(days)
    }
}

/// A housing-related 311 complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: u64,
    pub bbl: Bbl,
    pub created_date: NaiveDate,
    pub closed_date: Option<NaiveDate>,
    pub complaint_type: Option<String>,
    pub status: Option<String>,
}

/// A residential eviction filing / execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Eviction {
    pub court_index: String,
    pub bbl: Bbl,
    pub executed_date: Option<NaiveDate>,
    pub address: Option<String>,
}

/// Kind of dated event attached to a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Violation,
    Complaint,
    Eviction,
}

/// One owner mention taken from a registration record.
///
/// `comparison_name` and `street` are the normalized forms used for matching;
/// `display_name` and `display_address` keep the original text (trimmed,
/// whitespace collapsed) for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOwnerMention {
    pub id: MentionId,
    pub source_record_id: u64,
    pub bbl: Bbl,
    pub display_name: String,
    pub comparison_name: String,
    pub display_address: String,
    pub street: String,
    pub zip: Option<String>,
    pub is_llc: bool,
}

impl RawOwnerMention {
    /// A mention can take part in blocking only when it has both a usable
    /// name and a postal code.
    pub fn is_parseable(&self) -> bool {
        !self.comparison_name.is_empty() && self.zip.is_some()
    }

    /// The (street, zip) pair when both are known.
    pub fn address_key(&self) -> Option<(&str, &str)> {
        match (&self.zip, self.street.is_empty()) {
            (Some(zip), false) => Some((self.street.as_str(), zip.as_str())),
            _ => None,
        }
    }
}

/// How a canonical owner's cluster came together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterKind {
    /// One parseable mention with no matches.
    Singleton,
    /// One mention that could not be blocked (missing name or postal code).
    Unparseable,
    /// Mentions merged on name similarity (with or without address agreement).
    Matched,
    /// LLC mentions joined only by a shared mailing address.
    AddressOnlyLlc,
}

/// The resolved real-world party behind a set of mentions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalOwner {
    pub id: OwnerId,
    pub display_name: String,
    pub mailing_address: String,
    /// True only when every merged mention is an LLC (no identifiable controller).
    pub is_llc: bool,
    pub kind: ClusterKind,
    /// Member mentions, ascending.
    pub members: Vec<MentionId>,
}

impl CanonicalOwner {
    pub fn has_controller(&self) -> bool {
        !self.is_llc
    }
}

/// Violation counts per class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationCounts {
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl ViolationCounts {
    pub fn record(&mut self, class: ViolationClass) {
        match class {
            ViolationClass::A => self.a += 1,
            ViolationClass::B => self.b += 1,
            ViolationClass::C => self.c += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.a + self.b + self.c
    }

    pub fn absorb(&mut self, other: &ViolationCounts) {
        self.a += other.a;
        self.b += other.b;
        self.c += other.c;
    }
}

/// Letter grade bucketed from the overall score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            Grade::A => "A",
            Grade::B => "B",
            Grade::C => "C",
            Grade::D => "D",
            Grade::F => "F",
        };
        f.write_str(letter)
    }
}

/// The five scored dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubScoreKind {
    Violation,
    Complaints,
    Eviction,
    Ownership,
    Resolution,
}

impl SubScoreKind {
    pub const ALL: [SubScoreKind; 5] = [
        SubScoreKind::Violation,
        SubScoreKind::Complaints,
        SubScoreKind::Eviction,
        SubScoreKind::Ownership,
        SubScoreKind::Resolution,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbl_from_parts_and_display() {
        let bbl = Bbl::from_parts(Borough::Brooklyn, 1234, 56).unwrap();
        assert_eq!(bbl.to_string(), "3012340056");
        assert_eq!(bbl.borough(), Some(Borough::Brooklyn));
        assert_eq!(bbl.block(), 1234);
        assert_eq!(bbl.lot(), 56);
    }

    #[test]
    fn test_bbl_parse_rejects_bad_borough() {
        assert!(Bbl::parse("1000010001").is_some());
        assert!(Bbl::parse("1000010001.0").is_some());
        assert!(Bbl::parse("6000010001").is_none());
        assert!(Bbl::parse("100001").is_none());
        assert!(Bbl::parse("10000A0001").is_none());
    }

    #[test]
    fn test_borough_parse_names_and_codes() {
        assert_eq!(Borough::parse("2"), Some(Borough::Bronx));
        assert_eq!(Borough::parse("staten island"), Some(Borough::StatenIsland));
        assert_eq!(Borough::parse("BROOKLYN"), Some(Borough::Brooklyn));
        assert_eq!(Borough::parse("Jersey"), None);
    }

    #[test]
    fn test_violation_class_parse() {
        assert_eq!(ViolationClass::parse("c"), Some(ViolationClass::C));
        assert_eq!(ViolationClass::parse("Class B"), Some(ViolationClass::B));
        assert_eq!(ViolationClass::parse("I"), None);
    }

    #[test]
    fn test_days_to_close_requires_closed_status() {
        let mut violation = Violation {
            id: 1,
            bbl: Bbl(1000010001),
            class: ViolationClass::B,
            status: ViolationStatus::Open,
            inspection_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            closed_date: NaiveDate::from_ymd_opt(2024, 1, 31),
            description: None,
        };
        assert_eq!(violation.days_to_close(), None);
        violation.status = ViolationStatus::Closed;
        assert_eq!(violation.days_to_close(), Some(30));
    }

    #[test]
    fn test_scoring_units_prefers_residential() {
        let building = Building {
            bbl: Bbl(1000010001),
            address: None,
            borough: Borough::Manhattan,
            zip: None,
            total_units: Some(12),
            residential_units: Some(10),
            year_built: None,
            latitude: None,
            longitude: None,
        };
        assert_eq!(building.scoring_units(), Some(10));
        let empty = Building {
            residential_units: Some(0),
            total_units: Some(0),
            ..building
        };
        assert_eq!(empty.scoring_units(), None);
    }
}
