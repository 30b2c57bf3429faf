use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use chrono::{Duration, NaiveDate};
use rentwatch_rs::normalize::{RawRow, RawSnapshot};
use serde_json::{json, Value};

const STREETS: &[&str] = &[
    "MAIN STREET",
    "BROADWAY",
    "FLATBUSH AVENUE",
    "GRAND CONCOURSE",
    "QUEENS BOULEVARD",
    "VICTORY BOULEVARD",
    "AMSTERDAM AVENUE",
    "NOSTRAND AVENUE",
];

const FIRST_NAMES: &[&str] = &["JOHN", "MARIA", "DAVID", "SARAH", "JOSE", "LINDA", "WEI", "FATIMA"];
const LAST_NAMES: &[&str] = &["SMITH", "GARCIA", "COHEN", "NGUYEN", "PATEL", "OKAFOR", "ROSSI", "KIM"];

const COMPLAINT_TYPES: &[&str] = &["HEAT/HOT WATER", "PLUMBING", "PAINT/PLASTER", "ELEVATOR", "MOLD"];

/// Shape of a generated snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotShape {
    pub buildings: u32,
    /// Probability that a building is held through a single-purpose LLC.
    pub llc_share: f64,
    /// Probability that a registration row is repeated with an older date.
    pub superseded_share: f64,
    pub seed: u64,
}

impl SnapshotShape {
    #[allow(dead_code)]
    pub fn new(buildings: u32, seed: u64) -> Self {
        Self {
            buildings,
            llc_share: 0.3,
            superseded_share: 0.1,
            seed,
        }
    }
}

#[derive(Debug, Clone)]
struct Landlord {
    name: String,
    mailing_address: String,
    mailing_zip: String,
}

/// Build a raw row from a JSON object literal.
#[allow(dead_code)]
pub fn row(value: Value) -> RawRow {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

/// Ten-digit BBL string.
#[allow(dead_code)]
pub fn bbl_string(borough: u8, block: u32, lot: u32) -> String {
    format!("{borough}{block:05}{lot:04}")
}

fn date_string(base: NaiveDate, offset_days: i64) -> String {
    (base + Duration::days(offset_days))
        .format("%Y-%m-%d")
        .to_string()
}

/// Deterministic synthetic snapshot for the given shape.
#[allow(dead_code)]
pub fn generate_snapshot(shape: SnapshotShape) -> RawSnapshot {
    let mut rng = StdRng::seed_from_u64(shape.seed);
    let base = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap();
    let mut snapshot = RawSnapshot::default();

    let individuals: Vec<Landlord> = (0..(shape.buildings / 4).max(1))
        .map(|idx| Landlord {
            name: format!(
                "{} {}",
                FIRST_NAMES[idx as usize % FIRST_NAMES.len()],
                LAST_NAMES[(idx as usize / FIRST_NAMES.len()) % LAST_NAMES.len()]
            ),
            mailing_address: format!("{} {}", 10 + idx, STREETS[idx as usize % STREETS.len()]),
            mailing_zip: format!("{:05}", 10001 + idx % 90),
        })
        .collect();
    let controllers: Vec<Landlord> = (0..(shape.buildings / 10).max(1))
        .map(|idx| Landlord {
            name: String::new(),
            mailing_address: format!("{} PARK AVENUE SUITE {}", 200 + idx, idx + 1),
            mailing_zip: format!("{:05}", 10016 + idx % 20),
        })
        .collect();

    let mut registration_id = 100_000u64;
    let mut violation_id = 1_000_000u64;
    let mut complaint_id = 5_000_000u64;

    for idx in 0..shape.buildings {
        let borough = (idx % 5 + 1) as u8;
        let block = 100 + idx / 50;
        let lot = 1 + idx % 50;
        let bbl = bbl_string(borough, block, lot);
        let house_number = 1 + rng.random_range(0..900u32);
        let street = STREETS[rng.random_range(0..STREETS.len())];
        let units = rng.random_range(1..=120u32);

        snapshot.buildings.push(row(json!({
            "bbl": bbl,
            "address": format!("{house_number} {street}"),
            "zipcode": format!("{:05}", 10001 + rng.random_range(0..300u32)),
            "unitsres": units,
            "unitstotal": units + rng.random_range(0..3u32),
            "yearbuilt": rng.random_range(1890..2020u32),
        })));

        let owner = if rng.random_bool(shape.llc_share) {
            let controller = &controllers[rng.random_range(0..controllers.len())];
            Landlord {
                name: format!("{house_number} {street} LLC"),
                ..controller.clone()
            }
        } else {
            let mut owner = individuals[rng.random_range(0..individuals.len())].clone();
            if rng.random_bool(0.2) {
                // Same person, name tokens reordered.
                let tokens: Vec<&str> = owner.name.split(' ').rev().collect();
                owner.name = tokens.join(" ");
            }
            owner
        };

        let registered = rng.random_range(0..900i64);
        registration_id += 1;
        snapshot.registrations.push(row(json!({
            "registrationid": registration_id,
            "bbl": bbl,
            "owner_name": owner.name,
            "mailing_address": owner.mailing_address,
            "mailing_zip": owner.mailing_zip,
            "lastregistrationdate": date_string(base, registered),
            "housenumber": house_number.to_string(),
            "streetname": street,
            "totalunits": units,
        })));
        if rng.random_bool(shape.superseded_share) {
            registration_id += 1;
            snapshot.registrations.push(row(json!({
                "registrationid": registration_id,
                "bbl": bbl,
                "owner_name": "PREVIOUS OWNER CORP",
                "mailing_address": "1 OLD ROAD",
                "lastregistrationdate": date_string(base, registered - 400),
            })));
        }

        for _ in 0..rng.random_range(0..12u32) {
            violation_id += 1;
            let inspected = rng.random_range(0..900i64);
            let class = ["A", "B", "C"][rng.random_range(0..3usize)];
            let closed = rng.random_bool(0.5);
            let mut violation = json!({
                "violationid": violation_id,
                "bbl": bbl,
                "class": class,
                "inspectiondate": date_string(base, inspected),
                "violationstatus": if closed { "Close" } else { "Open" },
            });
            if closed {
                violation["currentstatusdate"] =
                    json!(date_string(base, inspected + rng.random_range(1..200i64)));
            }
            snapshot.violations.push(row(violation));
        }

        for _ in 0..rng.random_range(0..8u32) {
            complaint_id += 1;
            snapshot.complaints.push(row(json!({
                "unique_key": complaint_id,
                "bbl": bbl,
                "created_date": date_string(base, rng.random_range(0..900i64)),
                "complaint_type": COMPLAINT_TYPES[rng.random_range(0..COMPLAINT_TYPES.len())],
                "agency": "HPD",
            })));
        }

        if rng.random_bool(0.15) {
            snapshot.evictions.push(row(json!({
                "court_index_number": format!("LT-{idx:06}"),
                "bbl": bbl,
                "executed_date": date_string(base, rng.random_range(0..900i64)),
                "residential_commercial_ind": "Residential",
            })));
        }
    }

    snapshot
}
