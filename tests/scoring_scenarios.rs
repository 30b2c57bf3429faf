#[path = "../src/test_support.rs"]
mod test_support;

use rentwatch_rs::config::{Reference, ScoringConfig, Transform};
use rentwatch_rs::model::{ClusterKind, SubScoreKind, ViolationCounts};
use rentwatch_rs::portfolio::BuildingActivity;
use rentwatch_rs::scoring::{RawMetrics, References, SubScores};
use rentwatch_rs::{Bbl, RawSnapshot, Rentwatch, RentwatchConfig};
use serde_json::json;
use test_support::row;

fn engine() -> Rentwatch {
    Rentwatch::new(RentwatchConfig::default()).unwrap()
}

fn building(bbl: &str, units: u32) -> rentwatch_rs::normalize::RawRow {
    row(json!({
        "bbl": bbl,
        "address": "1 TEST PLACE",
        "zipcode": "10001",
        "unitsres": units,
    }))
}

fn violations(bbl: &str, first_id: u64, class: &str, count: u64) -> Vec<rentwatch_rs::normalize::RawRow> {
    (0..count)
        .map(|offset| {
            row(json!({
                "violationid": first_id + offset,
                "bbl": bbl,
                "class": class,
                "inspectiondate": "2024-02-01",
                "violationstatus": "Open",
            }))
        })
        .collect()
}

#[test]
fn main_street_llc_variants_merge_into_one_owner() -> anyhow::Result<()> {
    let raw = RawSnapshot {
        buildings: vec![building("1000010001", 10), building("1000010002", 12)],
        registrations: vec![
            row(json!({
                "registrationid": 1,
                "bbl": "1000010001",
                "owner_name": "123 MAIN ST LLC",
                "mailing_address": "123 Main Street, 10001",
                "lastregistrationdate": "2024-01-15",
            })),
            row(json!({
                "registrationid": 2,
                "bbl": "1000010002",
                "owner_name": "123 MAIN STREET LLC",
                "mailing_address": "123 MAIN ST, 10001",
                "lastregistrationdate": "2024-01-15",
            })),
        ],
        ..RawSnapshot::default()
    };
    let generation = engine().run(&raw)?;

    let first = generation.building(Bbl(1000010001)).unwrap();
    let second = generation.building(Bbl(1000010002)).unwrap();
    let owner = first.owner.as_ref().unwrap();
    assert_eq!(Some(owner.owner_id), second.owner.as_ref().map(|o| o.owner_id));
    assert_eq!(owner.portfolio_size, 2);
    assert!(owner.is_llc);

    assert_eq!(generation.owners.len(), 1);
    let report = generation.owner(owner.owner_id).unwrap();
    assert_eq!(report.mention_count, 2);
    assert_eq!(report.cluster_kind, ClusterKind::Matched);
    assert_eq!(report.buildings.len(), 2);
    Ok(())
}

#[test]
fn hazardous_building_scores_below_lightly_cited_one() -> anyhow::Result<()> {
    let hazardous = "2000010001";
    let light = "2000010002";
    let mut raw = RawSnapshot {
        buildings: vec![building(hazardous, 50), building(light, 50)],
        ..RawSnapshot::default()
    };
    raw.violations.extend(violations(hazardous, 1, "C", 40));
    raw.violations.extend(violations(hazardous, 100, "B", 10));
    raw.violations.extend(violations(hazardous, 200, "A", 5));
    raw.violations.extend(violations(light, 300, "A", 2));

    let generation = engine().run(&raw)?;
    let hazardous = &generation.building(Bbl::parse(hazardous).unwrap()).unwrap().score;
    let light = &generation.building(Bbl::parse(light).unwrap()).unwrap().score;

    assert_eq!(hazardous.metrics.violations.c, 40);
    assert!(hazardous.sub_scores.violation.unwrap() < light.sub_scores.violation.unwrap());
    assert!(hazardous.overall.unwrap() < light.overall.unwrap());
    Ok(())
}

#[test]
fn building_without_registration_has_no_owner_or_ownership_score() -> anyhow::Result<()> {
    let raw = RawSnapshot {
        buildings: vec![building("3000010001", 20), building("3000010002", 20)],
        registrations: vec![row(json!({
            "registrationid": 7,
            "bbl": "3000010002",
            "owner_name": "JANE DOE",
            "mailing_address": "5 ELM ST, 11201",
        }))],
        ..RawSnapshot::default()
    };
    let generation = engine().run(&raw)?;

    let orphan = generation.building(Bbl(3000010001)).unwrap();
    assert!(orphan.owner.is_none());
    assert_eq!(orphan.score.sub_scores.ownership, None);
    assert!(orphan
        .score
        .insufficient_data
        .contains(&SubScoreKind::Ownership));

    let owned = generation.building(Bbl(3000010002)).unwrap();
    assert_eq!(owned.owner.as_ref().map(|o| o.display_name.as_str()), Some("JANE DOE"));
    assert!(owned.score.sub_scores.ownership.is_some());
    Ok(())
}

#[test]
fn more_class_c_violations_never_raise_the_violation_score() {
    let references = References {
        violation_density: 1.2,
        complaint_rate: 0.1,
        eviction_rate: 0.01,
        ownership_pressure: 1.0,
        days_to_close: 30.0,
    };
    for transform in [Transform::Logistic { steepness: 1.5 }, Transform::CappedLinear] {
        let mut config = ScoringConfig::default();
        config.violation_calibration.transform = transform;
        config.violation_calibration.reference = Reference::Fixed { value: 1.2 };

        let mut previous = f64::INFINITY;
        for c in 0..60u32 {
            let activity = BuildingActivity {
                violations: ViolationCounts { a: 3, b: 2, c },
                open_violations: 5 + c,
                ..BuildingActivity::default()
            };
            let metrics = RawMetrics::compute(&activity, Some(40), None, &config);
            let score = SubScores::compute(&metrics, &references, &config)
                .violation
                .unwrap();
            assert!(score <= previous, "class C {c}: {score} > {previous}");
            assert!((0.0..=100.0).contains(&score));
            previous = score;
        }
    }
}

#[test]
fn building_without_units_has_null_rate_scores() -> anyhow::Result<()> {
    let mut raw = RawSnapshot {
        buildings: vec![row(json!({ "bbl": "4000010001", "address": "9 NOWHERE RD" }))],
        ..RawSnapshot::default()
    };
    raw.violations.extend(violations("4000010001", 1, "B", 3));
    let generation = engine().run(&raw)?;

    let score = &generation.building(Bbl(4000010001)).unwrap().score;
    assert_eq!(score.sub_scores.violation, None);
    assert_eq!(score.sub_scores.complaints, None);
    assert_eq!(score.sub_scores.eviction, None);
    // Only the resolution dimension remains: nothing closed scores 0.
    assert_eq!(score.sub_scores.resolution, Some(0.0));
    assert_eq!(score.overall, Some(0.0));
    Ok(())
}
