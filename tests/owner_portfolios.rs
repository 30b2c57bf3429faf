#[path = "../src/test_support.rs"]
mod test_support;

use rentwatch_rs::config::{OwnershipPolicy, SingletonLlcPolicy};
use rentwatch_rs::linker::resolve_owners;
use rentwatch_rs::model::{MentionId, RawOwnerMention};
use rentwatch_rs::{Bbl, RawSnapshot, Rentwatch, RentwatchConfig, ResolverTuning, ScoringConfig};
use serde_json::json;
use test_support::row;

fn registration(id: u64, bbl: &str, owner: &str, address: &str) -> rentwatch_rs::normalize::RawRow {
    row(json!({
        "registrationid": id,
        "bbl": bbl,
        "owner_name": owner,
        "mailing_address": address,
        "lastregistrationdate": "2024-01-15",
    }))
}

/// One single-building LLC and one person who also holds a building
/// through an LLC at the same mailing address.
fn mixed_snapshot() -> RawSnapshot {
    RawSnapshot {
        registrations: vec![
            registration(1, "1000010001", "ALPHA 12 LLC", "1 A ST, 10001"),
            registration(2, "3000020001", "12 ELM REALTY", "9 PARK AVE, 10010"),
            registration(3, "3000020002", "12 ELM REALTY LLC", "9 PARK AVE, 10010"),
        ],
        ..RawSnapshot::default()
    }
}

fn engine_with(policy: OwnershipPolicy) -> anyhow::Result<Rentwatch> {
    let scoring = ScoringConfig {
        ownership: policy,
        ..ScoringConfig::default()
    };
    Rentwatch::new(RentwatchConfig::default())?.with_scoring(scoring)
}

#[test]
fn single_building_llc_opacity_follows_policy() -> anyhow::Result<()> {
    let raw = mixed_snapshot();
    let lone_llc = Bbl(1000010001);

    let penalize = engine_with(OwnershipPolicy::default())?.run_detailed(&raw)?;
    let portfolio = penalize.portfolios.portfolio_of(lone_llc).unwrap();
    assert_eq!(portfolio.total_buildings, 1);
    assert_eq!(portfolio.opacity, 1.0);

    let exclude = engine_with(OwnershipPolicy {
        singleton_llc: SingletonLlcPolicy::Exclude,
        ..OwnershipPolicy::default()
    })?
    .run_detailed(&raw)?;
    let portfolio = exclude.portfolios.portfolio_of(lone_llc).unwrap();
    assert_eq!(portfolio.opacity, 0.0);
    let metrics = &exclude.scores.buildings[&lone_llc].metrics;
    assert_eq!(metrics.opacity, Some(0.0));
    assert!((metrics.ownership_pressure.unwrap() - 1.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn llc_buildings_of_an_identified_owner_count_at_the_resolved_weight() -> anyhow::Result<()> {
    let raw = mixed_snapshot();
    let held = Bbl(3000020002);

    for weight in [0.5, 0.2] {
        let output = engine_with(OwnershipPolicy {
            resolved_llc_weight: weight,
            ..OwnershipPolicy::default()
        })?
        .run_detailed(&raw)?;
        let portfolio = output.portfolios.portfolio_of(held).unwrap();
        assert_eq!(portfolio.total_buildings, 2);
        assert_eq!(portfolio.llc_buildings, 1);
        assert!((portfolio.opacity - weight / 2.0).abs() < 1e-9);

        // The portfolio's opacity reaches every member building's metrics as is.
        for bbl in &portfolio.buildings {
            assert_eq!(output.scores.buildings[bbl].metrics.opacity, Some(portfolio.opacity));
        }
        let owner_score = &output.scores.portfolios[&portfolio.owner_id];
        assert_eq!(owner_score.metrics.opacity, Some(portfolio.opacity));
    }
    Ok(())
}

fn mention(id: u32, name: &str) -> RawOwnerMention {
    RawOwnerMention {
        id: MentionId(id),
        source_record_id: id as u64,
        bbl: Bbl(1000010001 + id as u64),
        display_name: name.to_string(),
        comparison_name: name.to_string(),
        display_address: "300 BROADWAY, 10007".to_string(),
        street: "300 BROADWAY".to_string(),
        zip: Some("10007".to_string()),
        is_llc: false,
    }
}

#[test]
fn oversized_bucket_still_merges_neighbouring_names() -> anyhow::Result<()> {
    let mentions = vec![
        mention(0, "ZENITH GROUP"),
        mention(1, "ACME REALTY"),
        mention(2, "BETA PARTNERS"),
        mention(3, "ZENITH GROUP INC"),
        mention(4, "ACME REALTY CO"),
    ];
    // Long name prefixes keep every mention in its own name bucket, so all
    // pairs come from the shared address bucket of five.
    let windowed = ResolverTuning {
        block_prefix_len: 16,
        max_bucket_size: 2,
        ..ResolverTuning::default()
    };
    let resolution = resolve_owners(&mentions, &windowed)?;
    assert_eq!(resolution.stats.largest_bucket, 5);
    assert_eq!(resolution.stats.merge_edges, 2);
    assert_eq!(resolution.owners.len(), 3);
    assert_eq!(resolution.owner_of(MentionId(1)), resolution.owner_of(MentionId(4)));
    assert_eq!(resolution.owner_of(MentionId(0)), resolution.owner_of(MentionId(3)));
    assert_ne!(resolution.owner_of(MentionId(1)), resolution.owner_of(MentionId(2)));

    let exhaustive = resolve_owners(
        &mentions,
        &ResolverTuning {
            block_prefix_len: 16,
            ..ResolverTuning::default()
        },
    )?;
    assert_eq!(exhaustive.assignments, resolution.assignments);
    Ok(())
}
