//! Pairwise owner-mention similarity.

use crate::config::ResolverTuning;
use crate::dsu::{MergeGuard, MergeReason};
use crate::model::RawOwnerMention;
use std::collections::BTreeSet;

/// Uppercase alphanumeric tokens; everything else separates.
fn token_set(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_uppercase)
        .collect()
}

fn ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// Token-set similarity in `[0, 1]`.
///
/// Token order, duplicates, case and punctuation are ignored; when one name's
/// tokens are a subset of the other's the score is 1.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let left = token_set(a);
    let right = token_set(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let join = |tokens: Vec<&String>| {
        tokens
            .into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let common = join(left.intersection(&right).collect());
    let only_left = join(left.difference(&right).collect());
    let only_right = join(right.difference(&left).collect());

    let combined_left = format!("{common} {only_left}").trim().to_string();
    let combined_right = format!("{common} {only_right}").trim().to_string();

    let mut best = ratio(&combined_left, &combined_right);
    if !common.is_empty() {
        best = best
            .max(ratio(&common, &combined_left))
            .max(ratio(&common, &combined_right));
    }
    best.clamp(0.0, 1.0)
}

/// Exact mailing-address agreement: same normalized street and postal code.
pub fn addresses_match(a: &RawOwnerMention, b: &RawOwnerMention) -> bool {
    match (a.address_key(), b.address_key()) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}

/// Components of a pair score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub name: f64,
    pub address_match: bool,
    pub llc_affiliation: bool,
    pub total: f64,
}

impl PairScore {
    /// The merge guard for this pair when it clears `tuning.merge_threshold`.
    pub fn merge_guard(&self, tuning: &ResolverTuning) -> Option<MergeGuard> {
        if self.total < tuning.merge_threshold {
            return None;
        }
        let without_bonus = tuning.name_weight * self.name
            + if self.address_match {
                tuning.address_weight
            } else {
                0.0
            };
        let reason = if self.llc_affiliation && without_bonus < tuning.merge_threshold {
            MergeReason::LlcAffiliation
        } else if self.address_match {
            MergeReason::NameAndAddress
        } else {
            MergeReason::NameMatch
        };
        Some(MergeGuard::new(reason, self.total))
    }
}

/// Weighted similarity of two mentions, clamped to `[0, 1]`.
pub fn score_pair(a: &RawOwnerMention, b: &RawOwnerMention, tuning: &ResolverTuning) -> PairScore {
    let name = token_set_similarity(&a.comparison_name, &b.comparison_name);
    let address_match = addresses_match(a, b);
    let llc_affiliation = address_match && a.is_llc && b.is_llc;

    let mut total = tuning.name_weight * name;
    if address_match {
        total += tuning.address_weight;
    }
    if llc_affiliation {
        total += tuning.llc_affiliation_bonus;
    }

    PairScore {
        name,
        address_match,
        llc_affiliation,
        total: total.clamp(0.0, 1.0),
    }
}
