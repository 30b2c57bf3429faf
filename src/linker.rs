//! # Owner Resolver
//!
//! Partitions owner mentions into canonical owners: blocking, parallel
//! pairwise scoring per bucket, then a single deterministic union-find pass.

use crate::config::ResolverTuning;
use crate::dsu::{Cluster, MentionDsu, MergeGuard, MergeReason, MergeResult};
use crate::index::{candidate_pairs, BlockingIndex};
use crate::model::{CanonicalOwner, ClusterKind, MentionId, OwnerId, RawOwnerMention};
use crate::similarity::score_pair;
use anyhow::{bail, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Counters describing one resolver run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub mentions: usize,
    pub owners: usize,
    pub buckets: usize,
    pub largest_bucket: usize,
    pub merge_edges: usize,
    pub unparseable: usize,
    pub address_only_llc_clusters: usize,
}

/// Output of the resolver: a total assignment of mentions to owners.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Owners in id order; `owners[i].id == OwnerId(i)`.
    pub owners: Vec<CanonicalOwner>,
    pub assignments: BTreeMap<MentionId, OwnerId>,
    pub stats: ResolutionStats,
}

impl Resolution {
    pub fn owner(&self, id: OwnerId) -> Option<&CanonicalOwner> {
        self.owners.get(id.0 as usize)
    }

    pub fn owner_of(&self, mention: MentionId) -> Option<OwnerId> {
        self.assignments.get(&mention).copied()
    }
}

/// Resolve owner mentions into canonical owners.
///
/// Mentions must be densely numbered (`mentions[i].id == MentionId(i)`).
/// Owner ids follow the order of each cluster's smallest mention id.
#[instrument(skip(mentions, tuning), level = "debug")]
pub fn resolve_owners(mentions: &[RawOwnerMention], tuning: &ResolverTuning) -> Result<Resolution> {
    for (idx, mention) in mentions.iter().enumerate() {
        if mention.id.0 as usize != idx {
            bail!(
                "mention ids must be dense: position {} holds {}",
                idx,
                mention.id
            );
        }
    }

    let index = BlockingIndex::build(mentions, tuning.block_prefix_len);
    let edges = merge_edges(mentions, &index, tuning);

    let mut dsu = MentionDsu::new(mentions.len());
    let mut applied = 0usize;
    for (a, b, guard) in &edges {
        if let MergeResult::Merged { .. } = dsu.try_merge(*a, *b, *guard) {
            applied += 1;
        }
    }
    debug!(
        edges = edges.len(),
        applied, "Applied merge edges to union-find"
    );

    let clusters = dsu.get_clusters();
    let mut owners = Vec::with_capacity(clusters.len());
    let mut assignments = BTreeMap::new();
    for cluster in clusters.get_all_clusters() {
        let owner = canonical_owner(OwnerId(cluster.index as u32), cluster, mentions);
        for member in &owner.members {
            assignments.insert(*member, owner.id);
        }
        owners.push(owner);
    }

    let stats = ResolutionStats {
        mentions: mentions.len(),
        owners: owners.len(),
        buckets: index.bucket_count(),
        largest_bucket: index.largest_bucket(),
        merge_edges: edges.len(),
        unparseable: owners
            .iter()
            .filter(|o| o.kind == ClusterKind::Unparseable)
            .count(),
        address_only_llc_clusters: owners
            .iter()
            .filter(|o| o.kind == ClusterKind::AddressOnlyLlc)
            .count(),
    };
    info!(
        mentions = stats.mentions,
        owners = stats.owners,
        merge_edges = stats.merge_edges,
        unparseable = stats.unparseable,
        address_only_llc = stats.address_only_llc_clusters,
        "Resolved owners"
    );

    Ok(Resolution {
        owners,
        assignments,
        stats,
    })
}

/// Score every candidate pair bucket by bucket in parallel; returns the
/// deduplicated edges sorted by mention pair.
fn merge_edges(
    mentions: &[RawOwnerMention],
    index: &BlockingIndex,
    tuning: &ResolverTuning,
) -> Vec<(MentionId, MentionId, MergeGuard)> {
    let buckets = index.comparable_buckets();
    let mut edges: Vec<(MentionId, MentionId, MergeGuard)> = buckets
        .par_iter()
        .flat_map_iter(|(_, members)| {
            candidate_pairs(members, tuning.max_bucket_size, |id| {
                mentions[id.0 as usize].comparison_name.as_str()
            })
            .into_iter()
            .filter_map(|(a, b)| {
                let score = score_pair(&mentions[a.0 as usize], &mentions[b.0 as usize], tuning);
                score.merge_guard(tuning).map(|guard| (a, b, guard))
            })
            .collect::<Vec<_>>()
        })
        .collect();

    edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
    edges.dedup_by(|x, y| x.0 == y.0 && x.1 == y.1);
    edges
}

fn canonical_owner(id: OwnerId, cluster: &Cluster, mentions: &[RawOwnerMention]) -> CanonicalOwner {
    let members: Vec<&RawOwnerMention> = cluster
        .members
        .iter()
        .map(|m| &mentions[m.0 as usize])
        .collect();
    let is_llc = members.iter().all(|m| m.is_llc);

    let kind = if members.len() == 1 {
        if members[0].is_parseable() {
            ClusterKind::Singleton
        } else {
            ClusterKind::Unparseable
        }
    } else if is_llc
        && !cluster.reasons.is_empty()
        && cluster
            .reasons
            .iter()
            .all(|reason| *reason == MergeReason::LlcAffiliation)
    {
        ClusterKind::AddressOnlyLlc
    } else {
        ClusterKind::Matched
    };

    let representative = representative(&members);
    CanonicalOwner {
        id,
        display_name: representative.display_name.clone(),
        mailing_address: representative.display_address.clone(),
        is_llc,
        kind,
        members: cluster.members.clone(),
    }
}

/// Pick the mention whose text represents the cluster.
///
/// Candidates are the non-LLC mentions when any exist, otherwise all of them.
/// The most frequent comparison name wins; ties go to the shorter mailing
/// address, then the lexicographically smaller name. The lowest-id mention
/// carrying the winning name and address length supplies the display text.
fn representative<'a>(members: &[&'a RawOwnerMention]) -> &'a RawOwnerMention {
    let has_person = members.iter().any(|m| !m.is_llc);
    let candidates: Vec<&'a RawOwnerMention> = members
        .iter()
        .copied()
        .filter(|m| !has_person || !m.is_llc)
        .collect();

    // name -> (count, shortest address length)
    let mut names: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for mention in &candidates {
        let entry = names
            .entry(mention.comparison_name.as_str())
            .or_insert((0, usize::MAX));
        entry.0 += 1;
        entry.1 = entry.1.min(mention.display_address.len());
    }
    let (winner, (_, address_len)) = names
        .iter()
        .min_by(|(name_a, (count_a, len_a)), (name_b, (count_b, len_b))| {
            count_b
                .cmp(count_a)
                .then(len_a.cmp(len_b))
                .then(name_a.cmp(name_b))
        })
        .map(|(name, stats)| (*name, *stats))
        .unwrap_or(("", (0, 0)));

    candidates
        .iter()
        .copied()
        .filter(|m| m.comparison_name == winner && m.display_address.len() == address_len)
        .min_by_key(|m| m.id)
        .unwrap_or(members[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bbl;

    fn mention(id: u32, display: &str, name: &str, street: &str, zip: Option<&str>, is_llc: bool) -> RawOwnerMention {
        RawOwnerMention {
            id: MentionId(id),
            source_record_id: 100 + id as u64,
            bbl: Bbl(1000010001 + id as u64),
            display_name: display.to_string(),
            comparison_name: name.to_string(),
            display_address: format!("{street}, {}", zip.unwrap_or("")),
            street: street.to_string(),
            zip: zip.map(str::to_string),
            is_llc,
        }
    }

    #[test]
    fn test_resolution_is_total() {
        let mentions = vec![
            mention(0, "Acme LLC", "ACME", "1 A ST", Some("10001"), true),
            mention(1, "", "", "", None, false),
            mention(2, "Jane Doe", "JANE DOE", "2 B ST", Some("10002"), false),
        ];
        let resolution = resolve_owners(&mentions, &ResolverTuning::default()).unwrap();
        assert_eq!(resolution.assignments.len(), 3);
        assert_eq!(resolution.owners.len(), 3);
        assert_eq!(resolution.owners[1].kind, ClusterKind::Unparseable);
        assert_eq!(resolution.owners[0].kind, ClusterKind::Singleton);
        assert_eq!(resolution.stats.unparseable, 1);
    }

    #[test]
    fn test_rejects_sparse_ids() {
        let mentions = vec![mention(3, "X", "X", "1 A ST", Some("10001"), false)];
        assert!(resolve_owners(&mentions, &ResolverTuning::default()).is_err());
    }

    #[test]
    fn test_person_name_preferred_over_llc() {
        let mentions = vec![
            mention(0, "12 Elm LLC", "12 ELM", "9 PARK AVE", Some("10010"), true),
            mention(1, "12 Elm Realty LLC", "12 ELM REALTY", "9 PARK AVE", Some("10010"), true),
            mention(2, "12 Elm Realty", "12 ELM REALTY", "9 PARK AVE", Some("10010"), false),
        ];
        let resolution = resolve_owners(&mentions, &ResolverTuning::default()).unwrap();
        assert_eq!(resolution.owners.len(), 1);
        let owner = &resolution.owners[0];
        assert_eq!(owner.display_name, "12 Elm Realty");
        assert!(!owner.is_llc);
        assert_eq!(owner.kind, ClusterKind::Matched);
    }

    #[test]
    fn test_address_only_llc_cluster() {
        let mentions = vec![
            mention(0, "Alpha 12 LLC", "ALPHA 12", "77 WATER ST", Some("10005"), true),
            mention(1, "Zeta Holdings LLC", "ZETA HOLDINGS", "77 WATER ST", Some("10005"), true),
        ];
        let resolution = resolve_owners(&mentions, &ResolverTuning::default()).unwrap();
        assert_eq!(resolution.owners.len(), 1);
        let owner = &resolution.owners[0];
        assert!(owner.is_llc);
        assert_eq!(owner.kind, ClusterKind::AddressOnlyLlc);
        // Equal counts and address lengths: the lexicographically smaller name wins.
        assert_eq!(owner.display_name, "Alpha 12 LLC");
    }

    #[test]
    fn test_owner_ids_follow_smallest_member() {
        let mentions = vec![
            mention(0, "Jane Doe", "JANE DOE", "1 A ST", Some("10001"), false),
            mention(1, "Harbor Mgmt", "HARBOR MGMT", "5 B ST", Some("10002"), false),
            mention(2, "Jane  Doe", "JANE DOE", "1 A ST", Some("10001"), false),
        ];
        let resolution = resolve_owners(&mentions, &ResolverTuning::default()).unwrap();
        assert_eq!(resolution.owner_of(MentionId(0)), Some(OwnerId(0)));
        assert_eq!(resolution.owner_of(MentionId(2)), Some(OwnerId(0)));
        assert_eq!(resolution.owner_of(MentionId(1)), Some(OwnerId(1)));
        assert_eq!(
            resolution.owner(OwnerId(0)).map(|o| o.members.clone()),
            Some(vec![MentionId(0), MentionId(2)])
        );
    }

    #[test]
    fn test_reordered_person_name_at_same_address_merges() {
        let mentions = vec![
            mention(0, "John Smith", "JOHN SMITH", "40 ELM ST", Some("10001"), false),
            mention(1, "Smith, John", "SMITH JOHN", "40 ELM ST", Some("10001"), false),
        ];
        let resolution = resolve_owners(&mentions, &ResolverTuning::default()).unwrap();
        assert_eq!(resolution.owners.len(), 1);
        assert_eq!(resolution.owners[0].kind, ClusterKind::Matched);
        assert_eq!(resolution.stats.merge_edges, 1);
    }
}
