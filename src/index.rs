//! # Blocking Index
//!
//! Groups owner mentions into candidate buckets by cheap normalized keys so
//! that pairwise comparison never runs over the full mention set.

use crate::model::{MentionId, RawOwnerMention};
use hashbrown::HashMap;
use std::fmt;

/// A blocking key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BlockingKey {
    /// Leading alphanumeric characters of the comparison name plus postal code.
    Name { prefix: String, zip: String },
    /// Normalized street plus postal code, for every mention with a mailing street.
    Address { street: String, zip: String },
}

impl fmt::Display for BlockingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingKey::Name { prefix, zip } => write!(f, "name:{prefix}|{zip}"),
            BlockingKey::Address { street, zip } => write!(f, "addr:{street}|{zip}"),
        }
    }
}

/// Blocking keys for one mention. Unparseable mentions get none.
pub fn blocking_keys(mention: &RawOwnerMention, prefix_len: usize) -> Vec<BlockingKey> {
    let Some(zip) = mention.zip.as_ref() else {
        return Vec::new();
    };
    if mention.comparison_name.is_empty() {
        return Vec::new();
    }
    let prefix: String = mention
        .comparison_name
        .chars()
        .filter(|c| c.is_alphanumeric())
        .take(prefix_len)
        .collect();
    let mut keys = Vec::with_capacity(2);
    if !prefix.is_empty() {
        keys.push(BlockingKey::Name {
            prefix,
            zip: zip.clone(),
        });
    }
    // Reordered names ("SMITH JOHN") only meet their counterpart here.
    if let Some((street, zip)) = mention.address_key() {
        keys.push(BlockingKey::Address {
            street: street.to_string(),
            zip: zip.to_string(),
        });
    }
    keys
}

/// Mentions grouped by blocking key.
#[derive(Debug, Clone, Default)]
pub struct BlockingIndex {
    buckets: HashMap<BlockingKey, Vec<MentionId>>,
    unblocked: Vec<MentionId>,
}

impl BlockingIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index over all mentions.
    pub fn build(mentions: &[RawOwnerMention], prefix_len: usize) -> Self {
        let mut index = Self::new();
        for mention in mentions {
            index.add_mention(mention, prefix_len);
        }
        index
    }

    pub fn add_mention(&mut self, mention: &RawOwnerMention, prefix_len: usize) {
        let keys = blocking_keys(mention, prefix_len);
        if keys.is_empty() {
            self.unblocked.push(mention.id);
            return;
        }
        for key in keys {
            self.buckets.entry(key).or_default().push(mention.id);
        }
    }

    /// Buckets with at least two members, in key order; members ascending.
    pub fn comparable_buckets(&self) -> Vec<(&BlockingKey, Vec<MentionId>)> {
        let mut buckets: Vec<(&BlockingKey, Vec<MentionId>)> = self
            .buckets
            .iter()
            .filter(|(_, members)| members.len() > 1)
            .map(|(key, members)| {
                let mut members = members.clone();
                members.sort_unstable();
                members.dedup();
                (key, members)
            })
            .collect();
        buckets.sort_by(|a, b| a.0.cmp(b.0));
        buckets
    }

    /// Mentions that produced no blocking key.
    pub fn unblocked(&self) -> &[MentionId] {
        &self.unblocked
    }

    pub fn bucket(&self, key: &BlockingKey) -> &[MentionId] {
        self.buckets.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn largest_bucket(&self) -> usize {
        self.buckets.values().map(Vec::len).max().unwrap_or(0)
    }
}

/// Candidate pairs `(a, b)` with `a < b` inside one bucket.
///
/// Buckets up to `max_bucket_size` are compared exhaustively. Larger buckets
/// are sorted by `sort_key` and each member is compared with the next
/// `max_bucket_size - 1` members only.
pub fn candidate_pairs<K, F>(
    members: &[MentionId],
    max_bucket_size: usize,
    sort_key: F,
) -> Vec<(MentionId, MentionId)>
where
    K: Ord,
    F: Fn(MentionId) -> K,
{
    let window = max_bucket_size.max(2);
    let mut pairs = Vec::new();
    if members.len() <= window {
        for (i, a) in members.iter().enumerate() {
            for b in &members[i + 1..] {
                pairs.push(ordered(*a, *b));
            }
        }
        return pairs;
    }

    let mut sorted: Vec<MentionId> = members.to_vec();
    sorted.sort_by(|a, b| sort_key(*a).cmp(&sort_key(*b)).then(a.cmp(b)));
    for i in 0..sorted.len() {
        let end = (i + window).min(sorted.len());
        for j in i + 1..end {
            pairs.push(ordered(sorted[i], sorted[j]));
        }
    }
    pairs
}

fn ordered(a: MentionId, b: MentionId) -> (MentionId, MentionId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Bbl;

    fn mention(id: u32, name: &str, street: &str, zip: Option<&str>, is_llc: bool) -> RawOwnerMention {
        RawOwnerMention {
            id: MentionId(id),
            source_record_id: id as u64,
            bbl: Bbl(1000010001 + id as u64),
            display_name: name.to_string(),
            comparison_name: name.to_string(),
            display_address: street.to_string(),
            street: street.to_string(),
            zip: zip.map(str::to_string),
            is_llc,
        }
    }

    #[test]
    fn test_blocking_keys() {
        let llc = mention(0, "123 MAIN ST", "123 MAIN ST", Some("10001"), true);
        let keys = blocking_keys(&llc, 6);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].to_string(), "name:123MAI|10001");
        assert_eq!(keys[1].to_string(), "addr:123 MAIN ST|10001");

        let person = mention(1, "JANE DOE", "1 ELM ST", Some("10002"), false);
        let keys = blocking_keys(&person, 6);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].to_string(), "addr:1 ELM ST|10002");

        let no_street = mention(3, "JANE DOE", "", Some("10002"), false);
        assert_eq!(blocking_keys(&no_street, 6).len(), 1);

        let no_zip = mention(2, "JANE DOE", "1 ELM ST", None, false);
        assert!(blocking_keys(&no_zip, 6).is_empty());
    }

    #[test]
    fn test_index_tracks_unblocked() {
        let mentions = vec![
            mention(0, "ACME HOLDINGS", "1 A ST", Some("10001"), false),
            mention(1, "ACME HOLDING", "2 B ST", Some("10001"), false),
            mention(2, "", "3 C ST", Some("10001"), false),
        ];
        let index = BlockingIndex::build(&mentions, 6);
        assert_eq!(index.unblocked(), &[MentionId(2)]);
        let buckets = index.comparable_buckets();
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].1, vec![MentionId(0), MentionId(1)]);
    }

    #[test]
    fn test_candidate_pairs_exhaustive_and_windowed() {
        let members: Vec<MentionId> = (0..4).map(MentionId).collect();
        let all = candidate_pairs(&members, 8, |id| id);
        assert_eq!(all.len(), 6);

        let windowed = candidate_pairs(&members, 2, |id| std::cmp::Reverse(id));
        assert_eq!(
            windowed,
            vec![
                (MentionId(2), MentionId(3)),
                (MentionId(1), MentionId(2)),
                (MentionId(0), MentionId(1)),
            ]
        );
    }
}
