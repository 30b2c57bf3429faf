//! # Disjoint Set Union (DSU) with Merge Guards
//!
//! Union-Find over owner mentions. Every successful union records the guard
//! (reason and similarity) that justified it so resolved clusters can explain
//! how they came together.

use crate::model::MentionId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Why two mentions were merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeReason {
    /// Name similarity alone cleared the threshold.
    NameMatch,
    /// Name similarity together with an identical mailing address.
    NameAndAddress,
    /// Two LLCs at an identical mailing address; the names alone would not merge.
    LlcAffiliation,
}

/// The guard that allowed a merge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MergeGuard {
    pub reason: MergeReason,
    pub similarity: f64,
}

impl MergeGuard {
    pub fn new(reason: MergeReason, similarity: f64) -> Self {
        Self { reason, similarity }
    }
}

/// Result of attempting to merge two mentions
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeResult {
    /// Two distinct clusters were joined.
    Merged { guard: MergeGuard },
    /// Both mentions were already in the same cluster.
    AlreadyJoined,
}

/// Disjoint Set Union over a dense mention id space.
#[derive(Debug, Clone)]
pub struct MentionDsu {
    parent: Vec<u32>,
    rank: Vec<u8>,
    /// Guards of successful unions, keyed by the first mention of the edge.
    guards: FxHashMap<MentionId, Vec<(MentionId, MergeGuard)>>,
    cluster_count: usize,
}

impl MentionDsu {
    /// Create a DSU with `len` singleton clusters, one per mention id `0..len`.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
            rank: vec![0; len],
            guards: FxHashMap::default(),
            cluster_count: len,
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Find the root of a mention (path halving).
    /// Ids outside the tracked range are their own roots.
    #[inline]
    pub fn find(&mut self, mention: MentionId) -> MentionId {
        let mut current = mention.0 as usize;
        if current >= self.parent.len() {
            return mention;
        }
        loop {
            let parent = self.parent[current] as usize;
            if parent == current {
                return MentionId(current as u32);
            }
            let grandparent = self.parent[parent];
            self.parent[current] = grandparent;
            current = grandparent as usize;
        }
    }

    pub fn same_cluster(&mut self, a: MentionId, b: MentionId) -> bool {
        self.find(a) == self.find(b)
    }

    /// Merge the clusters of `a` and `b`, recording the guard.
    pub fn try_merge(&mut self, a: MentionId, b: MentionId, guard: MergeGuard) -> MergeResult {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return MergeResult::AlreadyJoined;
        }
        if root_a.0 as usize >= self.parent.len() || root_b.0 as usize >= self.parent.len() {
            return MergeResult::AlreadyJoined;
        }
        self.union(root_a, root_b);
        self.guards.entry(a).or_default().push((b, guard));
        MergeResult::Merged { guard }
    }

    fn union(&mut self, a: MentionId, b: MentionId) {
        let (a, b) = (a.0 as usize, b.0 as usize);
        let (rank_a, rank_b) = (self.rank[a], self.rank[b]);
        if rank_a < rank_b {
            self.parent[a] = b as u32;
        } else if rank_a > rank_b {
            self.parent[b] = a as u32;
        } else {
            self.parent[a] = b as u32;
            self.rank[b] = rank_b.saturating_add(1);
        }
        self.cluster_count = self.cluster_count.saturating_sub(1);
    }

    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Guards recorded for unions started from `mention`.
    pub fn get_guards(&self, mention: MentionId) -> &[(MentionId, MergeGuard)] {
        self.guards
            .get(&mention)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// All clusters, ordered by smallest member; members ascending.
    ///
    /// The result depends only on the partition, not on union order, so the
    /// same edge set always yields the same cluster numbering.
    pub fn get_clusters(&mut self) -> Clusters {
        let mut by_root: FxHashMap<MentionId, usize> = FxHashMap::default();
        let mut clusters: Vec<Cluster> = Vec::with_capacity(self.cluster_count);

        // Ascending ids: the first mention seen for a root is its smallest member.
        for idx in 0..self.parent.len() {
            let mention = MentionId(idx as u32);
            let root = self.find(mention);
            let slot = *by_root.entry(root).or_insert_with(|| {
                clusters.push(Cluster {
                    index: clusters.len(),
                    root,
                    members: Vec::new(),
                    reasons: BTreeSet::new(),
                });
                clusters.len() - 1
            });
            clusters[slot].members.push(mention);
        }

        let mut edges: Vec<(MentionId, MergeReason)> = self
            .guards
            .iter()
            .flat_map(|(from, guards)| guards.iter().map(move |(_, g)| (*from, g.reason)))
            .collect();
        edges.sort();
        for (from, reason) in edges {
            let root = self.find(from);
            if let Some(slot) = by_root.get(&root) {
                clusters[*slot].reasons.insert(reason);
            }
        }

        Clusters { clusters }
    }
}

/// One resolved cluster of mentions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    /// Position in the deterministic cluster order.
    pub index: usize,
    pub root: MentionId,
    /// Members in ascending id order.
    pub members: Vec<MentionId>,
    /// Reasons of every union inside this cluster.
    pub reasons: BTreeSet<MergeReason>,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, mention: MentionId) -> bool {
        self.members.binary_search(&mention).is_ok()
    }

    /// Smallest member id.
    pub fn anchor(&self) -> Option<MentionId> {
        self.members.first().copied()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Clusters {
    pub clusters: Vec<Cluster>,
}

impl Clusters {
    pub fn get_all_clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}
