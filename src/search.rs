//! Trigram address search over a published generation.
//!
//! Addresses are lowercased, reduced to alphanumeric words and split into
//! padded trigrams (`"  m"`, `" ma"`, `"mai"`, `"ain"`, `"in "`). Similarity
//! is `|A ∩ B| / |A ∪ B|` over the trigram sets.

use crate::model::Bbl;
use crate::publish::Generation;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

type Trigram = [char; 3];

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub bbl: Bbl,
    pub address: String,
    pub similarity: f64,
}

#[derive(Debug, Clone)]
struct IndexedAddress {
    bbl: Bbl,
    address: String,
    trigram_count: usize,
}

/// Inverted trigram index over building addresses.
#[derive(Debug, Clone, Default)]
pub struct AddressIndex {
    entries: Vec<IndexedAddress>,
    postings: FxHashMap<Trigram, Vec<u32>>,
    min_similarity: f64,
}

impl AddressIndex {
    pub fn new(min_similarity: f64) -> Self {
        Self {
            min_similarity,
            ..Self::default()
        }
    }

    /// Index every building of a generation that has an address.
    pub fn from_generation(generation: &Generation, min_similarity: f64) -> Self {
        let mut index = Self::new(min_similarity);
        for report in &generation.buildings {
            if let Some(address) = &report.address {
                index.insert(report.bbl, address);
            }
        }
        index
    }

    pub fn insert(&mut self, bbl: Bbl, address: &str) {
        let grams = trigrams(address);
        if grams.is_empty() {
            return;
        }
        let slot = self.entries.len() as u32;
        for gram in &grams {
            self.postings.entry(*gram).or_default().push(slot);
        }
        self.entries.push(IndexedAddress {
            bbl,
            address: address.to_string(),
            trigram_count: grams.len(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Best matches first; ties by BBL. Hits below the minimum similarity are dropped.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let query_grams = trigrams(query);
        if query_grams.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut shared: FxHashMap<u32, usize> = FxHashMap::default();
        for gram in &query_grams {
            if let Some(slots) = self.postings.get(gram) {
                for slot in slots {
                    *shared.entry(*slot).or_insert(0) += 1;
                }
            }
        }

        let mut hits: Vec<SearchHit> = shared
            .into_iter()
            .filter_map(|(slot, common)| {
                let entry = &self.entries[slot as usize];
                let union = query_grams.len() + entry.trigram_count - common;
                let similarity = common as f64 / union as f64;
                (similarity >= self.min_similarity).then(|| SearchHit {
                    bbl: entry.bbl,
                    address: entry.address.clone(),
                    similarity,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.bbl.cmp(&b.bbl))
        });
        hits.truncate(limit);
        hits
    }
}

/// Distinct padded trigrams of every word in `text`.
fn trigrams(text: &str) -> BTreeSet<Trigram> {
    let mut grams = BTreeSet::new();
    let lowered = text.to_lowercase();
    for word in lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
    {
        let padded: Vec<char> = "  "
            .chars()
            .chain(word.chars())
            .chain(std::iter::once(' '))
            .collect();
        for window in padded.windows(3) {
            grams.insert([window[0], window[1], window[2]]);
        }
    }
    grams
}

/// Trigram similarity between two strings.
pub fn trigram_similarity(left: &str, right: &str) -> f64 {
    let left: FxHashSet<Trigram> = trigrams(left).into_iter().collect();
    let right: FxHashSet<Trigram> = trigrams(right).into_iter().collect();
    if left.is_empty() && right.is_empty() {
        return 0.0;
    }
    let common = left.intersection(&right).count();
    common as f64 / (left.len() + right.len() - common) as f64
}
