//! Percentile ranks over a score population.

use std::collections::BTreeMap;

/// Percentile of every member: `100 * (#strictly lower) / (n - 1)`.
///
/// Ties share a percentile; a single-member population ranks at 100.
/// Non-finite values are ignored.
pub fn percentile_ranks<K: Ord + Copy>(population: &[(K, f64)]) -> BTreeMap<K, f64> {
    let mut sorted: Vec<f64> = population
        .iter()
        .map(|(_, value)| *value)
        .filter(|value| value.is_finite())
        .collect();
    sorted.sort_by(f64::total_cmp);

    let n = sorted.len();
    let mut ranks = BTreeMap::new();
    for (key, value) in population {
        if !value.is_finite() {
            continue;
        }
        let percentile = if n <= 1 {
            100.0
        } else {
            let lower = sorted.partition_point(|candidate| candidate < value);
            100.0 * lower as f64 / (n - 1) as f64
        };
        ranks.insert(*key, round2(percentile));
    }
    ranks
}

/// Percentiles computed separately within each group.
pub fn grouped_percentile_ranks<K, G>(population: &[(K, G, f64)]) -> BTreeMap<K, f64>
where
    K: Ord + Copy,
    G: Ord + Copy,
{
    let mut groups: BTreeMap<G, Vec<(K, f64)>> = BTreeMap::new();
    for (key, group, value) in population {
        groups.entry(*group).or_default().push((*key, *value));
    }
    groups
        .values()
        .flat_map(|members| percentile_ranks(members))
        .collect()
}

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentiles_and_ties() {
        let ranks = percentile_ranks(&[(1, 10.0), (2, 50.0), (3, 50.0), (4, 90.0), (5, 20.0)]);
        assert_eq!(ranks[&1], 0.0);
        assert_eq!(ranks[&5], 25.0);
        assert_eq!(ranks[&2], 50.0);
        assert_eq!(ranks[&3], 50.0);
        assert_eq!(ranks[&4], 100.0);
    }

    #[test]
    fn test_single_member_is_top() {
        let ranks = percentile_ranks(&[("only", 42.0)]);
        assert_eq!(ranks["only"], 100.0);
        assert!(percentile_ranks::<u8>(&[]).is_empty());
    }

    #[test]
    fn test_grouped_ranks_are_independent() {
        let ranks = grouped_percentile_ranks(&[
            (1, 'a', 10.0),
            (2, 'a', 20.0),
            (3, 'b', 5.0),
            (4, 'b', 99.0),
            (5, 'c', 1.0),
        ]);
        assert_eq!(ranks[&1], 0.0);
        assert_eq!(ranks[&2], 100.0);
        assert_eq!(ranks[&3], 0.0);
        assert_eq!(ranks[&4], 100.0);
        assert_eq!(ranks[&5], 100.0);
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(33.333333), 33.33);
        assert_eq!(round2(66.666666), 66.67);
    }
}
