//! Random-data bulk loader.
//!
//! Generates rows with an integer id key and a small payload, used to
//! populate a tree with one sequential insert per row.

use rand::Rng;
use std::collections::HashSet;

use arbor_common::{
    ArborError, Column, CompositeKey, Record, Result, DEFAULT_COUNT, MAX_COUNT, MIN_COUNT,
};

/// Names sampled for generated payload rows.
const NAMES: &[&str] = &[
    "ada", "brook", "casey", "devon", "ellis", "finley", "harper", "indigo", "jules", "kit",
    "lane", "marlow", "noor", "oakley", "peyton", "quinn", "reese", "sage", "tatum", "vesper",
];

/// Resolves an optional requested count against the loader bounds.
pub fn resolve_count(count: Option<usize>) -> Result<usize> {
    let count = count.unwrap_or(DEFAULT_COUNT);
    if !(MIN_COUNT..=MAX_COUNT).contains(&count) {
        return Err(ArborError::InvalidCount {
            min: MIN_COUNT,
            max: MAX_COUNT,
            got: count,
        });
    }
    Ok(count)
}

/// Generates one row: a single-column integer key plus an id/name/score
/// record.
pub fn random_row(rng: &mut impl Rng) -> (CompositeKey, Record) {
    let id = rng.random_range(1..=9_999_i64);
    let name = NAMES[rng.random_range(0..NAMES.len())];
    let score = rng.random_range(0.0..100.0_f64);
    (
        CompositeKey::single(Column::Int(id)),
        Record::new(vec![
            Column::Int(id),
            Column::String(name.to_string()),
            Column::Float(score),
        ]),
    )
}

/// Generates `count` rows with pairwise-distinct keys, re-drawing ids that
/// collide within the batch or with `taken`.
pub fn generate_rows(
    rng: &mut impl Rng,
    count: usize,
    taken: &HashSet<i64>,
) -> Vec<(CompositeKey, Record)> {
    let mut used = taken.clone();
    let mut rows = Vec::with_capacity(count);
    while rows.len() < count {
        let (key, record) = random_row(rng);
        let id = match key.values.first() {
            Some(Column::Int(id)) => *id,
            _ => continue,
        };
        if used.insert(id) {
            rows.push((key, record));
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_resolve_count_bounds() {
        assert_eq!(resolve_count(None).unwrap(), DEFAULT_COUNT);
        assert_eq!(resolve_count(Some(MIN_COUNT)).unwrap(), MIN_COUNT);
        assert_eq!(resolve_count(Some(MAX_COUNT)).unwrap(), MAX_COUNT);
        assert!(matches!(
            resolve_count(Some(0)).unwrap_err(),
            ArborError::InvalidCount { got: 0, .. }
        ));
        assert!(matches!(
            resolve_count(Some(MAX_COUNT + 1)).unwrap_err(),
            ArborError::InvalidCount { .. }
        ));
    }

    #[test]
    fn test_generated_rows_have_distinct_keys() {
        let mut rng = StdRng::seed_from_u64(7);
        let rows = generate_rows(&mut rng, 50, &HashSet::new());
        assert_eq!(rows.len(), 50);

        let mut ids = HashSet::new();
        for (key, record) in &rows {
            let Some(Column::Int(id)) = key.values.first() else {
                panic!("key must lead with an integer id");
            };
            assert!(ids.insert(*id), "duplicate id {id} in batch");
            assert_eq!(record.columns.first(), Some(&Column::Int(*id)));
            assert_eq!(record.columns.len(), 3);
        }
    }

    #[test]
    fn test_generate_rows_avoids_taken_ids() {
        let mut rng = StdRng::seed_from_u64(11);
        let taken: HashSet<i64> = (1..=9_000).collect();
        let rows = generate_rows(&mut rng, 20, &taken);
        for (key, _) in &rows {
            let Some(Column::Int(id)) = key.values.first() else {
                panic!("key must lead with an integer id");
            };
            assert!(!taken.contains(id));
        }
    }
}
