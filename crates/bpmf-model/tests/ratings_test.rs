//! Property tests for the rated / unrated partition

use bpmf_core::error::BpmfError;
use bpmf_model::{FactorizationModel, ModelConfig, Rating};
use proptest::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use std::collections::BTreeSet;

fn check_partition(model: &FactorizationModel) {
    let rated = model.rated();
    let unrated = model.unrated();
    assert!(rated.is_disjoint(unrated));
    assert_eq!(rated.len() + unrated.len(), model.num_rows() * model.num_cols());
    for row in 0..model.num_rows() {
        for col in 0..model.num_cols() {
            assert!(rated.contains(&(row, col)) || unrated.contains(&(row, col)));
            assert_eq!(model.is_rated(row, col), rated.contains(&(row, col)));
        }
    }
    let from_ratings: BTreeSet<_> = model.ratings().iter().map(Rating::cell).collect();
    assert_eq!(&from_ratings, rated);
}

proptest! {
    #[test]
    fn partition_holds_after_construction_and_insertion(
        initial in proptest::collection::btree_set((0usize..6, 0usize..6), 1..20),
        extra in proptest::collection::btree_set((0usize..6, 0usize..6), 0..20),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let ratings = initial.iter().map(|&(r, c)| Rating::new(r, c, (r + c) as f64)).collect();
        let mut model = FactorizationModel::new(ratings, 2, ModelConfig::default(), &mut rng).unwrap();
        check_partition(&model);

        let batch: Vec<Rating> = extra
            .iter()
            .filter(|&&(r, c)| r < model.num_rows() && c < model.num_cols() && !initial.contains(&(r, c)))
            .map(|&(r, c)| Rating::new(r, c, 1.0))
            .collect();
        model.add_ratings(&batch).unwrap();
        check_partition(&model);
        prop_assert_eq!(model.ratings().len(), initial.len() + batch.len());
    }

    #[test]
    fn duplicate_leaves_model_unchanged(
        initial in proptest::collection::btree_set((0usize..5, 0usize..5), 1..15),
        pick in any::<prop::sample::Index>(),
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let ratings = initial.iter().map(|&(r, c)| Rating::new(r, c, 3.0)).collect();
        let mut model = FactorizationModel::new(ratings, 1, ModelConfig::default(), &mut rng).unwrap();
        let before = model.clone();

        let cells: Vec<_> = initial.iter().copied().collect();
        let (row, col) = cells[pick.index(cells.len())];
        let result = model.add_rating(row, col, 1.0);
        prop_assert_eq!(result, Err(BpmfError::DuplicateRating { row, col }));
        prop_assert_eq!(model, before);
    }
}
