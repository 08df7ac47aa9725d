//! Observed ratings and the rated / unrated partition of the grid.
//!
//! A [`RatingSet`] owns the append-only list of observed [`Rating`]s for a
//! fixed `num_rows × num_cols` grid together with two ordered cell sets:
//! the cells that carry a rating and the cells that do not. The two sets are
//! disjoint and together cover the grid; every mutation updates both or
//! neither.

use bpmf_core::{
    error::{BpmfError, Result},
    types::{constants, Axis, Cell, DMatrix},
};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Number of fields in a rating tuple / columns in a rating array.
pub const RATING_FIELDS: usize = 3;

/// Largest float that still converts to an exact integer index.
const MAX_EXACT_INDEX: f64 = 9_007_199_254_740_992.0;

/// A single observed entry `(row, col, value)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rating {
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
    /// Observed value
    pub value: f64,
}

impl Rating {
    /// Creates a rating.
    pub fn new(row: usize, col: usize, value: f64) -> Self {
        Self { row, col, value }
    }

    /// The `(row, col)` cell of this rating.
    pub fn cell(&self) -> Cell {
        (self.row, self.col)
    }

    /// Parses one `[row, col, value]` record.
    ///
    /// # Errors
    ///
    /// [`BpmfError::InvalidShape`] if the record does not have exactly three
    /// fields, an index is negative, fractional or not finite, or the value is
    /// not finite.
    pub fn from_fields(fields: &[f64]) -> Result<Self> {
        if fields.len() != RATING_FIELDS {
            return Err(BpmfError::invalid_shape(format!(
                "expected {} fields per rating, got {}",
                RATING_FIELDS,
                fields.len()
            )));
        }
        let row = parse_index(fields[0], "row")?;
        let col = parse_index(fields[1], "col")?;
        let value = fields[2];
        if !value.is_finite() {
            return Err(BpmfError::invalid_shape(format!(
                "rating value for ({}, {}) is not finite",
                row, col
            )));
        }
        Ok(Self { row, col, value })
    }

    /// Parses every row of an `n × 3` array.
    pub fn from_array(array: &DMatrix<f64>) -> Result<Vec<Self>> {
        if array.ncols() != RATING_FIELDS {
            return Err(BpmfError::invalid_shape(format!(
                "rating array must have {} columns, got {}",
                RATING_FIELDS,
                constants::shape(array.nrows(), array.ncols())
            )));
        }
        array
            .row_iter()
            .map(|row| Self::from_fields(&[row[0], row[1], row[2]]))
            .collect()
    }
}

impl From<(usize, usize, f64)> for Rating {
    fn from((row, col, value): (usize, usize, f64)) -> Self {
        Self { row, col, value }
    }
}

fn parse_index(raw: f64, axis: &str) -> Result<usize> {
    if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 || raw > MAX_EXACT_INDEX {
        return Err(BpmfError::invalid_shape(format!(
            "{} index {} is not a non-negative integer",
            axis, raw
        )));
    }
    Ok(raw as usize)
}

/// Observed ratings over a fixed grid, with the rated / unrated partition.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingSet {
    num_rows: usize,
    num_cols: usize,
    ratings: Vec<Rating>,
    rated: BTreeSet<Cell>,
    unrated: BTreeSet<Cell>,
}

impl RatingSet {
    /// Builds a rating set whose grid is one past the largest index seen on
    /// each axis.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::InvalidShape`] for an empty input
    /// * [`BpmfError::DuplicateRating`] if a cell appears twice
    pub fn new(ratings: Vec<Rating>) -> Result<Self> {
        if ratings.is_empty() {
            return Err(BpmfError::invalid_shape(
                "at least one rating is required to size the grid",
            ));
        }
        let num_rows = ratings.iter().map(|r| r.row).max().unwrap_or(0) + 1;
        let num_cols = ratings.iter().map(|r| r.col).max().unwrap_or(0) + 1;
        Self::with_shape(num_rows, num_cols, ratings)
    }

    /// Builds a rating set over an explicit `num_rows × num_cols` grid.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::InvalidShape`] for an empty grid or an out-of-grid rating
    /// * [`BpmfError::DuplicateRating`] if a cell appears twice
    pub fn with_shape(num_rows: usize, num_cols: usize, ratings: Vec<Rating>) -> Result<Self> {
        if num_rows == 0 || num_cols == 0 {
            return Err(BpmfError::invalid_shape(format!(
                "grid must be non-empty, got {}",
                constants::shape(num_rows, num_cols)
            )));
        }
        let mut set = Self {
            num_rows,
            num_cols,
            ratings: Vec::with_capacity(ratings.len()),
            rated: BTreeSet::new(),
            unrated: (0..num_rows)
                .flat_map(|i| (0..num_cols).map(move |j| (i, j)))
                .collect(),
        };
        set.insert_batch(&ratings)?;
        Ok(set)
    }

    /// Appends a batch of ratings.
    ///
    /// The whole batch is validated before anything is modified: on error the
    /// set is left exactly as it was.
    ///
    /// # Errors
    ///
    /// * [`BpmfError::InvalidShape`] if a rating lies outside the grid
    /// * [`BpmfError::DuplicateRating`] if a cell is already rated or appears
    ///   twice in the batch
    pub fn insert_batch(&mut self, batch: &[Rating]) -> Result<()> {
        let mut seen = HashSet::with_capacity(batch.len());
        for rating in batch {
            if rating.row >= self.num_rows || rating.col >= self.num_cols {
                return Err(BpmfError::invalid_shape(format!(
                    "rating ({}, {}) lies outside the {} grid",
                    rating.row,
                    rating.col,
                    constants::shape(self.num_rows, self.num_cols)
                )));
            }
            if !rating.value.is_finite() {
                return Err(BpmfError::invalid_shape(format!(
                    "rating value for ({}, {}) is not finite",
                    rating.row, rating.col
                )));
            }
            if self.rated.contains(&rating.cell()) || !seen.insert(rating.cell()) {
                return Err(BpmfError::duplicate_rating(rating.row, rating.col));
            }
        }

        for rating in batch {
            self.unrated.remove(&rating.cell());
            self.rated.insert(rating.cell());
            self.ratings.push(*rating);
        }
        Ok(())
    }

    /// Number of rows in the grid.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of columns in the grid.
    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    /// Grid length along `axis`.
    pub fn len_along(&self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.num_rows,
            Axis::Cols => self.num_cols,
        }
    }

    /// Observed ratings in insertion order.
    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    /// Number of observed ratings.
    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    /// True if nothing has been rated.
    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Cells carrying a rating.
    pub fn rated(&self) -> &BTreeSet<Cell> {
        &self.rated
    }

    /// Cells without a rating.
    pub fn unrated(&self) -> &BTreeSet<Cell> {
        &self.unrated
    }

    /// True if `(row, col)` carries a rating.
    pub fn is_rated(&self, row: usize, col: usize) -> bool {
        self.rated.contains(&(row, col))
    }

    /// Mean observed value.
    pub fn mean_value(&self) -> f64 {
        if self.ratings.is_empty() {
            return 0.0;
        }
        self.ratings.iter().map(|r| r.value).sum::<f64>() / self.ratings.len() as f64
    }

    /// Groups the ratings by row and by column.
    pub fn index(&self) -> RatingIndex {
        let mut by_row = vec![AxisRatings::default(); self.num_rows];
        let mut by_col = vec![AxisRatings::default(); self.num_cols];
        for rating in &self.ratings {
            by_row[rating.row].indices.push(rating.col);
            by_row[rating.row].values.push(rating.value);
            by_col[rating.col].indices.push(rating.row);
            by_col[rating.col].values.push(rating.value);
        }
        RatingIndex { by_row, by_col }
    }
}

/// Ratings attached to one row (or one column) of the grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AxisRatings {
    /// Indices on the opposite axis (columns rated by a row, rows rating a column)
    pub indices: Vec<usize>,
    /// Observed values, aligned with `indices`
    pub values: Vec<f64>,
}

/// Per-row and per-column lookup of observed ratings.
///
/// Built once per sampling run so the Gibbs sweeps do not rescan the full
/// rating list for every factor vector.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingIndex {
    by_row: Vec<AxisRatings>,
    by_col: Vec<AxisRatings>,
}

impl RatingIndex {
    /// Ratings attached to entry `index` of `axis`.
    pub fn entries(&self, axis: Axis, index: usize) -> &AxisRatings {
        match axis {
            Axis::Rows => &self.by_row[index],
            Axis::Cols => &self.by_col[index],
        }
    }

    /// Number of entries along `axis`.
    pub fn len_along(&self, axis: Axis) -> usize {
        match axis {
            Axis::Rows => self.by_row.len(),
            Axis::Cols => self.by_col.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_ratings() -> Vec<Rating> {
        vec![
            Rating::new(0, 0, 5.0),
            Rating::new(0, 1, 3.0),
            Rating::new(1, 0, 4.0),
        ]
    }

    fn assert_partition(set: &RatingSet) {
        assert!(set.rated().is_disjoint(set.unrated()));
        assert_eq!(
            set.rated().len() + set.unrated().len(),
            set.num_rows() * set.num_cols()
        );
        for i in 0..set.num_rows() {
            for j in 0..set.num_cols() {
                assert!(set.rated().contains(&(i, j)) ^ set.unrated().contains(&(i, j)));
            }
        }
    }

    #[test]
    fn test_shape_from_max_index() -> Result<()> {
        let set = RatingSet::new(vec![Rating::new(2, 0, 1.0), Rating::new(0, 4, 2.0)])?;
        assert_eq!(set.num_rows(), 3);
        assert_eq!(set.num_cols(), 5);
        assert_partition(&set);
        Ok(())
    }

    #[test]
    fn test_partition_after_insert() -> Result<()> {
        let mut set = RatingSet::new(sample_ratings())?;
        assert_eq!(set.unrated().iter().copied().collect::<Vec<_>>(), vec![(1, 1)]);

        set.insert_batch(&[Rating::new(1, 1, 2.0)])?;
        assert!(set.unrated().is_empty());
        assert_eq!(set.len(), 4);
        assert_partition(&set);
        Ok(())
    }

    #[test]
    fn test_duplicate_leaves_state_unchanged() -> Result<()> {
        let mut set = RatingSet::new(sample_ratings())?;
        let before = set.clone();

        let err = set
            .insert_batch(&[Rating::new(1, 1, 1.0), Rating::new(0, 0, 2.0)])
            .unwrap_err();
        assert_eq!(err, BpmfError::duplicate_rating(0, 0));
        assert_eq!(set, before);

        let err = set
            .insert_batch(&[Rating::new(1, 1, 1.0), Rating::new(1, 1, 2.0)])
            .unwrap_err();
        assert_eq!(err, BpmfError::duplicate_rating(1, 1));
        assert_eq!(set, before);
        Ok(())
    }

    #[test]
    fn test_out_of_grid_rejected() -> Result<()> {
        let mut set = RatingSet::new(sample_ratings())?;
        let err = set.insert_batch(&[Rating::new(2, 0, 1.0)]).unwrap_err();
        assert!(matches!(err, BpmfError::InvalidShape { .. }));
        Ok(())
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(
            RatingSet::new(Vec::new()),
            Err(BpmfError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_from_fields_validation() {
        assert_eq!(
            Rating::from_fields(&[1.0, 2.0, 3.5]).unwrap(),
            Rating::new(1, 2, 3.5)
        );
        for bad in [
            vec![1.0, 2.0],
            vec![1.0, 2.0, 3.0, 4.0],
            vec![-1.0, 0.0, 1.0],
            vec![0.5, 0.0, 1.0],
            vec![0.0, f64::NAN, 1.0],
            vec![0.0, 0.0, f64::INFINITY],
        ] {
            assert!(
                matches!(Rating::from_fields(&bad), Err(BpmfError::InvalidShape { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_from_array() -> Result<()> {
        let array = DMatrix::from_row_slice(2, 3, &[0.0, 1.0, 4.0, 2.0, 0.0, 1.5]);
        let ratings = Rating::from_array(&array)?;
        assert_eq!(ratings, vec![Rating::new(0, 1, 4.0), Rating::new(2, 0, 1.5)]);

        let wrong = DMatrix::<f64>::zeros(2, 4);
        assert!(matches!(
            Rating::from_array(&wrong),
            Err(BpmfError::InvalidShape { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_index_groups_by_axis() -> Result<()> {
        let set = RatingSet::new(sample_ratings())?;
        let index = set.index();

        let row0 = index.entries(Axis::Rows, 0);
        assert_eq!(row0.indices, vec![0, 1]);
        assert_eq!(row0.values, vec![5.0, 3.0]);

        let col1 = index.entries(Axis::Cols, 1);
        assert_eq!(col1.indices, vec![0]);
        assert_eq!(col1.values, vec![3.0]);

        assert_eq!(index.len_along(Axis::Rows), 2);
        assert_eq!(set.mean_value(), 4.0);
        Ok(())
    }
}
